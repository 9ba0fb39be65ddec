//! The authentication service: the one blocking call path in the server.
//! Requests queue from the lobby's network thread; a dedicated worker runs
//! the backend; verdicts are polled back on the lobby's tick.

use crate::config::Authentication;
use crate::data::SharedStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use stirrup::logging;

const WORKER_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub user_name: String,
    pub accepted: bool,
}

/// A credentials oracle. Implementations may block.
pub trait AuthenticationBackend: Send {
    fn authenticate(&mut self, user_name: &str, user_token: &str) -> bool;
}

/// Verifies the supplied token against the user record.
pub struct LocalBackend {
    store: SharedStore,
}

impl LocalBackend {
    pub fn new(store: SharedStore) -> LocalBackend {
        LocalBackend { store }
    }
}

impl AuthenticationBackend for LocalBackend {
    fn authenticate(&mut self, user_name: &str, user_token: &str) -> bool {
        let store = self.store.lock().expect("Record store lock poisoned");

        match store.user_by_name(user_name) {
            Some(uid) => store
                .users
                .immutable(uid, |user| !user.token.is_empty() && user.token == user_token)
                .unwrap_or(false),
            None => false,
        }
    }
}

/// Builds the configured backend. Only the local oracle ships with the
/// server; anything else is a fatal configuration error.
pub fn make_backend(
    config: &Authentication,
    store: SharedStore,
    log: &logging::Logger,
) -> Result<Box<dyn AuthenticationBackend>, String> {
    match config.backend.as_str() {
        "local" => {
            logging::info!(log, "authentication service is using the local backend");
            Ok(Box::new(LocalBackend::new(store)))
        }
        other => Err(format!(
            "Unknown authentication backend '{}'; only 'local' is available",
            other
        )),
    }
}

struct Request {
    user_name: String,
    user_token: String,
}

pub struct AuthenticationService {
    requests: mpsc::Sender<Request>,
    verdicts: Arc<Mutex<Vec<Verdict>>>,
    has_verdicts: Arc<AtomicBool>,
    run: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl AuthenticationService {
    /// Spawns the worker thread around the backend.
    pub fn start(
        mut backend: Box<dyn AuthenticationBackend>,
        log: &logging::Logger,
    ) -> AuthenticationService {
        let (requests, receiver) = mpsc::channel::<Request>();
        let verdicts = Arc::new(Mutex::new(Vec::new()));
        let has_verdicts = Arc::new(AtomicBool::new(false));
        let run = Arc::new(AtomicBool::new(true));

        let worker_verdicts = verdicts.clone();
        let worker_flag = has_verdicts.clone();
        let worker_run = run.clone();
        let worker_log = log.new(logging::o!("thread" => "auth-worker"));

        let worker = thread::Builder::new()
            .name("auth-worker".to_string())
            .spawn(move || {
                while worker_run.load(Ordering::Relaxed) {
                    let request = match receiver.recv_timeout(WORKER_POLL) {
                        Ok(request) => request,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };

                    let accepted = backend.authenticate(&request.user_name, &request.user_token);

                    logging::debug!(worker_log, "authentication verdict";
                                    "user" => &request.user_name,
                                    "accepted" => accepted);

                    worker_verdicts
                        .lock()
                        .expect("Verdict lock poisoned")
                        .push(Verdict {
                            user_name: request.user_name,
                            accepted,
                        });
                    worker_flag.store(true, Ordering::Release);
                }
            })
            .expect("Error spawning auth worker");

        AuthenticationService {
            requests,
            verdicts,
            has_verdicts,
            run,
            worker: Some(worker),
        }
    }

    /// Queues a credential check; the verdict shows up in a later poll.
    pub fn queue_authentication(&self, user_name: &str, user_token: &str) {
        drop(self.requests.send(Request {
            user_name: user_name.to_string(),
            user_token: user_token.to_string(),
        }));
    }

    #[inline]
    pub fn has_verdicts(&self) -> bool {
        self.has_verdicts.load(Ordering::Acquire)
    }

    /// Drains the accumulated verdicts.
    pub fn poll_verdicts(&self) -> Vec<Verdict> {
        if !self.has_verdicts() {
            return Vec::new();
        }

        let mut verdicts = self.verdicts.lock().expect("Verdict lock poisoned");
        self.has_verdicts.store(false, Ordering::Release);
        verdicts.drain(..).collect()
    }

    /// Stops the worker and joins it.
    pub fn stop(&mut self) {
        self.run.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            drop(worker.join());
        }
    }
}

impl Drop for AuthenticationService {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataStore;
    use std::time::Instant;
    use tempfile::TempDir;

    fn store_with_user(name: &str, token: &str) -> (TempDir, SharedStore) {
        let dir = TempDir::new().unwrap();
        let store = DataStore::open(dir.path(), &logging::discard())
            .unwrap()
            .into_shared();

        store.lock().unwrap().users.create(|user| {
            user.name = name.to_string();
            user.token = token.to_string();
        });

        (dir, store)
    }

    fn wait_for_verdicts(service: &AuthenticationService, count: usize) -> Vec<Verdict> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut verdicts = Vec::new();

        while verdicts.len() < count {
            verdicts.extend(service.poll_verdicts());
            if Instant::now() > deadline {
                panic!("Timed out waiting for verdicts; got {:?}", verdicts);
            }
            thread::sleep(Duration::from_millis(5));
        }

        verdicts
    }

    #[test]
    fn test_local_backend_verdicts() {
        let (_dir, store) = store_with_user("alice", "tok1");

        let mut service = AuthenticationService::start(
            Box::new(LocalBackend::new(store)),
            &logging::discard(),
        );

        service.queue_authentication("alice", "tok1");
        service.queue_authentication("alice", "wrong");
        service.queue_authentication("nobody", "tok1");

        let verdicts = wait_for_verdicts(&service, 3);

        assert_eq!(
            verdicts[0],
            Verdict {
                user_name: "alice".to_string(),
                accepted: true
            }
        );
        assert!(!verdicts[1].accepted);
        assert!(!verdicts[2].accepted);

        service.stop();
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let (_dir, store) = store_with_user("alice", "tok1");

        let config = Authentication {
            backend: "postgres".to_string(),
            connection_uri: String::new(),
        };

        assert!(make_backend(&config, store, &logging::discard()).is_err());
    }

    #[test]
    fn test_empty_token_never_authenticates() {
        let (_dir, store) = store_with_user("ghost", "");

        let mut backend = LocalBackend::new(store);
        assert!(!backend.authenticate("ghost", ""));
    }
}
