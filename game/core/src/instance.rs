//! The server instance: opens the record store, builds the shared systems,
//! binds every subserver's listen socket (failing fast), and runs one
//! thread per subserver pumping its host and ticking its director at 50 Hz.

use crate::auth::{self, AuthenticationService};
use crate::config::GameConfig;
use crate::data::{DataStore, SharedStore};
use crate::directors::all_chat::AllChatDirector;
use crate::directors::lobby::{LobbyDirector, LobbySettings};
use crate::directors::messenger::{MessengerDirector, MessengerSettings};
use crate::directors::private_chat::PrivateChatDirector;
use crate::directors::race::{RaceDirector, RaceSettings};
use crate::directors::ranch::RanchDirector;
use crate::directors::Director;
use crate::otp::OtpRegistry;
use crate::presence::PresenceBoard;
use crate::rooms::RoomRegistry;
use bridle::channel::Scheme;
use bridle::dispatch::CommandRegistry;
use bridle::host::{Host, HostEvent};
use bridle::shared::ErrorUtils;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use stirrup::logging;

const TICKS_PER_SECOND: u64 = 50;
const TICK_PERIOD: Duration = Duration::from_millis(1000 / TICKS_PER_SECOND);
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

pub struct ServerInstance {
    run: Arc<AtomicBool>,
    threads: Vec<thread::JoinHandle<()>>,
    log: logging::Logger,
}

impl ServerInstance {
    /// Builds and starts the whole server. Any failure here (store, auth
    /// backend, listen sockets) aborts startup.
    pub fn launch(config: GameConfig, log: &logging::Logger) -> Result<ServerInstance, String> {
        let store = DataStore::open(Path::new(&config.data.root), log)
            .map_err(|err| format!("Error opening record store: {}", err))?
            .into_shared();

        let otp = OtpRegistry::new().into_shared();
        let rooms = RoomRegistry::new().into_shared();
        let presence = PresenceBoard::new().into_shared();

        let backend = auth::make_backend(&config.authentication, store.clone(), log)?;
        let auth_service = AuthenticationService::start(backend, log);

        // Bind every listener before spawning anything, so a bad port plan
        // dies with a clean error instead of a half-started server.
        let lobby_host = bind(&config.lobby.listen.bind_addr(), Scheme::Command, log)?;
        let ranch_host = bind(&config.ranch.listen.bind_addr(), Scheme::Command, log)?;
        let race_host = bind(&config.race.listen.bind_addr(), Scheme::Command, log)?;
        let messenger_host = bind(&config.messenger.listen.bind_addr(), Scheme::Chatter, log)?;
        let all_chat_host = bind(&config.all_chat.listen.bind_addr(), Scheme::Chatter, log)?;
        let private_chat_host =
            bind(&config.private_chat.listen.bind_addr(), Scheme::Chatter, log)?;

        let run = Arc::new(AtomicBool::new(true));
        let mut threads = Vec::new();

        {
            let director = LobbyDirector::new(
                LobbySettings::from_config(&config),
                store.clone(),
                auth_service,
                otp.clone(),
                rooms.clone(),
                presence.clone(),
                log,
            );
            threads.push(spawn_subserver(
                "lobby",
                lobby_host,
                director,
                LobbyDirector::registry(log),
                run.clone(),
                log,
            ));
        }

        {
            let director =
                RanchDirector::new(store.clone(), otp.clone(), presence.clone(), log);
            threads.push(spawn_subserver(
                "ranch",
                ranch_host,
                director,
                RanchDirector::registry(log),
                run.clone(),
                log,
            ));
        }

        {
            let adv = &config.lobby.advertisement;
            let director = RaceDirector::new(
                RaceSettings {
                    relay_address: adv.race.wire_addr(),
                    relay_port: adv.race.port,
                },
                store.clone(),
                otp.clone(),
                rooms.clone(),
                presence.clone(),
                log,
            );
            threads.push(spawn_subserver(
                "race",
                race_host,
                director,
                RaceDirector::registry(log),
                run.clone(),
                log,
            ));
        }

        {
            let director = MessengerDirector::new(
                MessengerSettings::from_config(&config),
                store.clone(),
                otp.clone(),
                presence.clone(),
                log,
            );
            threads.push(spawn_subserver(
                "messenger",
                messenger_host,
                director,
                MessengerDirector::registry(log),
                run.clone(),
                log,
            ));
        }

        {
            let director = AllChatDirector::new(store.clone(), otp.clone(), log);
            threads.push(spawn_subserver(
                "all-chat",
                all_chat_host,
                director,
                AllChatDirector::registry(log),
                run.clone(),
                log,
            ));
        }

        {
            let director = PrivateChatDirector::new(store.clone(), log);
            threads.push(spawn_subserver(
                "private-chat",
                private_chat_host,
                director,
                PrivateChatDirector::registry(log),
                run.clone(),
                log,
            ));
        }

        threads.push(spawn_flush_loop(store, run.clone(), log));

        logging::info!(log, "server instance running";
                       "lobby_port" => config.lobby.listen.port);

        Ok(ServerInstance {
            run,
            threads,
            log: log.new(logging::o!()),
        })
    }

    /// Atomically clears the run flag; every loop observes it on its next
    /// tick and exits.
    pub fn terminate(&mut self) {
        logging::info!(self.log, "terminating server instance");
        self.run.store(false, Ordering::Relaxed);

        for handle in self.threads.drain(..) {
            drop(handle.join());
        }
    }

    /// Blocks until every subserver thread exits.
    pub fn wait(mut self) {
        for handle in self.threads.drain(..) {
            drop(handle.join());
        }
    }
}

impl Drop for ServerInstance {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            self.terminate();
        }
    }
}

fn bind(address: &str, scheme: Scheme, log: &logging::Logger) -> Result<Host, String> {
    Host::bind(address, scheme, log)
        .map_err(|err| format!("Error binding listener on {}: {:?}", address, err))
}

fn spawn_subserver<D>(
    name: &'static str,
    mut host: Host,
    mut director: D,
    registry: CommandRegistry<D>,
    run: Arc<AtomicBool>,
    log: &logging::Logger,
) -> thread::JoinHandle<()>
where
    D: Director + Send + 'static,
{
    let log = log.new(logging::o!("subserver" => name));

    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            logging::info!(log, "subserver loop started");

            let mut next_tick = Instant::now();

            while run.load(Ordering::Relaxed) {
                let now = Instant::now();
                let poll_timeout = if next_tick > now {
                    (next_tick - now).min(TICK_PERIOD)
                } else {
                    Duration::from_millis(0)
                };

                host.sync(now, poll_timeout);

                for event in host.drain_events() {
                    match event {
                        HostEvent::Connected(client) => {
                            logging::debug!(log, "client connected";
                                            "client_id" => client,
                                            "peer" => ?host.client_addr(client));
                            director.on_client_connected(&mut host, client);
                        }
                        HostEvent::Disconnected(client) => {
                            logging::debug!(log, "client disconnected"; "client_id" => client);
                            director.on_client_disconnected(&mut host, client);
                        }
                        HostEvent::Frame(client, frame) => {
                            let result = registry.dispatch(
                                &mut director,
                                &mut host,
                                client,
                                frame.id,
                                &frame.payload,
                            );
                            if result.has_failed() {
                                logging::warn!(log, "dropping client on dispatch error";
                                               "client_id" => client,
                                               "command_id" => frame.id);
                                host.disconnect(client);
                            }
                        }
                    }
                }

                let now = Instant::now();
                if now >= next_tick {
                    director.tick(&mut host);

                    let overrun = now.duration_since(next_tick);
                    if overrun > TICK_PERIOD {
                        // Never double-tick to catch up; realign and log.
                        logging::warn!(log, "tick overrun";
                                       "behind_ms" => overrun.as_millis() as u64);
                        next_tick = now + TICK_PERIOD;
                    } else {
                        next_tick += TICK_PERIOD;
                    }
                }
            }

            logging::info!(log, "subserver loop stopped");
        })
        .expect("Error spawning subserver thread")
}

/// Periodically writes dirty records out; one final flush on shutdown.
fn spawn_flush_loop(
    store: SharedStore,
    run: Arc<AtomicBool>,
    log: &logging::Logger,
) -> thread::JoinHandle<()> {
    let log = log.new(logging::o!("thread" => "store-flush"));

    thread::Builder::new()
        .name("store-flush".to_string())
        .spawn(move || {
            let mut last_flush = Instant::now();

            while run.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(100));

                if last_flush.elapsed() >= FLUSH_INTERVAL {
                    flush(&store, &log);
                    last_flush = Instant::now();
                }
            }

            flush(&store, &log);
        })
        .expect("Error spawning flush thread")
}

fn flush(store: &SharedStore, log: &logging::Logger) {
    let result = store.lock().expect("Record store lock poisoned").flush();

    match result {
        Ok(0) => {}
        Ok(count) => logging::debug!(log, "records flushed"; "count" => count),
        Err(err) => logging::error!(log, "record flush failed"; "error" => %err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(data_root: &Path) -> GameConfig {
        let mut config = GameConfig::default();
        config.data.root = data_root.to_string_lossy().to_string();

        // Ephemeral loopback ports so test runs never collide.
        for listen in [
            &mut config.lobby.listen,
            &mut config.ranch.listen,
            &mut config.race.listen,
            &mut config.messenger.listen,
            &mut config.all_chat.listen,
            &mut config.private_chat.listen,
        ]
        .iter_mut()
        {
            listen.address = "127.0.0.1".to_string();
            listen.port = 0;
        }

        config
    }

    #[test]
    fn test_launch_and_terminate() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());

        let mut instance = ServerInstance::launch(config, &logging::discard()).unwrap();

        // Give the loops a moment to spin up, then shut down cleanly.
        thread::sleep(Duration::from_millis(50));
        instance.terminate();
    }

    #[test]
    fn test_unknown_auth_backend_fails_launch() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path());
        config.authentication.backend = "postgres".to_string();

        assert!(ServerInstance::launch(config, &logging::discard()).is_err());
    }
}
