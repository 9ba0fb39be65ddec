//! One-time passwords authorising a client's hop from the lobby to another
//! subserver. Codes are granted against an identity hash of the character
//! uid and the destination constant, live for a short window, and authorise
//! at most once.

use hashbrown::HashMap;
use rand::Rng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use stirrup::Uid;

/// How long a granted code stays authorisable.
pub const OTP_LIFETIME: Duration = Duration::from_secs(30);

/// Destination constants baked into the identity hash. A code granted for
/// one destination can never authorise another.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    Ranch = 1,
    Race = 2,
    AllChat = 3,
    PrivateChat = 4,
    Messenger = 5,
}

/// The hash both the granting and the receiving director compute from the
/// client-supplied character uid and their own destination constant.
pub fn identity_hash(character_uid: Uid, destination: Destination) -> u64 {
    let mut hasher = DefaultHasher::new();
    character_uid.hash(&mut hasher);
    (destination as u32).hash(&mut hasher);
    hasher.finish()
}

struct Grant {
    code: u32,
    expiry: Instant,
}

pub struct OtpRegistry {
    grants: Mutex<HashMap<u64, Grant>>,
}

pub type SharedOtp = Arc<OtpRegistry>;

impl OtpRegistry {
    pub fn new() -> OtpRegistry {
        OtpRegistry {
            grants: Mutex::new(HashMap::new()),
        }
    }

    pub fn into_shared(self) -> SharedOtp {
        Arc::new(self)
    }

    /// Grants a fresh nonzero code for the identity hash, replacing any
    /// previous grant for the same identity.
    pub fn grant_code(&self, key: u64) -> u32 {
        self.grant_code_at(key, Instant::now())
    }

    /// Returns true iff a live, matching grant exists; the grant is consumed.
    pub fn authorize_code(&self, key: u64, code: u32) -> bool {
        self.authorize_code_at(key, code, Instant::now())
    }

    fn grant_code_at(&self, key: u64, now: Instant) -> u32 {
        let mut grants = self.grants.lock().expect("Otp registry lock poisoned");

        // Opportunistic cleanup so dead grants don't pile up.
        grants.retain(|_, grant| grant.expiry > now);

        let mut rng = rand::thread_rng();
        let code = loop {
            let candidate: u32 = rng.gen();
            if candidate != 0 {
                break candidate;
            }
        };

        grants.insert(
            key,
            Grant {
                code,
                expiry: now + OTP_LIFETIME,
            },
        );

        code
    }

    fn authorize_code_at(&self, key: u64, code: u32, now: Instant) -> bool {
        let mut grants = self.grants.lock().expect("Otp registry lock poisoned");

        let live_match = match grants.get(&key) {
            Some(grant) => grant.expiry > now && grant.code == code,
            None => return false,
        };

        if live_match {
            grants.remove(&key);
            return true;
        }

        // Expired grants are dropped even on a failed attempt.
        if grants.get(&key).map(|g| g.expiry <= now).unwrap_or(false) {
            grants.remove(&key);
        }

        false
    }
}
