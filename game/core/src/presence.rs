//! Where everybody is. Directors report clients in and out; the messenger
//! reads the board for its friends list, and the lobby uses it to spot
//! duplicate logins across subservers.

use hashbrown::HashMap;
use std::sync::{Arc, Mutex};
use stirrup::Uid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Lobby,
    Ranch(Uid),
    Room(u32),
}

#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub name: String,
    pub location: Location,
}

pub struct PresenceBoard {
    entries: Mutex<HashMap<Uid, PresenceEntry>>,
}

pub type SharedPresence = Arc<PresenceBoard>;

impl PresenceBoard {
    pub fn new() -> PresenceBoard {
        PresenceBoard {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn into_shared(self) -> SharedPresence {
        Arc::new(self)
    }

    pub fn mark_online(&self, character_uid: Uid, name: &str) {
        self.entries
            .lock()
            .expect("Presence lock poisoned")
            .insert(
                character_uid,
                PresenceEntry {
                    name: name.to_string(),
                    location: Location::Lobby,
                },
            );
    }

    pub fn set_location(&self, character_uid: Uid, location: Location) {
        if let Some(entry) = self
            .entries
            .lock()
            .expect("Presence lock poisoned")
            .get_mut(&character_uid)
        {
            entry.location = location;
        }
    }

    pub fn mark_offline(&self, character_uid: Uid) {
        self.entries
            .lock()
            .expect("Presence lock poisoned")
            .remove(&character_uid);
    }

    pub fn is_online(&self, character_uid: Uid) -> bool {
        self.entries
            .lock()
            .expect("Presence lock poisoned")
            .contains_key(&character_uid)
    }

    pub fn snapshot(&self) -> Vec<(Uid, PresenceEntry)> {
        self.entries
            .lock()
            .expect("Presence lock poisoned")
            .iter()
            .map(|(&uid, entry)| (uid, entry.clone()))
            .collect()
    }
}
