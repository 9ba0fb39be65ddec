use crate::data::model::{
    Character, Guild, Horse, Infraction, Item, Mail, Punishment, Record, StallionListing, User,
};
use hashbrown::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use stirrup::logging;
use stirrup::time::timestamp_secs;
use stirrup::Uid;

/// One record kind: the in-memory cache, the dirty set, and the directory
/// the JSON documents live in.
pub struct Registry<T: Record> {
    dir: PathBuf,
    records: HashMap<Uid, T>,
    dirty: HashSet<Uid>,
    next_uid: Uid,
}

impl<T: Record> Registry<T> {
    /// Opens the registry, creating the kind directory and loading every
    /// existing document into the cache.
    pub fn open(root: &Path) -> io::Result<Registry<T>> {
        let dir = root.join(T::KIND);
        fs::create_dir_all(&dir)?;

        let mut records = HashMap::new();
        let mut next_uid: Uid = 1;

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let file = fs::File::open(&path)?;
            let record: T = serde_json::from_reader(file).map_err(|err| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Corrupt {} record at {:?}: {}", T::KIND, path, err),
                )
            })?;

            next_uid = next_uid.max(record.uid() + 1);
            records.insert(record.uid(), record);
        }

        Ok(Registry {
            dir,
            records,
            dirty: HashSet::new(),
            next_uid,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn contains(&self, uid: Uid) -> bool {
        self.records.contains_key(&uid)
    }

    /// Read access. Returns `None` when no such record exists.
    #[inline]
    pub fn immutable<R, F: FnOnce(&T) -> R>(&self, uid: Uid, f: F) -> Option<R> {
        self.records.get(&uid).map(f)
    }

    /// Write access; the record is marked for the next flush.
    #[inline]
    pub fn mutable<R, F: FnOnce(&mut T) -> R>(&mut self, uid: Uid, f: F) -> Option<R> {
        match self.records.get_mut(&uid) {
            Some(record) => {
                let result = f(record);
                self.dirty.insert(uid);
                Some(result)
            }
            None => None,
        }
    }

    /// Creates a record with a fresh uid, letting the closure fill it in.
    pub fn create<F: FnOnce(&mut T)>(&mut self, f: F) -> Uid {
        let uid = self.next_uid;
        self.next_uid += 1;

        let mut record = T::default();
        record.set_uid(uid);
        f(&mut record);
        // The closure must not reassign the identity.
        record.set_uid(uid);

        self.records.insert(uid, record);
        self.dirty.insert(uid);
        uid
    }

    /// Removes the record and its backing document.
    pub fn delete(&mut self, uid: Uid) {
        if self.records.remove(&uid).is_some() {
            self.dirty.remove(&uid);
            drop(fs::remove_file(self.document_path(uid)));
        }
    }

    /// Linear scan for the first record matching the predicate.
    pub fn find<F: Fn(&T) -> bool>(&self, pred: F) -> Option<Uid> {
        self.records
            .values()
            .find(|record| pred(record))
            .map(|record| record.uid())
    }

    pub fn uids(&self) -> Vec<Uid> {
        self.records.keys().copied().collect()
    }

    /// Writes every dirty record out, returning how many documents hit disk.
    pub fn flush(&mut self) -> io::Result<usize> {
        let dirty: Vec<Uid> = self.dirty.drain().collect();
        let count = dirty.len();

        for uid in dirty {
            if let Some(record) = self.records.get(&uid) {
                let file = fs::File::create(self.document_path(uid))?;
                serde_json::to_writer_pretty(file, record)
                    .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
            }
        }

        Ok(count)
    }

    #[inline]
    fn document_path(&self, uid: Uid) -> PathBuf {
        self.dir.join(format!("{}.json", uid))
    }
}

/// All record registries behind one lock. Handlers keep their access
/// closures short; nothing inside a closure may touch the network.
pub struct DataStore {
    pub users: Registry<User>,
    pub characters: Registry<Character>,
    pub horses: Registry<Horse>,
    pub items: Registry<Item>,
    pub mails: Registry<Mail>,
    pub guilds: Registry<Guild>,
    pub stallions: Registry<StallionListing>,
    pub infractions: Registry<Infraction>,
}

pub type SharedStore = Arc<Mutex<DataStore>>;

impl DataStore {
    /// Opens every registry under the data root and sweeps expired stallion
    /// listings.
    pub fn open(root: &Path, log: &logging::Logger) -> io::Result<DataStore> {
        let mut store = DataStore {
            users: Registry::open(root)?,
            characters: Registry::open(root)?,
            horses: Registry::open(root)?,
            items: Registry::open(root)?,
            mails: Registry::open(root)?,
            guilds: Registry::open(root)?,
            stallions: Registry::open(root)?,
            infractions: Registry::open(root)?,
        };

        let swept = store.sweep_expired_stallions(timestamp_secs());
        if swept > 0 {
            logging::info!(log, "swept expired stallion listings"; "count" => swept);
        }

        logging::info!(log, "record store opened";
                       "users" => store.users.len(),
                       "characters" => store.characters.len(),
                       "horses" => store.horses.len(),
                       "mails" => store.mails.len());

        Ok(store)
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// Deletes stallion listings past their expiry; returns how many.
    pub fn sweep_expired_stallions(&mut self, now_secs: u64) -> usize {
        let expired: Vec<Uid> = self
            .stallions
            .uids()
            .into_iter()
            .filter(|&uid| {
                self.stallions
                    .immutable(uid, |listing| listing.expires_at <= now_secs)
                    .unwrap_or(false)
            })
            .collect();

        for uid in &expired {
            self.stallions.delete(*uid);
        }

        expired.len()
    }

    pub fn user_by_name(&self, name: &str) -> Option<Uid> {
        self.users.find(|user| user.name == name)
    }

    pub fn character_by_name(&self, name: &str) -> Option<Uid> {
        self.characters.find(|character| character.name == name)
    }

    /// The reason string of a live mute, if the character has one.
    pub fn active_mute(&self, character_uid: Uid, now_secs: u64) -> Option<String> {
        let uid = self.infractions.find(|infraction| {
            infraction.character_uid == character_uid
                && infraction.punishment == Punishment::Mute
                && infraction.expires_at > now_secs
        })?;

        self.infractions.immutable(uid, |infraction| infraction.reason.clone())
    }

    /// Flushes every registry; returns the total documents written.
    pub fn flush(&mut self) -> io::Result<usize> {
        let mut count = 0;
        count += self.users.flush()?;
        count += self.characters.flush()?;
        count += self.horses.flush()?;
        count += self.items.flush()?;
        count += self.mails.flush()?;
        count += self.guilds.flush()?;
        count += self.stallions.flush()?;
        count += self.infractions.flush()?;
        Ok(count)
    }
}

/// Seeds the minimal records a fresh character needs and binds them to the
/// user: the character itself and its newborn mount.
pub fn create_character(
    store: &mut DataStore,
    user_uid: Uid,
    name: &str,
    parts: crate::data::CharacterParts,
    shape: crate::data::CharacterShape,
    horse_tid: u32,
) -> Uid {
    let horse_uid = store.horses.create(|horse| {
        horse.tid = horse_tid;
        horse.name = String::new();
        horse.parts = crate::data::HorseParts {
            skin_id: 1,
            mane_id: 1,
            tail_id: 1,
            face_id: 1,
        };
        horse.shape = crate::data::HorseShape {
            scale: 4,
            leg_length: 4,
            leg_volume: 4,
            body_length: 4,
            body_volume: 4,
        };
        horse.stats = crate::data::HorseStats {
            agility: 9,
            spirit: 9,
            speed: 9,
            strength: 9,
            ambition: 9,
        };
        horse.grade = 1;
        horse.growth_points = 0;
    });

    let gender = if parts.char_id == 10 { 1 } else { 2 };

    let character_uid = store.characters.create(|character| {
        character.name = name.to_string();
        character.gender = gender;
        character.level = 1;
        character.carrots = 500;
        character.parts = parts;
        character.shape = shape;
        character.mount_uid = horse_uid;
        character.horses = vec![horse_uid];
        character.ranch = crate::data::RanchMeta {
            name: format!("{}'s ranch", name),
            locked: false,
        };
    });

    store.users.mutable(user_uid, |user| {
        user.character_uid = character_uid;
    });

    character_uid
}

/// True when the name is usable and no character already carries it.
pub fn character_name_free(store: &DataStore, name: &str) -> bool {
    !name.is_empty() && name.len() <= 16 && store.character_by_name(name).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{CharacterParts, CharacterShape};
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> DataStore {
        DataStore::open(dir.path(), &logging::discard()).unwrap()
    }

    #[test]
    fn test_create_flush_reload_roundtrip() {
        let dir = TempDir::new().unwrap();

        let horse_uid;
        {
            let mut store = open_store(&dir);
            horse_uid = store.horses.create(|horse| {
                horse.tid = 20002;
                horse.name = "Starlight".to_string();
            });
            store.flush().unwrap();
        }

        let store = open_store(&dir);
        let name = store
            .horses
            .immutable(horse_uid, |horse| horse.name.clone())
            .unwrap();

        assert_eq!(name, "Starlight");
    }

    #[test]
    fn test_uids_survive_reload() {
        let dir = TempDir::new().unwrap();

        let first;
        {
            let mut store = open_store(&dir);
            first = store.items.create(|item| item.tid = 1);
            store.flush().unwrap();
        }

        let mut store = open_store(&dir);
        let second = store.items.create(|item| item.tid = 2);

        assert!(second > first);
    }

    #[test]
    fn test_mutable_marks_dirty_and_persists() {
        let dir = TempDir::new().unwrap();

        let uid;
        {
            let mut store = open_store(&dir);
            uid = store.users.create(|user| {
                user.name = "alice".to_string();
                user.token = "tok1".to_string();
            });
            store.flush().unwrap();

            store.users.mutable(uid, |user| user.token = "tok2".to_string());
            assert_eq!(store.flush().unwrap(), 1);
        }

        let store = open_store(&dir);
        let token = store.users.immutable(uid, |user| user.token.clone()).unwrap();
        assert_eq!(token, "tok2");
    }

    #[test]
    fn test_delete_removes_document() {
        let dir = TempDir::new().unwrap();

        let mut store = open_store(&dir);
        let uid = store.mails.create(|mail| mail.body = "bye".to_string());
        store.flush().unwrap();

        store.mails.delete(uid);
        store.flush().unwrap();

        let store = open_store(&dir);
        assert!(!store.mails.contains(uid));
    }

    #[test]
    fn test_stallion_expiry_sweep() {
        let dir = TempDir::new().unwrap();

        {
            let mut store = open_store(&dir);
            store.stallions.create(|listing| listing.expires_at = 1);
            store
                .stallions
                .create(|listing| listing.expires_at = u64::max_value());
            store.flush().unwrap();
        }

        // Reopening sweeps the listing that expired long ago.
        let store = open_store(&dir);
        assert_eq!(store.stallions.len(), 1);
    }

    #[test]
    fn test_create_character_seeds_horse_and_binds_user() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        let user_uid = store.users.create(|user| user.name = "bob".to_string());

        let character_uid = create_character(
            &mut store,
            user_uid,
            "Bob",
            CharacterParts {
                char_id: 10,
                mouth_id: 1,
                face_id: 2,
            },
            CharacterShape::default(),
            20002,
        );

        let bound = store
            .users
            .immutable(user_uid, |user| user.character_uid)
            .unwrap();
        assert_eq!(bound, character_uid);

        let (mount_uid, gender) = store
            .characters
            .immutable(character_uid, |character| {
                (character.mount_uid, character.gender)
            })
            .unwrap();
        assert_eq!(gender, 1);
        assert!(store.horses.contains(mount_uid));

        assert!(!character_name_free(&store, "Bob"));
        assert!(character_name_free(&store, "Carol"));
    }

    #[test]
    fn test_active_mute() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        store.infractions.create(|infraction| {
            infraction.character_uid = 7;
            infraction.punishment = Punishment::Mute;
            infraction.expires_at = timestamp_secs() + 3600;
            infraction.reason = "spam".to_string();
        });

        assert_eq!(store.active_mute(7, timestamp_secs()), Some("spam".to_string()));
        assert_eq!(store.active_mute(8, timestamp_secs()), None);
        // Expired mutes no longer apply.
        assert_eq!(store.active_mute(7, timestamp_secs() + 7200), None);
    }
}
