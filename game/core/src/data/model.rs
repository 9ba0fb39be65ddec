use serde_derive::{Deserialize, Serialize};
use stirrup::Uid;

/// A persisted record kind. The kind string names the record directory.
pub trait Record: Default + Clone + serde::Serialize + serde::de::DeserializeOwned {
    const KIND: &'static str;

    fn uid(&self) -> Uid;
    fn set_uid(&mut self, uid: Uid);
}

macro_rules! record_kind {
    ($type:ty, $kind:expr) => {
        impl Record for $type {
            const KIND: &'static str = $kind;

            #[inline]
            fn uid(&self) -> Uid {
                self.uid
            }

            #[inline]
            fn set_uid(&mut self, uid: Uid) {
                self.uid = uid;
            }
        }
    };
}

/// An account. Credentials are checked by the authentication service; the
/// record binds the account to at most one character.
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct User {
    pub uid: Uid,
    pub name: String,
    pub token: String,
    pub character_uid: Uid,
}

record_kind!(User, "users");

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct CharacterParts {
    pub char_id: u8,
    pub mouth_id: u8,
    pub face_id: u8,
}

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct CharacterShape {
    pub head_size: u8,
    pub height: u8,
    pub thigh_volume: u8,
    pub leg_volume: u8,
}

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Mailbox {
    pub inbox: Vec<Uid>,
    pub sent: Vec<Uid>,
    pub has_new_mail: bool,
}

/// Per-character ranch metadata. The ranch world instance is ephemeral; only
/// the name and the door lock persist.
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct RanchMeta {
    pub name: String,
    pub locked: bool,
}

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Character {
    pub uid: Uid,
    pub name: String,
    /// 0 unspecified, 1 boy, 2 girl.
    pub gender: u8,
    pub level: u16,
    pub carrots: u32,
    pub parts: CharacterParts,
    pub shape: CharacterShape,
    pub mount_uid: Uid,
    pub horses: Vec<Uid>,
    pub items: Vec<Uid>,
    pub character_equipment: Vec<Uid>,
    pub horse_equipment: Vec<Uid>,
    pub ranch: RanchMeta,
    pub mailbox: Mailbox,
    pub guild_uid: Uid,
    pub friends: Vec<Uid>,
}

record_kind!(Character, "characters");

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct HorseParts {
    pub skin_id: u8,
    pub mane_id: u8,
    pub tail_id: u8,
    pub face_id: u8,
}

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct HorseShape {
    pub scale: u8,
    pub leg_length: u8,
    pub leg_volume: u8,
    pub body_length: u8,
    pub body_volume: u8,
}

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct HorseStats {
    pub agility: u16,
    pub spirit: u16,
    pub speed: u16,
    pub strength: u16,
    pub ambition: u16,
}

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Horse {
    pub uid: Uid,
    /// Breed template id from the content tables.
    pub tid: u32,
    pub name: String,
    pub parts: HorseParts,
    pub shape: HorseShape,
    pub stats: HorseStats,
    pub grade: u8,
    pub growth_points: u8,
}

record_kind!(Horse, "horses");

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Item {
    pub uid: Uid,
    pub tid: u32,
    pub count: u32,
}

record_kind!(Item, "items");

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Mail {
    pub uid: Uid,
    pub sender: String,
    pub recipient: String,
    /// Formatted timestamp shown by the client as-is.
    pub date: String,
    pub body: String,
    pub unread: bool,
}

record_kind!(Mail, "mails");

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Guild {
    pub uid: Uid,
    pub name: String,
    pub members: Vec<Uid>,
}

record_kind!(Guild, "guilds");

/// A stallion offered on the breeding market. Listings expire; expired files
/// are swept on startup.
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct StallionListing {
    pub uid: Uid,
    pub horse_uid: Uid,
    pub expires_at: u64,
}

record_kind!(StallionListing, "stallions");

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Punishment {
    Mute,
    Ban,
}

impl Default for Punishment {
    fn default() -> Punishment {
        Punishment::Mute
    }
}

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Infraction {
    pub uid: Uid,
    pub character_uid: Uid,
    pub punishment: Punishment,
    pub expires_at: u64,
    pub reason: String,
}

record_kind!(Infraction, "infractions");
