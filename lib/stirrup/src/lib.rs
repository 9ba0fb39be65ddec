#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod logging;
pub mod time;

/// Uid assigned to persistent game records (users, characters, horses, items, mails).
pub type Uid = u32;

/// The zero uid is never assigned to a record.
pub const INVALID_UID: Uid = 0;
