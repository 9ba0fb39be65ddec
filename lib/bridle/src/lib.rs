//! The protocol engine for the dedicated server: sink/source byte streams,
//! the message-magic codec, both XOR scrambling schemes, per-connection
//! channels and the mio host that pumps them, and the typed command dispatch
//! that subservers build their directors on.

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod buffer;
pub mod channel;
pub mod dispatch;
pub mod host;
pub mod magic;
pub mod scramble;
pub mod shared;
pub mod stream;
