//! Game semantics for the dedicated server: configuration, the persistent
//! record store, the command payload definitions for every subserver
//! protocol, the shared systems (OTP registry, room registry, chat system,
//! authentication service, presence board), and the six directors that sit
//! on top of the protocol engine.

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]

pub mod auth;
pub mod chat;
pub mod config;
pub mod data;
pub mod directors;
pub mod instance;
pub mod otp;
pub mod presence;
pub mod protocol;
pub mod rooms;
