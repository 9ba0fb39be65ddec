//! The central chat system every chat-capable director routes messages
//! through before broadcasting: slash-command recognition (responses go back
//! to the sender only) and mute enforcement from the infraction store.

use crate::data::SharedStore;
use stirrup::time::timestamp_secs;
use stirrup::Uid;

/// What the director should do with a message.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatVerdict {
    /// Deliver the message as usual.
    Broadcast,
    /// The sender is muted; deliver the system line to the sender only.
    Muted(String),
    /// The message was a command; deliver the response lines to the sender
    /// only.
    Command(Vec<String>),
}

pub struct ChatSystem {
    store: SharedStore,
}

impl ChatSystem {
    pub fn new(store: SharedStore) -> ChatSystem {
        ChatSystem { store }
    }

    pub fn process(&self, character_uid: Uid, message: &str) -> ChatVerdict {
        let now = timestamp_secs();

        let mute = {
            let store = self.store.lock().expect("Record store lock poisoned");
            store.active_mute(character_uid, now)
        };

        if let Some(reason) = mute {
            return ChatVerdict::Muted(format!(
                "You are muted and cannot chat. Reason: {}",
                reason
            ));
        }

        if let Some(command_line) = message.strip_prefix('/') {
            return ChatVerdict::Command(self.run_command(command_line));
        }

        ChatVerdict::Broadcast
    }

    fn run_command(&self, command_line: &str) -> Vec<String> {
        let mut parts = command_line.split_whitespace();
        let name = parts.next().unwrap_or("");

        match name {
            "help" => vec![
                "Available commands:".to_string(),
                "/help - this list".to_string(),
                "/roll - roll a d100".to_string(),
            ],
            "roll" => {
                let roll = 1 + rand::random::<u8>() % 100;
                vec![format!("You rolled {}.", roll)]
            }
            _ => vec![format!("Unknown command '/{}'. Try /help.", name)],
        }
    }
}
