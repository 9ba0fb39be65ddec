//! The six directors: the single-threaded authoritative cores of the
//! subservers. Each owns its per-client state, registers typed handlers
//! into a `CommandRegistry`, and talks back through the `CommandConduit`
//! its subserver loop hands it.

pub mod all_chat;
pub mod lobby;
pub mod messenger;
pub mod private_chat;
pub mod race;
pub mod ranch;

use crate::data::DataStore;
use crate::protocol::types::{WireCharacter, WireHorse, WireItem};
use bridle::dispatch::CommandConduit;
use bridle::shared::ClientId;
use stirrup::Uid;

/// The uniform face a subserver loop drives: connectivity callbacks plus the
/// fixed-rate tick. Inbound frames go through the `CommandRegistry` instead.
pub trait Director {
    fn on_client_connected(&mut self, net: &mut dyn CommandConduit, client: ClientId);
    fn on_client_disconnected(&mut self, net: &mut dyn CommandConduit, client: ClientId);
    fn tick(&mut self, net: &mut dyn CommandConduit);
}

impl Director for lobby::LobbyDirector {
    fn on_client_connected(&mut self, _net: &mut dyn CommandConduit, client: ClientId) {
        lobby::LobbyDirector::on_client_connected(self, client);
    }

    fn on_client_disconnected(&mut self, _net: &mut dyn CommandConduit, client: ClientId) {
        lobby::LobbyDirector::on_client_disconnected(self, client);
    }

    fn tick(&mut self, net: &mut dyn CommandConduit) {
        lobby::LobbyDirector::tick(self, net);
    }
}

impl Director for ranch::RanchDirector {
    fn on_client_connected(&mut self, _net: &mut dyn CommandConduit, client: ClientId) {
        ranch::RanchDirector::on_client_connected(self, client);
    }

    fn on_client_disconnected(&mut self, net: &mut dyn CommandConduit, client: ClientId) {
        ranch::RanchDirector::on_client_disconnected(self, net, client);
    }

    fn tick(&mut self, net: &mut dyn CommandConduit) {
        ranch::RanchDirector::tick(self, net);
    }
}

impl Director for race::RaceDirector {
    fn on_client_connected(&mut self, _net: &mut dyn CommandConduit, client: ClientId) {
        race::RaceDirector::on_client_connected(self, client);
    }

    fn on_client_disconnected(&mut self, net: &mut dyn CommandConduit, client: ClientId) {
        race::RaceDirector::on_client_disconnected(self, net, client);
    }

    fn tick(&mut self, net: &mut dyn CommandConduit) {
        race::RaceDirector::tick(self, net);
    }
}

impl Director for all_chat::AllChatDirector {
    fn on_client_connected(&mut self, _net: &mut dyn CommandConduit, client: ClientId) {
        all_chat::AllChatDirector::on_client_connected(self, client);
    }

    fn on_client_disconnected(&mut self, _net: &mut dyn CommandConduit, client: ClientId) {
        all_chat::AllChatDirector::on_client_disconnected(self, client);
    }

    fn tick(&mut self, net: &mut dyn CommandConduit) {
        all_chat::AllChatDirector::tick(self, net);
    }
}

impl Director for private_chat::PrivateChatDirector {
    fn on_client_connected(&mut self, _net: &mut dyn CommandConduit, client: ClientId) {
        private_chat::PrivateChatDirector::on_client_connected(self, client);
    }

    fn on_client_disconnected(&mut self, _net: &mut dyn CommandConduit, client: ClientId) {
        private_chat::PrivateChatDirector::on_client_disconnected(self, client);
    }

    fn tick(&mut self, net: &mut dyn CommandConduit) {
        private_chat::PrivateChatDirector::tick(self, net);
    }
}

impl Director for messenger::MessengerDirector {
    fn on_client_connected(&mut self, _net: &mut dyn CommandConduit, client: ClientId) {
        messenger::MessengerDirector::on_client_connected(self, client);
    }

    fn on_client_disconnected(&mut self, _net: &mut dyn CommandConduit, client: ClientId) {
        messenger::MessengerDirector::on_client_disconnected(self, client);
    }

    fn tick(&mut self, net: &mut dyn CommandConduit) {
        messenger::MessengerDirector::tick(self, net);
    }
}

/// Builds the wire horse for a record uid, if the record exists.
pub(crate) fn wire_horse(store: &DataStore, horse_uid: Uid) -> Option<WireHorse> {
    store.horses.immutable(horse_uid, WireHorse::from_record)
}

/// Builds the wire items for a list of item uids, skipping dangling refs.
pub(crate) fn wire_items(store: &DataStore, item_uids: &[Uid]) -> Vec<WireItem> {
    item_uids
        .iter()
        .filter_map(|&uid| store.items.immutable(uid, WireItem::from_record))
        .collect()
}

/// Character name, looks, level and mount in one read.
pub(crate) struct CharacterBrief {
    pub name: String,
    pub gender: u8,
    pub level: u16,
    pub mount_uid: Uid,
    pub looks: WireCharacter,
}

pub(crate) fn character_brief(store: &DataStore, character_uid: Uid) -> Option<CharacterBrief> {
    store.characters.immutable(character_uid, |character| CharacterBrief {
        name: character.name.clone(),
        gender: character.gender,
        level: character.level,
        mount_uid: character.mount_uid,
        looks: WireCharacter::from_record(character),
    })
}
