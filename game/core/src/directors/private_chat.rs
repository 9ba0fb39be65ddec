//! The private-chat director: two-party conversations. The room-entry code
//! field carries the target character uid instead of an OTP; messages are
//! delivered to both ends.

use crate::chat::{ChatSystem, ChatVerdict};
use crate::data::SharedStore;
use crate::protocol::chatter::*;
use bridle::dispatch::{CommandConduit, CommandConduitExt, CommandRegistry};
use bridle::shared::ClientId;
use hashbrown::HashMap;
use stirrup::logging;
use stirrup::{Uid, INVALID_UID};

struct Conversation {
    character_uid: Uid,
    target_uid: Uid,
}

pub struct PrivateChatDirector {
    store: SharedStore,
    chat: ChatSystem,

    conversations: HashMap<ClientId, Conversation>,

    log: logging::Logger,
}

impl PrivateChatDirector {
    pub fn new(store: SharedStore, log: &logging::Logger) -> PrivateChatDirector {
        PrivateChatDirector {
            chat: ChatSystem::new(store.clone()),
            store,
            conversations: HashMap::new(),
            log: log.new(logging::o!("director" => "private-chat")),
        }
    }

    pub fn registry(log: &logging::Logger) -> CommandRegistry<PrivateChatDirector> {
        let mut registry = CommandRegistry::new(log);

        registry.register::<ChatEnterRoom, _>(|d: &mut PrivateChatDirector, net, client, cmd| {
            d.handle_enter_room(net, client, cmd)
        });
        registry.register::<Chat, _>(|d: &mut PrivateChatDirector, net, client, cmd| {
            d.handle_chat(net, client, cmd)
        });
        registry.register::<InputState, _>(|d: &mut PrivateChatDirector, net, client, cmd| {
            d.handle_input_state(net, client, cmd)
        });
        registry.register::<ChatHeartbeat, _>(|_, _, _, _| {});

        registry
    }

    pub fn on_client_connected(&mut self, client: ClientId) {
        self.conversations.insert(
            client,
            Conversation {
                character_uid: INVALID_UID,
                target_uid: INVALID_UID,
            },
        );
    }

    pub fn on_client_disconnected(&mut self, client: ClientId) {
        self.conversations.remove(&client);
    }

    pub fn tick(&mut self, _net: &mut dyn CommandConduit) {}

    pub fn handle_enter_room(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: ChatEnterRoom,
    ) {
        // The code field carries the conversation target on this subserver.
        let target_uid = cmd.code;

        let target_name = {
            let store = self.store.lock().expect("Record store lock poisoned");
            store
                .characters
                .immutable(target_uid, |character| character.name.clone())
        };

        let target_name = match target_name {
            Some(name) => name,
            None => {
                logging::warn!(self.log, "private chat target does not exist";
                               "client_id" => client,
                               "target_uid" => target_uid);
                net.queue_command(client, || ChatEnterRoomAckCancel {
                    error: ChatterError::LoginFailed,
                });
                net.disconnect_after_flush(client);
                return;
            }
        };

        if let Some(conversation) = self.conversations.get_mut(&client) {
            conversation.character_uid = cmd.character_uid;
            conversation.target_uid = target_uid;
        }

        let invoker = RoomParticipant {
            uid: cmd.character_uid,
            name: cmd.character_name.clone(),
        };
        let target = RoomParticipant {
            uid: target_uid,
            name: target_name,
        };
        net.queue_command(client, move || ChatEnterRoomAckOk {
            participants: vec![invoker, target],
        });

        logging::debug!(self.log, "private conversation opened";
                        "client_id" => client,
                        "character_uid" => cmd.character_uid,
                        "target_uid" => target_uid);
    }

    pub fn handle_chat(&mut self, net: &mut dyn CommandConduit, client: ClientId, cmd: Chat) {
        let (character_uid, target_uid) = match self.conversations.get(&client) {
            Some(conversation) if conversation.character_uid != INVALID_UID => {
                (conversation.character_uid, conversation.target_uid)
            }
            _ => return,
        };

        match self.chat.process(character_uid, &cmd.message) {
            ChatVerdict::Broadcast => {
                // Echo to the sender, deliver to the target if they have the
                // window open on this server.
                let message = cmd.message.clone();
                net.queue_command(client, move || ChatTrs {
                    sender_uid: character_uid,
                    message,
                });

                if let Some(target_client) = self.client_of(target_uid) {
                    let message = cmd.message.clone();
                    net.queue_command(target_client, move || ChatTrs {
                        sender_uid: character_uid,
                        message,
                    });
                }
            }
            ChatVerdict::Muted(line) => {
                net.queue_command(client, move || ChatTrs {
                    sender_uid: INVALID_UID,
                    message: line,
                });
            }
            ChatVerdict::Command(lines) => {
                for line in lines {
                    net.queue_command(client, move || ChatTrs {
                        sender_uid: INVALID_UID,
                        message: line,
                    });
                }
            }
        }
    }

    pub fn handle_input_state(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: InputState,
    ) {
        let (character_uid, target_uid) = match self.conversations.get(&client) {
            Some(conversation) if conversation.character_uid != INVALID_UID => {
                (conversation.character_uid, conversation.target_uid)
            }
            _ => return,
        };

        if let Some(target_client) = self.client_of(target_uid) {
            let state = cmd.state;
            net.queue_command(target_client, move || InputStateTrs {
                character_uid,
                state,
            });
        }
    }

    /// The connection of a character with an open conversation window.
    fn client_of(&self, character_uid: Uid) -> Option<ClientId> {
        self.conversations
            .iter()
            .find(|(_, conversation)| conversation.character_uid == character_uid)
            .map(|(&client, _)| client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directors::testing::{seed_character, seeded_store, RecordingConduit};
    use crate::protocol::ids;
    use bridle::stream::SourceStream;

    struct Fixture {
        _dir: tempfile::TempDir,
        director: PrivateChatDirector,
        store: SharedStore,
        alice: Uid,
    }

    fn fixture() -> Fixture {
        let (_dir, store, _user, alice, _horse) = seeded_store();
        let director = PrivateChatDirector::new(store.clone(), &logging::discard());

        Fixture {
            _dir,
            director,
            store,
            alice,
        }
    }

    fn open(
        fixture: &mut Fixture,
        net: &mut RecordingConduit,
        client: ClientId,
        invoker: Uid,
        invoker_name: &str,
        target: Uid,
    ) {
        fixture.director.on_client_connected(client);
        fixture.director.handle_enter_room(
            net,
            client,
            ChatEnterRoom {
                code: target,
                character_uid: invoker,
                character_name: invoker_name.to_string(),
                guild_uid: 0,
            },
        );
    }

    #[test]
    fn test_enter_names_both_participants() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;
        let bob = seed_character(&fixture.store, "Bob");

        open(&mut fixture, &mut net, 1, alice, "Alice", bob);

        let frames = net.sent_to(1, ids::CHAT_ENTER_ROOM_ACK_OK);
        assert_eq!(frames.len(), 1);

        let mut stream = SourceStream::new(frames[0]);
        assert_eq!(stream.read_u8().unwrap(), 2);
        assert_eq!(stream.read_u32().unwrap(), alice);
        assert_eq!(stream.read_string().unwrap(), "Alice");
        assert_eq!(stream.read_u32().unwrap(), bob);
        assert_eq!(stream.read_string().unwrap(), "Bob");
    }

    #[test]
    fn test_enter_unknown_target_disconnects() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;

        open(&mut fixture, &mut net, 1, alice, "Alice", 9999);

        assert_eq!(net.count_to(1, ids::CHAT_ENTER_ROOM_ACK_CANCEL), 1);
        assert_eq!(net.disconnects, vec![1]);
    }

    #[test]
    fn test_chat_echoes_and_relays_to_target() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;
        let bob = seed_character(&fixture.store, "Bob");

        open(&mut fixture, &mut net, 1, alice, "Alice", bob);
        open(&mut fixture, &mut net, 2, bob, "Bob", alice);
        net.sent.clear();

        fixture.director.handle_chat(
            &mut net,
            1,
            Chat {
                message: "hi".to_string(),
                role: ChatRole::User,
            },
        );

        // The sender's echo.
        let echo = net.sent_to(1, ids::CHAT_CHAT_TRS);
        assert_eq!(echo.len(), 1);
        let mut stream = SourceStream::new(echo[0]);
        assert_eq!(stream.read_u32().unwrap(), alice);
        assert_eq!(stream.read_string().unwrap(), "hi");

        // The target's copy.
        let copy = net.sent_to(2, ids::CHAT_CHAT_TRS);
        assert_eq!(copy.len(), 1);
        let mut stream = SourceStream::new(copy[0]);
        assert_eq!(stream.read_u32().unwrap(), alice);
        assert_eq!(stream.read_string().unwrap(), "hi");
    }

    #[test]
    fn test_chat_without_target_online_still_echoes() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;
        let bob = seed_character(&fixture.store, "Bob");

        open(&mut fixture, &mut net, 1, alice, "Alice", bob);
        net.sent.clear();

        fixture.director.handle_chat(
            &mut net,
            1,
            Chat {
                message: "you there?".to_string(),
                role: ChatRole::User,
            },
        );

        assert_eq!(net.count_to(1, ids::CHAT_CHAT_TRS), 1);
    }

    #[test]
    fn test_input_state_reaches_target_only() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;
        let bob = seed_character(&fixture.store, "Bob");

        open(&mut fixture, &mut net, 1, alice, "Alice", bob);
        open(&mut fixture, &mut net, 2, bob, "Bob", alice);
        net.sent.clear();

        fixture
            .director
            .handle_input_state(&mut net, 1, InputState { state: 3 });

        assert_eq!(net.count_to(1, ids::CHAT_INPUT_STATE_TRS), 0);
        assert_eq!(net.count_to(2, ids::CHAT_INPUT_STATE_TRS), 1);
    }
}
