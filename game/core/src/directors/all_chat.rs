//! The all-chat director: the global broadcast channel. Entry is OTP-gated;
//! every message runs through the chat system before it reaches the channel.

use crate::chat::{ChatSystem, ChatVerdict};
use crate::data::SharedStore;
use crate::otp::{identity_hash, Destination, SharedOtp};
use crate::protocol::chatter::*;
use bridle::dispatch::{CommandConduit, CommandConduitExt, CommandRegistry};
use bridle::shared::ClientId;
use hashbrown::HashMap;
use stirrup::logging;
use stirrup::Uid;

struct ChatClient {
    character_uid: Uid,
    authenticated: bool,
}

pub struct AllChatDirector {
    store: SharedStore,
    otp: SharedOtp,
    chat: ChatSystem,

    clients: HashMap<ClientId, ChatClient>,

    log: logging::Logger,
}

impl AllChatDirector {
    pub fn new(store: SharedStore, otp: SharedOtp, log: &logging::Logger) -> AllChatDirector {
        AllChatDirector {
            chat: ChatSystem::new(store.clone()),
            store,
            otp,
            clients: HashMap::new(),
            log: log.new(logging::o!("director" => "all-chat")),
        }
    }

    pub fn registry(log: &logging::Logger) -> CommandRegistry<AllChatDirector> {
        let mut registry = CommandRegistry::new(log);

        registry.register::<ChatEnterRoom, _>(|d: &mut AllChatDirector, net, client, cmd| {
            d.handle_enter_room(net, client, cmd)
        });
        registry.register::<Chat, _>(|d: &mut AllChatDirector, net, client, cmd| {
            d.handle_chat(net, client, cmd)
        });
        registry.register::<InputState, _>(|d: &mut AllChatDirector, net, client, cmd| {
            d.handle_input_state(net, client, cmd)
        });
        registry.register::<ChatHeartbeat, _>(|_, _, _, _| {});

        registry
    }

    pub fn on_client_connected(&mut self, client: ClientId) {
        self.clients.insert(
            client,
            ChatClient {
                character_uid: 0,
                authenticated: false,
            },
        );
    }

    pub fn on_client_disconnected(&mut self, client: ClientId) {
        self.clients.remove(&client);
    }

    pub fn tick(&mut self, _net: &mut dyn CommandConduit) {}

    pub fn handle_enter_room(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: ChatEnterRoom,
    ) {
        let authorized = self.otp.authorize_code(
            identity_hash(cmd.character_uid, Destination::AllChat),
            cmd.code,
        );

        if !authorized {
            logging::warn!(self.log, "chat entry failed authorisation";
                           "client_id" => client,
                           "character_uid" => cmd.character_uid);
            net.queue_command(client, || ChatEnterRoomAckCancel {
                error: ChatterError::LoginFailed,
            });
            net.disconnect_after_flush(client);
            return;
        }

        if let Some(context) = self.clients.get_mut(&client) {
            context.character_uid = cmd.character_uid;
            context.authenticated = true;
        }

        net.queue_command(client, || ChatEnterRoomAckOk {
            participants: vec![
                RoomParticipant {
                    uid: 0,
                    name: "All".to_string(),
                },
                RoomParticipant {
                    uid: 1,
                    name: "Guild".to_string(),
                },
            ],
        });

        logging::info!(self.log, "client entered all-chat";
                       "client_id" => client,
                       "character_uid" => cmd.character_uid);
    }

    pub fn handle_chat(&mut self, net: &mut dyn CommandConduit, client: ClientId, cmd: Chat) {
        let character_uid = match self.clients.get(&client) {
            Some(context) if context.authenticated => context.character_uid,
            _ => return,
        };

        match self.chat.process(character_uid, &cmd.message) {
            ChatVerdict::Broadcast => {
                let author = {
                    let store = self.store.lock().expect("Record store lock poisoned");
                    store
                        .characters
                        .immutable(character_uid, |c| c.name.clone())
                        .unwrap_or_default()
                };

                let recipients: Vec<ClientId> = self
                    .clients
                    .iter()
                    .filter(|(_, context)| context.authenticated)
                    .map(|(&id, _)| id)
                    .collect();

                for recipient in recipients {
                    let author = author.clone();
                    let message = cmd.message.clone();
                    let role = cmd.role;
                    net.queue_command(recipient, move || ChannelChatTrs {
                        author,
                        message,
                        role,
                    });
                }
            }
            ChatVerdict::Muted(line) => {
                self.send_system_line(net, client, line);
            }
            ChatVerdict::Command(lines) => {
                for line in lines {
                    self.send_system_line(net, client, line);
                }
            }
        }
    }

    fn send_system_line(&self, net: &mut dyn CommandConduit, client: ClientId, line: String) {
        net.queue_command(client, move || ChannelChatTrs {
            author: String::new(),
            message: line,
            role: ChatRole::GameMaster,
        });
    }

    pub fn handle_input_state(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: InputState,
    ) {
        let character_uid = match self.clients.get(&client) {
            Some(context) if context.authenticated => context.character_uid,
            _ => return,
        };

        let friends: Vec<Uid> = {
            let store = self.store.lock().expect("Record store lock poisoned");
            store
                .characters
                .immutable(character_uid, |c| c.friends.clone())
                .unwrap_or_default()
        };

        let recipients: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|(_, context)| {
                context.authenticated && friends.contains(&context.character_uid)
            })
            .map(|(&id, _)| id)
            .collect();

        for recipient in recipients {
            let state = cmd.state;
            net.queue_command(recipient, move || InputStateTrs {
                character_uid,
                state,
            });
        }
    }
}
