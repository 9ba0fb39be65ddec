//! The ranch director: who is on whose ranch, the high-frequency snapshot
//! relay, ranch chat (through the chat system), equipment and busy-state
//! notifies, odd jobs, and guild invite plumbing.

use crate::chat::{ChatSystem, ChatVerdict};
use crate::data::SharedStore;
use crate::directors::{character_brief, wire_horse};
use crate::otp::{identity_hash, Destination, SharedOtp};
use crate::presence::{Location, SharedPresence};
use crate::protocol::common::{Heartbeat, InviteUser, InviteUserCancel, InviteUserOk};
use crate::protocol::ranch::*;
use bridle::dispatch::{CommandConduit, CommandConduitExt, CommandRegistry};
use bridle::shared::ClientId;
use hashbrown::HashMap;
use stirrup::logging;
use stirrup::Uid;

struct Visitor {
    client: ClientId,
    character_uid: Uid,
    ranch_index: u16,
    busy_state: u8,
}

/// One live ranch world. Exists while at least one client is inside.
struct RanchInstance {
    rancher_uid: Uid,
    name: String,
    locked: bool,
    visitors: Vec<Visitor>,
    next_index: u16,
}

struct ClientContext {
    character_uid: Uid,
    rancher_uid: Uid,
}

pub struct RanchDirector {
    store: SharedStore,
    otp: SharedOtp,
    presence: SharedPresence,
    chat: ChatSystem,

    ranches: HashMap<Uid, RanchInstance>,
    clients: HashMap<ClientId, ClientContext>,

    log: logging::Logger,
}

impl RanchDirector {
    pub fn new(
        store: SharedStore,
        otp: SharedOtp,
        presence: SharedPresence,
        log: &logging::Logger,
    ) -> RanchDirector {
        RanchDirector {
            chat: ChatSystem::new(store.clone()),
            store,
            otp,
            presence,
            ranches: HashMap::new(),
            clients: HashMap::new(),
            log: log.new(logging::o!("director" => "ranch")),
        }
    }

    pub fn registry(log: &logging::Logger) -> CommandRegistry<RanchDirector> {
        let mut registry = CommandRegistry::new(log);

        registry.register::<RanchEnter, _>(|d: &mut RanchDirector, net, client, cmd| {
            d.handle_enter(net, client, cmd)
        });
        registry.register::<Heartbeat, _>(|_, _, _, _| {});
        registry.register::<RanchLeave, _>(|d: &mut RanchDirector, net, client, _| {
            d.handle_leave(net, client)
        });
        registry.register::<RanchSnapshot, _>(|d: &mut RanchDirector, net, client, cmd| {
            d.handle_snapshot(net, client, cmd)
        });
        registry.register::<RanchChat, _>(|d: &mut RanchDirector, net, client, cmd| {
            d.handle_chat(net, client, cmd)
        });
        registry.register::<UpdateBusyState, _>(|d: &mut RanchDirector, net, client, cmd| {
            d.handle_busy_state(net, client, cmd)
        });
        registry.register::<UpdateEquipment, _>(|d: &mut RanchDirector, net, client, cmd| {
            d.handle_update_equipment(net, client, cmd)
        });
        registry.register::<RanchStuff, _>(|d: &mut RanchDirector, net, client, cmd| {
            d.handle_ranch_stuff(net, client, cmd)
        });
        registry.register::<InviteUser, _>(|d: &mut RanchDirector, net, client, cmd| {
            d.handle_invite_user(net, client, cmd)
        });

        registry
    }

    pub fn on_client_connected(&mut self, _client: ClientId) {}

    pub fn on_client_disconnected(&mut self, net: &mut dyn CommandConduit, client: ClientId) {
        self.remove_visitor(net, client);
    }

    pub fn tick(&mut self, _net: &mut dyn CommandConduit) {}

    pub fn handle_enter(&mut self, net: &mut dyn CommandConduit, client: ClientId, cmd: RanchEnter) {
        let authorized = self.otp.authorize_code(
            identity_hash(cmd.character_uid, Destination::Ranch),
            cmd.one_time_password,
        );

        if !authorized {
            logging::warn!(self.log, "ranch entry failed authorisation";
                           "client_id" => client,
                           "character_uid" => cmd.character_uid);
            net.queue_command(client, || RanchEnterCancel);
            net.disconnect_after_flush(client);
            return;
        }

        // Build or look up the ranch instance from the rancher's record.
        if !self.ranches.contains_key(&cmd.rancher_uid) {
            let meta = {
                let store = self.store.lock().expect("Record store lock poisoned");
                store
                    .characters
                    .immutable(cmd.rancher_uid, |c| (c.ranch.name.clone(), c.ranch.locked))
            };

            let (name, locked) = match meta {
                Some(meta) => meta,
                None => {
                    net.queue_command(client, || RanchEnterCancel);
                    return;
                }
            };

            self.ranches.insert(
                cmd.rancher_uid,
                RanchInstance {
                    rancher_uid: cmd.rancher_uid,
                    name,
                    locked,
                    visitors: Vec::new(),
                    next_index: 1,
                },
            );
        }

        let ranch = self
            .ranches
            .get_mut(&cmd.rancher_uid)
            .expect("Ranch instance just ensured");

        if ranch.locked && cmd.character_uid != ranch.rancher_uid {
            logging::info!(self.log, "locked ranch refused visitor";
                           "rancher_uid" => cmd.rancher_uid,
                           "character_uid" => cmd.character_uid);
            net.queue_command(client, || RanchEnterCancel);
            return;
        }

        // A stable per-entry index tags this visitor's snapshots.
        let ranch_index = ranch.next_index;
        ranch.next_index += 1;

        ranch.visitors.push(Visitor {
            client,
            character_uid: cmd.character_uid,
            ranch_index,
            busy_state: 0,
        });

        self.clients.insert(
            client,
            ClientContext {
                character_uid: cmd.character_uid,
                rancher_uid: cmd.rancher_uid,
            },
        );

        let response = self.build_enter_ok(cmd.rancher_uid);
        net.queue_command(client, move || response);

        // Announce the newcomer to everyone already present.
        if let Some(visitor_wire) = self.build_visitor_wire(cmd.rancher_uid, cmd.character_uid) {
            let ranch = &self.ranches[&cmd.rancher_uid];
            for other in ranch.visitors.iter().filter(|v| v.client != client) {
                let visitor = visitor_wire.clone();
                net.queue_command(other.client, move || RanchEnterNotify { visitor });
            }
        }

        self.presence
            .set_location(cmd.character_uid, Location::Ranch(cmd.rancher_uid));

        logging::info!(self.log, "visitor entered ranch";
                       "client_id" => client,
                       "character_uid" => cmd.character_uid,
                       "rancher_uid" => cmd.rancher_uid,
                       "ranch_index" => ranch_index);
    }

    fn build_enter_ok(&self, rancher_uid: Uid) -> RanchEnterOk {
        let ranch = &self.ranches[&rancher_uid];
        let store = self.store.lock().expect("Record store lock poisoned");

        let mut response = RanchEnterOk {
            rancher_uid,
            ranch_name: ranch.name.clone(),
            horses: Vec::new(),
            visitors: Vec::new(),
        };

        // The rancher's unmounted horses stand around the ranch; indexes
        // count down from the top so they never collide with visitors.
        let mut horse_index = u16::max_value();
        store.characters.immutable(rancher_uid, |rancher| {
            for &horse_uid in rancher.horses.iter().filter(|&&h| h != rancher.mount_uid) {
                if let Some(horse) = wire_horse(&store, horse_uid) {
                    response.horses.push(RanchHorse {
                        ranch_index: horse_index,
                        horse,
                    });
                    horse_index -= 1;
                }
            }
        });

        for visitor in &ranch.visitors {
            if let Some(brief) = character_brief(&store, visitor.character_uid) {
                response.visitors.push(RanchVisitor {
                    character_uid: visitor.character_uid,
                    name: brief.name,
                    gender: brief.gender,
                    ranch_index: visitor.ranch_index,
                    busy_state: visitor.busy_state,
                    character: brief.looks,
                    mount: wire_horse(&store, brief.mount_uid).unwrap_or_default(),
                });
            }
        }

        response
    }

    fn build_visitor_wire(&self, rancher_uid: Uid, character_uid: Uid) -> Option<RanchVisitor> {
        let ranch = self.ranches.get(&rancher_uid)?;
        let visitor = ranch
            .visitors
            .iter()
            .find(|v| v.character_uid == character_uid)?;

        let store = self.store.lock().expect("Record store lock poisoned");
        let brief = character_brief(&store, character_uid)?;

        Some(RanchVisitor {
            character_uid,
            name: brief.name,
            gender: brief.gender,
            ranch_index: visitor.ranch_index,
            busy_state: visitor.busy_state,
            character: brief.looks,
            mount: wire_horse(&store, brief.mount_uid).unwrap_or_default(),
        })
    }

    pub fn handle_leave(&mut self, net: &mut dyn CommandConduit, client: ClientId) {
        self.remove_visitor(net, client);
        net.disconnect_after_flush(client);
    }

    /// The hot path: relay the snapshot verbatim to every other visitor on
    /// the same ranch, tagged with the sender's index. No store access, no
    /// allocation beyond the outbound frame buffers.
    pub fn handle_snapshot(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: RanchSnapshot,
    ) {
        let (rancher_uid, sender_index) = match self.client_ranch(client) {
            Some(found) => found,
            None => return,
        };

        let ranch = &self.ranches[&rancher_uid];
        let snapshot = cmd.snapshot;

        for other in ranch.visitors.iter().filter(|v| v.client != client) {
            let snapshot = snapshot.clone();
            net.queue_command(other.client, move || RanchSnapshotNotify {
                ranch_index: sender_index,
                snapshot,
            });
        }
    }

    pub fn handle_chat(&mut self, net: &mut dyn CommandConduit, client: ClientId, cmd: RanchChat) {
        let context = match self.clients.get(&client) {
            Some(context) => context,
            None => return,
        };
        let character_uid = context.character_uid;
        let rancher_uid = context.rancher_uid;

        match self.chat.process(character_uid, &cmd.message) {
            ChatVerdict::Broadcast => {
                let author = {
                    let store = self.store.lock().expect("Record store lock poisoned");
                    store
                        .characters
                        .immutable(character_uid, |c| c.name.clone())
                        .unwrap_or_default()
                };

                let ranch = &self.ranches[&rancher_uid];
                for visitor in &ranch.visitors {
                    let author = author.clone();
                    let message = cmd.message.clone();
                    net.queue_command(visitor.client, move || RanchChatNotify {
                        author,
                        message,
                        is_system: false,
                    });
                }
            }
            ChatVerdict::Muted(line) => {
                net.queue_command(client, move || RanchChatNotify {
                    author: String::new(),
                    message: line,
                    is_system: true,
                });
            }
            ChatVerdict::Command(lines) => {
                for line in lines {
                    net.queue_command(client, move || RanchChatNotify {
                        author: String::new(),
                        message: line,
                        is_system: true,
                    });
                }
            }
        }
    }

    pub fn handle_busy_state(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: UpdateBusyState,
    ) {
        let (rancher_uid, _) = match self.client_ranch(client) {
            Some(found) => found,
            None => return,
        };

        let ranch = self
            .ranches
            .get_mut(&rancher_uid)
            .expect("Client context names a live ranch");

        let character_uid = match ranch.visitors.iter_mut().find(|v| v.client == client) {
            Some(visitor) => {
                visitor.busy_state = cmd.busy_state;
                visitor.character_uid
            }
            None => return,
        };

        let busy_state = cmd.busy_state;
        for visitor in ranch.visitors.iter().filter(|v| v.client != client) {
            net.queue_command(visitor.client, move || UpdateBusyStateNotify {
                character_uid,
                busy_state,
            });
        }
    }

    pub fn handle_update_equipment(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: UpdateEquipment,
    ) {
        let (rancher_uid, _) = match self.client_ranch(client) {
            Some(found) => found,
            None => return,
        };
        let character_uid = self.clients[&client].character_uid;

        {
            let mut store = self.store.lock().expect("Record store lock poisoned");
            let equipment_uids: Vec<Uid> =
                cmd.character_equipment.iter().map(|item| item.uid).collect();
            store.characters.mutable(character_uid, |character| {
                character.character_equipment = equipment_uids;
            });
        }

        let ranch = &self.ranches[&rancher_uid];
        for visitor in ranch.visitors.iter().filter(|v| v.client != client) {
            let character_equipment = cmd.character_equipment.clone();
            net.queue_command(visitor.client, move || UpdateEquipmentNotify {
                character_uid,
                character_equipment,
            });
        }
    }

    pub fn handle_ranch_stuff(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: RanchStuff,
    ) {
        let context = match self.clients.get(&client) {
            Some(context) => context,
            None => return,
        };

        // Clients report odd-job payouts; negative deltas are nonsense.
        let delta = cmd.value.max(0) as u32;

        let total = {
            let mut store = self.store.lock().expect("Record store lock poisoned");
            store
                .characters
                .mutable(context.character_uid, |character| {
                    character.carrots = character.carrots.saturating_add(delta);
                    character.carrots
                })
        };

        let total_carrots = match total {
            Some(total) => total,
            None => return,
        };

        net.queue_command(client, move || RanchStuffOk {
            event_id: cmd.event_id,
            value: cmd.value,
            total_carrots,
        });
    }

    pub fn handle_invite_user(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: InviteUser,
    ) {
        if !self.clients.contains_key(&client) {
            return;
        }

        let recipient_exists = {
            let store = self.store.lock().expect("Record store lock poisoned");
            store.characters.contains(cmd.recipient_uid)
        };

        let recipient_uid = cmd.recipient_uid;
        let recipient_name = cmd.recipient_name;

        if recipient_exists && self.presence.is_online(recipient_uid) {
            net.queue_command(client, move || InviteUserOk {
                recipient_uid,
                recipient_name,
            });
        } else {
            net.queue_command(client, move || InviteUserCancel {
                recipient_uid,
                recipient_name,
            });
        }
    }

    fn client_ranch(&self, client: ClientId) -> Option<(Uid, u16)> {
        let context = self.clients.get(&client)?;
        let ranch = self.ranches.get(&context.rancher_uid)?;
        let visitor = ranch.visitors.iter().find(|v| v.client == client)?;
        Some((context.rancher_uid, visitor.ranch_index))
    }

    fn remove_visitor(&mut self, net: &mut dyn CommandConduit, client: ClientId) {
        let context = match self.clients.remove(&client) {
            Some(context) => context,
            None => return,
        };

        let empty = match self.ranches.get_mut(&context.rancher_uid) {
            Some(ranch) => {
                ranch.visitors.retain(|v| v.client != client);

                let character_uid = context.character_uid;
                for visitor in &ranch.visitors {
                    net.queue_command(visitor.client, move || RanchLeaveNotify { character_uid });
                }

                ranch.visitors.is_empty()
            }
            None => false,
        };

        if empty {
            self.ranches.remove(&context.rancher_uid);
        }

        self.presence
            .set_location(context.character_uid, Location::Lobby);

        logging::info!(self.log, "visitor left ranch";
                       "client_id" => client,
                       "character_uid" => context.character_uid,
                       "rancher_uid" => context.rancher_uid);
    }
}
