//! The lobby director: the login state machine, character bootstrap, room
//! list/create/enter, and the ranch/race/messenger advertisements with their
//! one-time passwords.

use crate::auth::AuthenticationService;
use crate::config::GameConfig;
use crate::data::{self, SharedStore};
use crate::directors::{character_brief, wire_horse, wire_items};
use crate::otp::{identity_hash, Destination, SharedOtp};
use crate::presence::{Location, SharedPresence};
use crate::protocol::common::Heartbeat;
use crate::protocol::lobby::*;
use crate::rooms::{RoomDetails, SharedRooms};
use bridle::dispatch::{CommandConduit, CommandConduitExt, CommandRegistry};
use bridle::shared::ClientId;
use hashbrown::HashMap;
use std::time::Instant;
use stirrup::logging;
use stirrup::{Uid, INVALID_UID};

/// Endpoints and branding the lobby advertises to clients.
#[derive(Clone)]
pub struct LobbySettings {
    pub motd: String,
    pub ranch_address: u32,
    pub ranch_port: u16,
    pub race_address: u32,
    pub race_port: u16,
    pub messenger_address: u32,
    pub messenger_port: u16,
}

impl LobbySettings {
    pub fn from_config(config: &GameConfig) -> LobbySettings {
        let adv = &config.lobby.advertisement;
        LobbySettings {
            motd: config.general.motd.clone(),
            ranch_address: adv.ranch.wire_addr(),
            ranch_port: adv.ranch.port,
            race_address: adv.race.wire_addr(),
            race_port: adv.race.port,
            messenger_address: adv.messenger.wire_addr(),
            messenger_port: adv.messenger.port,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SessionState {
    Connected,
    AwaitingAuth,
    AwaitingCharacterCreate,
    Authenticated,
}

struct Session {
    user_name: String,
    user_uid: Uid,
    character_uid: Uid,
    state: SessionState,
}

pub struct LobbyDirector {
    settings: LobbySettings,
    store: SharedStore,
    auth: AuthenticationService,
    otp: SharedOtp,
    rooms: SharedRooms,
    presence: SharedPresence,

    sessions: HashMap<ClientId, Session>,
    client_by_user: HashMap<String, ClientId>,

    log: logging::Logger,
}

impl LobbyDirector {
    pub fn new(
        settings: LobbySettings,
        store: SharedStore,
        auth: AuthenticationService,
        otp: SharedOtp,
        rooms: SharedRooms,
        presence: SharedPresence,
        log: &logging::Logger,
    ) -> LobbyDirector {
        LobbyDirector {
            settings,
            store,
            auth,
            otp,
            rooms,
            presence,
            sessions: HashMap::new(),
            client_by_user: HashMap::new(),
            log: log.new(logging::o!("director" => "lobby")),
        }
    }

    pub fn registry(log: &logging::Logger) -> CommandRegistry<LobbyDirector> {
        let mut registry = CommandRegistry::new(log);

        registry.register::<Login, _>(|d: &mut LobbyDirector, net, client, cmd| {
            d.handle_login(net, client, cmd)
        });
        registry.register::<Heartbeat, _>(|_, _, _, _| {});
        registry.register::<CreateNickname, _>(|d: &mut LobbyDirector, net, client, cmd| {
            d.handle_create_nickname(net, client, cmd)
        });
        registry.register::<ShowInventory, _>(|d: &mut LobbyDirector, net, client, _| {
            d.handle_show_inventory(net, client)
        });
        registry.register::<EnterChannel, _>(|d: &mut LobbyDirector, net, client, cmd| {
            d.handle_enter_channel(net, client, cmd)
        });
        registry.register::<RoomList, _>(|d: &mut LobbyDirector, net, client, cmd| {
            d.handle_room_list(net, client, cmd)
        });
        registry.register::<MakeRoom, _>(|d: &mut LobbyDirector, net, client, cmd| {
            d.handle_make_room(net, client, cmd)
        });
        registry.register::<EnterRoom, _>(|d: &mut LobbyDirector, net, client, cmd| {
            d.handle_enter_room(net, client, cmd)
        });
        registry.register::<EnterRanch, _>(|d: &mut LobbyDirector, net, client, cmd| {
            d.handle_enter_ranch(net, client, cmd)
        });
        registry.register::<GetMessengerInfo, _>(|d: &mut LobbyDirector, net, client, _| {
            d.handle_get_messenger_info(net, client)
        });

        registry
    }

    pub fn on_client_connected(&mut self, client: ClientId) {
        self.sessions.insert(
            client,
            Session {
                user_name: String::new(),
                user_uid: INVALID_UID,
                character_uid: INVALID_UID,
                state: SessionState::Connected,
            },
        );
    }

    pub fn on_client_disconnected(&mut self, client: ClientId) {
        if let Some(session) = self.sessions.remove(&client) {
            if !session.user_name.is_empty() {
                self.client_by_user.remove(&session.user_name);
            }
            if session.character_uid != INVALID_UID {
                self.presence.mark_offline(session.character_uid);
            }
        }
    }

    /// Lobby tick: verdicts from the auth worker and room-queue expiry.
    pub fn tick(&mut self, net: &mut dyn CommandConduit) {
        if self.auth.has_verdicts() {
            for verdict in self.auth.poll_verdicts() {
                self.finish_login(net, &verdict.user_name, verdict.accepted);
            }
        }

        let expired = {
            let mut rooms = self.rooms.lock().expect("Room registry lock poisoned");
            rooms.expire_queued(Instant::now())
        };
        for (room_uid, character_uid) in expired {
            logging::info!(self.log, "queued entrant timed out";
                           "room_uid" => room_uid,
                           "character_uid" => character_uid);
        }
    }

    pub fn handle_login(&mut self, net: &mut dyn CommandConduit, client: ClientId, cmd: Login) {
        if cmd.constant0 != LOGIN_CONSTANT0 || cmd.constant1 != LOGIN_CONSTANT1 {
            logging::warn!(self.log, "client version mismatch";
                           "client_id" => client,
                           "constant0" => cmd.constant0,
                           "constant1" => cmd.constant1);
            net.queue_command(client, || LoginCancel {
                reason: LoginCancelReason::InvalidVersion,
            });
            net.disconnect_after_flush(client);
            return;
        }

        // A live session under this user name rejects the newcomer; the
        // existing session is left alone.
        if self.client_by_user.contains_key(&cmd.login_id) {
            logging::warn!(self.log, "duplicate login rejected";
                           "client_id" => client,
                           "user" => &cmd.login_id);
            net.queue_command(client, || LoginCancel {
                reason: LoginCancelReason::Duplicated,
            });
            net.disconnect_after_flush(client);
            return;
        }

        let session = match self.sessions.get_mut(&client) {
            Some(session) if session.state == SessionState::Connected => session,
            _ => {
                logging::warn!(self.log, "login out of order"; "client_id" => client);
                net.disconnect(client);
                return;
            }
        };

        session.user_name = cmd.login_id.clone();
        session.state = SessionState::AwaitingAuth;
        self.client_by_user.insert(cmd.login_id.clone(), client);

        self.auth.queue_authentication(&cmd.login_id, &cmd.auth_key);

        logging::info!(self.log, "login queued"; "client_id" => client, "user" => &cmd.login_id);
    }

    /// Continues a login once the auth worker has spoken.
    fn finish_login(&mut self, net: &mut dyn CommandConduit, user_name: &str, accepted: bool) {
        let client = match self.client_by_user.get(user_name) {
            Some(&client) => client,
            // The client gave up while the verdict was pending.
            None => return,
        };

        let session = match self.sessions.get_mut(&client) {
            Some(session) if session.state == SessionState::AwaitingAuth => session,
            _ => return,
        };

        if !accepted {
            logging::info!(self.log, "authentication rejected"; "user" => user_name);
            session.state = SessionState::Connected;
            self.client_by_user.remove(user_name);
            net.queue_command(client, || LoginCancel {
                reason: LoginCancelReason::InvalidUser,
            });
            net.disconnect_after_flush(client);
            return;
        }

        let (user_uid, character_uid) = {
            let store = self.store.lock().expect("Record store lock poisoned");
            match store.user_by_name(user_name) {
                Some(uid) => (
                    uid,
                    store
                        .users
                        .immutable(uid, |user| user.character_uid)
                        .unwrap_or(INVALID_UID),
                ),
                None => (INVALID_UID, INVALID_UID),
            }
        };

        if user_uid == INVALID_UID {
            logging::error!(self.log, "authenticated user has no record"; "user" => user_name);
            net.queue_command(client, || LoginCancel {
                reason: LoginCancelReason::SystemError,
            });
            net.disconnect_after_flush(client);
            return;
        }

        session.user_uid = user_uid;

        let has_character = {
            let store = self.store.lock().expect("Record store lock poisoned");
            character_uid != INVALID_UID && store.characters.contains(character_uid)
        };

        if has_character {
            session.character_uid = character_uid;
            session.state = SessionState::Authenticated;
            self.send_login_ok(net, client, character_uid);

            let name = {
                let store = self.store.lock().expect("Record store lock poisoned");
                store
                    .characters
                    .immutable(character_uid, |c| c.name.clone())
                    .unwrap_or_default()
            };
            self.presence.mark_online(character_uid, &name);

            logging::info!(self.log, "user authenticated";
                           "user" => user_name,
                           "character_uid" => character_uid);
        } else {
            session.state = SessionState::AwaitingCharacterCreate;

            let motd = self.settings.motd.clone();
            let (ranch_address, ranch_port) =
                (self.settings.ranch_address, self.settings.ranch_port);
            net.queue_command(client, move || {
                let mut response = LoginOk::default();
                response.stamp_time();
                response.motd = motd;
                response.ranch_address = ranch_address;
                response.ranch_port = ranch_port;
                response
            });
            net.reset_code(client);
            net.queue_command(client, || CreateNicknameNotify);

            logging::info!(self.log, "user authenticated without character"; "user" => user_name);
        }
    }

    /// Builds and queues the full LoginOK, then resets the scramble code so
    /// the first post-login frame runs on the zero code.
    fn send_login_ok(&self, net: &mut dyn CommandConduit, client: ClientId, character_uid: Uid) {
        let store = self.store.lock().expect("Record store lock poisoned");

        let mut response = LoginOk::default();
        response.stamp_time();
        response.motd = self.settings.motd.clone();
        response.ranch_address = self.settings.ranch_address;
        response.ranch_port = self.settings.ranch_port;
        response.uid = character_uid;

        if let Some(brief) = character_brief(&store, character_uid) {
            response.nickname = brief.name;
            response.gender = brief.gender;
            response.level = brief.level;
            response.character = brief.looks;
            if let Some(horse) = wire_horse(&store, brief.mount_uid) {
                response.horse = horse;
            }
        }

        store
            .characters
            .immutable(character_uid, |character| {
                response.carrots = character.carrots;
                response.character_equipment = wire_items(&store, &character.character_equipment);
                response.horse_equipment = wire_items(&store, &character.horse_equipment);
            });

        drop(store);

        net.queue_command(client, move || response);
        net.reset_code(client);
    }

    pub fn handle_create_nickname(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: CreateNickname,
    ) {
        let session = match self.sessions.get_mut(&client) {
            Some(session) if session.state == SessionState::AwaitingCharacterCreate => session,
            _ => {
                logging::warn!(self.log, "nickname out of order"; "client_id" => client);
                return;
            }
        };

        let name_free = {
            let store = self.store.lock().expect("Record store lock poisoned");
            data::store::character_name_free(&store, &cmd.nickname)
        };

        if !name_free {
            logging::info!(self.log, "nickname unavailable";
                           "client_id" => client,
                           "nickname" => &cmd.nickname);
            // Prompt the client to pick again.
            net.queue_command(client, || CreateNicknameNotify);
            return;
        }

        let user_uid = session.user_uid;
        let character_uid = {
            let mut store = self.store.lock().expect("Record store lock poisoned");
            data::store::create_character(
                &mut store,
                user_uid,
                &cmd.nickname,
                cmd.character.parts(),
                cmd.character.shape(),
                cmd.horse_tid,
            )
        };

        session.character_uid = character_uid;
        session.state = SessionState::Authenticated;

        self.presence.mark_online(character_uid, &cmd.nickname);
        self.send_login_ok(net, client, character_uid);

        logging::info!(self.log, "character created";
                       "client_id" => client,
                       "character_uid" => character_uid,
                       "nickname" => &cmd.nickname);
    }

    pub fn handle_show_inventory(&mut self, net: &mut dyn CommandConduit, client: ClientId) {
        let character_uid = match self.authenticated_character(client) {
            Some(uid) => uid,
            None => {
                net.queue_command(client, || ShowInventoryCancel);
                return;
            }
        };

        let store = self.store.lock().expect("Record store lock poisoned");

        let mut response = ShowInventoryOk::default();
        store.characters.immutable(character_uid, |character| {
            response.items = wire_items(&store, &character.items);
            response.horses = character
                .horses
                .iter()
                .filter_map(|&uid| wire_horse(&store, uid))
                .collect();
        });

        drop(store);
        net.queue_command(client, move || response);
    }

    pub fn handle_enter_channel(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: EnterChannel,
    ) {
        net.queue_command(client, || EnterChannelOk {
            channel: cmd.channel,
        });
    }

    pub fn handle_room_list(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: RoomList,
    ) {
        let rooms = {
            let registry = self.rooms.lock().expect("Room registry lock poisoned");
            registry.summaries()
        };

        net.queue_command(client, move || RoomListOk {
            page: cmd.page,
            rooms,
        });
    }

    pub fn handle_make_room(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: MakeRoom,
    ) {
        let character_uid = match self.authenticated_character(client) {
            Some(uid) => uid,
            None => {
                net.queue_command(client, || MakeRoomCancel {
                    reason: RoomRejectReason::InvalidRoom,
                });
                return;
            }
        };

        let details = RoomDetails {
            name: cmd.name,
            password: cmd.password,
            game_mode: cmd.game_mode,
            team_mode: cmd.team_mode,
            map_block_id: cmd.map_block_id,
            mission_id: cmd.mission_id,
            max_players: cmd.player_count,
        };

        let room_uid = {
            let mut rooms = self.rooms.lock().expect("Room registry lock poisoned");
            rooms.create(details, character_uid, Instant::now())
        };

        let code = self
            .otp
            .grant_code(identity_hash(character_uid, Destination::Race));

        self.presence.set_location(character_uid, Location::Room(room_uid));

        logging::info!(self.log, "room created";
                       "room_uid" => room_uid,
                       "master" => character_uid);

        let (race_address, race_port) = (self.settings.race_address, self.settings.race_port);
        net.queue_command(client, move || MakeRoomOk {
            room_uid,
            one_time_password: code,
            race_address,
            race_port,
        });
    }

    pub fn handle_enter_room(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: EnterRoom,
    ) {
        let character_uid = match self.authenticated_character(client) {
            Some(uid) => uid,
            None => {
                net.queue_command(client, || EnterRoomCancel {
                    reason: RoomRejectReason::InvalidRoom,
                });
                return;
            }
        };

        let queued = {
            let mut rooms = self.rooms.lock().expect("Room registry lock poisoned");
            rooms.queue_entrant(cmd.room_uid, character_uid, &cmd.password, Instant::now())
        };

        match queued {
            Ok(()) => {
                let code = self
                    .otp
                    .grant_code(identity_hash(character_uid, Destination::Race));

                self.presence
                    .set_location(character_uid, Location::Room(cmd.room_uid));

                let room_uid = cmd.room_uid;
                let (race_address, race_port) =
                    (self.settings.race_address, self.settings.race_port);
                net.queue_command(client, move || EnterRoomOk {
                    room_uid,
                    one_time_password: code,
                    race_address,
                    race_port,
                });
            }
            Err(reason) => {
                net.queue_command(client, move || EnterRoomCancel { reason });
            }
        }
    }

    pub fn handle_enter_ranch(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: EnterRanch,
    ) {
        let character_uid = match self.authenticated_character(client) {
            Some(uid) => uid,
            None => {
                net.queue_command(client, || EnterRanchCancel);
                return;
            }
        };

        // Zero means the character's own ranch.
        let rancher_uid = if cmd.rancher_uid == INVALID_UID {
            character_uid
        } else {
            cmd.rancher_uid
        };

        let rancher_exists = {
            let store = self.store.lock().expect("Record store lock poisoned");
            store.characters.contains(rancher_uid)
        };

        if !rancher_exists {
            net.queue_command(client, || EnterRanchCancel);
            return;
        }

        let code = self
            .otp
            .grant_code(identity_hash(character_uid, Destination::Ranch));

        let (ranch_address, ranch_port) = (self.settings.ranch_address, self.settings.ranch_port);
        net.queue_command(client, move || EnterRanchOk {
            rancher_uid,
            one_time_password: code,
            ranch_address,
            ranch_port,
        });
    }

    pub fn handle_get_messenger_info(&mut self, net: &mut dyn CommandConduit, client: ClientId) {
        let character_uid = match self.authenticated_character(client) {
            Some(uid) => uid,
            None => return,
        };

        let code = self
            .otp
            .grant_code(identity_hash(character_uid, Destination::Messenger));

        let (messenger_address, messenger_port) = (
            self.settings.messenger_address,
            self.settings.messenger_port,
        );
        net.queue_command(client, move || GetMessengerInfoOk {
            code,
            messenger_address,
            messenger_port,
        });
    }

    fn authenticated_character(&self, client: ClientId) -> Option<Uid> {
        match self.sessions.get(&client) {
            Some(session) if session.state == SessionState::Authenticated => {
                Some(session.character_uid)
            }
            _ => None,
        }
    }
}
