//! The race director: OTP-gated room entry, then the room+race state
//! machine. Inbound handlers only mark intent (ready flags, finishes, the
//! master's start request); the 50 Hz tick observes the marks and drives
//! Waiting, Countdown, Racing and Awards.

use crate::data::SharedStore;
use crate::directors::{character_brief, wire_horse};
use crate::otp::{identity_hash, Destination, SharedOtp};
use crate::presence::{Location, SharedPresence};
use crate::protocol::common::Heartbeat;
use crate::protocol::race::*;
use crate::rooms::{RoomState, SharedRooms};
use bridle::dispatch::{CommandConduit, CommandConduitExt, CommandRegistry};
use bridle::shared::ClientId;
use hashbrown::{HashMap, HashSet};
use std::time::{Duration, Instant};
use stirrup::logging;
use stirrup::Uid;

const COUNTDOWN: Duration = Duration::from_secs(3);
const RACE_TIME_LIMIT: Duration = Duration::from_secs(180);
const AWARDS_TIMEOUT: Duration = Duration::from_secs(30);

struct RaceClient {
    character_uid: Uid,
    room_uid: u32,
}

/// Per-room race bookkeeping; the room registry holds membership and state.
#[derive(Default)]
struct RaceContext {
    ready: HashSet<Uid>,
    loaded: HashSet<Uid>,
    finished: HashMap<Uid, u32>,
    awards_done: HashSet<Uid>,
    start_requested: bool,
    abort_countdown: bool,
    countdown_deadline: Option<Instant>,
    race_started_at: Option<Instant>,
    awards_deadline: Option<Instant>,
}

/// Endpoints the race server hands to starting racers.
#[derive(Clone)]
pub struct RaceSettings {
    pub relay_address: u32,
    pub relay_port: u16,
}

pub struct RaceDirector {
    settings: RaceSettings,
    store: SharedStore,
    otp: SharedOtp,
    rooms: SharedRooms,
    presence: SharedPresence,

    clients: HashMap<ClientId, RaceClient>,
    client_by_character: HashMap<Uid, ClientId>,
    races: HashMap<u32, RaceContext>,

    log: logging::Logger,
}

impl RaceDirector {
    pub fn new(
        settings: RaceSettings,
        store: SharedStore,
        otp: SharedOtp,
        rooms: SharedRooms,
        presence: SharedPresence,
        log: &logging::Logger,
    ) -> RaceDirector {
        RaceDirector {
            settings,
            store,
            otp,
            rooms,
            presence,
            clients: HashMap::new(),
            client_by_character: HashMap::new(),
            races: HashMap::new(),
            log: log.new(logging::o!("director" => "race")),
        }
    }

    pub fn registry(log: &logging::Logger) -> CommandRegistry<RaceDirector> {
        let mut registry = CommandRegistry::new(log);

        registry.register::<RaceEnterRoom, _>(|d: &mut RaceDirector, net, client, cmd| {
            d.handle_enter_room(net, client, cmd)
        });
        registry.register::<Heartbeat, _>(|_, _, _, _| {});
        registry.register::<Ready, _>(|d: &mut RaceDirector, net, client, cmd| {
            d.handle_ready(net, client, cmd)
        });
        registry.register::<StartRace, _>(|d: &mut RaceDirector, net, client, _| {
            d.handle_start_race(net, client)
        });
        registry.register::<LeaveRoom, _>(|d: &mut RaceDirector, net, client, _| {
            d.handle_leave_room(net, client)
        });
        registry.register::<ChangeRoomOptions, _>(|d: &mut RaceDirector, net, client, cmd| {
            d.handle_change_room_options(net, client, cmd)
        });
        registry.register::<LoadingComplete, _>(|d: &mut RaceDirector, net, client, _| {
            d.handle_loading_complete(net, client)
        });
        registry.register::<UserRaceTimer, _>(|d: &mut RaceDirector, net, client, cmd| {
            d.handle_race_timer(net, client, cmd)
        });
        registry.register::<UserRaceFinal, _>(|d: &mut RaceDirector, net, client, cmd| {
            d.handle_race_final(net, client, cmd)
        });
        registry.register::<AwardEnd, _>(|d: &mut RaceDirector, net, client, _| {
            d.handle_award_end(net, client)
        });

        registry
    }

    pub fn on_client_connected(&mut self, _client: ClientId) {}

    pub fn on_client_disconnected(&mut self, net: &mut dyn CommandConduit, client: ClientId) {
        self.remove_racer(net, client);
    }

    pub fn handle_enter_room(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: RaceEnterRoom,
    ) {
        let authorized = self.otp.authorize_code(
            identity_hash(cmd.character_uid, Destination::Race),
            cmd.one_time_password,
        );

        if !authorized {
            logging::warn!(self.log, "race entry failed authorisation";
                           "client_id" => client,
                           "character_uid" => cmd.character_uid);
            net.queue_command(client, || RaceEnterRoomCancel);
            net.disconnect_after_flush(client);
            return;
        }

        let promoted = {
            let mut rooms = self.rooms.lock().expect("Room registry lock poisoned");
            rooms.promote(cmd.room_uid, cmd.character_uid)
        };

        if let Err(reason) = promoted {
            logging::info!(self.log, "race entry rejected";
                           "client_id" => client,
                           "room_uid" => cmd.room_uid,
                           "reason" => ?reason);
            net.queue_command(client, || RaceEnterRoomCancel);
            net.disconnect_after_flush(client);
            return;
        }

        self.clients.insert(
            client,
            RaceClient {
                character_uid: cmd.character_uid,
                room_uid: cmd.room_uid,
            },
        );
        self.client_by_character.insert(cmd.character_uid, client);
        self.races.entry(cmd.room_uid).or_insert_with(RaceContext::default);

        self.presence
            .set_location(cmd.character_uid, Location::Room(cmd.room_uid));

        // Tell the room about the newcomer, then the newcomer about the room.
        if let Some(racer) = self.build_racer(cmd.room_uid, cmd.character_uid) {
            for other in self.room_clients(cmd.room_uid) {
                if other != client {
                    let racer = racer.clone();
                    net.queue_command(other, move || RaceEnterRoomNotify { racer });
                }
            }
        }

        let response = self.build_enter_ok(cmd.room_uid);
        net.queue_command(client, move || response);

        logging::info!(self.log, "racer entered room";
                       "client_id" => client,
                       "character_uid" => cmd.character_uid,
                       "room_uid" => cmd.room_uid);
    }

    fn build_racer(&self, room_uid: u32, character_uid: Uid) -> Option<WireRacer> {
        let master = {
            let rooms = self.rooms.lock().expect("Room registry lock poisoned");
            rooms.get(room_uid)?.master()
        };

        let store = self.store.lock().expect("Record store lock poisoned");
        let brief = character_brief(&store, character_uid)?;
        let ready = self
            .races
            .get(&room_uid)
            .map(|race| race.ready.contains(&character_uid))
            .unwrap_or(false);

        Some(WireRacer {
            character_uid,
            name: brief.name,
            level: brief.level,
            ready,
            is_master: master == Some(character_uid),
            character: brief.looks,
            mount: wire_horse(&store, brief.mount_uid).unwrap_or_default(),
        })
    }

    fn build_enter_ok(&self, room_uid: u32) -> RaceEnterRoomOk {
        let mut response = RaceEnterRoomOk::default();

        let present: Vec<Uid> = {
            let rooms = self.rooms.lock().expect("Room registry lock poisoned");
            match rooms.get(room_uid) {
                Some(room) => {
                    response.room = WireRoomDetails {
                        name: room.details.name.clone(),
                        game_mode: room.details.game_mode,
                        team_mode: room.details.team_mode,
                        mission_id: room.details.mission_id,
                        map_block_id: room.details.map_block_id,
                        max_players: room.details.max_players,
                    };
                    room.present().to_vec()
                }
                None => return response,
            }
        };

        response.racers = present
            .into_iter()
            .filter_map(|uid| self.build_racer(room_uid, uid))
            .collect();

        response
    }

    pub fn handle_ready(&mut self, net: &mut dyn CommandConduit, client: ClientId, cmd: Ready) {
        let (room_uid, character_uid) = match self.client_room(client) {
            Some(found) => found,
            None => return,
        };

        let in_countdown = self.room_state(room_uid) == Some(RoomState::Countdown);

        if let Some(race) = self.races.get_mut(&room_uid) {
            if cmd.ready {
                race.ready.insert(character_uid);
            } else {
                race.ready.remove(&character_uid);
                // Retracting during the countdown aborts it on the next tick.
                if in_countdown {
                    race.abort_countdown = true;
                }
            }
        }

        let ready = cmd.ready;
        for other in self.room_clients(room_uid) {
            net.queue_command(other, move || ReadyNotify {
                character_uid,
                ready,
            });
        }
    }

    pub fn handle_start_race(&mut self, _net: &mut dyn CommandConduit, client: ClientId) {
        let (room_uid, character_uid) = match self.client_room(client) {
            Some(found) => found,
            None => return,
        };

        let is_master = {
            let rooms = self.rooms.lock().expect("Room registry lock poisoned");
            rooms
                .get(room_uid)
                .map(|room| room.master() == Some(character_uid))
                .unwrap_or(false)
        };

        if !is_master {
            logging::warn!(self.log, "non-master start request ignored";
                           "client_id" => client,
                           "room_uid" => room_uid);
            return;
        }

        if let Some(race) = self.races.get_mut(&room_uid) {
            race.start_requested = true;
        }
    }

    pub fn handle_change_room_options(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: ChangeRoomOptions,
    ) {
        let (room_uid, character_uid) = match self.client_room(client) {
            Some(found) => found,
            None => return,
        };

        if cmd.unknown_bits() != 0 {
            logging::warn!(self.log, "room options carry unknown bits, discarding";
                           "client_id" => client,
                           "bits" => cmd.bits);
            return;
        }

        {
            let mut rooms = self.rooms.lock().expect("Room registry lock poisoned");
            let room = match rooms.get_mut(room_uid) {
                Some(room) => room,
                None => return,
            };

            if room.master() != Some(character_uid) {
                return;
            }

            if let Some(ref name) = cmd.name {
                room.details.name = name.clone();
            }
            if let Some(count) = cmd.player_count {
                room.details.max_players =
                    count.max(crate::rooms::MIN_PLAYERS).min(crate::rooms::MAX_PLAYERS);
            }
            if let Some(ref password) = cmd.password {
                room.details.password = password.clone();
            }
            if let Some(mode) = cmd.game_mode {
                room.details.game_mode = mode;
            }
            if let Some(map) = cmd.map_block_id {
                room.details.map_block_id = map;
            }
        }

        for other in self.room_clients(room_uid) {
            let options = cmd.clone();
            net.queue_command(other, move || ChangeRoomOptionsNotify { options });
        }
    }

    pub fn handle_loading_complete(&mut self, net: &mut dyn CommandConduit, client: ClientId) {
        let (room_uid, character_uid) = match self.client_room(client) {
            Some(found) => found,
            None => return,
        };

        if let Some(race) = self.races.get_mut(&room_uid) {
            race.loaded.insert(character_uid);
        }

        // Echoed to the whole room, sender included.
        for other in self.room_clients(room_uid) {
            net.queue_command(other, move || LoadingCompleteNotify { character_uid });
        }
    }

    pub fn handle_race_timer(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: UserRaceTimer,
    ) {
        let (room_uid, _) = match self.client_room(client) {
            Some(found) => found,
            None => return,
        };

        let race_clock_ms = self
            .races
            .get(&room_uid)
            .and_then(|race| race.race_started_at)
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or(0);

        net.queue_command(client, move || UserRaceTimerOk {
            client_timestamp: cmd.client_timestamp,
            race_clock_ms,
        });
    }

    pub fn handle_race_final(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: UserRaceFinal,
    ) {
        let (room_uid, character_uid) = match self.client_room(client) {
            Some(found) => found,
            None => return,
        };

        let first_report = match self.races.get_mut(&room_uid) {
            Some(race) => race
                .finished
                .insert(character_uid, cmd.course_time_ms)
                .is_none(),
            None => return,
        };

        if !first_report {
            return;
        }

        let course_time_ms = cmd.course_time_ms;
        for other in self.room_clients(room_uid) {
            net.queue_command(other, move || UserRaceFinalNotify {
                character_uid,
                course_time_ms,
            });
        }
    }

    pub fn handle_award_end(&mut self, _net: &mut dyn CommandConduit, client: ClientId) {
        let (room_uid, character_uid) = match self.client_room(client) {
            Some(found) => found,
            None => return,
        };

        if let Some(race) = self.races.get_mut(&room_uid) {
            race.awards_done.insert(character_uid);
        }
    }

    pub fn handle_leave_room(&mut self, net: &mut dyn CommandConduit, client: ClientId) {
        self.remove_racer(net, client);
        net.disconnect_after_flush(client);
    }

    /// All state transitions live here, driven by the 50 Hz tick.
    pub fn tick(&mut self, net: &mut dyn CommandConduit) {
        let now = Instant::now();
        let room_uids: Vec<u32> = self.races.keys().copied().collect();

        for room_uid in room_uids {
            match self.room_state(room_uid) {
                Some(RoomState::Waiting) => self.tick_waiting(net, room_uid, now),
                Some(RoomState::Countdown) => self.tick_countdown(net, room_uid, now),
                Some(RoomState::Racing) => self.tick_racing(net, room_uid, now),
                Some(RoomState::Awards) => self.tick_awards(net, room_uid, now),
                None => {
                    self.races.remove(&room_uid);
                }
            }
        }
    }

    fn tick_waiting(&mut self, net: &mut dyn CommandConduit, room_uid: u32, now: Instant) {
        let (present, occupancy) = {
            let rooms = self.rooms.lock().expect("Room registry lock poisoned");
            match rooms.get(room_uid) {
                Some(room) => (room.present().to_vec(), room.occupancy()),
                None => return,
            }
        };

        if present.is_empty() {
            return;
        }

        let race = match self.races.get_mut(&room_uid) {
            Some(race) => race,
            None => return,
        };

        // Everyone connected and ready, or the master forced the start.
        let all_ready =
            present.len() == occupancy && present.iter().all(|uid| race.ready.contains(uid));

        if !(all_ready || race.start_requested) {
            return;
        }

        race.start_requested = false;
        race.abort_countdown = false;
        race.countdown_deadline = Some(now + COUNTDOWN);

        self.set_room_state(room_uid, RoomState::Countdown);

        let countdown_ms = COUNTDOWN.as_millis() as u32;
        for client in self.room_clients(room_uid) {
            net.queue_command(client, move || RoomCountdown { countdown_ms });
        }

        logging::info!(self.log, "room countdown started"; "room_uid" => room_uid);
    }

    fn tick_countdown(&mut self, net: &mut dyn CommandConduit, room_uid: u32, now: Instant) {
        let race = match self.races.get_mut(&room_uid) {
            Some(race) => race,
            None => return,
        };

        if race.abort_countdown {
            race.abort_countdown = false;
            race.countdown_deadline = None;

            self.set_room_state(room_uid, RoomState::Waiting);

            for client in self.room_clients(room_uid) {
                net.queue_command(client, || RoomCountdownCancel);
            }

            logging::info!(self.log, "room countdown aborted"; "room_uid" => room_uid);
            return;
        }

        let deadline_hit = race
            .countdown_deadline
            .map(|deadline| now >= deadline)
            .unwrap_or(false);
        if !deadline_hit {
            return;
        }

        race.countdown_deadline = None;
        race.race_started_at = Some(now);
        race.loaded.clear();
        race.finished.clear();
        race.awards_done.clear();

        self.set_room_state(room_uid, RoomState::Racing);

        let (present, map_block_id, mission_id) = {
            let rooms = self.rooms.lock().expect("Room registry lock poisoned");
            match rooms.get(room_uid) {
                Some(room) => (
                    room.present().to_vec(),
                    room.details.map_block_id,
                    room.details.mission_id,
                ),
                None => return,
            }
        };

        let lanes: Vec<RaceLane> = present
            .iter()
            .enumerate()
            .map(|(lane, &character_uid)| RaceLane {
                character_uid,
                lane: lane as u8,
            })
            .collect();

        let (relay_address, relay_port) = (self.settings.relay_address, self.settings.relay_port);
        for client in self.room_clients(room_uid) {
            let lanes = lanes.clone();
            net.queue_command(client, move || StartRaceNotify {
                map_block_id,
                mission_id,
                relay_address,
                relay_port,
                lanes,
            });
        }

        logging::info!(self.log, "race started";
                       "room_uid" => room_uid,
                       "racers" => present.len());
    }

    fn tick_racing(&mut self, net: &mut dyn CommandConduit, room_uid: u32, now: Instant) {
        let present: Vec<Uid> = {
            let rooms = self.rooms.lock().expect("Room registry lock poisoned");
            match rooms.get(room_uid) {
                Some(room) => room.present().to_vec(),
                None => return,
            }
        };

        let (all_finished, timed_out) = match self.races.get(&room_uid) {
            Some(race) => (
                !present.is_empty()
                    && present.iter().all(|uid| race.finished.contains_key(uid)),
                race.race_started_at
                    .map(|started| now.duration_since(started) >= RACE_TIME_LIMIT)
                    .unwrap_or(false),
            ),
            None => return,
        };

        if !(all_finished || timed_out) {
            return;
        }

        let results = self.compute_results(room_uid, &present);
        self.apply_awards(&results);

        if let Some(race) = self.races.get_mut(&room_uid) {
            race.awards_deadline = Some(now + AWARDS_TIMEOUT);
            race.race_started_at = None;
        }

        self.set_room_state(room_uid, RoomState::Awards);

        for client in self.room_clients(room_uid) {
            let results = results.clone();
            net.queue_command(client, move || RaceResultNotify { results });
        }

        logging::info!(self.log, "race finished"; "room_uid" => room_uid);
    }

    fn tick_awards(&mut self, _net: &mut dyn CommandConduit, room_uid: u32, now: Instant) {
        let present: Vec<Uid> = {
            let rooms = self.rooms.lock().expect("Room registry lock poisoned");
            match rooms.get(room_uid) {
                Some(room) => room.present().to_vec(),
                None => return,
            }
        };

        let done = match self.races.get(&room_uid) {
            Some(race) => {
                let all_done = present
                    .iter()
                    .all(|uid| race.awards_done.contains(uid));
                let timed_out = race
                    .awards_deadline
                    .map(|deadline| now >= deadline)
                    .unwrap_or(false);
                all_done || timed_out
            }
            None => return,
        };

        if !done {
            return;
        }

        // The race is torn down; the room survives in Waiting for another
        // round and the lobby's room list shows it as joinable again.
        if let Some(race) = self.races.get_mut(&room_uid) {
            race.ready.clear();
            race.loaded.clear();
            race.finished.clear();
            race.awards_done.clear();
            race.awards_deadline = None;
        }

        self.set_room_state(room_uid, RoomState::Waiting);

        logging::info!(self.log, "race torn down"; "room_uid" => room_uid);
    }

    fn compute_results(&self, room_uid: u32, present: &[Uid]) -> Vec<RaceResult> {
        let race = match self.races.get(&room_uid) {
            Some(race) => race,
            None => return Vec::new(),
        };

        let limit_ms = RACE_TIME_LIMIT.as_millis() as u32;

        let mut results: Vec<RaceResult> = present
            .iter()
            .map(|&character_uid| RaceResult {
                character_uid,
                placing: 0,
                course_time_ms: race
                    .finished
                    .get(&character_uid)
                    .copied()
                    .unwrap_or(limit_ms),
                experience: 0,
                carrots: 0,
                bonus: 0,
            })
            .collect();

        results.sort_by_key(|result| result.course_time_ms);

        for (idx, result) in results.iter_mut().enumerate() {
            result.placing = (idx + 1) as u8;
            result.experience = match result.placing {
                1 => 300,
                2 => 200,
                3 => 150,
                _ => 100,
            };
            result.carrots = match result.placing {
                1 => 50,
                2 => 30,
                3 => 20,
                _ => 10,
            };
        }

        results
    }

    fn apply_awards(&self, results: &[RaceResult]) {
        let mut store = self.store.lock().expect("Record store lock poisoned");

        for result in results {
            store.characters.mutable(result.character_uid, |character| {
                character.carrots = character.carrots.saturating_add(result.carrots);
            });
        }
    }

    fn remove_racer(&mut self, net: &mut dyn CommandConduit, client: ClientId) {
        let racer = match self.clients.remove(&client) {
            Some(racer) => racer,
            None => return,
        };
        self.client_by_character.remove(&racer.character_uid);

        let outcome = {
            let mut rooms = self.rooms.lock().expect("Room registry lock poisoned");
            rooms.leave(racer.room_uid, racer.character_uid)
        };

        if let Some(race) = self.races.get_mut(&racer.room_uid) {
            race.ready.remove(&racer.character_uid);
            race.loaded.remove(&racer.character_uid);
            race.finished.remove(&racer.character_uid);
            race.awards_done.remove(&racer.character_uid);
        }

        let character_uid = racer.character_uid;
        for other in self.room_clients(racer.room_uid) {
            net.queue_command(other, move || LeaveRoomNotify { character_uid });
        }

        if let Some(outcome) = outcome {
            if outcome.room_deleted {
                self.races.remove(&racer.room_uid);
            } else if let Some(master_uid) = outcome.new_master {
                for other in self.room_clients(racer.room_uid) {
                    net.queue_command(other, move || ChangeMasterNotify { master_uid });
                }
                logging::info!(self.log, "room master changed";
                               "room_uid" => racer.room_uid,
                               "master_uid" => master_uid);
            }
        }

        self.presence
            .set_location(racer.character_uid, Location::Lobby);
    }

    fn client_room(&self, client: ClientId) -> Option<(u32, Uid)> {
        self.clients
            .get(&client)
            .map(|racer| (racer.room_uid, racer.character_uid))
    }

    fn room_state(&self, room_uid: u32) -> Option<RoomState> {
        let rooms = self.rooms.lock().expect("Room registry lock poisoned");
        rooms.get(room_uid).map(|room| room.state)
    }

    fn set_room_state(&self, room_uid: u32, state: RoomState) {
        let mut rooms = self.rooms.lock().expect("Room registry lock poisoned");
        if let Some(room) = rooms.get_mut(room_uid) {
            room.state = state;
        }
    }

    /// Connected clients of the room's present members.
    fn room_clients(&self, room_uid: u32) -> Vec<ClientId> {
        let rooms = self.rooms.lock().expect("Room registry lock poisoned");
        match rooms.get(room_uid) {
            Some(room) => room
                .present()
                .iter()
                .filter_map(|uid| self.client_by_character.get(uid).copied())
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directors::testing::{seed_character, seeded_store, RecordingConduit};
    use crate::otp::OtpRegistry;
    use crate::presence::PresenceBoard;
    use crate::protocol::ids;
    use crate::rooms::{RoomDetails, RoomRegistry};

    struct Fixture {
        _dir: tempfile::TempDir,
        director: RaceDirector,
        store: SharedStore,
        otp: SharedOtp,
        rooms: SharedRooms,
        alice: Uid,
    }

    fn fixture() -> Fixture {
        let (_dir, store, _user, alice, _horse) = seeded_store();
        let otp = OtpRegistry::new().into_shared();
        let rooms = RoomRegistry::new().into_shared();
        let presence = PresenceBoard::new().into_shared();

        let director = RaceDirector::new(
            RaceSettings {
                relay_address: 0x0100_007F,
                relay_port: 10032,
            },
            store.clone(),
            otp.clone(),
            rooms.clone(),
            presence,
            &logging::discard(),
        );

        Fixture {
            _dir,
            director,
            store,
            otp,
            rooms,
            alice,
        }
    }

    fn make_room(fixture: &Fixture, master: Uid, max_players: u8) -> u32 {
        let mut rooms = fixture.rooms.lock().unwrap();
        rooms.create(
            RoomDetails {
                name: "A".to_string(),
                max_players,
                map_block_id: 11,
                mission_id: 301,
                ..RoomDetails::default()
            },
            master,
            Instant::now(),
        )
    }

    fn enter(
        fixture: &mut Fixture,
        net: &mut RecordingConduit,
        client: ClientId,
        character_uid: Uid,
        room_uid: u32,
    ) {
        let code = fixture
            .otp
            .grant_code(identity_hash(character_uid, Destination::Race));

        fixture.director.handle_enter_room(
            net,
            client,
            RaceEnterRoom {
                character_uid,
                one_time_password: code,
                room_uid,
            },
        );
    }

    #[test]
    fn test_enter_with_otp_as_master() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;

        let room_uid = make_room(&fixture, alice, 4);
        enter(&mut fixture, &mut net, 1, alice, room_uid);

        assert_eq!(net.count_to(1, ids::RACE_ENTER_ROOM_OK), 1);
        assert!(net.disconnects.is_empty());

        let rooms = fixture.rooms.lock().unwrap();
        assert!(rooms.get(room_uid).unwrap().is_present(alice));
    }

    #[test]
    fn test_enter_with_bad_otp_disconnects() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;

        let room_uid = make_room(&fixture, alice, 4);
        fixture.director.handle_enter_room(
            &mut net,
            1,
            RaceEnterRoom {
                character_uid: alice,
                one_time_password: 1,
                room_uid,
            },
        );

        assert_eq!(net.count_to(1, ids::RACE_ENTER_ROOM_CANCEL), 1);
        assert_eq!(net.disconnects, vec![1]);
    }

    #[test]
    fn test_otp_is_single_use_across_reconnects() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;

        let room_uid = make_room(&fixture, alice, 4);
        let code = fixture
            .otp
            .grant_code(identity_hash(alice, Destination::Race));

        fixture.director.handle_enter_room(
            &mut net,
            1,
            RaceEnterRoom {
                character_uid: alice,
                one_time_password: code,
                room_uid,
            },
        );
        assert_eq!(net.count_to(1, ids::RACE_ENTER_ROOM_OK), 1);

        // Replaying the consumed code fails.
        fixture.director.handle_enter_room(
            &mut net,
            2,
            RaceEnterRoom {
                character_uid: alice,
                one_time_password: code,
                room_uid,
            },
        );
        assert_eq!(net.count_to(2, ids::RACE_ENTER_ROOM_CANCEL), 1);
    }

    fn run_countdown_to_start(fixture: &mut Fixture, net: &mut RecordingConduit, room_uid: u32) {
        // Drive the countdown deadline into the past, then tick again.
        fixture.director.tick(net);
        if let Some(race) = fixture.director.races.get_mut(&room_uid) {
            if let Some(deadline) = race.countdown_deadline {
                race.countdown_deadline = Some(deadline - COUNTDOWN - Duration::from_secs(1));
            }
        }
        fixture.director.tick(net);
    }

    #[test]
    fn test_all_ready_starts_countdown_then_race() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;
        let bob = seed_character(&fixture.store, "Bob");

        let room_uid = make_room(&fixture, alice, 4);
        {
            let mut rooms = fixture.rooms.lock().unwrap();
            rooms.queue_entrant(room_uid, bob, "", Instant::now()).unwrap();
        }

        enter(&mut fixture, &mut net, 1, alice, room_uid);
        enter(&mut fixture, &mut net, 2, bob, room_uid);

        fixture.director.handle_ready(&mut net, 1, Ready { ready: true });
        fixture.director.tick(&mut net);
        // Not everyone is ready yet.
        assert_eq!(net.count_to(1, ids::RACE_ROOM_COUNTDOWN), 0);

        fixture.director.handle_ready(&mut net, 2, Ready { ready: true });
        fixture.director.tick(&mut net);

        assert_eq!(net.count_to(1, ids::RACE_ROOM_COUNTDOWN), 1);
        assert_eq!(net.count_to(2, ids::RACE_ROOM_COUNTDOWN), 1);
        assert_eq!(
            fixture.rooms.lock().unwrap().get(room_uid).unwrap().state,
            RoomState::Countdown
        );

        run_countdown_to_start(&mut fixture, &mut net, room_uid);

        assert_eq!(net.count_to(1, ids::RACE_START_NOTIFY), 1);
        assert_eq!(net.count_to(2, ids::RACE_START_NOTIFY), 1);
        assert_eq!(
            fixture.rooms.lock().unwrap().get(room_uid).unwrap().state,
            RoomState::Racing
        );
    }

    #[test]
    fn test_ready_retraction_aborts_countdown() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;

        let room_uid = make_room(&fixture, alice, 4);
        enter(&mut fixture, &mut net, 1, alice, room_uid);

        fixture.director.handle_ready(&mut net, 1, Ready { ready: true });
        fixture.director.tick(&mut net);
        assert_eq!(net.count_to(1, ids::RACE_ROOM_COUNTDOWN), 1);

        fixture.director.handle_ready(&mut net, 1, Ready { ready: false });
        fixture.director.tick(&mut net);

        assert_eq!(net.count_to(1, ids::RACE_ROOM_COUNTDOWN_CANCEL), 1);
        assert_eq!(
            fixture.rooms.lock().unwrap().get(room_uid).unwrap().state,
            RoomState::Waiting
        );
    }

    #[test]
    fn test_race_to_awards_and_teardown() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;
        let bob = seed_character(&fixture.store, "Bob");

        let room_uid = make_room(&fixture, alice, 4);
        {
            let mut rooms = fixture.rooms.lock().unwrap();
            rooms.queue_entrant(room_uid, bob, "", Instant::now()).unwrap();
        }
        enter(&mut fixture, &mut net, 1, alice, room_uid);
        enter(&mut fixture, &mut net, 2, bob, room_uid);

        fixture.director.handle_ready(&mut net, 1, Ready { ready: true });
        fixture.director.handle_ready(&mut net, 2, Ready { ready: true });
        fixture.director.tick(&mut net);
        run_countdown_to_start(&mut fixture, &mut net, room_uid);

        // Loading echoes to everyone.
        fixture.director.handle_loading_complete(&mut net, 1);
        assert_eq!(net.count_to(1, ids::RACE_LOADING_COMPLETE_NOTIFY), 1);
        assert_eq!(net.count_to(2, ids::RACE_LOADING_COMPLETE_NOTIFY), 1);

        // The timer answers with the race clock.
        fixture
            .director
            .handle_race_timer(&mut net, 1, UserRaceTimer { client_timestamp: 7 });
        assert_eq!(net.count_to(1, ids::RACE_USER_TIMER_OK), 1);

        // Bob finishes first.
        fixture
            .director
            .handle_race_final(&mut net, 2, UserRaceFinal { course_time_ms: 61_000 });
        fixture
            .director
            .handle_race_final(&mut net, 1, UserRaceFinal { course_time_ms: 65_000 });
        fixture.director.tick(&mut net);

        let frames = net.sent_to(1, ids::RACE_RESULT_NOTIFY);
        assert_eq!(frames.len(), 1);
        let mut stream = bridle::stream::SourceStream::new(frames[0]);
        let count = stream.read_u8().unwrap();
        assert_eq!(count, 2);
        let first_uid = stream.read_u32().unwrap();
        let first_place = stream.read_u8().unwrap();
        assert_eq!(first_uid, bob);
        assert_eq!(first_place, 1);

        // Carrot awards hit the records.
        let carrots = fixture
            .store
            .lock()
            .unwrap()
            .characters
            .immutable(alice, |c| c.carrots)
            .unwrap();
        assert_eq!(carrots, 1030);

        // Both confirm the award screen; the room returns to Waiting.
        fixture.director.handle_award_end(&mut net, 1);
        fixture.director.handle_award_end(&mut net, 2);
        fixture.director.tick(&mut net);

        assert_eq!(
            fixture.rooms.lock().unwrap().get(room_uid).unwrap().state,
            RoomState::Waiting
        );
    }

    #[test]
    fn test_master_leave_transfers_ownership_with_one_notify() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;
        let bob = seed_character(&fixture.store, "Bob");

        let room_uid = make_room(&fixture, alice, 4);
        {
            let mut rooms = fixture.rooms.lock().unwrap();
            rooms.queue_entrant(room_uid, bob, "", Instant::now()).unwrap();
        }
        enter(&mut fixture, &mut net, 1, alice, room_uid);
        enter(&mut fixture, &mut net, 2, bob, room_uid);
        net.sent.clear();

        fixture.director.handle_leave_room(&mut net, 1);

        let frames = net.sent_to(2, ids::RACE_CHANGE_MASTER_NOTIFY);
        assert_eq!(frames.len(), 1);
        let mut stream = bridle::stream::SourceStream::new(frames[0]);
        assert_eq!(stream.read_u32().unwrap(), bob);
    }

    #[test]
    fn test_room_options_applied_and_broadcast() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;

        let room_uid = make_room(&fixture, alice, 4);
        enter(&mut fixture, &mut net, 1, alice, room_uid);
        net.sent.clear();

        fixture.director.handle_change_room_options(
            &mut net,
            1,
            ChangeRoomOptions {
                bits: option_bits::NAME | option_bits::PLAYER_COUNT,
                name: Some("B".to_string()),
                player_count: Some(20),
                ..ChangeRoomOptions::default()
            },
        );

        assert_eq!(net.count_to(1, ids::RACE_CHANGE_ROOM_OPTIONS_NOTIFY), 1);
        let rooms = fixture.rooms.lock().unwrap();
        let room = rooms.get(room_uid).unwrap();
        assert_eq!(room.details.name, "B");
        // Clamped to the legal maximum.
        assert_eq!(room.details.max_players, 8);
    }

    #[test]
    fn test_unknown_option_bits_discarded() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;

        let room_uid = make_room(&fixture, alice, 4);
        enter(&mut fixture, &mut net, 1, alice, room_uid);
        net.sent.clear();

        fixture.director.handle_change_room_options(
            &mut net,
            1,
            ChangeRoomOptions {
                bits: 1 << 12,
                ..ChangeRoomOptions::default()
            },
        );

        assert_eq!(net.count_to(1, ids::RACE_CHANGE_ROOM_OPTIONS_NOTIFY), 0);
        assert!(net.disconnects.is_empty());
    }
}
