//! The room registry shared by the lobby (create/queue) and the race server
//! (presence and the race state machine). A room member is either *queued*
//! (granted entry, race connection pending) or *present* (connected to the
//! race server); the capacity invariant covers both sets.

use crate::protocol::lobby::{RoomRejectReason, RoomSummary};
use hashbrown::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use stirrup::Uid;

/// How long a queued entrant may take to show up on the race server.
pub const QUEUE_DEADLINE: Duration = Duration::from_secs(7);

pub const MIN_PLAYERS: u8 = 1;
pub const MAX_PLAYERS: u8 = 8;

#[derive(Debug, Clone, Default)]
pub struct RoomDetails {
    pub name: String,
    pub password: String,
    pub game_mode: u8,
    pub team_mode: u8,
    pub map_block_id: u16,
    pub mission_id: u16,
    pub max_players: u8,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RoomState {
    Waiting,
    Countdown,
    Racing,
    Awards,
}

#[derive(Debug)]
struct QueuedEntrant {
    character_uid: Uid,
    deadline: Instant,
}

#[derive(Debug)]
pub struct Room {
    pub uid: u32,
    pub details: RoomDetails,
    pub state: RoomState,
    // Join order over both sets; the head is the master.
    order: Vec<Uid>,
    queue: Vec<QueuedEntrant>,
    present: Vec<Uid>,
}

impl Room {
    pub fn master(&self) -> Option<Uid> {
        self.order.first().copied()
    }

    pub fn occupancy(&self) -> usize {
        self.order.len()
    }

    pub fn present(&self) -> &[Uid] {
        &self.present
    }

    pub fn is_present(&self, character_uid: Uid) -> bool {
        self.present.contains(&character_uid)
    }

    pub fn is_queued(&self, character_uid: Uid) -> bool {
        self.queue.iter().any(|e| e.character_uid == character_uid)
    }

    fn remove_everywhere(&mut self, character_uid: Uid) {
        self.order.retain(|&uid| uid != character_uid);
        self.queue.retain(|e| e.character_uid != character_uid);
        self.present.retain(|&uid| uid != character_uid);
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            uid: self.uid,
            name: self.details.name.clone(),
            occupants: self.occupancy() as u8,
            max_players: self.details.max_players,
            has_password: !self.details.password.is_empty(),
            game_mode: self.details.game_mode,
            map_block_id: self.details.map_block_id,
            racing: self.state != RoomState::Waiting,
        }
    }
}

/// What happened when a member left.
#[derive(Debug, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// Set when the master changed; names the new master, the oldest
    /// remaining member.
    pub new_master: Option<Uid>,
    /// The room emptied out and was deleted.
    pub room_deleted: bool,
}

pub struct RoomRegistry {
    rooms: HashMap<u32, Room>,
    next_uid: u32,
}

pub type SharedRooms = Arc<Mutex<RoomRegistry>>;

impl RoomRegistry {
    pub fn new() -> RoomRegistry {
        RoomRegistry {
            rooms: HashMap::new(),
            next_uid: 1,
        }
    }

    pub fn into_shared(self) -> SharedRooms {
        Arc::new(Mutex::new(self))
    }

    /// Creates a room with the requesting character as master, queued as the
    /// first pending entrant. The player cap is clamped to the legal range.
    pub fn create(&mut self, mut details: RoomDetails, master: Uid, now: Instant) -> u32 {
        details.max_players = details.max_players.max(MIN_PLAYERS).min(MAX_PLAYERS);

        let uid = self.next_uid;
        self.next_uid += 1;

        self.rooms.insert(
            uid,
            Room {
                uid,
                details,
                state: RoomState::Waiting,
                order: vec![master],
                queue: vec![QueuedEntrant {
                    character_uid: master,
                    deadline: now + QUEUE_DEADLINE,
                }],
                present: Vec::new(),
            },
        );

        uid
    }

    pub fn get(&self, room_uid: u32) -> Option<&Room> {
        self.rooms.get(&room_uid)
    }

    pub fn get_mut(&mut self, room_uid: u32) -> Option<&mut Room> {
        self.rooms.get_mut(&room_uid)
    }

    /// Queues an entrant after validating the room, its password, and the
    /// capacity invariant. A re-queue refreshes the entrant's deadline
    /// without consuming extra capacity.
    pub fn queue_entrant(
        &mut self,
        room_uid: u32,
        character_uid: Uid,
        password: &str,
        now: Instant,
    ) -> Result<(), RoomRejectReason> {
        let room = self
            .rooms
            .get_mut(&room_uid)
            .ok_or(RoomRejectReason::InvalidRoom)?;

        if !room.details.password.is_empty() && room.details.password != password {
            return Err(RoomRejectReason::BadPassword);
        }

        if let Some(entrant) = room
            .queue
            .iter_mut()
            .find(|e| e.character_uid == character_uid)
        {
            entrant.deadline = now + QUEUE_DEADLINE;
            return Ok(());
        }

        if room.occupancy() >= room.details.max_players as usize {
            return Err(RoomRejectReason::CrowdedRoom);
        }

        room.order.push(character_uid);
        room.queue.push(QueuedEntrant {
            character_uid,
            deadline: now + QUEUE_DEADLINE,
        });

        Ok(())
    }

    /// Moves an entrant from the queue into the present set when they show
    /// up on the race server. An un-queued entrant (deadline already hit)
    /// may still enter while capacity lasts.
    pub fn promote(&mut self, room_uid: u32, character_uid: Uid) -> Result<(), RoomRejectReason> {
        let room = self
            .rooms
            .get_mut(&room_uid)
            .ok_or(RoomRejectReason::InvalidRoom)?;

        if room.is_present(character_uid) {
            return Ok(());
        }

        if room.is_queued(character_uid) {
            room.queue.retain(|e| e.character_uid != character_uid);
        } else {
            if room.occupancy() >= room.details.max_players as usize {
                return Err(RoomRejectReason::CrowdedRoom);
            }
            room.order.push(character_uid);
        }

        room.present.push(character_uid);
        Ok(())
    }

    /// Removes a member; empty rooms are deleted, and a departing master
    /// passes ownership to the oldest remaining member.
    pub fn leave(&mut self, room_uid: u32, character_uid: Uid) -> Option<LeaveOutcome> {
        let room = self.rooms.get_mut(&room_uid)?;

        let was_master = room.master() == Some(character_uid);
        let was_member = room.order.contains(&character_uid);
        if !was_member {
            return None;
        }

        room.remove_everywhere(character_uid);

        if room.order.is_empty() && room.queue.is_empty() {
            self.rooms.remove(&room_uid);
            return Some(LeaveOutcome {
                new_master: None,
                room_deleted: true,
            });
        }

        Some(LeaveOutcome {
            new_master: if was_master { room.master() } else { None },
            room_deleted: false,
        })
    }

    /// Drops queued entrants past their deadline, deleting rooms that end up
    /// with nobody. Returns the dequeued pairs for logging.
    pub fn expire_queued(&mut self, now: Instant) -> Vec<(u32, Uid)> {
        let mut expired = Vec::new();

        for (&room_uid, room) in self.rooms.iter_mut() {
            let lapsed: Vec<Uid> = room
                .queue
                .iter()
                .filter(|e| e.deadline <= now)
                .map(|e| e.character_uid)
                .collect();

            for character_uid in lapsed {
                room.remove_everywhere(character_uid);
                expired.push((room_uid, character_uid));
            }
        }

        self.rooms
            .retain(|_, room| !(room.order.is_empty() && room.queue.is_empty()));

        expired
    }

    /// Summaries for the lobby room list, ordered by uid.
    pub fn summaries(&self) -> Vec<RoomSummary> {
        let mut summaries: Vec<RoomSummary> =
            self.rooms.values().map(|room| room.summary()).collect();
        summaries.sort_by_key(|summary| summary.uid);
        summaries
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(max_players: u8) -> RoomDetails {
        RoomDetails {
            name: "A".to_string(),
            max_players,
            ..RoomDetails::default()
        }
    }

    #[test]
    fn test_create_queues_master() {
        let mut rooms = RoomRegistry::new();
        let now = Instant::now();

        let uid = rooms.create(details(4), 7, now);
        let room = rooms.get(uid).unwrap();

        assert_eq!(room.master(), Some(7));
        assert!(room.is_queued(7));
        assert_eq!(room.occupancy(), 1);
    }

    #[test]
    fn test_player_count_clamped() {
        let mut rooms = RoomRegistry::new();
        let now = Instant::now();

        let uid = rooms.create(details(20), 1, now);
        assert_eq!(rooms.get(uid).unwrap().details.max_players, MAX_PLAYERS);

        let uid = rooms.create(details(0), 1, now);
        assert_eq!(rooms.get(uid).unwrap().details.max_players, MIN_PLAYERS);
    }

    #[test]
    fn test_capacity_invariant_over_queue_and_present() {
        let mut rooms = RoomRegistry::new();
        let now = Instant::now();

        let uid = rooms.create(details(2), 1, now);
        rooms.promote(uid, 1).unwrap();

        rooms.queue_entrant(uid, 2, "", now).unwrap();

        // One present, one queued: the room is full.
        assert_eq!(
            rooms.queue_entrant(uid, 3, "", now).unwrap_err(),
            RoomRejectReason::CrowdedRoom
        );

        // And the rejection had no side effects.
        assert_eq!(rooms.get(uid).unwrap().occupancy(), 2);
    }

    #[test]
    fn test_password_checked() {
        let mut rooms = RoomRegistry::new();
        let now = Instant::now();

        let mut guarded = details(4);
        guarded.password = "sesame".to_string();
        let uid = rooms.create(guarded, 1, now);

        assert_eq!(
            rooms.queue_entrant(uid, 2, "wrong", now).unwrap_err(),
            RoomRejectReason::BadPassword
        );
        assert!(rooms.queue_entrant(uid, 2, "sesame", now).is_ok());
    }

    #[test]
    fn test_missing_room_is_invalid() {
        let mut rooms = RoomRegistry::new();

        assert_eq!(
            rooms
                .queue_entrant(999, 1, "", Instant::now())
                .unwrap_err(),
            RoomRejectReason::InvalidRoom
        );
    }

    #[test]
    fn test_queue_timeout_dequeues_and_reopens_capacity() {
        let mut rooms = RoomRegistry::new();
        let now = Instant::now();

        let uid = rooms.create(details(2), 1, now);
        rooms.promote(uid, 1).unwrap();
        rooms.queue_entrant(uid, 2, "", now).unwrap();

        // Entrant 2 never shows up on the race server.
        let later = now + QUEUE_DEADLINE + Duration::from_secs(1);
        let expired = rooms.expire_queued(later);

        assert_eq!(expired, vec![(uid, 2)]);
        assert!(rooms.queue_entrant(uid, 3, "", later).is_ok());
    }

    #[test]
    fn test_expire_deletes_abandoned_room() {
        let mut rooms = RoomRegistry::new();
        let now = Instant::now();

        // Master granted entry but never connects to the race server.
        rooms.create(details(4), 1, now);

        let later = now + QUEUE_DEADLINE + Duration::from_secs(1);
        rooms.expire_queued(later);

        assert_eq!(rooms.len(), 0);
    }

    #[test]
    fn test_master_transfer_to_oldest_member() {
        let mut rooms = RoomRegistry::new();
        let now = Instant::now();

        let uid = rooms.create(details(4), 1, now);
        rooms.promote(uid, 1).unwrap();
        rooms.queue_entrant(uid, 2, "", now).unwrap();
        rooms.promote(uid, 2).unwrap();
        rooms.queue_entrant(uid, 3, "", now).unwrap();
        rooms.promote(uid, 3).unwrap();

        let outcome = rooms.leave(uid, 1).unwrap();

        assert_eq!(outcome.new_master, Some(2));
        assert!(!outcome.room_deleted);

        // A non-master leaving does not move ownership.
        let outcome = rooms.leave(uid, 3).unwrap();
        assert_eq!(outcome.new_master, None);
    }

    #[test]
    fn test_last_leaver_deletes_room() {
        let mut rooms = RoomRegistry::new();
        let now = Instant::now();

        let uid = rooms.create(details(4), 1, now);
        rooms.promote(uid, 1).unwrap();

        let outcome = rooms.leave(uid, 1).unwrap();

        assert!(outcome.room_deleted);
        assert!(rooms.get(uid).is_none());
    }

    #[test]
    fn test_requeue_refreshes_deadline_without_duplicating() {
        let mut rooms = RoomRegistry::new();
        let now = Instant::now();

        let uid = rooms.create(details(2), 1, now);
        rooms.promote(uid, 1).unwrap();

        rooms.queue_entrant(uid, 2, "", now).unwrap();
        let later = now + Duration::from_secs(5);
        rooms.queue_entrant(uid, 2, "", later).unwrap();

        assert_eq!(rooms.get(uid).unwrap().occupancy(), 2);

        // The refreshed deadline outlives the original one.
        let expired = rooms.expire_queued(now + QUEUE_DEADLINE + Duration::from_secs(1));
        assert!(expired.is_empty());
    }

    #[test]
    fn test_summaries_reflect_state() {
        let mut rooms = RoomRegistry::new();
        let now = Instant::now();

        let uid = rooms.create(details(4), 1, now);
        rooms.get_mut(uid).unwrap().state = RoomState::Racing;

        let summaries = rooms.summaries();
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].racing);
        assert_eq!(summaries[0].occupants, 1);
    }
}
