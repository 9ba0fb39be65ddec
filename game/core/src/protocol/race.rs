//! Race surface: OTP-gated room entry, the ready/countdown/start flow, the
//! in-race clock and finish reporting, and the awards teardown.

use crate::protocol::ids;
use crate::protocol::types::{WireCharacter, WireHorse};
use crate::protocol::write_seq_u8;
use bridle::shared::ProtocolResult;
use bridle::stream::{Command, SinkStream, SourceStream, WireRead, WireWrite};
use stirrup::Uid;

#[derive(Debug, Clone, Default)]
pub struct RaceEnterRoom {
    pub character_uid: Uid,
    pub one_time_password: u32,
    pub room_uid: u32,
}

impl Command for RaceEnterRoom {
    const ID: u16 = ids::RACE_ENTER_ROOM;
}

impl WireRead for RaceEnterRoom {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(RaceEnterRoom {
            character_uid: stream.read_u32()?,
            one_time_password: stream.read_u32()?,
            room_uid: stream.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct WireRacer {
    pub character_uid: Uid,
    pub name: String,
    pub level: u16,
    pub ready: bool,
    pub is_master: bool,
    pub character: WireCharacter,
    pub mount: WireHorse,
}

impl WireWrite for WireRacer {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.character_uid)?;
        stream.write_string(&self.name)?;
        stream.write_u16(self.level)?;
        stream.write_bool(self.ready)?;
        stream.write_bool(self.is_master)?;
        self.character.write(stream)?;
        self.mount.write(stream)
    }
}

#[derive(Debug, Clone, Default)]
pub struct WireRoomDetails {
    pub name: String,
    pub game_mode: u8,
    pub team_mode: u8,
    pub mission_id: u16,
    pub map_block_id: u16,
    pub max_players: u8,
}

impl WireWrite for WireRoomDetails {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_string(&self.name)?;
        stream.write_u8(self.game_mode)?;
        stream.write_u8(self.team_mode)?;
        stream.write_u16(self.mission_id)?;
        stream.write_u16(self.map_block_id)?;
        stream.write_u8(self.max_players)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RaceEnterRoomOk {
    pub racers: Vec<WireRacer>,
    pub room: WireRoomDetails,
}

impl Command for RaceEnterRoomOk {
    const ID: u16 = ids::RACE_ENTER_ROOM_OK;
}

impl WireWrite for RaceEnterRoomOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        write_seq_u8(stream, &self.racers)?;
        self.room.write(stream)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RaceEnterRoomCancel;

impl Command for RaceEnterRoomCancel {
    const ID: u16 = ids::RACE_ENTER_ROOM_CANCEL;
}

impl WireWrite for RaceEnterRoomCancel {
    fn write(&self, _stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        Ok(())
    }
}

/// Broadcast to the room when a racer joins.
#[derive(Debug, Clone, Default)]
pub struct RaceEnterRoomNotify {
    pub racer: WireRacer,
}

impl Command for RaceEnterRoomNotify {
    const ID: u16 = ids::RACE_ENTER_ROOM_NOTIFY;
}

impl WireWrite for RaceEnterRoomNotify {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        self.racer.write(stream)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ready {
    pub ready: bool,
}

impl Command for Ready {
    const ID: u16 = ids::RACE_READY;
}

impl WireRead for Ready {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(Ready {
            ready: stream.read_bool()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadyNotify {
    pub character_uid: Uid,
    pub ready: bool,
}

impl Command for ReadyNotify {
    const ID: u16 = ids::RACE_READY_NOTIFY;
}

impl WireWrite for ReadyNotify {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.character_uid)?;
        stream.write_bool(self.ready)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LeaveRoom;

impl Command for LeaveRoom {
    const ID: u16 = ids::RACE_LEAVE_ROOM;
}

impl WireRead for LeaveRoom {
    fn read(_stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(LeaveRoom)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LeaveRoomNotify {
    pub character_uid: Uid,
}

impl Command for LeaveRoomNotify {
    const ID: u16 = ids::RACE_LEAVE_ROOM_NOTIFY;
}

impl WireWrite for LeaveRoomNotify {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.character_uid)
    }
}

/// Exactly one of these goes out when the master leaves a non-empty room;
/// it names the oldest remaining member.
#[derive(Debug, Clone, Default)]
pub struct ChangeMasterNotify {
    pub master_uid: Uid,
}

impl Command for ChangeMasterNotify {
    const ID: u16 = ids::RACE_CHANGE_MASTER_NOTIFY;
}

impl WireWrite for ChangeMasterNotify {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.master_uid)
    }
}

/// Which optional fields follow in a room-options change, in field order.
pub mod option_bits {
    pub const NAME: u16 = 1 << 0;
    pub const PLAYER_COUNT: u16 = 1 << 1;
    pub const PASSWORD: u16 = 1 << 2;
    pub const GAME_MODE: u16 = 1 << 3;
    pub const MAP_BLOCK_ID: u16 = 1 << 4;
    pub const NPC_RACE: u16 = 1 << 5;

    pub const ALL: u16 = NAME | PLAYER_COUNT | PASSWORD | GAME_MODE | MAP_BLOCK_ID | NPC_RACE;
}

/// Bitset-controlled union: the bitfield announces which of the fixed set of
/// fields follow, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeRoomOptions {
    pub bits: u16,
    pub name: Option<String>,
    pub player_count: Option<u8>,
    pub password: Option<String>,
    pub game_mode: Option<u8>,
    pub map_block_id: Option<u16>,
    pub npc_race: Option<bool>,
}

impl ChangeRoomOptions {
    fn read_fields(stream: &mut SourceStream<'_>) -> ProtocolResult<ChangeRoomOptions> {
        let bits = stream.read_u16()?;
        let mut options = ChangeRoomOptions {
            bits,
            ..ChangeRoomOptions::default()
        };

        if bits & option_bits::NAME != 0 {
            options.name = Some(stream.read_string()?);
        }
        if bits & option_bits::PLAYER_COUNT != 0 {
            options.player_count = Some(stream.read_u8()?);
        }
        if bits & option_bits::PASSWORD != 0 {
            options.password = Some(stream.read_string()?);
        }
        if bits & option_bits::GAME_MODE != 0 {
            options.game_mode = Some(stream.read_u8()?);
        }
        if bits & option_bits::MAP_BLOCK_ID != 0 {
            options.map_block_id = Some(stream.read_u16()?);
        }
        if bits & option_bits::NPC_RACE != 0 {
            options.npc_race = Some(stream.read_bool()?);
        }

        Ok(options)
    }

    fn write_fields(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u16(self.bits)?;

        if self.bits & option_bits::NAME != 0 {
            stream.write_string(self.name.as_deref().unwrap_or(""))?;
        }
        if self.bits & option_bits::PLAYER_COUNT != 0 {
            stream.write_u8(self.player_count.unwrap_or(0))?;
        }
        if self.bits & option_bits::PASSWORD != 0 {
            stream.write_string(self.password.as_deref().unwrap_or(""))?;
        }
        if self.bits & option_bits::GAME_MODE != 0 {
            stream.write_u8(self.game_mode.unwrap_or(0))?;
        }
        if self.bits & option_bits::MAP_BLOCK_ID != 0 {
            stream.write_u16(self.map_block_id.unwrap_or(0))?;
        }
        if self.bits & option_bits::NPC_RACE != 0 {
            stream.write_bool(self.npc_race.unwrap_or(false))?;
        }

        Ok(())
    }

    /// Bits outside the known set; the director logs and discards those.
    pub fn unknown_bits(&self) -> u16 {
        self.bits & !option_bits::ALL
    }
}

impl Command for ChangeRoomOptions {
    const ID: u16 = ids::RACE_CHANGE_ROOM_OPTIONS;
}

impl WireRead for ChangeRoomOptions {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        ChangeRoomOptions::read_fields(stream)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangeRoomOptionsNotify {
    pub options: ChangeRoomOptions,
}

impl Command for ChangeRoomOptionsNotify {
    const ID: u16 = ids::RACE_CHANGE_ROOM_OPTIONS_NOTIFY;
}

impl WireWrite for ChangeRoomOptionsNotify {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        self.options.write_fields(stream)
    }
}

/// The master starts the race without waiting for everyone to ready up.
#[derive(Debug, Clone, Default)]
pub struct StartRace;

impl Command for StartRace {
    const ID: u16 = ids::RACE_START;
}

impl WireRead for StartRace {
    fn read(_stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(StartRace)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoomCountdown {
    pub countdown_ms: u32,
}

impl Command for RoomCountdown {
    const ID: u16 = ids::RACE_ROOM_COUNTDOWN;
}

impl WireWrite for RoomCountdown {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.countdown_ms)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoomCountdownCancel;

impl Command for RoomCountdownCancel {
    const ID: u16 = ids::RACE_ROOM_COUNTDOWN_CANCEL;
}

impl WireWrite for RoomCountdownCancel {
    fn write(&self, _stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaceLane {
    pub character_uid: Uid,
    pub lane: u8,
}

impl WireWrite for RaceLane {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.character_uid)?;
        stream.write_u8(self.lane)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StartRaceNotify {
    pub map_block_id: u16,
    pub mission_id: u16,
    /// P2P relay endpoint the clients mesh through during the race.
    pub relay_address: u32,
    pub relay_port: u16,
    pub lanes: Vec<RaceLane>,
}

impl Command for StartRaceNotify {
    const ID: u16 = ids::RACE_START_NOTIFY;
}

impl WireWrite for StartRaceNotify {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u16(self.map_block_id)?;
        stream.write_u16(self.mission_id)?;
        stream.write_u32(self.relay_address)?;
        stream.write_u16(self.relay_port)?;
        write_seq_u8(stream, &self.lanes)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadingComplete;

impl Command for LoadingComplete {
    const ID: u16 = ids::RACE_LOADING_COMPLETE;
}

impl WireRead for LoadingComplete {
    fn read(_stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(LoadingComplete)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadingCompleteNotify {
    pub character_uid: Uid,
}

impl Command for LoadingCompleteNotify {
    const ID: u16 = ids::RACE_LOADING_COMPLETE_NOTIFY;
}

impl WireWrite for LoadingCompleteNotify {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.character_uid)
    }
}

/// Clock sync probe; answered with the server's race clock.
#[derive(Debug, Clone, Default)]
pub struct UserRaceTimer {
    pub client_timestamp: u64,
}

impl Command for UserRaceTimer {
    const ID: u16 = ids::RACE_USER_TIMER;
}

impl WireRead for UserRaceTimer {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(UserRaceTimer {
            client_timestamp: stream.read_u64()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserRaceTimerOk {
    pub client_timestamp: u64,
    pub race_clock_ms: u64,
}

impl Command for UserRaceTimerOk {
    const ID: u16 = ids::RACE_USER_TIMER_OK;
}

impl WireWrite for UserRaceTimerOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u64(self.client_timestamp)?;
        stream.write_u64(self.race_clock_ms)
    }
}

/// A racer's own finish line report.
#[derive(Debug, Clone, Default)]
pub struct UserRaceFinal {
    pub course_time_ms: u32,
}

impl Command for UserRaceFinal {
    const ID: u16 = ids::RACE_USER_FINAL;
}

impl WireRead for UserRaceFinal {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(UserRaceFinal {
            course_time_ms: stream.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserRaceFinalNotify {
    pub character_uid: Uid,
    pub course_time_ms: u32,
}

impl Command for UserRaceFinalNotify {
    const ID: u16 = ids::RACE_USER_FINAL_NOTIFY;
}

impl WireWrite for UserRaceFinalNotify {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.character_uid)?;
        stream.write_u32(self.course_time_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaceResult {
    pub character_uid: Uid,
    pub placing: u8,
    pub course_time_ms: u32,
    pub experience: u32,
    pub carrots: u32,
    pub bonus: u32,
}

impl WireWrite for RaceResult {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.character_uid)?;
        stream.write_u8(self.placing)?;
        stream.write_u32(self.course_time_ms)?;
        stream.write_u32(self.experience)?;
        stream.write_u32(self.carrots)?;
        stream.write_u32(self.bonus)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RaceResultNotify {
    pub results: Vec<RaceResult>,
}

impl Command for RaceResultNotify {
    const ID: u16 = ids::RACE_RESULT_NOTIFY;
}

impl WireWrite for RaceResultNotify {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        write_seq_u8(stream, &self.results)
    }
}

/// Client acknowledgement that the award screen is done.
#[derive(Debug, Clone, Default)]
pub struct AwardEnd;

impl Command for AwardEnd {
    const ID: u16 = ids::RACE_AWARD_END;
}

impl WireRead for AwardEnd {
    fn read(_stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(AwardEnd)
    }
}
