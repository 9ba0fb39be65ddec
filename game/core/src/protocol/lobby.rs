//! Lobby surface: login and character bootstrap, inventory, room
//! list/create/enter, and the ranch/messenger advertisements.

use crate::protocol::ids;
use crate::protocol::types::{WireCharacter, WireHorse, WireItem};
use crate::protocol::write_seq_u8;
use bridle::shared::ProtocolResult;
use bridle::stream::{Command, SinkStream, SourceStream, WireRead, WireWrite};
use stirrup::time::WinFileTime;
use stirrup::Uid;

/// Client version gate carried in every login.
pub const LOGIN_CONSTANT0: u16 = 50;
pub const LOGIN_CONSTANT1: u16 = 281;

#[derive(Debug, Clone, Default)]
pub struct Login {
    pub constant0: u16,
    pub constant1: u16,
    pub login_id: String,
    pub member_no: u32,
    pub auth_key: String,
}

impl Command for Login {
    const ID: u16 = ids::LOBBY_LOGIN;
}

impl WireRead for Login {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(Login {
            constant0: stream.read_u16()?,
            constant1: stream.read_u16()?,
            login_id: stream.read_string()?,
            member_no: stream.read_u32()?,
            auth_key: stream.read_string()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginCancelReason {
    Generic = 0,
    InvalidUser = 1,
    Duplicated = 2,
    InvalidVersion = 3,
    SystemError = 4,
}

#[derive(Debug, Clone)]
pub struct LoginCancel {
    pub reason: LoginCancelReason,
}

impl Command for LoginCancel {
    const ID: u16 = ids::LOBBY_LOGIN_CANCEL;
}

impl WireWrite for LoginCancel {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u8(self.reason as u8)
    }
}

/// The big login reply. New accounts get the default-constructed variant
/// (no character yet) immediately followed by `CreateNicknameNotify`.
#[derive(Debug, Clone, Default)]
pub struct LoginOk {
    pub lobby_time_low: u32,
    pub lobby_time_high: u32,
    pub uid: Uid,
    pub nickname: String,
    pub motd: String,
    pub gender: u8,
    pub level: u16,
    pub carrots: u32,
    pub character_equipment: Vec<WireItem>,
    pub horse_equipment: Vec<WireItem>,
    pub ranch_address: u32,
    pub ranch_port: u16,
    /// Seed the client loads into its scrambler; the server resets its own
    /// code to zero right after this frame.
    pub scrambling_constant: u32,
    pub character: WireCharacter,
    pub horse: WireHorse,
}

impl LoginOk {
    pub fn stamp_time(&mut self) {
        let time = WinFileTime::now();
        self.lobby_time_low = time.low;
        self.lobby_time_high = time.high;
    }
}

impl Command for LoginOk {
    const ID: u16 = ids::LOBBY_LOGIN_OK;
}

impl WireWrite for LoginOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.lobby_time_low)?;
        stream.write_u32(self.lobby_time_high)?;
        stream.write_u32(self.uid)?;
        stream.write_string(&self.nickname)?;
        stream.write_string(&self.motd)?;
        stream.write_u8(self.gender)?;
        stream.write_u16(self.level)?;
        stream.write_u32(self.carrots)?;
        write_seq_u8(stream, &self.character_equipment)?;
        write_seq_u8(stream, &self.horse_equipment)?;
        stream.write_u32(self.ranch_address)?;
        stream.write_u16(self.ranch_port)?;
        stream.write_u32(self.scrambling_constant)?;
        self.character.write(stream)?;
        self.horse.write(stream)
    }
}

/// Prompts the client to run character creation.
#[derive(Debug, Clone, Default)]
pub struct CreateNicknameNotify;

impl Command for CreateNicknameNotify {
    const ID: u16 = ids::LOBBY_CREATE_NICKNAME_NOTIFY;
}

impl WireWrite for CreateNicknameNotify {
    fn write(&self, _stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateNickname {
    pub nickname: String,
    pub character: WireCharacter,
    pub horse_tid: u32,
}

impl Command for CreateNickname {
    const ID: u16 = ids::LOBBY_CREATE_NICKNAME;
}

impl WireRead for CreateNickname {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(CreateNickname {
            nickname: stream.read_string()?,
            character: WireCharacter::read(stream)?,
            horse_tid: stream.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShowInventory;

impl Command for ShowInventory {
    const ID: u16 = ids::LOBBY_SHOW_INVENTORY;
}

impl WireRead for ShowInventory {
    fn read(_stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(ShowInventory)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShowInventoryOk {
    pub items: Vec<WireItem>,
    pub horses: Vec<WireHorse>,
}

impl Command for ShowInventoryOk {
    const ID: u16 = ids::LOBBY_SHOW_INVENTORY_OK;
}

impl WireWrite for ShowInventoryOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        write_seq_u8(stream, &self.items)?;
        write_seq_u8(stream, &self.horses)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShowInventoryCancel;

impl Command for ShowInventoryCancel {
    const ID: u16 = ids::LOBBY_SHOW_INVENTORY_CANCEL;
}

impl WireWrite for ShowInventoryCancel {
    fn write(&self, _stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnterChannel {
    pub channel: u8,
}

impl Command for EnterChannel {
    const ID: u16 = ids::LOBBY_ENTER_CHANNEL;
}

impl WireRead for EnterChannel {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(EnterChannel {
            channel: stream.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnterChannelOk {
    pub channel: u8,
}

impl Command for EnterChannelOk {
    const ID: u16 = ids::LOBBY_ENTER_CHANNEL_OK;
}

impl WireWrite for EnterChannelOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u8(self.channel)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoomList {
    pub page: u8,
}

impl Command for RoomList {
    const ID: u16 = ids::LOBBY_ROOM_LIST;
}

impl WireRead for RoomList {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(RoomList {
            page: stream.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomSummary {
    pub uid: u32,
    pub name: String,
    pub occupants: u8,
    pub max_players: u8,
    pub has_password: bool,
    pub game_mode: u8,
    pub map_block_id: u16,
    pub racing: bool,
}

impl WireRead for RoomSummary {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(RoomSummary {
            uid: stream.read_u32()?,
            name: stream.read_string()?,
            occupants: stream.read_u8()?,
            max_players: stream.read_u8()?,
            has_password: stream.read_bool()?,
            game_mode: stream.read_u8()?,
            map_block_id: stream.read_u16()?,
            racing: stream.read_bool()?,
        })
    }
}

impl WireWrite for RoomSummary {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.uid)?;
        stream.write_string(&self.name)?;
        stream.write_u8(self.occupants)?;
        stream.write_u8(self.max_players)?;
        stream.write_bool(self.has_password)?;
        stream.write_u8(self.game_mode)?;
        stream.write_u16(self.map_block_id)?;
        stream.write_bool(self.racing)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoomListOk {
    pub page: u8,
    pub rooms: Vec<RoomSummary>,
}

impl Command for RoomListOk {
    const ID: u16 = ids::LOBBY_ROOM_LIST_OK;
}

impl WireWrite for RoomListOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u8(self.page)?;
        write_seq_u8(stream, &self.rooms)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MakeRoom {
    pub name: String,
    pub password: String,
    pub player_count: u8,
    pub game_mode: u8,
    pub team_mode: u8,
    pub mission_id: u16,
    pub map_block_id: u16,
}

impl Command for MakeRoom {
    const ID: u16 = ids::LOBBY_MAKE_ROOM;
}

impl WireRead for MakeRoom {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(MakeRoom {
            name: stream.read_string()?,
            password: stream.read_string()?,
            player_count: stream.read_u8()?,
            game_mode: stream.read_u8()?,
            team_mode: stream.read_u8()?,
            mission_id: stream.read_u16()?,
            map_block_id: stream.read_u16()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MakeRoomOk {
    pub room_uid: u32,
    pub one_time_password: u32,
    pub race_address: u32,
    pub race_port: u16,
}

impl Command for MakeRoomOk {
    const ID: u16 = ids::LOBBY_MAKE_ROOM_OK;
}

impl WireWrite for MakeRoomOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.room_uid)?;
        stream.write_u32(self.one_time_password)?;
        stream.write_u32(self.race_address)?;
        stream.write_u16(self.race_port)
    }
}

/// Rejection codes shared by room creation and entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomRejectReason {
    InvalidRoom = 1,
    BadPassword = 2,
    CrowdedRoom = 3,
}

#[derive(Debug, Clone)]
pub struct MakeRoomCancel {
    pub reason: RoomRejectReason,
}

impl Command for MakeRoomCancel {
    const ID: u16 = ids::LOBBY_MAKE_ROOM_CANCEL;
}

impl WireWrite for MakeRoomCancel {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u8(self.reason as u8)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnterRoom {
    pub room_uid: u32,
    pub password: String,
}

impl Command for EnterRoom {
    const ID: u16 = ids::LOBBY_ENTER_ROOM;
}

impl WireRead for EnterRoom {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(EnterRoom {
            room_uid: stream.read_u32()?,
            password: stream.read_string()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnterRoomOk {
    pub room_uid: u32,
    pub one_time_password: u32,
    pub race_address: u32,
    pub race_port: u16,
}

impl Command for EnterRoomOk {
    const ID: u16 = ids::LOBBY_ENTER_ROOM_OK;
}

impl WireWrite for EnterRoomOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.room_uid)?;
        stream.write_u32(self.one_time_password)?;
        stream.write_u32(self.race_address)?;
        stream.write_u16(self.race_port)
    }
}

#[derive(Debug, Clone)]
pub struct EnterRoomCancel {
    pub reason: RoomRejectReason,
}

impl Command for EnterRoomCancel {
    const ID: u16 = ids::LOBBY_ENTER_ROOM_CANCEL;
}

impl WireWrite for EnterRoomCancel {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u8(self.reason as u8)
    }
}

/// Request to visit a ranch; a zero rancher uid means the character's own.
#[derive(Debug, Clone, Default)]
pub struct EnterRanch {
    pub rancher_uid: Uid,
}

impl Command for EnterRanch {
    const ID: u16 = ids::LOBBY_ENTER_RANCH;
}

impl WireRead for EnterRanch {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(EnterRanch {
            rancher_uid: stream.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnterRanchOk {
    pub rancher_uid: Uid,
    pub one_time_password: u32,
    pub ranch_address: u32,
    pub ranch_port: u16,
}

impl Command for EnterRanchOk {
    const ID: u16 = ids::LOBBY_ENTER_RANCH_OK;
}

impl WireWrite for EnterRanchOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.rancher_uid)?;
        stream.write_u32(self.one_time_password)?;
        stream.write_u32(self.ranch_address)?;
        stream.write_u16(self.ranch_port)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnterRanchCancel;

impl Command for EnterRanchCancel {
    const ID: u16 = ids::LOBBY_ENTER_RANCH_CANCEL;
}

impl WireWrite for EnterRanchCancel {
    fn write(&self, _stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetMessengerInfo;

impl Command for GetMessengerInfo {
    const ID: u16 = ids::LOBBY_GET_MESSENGER_INFO;
}

impl WireRead for GetMessengerInfo {
    fn read(_stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(GetMessengerInfo)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetMessengerInfoOk {
    pub code: u32,
    pub messenger_address: u32,
    pub messenger_port: u16,
}

impl Command for GetMessengerInfoOk {
    const ID: u16 = ids::LOBBY_GET_MESSENGER_INFO_OK;
}

impl WireWrite for GetMessengerInfoOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.code)?;
        stream.write_u32(self.messenger_address)?;
        stream.write_u16(self.messenger_port)
    }
}
