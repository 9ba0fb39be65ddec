//! Chatter surface shared by the all-chat, private-chat and messenger
//! subservers: room entry, chat relay, input state, and the mail flows.

use crate::protocol::ids;
use crate::protocol::{write_seq_u32, write_seq_u8};
use bridle::shared::ProtocolResult;
use bridle::stream::{Command, SinkStream, SourceStream, WireRead, WireWrite};
use stirrup::Uid;

/// Presence status shown next to names in the messenger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Hidden = 0,
    Offline = 1,
    Online = 2,
    Away = 3,
}

impl Default for Status {
    fn default() -> Status {
        Status::Offline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User = 0,
    Op = 1,
    GameMaster = 2,
}

impl Default for ChatRole {
    fn default() -> ChatRole {
        ChatRole::User
    }
}

impl ChatRole {
    pub fn from_wire(value: u8) -> ChatRole {
        match value {
            1 => ChatRole::Op,
            2 => ChatRole::GameMaster,
            _ => ChatRole::User,
        }
    }
}

/// Messenger login. The code is the OTP granted by the lobby's
/// GetMessengerInfo reply.
#[derive(Debug, Clone, Default)]
pub struct ChatLogin {
    pub character_uid: Uid,
    pub name: String,
    pub code: u32,
    pub guild_uid: Uid,
}

impl Command for ChatLogin {
    const ID: u16 = ids::CHAT_LOGIN;
}

impl WireRead for ChatLogin {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(ChatLogin {
            character_uid: stream.read_u32()?,
            name: stream.read_string()?,
            code: stream.read_u32()?,
            guild_uid: stream.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatGroup {
    pub uid: Uid,
    pub name: String,
}

impl WireWrite for ChatGroup {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.uid)?;
        stream.write_string(&self.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatFriend {
    pub uid: Uid,
    pub name: String,
    pub status: Status,
    pub category_uid: Uid,
    pub ranch_uid: Uid,
    pub room_uid: u32,
}

impl WireWrite for ChatFriend {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.uid)?;
        stream.write_string(&self.name)?;
        stream.write_u8(self.status as u8)?;
        stream.write_u32(self.category_uid)?;
        stream.write_u32(self.ranch_uid)?;
        stream.write_u32(self.room_uid)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatLoginAckOk {
    pub character_uid: Uid,
    pub groups: Vec<ChatGroup>,
    pub friends: Vec<ChatFriend>,
}

impl Command for ChatLoginAckOk {
    const ID: u16 = ids::CHAT_LOGIN_ACK_OK;
}

impl WireWrite for ChatLoginAckOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.character_uid)?;
        write_seq_u8(stream, &self.groups)?;
        write_seq_u8(stream, &self.friends)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatLoginAckCancel;

impl Command for ChatLoginAckCancel {
    const ID: u16 = ids::CHAT_LOGIN_ACK_CANCEL;
}

impl WireWrite for ChatLoginAckCancel {
    fn write(&self, _stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        Ok(())
    }
}

/// Chat room entry. On the all-chat server the code is an OTP; on the
/// private-chat server it carries the target character uid instead.
#[derive(Debug, Clone, Default)]
pub struct ChatEnterRoom {
    pub code: u32,
    pub character_uid: Uid,
    pub character_name: String,
    pub guild_uid: Uid,
}

impl Command for ChatEnterRoom {
    const ID: u16 = ids::CHAT_ENTER_ROOM;
}

impl WireRead for ChatEnterRoom {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(ChatEnterRoom {
            code: stream.read_u32()?,
            character_uid: stream.read_u32()?,
            character_name: stream.read_string()?,
            guild_uid: stream.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomParticipant {
    pub uid: Uid,
    pub name: String,
}

impl WireWrite for RoomParticipant {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.uid)?;
        stream.write_string(&self.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatEnterRoomAckOk {
    pub participants: Vec<RoomParticipant>,
}

impl Command for ChatEnterRoomAckOk {
    const ID: u16 = ids::CHAT_ENTER_ROOM_ACK_OK;
}

impl WireWrite for ChatEnterRoomAckOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        write_seq_u8(stream, &self.participants)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatterError {
    LoginFailed = 1,
}

#[derive(Debug, Clone)]
pub struct ChatEnterRoomAckCancel {
    pub error: ChatterError,
}

impl Command for ChatEnterRoomAckCancel {
    const ID: u16 = ids::CHAT_ENTER_ROOM_ACK_CANCEL;
}

impl WireWrite for ChatEnterRoomAckCancel {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u8(self.error as u8)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chat {
    pub message: String,
    pub role: ChatRole,
}

impl Command for Chat {
    const ID: u16 = ids::CHAT_CHAT;
}

impl WireRead for Chat {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(Chat {
            message: stream.read_string()?,
            role: ChatRole::from_wire(stream.read_u8()?),
        })
    }
}

/// Two-party delivery (private chat and sender echoes).
#[derive(Debug, Clone, Default)]
pub struct ChatTrs {
    pub sender_uid: Uid,
    pub message: String,
}

impl Command for ChatTrs {
    const ID: u16 = ids::CHAT_CHAT_TRS;
}

impl WireWrite for ChatTrs {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.sender_uid)?;
        stream.write_string(&self.message)
    }
}

/// Channel-wide delivery (all-chat broadcast and system lines).
#[derive(Debug, Clone, Default)]
pub struct ChannelChatTrs {
    pub author: String,
    pub message: String,
    pub role: ChatRole,
}

impl Command for ChannelChatTrs {
    const ID: u16 = ids::CHAT_CHANNEL_CHAT_TRS;
}

impl WireWrite for ChannelChatTrs {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_string(&self.author)?;
        stream.write_string(&self.message)?;
        stream.write_u8(self.role as u8)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InputState {
    pub state: u8,
}

impl Command for InputState {
    const ID: u16 = ids::CHAT_INPUT_STATE;
}

impl WireRead for InputState {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(InputState {
            state: stream.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct InputStateTrs {
    pub character_uid: Uid,
    pub state: u8,
}

impl Command for InputStateTrs {
    const ID: u16 = ids::CHAT_INPUT_STATE_TRS;
}

impl WireWrite for InputStateTrs {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.character_uid)?;
        stream.write_u8(self.state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxFolder {
    Inbox = 0,
    Sent = 1,
}

impl Default for MailboxFolder {
    fn default() -> MailboxFolder {
        MailboxFolder::Inbox
    }
}

impl MailboxFolder {
    pub fn from_wire(value: u8) -> Option<MailboxFolder> {
        match value {
            0 => Some(MailboxFolder::Inbox),
            1 => Some(MailboxFolder::Sent),
            _ => None,
        }
    }
}

/// Pages a mailbox folder: up to `count` mails starting after
/// `last_mail_uid` (zero for the top of the folder).
#[derive(Debug, Clone, Default)]
pub struct LetterList {
    pub folder: u8,
    pub last_mail_uid: Uid,
    pub count: u32,
}

impl Command for LetterList {
    const ID: u16 = ids::CHAT_LETTER_LIST;
}

impl WireRead for LetterList {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(LetterList {
            folder: stream.read_u8()?,
            last_mail_uid: stream.read_u32()?,
            count: stream.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LetterSummary {
    pub mail_uid: Uid,
    /// The other party: sender for inbox pages, recipient for sent pages.
    pub peer: String,
    pub date: String,
    pub body: String,
    pub unread: bool,
}

impl WireWrite for LetterSummary {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.mail_uid)?;
        stream.write_string(&self.peer)?;
        stream.write_string(&self.date)?;
        stream.write_string(&self.body)?;
        stream.write_bool(self.unread)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LetterListAckOk {
    pub folder: u8,
    pub has_more: bool,
    pub letters: Vec<LetterSummary>,
}

impl Command for LetterListAckOk {
    const ID: u16 = ids::CHAT_LETTER_LIST_ACK_OK;
}

impl WireWrite for LetterListAckOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u8(self.folder)?;
        stream.write_bool(self.has_more)?;
        write_seq_u32(stream, &self.letters)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LetterSend {
    pub recipient: String,
    pub body: String,
}

impl Command for LetterSend {
    const ID: u16 = ids::CHAT_LETTER_SEND;
}

impl WireRead for LetterSend {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(LetterSend {
            recipient: stream.read_string()?,
            body: stream.read_string()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct LetterSendAckOk {
    pub mail_uid: Uid,
    pub recipient: String,
    pub date: String,
    pub body: String,
}

impl Command for LetterSendAckOk {
    const ID: u16 = ids::CHAT_LETTER_SEND_ACK_OK;
}

impl WireWrite for LetterSendAckOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.mail_uid)?;
        stream.write_string(&self.recipient)?;
        stream.write_string(&self.date)?;
        stream.write_string(&self.body)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LetterSendAckCancel;

impl Command for LetterSendAckCancel {
    const ID: u16 = ids::CHAT_LETTER_SEND_ACK_CANCEL;
}

impl WireWrite for LetterSendAckCancel {
    fn write(&self, _stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LetterRead {
    pub mail_uid: Uid,
}

impl Command for LetterRead {
    const ID: u16 = ids::CHAT_LETTER_READ;
}

impl WireRead for LetterRead {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(LetterRead {
            mail_uid: stream.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct LetterReadAckOk {
    pub mail_uid: Uid,
}

impl Command for LetterReadAckOk {
    const ID: u16 = ids::CHAT_LETTER_READ_ACK_OK;
}

impl WireWrite for LetterReadAckOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.mail_uid)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LetterDelete {
    pub folder: u8,
    pub mail_uid: Uid,
}

impl Command for LetterDelete {
    const ID: u16 = ids::CHAT_LETTER_DELETE;
}

impl WireRead for LetterDelete {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(LetterDelete {
            folder: stream.read_u8()?,
            mail_uid: stream.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct LetterDeleteAckOk {
    pub mail_uid: Uid,
}

impl Command for LetterDeleteAckOk {
    const ID: u16 = ids::CHAT_LETTER_DELETE_ACK_OK;
}

impl WireWrite for LetterDeleteAckOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.mail_uid)
    }
}

/// Guild roster login; same payload as `ChatLogin`.
#[derive(Debug, Clone, Default)]
pub struct GuildLogin {
    pub character_uid: Uid,
    pub name: String,
    pub code: u32,
    pub guild_uid: Uid,
}

impl Command for GuildLogin {
    const ID: u16 = ids::CHAT_GUILD_LOGIN;
}

impl WireRead for GuildLogin {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(GuildLogin {
            character_uid: stream.read_u32()?,
            name: stream.read_string()?,
            code: stream.read_u32()?,
            guild_uid: stream.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuildMember {
    pub character_uid: Uid,
    pub status: u8,
}

impl WireWrite for GuildMember {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.character_uid)?;
        stream.write_u8(self.status)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GuildLoginAckOk {
    pub members: Vec<GuildMember>,
}

impl Command for GuildLoginAckOk {
    const ID: u16 = ids::CHAT_GUILD_LOGIN_ACK_OK;
}

impl WireWrite for GuildLoginAckOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        write_seq_u8(stream, &self.members)
    }
}

/// Asks the messenger where the all-chat channel lives.
#[derive(Debug, Clone, Default)]
pub struct ChannelInfo;

impl Command for ChannelInfo {
    const ID: u16 = ids::CHAT_CHANNEL_INFO;
}

impl WireRead for ChannelInfo {
    fn read(_stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(ChannelInfo)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelInfoAckOk {
    pub code: u32,
    pub all_chat_address: u32,
    pub all_chat_port: u16,
}

impl Command for ChannelInfoAckOk {
    const ID: u16 = ids::CHAT_CHANNEL_INFO_ACK_OK;
}

impl WireWrite for ChannelInfoAckOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.code)?;
        stream.write_u32(self.all_chat_address)?;
        stream.write_u16(self.all_chat_port)
    }
}

/// Messenger keepalive; consumed silently.
#[derive(Debug, Clone, Default)]
pub struct ChatHeartbeat;

impl Command for ChatHeartbeat {
    const ID: u16 = ids::CHAT_HEARTBEAT;
}

impl WireRead for ChatHeartbeat {
    fn read(_stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(ChatHeartbeat)
    }
}
