//! Wire ids of every command the server knows about. The lobby login and
//! inventory blocks carry the ids the legacy client ships with; ids defined
//! here but never registered (quest/achievement/league lists) deliberately
//! fall through dispatch as warn-and-consume.

// Lobby.
pub const LOBBY_LOGIN: u16 = 0x0007;
pub const LOBBY_LOGIN_OK: u16 = 0x0008;
pub const LOBBY_LOGIN_CANCEL: u16 = 0x0009;

pub const HEARTBEAT: u16 = 0x0012;

pub const LOBBY_ENTER_CHANNEL: u16 = 0x002B;
pub const LOBBY_ENTER_CHANNEL_OK: u16 = 0x002C;

pub const LOBBY_ROOM_LIST: u16 = 0x0031;
pub const LOBBY_ROOM_LIST_OK: u16 = 0x0032;
pub const LOBBY_MAKE_ROOM: u16 = 0x0033;
pub const LOBBY_MAKE_ROOM_OK: u16 = 0x0034;
pub const LOBBY_MAKE_ROOM_CANCEL: u16 = 0x0035;
pub const LOBBY_ENTER_ROOM: u16 = 0x0036;
pub const LOBBY_ENTER_ROOM_OK: u16 = 0x0037;
pub const LOBBY_ENTER_ROOM_CANCEL: u16 = 0x0038;

pub const LOBBY_ENTER_RANCH: u16 = 0x004E;
pub const LOBBY_ENTER_RANCH_OK: u16 = 0x004F;
pub const LOBBY_ENTER_RANCH_CANCEL: u16 = 0x0050;

pub const LOBBY_CREATE_NICKNAME_NOTIFY: u16 = 0x006D;
pub const LOBBY_CREATE_NICKNAME: u16 = 0x006E;

pub const LOBBY_SHOW_INVENTORY: u16 = 0x007E;
pub const LOBBY_SHOW_INVENTORY_OK: u16 = 0x007F;
pub const LOBBY_SHOW_INVENTORY_CANCEL: u16 = 0x0080;

// Defined by the client but intentionally unregistered; dispatch warns and
// consumes these.
pub const LOBBY_ACHIEVEMENT_COMPLETE_LIST: u16 = 0x00E5;
pub const LOBBY_ACHIEVEMENT_COMPLETE_LIST_OK: u16 = 0x00E6;
pub const LOBBY_REQUEST_DAILY_QUEST_LIST: u16 = 0x0356;
pub const LOBBY_REQUEST_DAILY_QUEST_LIST_OK: u16 = 0x0357;
pub const LOBBY_REQUEST_LEAGUE_INFO: u16 = 0x0376;
pub const LOBBY_REQUEST_LEAGUE_INFO_OK: u16 = 0x0377;
pub const LOBBY_REQUEST_QUEST_LIST: u16 = 0x03F8;
pub const LOBBY_REQUEST_QUEST_LIST_OK: u16 = 0x03F9;

pub const LOBBY_GET_MESSENGER_INFO: u16 = 0x00FB;
pub const LOBBY_GET_MESSENGER_INFO_OK: u16 = 0x00FC;

// Ranch.
pub const RANCH_ENTER: u16 = 0x012C;
pub const RANCH_ENTER_OK: u16 = 0x012D;
pub const RANCH_ENTER_CANCEL: u16 = 0x012E;
pub const RANCH_SNAPSHOT: u16 = 0x012F;
pub const RANCH_SNAPSHOT_NOTIFY: u16 = 0x0130;
pub const RANCH_ENTER_NOTIFY: u16 = 0x0131;
pub const RANCH_LEAVE: u16 = 0x0132;
pub const RANCH_LEAVE_NOTIFY: u16 = 0x0133;
pub const RANCH_CHAT: u16 = 0x0134;
pub const RANCH_CHAT_NOTIFY: u16 = 0x0135;
pub const RANCH_UPDATE_BUSY_STATE: u16 = 0x0136;
pub const RANCH_UPDATE_BUSY_STATE_NOTIFY: u16 = 0x0137;
pub const RANCH_UPDATE_EQUIPMENT: u16 = 0x0138;
pub const RANCH_UPDATE_EQUIPMENT_NOTIFY: u16 = 0x0139;
pub const RANCH_STUFF: u16 = 0x013A;
pub const RANCH_STUFF_OK: u16 = 0x013B;
pub const RANCH_INVITE_USER: u16 = 0x013C;
pub const RANCH_INVITE_USER_OK: u16 = 0x013D;
pub const RANCH_INVITE_USER_CANCEL: u16 = 0x013E;

// Race.
pub const RACE_ENTER_ROOM: u16 = 0x01F4;
pub const RACE_ENTER_ROOM_OK: u16 = 0x01F5;
pub const RACE_ENTER_ROOM_CANCEL: u16 = 0x01F6;
pub const RACE_ENTER_ROOM_NOTIFY: u16 = 0x01F7;
pub const RACE_READY: u16 = 0x01F8;
pub const RACE_READY_NOTIFY: u16 = 0x01F9;
pub const RACE_LEAVE_ROOM: u16 = 0x01FA;
pub const RACE_LEAVE_ROOM_NOTIFY: u16 = 0x01FB;
pub const RACE_CHANGE_MASTER_NOTIFY: u16 = 0x01FC;
pub const RACE_CHANGE_ROOM_OPTIONS: u16 = 0x01FD;
pub const RACE_CHANGE_ROOM_OPTIONS_NOTIFY: u16 = 0x01FE;
pub const RACE_START: u16 = 0x01FF;
pub const RACE_ROOM_COUNTDOWN: u16 = 0x0200;
pub const RACE_ROOM_COUNTDOWN_CANCEL: u16 = 0x0201;
pub const RACE_START_NOTIFY: u16 = 0x0202;
pub const RACE_LOADING_COMPLETE: u16 = 0x0203;
pub const RACE_LOADING_COMPLETE_NOTIFY: u16 = 0x0204;
pub const RACE_USER_TIMER: u16 = 0x0205;
pub const RACE_USER_TIMER_OK: u16 = 0x0206;
pub const RACE_USER_FINAL: u16 = 0x0207;
pub const RACE_USER_FINAL_NOTIFY: u16 = 0x0208;
pub const RACE_RESULT_NOTIFY: u16 = 0x0209;
pub const RACE_AWARD_END: u16 = 0x020A;

// Chatter subservers (all-chat, private-chat, messenger).
pub const CHAT_LOGIN: u16 = 0x3C1E;
pub const CHAT_LOGIN_ACK_OK: u16 = 0x3C1F;
pub const CHAT_LOGIN_ACK_CANCEL: u16 = 0x3C20;
pub const CHAT_ENTER_ROOM: u16 = 0x3C21;
pub const CHAT_ENTER_ROOM_ACK_OK: u16 = 0x3C22;
pub const CHAT_ENTER_ROOM_ACK_CANCEL: u16 = 0x3C23;
pub const CHAT_CHAT: u16 = 0x3C24;
pub const CHAT_CHAT_TRS: u16 = 0x3C25;
pub const CHAT_CHANNEL_CHAT_TRS: u16 = 0x3C26;
pub const CHAT_INPUT_STATE: u16 = 0x3C27;
pub const CHAT_INPUT_STATE_TRS: u16 = 0x3C28;
pub const CHAT_LETTER_LIST: u16 = 0x3C29;
pub const CHAT_LETTER_LIST_ACK_OK: u16 = 0x3C2A;
pub const CHAT_LETTER_SEND: u16 = 0x3C2C;
pub const CHAT_LETTER_SEND_ACK_OK: u16 = 0x3C2D;
pub const CHAT_LETTER_SEND_ACK_CANCEL: u16 = 0x3C2E;
pub const CHAT_LETTER_READ: u16 = 0x3C2F;
pub const CHAT_LETTER_READ_ACK_OK: u16 = 0x3C30;
pub const CHAT_LETTER_DELETE: u16 = 0x3C31;
pub const CHAT_LETTER_DELETE_ACK_OK: u16 = 0x3C32;
pub const CHAT_GUILD_LOGIN: u16 = 0x3C33;
pub const CHAT_GUILD_LOGIN_ACK_OK: u16 = 0x3C34;
pub const CHAT_CHANNEL_INFO: u16 = 0x3C35;
pub const CHAT_CHANNEL_INFO_ACK_OK: u16 = 0x3C36;
pub const CHAT_HEARTBEAT: u16 = 0x3C87;
