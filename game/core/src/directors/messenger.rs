//! The messenger director: friends/guild presence and the mail flows. Login
//! is OTP-gated; the channel-info reply points chat clients at the all-chat
//! endpoint with a fresh code.

use crate::config::GameConfig;
use crate::data::SharedStore;
use crate::otp::{identity_hash, Destination, SharedOtp};
use crate::presence::{Location, SharedPresence};
use crate::protocol::chatter::*;
use bridle::dispatch::{CommandConduit, CommandConduitExt, CommandRegistry};
use bridle::shared::ClientId;
use chrono::Utc;
use hashbrown::HashMap;
use stirrup::logging;
use stirrup::{Uid, INVALID_UID};

/// Synthetic friends-list category holding everyone currently online.
const ONLINE_PLAYERS_CATEGORY: Uid = u32::max_value() - 1;

const DATE_FORMAT: &str = "%H:%M:%S %d/%m/%Y";

#[derive(Clone)]
pub struct MessengerSettings {
    pub all_chat_address: u32,
    pub all_chat_port: u16,
}

impl MessengerSettings {
    pub fn from_config(config: &GameConfig) -> MessengerSettings {
        let adv = &config.lobby.advertisement;
        MessengerSettings {
            all_chat_address: adv.all_chat.wire_addr(),
            all_chat_port: adv.all_chat.port,
        }
    }
}

struct MessengerClient {
    character_uid: Uid,
    authenticated: bool,
    status: Status,
}

pub struct MessengerDirector {
    settings: MessengerSettings,
    store: SharedStore,
    otp: SharedOtp,
    presence: SharedPresence,

    clients: HashMap<ClientId, MessengerClient>,

    log: logging::Logger,
}

impl MessengerDirector {
    pub fn new(
        settings: MessengerSettings,
        store: SharedStore,
        otp: SharedOtp,
        presence: SharedPresence,
        log: &logging::Logger,
    ) -> MessengerDirector {
        MessengerDirector {
            settings,
            store,
            otp,
            presence,
            clients: HashMap::new(),
            log: log.new(logging::o!("director" => "messenger")),
        }
    }

    pub fn registry(log: &logging::Logger) -> CommandRegistry<MessengerDirector> {
        let mut registry = CommandRegistry::new(log);

        registry.register::<ChatLogin, _>(|d: &mut MessengerDirector, net, client, cmd| {
            d.handle_login(net, client, cmd)
        });
        registry.register::<GuildLogin, _>(|d: &mut MessengerDirector, net, client, cmd| {
            d.handle_guild_login(net, client, cmd)
        });
        registry.register::<LetterList, _>(|d: &mut MessengerDirector, net, client, cmd| {
            d.handle_letter_list(net, client, cmd)
        });
        registry.register::<LetterSend, _>(|d: &mut MessengerDirector, net, client, cmd| {
            d.handle_letter_send(net, client, cmd)
        });
        registry.register::<LetterRead, _>(|d: &mut MessengerDirector, net, client, cmd| {
            d.handle_letter_read(net, client, cmd)
        });
        registry.register::<LetterDelete, _>(|d: &mut MessengerDirector, net, client, cmd| {
            d.handle_letter_delete(net, client, cmd)
        });
        registry.register::<ChannelInfo, _>(|d: &mut MessengerDirector, net, client, _| {
            d.handle_channel_info(net, client)
        });
        registry.register::<ChatHeartbeat, _>(|_, _, _, _| {});

        registry
    }

    pub fn on_client_connected(&mut self, client: ClientId) {
        self.clients.insert(
            client,
            MessengerClient {
                character_uid: INVALID_UID,
                authenticated: false,
                status: Status::Offline,
            },
        );
    }

    pub fn on_client_disconnected(&mut self, client: ClientId) {
        self.clients.remove(&client);
    }

    pub fn tick(&mut self, _net: &mut dyn CommandConduit) {}

    pub fn handle_login(&mut self, net: &mut dyn CommandConduit, client: ClientId, cmd: ChatLogin) {
        let authorized = self.otp.authorize_code(
            identity_hash(cmd.character_uid, Destination::Messenger),
            cmd.code,
        );

        if !authorized {
            logging::warn!(self.log, "messenger login failed authorisation";
                           "client_id" => client,
                           "character_uid" => cmd.character_uid);
            net.queue_command(client, || ChatLoginAckCancel);
            net.disconnect_after_flush(client);
            return;
        }

        if let Some(context) = self.clients.get_mut(&client) {
            context.character_uid = cmd.character_uid;
            context.authenticated = true;
            context.status = Status::Online;
        }

        // The mail alarm fires once per login.
        {
            let mut store = self.store.lock().expect("Record store lock poisoned");
            store.characters.mutable(cmd.character_uid, |character| {
                character.mailbox.has_new_mail = false;
            });
        }

        let friends: Vec<ChatFriend> = self
            .presence
            .snapshot()
            .into_iter()
            .filter(|(uid, _)| *uid != cmd.character_uid)
            .map(|(uid, entry)| ChatFriend {
                uid,
                name: entry.name,
                status: Status::Online,
                category_uid: ONLINE_PLAYERS_CATEGORY,
                ranch_uid: match entry.location {
                    Location::Ranch(rancher) => rancher,
                    _ => INVALID_UID,
                },
                room_uid: match entry.location {
                    Location::Room(room) => room,
                    _ => 0,
                },
            })
            .collect();

        let character_uid = cmd.character_uid;
        net.queue_command(client, move || ChatLoginAckOk {
            character_uid,
            groups: vec![ChatGroup {
                uid: ONLINE_PLAYERS_CATEGORY,
                name: "Online Players".to_string(),
            }],
            friends,
        });

        logging::info!(self.log, "messenger login";
                       "client_id" => client,
                       "character_uid" => cmd.character_uid);
    }

    pub fn handle_guild_login(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: GuildLogin,
    ) {
        if !self.is_authenticated(client) {
            return;
        }

        let member_uids: Vec<Uid> = {
            let store = self.store.lock().expect("Record store lock poisoned");
            store
                .guilds
                .immutable(cmd.guild_uid, |guild| guild.members.clone())
                .unwrap_or_default()
        };

        let members: Vec<GuildMember> = member_uids
            .into_iter()
            .map(|character_uid| GuildMember {
                character_uid,
                status: self
                    .status_of(character_uid)
                    .unwrap_or(Status::Offline) as u8,
            })
            .collect();

        net.queue_command(client, move || GuildLoginAckOk { members });
    }

    pub fn handle_letter_list(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: LetterList,
    ) {
        let character_uid = match self.authenticated_character(client) {
            Some(uid) => uid,
            None => return,
        };

        let folder = match MailboxFolder::from_wire(cmd.folder) {
            Some(folder) => folder,
            None => {
                logging::warn!(self.log, "unrecognised mailbox folder";
                               "client_id" => client,
                               "folder" => cmd.folder);
                return;
            }
        };

        let store = self.store.lock().expect("Record store lock poisoned");

        let mailbox: Vec<Uid> = store
            .characters
            .immutable(character_uid, |character| match folder {
                MailboxFolder::Inbox => character.mailbox.inbox.clone(),
                MailboxFolder::Sent => character.mailbox.sent.clone(),
            })
            .unwrap_or_default();

        // Page from the top, or from the requested anchor mail onwards.
        let start = if cmd.last_mail_uid == INVALID_UID {
            0
        } else {
            match mailbox.iter().position(|&uid| uid == cmd.last_mail_uid) {
                Some(position) => position,
                None => {
                    logging::warn!(self.log, "page anchor mail does not exist";
                                   "character_uid" => character_uid,
                                   "mail_uid" => cmd.last_mail_uid);
                    return;
                }
            }
        };

        let page: Vec<Uid> = mailbox
            .iter()
            .skip(start)
            .take(cmd.count as usize)
            .copied()
            .collect();
        let has_more = start + page.len() < mailbox.len();

        let letters: Vec<LetterSummary> = page
            .iter()
            .filter_map(|&mail_uid| {
                store.mails.immutable(mail_uid, |mail| LetterSummary {
                    mail_uid,
                    peer: match folder {
                        MailboxFolder::Inbox => mail.sender.clone(),
                        MailboxFolder::Sent => mail.recipient.clone(),
                    },
                    date: mail.date.clone(),
                    body: mail.body.clone(),
                    unread: mail.unread,
                })
            })
            .collect();

        drop(store);

        let folder_wire = cmd.folder;
        net.queue_command(client, move || LetterListAckOk {
            folder: folder_wire,
            has_more,
            letters,
        });
    }

    pub fn handle_letter_send(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: LetterSend,
    ) {
        let character_uid = match self.authenticated_character(client) {
            Some(uid) => uid,
            None => return,
        };

        let mut store = self.store.lock().expect("Record store lock poisoned");

        let recipient_uid = match store.character_by_name(&cmd.recipient) {
            Some(uid) => uid,
            None => {
                drop(store);
                net.queue_command(client, || LetterSendAckCancel);
                return;
            }
        };

        let sender_name = store
            .characters
            .immutable(character_uid, |character| character.name.clone())
            .unwrap_or_default();

        let date = Utc::now().format(DATE_FORMAT).to_string();

        let mail_uid = store.mails.create(|mail| {
            mail.sender = sender_name;
            mail.recipient = cmd.recipient.clone();
            mail.date = date.clone();
            mail.body = cmd.body.clone();
            mail.unread = true;
        });

        // New mail rides at the head of both folders.
        store.characters.mutable(recipient_uid, |character| {
            character.mailbox.inbox.insert(0, mail_uid);
            character.mailbox.has_new_mail = true;
        });
        store.characters.mutable(character_uid, |character| {
            character.mailbox.sent.insert(0, mail_uid);
        });

        drop(store);

        logging::info!(self.log, "mail sent";
                       "mail_uid" => mail_uid,
                       "from" => character_uid,
                       "to" => recipient_uid);

        net.queue_command(client, move || LetterSendAckOk {
            mail_uid,
            recipient: cmd.recipient,
            date,
            body: cmd.body,
        });
    }

    pub fn handle_letter_read(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: LetterRead,
    ) {
        if self.authenticated_character(client).is_none() {
            return;
        }

        let found = {
            let mut store = self.store.lock().expect("Record store lock poisoned");
            store
                .mails
                .mutable(cmd.mail_uid, |mail| mail.unread = false)
                .is_some()
        };

        if found {
            let mail_uid = cmd.mail_uid;
            net.queue_command(client, move || LetterReadAckOk { mail_uid });
        }
    }

    pub fn handle_letter_delete(
        &mut self,
        net: &mut dyn CommandConduit,
        client: ClientId,
        cmd: LetterDelete,
    ) {
        let character_uid = match self.authenticated_character(client) {
            Some(uid) => uid,
            None => return,
        };

        let folder = match MailboxFolder::from_wire(cmd.folder) {
            Some(folder) => folder,
            None => return,
        };

        let removed = {
            let mut store = self.store.lock().expect("Record store lock poisoned");

            let removed = store
                .characters
                .mutable(character_uid, |character| {
                    let folder_uids = match folder {
                        MailboxFolder::Inbox => &mut character.mailbox.inbox,
                        MailboxFolder::Sent => &mut character.mailbox.sent,
                    };
                    let before = folder_uids.len();
                    folder_uids.retain(|&uid| uid != cmd.mail_uid);
                    before != folder_uids.len()
                })
                .unwrap_or(false);

            // The record itself goes once nobody's folder references it.
            if removed {
                let referenced = store
                    .characters
                    .find(|character| {
                        character.mailbox.inbox.contains(&cmd.mail_uid)
                            || character.mailbox.sent.contains(&cmd.mail_uid)
                    })
                    .is_some();
                if !referenced {
                    store.mails.delete(cmd.mail_uid);
                }
            }

            removed
        };

        if removed {
            let mail_uid = cmd.mail_uid;
            net.queue_command(client, move || LetterDeleteAckOk { mail_uid });
        }
    }

    pub fn handle_channel_info(&mut self, net: &mut dyn CommandConduit, client: ClientId) {
        let character_uid = match self.authenticated_character(client) {
            Some(uid) => uid,
            None => return,
        };

        let code = self
            .otp
            .grant_code(identity_hash(character_uid, Destination::AllChat));

        let (all_chat_address, all_chat_port) = (
            self.settings.all_chat_address,
            self.settings.all_chat_port,
        );
        net.queue_command(client, move || ChannelInfoAckOk {
            code,
            all_chat_address,
            all_chat_port,
        });
    }

    fn is_authenticated(&self, client: ClientId) -> bool {
        self.clients
            .get(&client)
            .map(|context| context.authenticated)
            .unwrap_or(false)
    }

    fn authenticated_character(&self, client: ClientId) -> Option<Uid> {
        match self.clients.get(&client) {
            Some(context) if context.authenticated => Some(context.character_uid),
            _ => None,
        }
    }

    /// The messenger-reported status of a character, if connected here.
    fn status_of(&self, character_uid: Uid) -> Option<Status> {
        self.clients
            .values()
            .find(|context| context.authenticated && context.character_uid == character_uid)
            .map(|context| context.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directors::testing::{seed_character, seeded_store, RecordingConduit};
    use crate::otp::OtpRegistry;
    use crate::presence::PresenceBoard;
    use crate::protocol::ids;
    use bridle::stream::SourceStream;

    struct Fixture {
        _dir: tempfile::TempDir,
        director: MessengerDirector,
        store: SharedStore,
        otp: SharedOtp,
        presence: SharedPresence,
        alice: Uid,
    }

    fn fixture() -> Fixture {
        let (_dir, store, _user, alice, _horse) = seeded_store();
        let otp = OtpRegistry::new().into_shared();
        let presence = PresenceBoard::new().into_shared();

        let director = MessengerDirector::new(
            MessengerSettings {
                all_chat_address: 0x0100_007F,
                all_chat_port: 10034,
            },
            store.clone(),
            otp.clone(),
            presence.clone(),
            &logging::discard(),
        );

        Fixture {
            _dir,
            director,
            store,
            otp,
            presence,
            alice,
        }
    }

    fn login(fixture: &mut Fixture, net: &mut RecordingConduit, client: ClientId, uid: Uid) {
        let code = fixture
            .otp
            .grant_code(identity_hash(uid, Destination::Messenger));

        fixture.director.on_client_connected(client);
        fixture.director.handle_login(
            net,
            client,
            ChatLogin {
                character_uid: uid,
                name: String::new(),
                code,
                guild_uid: 0,
            },
        );
    }

    fn send_mail(
        fixture: &mut Fixture,
        net: &mut RecordingConduit,
        client: ClientId,
        recipient: &str,
        body: &str,
    ) {
        fixture.director.handle_letter_send(
            net,
            client,
            LetterSend {
                recipient: recipient.to_string(),
                body: body.to_string(),
            },
        );
    }

    #[test]
    fn test_login_with_otp_lists_online_players() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;

        fixture.presence.mark_online(777, "Someone");

        login(&mut fixture, &mut net, 1, alice);

        let frames = net.sent_to(1, ids::CHAT_LOGIN_ACK_OK);
        assert_eq!(frames.len(), 1);

        let mut stream = SourceStream::new(frames[0]);
        assert_eq!(stream.read_u32().unwrap(), alice);
        // One group, one online player.
        assert_eq!(stream.read_u8().unwrap(), 1);
        assert_eq!(stream.read_u32().unwrap(), ONLINE_PLAYERS_CATEGORY);
        assert_eq!(stream.read_string().unwrap(), "Online Players");
        assert_eq!(stream.read_u8().unwrap(), 1);
        assert_eq!(stream.read_u32().unwrap(), 777);
    }

    #[test]
    fn test_login_with_bad_code_disconnects() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;

        fixture.director.on_client_connected(1);
        fixture.director.handle_login(
            &mut net,
            1,
            ChatLogin {
                character_uid: alice,
                name: String::new(),
                code: 0xBAD,
                guild_uid: 0,
            },
        );

        assert_eq!(net.count_to(1, ids::CHAT_LOGIN_ACK_CANCEL), 1);
        assert_eq!(net.disconnects, vec![1]);
    }

    #[test]
    fn test_login_clears_mail_alarm() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;

        fixture.store.lock().unwrap().characters.mutable(alice, |c| {
            c.mailbox.has_new_mail = true;
        });

        login(&mut fixture, &mut net, 1, alice);

        let has_new = fixture
            .store
            .lock()
            .unwrap()
            .characters
            .immutable(alice, |c| c.mailbox.has_new_mail)
            .unwrap();
        assert!(!has_new);
    }

    #[test]
    fn test_mail_send_lands_in_both_folders_head_first() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;
        let bob = seed_character(&fixture.store, "Bob");

        login(&mut fixture, &mut net, 1, alice);
        send_mail(&mut fixture, &mut net, 1, "Bob", "first");
        send_mail(&mut fixture, &mut net, 1, "Bob", "second");

        assert_eq!(net.count_to(1, ids::CHAT_LETTER_SEND_ACK_OK), 2);

        let store = fixture.store.lock().unwrap();
        let inbox = store
            .characters
            .immutable(bob, |c| c.mailbox.inbox.clone())
            .unwrap();
        let sent = store
            .characters
            .immutable(alice, |c| c.mailbox.sent.clone())
            .unwrap();

        assert_eq!(inbox.len(), 2);
        assert_eq!(sent, inbox);

        // The newest mail rides first, and the alarm is set.
        let newest_body = store
            .mails
            .immutable(inbox[0], |mail| mail.body.clone())
            .unwrap();
        assert_eq!(newest_body, "second");
        assert!(store
            .characters
            .immutable(bob, |c| c.mailbox.has_new_mail)
            .unwrap());
    }

    #[test]
    fn test_mail_to_unknown_recipient_cancelled() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;

        login(&mut fixture, &mut net, 1, alice);
        send_mail(&mut fixture, &mut net, 1, "Nobody", "hello?");

        assert_eq!(net.count_to(1, ids::CHAT_LETTER_SEND_ACK_CANCEL), 1);
    }

    #[test]
    fn test_letter_list_pages_inbox() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;
        let bob = seed_character(&fixture.store, "Bob");

        // Bob mails Alice three times.
        login(&mut fixture, &mut net, 2, bob);
        send_mail(&mut fixture, &mut net, 2, "Alice", "one");
        send_mail(&mut fixture, &mut net, 2, "Alice", "two");
        send_mail(&mut fixture, &mut net, 2, "Alice", "three");

        login(&mut fixture, &mut net, 1, alice);
        net.sent.clear();

        fixture.director.handle_letter_list(
            &mut net,
            1,
            LetterList {
                folder: 0,
                last_mail_uid: INVALID_UID,
                count: 2,
            },
        );

        let frames = net.sent_to(1, ids::CHAT_LETTER_LIST_ACK_OK);
        assert_eq!(frames.len(), 1);

        let mut stream = SourceStream::new(frames[0]);
        assert_eq!(stream.read_u8().unwrap(), 0);
        // More mail remains after this page.
        assert!(stream.read_bool().unwrap());
        assert_eq!(stream.read_u32().unwrap(), 2);

        let first_uid = stream.read_u32().unwrap();
        assert_eq!(stream.read_string().unwrap(), "Bob");
        assert!(!stream.read_string().unwrap().is_empty());
        assert_eq!(stream.read_string().unwrap(), "three");
        assert!(stream.read_bool().unwrap());
        let second_uid = stream.read_u32().unwrap();

        // Paging from the anchor re-lists it and everything after.
        net.sent.clear();
        fixture.director.handle_letter_list(
            &mut net,
            1,
            LetterList {
                folder: 0,
                last_mail_uid: second_uid,
                count: 10,
            },
        );

        let frames = net.sent_to(1, ids::CHAT_LETTER_LIST_ACK_OK);
        let mut stream = SourceStream::new(frames[0]);
        stream.read_u8().unwrap();
        assert!(!stream.read_bool().unwrap());
        let count = stream.read_u32().unwrap();
        assert_eq!(count, 2);
        assert_ne!(first_uid, second_uid);
    }

    #[test]
    fn test_letter_read_clears_unread() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;
        let bob = seed_character(&fixture.store, "Bob");

        login(&mut fixture, &mut net, 2, bob);
        send_mail(&mut fixture, &mut net, 2, "Alice", "read me");

        let mail_uid = fixture
            .store
            .lock()
            .unwrap()
            .characters
            .immutable(alice, |c| c.mailbox.inbox[0])
            .unwrap();

        login(&mut fixture, &mut net, 1, alice);
        fixture
            .director
            .handle_letter_read(&mut net, 1, LetterRead { mail_uid });

        assert_eq!(net.count_to(1, ids::CHAT_LETTER_READ_ACK_OK), 1);
        let unread = fixture
            .store
            .lock()
            .unwrap()
            .mails
            .immutable(mail_uid, |mail| mail.unread)
            .unwrap();
        assert!(!unread);
    }

    #[test]
    fn test_letter_delete_removes_from_folder() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;
        let bob = seed_character(&fixture.store, "Bob");

        login(&mut fixture, &mut net, 2, bob);
        send_mail(&mut fixture, &mut net, 2, "Alice", "bye");

        let mail_uid = fixture
            .store
            .lock()
            .unwrap()
            .characters
            .immutable(alice, |c| c.mailbox.inbox[0])
            .unwrap();

        login(&mut fixture, &mut net, 1, alice);
        fixture.director.handle_letter_delete(
            &mut net,
            1,
            LetterDelete {
                folder: 0,
                mail_uid,
            },
        );

        assert_eq!(net.count_to(1, ids::CHAT_LETTER_DELETE_ACK_OK), 1);
        let store = fixture.store.lock().unwrap();
        let inbox = store
            .characters
            .immutable(alice, |c| c.mailbox.inbox.clone())
            .unwrap();
        assert!(inbox.is_empty());
        // Bob's sent folder still references the mail, so the record stays.
        assert!(store.mails.contains(mail_uid));
    }

    #[test]
    fn test_channel_info_grants_all_chat_code() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;

        login(&mut fixture, &mut net, 1, alice);
        fixture.director.handle_channel_info(&mut net, 1);

        let frames = net.sent_to(1, ids::CHAT_CHANNEL_INFO_ACK_OK);
        assert_eq!(frames.len(), 1);
        let mut stream = SourceStream::new(frames[0]);
        let code = stream.read_u32().unwrap();

        assert!(fixture
            .otp
            .authorize_code(identity_hash(alice, Destination::AllChat), code));
    }

    #[test]
    fn test_guild_login_reports_roster_status() {
        let mut fixture = fixture();
        let mut net = RecordingConduit::new();
        let alice = fixture.alice;
        let bob = seed_character(&fixture.store, "Bob");

        let guild_uid = fixture.store.lock().unwrap().guilds.create(|guild| {
            guild.name = "Stable".to_string();
            guild.members = vec![alice, bob];
        });

        login(&mut fixture, &mut net, 1, alice);
        net.sent.clear();

        fixture.director.handle_guild_login(
            &mut net,
            1,
            GuildLogin {
                character_uid: alice,
                name: String::new(),
                code: 0,
                guild_uid,
            },
        );

        let frames = net.sent_to(1, ids::CHAT_GUILD_LOGIN_ACK_OK);
        assert_eq!(frames.len(), 1);
        let mut stream = SourceStream::new(frames[0]);
        assert_eq!(stream.read_u8().unwrap(), 2);
        // Alice is connected to the messenger, Bob is not.
        assert_eq!(stream.read_u32().unwrap(), alice);
        assert_eq!(stream.read_u8().unwrap(), Status::Online as u8);
        assert_eq!(stream.read_u32().unwrap(), bob);
        assert_eq!(stream.read_u8().unwrap(), Status::Offline as u8);
    }
}
