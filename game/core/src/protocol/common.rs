//! Commands shared by more than one subserver surface.

use crate::protocol::ids;
use bridle::shared::ProtocolResult;
use bridle::stream::{Command, SinkStream, SourceStream, WireRead, WireWrite};
use stirrup::Uid;

/// Keepalive; consumed for its effect on the connection's last-activity
/// timestamp, no reply.
#[derive(Debug, Clone, Default)]
pub struct Heartbeat;

impl Command for Heartbeat {
    const ID: u16 = ids::HEARTBEAT;
}

impl WireRead for Heartbeat {
    fn read(_stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(Heartbeat)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InviteUser {
    pub recipient_uid: Uid,
    pub recipient_name: String,
}

impl Command for InviteUser {
    const ID: u16 = ids::RANCH_INVITE_USER;
}

impl WireRead for InviteUser {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(InviteUser {
            recipient_uid: stream.read_u32()?,
            recipient_name: stream.read_string()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct InviteUserOk {
    pub recipient_uid: Uid,
    pub recipient_name: String,
}

impl Command for InviteUserOk {
    const ID: u16 = ids::RANCH_INVITE_USER_OK;
}

impl WireWrite for InviteUserOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.recipient_uid)?;
        stream.write_string(&self.recipient_name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InviteUserCancel {
    pub recipient_uid: Uid,
    pub recipient_name: String,
}

impl Command for InviteUserCancel {
    const ID: u16 = ids::RANCH_INVITE_USER_CANCEL;
}

impl WireWrite for InviteUserCancel {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.recipient_uid)?;
        stream.write_string(&self.recipient_name)
    }
}
