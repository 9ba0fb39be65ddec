//! Ranch surface: OTP-gated entry, the presence snapshot relay, ranch chat,
//! equipment/busy-state notifies, and odd jobs.

use crate::protocol::ids;
use crate::protocol::types::{WireCharacter, WireHorse, WireItem};
use crate::protocol::{read_seq_u8, write_seq_u8};
use bridle::shared::{ErrorType, ProtocolError, ProtocolResult};
use bridle::stream::{Command, SinkStream, SourceStream, WireRead, WireWrite};
use stirrup::Uid;

#[derive(Debug, Clone, Default)]
pub struct RanchEnter {
    pub character_uid: Uid,
    pub one_time_password: u32,
    pub rancher_uid: Uid,
}

impl Command for RanchEnter {
    const ID: u16 = ids::RANCH_ENTER;
}

impl WireRead for RanchEnter {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(RanchEnter {
            character_uid: stream.read_u32()?,
            one_time_password: stream.read_u32()?,
            rancher_uid: stream.read_u32()?,
        })
    }
}

/// A horse standing on the ranch, tagged with its ranch-local index.
#[derive(Debug, Clone, Default)]
pub struct RanchHorse {
    pub ranch_index: u16,
    pub horse: WireHorse,
}

impl WireWrite for RanchHorse {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u16(self.ranch_index)?;
        self.horse.write(stream)
    }
}

/// A character present on the ranch with their mount.
#[derive(Debug, Clone, Default)]
pub struct RanchVisitor {
    pub character_uid: Uid,
    pub name: String,
    pub gender: u8,
    pub ranch_index: u16,
    pub busy_state: u8,
    pub character: WireCharacter,
    pub mount: WireHorse,
}

impl WireWrite for RanchVisitor {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.character_uid)?;
        stream.write_string(&self.name)?;
        stream.write_u8(self.gender)?;
        stream.write_u16(self.ranch_index)?;
        stream.write_u8(self.busy_state)?;
        self.character.write(stream)?;
        self.mount.write(stream)
    }
}

/// The entry snapshot: everything the client needs to render the ranch.
#[derive(Debug, Clone, Default)]
pub struct RanchEnterOk {
    pub rancher_uid: Uid,
    pub ranch_name: String,
    pub horses: Vec<RanchHorse>,
    pub visitors: Vec<RanchVisitor>,
}

impl Command for RanchEnterOk {
    const ID: u16 = ids::RANCH_ENTER_OK;
}

impl WireWrite for RanchEnterOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.rancher_uid)?;
        stream.write_string(&self.ranch_name)?;
        write_seq_u8(stream, &self.horses)?;
        write_seq_u8(stream, &self.visitors)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RanchEnterCancel;

impl Command for RanchEnterCancel {
    const ID: u16 = ids::RANCH_ENTER_CANCEL;
}

impl WireWrite for RanchEnterCancel {
    fn write(&self, _stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        Ok(())
    }
}

/// Broadcast to the ranch when a new visitor arrives.
#[derive(Debug, Clone, Default)]
pub struct RanchEnterNotify {
    pub visitor: RanchVisitor,
}

impl Command for RanchEnterNotify {
    const ID: u16 = ids::RANCH_ENTER_NOTIFY;
}

impl WireWrite for RanchEnterNotify {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        self.visitor.write(stream)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RanchLeave;

impl Command for RanchLeave {
    const ID: u16 = ids::RANCH_LEAVE;
}

impl WireRead for RanchLeave {
    fn read(_stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(RanchLeave)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RanchLeaveNotify {
    pub character_uid: Uid,
}

impl Command for RanchLeaveNotify {
    const ID: u16 = ids::RANCH_LEAVE_NOTIFY;
}

impl WireWrite for RanchLeaveNotify {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.character_uid)
    }
}

/// Spatial state blob relayed between co-present clients. `Full` carries the
/// velocity on top of the transform; `Partial` does not.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Full(FullSpatial),
    Partial(PartialSpatial),
}

impl Default for Snapshot {
    fn default() -> Snapshot {
        Snapshot::Partial(PartialSpatial::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FullSpatial {
    pub time: u32,
    pub action: u64,
    pub timer: u16,
    pub member4: [u8; 12],
    pub matrix: [u8; 16],
    pub velocity_x: f32,
    pub velocity_y: f32,
    pub velocity_z: f32,
}

impl WireRead for FullSpatial {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        let mut spatial = FullSpatial {
            time: stream.read_u32()?,
            action: stream.read_u64()?,
            timer: stream.read_u16()?,
            ..FullSpatial::default()
        };
        stream.read_bytes(&mut spatial.member4)?;
        stream.read_bytes(&mut spatial.matrix)?;
        spatial.velocity_x = stream.read_f32()?;
        spatial.velocity_y = stream.read_f32()?;
        spatial.velocity_z = stream.read_f32()?;
        Ok(spatial)
    }
}

impl WireWrite for FullSpatial {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.time)?;
        stream.write_u64(self.action)?;
        stream.write_u16(self.timer)?;
        stream.write_bytes(&self.member4)?;
        stream.write_bytes(&self.matrix)?;
        stream.write_f32(self.velocity_x)?;
        stream.write_f32(self.velocity_y)?;
        stream.write_f32(self.velocity_z)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialSpatial {
    pub time: u32,
    pub action: u64,
    pub timer: u16,
    pub member4: [u8; 12],
    pub matrix: [u8; 16],
}

impl WireRead for PartialSpatial {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        let mut spatial = PartialSpatial {
            time: stream.read_u32()?,
            action: stream.read_u64()?,
            timer: stream.read_u16()?,
            ..PartialSpatial::default()
        };
        stream.read_bytes(&mut spatial.member4)?;
        stream.read_bytes(&mut spatial.matrix)?;
        Ok(spatial)
    }
}

impl WireWrite for PartialSpatial {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.time)?;
        stream.write_u64(self.action)?;
        stream.write_u16(self.timer)?;
        stream.write_bytes(&self.member4)?;
        stream.write_bytes(&self.matrix)
    }
}

impl WireRead for Snapshot {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        match stream.read_u8()? {
            0 => Ok(Snapshot::Full(FullSpatial::read(stream)?)),
            1 => Ok(Snapshot::Partial(PartialSpatial::read(stream)?)),
            _ => Err(ProtocolError::Fatal(ErrorType::MalformedCommand)),
        }
    }
}

impl WireWrite for Snapshot {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        match self {
            Snapshot::Full(spatial) => {
                stream.write_u8(0)?;
                spatial.write(stream)
            }
            Snapshot::Partial(spatial) => {
                stream.write_u8(1)?;
                spatial.write(stream)
            }
        }
    }
}

/// Client-to-server periodic position/state update.
#[derive(Debug, Clone, Default)]
pub struct RanchSnapshot {
    pub snapshot: Snapshot,
}

impl Command for RanchSnapshot {
    const ID: u16 = ids::RANCH_SNAPSHOT;
}

impl WireRead for RanchSnapshot {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(RanchSnapshot {
            snapshot: Snapshot::read(stream)?,
        })
    }
}

/// The relay of a snapshot to every other present client, tagged with the
/// sender's ranch-local index.
#[derive(Debug, Clone, Default)]
pub struct RanchSnapshotNotify {
    pub ranch_index: u16,
    pub snapshot: Snapshot,
}

impl Command for RanchSnapshotNotify {
    const ID: u16 = ids::RANCH_SNAPSHOT_NOTIFY;
}

impl WireWrite for RanchSnapshotNotify {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u16(self.ranch_index)?;
        self.snapshot.write(stream)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RanchChat {
    pub message: String,
}

impl Command for RanchChat {
    const ID: u16 = ids::RANCH_CHAT;
}

impl WireRead for RanchChat {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(RanchChat {
            message: stream.read_string()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RanchChatNotify {
    pub author: String,
    pub message: String,
    pub is_system: bool,
}

impl Command for RanchChatNotify {
    const ID: u16 = ids::RANCH_CHAT_NOTIFY;
}

impl WireWrite for RanchChatNotify {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_string(&self.author)?;
        stream.write_string(&self.message)?;
        stream.write_bool(self.is_system)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBusyState {
    pub busy_state: u8,
}

impl Command for UpdateBusyState {
    const ID: u16 = ids::RANCH_UPDATE_BUSY_STATE;
}

impl WireRead for UpdateBusyState {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(UpdateBusyState {
            busy_state: stream.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBusyStateNotify {
    pub character_uid: Uid,
    pub busy_state: u8,
}

impl Command for UpdateBusyStateNotify {
    const ID: u16 = ids::RANCH_UPDATE_BUSY_STATE_NOTIFY;
}

impl WireWrite for UpdateBusyStateNotify {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.character_uid)?;
        stream.write_u8(self.busy_state)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateEquipment {
    pub character_equipment: Vec<WireItem>,
}

impl Command for UpdateEquipment {
    const ID: u16 = ids::RANCH_UPDATE_EQUIPMENT;
}

impl WireRead for UpdateEquipment {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(UpdateEquipment {
            character_equipment: read_seq_u8(stream)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateEquipmentNotify {
    pub character_uid: Uid,
    pub character_equipment: Vec<WireItem>,
}

impl Command for UpdateEquipmentNotify {
    const ID: u16 = ids::RANCH_UPDATE_EQUIPMENT_NOTIFY;
}

impl WireWrite for UpdateEquipmentNotify {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.character_uid)?;
        write_seq_u8(stream, &self.character_equipment)
    }
}

/// Odd jobs around the ranch paying out carrots.
#[derive(Debug, Clone, Default)]
pub struct RanchStuff {
    pub event_id: u8,
    pub value: i32,
}

impl Command for RanchStuff {
    const ID: u16 = ids::RANCH_STUFF;
}

impl WireRead for RanchStuff {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(RanchStuff {
            event_id: stream.read_u8()?,
            value: stream.read_i32()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RanchStuffOk {
    pub event_id: u8,
    pub value: i32,
    pub total_carrots: u32,
}

impl Command for RanchStuffOk {
    const ID: u16 = ids::RANCH_STUFF_OK;
}

impl WireWrite for RanchStuffOk {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u8(self.event_id)?;
        stream.write_i32(self.value)?;
        stream.write_u32(self.total_carrots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::testing::{from_bytes, to_bytes};

    #[test]
    fn test_snapshot_full_roundtrip() {
        let snapshot = Snapshot::Full(FullSpatial {
            time: 1234,
            action: 0x0102_0304,
            timer: 55,
            member4: [7; 12],
            matrix: [9; 16],
            velocity_x: 1.0,
            velocity_y: -2.5,
            velocity_z: 0.25,
        });

        let back: Snapshot = from_bytes(&to_bytes(&snapshot)).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_snapshot_partial_roundtrip() {
        let snapshot = Snapshot::Partial(PartialSpatial {
            time: 99,
            action: 1,
            timer: 0,
            member4: [0; 12],
            matrix: [1; 16],
        });

        let back: Snapshot = from_bytes(&to_bytes(&snapshot)).unwrap();
        assert_eq!(back, snapshot);

        // The partial variant is 12 bytes shorter; the velocity is absent.
        let full = Snapshot::Full(FullSpatial::default());
        assert_eq!(to_bytes(&full).len() - to_bytes(&snapshot).len(), 12);
    }

    #[test]
    fn test_snapshot_unknown_discriminator_is_malformed() {
        let result: ProtocolResult<Snapshot> = from_bytes(&[2u8]);

        assert_eq!(
            result.unwrap_err(),
            ProtocolError::Fatal(ErrorType::MalformedCommand)
        );
    }

    #[test]
    fn test_ranch_enter_read() {
        let bytes = {
            let mut buf = Vec::new();
            buf.extend_from_slice(&7u32.to_le_bytes());
            buf.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
            buf.extend_from_slice(&3u32.to_le_bytes());
            buf
        };

        let enter: RanchEnter = from_bytes(&bytes).unwrap();

        assert_eq!(enter.character_uid, 7);
        assert_eq!(enter.one_time_password, 0xDEAD_BEEF);
        assert_eq!(enter.rancher_uid, 3);
    }
}
