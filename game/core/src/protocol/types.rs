//! Wire projections of the shared game records. These are the nested
//! structures several commands embed: character appearance, horses, items.

use crate::data;
use bridle::shared::ProtocolResult;
use bridle::stream::{SinkStream, SourceStream, WireRead, WireWrite};
use stirrup::Uid;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireItem {
    pub uid: Uid,
    pub tid: u32,
    pub count: u32,
}

impl WireItem {
    pub fn from_record(item: &data::Item) -> WireItem {
        WireItem {
            uid: item.uid,
            tid: item.tid,
            count: item.count,
        }
    }
}

impl WireRead for WireItem {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(WireItem {
            uid: stream.read_u32()?,
            tid: stream.read_u32()?,
            count: stream.read_u32()?,
        })
    }
}

impl WireWrite for WireItem {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.uid)?;
        stream.write_u32(self.tid)?;
        stream.write_u32(self.count)
    }
}

/// Character looks: the part selection and the body shape sliders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireCharacter {
    pub char_id: u8,
    pub mouth_id: u8,
    pub face_id: u8,
    pub head_size: u8,
    pub height: u8,
    pub thigh_volume: u8,
    pub leg_volume: u8,
}

impl WireCharacter {
    pub fn from_record(character: &data::Character) -> WireCharacter {
        WireCharacter {
            char_id: character.parts.char_id,
            mouth_id: character.parts.mouth_id,
            face_id: character.parts.face_id,
            head_size: character.shape.head_size,
            height: character.shape.height,
            thigh_volume: character.shape.thigh_volume,
            leg_volume: character.shape.leg_volume,
        }
    }

    pub fn parts(&self) -> data::CharacterParts {
        data::CharacterParts {
            char_id: self.char_id,
            mouth_id: self.mouth_id,
            face_id: self.face_id,
        }
    }

    pub fn shape(&self) -> data::CharacterShape {
        data::CharacterShape {
            head_size: self.head_size,
            height: self.height,
            thigh_volume: self.thigh_volume,
            leg_volume: self.leg_volume,
        }
    }
}

impl WireRead for WireCharacter {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(WireCharacter {
            char_id: stream.read_u8()?,
            mouth_id: stream.read_u8()?,
            face_id: stream.read_u8()?,
            head_size: stream.read_u8()?,
            height: stream.read_u8()?,
            thigh_volume: stream.read_u8()?,
            leg_volume: stream.read_u8()?,
        })
    }
}

impl WireWrite for WireCharacter {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u8(self.char_id)?;
        stream.write_u8(self.mouth_id)?;
        stream.write_u8(self.face_id)?;
        stream.write_u8(self.head_size)?;
        stream.write_u8(self.height)?;
        stream.write_u8(self.thigh_volume)?;
        stream.write_u8(self.leg_volume)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireHorse {
    pub uid: Uid,
    pub tid: u32,
    pub name: String,
    pub skin_id: u8,
    pub mane_id: u8,
    pub tail_id: u8,
    pub face_id: u8,
    pub scale: u8,
    pub leg_length: u8,
    pub leg_volume: u8,
    pub body_length: u8,
    pub body_volume: u8,
    pub agility: u16,
    pub spirit: u16,
    pub speed: u16,
    pub strength: u16,
    pub ambition: u16,
    pub grade: u8,
    pub growth_points: u8,
}

impl WireHorse {
    pub fn from_record(horse: &data::Horse) -> WireHorse {
        WireHorse {
            uid: horse.uid,
            tid: horse.tid,
            name: horse.name.clone(),
            skin_id: horse.parts.skin_id,
            mane_id: horse.parts.mane_id,
            tail_id: horse.parts.tail_id,
            face_id: horse.parts.face_id,
            scale: horse.shape.scale,
            leg_length: horse.shape.leg_length,
            leg_volume: horse.shape.leg_volume,
            body_length: horse.shape.body_length,
            body_volume: horse.shape.body_volume,
            agility: horse.stats.agility,
            spirit: horse.stats.spirit,
            speed: horse.stats.speed,
            strength: horse.stats.strength,
            ambition: horse.stats.ambition,
            grade: horse.grade,
            growth_points: horse.growth_points,
        }
    }
}

impl WireRead for WireHorse {
    fn read(stream: &mut SourceStream<'_>) -> ProtocolResult<Self> {
        Ok(WireHorse {
            uid: stream.read_u32()?,
            tid: stream.read_u32()?,
            name: stream.read_string()?,
            skin_id: stream.read_u8()?,
            mane_id: stream.read_u8()?,
            tail_id: stream.read_u8()?,
            face_id: stream.read_u8()?,
            scale: stream.read_u8()?,
            leg_length: stream.read_u8()?,
            leg_volume: stream.read_u8()?,
            body_length: stream.read_u8()?,
            body_volume: stream.read_u8()?,
            agility: stream.read_u16()?,
            spirit: stream.read_u16()?,
            speed: stream.read_u16()?,
            strength: stream.read_u16()?,
            ambition: stream.read_u16()?,
            grade: stream.read_u8()?,
            growth_points: stream.read_u8()?,
        })
    }
}

impl WireWrite for WireHorse {
    fn write(&self, stream: &mut SinkStream<'_>) -> ProtocolResult<()> {
        stream.write_u32(self.uid)?;
        stream.write_u32(self.tid)?;
        stream.write_string(&self.name)?;
        stream.write_u8(self.skin_id)?;
        stream.write_u8(self.mane_id)?;
        stream.write_u8(self.tail_id)?;
        stream.write_u8(self.face_id)?;
        stream.write_u8(self.scale)?;
        stream.write_u8(self.leg_length)?;
        stream.write_u8(self.leg_volume)?;
        stream.write_u8(self.body_length)?;
        stream.write_u8(self.body_volume)?;
        stream.write_u16(self.agility)?;
        stream.write_u16(self.spirit)?;
        stream.write_u16(self.speed)?;
        stream.write_u16(self.strength)?;
        stream.write_u16(self.ambition)?;
        stream.write_u8(self.grade)?;
        stream.write_u8(self.growth_points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::testing::{from_bytes, to_bytes};

    #[test]
    fn test_wire_horse_roundtrip() {
        let horse = WireHorse {
            uid: 7,
            tid: 20002,
            name: "Starlight".to_string(),
            skin_id: 2,
            mane_id: 3,
            tail_id: 3,
            face_id: 3,
            scale: 4,
            leg_length: 4,
            leg_volume: 5,
            body_length: 3,
            body_volume: 4,
            agility: 9,
            spirit: 9,
            speed: 9,
            strength: 9,
            ambition: 19,
            grade: 5,
            growth_points: 2,
        };

        let back: WireHorse = from_bytes(&to_bytes(&horse)).unwrap();
        assert_eq!(back, horse);
    }

    #[test]
    fn test_wire_character_roundtrip() {
        let character = WireCharacter {
            char_id: 10,
            mouth_id: 1,
            face_id: 2,
            head_size: 1,
            height: 1,
            thigh_volume: 1,
            leg_volume: 1,
        };

        let back: WireCharacter = from_bytes(&to_bytes(&character)).unwrap();
        assert_eq!(back, character);
    }
}
