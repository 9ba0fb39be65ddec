//! Command payload definitions for every subserver surface. Each command is
//! a plain record carrying its wire id through the `Command` trait and a
//! `WireRead`/`WireWrite` impl for the direction it travels. Layouts follow
//! the wire rules: little-endian fixed-width integers, one-byte booleans,
//! NUL-terminated strings, and length-prefixed sequences whose prefix width
//! is part of the command.

pub mod chatter;
pub mod common;
pub mod ids;
pub mod lobby;
pub mod race;
pub mod ranch;
pub mod types;

use bridle::shared::ProtocolResult;
use bridle::stream::{SinkStream, SourceStream, WireRead, WireWrite};

/// Reads a sequence with a one-byte count prefix.
pub fn read_seq_u8<T: WireRead>(stream: &mut SourceStream<'_>) -> ProtocolResult<Vec<T>> {
    let count = stream.read_u8()? as usize;

    let mut items = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        items.push(T::read(stream)?);
    }
    Ok(items)
}

/// Writes a sequence with a one-byte count prefix.
pub fn write_seq_u8<T: WireWrite>(
    stream: &mut SinkStream<'_>,
    items: &[T],
) -> ProtocolResult<()> {
    stream.write_u8(items.len() as u8)?;
    for item in items {
        item.write(stream)?;
    }
    Ok(())
}

/// Writes a sequence with a four-byte count prefix.
pub fn write_seq_u32<T: WireWrite>(
    stream: &mut SinkStream<'_>,
    items: &[T],
) -> ProtocolResult<()> {
    stream.write_u32(items.len() as u32)?;
    for item in items {
        item.write(stream)?;
    }
    Ok(())
}
