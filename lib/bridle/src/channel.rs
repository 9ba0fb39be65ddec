use crate::buffer::Buffer;
use crate::magic::{decode_magic, encode_magic, MessageMagic, BUFFER_SIZE, MAX_FRAME_LENGTH};
use crate::scramble::{chatter_apply, RollingCode, CHATTER_KEY};
use crate::shared::{ClientId, ErrorType, ProtocolError, ProtocolResult};
use crate::stream::SinkStream;
use mio::net::TcpStream;
use std::net::{Shutdown, SocketAddr};
use std::time::{Duration, Instant};
use stirrup::logging;

const READ_BUF_CEILING: usize = 65536;
// The write buffer doubles as the outbound queue; the ceiling is the
// back-pressure bound past which the connection is dropped.
const WRITE_BUF_CEILING: usize = 8 * 65536;
const SCRATCH_SIZE: usize = BUFFER_SIZE as usize;

/// Header size shared by both schemes: the command magic, or the chatter
/// length + command id pair.
pub const HEADER_SIZE: usize = 4;

/// Which wire variant a subserver speaks. Fixed at accept time, never mixed
/// on one connection.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Scheme {
    /// Magic-prefixed frames with the rolling XOR code (lobby, ranch, race).
    Command,
    /// Plain length+id header, fixed XOR key (chat subservers).
    Chatter,
}

enum Scramble {
    Command(RollingCode),
    Chatter,
}

/// A fully descrambled inbound frame, ready for dispatch.
#[derive(Debug, Eq, PartialEq)]
pub struct InboundFrame {
    pub id: u16,
    pub payload: Vec<u8>,
}

/// One TCP connection: the stream, its buffered ingress/egress, and the
/// scramble state both directions share.
pub struct Channel {
    client_id: Option<ClientId>,
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,

    scheme: Scheme,
    scramble: Scramble,

    read_buffer: Buffer,
    write_buffer: Buffer,
    scratch: Box<[u8]>,

    // Close once the write buffer drains; used after terminal replies.
    closing: bool,

    last_ingress: Instant,

    log: logging::Logger,
}

impl Channel {
    #[inline]
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(scheme: Scheme, log: L) -> Channel {
        let now = Instant::now();

        let channel_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::discard(),
        };

        Channel {
            client_id: None,
            stream: None,
            peer: None,
            scheme,
            scramble: Self::fresh_scramble(scheme),
            read_buffer: Buffer::new(READ_BUF_CEILING),
            write_buffer: Buffer::new(WRITE_BUF_CEILING),
            scratch: vec![0u8; SCRATCH_SIZE].into_boxed_slice(),
            closing: false,
            last_ingress: now,
            log: channel_log,
        }
    }

    #[inline]
    fn fresh_scramble(scheme: Scheme) -> Scramble {
        match scheme {
            Scheme::Command => Scramble::Command(RollingCode::initial()),
            Scheme::Chatter => Scramble::Chatter,
        }
    }

    /// Opens the channel over a freshly accepted stream. The channel must be
    /// closed for this operation to succeed.
    #[inline]
    pub fn open(&mut self, client_id: ClientId, stream: TcpStream, peer: SocketAddr, now: Instant) {
        if self.stream.is_some() {
            panic!("Attempted to open an already open channel");
        }

        self.client_id = Some(client_id);
        self.stream = Some(stream);
        self.peer = Some(peer);
        self.scramble = Self::fresh_scramble(self.scheme);
        self.closing = false;
        self.last_ingress = now;

        logging::debug!(self.log, "channel opened";
                        "context" => "open",
                        "client_id" => client_id,
                        "peer" => %peer);
    }

    /// Closes the channel and the underlying stream, clearing all buffered
    /// data and the scramble state.
    #[inline]
    pub fn close(&mut self) {
        logging::debug!(self.log, "closing channel";
                        "context" => "close",
                        "client_id" => self.client_id,
                        "read_size" => self.read_buffer.len(),
                        "write_size" => self.write_buffer.len());

        self.read_buffer.clear();
        self.write_buffer.clear();
        self.scramble = Self::fresh_scramble(self.scheme);
        self.closing = false;
        self.client_id = None;
        self.peer = None;

        if let Some(stream) = self.stream.take() {
            drop(stream.shutdown(Shutdown::Both));
        }
    }

    #[inline]
    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    #[inline]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    #[inline]
    pub fn stream(&self) -> Option<&TcpStream> {
        self.stream.as_ref()
    }

    /// Returns true if there is outgoing data waiting on the channel.
    #[inline]
    pub fn has_egress(&self) -> bool {
        !self.write_buffer.is_empty()
    }

    /// Marks the channel to be torn down once the write buffer drains.
    #[inline]
    pub fn close_after_flush(&mut self) {
        self.closing = true;
    }

    #[inline]
    pub fn is_draining(&self) -> bool {
        self.closing
    }

    #[inline]
    pub fn last_ingress_elapsed(&self, now: Instant) -> Duration {
        now.duration_since(self.last_ingress)
    }

    /// Resets the rolling code to zero. A no-op on chatter channels.
    #[inline]
    pub fn reset_code(&mut self) {
        if let Scramble::Command(ref mut code) = self.scramble {
            logging::debug!(self.log, "rolling code reset";
                            "context" => "reset_code",
                            "client_id" => self.client_id);
            code.reset();
        }
    }

    /// Reads all available data off the network, updating the last ingress
    /// time when anything arrived.
    #[inline]
    pub fn receive(&mut self, now: Instant) -> ProtocolResult<usize> {
        let stream = self.stream.as_ref().expect("Channel must have valid stream");
        let received = self.read_buffer.ingress(stream).map_err(ProtocolError::from)?;

        if received > 0 {
            self.last_ingress = now;
        }

        Ok(received)
    }

    /// Sends as much buffered data as the socket accepts.
    #[inline]
    pub fn send(&mut self) -> ProtocolResult<usize> {
        if self.write_buffer.is_empty() {
            return Ok(0);
        }

        let stream = self.stream.as_ref().expect("Channel must have valid stream");
        self.write_buffer.egress(stream).map_err(ProtocolError::from)
    }

    /// Extracts the next complete frame from the read buffer, descrambled.
    /// Returns `None` while the buffered bytes stop short of a whole frame;
    /// partial frames never advance the read cursor, so bytes arriving in any
    /// split decode identically.
    pub fn next_frame(&mut self) -> ProtocolResult<Option<InboundFrame>> {
        if self.read_buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let (id, length) = self.decode_header()?;

        if length < HEADER_SIZE || length > MAX_FRAME_LENGTH as usize {
            logging::warn!(self.log, "frame length out of bounds";
                           "context" => "next_frame",
                           "client_id" => self.client_id,
                           "command_id" => id,
                           "length" => length);
            return Err(ProtocolError::Fatal(ErrorType::FrameBounds));
        }

        if self.read_buffer.len() < length {
            return Ok(None);
        }

        let payload = self.descramble_payload(length);
        self.read_buffer.consume(length);

        logging::trace!(self.log, "frame extracted";
                        "context" => "next_frame",
                        "client_id" => self.client_id,
                        "command_id" => id,
                        "length" => length);

        Ok(Some(InboundFrame { id, payload }))
    }

    fn decode_header(&self) -> ProtocolResult<(u16, usize)> {
        let head = self.read_buffer.peek();

        match self.scheme {
            Scheme::Command => {
                let value = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
                let magic = decode_magic(value);
                Ok((magic.id, magic.length as usize))
            }
            Scheme::Chatter => {
                let length = u16::from_le_bytes([
                    head[0] ^ CHATTER_KEY[0],
                    head[1] ^ CHATTER_KEY[1],
                ]);
                let id = u16::from_le_bytes([
                    head[2] ^ CHATTER_KEY[2],
                    head[3] ^ CHATTER_KEY[3],
                ]);
                Ok((id, length as usize))
            }
        }
    }

    /// Descrambles `buffer[4..length]` in place and copies it out. The
    /// rolling code advances once per frame that carries a payload.
    fn descramble_payload(&mut self, length: usize) -> Vec<u8> {
        let span = &mut self.read_buffer.peek_mut()[HEADER_SIZE..length];

        match self.scramble {
            Scramble::Command(ref mut code) => {
                if !span.is_empty() {
                    code.apply(span);
                    code.roll();
                }
            }
            Scramble::Chatter => {
                for (idx, byte) in span.iter_mut().enumerate() {
                    *byte ^= CHATTER_KEY[(HEADER_SIZE + idx) % 4];
                }
            }
        }

        span.to_vec()
    }

    /// Assembles one outbound frame: reserve the header, run the payload
    /// writer, stamp the header, scramble, and append to the write buffer.
    /// Exceeding the write-buffer ceiling is fatal for the connection.
    pub fn write_frame(
        &mut self,
        id: u16,
        writer: &mut dyn FnMut(&mut SinkStream<'_>) -> ProtocolResult<()>,
    ) -> ProtocolResult<()> {
        let length = {
            let mut sink = SinkStream::new(&mut self.scratch);
            sink.seek(HEADER_SIZE)?;
            writer(&mut sink)?;
            sink.cursor()
        };

        match self.scramble {
            Scramble::Command(ref code) => {
                let value = encode_magic(MessageMagic {
                    id,
                    length: length as u16,
                });
                self.scratch[..HEADER_SIZE].copy_from_slice(&value.to_le_bytes());
                code.apply(&mut self.scratch[HEADER_SIZE..length]);
            }
            Scramble::Chatter => {
                self.scratch[..2].copy_from_slice(&(length as u16).to_le_bytes());
                self.scratch[2..4].copy_from_slice(&id.to_le_bytes());
                chatter_apply(&mut self.scratch[..length]);
            }
        }

        logging::trace!(self.log, "frame queued";
                        "context" => "write_frame",
                        "client_id" => self.client_id,
                        "command_id" => id,
                        "length" => length);

        self.write_buffer
            .extend(&self.scratch[..length])
            .map_err(|_| ProtocolError::Fatal(ErrorType::BackPressure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::SourceStream;
    use std::mem;

    fn command_channel() -> Channel {
        Channel::new(Scheme::Command, None)
    }

    fn chatter_channel() -> Channel {
        Channel::new(Scheme::Chatter, None)
    }

    /// Moves everything the channel queued for sending into its own read
    /// buffer, as if the peer echoed the bytes back.
    fn loop_back(channel: &mut Channel) {
        let mut read = Buffer::new(READ_BUF_CEILING);
        mem::swap(&mut channel.write_buffer, &mut channel.read_buffer);
        mem::swap(&mut channel.write_buffer, &mut read);
    }

    #[test]
    fn test_command_frame_roundtrip() {
        let mut channel = command_channel();

        channel
            .write_frame(0x0007, &mut |sink| {
                sink.write_u32(0xAABB_CCDD)?;
                sink.write_string("alice")
            })
            .unwrap();

        loop_back(&mut channel);

        let frame = channel.next_frame().unwrap().expect("one whole frame");
        assert_eq!(frame.id, 0x0007);

        let mut source = SourceStream::new(&frame.payload);
        assert_eq!(source.read_u32().unwrap(), 0xAABB_CCDD);
        assert_eq!(source.read_string().unwrap(), "alice");
        assert_eq!(channel.read_buffer.len(), 0);
    }

    #[test]
    fn test_command_payload_is_scrambled_on_the_wire() {
        let mut channel = command_channel();

        channel
            .write_frame(0x0007, &mut |sink| sink.write_u32(0))
            .unwrap();

        // Zero plaintext XORed with the initial code must not stay zero.
        let wire = channel.write_buffer.peek();
        assert_ne!(&wire[HEADER_SIZE..], &[0u8; 4][..]);
    }

    #[test]
    fn test_rolling_code_advances_per_inbound_frame() {
        let mut channel = command_channel();

        channel
            .write_frame(0x0010, &mut |sink| sink.write_u16(1))
            .unwrap();
        channel
            .write_frame(0x0010, &mut |sink| sink.write_u16(2))
            .unwrap();

        loop_back(&mut channel);

        // The second outbound frame was scrambled with the same (un-rolled)
        // code, but inbound reading rolls after the first frame, so only the
        // first frame decodes cleanly against the shared state.
        let first = channel.next_frame().unwrap().unwrap();
        let mut source = SourceStream::new(&first.payload);
        assert_eq!(source.read_u16().unwrap(), 1);

        let second = channel.next_frame().unwrap().unwrap();
        let mut source = SourceStream::new(&second.payload);
        assert_ne!(source.read_u16().unwrap(), 2);
    }

    #[test]
    fn test_empty_payload_does_not_roll() {
        let mut channel = command_channel();

        channel.write_frame(0x0012, &mut |_| Ok(())).unwrap();
        channel
            .write_frame(0x0010, &mut |sink| sink.write_u16(7))
            .unwrap();

        loop_back(&mut channel);

        let heartbeat = channel.next_frame().unwrap().unwrap();
        assert_eq!(heartbeat.id, 0x0012);
        assert!(heartbeat.payload.is_empty());

        // The code did not advance on the empty frame, so the next payload
        // still decodes against the shared state.
        let frame = channel.next_frame().unwrap().unwrap();
        let mut source = SourceStream::new(&frame.payload);
        assert_eq!(source.read_u16().unwrap(), 7);
    }

    #[test]
    fn test_split_arrival_yields_single_frame() {
        let mut reference = command_channel();
        reference
            .write_frame(0x0007, &mut |sink| sink.write_u64(0x1122_3344_5566_7788))
            .unwrap();
        let wire: Vec<u8> = reference.write_buffer.peek().to_vec();

        // Deliver the same bytes in every possible split.
        for split in 1..wire.len() {
            let mut channel = command_channel();

            channel.read_buffer.extend(&wire[..split]).unwrap();
            assert_eq!(channel.next_frame().unwrap(), None, "split={}", split);

            channel.read_buffer.extend(&wire[split..]).unwrap();
            let frame = channel.next_frame().unwrap().expect("whole frame");
            assert_eq!(frame.id, 0x0007);

            let mut source = SourceStream::new(&frame.payload);
            assert_eq!(source.read_u64().unwrap(), 0x1122_3344_5566_7788);

            // And exactly one frame came out.
            assert_eq!(channel.next_frame().unwrap(), None);
        }
    }

    #[test]
    fn test_bad_length_is_fatal() {
        let mut channel = command_channel();

        // A magic with the frame-present bit unset decodes to length zero.
        channel.read_buffer.extend(&[0u8; 8]).unwrap();

        assert_eq!(
            channel.next_frame().unwrap_err(),
            ProtocolError::Fatal(ErrorType::FrameBounds)
        );
    }

    #[test]
    fn test_reset_code_gives_zero_scramble() {
        let mut channel = command_channel();
        channel.reset_code();

        channel
            .write_frame(0x0008, &mut |sink| sink.write_u32(0x0102_0304))
            .unwrap();

        // Zero code scrambling is the identity; payload rides in plain.
        let wire = channel.write_buffer.peek();
        assert_eq!(&wire[HEADER_SIZE..], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_chatter_frame_roundtrip() {
        let mut channel = chatter_channel();

        channel
            .write_frame(0x3C1E, &mut |sink| {
                sink.write_u32(99)?;
                sink.write_string("hi")
            })
            .unwrap();

        loop_back(&mut channel);

        let frame = channel.next_frame().unwrap().expect("one whole frame");
        assert_eq!(frame.id, 0x3C1E);

        let mut source = SourceStream::new(&frame.payload);
        assert_eq!(source.read_u32().unwrap(), 99);
        assert_eq!(source.read_string().unwrap(), "hi");
    }

    #[test]
    fn test_chatter_header_is_xored_with_key_prefix() {
        let mut channel = chatter_channel();

        channel.write_frame(0x3C2A, &mut |_| Ok(())).unwrap();

        let wire = channel.write_buffer.peek();
        let length = u16::from_le_bytes([wire[0], wire[1]]);
        let id = u16::from_le_bytes([wire[2], wire[3]]);

        assert_eq!(length, 4u16 ^ 0xFE2B);
        assert_eq!(id, 0x3C2A ^ 0x02B8);
    }

    #[test]
    fn test_chatter_frames_share_no_rolling_state() {
        let mut channel = chatter_channel();

        for value in 0..4u32 {
            channel
                .write_frame(0x3C1E, &mut |sink| sink.write_u32(value))
                .unwrap();
        }

        loop_back(&mut channel);

        for value in 0..4u32 {
            let frame = channel.next_frame().unwrap().unwrap();
            let mut source = SourceStream::new(&frame.payload);
            assert_eq!(source.read_u32().unwrap(), value);
        }
    }

    #[test]
    fn test_back_pressure_is_fatal() {
        let mut channel = command_channel();

        let result = loop {
            let result = channel.write_frame(0x0010, &mut |sink| {
                sink.write_bytes(&[0u8; 4000])
            });
            if result.is_err() {
                break result;
            }
        };

        assert_eq!(
            result.unwrap_err(),
            ProtocolError::Fatal(ErrorType::BackPressure)
        );
    }
}
