use slice_deque::SliceDeque;
use std::io;

type ByteDeque = SliceDeque<u8>;

// Growth granularity; one page-mirrored allocation unit of the deque.
const BUF_INCREMENT: usize = 65536;

/// A buffered FIFO byte queue with a hard ceiling. Data is appended at the
/// tail and read from the head. Frames are assembled by peeking the readable
/// span and consuming whole frames only, so a partial frame never advances
/// the read cursor.
pub struct Buffer {
    data: ByteDeque,
    ceiling: usize,
}

impl Buffer {
    /// Creates a buffer that refuses to hold more than `ceiling` bytes.
    #[inline]
    pub fn new(ceiling: usize) -> Buffer {
        let mut data = ByteDeque::new();
        data.reserve(BUF_INCREMENT.min(ceiling));

        Buffer { data, ceiling }
    }

    /// The number of bytes in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes that may still be appended before the ceiling.
    #[inline]
    pub fn headroom(&self) -> usize {
        self.ceiling - self.data.len()
    }

    /// The readable span, oldest byte first.
    #[inline]
    pub fn peek(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// The readable span, mutable so frames can be descrambled in place.
    #[inline]
    pub fn peek_mut(&mut self) -> &mut [u8] {
        self.data.as_mut_slice()
    }

    /// Drops `count` bytes from the head.
    #[inline]
    pub fn consume(&mut self, count: usize) {
        unsafe { self.data.move_head(count as isize) }
    }

    #[inline]
    pub fn clear(&mut self) {
        let len = self.len();
        self.consume(len);
    }

    /// Appends bytes at the tail. Fails without touching the buffer when the
    /// ceiling would be exceeded.
    #[inline]
    pub fn extend(&mut self, bytes: &[u8]) -> io::Result<()> {
        if bytes.len() > self.headroom() {
            return Err(io::Error::new(io::ErrorKind::Other, "Buffer ceiling reached"));
        }

        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Write the contents of the buffer to the supplied writer, advancing the
    /// read offset past whatever was accepted. A blocking writer ends the
    /// drain; the bytes written so far are reported.
    #[inline]
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let orig_len = self.data.len();

        while !self.data.is_empty() {
            match writer.write(self.data.as_slice()) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(count) => self.consume(count),
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err),
            }
        }

        Ok(orig_len - self.data.len())
    }

    /// Read data from the supplied reader into the buffer until the reader
    /// blocks, the ceiling is reached, or EOF. EOF is reported as a zero-read
    /// error so the connection gets torn down.
    #[inline]
    pub fn ingress<R: io::Read>(&mut self, mut reader: R) -> io::Result<usize> {
        let orig_len = self.data.len();

        while self.data.len() < self.ceiling {
            self.ensure_spare();
            let remaining = self.ceiling - self.data.len();

            unsafe {
                let spare = self.data.tail_head_slice();
                let limit = spare.len().min(remaining);

                match reader.read(&mut spare[..limit]) {
                    Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                    Ok(count) => self.data.move_tail(count as isize),
                    Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                        return Ok(self.data.len() - orig_len);
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        Err(io::Error::new(io::ErrorKind::Other, "Buffer ceiling reached"))
    }

    #[inline]
    fn ensure_spare(&mut self) {
        if unsafe { self.data.tail_head_slice().is_empty() } {
            self.data.reserve(BUF_INCREMENT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::min;
    use std::io::Cursor;

    struct MockSocket {
        data: Vec<u8>,
        cursor: usize,
        chunk: usize,
        max_size: usize,
    }

    impl MockSocket {
        fn new(data: Vec<u8>, chunk: usize, max_size: usize) -> MockSocket {
            MockSocket {
                data,
                cursor: 0,
                chunk,
                max_size,
            }
        }

        fn drained(&mut self) {
            self.data.clear();
            self.cursor = 0;
        }
    }

    impl io::Read for MockSocket {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.cursor == self.data.len() {
                return Err(io::ErrorKind::WouldBlock.into());
            }

            let offset = min(min(self.chunk, buf.len()), self.data.len() - self.cursor);
            buf[..offset].copy_from_slice(&self.data[self.cursor..(self.cursor + offset)]);
            self.cursor += offset;
            Ok(offset)
        }
    }

    impl io::Write for MockSocket {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.data.len() == self.max_size {
                return Err(io::ErrorKind::WouldBlock.into());
            }

            let count = min(self.chunk, buf.len());
            self.data.extend(&buf[..count]);
            Ok(count)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_roundtrip() {
        let mock_data: Vec<_> = (0..BUF_INCREMENT / 2).map(|item| item as u8).collect();
        let mut socket = MockSocket::new(mock_data.clone(), 500, mock_data.len());

        let mut buffer = Buffer::new(BUF_INCREMENT);

        let received = buffer.ingress(&mut socket).unwrap();

        assert_eq!(received, mock_data.len());
        assert_eq!(buffer.len(), mock_data.len());
        assert_eq!(buffer.peek(), &mock_data[..]);

        socket.drained();
        let count = buffer.egress(&mut socket).unwrap();

        assert_eq!(count, mock_data.len());
        assert_eq!(buffer.len(), 0);
        assert_eq!(socket.data[..], mock_data[..]);
    }

    #[test]
    fn test_consume_partial() {
        let mut buffer = Buffer::new(BUF_INCREMENT);
        buffer.extend(&[1, 2, 3, 4, 5]).unwrap();

        buffer.consume(2);

        assert_eq!(buffer.peek(), &[3, 4, 5]);
    }

    #[test]
    fn test_extend_past_ceiling_rejected_without_side_effects() {
        let mut buffer = Buffer::new(8);
        buffer.extend(&[0; 6]).unwrap();

        assert!(buffer.extend(&[0; 3]).is_err());
        assert_eq!(buffer.len(), 6);

        buffer.extend(&[0; 2]).unwrap();
        assert_eq!(buffer.len(), 8);
    }

    #[test]
    fn test_egress_error_on_zero_write() {
        let mut zero_sink = vec![];

        let mut buffer = Buffer::new(BUF_INCREMENT);
        buffer.extend(&[1]).unwrap();

        let result = buffer.egress(&mut zero_sink[..]);

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn test_ingress_ceiling() {
        let mock_data: Vec<_> = (0..BUF_INCREMENT * 2).map(|item| item as u8).collect();

        let mut buffer = Buffer::new(BUF_INCREMENT);

        let err = buffer.ingress(&mock_data[..]).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert_eq!(buffer.len(), BUF_INCREMENT);
    }

    #[test]
    fn test_ingress_eof_is_error() {
        let mut buffer = Buffer::new(BUF_INCREMENT);

        let err = buffer.ingress(Cursor::new(Vec::<u8>::new())).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_descramble_in_place() {
        let mut buffer = Buffer::new(BUF_INCREMENT);
        buffer.extend(&[0xFF, 0x0F]).unwrap();

        for byte in buffer.peek_mut() {
            *byte ^= 0xFF;
        }

        assert_eq!(buffer.peek(), &[0x00, 0xF0]);
    }
}
