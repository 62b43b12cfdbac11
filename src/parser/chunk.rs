/// What the framing callback found at the front of the buffered bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// A whole record of this many bytes was handled; skip past it.
    Record(usize),
    /// Not enough bytes yet; keep everything from here on.
    Incomplete,
    /// The stream is unreadable from here on; drop what is buffered.
    Corrupt,
}

/// Growable byte buffer for one producer stream.
///
/// Producers hand over slices with no record alignment. `consume` walks the
/// buffered bytes record by record and keeps the trailing partial record
/// for the next call.
#[derive(Debug, Default)]
pub struct ChunkReassembler {
    buf: Vec<u8>,
    total_bytes: u64,
    analyzed_bytes: u64,
    discarded_bytes: u64,
}

impl ChunkReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        self.total_bytes += data.len() as u64;
    }

    /// Bytes waiting for the rest of their record.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn analyzed_bytes(&self) -> u64 {
        self.analyzed_bytes
    }

    pub fn discarded_bytes(&self) -> u64 {
        self.discarded_bytes
    }

    /// Hand back the unframed tail for a final parse, counting it as
    /// analyzed.
    pub fn take_remainder(&mut self) -> Vec<u8> {
        self.analyzed_bytes += self.buf.len() as u64;
        std::mem::take(&mut self.buf)
    }

    /// Feed buffered bytes to `frame` until it reports `Incomplete` or
    /// `Corrupt`. Returns the number of records consumed.
    pub fn consume<F>(&mut self, mut frame: F) -> usize
    where
        F: FnMut(&[u8]) -> Frame,
    {
        let mut offset = 0;
        let mut records = 0;

        while offset < self.buf.len() {
            let rest = &self.buf[offset..];
            match frame(rest) {
                Frame::Record(n) if n > 0 && n <= rest.len() => {
                    offset += n;
                    records += 1;
                }
                Frame::Record(n) if n > rest.len() => break,
                Frame::Incomplete => break,
                Frame::Record(_) | Frame::Corrupt => {
                    let dropped = rest.len();
                    self.discarded_bytes += dropped as u64;
                    tracing::warn!(
                        dropped_bytes = dropped,
                        "corrupt record header, discarding buffered data"
                    );
                    self.buf.clear();
                    self.analyzed_bytes += offset as u64;
                    return records;
                }
            }
        }

        self.analyzed_bytes += offset as u64;
        self.buf.drain(..offset);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(size: usize) -> impl FnMut(&[u8]) -> Frame {
        move |data: &[u8]| {
            if data.len() < size {
                Frame::Incomplete
            } else {
                Frame::Record(size)
            }
        }
    }

    #[test]
    fn test_consumes_whole_records_and_keeps_tail() {
        let mut r = ChunkReassembler::new();
        r.append(&[0u8; 10]);
        assert_eq!(r.consume(fixed(4)), 2);
        assert_eq!(r.pending(), 2);
        assert_eq!(r.analyzed_bytes(), 8);

        r.append(&[0u8; 2]);
        assert_eq!(r.consume(fixed(4)), 1);
        assert_eq!(r.pending(), 0);
        assert_eq!(r.total_bytes(), 12);
        assert_eq!(r.analyzed_bytes(), 12);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut r = ChunkReassembler::new();
        let mut seen = 0;
        for b in 0..64u8 {
            r.append(&[b]);
            seen += r.consume(fixed(64));
        }
        assert_eq!(seen, 1);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn test_corrupt_discards_everything() {
        let mut r = ChunkReassembler::new();
        r.append(&[1, 1, 0, 9, 9, 9]);
        // First byte is a 1-byte record length; zero means corrupt.
        let records = r.consume(|data: &[u8]| match data.first() {
            Some(0) => Frame::Corrupt,
            Some(&n) => Frame::Record(n as usize),
            None => Frame::Incomplete,
        });
        assert_eq!(records, 2);
        assert_eq!(r.pending(), 0);
        assert_eq!(r.discarded_bytes(), 4);
        assert_eq!(r.analyzed_bytes(), 2);
    }

    #[test]
    fn test_zero_length_record_is_corrupt() {
        let mut r = ChunkReassembler::new();
        r.append(&[0u8; 8]);
        assert_eq!(r.consume(|_: &[u8]| Frame::Record(0)), 0);
        assert_eq!(r.pending(), 0);
        assert_eq!(r.discarded_bytes(), 8);
    }

    #[test]
    fn test_take_remainder() {
        let mut r = ChunkReassembler::new();
        r.append(b"1:a");
        assert_eq!(r.take_remainder(), b"1:a".to_vec());
        assert_eq!(r.pending(), 0);
        assert_eq!(r.analyzed_bytes(), 3);
    }

    #[test]
    fn test_oversized_record_waits() {
        let mut r = ChunkReassembler::new();
        r.append(&[0u8; 8]);
        assert_eq!(r.consume(|_: &[u8]| Frame::Record(16)), 0);
        assert_eq!(r.pending(), 8);
        assert_eq!(r.discarded_bytes(), 0);
    }
}
