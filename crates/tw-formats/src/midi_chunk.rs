//! Tagged, length-prefixed byte buffer with a read cursor.

use std::io::{Read, Write};

use crate::FormatError;

/// Largest value a MIDI variable-length quantity can carry (28 bits).
pub const VLQ_MAX: u32 = 0x0FFF_FFFF;

/// A MIDI chunk: 4-byte ASCII tag, big-endian length prefix, payload.
///
/// The same type serves writing (push methods append to the payload) and
/// reading (read methods consume through an internal cursor).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MidiChunk {
    tag: [u8; 4],
    data: Vec<u8>,
    cursor: usize,
}

impl MidiChunk {
    pub fn new(tag: [u8; 4]) -> Self {
        Self {
            tag,
            data: Vec::new(),
            cursor: 0,
        }
    }

    pub fn tag(&self) -> [u8; 4] {
        self.tag
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left to read from the cursor position.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Rewind the read cursor to the start of the payload.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    // --- Writing ---

    pub fn push_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    pub fn push_u16(&mut self, v: u16) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn push_u32(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append a variable-length quantity: big-endian 7-bit groups, bit 7
    /// set on every byte except the last, at most 4 bytes. Values above
    /// `VLQ_MAX` are capped.
    pub fn push_variable_size(&mut self, value: u32) {
        let value = value.min(VLQ_MAX);
        let mut groups = [0u8; 4];
        let mut count = 0;
        let mut rest = value;
        loop {
            groups[count] = (rest & 0x7F) as u8;
            count += 1;
            rest >>= 7;
            if rest == 0 {
                break;
            }
        }
        for i in (0..count).rev() {
            let mut byte = groups[i];
            if i != 0 {
                byte |= 0x80;
            }
            self.data.push(byte);
        }
    }

    // --- Reading ---

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        let v = *self.data.get(self.cursor).ok_or(FormatError::UnexpectedEof)?;
        self.cursor += 1;
        Ok(v)
    }

    /// Next byte without consuming it.
    pub fn peek_u8(&self) -> Result<u8, FormatError> {
        self.data
            .get(self.cursor)
            .copied()
            .ok_or(FormatError::UnexpectedEof)
    }

    pub fn read_u16(&mut self) -> Result<u16, FormatError> {
        Ok(u16::from_be_bytes([self.read_u8()?, self.read_u8()?]))
    }

    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        Ok(u32::from_be_bytes([
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
        ]))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&[u8], FormatError> {
        if self.cursor + n > self.data.len() {
            return Err(FormatError::UnexpectedEof);
        }
        let slice = &self.data[self.cursor..self.cursor + n];
        self.cursor += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), FormatError> {
        if self.cursor + n > self.data.len() {
            return Err(FormatError::UnexpectedEof);
        }
        self.cursor += n;
        Ok(())
    }

    /// Read a variable-length quantity. A group with no terminating byte
    /// (bit 7 clear) within 4 bytes is an error rather than a silent zero.
    pub fn read_variable_length(&mut self) -> Result<u32, FormatError> {
        let mut value: u32 = 0;
        for _ in 0..4 {
            let byte = self.read_u8()?;
            value = (value << 7) | (byte & 0x7F) as u32;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(FormatError::BadVariableLength)
    }

    // --- Chunk-level I/O ---

    /// Serialize as tag + 4-byte big-endian length + payload.
    pub fn write_to(&self, w: &mut impl Write) -> Result<(), FormatError> {
        w.write_all(&self.tag)?;
        w.write_all(&(self.data.len() as u32).to_be_bytes())?;
        w.write_all(&self.data)?;
        Ok(())
    }

    /// Read one tagged chunk (tag, big-endian length, payload).
    pub fn read_from(r: &mut impl Read) -> Result<Self, FormatError> {
        let mut tag = [0u8; 4];
        r.read_exact(&mut tag)
            .map_err(|_| FormatError::UnexpectedEof)?;
        let mut len_bytes = [0u8; 4];
        r.read_exact(&mut len_bytes)
            .map_err(|_| FormatError::UnexpectedEof)?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        let mut data = vec![0u8; len];
        r.read_exact(&mut data)
            .map_err(|_| FormatError::UnexpectedEof)?;
        Ok(Self {
            tag,
            data,
            cursor: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: u32) -> u32 {
        let mut chunk = MidiChunk::new(*b"MTrk");
        chunk.push_variable_size(value);
        chunk.read_variable_length().unwrap()
    }

    #[test]
    fn vlq_boundary_values_round_trip() {
        for v in [
            0u32, 1, 127, 128, 0x3FFF, 0x4000, 0x1F_FFFF, 0x20_0000, 0x0FFF_FFFF,
        ] {
            assert_eq!(roundtrip(v), v, "VLQ round trip failed for {:#x}", v);
        }
    }

    #[test]
    fn vlq_oversized_value_is_capped() {
        assert_eq!(roundtrip(u32::MAX), VLQ_MAX);
    }

    #[test]
    fn vlq_known_encodings() {
        // Examples from the SMF specification
        let cases: [(u32, &[u8]); 4] = [
            (0x00, &[0x00]),
            (0x40, &[0x40]),
            (0x7F, &[0x7F]),
            (0x80, &[0x81, 0x00]),
        ];
        for (value, encoding) in cases {
            let mut chunk = MidiChunk::new(*b"MTrk");
            chunk.push_variable_size(value);
            assert_eq!(chunk.data(), encoding, "encoding of {:#x}", value);
        }
    }

    #[test]
    fn vlq_missing_terminator_is_an_error() {
        let mut chunk = MidiChunk::new(*b"MTrk");
        chunk.push_bytes(&[0x80, 0x80, 0x80, 0x80, 0x80]);
        assert!(matches!(
            chunk.read_variable_length(),
            Err(FormatError::BadVariableLength)
        ));
    }

    #[test]
    fn vlq_truncated_is_eof() {
        let mut chunk = MidiChunk::new(*b"MTrk");
        chunk.push_bytes(&[0x81]);
        assert!(matches!(
            chunk.read_variable_length(),
            Err(FormatError::UnexpectedEof)
        ));
    }

    #[test]
    fn big_endian_integers_round_trip() {
        let mut chunk = MidiChunk::new(*b"MThd");
        chunk.push_u16(0xBEEF);
        chunk.push_u32(0xDEAD_BEEF);
        assert_eq!(chunk.data()[0], 0xBE);
        assert_eq!(chunk.read_u16().unwrap(), 0xBEEF);
        assert_eq!(chunk.read_u32().unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn read_past_end_is_eof() {
        let mut chunk = MidiChunk::new(*b"MTrk");
        chunk.push_u8(1);
        chunk.read_u8().unwrap();
        assert!(matches!(chunk.read_u8(), Err(FormatError::UnexpectedEof)));
    }

    #[test]
    fn chunk_io_round_trip() {
        let mut chunk = MidiChunk::new(*b"MTrk");
        chunk.push_bytes(&[1, 2, 3, 4, 5]);

        let mut buf = Vec::new();
        chunk.write_to(&mut buf).unwrap();
        assert_eq!(&buf[..4], b"MTrk");
        assert_eq!(&buf[4..8], &5u32.to_be_bytes());

        let parsed = MidiChunk::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(parsed.tag(), *b"MTrk");
        assert_eq!(parsed.data(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn truncated_chunk_is_eof() {
        let bytes = b"MTrk\x00\x00\x00\x10only-a-few";
        assert!(matches!(
            MidiChunk::read_from(&mut bytes.as_slice()),
            Err(FormatError::UnexpectedEof)
        ));
    }
}
