use bitstream_io::{BitWrite, BitWriter, Endianness};

use super::{ParseError, name};

/// Maximum number of compression pointers followed while reading one name
const MAX_POINTER_HOPS: usize = 64;

pub trait PacketComponent {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError>;

    fn read(&mut self, reader: &mut WireReader<'_>) -> Result<(), ParseError>;
}

/// Write a presentation-form name as uncompressed wire labels.
pub fn write_name<E: Endianness>(
    writer: &mut BitWriter<&mut Vec<u8>, E>,
    name: &str,
) -> Result<(), ParseError> {
    for label in name::to_labels(name)? {
        writer.write_var::<u8>(8, label.len() as u8)?;
        writer.write_bytes(&label)?;
    }
    writer.write_var::<u8>(8, 0)?;
    Ok(())
}

/// Cursor over a complete DNS message.
///
/// Names may point anywhere earlier in the message, so the reader keeps
/// the whole buffer rather than a sliding window.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) -> Result<(), ParseError> {
        if pos > self.buf.len() {
            return Err(ParseError::BufferTooSmall {
                need: pos,
                have: self.buf.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(ParseError::BufferTooSmall {
                need: end,
                have: self.buf.len(),
            });
        }
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ParseError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ParseError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a possibly-compressed name and return it in presentation form.
    pub fn read_name(&mut self) -> Result<String, ParseError> {
        let mut labels: Vec<Vec<u8>> = Vec::new();
        let mut cursor = self.pos;
        // Position after the name in the original stream, fixed by the first pointer
        let mut resume: Option<usize> = None;
        let mut hops = 0;
        let mut wire_len = 1;

        loop {
            let len = *self.buf.get(cursor).ok_or(ParseError::BufferTooSmall {
                need: cursor + 1,
                have: self.buf.len(),
            })?;

            match len & 0xC0 {
                0x00 => {
                    cursor += 1;
                    if len == 0 {
                        break;
                    }
                    let end = cursor + len as usize;
                    let label = self.buf.get(cursor..end).ok_or(ParseError::BufferTooSmall {
                        need: end,
                        have: self.buf.len(),
                    })?;
                    wire_len += label.len() + 1;
                    if wire_len > name::MAX_NAME_LEN {
                        return Err(ParseError::NameTooLong);
                    }
                    labels.push(label.to_vec());
                    cursor = end;
                }
                0xC0 => {
                    let low = *self.buf.get(cursor + 1).ok_or(ParseError::BufferTooSmall {
                        need: cursor + 2,
                        have: self.buf.len(),
                    })?;
                    hops += 1;
                    if hops > MAX_POINTER_HOPS {
                        return Err(ParseError::CompressionLoop);
                    }
                    if resume.is_none() {
                        resume = Some(cursor + 2);
                    }
                    let target = (((len & 0x3F) as usize) << 8) | low as usize;
                    if target >= cursor {
                        // Pointers must refer to earlier data
                        return Err(ParseError::CompressionLoop);
                    }
                    cursor = target;
                }
                _ => return Err(ParseError::InvalidLabelLength(len)),
            }
        }

        self.pos = resume.unwrap_or(cursor);
        Ok(name::from_labels(&labels))
    }
}
