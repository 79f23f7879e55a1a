//! Typed record data.
//!
//! Wire decoding follows RFC 1035 and the RFCs of the individual types;
//! anything the agent does not model is carried as opaque bytes and
//! rendered with the RFC 3597 `\#` notation.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use bitstream_io::{BitWrite, BitWriter, Endianness};

use super::{
    ParseError,
    common::{WireReader, write_name},
    enums::DNSResourceType,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    NS(String),
    CNAME(String),
    PTR(String),
    MX {
        preference: u16,
        exchange: String,
    },
    /// Also used for SPF, which shares the TXT layout
    TXT(Vec<Vec<u8>>),
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    SOA {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    CAA {
        flags: u8,
        tag: String,
        value: Vec<u8>,
    },
    DS {
        key_tag: u16,
        algorithm: u8,
        digest_type: u8,
        digest: Vec<u8>,
    },
    SSHFP {
        algorithm: u8,
        fingerprint_type: u8,
        fingerprint: Vec<u8>,
    },
    TLSA {
        usage: u8,
        selector: u8,
        matching_type: u8,
        data: Vec<u8>,
    },
    Unknown(Vec<u8>),
}

impl Default for RData {
    fn default() -> Self {
        RData::Unknown(Vec::new())
    }
}

impl RData {
    /// Name this record points at, for the types whose target may need
    /// address records in the additional section.
    pub fn target(&self) -> Option<&str> {
        match self {
            RData::NS(name) | RData::CNAME(name) | RData::PTR(name) => Some(name),
            RData::MX { exchange, .. } => Some(exchange),
            RData::SRV { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        match self {
            RData::A(addr) => writer.write_bytes(&addr.octets())?,
            RData::AAAA(addr) => writer.write_bytes(&addr.octets())?,
            RData::NS(name) | RData::CNAME(name) | RData::PTR(name) => write_name(writer, name)?,
            RData::MX {
                preference,
                exchange,
            } => {
                writer.write_var::<u16>(16, *preference)?;
                write_name(writer, exchange)?;
            }
            RData::TXT(strings) => {
                for s in strings {
                    if s.len() > 255 {
                        return Err(ParseError::InvalidRData(
                            "character-string longer than 255 bytes".to_string(),
                        ));
                    }
                    writer.write_var::<u8>(8, s.len() as u8)?;
                    writer.write_bytes(s)?;
                }
            }
            RData::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                writer.write_var::<u16>(16, *priority)?;
                writer.write_var::<u16>(16, *weight)?;
                writer.write_var::<u16>(16, *port)?;
                write_name(writer, target)?;
            }
            RData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                write_name(writer, mname)?;
                write_name(writer, rname)?;
                for value in [serial, refresh, retry, expire, minimum] {
                    writer.write_var::<u32>(32, *value)?;
                }
            }
            RData::CAA { flags, tag, value } => {
                writer.write_var::<u8>(8, *flags)?;
                writer.write_var::<u8>(8, tag.len() as u8)?;
                writer.write_bytes(tag.as_bytes())?;
                writer.write_bytes(value)?;
            }
            RData::DS {
                key_tag,
                algorithm,
                digest_type,
                digest,
            } => {
                writer.write_var::<u16>(16, *key_tag)?;
                writer.write_var::<u8>(8, *algorithm)?;
                writer.write_var::<u8>(8, *digest_type)?;
                writer.write_bytes(digest)?;
            }
            RData::SSHFP {
                algorithm,
                fingerprint_type,
                fingerprint,
            } => {
                writer.write_var::<u8>(8, *algorithm)?;
                writer.write_var::<u8>(8, *fingerprint_type)?;
                writer.write_bytes(fingerprint)?;
            }
            RData::TLSA {
                usage,
                selector,
                matching_type,
                data,
            } => {
                writer.write_var::<u8>(8, *usage)?;
                writer.write_var::<u8>(8, *selector)?;
                writer.write_var::<u8>(8, *matching_type)?;
                writer.write_bytes(data)?;
            }
            RData::Unknown(bytes) => writer.write_bytes(bytes)?,
        }
        Ok(())
    }

    /// Decode `rdlength` bytes of record data starting at the reader's position.
    pub fn read(
        rtype: DNSResourceType,
        reader: &mut WireReader<'_>,
        rdlength: u16,
    ) -> Result<Self, ParseError> {
        let start = reader.position();
        let end = start + rdlength as usize;
        if reader.remaining() < rdlength as usize {
            return Err(ParseError::BufferTooSmall {
                need: end,
                have: start + reader.remaining(),
            });
        }

        let rdata = match rtype {
            DNSResourceType::A => {
                let b = reader.read_bytes(4)?;
                RData::A(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
            }
            DNSResourceType::AAAA => {
                let b = reader.read_bytes(16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(b);
                RData::AAAA(Ipv6Addr::from(octets))
            }
            DNSResourceType::NS => RData::NS(reader.read_name()?),
            DNSResourceType::CNAME => RData::CNAME(reader.read_name()?),
            DNSResourceType::PTR => RData::PTR(reader.read_name()?),
            DNSResourceType::MX => RData::MX {
                preference: reader.read_u16()?,
                exchange: reader.read_name()?,
            },
            DNSResourceType::TXT | DNSResourceType::SPF => {
                let mut strings = Vec::new();
                while reader.position() < end {
                    let len = reader.read_u8()? as usize;
                    strings.push(reader.read_bytes(len)?.to_vec());
                }
                RData::TXT(strings)
            }
            DNSResourceType::SRV => RData::SRV {
                priority: reader.read_u16()?,
                weight: reader.read_u16()?,
                port: reader.read_u16()?,
                target: reader.read_name()?,
            },
            DNSResourceType::SOA => RData::SOA {
                mname: reader.read_name()?,
                rname: reader.read_name()?,
                serial: reader.read_u32()?,
                refresh: reader.read_u32()?,
                retry: reader.read_u32()?,
                expire: reader.read_u32()?,
                minimum: reader.read_u32()?,
            },
            DNSResourceType::CAA => {
                let flags = reader.read_u8()?;
                let tag_len = reader.read_u8()? as usize;
                let tag = String::from_utf8(reader.read_bytes(tag_len)?.to_vec())
                    .map_err(|_| ParseError::InvalidRData("CAA tag is not UTF-8".to_string()))?;
                let value = reader.read_bytes(end.saturating_sub(reader.position()))?;
                RData::CAA {
                    flags,
                    tag,
                    value: value.to_vec(),
                }
            }
            DNSResourceType::DS => RData::DS {
                key_tag: reader.read_u16()?,
                algorithm: reader.read_u8()?,
                digest_type: reader.read_u8()?,
                digest: reader
                    .read_bytes(end.saturating_sub(start + 4))?
                    .to_vec(),
            },
            DNSResourceType::SSHFP => RData::SSHFP {
                algorithm: reader.read_u8()?,
                fingerprint_type: reader.read_u8()?,
                fingerprint: reader
                    .read_bytes(end.saturating_sub(start + 2))?
                    .to_vec(),
            },
            DNSResourceType::TLSA => RData::TLSA {
                usage: reader.read_u8()?,
                selector: reader.read_u8()?,
                matching_type: reader.read_u8()?,
                data: reader.read_bytes(end.saturating_sub(start + 3))?.to_vec(),
            },
            _ => RData::Unknown(reader.read_bytes(rdlength as usize)?.to_vec()),
        };

        if reader.position() != end {
            return Err(ParseError::InvalidRData(format!(
                "{} record data length mismatch: declared {}, consumed {}",
                rtype,
                rdlength,
                reader.position() - start
            )));
        }
        Ok(rdata)
    }
}

/// Quote a character-string for presentation.
fn write_quoted(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str("\"")?;
    for &b in bytes {
        match b {
            b'"' | b'\\' => write!(f, "\\{}", b as char)?,
            0x20..=0x7e => write!(f, "{}", b as char)?,
            _ => write!(f, "\\{:03}", b)?,
        }
    }
    f.write_str("\"")
}

impl fmt::Display for RData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RData::A(addr) => write!(f, "{}", addr),
            RData::AAAA(addr) => write!(f, "{}", addr),
            RData::NS(name) | RData::CNAME(name) | RData::PTR(name) => f.write_str(name),
            RData::MX {
                preference,
                exchange,
            } => write!(f, "{} {}", preference, exchange),
            RData::TXT(strings) => {
                for (i, s) in strings.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write_quoted(f, s)?;
                }
                Ok(())
            }
            RData::SRV {
                priority,
                weight,
                port,
                target,
            } => write!(f, "{} {} {} {}", priority, weight, port, target),
            RData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => write!(
                f,
                "{} {} {} {} {} {} {}",
                mname, rname, serial, refresh, retry, expire, minimum
            ),
            RData::CAA { flags, tag, value } => {
                write!(f, "{} {} ", flags, tag)?;
                write_quoted(f, value)
            }
            RData::DS {
                key_tag,
                algorithm,
                digest_type,
                digest,
            } => write!(
                f,
                "{} {} {} {}",
                key_tag,
                algorithm,
                digest_type,
                hex::encode_upper(digest)
            ),
            RData::SSHFP {
                algorithm,
                fingerprint_type,
                fingerprint,
            } => write!(
                f,
                "{} {} {}",
                algorithm,
                fingerprint_type,
                hex::encode_upper(fingerprint)
            ),
            RData::TLSA {
                usage,
                selector,
                matching_type,
                data,
            } => write!(
                f,
                "{} {} {} {}",
                usage,
                selector,
                matching_type,
                hex::encode_upper(data)
            ),
            RData::Unknown(bytes) if bytes.is_empty() => f.write_str("\\# 0"),
            RData::Unknown(bytes) => write!(f, "\\# {} {}", bytes.len(), hex::encode_upper(bytes)),
        }
    }
}
