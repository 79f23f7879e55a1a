use bitstream_io::{BitWrite, BitWriter, Endianness};

use super::{ParseError, common::WireReader, enums::DNSResourceType};

/// Payload size advertised in replies
pub const SERVER_UDP_PAYLOAD: u16 = 4096;

/// Payload size assumed for clients that do not speak EDNS0
pub const DEFAULT_UDP_PAYLOAD: u16 = 512;

/// EDNS0 OPT pseudo-record (RFC 6891)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdnsOpt {
    /// UDP payload size that can be handled by the sender
    pub udp_payload_size: u16,
    pub extended_rcode: u8,
    pub version: u8,
    pub flags: u16,
    pub options: Vec<EdnsOption>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdnsOption {
    pub code: u16,
    pub data: Vec<u8>,
}

impl EdnsOpt {
    pub fn with_payload_size(udp_payload_size: u16) -> Self {
        Self {
            udp_payload_size,
            ..Self::default()
        }
    }

    /// Effective payload size, never below the classic 512-byte limit.
    pub fn payload_size(&self) -> u16 {
        self.udp_payload_size.max(DEFAULT_UDP_PAYLOAD)
    }

    /// DNSSEC OK bit
    pub fn do_flag(&self) -> bool {
        self.flags & 0x8000 != 0
    }

    /// Build from the fields of an OPT record: CLASS carries the payload
    /// size and TTL packs extended RCODE, version and flags.
    pub fn from_record_fields(
        class: u16,
        ttl: u32,
        reader: &mut WireReader<'_>,
        rdlength: u16,
    ) -> Result<Self, ParseError> {
        let end = reader.position() + rdlength as usize;
        let mut options = Vec::new();
        while reader.position() < end {
            let code = reader.read_u16()?;
            let len = reader.read_u16()?;
            let data = reader.read_bytes(len as usize)?.to_vec();
            options.push(EdnsOption { code, data });
        }
        if reader.position() != end {
            return Err(ParseError::InvalidRData(
                "EDNS option overruns OPT record data".to_string(),
            ));
        }

        Ok(Self {
            udp_payload_size: class,
            extended_rcode: (ttl >> 24) as u8,
            version: (ttl >> 16) as u8,
            flags: ttl as u16,
            options,
        })
    }

    pub fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        // Owner is always the root name
        writer.write_var::<u8>(8, 0)?;
        writer.write_var::<u16>(16, DNSResourceType::OPT.into())?;
        writer.write_var::<u16>(16, self.udp_payload_size)?;
        let ttl = ((self.extended_rcode as u32) << 24)
            | ((self.version as u32) << 16)
            | self.flags as u32;
        writer.write_var::<u32>(32, ttl)?;

        let rdlength: usize = self.options.iter().map(|o| 4 + o.data.len()).sum();
        let rdlength = u16::try_from(rdlength)
            .map_err(|_| ParseError::InvalidRData("EDNS options too large".to_string()))?;
        writer.write_var::<u16>(16, rdlength)?;
        for option in &self.options {
            writer.write_var::<u16>(16, option.code)?;
            writer.write_var::<u16>(16, option.data.len() as u16)?;
            writer.write_bytes(&option.data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitstream_io::BigEndian;

    #[test]
    fn test_opt_roundtrip_with_option() {
        let opt = EdnsOpt {
            udp_payload_size: 1232,
            extended_rcode: 0,
            version: 0,
            flags: 0x8000,
            options: vec![EdnsOption {
                code: 10,
                data: vec![1, 2, 3, 4, 5, 6, 7, 8],
            }],
        };

        let mut buf = Vec::new();
        {
            let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut buf);
            opt.write(&mut writer).unwrap();
        }
        assert_eq!(buf[0], 0);
        assert_eq!(&buf[1..3], &[0, 41]);

        let mut reader = WireReader::new(&buf);
        reader.set_position(5).unwrap();
        let ttl = reader.read_u32().unwrap();
        let rdlength = reader.read_u16().unwrap();
        let parsed = EdnsOpt::from_record_fields(1232, ttl, &mut reader, rdlength).unwrap();
        assert_eq!(parsed, opt);
        assert!(parsed.do_flag());
    }

    #[test]
    fn test_payload_floor() {
        assert_eq!(EdnsOpt::with_payload_size(100).payload_size(), 512);
        assert_eq!(EdnsOpt::with_payload_size(4096).payload_size(), 4096);
    }
}
