use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::{
    ParseError,
    common::{PacketComponent, WireReader},
};

/// Size of the fixed message header
pub const HEADER_LEN: usize = 12;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSHeader {
    pub id: u16,
    pub qr: bool,
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub z: u8,
    pub rcode: u8,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl PacketComponent for DNSHeader {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        writer.write_var::<u16>(16, self.id)?;
        writer.write_var::<u8>(1, self.qr as u8)?;
        writer.write_var::<u8>(4, self.opcode)?;
        writer.write_var::<u8>(1, self.aa as u8)?;
        writer.write_var::<u8>(1, self.tc as u8)?;
        writer.write_var::<u8>(1, self.rd as u8)?;
        writer.write_var::<u8>(1, self.ra as u8)?;
        writer.write_var::<u8>(3, self.z)?;
        writer.write_var::<u8>(4, self.rcode)?;
        writer.write_var::<u16>(16, self.qdcount)?;
        writer.write_var::<u16>(16, self.ancount)?;
        writer.write_var::<u16>(16, self.nscount)?;
        writer.write_var::<u16>(16, self.arcount)?;
        Ok(())
    }

    fn read(&mut self, reader: &mut WireReader<'_>) -> Result<(), ParseError> {
        let bytes = reader
            .read_bytes(HEADER_LEN)
            .map_err(|_| ParseError::InvalidHeader)?;
        let mut bits = BitReader::<_, BigEndian>::new(bytes);
        self.id = bits.read_var::<u16>(16)?;
        self.qr = bits.read_var::<u8>(1)? == 1;
        self.opcode = bits.read_var::<u8>(4)?;
        self.aa = bits.read_var::<u8>(1)? == 1;
        self.tc = bits.read_var::<u8>(1)? == 1;
        self.rd = bits.read_var::<u8>(1)? == 1;
        self.ra = bits.read_var::<u8>(1)? == 1;
        self.z = bits.read_var::<u8>(3)?;
        self.rcode = bits.read_var::<u8>(4)?;
        self.qdcount = bits.read_var::<u16>(16)?;
        self.ancount = bits.read_var::<u16>(16)?;
        self.nscount = bits.read_var::<u16>(16)?;
        self.arcount = bits.read_var::<u16>(16)?;
        Ok(())
    }
}

/// Byte offsets and masks for patching flags in an already-encoded message
pub mod flags {
    /// Byte 2: QR, opcode, AA, TC, RD
    pub const AA: (usize, u8) = (2, 0x04);
    pub const TC: (usize, u8) = (2, 0x02);
    /// Byte 3: RA, Z, RCODE
    pub const RA: (usize, u8) = (3, 0x80);
}

/// Read a single flag bit straight from wire bytes.
pub fn wire_flag(message: &[u8], flag: (usize, u8)) -> bool {
    message.get(flag.0).is_some_and(|b| b & flag.1 != 0)
}

/// Clear a single flag bit in wire bytes.
pub fn clear_wire_flag(message: &mut [u8], flag: (usize, u8)) {
    if let Some(b) = message.get_mut(flag.0) {
        *b &= !flag.1;
    }
}

/// Message ID of an encoded message, if it is long enough to carry one.
pub fn wire_id(message: &[u8]) -> Option<u16> {
    (message.len() >= 2).then(|| u16::from_be_bytes([message[0], message[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bits_roundtrip() {
        let header = DNSHeader {
            id: 0xBEEF,
            qr: true,
            opcode: 0,
            aa: true,
            tc: false,
            rd: true,
            ra: false,
            z: 0,
            rcode: 3,
            qdcount: 1,
            ancount: 2,
            nscount: 1,
            arcount: 0,
        };

        let mut buf = Vec::new();
        {
            let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut buf);
            header.write(&mut writer).unwrap();
        }
        assert_eq!(buf.len(), HEADER_LEN);
        // QR | AA | RD and RCODE=3
        assert_eq!(buf[2], 0x85);
        assert_eq!(buf[3], 0x03);

        let mut parsed = DNSHeader::default();
        parsed.read(&mut WireReader::new(&buf)).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_short_header_rejected() {
        let mut header = DNSHeader::default();
        let result = header.read(&mut WireReader::new(&[0u8; 5]));
        assert!(matches!(result, Err(ParseError::InvalidHeader)));
    }

    #[test]
    fn test_wire_flags() {
        let mut msg = vec![0x12, 0x34, 0x86, 0x80, 0, 0];
        assert!(wire_flag(&msg, flags::TC));
        assert!(wire_flag(&msg, flags::AA));
        assert!(wire_flag(&msg, flags::RA));
        clear_wire_flag(&mut msg, flags::RA);
        clear_wire_flag(&mut msg, flags::AA);
        assert!(!wire_flag(&msg, flags::RA));
        assert!(!wire_flag(&msg, flags::AA));
        assert_eq!(wire_id(&msg), Some(0x1234));
        assert_eq!(wire_id(&[1]), None);
    }
}
