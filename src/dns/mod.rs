pub mod common;
pub mod edns;
pub mod enums;
pub mod header;
pub mod name;
pub mod question;
pub mod rdata;
pub mod resource;

use bitstream_io::{BigEndian, BitWriter};
use common::{PacketComponent, WireReader};
use edns::EdnsOpt;
use enums::{DNSResourceType, ResponseCode};
use header::DNSHeader;
use question::DNSQuestion;
use resource::DNSResource;
use thiserror::Error;
use tracing::trace;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSPacket {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub resources: Vec<DNSResource>,
    /// EDNS0 OPT record if present (extracted from additional records)
    pub edns: Option<EdnsOpt>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid DNS header")]
    InvalidHeader,
    #[error("Invalid DNS label")]
    InvalidLabel,
    #[error("Label of {0} bytes exceeds 63")]
    LabelTooLong(usize),
    #[error("Domain name exceeds 255 bytes")]
    NameTooLong,
    #[error("Invalid label length byte {0:#04x}")]
    InvalidLabelLength(u8),
    #[error("Compression pointer loop")]
    CompressionLoop,
    #[error("Message truncated: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },
    #[error("Invalid record data: {0}")]
    InvalidRData(String),
    #[error("Invalid additional section: {0}")]
    InvalidAdditionalSection(String),
    #[error("Too many records in section")]
    SectionOverflow,
    #[error("Invalid bit stream: {0}")]
    InvalidBitStream(String),
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::InvalidBitStream(e.to_string())
    }
}

fn section_len(records: usize) -> Result<u16, ParseError> {
    u16::try_from(records).map_err(|_| ParseError::SectionOverflow)
}

impl DNSPacket {
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        trace!("Parsing DNS packet, size: {} bytes", buf.len());
        let mut reader = WireReader::new(buf);
        let mut packet = DNSPacket::default();
        packet.header.read(&mut reader)?;

        for _ in 0..packet.header.qdcount {
            let mut question = DNSQuestion::default();
            question.read(&mut reader)?;
            packet.questions.push(question);
        }

        for _ in 0..packet.header.ancount {
            let mut answer = DNSResource::default();
            answer.read(&mut reader)?;
            packet.answers.push(answer);
        }

        for _ in 0..packet.header.nscount {
            let mut authority = DNSResource::default();
            authority.read(&mut reader)?;
            packet.authorities.push(authority);
        }

        for _ in 0..packet.header.arcount {
            let start = reader.position();
            let owner = reader.read_name()?;
            let rtype: DNSResourceType = reader.read_u16()?.into();

            if rtype != DNSResourceType::OPT {
                reader.set_position(start)?;
                let mut resource = DNSResource::default();
                resource.read(&mut reader)?;
                packet.resources.push(resource);
                continue;
            }

            if owner != "." {
                return Err(ParseError::InvalidAdditionalSection(
                    "OPT record owner must be the root".to_string(),
                ));
            }
            if packet.edns.is_some() {
                return Err(ParseError::InvalidAdditionalSection(
                    "more than one OPT record".to_string(),
                ));
            }
            // CLASS of an OPT record is the sender's payload size
            let payload = reader.read_u16()?;
            let ttl = reader.read_u32()?;
            let rdlength = reader.read_u16()?;
            packet.edns = Some(EdnsOpt::from_record_fields(
                payload,
                ttl,
                &mut reader,
                rdlength,
            )?);
        }

        Ok(packet)
    }

    pub fn serialize(&self) -> Result<Vec<u8>, ParseError> {
        let mut header = self.header.clone();
        header.qdcount = section_len(self.questions.len())?;
        header.ancount = section_len(self.answers.len())?;
        header.nscount = section_len(self.authorities.len())?;
        header.arcount = section_len(self.resources.len() + self.edns.is_some() as usize)?;

        let mut buf = Vec::new();
        {
            let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut buf);
            header.write(&mut writer)?;
            for question in &self.questions {
                question.write(&mut writer)?;
            }
            for answer in &self.answers {
                answer.write(&mut writer)?;
            }
            for authority in &self.authorities {
                authority.write(&mut writer)?;
            }
            for resource in &self.resources {
                resource.write(&mut writer)?;
            }
            if let Some(edns) = &self.edns {
                edns.write(&mut writer)?;
            }
        }
        Ok(buf)
    }

    /// Empty response to `query`: same ID, opcode, RD bit and question.
    pub fn reply_to(query: &DNSPacket) -> Self {
        DNSPacket {
            header: DNSHeader {
                id: query.header.id,
                qr: true,
                opcode: query.header.opcode,
                rd: query.header.rd,
                ..DNSHeader::default()
            },
            questions: query.questions.clone(),
            ..DNSPacket::default()
        }
    }

    /// Response to `query` carrying only an RCODE.
    pub fn error_reply(query: &DNSPacket, rcode: ResponseCode) -> Self {
        let mut reply = Self::reply_to(query);
        reply.header.rcode = rcode.to_u8();
        reply
    }

    pub fn rcode(&self) -> Option<ResponseCode> {
        ResponseCode::from_u8(self.header.rcode)
    }

    /// Header and question only, with TC set, for replies that do not fit
    /// the client's datagram size.
    pub fn truncated(&self) -> Self {
        let mut reply = DNSPacket {
            header: self.header.clone(),
            questions: self.questions.clone(),
            edns: self.edns.clone(),
            ..DNSPacket::default()
        };
        reply.header.tc = true;
        reply
    }

    /// Largest reply the sender accepts over UDP.
    pub fn max_udp_payload_size(&self) -> u16 {
        self.edns
            .as_ref()
            .map(|edns| edns.payload_size())
            .unwrap_or(edns::DEFAULT_UDP_PAYLOAD)
    }
}
