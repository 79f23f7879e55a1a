use bitstream_io::{BigEndian, BitWrite, BitWriter, Endianness};

use super::{
    ParseError,
    common::{PacketComponent, WireReader, write_name},
    enums::{DNSResourceClass, DNSResourceType},
    rdata::RData,
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DNSResource {
    /// Owner name in presentation form
    pub name: String,
    pub rtype: DNSResourceType,
    pub rclass: DNSResourceClass,
    pub ttl: u32,
    pub rdata: RData,
}

impl DNSResource {
    pub fn new(
        name: &str,
        rtype: DNSResourceType,
        rclass: DNSResourceClass,
        ttl: u32,
        rdata: RData,
    ) -> Self {
        Self {
            name: super::name::fqdn(name),
            rtype,
            rclass,
            ttl,
            rdata,
        }
    }

    /// Same record with a different owner name (wildcard synthesis).
    pub fn with_name(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }

    /// Equality ignoring TTL, used when collapsing duplicate records.
    pub fn same_data(&self, other: &Self) -> bool {
        self.rtype == other.rtype
            && self.rclass == other.rclass
            && self.rdata == other.rdata
            && self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl PacketComponent for DNSResource {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        write_name(writer, &self.name)?;
        writer.write_var::<u16>(16, self.rtype.into())?;
        writer.write_var::<u16>(16, self.rclass.into())?;
        writer.write_var::<u32>(32, self.ttl)?;

        // RDLENGTH is only known once the data is encoded
        let mut rdata = Vec::new();
        {
            let mut rdata_writer: BitWriter<&mut Vec<u8>, BigEndian> =
                BitWriter::new(&mut rdata);
            self.rdata.write(&mut rdata_writer)?;
        }
        let rdlength =
            u16::try_from(rdata.len()).map_err(|_| ParseError::InvalidRData(format!(
                "{} record data exceeds 65535 bytes",
                self.rtype
            )))?;
        writer.write_var::<u16>(16, rdlength)?;
        writer.write_bytes(&rdata)?;
        Ok(())
    }

    fn read(&mut self, reader: &mut WireReader<'_>) -> Result<(), ParseError> {
        let name = reader.read_name()?;
        let rtype: DNSResourceType = reader.read_u16()?.into();
        let rclass: DNSResourceClass = reader.read_u16()?.into();
        let ttl = reader.read_u32()?;
        let rdlength = reader.read_u16()?;
        let rdata = RData::read(rtype, reader, rdlength)?;
        *self = DNSResource {
            name,
            rtype,
            rclass,
            ttl,
            rdata,
        };
        Ok(())
    }
}
