//! Zone-document ingestion.
//!
//! Turns the records of a zone document into stored zones: names are
//! lower-cased, made fully-qualified and IDNA-encoded, record data is parsed
//! from presentation text, and records that fail any of that are logged and
//! skipped rather than failing the whole load.

use std::fmt;

use tracing::{info, warn};

use super::parser::{parse_name, parse_rdata};
use super::record::{Record, ZoneDocument};
use super::{Result, Zone, ZoneError, ZoneStore};
use crate::dns::{
    enums::{DNSResourceClass, DNSResourceType},
    name::fqdn,
    resource::DNSResource,
};

/// How a document is applied to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Discard everything, then install the document
    FullReplace,
    /// Replace only the apexes named by the document
    Partial,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub zones: usize,
    pub records: usize,
    pub skipped: usize,
}

impl fmt::Display for LoadStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} zones, {} records, {} skipped",
            self.zones, self.records, self.skipped
        )
    }
}

/// Lower-case, fully-qualify and IDNA-encode an owner or apex name.
///
/// Escapes are resolved before lower-casing, so `\065.example.com` and
/// `a.example.com` produce the same key.
pub fn normalize_name(raw: &str) -> Result<String> {
    let lower = fqdn(raw.trim()).to_lowercase();
    let canonical = if lower.is_ascii() {
        parse_name(&lower)?
    } else {
        let bare = &lower[..lower.len() - 1];
        let ascii = idna::domain_to_ascii(bare)
            .map_err(|_| ZoneError::InvalidDomainName(raw.to_string()))?;
        parse_name(&fqdn(&ascii))?
    };
    Ok(canonical.to_ascii_lowercase())
}

/// Convert one zone-document record into a resource record.
pub fn parse_record(record: &Record) -> Result<DNSResource> {
    let name = normalize_name(&record.name)?;
    let rtype: DNSResourceType = record
        .rtype
        .parse()
        .map_err(|_| ZoneError::InvalidRRType(record.rtype.clone()))?;
    let rclass: DNSResourceClass = record
        .class
        .parse()
        .map_err(|_| ZoneError::InvalidClass(record.class.clone()))?;
    let rdata = parse_rdata(rtype, &record.data)?;

    Ok(DNSResource {
        name,
        rtype,
        rclass,
        ttl: record.ttl,
        rdata,
    })
}

/// Build one zone, skipping records that cannot be parsed.
pub fn build_zone(apex: &str, records: &[Record]) -> Result<(Zone, usize)> {
    let apex = normalize_name(apex)?;
    let mut zone = Zone::new(&apex);
    let mut skipped = 0;

    for record in records {
        match parse_record(record) {
            Ok(rr) => zone.insert(rr),
            Err(e) => {
                warn!(zone = %apex, record = %record, error = %e, "Skipping problematic record");
                skipped += 1;
            }
        }
    }
    Ok((zone, skipped))
}

/// Build every zone of a document. Apexes whose name cannot be normalized
/// are skipped with all their records.
pub fn build_zones(document: &ZoneDocument) -> (Vec<Zone>, LoadStats) {
    let mut zones = Vec::with_capacity(document.len());
    let mut stats = LoadStats::default();

    for (apex, records) in document {
        match build_zone(apex, records) {
            Ok((zone, skipped)) => {
                stats.records += zone.record_count();
                stats.skipped += skipped;
                zones.push(zone);
            }
            Err(e) => {
                warn!(zone = %apex, error = %e, "Skipping zone with invalid apex");
                stats.skipped += records.len();
            }
        }
    }
    stats.zones = zones.len();
    (zones, stats)
}

/// Parse `document` and apply it to `store` in one atomic swap.
pub fn load_document(store: &ZoneStore, document: &ZoneDocument, mode: LoadMode) -> LoadStats {
    let (zones, stats) = build_zones(document);
    match mode {
        LoadMode::FullReplace => store.replace_all(zones),
        LoadMode::Partial => store.apply_partial(zones),
    }
    info!("Loaded zone document ({:?}): {}", mode, stats);
    stats
}
