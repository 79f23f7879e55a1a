use std::collections::HashMap;

use super::record::Record;
use crate::dns::enums::{DNSResourceClass, DNSResourceType};
use crate::dns::resource::DNSResource;

/// Identifies one RRset inside a zone. Names are stored lower-case and
/// fully-qualified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub name: String,
    pub rtype: DNSResourceType,
    pub rclass: DNSResourceClass,
}

impl RecordKey {
    pub fn new(name: &str, rtype: DNSResourceType, rclass: DNSResourceClass) -> Self {
        Self {
            name: name.to_string(),
            rtype,
            rclass,
        }
    }
}

/// Everything known under one apex name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Zone {
    /// Apex name, lower-case and fully-qualified
    pub apex: String,
    rrsets: HashMap<RecordKey, Vec<DNSResource>>,
    /// RRset keys in first-seen order, for dumps
    order: Vec<RecordKey>,
}

impl Zone {
    pub fn new(apex: &str) -> Self {
        Self {
            apex: apex.to_string(),
            ..Self::default()
        }
    }

    /// Append a record to its RRset, keeping input order.
    pub fn insert(&mut self, record: DNSResource) {
        let key = RecordKey::new(&record.name, record.rtype, record.rclass);
        match self.rrsets.get_mut(&key) {
            Some(rrset) => rrset.push(record),
            None => {
                self.order.push(key.clone());
                self.rrsets.insert(key, vec![record]);
            }
        }
    }

    /// RRset for an exact key; empty when absent.
    pub fn get(&self, name: &str, rtype: DNSResourceType, rclass: DNSResourceClass) -> &[DNSResource] {
        self.rrsets
            .get(&RecordKey::new(name, rtype, rclass))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn rrset_count(&self) -> usize {
        self.rrsets.len()
    }

    pub fn record_count(&self) -> usize {
        self.rrsets.values().map(Vec::len).sum()
    }

    /// All records, RRset by RRset in first-seen order.
    pub fn records(&self) -> impl Iterator<Item = &DNSResource> {
        self.order
            .iter()
            .filter_map(|key| self.rrsets.get(key))
            .flatten()
    }

    /// Render the zone back into zone-document records.
    pub fn to_records(&self) -> Vec<Record> {
        self.records().map(Record::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::rdata::RData;
    use std::net::Ipv4Addr;

    fn a(name: &str, last: u8) -> DNSResource {
        DNSResource::new(
            name,
            DNSResourceType::A,
            DNSResourceClass::IN,
            300,
            RData::A(Ipv4Addr::new(10, 0, 0, last)),
        )
    }

    #[test]
    fn test_rrset_keeps_insertion_order() {
        let mut zone = Zone::new("example.com.");
        zone.insert(a("www.example.com.", 2));
        zone.insert(a("example.com.", 1));
        zone.insert(a("www.example.com.", 3));

        let www = zone.get("www.example.com.", DNSResourceType::A, DNSResourceClass::IN);
        assert_eq!(www.len(), 2);
        assert_eq!(www[0].rdata, RData::A(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(www[1].rdata, RData::A(Ipv4Addr::new(10, 0, 0, 3)));

        assert_eq!(zone.rrset_count(), 2);
        assert_eq!(zone.record_count(), 3);
        let dumped: Vec<String> = zone.to_records().iter().map(|r| r.data.clone()).collect();
        assert_eq!(dumped, vec!["10.0.0.2", "10.0.0.3", "10.0.0.1"]);
    }

    #[test]
    fn test_missing_rrset_is_empty() {
        let zone = Zone::new("example.com.");
        assert!(zone
            .get("example.com.", DNSResourceType::MX, DNSResourceClass::IN)
            .is_empty());
    }
}
