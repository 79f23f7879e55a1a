use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dns::resource::DNSResource;

/// A record as it appears in a zone document: every field textual except
/// the TTL, with the type-specific data in presentation format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    #[serde(rename = "Type", alias = "type")]
    pub rtype: String,
    #[serde(rename = "Class", alias = "class", default)]
    pub class: String,
    #[serde(rename = "Ttl", alias = "ttl", alias = "TTL", default)]
    pub ttl: u32,
    #[serde(rename = "Data", alias = "data", default)]
    pub data: String,
}

/// Apex name to the ordered records of that zone.
pub type ZoneDocument = BTreeMap<String, Vec<Record>>;

impl Record {
    pub fn new(name: &str, class: &str, rtype: &str, ttl: u32, data: &str) -> Self {
        Self {
            name: name.to_string(),
            rtype: rtype.to_string(),
            class: class.to_string(),
            ttl,
            data: data.to_string(),
        }
    }
}

impl From<&DNSResource> for Record {
    fn from(rr: &DNSResource) -> Self {
        Self {
            name: rr.name.clone(),
            rtype: rr.rtype.to_string(),
            class: rr.rclass.to_string(),
            ttl: rr.ttl,
            data: rr.rdata.to_string(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.name, self.ttl, self.class, self.rtype, self.data
        )
    }
}
