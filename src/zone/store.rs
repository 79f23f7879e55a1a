use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::Zone;
use super::record::ZoneDocument;
use crate::dns::{enums::DNSResourceType, name};

/// Immutable view of every zone at one point in time.
///
/// Queries resolve against a single snapshot from start to finish, so a
/// concurrent bulk update is either fully visible or not at all.
#[derive(Debug, Clone, Default)]
pub struct ZoneSnapshot {
    zones: Arc<HashMap<String, Arc<Zone>>>,
}

impl ZoneSnapshot {
    /// Find the zone serving `qname`.
    ///
    /// Walks the suffixes of the name from the full name toward the root and
    /// returns the first stored apex, i.e. the longest match. DS queries keep
    /// walking and return the shortest matching apex instead, so that a
    /// parent zone answers for the delegation it holds. The root apex is
    /// only probed for a query of the root name itself.
    pub fn find(&self, qname: &str, qtype: DNSResourceType) -> Option<&Arc<Zone>> {
        let lower = name::fqdn(&qname.to_ascii_lowercase());
        let root = (lower == ".").then_some(".");
        let mut found = None;
        for suffix in name::suffixes(&lower).chain(root) {
            if let Some(zone) = self.zones.get(suffix) {
                if qtype != DNSResourceType::DS {
                    return Some(zone);
                }
                found = Some(zone);
            }
        }
        found
    }

    pub fn get(&self, apex: &str) -> Option<&Arc<Zone>> {
        self.zones.get(apex)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn zones(&self) -> impl Iterator<Item = &Arc<Zone>> {
        self.zones.values()
    }

    /// Whole content in zone-document form, apexes sorted.
    pub fn to_document(&self) -> ZoneDocument {
        self.zones
            .iter()
            .map(|(apex, zone)| (apex.clone(), zone.to_records()))
            .collect()
    }
}

/// The authoritative in-memory database shared by every query task.
#[derive(Debug, Default)]
pub struct ZoneStore {
    current: RwLock<ZoneSnapshot>,
    /// Answers served per apex, independent of the zone lock
    hits: DashMap<String, AtomicU64>,
}

impl ZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot. The lock is held only long enough to clone it.
    pub fn snapshot(&self) -> ZoneSnapshot {
        self.current.read().clone()
    }

    /// Discard every zone and install `zones` in their place.
    pub fn replace_all(&self, zones: Vec<Zone>) {
        let map: HashMap<String, Arc<Zone>> = zones
            .into_iter()
            .map(|zone| (zone.apex.clone(), Arc::new(zone)))
            .collect();
        let count = map.len();

        let mut current = self.current.write();
        *current = ZoneSnapshot {
            zones: Arc::new(map),
        };
        drop(current);
        info!("Replaced zone store content with {} zones", count);
    }

    /// Replace only the apexes present in `zones`, leaving the rest alone.
    pub fn apply_partial(&self, zones: Vec<Zone>) {
        let count = zones.len();
        let mut current = self.current.write();
        let mut map: HashMap<String, Arc<Zone>> = current.zones.as_ref().clone();
        for zone in zones {
            debug!("Replacing zone {}", zone.apex);
            map.insert(zone.apex.clone(), Arc::new(zone));
        }
        *current = ZoneSnapshot {
            zones: Arc::new(map),
        };
        drop(current);
        info!("Applied {} zones to zone store", count);
    }

    pub fn record_hit(&self, apex: &str) {
        if let Some(counter) = self.hits.get(apex) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.hits
            .entry(apex.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> BTreeMap<String, u64> {
        self.hits
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }

    pub fn zone_count(&self) -> usize {
        self.current.read().len()
    }
}
