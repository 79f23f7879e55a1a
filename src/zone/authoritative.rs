//! Authoritative DNS response generation
//!
//! Decides whether a query falls under a stored zone and, if so, assembles
//! the answer, authority and additional sections from that zone's data.
//! Queries the store cannot answer are handed back to the caller for
//! forwarding when recursion is configured.

use std::sync::Arc;

use tracing::{debug, trace};

use super::{Zone, ZoneSnapshot, ZoneStore};
use crate::dns::{
    DNSPacket,
    enums::{DNSResourceClass, DNSResourceType, ResponseCode},
    question::DNSQuestion,
    resource::DNSResource,
};

/// Outcome of resolving one query locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A complete reply to send back
    Answer(DNSPacket),
    /// Nothing local applies; relay the query upstream
    Recurse,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverOptions {
    /// An upstream is configured for names we cannot answer
    pub recursion: bool,
    /// Fall back to CNAME, then NS, at the query name when the requested
    /// type has no data
    pub alias_fallback: bool,
}

/// Authoritative DNS responder
pub struct AuthoritativeResponder {
    zone_store: Arc<ZoneStore>,
    options: ResolverOptions,
}

impl AuthoritativeResponder {
    pub fn new(zone_store: Arc<ZoneStore>, options: ResolverOptions) -> Self {
        Self {
            zone_store,
            options,
        }
    }

    pub fn options(&self) -> ResolverOptions {
        self.options
    }

    pub fn resolve(&self, query: &DNSPacket) -> Resolution {
        // Multi-question messages are not answered, like most authoritative servers
        let question = match query.questions.as_slice() {
            [question] => question,
            _ => {
                debug!(
                    "Rejecting query {} with {} questions",
                    query.header.id,
                    query.questions.len()
                );
                return Resolution::Answer(DNSPacket::error_reply(
                    query,
                    ResponseCode::FormatError,
                ));
            }
        };

        let qname = question.name.to_ascii_lowercase();
        let snapshot = self.zone_store.snapshot();

        let Some(zone) = snapshot.find(&qname, question.qtype).cloned() else {
            trace!("No zone for {}", qname);
            if self.options.recursion {
                return Resolution::Recurse;
            }
            return Resolution::Answer(DNSPacket::error_reply(query, ResponseCode::Refused));
        };

        let answers = self.answer_records(&zone, question, &qname);

        if answers.is_empty() {
            if self.options.recursion {
                return Resolution::Recurse;
            }
            debug!("NXDOMAIN for {} {} in {}", qname, question.qtype, zone.apex);
            let mut reply = DNSPacket::error_reply(query, ResponseCode::NameError);
            reply.header.aa = true;
            reply.authorities = zone
                .get(&zone.apex, DNSResourceType::SOA, question.qclass)
                .to_vec();
            return Resolution::Answer(reply);
        }

        let mut reply = DNSPacket::reply_to(query);
        reply.header.aa = true;

        let mut additional = Vec::new();
        let authorities = zone
            .get(&zone.apex, DNSResourceType::NS, question.qclass)
            .to_vec();
        for ns in &authorities {
            if let Some(target) = ns.rdata.target() {
                additional.extend(glue(&snapshot, target));
            }
        }
        for rr in &answers {
            if matches!(rr.rtype, DNSResourceType::CNAME | DNSResourceType::SRV) {
                if let Some(target) = rr.rdata.target() {
                    additional.extend(glue(&snapshot, target));
                }
            }
        }

        reply.answers = dedup(answers);
        reply.authorities = authorities;
        reply.resources = dedup(additional);
        Resolution::Answer(reply)
    }

    /// Answer section from local data: exact match, wildcard, then the
    /// optional alias fallback.
    fn answer_records(&self, zone: &Zone, question: &DNSQuestion, qname: &str) -> Vec<DNSResource> {
        let exact = zone.get(qname, question.qtype, question.qclass);
        if !exact.is_empty() {
            self.zone_store.record_hit(&zone.apex);
            return exact.to_vec();
        }

        let wildcard = format!("*.{}", zone.apex);
        let expanded = zone.get(&wildcard, question.qtype, question.qclass);
        if !expanded.is_empty() {
            trace!("Wildcard {} matched {}", wildcard, question.name);
            let owner = crate::dns::name::fqdn(&question.name);
            return expanded.iter().map(|rr| rr.with_name(&owner)).collect();
        }

        if self.options.alias_fallback {
            for rtype in [DNSResourceType::CNAME, DNSResourceType::NS] {
                let alias = zone.get(qname, rtype, question.qclass);
                if !alias.is_empty() {
                    return alias.to_vec();
                }
            }
        }

        Vec::new()
    }
}

/// Address records for `target`, from whichever stored zone serves it.
fn glue(snapshot: &ZoneSnapshot, target: &str) -> Vec<DNSResource> {
    let target = target.to_ascii_lowercase();
    let Some(zone) = snapshot.find(&target, DNSResourceType::A) else {
        return Vec::new();
    };
    [DNSResourceType::A, DNSResourceType::AAAA]
        .into_iter()
        .flat_map(|rtype| zone.get(&target, rtype, DNSResourceClass::IN).iter().cloned())
        .collect()
}

/// Drop repeated records, keeping the first occurrence.
fn dedup(records: Vec<DNSResource>) -> Vec<DNSResource> {
    let mut unique: Vec<DNSResource> = Vec::with_capacity(records.len());
    for rr in records {
        if !unique.iter().any(|seen| seen.same_data(&rr)) {
            unique.push(rr);
        }
    }
    unique
}
