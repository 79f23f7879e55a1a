//! Per-message processing shared by the UDP and TCP listeners.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::dns::{
    DNSPacket,
    edns::{EdnsOpt, SERVER_UDP_PAYLOAD},
    enums::{DnsOpcode, ResponseCode},
    header::{clear_wire_flag, flags},
};
use crate::forwarder::Forwarder;
use crate::zone::{AuthoritativeResponder, Resolution, ResolverOptions, ZoneStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp => f.write_str("udp"),
            Transport::Tcp => f.write_str("tcp"),
        }
    }
}

pub struct DnsHandler {
    responder: AuthoritativeResponder,
    forwarder: Forwarder,
    reject_edns: bool,
}

impl DnsHandler {
    pub fn new(
        zone_store: Arc<ZoneStore>,
        forwarder: Forwarder,
        alias_fallback: bool,
        reject_edns: bool,
    ) -> Self {
        let options = ResolverOptions {
            recursion: forwarder.upstream().is_some(),
            alias_fallback,
        };
        Self {
            responder: AuthoritativeResponder::new(zone_store, options),
            forwarder,
            reject_edns,
        }
    }

    /// Turn one inbound message into the bytes to send back. Returns None
    /// for input that cannot be answered at all: undecodable messages and
    /// messages that are themselves responses.
    pub async fn handle(&self, buf: &[u8], transport: Transport) -> Option<Vec<u8>> {
        let query = match DNSPacket::parse(buf) {
            Ok(query) => query,
            Err(e) => {
                debug!("Dropping malformed {} message ({} bytes): {}", transport, buf.len(), e);
                return None;
            }
        };
        if query.header.qr {
            debug!("Dropping {} response id={} sent to the server", transport, query.header.id);
            return None;
        }

        if let Some(question) = query.questions.first() {
            trace!(
                "{} query id={}: {} {} {}",
                transport, query.header.id, question.name, question.qclass, question.qtype
            );
        }

        let reply = if DnsOpcode::from_u8(query.header.opcode) != Some(DnsOpcode::Query) {
            debug!("Unsupported opcode {} in query id={}", query.header.opcode, query.header.id);
            self.encode(&query, DNSPacket::error_reply(&query, ResponseCode::NotImplemented))
        } else if self.reject_edns && query.edns.is_some() {
            debug!("Rejecting EDNS query id={}", query.header.id);
            finish(&query, DNSPacket::error_reply(&query, ResponseCode::NotImplemented))
        } else {
            match self.responder.resolve(&query) {
                Resolution::Answer(reply) => self.encode(&query, reply),
                Resolution::Recurse => self.relay(&query, buf).await,
            }
        }?;

        let limit = match transport {
            Transport::Udp => query.max_udp_payload_size() as usize,
            // Largest message a two-byte length prefix can frame
            Transport::Tcp => u16::MAX as usize,
        };
        if reply.len() > limit {
            debug!(
                "{} reply to id={} is {} bytes, over the {} byte limit; truncating",
                transport,
                query.header.id,
                reply.len(),
                limit
            );
            let mut short = DNSPacket::reply_to(&query);
            short.edns = echo_edns(&query);
            return short.truncated().serialize().ok();
        }
        Some(reply)
    }

    /// Serialize a local reply, echoing EDNS0 when the query used it.
    fn encode(&self, query: &DNSPacket, mut reply: DNSPacket) -> Option<Vec<u8>> {
        reply.edns = echo_edns(query);
        finish(query, reply)
    }

    async fn relay(&self, query: &DNSPacket, raw: &[u8]) -> Option<Vec<u8>> {
        match self.forwarder.forward(raw).await {
            Ok(mut reply) => {
                // Relayed data is neither ours nor a recursion service we offer
                clear_wire_flag(&mut reply, flags::AA);
                clear_wire_flag(&mut reply, flags::RA);
                Some(reply)
            }
            Err(e) => {
                warn!("Recursion for id={} failed: {}", query.header.id, e);
                servfail(query)
            }
        }
    }
}

fn echo_edns(query: &DNSPacket) -> Option<EdnsOpt> {
    query
        .edns
        .as_ref()
        .map(|_| EdnsOpt::with_payload_size(SERVER_UDP_PAYLOAD))
}

/// Serialize `reply`, falling back to SERVFAIL with the same EDNS0 choice.
fn finish(query: &DNSPacket, reply: DNSPacket) -> Option<Vec<u8>> {
    match reply.serialize() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!("Failed to serialize reply to id={}: {}", query.header.id, e);
            let mut fallback = DNSPacket::error_reply(query, ResponseCode::ServerFailure);
            fallback.edns = reply.edns;
            fallback.serialize().ok()
        }
    }
}

fn servfail(query: &DNSPacket) -> Option<Vec<u8>> {
    let mut reply = DNSPacket::error_reply(query, ResponseCode::ServerFailure);
    reply.edns = echo_edns(query);
    match reply.serialize() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!("Failed to serialize SERVFAIL for id={}: {}", query.header.id, e);
            None
        }
    }
}
