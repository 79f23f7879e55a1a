//! Presentation-format record data parsing.
//!
//! Zone documents carry the type-specific part of each record as text, the
//! same text that follows the type in a master file. There is no origin:
//! relative names are completed against the root. A `;` is ordinary data
//! here and never starts a comment.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use super::{Result, ZoneError};
use crate::dns::{
    common::WireReader,
    enums::DNSResourceType,
    name::{from_labels, to_labels},
    rdata::RData,
};

/// One whitespace-separated field of record data.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    /// Text as written, quotes removed, escapes kept
    raw: String,
    /// Value with escapes decoded
    bytes: Vec<u8>,
    quoted: bool,
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let input = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < input.len() {
        let c = input[i];
        if c.is_ascii_whitespace() || c == b'(' || c == b')' {
            i += 1;
            continue;
        }

        let quoted = c == b'"';
        if quoted {
            i += 1;
        }
        let start = i;
        let mut bytes = Vec::new();
        let mut closed = !quoted;

        while i < input.len() {
            let c = input[i];
            if quoted && c == b'"' {
                closed = true;
                break;
            }
            if !quoted && (c.is_ascii_whitespace() || c == b'(' || c == b')' || c == b'"') {
                break;
            }
            if c == b'\\' {
                let (byte, used) = unescape(&input[i + 1..])?;
                bytes.push(byte);
                i += 1 + used;
            } else {
                bytes.push(c);
                i += 1;
            }
        }

        if !closed {
            return Err(ZoneError::rdata("string", "unterminated quoted string"));
        }
        let raw = text[start..i].to_string();
        if quoted {
            // Skip the closing quote
            i += 1;
        }
        tokens.push(Token { raw, bytes, quoted });
    }

    Ok(tokens)
}

/// Decode the escape following a backslash; returns the byte and the number
/// of input bytes consumed.
fn unescape(rest: &[u8]) -> Result<(u8, usize)> {
    if rest.len() >= 3 && rest[..3].iter().all(u8::is_ascii_digit) {
        let value = (rest[0] - b'0') as u16 * 100 + (rest[1] - b'0') as u16 * 10
            + (rest[2] - b'0') as u16;
        let byte = u8::try_from(value)
            .map_err(|_| ZoneError::rdata("escape", format!("\\{} out of range", value)))?;
        return Ok((byte, 3));
    }
    match rest.first() {
        Some(&c) => Ok((c, 1)),
        None => Err(ZoneError::rdata("escape", "dangling backslash")),
    }
}

/// Parse a TTL-style duration: plain seconds or a number with an
/// s/m/h/d/w suffix.
pub fn parse_ttl(s: &str) -> Result<u32> {
    let lower = s.to_ascii_lowercase();
    let (digits, multiplier) = match lower.char_indices().last() {
        Some((idx, 's')) => (&lower[..idx], 1u32),
        Some((idx, 'm')) => (&lower[..idx], 60),
        Some((idx, 'h')) => (&lower[..idx], 3600),
        Some((idx, 'd')) => (&lower[..idx], 86400),
        Some((idx, 'w')) => (&lower[..idx], 604800),
        _ => (lower.as_str(), 1),
    };
    digits
        .parse::<u32>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| ZoneError::rdata("TTL", format!("invalid duration: {}", s)))
}

struct Fields<'a> {
    rtype: DNSResourceType,
    tokens: std::slice::Iter<'a, Token>,
}

impl<'a> Fields<'a> {
    fn next(&mut self, what: &str) -> Result<&'a Token> {
        self.tokens
            .next()
            .ok_or_else(|| ZoneError::rdata(self.rtype, format!("missing {}", what)))
    }

    fn number<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.next(what)?;
        token.raw.parse::<T>().map_err(|_| {
            ZoneError::rdata(self.rtype, format!("invalid {}: {}", what, token.raw))
        })
    }

    fn duration(&mut self, what: &str) -> Result<u32> {
        let token = self.next(what)?;
        parse_ttl(&token.raw)
            .map_err(|_| ZoneError::rdata(self.rtype, format!("invalid {}: {}", what, token.raw)))
    }

    fn name(&mut self, what: &str) -> Result<String> {
        let token = self.next(what)?;
        parse_name(&token.raw)
            .map_err(|_| ZoneError::rdata(self.rtype, format!("invalid {}: {}", what, token.raw)))
    }

    /// Concatenate the remaining fields as hexadecimal data.
    fn hex_rest(&mut self, what: &str) -> Result<Vec<u8>> {
        let joined: String = self.tokens.by_ref().map(|t| t.raw.as_str()).collect();
        if joined.is_empty() {
            return Err(ZoneError::rdata(self.rtype, format!("missing {}", what)));
        }
        hex::decode(&joined)
            .map_err(|e| ZoneError::rdata(self.rtype, format!("invalid {}: {}", what, e)))
    }

    fn finish(mut self) -> Result<()> {
        match self.tokens.next() {
            None => Ok(()),
            Some(extra) => Err(ZoneError::rdata(
                self.rtype,
                format!("unexpected trailing data: {}", extra.raw),
            )),
        }
    }
}

/// Validate a domain name field and return it fully-qualified in the
/// canonical escaped form the wire decoder also produces.
pub fn parse_name(raw: &str) -> Result<String> {
    if raw == "@" || raw == "." {
        return Ok(".".to_string());
    }
    let labels =
        to_labels(raw).map_err(|e| ZoneError::InvalidDomainName(format!("{}: {}", raw, e)))?;
    Ok(from_labels(&labels))
}

/// Parse the presentation form of `rtype` record data.
pub fn parse_rdata(rtype: DNSResourceType, text: &str) -> Result<RData> {
    let tokens = tokenize(text)?;

    if tokens.first().is_some_and(|t| !t.quoted && t.raw == "\\#") {
        return parse_generic(rtype, &tokens[1..]);
    }

    let mut fields = Fields {
        rtype,
        tokens: tokens.iter(),
    };

    let rdata = match rtype {
        DNSResourceType::A => {
            let token = fields.next("address")?;
            RData::A(Ipv4Addr::from_str(&token.raw).map_err(|_| {
                ZoneError::rdata(rtype, format!("invalid IPv4 address: {}", token.raw))
            })?)
        }
        DNSResourceType::AAAA => {
            let token = fields.next("address")?;
            RData::AAAA(Ipv6Addr::from_str(&token.raw).map_err(|_| {
                ZoneError::rdata(rtype, format!("invalid IPv6 address: {}", token.raw))
            })?)
        }
        DNSResourceType::NS => RData::NS(fields.name("name server")?),
        DNSResourceType::CNAME => RData::CNAME(fields.name("target")?),
        DNSResourceType::PTR => RData::PTR(fields.name("target")?),
        DNSResourceType::MX => RData::MX {
            preference: fields.number("preference")?,
            exchange: fields.name("exchange")?,
        },
        DNSResourceType::TXT | DNSResourceType::SPF => {
            let mut strings = Vec::new();
            for token in fields.tokens.by_ref() {
                if token.bytes.len() > 255 {
                    return Err(ZoneError::rdata(
                        rtype,
                        "character-string longer than 255 bytes",
                    ));
                }
                strings.push(token.bytes.clone());
            }
            if strings.is_empty() {
                return Err(ZoneError::rdata(rtype, "missing text"));
            }
            RData::TXT(strings)
        }
        DNSResourceType::SRV => RData::SRV {
            priority: fields.number("priority")?,
            weight: fields.number("weight")?,
            port: fields.number("port")?,
            target: fields.name("target")?,
        },
        DNSResourceType::SOA => RData::SOA {
            mname: fields.name("primary name server")?,
            rname: fields.name("responsible mailbox")?,
            serial: fields.number("serial")?,
            refresh: fields.duration("refresh")?,
            retry: fields.duration("retry")?,
            expire: fields.duration("expire")?,
            minimum: fields.duration("minimum")?,
        },
        DNSResourceType::CAA => {
            let flags = fields.number("flags")?;
            let tag = fields.next("tag")?;
            if tag.raw.is_empty() || !tag.raw.bytes().all(|b| b.is_ascii_alphanumeric()) {
                return Err(ZoneError::rdata(rtype, format!("invalid tag: {}", tag.raw)));
            }
            let value = fields.next("value")?;
            RData::CAA {
                flags,
                tag: tag.raw.to_ascii_lowercase(),
                value: value.bytes.clone(),
            }
        }
        DNSResourceType::DS => RData::DS {
            key_tag: fields.number("key tag")?,
            algorithm: fields.number("algorithm")?,
            digest_type: fields.number("digest type")?,
            digest: fields.hex_rest("digest")?,
        },
        DNSResourceType::SSHFP => RData::SSHFP {
            algorithm: fields.number("algorithm")?,
            fingerprint_type: fields.number("fingerprint type")?,
            fingerprint: fields.hex_rest("fingerprint")?,
        },
        DNSResourceType::TLSA => RData::TLSA {
            usage: fields.number("usage")?,
            selector: fields.number("selector")?,
            matching_type: fields.number("matching type")?,
            data: fields.hex_rest("certificate data")?,
        },
        DNSResourceType::OPT
        | DNSResourceType::IXFR
        | DNSResourceType::AXFR
        | DNSResourceType::ANY => {
            return Err(ZoneError::InvalidRRType(rtype.to_string()));
        }
        _ => {
            return Err(ZoneError::rdata(
                rtype,
                "only the \\# generic form is accepted for this type",
            ));
        }
    };

    fields.finish()?;
    Ok(rdata)
}

/// RFC 3597 `\# <length> <hex>` form, valid for any storable type.
fn parse_generic(rtype: DNSResourceType, tokens: &[Token]) -> Result<RData> {
    let (len_token, rest) = tokens
        .split_first()
        .ok_or_else(|| ZoneError::rdata(rtype, "missing \\# length"))?;
    let len: u16 = len_token
        .raw
        .parse()
        .map_err(|_| ZoneError::rdata(rtype, format!("invalid \\# length: {}", len_token.raw)))?;

    let hex_text: String = rest.iter().map(|t| t.raw.as_str()).collect();
    let bytes = hex::decode(&hex_text)
        .map_err(|e| ZoneError::rdata(rtype, format!("invalid \\# data: {}", e)))?;
    if bytes.len() != len as usize {
        return Err(ZoneError::rdata(
            rtype,
            format!("\\# length {} does not match {} data bytes", len, bytes.len()),
        ));
    }

    let mut reader = WireReader::new(&bytes);
    RData::read(rtype, &mut reader, len).map_err(|e| ZoneError::rdata(rtype, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl("3600").unwrap(), 3600);
        assert_eq!(parse_ttl("1h").unwrap(), 3600);
        assert_eq!(parse_ttl("2D").unwrap(), 172800);
        assert_eq!(parse_ttl("1w").unwrap(), 604800);
        assert!(parse_ttl("soon").is_err());
        assert!(parse_ttl("9999999999").is_err());
    }

    #[test]
    fn test_relative_names_complete_against_root() {
        assert_eq!(
            parse_rdata(DNSResourceType::CNAME, "target.example.com").unwrap(),
            RData::CNAME("target.example.com.".to_string())
        );
        assert_eq!(
            parse_rdata(DNSResourceType::MX, "10 mail").unwrap(),
            RData::MX {
                preference: 10,
                exchange: "mail.".to_string()
            }
        );
    }

    #[test]
    fn test_txt_semicolon_is_data() {
        let rdata = parse_rdata(
            DNSResourceType::TXT,
            r#""v=DKIM1; k=rsa; p=MIGf" "second\"part""#,
        )
        .unwrap();
        assert_eq!(
            rdata,
            RData::TXT(vec![b"v=DKIM1; k=rsa; p=MIGf".to_vec(), b"second\"part".to_vec()])
        );

        // Escaped and bare semicolons in unquoted text
        let rdata = parse_rdata(DNSResourceType::TXT, r"a\;b c;d").unwrap();
        assert_eq!(rdata, RData::TXT(vec![b"a;b".to_vec(), b"c;d".to_vec()]));
    }

    #[test]
    fn test_soa_with_duration_units() {
        let rdata = parse_rdata(
            DNSResourceType::SOA,
            "ns1.example.com. hostmaster.example.com. ( 2024010101 1h 15m 1w 300 )",
        )
        .unwrap();
        assert_eq!(
            rdata,
            RData::SOA {
                mname: "ns1.example.com.".to_string(),
                rname: "hostmaster.example.com.".to_string(),
                serial: 2024010101,
                refresh: 3600,
                retry: 900,
                expire: 604800,
                minimum: 300,
            }
        );
    }

    #[test]
    fn test_ds_and_caa() {
        let ds = parse_rdata(DNSResourceType::DS, "60485 5 1 2BB183AF5F22588179A53B0A 98631FAD1A292118").unwrap();
        match ds {
            RData::DS {
                key_tag, digest, ..
            } => {
                assert_eq!(key_tag, 60485);
                assert_eq!(digest.len(), 20);
            }
            other => panic!("unexpected rdata {:?}", other),
        }

        let caa = parse_rdata(DNSResourceType::CAA, "0 issue \"letsencrypt.org\"").unwrap();
        assert_eq!(
            caa,
            RData::CAA {
                flags: 0,
                tag: "issue".to_string(),
                value: b"letsencrypt.org".to_vec()
            }
        );
    }

    #[test]
    fn test_generic_form() {
        let rdata = parse_rdata(DNSResourceType::A, "\\# 4 0A000001").unwrap();
        assert_eq!(rdata, RData::A(Ipv4Addr::new(10, 0, 0, 1)));

        let rdata = parse_rdata(DNSResourceType::Unknown(65280), "\\# 3 abcdef").unwrap();
        assert_eq!(rdata, RData::Unknown(vec![0xab, 0xcd, 0xef]));

        assert!(parse_rdata(DNSResourceType::A, "\\# 5 0A000001").is_err());
    }

    #[test]
    fn test_malformed_data_rejected() {
        assert!(parse_rdata(DNSResourceType::A, "1.2.3").is_err());
        assert!(parse_rdata(DNSResourceType::A, "1.2.3.4 5.6.7.8").is_err());
        assert!(parse_rdata(DNSResourceType::MX, "ten mail.example.").is_err());
        assert!(parse_rdata(DNSResourceType::SRV, "1 2 3").is_err());
        assert!(parse_rdata(DNSResourceType::TXT, "\"unterminated").is_err());
        assert!(parse_rdata(DNSResourceType::HINFO, "x86 linux").is_err());
        assert!(parse_rdata(DNSResourceType::CNAME, "a..b").is_err());
    }
}
