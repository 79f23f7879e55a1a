//! Domain name helpers shared by the codec, the zone store and ingestion.
//!
//! Names travel through the agent in presentation form: labels joined by
//! `.`, fully-qualified names end in `.`, and bytes that cannot appear
//! literally are written as `\.`, `\\` or `\DDD`.

use super::ParseError;

/// Maximum length of a single label on the wire
pub const MAX_LABEL_LEN: usize = 63;

/// Maximum length of an encoded name on the wire
pub const MAX_NAME_LEN: usize = 255;

/// Returns true if the name ends in an unescaped root label.
pub fn is_fqdn(name: &str) -> bool {
    if !name.ends_with('.') {
        return false;
    }
    // Count the backslashes in front of the final dot: an odd count escapes it
    let escapes = name[..name.len() - 1]
        .bytes()
        .rev()
        .take_while(|&b| b == b'\\')
        .count();
    escapes % 2 == 0
}

/// Append the root label when it is missing.
pub fn fqdn(name: &str) -> String {
    if is_fqdn(name) {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

/// Byte offsets at which each label of `name` starts.
///
/// For `www.example.com.` this yields `[0, 4, 12]`; the root name yields
/// nothing. Escaped dots do not start a new label.
pub fn label_offsets(name: &str) -> Vec<usize> {
    let bytes = name.as_bytes();
    let mut offsets = Vec::new();
    if name.is_empty() || name == "." {
        return offsets;
    }

    let mut start = true;
    let mut i = 0;
    while i < bytes.len() {
        if start {
            offsets.push(i);
            start = false;
        }
        match bytes[i] {
            b'\\' => i += 2,
            b'.' => {
                start = i + 1 < bytes.len();
                i += 1;
            }
            _ => i += 1,
        }
    }
    offsets
}

/// Every suffix of `name`, from the full name toward the root.
pub fn suffixes(name: &str) -> impl Iterator<Item = &str> {
    label_offsets(name).into_iter().map(move |off| &name[off..])
}

/// Split a presentation-form name into raw wire labels.
pub fn to_labels(name: &str) -> Result<Vec<Vec<u8>>, ParseError> {
    let mut labels = Vec::new();
    if name.is_empty() || name == "." {
        return Ok(labels);
    }

    let bytes = name.as_bytes();
    let mut current = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                let rest = &bytes[i + 1..];
                if rest.len() >= 3 && rest[..3].iter().all(u8::is_ascii_digit) {
                    let value = (rest[0] - b'0') as u16 * 100
                        + (rest[1] - b'0') as u16 * 10
                        + (rest[2] - b'0') as u16;
                    let byte = u8::try_from(value).map_err(|_| ParseError::InvalidLabel)?;
                    current.push(byte);
                    i += 4;
                } else if let Some(&c) = rest.first() {
                    current.push(c);
                    i += 2;
                } else {
                    return Err(ParseError::InvalidLabel);
                }
            }
            b'.' => {
                if current.is_empty() {
                    return Err(ParseError::InvalidLabel);
                }
                labels.push(std::mem::take(&mut current));
                i += 1;
            }
            c => {
                current.push(c);
                i += 1;
            }
        }
    }
    if !current.is_empty() {
        labels.push(current);
    }

    let mut wire_len = 1;
    for label in &labels {
        if label.len() > MAX_LABEL_LEN {
            return Err(ParseError::LabelTooLong(label.len()));
        }
        wire_len += label.len() + 1;
    }
    if wire_len > MAX_NAME_LEN {
        return Err(ParseError::NameTooLong);
    }

    Ok(labels)
}

/// Render one wire label in presentation form.
pub fn escape_label(label: &[u8], out: &mut String) {
    for &b in label {
        match b {
            b'.' | b'\\' | b'"' | b'(' | b')' | b';' | b' ' | b'@' | b'$' => {
                out.push('\\');
                out.push(b as char);
            }
            0x21..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:03}", b)),
        }
    }
}

/// Join wire labels into a fully-qualified presentation name.
pub fn from_labels(labels: &[Vec<u8>]) -> String {
    if labels.is_empty() {
        return ".".to_string();
    }
    let mut out = String::new();
    for label in labels {
        escape_label(label, &mut out);
        out.push('.');
    }
    out
}
