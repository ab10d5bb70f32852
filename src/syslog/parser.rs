//! Syslog datagram decoder
//!
//! Detects the framing of each datagram automatically:
//! - RFC 5424: `<PRI>1 TIMESTAMP HOST APP PROCID MSGID SD [MSG]`
//! - RFC 3164: `<PRI>Mmm dd hh:mm:ss [HOST] [TAG[PID]:] CONTENT`
//!
//! The legacy rules are lenient: anything with a valid PRI decodes, at
//! worst as bare content. Local senders writing to `/dev/log` usually omit
//! the hostname, so a leading token that already looks like a tag is not
//! taken as one.

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDateTime, TimeZone};

/// Largest valid PRI value (facility 23, severity 7)
const MAX_PRI: u16 = 191;

const NIL: &str = "-";

/// Header convention a message was decoded with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Rfc5424,
    Rfc3164,
}

/// One `[id name="value" ...]` structured data element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredElement {
    pub id: String,
    pub params: Vec<(String, String)>,
}

/// A decoded syslog message
#[derive(Debug, Clone, PartialEq)]
pub struct SyslogMessage {
    pub framing: Framing,
    pub facility: u8,
    pub severity: u8,
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub hostname: Option<String>,
    /// APP-NAME (RFC 5424) or TAG (RFC 3164)
    pub tag: Option<String>,
    pub proc_id: Option<String>,
    pub msg_id: Option<String>,
    pub structured_data: Vec<StructuredElement>,
    /// MSG of an RFC 5424 message
    pub message: Option<String>,
    /// CONTENT of an RFC 3164 message
    pub content: Option<String>,
}

impl SyslogMessage {
    fn new(framing: Framing, pri: u16) -> Self {
        Self {
            framing,
            facility: (pri / 8) as u8,
            severity: (pri % 8) as u8,
            timestamp: None,
            hostname: None,
            tag: None,
            proc_id: None,
            msg_id: None,
            structured_data: Vec::new(),
            message: None,
            content: None,
        }
    }

    /// Structured message if present, legacy content otherwise
    pub fn body(&self) -> Option<&str> {
        non_empty(self.message.as_deref()).or_else(|| non_empty(self.content.as_deref()))
    }

    /// `[hostname] [tag] body`, or `None` when there is no body
    pub fn to_line(&self) -> Option<String> {
        let body = self.body()?;
        let mut parts = Vec::with_capacity(3);
        if let Some(host) = non_empty(self.hostname.as_deref()) {
            parts.push(host);
        }
        if let Some(tag) = non_empty(self.tag.as_deref()) {
            parts.push(tag);
        }
        parts.push(body);
        Some(parts.join(" "))
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty datagram")]
    Empty,

    #[error("missing <PRI> header")]
    MissingPri,

    #[error("invalid PRI: {0}")]
    InvalidPri(String),

    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("{0} too long")]
    FieldTooLong(&'static str),

    #[error("message ends before {0}")]
    UnexpectedEnd(&'static str),

    #[error("invalid structured data: {0}")]
    InvalidStructuredData(String),
}

/// Decode a datagram, trying RFC 5424 first when it looks like one
pub fn parse(datagram: &[u8]) -> Result<SyslogMessage, ParseError> {
    let text = String::from_utf8_lossy(datagram);
    let text = text.trim_end_matches(['\n', '\r', '\0']);
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let (pri, rest) = parse_pri(text)?;

    if has_version(rest) {
        match parse_rfc5424(pri, rest) {
            Ok(msg) => return Ok(msg),
            Err(e) => log::trace!("Not RFC 5424 ({}), falling back to RFC 3164", e),
        }
    }

    Ok(parse_rfc3164(pri, rest))
}

fn parse_pri(text: &str) -> Result<(u16, &str), ParseError> {
    let rest = text.strip_prefix('<').ok_or(ParseError::MissingPri)?;
    let end = rest
        .find('>')
        .filter(|&end| end <= 3)
        .ok_or(ParseError::MissingPri)?;
    let digits = &rest[..end];

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidPri(digits.to_string()));
    }
    let pri: u16 = digits
        .parse()
        .map_err(|_| ParseError::InvalidPri(digits.to_string()))?;
    if pri > MAX_PRI {
        return Err(ParseError::InvalidPri(digits.to_string()));
    }

    Ok((pri, &rest[end + 1..]))
}

/// A nonzero version number followed by a space
fn has_version(rest: &str) -> bool {
    let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    (1..=3).contains(&digits)
        && !rest.starts_with('0')
        && rest.as_bytes().get(digits) == Some(&b' ')
}

/// Split off the next space-terminated header field
fn next_field<'a>(rest: &mut &'a str, name: &'static str) -> Result<&'a str, ParseError> {
    let (field, tail) = rest.split_once(' ').ok_or(ParseError::UnexpectedEnd(name))?;
    if field.is_empty() {
        return Err(ParseError::UnexpectedEnd(name));
    }
    *rest = tail;
    Ok(field)
}

fn nil_or(field: &str, name: &'static str, max_len: usize) -> Result<Option<String>, ParseError> {
    if field == NIL {
        return Ok(None);
    }
    if field.len() > max_len {
        return Err(ParseError::FieldTooLong(name));
    }
    Ok(Some(field.to_string()))
}

fn parse_rfc5424(pri: u16, mut rest: &str) -> Result<SyslogMessage, ParseError> {
    let mut msg = SyslogMessage::new(Framing::Rfc5424, pri);

    let version = next_field(&mut rest, "version")?;
    if version.parse::<u16>().map_or(true, |v| v == 0) {
        return Err(ParseError::InvalidVersion(version.to_string()));
    }

    let timestamp = next_field(&mut rest, "timestamp")?;
    if timestamp != NIL {
        let ts = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|_| ParseError::InvalidTimestamp(timestamp.to_string()))?;
        msg.timestamp = Some(ts);
    }

    msg.hostname = nil_or(next_field(&mut rest, "hostname")?, "hostname", 255)?;
    msg.tag = nil_or(next_field(&mut rest, "app-name")?, "app-name", 48)?;
    msg.proc_id = nil_or(next_field(&mut rest, "procid")?, "procid", 128)?;
    msg.msg_id = nil_or(next_field(&mut rest, "msgid")?, "msgid", 32)?;

    if rest.is_empty() {
        return Err(ParseError::UnexpectedEnd("structured data"));
    }

    let rest = if let Some(tail) = rest.strip_prefix(NIL) {
        tail
    } else {
        let (elements, tail) = parse_structured_data(rest)?;
        msg.structured_data = elements;
        tail
    };

    if !rest.is_empty() {
        let body = rest
            .strip_prefix(' ')
            .ok_or_else(|| ParseError::InvalidStructuredData(rest.to_string()))?;
        let body = body.strip_prefix('\u{feff}').unwrap_or(body);
        if !body.is_empty() {
            msg.message = Some(body.to_string());
        }
    }

    Ok(msg)
}

fn parse_structured_data(mut rest: &str) -> Result<(Vec<StructuredElement>, &str), ParseError> {
    let mut elements = Vec::new();

    while let Some(tail) = rest.strip_prefix('[') {
        let id_end = tail
            .find([' ', ']'])
            .ok_or_else(|| ParseError::InvalidStructuredData("unterminated element".into()))?;
        let id = &tail[..id_end];
        if id.is_empty() || id.contains(['=', '"']) {
            return Err(ParseError::InvalidStructuredData(format!("bad id {:?}", id)));
        }

        let mut element = StructuredElement {
            id: id.to_string(),
            params: Vec::new(),
        };
        rest = &tail[id_end..];

        loop {
            if let Some(tail) = rest.strip_prefix(']') {
                rest = tail;
                break;
            }
            let tail = rest
                .strip_prefix(' ')
                .ok_or_else(|| ParseError::InvalidStructuredData("expected parameter".into()))?;
            let (name, tail) = tail
                .split_once("=\"")
                .ok_or_else(|| ParseError::InvalidStructuredData("expected name=\"value\"".into()))?;
            if name.is_empty() || name.contains([' ', ']', '"']) {
                return Err(ParseError::InvalidStructuredData(format!("bad name {:?}", name)));
            }
            let (value, tail) = parse_param_value(tail)?;
            element.params.push((name.to_string(), value));
            rest = tail;
        }

        elements.push(element);
    }

    if elements.is_empty() {
        return Err(ParseError::InvalidStructuredData(rest.chars().take(16).collect()));
    }

    Ok((elements, rest))
}

/// Read a quoted value up to its closing quote, unescaping `\"`, `\\`, `\]`
fn parse_param_value(s: &str) -> Result<(String, &str), ParseError> {
    let mut value = String::new();
    let mut chars = s.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &s[i + 1..])),
            '\\' => match chars.next() {
                Some((_, escaped @ ('"' | '\\' | ']'))) => value.push(escaped),
                Some((_, other)) => {
                    value.push('\\');
                    value.push(other);
                }
                None => break,
            },
            c => value.push(c),
        }
    }

    Err(ParseError::InvalidStructuredData("unterminated value".into()))
}

fn parse_rfc3164(pri: u16, rest: &str) -> SyslogMessage {
    let mut msg = SyslogMessage::new(Framing::Rfc3164, pri);

    let Some((timestamp, rest)) = parse_bsd_timestamp(rest) else {
        // No header at all: everything is content
        msg.content = non_empty(Some(rest)).map(str::to_string);
        return msg;
    };
    msg.timestamp = timestamp;

    let rest = rest.trim_start_matches(' ');
    let rest = match parse_tag(rest) {
        Some(_) => rest,
        None => match rest.split_once(' ') {
            Some((host, tail)) => {
                msg.hostname = Some(host.to_string());
                tail
            }
            None => {
                msg.hostname = non_empty(Some(rest)).map(str::to_string);
                ""
            }
        },
    };

    let rest = match parse_tag(rest) {
        Some((tag, pid, tail)) => {
            msg.tag = Some(tag.to_string());
            msg.proc_id = pid.map(str::to_string);
            tail
        }
        None => rest,
    };

    msg.content = non_empty(Some(rest)).map(str::to_string);
    msg
}

/// Parse `Mmm dd hh:mm:ss` (day may be space padded).
///
/// Returns `None` when there is no timestamp-shaped header. The inner
/// option is `None` when the header has the right shape but names no real
/// date (Feb 30, for instance).
fn parse_bsd_timestamp(rest: &str) -> Option<(Option<DateTime<FixedOffset>>, &str)> {
    let stamp = rest.get(..15)?;
    let tail = &rest[15..];
    if !(tail.is_empty() || tail.starts_with(' ')) {
        return None;
    }

    let bytes = stamp.as_bytes();
    let shaped = bytes[..3].iter().all(u8::is_ascii_alphabetic)
        && bytes[3] == b' '
        && (bytes[4] == b' ' || bytes[4].is_ascii_digit())
        && bytes[5].is_ascii_digit()
        && bytes[6] == b' '
        && bytes[9] == b':'
        && bytes[12] == b':';
    if !shaped {
        return None;
    }

    let compact = stamp.split_whitespace().collect::<Vec<_>>().join(" ");
    let year = Local::now().year();
    let parsed = NaiveDateTime::parse_from_str(&format!("{} {}", year, compact), "%Y %b %d %H:%M:%S")
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).single())
        .map(|dt| dt.fixed_offset());

    Some((parsed, tail))
}

/// Parse `TAG[PID]:` or `TAG:` followed by an optional space
fn parse_tag(s: &str) -> Option<(&str, Option<&str>, &str)> {
    let end = s.find(['[', ':', ' '])?;
    let tag = &s[..end];
    if tag.is_empty() || tag.chars().count() > 32 {
        return None;
    }

    let (pid, rest) = match s[end..].strip_prefix('[') {
        Some(tail) => {
            let (pid, tail) = tail.split_once(']')?;
            (Some(pid), tail)
        }
        None => (None, &s[end..]),
    };

    let rest = rest.strip_prefix(':')?;
    Some((tag, pid, rest.strip_prefix(' ').unwrap_or(rest)))
}
