use base64::{engine::general_purpose, Engine as _};

use crate::types::{Argument, ErrorKind, ProtocolError, ReturnObject};
use crate::{ERROR, SUCCESS};

// Argument type tags. Single characters, first byte of an argument line.
const TAG_INTEGER: char = 'i';
const TAG_LONG: char = 'l';
const TAG_DOUBLE: char = 'd';
const TAG_BOOLEAN: char = 'b';
const TAG_STRING: char = 's';
const TAG_CHAR: char = 'c';
const TAG_NULL: char = 'n';
const TAG_REFERENCE: char = 'r';
const TAG_TRUE: char = 't';
const TAG_FALSE: char = 'f';
const TAG_BYTES: char = 'L';
const TAG_DECIMAL: char = 'D';

// Return-object tags that never appear in argument position.
const TAG_VOID: char = 'v';
const TAG_LIST: char = 'l';
const TAG_MAP: char = 'a';
const TAG_SET: char = 'h';
const TAG_ARRAY: char = 't';
const TAG_ITERATOR: char = 'u';

// Error kinds, following the `!` marker.
const TAG_ERROR_EXCEPTION: char = 'x';
const TAG_ERROR_UNKNOWN_OBJECT: char = 'o';
const TAG_ERROR_PROTOCOL: char = 'p';

const BOOLEAN_TRUE: &str = "True";
const BOOLEAN_FALSE: &str = "False";

/// Escapes a string payload so it fits on one protocol line.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Reverses [`escape`]. A lone trailing backslash is malformed.
pub fn unescape(payload: &str) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(payload.len());
    let mut chars = payload.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                // Unknown escapes pass through untouched; the peer library
                // only ever produces the three above.
                out.push('\\');
                out.push(other);
            }
            None => return Err(ProtocolError::TruncatedEscape),
        }
    }
    Ok(out)
}

/// Decodes one argument line (without its trailing newline).
///
/// The decoder never looks past the line it is handed; framing is the
/// caller's job.
pub fn decode_argument(line: &str) -> Result<Argument, ProtocolError> {
    let mut chars = line.chars();
    let tag = chars.next().ok_or(ProtocolError::EmptyLine)?;
    let payload = chars.as_str();

    match tag {
        TAG_NULL => Ok(Argument::Null),
        TAG_TRUE => Ok(Argument::Boolean(true)),
        TAG_FALSE => Ok(Argument::Boolean(false)),
        TAG_BOOLEAN => match payload {
            BOOLEAN_TRUE => Ok(Argument::Boolean(true)),
            BOOLEAN_FALSE => Ok(Argument::Boolean(false)),
            _ => Err(ProtocolError::malformed(tag, payload)),
        },
        TAG_INTEGER => payload
            .parse::<i32>()
            .map(Argument::Integer)
            .map_err(|_| integer_error(tag, payload)),
        TAG_LONG => payload
            .parse::<i64>()
            .map(Argument::Long)
            .map_err(|_| integer_error(tag, payload)),
        TAG_DOUBLE => payload
            .parse::<f64>()
            .map(Argument::Double)
            .map_err(|_| ProtocolError::malformed(tag, payload)),
        TAG_CHAR => {
            let mut payload_chars = payload.chars();
            match (payload_chars.next(), payload_chars.next()) {
                (Some(ch), None) => Ok(Argument::Char(ch)),
                _ => Err(ProtocolError::malformed(tag, payload)),
            }
        }
        TAG_STRING => unescape(payload).map(Argument::Str),
        TAG_BYTES => general_purpose::STANDARD
            .decode(payload)
            .map(Argument::Bytes)
            .map_err(|_| ProtocolError::Base64),
        TAG_DECIMAL => {
            if is_decimal(payload) {
                Ok(Argument::Decimal(payload.to_string()))
            } else {
                Err(ProtocolError::malformed(tag, payload))
            }
        }
        TAG_REFERENCE => {
            if payload.is_empty() {
                Err(ProtocolError::malformed(tag, payload))
            } else {
                Ok(Argument::Reference(payload.to_string()))
            }
        }
        other => Err(ProtocolError::UnknownTag(other)),
    }
}

/// Encodes one argument as a single line (no trailing newline).
pub fn encode_argument(argument: &Argument) -> String {
    match argument {
        Argument::Null => TAG_NULL.to_string(),
        Argument::Boolean(true) => TAG_TRUE.to_string(),
        Argument::Boolean(false) => TAG_FALSE.to_string(),
        Argument::Integer(v) => format!("{TAG_INTEGER}{v}"),
        Argument::Long(v) => format!("{TAG_LONG}{v}"),
        Argument::Double(v) => format!("{TAG_DOUBLE}{v}"),
        Argument::Char(v) => format!("{TAG_CHAR}{v}"),
        Argument::Str(v) => format!("{TAG_STRING}{}", escape(v)),
        Argument::Bytes(v) => format!("{TAG_BYTES}{}", general_purpose::STANDARD.encode(v)),
        Argument::Decimal(v) => format!("{TAG_DECIMAL}{v}"),
        Argument::Reference(id) => format!("{TAG_REFERENCE}{id}"),
    }
}

/// Builds a full request: header lines, encoded arguments, and the terminal
/// [`crate::END`] line, each terminated by `\n`.
pub fn encode_command(head: &[&str], arguments: &[Argument]) -> String {
    let mut out = String::new();
    for line in head {
        out.push_str(line);
        out.push('\n');
    }
    for argument in arguments {
        out.push_str(&encode_argument(argument));
        out.push('\n');
    }
    out.push_str(crate::END);
    out.push('\n');
    out
}

impl ReturnObject {
    /// Encodes the full single-line response (without its trailing newline).
    pub fn encode(&self) -> String {
        match self {
            ReturnObject::Error(kind) => {
                let mut out = String::new();
                out.push(ERROR);
                match kind {
                    ErrorKind::Exception(id) => {
                        out.push(TAG_ERROR_EXCEPTION);
                        out.push_str(id);
                    }
                    ErrorKind::UnknownObject => out.push(TAG_ERROR_UNKNOWN_OBJECT),
                    ErrorKind::Protocol => out.push(TAG_ERROR_PROTOCOL),
                }
                out
            }
            other => {
                let mut out = String::new();
                out.push(SUCCESS);
                match other {
                    ReturnObject::Null => out.push(TAG_NULL),
                    ReturnObject::Void => out.push(TAG_VOID),
                    ReturnObject::Primitive(argument) => out.push_str(&encode_argument(argument)),
                    ReturnObject::Reference(id) => {
                        out.push(TAG_REFERENCE);
                        out.push_str(id);
                    }
                    ReturnObject::List { id, size } => {
                        out.push_str(&format!("{TAG_LIST}{id},{size}"))
                    }
                    ReturnObject::Map { id, size } => out.push_str(&format!("{TAG_MAP}{id},{size}")),
                    ReturnObject::Set { id, size } => out.push_str(&format!("{TAG_SET}{id},{size}")),
                    ReturnObject::Array { id, length } => {
                        out.push_str(&format!("{TAG_ARRAY}{id},{length}"))
                    }
                    ReturnObject::Iterator { id } => {
                        out.push(TAG_ITERATOR);
                        out.push_str(id);
                    }
                    ReturnObject::Error(_) => unreachable!(),
                }
                out
            }
        }
    }

    /// Decodes a full response line.
    ///
    /// `l` and `t` are shared between a primitive reading (long, boolean
    /// true) and a container reading (list, array); the payload shape
    /// disambiguates: container payloads are `<id>,<n>`.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let mut chars = line.chars();
        let marker = chars.next().ok_or(ProtocolError::EmptyLine)?;
        let rest = chars.as_str();
        match marker {
            ERROR => Self::decode_error(rest),
            SUCCESS => Self::decode_success(rest),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }

    fn decode_error(rest: &str) -> Result<Self, ProtocolError> {
        let mut chars = rest.chars();
        let tag = chars.next().ok_or(ProtocolError::EmptyLine)?;
        let payload = chars.as_str();
        match tag {
            TAG_ERROR_EXCEPTION => Ok(ReturnObject::exception(payload)),
            TAG_ERROR_UNKNOWN_OBJECT => Ok(ReturnObject::unknown_object()),
            TAG_ERROR_PROTOCOL => Ok(ReturnObject::protocol_error()),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }

    fn decode_success(rest: &str) -> Result<Self, ProtocolError> {
        let mut chars = rest.chars();
        let tag = chars.next().ok_or(ProtocolError::EmptyLine)?;
        let payload = chars.as_str();
        match tag {
            TAG_NULL => Ok(ReturnObject::Null),
            TAG_VOID => Ok(ReturnObject::Void),
            // Legacy spellings still emitted by older peer libraries.
            TAG_REFERENCE if payload == "v" => Ok(ReturnObject::Void),
            TAG_REFERENCE if payload == "n" => Ok(ReturnObject::Null),
            TAG_REFERENCE => decode_argument(rest).map(|argument| match argument {
                Argument::Reference(id) => ReturnObject::Reference(id),
                other => ReturnObject::Primitive(other),
            }),
            TAG_LIST => {
                if payload.parse::<i64>().is_ok() {
                    decode_argument(rest).map(ReturnObject::Primitive)
                } else {
                    let (id, size) = split_sized(tag, payload)?;
                    Ok(ReturnObject::List { id, size })
                }
            }
            TAG_ARRAY => {
                if payload.is_empty() {
                    Ok(ReturnObject::Primitive(Argument::Boolean(true)))
                } else {
                    let (id, length) = split_sized(tag, payload)?;
                    Ok(ReturnObject::Array { id, length })
                }
            }
            TAG_MAP => {
                let (id, size) = split_sized(tag, payload)?;
                Ok(ReturnObject::Map { id, size })
            }
            TAG_SET => {
                let (id, size) = split_sized(tag, payload)?;
                Ok(ReturnObject::Set { id, size })
            }
            TAG_ITERATOR => {
                if payload.is_empty() {
                    Err(ProtocolError::malformed(tag, payload))
                } else {
                    Ok(ReturnObject::Iterator {
                        id: payload.to_string(),
                    })
                }
            }
            _ => decode_argument(rest).map(ReturnObject::Primitive),
        }
    }
}

fn split_sized(tag: char, payload: &str) -> Result<(String, usize), ProtocolError> {
    let (id, size) = payload
        .rsplit_once(',')
        .ok_or_else(|| ProtocolError::malformed(tag, payload))?;
    if id.is_empty() {
        return Err(ProtocolError::malformed(tag, payload));
    }
    let size = size
        .parse::<usize>()
        .map_err(|_| ProtocolError::malformed(tag, payload))?;
    Ok((id.to_string(), size))
}

fn integer_error(tag: char, payload: &str) -> ProtocolError {
    let looks_numeric = payload.chars().any(|c| c.is_ascii_digit())
        && payload.chars().all(|c| c.is_ascii_digit() || c == '-');
    if looks_numeric {
        ProtocolError::IntegerOverflow(payload.to_string())
    } else {
        ProtocolError::malformed(tag, payload)
    }
}

fn is_decimal(payload: &str) -> bool {
    let digits = payload.strip_prefix('-').unwrap_or(payload);
    if digits.is_empty() {
        return false;
    }
    let mut seen_dot = false;
    for ch in digits.chars() {
        match ch {
            '0'..='9' => {}
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    digits != "." && !digits.starts_with('.') && !digits.ends_with('.')
}
