use thiserror::Error;

/// A typed argument line, decoded from (or encoded to) a single protocol
/// line whose first character is the type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Null,
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Double(f64),
    Char(char),
    Str(String),
    /// Raw bytes, base64 on the wire.
    Bytes(Vec<u8>),
    /// Arbitrary-precision decimal, carried in its string form.
    Decimal(String),
    /// An object id previously issued by the gateway.
    Reference(String),
}

/// The error half of a response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A host exception occurred; its throwable is bound in the registry
    /// under the carried id so the peer can inspect it.
    Exception(String),
    /// The target id is not bound (and is not a resolvable static id).
    UnknownObject,
    /// Malformed input: unknown tag, oversize value, bad payload.
    Protocol,
}

/// The tagged envelope describing a value returned to the peer.
///
/// Container variants carry a size snapshot taken at return time; iterators
/// carry none because computing their size would consume them.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnObject {
    Null,
    Void,
    Primitive(Argument),
    Reference(String),
    List { id: String, size: usize },
    Map { id: String, size: usize },
    Set { id: String, size: usize },
    Array { id: String, length: usize },
    Iterator { id: String },
    Error(ErrorKind),
}

impl ReturnObject {
    pub fn exception(id: impl Into<String>) -> Self {
        ReturnObject::Error(ErrorKind::Exception(id.into()))
    }

    pub fn unknown_object() -> Self {
        ReturnObject::Error(ErrorKind::UnknownObject)
    }

    pub fn protocol_error() -> Self {
        ReturnObject::Error(ErrorKind::Protocol)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ReturnObject::Error(_))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty protocol line")]
    EmptyLine,

    #[error("unknown type tag `{0}`")]
    UnknownTag(char),

    #[error("malformed `{tag}` payload: {payload:?}")]
    MalformedPayload { tag: char, payload: String },

    #[error("integer payload out of range: {0:?}")]
    IntegerOverflow(String),

    #[error("truncated escape sequence")]
    TruncatedEscape,

    #[error("malformed base64 payload")]
    Base64,
}

impl ProtocolError {
    pub(crate) fn malformed(tag: char, payload: &str) -> Self {
        ProtocolError::MalformedPayload {
            tag,
            payload: payload.to_string(),
        }
    }
}
