//! Line-oriented wire protocol spoken between the portico gateway and its
//! peer process.
//!
//! Every request is a sequence of UTF-8 lines: a command name, a subcommand,
//! zero or more typed argument lines, and the terminal [`END`] line. Every
//! response is a single line starting with [`SUCCESS`] or [`ERROR`], followed
//! by the encoded [`ReturnObject`].
//!
//! This crate is pure data: it never touches a socket. The server crate owns
//! the I/O and feeds lines through [`decode_argument`] / [`ReturnObject`].

mod codec;
mod types;

pub use codec::{decode_argument, encode_argument, encode_command, escape, unescape};
pub use types::{Argument, ErrorKind, ProtocolError, ReturnObject};

/// Terminal line of every request.
pub const END: &str = "e";

/// Shutdown command name; the connection closes without a response.
pub const SHUTDOWN_COMMAND: &str = "q";

/// First character of a successful response line.
pub const SUCCESS: char = 'y';

/// First character of an error response line.
pub const ERROR: char = '!';

/// Well-known id of the user-supplied entry point object.
pub const ENTRY_POINT_OBJECT_ID: &str = "t";

/// Well-known id of the default import view.
pub const DEFAULT_VIEW_OBJECT_ID: &str = "j";

/// Prefix of ids that name a class rather than a registered instance.
pub const STATIC_PREFIX: &str = "z:";

/// Prefix of instance ids issued by the registry.
pub const OBJECT_ID_PREFIX: &str = "o";

/// Returns true when `line` is a response (as opposed to an inbound command
/// name arriving on the same socket while a reply is awaited).
pub fn is_return_message(line: &str) -> bool {
    matches!(line.chars().next(), Some(SUCCESS) | Some(ERROR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_message_detection() {
        assert!(is_return_message("yro0"));
        assert!(is_return_message("!o"));
        assert!(!is_return_message("c"));
        assert!(!is_return_message(""));
    }
}
