use portico_gateway::NetworkError;

/// Line-oriented I/O handed to command handlers.
///
/// Methods take `&self` and lock internally per call, so a handler can hold
/// the trait object across a nested outbound callback without deadlocking
/// the connection it is running on.
pub trait CommandIo {
    /// Reads one line, stripping the terminator. `None` at end of stream.
    fn read_line(&self) -> Result<Option<String>, NetworkError>;

    /// Writes one line followed by `\n` and flushes.
    fn write_line(&self, line: &str) -> Result<(), NetworkError>;

    /// Reads exactly `buf.len()` raw bytes (the stream command's payload).
    fn read_bytes(&self, buf: &mut [u8]) -> Result<(), NetworkError>;

    /// Writes raw bytes and flushes.
    fn write_bytes(&self, bytes: &[u8]) -> Result<(), NetworkError>;
}

#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::VecDeque;
    use std::io::{Error, ErrorKind};

    use parking_lot::Mutex;
    use portico_gateway::NetworkError;
    use portico_protocol::END;

    use super::CommandIo;

    /// In-memory [`CommandIo`] for handler tests: serves one complete
    /// scripted request (the end line is appended automatically) and
    /// records everything written.
    #[derive(Default)]
    pub(crate) struct ScriptedIo {
        lines: Mutex<VecDeque<String>>,
        bytes: Mutex<VecDeque<u8>>,
        pub written_lines: Mutex<Vec<String>>,
        pub written_bytes: Mutex<Vec<u8>>,
    }

    impl ScriptedIo {
        pub fn new(lines: &[&str]) -> Self {
            let mut input: VecDeque<String> = lines.iter().map(|l| l.to_string()).collect();
            input.push_back(END.to_string());
            Self {
                lines: Mutex::new(input),
                ..Self::default()
            }
        }

        pub fn with_bytes(self, bytes: &[u8]) -> Self {
            *self.bytes.lock() = bytes.iter().copied().collect();
            self
        }

        /// The single response line a handler is expected to have written.
        pub fn response(&self) -> String {
            let written = self.written_lines.lock();
            assert_eq!(written.len(), 1, "expected exactly one response line: {written:?}");
            written[0].clone()
        }
    }

    impl CommandIo for ScriptedIo {
        fn read_line(&self) -> Result<Option<String>, NetworkError> {
            Ok(self.lines.lock().pop_front())
        }

        fn write_line(&self, line: &str) -> Result<(), NetworkError> {
            self.written_lines.lock().push(line.to_string());
            Ok(())
        }

        fn read_bytes(&self, buf: &mut [u8]) -> Result<(), NetworkError> {
            let mut bytes = self.bytes.lock();
            if bytes.len() < buf.len() {
                return Err(NetworkError::Io(Error::new(
                    ErrorKind::UnexpectedEof,
                    "scripted byte input exhausted",
                )));
            }
            for slot in buf.iter_mut() {
                *slot = bytes.pop_front().unwrap();
            }
            Ok(())
        }

        fn write_bytes(&self, bytes: &[u8]) -> Result<(), NetworkError> {
            self.written_bytes.lock().extend_from_slice(bytes);
            Ok(())
        }
    }
}
