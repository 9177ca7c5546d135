use portico_gateway::{Gateway, HostValue, NetworkError};
use portico_protocol::{Argument, ReturnObject};

use crate::io::CommandIo;

use super::{read_request_lines, respond, Command};

const READ_SUBCOMMAND: &str = "read";
const WRITE_SUBCOMMAND: &str = "write";

/// Blob transfer. This is the one command whose exchange is not purely
/// line-oriented: `read` answers a length line followed by that many raw
/// bytes, and `write` is followed by a declared number of raw bytes that
/// get bound as a new byte value.
pub(super) struct StreamCommand;

impl Command for StreamCommand {
    fn execute(&self, gateway: &Gateway, io: &dyn CommandIo) -> Result<(), NetworkError> {
        let lines = read_request_lines(io)?;
        match lines.as_slice() {
            [sub, id] if sub == READ_SUBCOMMAND => match gateway.get_object(id) {
                Some(HostValue::Bytes(bytes)) => {
                    let length = ReturnObject::Primitive(Argument::Integer(bytes.len() as i32));
                    io.write_line(&length.encode())?;
                    io.write_bytes(&bytes)
                }
                Some(_) => respond(io, &ReturnObject::protocol_error()),
                None => respond(io, &ReturnObject::unknown_object()),
            },
            [sub, length] if sub == WRITE_SUBCOMMAND => {
                let Ok(length) = length.parse::<usize>() else {
                    return respond(io, &ReturnObject::protocol_error());
                };
                let mut bytes = vec![0u8; length];
                io.read_bytes(&mut bytes)?;
                let id = gateway.put_new_object(HostValue::Bytes(bytes));
                respond(io, &ReturnObject::Reference(id))
            }
            _ => respond(io, &ReturnObject::protocol_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use portico_gateway::HostValue;
    use pretty_assertions::assert_eq;

    use crate::commands::tests::test_dispatcher;
    use crate::commands::{DispatchOutcome, STREAM_COMMAND};
    use crate::io::scripted::ScriptedIo;

    #[test]
    fn read_streams_the_registered_bytes_after_a_length_line() {
        let dispatcher = test_dispatcher();
        let id = dispatcher
            .gateway()
            .put_new_object(HostValue::Bytes(b"payload".to_vec()));

        let io = ScriptedIo::new(&["read", &id]);
        assert!(matches!(
            dispatcher.dispatch(STREAM_COMMAND, &io),
            Ok(DispatchOutcome::Handled)
        ));
        assert_eq!(io.response(), "yi7");
        assert_eq!(io.written_bytes.lock().as_slice(), b"payload");
    }

    #[test]
    fn write_binds_the_declared_bytes() {
        let dispatcher = test_dispatcher();
        let io = ScriptedIo::new(&["write", "4"]).with_bytes(b"abcd");
        assert!(matches!(
            dispatcher.dispatch(STREAM_COMMAND, &io),
            Ok(DispatchOutcome::Handled)
        ));
        let reply = io.response();
        let id = reply.strip_prefix("yr").expect("reference reply");
        assert_eq!(
            dispatcher.gateway().get_object(id),
            Some(HostValue::Bytes(b"abcd".to_vec()))
        );
    }

    #[test]
    fn read_of_a_non_byte_value_is_a_protocol_error() {
        let dispatcher = test_dispatcher();
        let id = dispatcher.gateway().put_new_object(HostValue::Int(1));
        let io = ScriptedIo::new(&["read", &id]);
        assert!(matches!(
            dispatcher.dispatch(STREAM_COMMAND, &io),
            Ok(DispatchOutcome::Handled)
        ));
        assert_eq!(io.response(), "!p");
    }
}
