use portico_gateway::{Gateway, NetworkError};
use portico_protocol::ReturnObject;

use crate::io::CommandIo;

use super::{read_request_lines, respond, Command};

const GET_SUBCOMMAND: &str = "get";

/// Returns the most recent exception bound on this worker thread, or null
/// when there is none (or it has since been released).
pub(super) struct ExceptionCommand;

impl Command for ExceptionCommand {
    fn execute(&self, gateway: &Gateway, io: &dyn CommandIo) -> Result<(), NetworkError> {
        let lines = read_request_lines(io)?;
        let reply = match lines.as_slice() {
            [sub] if sub == GET_SUBCOMMAND => match gateway.last_exception_id() {
                Some(id) => ReturnObject::Reference(id),
                None => ReturnObject::Null,
            },
            _ => ReturnObject::protocol_error(),
        };
        respond(io, &reply)
    }
}
