use portico_gateway::{Gateway, NetworkError};
use portico_protocol::{decode_argument, ReturnObject};

use crate::io::CommandIo;

use super::{read_request_lines, resolve_argument, respond, Command};

const GET_SUBCOMMAND: &str = "get";
const SET_SUBCOMMAND: &str = "set";

/// Field access: `get` target id + field name, `set` additionally a tagged
/// value. Writes answer void.
pub(super) struct FieldCommand;

impl Command for FieldCommand {
    fn execute(&self, gateway: &Gateway, io: &dyn CommandIo) -> Result<(), NetworkError> {
        let lines = read_request_lines(io)?;
        let reply = run(gateway, &lines);
        respond(io, &reply)
    }
}

fn run(gateway: &Gateway, lines: &[String]) -> ReturnObject {
    match lines {
        [sub, target, name] if sub == GET_SUBCOMMAND => gateway.get_field_value(target, name),
        [sub, target, name, value] if sub == SET_SUBCOMMAND => {
            let argument = match decode_argument(value) {
                Ok(argument) => argument,
                Err(_) => return ReturnObject::protocol_error(),
            };
            match resolve_argument(gateway, argument) {
                Ok(value) => gateway.set_field_value(target, name, value),
                Err(envelope) => envelope,
            }
        }
        _ => ReturnObject::protocol_error(),
    }
}
