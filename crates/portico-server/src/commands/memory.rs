use portico_gateway::{Gateway, NetworkError};
use portico_protocol::ReturnObject;

use crate::io::CommandIo;

use super::{read_request_lines, respond, Command};

const RELEASE_SUBCOMMAND: &str = "release";
const ATTACH_SUBCOMMAND: &str = "attach";

/// Peer-driven lifetime management.
///
/// Bindings are single-owner: one `release` drops the entry, and `attach`
/// only asserts that the id is (still) bound.
pub(super) struct MemoryCommand;

impl Command for MemoryCommand {
    fn execute(&self, gateway: &Gateway, io: &dyn CommandIo) -> Result<(), NetworkError> {
        let lines = read_request_lines(io)?;
        let reply = run(gateway, &lines);
        respond(io, &reply)
    }
}

fn run(gateway: &Gateway, lines: &[String]) -> ReturnObject {
    match lines {
        [sub, id] if sub == RELEASE_SUBCOMMAND => {
            // Releasing an unknown id is a silent no-op.
            gateway.delete_object(id);
            ReturnObject::Void
        }
        [sub, id] if sub == ATTACH_SUBCOMMAND => {
            if gateway.registry().contains(id) {
                ReturnObject::Void
            } else {
                ReturnObject::unknown_object()
            }
        }
        _ => ReturnObject::protocol_error(),
    }
}
