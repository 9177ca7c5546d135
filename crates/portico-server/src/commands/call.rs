use portico_gateway::{Gateway, NetworkError};
use portico_protocol::ReturnObject;

use crate::io::CommandIo;

use super::{read_request_lines, resolve_arguments, respond, Command};

const CALL_SUBCOMMAND: &str = "call";
const CONSTRUCTOR_SUBCOMMAND: &str = "constructor";

/// Method and constructor invocation.
///
/// `call`: method name, target id, tagged arguments. Static ids resolve
/// against the class named after the marker. `constructor`: fully
/// qualified class name, tagged arguments.
pub(super) struct CallCommand;

impl Command for CallCommand {
    fn execute(&self, gateway: &Gateway, io: &dyn CommandIo) -> Result<(), NetworkError> {
        let lines = read_request_lines(io)?;
        let reply = run(gateway, &lines);
        respond(io, &reply)
    }
}

fn run(gateway: &Gateway, lines: &[String]) -> ReturnObject {
    match lines {
        [sub, method, target, args @ ..] if sub == CALL_SUBCOMMAND => {
            match resolve_arguments(gateway, args) {
                Ok(args) => gateway.invoke(method, target, args),
                Err(envelope) => envelope,
            }
        }
        [sub, class, args @ ..] if sub == CONSTRUCTOR_SUBCOMMAND => {
            match resolve_arguments(gateway, args) {
                Ok(args) => gateway.invoke_constructor(class, args),
                Err(envelope) => envelope,
            }
        }
        _ => ReturnObject::protocol_error(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::commands::tests::{run_command, test_dispatcher};
    use crate::commands::CALL_COMMAND;

    #[test]
    fn constructor_then_calls_walk_the_documented_exchange() {
        let dispatcher = test_dispatcher();
        assert_eq!(
            run_command(
                &dispatcher,
                CALL_COMMAND,
                &["constructor", "java.lang.StringBuilder"],
            ),
            "yro0"
        );
        assert_eq!(
            run_command(&dispatcher, CALL_COMMAND, &["call", "append", "o0", "shi"]),
            "yro0"
        );
        assert_eq!(
            run_command(&dispatcher, CALL_COMMAND, &["call", "toString", "o0"]),
            "yshi"
        );
    }

    #[test]
    fn released_targets_answer_with_unknown_object() {
        let dispatcher = test_dispatcher();
        assert_eq!(
            run_command(&dispatcher, CALL_COMMAND, &["call", "toString", "o999"]),
            "!o"
        );
    }

    #[test]
    fn malformed_requests_answer_with_protocol_errors() {
        let dispatcher = test_dispatcher();
        assert_eq!(
            run_command(&dispatcher, CALL_COMMAND, &["call", "toString"]),
            "!p"
        );
        assert_eq!(run_command(&dispatcher, CALL_COMMAND, &["nope"]), "!p");
        assert_eq!(
            run_command(
                &dispatcher,
                CALL_COMMAND,
                &["call", "append", "o0", "Zbad-tag"],
            ),
            "!p"
        );
    }

    #[test]
    fn missing_constructors_come_back_as_bound_exceptions() {
        let dispatcher = test_dispatcher();
        let reply = run_command(
            &dispatcher,
            CALL_COMMAND,
            &["constructor", "no.such.Class"],
        );
        assert!(reply.starts_with("!x"), "{reply}");
        let id = reply.trim_start_matches("!x");
        assert!(dispatcher.gateway().get_object(id).is_some());
    }
}
