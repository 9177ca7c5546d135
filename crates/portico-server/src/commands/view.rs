use portico_gateway::{Gateway, HostValue, NetworkError, View};
use portico_protocol::{Argument, ReturnObject};

use crate::io::CommandIo;

use super::{read_request_lines, respond, Command};

const CREATE_SUBCOMMAND: &str = "create";
const IMPORT_SUBCOMMAND: &str = "import";
const REMOVE_SUBCOMMAND: &str = "remove";

/// Import-scope management. `create` registers a fresh named view and
/// answers with its reference; `import`/`remove` mutate an existing view
/// (`java.util.*` means the whole package).
pub(super) struct ViewCommand;

impl Command for ViewCommand {
    fn execute(&self, gateway: &Gateway, io: &dyn CommandIo) -> Result<(), NetworkError> {
        let lines = read_request_lines(io)?;
        let reply = run(gateway, &lines);
        respond(io, &reply)
    }
}

fn run(gateway: &Gateway, lines: &[String]) -> ReturnObject {
    match lines {
        [sub, name] if sub == CREATE_SUBCOMMAND => {
            let id = gateway.put_new_object(HostValue::object(View::new(name.clone())));
            ReturnObject::Reference(id)
        }
        [sub, view_id, fqn] if sub == IMPORT_SUBCOMMAND => with_view(gateway, view_id, |view| {
            view.add_import(fqn);
            ReturnObject::Void
        }),
        [sub, view_id, fqn] if sub == REMOVE_SUBCOMMAND => with_view(gateway, view_id, |view| {
            ReturnObject::Primitive(Argument::Boolean(view.remove_import(fqn)))
        }),
        _ => ReturnObject::protocol_error(),
    }
}

fn with_view(
    gateway: &Gateway,
    view_id: &str,
    action: impl FnOnce(&View) -> ReturnObject,
) -> ReturnObject {
    let Some(value) = gateway.get_object(view_id) else {
        return ReturnObject::unknown_object();
    };
    match value.downcast_object::<View>() {
        Some(view) => action(view),
        None => ReturnObject::protocol_error(),
    }
}

#[cfg(test)]
mod tests {
    use portico_protocol::DEFAULT_VIEW_OBJECT_ID;
    use pretty_assertions::assert_eq;

    use crate::commands::tests::{run_command, test_dispatcher};
    use crate::commands::{REFLECTION_COMMAND, VIEW_COMMAND};

    #[test]
    fn create_returns_a_view_reference() {
        let dispatcher = test_dispatcher();
        let reply = run_command(&dispatcher, VIEW_COMMAND, &["create", "worker"]);
        let id = reply.strip_prefix("yr").expect("reference reply");
        assert!(dispatcher.gateway().get_object(id).is_some());
    }

    #[test]
    fn imports_steer_name_resolution() {
        let dispatcher = test_dispatcher();
        assert_eq!(
            run_command(
                &dispatcher,
                VIEW_COMMAND,
                &["import", DEFAULT_VIEW_OBJECT_ID, "java.lang.*"],
            ),
            "yv"
        );
        assert_eq!(
            run_command(
                &dispatcher,
                REFLECTION_COMMAND,
                &["unknown", "StringBuilder", DEFAULT_VIEW_OBJECT_ID],
            ),
            "ycjava.lang.StringBuilder"
        );
        assert_eq!(
            run_command(
                &dispatcher,
                VIEW_COMMAND,
                &["remove", DEFAULT_VIEW_OBJECT_ID, "java.lang.*"],
            ),
            "yt"
        );
        assert_eq!(
            run_command(
                &dispatcher,
                REFLECTION_COMMAND,
                &["unknown", "StringBuilder", DEFAULT_VIEW_OBJECT_ID],
            ),
            "yo"
        );
    }

    #[test]
    fn mutating_a_non_view_is_a_protocol_error() {
        let dispatcher = test_dispatcher();
        let id = dispatcher
            .gateway()
            .put_new_object(portico_gateway::HostValue::Int(1));
        assert_eq!(
            run_command(&dispatcher, VIEW_COMMAND, &["import", &id, "a.B"]),
            "!p"
        );
        assert_eq!(
            run_command(&dispatcher, VIEW_COMMAND, &["import", "o999", "a.B"]),
            "!o"
        );
    }
}
