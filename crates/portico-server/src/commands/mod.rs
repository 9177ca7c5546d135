use std::collections::HashMap;
use std::sync::Arc;

use portico_gateway::{Gateway, HostValue, NetworkError};
use portico_protocol::{decode_argument, Argument, ReturnObject, END, SHUTDOWN_COMMAND};

use crate::io::CommandIo;
use crate::TRACE_TARGET;

mod call;
mod collections;
mod exception;
mod field;
mod memory;
mod reflection;
mod stream;
mod view;

// Command names: the exact first line of a request.
pub const CALL_COMMAND: &str = "c";
pub const FIELD_COMMAND: &str = "f";
pub const LIST_COMMAND: &str = "l";
pub const ARRAY_COMMAND: &str = "a";
pub const MAP_COMMAND: &str = "m";
pub const SET_COMMAND: &str = "s";
pub const MEMORY_COMMAND: &str = "g";
pub const HELP_COMMAND: &str = "h";
pub const REFLECTION_COMMAND: &str = "r";
pub const VIEW_COMMAND: &str = "j";
pub const EXCEPTION_COMMAND: &str = "p";
pub const DIR_COMMAND: &str = "d";
pub const STREAM_COMMAND: &str = "S";

/// A command handler. `execute` parses the request up to (and including)
/// the terminal end line and writes exactly one response line; every
/// application-level failure becomes an error envelope, so `Err` here
/// always means the connection itself broke.
pub trait Command: Send + Sync {
    fn execute(&self, gateway: &Gateway, io: &dyn CommandIo) -> Result<(), NetworkError>;
}

pub enum DispatchOutcome {
    Handled,
    /// No handler for this command name; the caller decides whether to stay
    /// silent or answer with a protocol error.
    Unknown,
    /// The peer asked for a clean close; no response is written.
    Shutdown,
}

/// Routes command names to handlers. The table is fixed at construction.
pub struct Dispatcher {
    gateway: Arc<Gateway>,
    commands: HashMap<&'static str, Box<dyn Command>>,
}

impl Dispatcher {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        let mut commands: HashMap<&'static str, Box<dyn Command>> = HashMap::new();
        commands.insert(CALL_COMMAND, Box::new(call::CallCommand));
        commands.insert(FIELD_COMMAND, Box::new(field::FieldCommand));
        commands.insert(LIST_COMMAND, Box::new(collections::ListCommand));
        commands.insert(ARRAY_COMMAND, Box::new(collections::ArrayCommand));
        commands.insert(MAP_COMMAND, Box::new(collections::MapCommand));
        commands.insert(SET_COMMAND, Box::new(collections::SetCommand));
        commands.insert(MEMORY_COMMAND, Box::new(memory::MemoryCommand));
        commands.insert(HELP_COMMAND, Box::new(reflection::HelpCommand));
        commands.insert(REFLECTION_COMMAND, Box::new(reflection::ReflectionCommand));
        commands.insert(VIEW_COMMAND, Box::new(view::ViewCommand));
        commands.insert(EXCEPTION_COMMAND, Box::new(exception::ExceptionCommand));
        commands.insert(DIR_COMMAND, Box::new(reflection::DirCommand));
        commands.insert(STREAM_COMMAND, Box::new(stream::StreamCommand));
        Self { gateway, commands }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn dispatch(
        &self,
        name: &str,
        io: &dyn CommandIo,
    ) -> Result<DispatchOutcome, NetworkError> {
        if name == SHUTDOWN_COMMAND {
            return Ok(DispatchOutcome::Shutdown);
        }
        match self.commands.get(name) {
            Some(command) => {
                command.execute(&self.gateway, io)?;
                Ok(DispatchOutcome::Handled)
            }
            None => Ok(DispatchOutcome::Unknown),
        }
    }
}

/// Reads raw request lines up to the end marker. Losing the stream mid
/// request is a connection failure, not a protocol error.
pub(crate) fn read_request_lines(io: &dyn CommandIo) -> Result<Vec<String>, NetworkError> {
    let mut lines = Vec::new();
    loop {
        match io.read_line()? {
            Some(line) if line == END => return Ok(lines),
            Some(line) => lines.push(line),
            None => return Err(NetworkError::Closed),
        }
    }
}

/// Decodes tagged argument lines, resolving references through the
/// registry. `Err` carries the envelope to answer with.
pub(crate) fn resolve_arguments(
    gateway: &Gateway,
    lines: &[String],
) -> Result<Vec<HostValue>, ReturnObject> {
    lines
        .iter()
        .map(|line| {
            let argument =
                decode_argument(line).map_err(|error| {
                    tracing::debug!(target: TRACE_TARGET, event = "bad_argument", error = %error);
                    ReturnObject::protocol_error()
                })?;
            resolve_argument(gateway, argument)
        })
        .collect()
}

pub(crate) fn resolve_argument(
    gateway: &Gateway,
    argument: Argument,
) -> Result<HostValue, ReturnObject> {
    Ok(match argument {
        Argument::Null => HostValue::Null,
        Argument::Boolean(v) => HostValue::Bool(v),
        Argument::Integer(v) => HostValue::Int(v),
        Argument::Long(v) => HostValue::Long(v),
        Argument::Double(v) => HostValue::Double(v),
        Argument::Char(v) => HostValue::Char(v),
        Argument::Str(v) => HostValue::Str(v),
        Argument::Bytes(v) => HostValue::Bytes(v),
        Argument::Decimal(v) => HostValue::Decimal(v),
        Argument::Reference(id) => gateway
            .get_object(&id)
            .ok_or_else(ReturnObject::unknown_object)?,
    })
}

/// Writes the single response line for `reply`.
pub(crate) fn respond(io: &dyn CommandIo, reply: &ReturnObject) -> Result<(), NetworkError> {
    io.write_line(&reply.encode())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use portico_gateway::mock::MockReflector;
    use portico_gateway::Gateway;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::io::scripted::ScriptedIo;

    pub(crate) fn test_dispatcher() -> Dispatcher {
        let gateway = Gateway::new(None, Arc::new(MockReflector::with_builtins()));
        gateway.startup();
        Dispatcher::new(Arc::new(gateway))
    }

    /// Runs one scripted request through the dispatcher and returns the
    /// response line.
    pub(crate) fn run_command(dispatcher: &Dispatcher, name: &str, lines: &[&str]) -> String {
        let io = ScriptedIo::new(lines);
        assert!(
            matches!(
                dispatcher.dispatch(name, &io),
                Ok(DispatchOutcome::Handled)
            ),
            "dispatch did not handle command {name}"
        );
        io.response()
    }

    #[test]
    fn unknown_names_are_reported_not_answered() {
        let dispatcher = test_dispatcher();
        let io = ScriptedIo::new(&[]);
        assert!(matches!(
            dispatcher.dispatch("definitely-not-a-command", &io),
            Ok(DispatchOutcome::Unknown)
        ));
        assert!(io.written_lines.lock().is_empty());
    }

    #[test]
    fn shutdown_is_not_routed_to_a_handler() {
        let dispatcher = test_dispatcher();
        let io = ScriptedIo::new(&[]);
        assert!(matches!(
            dispatcher.dispatch(SHUTDOWN_COMMAND, &io),
            Ok(DispatchOutcome::Shutdown)
        ));
        assert!(io.written_lines.lock().is_empty());
    }

    #[test]
    fn reference_arguments_resolve_through_the_registry() {
        let dispatcher = test_dispatcher();
        let id = dispatcher
            .gateway()
            .put_new_object(portico_gateway::HostValue::Str("x".to_string()));
        let resolved = resolve_arguments(
            dispatcher.gateway(),
            &[format!("r{id}"), "i3".to_string()],
        )
        .unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[1], portico_gateway::HostValue::Int(3));
    }

    #[test]
    fn unresolvable_references_become_unknown_object_envelopes() {
        let dispatcher = test_dispatcher();
        let err = resolve_arguments(dispatcher.gateway(), &["ro999".to_string()]).unwrap_err();
        assert_eq!(err, ReturnObject::unknown_object());
    }
}
