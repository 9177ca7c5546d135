use portico_gateway::{CallTarget, Gateway, HostValue, NameResolution, NetworkError, View};
use portico_protocol::{ReturnObject, STATIC_PREFIX, SUCCESS};

use crate::io::CommandIo;

use super::{read_request_lines, respond, Command};

const UNKNOWN_SUBCOMMAND: &str = "unknown";
const CLASS_SUBCOMMAND: &str = "class";
const OBJECT_SUBCOMMAND: &str = "object";
const MEMBERS_SUBCOMMAND: &str = "members";
const PACKAGE_SUBCOMMAND: &str = "package";

// Tags for name-classification answers.
const CLASS_TAG: char = 'c';
const PACKAGE_TAG: char = 'p';
const NOTHING_TAG: char = 'o';

/// Name classification inside a view: is a bare name a class, a package,
/// or nothing the view can see?
pub(super) struct ReflectionCommand;

impl Command for ReflectionCommand {
    fn execute(&self, gateway: &Gateway, io: &dyn CommandIo) -> Result<(), NetworkError> {
        let lines = read_request_lines(io)?;
        let line = match lines.as_slice() {
            [sub, name, view_id] if sub == UNKNOWN_SUBCOMMAND => {
                match classify(gateway, name, view_id) {
                    Ok(line) => line,
                    Err(envelope) => envelope.encode(),
                }
            }
            _ => ReturnObject::protocol_error().encode(),
        };
        io.write_line(&line)
    }
}

fn classify(gateway: &Gateway, name: &str, view_id: &str) -> Result<String, ReturnObject> {
    let Some(value) = gateway.get_object(view_id) else {
        return Err(ReturnObject::unknown_object());
    };
    let Some(view) = value.downcast_object::<View>() else {
        return Err(ReturnObject::protocol_error());
    };
    let mut line = String::new();
    line.push(SUCCESS);
    match view.classify(name, gateway.reflector()) {
        NameResolution::Class(fqn) => {
            line.push(CLASS_TAG);
            line.push_str(&fqn);
        }
        NameResolution::Package(package) => {
            line.push(PACKAGE_TAG);
            line.push_str(&package);
        }
        NameResolution::Unknown => line.push(NOTHING_TAG),
    }
    Ok(line)
}

/// Pretty-printed signature listings, straight from the reflector.
pub(super) struct HelpCommand;

impl Command for HelpCommand {
    fn execute(&self, gateway: &Gateway, io: &dyn CommandIo) -> Result<(), NetworkError> {
        let lines = read_request_lines(io)?;
        let reply = match lines.as_slice() {
            [sub, class] if sub == CLASS_SUBCOMMAND => {
                let result = gateway.reflector().help_page(CallTarget::Static(class));
                gateway.completed(result.map(HostValue::Str))
            }
            [sub, target_id] if sub == OBJECT_SUBCOMMAND => match gateway.get_object(target_id) {
                Some(target) => {
                    let result = gateway
                        .reflector()
                        .help_page(CallTarget::Instance(&target));
                    gateway.completed(result.map(HostValue::Str))
                }
                None => ReturnObject::unknown_object(),
            },
            _ => ReturnObject::protocol_error(),
        };
        respond(io, &reply)
    }
}

/// Member listings; names joined with newlines so the answer stays one
/// (escaped) line on the wire.
pub(super) struct DirCommand;

impl Command for DirCommand {
    fn execute(&self, gateway: &Gateway, io: &dyn CommandIo) -> Result<(), NetworkError> {
        let lines = read_request_lines(io)?;
        let reply = match lines.as_slice() {
            [sub, target_id] if sub == MEMBERS_SUBCOMMAND => members_of(gateway, target_id),
            [sub, package] if sub == PACKAGE_SUBCOMMAND => {
                let result = gateway.reflector().package_members(package);
                gateway.completed(result.map(|names| HostValue::Str(names.join("\n"))))
            }
            _ => ReturnObject::protocol_error(),
        };
        respond(io, &reply)
    }
}

fn members_of(gateway: &Gateway, target_id: &str) -> ReturnObject {
    let result = if let Some(class) = target_id.strip_prefix(STATIC_PREFIX) {
        gateway.reflector().members(CallTarget::Static(class))
    } else {
        match gateway.get_object(target_id) {
            Some(target) => gateway.reflector().members(CallTarget::Instance(&target)),
            None => return ReturnObject::unknown_object(),
        }
    };
    gateway.completed(result.map(|members| {
        let names: Vec<String> = members.into_iter().map(|member| member.name).collect();
        HostValue::Str(names.join("\n"))
    }))
}
