use portico_gateway::{Gateway, HostValue, Key, NetworkError};
use portico_protocol::{Argument, ReturnObject};

use crate::io::CommandIo;

use super::{read_request_lines, resolve_arguments, respond, Command};

const GET_SUBCOMMAND: &str = "get";
const SET_SUBCOMMAND: &str = "set";
const SLICE_SUBCOMMAND: &str = "slice";
const SIZE_SUBCOMMAND: &str = "size";
const CONTAINS_SUBCOMMAND: &str = "contains";
const APPEND_SUBCOMMAND: &str = "append";
const REMOVE_SUBCOMMAND: &str = "remove";
const LEN_SUBCOMMAND: &str = "len";

/// Element-wise operations on a registered list.
pub(super) struct ListCommand;

/// Element-wise operations on a registered fixed-length array.
pub(super) struct ArrayCommand;

/// Element-wise operations on a registered map.
pub(super) struct MapCommand;

/// Element-wise operations on a registered set.
pub(super) struct SetCommand;

struct Request {
    sub: String,
    container: HostValue,
    args: Vec<HostValue>,
}

/// Shared request shape: subcommand, container id, tagged arguments.
fn parse(gateway: &Gateway, lines: &[String]) -> Result<Request, ReturnObject> {
    let [sub, id, rest @ ..] = lines else {
        return Err(ReturnObject::protocol_error());
    };
    let container = gateway
        .get_object(id)
        .ok_or_else(ReturnObject::unknown_object)?;
    let args = resolve_arguments(gateway, rest)?;
    Ok(Request {
        sub: sub.clone(),
        container,
        args,
    })
}

fn as_index(value: &HostValue) -> Option<usize> {
    match value {
        HostValue::Int(v) => usize::try_from(*v).ok(),
        HostValue::Long(v) => usize::try_from(*v).ok(),
        _ => None,
    }
}

fn int_size(len: usize) -> ReturnObject {
    match i32::try_from(len) {
        Ok(len) => ReturnObject::Primitive(Argument::Integer(len)),
        Err(_) => ReturnObject::Primitive(Argument::Long(len as i64)),
    }
}

fn bool_reply(value: bool) -> ReturnObject {
    ReturnObject::Primitive(Argument::Boolean(value))
}

impl Command for ListCommand {
    fn execute(&self, gateway: &Gateway, io: &dyn CommandIo) -> Result<(), NetworkError> {
        let lines = read_request_lines(io)?;
        let reply = match parse(gateway, &lines) {
            Ok(request) => run_list(gateway, request),
            Err(envelope) => envelope,
        };
        respond(io, &reply)
    }
}

fn run_list(gateway: &Gateway, request: Request) -> ReturnObject {
    let HostValue::List(items) = request.container else {
        return ReturnObject::protocol_error();
    };
    match (request.sub.as_str(), request.args.as_slice()) {
        (GET_SUBCOMMAND, [index]) => {
            let Some(index) = as_index(index) else {
                return ReturnObject::protocol_error();
            };
            let element = items.lock().get(index).cloned();
            match element {
                Some(element) => gateway.return_object(element),
                None => ReturnObject::protocol_error(),
            }
        }
        (SET_SUBCOMMAND, [index, value]) => {
            let Some(index) = as_index(index) else {
                return ReturnObject::protocol_error();
            };
            let mut items = items.lock();
            match items.get_mut(index) {
                Some(slot) => {
                    *slot = value.clone();
                    ReturnObject::Void
                }
                None => ReturnObject::protocol_error(),
            }
        }
        (SLICE_SUBCOMMAND, indices) => {
            let mut selected = Vec::with_capacity(indices.len());
            {
                let items = items.lock();
                for index in indices {
                    let Some(element) = as_index(index).and_then(|i| items.get(i)) else {
                        return ReturnObject::protocol_error();
                    };
                    selected.push(element.clone());
                }
            }
            gateway.return_object(HostValue::list(selected))
        }
        (SIZE_SUBCOMMAND, []) => int_size(items.lock().len()),
        (CONTAINS_SUBCOMMAND, [value]) => bool_reply(items.lock().iter().any(|e| e == value)),
        (APPEND_SUBCOMMAND, [value]) => {
            items.lock().push(value.clone());
            ReturnObject::Void
        }
        _ => ReturnObject::protocol_error(),
    }
}

impl Command for ArrayCommand {
    fn execute(&self, gateway: &Gateway, io: &dyn CommandIo) -> Result<(), NetworkError> {
        let lines = read_request_lines(io)?;
        let reply = match parse(gateway, &lines) {
            Ok(request) => run_array(gateway, request),
            Err(envelope) => envelope,
        };
        respond(io, &reply)
    }
}

fn run_array(gateway: &Gateway, request: Request) -> ReturnObject {
    let HostValue::Array(items) = request.container else {
        return ReturnObject::protocol_error();
    };
    match (request.sub.as_str(), request.args.as_slice()) {
        (GET_SUBCOMMAND, [index]) => {
            let element = as_index(index).and_then(|i| items.lock().get(i).cloned());
            match element {
                Some(element) => gateway.return_object(element),
                None => ReturnObject::protocol_error(),
            }
        }
        (SET_SUBCOMMAND, [index, value]) => {
            let Some(index) = as_index(index) else {
                return ReturnObject::protocol_error();
            };
            let mut items = items.lock();
            match items.get_mut(index) {
                Some(slot) => {
                    *slot = value.clone();
                    ReturnObject::Void
                }
                None => ReturnObject::protocol_error(),
            }
        }
        (LEN_SUBCOMMAND, []) => int_size(items.lock().len()),
        _ => ReturnObject::protocol_error(),
    }
}

impl Command for MapCommand {
    fn execute(&self, gateway: &Gateway, io: &dyn CommandIo) -> Result<(), NetworkError> {
        let lines = read_request_lines(io)?;
        let reply = match parse(gateway, &lines) {
            Ok(request) => run_map(gateway, request),
            Err(envelope) => envelope,
        };
        respond(io, &reply)
    }
}

fn run_map(gateway: &Gateway, request: Request) -> ReturnObject {
    let HostValue::Map(entries) = request.container else {
        return ReturnObject::protocol_error();
    };
    match (request.sub.as_str(), request.args.as_slice()) {
        (GET_SUBCOMMAND, [key]) => {
            let Some(key) = Key::from_value(key) else {
                return ReturnObject::protocol_error();
            };
            let value = entries.lock().get(&key).cloned();
            match value {
                Some(value) => gateway.return_object(value),
                None => ReturnObject::Null,
            }
        }
        (SET_SUBCOMMAND, [key, value]) => {
            let Some(key) = Key::from_value(key) else {
                return ReturnObject::protocol_error();
            };
            entries.lock().insert(key, value.clone());
            ReturnObject::Void
        }
        (SIZE_SUBCOMMAND, []) => int_size(entries.lock().len()),
        (CONTAINS_SUBCOMMAND, [key]) => match Key::from_value(key) {
            Some(key) => bool_reply(entries.lock().contains_key(&key)),
            None => ReturnObject::protocol_error(),
        },
        (REMOVE_SUBCOMMAND, [key]) => match Key::from_value(key) {
            Some(key) => {
                entries.lock().remove(&key);
                ReturnObject::Void
            }
            None => ReturnObject::protocol_error(),
        },
        _ => ReturnObject::protocol_error(),
    }
}

impl Command for SetCommand {
    fn execute(&self, gateway: &Gateway, io: &dyn CommandIo) -> Result<(), NetworkError> {
        let lines = read_request_lines(io)?;
        let reply = match parse(gateway, &lines) {
            Ok(request) => run_set(request),
            Err(envelope) => envelope,
        };
        respond(io, &reply)
    }
}

fn run_set(request: Request) -> ReturnObject {
    let HostValue::Set(elements) = request.container else {
        return ReturnObject::protocol_error();
    };
    match (request.sub.as_str(), request.args.as_slice()) {
        (APPEND_SUBCOMMAND, [value]) => match Key::from_value(value) {
            Some(key) => {
                elements.lock().insert(key);
                ReturnObject::Void
            }
            None => ReturnObject::protocol_error(),
        },
        (CONTAINS_SUBCOMMAND, [value]) => match Key::from_value(value) {
            Some(key) => bool_reply(elements.lock().contains(&key)),
            None => ReturnObject::protocol_error(),
        },
        (REMOVE_SUBCOMMAND, [value]) => match Key::from_value(value) {
            Some(key) => {
                elements.lock().remove(&key);
                ReturnObject::Void
            }
            None => ReturnObject::protocol_error(),
        },
        (SIZE_SUBCOMMAND, []) => int_size(elements.lock().len()),
        _ => ReturnObject::protocol_error(),
    }
}

#[cfg(test)]
mod tests {
    use portico_gateway::{HostValue, Key};
    use pretty_assertions::assert_eq;

    use crate::commands::tests::{run_command, test_dispatcher};
    use crate::commands::{ARRAY_COMMAND, LIST_COMMAND, MAP_COMMAND, SET_COMMAND};

    #[test]
    fn list_operations_mutate_the_registered_container() {
        let dispatcher = test_dispatcher();
        let id = dispatcher.gateway().put_new_object(HostValue::list(vec![
            HostValue::Int(10),
            HostValue::Int(20),
        ]));

        assert_eq!(run_command(&dispatcher, LIST_COMMAND, &["size", &id]), "yi2");
        assert_eq!(
            run_command(&dispatcher, LIST_COMMAND, &["get", &id, "i1"]),
            "yi20"
        );
        assert_eq!(
            run_command(&dispatcher, LIST_COMMAND, &["append", &id, "i30"]),
            "yv"
        );
        assert_eq!(
            run_command(&dispatcher, LIST_COMMAND, &["set", &id, "i0", "i99"]),
            "yv"
        );
        assert_eq!(
            run_command(&dispatcher, LIST_COMMAND, &["get", &id, "i0"]),
            "yi99"
        );
        assert_eq!(
            run_command(&dispatcher, LIST_COMMAND, &["contains", &id, "i30"]),
            "yt"
        );
        assert_eq!(
            run_command(&dispatcher, LIST_COMMAND, &["contains", &id, "i7"]),
            "yf"
        );
    }

    #[test]
    fn list_slice_registers_a_new_list() {
        let dispatcher = test_dispatcher();
        let id = dispatcher.gateway().put_new_object(HostValue::list(vec![
            HostValue::Int(1),
            HostValue::Int(2),
            HostValue::Int(3),
        ]));
        let reply = run_command(&dispatcher, LIST_COMMAND, &["slice", &id, "i2", "i0"]);
        let (slice_id, size) = reply
            .strip_prefix("yl")
            .and_then(|rest| rest.split_once(','))
            .expect("list envelope");
        assert_eq!(size, "2");
        assert_ne!(slice_id, id);
    }

    #[test]
    fn out_of_range_is_a_protocol_error() {
        let dispatcher = test_dispatcher();
        let id = dispatcher
            .gateway()
            .put_new_object(HostValue::list(vec![HostValue::Int(1)]));
        assert_eq!(
            run_command(&dispatcher, LIST_COMMAND, &["get", &id, "i5"]),
            "!p"
        );
        assert_eq!(
            run_command(&dispatcher, LIST_COMMAND, &["set", &id, "i5", "i0"]),
            "!p"
        );
        assert_eq!(
            run_command(&dispatcher, LIST_COMMAND, &["get", "o999", "i0"]),
            "!o"
        );
    }

    #[test]
    fn arrays_reject_growth_but_allow_element_writes() {
        let dispatcher = test_dispatcher();
        let id = dispatcher
            .gateway()
            .put_new_object(HostValue::array(vec![HostValue::Int(0), HostValue::Int(0)]));
        assert_eq!(run_command(&dispatcher, ARRAY_COMMAND, &["len", &id]), "yi2");
        assert_eq!(
            run_command(&dispatcher, ARRAY_COMMAND, &["set", &id, "i1", "i8"]),
            "yv"
        );
        assert_eq!(
            run_command(&dispatcher, ARRAY_COMMAND, &["get", &id, "i1"]),
            "yi8"
        );
        // Arrays have no append.
        assert_eq!(
            run_command(&dispatcher, ARRAY_COMMAND, &["append", &id, "i1"]),
            "!p"
        );
    }

    #[test]
    fn map_operations_key_on_primitives() {
        let dispatcher = test_dispatcher();
        let id = dispatcher
            .gateway()
            .put_new_object(HostValue::map([(
                Key::Str("k".to_string()),
                HostValue::Int(1),
            )]));
        assert_eq!(
            run_command(&dispatcher, MAP_COMMAND, &["get", &id, "sk"]),
            "yi1"
        );
        assert_eq!(
            run_command(&dispatcher, MAP_COMMAND, &["get", &id, "smissing"]),
            "yn"
        );
        assert_eq!(
            run_command(&dispatcher, MAP_COMMAND, &["set", &id, "sk2", "i2"]),
            "yv"
        );
        assert_eq!(run_command(&dispatcher, MAP_COMMAND, &["size", &id]), "yi2");
        assert_eq!(
            run_command(&dispatcher, MAP_COMMAND, &["contains", &id, "sk2"]),
            "yt"
        );
        assert_eq!(
            run_command(&dispatcher, MAP_COMMAND, &["remove", &id, "sk"]),
            "yv"
        );
        assert_eq!(run_command(&dispatcher, MAP_COMMAND, &["size", &id]), "yi1");
        // Doubles cannot key a map.
        assert_eq!(
            run_command(&dispatcher, MAP_COMMAND, &["get", &id, "d1.0"]),
            "!p"
        );
    }

    #[test]
    fn set_operations_deduplicate() {
        let dispatcher = test_dispatcher();
        let id = dispatcher
            .gateway()
            .put_new_object(HostValue::set([Key::Int(1)]));
        assert_eq!(
            run_command(&dispatcher, SET_COMMAND, &["append", &id, "i1"]),
            "yv"
        );
        assert_eq!(run_command(&dispatcher, SET_COMMAND, &["size", &id]), "yi1");
        assert_eq!(
            run_command(&dispatcher, SET_COMMAND, &["append", &id, "i2"]),
            "yv"
        );
        assert_eq!(
            run_command(&dispatcher, SET_COMMAND, &["contains", &id, "i2"]),
            "yt"
        );
        assert_eq!(
            run_command(&dispatcher, SET_COMMAND, &["remove", &id, "i1"]),
            "yv"
        );
        assert_eq!(run_command(&dispatcher, SET_COMMAND, &["size", &id]), "yi1");
    }
}
