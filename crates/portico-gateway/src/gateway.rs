use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use portico_protocol::{
    Argument, ReturnObject, DEFAULT_VIEW_OBJECT_ID, ENTRY_POINT_OBJECT_ID, STATIC_PREFIX,
};

use crate::peer::PeerClient;
use crate::reflect::{CallTarget, ReflectError, Reflector};
use crate::registry::ObjectRegistry;
use crate::value::{HostObject, HostValue};
use crate::view::View;
use crate::TRACE_TARGET;

/// Host exception raised by the bridge itself (failed resolution, bad
/// access). Bound in the registry like any thrown value so the peer can
/// inspect it by id.
#[derive(Debug)]
pub struct GatewayException {
    message: String,
}

impl GatewayException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl HostObject for GatewayException {
    fn type_name(&self) -> &str {
        "portico.GatewayException"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The host-side façade: registry, classifier, views, and the seams to the
/// reflection facility and the peer client.
pub struct Gateway {
    registry: ObjectRegistry,
    reflector: Arc<dyn Reflector>,
    peer_client: Option<Arc<dyn PeerClient>>,
    entry_point: Option<HostValue>,
    default_view: Arc<View>,
    started: AtomicBool,
    // Most recent exception bound on behalf of each worker thread, for the
    // `exception` command.
    last_exceptions: Mutex<HashMap<ThreadId, String>>,
}

impl Gateway {
    pub fn new(entry_point: Option<HostValue>, reflector: Arc<dyn Reflector>) -> Self {
        Self {
            registry: ObjectRegistry::new(),
            reflector,
            peer_client: None,
            entry_point,
            default_view: Arc::new(View::new("default")),
            started: AtomicBool::new(false),
            last_exceptions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_peer_client(
        entry_point: Option<HostValue>,
        reflector: Arc<dyn Reflector>,
        peer_client: Arc<dyn PeerClient>,
    ) -> Self {
        let mut gateway = Self::new(entry_point, reflector);
        gateway.peer_client = Some(peer_client);
        gateway
    }

    /// Installs the well-known bindings: the entry point (when present) and
    /// the default view.
    pub fn startup(&self) {
        self.started.store(true, Ordering::SeqCst);
        if let Some(entry_point) = &self.entry_point {
            self.registry.put(ENTRY_POINT_OBJECT_ID, entry_point.clone());
        }
        self.registry.put(
            DEFAULT_VIEW_OBJECT_ID,
            HostValue::Object(self.default_view.clone()),
        );
        tracing::info!(target: TRACE_TARGET, event = "startup");
    }

    /// Releases every object referenced by this gateway. Commands still in
    /// flight will fail to resolve their ids afterwards.
    pub fn shutdown(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.registry.clear();
        tracing::info!(target: TRACE_TARGET, event = "shutdown");
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn reflector(&self) -> &dyn Reflector {
        self.reflector.as_ref()
    }

    pub fn peer_client(&self) -> Option<&Arc<dyn PeerClient>> {
        self.peer_client.as_ref()
    }

    pub fn entry_point(&self) -> Option<&HostValue> {
        self.entry_point.as_ref()
    }

    pub fn default_view(&self) -> &Arc<View> {
        &self.default_view
    }

    pub fn put_new_object(&self, value: HostValue) -> String {
        self.registry.put_new(value)
    }

    pub fn get_object(&self, id: &str) -> Option<HostValue> {
        self.registry.get(id)
    }

    pub fn delete_object(&self, id: &str) {
        self.registry.delete(id);
    }

    /// Classifies a host value into its wire envelope, registering it when
    /// it is retained by id. Values already bound keep their existing id.
    pub fn return_object(&self, value: HostValue) -> ReturnObject {
        match value {
            HostValue::Null => ReturnObject::Null,
            HostValue::Void => ReturnObject::Void,
            HostValue::Bool(v) => ReturnObject::Primitive(Argument::Boolean(v)),
            HostValue::Int(v) => ReturnObject::Primitive(Argument::Integer(v)),
            HostValue::Long(v) => ReturnObject::Primitive(Argument::Long(v)),
            HostValue::Double(v) => ReturnObject::Primitive(Argument::Double(v)),
            HostValue::Char(v) => ReturnObject::Primitive(Argument::Char(v)),
            HostValue::Str(v) => ReturnObject::Primitive(Argument::Str(v)),
            HostValue::Bytes(v) => ReturnObject::Primitive(Argument::Bytes(v)),
            HostValue::Decimal(v) => ReturnObject::Primitive(Argument::Decimal(v)),
            HostValue::List(items) => {
                let size = items.lock().len();
                let id = self.bind(HostValue::List(items));
                ReturnObject::List { id, size }
            }
            HostValue::Map(entries) => {
                let size = entries.lock().len();
                let id = self.bind(HostValue::Map(entries));
                ReturnObject::Map { id, size }
            }
            HostValue::Array(items) => {
                let length = items.lock().len();
                let id = self.bind(HostValue::Array(items));
                ReturnObject::Array { id, length }
            }
            HostValue::Set(elements) => {
                let size = elements.lock().len();
                let id = self.bind(HostValue::Set(elements));
                ReturnObject::Set { id, size }
            }
            value @ HostValue::Iter(_) => ReturnObject::Iterator {
                id: self.bind(value),
            },
            value @ HostValue::Object(_) => ReturnObject::Reference(self.bind(value)),
        }
    }

    /// Invokes a method on an instance or, for static ids, on the named
    /// class. Failures come back as error envelopes, never as panics.
    pub fn invoke(&self, method: &str, target_id: &str, args: Vec<HostValue>) -> ReturnObject {
        tracing::debug!(target: TRACE_TARGET, event = "invoke", method, target_id);
        let result = if let Some(class) = target_id.strip_prefix(STATIC_PREFIX) {
            self.reflector
                .resolve_method(CallTarget::Static(class), method, &args)
                .and_then(|handle| self.reflector.invoke(&handle, None, &args))
        } else {
            let Some(target) = self.registry.get(target_id) else {
                return ReturnObject::unknown_object();
            };
            self.reflector
                .resolve_method(CallTarget::Instance(&target), method, &args)
                .and_then(|handle| self.reflector.invoke(&handle, Some(&target), &args))
        };
        self.completed(result)
    }

    /// Invokes a constructor by fully qualified class name.
    pub fn invoke_constructor(&self, class: &str, args: Vec<HostValue>) -> ReturnObject {
        tracing::debug!(target: TRACE_TARGET, event = "invoke_constructor", class);
        let result = self
            .reflector
            .resolve_constructor(class, &args)
            .and_then(|handle| self.reflector.invoke(&handle, None, &args));
        self.completed(result)
    }

    /// Reads a field on an instance or static class.
    pub fn get_field_value(&self, target_id: &str, name: &str) -> ReturnObject {
        let result = if let Some(class) = target_id.strip_prefix(STATIC_PREFIX) {
            self.reflector
                .resolve_field(CallTarget::Static(class), name)
                .and_then(|handle| self.reflector.get_field(&handle, None))
        } else {
            let Some(target) = self.registry.get(target_id) else {
                return ReturnObject::unknown_object();
            };
            self.reflector
                .resolve_field(CallTarget::Instance(&target), name)
                .and_then(|handle| self.reflector.get_field(&handle, Some(&target)))
        };
        self.completed(result)
    }

    /// Writes a field; void on success.
    pub fn set_field_value(&self, target_id: &str, name: &str, value: HostValue) -> ReturnObject {
        let result = if let Some(class) = target_id.strip_prefix(STATIC_PREFIX) {
            self.reflector
                .resolve_field(CallTarget::Static(class), name)
                .and_then(|handle| self.reflector.set_field(&handle, None, value))
        } else {
            let Some(target) = self.registry.get(target_id) else {
                return ReturnObject::unknown_object();
            };
            self.reflector
                .resolve_field(CallTarget::Instance(&target), name)
                .and_then(|handle| self.reflector.set_field(&handle, Some(&target), value))
        };
        self.completed(result.map(|()| HostValue::Void))
    }

    /// Binds a thrown value in the registry, remembers it as the current
    /// thread's most recent exception, and returns its id.
    pub fn bind_exception(&self, thrown: HostValue) -> String {
        let id = self.registry.put_new(thrown);
        self.last_exceptions
            .lock()
            .insert(thread::current().id(), id.clone());
        id
    }

    /// Id of the most recent exception bound on this thread, if it is still
    /// registered.
    pub fn last_exception_id(&self) -> Option<String> {
        let id = self
            .last_exceptions
            .lock()
            .get(&thread::current().id())
            .cloned()?;
        self.registry.contains(&id).then_some(id)
    }

    /// Converts a reflection outcome into a wire envelope, binding any
    /// failure so the peer can inspect it.
    pub fn completed(&self, result: Result<HostValue, ReflectError>) -> ReturnObject {
        match result {
            Ok(value) => self.return_object(value),
            Err(ReflectError::Threw(thrown)) => {
                let id = self.bind_exception(thrown);
                tracing::debug!(target: TRACE_TARGET, event = "invocation_raised", exception_id = %id);
                ReturnObject::exception(id)
            }
            Err(error) => {
                let id =
                    self.bind_exception(HostValue::object(GatewayException::new(error.to_string())));
                tracing::debug!(
                    target: TRACE_TARGET,
                    event = "reflection_failed",
                    exception_id = %id,
                    error = %error
                );
                ReturnObject::exception(id)
            }
        }
    }

    fn bind(&self, value: HostValue) -> String {
        match self.registry.id_of(&value) {
            Some(existing) => existing,
            None => self.registry.put_new(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mock::MockReflector;
    use crate::value::Key;

    fn gateway() -> Gateway {
        Gateway::new(None, Arc::new(MockReflector::with_builtins()))
    }

    #[test]
    fn startup_installs_well_known_ids() {
        let gateway = Gateway::new(
            Some(HostValue::Str("root".to_string())),
            Arc::new(MockReflector::new()),
        );
        assert_eq!(gateway.get_object(ENTRY_POINT_OBJECT_ID), None);
        gateway.startup();
        assert_eq!(
            gateway.get_object(ENTRY_POINT_OBJECT_ID),
            Some(HostValue::Str("root".to_string()))
        );
        assert!(gateway.get_object(DEFAULT_VIEW_OBJECT_ID).is_some());
        gateway.shutdown();
        assert_eq!(gateway.get_object(ENTRY_POINT_OBJECT_ID), None);
    }

    #[test]
    fn classifier_keeps_primitives_inline() {
        let gateway = gateway();
        assert_eq!(
            gateway.return_object(HostValue::Str("hi".to_string())),
            ReturnObject::Primitive(Argument::Str("hi".to_string()))
        );
        assert_eq!(
            gateway.return_object(HostValue::Bool(true)),
            ReturnObject::Primitive(Argument::Boolean(true))
        );
        assert_eq!(
            gateway.return_object(HostValue::Bytes(vec![1, 2])),
            ReturnObject::Primitive(Argument::Bytes(vec![1, 2]))
        );
        assert_eq!(gateway.return_object(HostValue::Null), ReturnObject::Null);
        assert_eq!(gateway.return_object(HostValue::Void), ReturnObject::Void);
        assert!(gateway.registry().is_empty());
    }

    #[test]
    fn classifier_registers_containers_with_size_snapshots() {
        let gateway = gateway();
        let list = HostValue::list(vec![HostValue::Int(1), HostValue::Int(2)]);
        match gateway.return_object(list.clone()) {
            ReturnObject::List { id, size } => {
                assert_eq!(size, 2);
                assert_eq!(gateway.get_object(&id), Some(list));
            }
            other => panic!("expected a list envelope, got {other:?}"),
        }

        let map = HostValue::map([(Key::Str("k".to_string()), HostValue::Int(1))]);
        assert!(matches!(
            gateway.return_object(map),
            ReturnObject::Map { size: 1, .. }
        ));

        let array = HostValue::array(vec![HostValue::Int(0); 3]);
        assert!(matches!(
            gateway.return_object(array),
            ReturnObject::Array { length: 3, .. }
        ));

        let set = HostValue::set([Key::Int(1), Key::Int(2)]);
        assert!(matches!(
            gateway.return_object(set),
            ReturnObject::Set { size: 2, .. }
        ));
    }

    #[test]
    fn iterators_expose_no_size() {
        let gateway = gateway();
        let iter = HostValue::iterator((0..5).map(HostValue::Int));
        match gateway.return_object(iter) {
            ReturnObject::Iterator { id } => assert!(gateway.get_object(&id).is_some()),
            other => panic!("expected an iterator envelope, got {other:?}"),
        }
    }

    #[test]
    fn already_bound_values_keep_their_id() {
        let gateway = gateway();
        let list = HostValue::list(vec![HostValue::Int(1)]);
        let first = match gateway.return_object(list.clone()) {
            ReturnObject::List { id, .. } => id,
            other => panic!("unexpected {other:?}"),
        };
        let second = match gateway.return_object(list) {
            ReturnObject::List { id, .. } => id,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(first, second);
    }

    #[test]
    fn invoke_on_unknown_id_reports_unknown_object() {
        let gateway = gateway();
        assert_eq!(
            gateway.invoke("toString", "o999", Vec::new()),
            ReturnObject::unknown_object()
        );
    }

    #[test]
    fn constructor_then_method_round_trip() {
        let gateway = gateway();
        let built = gateway.invoke_constructor("java.lang.StringBuilder", Vec::new());
        let id = match built {
            ReturnObject::Reference(id) => id,
            other => panic!("expected a reference, got {other:?}"),
        };

        // The builder returns itself, so the reply reuses the same id.
        assert_eq!(
            gateway.invoke("append", &id, vec![HostValue::Str("hi".to_string())]),
            ReturnObject::Reference(id.clone())
        );
        assert_eq!(
            gateway.invoke("toString", &id, Vec::new()),
            ReturnObject::Primitive(Argument::Str("hi".to_string()))
        );
    }

    #[test]
    fn reflection_failures_are_bound_as_exceptions() {
        let gateway = gateway();
        let id = gateway.put_new_object(HostValue::Str("target".to_string()));
        let result = gateway.invoke("definitelyMissing", &id, Vec::new());
        match result {
            ReturnObject::Error(portico_protocol::ErrorKind::Exception(exception_id)) => {
                let bound = gateway.get_object(&exception_id).expect("exception bound");
                assert!(bound.downcast_object::<GatewayException>().is_some());
                assert_eq!(gateway.last_exception_id(), Some(exception_id));
            }
            other => panic!("expected an exception envelope, got {other:?}"),
        }
    }
}
