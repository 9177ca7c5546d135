//! Deterministic, in-memory reflection test double.
//!
//! Tests script classes out of closures: a constructor, named instance and
//! static methods, and declared fields. Instances are [`MockInstance`] host
//! objects with their own field storage.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::gateway::GatewayException;
use crate::reflect::{
    CallTarget, FieldHandle, Member, MemberKind, MethodHandle, ReflectError, Reflector,
};
use crate::value::{HostObject, HostValue};

const CONSTRUCTOR_NAME: &str = "<init>";
const ITERATOR_TYPE: &str = "builtin.Iterator";

type ConstructorFn = dyn Fn(&[HostValue]) -> Result<HostValue, ReflectError> + Send + Sync;
type MethodFn = dyn Fn(&HostValue, &[HostValue]) -> Result<HostValue, ReflectError> + Send + Sync;
type StaticFn = dyn Fn(&[HostValue]) -> Result<HostValue, ReflectError> + Send + Sync;

/// An instance created by the mock: a class name plus mutable field storage.
#[derive(Debug)]
pub struct MockInstance {
    class: String,
    fields: Mutex<HashMap<String, HostValue>>,
}

impl MockInstance {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_field(self, name: impl Into<String>, value: HostValue) -> Self {
        self.fields.lock().insert(name.into(), value);
        self
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn field(&self, name: &str) -> Option<HostValue> {
        self.fields.lock().get(name).cloned()
    }

    pub fn set_field(&self, name: impl Into<String>, value: HostValue) {
        self.fields.lock().insert(name.into(), value);
    }
}

impl HostObject for MockInstance {
    fn type_name(&self) -> &str {
        &self.class
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A scripted class definition.
#[derive(Default)]
pub struct MockClass {
    constructor: Option<Arc<ConstructorFn>>,
    methods: HashMap<String, Arc<MethodFn>>,
    statics: HashMap<String, Arc<StaticFn>>,
    fields: Vec<String>,
}

impl MockClass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constructor(
        mut self,
        f: impl Fn(&[HostValue]) -> Result<HostValue, ReflectError> + Send + Sync + 'static,
    ) -> Self {
        self.constructor = Some(Arc::new(f));
        self
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&HostValue, &[HostValue]) -> Result<HostValue, ReflectError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Arc::new(f));
        self
    }

    pub fn static_method(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&[HostValue]) -> Result<HostValue, ReflectError> + Send + Sync + 'static,
    ) -> Self {
        self.statics.insert(name.into(), Arc::new(f));
        self
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(name.into());
        self
    }
}

#[derive(Default)]
pub struct MockReflector {
    classes: RwLock<HashMap<String, Arc<MockClass>>>,
    packages: RwLock<BTreeSet<String>>,
}

impl MockReflector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_class(&self, fqn: impl Into<String>, class: MockClass) {
        self.classes.write().insert(fqn.into(), Arc::new(class));
    }

    pub fn register_empty_class(&self, fqn: impl Into<String>) {
        self.register_class(fqn, MockClass::new());
    }

    pub fn register_package(&self, name: impl Into<String>) {
        self.packages.write().insert(name.into());
    }

    /// A reflector pre-populated with the classes most tests need.
    pub fn with_builtins() -> Self {
        let reflector = Self::new();
        reflector.register_class(
            "java.lang.StringBuilder",
            MockClass::new()
                .field("value")
                .constructor(|args| {
                    let seed = match args {
                        [] => String::new(),
                        [HostValue::Str(s)] => s.clone(),
                        _ => {
                            return Err(ReflectError::NoSuchConstructor {
                                class: "java.lang.StringBuilder".to_string(),
                            })
                        }
                    };
                    Ok(HostValue::object(
                        MockInstance::new("java.lang.StringBuilder")
                            .with_field("value", HostValue::Str(seed)),
                    ))
                })
                .method("append", |this, args| {
                    let instance = expect_instance(this)?;
                    let mut value = match instance.field("value") {
                        Some(HostValue::Str(s)) => s,
                        _ => String::new(),
                    };
                    for arg in args {
                        match arg {
                            HostValue::Str(s) => value.push_str(s),
                            HostValue::Int(v) => value.push_str(&v.to_string()),
                            HostValue::Long(v) => value.push_str(&v.to_string()),
                            HostValue::Char(c) => value.push(*c),
                            other => {
                                return Err(ReflectError::Threw(HostValue::object(
                                    GatewayException::new(format!(
                                        "cannot append a {}",
                                        other.type_name()
                                    )),
                                )))
                            }
                        }
                    }
                    instance.set_field("value", HostValue::Str(value));
                    Ok(this.clone())
                })
                .method("toString", |this, _args| {
                    let instance = expect_instance(this)?;
                    Ok(instance.field("value").unwrap_or(HostValue::Null))
                })
                .method("length", |this, _args| {
                    let instance = expect_instance(this)?;
                    match instance.field("value") {
                        Some(HostValue::Str(s)) => Ok(HostValue::Int(s.chars().count() as i32)),
                        _ => Ok(HostValue::Int(0)),
                    }
                }),
        );
        reflector
    }

    fn class(&self, fqn: &str) -> Result<Arc<MockClass>, ReflectError> {
        self.classes
            .read()
            .get(fqn)
            .cloned()
            .ok_or_else(|| ReflectError::UnknownClass(fqn.to_string()))
    }

    fn instance_class(&self, value: &HostValue) -> Option<(String, Arc<MockClass>)> {
        let instance = value.downcast_object::<MockInstance>()?;
        let class = self.classes.read().get(instance.class()).cloned()?;
        Some((instance.class().to_string(), class))
    }
}

fn expect_instance(value: &HostValue) -> Result<&MockInstance, ReflectError> {
    value
        .downcast_object::<MockInstance>()
        .ok_or(ReflectError::Unsupported)
}

fn exhausted() -> ReflectError {
    ReflectError::Threw(HostValue::object(GatewayException::new(
        "iterator is exhausted",
    )))
}

impl Reflector for MockReflector {
    fn resolve_constructor(
        &self,
        class: &str,
        _args: &[HostValue],
    ) -> Result<MethodHandle, ReflectError> {
        let definition = self.class(class)?;
        if definition.constructor.is_none() {
            return Err(ReflectError::NoSuchConstructor {
                class: class.to_string(),
            });
        }
        Ok(MethodHandle {
            declaring_type: class.to_string(),
            name: CONSTRUCTOR_NAME.to_string(),
        })
    }

    fn resolve_method(
        &self,
        target: CallTarget<'_>,
        name: &str,
        _args: &[HostValue],
    ) -> Result<MethodHandle, ReflectError> {
        match target {
            CallTarget::Instance(value) => {
                if matches!(value, HostValue::Iter(_)) && name == "next" {
                    return Ok(MethodHandle {
                        declaring_type: ITERATOR_TYPE.to_string(),
                        name: name.to_string(),
                    });
                }
                match self.instance_class(value) {
                    Some((class_name, class)) if class.methods.contains_key(name) => {
                        Ok(MethodHandle {
                            declaring_type: class_name,
                            name: name.to_string(),
                        })
                    }
                    _ => Err(ReflectError::NoSuchMethod {
                        target: value.type_name(),
                        name: name.to_string(),
                    }),
                }
            }
            CallTarget::Static(class_name) => {
                let class = self.class(class_name)?;
                if class.statics.contains_key(name) {
                    Ok(MethodHandle {
                        declaring_type: class_name.to_string(),
                        name: name.to_string(),
                    })
                } else {
                    Err(ReflectError::NoSuchMethod {
                        target: class_name.to_string(),
                        name: name.to_string(),
                    })
                }
            }
        }
    }

    fn resolve_field(
        &self,
        target: CallTarget<'_>,
        name: &str,
    ) -> Result<FieldHandle, ReflectError> {
        match target {
            CallTarget::Instance(value) => match self.instance_class(value) {
                Some((class_name, class)) if class.fields.iter().any(|f| f == name) => {
                    Ok(FieldHandle {
                        declaring_type: class_name,
                        name: name.to_string(),
                    })
                }
                _ => Err(ReflectError::NoSuchField {
                    target: value.type_name(),
                    name: name.to_string(),
                }),
            },
            CallTarget::Static(class_name) => Err(ReflectError::NoSuchField {
                target: class_name.to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn invoke(
        &self,
        method: &MethodHandle,
        target: Option<&HostValue>,
        args: &[HostValue],
    ) -> Result<HostValue, ReflectError> {
        if method.declaring_type == ITERATOR_TYPE {
            let Some(HostValue::Iter(iter)) = target else {
                return Err(ReflectError::Unsupported);
            };
            return iter.lock().next().ok_or_else(exhausted);
        }

        let class = self.class(&method.declaring_type)?;
        if method.name == CONSTRUCTOR_NAME {
            let constructor = class.constructor.as_ref().ok_or_else(|| {
                ReflectError::NoSuchConstructor {
                    class: method.declaring_type.clone(),
                }
            })?;
            return constructor(args);
        }

        match target {
            Some(instance) => {
                let f = class.methods.get(&method.name).ok_or_else(|| {
                    ReflectError::NoSuchMethod {
                        target: method.declaring_type.clone(),
                        name: method.name.clone(),
                    }
                })?;
                f(instance, args)
            }
            None => {
                let f = class.statics.get(&method.name).ok_or_else(|| {
                    ReflectError::NoSuchMethod {
                        target: method.declaring_type.clone(),
                        name: method.name.clone(),
                    }
                })?;
                f(args)
            }
        }
    }

    fn get_field(
        &self,
        field: &FieldHandle,
        target: Option<&HostValue>,
    ) -> Result<HostValue, ReflectError> {
        let value = target.ok_or(ReflectError::Unsupported)?;
        let instance = expect_instance(value)?;
        Ok(instance.field(&field.name).unwrap_or(HostValue::Null))
    }

    fn set_field(
        &self,
        field: &FieldHandle,
        target: Option<&HostValue>,
        value: HostValue,
    ) -> Result<(), ReflectError> {
        let object = target.ok_or(ReflectError::Unsupported)?;
        let instance = expect_instance(object)?;
        instance.set_field(field.name.clone(), value);
        Ok(())
    }

    fn class_exists(&self, fqn: &str) -> bool {
        self.classes.read().contains_key(fqn)
    }

    fn package_exists(&self, name: &str) -> bool {
        if self.packages.read().contains(name) {
            return true;
        }
        let prefix = format!("{name}.");
        self.classes.read().keys().any(|fqn| fqn.starts_with(&prefix))
    }

    fn package_members(&self, package: &str) -> Result<Vec<String>, ReflectError> {
        let prefix = format!("{package}.");
        let mut names: Vec<String> = self
            .classes
            .read()
            .keys()
            .filter_map(|fqn| fqn.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('.'))
            .map(|rest| rest.to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    fn members(&self, target: CallTarget<'_>) -> Result<Vec<Member>, ReflectError> {
        let (class_name, class) = match target {
            CallTarget::Instance(value) => self
                .instance_class(value)
                .ok_or(ReflectError::Unsupported)?,
            CallTarget::Static(class_name) => {
                (class_name.to_string(), self.class(class_name)?)
            }
        };

        let mut members = Vec::new();
        if class.constructor.is_some() {
            members.push(Member {
                kind: MemberKind::Method,
                name: CONSTRUCTOR_NAME.to_string(),
                signature: format!("{class_name}(...)"),
            });
        }
        let mut method_names: Vec<&String> =
            class.methods.keys().chain(class.statics.keys()).collect();
        method_names.sort();
        for name in method_names {
            members.push(Member {
                kind: MemberKind::Method,
                name: name.clone(),
                signature: format!("{name}(...)"),
            });
        }
        for name in &class.fields {
            members.push(Member {
                kind: MemberKind::Field,
                name: name.clone(),
                signature: name.clone(),
            });
        }
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn scripted_classes_construct_and_invoke() {
        let reflector = MockReflector::with_builtins();
        let handle = reflector
            .resolve_constructor("java.lang.StringBuilder", &[])
            .unwrap();
        let builder = reflector.invoke(&handle, None, &[]).unwrap();

        let append = reflector
            .resolve_method(CallTarget::Instance(&builder), "append", &[])
            .unwrap();
        let same = reflector
            .invoke(&append, Some(&builder), &[HostValue::Str("ab".to_string())])
            .unwrap();
        assert!(same.is_same_object(&builder));

        let to_string = reflector
            .resolve_method(CallTarget::Instance(&builder), "toString", &[])
            .unwrap();
        assert_eq!(
            reflector.invoke(&to_string, Some(&builder), &[]).unwrap(),
            HostValue::Str("ab".to_string())
        );
    }

    #[test]
    fn iterator_next_drains_then_throws() {
        let reflector = MockReflector::new();
        let iter = HostValue::iterator((0..2).map(HostValue::Int));
        let next = reflector
            .resolve_method(CallTarget::Instance(&iter), "next", &[])
            .unwrap();
        assert_eq!(
            reflector.invoke(&next, Some(&iter), &[]).unwrap(),
            HostValue::Int(0)
        );
        assert_eq!(
            reflector.invoke(&next, Some(&iter), &[]).unwrap(),
            HostValue::Int(1)
        );
        assert!(matches!(
            reflector.invoke(&next, Some(&iter), &[]),
            Err(ReflectError::Threw(_))
        ));
    }

    #[test]
    fn fields_read_and_write_through_handles() {
        let reflector = MockReflector::new();
        reflector.register_class("x.Point", MockClass::new().field("x").field("y"));
        let point = HostValue::object(
            MockInstance::new("x.Point").with_field("x", HostValue::Int(1)),
        );

        let handle = reflector
            .resolve_field(CallTarget::Instance(&point), "x")
            .unwrap();
        assert_eq!(
            reflector.get_field(&handle, Some(&point)).unwrap(),
            HostValue::Int(1)
        );
        reflector
            .set_field(&handle, Some(&point), HostValue::Int(9))
            .unwrap();
        assert_eq!(
            reflector.get_field(&handle, Some(&point)).unwrap(),
            HostValue::Int(9)
        );

        assert!(matches!(
            reflector.resolve_field(CallTarget::Instance(&point), "z"),
            Err(ReflectError::NoSuchField { .. })
        ));
    }

    #[test]
    fn help_page_lists_members() {
        let reflector = MockReflector::with_builtins();
        let page = reflector
            .help_page(CallTarget::Static("java.lang.StringBuilder"))
            .unwrap();
        assert!(page.contains("append"));
        assert!(page.contains("toString"));
        assert!(page.contains("field value"));
    }
}
