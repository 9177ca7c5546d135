use thiserror::Error;

use crate::value::HostValue;

/// The receiver of a resolution: either a live instance or a class named by
/// a static id with its marker stripped.
#[derive(Debug, Clone, Copy)]
pub enum CallTarget<'a> {
    Instance(&'a HostValue),
    Static(&'a str),
}

impl CallTarget<'_> {
    /// Type description used in error messages and help pages.
    pub fn describe(&self) -> String {
        match self {
            CallTarget::Instance(value) => value.type_name(),
            CallTarget::Static(class) => (*class).to_string(),
        }
    }
}

/// A resolved method or constructor. Constructors use the name `<init>`.
///
/// The handle is an opaque token: only the reflector that issued it knows
/// how to [`Reflector::invoke`] it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHandle {
    pub declaring_type: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldHandle {
    pub declaring_type: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Method,
    Field,
    Class,
}

/// One entry of a `dir`/`help` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub kind: MemberKind,
    pub name: String,
    pub signature: String,
}

#[derive(Debug, Error)]
pub enum ReflectError {
    #[error("class `{0}` not found")]
    UnknownClass(String),

    #[error("no constructor on `{class}` matches the supplied arguments")]
    NoSuchConstructor { class: String },

    #[error("no method `{name}` on `{target}` matches the supplied arguments")]
    NoSuchMethod { target: String, name: String },

    #[error("no field `{name}` on `{target}`")]
    NoSuchField { target: String, name: String },

    #[error("ambiguous overload for `{name}` on `{target}`")]
    Ambiguous { target: String, name: String },

    #[error("access to `{name}` on `{target}` is denied")]
    AccessDenied { target: String, name: String },

    /// The invoked host code raised; the thrown value is carried so the
    /// gateway can bind it and hand its id to the peer.
    #[error("invocation raised a host exception")]
    Threw(HostValue),

    #[error("operation is not supported by this reflector")]
    Unsupported,
}

/// The reflection facility the gateway delegates to.
///
/// Overload resolution by argument-type compatibility is entirely this
/// trait's business; the gateway only threads values through. Listing
/// methods default to [`ReflectError::Unsupported`] so minimal reflectors
/// stay small.
pub trait Reflector: Send + Sync {
    fn resolve_constructor(
        &self,
        class: &str,
        args: &[HostValue],
    ) -> Result<MethodHandle, ReflectError>;

    fn resolve_method(
        &self,
        target: CallTarget<'_>,
        name: &str,
        args: &[HostValue],
    ) -> Result<MethodHandle, ReflectError>;

    fn resolve_field(
        &self,
        target: CallTarget<'_>,
        name: &str,
    ) -> Result<FieldHandle, ReflectError>;

    /// Invokes a resolved method. `target` is `None` for constructors and
    /// static methods.
    fn invoke(
        &self,
        method: &MethodHandle,
        target: Option<&HostValue>,
        args: &[HostValue],
    ) -> Result<HostValue, ReflectError>;

    fn get_field(
        &self,
        field: &FieldHandle,
        target: Option<&HostValue>,
    ) -> Result<HostValue, ReflectError>;

    fn set_field(
        &self,
        field: &FieldHandle,
        target: Option<&HostValue>,
        value: HostValue,
    ) -> Result<(), ReflectError>;

    /// Whether `fqn` names a loadable class. Used by view resolution.
    fn class_exists(&self, _fqn: &str) -> bool {
        false
    }

    /// Whether `name` is a known package prefix. Used by name
    /// classification.
    fn package_exists(&self, _name: &str) -> bool {
        false
    }

    fn members(&self, _target: CallTarget<'_>) -> Result<Vec<Member>, ReflectError> {
        Err(ReflectError::Unsupported)
    }

    /// Simple names of the classes directly inside a package.
    fn package_members(&self, _package: &str) -> Result<Vec<String>, ReflectError> {
        Err(ReflectError::Unsupported)
    }

    /// Pretty-printed signature listing for `help`.
    fn help_page(&self, target: CallTarget<'_>) -> Result<String, ReflectError> {
        let mut page = format!("Help on {}\n", target.describe());
        for member in self.members(target)? {
            let kind = match member.kind {
                MemberKind::Method => "method",
                MemberKind::Field => "field",
                MemberKind::Class => "class",
            };
            page.push_str(&format!("  {kind} {}\n", member.signature));
        }
        Ok(page)
    }
}
