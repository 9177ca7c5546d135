use std::any::Any;

use parking_lot::Mutex;

use crate::reflect::Reflector;
use crate::value::HostObject;

/// Outcome of classifying a bare name inside a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameResolution {
    Class(String),
    Package(String),
    Unknown,
}

#[derive(Debug, Default)]
struct Imports {
    // Insertion order matters: the first matching import wins.
    single: Vec<String>,
    wildcard: Vec<String>,
}

/// A named collection of class and wildcard-package imports, used to
/// resolve bare class names sent by the peer.
///
/// Views are host objects: they live in the registry like everything else,
/// and the peer mutates them through `jvmview` commands. The default view
/// is always present.
#[derive(Debug)]
pub struct View {
    name: String,
    imports: Mutex<Imports>,
}

impl View {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            imports: Mutex::new(Imports::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records an import. `java.util.*` imports the package; anything else
    /// imports a single class. Duplicate imports are ignored. Returns
    /// whether the import was new.
    pub fn add_import(&self, fqn: &str) -> bool {
        let mut imports = self.imports.lock();
        match fqn.strip_suffix(".*") {
            Some(package) => {
                if imports.wildcard.iter().any(|p| p == package) {
                    return false;
                }
                imports.wildcard.push(package.to_string());
                true
            }
            None => {
                if imports.single.iter().any(|c| c == fqn) {
                    return false;
                }
                imports.single.push(fqn.to_string());
                true
            }
        }
    }

    /// Removes an import previously added with [`View::add_import`].
    pub fn remove_import(&self, fqn: &str) -> bool {
        let mut imports = self.imports.lock();
        match fqn.strip_suffix(".*") {
            Some(package) => {
                let before = imports.wildcard.len();
                imports.wildcard.retain(|p| p != package);
                imports.wildcard.len() != before
            }
            None => {
                let before = imports.single.len();
                imports.single.retain(|c| c != fqn);
                imports.single.len() != before
            }
        }
    }

    pub fn single_imports(&self) -> Vec<String> {
        self.imports.lock().single.clone()
    }

    pub fn wildcard_imports(&self) -> Vec<String> {
        self.imports.lock().wildcard.clone()
    }

    /// Resolves a bare class name against the imports, in insertion order:
    /// single imports first, then wildcard packages, then the name taken as
    /// already fully qualified.
    pub fn resolve(&self, name: &str, reflector: &dyn Reflector) -> Option<String> {
        let imports = self.imports.lock();
        for fqn in &imports.single {
            if fqn.rsplit('.').next() == Some(name) {
                return Some(fqn.clone());
            }
        }
        for package in &imports.wildcard {
            let candidate = format!("{package}.{name}");
            if reflector.class_exists(&candidate) {
                return Some(candidate);
            }
        }
        if reflector.class_exists(name) {
            return Some(name.to_string());
        }
        None
    }

    /// Classifies a name for the peer: a class visible in this view, a
    /// known package, or nothing.
    pub fn classify(&self, name: &str, reflector: &dyn Reflector) -> NameResolution {
        if let Some(fqn) = self.resolve(name, reflector) {
            return NameResolution::Class(fqn);
        }
        if reflector.package_exists(name) {
            return NameResolution::Package(name.to_string());
        }
        NameResolution::Unknown
    }
}

impl HostObject for View {
    fn type_name(&self) -> &str {
        "portico.JvmView"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
