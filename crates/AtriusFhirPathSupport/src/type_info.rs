//! # FHIRPath Type Information
//!
//! Namespace-qualified type descriptors, type specifiers and the registry used
//! for `is`, `as`, `ofType` and `type()`.
//!
//! A registry is assembled once (System types, plus whatever the embedding
//! domain adds) and then shared read-only by every evaluation that uses it.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::evaluation_error::EvaluationError;

pub const SYSTEM_NAMESPACE: &str = "System";
pub const FHIR_NAMESPACE: &str = "FHIR";

/// The primitive types every registry starts with.
pub const SYSTEM_TYPES: [&str; 10] = [
    "Any", "Boolean", "String", "Integer", "Long", "Decimal", "Date", "Time", "DateTime", "Quantity",
];

/// Element descriptor of a class or tuple type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub type_name: String,
    pub is_one_based: bool,
}

impl FieldInfo {
    pub fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            is_one_based: false,
        }
    }
}

/// Runtime description of a type.
///
/// `base_type` values are qualified names (`FHIR.DomainResource`). List and
/// tuple types are structural and have neither a qualified name nor a base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeInfo {
    Simple {
        namespace: String,
        name: String,
        base_type: Option<String>,
    },
    Class {
        namespace: String,
        name: String,
        base_type: Option<String>,
        fields: Vec<FieldInfo>,
    },
    List {
        element_type: String,
    },
    Tuple {
        fields: Vec<FieldInfo>,
    },
}

impl TypeInfo {
    /// A `System` primitive, based on `System.Any` (except `Any` itself).
    pub fn system(name: &str) -> Self {
        TypeInfo::Simple {
            namespace: SYSTEM_NAMESPACE.to_string(),
            name: name.to_string(),
            base_type: (name != "Any").then(|| format!("{}.Any", SYSTEM_NAMESPACE)),
        }
    }

    pub fn simple(namespace: &str, name: &str, base_type: Option<&str>) -> Self {
        TypeInfo::Simple {
            namespace: namespace.to_string(),
            name: name.to_string(),
            base_type: base_type.map(str::to_string),
        }
    }

    pub fn class(namespace: &str, name: &str, base_type: Option<&str>, fields: Vec<FieldInfo>) -> Self {
        TypeInfo::Class {
            namespace: namespace.to_string(),
            name: name.to_string(),
            base_type: base_type.map(str::to_string),
            fields,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            TypeInfo::Simple { namespace, .. } | TypeInfo::Class { namespace, .. } => Some(namespace),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            TypeInfo::Simple { name, .. } | TypeInfo::Class { name, .. } => Some(name),
            _ => None,
        }
    }

    /// `Namespace.Name`, or `None` for structural types.
    pub fn qualified_name(&self) -> Option<String> {
        match (self.namespace(), self.name()) {
            (Some(ns), Some(name)) => Some(format!("{}.{}", ns, name)),
            _ => None,
        }
    }

    pub fn base_type_name(&self) -> Option<&str> {
        match self {
            TypeInfo::Simple { base_type, .. } | TypeInfo::Class { base_type, .. } => base_type.as_deref(),
            _ => None,
        }
    }
}

/// A possibly qualified type name as written in an expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeSpecifier {
    pub namespace: Option<String>,
    pub name: String,
}

impl TypeSpecifier {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Splits `FHIR.Patient` into namespace and name; a bare name stays
    /// unqualified. Backquotes around either part are removed.
    pub fn parse(text: &str) -> Self {
        let clean = |s: &str| s.trim_matches('`').to_string();
        match text.split_once('.') {
            Some((ns, name)) => Self {
                namespace: Some(clean(ns)),
                name: clean(name),
            },
            None => Self {
                namespace: None,
                name: clean(text),
            },
        }
    }
}

impl fmt::Display for TypeSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}.{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Mapping from qualified type name to [`TypeInfo`].
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<String, TypeInfo>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::system()
    }
}

impl TypeRegistry {
    /// A registry holding only the System primitives.
    pub fn system() -> Self {
        let mut registry = Self {
            types: HashMap::new(),
        };
        for name in SYSTEM_TYPES {
            registry.insert(TypeInfo::system(name));
        }
        registry
    }

    /// Adds (or replaces) a named type. Structural types are ignored since
    /// they cannot be looked up by name.
    pub fn insert(&mut self, info: TypeInfo) {
        if let Some(qualified) = info.qualified_name() {
            self.types.insert(qualified, info);
        }
    }

    /// Builder form of [`TypeRegistry::insert`].
    pub fn with_type(mut self, info: TypeInfo) -> Self {
        self.insert(info);
        self
    }

    pub fn get(&self, qualified_name: &str) -> Option<&TypeInfo> {
        self.types.get(qualified_name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Resolves a specifier. Qualified names are looked up directly; an
    /// unqualified name is tried in `default_namespace` first, then `System`.
    pub fn resolve(&self, specifier: &TypeSpecifier, default_namespace: Option<&str>) -> Option<&TypeInfo> {
        if let Some(ns) = &specifier.namespace {
            return self.get(&format!("{}.{}", ns, specifier.name));
        }
        default_namespace
            .and_then(|ns| self.get(&format!("{}.{}", ns, specifier.name)))
            .or_else(|| self.get(&format!("{}.{}", SYSTEM_NAMESPACE, specifier.name)))
    }

    /// True when `candidate` is `target` or inherits from it.
    ///
    /// Walks `base_type_name` links through this registry. A base that the
    /// registry does not know ends the walk with `false`; a chain that revisits
    /// a name fails with [`EvaluationError::CyclicType`].
    pub fn sub_type_of(&self, candidate: &TypeInfo, target: &TypeInfo) -> Result<bool, EvaluationError> {
        let Some(target_name) = target.qualified_name() else {
            return Ok(candidate == target);
        };
        let Some(mut current) = candidate.qualified_name() else {
            return Ok(false);
        };
        let mut visited = HashSet::new();
        let mut info = candidate;
        loop {
            if current == target_name {
                return Ok(true);
            }
            if !visited.insert(current.clone()) {
                return Err(EvaluationError::CyclicType(format!(
                    "base type chain of '{}' revisits '{}'",
                    candidate.qualified_name().unwrap_or_default(),
                    current
                )));
            }
            let Some(base) = info.base_type_name() else {
                return Ok(false);
            };
            let Some(next) = self.get(base) else {
                return Ok(false);
            };
            info = next;
            current = base.to_string();
        }
    }
}
