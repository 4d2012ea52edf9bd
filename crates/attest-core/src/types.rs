//! Declared types used for input generation.
//!
//! [`TypeDesc`] is a closed descriptor set: every declared parameter or field
//! type is one of these variants. Strategy synthesis pattern-matches over it
//! instead of reflecting over an open type system. Record declarations live
//! in a [`TypeEnv`], looked up by name from [`TypeDesc::Named`].

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A structural type descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeDesc {
    /// Any value of a small scalar set (none, bool, int, float, str).
    Any,
    /// The unit-like `none` value.
    None,
    Bool,
    /// Integer, optionally bounded (inclusive on both sides).
    Int { min: Option<i64>, max: Option<i64> },
    /// Finite float, optionally bounded (inclusive on both sides).
    Float { min: Option<f64>, max: Option<f64> },
    Text,
    Bytes,
    /// Ordered sequence.
    List(Box<TypeDesc>),
    /// Unique-element set.
    Set(Box<TypeDesc>),
    /// Key-unique mapping.
    Map(Box<TypeDesc>, Box<TypeDesc>),
    /// Fixed-arity tuple.
    Tuple(Vec<TypeDesc>),
    /// `none` or the inner type.
    Optional(Box<TypeDesc>),
    /// Alternation among member types.
    Union(Vec<TypeDesc>),
    /// A record declared in the [`TypeEnv`], or an opaque type that only a
    /// registered strategy can produce. `args` are generic arguments handed
    /// to strategy factories.
    Named { name: String, args: Vec<TypeDesc> },
}

/// The constructor of a [`TypeDesc`], without its parameters.
///
/// Strategy factories are registered per kind and receive the type's
/// generic arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Any,
    None,
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    List,
    Set,
    Map,
    Tuple,
    Optional,
    Union,
    Named(String),
}

impl TypeDesc {
    /// Unbounded integer.
    pub const INT: TypeDesc = TypeDesc::Int { min: None, max: None };
    /// Unbounded finite float.
    pub const FLOAT: TypeDesc = TypeDesc::Float { min: None, max: None };

    pub fn list(element: TypeDesc) -> TypeDesc {
        TypeDesc::List(Box::new(element))
    }

    pub fn set(element: TypeDesc) -> TypeDesc {
        TypeDesc::Set(Box::new(element))
    }

    pub fn map(key: TypeDesc, value: TypeDesc) -> TypeDesc {
        TypeDesc::Map(Box::new(key), Box::new(value))
    }

    pub fn optional(inner: TypeDesc) -> TypeDesc {
        TypeDesc::Optional(Box::new(inner))
    }

    pub fn named(name: impl Into<String>) -> TypeDesc {
        TypeDesc::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Returns the constructor of this descriptor.
    pub fn kind(&self) -> TypeKind {
        match self {
            TypeDesc::Any => TypeKind::Any,
            TypeDesc::None => TypeKind::None,
            TypeDesc::Bool => TypeKind::Bool,
            TypeDesc::Int { .. } => TypeKind::Int,
            TypeDesc::Float { .. } => TypeKind::Float,
            TypeDesc::Text => TypeKind::Text,
            TypeDesc::Bytes => TypeKind::Bytes,
            TypeDesc::List(_) => TypeKind::List,
            TypeDesc::Set(_) => TypeKind::Set,
            TypeDesc::Map(..) => TypeKind::Map,
            TypeDesc::Tuple(_) => TypeKind::Tuple,
            TypeDesc::Optional(_) => TypeKind::Optional,
            TypeDesc::Union(_) => TypeKind::Union,
            TypeDesc::Named { name, .. } => TypeKind::Named(name.clone()),
        }
    }

    /// Returns the generic arguments of this descriptor, in declaration order.
    pub fn type_args(&self) -> Vec<TypeDesc> {
        match self {
            TypeDesc::List(t) | TypeDesc::Set(t) | TypeDesc::Optional(t) => vec![(**t).clone()],
            TypeDesc::Map(k, v) => vec![(**k).clone(), (**v).clone()],
            TypeDesc::Tuple(items) | TypeDesc::Union(items) => items.clone(),
            TypeDesc::Named { args, .. } => args.clone(),
            _ => Vec::new(),
        }
    }

    /// True if a float can appear anywhere inside a value of this type.
    ///
    /// Named types are resolved through `env`; unknown names count as
    /// float-free. Recursion through self-referential records stops at the
    /// first revisit.
    pub fn contains_float(&self, env: &TypeEnv) -> bool {
        let mut seen = Vec::new();
        self.contains_float_inner(env, &mut seen)
    }

    fn contains_float_inner(&self, env: &TypeEnv, seen: &mut Vec<String>) -> bool {
        match self {
            TypeDesc::Float { .. } | TypeDesc::Any => true,
            TypeDesc::Named { name, args } => {
                if args.iter().any(|a| a.contains_float_inner(env, seen)) {
                    return true;
                }
                if seen.iter().any(|s| s == name) {
                    return false;
                }
                seen.push(name.clone());
                env.record(name).is_some_and(|record| {
                    record
                        .fields
                        .values()
                        .any(|f| f.contains_float_inner(env, seen))
                })
            }
            other => other
                .type_args()
                .iter()
                .any(|t| t.contains_float_inner(env, seen)),
        }
    }
}

/// Canonical rendering; this is also the surface syntax accepted by the
/// parser, and the key used for exact strategy registrations.
impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Any => write!(f, "any"),
            TypeDesc::None => write!(f, "none"),
            TypeDesc::Bool => write!(f, "bool"),
            TypeDesc::Int { min, max } => {
                write!(f, "int")?;
                if min.is_some() || max.is_some() {
                    write!(f, "[")?;
                    if let Some(lo) = min {
                        write!(f, "{lo}")?;
                    }
                    write!(f, "..")?;
                    if let Some(hi) = max {
                        write!(f, "{hi}")?;
                    }
                    write!(f, "]")?;
                }
                Ok(())
            }
            TypeDesc::Float { min, max } => {
                write!(f, "float")?;
                if min.is_some() || max.is_some() {
                    write!(f, "[")?;
                    if let Some(lo) = min {
                        write!(f, "{lo:?}")?;
                    }
                    write!(f, "..")?;
                    if let Some(hi) = max {
                        write!(f, "{hi:?}")?;
                    }
                    write!(f, "]")?;
                }
                Ok(())
            }
            TypeDesc::Text => write!(f, "str"),
            TypeDesc::Bytes => write!(f, "bytes"),
            TypeDesc::List(t) => write!(f, "list[{t}]"),
            TypeDesc::Set(t) => write!(f, "set[{t}]"),
            TypeDesc::Map(k, v) => write!(f, "dict[{k}, {v}]"),
            TypeDesc::Tuple(items) => {
                write!(f, "tuple[")?;
                write_joined(f, items, ", ")?;
                write!(f, "]")
            }
            TypeDesc::Optional(t) => write!(f, "option[{t}]"),
            TypeDesc::Union(items) => write_joined(f, items, " | "),
            TypeDesc::Named { name, args } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "[")?;
                    write_joined(f, args, ", ")?;
                    write!(f, "]")?;
                }
                Ok(())
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[TypeDesc], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// A named record with insertion-ordered fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDef {
    pub name: String,
    pub fields: IndexMap<String, TypeDesc>,
}

/// Registry of record declarations, keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeEnv {
    records: IndexMap<String, RecordDef>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record declaration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateTypeName`] if a record with the same
    /// name is already registered.
    pub fn register_record(&mut self, record: RecordDef) -> Result<(), CoreError> {
        if self.records.contains_key(&record.name) {
            return Err(CoreError::DuplicateTypeName { name: record.name });
        }
        self.records.insert(record.name.clone(), record);
        Ok(())
    }

    pub fn record(&self, name: &str) -> Option<&RecordDef> {
        self.records.get(name)
    }

    pub fn records(&self) -> impl Iterator<Item = &RecordDef> {
        self.records.values()
    }
}
