//! Host type registry — the reflection adapter, by registration.
//!
//! Rust has no runtime reflection, so the host declares each type's
//! members up front: properties and fields with accessor closures,
//! instance and static methods, constructors, an indexer, conversions and
//! operator methods. The compiler resolves members, overloads and
//! conversions against this registry; the evaluator never consults it —
//! compiled flows hold `Arc`s to the definitions they need.
//!
//! A registry is immutable once handed to a compile, so it can be shared
//! across threads and expressions; all registered closures are
//! `Send + Sync`.

mod builder;

pub use builder::TypeBuilder;

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::error::RegistryError;
use crate::types::{DataType, TypeHash};
use crate::value::Value;

bitflags! {
    /// Modifiers on a registered member.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemberFlags: u8 {
        /// Resolves against the type itself rather than an instance.
        const STATIC = 1 << 0;
        /// A plain data field rather than a computed property.
        const FIELD = 1 << 1;
        /// A globally registered extension method.
        const EXTENSION = 1 << 2;
    }
}

/// Shared host closure invoked with an argument slice in source order.
/// For instance members the receiver is the first argument.
pub type HostInvoke = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Shared host write closure: `[receiver, value]` for instance members.
pub type HostStore = Arc<dyn Fn(&[Value]) -> Result<(), String> + Send + Sync>;

// ============================================================================
// Member definitions
// ============================================================================

/// A registered property or field.
///
/// Properties are places: the compiler emits a `MemberPlace` holding this
/// definition, and the VM calls `get`/`set` through it lazily.
pub struct PropertyDef {
    /// Member name.
    pub name: String,
    /// The member's static type.
    pub data_type: DataType,
    /// Modifiers.
    pub flags: MemberFlags,
    /// Getter; receives `[receiver]` (empty for static).
    pub get: HostInvoke,
    /// Setter; receives `[receiver, value]`. Absent for read-only members.
    pub set: Option<HostStore>,
}

impl fmt::Debug for PropertyDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDef")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .field("flags", &self.flags)
            .field("writable", &self.set.is_some())
            .finish()
    }
}

/// A registered method (instance, static, operator or extension).
///
/// `params` is the full invoke signature: instance and extension methods
/// carry the receiver type at position 0.
pub struct MethodDef {
    /// Method name; operator methods use the standard operator names
    /// (`op_Addition`, ...).
    pub name: String,
    /// Full parameter types as seen by `invoke`.
    pub params: Vec<DataType>,
    /// Return type. `Void` methods are rejected at call sites.
    pub ret: DataType,
    /// Modifiers.
    pub flags: MemberFlags,
    /// The implementation.
    pub invoke: HostInvoke,
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("ret", &self.ret)
            .field("flags", &self.flags)
            .finish()
    }
}

/// A registered constructor.
pub struct CtorDef {
    /// The constructed type.
    pub owner: TypeHash,
    /// Parameter types.
    pub params: Vec<DataType>,
    /// Builds the instance from arguments in source order.
    pub construct: HostInvoke,
}

impl fmt::Debug for CtorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CtorDef")
            .field("owner", &self.owner)
            .field("params", &self.params)
            .finish()
    }
}

/// A registered indexer (the type's `Item` accessor pair).
pub struct IndexerDef {
    /// Index parameter types, one per dimension.
    pub params: Vec<DataType>,
    /// Element type.
    pub elem: DataType,
    /// Getter: `(subject, indices)`.
    pub get: Arc<dyn Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync>,
    /// Setter: `(subject, indices, value)`. Absent for read-only indexers.
    pub set: Option<Arc<dyn Fn(&Value, &[Value], Value) -> Result<(), String> + Send + Sync>>,
}

impl fmt::Debug for IndexerDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexerDef")
            .field("params", &self.params)
            .field("elem", &self.elem)
            .field("writable", &self.set.is_some())
            .finish()
    }
}

/// A registered conversion declared on its source type.
pub struct ConversionDef {
    /// Target type.
    pub to: DataType,
    /// Whether the compiler may insert this without a cast.
    pub implicit: bool,
    /// The conversion itself; receives `[value]`.
    pub convert: HostInvoke,
}

impl fmt::Debug for ConversionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionDef")
            .field("to", &self.to)
            .field("implicit", &self.implicit)
            .finish()
    }
}

// ============================================================================
// Type definitions
// ============================================================================

/// Everything registered about one host type.
#[derive(Debug)]
pub struct TypeDef {
    /// The surface name.
    pub name: String,
    /// Identity hash, `TypeHash::from_name(name)`.
    pub hash: TypeHash,
    pub(crate) properties: Vec<Arc<PropertyDef>>,
    pub(crate) methods: Vec<Arc<MethodDef>>,
    pub(crate) constructors: Vec<Arc<CtorDef>>,
    pub(crate) indexer: Option<Arc<IndexerDef>>,
    pub(crate) conversions: Vec<Arc<ConversionDef>>,
}

impl TypeDef {
    /// Find a property or field by name and staticness.
    pub fn find_property(&self, name: &str, is_static: bool) -> Option<&Arc<PropertyDef>> {
        self.properties
            .iter()
            .find(|p| p.name == name && p.flags.contains(MemberFlags::STATIC) == is_static)
    }

    /// Find a method by name, staticness and exact parameter types.
    ///
    /// `args` is the full invoke argument list (receiver first for
    /// instance methods).
    pub fn find_method(
        &self,
        name: &str,
        is_static: bool,
        args: &[DataType],
    ) -> Option<&Arc<MethodDef>> {
        self.methods.iter().find(|m| {
            m.name == name
                && m.flags.contains(MemberFlags::STATIC) == is_static
                && m.params == args
        })
    }

    /// Whether any method overload carries this name.
    pub fn has_method(&self, name: &str, is_static: bool) -> bool {
        self.methods
            .iter()
            .any(|m| m.name == name && m.flags.contains(MemberFlags::STATIC) == is_static)
    }

    /// Find a constructor with exact parameter types.
    pub fn find_constructor(&self, args: &[DataType]) -> Option<&Arc<CtorDef>> {
        self.constructors.iter().find(|c| c.params == args)
    }

    /// The type's indexer, if registered.
    pub fn indexer(&self) -> Option<&Arc<IndexerDef>> {
        self.indexer.as_ref()
    }

    /// Conversions from this type, optionally filtered to implicit ones.
    pub fn conversions(&self, implicit_only: bool) -> impl Iterator<Item = &Arc<ConversionDef>> {
        self.conversions
            .iter()
            .filter(move |c| !implicit_only || c.implicit)
    }

    /// A conversion from this type to exactly `target`.
    pub fn conversion_to(&self, target: &DataType, implicit_only: bool) -> Option<&Arc<ConversionDef>> {
        self.conversions
            .iter()
            .find(|c| c.to == *target && (!implicit_only || c.implicit))
    }
}

// ============================================================================
// Registry
// ============================================================================

/// The immutable set of registered host types and extension methods.
#[derive(Default, Debug)]
pub struct HostRegistry {
    types: FxHashMap<TypeHash, TypeDef>,
    by_name: FxHashMap<String, TypeHash>,
    extensions: FxHashMap<String, Vec<Arc<MethodDef>>>,
}

impl HostRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type built with [`TypeBuilder`].
    pub fn register(&mut self, builder: TypeBuilder) -> Result<TypeHash, RegistryError> {
        let def = builder.build();
        if self.types.contains_key(&def.hash) {
            return Err(RegistryError::DuplicateType(def.name));
        }
        let hash = def.hash;
        self.by_name.insert(def.name.clone(), hash);
        self.types.insert(hash, def);
        Ok(hash)
    }

    /// Register an extension method: a free function whose first
    /// parameter is the receiver type, callable with member syntax on any
    /// receiver of that type.
    pub fn register_extension<F>(
        &mut self,
        name: &str,
        params: Vec<DataType>,
        ret: DataType,
        invoke: F,
    ) where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        let def = Arc::new(MethodDef {
            name: name.to_string(),
            params,
            ret,
            flags: MemberFlags::STATIC | MemberFlags::EXTENSION,
            invoke: Arc::new(invoke),
        });
        self.extensions.entry(name.to_string()).or_default().push(def);
    }

    /// Look up a type by its hash.
    pub fn get_type(&self, hash: TypeHash) -> Option<&TypeDef> {
        self.types.get(&hash)
    }

    /// Look up a type hash by surface name.
    pub fn type_by_name(&self, name: &str) -> Option<TypeHash> {
        self.by_name.get(name).copied()
    }

    /// The surface name of a registered type, for diagnostics.
    pub fn type_name(&self, hash: TypeHash) -> Option<&str> {
        self.types.get(&hash).map(|t| t.name.as_str())
    }

    /// Extension method candidates registered under `name`.
    pub fn extension_candidates(&self, name: &str) -> &[Arc<MethodDef>] {
        self.extensions.get(name).map_or(&[], |v| v.as_slice())
    }

    /// Render a static type for error messages, using registered names
    /// for object types.
    pub fn display_type(&self, data_type: &DataType) -> String {
        match data_type {
            DataType::Object(hash) => self
                .type_name(*hash)
                .map(|n| n.to_string())
                .unwrap_or_else(|| data_type.to_string()),
            DataType::Array { elem, rank } => {
                format!(
                    "{}[{}]",
                    self.display_type(elem),
                    ",".repeat(rank.saturating_sub(1))
                )
            }
            other => other.to_string(),
        }
    }

    /// Render an argument type list for error messages.
    pub fn display_types(&self, types: &[DataType]) -> String {
        types
            .iter()
            .map(|t| self.display_type(t))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
