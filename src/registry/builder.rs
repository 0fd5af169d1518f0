//! Fluent registration of one host type.

use std::sync::Arc;

use crate::types::{DataType, TypeHash};
use crate::value::Value;

use super::{
    ConversionDef, CtorDef, IndexerDef, MemberFlags, MethodDef, PropertyDef, TypeDef,
};

/// Builds a [`TypeDef`](super::TypeDef) for [`HostRegistry::register`]
/// (super::HostRegistry::register).
///
/// The type's hash is fixed by its name at construction, so member
/// closures and constructors can refer to it before registration:
///
/// ```
/// use liveexpr::{DataType, HostRegistry, ObjectRef, TypeBuilder, Value};
///
/// struct Holder { field: i32 }
///
/// let mut registry = HostRegistry::new();
/// let builder = TypeBuilder::new("Holder");
/// let hash = builder.hash();
/// registry
///     .register(
///         builder
///             .field(
///                 "field",
///                 DataType::Int,
///                 |args| {
///                     let obj = args[0].as_object().ok_or("expected Holder")?;
///                     obj.with(|h: &Holder| Value::Int(h.field))
///                 },
///                 |args| {
///                     let obj = args[0].as_object().ok_or("expected Holder")?;
///                     let Value::Int(v) = &args[1] else {
///                         return Err("field is int".to_string());
///                     };
///                     let v = *v;
///                     obj.with_mut(|h: &mut Holder| h.field = v)
///                 },
///             )
///             .ctor(vec![DataType::Int], move |args| {
///                 let Value::Int(v) = &args[0] else {
///                     return Err("expected int".to_string());
///                 };
///                 Ok(Value::Object(ObjectRef::new(hash, Holder { field: *v })))
///             }),
///     )
///     .unwrap();
/// ```
pub struct TypeBuilder {
    name: String,
    hash: TypeHash,
    properties: Vec<Arc<PropertyDef>>,
    methods: Vec<Arc<MethodDef>>,
    constructors: Vec<Arc<CtorDef>>,
    indexer: Option<Arc<IndexerDef>>,
    conversions: Vec<Arc<ConversionDef>>,
}

impl TypeBuilder {
    /// Start building a type named `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hash: TypeHash::from_name(name),
            properties: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            indexer: None,
            conversions: Vec::new(),
        }
    }

    /// The hash this type will be registered under.
    pub fn hash(&self) -> TypeHash {
        self.hash
    }

    /// The receiver type of instance members.
    fn self_type(&self) -> DataType {
        DataType::Object(self.hash)
    }

    /// Register a mutable data field.
    ///
    /// `get` receives `[receiver]`; `set` receives `[receiver, value]`.
    pub fn field<G, S>(mut self, name: &str, data_type: DataType, get: G, set: S) -> Self
    where
        G: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
        S: Fn(&[Value]) -> Result<(), String> + Send + Sync + 'static,
    {
        self.properties.push(Arc::new(PropertyDef {
            name: name.to_string(),
            data_type,
            flags: MemberFlags::FIELD,
            get: Arc::new(get),
            set: Some(Arc::new(set)),
        }));
        self
    }

    /// Register a computed read/write property.
    pub fn property<G, S>(mut self, name: &str, data_type: DataType, get: G, set: S) -> Self
    where
        G: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
        S: Fn(&[Value]) -> Result<(), String> + Send + Sync + 'static,
    {
        self.properties.push(Arc::new(PropertyDef {
            name: name.to_string(),
            data_type,
            flags: MemberFlags::empty(),
            get: Arc::new(get),
            set: Some(Arc::new(set)),
        }));
        self
    }

    /// Register a read-only property.
    pub fn read_only_property<G>(mut self, name: &str, data_type: DataType, get: G) -> Self
    where
        G: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.properties.push(Arc::new(PropertyDef {
            name: name.to_string(),
            data_type,
            flags: MemberFlags::empty(),
            get: Arc::new(get),
            set: None,
        }));
        self
    }

    /// Register a static property. Compiled as a zero-argument getter
    /// call; static properties are values, not places.
    pub fn static_property<G>(mut self, name: &str, data_type: DataType, get: G) -> Self
    where
        G: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.properties.push(Arc::new(PropertyDef {
            name: name.to_string(),
            data_type,
            flags: MemberFlags::STATIC,
            get: Arc::new(get),
            set: None,
        }));
        self
    }

    /// Register an instance method. `params` excludes the receiver; the
    /// invoke closure receives `[receiver, args...]`.
    pub fn method<F>(mut self, name: &str, params: Vec<DataType>, ret: DataType, invoke: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        let mut full = Vec::with_capacity(params.len() + 1);
        full.push(self.self_type());
        full.extend(params);
        self.methods.push(Arc::new(MethodDef {
            name: name.to_string(),
            params: full,
            ret,
            flags: MemberFlags::empty(),
            invoke: Arc::new(invoke),
        }));
        self
    }

    /// Register a static method.
    pub fn static_method<F>(
        mut self,
        name: &str,
        params: Vec<DataType>,
        ret: DataType,
        invoke: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.methods.push(Arc::new(MethodDef {
            name: name.to_string(),
            params,
            ret,
            flags: MemberFlags::STATIC,
            invoke: Arc::new(invoke),
        }));
        self
    }

    /// Register a static operator method under a standard operator name
    /// (`op_Addition`, `op_Equality`, ...), participating in operator
    /// resolution whenever the first operand is this type.
    pub fn operator<F>(
        self,
        name: &str,
        params: Vec<DataType>,
        ret: DataType,
        invoke: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.static_method(name, params, ret, invoke)
    }

    /// Register a constructor.
    pub fn ctor<F>(mut self, params: Vec<DataType>, construct: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.constructors.push(Arc::new(CtorDef {
            owner: self.hash,
            params,
            construct: Arc::new(construct),
        }));
        self
    }

    /// Register the type's indexer (its `Item` accessor pair).
    pub fn indexer<G, S>(
        mut self,
        params: Vec<DataType>,
        elem: DataType,
        get: G,
        set: Option<S>,
    ) -> Self
    where
        G: Fn(&Value, &[Value]) -> Result<Value, String> + Send + Sync + 'static,
        S: Fn(&Value, &[Value], Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.indexer = Some(Arc::new(IndexerDef {
            params,
            elem,
            get: Arc::new(get),
            set: set.map(|s| {
                Arc::new(s)
                    as Arc<dyn Fn(&Value, &[Value], Value) -> Result<(), String> + Send + Sync>
            }),
        }));
        self
    }

    /// Register an implicit conversion from this type.
    pub fn implicit_to<F>(mut self, to: DataType, convert: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.conversions.push(Arc::new(ConversionDef {
            to,
            implicit: true,
            convert: Arc::new(convert),
        }));
        self
    }

    /// Register an explicit conversion from this type.
    pub fn explicit_to<F>(mut self, to: DataType, convert: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.conversions.push(Arc::new(ConversionDef {
            to,
            implicit: false,
            convert: Arc::new(convert),
        }));
        self
    }

    pub(crate) fn build(self) -> TypeDef {
        TypeDef {
            name: self.name,
            hash: self.hash,
            properties: self.properties,
            methods: self.methods,
            constructors: self.constructors,
            indexer: self.indexer,
            conversions: self.conversions,
        }
    }
}
