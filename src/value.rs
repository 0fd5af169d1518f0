//! Runtime value representation.
//!
//! [`Value`] is the tagged union stored on the VM stack, bound in the
//! environment and passed to host callables. The primitive leaves are
//! stored inline; arrays and host objects are shared, interior-mutable
//! references so that assignment through a place is visible to every
//! holder of the same array or object.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::RuntimeErrorKind;
use crate::types::{DataType, TypeHash};

// ============================================================================
// Value
// ============================================================================

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// Single character.
    Char(char),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Owned string.
    Str(String),
    /// Shared rectangular array.
    Array(ArrayRef),
    /// Shared instance of a registered host type.
    Object(ObjectRef),
    /// Environment-bound host function.
    Function(HostFn),
}

impl Value {
    /// The static type of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Bool(_) => DataType::Bool,
            Value::Char(_) => DataType::Char,
            Value::Int(_) => DataType::Int,
            Value::Long(_) => DataType::Long,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::Str(_) => DataType::Str,
            Value::Array(a) => a.data_type(),
            Value::Object(o) => DataType::Object(o.type_hash()),
            Value::Function(f) => f.signature(),
        }
    }

    /// A short name for this value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Char(_) => "char",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// Extract a bool, if that is what this is.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract an int, if that is what this is.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract a long, if that is what this is.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract a float, if that is what this is.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Extract a double, if that is what this is.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow the string, if that is what this is.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the array reference, if that is what this is.
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Borrow the object reference, if that is what this is.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Char(v) => write!(f, "Char({v:?})"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::Long(v) => write!(f, "Long({v})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::Double(v) => write!(f, "Double({v})"),
            Value::Str(v) => write!(f, "Str({v:?})"),
            Value::Array(a) => write!(f, "Array({})", a.data_type()),
            Value::Object(o) => write!(f, "Object({})", o.type_hash()),
            Value::Function(h) => write!(f, "Function({})", h.name),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            // Shared values compare by identity, not contents.
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Char(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

// ============================================================================
// Arrays
// ============================================================================

/// Backing storage of a rectangular array: element type, dimension sizes
/// and row-major items.
#[derive(Debug)]
pub struct ArrayData {
    elem: DataType,
    dims: Vec<usize>,
    items: Vec<Value>,
}

/// A shared, interior-mutable reference to a rectangular array.
///
/// Cloning shares the storage; writes through one clone are visible to all.
#[derive(Clone)]
pub struct ArrayRef(Rc<RefCell<ArrayData>>);

impl ArrayRef {
    /// Create an array from its element type, dimension sizes and
    /// row-major items. Fails if the item count does not match the
    /// dimensions.
    pub fn new(elem: DataType, dims: Vec<usize>, items: Vec<Value>) -> Result<Self, String> {
        let expected: usize = dims.iter().product();
        if dims.is_empty() {
            return Err("array must have at least one dimension".to_string());
        }
        if items.len() != expected {
            return Err(format!(
                "array dimensions {dims:?} require {expected} items, got {}",
                items.len()
            ));
        }
        Ok(Self(Rc::new(RefCell::new(ArrayData { elem, dims, items }))))
    }

    /// Convenience: a one-dimensional string array.
    pub fn of_strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: Vec<Value> = items
            .into_iter()
            .map(|s| Value::Str(s.into()))
            .collect();
        let dims = vec![items.len()];
        Self(Rc::new(RefCell::new(ArrayData {
            elem: DataType::Str,
            dims,
            items,
        })))
    }

    /// Convenience: a one-dimensional int array.
    pub fn of_ints<I>(items: I) -> Self
    where
        I: IntoIterator<Item = i32>,
    {
        let items: Vec<Value> = items.into_iter().map(Value::Int).collect();
        let dims = vec![items.len()];
        Self(Rc::new(RefCell::new(ArrayData {
            elem: DataType::Int,
            dims,
            items,
        })))
    }

    /// The array's static type.
    pub fn data_type(&self) -> DataType {
        let data = self.0.borrow();
        DataType::array(data.elem.clone(), data.dims.len())
    }

    /// The element type.
    pub fn elem_type(&self) -> DataType {
        self.0.borrow().elem.clone()
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.0.borrow().dims.len()
    }

    /// Read the element at the given indices.
    pub fn get(&self, indices: &[i64]) -> Result<Value, RuntimeErrorKind> {
        let data = self.0.borrow();
        let offset = row_major_offset(&data.dims, indices)?;
        Ok(data.items[offset].clone())
    }

    /// Write the element at the given indices.
    pub fn set(&self, indices: &[i64], value: Value) -> Result<(), RuntimeErrorKind> {
        let mut data = self.0.borrow_mut();
        let offset = row_major_offset(&data.dims, indices)?;
        data.items[offset] = value;
        Ok(())
    }

    /// Whether two references share the same storage.
    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        write!(f, "ArrayRef({} x {:?})", data.elem, data.dims)
    }
}

/// Row-major offset of `indices` into an array of `dims`, with bounds
/// checking on every axis.
fn row_major_offset(dims: &[usize], indices: &[i64]) -> Result<usize, RuntimeErrorKind> {
    if indices.len() != dims.len() {
        return Err(RuntimeErrorKind::IndexOutOfBounds {
            detail: format!(
                "rank {} array indexed with {} indices",
                dims.len(),
                indices.len()
            ),
        });
    }
    let mut offset = 0usize;
    for (axis, (&dim, &idx)) in dims.iter().zip(indices).enumerate() {
        if idx < 0 || idx as usize >= dim {
            return Err(RuntimeErrorKind::IndexOutOfBounds {
                detail: format!("index {idx} on axis {axis} of length {dim}"),
            });
        }
        offset = offset * dim + idx as usize;
    }
    Ok(offset)
}

// ============================================================================
// Host objects
// ============================================================================

/// A shared instance of a registered host type.
///
/// The native value is stored behind `dyn Any`; registered accessors
/// downcast through [`ObjectRef::with`] / [`ObjectRef::with_mut`].
#[derive(Clone)]
pub struct ObjectRef {
    type_hash: TypeHash,
    data: Rc<RefCell<Box<dyn Any>>>,
}

impl ObjectRef {
    /// Wrap a native value as an instance of the registered type
    /// identified by `type_hash`.
    pub fn new<T: 'static>(type_hash: TypeHash, value: T) -> Self {
        Self {
            type_hash,
            data: Rc::new(RefCell::new(Box::new(value))),
        }
    }

    /// The registered type this instance belongs to.
    pub fn type_hash(&self) -> TypeHash {
        self.type_hash
    }

    /// Borrow the native value and run `f` on it.
    ///
    /// Fails if the stored value is not a `T`; host accessors surface that
    /// as a host invocation failure.
    pub fn with<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, String> {
        let data = self.data.borrow();
        match data.downcast_ref::<T>() {
            Some(value) => Ok(f(value)),
            None => Err(format!(
                "object is not a {}",
                std::any::type_name::<T>()
            )),
        }
    }

    /// Mutably borrow the native value and run `f` on it.
    pub fn with_mut<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, String> {
        let mut data = self.data.borrow_mut();
        match data.downcast_mut::<T>() {
            Some(value) => Ok(f(value)),
            None => Err(format!(
                "object is not a {}",
                std::any::type_name::<T>()
            )),
        }
    }

    /// Whether two references share the same instance.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({})", self.type_hash)
    }
}

// ============================================================================
// Host functions
// ============================================================================

/// An environment-bound host function: a callable value with a
/// discoverable `(params, return)` signature.
///
/// The closure receives arguments in source order. Returning `Err` aborts
/// the run as a host invocation failure.
#[derive(Clone)]
pub struct HostFn {
    /// Name for diagnostics (usually the environment binding).
    pub name: Arc<str>,
    /// Parameter types.
    pub params: Vec<DataType>,
    /// Return type.
    pub ret: DataType,
    func: Arc<dyn Fn(&[Value]) -> Result<Value, String>>,
}

impl HostFn {
    /// Wrap a closure as a host function value.
    pub fn new<F>(name: &str, params: Vec<DataType>, ret: DataType, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + 'static,
    {
        Self {
            name: Arc::from(name),
            params,
            ret,
            func: Arc::new(func),
        }
    }

    /// The callable signature as a static type.
    pub fn signature(&self) -> DataType {
        DataType::Callable {
            params: self.params.clone(),
            ret: Box::new(self.ret.clone()),
        }
    }

    /// Invoke with arguments in source order.
    pub(crate) fn invoke(&self, args: &[Value]) -> Result<Value, String> {
        (self.func)(args)
    }

    /// Whether two values wrap the same closure.
    pub fn ptr_eq(&self, other: &HostFn) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFn({} {})", self.name, self.signature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_types() {
        assert_eq!(Value::Int(1).data_type(), DataType::Int);
        assert_eq!(Value::from("x").data_type(), DataType::Str);
        let arr = ArrayRef::of_strings(["a", "b"]);
        assert_eq!(
            Value::Array(arr).data_type(),
            DataType::array(DataType::Str, 1)
        );
    }

    #[test]
    fn array_round_trip() {
        let arr = ArrayRef::of_strings(["a", "b", "c"]);
        assert_eq!(arr.get(&[1]).unwrap(), Value::from("b"));
        arr.set(&[1], Value::from("B")).unwrap();
        assert_eq!(arr.get(&[1]).unwrap(), Value::from("B"));
    }

    #[test]
    fn array_shared_storage() {
        let arr = ArrayRef::of_ints([1, 2, 3]);
        let alias = arr.clone();
        alias.set(&[0], Value::Int(9)).unwrap();
        assert_eq!(arr.get(&[0]).unwrap(), Value::Int(9));
        assert!(arr.ptr_eq(&alias));
    }

    #[test]
    fn array_bounds() {
        let arr = ArrayRef::of_ints([1, 2]);
        assert!(matches!(
            arr.get(&[2]),
            Err(RuntimeErrorKind::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            arr.get(&[-1]),
            Err(RuntimeErrorKind::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            arr.get(&[0, 0]),
            Err(RuntimeErrorKind::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn array_two_dimensional() {
        // 2 x 3, row-major.
        let items = (0..6).map(Value::Int).collect();
        let arr = ArrayRef::new(DataType::Int, vec![2, 3], items).unwrap();
        assert_eq!(arr.get(&[0, 0]).unwrap(), Value::Int(0));
        assert_eq!(arr.get(&[0, 2]).unwrap(), Value::Int(2));
        assert_eq!(arr.get(&[1, 0]).unwrap(), Value::Int(3));
        assert_eq!(arr.rank(), 2);
        assert_eq!(
            arr.data_type().to_string(),
            "int[,]"
        );
    }

    #[test]
    fn array_shape_validation() {
        assert!(ArrayRef::new(DataType::Int, vec![2, 2], vec![Value::Int(0)]).is_err());
        assert!(ArrayRef::new(DataType::Int, vec![], vec![]).is_err());
    }

    #[test]
    fn object_downcast() {
        struct Counter {
            n: i32,
        }
        let hash = TypeHash::from_name("Counter");
        let obj = ObjectRef::new(hash, Counter { n: 1 });
        obj.with_mut(|c: &mut Counter| c.n += 1).unwrap();
        assert_eq!(obj.with(|c: &Counter| c.n).unwrap(), 2);
        assert!(obj.with(|_: &String| ()).is_err());
    }

    #[test]
    fn host_fn_signature() {
        let f = HostFn::new("abs", vec![DataType::Int], DataType::Int, |args| {
            match &args[0] {
                Value::Int(v) => Ok(Value::Int(v.abs())),
                _ => Err("abs expects int".to_string()),
            }
        });
        assert_eq!(f.signature().to_string(), "fn(int) -> int");
        assert_eq!(f.invoke(&[Value::Int(-4)]).unwrap(), Value::Int(4));
    }

    #[test]
    fn shared_values_compare_by_identity() {
        let a = ArrayRef::of_ints([1]);
        let b = ArrayRef::of_ints([1]);
        assert_ne!(Value::Array(a.clone()), Value::Array(b));
        assert_eq!(Value::Array(a.clone()), Value::Array(a));
    }
}
