//! Type identity and static types.
//!
//! Registered host types are identified by [`TypeHash`], a deterministic
//! 64-bit hash of the type name. Hashes are computed with xxh64 and a
//! domain-mixing constant, so the same name always yields the same hash:
//! hosts can refer to a type before it is registered and no registration
//! order dependencies exist.
//!
//! Static types flowing through the compiler are [`DataType`], a tagged
//! union over the primitive set, rectangular arrays, registered object
//! types and callable signatures.

use std::fmt;

use xxhash_rust::xxh64::xxh64;

/// Domain-mixing constant folded into every type hash so a type named
/// like some other entity kind can never collide with it.
const TYPE_DOMAIN: u64 = 0x6d1f3a85c29e4b07;

/// A deterministic 64-bit hash identifying a registered host type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Create a type hash from a type name.
    ///
    /// The same name always produces the same hash.
    ///
    /// ```
    /// use liveexpr::TypeHash;
    ///
    /// assert_eq!(TypeHash::from_name("Player"), TypeHash::from_name("Player"));
    /// assert_ne!(TypeHash::from_name("Player"), TypeHash::from_name("Enemy"));
    /// ```
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(TYPE_DOMAIN ^ xxh64(name.as_bytes(), 0))
    }

    /// Check if this is the empty/invalid hash.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get the underlying u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// The static type of an expression, operand or value.
///
/// This is the currency of the compiler: literals, environment lookups and
/// resolved overloads all produce one, and overload resolution matches
/// argument lists of them.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    /// No value. Only ever appears as a host method's return type, where
    /// it is rejected at the call site.
    Void,
    /// Boolean.
    Bool,
    /// Single character.
    Char,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Owned string.
    Str,
    /// Rectangular array with element type and rank (number of indices).
    Array {
        /// Element type.
        elem: Box<DataType>,
        /// Number of dimensions; `a[i, j]` addresses rank 2.
        rank: usize,
    },
    /// A registered host type.
    Object(TypeHash),
    /// A host function value with a discoverable signature.
    Callable {
        /// Parameter types.
        params: Vec<DataType>,
        /// Return type.
        ret: Box<DataType>,
    },
}

impl DataType {
    /// Build an array type of the given element type and rank.
    pub fn array(elem: DataType, rank: usize) -> Self {
        DataType::Array {
            elem: Box::new(elem),
            rank,
        }
    }

    /// Whether this is one of the four numeric primitives increment and
    /// unary negation are defined over.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::Long | DataType::Float | DataType::Double
        )
    }

    /// Whether this is a primitive (non-composite) type.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            DataType::Bool
                | DataType::Char
                | DataType::Int
                | DataType::Long
                | DataType::Float
                | DataType::Double
                | DataType::Str
        )
    }

    /// Resolve a primitive type from its surface name, as written in an
    /// explicit cast like `(float)x`.
    pub fn primitive_from_name(name: &str) -> Option<DataType> {
        match name {
            "bool" => Some(DataType::Bool),
            "char" => Some(DataType::Char),
            "int" => Some(DataType::Int),
            "long" => Some(DataType::Long),
            "float" => Some(DataType::Float),
            "double" => Some(DataType::Double),
            "string" => Some(DataType::Str),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Void => write!(f, "void"),
            DataType::Bool => write!(f, "bool"),
            DataType::Char => write!(f, "char"),
            DataType::Int => write!(f, "int"),
            DataType::Long => write!(f, "long"),
            DataType::Float => write!(f, "float"),
            DataType::Double => write!(f, "double"),
            DataType::Str => write!(f, "string"),
            DataType::Array { elem, rank } => {
                // C#-style rank syntax: string[], string[,], ...
                write!(f, "{elem}[{}]", ",".repeat(rank.saturating_sub(1)))
            }
            DataType::Object(hash) => write!(f, "object({hash})"),
            DataType::Callable { params, ret } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") -> {ret}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_hash_determinism() {
        assert_eq!(TypeHash::from_name("int"), TypeHash::from_name("int"));
        assert_ne!(TypeHash::from_name("int"), TypeHash::from_name("float"));
        assert!(!TypeHash::from_name("int").is_empty());
        assert!(TypeHash::EMPTY.is_empty());
    }

    #[test]
    fn numeric_predicate() {
        assert!(DataType::Int.is_numeric());
        assert!(DataType::Double.is_numeric());
        assert!(!DataType::Bool.is_numeric());
        assert!(!DataType::Str.is_numeric());
        assert!(!DataType::array(DataType::Int, 1).is_numeric());
    }

    #[test]
    fn primitive_names() {
        assert_eq!(DataType::primitive_from_name("float"), Some(DataType::Float));
        assert_eq!(DataType::primitive_from_name("string"), Some(DataType::Str));
        assert_eq!(DataType::primitive_from_name("Player"), None);
    }

    #[test]
    fn display_forms() {
        assert_eq!(DataType::Int.to_string(), "int");
        assert_eq!(DataType::array(DataType::Str, 1).to_string(), "string[]");
        assert_eq!(DataType::array(DataType::Str, 2).to_string(), "string[,]");
        let sig = DataType::Callable {
            params: vec![DataType::Int, DataType::Int],
            ret: Box::new(DataType::Int),
        };
        assert_eq!(sig.to_string(), "fn(int, int) -> int");
    }

}
