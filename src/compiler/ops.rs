//! The builtin operator table.
//!
//! A process-wide, read-only registry of monomorphic primitive operators
//! keyed by operator name. For every operator the table ships the
//! cross-product of its admissible primitive argument types; mixed-type
//! operands are bridged by the `op_Implicit` entries during resolution.
//!
//! Integer arithmetic wraps. Integer division and modulus by zero are
//! runtime errors. `&&`/`||` are strict: the postfix flow has no jumps,
//! so there is nothing to short-circuit over.

use std::sync::{Arc, OnceLock};

use rustc_hash::FxHashMap;

use crate::error::RuntimeErrorKind;
use crate::types::DataType;
use crate::value::Value;

use super::flow::Callable;

type OpResult = Result<Value, RuntimeErrorKind>;

// =========================================================================
// Operator names
// =========================================================================

/// Map a binary operator lexeme to its resolution name.
pub(crate) fn binary_op_name(lexeme: &str) -> Option<&'static str> {
    Some(match lexeme {
        "+" => "op_Addition",
        "-" => "op_Subtraction",
        "*" => "op_Multiply",
        "/" => "op_Division",
        "%" => "op_Modulus",
        "<" => "op_LessThan",
        "<=" => "op_LessThanOrEqual",
        ">" => "op_GreaterThan",
        ">=" => "op_GreaterThanOrEqual",
        "==" => "op_Equality",
        "!=" => "op_Inequality",
        "&&" => "op_LogicalAnd",
        "||" => "op_LogicalOr",
        _ => return None,
    })
}

/// Map a unary operator lexeme to its resolution name.
pub(crate) fn unary_op_name(lexeme: &str) -> Option<&'static str> {
    Some(match lexeme {
        "-" => "op_UnaryNegation",
        "!" => "op_LogicalNot",
        _ => return None,
    })
}

/// Map an increment lexeme to its resolution name.
pub(crate) fn increment_op_name(lexeme: &str) -> Option<&'static str> {
    Some(match lexeme {
        "++" => "op_Increment",
        "--" => "op_Decrement",
        _ => return None,
    })
}

// =========================================================================
// Table
// =========================================================================

/// The static registry: operator name → monomorphic overloads.
pub(crate) struct OpTable {
    entries: FxHashMap<&'static str, Vec<Arc<Callable>>>,
}

impl OpTable {
    /// Find an overload with exactly the requested argument types.
    pub fn find_exact(&self, name: &str, args: &[DataType]) -> Option<Arc<Callable>> {
        self.entries
            .get(name)?
            .iter()
            .find(|c| c.params() == args)
            .cloned()
    }

    /// Implicit conversions whose source is `from`, in table order.
    /// Identity-first ordering is the caller's concern.
    pub fn implicit_from(&self, from: &DataType) -> Vec<Arc<Callable>> {
        self.entries
            .get("op_Implicit")
            .map(|list| {
                list.iter()
                    .filter(|c| c.params().first() == Some(from))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A conversion entry (`op_Implicit` / `op_Explicit`) from exactly
    /// `from` to exactly `to`.
    pub fn find_conversion(
        &self,
        name: &str,
        from: &DataType,
        to: &DataType,
    ) -> Option<Arc<Callable>> {
        self.entries
            .get(name)?
            .iter()
            .find(|c| c.params().first() == Some(from) && c.ret() == to)
            .cloned()
    }

    fn add(
        &mut self,
        name: &'static str,
        params: Vec<DataType>,
        ret: DataType,
        imp: fn(&[Value]) -> OpResult,
    ) {
        self.entries
            .entry(name)
            .or_default()
            .push(Arc::new(Callable::builtin(name, params, ret, imp)));
    }
}

/// The shared table, built once.
pub(crate) fn builtins() -> &'static OpTable {
    static TABLE: OnceLock<OpTable> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

fn mismatch(expected: &str, args: &[Value]) -> RuntimeErrorKind {
    RuntimeErrorKind::TypeMismatch {
        expected: expected.to_string(),
        actual: args
            .iter()
            .map(|v| v.type_name())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

// =========================================================================
// Implementations
// =========================================================================

/// Binary operator over one primitive variant.
macro_rules! binop {
    ($f:ident, $variant:ident -> $out:ident, |$a:ident, $b:ident| $body:expr, $expected:literal) => {
        fn $f(args: &[Value]) -> OpResult {
            match (&args[0], &args[1]) {
                (Value::$variant($a), Value::$variant($b)) => {
                    let ($a, $b) = (*$a, *$b);
                    $body.map(Value::$out)
                }
                _ => Err(mismatch($expected, args)),
            }
        }
    };
}

/// Unary operator over one primitive variant.
macro_rules! unop {
    ($f:ident, $variant:ident -> $out:ident, |$a:ident| $body:expr, $expected:literal) => {
        fn $f(args: &[Value]) -> OpResult {
            match &args[0] {
                Value::$variant($a) => {
                    let $a = *$a;
                    $body.map(Value::$out)
                }
                _ => Err(mismatch($expected, args)),
            }
        }
    };
}

// --- arithmetic -----------------------------------------------------------

binop!(add_int, Int -> Int, |a, b| Ok(a.wrapping_add(b)), "int, int");
binop!(add_long, Long -> Long, |a, b| Ok(a.wrapping_add(b)), "long, long");
binop!(add_float, Float -> Float, |a, b| Ok(a + b), "float, float");
binop!(add_double, Double -> Double, |a, b| Ok(a + b), "double, double");

fn add_str(args: &[Value]) -> OpResult {
    match (&args[0], &args[1]) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
        _ => Err(mismatch("string, string", args)),
    }
}

binop!(sub_int, Int -> Int, |a, b| Ok(a.wrapping_sub(b)), "int, int");
binop!(sub_long, Long -> Long, |a, b| Ok(a.wrapping_sub(b)), "long, long");
binop!(sub_float, Float -> Float, |a, b| Ok(a - b), "float, float");
binop!(sub_double, Double -> Double, |a, b| Ok(a - b), "double, double");

binop!(mul_int, Int -> Int, |a, b| Ok(a.wrapping_mul(b)), "int, int");
binop!(mul_long, Long -> Long, |a, b| Ok(a.wrapping_mul(b)), "long, long");
binop!(mul_float, Float -> Float, |a, b| Ok(a * b), "float, float");
binop!(mul_double, Double -> Double, |a, b| Ok(a * b), "double, double");

binop!(div_int, Int -> Int, |a, b| if b == 0 {
    Err(RuntimeErrorKind::DivisionByZero)
} else {
    Ok(a.wrapping_div(b))
}, "int, int");
binop!(div_long, Long -> Long, |a, b| if b == 0 {
    Err(RuntimeErrorKind::DivisionByZero)
} else {
    Ok(a.wrapping_div(b))
}, "long, long");
binop!(div_float, Float -> Float, |a, b| Ok(a / b), "float, float");
binop!(div_double, Double -> Double, |a, b| Ok(a / b), "double, double");

binop!(rem_int, Int -> Int, |a, b| if b == 0 {
    Err(RuntimeErrorKind::DivisionByZero)
} else {
    Ok(a.wrapping_rem(b))
}, "int, int");
binop!(rem_long, Long -> Long, |a, b| if b == 0 {
    Err(RuntimeErrorKind::DivisionByZero)
} else {
    Ok(a.wrapping_rem(b))
}, "long, long");
binop!(rem_float, Float -> Float, |a, b| Ok(a % b), "float, float");
binop!(rem_double, Double -> Double, |a, b| Ok(a % b), "double, double");

// --- comparisons ----------------------------------------------------------

binop!(lt_int, Int -> Bool, |a, b| Ok(a < b), "int, int");
binop!(lt_long, Long -> Bool, |a, b| Ok(a < b), "long, long");
binop!(lt_float, Float -> Bool, |a, b| Ok(a < b), "float, float");
binop!(lt_double, Double -> Bool, |a, b| Ok(a < b), "double, double");

binop!(le_int, Int -> Bool, |a, b| Ok(a <= b), "int, int");
binop!(le_long, Long -> Bool, |a, b| Ok(a <= b), "long, long");
binop!(le_float, Float -> Bool, |a, b| Ok(a <= b), "float, float");
binop!(le_double, Double -> Bool, |a, b| Ok(a <= b), "double, double");

binop!(gt_int, Int -> Bool, |a, b| Ok(a > b), "int, int");
binop!(gt_long, Long -> Bool, |a, b| Ok(a > b), "long, long");
binop!(gt_float, Float -> Bool, |a, b| Ok(a > b), "float, float");
binop!(gt_double, Double -> Bool, |a, b| Ok(a > b), "double, double");

binop!(ge_int, Int -> Bool, |a, b| Ok(a >= b), "int, int");
binop!(ge_long, Long -> Bool, |a, b| Ok(a >= b), "long, long");
binop!(ge_float, Float -> Bool, |a, b| Ok(a >= b), "float, float");
binop!(ge_double, Double -> Bool, |a, b| Ok(a >= b), "double, double");

binop!(eq_int, Int -> Bool, |a, b| Ok(a == b), "int, int");
binop!(eq_long, Long -> Bool, |a, b| Ok(a == b), "long, long");
binop!(eq_float, Float -> Bool, |a, b| Ok(a == b), "float, float");
binop!(eq_double, Double -> Bool, |a, b| Ok(a == b), "double, double");
binop!(eq_bool, Bool -> Bool, |a, b| Ok(a == b), "bool, bool");
binop!(eq_char, Char -> Bool, |a, b| Ok(a == b), "char, char");

fn eq_str(args: &[Value]) -> OpResult {
    match (&args[0], &args[1]) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a == b)),
        _ => Err(mismatch("string, string", args)),
    }
}

binop!(ne_int, Int -> Bool, |a, b| Ok(a != b), "int, int");
binop!(ne_long, Long -> Bool, |a, b| Ok(a != b), "long, long");
binop!(ne_float, Float -> Bool, |a, b| Ok(a != b), "float, float");
binop!(ne_double, Double -> Bool, |a, b| Ok(a != b), "double, double");
binop!(ne_bool, Bool -> Bool, |a, b| Ok(a != b), "bool, bool");
binop!(ne_char, Char -> Bool, |a, b| Ok(a != b), "char, char");

fn ne_str(args: &[Value]) -> OpResult {
    match (&args[0], &args[1]) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a != b)),
        _ => Err(mismatch("string, string", args)),
    }
}

// --- logical --------------------------------------------------------------

binop!(and_bool, Bool -> Bool, |a, b| Ok(a && b), "bool, bool");
binop!(or_bool, Bool -> Bool, |a, b| Ok(a || b), "bool, bool");
unop!(not_bool, Bool -> Bool, |a| Ok(!a), "bool");

// --- unary negation -------------------------------------------------------

unop!(neg_int, Int -> Int, |a| Ok(a.wrapping_neg()), "int");
unop!(neg_long, Long -> Long, |a| Ok(a.wrapping_neg()), "long");
unop!(neg_float, Float -> Float, |a| Ok(-a), "float");
unop!(neg_double, Double -> Double, |a| Ok(-a), "double");

// --- increment / decrement ------------------------------------------------

unop!(inc_int, Int -> Int, |a| Ok(a.wrapping_add(1)), "int");
unop!(inc_long, Long -> Long, |a| Ok(a.wrapping_add(1)), "long");
unop!(inc_float, Float -> Float, |a| Ok(a + 1.0), "float");
unop!(inc_double, Double -> Double, |a| Ok(a + 1.0), "double");

unop!(dec_int, Int -> Int, |a| Ok(a.wrapping_sub(1)), "int");
unop!(dec_long, Long -> Long, |a| Ok(a.wrapping_sub(1)), "long");
unop!(dec_float, Float -> Float, |a| Ok(a - 1.0), "float");
unop!(dec_double, Double -> Double, |a| Ok(a - 1.0), "double");

// --- implicit conversions -------------------------------------------------

unop!(int_to_float, Int -> Float, |a| Ok(a as f32), "int");
unop!(int_to_long, Int -> Long, |a| Ok(a as i64), "int");
unop!(int_to_double, Int -> Double, |a| Ok(a as f64), "int");
unop!(long_to_double, Long -> Double, |a| Ok(a as f64), "long");
unop!(float_to_double, Float -> Double, |a| Ok(a as f64), "float");
unop!(char_to_int, Char -> Int, |a| Ok(a as i32), "char");
unop!(char_to_str, Char -> Str, |a| Ok(a.to_string()), "char");
unop!(int_to_str, Int -> Str, |a| Ok(a.to_string()), "int");
unop!(long_to_str, Long -> Str, |a| Ok(a.to_string()), "long");
unop!(float_to_str, Float -> Str, |a| Ok(a.to_string()), "float");
unop!(double_to_str, Double -> Str, |a| Ok(a.to_string()), "double");

// --- explicit conversions -------------------------------------------------

unop!(float_to_int, Float -> Int, |a| Ok(a as i32), "float");
unop!(double_to_int, Double -> Int, |a| Ok(a as i32), "double");
unop!(double_to_float, Double -> Float, |a| Ok(a as f32), "double");
unop!(long_to_int, Long -> Int, |a| Ok(a as i32), "long");

fn int_to_char(args: &[Value]) -> OpResult {
    match &args[0] {
        Value::Int(v) => char::from_u32(*v as u32)
            .map(Value::Char)
            .ok_or_else(|| RuntimeErrorKind::HostInvocationFailed {
                cause: format!("{v} is not a valid character code"),
            }),
        _ => Err(mismatch("int", args)),
    }
}

// =========================================================================
// Construction
// =========================================================================

fn build_table() -> OpTable {
    use DataType::{Bool, Char, Double, Float, Int, Long, Str};

    let mut t = OpTable {
        entries: FxHashMap::default(),
    };

    t.add("op_Addition", vec![Int, Int], Int, add_int);
    t.add("op_Addition", vec![Long, Long], Long, add_long);
    t.add("op_Addition", vec![Float, Float], Float, add_float);
    t.add("op_Addition", vec![Double, Double], Double, add_double);
    t.add("op_Addition", vec![Str, Str], Str, add_str);

    t.add("op_Subtraction", vec![Int, Int], Int, sub_int);
    t.add("op_Subtraction", vec![Long, Long], Long, sub_long);
    t.add("op_Subtraction", vec![Float, Float], Float, sub_float);
    t.add("op_Subtraction", vec![Double, Double], Double, sub_double);

    t.add("op_Multiply", vec![Int, Int], Int, mul_int);
    t.add("op_Multiply", vec![Long, Long], Long, mul_long);
    t.add("op_Multiply", vec![Float, Float], Float, mul_float);
    t.add("op_Multiply", vec![Double, Double], Double, mul_double);

    t.add("op_Division", vec![Int, Int], Int, div_int);
    t.add("op_Division", vec![Long, Long], Long, div_long);
    t.add("op_Division", vec![Float, Float], Float, div_float);
    t.add("op_Division", vec![Double, Double], Double, div_double);

    t.add("op_Modulus", vec![Int, Int], Int, rem_int);
    t.add("op_Modulus", vec![Long, Long], Long, rem_long);
    t.add("op_Modulus", vec![Float, Float], Float, rem_float);
    t.add("op_Modulus", vec![Double, Double], Double, rem_double);

    t.add("op_LessThan", vec![Int, Int], Bool, lt_int);
    t.add("op_LessThan", vec![Long, Long], Bool, lt_long);
    t.add("op_LessThan", vec![Float, Float], Bool, lt_float);
    t.add("op_LessThan", vec![Double, Double], Bool, lt_double);

    t.add("op_LessThanOrEqual", vec![Int, Int], Bool, le_int);
    t.add("op_LessThanOrEqual", vec![Long, Long], Bool, le_long);
    t.add("op_LessThanOrEqual", vec![Float, Float], Bool, le_float);
    t.add("op_LessThanOrEqual", vec![Double, Double], Bool, le_double);

    t.add("op_GreaterThan", vec![Int, Int], Bool, gt_int);
    t.add("op_GreaterThan", vec![Long, Long], Bool, gt_long);
    t.add("op_GreaterThan", vec![Float, Float], Bool, gt_float);
    t.add("op_GreaterThan", vec![Double, Double], Bool, gt_double);

    t.add("op_GreaterThanOrEqual", vec![Int, Int], Bool, ge_int);
    t.add("op_GreaterThanOrEqual", vec![Long, Long], Bool, ge_long);
    t.add("op_GreaterThanOrEqual", vec![Float, Float], Bool, ge_float);
    t.add("op_GreaterThanOrEqual", vec![Double, Double], Bool, ge_double);

    t.add("op_Equality", vec![Int, Int], Bool, eq_int);
    t.add("op_Equality", vec![Long, Long], Bool, eq_long);
    t.add("op_Equality", vec![Float, Float], Bool, eq_float);
    t.add("op_Equality", vec![Double, Double], Bool, eq_double);
    t.add("op_Equality", vec![Bool, Bool], Bool, eq_bool);
    t.add("op_Equality", vec![Char, Char], Bool, eq_char);
    t.add("op_Equality", vec![Str, Str], Bool, eq_str);

    t.add("op_Inequality", vec![Int, Int], Bool, ne_int);
    t.add("op_Inequality", vec![Long, Long], Bool, ne_long);
    t.add("op_Inequality", vec![Float, Float], Bool, ne_float);
    t.add("op_Inequality", vec![Double, Double], Bool, ne_double);
    t.add("op_Inequality", vec![Bool, Bool], Bool, ne_bool);
    t.add("op_Inequality", vec![Char, Char], Bool, ne_char);
    t.add("op_Inequality", vec![Str, Str], Bool, ne_str);

    t.add("op_LogicalAnd", vec![Bool, Bool], Bool, and_bool);
    t.add("op_LogicalOr", vec![Bool, Bool], Bool, or_bool);
    t.add("op_LogicalNot", vec![Bool], Bool, not_bool);

    t.add("op_UnaryNegation", vec![Int], Int, neg_int);
    t.add("op_UnaryNegation", vec![Long], Long, neg_long);
    t.add("op_UnaryNegation", vec![Float], Float, neg_float);
    t.add("op_UnaryNegation", vec![Double], Double, neg_double);

    t.add("op_Increment", vec![Int], Int, inc_int);
    t.add("op_Increment", vec![Long], Long, inc_long);
    t.add("op_Increment", vec![Float], Float, inc_float);
    t.add("op_Increment", vec![Double], Double, inc_double);

    t.add("op_Decrement", vec![Int], Int, dec_int);
    t.add("op_Decrement", vec![Long], Long, dec_long);
    t.add("op_Decrement", vec![Float], Float, dec_float);
    t.add("op_Decrement", vec![Double], Double, dec_double);

    // Conversion order per source type is resolution order: numeric
    // widenings first, the string fallback last. No implicit bool→string;
    // `true + 1` must not resolve.
    t.add("op_Implicit", vec![Int], Float, int_to_float);
    t.add("op_Implicit", vec![Int], Long, int_to_long);
    t.add("op_Implicit", vec![Int], Double, int_to_double);
    t.add("op_Implicit", vec![Long], Double, long_to_double);
    t.add("op_Implicit", vec![Float], Double, float_to_double);
    t.add("op_Implicit", vec![Char], Int, char_to_int);
    t.add("op_Implicit", vec![Char], Str, char_to_str);
    t.add("op_Implicit", vec![Int], Str, int_to_str);
    t.add("op_Implicit", vec![Long], Str, long_to_str);
    t.add("op_Implicit", vec![Float], Str, float_to_str);
    t.add("op_Implicit", vec![Double], Str, double_to_str);

    t.add("op_Explicit", vec![Float], Int, float_to_int);
    t.add("op_Explicit", vec![Double], Int, double_to_int);
    t.add("op_Explicit", vec![Double], Float, double_to_float);
    t.add("op_Explicit", vec![Long], Int, long_to_int);
    t.add("op_Explicit", vec![Int], Char, int_to_char);

    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_lookup() {
        let table = builtins();
        let add = table
            .find_exact("op_Addition", &[DataType::Int, DataType::Int])
            .unwrap();
        assert_eq!(add.ret(), &DataType::Int);
        assert!(table
            .find_exact("op_Addition", &[DataType::Bool, DataType::Int])
            .is_none());
        assert!(table.find_exact("op_Nonsense", &[DataType::Int]).is_none());
    }

    #[test]
    fn implicit_order_for_int_ends_with_string() {
        let convs = builtins().implicit_from(&DataType::Int);
        let targets: Vec<&DataType> = convs.iter().map(|c| c.ret()).collect();
        assert_eq!(
            targets,
            vec![
                &DataType::Float,
                &DataType::Long,
                &DataType::Double,
                &DataType::Str
            ]
        );
    }

    #[test]
    fn no_implicit_from_bool() {
        assert!(builtins().implicit_from(&DataType::Bool).is_empty());
    }

    #[test]
    fn conversion_lookup() {
        let table = builtins();
        assert!(table
            .find_conversion("op_Explicit", &DataType::Float, &DataType::Int)
            .is_some());
        assert!(table
            .find_conversion("op_Explicit", &DataType::Int, &DataType::Float)
            .is_none());
        assert!(table
            .find_conversion("op_Implicit", &DataType::Char, &DataType::Int)
            .is_some());
    }

    #[test]
    fn integer_arithmetic_wraps_and_guards_zero() {
        assert_eq!(
            add_int(&[Value::Int(i32::MAX), Value::Int(1)]).unwrap(),
            Value::Int(i32::MIN)
        );
        assert_eq!(
            div_int(&[Value::Int(7), Value::Int(0)]),
            Err(RuntimeErrorKind::DivisionByZero)
        );
        assert_eq!(
            rem_long(&[Value::Long(7), Value::Long(0)]),
            Err(RuntimeErrorKind::DivisionByZero)
        );
    }

    #[test]
    fn string_concat_and_equality() {
        assert_eq!(
            add_str(&[Value::from("aaa"), Value::from("10")]).unwrap(),
            Value::from("aaa10")
        );
        assert_eq!(
            eq_str(&[Value::from("x"), Value::from("x")]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn casts_truncate() {
        assert_eq!(
            float_to_int(&[Value::Float(3940.6667)]).unwrap(),
            Value::Int(3940)
        );
        assert_eq!(
            double_to_int(&[Value::Double(-2.9)]).unwrap(),
            Value::Int(-2)
        );
        assert_eq!(int_to_char(&[Value::Int(65)]).unwrap(), Value::Char('A'));
        assert!(int_to_char(&[Value::Int(-1)]).is_err());
    }

    #[test]
    fn runtime_type_mismatch_reported() {
        let err = add_int(&[Value::Bool(true), Value::Int(1)]).unwrap_err();
        assert!(matches!(err, RuntimeErrorKind::TypeMismatch { .. }));
    }
}
