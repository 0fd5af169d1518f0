//! An embeddable expression engine.
//!
//! `liveexpr` compiles a single C-like expression into a postfix
//! instruction flow and runs it on a small stack VM against a
//! caller-supplied environment of variables and host functions. It is
//! meant to be hosted inside another application — a game runtime, an
//! editor tool, a configuration layer — that wants to let end-users
//! write short live expressions (arithmetic, comparisons, member access,
//! indexing, constructor calls, assignment) without shipping a full
//! interpreter.
//!
//! The pipeline is three phases:
//!
//! 1. **Parse**: a recursive-descent combinator parser produces a token
//!    tree ([`parse`], [`Parser`]).
//! 2. **Compile**: a single bottom-up pass resolves operators, members
//!    and conversions against the environment and the [`HostRegistry`],
//!    producing a typed [`CompiledExpr`] ([`compile`]).
//! 3. **Run**: [`Evaluator`] executes the flow; assignable locations
//!    travel the stack as first-class places ([`eval`] for one-shot use).
//!
//! ```
//! use liveexpr::{eval, Environment, HostRegistry, Value};
//!
//! let mut env = Environment::new();
//! env.set("test", Value::Int(10));
//! let registry = HostRegistry::new();
//!
//! let result = eval("test * 10 == 100", &mut env, &registry).unwrap();
//! assert_eq!(result, Value::Bool(true));
//! ```
//!
//! Compiled flows are immutable and reusable; compile once, run many
//! times. Expressions have no statements, loops or user-defined types —
//! it is an expression language only.

pub mod compiler;
pub mod env;
pub mod error;
pub mod parser;
pub mod registry;
pub mod span;
pub mod types;
pub mod value;
pub mod vm;

pub use compiler::{compile, Callable, CompiledExpr, IndexAccessor, Instr};
pub use env::Environment;
pub use error::{
    CompileError, ExprError, ParseError, RegistryError, RuntimeError, RuntimeErrorKind,
};
pub use parser::{parse, Parser, Token, TokenKind, TokenValue};
pub use registry::{
    CtorDef, HostRegistry, IndexerDef, MemberFlags, MethodDef, PropertyDef, TypeBuilder,
};
pub use span::Span;
pub use types::{DataType, TypeHash};
pub use value::{ArrayRef, HostFn, ObjectRef, Value};
pub use vm::Evaluator;

/// Parse, compile and run `source` in one step.
///
/// The environment supplies variable types at compile time and values at
/// run time; the registry supplies host types. Errors from any phase
/// surface through [`ExprError`].
pub fn eval(
    source: &str,
    env: &mut Environment,
    registry: &HostRegistry,
) -> Result<Value, ExprError> {
    let token = parse(source)?;
    let program = compile(source, &token, env, registry)?;
    Ok(Evaluator::run(&program, env)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_round_trip() {
        let mut env = Environment::new();
        let registry = HostRegistry::new();
        assert_eq!(
            eval("10 < 20", &mut env, &registry).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn eval_phases_surface_their_errors() {
        let mut env = Environment::new();
        let registry = HostRegistry::new();
        assert!(eval("1 +", &mut env, &registry).unwrap_err().is_parse());
        assert!(eval("true + 1", &mut env, &registry)
            .unwrap_err()
            .is_compile());
    }

    #[test]
    fn parser_compile_convenience() {
        let mut env = Environment::new();
        env.set("x", Value::Int(2));
        let registry = HostRegistry::new();
        let program = Parser::with_host("x * 3", &env, &registry)
            .compile()
            .unwrap();
        assert_eq!(program.static_type, DataType::Int);
        assert_eq!(
            Evaluator::run(&program, &mut env).unwrap(),
            Value::Int(6)
        );
    }
}
