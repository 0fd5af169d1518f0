//! Unified error types for the expression engine.
//!
//! One error type per phase — [`ParseError`], [`CompileError`],
//! [`RuntimeError`] — plus [`RegistryError`] for host type registration.
//! All phases can be handled uniformly through [`ExprError`].
//!
//! ```text
//! ExprError (top-level wrapper)
//! ├── ParseError    - the parser rejected the input
//! ├── CompileError  - no overload / conversion / member resolves
//! └── RuntimeError  - execution failed (with instruction index)
//! ```

use thiserror::Error;

use crate::span::Span;

// ============================================================================
// Parse Errors
// ============================================================================

/// The parser rejected the input, or the accepted span did not cover it.
///
/// Carries the furthest byte offset the parser reached and a dump of the
/// partial token tree built up to that point. There is no recovery.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("unexpected token at offset {position}")]
pub struct ParseError {
    /// Furthest byte offset reached before failing. Always within
    /// `[0, input.len()]`.
    pub position: u32,
    /// A rendering of the partial token tree, for diagnostics.
    pub partial: String,
}

// ============================================================================
// Compile Errors
// ============================================================================

/// Errors raised while lowering a token tree to an instruction flow.
///
/// Compilation is strict: the first unresolvable operator, member, cast or
/// assignment target aborts the compile with the originating span.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// An identifier is neither a variable nor a registered type.
    #[error("at {span}: unknown identifier '{name}'")]
    UnknownIdentifier {
        /// The identifier that failed to resolve.
        name: String,
        /// Where it was referenced.
        span: Span,
    },

    /// No overload and no implicit-conversion sequence resolves a call.
    #[error("at {span}: no method '{name}' accepting ({args})")]
    MethodNotFound {
        /// The operator or method name.
        name: String,
        /// The argument types, comma separated.
        args: String,
        /// Where the call or operator occurred.
        span: Span,
    },

    /// An explicit cast has no host, explicit or implicit conversion path.
    #[error("at {span}: no explicit conversion from '{from}' to '{to}'")]
    NoExplicitConversion {
        /// The operand type.
        from: String,
        /// The cast target type.
        to: String,
        /// Where the cast occurred.
        span: Span,
    },

    /// The left side of an assignment did not produce a place.
    #[error("at {span}: left side of assignment is not assignable")]
    InvalidAssignmentTarget {
        /// Where the assignment occurred.
        span: Span,
    },

    /// Increment/decrement applied to something that is not a place.
    #[error("at {span}: increment target must be a variable or member")]
    IncrementRequiresPlace {
        /// Where the increment occurred.
        span: Span,
    },

    /// Increment/decrement applied to a non-numeric operand.
    #[error("at {span}: increment requires a numeric operand, found '{actual}'")]
    IncrementRequiresPrimitive {
        /// The operand's static type.
        actual: String,
        /// Where the increment occurred.
        span: Span,
    },

    /// A member call resolved to a method that returns nothing.
    #[error("at {span}: method '{name}' returns void and cannot be used in an expression")]
    VoidMethodNotSupported {
        /// The method name.
        name: String,
        /// Where the call occurred.
        span: Span,
    },

    /// Internal compiler error; indicates a token tree the parser should
    /// never have produced.
    #[error("internal error: {message}")]
    Internal {
        /// The error message.
        message: String,
    },
}

impl CompileError {
    /// Get the span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            CompileError::UnknownIdentifier { span, .. } => *span,
            CompileError::MethodNotFound { span, .. } => *span,
            CompileError::NoExplicitConversion { span, .. } => *span,
            CompileError::InvalidAssignmentTarget { span } => *span,
            CompileError::IncrementRequiresPlace { span } => *span,
            CompileError::IncrementRequiresPrimitive { span, .. } => *span,
            CompileError::VoidMethodNotSupported { span, .. } => *span,
            CompileError::Internal { .. } => Span::default(),
        }
    }
}

// ============================================================================
// Runtime Errors
// ============================================================================

/// Categories of runtime failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeErrorKind {
    /// `SetOp` found a plain value where a place was expected.
    #[error("assignment target is not a place (found {actual})")]
    InvalidLeftSide {
        /// Description of what was on the stack instead.
        actual: String,
    },

    /// An underlying host method, constructor or accessor failed.
    #[error("host invocation failed: {cause}")]
    HostInvocationFailed {
        /// The host-reported failure.
        cause: String,
    },

    /// A variable place referred to a name absent from the environment.
    #[error("undefined variable '{name}'")]
    UndefinedVariable {
        /// The variable name.
        name: String,
    },

    /// A value had a different runtime type than the flow promised.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected type.
        expected: String,
        /// The actual type.
        actual: String,
    },

    /// An index fell outside the subject's bounds.
    #[error("index out of bounds: {detail}")]
    IndexOutOfBounds {
        /// Description of the offending access.
        detail: String,
    },

    /// Integer division or modulus by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// The value stack ran dry; indicates a malformed flow.
    #[error("stack underflow")]
    StackUnderflow,
}

/// A runtime failure with the instruction index it originated from.
///
/// The VM does not recover partial results; the first failure aborts the
/// run.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("at instruction {index}: {kind}")]
pub struct RuntimeError {
    /// Index into the flow of the instruction that failed.
    pub index: usize,
    /// What went wrong.
    pub kind: RuntimeErrorKind,
}

// ============================================================================
// Registration Errors
// ============================================================================

/// Errors raised while registering host types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    /// A type with this name was already registered.
    #[error("duplicate type: {0}")]
    DuplicateType(String),
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// The unified error type across parse, compile and run.
///
/// Each variant uses `#[from]`, so all phases compose with `?`:
///
/// ```ignore
/// fn evaluate(text: &str) -> Result<Value, ExprError> {
///     let token = parse(text)?;
///     let program = compile(text, &token, &env, &registry)?;
///     Ok(Evaluator::run(&program, &mut env)?)
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    /// A parse error.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A compile error.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A runtime error.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl ExprError {
    /// Check if this is a parse error.
    pub fn is_parse(&self) -> bool {
        matches!(self, ExprError::Parse(_))
    }

    /// Check if this is a compile error.
    pub fn is_compile(&self) -> bool {
        matches!(self, ExprError::Compile(_))
    }

    /// Check if this is a runtime error.
    pub fn is_runtime(&self) -> bool {
        matches!(self, ExprError::Runtime(_))
    }
}
