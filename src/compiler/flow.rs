//! The compiled instruction stream ("flow").
//!
//! A flow is a postfix sequence of [`Instr`] items. Plain values push
//! themselves; callables pop their arguments; place instructions push
//! lazy l-value tokens consumed by whatever reads or writes them next.
//! Flows are immutable after compilation and may be cached and re-run.

use std::fmt;
use std::sync::Arc;

use crate::error::RuntimeErrorKind;
use crate::registry::{CtorDef, HostInvoke, IndexerDef, PropertyDef};
use crate::types::DataType;
use crate::value::Value;

/// A concrete callable chosen by resolution: a builtin operator, an
/// inserted conversion, a host method or a static property getter.
pub struct Callable {
    name: String,
    params: Vec<DataType>,
    ret: DataType,
    imp: CallableImpl,
}

enum CallableImpl {
    /// Monomorphic builtin; a plain fn keeps the table allocation-free.
    Builtin(fn(&[Value]) -> Result<Value, RuntimeErrorKind>),
    /// Registered host callable.
    Host(HostInvoke),
}

impl Callable {
    /// Wrap a builtin operator implementation.
    pub(crate) fn builtin(
        name: &'static str,
        params: Vec<DataType>,
        ret: DataType,
        imp: fn(&[Value]) -> Result<Value, RuntimeErrorKind>,
    ) -> Self {
        Self {
            name: name.to_string(),
            params,
            ret,
            imp: CallableImpl::Builtin(imp),
        }
    }

    /// Wrap a registered host callable.
    pub(crate) fn host(
        name: impl Into<String>,
        params: Vec<DataType>,
        ret: DataType,
        imp: HostInvoke,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            imp: CallableImpl::Host(imp),
        }
    }

    /// The callable's name (operator name or method name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter types.
    pub fn params(&self) -> &[DataType] {
        &self.params
    }

    /// Return type.
    pub fn ret(&self) -> &DataType {
        &self.ret
    }

    /// Number of stack items this callable consumes.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Invoke with arguments in source order. Host failures are wrapped so
    /// foreign error types never escape.
    pub(crate) fn invoke(&self, args: &[Value]) -> Result<Value, RuntimeErrorKind> {
        match &self.imp {
            CallableImpl::Builtin(f) => f(args),
            CallableImpl::Host(f) => {
                f(args).map_err(|cause| RuntimeErrorKind::HostInvocationFailed { cause })
            }
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Callable({}({}) -> {})",
            self.name,
            self.params
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            self.ret
        )
    }
}

/// How an `IndexPlace` reaches its elements.
#[derive(Clone, Debug)]
pub enum IndexAccessor {
    /// The built-in rectangular array accessor.
    Array,
    /// A registered indexer on a host type.
    Indexer(Arc<IndexerDef>),
}

/// One item of a compiled flow.
#[derive(Clone, Debug)]
pub enum Instr {
    /// Push a value.
    Push(Value),
    /// Pop `arity` items (read through places, source order), invoke,
    /// push the result.
    Call(Arc<Callable>),
    /// Pop the constructor's arguments, construct, push the instance.
    Construct(Arc<CtorDef>),
    /// Pop `n` arguments, pop a host-function value, invoke it, push the
    /// result. Arguments reach the callee in source order.
    RunDelegate(usize),
    /// Push a place token for the named variable.
    VarPlace(Arc<str>),
    /// Push a place token for a member of the value beneath it.
    MemberPlace(Arc<PropertyDef>),
    /// Push a place token for `subject[i1..in]`, subject and indices
    /// beneath it.
    IndexPlace {
        /// Element accessor.
        accessor: IndexAccessor,
        /// Number of indices.
        arity: usize,
    },
    /// Pop an r-value and a place, write, push the assigned value.
    SetOp,
}

impl Instr {
    /// Short mnemonic for debugging and disassembly-style dumps.
    pub fn name(&self) -> &'static str {
        match self {
            Instr::Push(_) => "PUSH",
            Instr::Call(_) => "CALL",
            Instr::Construct(_) => "CONSTRUCT",
            Instr::RunDelegate(_) => "RUN_DELEGATE",
            Instr::VarPlace(_) => "VAR_PLACE",
            Instr::MemberPlace(_) => "MEMBER_PLACE",
            Instr::IndexPlace { .. } => "INDEX_PLACE",
            Instr::SetOp => "SET_OP",
        }
    }

    /// Whether this instruction leaves a place on the stack, making it a
    /// valid trailing instruction for an assignment target.
    pub fn is_place(&self) -> bool {
        matches!(
            self,
            Instr::VarPlace(_) | Instr::MemberPlace(_) | Instr::IndexPlace { .. }
        )
    }
}

/// The result of compiling one expression: the statically inferred result
/// type and the instruction flow.
#[derive(Debug)]
pub struct CompiledExpr {
    /// The expression's static type.
    pub static_type: DataType,
    /// The postfix instruction stream.
    pub flow: Vec<Instr>,
}
