//! The stack evaluator.
//!
//! Executes a compiled flow left to right over a stack of [`Slot`]s: plain
//! values and lazy place tokens. Places are materialized on demand —
//! reading a member or index place pops its subject (and indices) from
//! beneath it, so l-values cost nothing until something actually reads or
//! writes them. `SetOp` writes symmetrically and pushes the assigned
//! value, which is what makes `a = b = v` and `test[i] = ...` compose.
//!
//! The evaluator never consults the registry: every flow instruction
//! carries the accessor it needs. The only external state is the
//! environment, read through `VarPlace` and rebound by assignment.

use std::sync::Arc;

use crate::compiler::{CompiledExpr, IndexAccessor, Instr};
use crate::env::Environment;
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::registry::PropertyDef;
use crate::value::Value;

/// Entry points for running compiled flows.
pub struct Evaluator;

impl Evaluator {
    /// Run a compiled expression against an environment.
    pub fn run(program: &CompiledExpr, env: &mut Environment) -> Result<Value, RuntimeError> {
        Self::run_flow(&program.flow, env)
    }

    /// Run a bare instruction flow against an environment.
    pub fn run_flow(flow: &[Instr], env: &mut Environment) -> Result<Value, RuntimeError> {
        let vm = Vm {
            stack: Vec::new(),
            env,
        };
        vm.run(flow)
    }
}

/// One stack cell: a value or a lazy place token.
enum Slot {
    Value(Value),
    Var(Arc<str>),
    Member(Arc<PropertyDef>),
    Index {
        accessor: IndexAccessor,
        arity: usize,
    },
}

struct Vm<'e> {
    stack: Vec<Slot>,
    env: &'e mut Environment,
}

impl Vm<'_> {
    fn run(mut self, flow: &[Instr]) -> Result<Value, RuntimeError> {
        for (index, instr) in flow.iter().enumerate() {
            self.step(instr)
                .map_err(|kind| RuntimeError { index, kind })?;
        }
        let final_index = flow.len().saturating_sub(1);
        self.pop_read()
            .map_err(|kind| RuntimeError {
                index: final_index,
                kind,
            })
    }

    fn step(&mut self, instr: &Instr) -> Result<(), RuntimeErrorKind> {
        match instr {
            Instr::Push(value) => self.stack.push(Slot::Value(value.clone())),
            Instr::Call(callable) => {
                let args = self.pop_args(callable.arity())?;
                let result = callable.invoke(&args)?;
                self.stack.push(Slot::Value(result));
            }
            Instr::Construct(ctor) => {
                let args = self.pop_args(ctor.params.len())?;
                let instance = (ctor.construct)(&args)
                    .map_err(|cause| RuntimeErrorKind::HostInvocationFailed { cause })?;
                self.stack.push(Slot::Value(instance));
            }
            Instr::RunDelegate(arity) => {
                let args = self.pop_args(*arity)?;
                let callee = self.pop_read()?;
                let Value::Function(host_fn) = callee else {
                    return Err(RuntimeErrorKind::TypeMismatch {
                        expected: "function".to_string(),
                        actual: callee.type_name().to_string(),
                    });
                };
                let result = host_fn
                    .invoke(&args)
                    .map_err(|cause| RuntimeErrorKind::HostInvocationFailed { cause })?;
                self.stack.push(Slot::Value(result));
            }
            Instr::VarPlace(name) => self.stack.push(Slot::Var(name.clone())),
            Instr::MemberPlace(prop) => self.stack.push(Slot::Member(prop.clone())),
            Instr::IndexPlace { accessor, arity } => self.stack.push(Slot::Index {
                accessor: accessor.clone(),
                arity: *arity,
            }),
            Instr::SetOp => {
                let value = self.pop_read()?;
                let place = self.pop_slot()?;
                let assigned = self.write(place, value)?;
                self.stack.push(Slot::Value(assigned));
            }
        }
        Ok(())
    }

    // =====================================================================
    // Reading
    // =====================================================================

    fn pop_slot(&mut self) -> Result<Slot, RuntimeErrorKind> {
        self.stack.pop().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    fn pop_read(&mut self) -> Result<Value, RuntimeErrorKind> {
        let slot = self.pop_slot()?;
        self.read(slot)
    }

    /// Pop `n` arguments (read through places) and restore source order.
    fn pop_args(&mut self, n: usize) -> Result<Vec<Value>, RuntimeErrorKind> {
        let mut args = Vec::with_capacity(n);
        for _ in 0..n {
            args.push(self.pop_read()?);
        }
        args.reverse();
        Ok(args)
    }

    /// Materialize a slot. Reading a member or index place consumes its
    /// subject (and indices) from the stack beneath it.
    fn read(&mut self, slot: Slot) -> Result<Value, RuntimeErrorKind> {
        match slot {
            Slot::Value(value) => Ok(value),
            Slot::Var(name) => self
                .env
                .get(&name)
                .cloned()
                .ok_or_else(|| RuntimeErrorKind::UndefinedVariable {
                    name: name.to_string(),
                }),
            Slot::Member(prop) => {
                let subject = self.pop_read()?;
                (prop.get)(&[subject])
                    .map_err(|cause| RuntimeErrorKind::HostInvocationFailed { cause })
            }
            Slot::Index { accessor, arity } => {
                let indices = self.pop_args(arity)?;
                let subject = self.pop_read()?;
                match accessor {
                    IndexAccessor::Array => {
                        let array = subject.as_array().ok_or_else(|| {
                            RuntimeErrorKind::TypeMismatch {
                                expected: "array".to_string(),
                                actual: subject.type_name().to_string(),
                            }
                        })?;
                        array.get(&index_values(&indices)?)
                    }
                    IndexAccessor::Indexer(indexer) => (indexer.get)(&subject, &indices)
                        .map_err(|cause| RuntimeErrorKind::HostInvocationFailed { cause }),
                }
            }
        }
    }

    // =====================================================================
    // Writing
    // =====================================================================

    /// Write `value` through a place and return the assigned value.
    fn write(&mut self, place: Slot, value: Value) -> Result<Value, RuntimeErrorKind> {
        match place {
            Slot::Value(found) => Err(RuntimeErrorKind::InvalidLeftSide {
                actual: found.type_name().to_string(),
            }),
            Slot::Var(name) => {
                self.env.set(name.to_string(), value.clone());
                Ok(value)
            }
            Slot::Member(prop) => {
                let subject = self.pop_read()?;
                let Some(set) = &prop.set else {
                    return Err(RuntimeErrorKind::HostInvocationFailed {
                        cause: format!("member '{}' is read-only", prop.name),
                    });
                };
                set(&[subject, value.clone()])
                    .map_err(|cause| RuntimeErrorKind::HostInvocationFailed { cause })?;
                Ok(value)
            }
            Slot::Index { accessor, arity } => {
                let indices = self.pop_args(arity)?;
                let subject = self.pop_read()?;
                match accessor {
                    IndexAccessor::Array => {
                        let array = subject.as_array().ok_or_else(|| {
                            RuntimeErrorKind::TypeMismatch {
                                expected: "array".to_string(),
                                actual: subject.type_name().to_string(),
                            }
                        })?;
                        array.set(&index_values(&indices)?, value.clone())?;
                        Ok(value)
                    }
                    IndexAccessor::Indexer(indexer) => {
                        let Some(set) = &indexer.set else {
                            return Err(RuntimeErrorKind::HostInvocationFailed {
                                cause: "indexer is read-only".to_string(),
                            });
                        };
                        set(&subject, &indices, value.clone())
                            .map_err(|cause| RuntimeErrorKind::HostInvocationFailed { cause })?;
                        Ok(value)
                    }
                }
            }
        }
    }
}

/// Narrow index values to machine indices.
fn index_values(values: &[Value]) -> Result<Vec<i64>, RuntimeErrorKind> {
    values
        .iter()
        .map(|v| match v {
            Value::Int(i) => Ok(*i as i64),
            Value::Long(i) => Ok(*i),
            other => Err(RuntimeErrorKind::TypeMismatch {
                expected: "int index".to_string(),
                actual: other.type_name().to_string(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ArrayRef;

    fn var(name: &str) -> Instr {
        Instr::VarPlace(Arc::from(name))
    }

    #[test]
    fn push_and_result() {
        let mut env = Environment::new();
        let result = Evaluator::run_flow(&[Instr::Push(Value::Int(7))], &mut env).unwrap();
        assert_eq!(result, Value::Int(7));
    }

    #[test]
    fn var_place_reads_environment() {
        let mut env = Environment::new();
        env.set("x", Value::Int(3));
        let result = Evaluator::run_flow(&[var("x")], &mut env).unwrap();
        assert_eq!(result, Value::Int(3));
    }

    #[test]
    fn undefined_variable_reported_with_index() {
        let mut env = Environment::new();
        let err = Evaluator::run_flow(&[var("ghost")], &mut env).unwrap_err();
        assert_eq!(err.index, 0);
        assert!(matches!(
            err.kind,
            RuntimeErrorKind::UndefinedVariable { ref name } if name == "ghost"
        ));
    }

    #[test]
    fn set_op_rebinds_variable_and_pushes_value() {
        let mut env = Environment::new();
        env.set("x", Value::Int(0));
        let flow = [var("x"), Instr::Push(Value::Int(42)), Instr::SetOp];
        let result = Evaluator::run_flow(&flow, &mut env).unwrap();
        assert_eq!(result, Value::Int(42));
        assert_eq!(env.get("x"), Some(&Value::Int(42)));
    }

    #[test]
    fn set_op_creates_missing_binding() {
        let mut env = Environment::new();
        let flow = [var("fresh"), Instr::Push(Value::Int(1)), Instr::SetOp];
        Evaluator::run_flow(&flow, &mut env).unwrap();
        assert_eq!(env.get("fresh"), Some(&Value::Int(1)));
    }

    #[test]
    fn set_op_without_place_fails() {
        let mut env = Environment::new();
        let flow = [
            Instr::Push(Value::Int(1)),
            Instr::Push(Value::Int(2)),
            Instr::SetOp,
        ];
        let err = Evaluator::run_flow(&flow, &mut env).unwrap_err();
        assert_eq!(err.index, 2);
        assert!(matches!(err.kind, RuntimeErrorKind::InvalidLeftSide { .. }));
    }

    #[test]
    fn index_place_reads_and_writes() {
        let mut env = Environment::new();
        env.set("a", Value::Array(ArrayRef::of_ints([10, 20, 30])));
        let read = [
            var("a"),
            Instr::Push(Value::Int(1)),
            Instr::IndexPlace {
                accessor: IndexAccessor::Array,
                arity: 1,
            },
        ];
        assert_eq!(Evaluator::run_flow(&read, &mut env).unwrap(), Value::Int(20));

        let write = [
            var("a"),
            Instr::Push(Value::Int(1)),
            Instr::IndexPlace {
                accessor: IndexAccessor::Array,
                arity: 1,
            },
            Instr::Push(Value::Int(99)),
            Instr::SetOp,
        ];
        assert_eq!(Evaluator::run_flow(&write, &mut env).unwrap(), Value::Int(99));
        let updated = env.get("a").and_then(Value::as_array).unwrap();
        assert_eq!(updated.get(&[1]).unwrap(), Value::Int(99));
    }

    #[test]
    fn stack_underflow_is_reported() {
        let mut env = Environment::new();
        let err = Evaluator::run_flow(&[Instr::SetOp], &mut env).unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::StackUnderflow));
    }
}
