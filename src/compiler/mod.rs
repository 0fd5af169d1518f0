//! The compiler: token tree → typed instruction flow.
//!
//! A single depth-first pass. Types flow bottom-up: every node lowers to
//! `(static type, instructions appended)`, chosen overloads dictate the
//! propagated type, and resolution is strict — the first node with no
//! matching overload, member or conversion aborts the compile.
//!
//! L-values are compiled as place instructions (`VarPlace`,
//! `MemberPlace`, `IndexPlace`); whatever consumes them decides whether
//! to read or write, which is what makes chained assignment and compound
//! targets compose.

mod flow;
mod ops;
mod resolve;

pub use flow::{Callable, CompiledExpr, IndexAccessor, Instr};

use std::sync::Arc;

use crate::env::Environment;
use crate::error::CompileError;
use crate::parser::token::{Token, TokenKind, TokenValue};
use crate::registry::{HostRegistry, MethodDef, TypeDef};
use crate::span::Span;
use crate::types::{DataType, TypeHash};
use crate::value::Value;

use ops::{binary_op_name, builtins, increment_op_name, unary_op_name};
use resolve::{find_cast, match_signature, method_callable, resolve_operator};

/// Compile a parsed token tree against an environment and registry.
///
/// `source` must be the text the tree was parsed from; operator lexemes
/// are lifted back out of it through the token spans.
pub fn compile(
    source: &str,
    token: &Token,
    env: &Environment,
    registry: &HostRegistry,
) -> Result<CompiledExpr, CompileError> {
    let compiler = Compiler {
        source,
        env,
        registry,
    };
    let mut instrs = Vec::new();
    let static_type = compiler.lower(token, &mut instrs)?;
    Ok(CompiledExpr {
        static_type,
        flow: instrs,
    })
}

/// The running left-hand state of a chain: either a value with a static
/// type, or a registered type acting as a static receiver.
enum Chain {
    Value(DataType),
    Marker(TypeHash, Span),
}

struct Compiler<'a> {
    source: &'a str,
    env: &'a Environment,
    registry: &'a HostRegistry,
}

impl<'a> Compiler<'a> {
    // =====================================================================
    // Node dispatch
    // =====================================================================

    fn lower(&self, token: &Token, out: &mut Vec<Instr>) -> Result<DataType, CompileError> {
        match token.kind {
            TokenKind::Literal => self.lower_literal(token, out),
            TokenKind::Reference => self.lower_lone_reference(token, out),
            TokenKind::Constructor => self.lower_constructor(token, out),
            TokenKind::Block => self.lower_block(&token.children, out),
            other => Err(internal(format!("unexpected {other:?} operand"))),
        }
    }

    fn lower_block(
        &self,
        children: &[Token],
        out: &mut Vec<Instr>,
    ) -> Result<DataType, CompileError> {
        let Some(first) = children.first() else {
            return Err(internal("empty block".to_string()));
        };
        match first.kind {
            TokenKind::ExplicitConversion => self.lower_cast(children, out),
            TokenKind::Unary => self.lower_unary(children, out),
            TokenKind::Increment => self.lower_increment(children, out),
            _ => self.lower_chain(children, out),
        }
    }

    // =====================================================================
    // Leaves
    // =====================================================================

    fn lower_literal(
        &self,
        token: &Token,
        out: &mut Vec<Instr>,
    ) -> Result<DataType, CompileError> {
        let value = match &token.value {
            TokenValue::Int(v) => Value::Int(*v),
            TokenValue::Float(v) => Value::Float(*v),
            TokenValue::Bool(v) => Value::Bool(*v),
            TokenValue::Str(v) => Value::Str(v.clone()),
            other => return Err(internal(format!("literal without value: {other:?}"))),
        };
        let data_type = value.data_type();
        out.push(Instr::Push(value));
        Ok(data_type)
    }

    /// A reference standing alone as an operand (not the head of a call
    /// or member chain): it must be an environment binding. A bare type
    /// name has no value.
    fn lower_lone_reference(
        &self,
        token: &Token,
        out: &mut Vec<Instr>,
    ) -> Result<DataType, CompileError> {
        match self.reference_target(token)? {
            Chain::Value(data_type) => {
                let name = token.ident().unwrap_or_default();
                out.push(Instr::VarPlace(Arc::from(name)));
                Ok(data_type)
            }
            Chain::Marker(hash, span) => Err(self.dangling_type(hash, span)),
        }
    }

    fn reference_target(&self, token: &Token) -> Result<Chain, CompileError> {
        let Some(name) = token.ident() else {
            return Err(internal("reference without identifier".to_string()));
        };
        if let Some(data_type) = self.env.type_of(name) {
            return Ok(Chain::Value(data_type));
        }
        if let Some(hash) = self.registry.type_by_name(name) {
            return Ok(Chain::Marker(hash, token.span));
        }
        Err(CompileError::UnknownIdentifier {
            name: name.to_string(),
            span: token.span,
        })
    }

    // =====================================================================
    // Chains
    // =====================================================================

    /// Compile `children` left to right as a chain: first an operand,
    /// then binary operators, member refs, calls, indices and setters.
    fn lower_chain(
        &self,
        children: &[Token],
        out: &mut Vec<Instr>,
    ) -> Result<DataType, CompileError> {
        let mut idx = 0;
        let mut current = self.chain_head(children, &mut idx, out)?;

        while idx < children.len() {
            let child = &children[idx];
            match child.kind {
                TokenKind::Binary => {
                    idx += 1;
                    let rhs = children
                        .get(idx)
                        .ok_or_else(|| internal("binary operator without operand".to_string()))?;
                    idx += 1;
                    current = Chain::Value(self.lower_binary(current, child, rhs, out)?);
                }
                TokenKind::Setter => {
                    idx += 1;
                    let rhs = children
                        .get(idx)
                        .ok_or_else(|| internal("assignment without right side".to_string()))?;
                    idx += 1;
                    current = Chain::Value(self.lower_setter(current, child, rhs, out)?);
                }
                TokenKind::MemberRef => {
                    let next_is_call =
                        children.get(idx + 1).map(|t| t.kind) == Some(TokenKind::Function);
                    let (next, consumed_call) =
                        self.lower_member(current, child, children.get(idx + 1), next_is_call, out)?;
                    current = next;
                    idx += if consumed_call { 2 } else { 1 };
                }
                TokenKind::Function => {
                    idx += 1;
                    current = Chain::Value(self.lower_delegate_call(current, child, out)?);
                }
                TokenKind::Index => {
                    idx += 1;
                    current = Chain::Value(self.lower_index(current, child, out)?);
                }
                other => return Err(internal(format!("unexpected {other:?} in chain"))),
            }
        }

        match current {
            Chain::Value(data_type) => Ok(data_type),
            Chain::Marker(hash, span) => Err(self.dangling_type(hash, span)),
        }
    }

    /// The first operand of a chain. A reference followed directly by an
    /// argument list is a call of an environment function.
    fn chain_head(
        &self,
        children: &[Token],
        idx: &mut usize,
        out: &mut Vec<Instr>,
    ) -> Result<Chain, CompileError> {
        let head = &children[0];
        *idx = 1;

        if head.kind != TokenKind::Reference {
            return Ok(Chain::Value(self.lower(head, out)?));
        }
        let calls = children.get(1).map(|t| t.kind) == Some(TokenKind::Function);
        if !calls {
            return self.reference_target(head).map(|target| match target {
                Chain::Value(data_type) => {
                    let name = head.ident().unwrap_or_default();
                    out.push(Instr::VarPlace(Arc::from(name)));
                    Chain::Value(data_type)
                }
                marker => marker,
            });
        }

        // `name(args)` — the binding must be a host function.
        let name = head
            .ident()
            .ok_or_else(|| internal("reference without identifier".to_string()))?;
        let Some(function_token) = children.get(1) else {
            return Err(internal("call without argument list".to_string()));
        };
        *idx = 2;
        match self.env.get(name) {
            Some(Value::Function(host_fn)) => {
                out.push(Instr::VarPlace(Arc::from(name)));
                let ret = host_fn.ret.clone();
                let params = host_fn.params.clone();
                self.lower_delegate_args(name, &params, function_token, out)?;
                Ok(Chain::Value(ret))
            }
            Some(other) => Err(CompileError::MethodNotFound {
                name: name.to_string(),
                args: format!("bound to {}", self.registry.display_type(&other.data_type())),
                span: head.span,
            }),
            None if self.registry.type_by_name(name).is_some() => {
                // A type name is not callable without `new`.
                Err(CompileError::MethodNotFound {
                    name: name.to_string(),
                    args: String::new(),
                    span: head.span,
                })
            }
            None => Err(CompileError::UnknownIdentifier {
                name: name.to_string(),
                span: head.span,
            }),
        }
    }

    // =====================================================================
    // Binary operators and assignment
    // =====================================================================

    fn lower_binary(
        &self,
        lhs: Chain,
        op_token: &Token,
        rhs: &Token,
        out: &mut Vec<Instr>,
    ) -> Result<DataType, CompileError> {
        let lhs_type = self.expect_value(lhs)?;
        let lexeme = op_token.span.slice(self.source);
        let op_name = binary_op_name(lexeme)
            .ok_or_else(|| internal(format!("unknown binary lexeme '{lexeme}'")))?;

        let mut rhs_flow = Vec::new();
        let rhs_type = self.lower(rhs, &mut rhs_flow)?;

        let resolution =
            resolve_operator(self.registry, op_name, &[lhs_type, rhs_type], op_token.span)?;
        if let Some(conv) = &resolution.conversions[0] {
            out.push(Instr::Call(conv.clone()));
        }
        out.extend(rhs_flow);
        if let Some(conv) = &resolution.conversions[1] {
            out.push(Instr::Call(conv.clone()));
        }
        let ret = resolution.callable.ret().clone();
        out.push(Instr::Call(resolution.callable));
        Ok(ret)
    }

    fn lower_setter(
        &self,
        lhs: Chain,
        setter: &Token,
        rhs: &Token,
        out: &mut Vec<Instr>,
    ) -> Result<DataType, CompileError> {
        self.expect_value(lhs)?;
        let assignable = match out.last() {
            Some(Instr::VarPlace(_)) => true,
            Some(Instr::MemberPlace(prop)) => prop.set.is_some(),
            Some(Instr::IndexPlace { accessor, .. }) => match accessor {
                IndexAccessor::Array => true,
                IndexAccessor::Indexer(indexer) => indexer.set.is_some(),
            },
            _ => false,
        };
        if !assignable {
            return Err(CompileError::InvalidAssignmentTarget { span: setter.span });
        }
        let rhs_type = self.lower(rhs, out)?;
        out.push(Instr::SetOp);
        Ok(rhs_type)
    }

    // =====================================================================
    // Unary, increment, cast
    // =====================================================================

    fn lower_unary(
        &self,
        children: &[Token],
        out: &mut Vec<Instr>,
    ) -> Result<DataType, CompileError> {
        let op_token = &children[0];
        let lexeme = op_token.span.slice(self.source);
        let op_name = unary_op_name(lexeme)
            .ok_or_else(|| internal(format!("unknown unary lexeme '{lexeme}'")))?;

        let mut operand = Vec::new();
        let operand_type = self.lower_chain(&children[1..], &mut operand)?;

        let resolution = resolve_operator(self.registry, op_name, &[operand_type], op_token.span)?;
        out.extend(operand);
        if let Some(conv) = &resolution.conversions[0] {
            out.push(Instr::Call(conv.clone()));
        }
        let ret = resolution.callable.ret().clone();
        out.push(Instr::Call(resolution.callable));
        Ok(ret)
    }

    /// `++x` lowers to `place place op SetOp`: the incremented value
    /// replaces the old one and is also the expression's result.
    fn lower_increment(
        &self,
        children: &[Token],
        out: &mut Vec<Instr>,
    ) -> Result<DataType, CompileError> {
        let op_token = &children[0];
        let lexeme = op_token.span.slice(self.source);
        let op_name = increment_op_name(lexeme)
            .ok_or_else(|| internal(format!("unknown increment lexeme '{lexeme}'")))?;

        let mut operand = Vec::new();
        let operand_type = self.lower_chain(&children[1..], &mut operand)?;

        let writable_place = match operand.last() {
            Some(Instr::VarPlace(_)) => true,
            Some(Instr::MemberPlace(prop)) => prop.set.is_some(),
            _ => false,
        };
        if !writable_place {
            return Err(CompileError::IncrementRequiresPlace {
                span: op_token.span,
            });
        }
        if !operand_type.is_numeric() {
            return Err(CompileError::IncrementRequiresPrimitive {
                actual: self.registry.display_type(&operand_type),
                span: op_token.span,
            });
        }
        let op = builtins()
            .find_exact(op_name, std::slice::from_ref(&operand_type))
            .ok_or_else(|| internal(format!("missing builtin {op_name}")))?;

        out.extend(operand.iter().cloned());
        out.extend(operand);
        out.push(Instr::Call(op));
        out.push(Instr::SetOp);
        Ok(operand_type)
    }

    fn lower_cast(
        &self,
        children: &[Token],
        out: &mut Vec<Instr>,
    ) -> Result<DataType, CompileError> {
        let cast_token = &children[0];
        let Some(name) = cast_token.ident() else {
            return Err(internal("cast without type name".to_string()));
        };
        let target = match DataType::primitive_from_name(name) {
            Some(primitive) => primitive,
            None => match self.registry.type_by_name(name) {
                Some(hash) => DataType::Object(hash),
                None => {
                    return Err(CompileError::UnknownIdentifier {
                        name: name.to_string(),
                        span: cast_token.span,
                    })
                }
            },
        };
        if children.len() < 2 {
            return Err(internal("cast without operand".to_string()));
        }
        let operand_type = self.lower_chain(&children[1..], out)?;

        match find_cast(self.registry, &operand_type, &target) {
            Some(Some(conv)) => out.push(Instr::Call(conv)),
            Some(None) => {}
            None => {
                return Err(CompileError::NoExplicitConversion {
                    from: self.registry.display_type(&operand_type),
                    to: self.registry.display_type(&target),
                    span: cast_token.span,
                })
            }
        }
        Ok(target)
    }

    // =====================================================================
    // Members, calls, indexing, construction
    // =====================================================================

    /// Lower a `.name` access. Returns the new chain state and whether
    /// the following argument list was consumed as a method call.
    fn lower_member(
        &self,
        receiver: Chain,
        member: &Token,
        next: Option<&Token>,
        next_is_call: bool,
        out: &mut Vec<Instr>,
    ) -> Result<(Chain, bool), CompileError> {
        let Some(name) = member.ident() else {
            return Err(internal("member without name".to_string()));
        };

        match receiver {
            Chain::Marker(hash, _) => {
                let def = self
                    .registry
                    .get_type(hash)
                    .ok_or_else(|| internal("unregistered type marker".to_string()))?;
                self.lower_static_member(def, name, member, next, next_is_call, out)
            }
            Chain::Value(receiver_type) => {
                self.lower_instance_member(receiver_type, name, member, next, next_is_call, out)
            }
        }
    }

    fn lower_static_member(
        &self,
        def: &TypeDef,
        name: &str,
        member: &Token,
        next: Option<&Token>,
        next_is_call: bool,
        out: &mut Vec<Instr>,
    ) -> Result<(Chain, bool), CompileError> {
        if next_is_call {
            let Some(function_token) = next else {
                return Err(internal("call without argument list".to_string()));
            };
            let (arg_flows, arg_types) = self.lower_arguments(function_token)?;
            let Some(method) = def.find_method(name, true, &arg_types) else {
                return Err(CompileError::MethodNotFound {
                    name: format!("{}.{name}", def.name),
                    args: self.registry.display_types(&arg_types),
                    span: member.span,
                });
            };
            self.reject_void(method, member.span)?;
            for arg_flow in arg_flows {
                out.extend(arg_flow);
            }
            let ret = method.ret.clone();
            out.push(Instr::Call(method_callable(method)));
            return Ok((Chain::Value(ret), true));
        }

        // Static properties compile to a bare getter call; they are
        // values, not places.
        if let Some(prop) = def.find_property(name, true) {
            let getter = Callable::host(
                prop.name.clone(),
                Vec::new(),
                prop.data_type.clone(),
                prop.get.clone(),
            );
            out.push(Instr::Call(Arc::new(getter)));
            return Ok((Chain::Value(prop.data_type.clone()), false));
        }

        Err(CompileError::MethodNotFound {
            name: format!("{}.{name}", def.name),
            args: String::new(),
            span: member.span,
        })
    }

    fn lower_instance_member(
        &self,
        receiver_type: DataType,
        name: &str,
        member: &Token,
        next: Option<&Token>,
        next_is_call: bool,
        out: &mut Vec<Instr>,
    ) -> Result<(Chain, bool), CompileError> {
        let type_def = match &receiver_type {
            DataType::Object(hash) => self.registry.get_type(*hash),
            _ => None,
        };

        if next_is_call {
            let Some(function_token) = next else {
                return Err(internal("call without argument list".to_string()));
            };
            let (arg_flows, arg_types) = self.lower_arguments(function_token)?;
            let mut full_types = Vec::with_capacity(arg_types.len() + 1);
            full_types.push(receiver_type.clone());
            full_types.extend(arg_types.iter().cloned());

            // Instance methods, then extension methods on the receiver.
            let method = type_def
                .and_then(|def| def.find_method(name, false, &full_types))
                .or_else(|| self.find_extension(name, &full_types));
            if let Some(method) = method {
                self.reject_void(method, member.span)?;
                for arg_flow in arg_flows {
                    out.extend(arg_flow);
                }
                let ret = method.ret.clone();
                out.push(Instr::Call(method_callable(method)));
                return Ok((Chain::Value(ret), true));
            }

            // A property of callable type still allows `.f(args)`: the
            // place is read and the call dispatches through the value.
            if let Some(prop) = type_def.and_then(|def| def.find_property(name, false)) {
                out.push(Instr::MemberPlace(prop.clone()));
                return Ok((Chain::Value(prop.data_type.clone()), false));
            }

            return Err(CompileError::MethodNotFound {
                name: name.to_string(),
                args: self.registry.display_types(&full_types),
                span: member.span,
            });
        }

        if let Some(prop) = type_def.and_then(|def| def.find_property(name, false)) {
            out.push(Instr::MemberPlace(prop.clone()));
            return Ok((Chain::Value(prop.data_type.clone()), false));
        }

        Err(CompileError::MethodNotFound {
            name: name.to_string(),
            args: self.registry.display_types(&[receiver_type]),
            span: member.span,
        })
    }

    fn find_extension(&self, name: &str, full_types: &[DataType]) -> Option<&Arc<MethodDef>> {
        self.registry
            .extension_candidates(name)
            .iter()
            .find(|m| m.params == full_types)
    }

    /// A call through a host-function value already on the stack.
    fn lower_delegate_call(
        &self,
        callee: Chain,
        function_token: &Token,
        out: &mut Vec<Instr>,
    ) -> Result<DataType, CompileError> {
        let callee_type = self.expect_value(callee)?;
        let DataType::Callable { params, ret } = callee_type else {
            return Err(CompileError::MethodNotFound {
                name: "invoke".to_string(),
                args: self.registry.display_type(&callee_type),
                span: function_token.span,
            });
        };
        self.lower_delegate_args("invoke", &params, function_token, out)?;
        Ok(*ret)
    }

    /// Compile a delegate's arguments against its signature and emit the
    /// `RunDelegate`.
    fn lower_delegate_args(
        &self,
        name: &str,
        params: &[DataType],
        function_token: &Token,
        out: &mut Vec<Instr>,
    ) -> Result<(), CompileError> {
        let (arg_flows, arg_types) = self.lower_arguments(function_token)?;
        let Some(conversions) = match_signature(self.registry, params, &arg_types) else {
            return Err(CompileError::MethodNotFound {
                name: name.to_string(),
                args: self.registry.display_types(&arg_types),
                span: function_token.span,
            });
        };
        for (arg_flow, conversion) in arg_flows.into_iter().zip(conversions) {
            out.extend(arg_flow);
            if let Some(conv) = conversion {
                out.push(Instr::Call(conv));
            }
        }
        out.push(Instr::RunDelegate(arg_types.len()));
        Ok(())
    }

    fn lower_index(
        &self,
        subject: Chain,
        index_token: &Token,
        out: &mut Vec<Instr>,
    ) -> Result<DataType, CompileError> {
        let subject_type = self.expect_value(subject)?;
        let (arg_flows, arg_types) = self.lower_arguments(index_token)?;

        match &subject_type {
            DataType::Array { elem, rank } => {
                let int_params = vec![DataType::Int; *rank];
                let Some(conversions) =
                    match_signature(self.registry, &int_params, &arg_types)
                else {
                    return Err(CompileError::MethodNotFound {
                        name: "get_Item".to_string(),
                        args: self.registry.display_types(&arg_types),
                        span: index_token.span,
                    });
                };
                for (arg_flow, conversion) in arg_flows.into_iter().zip(conversions) {
                    out.extend(arg_flow);
                    if let Some(conv) = conversion {
                        out.push(Instr::Call(conv));
                    }
                }
                out.push(Instr::IndexPlace {
                    accessor: IndexAccessor::Array,
                    arity: *rank,
                });
                Ok((**elem).clone())
            }
            DataType::Object(hash) => {
                let indexer = self
                    .registry
                    .get_type(*hash)
                    .and_then(|def| def.indexer())
                    .cloned();
                let Some(indexer) = indexer else {
                    return Err(CompileError::MethodNotFound {
                        name: "get_Item".to_string(),
                        args: self.registry.display_types(&arg_types),
                        span: index_token.span,
                    });
                };
                let Some(conversions) =
                    match_signature(self.registry, &indexer.params, &arg_types)
                else {
                    return Err(CompileError::MethodNotFound {
                        name: "get_Item".to_string(),
                        args: self.registry.display_types(&arg_types),
                        span: index_token.span,
                    });
                };
                for (arg_flow, conversion) in arg_flows.into_iter().zip(conversions) {
                    out.extend(arg_flow);
                    if let Some(conv) = conversion {
                        out.push(Instr::Call(conv));
                    }
                }
                let elem = indexer.elem.clone();
                out.push(Instr::IndexPlace {
                    accessor: IndexAccessor::Indexer(indexer),
                    arity: arg_types.len(),
                });
                Ok(elem)
            }
            other => Err(CompileError::MethodNotFound {
                name: "get_Item".to_string(),
                args: self.registry.display_type(other),
                span: index_token.span,
            }),
        }
    }

    fn lower_constructor(
        &self,
        token: &Token,
        out: &mut Vec<Instr>,
    ) -> Result<DataType, CompileError> {
        let Some(name) = token.ident() else {
            return Err(internal("constructor without type name".to_string()));
        };
        let Some(hash) = self.registry.type_by_name(name) else {
            return Err(CompileError::UnknownIdentifier {
                name: name.to_string(),
                span: token.span,
            });
        };
        let def = self
            .registry
            .get_type(hash)
            .ok_or_else(|| internal("type registered without definition".to_string()))?;

        let (arg_flows, arg_types) = self.lower_arguments(token)?;
        let Some(ctor) = def.find_constructor(&arg_types) else {
            return Err(CompileError::MethodNotFound {
                name: format!("new {name}"),
                args: self.registry.display_types(&arg_types),
                span: token.span,
            });
        };
        for arg_flow in arg_flows {
            out.extend(arg_flow);
        }
        out.push(Instr::Construct(ctor.clone()));
        Ok(DataType::Object(hash))
    }

    // =====================================================================
    // Helpers
    // =====================================================================

    /// Compile each child of an argument-list token into its own flow.
    fn lower_arguments(
        &self,
        token: &Token,
    ) -> Result<(Vec<Vec<Instr>>, Vec<DataType>), CompileError> {
        let mut flows = Vec::with_capacity(token.children.len());
        let mut types = Vec::with_capacity(token.children.len());
        for child in &token.children {
            let mut arg_flow = Vec::new();
            types.push(self.lower(child, &mut arg_flow)?);
            flows.push(arg_flow);
        }
        Ok((flows, types))
    }

    fn reject_void(&self, method: &MethodDef, span: Span) -> Result<(), CompileError> {
        if method.ret == DataType::Void {
            return Err(CompileError::VoidMethodNotSupported {
                name: method.name.clone(),
                span,
            });
        }
        Ok(())
    }

    fn expect_value(&self, chain: Chain) -> Result<DataType, CompileError> {
        match chain {
            Chain::Value(data_type) => Ok(data_type),
            Chain::Marker(hash, span) => Err(self.dangling_type(hash, span)),
        }
    }

    fn dangling_type(&self, hash: TypeHash, span: Span) -> CompileError {
        let name = self
            .registry
            .type_name(hash)
            .unwrap_or("<type>")
            .to_string();
        CompileError::UnknownIdentifier { name, span }
    }
}

fn internal(message: String) -> CompileError {
    CompileError::Internal { message }
}
