//! Overload resolution and implicit-conversion search.
//!
//! Resolution order, per operator or call:
//!
//! 1. Exact match: the builtin table, then a static method of that name
//!    registered on the first argument's type.
//! 2. On a miss, enumerate candidate implicit conversions per argument
//!    (builtin `op_Implicit` entries plus host-declared implicit
//!    conversions on the argument's type), form the cartesian product
//!    with identity first for every argument, and re-run step 1 on each
//!    combination. The first hit wins and its conversions are inserted
//!    into the flow before the converted arguments.
//!
//! The product walk is bounded; conversion lists are short, so the bound
//! only guards pathological registries.

use std::sync::Arc;

use crate::error::CompileError;
use crate::registry::{ConversionDef, HostRegistry, MethodDef};
use crate::span::Span;
use crate::types::DataType;

use super::flow::Callable;
use super::ops::builtins;

/// Upper bound on examined conversion combinations per resolution.
const MAX_CONVERSION_COMBOS: usize = 64;

/// A resolved callable plus the per-argument conversions (identity where
/// `None`) that make the argument types line up.
#[derive(Debug)]
pub(crate) struct Resolution {
    pub callable: Arc<Callable>,
    pub conversions: Vec<Option<Arc<Callable>>>,
}

/// Resolve `name` over the given argument types, inserting implicit
/// conversions if no overload matches exactly.
pub(crate) fn resolve_operator(
    registry: &HostRegistry,
    name: &str,
    args: &[DataType],
    span: Span,
) -> Result<Resolution, CompileError> {
    if let Some(callable) = find_exact(registry, name, args) {
        return Ok(Resolution {
            callable,
            conversions: vec![None; args.len()],
        });
    }

    let lists: Vec<Vec<Option<Arc<Callable>>>> =
        args.iter().map(|a| conversion_candidates(registry, a)).collect();

    // Mixed-radix walk, last argument varying fastest; identity (index 0)
    // first for every argument. The all-identity combination was step 1.
    let mut counters = vec![0usize; args.len()];
    let mut examined = 0usize;
    while advance(&mut counters, &lists) {
        examined += 1;
        if examined > MAX_CONVERSION_COMBOS {
            break;
        }
        let converted: Vec<DataType> = counters
            .iter()
            .zip(&lists)
            .zip(args)
            .map(|((&i, list), arg)| match &list[i] {
                Some(conv) => conv.ret().clone(),
                None => arg.clone(),
            })
            .collect();
        if let Some(callable) = find_exact(registry, name, &converted) {
            let conversions = counters
                .iter()
                .zip(&lists)
                .map(|(&i, list)| list[i].clone())
                .collect();
            return Ok(Resolution {
                callable,
                conversions,
            });
        }
    }

    Err(CompileError::MethodNotFound {
        name: name.to_string(),
        args: registry.display_types(args),
        span,
    })
}

/// Match a fixed signature (delegate call, indexer): each argument must
/// equal its parameter or admit a single implicit conversion to it.
pub(crate) fn match_signature(
    registry: &HostRegistry,
    params: &[DataType],
    args: &[DataType],
) -> Option<Vec<Option<Arc<Callable>>>> {
    if params.len() != args.len() {
        return None;
    }
    let mut conversions = Vec::with_capacity(args.len());
    for (param, arg) in params.iter().zip(args) {
        if param == arg {
            conversions.push(None);
            continue;
        }
        if let Some(conv) = builtins().find_conversion("op_Implicit", arg, param) {
            conversions.push(Some(conv));
            continue;
        }
        if let Some(conv) = host_conversion(registry, arg, param, true) {
            conversions.push(Some(conv));
            continue;
        }
        return None;
    }
    Some(conversions)
}

/// Find a cast path for an explicit conversion: builtin `op_Explicit`,
/// then builtin `op_Implicit`, then host explicit, then host implicit.
/// `None` means no path; `Some(None)` is the identity cast.
#[allow(clippy::option_option)]
pub(crate) fn find_cast(
    registry: &HostRegistry,
    from: &DataType,
    to: &DataType,
) -> Option<Option<Arc<Callable>>> {
    if from == to {
        return Some(None);
    }
    builtins()
        .find_conversion("op_Explicit", from, to)
        .or_else(|| builtins().find_conversion("op_Implicit", from, to))
        .or_else(|| host_conversion(registry, from, to, false))
        .map(Some)
}

/// Wrap a registered method as a callable the VM can invoke.
pub(crate) fn method_callable(method: &Arc<MethodDef>) -> Arc<Callable> {
    Arc::new(Callable::host(
        method.name.clone(),
        method.params.clone(),
        method.ret.clone(),
        method.invoke.clone(),
    ))
}

fn conversion_candidates(
    registry: &HostRegistry,
    arg: &DataType,
) -> Vec<Option<Arc<Callable>>> {
    let mut list: Vec<Option<Arc<Callable>>> = vec![None];
    for conv in builtins().implicit_from(arg) {
        list.push(Some(conv));
    }
    if let DataType::Object(hash) = arg {
        if let Some(def) = registry.get_type(*hash) {
            for conv in def.conversions(true) {
                list.push(Some(conversion_callable(arg, conv, true)));
            }
        }
    }
    list
}

fn host_conversion(
    registry: &HostRegistry,
    from: &DataType,
    to: &DataType,
    implicit_only: bool,
) -> Option<Arc<Callable>> {
    let DataType::Object(hash) = from else {
        return None;
    };
    let def = registry.get_type(*hash)?;
    // Explicit casts may also ride an implicit declaration.
    let conv = def
        .conversion_to(to, false)
        .filter(|c| c.implicit || !implicit_only)?;
    Some(conversion_callable(from, conv, conv.implicit))
}

fn conversion_callable(
    from: &DataType,
    conv: &Arc<ConversionDef>,
    implicit: bool,
) -> Arc<Callable> {
    let name = if implicit { "op_Implicit" } else { "op_Explicit" };
    Arc::new(Callable::host(
        name,
        vec![from.clone()],
        conv.to.clone(),
        conv.convert.clone(),
    ))
}

/// Exact-match lookup: builtin table first, then static methods on the
/// first argument's registered type.
fn find_exact(registry: &HostRegistry, name: &str, args: &[DataType]) -> Option<Arc<Callable>> {
    if let Some(callable) = builtins().find_exact(name, args) {
        return Some(callable);
    }
    let DataType::Object(hash) = args.first()? else {
        return None;
    };
    let def = registry.get_type(*hash)?;
    def.find_method(name, true, args).map(method_callable)
}

/// Advance the mixed-radix counters; the last argument varies fastest.
/// Returns false once every combination has been produced.
fn advance(counters: &mut [usize], lists: &[Vec<Option<Arc<Callable>>>]) -> bool {
    for k in (0..counters.len()).rev() {
        counters[k] += 1;
        if counters[k] < lists[k].len() {
            return true;
        }
        counters[k] = 0;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::new(0, 1)
    }

    #[test]
    fn exact_match_has_identity_conversions() {
        let registry = HostRegistry::new();
        let r = resolve_operator(
            &registry,
            "op_Addition",
            &[DataType::Int, DataType::Int],
            span(),
        )
        .unwrap();
        assert_eq!(r.callable.ret(), &DataType::Int);
        assert!(r.conversions.iter().all(Option::is_none));
    }

    #[test]
    fn mixed_numeric_widens_right_argument() {
        let registry = HostRegistry::new();
        let r = resolve_operator(
            &registry,
            "op_Subtraction",
            &[DataType::Float, DataType::Int],
            span(),
        )
        .unwrap();
        assert_eq!(r.callable.ret(), &DataType::Float);
        assert!(r.conversions[0].is_none());
        let conv = r.conversions[1].as_ref().unwrap();
        assert_eq!(conv.ret(), &DataType::Float);
    }

    #[test]
    fn string_concat_converts_int_operand() {
        let registry = HostRegistry::new();
        let r = resolve_operator(
            &registry,
            "op_Addition",
            &[DataType::Str, DataType::Int],
            span(),
        )
        .unwrap();
        assert_eq!(r.callable.ret(), &DataType::Str);
        assert_eq!(r.conversions[1].as_ref().unwrap().ret(), &DataType::Str);
    }

    #[test]
    fn bool_plus_int_does_not_resolve() {
        let registry = HostRegistry::new();
        let err = resolve_operator(
            &registry,
            "op_Addition",
            &[DataType::Bool, DataType::Int],
            span(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::MethodNotFound { .. }));
    }

    #[test]
    fn identity_first_prefers_unconverted_overload() {
        // (int, int) with a comparison: the exact overload wins before
        // any widening is considered.
        let registry = HostRegistry::new();
        let r = resolve_operator(
            &registry,
            "op_LessThan",
            &[DataType::Int, DataType::Int],
            span(),
        )
        .unwrap();
        assert!(r.conversions.iter().all(Option::is_none));
    }

    #[test]
    fn signature_match_inserts_conversions() {
        let registry = HostRegistry::new();
        let convs = match_signature(
            &registry,
            &[DataType::Float, DataType::Str],
            &[DataType::Int, DataType::Str],
        )
        .unwrap();
        assert!(convs[0].is_some());
        assert!(convs[1].is_none());

        assert!(match_signature(&registry, &[DataType::Bool], &[DataType::Int]).is_none());
        assert!(match_signature(&registry, &[DataType::Int], &[]).is_none());
    }

    #[test]
    fn cast_paths() {
        let registry = HostRegistry::new();
        // Identity.
        assert!(find_cast(&registry, &DataType::Int, &DataType::Int)
            .unwrap()
            .is_none());
        // Explicit table.
        assert!(find_cast(&registry, &DataType::Float, &DataType::Int)
            .unwrap()
            .is_some());
        // Implicit fallback.
        assert!(find_cast(&registry, &DataType::Int, &DataType::Float)
            .unwrap()
            .is_some());
        // No path.
        assert!(find_cast(&registry, &DataType::Bool, &DataType::Int).is_none());
    }
}
