use std::collections::HashMap;
use std::sync::Arc;

use super::function::Function;
use crate::xdm::ExpandedName;

pub type Arity = usize;

/// Error type returned by function resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No function with the name exists.
    Unknown(ExpandedName),
    /// Function exists, but not for the requested arity. Lists the minimum arity of each overload.
    WrongArity {
        name: ExpandedName,
        available: Vec<Arity>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("function {name} is already registered for an overlapping arity ({arity})")]
    Ambiguous { name: ExpandedName, arity: Arity },
}

/// Functions by expanded name. Each name may carry several overloads as long as no
/// two of them accept the same argument count.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    fns: HashMap<ExpandedName, Vec<Arc<Function>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, function: Arc<Function>) -> Result<(), RegistryError> {
        let overloads = self.fns.entry(function.name().clone()).or_default();
        if let Some(clash) = overloads.iter().find(|f| overlaps(f, &function)) {
            return Err(RegistryError::Ambiguous {
                name: function.name().clone(),
                arity: clash.min_arity().max(function.min_arity()),
            });
        }
        tracing::trace!(
            function = %function.name(),
            arity = function.min_arity(),
            unbounded = function.is_unbounded(),
            "registered function"
        );
        overloads.push(function);
        // exact arities first so they win over an unbounded overload
        overloads.sort_by_key(|f| (f.is_unbounded(), f.min_arity()));
        Ok(())
    }

    pub fn resolve(&self, name: &ExpandedName, arity: Arity) -> Result<&Arc<Function>, ResolveError> {
        let Some(overloads) = self.fns.get(name) else {
            return Err(ResolveError::Unknown(name.clone()));
        };
        overloads
            .iter()
            .find(|f| f.accepts_arity(arity))
            .ok_or_else(|| ResolveError::WrongArity {
                name: name.clone(),
                available: overloads.iter().map(|f| f.min_arity()).collect(),
            })
    }

    pub fn contains(&self, name: &ExpandedName) -> bool {
        self.fns.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fns.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }

    pub fn functions(&self) -> impl Iterator<Item = &Arc<Function>> {
        self.fns.values().flatten()
    }
}

fn overlaps(a: &Function, b: &Function) -> bool {
    match (a.is_unbounded(), b.is_unbounded()) {
        (false, false) => a.min_arity() == b.min_arity(),
        (true, true) => true,
        (true, false) => b.min_arity() >= a.min_arity(),
        (false, true) => a.min_arity() >= b.min_arity(),
    }
}
