use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use smallvec::SmallVec;

use super::runtime::{CallCtx, DynamicContext, Error, ErrorCode, Focus};
use super::signature::{Argument, ItemType, Occurrence, SequenceType};
use crate::xdm::{ExpandedName, Item, Sequence};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FunctionProperties: u8 {
        /// Equal arguments (and focus, when focus dependent) give equal results.
        const DETERMINISTIC = 1 << 0;
        /// Reads the dynamic context (current time, variables).
        const CONTEXT_DEPENDENT = 1 << 1;
        /// Reads the context item.
        const FOCUS_DEPENDENT = 1 << 2;
        /// The last declared argument repeats.
        const UNBOUNDED_ARITY = 1 << 3;
    }
}

pub type FunctionHandler =
    Arc<dyn Fn(&CallCtx, &[Sequence]) -> Result<Sequence, Error> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FunctionBuildError {
    #[error("missing name")]
    MissingName,
    #[error("function '{0}' has no handler")]
    MissingHandler(String),
    #[error("argument '{argument}' has no occurrence")]
    MissingOccurrence { argument: String },
    #[error("function '{0}' has unbounded arity but declares no arguments")]
    UnboundedWithoutArguments(String),
    #[error("function '{0}' has no result type")]
    MissingResultType(String),
}

/// Process-unique identity of a built function. Overloads share a name, never an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u64);

impl FunctionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        FunctionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// An immutable, named function with a declared signature.
pub struct Function {
    id: FunctionId,
    name: ExpandedName,
    arguments: SmallVec<[Argument; 4]>,
    result: SequenceType,
    properties: FunctionProperties,
    handler: FunctionHandler,
}

impl Function {
    pub fn builder() -> FunctionBuilder {
        FunctionBuilder::default()
    }

    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn name(&self) -> &ExpandedName {
        &self.name
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn result_type(&self) -> SequenceType {
        self.result
    }

    pub fn properties(&self) -> FunctionProperties {
        self.properties
    }

    pub fn is_deterministic(&self) -> bool {
        self.properties.contains(FunctionProperties::DETERMINISTIC)
    }

    pub fn is_focus_dependent(&self) -> bool {
        self.properties.contains(FunctionProperties::FOCUS_DEPENDENT)
    }

    pub fn is_unbounded(&self) -> bool {
        self.properties.contains(FunctionProperties::UNBOUNDED_ARITY)
    }

    /// Smallest accepted argument count; the largest is unbounded or equal to it.
    pub fn min_arity(&self) -> usize {
        self.arguments.len()
    }

    pub fn accepts_arity(&self, arity: usize) -> bool {
        if self.is_unbounded() {
            arity >= self.arguments.len()
        } else {
            arity == self.arguments.len()
        }
    }

    /// Human readable signature, e.g. `fn:substring($source as string?, $start as decimal) as string`.
    pub fn signature(&self) -> String {
        let mut args: Vec<String> = self.arguments.iter().map(ToString::to_string).collect();
        if self.is_unbounded() {
            args.push("...".to_string());
        }
        format!("{}({}) as {}", self.name, args.join(", "), self.result)
    }

    /// Call the function.
    ///
    /// Arguments are converted against the declared signature in order. Results of
    /// deterministic functions are cached in `ctx` keyed by the converted arguments
    /// and, for focus-dependent functions, the context item.
    pub fn execute(
        self: &Arc<Self>,
        args: &[Sequence],
        ctx: &DynamicContext,
        focus: Option<&Focus>,
    ) -> Result<Sequence, Error> {
        let converted = self
            .convert_arguments(args)
            .map_err(|e| e.in_function(self.signature()))?;

        let key = self.is_deterministic().then(|| CallingContext {
            function: Arc::clone(self),
            arguments: converted.clone(),
            focus: if self.is_focus_dependent() {
                focus.map(|f| f.item.clone())
            } else {
                None
            },
        });
        if let Some(key) = &key
            && let Some(hit) = ctx.cached_result(key)
        {
            tracing::trace!(function = %self.name, "function cache hit");
            return Ok(hit);
        }

        let call = CallCtx {
            dyn_ctx: ctx,
            focus,
        };
        let result = (self.handler)(&call, &converted).map_err(|e| e.in_function(self.signature()))?;
        if !self.result.matches(&result) {
            return Err(Error::from_code(
                ErrorCode::MPDY0001,
                format!("result does not match declared type {}", self.result),
            )
            .in_function(self.signature()));
        }

        if let Some(key) = key {
            tracing::trace!(function = %self.name, "function cache miss");
            ctx.cache_result(key, result.clone());
        }
        Ok(result)
    }

    fn convert_arguments(&self, args: &[Sequence]) -> Result<Vec<Sequence>, Error> {
        if !self.accepts_arity(args.len()) {
            return Err(Error::from_code(
                ErrorCode::XPST0017,
                format!(
                    "{} expects {}{} argument(s), got {}",
                    self.name,
                    if self.is_unbounded() { "at least " } else { "" },
                    self.arguments.len(),
                    args.len()
                ),
            ));
        }
        args.iter()
            .enumerate()
            .map(|(i, seq)| {
                let declared = self.arguments.get(i).or_else(|| self.arguments.last()).ok_or_else(|| {
                    Error::from_code(ErrorCode::XPST0017, format!("{} takes no arguments", self.name))
                })?;
                declared.convert(seq)
            })
            .collect()
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Function {}

impl Hash for Function {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("id", &self.id)
            .field("signature", &self.signature())
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Cache key for a function call: the function, its converted arguments and the
/// context item when the function is focus dependent. Equality is structural over
/// the arguments and by identity over the function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallingContext {
    pub function: Arc<Function>,
    pub arguments: Vec<Sequence>,
    pub focus: Option<Item>,
}

pub struct FunctionBuilder {
    name: Option<ExpandedName>,
    arguments: SmallVec<[Argument; 4]>,
    result: Option<SequenceType>,
    properties: FunctionProperties,
    handler: Option<FunctionHandler>,
}

impl Default for FunctionBuilder {
    fn default() -> Self {
        Self {
            name: None,
            arguments: SmallVec::new(),
            result: None,
            properties: FunctionProperties::empty(),
            handler: None,
        }
    }
}

impl FunctionBuilder {
    /// Name in the built-in function namespace.
    pub fn name(self, local: impl Into<String>) -> Self {
        self.qualified_name(ExpandedName::function(local))
    }

    pub fn qualified_name(mut self, name: ExpandedName) -> Self {
        self.name = Some(name);
        self
    }

    pub fn argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn arg(self, name: &str, item: ItemType, occurrence: Occurrence) -> Self {
        self.argument(Argument::new(name, item, occurrence))
    }

    pub fn returns(mut self, item: ItemType, occurrence: Occurrence) -> Self {
        self.result = Some(SequenceType::new(item, occurrence));
        self
    }

    pub fn deterministic(mut self) -> Self {
        self.properties |= FunctionProperties::DETERMINISTIC;
        self
    }

    pub fn context_dependent(mut self) -> Self {
        self.properties |= FunctionProperties::CONTEXT_DEPENDENT;
        self
    }

    pub fn focus_dependent(mut self) -> Self {
        self.properties |= FunctionProperties::FOCUS_DEPENDENT;
        self
    }

    pub fn unbounded_arity(mut self) -> Self {
        self.properties |= FunctionProperties::UNBOUNDED_ARITY;
        self
    }

    pub fn handler<F>(mut self, f: F) -> Self
    where
        F: 'static + Send + Sync + Fn(&CallCtx, &[Sequence]) -> Result<Sequence, Error>,
    {
        self.handler = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Result<Arc<Function>, FunctionBuildError> {
        let name = self.name.ok_or(FunctionBuildError::MissingName)?;
        if self.properties.contains(FunctionProperties::UNBOUNDED_ARITY) && self.arguments.is_empty() {
            return Err(FunctionBuildError::UnboundedWithoutArguments(name.to_string()));
        }
        let result = self
            .result
            .ok_or_else(|| FunctionBuildError::MissingResultType(name.to_string()))?;
        let handler = self
            .handler
            .ok_or_else(|| FunctionBuildError::MissingHandler(name.to_string()))?;
        Ok(Arc::new(Function {
            id: FunctionId::next(),
            name,
            arguments: self.arguments,
            result,
            properties: self.properties,
            handler,
        }))
    }
}
