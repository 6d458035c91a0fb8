use core::cell::RefCell;
use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use super::function::CallingContext;
use super::registry::FunctionRegistry;
use crate::xdm::{ExpandedName, Item, Sequence};

/// Error codes emitted by the engine. W3C codes keep their XPath meaning; the
/// `MP` codes are engine specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FOAR0001, // divide by zero
    FOAR0002, // numeric overflow
    FOCA0001, // value out of range for cast
    FODT0002, // duration overflow
    FOER0000, // unidentified error
    FORG0001, // invalid lexical form / cast failure
    FORG0003, // zero-or-one violated
    FORG0004, // one-or-more violated
    FORG0005, // exactly-one violated
    FORG0006, // invalid argument type (effective boolean value)
    FORX0001, // invalid regex flags
    FORX0002, // invalid regex
    FOTY0012, // node has no typed value
    XPDY0002, // context item absent
    XPDY0050, // `/` in a tree whose root is not a document
    XPST0008, // undeclared variable
    XPST0017, // unknown function or wrong arity
    XPTY0004, // type mismatch
    XPTY0019, // path step applied to an atomic value
    XPTY0020, // axis step with a non-node context item
    MPST0001, // constraint attached to an incompatible definition
    MPDY0001, // failure inside a function handler
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        use ErrorCode::*;
        match self {
            FOAR0001 => "FOAR0001",
            FOAR0002 => "FOAR0002",
            FOCA0001 => "FOCA0001",
            FODT0002 => "FODT0002",
            FOER0000 => "FOER0000",
            FORG0001 => "FORG0001",
            FORG0003 => "FORG0003",
            FORG0004 => "FORG0004",
            FORG0005 => "FORG0005",
            FORG0006 => "FORG0006",
            FORX0001 => "FORX0001",
            FORX0002 => "FORX0002",
            FOTY0012 => "FOTY0012",
            XPDY0002 => "XPDY0002",
            XPDY0050 => "XPDY0050",
            XPST0008 => "XPST0008",
            XPST0017 => "XPST0017",
            XPTY0004 => "XPTY0004",
            XPTY0019 => "XPTY0019",
            XPTY0020 => "XPTY0020",
            MPST0001 => "MPST0001",
            MPDY0001 => "MPDY0001",
        }
    }

    pub fn kind(self) -> ErrorKind {
        use ErrorCode::*;
        match self {
            FORG0001 | FOCA0001 | FODT0002 => ErrorKind::Cast,
            XPTY0004 | XPTY0019 | XPTY0020 | XPDY0050 | FORG0003 | FORG0004 | FORG0005
            | FORG0006 | FOTY0012 => ErrorKind::TypeMismatch,
            XPST0017 => ErrorKind::Arity,
            MPST0001 => ErrorKind::UnsupportedTarget,
            _ => ErrorKind::Evaluation,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "err:{}", self.as_str())
    }
}

/// Broad classification of an [`Error`] by its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A value cannot be converted to the requested type.
    Cast,
    /// Item type or cardinality does not match what is required.
    TypeMismatch,
    /// Wrong number of arguments for a function.
    Arity,
    /// A constraint was attached to a definition kind it does not support.
    UnsupportedTarget,
    /// Any other failure while evaluating.
    Evaluation,
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    /// Signature of the function the error surfaced through, if any.
    pub function: Option<String>,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            function: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Compose an error with a source cause.
    pub fn with_source(
        mut self,
        source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>,
    ) -> Self {
        self.source = source.into();
        self
    }

    /// Record the function signature the error passed through. The innermost
    /// signature wins; the code is never changed.
    pub fn in_function(mut self, signature: impl Into<String>) -> Self {
        if self.function.is_none() {
            self.function = Some(signature.into());
        }
        self
    }
}

impl From<fancy_regex::Error> for Error {
    fn from(e: fancy_regex::Error) -> Self {
        Error::from_code(ErrorCode::FORX0002, "regex error")
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(sig) => write!(f, "error: {} ({}) in {}", self.message, self.code, sig),
            None => write!(f, "error: {} ({})", self.message, self.code),
        }
    }
}

/// The context item together with its position in the sequence being iterated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Focus {
    pub item: Item,
    /// 1-based.
    pub position: usize,
    pub size: usize,
}

impl Focus {
    pub fn new(item: impl Into<Item>) -> Self {
        Self {
            item: item.into(),
            position: 1,
            size: 1,
        }
    }

    pub fn at(item: Item, position: usize, size: usize) -> Self {
        Self {
            item,
            position,
            size,
        }
    }
}

/// Compile-time settings shared by every evaluation under a dynamic context.
#[derive(Debug, Clone)]
pub struct StaticContext {
    /// Fallback for `fn:base-uri` on nodes that carry no base URI of their own.
    pub base_uri: Option<String>,
    /// Namespace applied to unqualified function names.
    pub default_function_namespace: Option<String>,
}

impl Default for StaticContext {
    fn default() -> Self {
        Self {
            base_uri: None,
            default_function_namespace: Some(crate::consts::FNS.to_string()),
        }
    }
}

/// Builder for `StaticContext`.
pub struct StaticContextBuilder {
    ctx: StaticContext,
}

impl Default for StaticContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: StaticContext::default(),
        }
    }

    pub fn with_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.ctx.base_uri = Some(uri.into());
        self
    }

    pub fn with_default_function_namespace(mut self, uri: impl Into<String>) -> Self {
        self.ctx.default_function_namespace = Some(uri.into());
        self
    }

    pub fn build(self) -> StaticContext {
        self.ctx
    }
}

type ResultCache = RefCell<HashMap<CallingContext, Sequence>>;

/// State for one evaluation session: the function registry, variable bindings and
/// the function-result cache.
///
/// The cache uses interior mutability without locking, so a context can move
/// between threads but not be shared by them. Use one context per thread.
pub struct DynamicContext {
    pub functions: Arc<FunctionRegistry>,
    pub static_ctx: StaticContext,
    pub variables: HashMap<ExpandedName, Sequence>,
    pub now: Option<DateTime<FixedOffset>>,
    cache: Option<ResultCache>,
}

impl Default for DynamicContext {
    fn default() -> Self {
        Self {
            functions: crate::engine::functions::default_function_registry(),
            static_ctx: StaticContext::default(),
            variables: HashMap::new(),
            now: None,
            cache: Some(RefCell::new(HashMap::new())),
        }
    }
}

impl DynamicContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable(&self, name: &ExpandedName) -> Option<&Sequence> {
        self.variables.get(name)
    }

    pub fn current_date_time(&self) -> DateTime<FixedOffset> {
        self.now
            .unwrap_or_else(|| chrono::Utc::now().fixed_offset())
    }

    pub fn is_caching(&self) -> bool {
        self.cache.is_some()
    }

    pub(crate) fn cached_result(&self, key: &CallingContext) -> Option<Sequence> {
        self.cache
            .as_ref()
            .and_then(|c| c.borrow().get(key).cloned())
    }

    pub(crate) fn cache_result(&self, key: CallingContext, result: Sequence) {
        if let Some(c) = &self.cache {
            c.borrow_mut().insert(key, result);
        }
    }

    /// Number of entries in the function-result cache.
    pub fn cached_len(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.borrow().len())
    }

    pub fn clear_cache(&self) {
        if let Some(c) = &self.cache {
            c.borrow_mut().clear();
        }
    }
}

pub struct DynamicContextBuilder {
    ctx: DynamicContext,
}

impl Default for DynamicContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: DynamicContext::default(),
        }
    }

    pub fn with_functions(mut self, reg: Arc<FunctionRegistry>) -> Self {
        self.ctx.functions = reg;
        self
    }

    pub fn with_static_context(mut self, static_ctx: StaticContext) -> Self {
        self.ctx.static_ctx = static_ctx;
        self
    }

    pub fn with_variable(mut self, name: ExpandedName, value: impl Into<Sequence>) -> Self {
        self.ctx.variables.insert(name, value.into());
        self
    }

    // Fixed 'now' for deterministic date/time functions
    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.ctx.now = Some(now);
        self
    }

    /// Enable or disable the function-result cache (enabled by default).
    pub fn with_function_cache(mut self, enabled: bool) -> Self {
        self.ctx.cache = enabled.then(|| RefCell::new(HashMap::new()));
        self
    }

    pub fn build(self) -> DynamicContext {
        self.ctx
    }
}

/// What a function handler sees: the session context and the focus at the call site.
pub struct CallCtx<'a> {
    pub dyn_ctx: &'a DynamicContext,
    pub focus: Option<&'a Focus>,
}

impl CallCtx<'_> {
    /// The context item, or `XPDY0002` when there is none.
    pub fn context_item(&self) -> Result<&Item, Error> {
        self.focus.map(|f| &f.item).ok_or_else(|| {
            Error::from_code(ErrorCode::XPDY0002, "context item is absent")
        })
    }
}
