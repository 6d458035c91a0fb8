pub mod evaluator;
pub mod function;
pub mod functions;
pub mod registry;
pub mod runtime;
pub mod signature;
