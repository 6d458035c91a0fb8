//! Well-known namespace URIs used across the engine.

/// Namespace of the built-in function library.
pub const FNS: &str = "http://csrc.nist.gov/ns/metaschema/metapath-functions";
/// Namespace of the Metaschema datatypes (the `xs:`-equivalent for this engine).
pub const MP: &str = "http://csrc.nist.gov/ns/metaschema/metapath";
