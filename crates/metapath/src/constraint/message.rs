use core::fmt;

use itertools::Itertools;

use crate::ast::MetapathExpression;
use crate::engine::functions::build_regex;
use crate::engine::runtime::{DynamicContext, Error};
use crate::xdm::Item;

/// Matches `{ expr }` unless the opening brace is escaped as `\{`. A `\}` inside
/// the braces does not close the snippet.
const PLACEHOLDER: &str = r"(?<!\\)\{\s*((?:\\\}|[^}])*)\s*\}";

/// Compiles Metapath source text. Supplied by whoever loads constraints; the
/// grammar lives outside this crate.
pub trait MetapathCompiler {
    fn compile(&self, source: &str) -> Result<MetapathExpression, Error>;
}

impl<F> MetapathCompiler for F
where
    F: Fn(&str) -> Result<MetapathExpression, Error>,
{
    fn compile(&self, source: &str) -> Result<MetapathExpression, Error> {
        self(source)
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Expr(MetapathExpression),
}

/// A constraint message with embedded `{ expr }` snippets, tokenized when loaded.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl MessageTemplate {
    pub fn parse(template: &str, compiler: &dyn MetapathCompiler) -> Result<Self, Error> {
        let re = build_regex(PLACEHOLDER, "")?;
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in re.captures_iter(template) {
            let caps = caps?;
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Text(unescape(&template[last..whole.start()])));
            }
            let snippet = inner.as_str().trim().replace("\\}", "}");
            segments.push(Segment::Expr(compiler.compile(&snippet)?));
            last = whole.end();
        }
        if last < template.len() {
            segments.push(Segment::Text(unescape(&template[last..])));
        }
        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    /// A template without snippets.
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            segments: vec![Segment::Text(text.clone())],
            source: text,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of `{ expr }` snippets.
    pub fn snippet_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Expr(_)))
            .count()
    }

    /// Evaluate each snippet at `item` and splice in its string value. Multiple
    /// result items are joined with ", ".
    pub fn render(&self, item: &Item, ctx: &DynamicContext) -> Result<String, Error> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Expr(e) => {
                    let result = e.evaluate_at(item.clone(), ctx)?;
                    out.push_str(&result.iter().map(string_of).join(", "));
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for MessageTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn string_of(item: &Item) -> String {
    match item {
        Item::Node(n) => n.string_value(),
        Item::Atomic(a) => a.as_string(),
    }
}

fn unescape(text: &str) -> String {
    text.replace("\\{", "{")
}
