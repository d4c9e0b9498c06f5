//! Target expression language.
//!
//! Render targets are nested function calls over dotted metric paths, e.g.
//! `scale(sumSeries(servers.*.cpu), 0.5)`. Parsing is pure; turning the
//! syntax tree into an executable [`crate::target::Target`] happens in the
//! materializer.

mod error;
mod parser;

use std::fmt;

pub use error::ParseError;
pub use parser::parse;

/// Parsed, not yet validated, target expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxTree {
    Call { name: String, args: Vec<SyntaxTree> },
    Path(String),
    Number(f64),
    String(String),
    Bool(bool),
}

impl SyntaxTree {
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            SyntaxTree::Number(_) | SyntaxTree::String(_) | SyntaxTree::Bool(_)
        )
    }
}

/// Writes `value` in its shortest round-trip form (`2`, `0.5`, `-1e-7`).
pub(crate) fn write_number(f: &mut impl fmt::Write, value: f64) -> fmt::Result {
    write!(f, "{value}")
}

/// Writes `value` double-quoted with `"` and `\` escaped.
pub(crate) fn write_quoted(f: &mut impl fmt::Write, value: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in value.chars() {
        if c == '"' || c == '\\' {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    f.write_char('"')
}

impl fmt::Display for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxTree::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            SyntaxTree::Path(path) => f.write_str(path),
            SyntaxTree::Number(value) => write_number(f, *value),
            SyntaxTree::String(value) => write_quoted(f, value),
            SyntaxTree::Bool(value) => write!(f, "{value}"),
        }
    }
}
