//! Executable target model and the materializer that builds it from a
//! syntax tree.

use std::fmt;

use crate::evaluation::EvaluationContext;
use crate::expression::{SyntaxTree, write_number, write_quoted};
use crate::functions::FunctionRegistry;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Bool(bool),
}

/// Leaf selecting every stored series whose path matches `path_pattern`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSelector {
    pub path_pattern: String,
    pub tenant: String,
    pub from: i64,
    pub until: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Target>,
}

/// A materialized target. Its `Display` form is the normalized expression
/// text, which keys the per-request memo cache and names derived series.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    SeriesSelector(SeriesSelector),
    FunctionCall(FunctionCall),
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MaterializeError {
    #[error("Invalid parameter value '{expression}': {cause}")]
    InvalidParameterValue { expression: String, cause: String },
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(value) => write_number(f, *value),
            Literal::String(value) => write_quoted(f, value),
            Literal::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::SeriesSelector(selector) => f.write_str(&selector.path_pattern),
            Target::FunctionCall(call) => write!(f, "{call}"),
            Target::Literal(literal) => write!(f, "{literal}"),
        }
    }
}

/// Turns a parsed top-level target into an executable [`Target`].
///
/// Selectors receive the context's tenant and window. Calls to registered
/// functions are checked against the declared arity here; unknown names are
/// reported at evaluation time.
pub fn materialize(
    tree: &SyntaxTree,
    ctx: &EvaluationContext,
    registry: &FunctionRegistry,
) -> Result<Target, MaterializeError> {
    if tree.is_literal() {
        return Err(MaterializeError::InvalidParameterValue {
            expression: tree.to_string(),
            cause: "a literal is not a series expression".to_string(),
        });
    }
    materialize_node(tree, ctx, registry)
}

fn materialize_node(
    tree: &SyntaxTree,
    ctx: &EvaluationContext,
    registry: &FunctionRegistry,
) -> Result<Target, MaterializeError> {
    match tree {
        SyntaxTree::Call { name, args } => {
            if let Some(spec) = registry.get(name) {
                spec.check_arity(args.len()).map_err(|cause| {
                    MaterializeError::InvalidParameterValue {
                        expression: tree.to_string(),
                        cause: format!("{name} {cause}"),
                    }
                })?;
            }
            let args = args
                .iter()
                .map(|arg| materialize_node(arg, ctx, registry))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Target::FunctionCall(FunctionCall {
                name: name.clone(),
                args,
            }))
        }
        SyntaxTree::Path(pattern) => {
            let window = ctx.window();
            Ok(Target::SeriesSelector(SeriesSelector {
                path_pattern: pattern.clone(),
                tenant: window.tenant.clone(),
                from: window.from,
                until: window.until,
            }))
        }
        SyntaxTree::Number(value) => Ok(Target::Literal(Literal::Number(*value))),
        SyntaxTree::String(value) => Ok(Target::Literal(Literal::String(value.clone()))),
        SyntaxTree::Bool(value) => Ok(Target::Literal(Literal::Bool(*value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::QueryWindow;
    use crate::expression::parse;
    use crate::format::ValueFormatter;

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(
            QueryWindow {
                tenant: "acme".to_string(),
                from: 0,
                until: 120,
            },
            ValueFormatter::Machine,
        )
    }

    fn materialize_text(text: &str) -> Result<Target, MaterializeError> {
        materialize(&parse(text).unwrap(), &ctx(), &FunctionRegistry::builtin())
    }

    #[test]
    fn test_selectors_receive_the_query_window() {
        let target = materialize_text("scale(servers.*.cpu, 2)").unwrap();
        let Target::FunctionCall(call) = target else {
            panic!("expected a function call");
        };
        assert_eq!(
            call.args[0],
            Target::SeriesSelector(SeriesSelector {
                path_pattern: "servers.*.cpu".to_string(),
                tenant: "acme".to_string(),
                from: 0,
                until: 120,
            })
        );
        assert_eq!(call.args[1], Target::Literal(Literal::Number(2.0)));
    }

    #[test]
    fn test_display_is_normalized_text() {
        let target = materialize_text("alias( sum(a.b , c.d) , 'total' )").unwrap();
        assert_eq!(target.to_string(), "alias(sum(a.b,c.d),\"total\")");
    }

    #[test]
    fn test_arity_is_checked_for_known_functions() {
        let err = materialize_text("scale(a.b)").unwrap_err();
        let MaterializeError::InvalidParameterValue { expression, cause } = err;
        assert_eq!(expression, "scale(a.b)");
        assert!(cause.contains("at least 2"), "{cause}");

        let err = materialize_text("absolute(a.b, 1, 2)").unwrap_err();
        assert!(err.to_string().contains("at most 1"), "{err}");
    }

    #[test]
    fn test_unknown_functions_are_left_for_evaluation() {
        assert!(materialize_text("noSuchFunction(a.b)").is_ok());
    }

    #[test]
    fn test_top_level_literal_is_rejected() {
        assert!(materialize_text("42").is_err());
        assert!(materialize_text("'text'").is_err());
    }
}
