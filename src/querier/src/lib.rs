//! Graphene query engine.
//!
//! Turns render targets into series: [`expression::parse`] builds a syntax
//! tree, [`target::materialize`] binds it to the request window, the
//! [`evaluation::Evaluator`] runs it against the storage and index
//! collaborators, the [`governor::Governor`] applies throttling, statistics
//! and the request deadline, and [`format`] writes the response body.

pub mod evaluation;
pub mod expression;
pub mod format;
pub mod functions;
pub mod governor;
pub mod render;
pub mod target;

pub use evaluation::{EvaluationContext, EvaluationError, Evaluator, QueryWindow};
pub use expression::{ParseError, SyntaxTree, parse};
pub use format::{OutputFormat, RenderOptions, Rendered, ValueFormatter, format_series};
pub use functions::FunctionRegistry;
pub use governor::{EvaluationPool, Governor, Outcome};
pub use render::{RenderError, RenderParameters, RenderService};
pub use target::{MaterializeError, Target, materialize};
