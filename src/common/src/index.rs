//! Index collaborator: resolves wildcard path patterns and answers path
//! searches.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use regex::Regex;

use crate::storage::InMemoryMetricStore;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Invalid path pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Index backend unavailable: {0}")]
    Unavailable(String),
}

pub type IndexResult<T> = Result<T, IndexError>;

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MetricIndex: Send + Sync + 'static {
    /// Expands `pattern` to the concrete paths it matches for `tenant`.
    async fn resolve_pattern(&self, tenant: &str, pattern: &str) -> IndexResult<BTreeSet<String>>;

    /// Paths matching `query`, sorted, at most `limit` of them.
    async fn search_paths(&self, tenant: &str, query: &str, limit: usize)
    -> IndexResult<Vec<String>>;
}

/// Whether `text` contains any glob metacharacter.
pub fn has_wildcards(text: &str) -> bool {
    text.contains(['*', '?', '[', '{'])
}

/// Compiles a dot-segmented wildcard pattern to an anchored regex.
///
/// `*` and `?` never cross a `.`; `[...]` is a character class (negated by a
/// leading `!` or `^`) that never matches `.` either, and `{a,b}` an
/// alternation of literal segments.
pub fn compile_pattern(pattern: &str) -> IndexResult<Regex> {
    let invalid = |reason: &str| IndexError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str("[^.]*"),
            '?' => out.push_str("[^.]"),
            '[' => {
                // Intersected with [^.] so neither negation nor ranges reach a separator.
                out.push_str("[[");
                let mut closed = false;
                let mut first = true;
                for c in chars.by_ref() {
                    match c {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '!' | '^' if first => out.push('^'),
                        '\\' | '[' | '&' | '~' => {
                            out.push('\\');
                            out.push(c);
                        }
                        c => out.push(c),
                    }
                    first = false;
                }
                if !closed {
                    return Err(invalid("unterminated character class"));
                }
                out.push_str("]&&[^.]]");
            }
            '{' => {
                let mut alternatives = Vec::new();
                let mut current = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    match c {
                        '}' => {
                            closed = true;
                            break;
                        }
                        ',' => alternatives.push(std::mem::take(&mut current)),
                        c => current.push(c),
                    }
                }
                if !closed {
                    return Err(invalid("unterminated brace group"));
                }
                alternatives.push(current);
                let escaped: Vec<String> = alternatives
                    .iter()
                    .map(|alt| {
                        alt.split('*')
                            .map(regex::escape)
                            .collect::<Vec<_>>()
                            .join("[^.]*")
                    })
                    .collect();
                out.push_str("(?:");
                out.push_str(&escaped.join("|"));
                out.push(')');
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');

    Regex::new(&out).map_err(|e| invalid(&e.to_string()))
}

/// Index over the paths held by an [`InMemoryMetricStore`], plus any paths
/// registered explicitly.
#[derive(Debug)]
pub struct InMemoryMetricIndex {
    store: Option<Arc<InMemoryMetricStore>>,
    extra: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl InMemoryMetricIndex {
    pub fn new() -> Self {
        Self {
            store: None,
            extra: RwLock::new(HashMap::new()),
        }
    }

    /// Index that always reflects the paths currently stored in `store`.
    pub fn backed_by(store: Arc<InMemoryMetricStore>) -> Self {
        Self {
            store: Some(store),
            extra: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, tenant: &str, path: &str) {
        let mut extra = match self.extra.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        extra
            .entry(tenant.to_string())
            .or_default()
            .insert(path.to_string());
    }

    fn all_paths(&self, tenant: &str) -> BTreeSet<String> {
        let mut paths: BTreeSet<String> = self
            .store
            .as_ref()
            .map(|store| store.paths(tenant).into_iter().collect())
            .unwrap_or_default();
        let extra = match self.extra.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(registered) = extra.get(tenant) {
            paths.extend(registered.iter().cloned());
        }
        paths
    }
}

impl Default for InMemoryMetricIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricIndex for InMemoryMetricIndex {
    async fn resolve_pattern(&self, tenant: &str, pattern: &str) -> IndexResult<BTreeSet<String>> {
        let paths = self.all_paths(tenant);
        if !has_wildcards(pattern) {
            return Ok(paths.into_iter().filter(|p| p == pattern).collect());
        }
        let regex = compile_pattern(pattern)?;
        Ok(paths.into_iter().filter(|p| regex.is_match(p)).collect())
    }

    async fn search_paths(
        &self,
        tenant: &str,
        query: &str,
        limit: usize,
    ) -> IndexResult<Vec<String>> {
        enum Matcher {
            Pattern(Regex),
            Substring(String),
        }

        let matchers = query
            .split('|')
            .map(str::trim)
            .filter(|alt| !alt.is_empty())
            .map(|alt| {
                if has_wildcards(alt) {
                    compile_pattern(alt).map(Matcher::Pattern)
                } else {
                    Ok(Matcher::Substring(alt.to_string()))
                }
            })
            .collect::<IndexResult<Vec<_>>>()?;

        Ok(self
            .all_paths(tenant)
            .into_iter()
            .filter(|path| {
                matchers.iter().any(|m| match m {
                    Matcher::Pattern(re) => re.is_match(path),
                    Matcher::Substring(s) => path.contains(s.as_str()),
                })
            })
            .take(limit)
            .collect())
    }
}
