//! Query Engine
//!
//! A [`Query`] wraps a source cursor, a filter configuration, and
//! sub-queries keyed by reference names of the target schema. For each
//! accepted root it yields the root (unless sub-queries exist without
//! `select`), then each sub-query's flattened stream, all lazily.
//!
//! # Examples
//!
//! ```rust,no_run
//! use hyperstore_core::query::{Cursor, Matcher, QueryConfig};
//! # use hyperstore_core::domain::Domain;
//! # fn example(domain: &Domain) {
//! let config = QueryConfig::new()
//!     .with_schema("Book")
//!     .match_with("Title", Matcher::regex("^te").unwrap())
//!     .skip(1)
//!     .take(2);
//! let ids = domain.query(config).to_vec();
//! # }
//! ```

use crate::domain::Domain;
use crate::query::{ArrayCursor, Cursor};
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// Comparison operator inside an expression matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring containment on strings, membership on arrays
    Contains,
    StartsWith,
    EndsWith,
    /// Value is one of the listed values
    In,
    /// Presence test; the operand is the expected boolean
    Exists,
}

/// Property matcher inside a query configuration
#[derive(Clone)]
pub enum Matcher {
    /// Exact equality
    Eq(Value),
    /// Regular expression test on string values
    Regex(Regex),
    /// Operator/operand pairs, all of which must hold
    Expr(Vec<(CompareOp, Value)>),
}

impl Matcher {
    /// Equality matcher
    pub fn eq(value: impl Into<Value>) -> Self {
        Matcher::Eq(value.into())
    }

    /// Regex matcher; fails on an invalid pattern
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Matcher::Regex(Regex::new(pattern)?))
    }

    /// Expression matcher
    pub fn expr(ops: Vec<(CompareOp, Value)>) -> Self {
        Matcher::Expr(ops)
    }

    /// Test a property value, absent values fail everything except `Exists`
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        match self {
            Matcher::Eq(expected) => actual == Some(expected),
            Matcher::Regex(re) => actual
                .and_then(Value::as_str)
                .map(|s| re.is_match(s))
                .unwrap_or(false),
            Matcher::Expr(ops) => ops.iter().all(|(op, operand)| compare(*op, actual, operand)),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Eq(v) => f.debug_tuple("Eq").field(v).finish(),
            Matcher::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            Matcher::Expr(ops) => f.debug_tuple("Expr").field(ops).finish(),
        }
    }
}

fn compare(op: CompareOp, actual: Option<&Value>, operand: &Value) -> bool {
    if op == CompareOp::Exists {
        let expected = operand.as_bool().unwrap_or(true);
        return actual.is_some() == expected;
    }
    let Some(actual) = actual else {
        return false;
    };
    match op {
        CompareOp::Eq => actual == operand,
        CompareOp::Ne => actual != operand,
        CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte => {
            order(actual, operand).map_or(false, |ord| match op {
                CompareOp::Gt => ord.is_gt(),
                CompareOp::Gte => ord.is_ge(),
                CompareOp::Lt => ord.is_lt(),
                CompareOp::Lte => ord.is_le(),
                _ => unreachable!(),
            })
        }
        CompareOp::Contains => match (actual, operand) {
            (Value::String(s), Value::String(n)) => s.contains(n.as_str()),
            (Value::Array(items), needle) => items.contains(needle),
            _ => false,
        },
        CompareOp::StartsWith => matches!(
            (actual, operand),
            (Value::String(s), Value::String(p)) if s.starts_with(p.as_str())
        ),
        CompareOp::EndsWith => matches!(
            (actual, operand),
            (Value::String(s), Value::String(p)) if s.ends_with(p.as_str())
        ),
        CompareOp::In => operand
            .as_array()
            .map(|items| items.contains(actual))
            .unwrap_or(false),
        CompareOp::Exists => unreachable!(),
    }
}

fn order(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64().partial_cmp(&y.as_f64()),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Opaque element predicate
pub type FilterFn = Rc<dyn Fn(&Domain, &str) -> bool>;

/// Declarative query configuration
///
/// Property matchers AND together; an `or` configuration is tried when they
/// fail. `skip`/`take` page over accepted roots after filtering. Reference
/// keys spawn sub-queries over the elements reachable through that
/// reference; with sub-queries present the root itself is emitted only when
/// `select` is set.
#[derive(Clone, Default)]
pub struct QueryConfig {
    pub(crate) schema: Option<String>,
    pub(crate) id: Option<String>,
    pub(crate) properties: Vec<(String, Matcher)>,
    pub(crate) filter: Option<FilterFn>,
    pub(crate) or: Option<Box<QueryConfig>>,
    pub(crate) skip: usize,
    pub(crate) take: Option<usize>,
    pub(crate) select: bool,
    pub(crate) references: Vec<(String, Rc<QueryConfig>)>,
}

impl QueryConfig {
    /// Empty configuration accepting everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact schema match (full id or unambiguous simple name)
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Element id match
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Property equality match
    pub fn match_eq(self, property: &str, value: impl Into<Value>) -> Self {
        self.match_with(property, Matcher::Eq(value.into()))
    }

    /// Property match with an explicit matcher
    pub fn match_with(mut self, property: &str, matcher: Matcher) -> Self {
        self.properties.push((property.to_string(), matcher));
        self
    }

    /// Opaque predicate over the candidate element
    pub fn with_filter(mut self, filter: impl Fn(&Domain, &str) -> bool + 'static) -> Self {
        self.filter = Some(Rc::new(filter));
        self
    }

    /// Alternative configuration tried when the conditions fail
    pub fn or_else(mut self, other: QueryConfig) -> Self {
        self.or = Some(Box::new(other));
        self
    }

    /// Skip the first `n` accepted roots
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Stop after `n` accepted roots
    pub fn take(mut self, n: usize) -> Self {
        self.take = Some(n);
        self
    }

    /// Emit matched roots even when sub-queries are present
    pub fn select(mut self) -> Self {
        self.select = true;
        self
    }

    /// Spawn a sub-query over the named reference of each matched root
    pub fn with_reference(mut self, name: &str, config: QueryConfig) -> Self {
        self.references.push((name.to_string(), Rc::new(config)));
        self
    }
}

impl fmt::Debug for QueryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryConfig")
            .field("schema", &self.schema)
            .field("id", &self.id)
            .field(
                "properties",
                &self.properties.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("skip", &self.skip)
            .field("take", &self.take)
            .field("select", &self.select)
            .field(
                "references",
                &self.references.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

enum QueryState {
    SeekRoot,
    Subqueries,
    PumpSub,
    Done,
}

/// Lazy query cursor yielding element ids
pub struct Query<'d> {
    domain: &'d Domain,
    source: Box<dyn Cursor<Item = String> + 'd>,
    config: Rc<QueryConfig>,
    state: QueryState,
    accepted: usize,
    emitted_roots: usize,
    root: Option<String>,
    ref_idx: usize,
    sub: Option<Box<Query<'d>>>,
    current: Option<String>,
}

impl<'d> Query<'d> {
    pub(crate) fn new(
        domain: &'d Domain,
        source: Box<dyn Cursor<Item = String> + 'd>,
        config: Rc<QueryConfig>,
    ) -> Self {
        Self {
            domain,
            source,
            config,
            state: QueryState::SeekRoot,
            accepted: 0,
            emitted_roots: 0,
            root: None,
            ref_idx: 0,
            sub: None,
            current: None,
        }
    }

    /// Query over an explicit id list
    pub fn over(domain: &'d Domain, ids: Vec<String>, config: Rc<QueryConfig>) -> Self {
        Self::new(domain, Box::new(ArrayCursor::new(ids)), config)
    }

    fn accepts(&self, config: &QueryConfig, id: &str) -> bool {
        if self.satisfies(config, id) {
            return true;
        }
        match &config.or {
            Some(or) => self.accepts(or, id),
            None => false,
        }
    }

    fn satisfies(&self, config: &QueryConfig, id: &str) -> bool {
        if let Some(want) = &config.id {
            if id != want {
                return false;
            }
        }
        if let Some(schema) = &config.schema {
            let wanted = self
                .domain
                .resolve_schema_id(schema)
                .unwrap_or_else(|| schema.clone());
            match self.domain.schema_of(id) {
                Some(actual) if actual.eq_ignore_ascii_case(&wanted) => {}
                _ => return false,
            }
        }
        for (property, matcher) in &config.properties {
            let value = self.domain.peek_property(id, property);
            if !matcher.matches(value.as_ref()) {
                return false;
            }
        }
        if let Some(filter) = &config.filter {
            if !filter(self.domain, id) {
                return false;
            }
        }
        true
    }
}

impl Cursor for Query<'_> {
    type Item = String;

    fn move_next(&mut self) -> bool {
        loop {
            match self.state {
                QueryState::Done => {
                    self.current = None;
                    return false;
                }
                QueryState::SeekRoot => {
                    loop {
                        if !self.source.move_next() {
                            self.state = QueryState::Done;
                            self.current = None;
                            return false;
                        }
                        let Some(id) = self.source.current() else {
                            continue;
                        };
                        let config = self.config.clone();
                        if !self.accepts(&config, &id) {
                            continue;
                        }
                        self.accepted += 1;
                        if self.accepted <= self.config.skip {
                            continue;
                        }
                        if let Some(take) = self.config.take {
                            if self.emitted_roots >= take {
                                self.state = QueryState::Done;
                                self.current = None;
                                return false;
                            }
                        }
                        self.emitted_roots += 1;
                        self.root = Some(id.clone());
                        self.ref_idx = 0;
                        self.sub = None;
                        if self.config.references.is_empty() {
                            self.current = Some(id);
                            return true;
                        }
                        self.state = QueryState::Subqueries;
                        if self.config.select {
                            self.current = Some(id);
                            return true;
                        }
                        break;
                    }
                }
                QueryState::Subqueries => {
                    if self.ref_idx >= self.config.references.len() {
                        self.state = QueryState::SeekRoot;
                        continue;
                    }
                    let (name, sub_config) = self.config.references[self.ref_idx].clone();
                    self.ref_idx += 1;
                    let root = self.root.clone().unwrap_or_default();
                    let targets = self.domain.reference_targets(&root, &name);
                    self.sub = Some(Box::new(Query::over(self.domain, targets, sub_config)));
                    self.state = QueryState::PumpSub;
                }
                QueryState::PumpSub => {
                    if let Some(sub) = self.sub.as_mut() {
                        if sub.move_next() {
                            self.current = sub.current();
                            return true;
                        }
                    }
                    self.sub = None;
                    self.state = QueryState::Subqueries;
                }
            }
        }
    }

    fn current(&self) -> Option<String> {
        self.current.clone()
    }

    fn reset(&mut self) {
        self.source.reset();
        self.state = QueryState::SeekRoot;
        self.accepted = 0;
        self.emitted_roots = 0;
        self.root = None;
        self.ref_idx = 0;
        self.sub = None;
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_eq_matcher() {
        let m = Matcher::eq("x");
        assert!(m.matches(Some(&json!("x"))));
        assert!(!m.matches(Some(&json!("y"))));
        assert!(!m.matches(None));
    }

    #[test]
    fn test_regex_matcher() {
        let m = Matcher::regex("^te").unwrap();
        assert!(m.matches(Some(&json!("test"))));
        assert!(!m.matches(Some(&json!("toy"))));
        assert!(!m.matches(Some(&json!(42))));
        assert!(Matcher::regex("(").is_err());
    }

    #[test]
    fn test_expr_matcher_numeric_range() {
        let m = Matcher::expr(vec![
            (CompareOp::Gte, json!(10)),
            (CompareOp::Lt, json!(20)),
        ]);
        assert!(m.matches(Some(&json!(15))));
        assert!(!m.matches(Some(&json!(20))));
        assert!(!m.matches(Some(&json!(5))));
    }

    #[test]
    fn test_expr_matcher_strings() {
        let m = Matcher::expr(vec![(CompareOp::StartsWith, json!("hyper"))]);
        assert!(m.matches(Some(&json!("hyperstore"))));
        assert!(!m.matches(Some(&json!("store"))));
        let m = Matcher::expr(vec![(CompareOp::Contains, json!("per"))]);
        assert!(m.matches(Some(&json!("hyperstore"))));
    }

    #[test]
    fn test_expr_matcher_in_and_exists() {
        let m = Matcher::expr(vec![(CompareOp::In, json!(["a", "b"]))]);
        assert!(m.matches(Some(&json!("a"))));
        assert!(!m.matches(Some(&json!("c"))));
        let present = Matcher::expr(vec![(CompareOp::Exists, json!(true))]);
        assert!(present.matches(Some(&json!(0))));
        assert!(!present.matches(None));
        let absent = Matcher::expr(vec![(CompareOp::Exists, json!(false))]);
        assert!(absent.matches(None));
    }
}
