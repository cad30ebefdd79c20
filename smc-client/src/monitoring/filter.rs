use serde_json::{json, Value};

/// A composable predicate attached to a monitoring query.
///
/// Composite variants (`And`, `Or`, `Not`) hold their children in insertion
/// order and render them depth-first; the order is significant to the
/// server-side evaluation and is preserved verbatim. Only one filter tree is
/// active per query, so multiple conditions are combined explicitly through
/// the composite variants.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFilter {
    /// A server-side filter expression string, passed through untouched.
    /// The SMC "Show Expression" syntax; no client-side validation.
    Translated(String),
    /// Matches when the target value is one of the listed values
    In(Vec<Value>),
    /// Matches when every child matches. An empty child list is the
    /// vacuous always-true predicate.
    And(Vec<QueryFilter>),
    /// Matches when at least one child matches. An empty child list is the
    /// vacuous always-false predicate.
    Or(Vec<QueryFilter>),
    /// Negates the combination of its children
    Not(Vec<QueryFilter>),
    /// Matches when the referenced value is present at all
    Defined(Value),
}

impl QueryFilter {
    /// Render to the wire filter document. Composites render their children
    /// recursively, keeping insertion order.
    pub fn render(&self) -> Value {
        match self {
            QueryFilter::Translated(expression) => {
                json!({ "type": "translated", "value": expression })
            }
            QueryFilter::In(values) => json!({ "type": "in", "values": values }),
            QueryFilter::And(children) => Self::composite("and", children),
            QueryFilter::Or(children) => Self::composite("or", children),
            QueryFilter::Not(children) => Self::composite("not", children),
            QueryFilter::Defined(value) => json!({ "type": "defined", "value": value }),
        }
    }

    fn composite(tag: &str, children: &[QueryFilter]) -> Value {
        let values: Vec<Value> = children.iter().map(QueryFilter::render).collect();
        json!({ "type": tag, "values": values })
    }
}
