pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use sqlite::SqliteStore;

/// Upper bound on the number of values a single `Condition::In` may carry,
/// mirroring the cardinality limit hosted document stores put on `IN` queries.
/// Callers needing more must chunk their lookups.
pub const MAX_IN_VALUES: usize = 10;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid document payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// An equality-style predicate over a document field.
///
/// Field paths are dot-separated (`associations.programId`). When a path
/// segment lands on an array the remaining path is applied to every element,
/// so an `Eq` on a list field holds if *any* element satisfies it. The
/// reserved path `id` addresses the document identifier itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    In(String, Vec<Value>),
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: true,
        }
    }
}

/// Location of a document, used for deletes and batch staging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocRef {
    pub collection: String,
    pub id: String,
}

impl DocRef {
    pub fn new(collection: &str, id: &str) -> Self {
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn matches(&self, condition: &Condition) -> bool {
        match condition {
            Condition::Eq(field, expected) => {
                if field == "id" {
                    // A non-string value can never name a document.
                    return expected.as_str() == Some(self.id.as_str());
                }
                leaf_values(&self.data, field)
                    .iter()
                    .any(|v| value_eq(v, expected))
            }
            Condition::In(field, options) => {
                if field == "id" {
                    return options
                        .iter()
                        .any(|o| o.as_str() == Some(self.id.as_str()));
                }
                leaf_values(&self.data, field)
                    .iter()
                    .any(|v| options.iter().any(|o| value_eq(v, o)))
            }
        }
    }

    pub fn matches_all(&self, conditions: &[Condition]) -> bool {
        conditions.iter().all(|c| self.matches(c))
    }
}

/// Resolve a dot-separated path against a JSON value, fanning out over
/// arrays along the way.
fn leaf_values<'a>(value: &'a Value, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    collect(value, &segments, &mut out);
    out
}

fn collect<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    match segments.split_first() {
        None => out.push(value),
        Some((head, rest)) => match value {
            Value::Object(map) => {
                if let Some(next) = map.get(*head) {
                    collect(next, rest, out);
                }
            }
            Value::Array(items) => {
                for item in items {
                    collect(item, segments, out);
                }
            }
            _ => {}
        },
    }
}

/// Scalar equality, with array-contains semantics when the stored leaf is a
/// list and the expected value is not.
fn value_eq(stored: &Value, expected: &Value) -> bool {
    match (stored, expected) {
        (Value::Array(items), e) if !e.is_array() => items.iter().any(|i| i == e),
        (s, e) => s == e,
    }
}

/// The contract this service requires from its document store: filtered
/// reads, point reads, single deletes, and an all-or-nothing delete batch.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn query(
        &self,
        collection: &str,
        conditions: &[Condition],
        order: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn delete(&self, target: &DocRef) -> Result<(), StoreError>;

    fn batch(&self) -> Box<dyn WriteBatch>;
}

/// A staged set of deletions committed atomically: after `commit` either
/// every staged document is gone or none is.
#[async_trait]
pub trait WriteBatch: Send {
    fn stage_delete(&mut self, target: DocRef);

    fn staged(&self) -> usize;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(data: Value) -> Document {
        Document {
            id: "d1".to_string(),
            data,
        }
    }

    #[test]
    fn eq_matches_top_level_field() {
        let d = doc(json!({"programId": "p1"}));
        assert!(d.matches(&Condition::Eq("programId".into(), json!("p1"))));
        assert!(!d.matches(&Condition::Eq("programId".into(), json!("p2"))));
    }

    #[test]
    fn eq_fans_out_over_array_elements() {
        let d = doc(json!({
            "associations": [
                {"programId": "p1", "yearOrSemester": 1},
                {"programId": "p2", "yearOrSemester": 2}
            ]
        }));
        assert!(d.matches(&Condition::Eq("associations.programId".into(), json!("p2"))));
        assert!(d.matches(&Condition::Eq("associations.yearOrSemester".into(), json!(1))));
        assert!(!d.matches(&Condition::Eq("associations.programId".into(), json!("p9"))));
    }

    #[test]
    fn eq_on_list_leaf_behaves_as_contains() {
        let d = doc(json!({"tags": ["algebra", "intro"]}));
        assert!(d.matches(&Condition::Eq("tags".into(), json!("intro"))));
        assert!(!d.matches(&Condition::Eq("tags".into(), json!("advanced"))));
    }

    #[test]
    fn missing_field_never_matches() {
        let d = doc(json!({"title": "x"}));
        assert!(!d.matches(&Condition::Eq("programId".into(), json!("p1"))));
    }

    #[test]
    fn non_string_id_condition_never_matches() {
        let empty_id = Document {
            id: String::new(),
            data: json!({}),
        };
        assert!(!empty_id.matches(&Condition::Eq("id".into(), json!(1))));
        assert!(!empty_id.matches(&Condition::Eq("id".into(), json!(null))));
        assert!(!empty_id.matches(&Condition::Eq("id".into(), json!(["d1"]))));
    }

    #[test]
    fn id_path_addresses_document_id() {
        let d = doc(json!({}));
        assert!(d.matches(&Condition::Eq("id".into(), json!("d1"))));
        assert!(d.matches(&Condition::In("id".into(), vec![json!("x"), json!("d1")])));
        assert!(!d.matches(&Condition::In("id".into(), vec![json!("x")])));
    }

    #[test]
    fn matches_all_requires_every_condition() {
        let d = doc(json!({
            "associations": [
                {"programId": "p1", "yearOrSemester": 1},
                {"programId": "p2", "yearOrSemester": 2}
            ]
        }));
        // Each condition may be satisfied by a different array element.
        assert!(d.matches_all(&[
            Condition::Eq("associations.programId".into(), json!("p2")),
            Condition::Eq("associations.yearOrSemester".into(), json!(1)),
        ]));
        assert!(!d.matches_all(&[
            Condition::Eq("associations.programId".into(), json!("p2")),
            Condition::Eq("associations.yearOrSemester".into(), json!(7)),
        ]));
    }
}
