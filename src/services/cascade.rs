use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use super::COURSES_COLLECTION;
use crate::store::{Condition, DocRef, DocumentStore, StoreError};

/// One dependent collection swept by a cascade, with the field that
/// references the course. Adding a collection to the cascade is a data
/// change, not a code change.
#[derive(Debug, Clone)]
pub struct CascadeTarget {
    pub collection: String,
    pub foreign_key: String,
}

impl CascadeTarget {
    pub fn new(collection: &str, foreign_key: &str) -> Self {
        Self {
            collection: collection.to_string(),
            foreign_key: foreign_key.to_string(),
        }
    }

    /// The dependent collections of the current schema.
    pub fn defaults() -> Vec<CascadeTarget> {
        ["topics", "questions", "answers", "materials", "progressRecords"]
            .into_iter()
            .map(|collection| CascadeTarget::new(collection, "courseId"))
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("course {0} not found")]
    NotFound(String),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

/// What a committed cascade removed. `failed_collections` lists collections
/// whose enumeration failed before the commit; their records were treated as
/// zero and survive.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub course: bool,
    #[serde(flatten)]
    pub counts: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_collections: Vec<String>,
}

/// Preview of a cascade: per-collection dependent counts, nothing staged,
/// nothing deleted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedCounts {
    pub counts: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_collections: Vec<String>,
}

struct EnumerationStep {
    target: CascadeTarget,
    refs: Vec<DocRef>,
    failed: bool,
}

/// Enumerate dependents per collection, each independently of the others.
/// A failing collection degrades to zero entries and is flagged; the rest
/// still run. Shared by the planner and the preview counter so their counts
/// agree absent concurrent mutation.
async fn enumerate_dependents(
    store: &dyn DocumentStore,
    targets: &[CascadeTarget],
    course_id: &str,
) -> Vec<EnumerationStep> {
    let mut steps = Vec::with_capacity(targets.len());
    for target in targets {
        let condition = Condition::Eq(target.foreign_key.clone(), json!(course_id));
        let step = match store.query(&target.collection, &[condition], None, None).await {
            Ok(docs) => EnumerationStep {
                target: target.clone(),
                refs: docs
                    .iter()
                    .map(|d| DocRef::new(&target.collection, &d.id))
                    .collect(),
                failed: false,
            },
            Err(err) => {
                warn!(
                    "failed to enumerate {} for course {}: {}",
                    target.collection, course_id, err
                );
                EnumerationStep {
                    target: target.clone(),
                    refs: Vec::new(),
                    failed: true,
                }
            }
        };
        steps.push(step);
    }
    steps
}

/// Removes a course together with every dependent record that references it.
///
/// Enumeration is best-effort and taken as a snapshot; the removal itself is
/// one atomic batch. A dependent inserted between the snapshot and the commit
/// survives the cascade; no lock is taken to close that gap.
pub struct CascadeDeletionPlanner {
    store: Arc<dyn DocumentStore>,
    targets: Vec<CascadeTarget>,
}

impl CascadeDeletionPlanner {
    pub fn new(store: Arc<dyn DocumentStore>, targets: Vec<CascadeTarget>) -> Self {
        Self { store, targets }
    }

    pub async fn delete_cascade(&self, course_id: &str) -> Result<CascadeReport, CascadeError> {
        if self.store.get(COURSES_COLLECTION, course_id).await?.is_none() {
            return Err(CascadeError::NotFound(course_id.to_string()));
        }

        let steps = enumerate_dependents(self.store.as_ref(), &self.targets, course_id).await;

        let mut batch = self.store.batch();
        let mut counts = BTreeMap::new();
        let mut failed_collections = Vec::new();
        for step in steps {
            counts.insert(step.target.collection.clone(), step.refs.len());
            if step.failed {
                failed_collections.push(step.target.collection.clone());
            }
            for target in step.refs {
                batch.stage_delete(target);
            }
        }
        batch.stage_delete(DocRef::new(COURSES_COLLECTION, course_id));

        info!(
            "committing cascade for course {}: {} documents",
            course_id,
            batch.staged()
        );
        batch.commit().await?;

        Ok(CascadeReport {
            course: true,
            counts,
            failed_collections,
        })
    }
}

/// Read-only sibling of [`CascadeDeletionPlanner`], used to preview cascade
/// impact before a confirmation dialog.
pub struct RelatedItemsCounter {
    store: Arc<dyn DocumentStore>,
    targets: Vec<CascadeTarget>,
}

impl RelatedItemsCounter {
    pub fn new(store: Arc<dyn DocumentStore>, targets: Vec<CascadeTarget>) -> Self {
        Self { store, targets }
    }

    pub async fn count_related(&self, course_id: &str) -> RelatedCounts {
        let steps = enumerate_dependents(self.store.as_ref(), &self.targets, course_id).await;
        let mut counts = BTreeMap::new();
        let mut failed_collections = Vec::new();
        for step in steps {
            counts.insert(step.target.collection.clone(), step.refs.len());
            if step.failed {
                failed_collections.push(step.target.collection);
            }
        }
        RelatedCounts {
            counts,
            failed_collections,
        }
    }
}
