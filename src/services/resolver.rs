use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use super::college::CollegeProgramIndex;
use super::{COURSES_COLLECTION, PROGRAMS_COLLECTION};
use crate::models::{Association, Course, CourseFilter, Program, filter};
use crate::store::{Condition, Document, DocumentStore, MAX_IN_VALUES, OrderBy, StoreError};

/// Bound on the number of recent records fetched by the last-resort scan.
const RECENT_SCAN_LIMIT: usize = 100;

/// The resolution strategies, cheapest first. Each is tried only while the
/// previous one produced nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ResolveStrategy {
    /// Equality predicates against the canonical association list.
    StructuredQuery,
    /// The same predicates against the legacy flat top-level fields.
    LegacyFlatQuery,
    /// Fetch the most recent records unfiltered and match in memory; the only
    /// strategy that reaches records stored as a single embedded object.
    BoundedScan,
}

const STRATEGY_CHAIN: [ResolveStrategy; 3] = [
    ResolveStrategy::StructuredQuery,
    ResolveStrategy::LegacyFlatQuery,
    ResolveStrategy::BoundedScan,
];

fn should_continue(found: &[Course], request: &CourseFilter) -> bool {
    found.is_empty() && request.has_structural_dimension()
}

/// Answers "which courses match this filter" over records written under
/// three incompatible historical schemas.
///
/// Infrastructure trouble during resolution degrades to an empty result;
/// this never surfaces an error to the caller.
pub struct AssociationResolver {
    store: Arc<dyn DocumentStore>,
}

impl AssociationResolver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Resolve matching courses, newest first, de-duplicated by id, with
    /// display names refreshed from the `programs` collection.
    pub async fn resolve(&self, request: &CourseFilter) -> Vec<Course> {
        let found = if request.has_structural_dimension() {
            self.run_chain(request).await
        } else {
            match self.list_all().await {
                Ok(courses) => courses,
                Err(err) => {
                    warn!("course listing failed: {}", err);
                    Vec::new()
                }
            }
        };

        let mut results = dedupe_newest_first(found);

        if let Some(college_id) = &request.college_id {
            results = self.apply_college_filter(results, college_id).await;
        }

        self.enrich_display_names(&mut results).await;
        results
    }

    async fn run_chain(&self, request: &CourseFilter) -> Vec<Course> {
        let mut found = Vec::new();
        for strategy in STRATEGY_CHAIN {
            found = match self.run_strategy(strategy, request).await {
                Ok(courses) => {
                    debug!("strategy {:?} yielded {} courses", strategy, courses.len());
                    courses
                }
                Err(err) => {
                    warn!("course resolution strategy {:?} failed: {}", strategy, err);
                    Vec::new()
                }
            };
            if !should_continue(&found, request) {
                break;
            }
        }
        found
    }

    async fn run_strategy(
        &self,
        strategy: ResolveStrategy,
        request: &CourseFilter,
    ) -> Result<Vec<Course>, StoreError> {
        match strategy {
            ResolveStrategy::StructuredQuery => {
                self.query_courses(&structured_conditions(request)).await
            }
            ResolveStrategy::LegacyFlatQuery => {
                self.query_courses(&legacy_conditions(request)).await
            }
            ResolveStrategy::BoundedScan => self.bounded_scan(request).await,
        }
    }

    async fn query_courses(&self, conditions: &[Condition]) -> Result<Vec<Course>, StoreError> {
        let docs = self
            .store
            .query(
                COURSES_COLLECTION,
                conditions,
                Some(&OrderBy::desc("createdAt")),
                None,
            )
            .await?;
        Ok(decode_courses(&docs))
    }

    async fn bounded_scan(&self, request: &CourseFilter) -> Result<Vec<Course>, StoreError> {
        let docs = self
            .store
            .query(
                COURSES_COLLECTION,
                &[],
                Some(&OrderBy::desc("createdAt")),
                Some(RECENT_SCAN_LIMIT),
            )
            .await?;
        Ok(decode_courses(&docs)
            .into_iter()
            .filter(|c| filter::matches(&c.associations(), request))
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Course>, StoreError> {
        self.query_courses(&[]).await
    }

    async fn apply_college_filter(&self, courses: Vec<Course>, college_id: &str) -> Vec<Course> {
        let index = match self.load_college_index().await {
            Ok(index) => index,
            Err(err) => {
                // Without the index we cannot tell which courses belong to
                // the college; returning nothing beats leaking other
                // colleges' courses.
                warn!("failed to build college index: {}", err);
                return Vec::new();
            }
        };
        courses
            .into_iter()
            .filter(|c| index.belongs_to_college(&c.associations(), college_id))
            .collect()
    }

    async fn load_college_index(&self) -> Result<CollegeProgramIndex, StoreError> {
        let docs = self
            .store
            .query(PROGRAMS_COLLECTION, &[], None, None)
            .await?;
        let programs: Vec<Program> = docs
            .iter()
            .filter_map(|doc| match Program::from_document(doc) {
                Ok(program) => Some(program),
                Err(err) => {
                    warn!("skipping undecodable program {}: {}", doc.id, err);
                    None
                }
            })
            .collect();
        Ok(CollegeProgramIndex::build(&programs))
    }

    /// Refresh cached program/subject display names from the `programs`
    /// collection. Lookups are batched in chunks of the store's IN cap;
    /// a failed chunk leaves the cached names as stored.
    async fn enrich_display_names(&self, courses: &mut [Course]) {
        let wanted: HashSet<String> = courses
            .iter()
            .flat_map(|c| c.associations().into_iter().map(|a| a.program_id))
            .collect();
        if wanted.is_empty() {
            return;
        }

        let ids: Vec<String> = wanted.into_iter().collect();
        let mut programs: HashMap<String, Program> = HashMap::new();
        for chunk in ids.chunks(MAX_IN_VALUES) {
            let values: Vec<Value> = chunk.iter().map(|id| json!(id)).collect();
            let lookup = self
                .store
                .query(
                    PROGRAMS_COLLECTION,
                    &[Condition::In("id".to_string(), values)],
                    None,
                    None,
                )
                .await;
            match lookup {
                Ok(docs) => {
                    for doc in &docs {
                        if let Ok(program) = Program::from_document(doc) {
                            programs.insert(program.id.clone(), program);
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        "display-name lookup failed for {} programs: {}",
                        chunk.len(),
                        err
                    );
                }
            }
        }

        for course in courses.iter_mut() {
            if let Some(list) = &mut course.associations {
                for association in list {
                    refresh_names(association, &programs);
                }
            }
            if let Some(single) = &mut course.association {
                refresh_names(single, &programs);
            }
            // Flat-shape records have no name fields to refresh.
        }
    }
}

fn refresh_names(association: &mut Association, programs: &HashMap<String, Program>) {
    let Some(program) = programs.get(&association.program_id) else {
        return;
    };
    association.program_name = Some(program.name.clone());
    if let Some(subject_id) = &association.subject_id {
        if let Some(name) = program.subject_name(subject_id) {
            association.subject_name = Some(name.to_string());
        }
    }
}

fn decode_courses(docs: &[Document]) -> Vec<Course> {
    docs.iter()
        .filter_map(|doc| match Course::from_document(doc) {
            Ok(course) => Some(course),
            Err(err) => {
                warn!("skipping undecodable course {}: {}", doc.id, err);
                None
            }
        })
        .collect()
}

/// De-duplicate by id keeping the first occurrence, then order newest first.
/// Records without a creation timestamp sort last.
fn dedupe_newest_first(courses: Vec<Course>) -> Vec<Course> {
    let mut seen = HashSet::new();
    let mut out: Vec<Course> = courses
        .into_iter()
        .filter(|c| seen.insert(c.id.clone()))
        .collect();
    out.sort_by(|a, b| b.created_timestamp().cmp(&a.created_timestamp()));
    out
}

fn structured_conditions(request: &CourseFilter) -> Vec<Condition> {
    dimension_conditions(request, "associations.")
}

fn legacy_conditions(request: &CourseFilter) -> Vec<Condition> {
    dimension_conditions(request, "")
}

fn dimension_conditions(request: &CourseFilter, prefix: &str) -> Vec<Condition> {
    let mut conditions = Vec::new();
    if let Some(program_id) = &request.program_id {
        conditions.push(Condition::Eq(format!("{prefix}programId"), json!(program_id)));
    }
    if let Some(subject_id) = &request.subject_id {
        conditions.push(Condition::Eq(format!("{prefix}subjectId"), json!(subject_id)));
    }
    if let Some(department_id) = &request.department_id {
        conditions.push(Condition::Eq(
            format!("{prefix}departmentId"),
            json!(department_id),
        ));
    }
    if let Some(year) = request.year_or_semester {
        conditions.push(Condition::Eq(format!("{prefix}yearOrSemester"), json!(year)));
    }
    conditions
}
