use serde::Deserialize;

use super::Association;

/// Filter criteria as parsed from the admin console's query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseFilter {
    pub program_id: Option<String>,
    pub subject_id: Option<String>,
    pub department_id: Option<String>,
    pub year_or_semester: Option<i64>,
    pub college_id: Option<String>,
    pub query: Option<String>,
}

impl CourseFilter {
    /// True when at least one dimension other than college is set. College is
    /// not a stored field, so it never drives a store query; a college-only
    /// filter means "list everything, then narrow in memory".
    pub fn has_structural_dimension(&self) -> bool {
        self.program_id.is_some()
            || self.subject_id.is_some()
            || self.department_id.is_some()
            || self.year_or_semester.is_some()
    }
}

/// True when every dimension present in the filter is satisfied by at least
/// one association entry. Dimensions are matched independently across the
/// list: two different entries may each satisfy a different dimension. That
/// matches the behavior of store-side queries over list fields and is kept
/// deliberately (see DESIGN.md).
pub fn matches(associations: &[Association], filter: &CourseFilter) -> bool {
    if let Some(program_id) = &filter.program_id {
        if !associations.iter().any(|a| &a.program_id == program_id) {
            return false;
        }
    }
    if let Some(subject_id) = &filter.subject_id {
        if !associations
            .iter()
            .any(|a| a.subject_id.as_deref() == Some(subject_id))
        {
            return false;
        }
    }
    if let Some(department_id) = &filter.department_id {
        if !associations
            .iter()
            .any(|a| a.department_id.as_deref() == Some(department_id))
        {
            return false;
        }
    }
    if let Some(year) = filter.year_or_semester {
        if !associations.iter().any(|a| a.year_or_semester == Some(year)) {
            return false;
        }
    }
    true
}
