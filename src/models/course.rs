use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::{Document, StoreError};

/// One course-to-program link. Display names are cached copies taken at
/// write time; nothing keeps them in sync with later renames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    pub program_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_or_semester: Option<i64>,
}

/// Which of the three historical storage shapes a course record was written
/// under. New writes always use `List`; the other two are read-only legacy.
#[derive(Debug, Clone, PartialEq)]
pub enum AssociationSource {
    List(Vec<Association>),
    LegacyObject(Association),
    Flat {
        program_id: String,
        subject_id: Option<String>,
        year_or_semester: Option<i64>,
    },
}

/// A course record as stored. At most one of `associations`, `association`,
/// or the flat `program_id`/`subject_id`/`year_or_semester` trio is populated
/// on any given record; everything downstream goes through
/// [`Course::associations`] so the shape differences stay contained here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associations: Option<Vec<Association>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub association: Option<Association>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_or_semester: Option<i64>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Course {
    pub fn from_document(doc: &Document) -> Result<Self, StoreError> {
        let mut course: Course = serde_json::from_value(doc.data.clone())?;
        course.id = doc.id.clone();
        Ok(course)
    }

    /// The storage shape of this record, if it carries association data at all.
    pub fn association_source(&self) -> Option<AssociationSource> {
        if let Some(list) = &self.associations {
            return Some(AssociationSource::List(list.clone()));
        }
        if let Some(single) = &self.association {
            return Some(AssociationSource::LegacyObject(single.clone()));
        }
        if let Some(program_id) = &self.program_id {
            return Some(AssociationSource::Flat {
                program_id: program_id.clone(),
                subject_id: self.subject_id.clone(),
                year_or_semester: self.year_or_semester,
            });
        }
        None
    }

    /// Canonical association list regardless of stored shape. Total: a record
    /// with no association data yields an empty list, never an error.
    pub fn associations(&self) -> Vec<Association> {
        match self.association_source() {
            Some(AssociationSource::List(list)) => list,
            Some(AssociationSource::LegacyObject(single)) => vec![single],
            Some(AssociationSource::Flat {
                program_id,
                subject_id,
                year_or_semester,
            }) => vec![Association {
                program_id,
                program_name: None,
                subject_id,
                subject_name: None,
                department_id: None,
                department_name: None,
                year_or_semester,
            }],
            None => Vec::new(),
        }
    }

    pub fn created_timestamp(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(|ts| {
            DateTime::parse_from_rfc3339(ts)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
    }
}
