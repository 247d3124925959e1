use serde::{Deserialize, Serialize};

use crate::store::{Document, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
}

/// A program as stored in the `programs` collection. `college_id` is the only
/// place college membership exists; courses never carry it directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    #[serde(default)]
    pub id: String,
    pub college_id: String,
    pub name: String,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

impl Program {
    pub fn from_document(doc: &Document) -> Result<Self, StoreError> {
        let mut program: Program = serde_json::from_value(doc.data.clone())?;
        program.id = doc.id.clone();
        Ok(program)
    }

    pub fn subject_name(&self, subject_id: &str) -> Option<&str> {
        self.subjects
            .iter()
            .find(|s| s.id == subject_id)
            .map(|s| s.name.as_str())
    }
}
