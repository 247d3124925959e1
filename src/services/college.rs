use std::collections::{HashMap, HashSet};

use crate::models::{Association, Program};

/// Mapping from a college id to the programs it owns, built from the
/// `programs` collection. Colleges are never stored on a course or an
/// association, so this index is the only route to college filtering.
#[derive(Debug, Default)]
pub struct CollegeProgramIndex {
    by_college: HashMap<String, HashSet<String>>,
}

impl CollegeProgramIndex {
    pub fn build(programs: &[Program]) -> Self {
        let mut by_college: HashMap<String, HashSet<String>> = HashMap::new();
        for program in programs {
            by_college
                .entry(program.college_id.clone())
                .or_default()
                .insert(program.id.clone());
        }
        Self { by_college }
    }

    /// True when any association points at a program the college owns.
    pub fn belongs_to_college(&self, associations: &[Association], college_id: &str) -> bool {
        let Some(programs) = self.by_college.get(college_id) else {
            return false;
        };
        associations.iter().any(|a| programs.contains(&a.program_id))
    }
}
