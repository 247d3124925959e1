pub mod cascade;
pub mod college;
pub mod resolver;

pub use cascade::{
    CascadeDeletionPlanner, CascadeError, CascadeReport, CascadeTarget, RelatedCounts,
    RelatedItemsCounter,
};
pub use college::CollegeProgramIndex;
pub use resolver::AssociationResolver;

pub(crate) const COURSES_COLLECTION: &str = "courses";
pub(crate) const PROGRAMS_COLLECTION: &str = "programs";
