pub mod course;
pub mod filter;
pub mod program;

pub use course::{Association, AssociationSource, Course};
pub use filter::CourseFilter;
pub use program::{Program, Subject};
