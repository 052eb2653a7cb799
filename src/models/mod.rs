pub mod course;
pub mod semester;

pub use course::{Course, CourseKey, CourseListing, Meeting, Professor, Section, SectionGroup};
pub use semester::{NewSemester, Semester};
