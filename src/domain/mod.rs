//! Raw payload shapes and the pure normalizers that flatten them.
//!
//! Nothing in here performs I/O or fails: missing or mistyped fields fall back
//! to `None` or a documented default so a single odd record never costs the
//! rest of a run.

pub mod course;
pub mod grades;
pub mod professor;
pub mod section;
pub mod time;

pub(crate) mod de;

pub use course::{CourseRecord, RawCourseHit, normalize_course};
pub use grades::{
    CourseGradeRow, GradeCounts, GradeListing, GradeSummary, LetterGrade, RawGradeDistribution,
    aggregate_grades, expand_grade_rows,
};
pub use professor::{ProfessorRecord, RawProfessorNode, normalize_professor};
pub use section::{
    MeetingRecord, NormalizedSections, RawSectionPackage, SectionRecord, normalize_package,
    normalize_sections,
};
pub use time::{MeetingTimePolicy, format_time};
