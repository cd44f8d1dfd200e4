//! Grade distributions: GPA, per-letter shares and median letter grade.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::de::{lenient, lenient_count, lenient_list, string_or_number};

/// Letter grades that count toward a GPA, ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LetterGrade {
    F,
    D,
    C,
    BC,
    B,
    AB,
    A,
}

impl LetterGrade {
    /// Worst to best.
    pub const ALL: [LetterGrade; 7] = [
        LetterGrade::F,
        LetterGrade::D,
        LetterGrade::C,
        LetterGrade::BC,
        LetterGrade::B,
        LetterGrade::AB,
        LetterGrade::A,
    ];

    /// Grade points on the 4.0 scale.
    pub fn weight(self) -> f64 {
        match self {
            LetterGrade::A => 4.0,
            LetterGrade::AB => 3.5,
            LetterGrade::B => 3.0,
            LetterGrade::BC => 2.5,
            LetterGrade::C => 2.0,
            LetterGrade::D => 1.0,
            LetterGrade::F => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LetterGrade::A => "A",
            LetterGrade::AB => "AB",
            LetterGrade::B => "B",
            LetterGrade::BC => "BC",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::F => "F",
        }
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-letter counts as reported by the grades API.
///
/// Non-letter outcomes (S/U, credit, incomplete, ...) are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradeCounts {
    #[serde(deserialize_with = "lenient_count")]
    pub a_count: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub ab_count: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub b_count: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub bc_count: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub c_count: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub d_count: u64,
    #[serde(deserialize_with = "lenient_count")]
    pub f_count: u64,
}

impl GradeCounts {
    pub fn count(&self, grade: LetterGrade) -> u64 {
        match grade {
            LetterGrade::A => self.a_count,
            LetterGrade::AB => self.ab_count,
            LetterGrade::B => self.b_count,
            LetterGrade::BC => self.bc_count,
            LetterGrade::C => self.c_count,
            LetterGrade::D => self.d_count,
            LetterGrade::F => self.f_count,
        }
    }

    /// Number of letter grades given, F included. Saturates at `u64::MAX`.
    pub fn total(&self) -> u64 {
        LetterGrade::ALL
            .iter()
            .fold(0u64, |sum, g| sum.saturating_add(self.count(*g)))
    }

    /// Weighted average on the 4.0 scale; `None` when nothing was graded.
    pub fn gpa(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let points: f64 = LetterGrade::ALL
            .iter()
            .map(|g| g.weight() * self.count(*g) as f64)
            .sum();
        Some(points / total as f64)
    }

    /// Middle element of the worst-to-best expansion of all grades.
    ///
    /// Uses index `floor(n / 2)`, so for an even count the upper of the two
    /// middle grades is picked.
    pub fn median(&self) -> Option<LetterGrade> {
        let middle = self.total() / 2;
        let mut seen = 0u64;
        for grade in LetterGrade::ALL {
            seen = seen.saturating_add(self.count(grade));
            if seen > middle {
                return Some(grade);
            }
        }
        None
    }

    /// Share of `grade` among all letter grades, 0 when nothing was graded.
    pub fn share(&self, grade: LetterGrade) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.count(grade) as f64 / total as f64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCourseOffering {
    #[serde(deserialize_with = "string_or_number")]
    pub term_code: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub cumulative: Option<GradeCounts>,
}

/// Payload of `courses/{uuid}/grades`. A mistyped field reads as `None`
/// without dropping the distribution.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawGradeDistribution {
    #[serde(deserialize_with = "string_or_number")]
    pub course_uuid: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub cumulative: Option<GradeCounts>,
    /// Most recent term first
    #[serde(deserialize_with = "lenient_list")]
    pub course_offerings: Option<Vec<RawCourseOffering>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeSummary {
    pub course_uuid: Option<String>,
    pub cumulative_gpa: Option<f64>,
    pub most_recent_gpa: Option<f64>,
    pub median_letter_grade: Option<LetterGrade>,
    pub a_pct: f64,
    pub ab_pct: f64,
    pub b_pct: f64,
    pub bc_pct: f64,
    pub c_pct: f64,
    pub d_pct: f64,
    pub f_pct: f64,
}

/// Summarize a distribution. Shares and median use the all-time counts; the
/// most recent GPA uses the first course offering.
pub fn aggregate_grades(distribution: &RawGradeDistribution) -> GradeSummary {
    let counts = distribution.cumulative.unwrap_or_default();
    let most_recent_gpa = distribution
        .course_offerings
        .as_ref()
        .and_then(|offerings| offerings.first())
        .and_then(|offering| offering.cumulative.unwrap_or_default().gpa());

    GradeSummary {
        course_uuid: distribution.course_uuid.clone(),
        cumulative_gpa: counts.gpa(),
        most_recent_gpa,
        median_letter_grade: counts.median(),
        a_pct: counts.share(LetterGrade::A),
        ab_pct: counts.share(LetterGrade::AB),
        b_pct: counts.share(LetterGrade::B),
        bc_pct: counts.share(LetterGrade::BC),
        c_pct: counts.share(LetterGrade::C),
        d_pct: counts.share(LetterGrade::D),
        f_pct: counts.share(LetterGrade::F),
    }
}

// ============================================================================
// Course listing and per-subject expansion
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GradeSubject {
    #[serde(deserialize_with = "string_or_number")]
    pub abbreviation: Option<String>,
}

/// One course of the grades API listing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GradeListing {
    #[serde(deserialize_with = "string_or_number")]
    pub uuid: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub number: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub subjects: Option<Vec<GradeSubject>>,
}

/// A grade summary under one of the course's cross-listed names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseGradeRow {
    /// `"<ABBR> <number>"`, e.g. `"COMP SCI 400"`
    pub course_name: String,
    pub title: Option<String>,
    pub summary: GradeSummary,
}

/// One row per subject abbreviation the course is listed under.
pub fn expand_grade_rows(listing: &GradeListing, summary: &GradeSummary) -> Vec<CourseGradeRow> {
    let number = listing.number.as_deref().unwrap_or("");
    let mut summary = summary.clone();
    if summary.course_uuid.is_none() {
        summary.course_uuid = listing.uuid.clone();
    }

    listing
        .subjects
        .iter()
        .flatten()
        .filter_map(|subject| subject.abbreviation.as_deref())
        .filter(|abbreviation| !abbreviation.is_empty())
        .map(|abbreviation| CourseGradeRow {
            course_name: format!("{abbreviation} {number}").trim().to_string(),
            title: listing.name.clone(),
            summary: summary.clone(),
        })
        .collect()
}
