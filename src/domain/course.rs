//! Course search hits and the flat course record derived from them.

use serde::{Deserialize, Serialize};

use super::de::{lenient, lenient_f64, lenient_list, string_or_number};

/// A `{ "code": ... }` tag as used for breadths, levels and requirement flags.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CodeTag {
    #[serde(deserialize_with = "string_or_number")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSubject {
    #[serde(deserialize_with = "string_or_number")]
    pub subject_code: Option<String>,
}

/// One hit of the course search listing.
///
/// Every field is optional and tolerant of the wrong JSON type, so any JSON
/// object decodes as a hit.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCourseHit {
    #[serde(deserialize_with = "string_or_number")]
    pub course_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub subject: Option<RawSubject>,
    #[serde(deserialize_with = "string_or_number")]
    pub course_designation: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub full_course_designation: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub title: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub description: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub enrollment_prerequisites: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub minimum_credits: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub maximum_credits: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub general_ed: Option<CodeTag>,
    #[serde(deserialize_with = "lenient")]
    pub ethnic_studies: Option<CodeTag>,
    #[serde(deserialize_with = "lenient")]
    pub letters_and_science_credits: Option<CodeTag>,
    #[serde(deserialize_with = "lenient_list")]
    pub breadths: Option<Vec<CodeTag>>,
    #[serde(deserialize_with = "lenient_list")]
    pub levels: Option<Vec<CodeTag>>,
}

/// Flat course record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CourseRecord {
    pub course_id: Option<String>,
    pub subject_code: Option<String>,
    pub course_designation: Option<String>,
    pub full_course_designation: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub prerequisites: Option<String>,
    pub minimum_credits: Option<f64>,
    pub maximum_credits: Option<f64>,
    pub general_education: Option<String>,
    pub ethnic_studies: Option<String>,
    pub letters_and_science_credits: Option<String>,
    pub social_science: Option<String>,
    pub humanities: Option<String>,
    pub biological_science: Option<String>,
    pub physical_science: Option<String>,
    pub natural_science: Option<String>,
    pub literature: Option<String>,
    pub level: Option<String>,
}

/// Breadth categories and the tag code that marks each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Breadth {
    SocialScience,
    Humanities,
    BiologicalScience,
    PhysicalScience,
    NaturalScience,
    Literature,
}

impl Breadth {
    pub fn code(self) -> &'static str {
        match self {
            Breadth::SocialScience => "S",
            Breadth::Humanities => "H",
            Breadth::BiologicalScience => "B",
            Breadth::PhysicalScience => "P",
            Breadth::NaturalScience => "N",
            Breadth::Literature => "L",
        }
    }
}

/// First tag of `category` in the breadth list, if any.
///
/// Courses are expected to carry at most one tag per category. When the
/// upstream data has more, the first one wins and the duplicate is logged.
fn breadth_code(hit: &RawCourseHit, category: Breadth) -> Option<String> {
    let breadths = hit.breadths.as_deref()?;
    let mut matches = breadths
        .iter()
        .filter_map(|tag| tag.code.as_deref())
        .filter(|code| *code == category.code());

    let first = matches.next()?;
    let extra = matches.count();
    if extra > 0 {
        tracing::warn!(
            course_id = ?hit.course_id,
            breadth = category.code(),
            duplicates = extra,
            "Course carries more than one tag of the same breadth category, using the first"
        );
    }
    Some(first.to_string())
}

fn tag_code(tag: &Option<CodeTag>) -> Option<String> {
    tag.as_ref().and_then(|t| t.code.clone())
}

/// Flatten a search hit. Missing fields become `None`; never fails.
pub fn normalize_course(hit: &RawCourseHit) -> CourseRecord {
    CourseRecord {
        course_id: hit.course_id.clone(),
        subject_code: hit.subject.as_ref().and_then(|s| s.subject_code.clone()),
        course_designation: hit.course_designation.clone(),
        full_course_designation: hit.full_course_designation.clone(),
        title: hit.title.clone(),
        description: hit.description.clone(),
        prerequisites: hit.enrollment_prerequisites.clone(),
        minimum_credits: hit.minimum_credits,
        maximum_credits: hit.maximum_credits,
        general_education: tag_code(&hit.general_ed),
        ethnic_studies: tag_code(&hit.ethnic_studies),
        letters_and_science_credits: tag_code(&hit.letters_and_science_credits),
        social_science: breadth_code(hit, Breadth::SocialScience),
        humanities: breadth_code(hit, Breadth::Humanities),
        biological_science: breadth_code(hit, Breadth::BiologicalScience),
        physical_science: breadth_code(hit, Breadth::PhysicalScience),
        natural_science: breadth_code(hit, Breadth::NaturalScience),
        literature: breadth_code(hit, Breadth::Literature),
        level: hit
            .levels
            .as_ref()
            .and_then(|levels| levels.first())
            .and_then(|level| level.code.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(value: serde_json::Value) -> RawCourseHit {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_full_hit() {
        let record = normalize_course(&hit(json!({
            "courseId": "024798",
            "subject": { "subjectCode": "266" },
            "courseDesignation": "COMP SCI 400",
            "fullCourseDesignation": "COMPUTER SCIENCES 400",
            "title": "Programming III",
            "description": "The third course in our programming fundamentals sequence.",
            "enrollmentPrerequisites": "COMP SCI 300",
            "minimumCredits": 3,
            "maximumCredits": 3,
            "generalEd": null,
            "ethnicStudies": null,
            "lettersAndScienceCredits": { "code": "C" },
            "breadths": [{ "code": "N" }, { "code": "P" }],
            "levels": [{ "code": "I" }, { "code": "A" }],
            "someNewField": { "ignored": true }
        })));

        assert_eq!(record.course_id.as_deref(), Some("024798"));
        assert_eq!(record.subject_code.as_deref(), Some("266"));
        assert_eq!(record.prerequisites.as_deref(), Some("COMP SCI 300"));
        assert_eq!(record.minimum_credits, Some(3.0));
        assert_eq!(record.general_education, None);
        assert_eq!(record.letters_and_science_credits.as_deref(), Some("C"));
        assert_eq!(record.natural_science.as_deref(), Some("N"));
        assert_eq!(record.physical_science.as_deref(), Some("P"));
        assert_eq!(record.social_science, None);
        assert_eq!(record.humanities, None);
        assert_eq!(record.level.as_deref(), Some("I"));
    }

    #[test]
    fn test_empty_hit_normalizes_to_all_none() {
        assert_eq!(normalize_course(&hit(json!({}))), CourseRecord::default());
    }

    #[test]
    fn test_numeric_identifiers_are_accepted() {
        let record = normalize_course(&hit(json!({
            "courseId": 22973,
            "subject": { "subjectCode": 270 }
        })));
        assert_eq!(record.course_id.as_deref(), Some("22973"));
        assert_eq!(record.subject_code.as_deref(), Some("270"));
    }

    #[test]
    fn test_mistyped_fields_fall_back_to_none() {
        let record = normalize_course(&hit(json!({
            "courseId": "024798",
            "subject": "266",
            "title": 400,
            "generalEd": "COM A",
            "ethnicStudies": [],
            "minimumCredits": { "value": 3 },
            "breadths": [{ "code": "N" }, null, "S"],
            "levels": { "code": "I" }
        })));

        assert_eq!(record.course_id.as_deref(), Some("024798"));
        assert_eq!(record.subject_code, None);
        assert_eq!(record.title.as_deref(), Some("400"));
        assert_eq!(record.general_education, None);
        assert_eq!(record.ethnic_studies, None);
        assert_eq!(record.minimum_credits, None);
        assert_eq!(record.natural_science.as_deref(), Some("N"));
        assert_eq!(record.social_science, None);
        assert_eq!(record.level, None);
    }

    #[test_log::test]
    fn test_duplicate_breadth_tags_take_first_match() {
        let record = normalize_course(&hit(json!({
            "breadths": [{ "code": "H" }, { "code": "L" }, { "code": "H" }]
        })));
        assert_eq!(record.humanities.as_deref(), Some("H"));
        assert_eq!(record.literature.as_deref(), Some("L"));
    }

    #[test]
    fn test_field_order_is_irrelevant() {
        let a: RawCourseHit = serde_json::from_str(
            r#"{"courseId":"1","title":"T","breadths":[{"code":"S"}],"levels":[{"code":"E"}]}"#,
        )
        .unwrap();
        let b: RawCourseHit = serde_json::from_str(
            r#"{"levels":[{"code":"E"}],"breadths":[{"code":"S"}],"title":"T","courseId":"1"}"#,
        )
        .unwrap();
        assert_eq!(normalize_course(&a), normalize_course(&b));
    }
}
