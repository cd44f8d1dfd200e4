//! Enrollment packages flattened into section and meeting records.
//!
//! A package is one schedulable offering of a course in a term. It nests one
//! or more section offerings (lecture, discussion, lab, ...), each with its own
//! class meetings and exams.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::de::{lenient, lenient_bool, lenient_i64, lenient_list, string_or_number};
use super::time::{MeetingTimePolicy, format_time};

const UNKNOWN: &str = "UNKNOWN";
const CLASS_MEETING: &str = "CLASS";

// ============================================================================
// Raw payload
// ============================================================================

/// One enrollment package.
///
/// Every field is optional and tolerant of the wrong JSON type; a mistyped
/// nested field reads as `None` and the rest of the package is kept.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSectionPackage {
    #[serde(deserialize_with = "string_or_number")]
    pub enrollment_class_number: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub course_id: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub subject_code: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub catalog_number: Option<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub sections: Option<Vec<RawNestedSection>>,
    #[serde(deserialize_with = "lenient")]
    pub package_enrollment_status: Option<RawPackageStatus>,
    #[serde(deserialize_with = "lenient_bool")]
    pub is_asynchronous: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPackageStatus {
    #[serde(deserialize_with = "string_or_number")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub available_seats: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub waitlist_total: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawNestedSection {
    /// Offering type such as `LEC` or `DIS`
    #[serde(rename = "type", deserialize_with = "string_or_number")]
    pub section_type: Option<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub instructors: Option<Vec<RawInstructor>>,
    #[serde(deserialize_with = "string_or_number")]
    pub instruction_mode: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub enrollment_status: Option<RawSectionEnrollment>,
    #[serde(deserialize_with = "lenient_list")]
    pub class_meetings: Option<Vec<RawMeeting>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawInstructor {
    #[serde(deserialize_with = "lenient")]
    pub name: Option<RawPersonName>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawPersonName {
    #[serde(deserialize_with = "string_or_number")]
    pub first: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub last: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSectionEnrollment {
    #[serde(deserialize_with = "lenient_i64")]
    pub capacity: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub currently_enrolled: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMeeting {
    #[serde(deserialize_with = "string_or_number")]
    pub meeting_type: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub meeting_or_exam_number: Option<i64>,
    /// Abbreviated day string such as `MWF`; informational only
    #[serde(deserialize_with = "string_or_number")]
    pub meeting_days: Option<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub meeting_days_list: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient_i64")]
    pub meeting_time_start: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub meeting_time_end: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    pub building: Option<RawBuilding>,
    #[serde(deserialize_with = "string_or_number")]
    pub room: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawBuilding {
    #[serde(deserialize_with = "string_or_number")]
    pub building_name: Option<String>,
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionRecord {
    pub section_id: Option<String>,
    pub course_id: Option<String>,
    pub subject_code: Option<String>,
    pub catalog_number: Option<String>,
    /// "First Last" names of the primary offering's instructors, in order
    pub instructors: Vec<String>,
    pub status: String,
    pub available_seats: i64,
    pub waitlist_total: i64,
    pub capacity: i64,
    pub enrolled: i64,
    pub instruction_mode: String,
    pub is_asynchronous: bool,
}

/// The first class meeting of one nested section offering.
///
/// Each weekday pair carries the raw millisecond values and is set only when
/// that day appears in the meeting's day list. The pair mirrors the meeting's
/// own start and end, so a listed day stays `None` on whichever side the
/// meeting has no time for.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeetingRecord {
    pub section_id: Option<String>,
    pub meeting_type: Option<String>,
    pub meeting_number: Option<i64>,
    pub meeting_days: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub building_name: Option<String>,
    pub room: Option<String>,
    pub location: Option<String>,
    pub monday_start: Option<i64>,
    pub monday_end: Option<i64>,
    pub tuesday_start: Option<i64>,
    pub tuesday_end: Option<i64>,
    pub wednesday_start: Option<i64>,
    pub wednesday_end: Option<i64>,
    pub thursday_start: Option<i64>,
    pub thursday_end: Option<i64>,
    pub friday_start: Option<i64>,
    pub friday_end: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedSections {
    pub sections: Vec<SectionRecord>,
    pub meetings: Vec<MeetingRecord>,
}

impl NormalizedSections {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.meetings.is_empty()
    }

    pub fn extend(&mut self, other: NormalizedSections) {
        self.sections.extend(other.sections);
        self.meetings.extend(other.meetings);
    }
}

// ============================================================================
// Normalization
// ============================================================================

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

fn instructor_name(instructor: &RawInstructor) -> String {
    let (first, last) = match &instructor.name {
        Some(name) => (
            name.first.as_deref().unwrap_or(""),
            name.last.as_deref().unwrap_or(""),
        ),
        None => ("", ""),
    };
    format!("{first} {last}").trim().to_string()
}

fn section_record(package: &RawSectionPackage) -> SectionRecord {
    let primary = package.sections.as_ref().and_then(|s| s.first());
    let status = package.package_enrollment_status.as_ref();
    let enrollment = primary.and_then(|p| p.enrollment_status.as_ref());

    SectionRecord {
        section_id: package.enrollment_class_number.clone(),
        course_id: package.course_id.clone(),
        subject_code: package.subject_code.clone(),
        catalog_number: package.catalog_number.clone(),
        instructors: primary
            .and_then(|p| p.instructors.as_ref())
            .map(|list| list.iter().map(instructor_name).collect())
            .unwrap_or_default(),
        status: status
            .and_then(|s| non_empty(&s.status))
            .unwrap_or_else(|| UNKNOWN.to_string()),
        available_seats: status.and_then(|s| s.available_seats).unwrap_or(0),
        waitlist_total: status.and_then(|s| s.waitlist_total).unwrap_or(0),
        capacity: enrollment.and_then(|e| e.capacity).unwrap_or(0),
        enrolled: enrollment.and_then(|e| e.currently_enrolled).unwrap_or(0),
        instruction_mode: primary
            .and_then(|p| non_empty(&p.instruction_mode))
            .unwrap_or_else(|| UNKNOWN.to_string()),
        is_asynchronous: package.is_asynchronous.unwrap_or(false),
    }
}

fn meeting_record(
    section_id: &Option<String>,
    offering: &RawNestedSection,
    meeting: &RawMeeting,
    policy: MeetingTimePolicy,
) -> MeetingRecord {
    let start = meeting.meeting_time_start;
    let end = meeting.meeting_time_end;

    let mut record = MeetingRecord {
        section_id: section_id.clone(),
        meeting_type: offering.section_type.clone(),
        meeting_number: meeting.meeting_or_exam_number,
        meeting_days: non_empty(&meeting.meeting_days),
        start_time: format_time(start, policy),
        end_time: format_time(end, policy),
        building_name: meeting
            .building
            .as_ref()
            .and_then(|b| non_empty(&b.building_name)),
        room: non_empty(&meeting.room),
        location: meeting.building.as_ref().map(|building| {
            format!(
                "{} {}",
                building.building_name.as_deref().unwrap_or(""),
                meeting.room.as_deref().unwrap_or("")
            )
            .trim()
            .to_string()
        }),
        ..MeetingRecord::default()
    };

    let days = meeting.meeting_days_list.as_deref().unwrap_or_default();
    if !days.is_empty() && (start.is_none() || end.is_none()) {
        tracing::warn!(
            section_id = section_id.as_deref().unwrap_or(""),
            ?days,
            "Meeting lists days without a start or end time"
        );
    }

    for day in days {
        let slot = match day.to_ascii_uppercase().as_str() {
            "MONDAY" => (&mut record.monday_start, &mut record.monday_end),
            "TUESDAY" => (&mut record.tuesday_start, &mut record.tuesday_end),
            "WEDNESDAY" => (&mut record.wednesday_start, &mut record.wednesday_end),
            "THURSDAY" => (&mut record.thursday_start, &mut record.thursday_end),
            "FRIDAY" => (&mut record.friday_start, &mut record.friday_end),
            _ => continue,
        };
        *slot.0 = start;
        *slot.1 = end;
    }

    record
}

/// Flatten one package into its section record and its class meetings.
pub fn normalize_package(
    package: &RawSectionPackage,
    policy: MeetingTimePolicy,
) -> (SectionRecord, Vec<MeetingRecord>) {
    let section = section_record(package);

    let meetings = package
        .sections
        .iter()
        .flatten()
        .filter_map(|offering| {
            offering
                .class_meetings
                .iter()
                .flatten()
                .find(|m| {
                    m.meeting_type
                        .as_deref()
                        .is_some_and(|t| t.eq_ignore_ascii_case(CLASS_MEETING))
                })
                .map(|meeting| {
                    meeting_record(&package.enrollment_class_number, offering, meeting, policy)
                })
        })
        .collect();

    (section, meetings)
}

/// Flatten an enrollment-package list payload.
///
/// Anything but a JSON array yields empty output. Array elements that do not
/// have the package shape are skipped with a warning.
pub fn normalize_sections(payload: &Value, policy: MeetingTimePolicy) -> NormalizedSections {
    let Some(packages) = payload.as_array() else {
        if !payload.is_null() {
            tracing::debug!(kind = json_kind(payload), "Section payload is not a list, ignoring");
        }
        return NormalizedSections::default();
    };

    let mut out = NormalizedSections::default();
    for (index, element) in packages.iter().enumerate() {
        match RawSectionPackage::deserialize(element) {
            Ok(package) => {
                let (section, meetings) = normalize_package(&package, policy);
                out.sections.push(section);
                out.meetings.extend(meetings);
            }
            Err(e) => {
                tracing::warn!(index, error = %e, "Skipping malformed enrollment package");
            }
        }
    }
    out
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
