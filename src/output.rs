//! CSV output for normalized records.
//!
//! Every table always gets a header row, also when it has no records. Missing
//! values are written as empty cells.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::{CourseGradeRow, CourseRecord, MeetingRecord, ProfessorRecord, SectionRecord};
use crate::error::Result;
use crate::sources::{CourseSearchOutput, GradesOutput, RatingsOutput};

const INSTRUCTOR_SEPARATOR: &str = "; ";

fn number(value: Option<f64>) -> Option<String> {
    value.map(|v| v.to_string())
}

fn rounded(value: Option<f64>) -> Option<String> {
    value.map(|v| format!("{v:.2}"))
}

// ============================================================================
// Rows
// ============================================================================

const COURSE_HEADERS: [&str; 19] = [
    "course_id",
    "subject_code",
    "course_designation",
    "full_course_designation",
    "title",
    "description",
    "prerequisites",
    "minimum_credits",
    "maximum_credits",
    "general_education",
    "ethnic_studies",
    "letters_and_science_credits",
    "social_science",
    "humanities",
    "biological_science",
    "physical_science",
    "natural_science",
    "literature",
    "level",
];

#[derive(Serialize)]
struct CourseRow<'a> {
    course_id: Option<&'a str>,
    subject_code: Option<&'a str>,
    course_designation: Option<&'a str>,
    full_course_designation: Option<&'a str>,
    title: Option<&'a str>,
    description: Option<&'a str>,
    prerequisites: Option<&'a str>,
    minimum_credits: Option<String>,
    maximum_credits: Option<String>,
    general_education: Option<&'a str>,
    ethnic_studies: Option<&'a str>,
    letters_and_science_credits: Option<&'a str>,
    social_science: Option<&'a str>,
    humanities: Option<&'a str>,
    biological_science: Option<&'a str>,
    physical_science: Option<&'a str>,
    natural_science: Option<&'a str>,
    literature: Option<&'a str>,
    level: Option<&'a str>,
}

impl<'a> From<&'a CourseRecord> for CourseRow<'a> {
    fn from(c: &'a CourseRecord) -> Self {
        Self {
            course_id: c.course_id.as_deref(),
            subject_code: c.subject_code.as_deref(),
            course_designation: c.course_designation.as_deref(),
            full_course_designation: c.full_course_designation.as_deref(),
            title: c.title.as_deref(),
            description: c.description.as_deref(),
            prerequisites: c.prerequisites.as_deref(),
            minimum_credits: number(c.minimum_credits),
            maximum_credits: number(c.maximum_credits),
            general_education: c.general_education.as_deref(),
            ethnic_studies: c.ethnic_studies.as_deref(),
            letters_and_science_credits: c.letters_and_science_credits.as_deref(),
            social_science: c.social_science.as_deref(),
            humanities: c.humanities.as_deref(),
            biological_science: c.biological_science.as_deref(),
            physical_science: c.physical_science.as_deref(),
            natural_science: c.natural_science.as_deref(),
            literature: c.literature.as_deref(),
            level: c.level.as_deref(),
        }
    }
}

const SECTION_HEADERS: [&str; 12] = [
    "section_id",
    "course_id",
    "subject_code",
    "catalog_number",
    "instructors",
    "status",
    "available_seats",
    "waitlist_total",
    "capacity",
    "enrolled",
    "instruction_mode",
    "is_asynchronous",
];

#[derive(Serialize)]
struct SectionRow<'a> {
    section_id: Option<&'a str>,
    course_id: Option<&'a str>,
    subject_code: Option<&'a str>,
    catalog_number: Option<&'a str>,
    instructors: String,
    status: &'a str,
    available_seats: i64,
    waitlist_total: i64,
    capacity: i64,
    enrolled: i64,
    instruction_mode: &'a str,
    is_asynchronous: bool,
}

impl<'a> From<&'a SectionRecord> for SectionRow<'a> {
    fn from(s: &'a SectionRecord) -> Self {
        Self {
            section_id: s.section_id.as_deref(),
            course_id: s.course_id.as_deref(),
            subject_code: s.subject_code.as_deref(),
            catalog_number: s.catalog_number.as_deref(),
            instructors: s.instructors.join(INSTRUCTOR_SEPARATOR),
            status: &s.status,
            available_seats: s.available_seats,
            waitlist_total: s.waitlist_total,
            capacity: s.capacity,
            enrolled: s.enrolled,
            instruction_mode: &s.instruction_mode,
            is_asynchronous: s.is_asynchronous,
        }
    }
}

const INSTRUCTOR_HEADERS: [&str; 2] = ["section_id", "instructor_name"];

#[derive(Serialize)]
struct InstructorRow<'a> {
    section_id: Option<&'a str>,
    instructor_name: &'a str,
}

const MEETING_HEADERS: [&str; 19] = [
    "section_id",
    "meeting_type",
    "meeting_number",
    "meeting_days",
    "start_time",
    "end_time",
    "building_name",
    "room",
    "location",
    "monday_meeting_start",
    "monday_meeting_end",
    "tuesday_meeting_start",
    "tuesday_meeting_end",
    "wednesday_meeting_start",
    "wednesday_meeting_end",
    "thursday_meeting_start",
    "thursday_meeting_end",
    "friday_meeting_start",
    "friday_meeting_end",
];

const GRADE_HEADERS: [&str; 13] = [
    "course_uuid",
    "course_name",
    "title",
    "cumulative_gpa",
    "most_recent_gpa",
    "median_letter_grade",
    "a_pct",
    "ab_pct",
    "b_pct",
    "bc_pct",
    "c_pct",
    "d_pct",
    "f_pct",
];

#[derive(Serialize)]
struct GradeRow<'a> {
    course_uuid: Option<&'a str>,
    course_name: &'a str,
    title: Option<&'a str>,
    cumulative_gpa: Option<String>,
    most_recent_gpa: Option<String>,
    median_letter_grade: Option<&'static str>,
    a_pct: Option<String>,
    ab_pct: Option<String>,
    b_pct: Option<String>,
    bc_pct: Option<String>,
    c_pct: Option<String>,
    d_pct: Option<String>,
    f_pct: Option<String>,
}

impl<'a> From<&'a CourseGradeRow> for GradeRow<'a> {
    fn from(row: &'a CourseGradeRow) -> Self {
        let s = &row.summary;
        Self {
            course_uuid: s.course_uuid.as_deref(),
            course_name: &row.course_name,
            title: row.title.as_deref(),
            cumulative_gpa: rounded(s.cumulative_gpa),
            most_recent_gpa: rounded(s.most_recent_gpa),
            median_letter_grade: s.median_letter_grade.map(|g| g.as_str()),
            a_pct: rounded(Some(s.a_pct)),
            ab_pct: rounded(Some(s.ab_pct)),
            b_pct: rounded(Some(s.b_pct)),
            bc_pct: rounded(Some(s.bc_pct)),
            c_pct: rounded(Some(s.c_pct)),
            d_pct: rounded(Some(s.d_pct)),
            f_pct: rounded(Some(s.f_pct)),
        }
    }
}

const PROFESSOR_HEADERS: [&str; 9] = [
    "id",
    "legacy_id",
    "first_name",
    "last_name",
    "department",
    "avg_rating",
    "num_ratings",
    "avg_difficulty",
    "would_take_again_percent",
];

#[derive(Serialize)]
struct ProfessorRow<'a> {
    id: Option<&'a str>,
    legacy_id: Option<&'a str>,
    first_name: Option<&'a str>,
    last_name: Option<&'a str>,
    department: Option<&'a str>,
    avg_rating: Option<String>,
    num_ratings: Option<i64>,
    avg_difficulty: Option<String>,
    would_take_again_percent: Option<String>,
}

impl<'a> From<&'a ProfessorRecord> for ProfessorRow<'a> {
    fn from(p: &'a ProfessorRecord) -> Self {
        Self {
            id: p.id.as_deref(),
            legacy_id: p.legacy_id.as_deref(),
            first_name: p.first_name.as_deref(),
            last_name: p.last_name.as_deref(),
            department: p.department.as_deref(),
            avg_rating: number(p.avg_rating),
            num_ratings: p.num_ratings,
            avg_difficulty: number(p.avg_difficulty),
            would_take_again_percent: number(p.would_take_again_percent),
        }
    }
}

// ============================================================================
// Writers
// ============================================================================

fn write_table<W, R, I>(writer: W, headers: &[&str], rows: I) -> Result<()>
where
    W: io::Write,
    R: Serialize,
    I: IntoIterator<Item = R>,
{
    let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    csv.write_record(headers)?;
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_courses<W: io::Write>(writer: W, courses: &[CourseRecord]) -> Result<()> {
    write_table(writer, &COURSE_HEADERS, courses.iter().map(CourseRow::from))
}

pub fn write_sections<W: io::Write>(writer: W, sections: &[SectionRecord]) -> Result<()> {
    write_table(writer, &SECTION_HEADERS, sections.iter().map(SectionRow::from))
}

/// One row per non-blank instructor name.
pub fn write_section_instructors<W: io::Write>(writer: W, sections: &[SectionRecord]) -> Result<()> {
    let rows = sections.iter().flat_map(|section| {
        section
            .instructors
            .iter()
            .filter(|name| !name.trim().is_empty())
            .map(move |name| InstructorRow {
                section_id: section.section_id.as_deref(),
                instructor_name: name,
            })
    });
    write_table(writer, &INSTRUCTOR_HEADERS, rows)
}

pub fn write_meetings<W: io::Write>(writer: W, meetings: &[MeetingRecord]) -> Result<()> {
    // Field order of MeetingRecord matches MEETING_HEADERS
    write_table(writer, &MEETING_HEADERS, meetings)
}

pub fn write_course_grades<W: io::Write>(writer: W, rows: &[CourseGradeRow]) -> Result<()> {
    write_table(writer, &GRADE_HEADERS, rows.iter().map(GradeRow::from))
}

pub fn write_professors<W: io::Write>(writer: W, professors: &[ProfessorRecord]) -> Result<()> {
    write_table(writer, &PROFESSOR_HEADERS, professors.iter().map(ProfessorRow::from))
}

fn create_file(dir: &Path, prefix: &str, name: &str) -> Result<(PathBuf, fs::File)> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{prefix}{name}"));
    let file = fs::File::create(&path)?;
    Ok((path, file))
}

/// Write the four course search tables into `dir` and return their paths.
pub fn write_course_search_csv(
    dir: &Path,
    prefix: &str,
    output: &CourseSearchOutput,
) -> Result<Vec<PathBuf>> {
    let (courses, file) = create_file(dir, prefix, "courses.csv")?;
    write_courses(file, &output.courses)?;

    let (sections, file) = create_file(dir, prefix, "sections.csv")?;
    write_sections(file, &output.sections)?;

    let (instructors, file) = create_file(dir, prefix, "section_instructors.csv")?;
    write_section_instructors(file, &output.sections)?;

    let (meetings, file) = create_file(dir, prefix, "section_meetings.csv")?;
    write_meetings(file, &output.meetings)?;

    let paths = vec![courses, sections, instructors, meetings];
    tracing::info!(dir = %dir.display(), files = paths.len(), "Wrote course search CSV files");
    Ok(paths)
}

pub fn write_grades_csv(dir: &Path, prefix: &str, output: &GradesOutput) -> Result<PathBuf> {
    let (path, file) = create_file(dir, prefix, "course_grades.csv")?;
    write_course_grades(file, &output.rows)?;
    tracing::info!(path = %path.display(), rows = output.rows.len(), "Wrote grades CSV");
    Ok(path)
}

pub fn write_ratings_csv(dir: &Path, prefix: &str, output: &RatingsOutput) -> Result<PathBuf> {
    let (path, file) = create_file(dir, prefix, "professors.csv")?;
    write_professors(file, &output.professors)?;
    tracing::info!(path = %path.display(), rows = output.professors.len(), "Wrote ratings CSV");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GradeSummary, LetterGrade};

    fn render<F>(write: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> Result<()>,
    {
        let mut buffer = Vec::new();
        write(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    fn section(id: &str, instructors: &[&str]) -> SectionRecord {
        SectionRecord {
            section_id: Some(id.to_string()),
            course_id: Some("022973".to_string()),
            subject_code: Some("270".to_string()),
            catalog_number: None,
            instructors: instructors.iter().map(|s| s.to_string()).collect(),
            status: "OPEN".to_string(),
            available_seats: 5,
            waitlist_total: 0,
            capacity: 30,
            enrolled: 25,
            instruction_mode: "Classroom Instruction".to_string(),
            is_asynchronous: false,
        }
    }

    #[test]
    fn test_empty_table_still_has_header() {
        let out = render(|w| write_professors(w, &[]));
        assert_eq!(out, format!("{}\n", PROFESSOR_HEADERS.join(",")));
    }

    #[test]
    fn test_courses_quote_and_blank_nulls() {
        let course = CourseRecord {
            course_id: Some("1".to_string()),
            title: Some("Ethics, \"Applied\"".to_string()),
            minimum_credits: Some(3.0),
            maximum_credits: Some(4.5),
            ..CourseRecord::default()
        };
        let out = render(|w| write_courses(w, &[course]));
        let line = out.lines().nth(1).unwrap();
        assert_eq!(line, "1,,,,\"Ethics, \"\"Applied\"\"\",,,3,4.5,,,,,,,,,,");
    }

    #[test]
    fn test_sections_join_instructors() {
        let out = render(|w| write_sections(w, &[section("11", &["Ada Lovelace", "Alan Turing"])]));
        let line = out.lines().nth(1).unwrap();
        assert_eq!(
            line,
            "11,022973,270,,Ada Lovelace; Alan Turing,OPEN,5,0,30,25,Classroom Instruction,false"
        );
    }

    #[test]
    fn test_instructor_rows_skip_blank_names() {
        let sections = [section("11", &["Ada Lovelace", " ", ""]), section("12", &["Grace Hopper"])];
        let out = render(|w| write_section_instructors(w, &sections));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec!["section_id,instructor_name", "11,Ada Lovelace", "12,Grace Hopper"]
        );
    }

    #[test]
    fn test_meeting_columns_line_up() {
        let meeting = MeetingRecord {
            section_id: Some("11".to_string()),
            meeting_type: Some("LEC".to_string()),
            meeting_number: Some(1),
            monday_start: Some(32_400_000),
            friday_end: Some(36_000_000),
            ..MeetingRecord::default()
        };
        let out = render(|w| write_meetings(w, &[meeting]));
        let mut lines = out.lines();
        let header: Vec<&str> = lines.next().unwrap().split(',').collect();
        let values: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(header.len(), values.len());

        let column = |name: &str| values[header.iter().position(|h| *h == name).unwrap()];
        assert_eq!(column("meeting_type"), "LEC");
        assert_eq!(column("monday_meeting_start"), "32400000");
        assert_eq!(column("friday_meeting_end"), "36000000");
        assert_eq!(column("tuesday_meeting_start"), "");
    }

    #[test]
    fn test_grades_round_to_two_decimals() {
        let row = CourseGradeRow {
            course_name: "COMP SCI 400".to_string(),
            title: Some("Programming III".to_string()),
            summary: GradeSummary {
                course_uuid: Some("u1".to_string()),
                cumulative_gpa: Some(3.456_78),
                most_recent_gpa: None,
                median_letter_grade: Some(LetterGrade::AB),
                a_pct: 0.5,
                ab_pct: 0.25,
                b_pct: 0.25,
                bc_pct: 0.0,
                c_pct: 0.0,
                d_pct: 0.0,
                f_pct: 0.0,
            },
        };
        let out = render(|w| write_course_grades(w, &[row]));
        assert_eq!(
            out.lines().nth(1).unwrap(),
            "u1,COMP SCI 400,Programming III,3.46,,AB,0.50,0.25,0.25,0.00,0.00,0.00,0.00"
        );
    }

    #[test]
    fn test_file_names_use_prefix() {
        let dir = std::env::temp_dir().join(format!("coursefetch-{}", uuid::Uuid::new_v4()));
        let output = CourseSearchOutput::default();

        let paths = write_course_search_csv(&dir, "test_", &output).unwrap();
        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "test_courses.csv",
                "test_sections.csv",
                "test_section_instructors.csv",
                "test_section_meetings.csv"
            ]
        );
        assert!(paths.iter().all(|p| p.exists()));

        fs::remove_dir_all(&dir).unwrap();
    }
}
