//! Course search and enrollment packages.
//!
//! One POST to the search endpoint lists every course of a term; each course
//! then gets a GET for its enrollment packages, fanned out through the batch
//! scheduler.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{fetch_all, listing_error, validate_common};
use crate::batch::{BatchPlan, BatchStats};
use crate::domain::{
    CourseRecord, MeetingRecord, MeetingTimePolicy, NormalizedSections, RawCourseHit,
    SectionRecord, normalize_course, normalize_sections,
};
use crate::error::{CoursefetchError, Result};
use crate::fetch::{RetryPolicy, fetch_with_retry};
use crate::http::HttpClient;
use crate::request::RequestSpec;

const SOURCE: &str = "course_search";

/// Configuration for the course search source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSearchConfig {
    /// API root, without trailing slash
    pub base_url: String,

    /// Term to list, e.g. "1262"
    pub term_code: String,

    /// Page size requested from the search listing
    pub page_size: u32,

    /// Only keep the first N hits (None = all)
    pub course_limit: Option<usize>,

    /// Value for the Authorization header, if the deployment requires one
    pub authorization: Option<String>,

    pub retry: RetryPolicy,

    pub batch: BatchPlan,

    /// Timeout for each individual request attempt in milliseconds
    pub timeout_ms: u64,

    /// How meeting times are printed
    pub time_policy: MeetingTimePolicy,
}

impl Default for CourseSearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://public.enroll.wisc.edu/api".to_string(),
            term_code: "1262".to_string(),
            page_size: 10_000,
            course_limit: None,
            authorization: Some("Basic dGVzdDp0ZXN0".to_string()),
            retry: RetryPolicy::default(),
            batch: BatchPlan::default(),
            timeout_ms: 30_000,
            time_policy: MeetingTimePolicy::SourceLocal,
        }
    }
}

impl CourseSearchConfig {
    pub fn validate(&self) -> Result<()> {
        validate_common(SOURCE, &self.base_url, &self.retry, self.timeout_ms)?;
        self.batch.validate()?;
        if self.term_code.trim().is_empty() {
            return Err(CoursefetchError::InvalidConfig(
                "course_search: term_code must not be empty".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(CoursefetchError::InvalidConfig(
                "course_search: page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// The search listing request for the configured term.
    pub fn search_request(&self) -> RequestSpec {
        let body = json!({
            "selectedTerm": self.term_code,
            "queryString": "*",
            "filters": [{
                "has_child": {
                    "type": "enrollmentPackage",
                    "query": {
                        "bool": {
                            "must": [
                                { "match": { "packageEnrollmentStatus.status": "OPEN WAITLISTED CLOSED" } },
                                { "match": { "published": true } }
                            ]
                        }
                    }
                }
            }],
            "page": 1,
            "pageSize": self.page_size,
            "sortOrder": "SCORE"
        });

        RequestSpec::post_json(format!("{}/search/v1", self.base()), &body)
            .with_header("Accept", "application/json")
            .with_optional_header("Authorization", self.authorization.as_deref())
    }

    /// Enrollment packages of one course in the configured term.
    pub fn packages_request(&self, subject_code: &str, course_id: &str) -> RequestSpec {
        RequestSpec::get(format!(
            "{}/search/v1/enrollmentPackages/{}/{}/{}",
            self.base(),
            self.term_code,
            subject_code,
            course_id
        ))
        .with_header("Accept", "application/json")
        .with_optional_header("Authorization", self.authorization.as_deref())
    }
}

/// Everything one course search run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CourseSearchOutput {
    pub courses: Vec<CourseRecord>,
    pub sections: Vec<SectionRecord>,
    pub meetings: Vec<MeetingRecord>,
    /// Outcome of the enrollment package fetches
    pub stats: BatchStats,
}

/// Run the search listing and return the hits, truncated to `course_limit`.
///
/// # Errors
/// `Listing` when the search call fails after retries or its payload has no
/// `hits` array. Individual malformed hits are skipped.
#[tracing::instrument(skip(client, config), fields(term = %config.term_code))]
pub async fn list_courses<H: HttpClient>(
    client: &H,
    config: &CourseSearchConfig,
) -> Result<Vec<RawCourseHit>> {
    let request = config.search_request();
    let payload = fetch_with_retry(client, &request, &config.retry, config.timeout_ms)
        .await
        .map_err(|e| listing_error(SOURCE, e))?;

    let hits = payload
        .get("hits")
        .and_then(Value::as_array)
        .ok_or_else(|| listing_error(SOURCE, "search response has no hits array"))?;

    let mut parsed = Vec::with_capacity(hits.len());
    for (index, hit) in hits.iter().enumerate() {
        match RawCourseHit::deserialize(hit) {
            Ok(hit) => parsed.push(hit),
            Err(e) => tracing::warn!(index, error = %e, "Skipping malformed course hit"),
        }
    }

    if let Some(limit) = config.course_limit
        && parsed.len() > limit
    {
        tracing::info!(found = parsed.len(), limit, "Truncating course list");
        parsed.truncate(limit);
    }

    tracing::info!(count = parsed.len(), "Listed courses");
    Ok(parsed)
}

/// List the term's courses and fetch the enrollment packages of each.
#[tracing::instrument(skip(client, config), fields(term = %config.term_code))]
pub async fn scrape_courses<H: HttpClient + 'static>(
    client: &H,
    config: &CourseSearchConfig,
) -> Result<CourseSearchOutput> {
    config.validate()?;

    let hits = list_courses(client, config).await?;
    let courses: Vec<CourseRecord> = hits.iter().map(normalize_course).collect();

    let mut keys = Vec::with_capacity(courses.len());
    let mut requests = Vec::with_capacity(courses.len());
    for course in &courses {
        match (&course.subject_code, &course.course_id) {
            (Some(subject), Some(course_id)) => {
                requests.push(config.packages_request(subject, course_id));
                keys.push((subject.clone(), course_id.clone()));
            }
            _ => tracing::warn!(
                subject = ?course.subject_code,
                course_id = ?course.course_id,
                "Course lacks subject or id, not fetching sections"
            ),
        }
    }

    tracing::info!(count = requests.len(), "Fetching enrollment packages");
    let results: Vec<Result<Value>> =
        fetch_all(client, requests, &config.retry, &config.batch, config.timeout_ms).await;
    let stats = BatchStats::from_results(&results);

    let mut normalized = NormalizedSections::default();
    for ((subject, course_id), result) in keys.iter().zip(results) {
        match result {
            Ok(payload) => normalized.extend(normalize_sections(&payload, config.time_policy)),
            Err(e) => tracing::warn!(
                subject = %subject,
                course_id = %course_id,
                error = %e,
                "Failed to fetch sections"
            ),
        }
    }

    tracing::info!(
        courses = courses.len(),
        sections = normalized.sections.len(),
        meetings = normalized.meetings.len(),
        succeeded = stats.succeeded,
        failed = stats.failed,
        "Course search finished"
    );

    Ok(CourseSearchOutput {
        courses,
        sections: normalized.sections,
        meetings: normalized.meetings,
        stats,
    })
}
