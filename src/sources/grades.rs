//! Grade distributions from the grades API.
//!
//! The course listing is paged (`page`/`per_page`) until `nextPageUrl` comes
//! back null. Every listed course then gets one `courses/{uuid}/grades` fetch
//! through the batch scheduler.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{fetch_all, listing_error, validate_common};
use crate::batch::{BatchPlan, BatchStats};
use crate::domain::{
    CourseGradeRow, GradeListing, RawGradeDistribution, aggregate_grades, expand_grade_rows,
};
use crate::error::{CoursefetchError, Result};
use crate::fetch::{RetryPolicy, fetch_with_retry};
use crate::http::HttpClient;
use crate::request::RequestSpec;

const SOURCE: &str = "grades";

/// Configuration for the grades source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradesConfig {
    /// API root, without trailing slash
    pub base_url: String,

    /// Sent as `Authorization: Token token=<api_token>`
    pub api_token: Option<String>,

    /// Courses per listing page
    pub per_page: u32,

    pub retry: RetryPolicy,

    pub batch: BatchPlan,

    /// Timeout for each individual request attempt in milliseconds
    pub timeout_ms: u64,
}

impl Default for GradesConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.madgrades.com/v1".to_string(),
            api_token: None,
            per_page: 500,
            retry: RetryPolicy::default(),
            batch: BatchPlan {
                batch_size: 100,
                intra_batch_stagger_ms: 0,
                inter_batch_delay_ms: 50,
            },
            timeout_ms: 30_000,
        }
    }
}

impl GradesConfig {
    pub fn validate(&self) -> Result<()> {
        validate_common(SOURCE, &self.base_url, &self.retry, self.timeout_ms)?;
        self.batch.validate()?;
        if self.per_page == 0 {
            return Err(CoursefetchError::InvalidConfig(
                "grades: per_page must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    fn authorize(&self, request: RequestSpec) -> RequestSpec {
        let token = self
            .api_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| format!("Token token={t}"));
        request
            .with_header("Accept", "application/json")
            .with_optional_header("Authorization", token.as_deref())
    }

    pub fn listing_request(&self, page: u32) -> RequestSpec {
        self.authorize(RequestSpec::get(format!(
            "{}/courses?page={}&per_page={}",
            self.base(),
            page,
            self.per_page
        )))
    }

    pub fn grades_request(&self, uuid: &str) -> RequestSpec {
        self.authorize(RequestSpec::get(format!(
            "{}/courses/{}/grades",
            self.base(),
            uuid
        )))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingPage {
    results: Vec<Value>,
    #[serde(default)]
    next_page_url: Option<String>,
}

/// Everything one grades run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GradesOutput {
    /// Courses returned by the listing
    pub courses_listed: usize,
    /// One row per (course, subject abbreviation)
    pub rows: Vec<CourseGradeRow>,
    /// Outcome of the per-course grade fetches
    pub stats: BatchStats,
}

/// Page through the course listing until `nextPageUrl` is null.
///
/// # Errors
/// `Listing` when any page fails after retries or lacks a `results` array.
#[tracing::instrument(skip(client, config))]
pub async fn list_grade_courses<H: HttpClient>(
    client: &H,
    config: &GradesConfig,
) -> Result<Vec<GradeListing>> {
    let mut listings = Vec::new();
    let mut page = 1u32;

    loop {
        let request = config.listing_request(page);
        let payload = fetch_with_retry(client, &request, &config.retry, config.timeout_ms)
            .await
            .map_err(|e| listing_error(SOURCE, format!("page {page}: {e}")))?;
        let listing: ListingPage = serde_json::from_value(payload)
            .map_err(|e| listing_error(SOURCE, format!("page {page}: {e}")))?;

        let received = listing.results.len();
        for (index, result) in listing.results.iter().enumerate() {
            match GradeListing::deserialize(result) {
                Ok(course) => listings.push(course),
                Err(e) => tracing::warn!(page, index, error = %e, "Skipping malformed course listing"),
            }
        }
        tracing::debug!(page, received, total = listings.len(), "Fetched listing page");

        if listing.next_page_url.is_none() {
            break;
        }
        if received == 0 {
            tracing::warn!(page, "Empty listing page still advertises a next page, stopping");
            break;
        }
        page += 1;
    }

    tracing::info!(count = listings.len(), pages = page, "Listed courses with grades");
    Ok(listings)
}

/// List every course and fetch its grade distribution.
#[tracing::instrument(skip(client, config))]
pub async fn scrape_grades<H: HttpClient + 'static>(
    client: &H,
    config: &GradesConfig,
) -> Result<GradesOutput> {
    config.validate()?;

    let listings = list_grade_courses(client, config).await?;
    let courses_listed = listings.len();

    let (listings, requests): (Vec<GradeListing>, Vec<RequestSpec>) = listings
        .into_iter()
        .filter_map(|listing| {
            let Some(uuid) = listing.uuid.clone().filter(|u| !u.is_empty()) else {
                tracing::warn!(name = ?listing.name, "Course without uuid, skipping grades");
                return None;
            };
            let request = config.grades_request(&uuid);
            Some((listing, request))
        })
        .unzip();

    tracing::info!(count = requests.len(), "Fetching grade distributions");
    let results: Vec<Result<RawGradeDistribution>> =
        fetch_all(client, requests, &config.retry, &config.batch, config.timeout_ms).await;
    let stats = BatchStats::from_results(&results);

    let mut rows = Vec::new();
    for (listing, result) in listings.iter().zip(results) {
        match result {
            Ok(distribution) => {
                let summary = aggregate_grades(&distribution);
                rows.extend(expand_grade_rows(listing, &summary));
            }
            Err(e) => tracing::warn!(
                uuid = ?listing.uuid,
                error = %e,
                "Failed to fetch grades"
            ),
        }
    }

    tracing::info!(
        courses = courses_listed,
        rows = rows.len(),
        succeeded = stats.succeeded,
        failed = stats.failed,
        "Grades finished"
    );

    Ok(GradesOutput {
        courses_listed,
        rows,
        stats,
    })
}
