//! Professor ratings via the ratings service's GraphQL teacher search.
//!
//! The search is cursor-paginated: each page is requested with
//! `after = <endCursor of the previous page>` until `hasNextPage` is false.
//! Pages are fetched one at a time with a fixed pause in between.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{listing_error, validate_common};
use crate::domain::de::{lenient, lenient_list};
use crate::domain::{ProfessorRecord, RawProfessorNode, normalize_professor};
use crate::error::{CoursefetchError, Result};
use crate::fetch::{RetryPolicy, fetch_with_retry};
use crate::http::HttpClient;
use crate::request::RequestSpec;

const SOURCE: &str = "ratings";

const TEACHER_SEARCH_QUERY: &str = r#"query TeacherSearchResultsPageQuery(
  $query: TeacherSearchQuery!
  $schoolID: ID
  $includeSchoolFilter: Boolean!
  $first: Int
  $after: String
) {
  search: newSearch {
    teachers(query: $query, first: $first, after: $after) {
      edges {
        cursor
        node {
          id
          legacyId
          firstName
          lastName
          department
          avgRating
          numRatings
          avgDifficulty
          wouldTakeAgainPercent
        }
      }
      pageInfo {
        hasNextPage
        endCursor
      }
      resultCount
    }
  }
  school: node(id: $schoolID) @include(if: $includeSchoolFilter) {
    __typename
    id
  }
}"#;

/// Configuration for the ratings source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingsConfig {
    /// GraphQL endpoint
    pub endpoint: String,

    /// Opaque school node id to search within
    pub school_id: String,

    /// Value for the Authorization header, if the deployment requires one
    pub authorization: Option<String>,

    /// Teachers requested per page
    pub page_size: u32,

    /// Pause between consecutive pages in milliseconds
    pub page_delay_ms: u64,

    pub retry: RetryPolicy,

    /// Timeout for each individual request attempt in milliseconds
    pub timeout_ms: u64,
}

impl Default for RatingsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://www.ratemyprofessors.com/graphql".to_string(),
            school_id: "U2Nob29sLTE4NDE4".to_string(),
            authorization: Some("Basic dGVzdDp0ZXN0".to_string()),
            page_size: 1000,
            page_delay_ms: 100,
            retry: RetryPolicy::default(),
            timeout_ms: 30_000,
        }
    }
}

impl RatingsConfig {
    pub fn validate(&self) -> Result<()> {
        validate_common(SOURCE, &self.endpoint, &self.retry, self.timeout_ms)?;
        if self.school_id.trim().is_empty() {
            return Err(CoursefetchError::InvalidConfig(
                "ratings: school_id must not be empty".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(CoursefetchError::InvalidConfig(
                "ratings: page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The search request for the page following `after` (first page on `None`).
    pub fn page_request(&self, after: Option<&str>) -> RequestSpec {
        let body = json!({
            "query": TEACHER_SEARCH_QUERY,
            "variables": {
                "query": {
                    "text": "",
                    "schoolID": self.school_id,
                    "fallback": true,
                    "departmentID": null
                },
                "schoolID": self.school_id,
                "includeSchoolFilter": true,
                "first": self.page_size,
                "after": after
            }
        });

        RequestSpec::post_json(&self.endpoint, &body)
            .with_header("Accept", "application/json")
            .with_optional_header("Authorization", self.authorization.as_deref())
    }
}

// ============================================================================
// Response shape
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GraphQlResponse {
    data: Option<SearchData>,
    errors: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchData {
    search: Option<Search>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Search {
    teachers: Option<TeacherConnection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TeacherConnection {
    /// `null` edges are dropped
    #[serde(deserialize_with = "lenient_list")]
    edges: Option<Vec<TeacherEdge>>,
    page_info: Option<PageInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TeacherEdge {
    #[serde(deserialize_with = "lenient")]
    node: Option<RawProfessorNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

/// Everything one ratings run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RatingsOutput {
    pub professors: Vec<ProfessorRecord>,
    pub pages: usize,
}

/// Walk every page of the teacher search.
///
/// # Errors
/// `Listing` when a page fails after retries, does not decode, or carries a
/// GraphQL `errors` array. No partial listing is returned.
#[tracing::instrument(skip(client, config), fields(school = %config.school_id))]
pub async fn scrape_ratings<H: HttpClient>(
    client: &H,
    config: &RatingsConfig,
) -> Result<RatingsOutput> {
    config.validate()?;

    let mut professors = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let request = config.page_request(cursor.as_deref());
        let payload = fetch_with_retry(client, &request, &config.retry, config.timeout_ms)
            .await
            .map_err(|e| listing_error(SOURCE, format!("page {}: {e}", pages + 1)))?;
        pages += 1;

        let response: GraphQlResponse = serde_json::from_value(payload)
            .map_err(|e| listing_error(SOURCE, format!("page {pages}: {e}")))?;

        if let Some(errors) = response.errors.filter(|errors| !errors.is_empty()) {
            let reason = serde_json::to_string(&errors).unwrap_or_else(|_| "unknown".to_string());
            return Err(listing_error(SOURCE, format!("GraphQL errors on page {pages}: {reason}")));
        }

        let Some(teachers) = response
            .data
            .and_then(|data| data.search)
            .and_then(|search| search.teachers)
        else {
            tracing::info!(page = pages, "No teacher connection in response, stopping");
            break;
        };

        let edges = teachers.edges.unwrap_or_default();
        let received = edges.len();
        professors.extend(
            edges
                .iter()
                .filter_map(|edge| edge.node.as_ref())
                .map(normalize_professor),
        );
        tracing::debug!(page = pages, received, total = professors.len(), "Fetched ratings page");

        let page_info = teachers.page_info.unwrap_or_default();
        if !page_info.has_next_page {
            break;
        }
        match page_info.end_cursor {
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            _ => {
                tracing::warn!(page = pages, "Next page advertised without a new cursor, stopping");
                break;
            }
        }

        tokio::time::sleep(Duration::from_millis(config.page_delay_ms)).await;
    }

    tracing::info!(pages, professors = professors.len(), "Ratings finished");
    Ok(RatingsOutput { professors, pages })
}
