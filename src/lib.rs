//! Batched, retrying scraper for course, section, grade and rating data.
//!
//! Each source lists its work items once, fans the per-item fetches out through
//! a paced batch scheduler, and flattens the JSON payloads into plain records.
//! Individual fetch failures are retried with exponential backoff and, if they
//! persist, recorded without aborting the run. Records can be written to CSV
//! or, with the `postgres` feature, loaded into PostgreSQL.

pub mod batch;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod http;
pub mod output;
pub mod request;
pub mod sources;
#[cfg(feature = "postgres")]
pub mod storage;

// Re-export commonly used types
pub use batch::{BatchPlan, BatchStats, run_batched};
pub use error::{CoursefetchError, Result};
pub use fetch::{RetryPolicy, fetch_with_retry, retry};
pub use http::{HttpClient, HttpResponse, MockHttpClient, ReqwestHttpClient};
pub use request::RequestSpec;
pub use sources::{
    CourseSearchConfig, CourseSearchOutput, GradesConfig, GradesOutput, RatingsConfig,
    RatingsOutput, scrape_courses, scrape_grades, scrape_ratings,
};
#[cfg(feature = "postgres")]
pub use storage::{PostgresLoader, TableLoad, migrator};
