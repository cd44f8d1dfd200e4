//! Request descriptors handed to the retrying fetcher.
//!
//! Sources build these once per task; the fetcher and HTTP clients only read them.

pub mod types;

pub use types::RequestSpec;
