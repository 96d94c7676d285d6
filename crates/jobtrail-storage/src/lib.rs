//! Persistence for Job Trail: the SQLite job store, raw feed snapshots, and
//! the HTTP client used to fetch feeds.

mod artifacts;
mod db;
mod error;
mod feeds;
mod http;
mod jobs;
mod profile;
mod store;

pub use artifacts::{ArtifactStore, StoredArtifact};
pub use db::{connect, migrate};
pub use error::StoreError;
pub use feeds::FeedRow;
pub use http::{
    classify_reqwest_error, classify_status, BackoffPolicy, FetchError, FetchedResponse,
    HttpClientConfig, HttpFetcher, RetryDisposition,
};
pub use jobs::{ApplicationDocuments, IngestFailure, IngestOutcome, IngestReport};
pub use store::JobStore;

pub const CRATE_NAME: &str = "jobtrail-storage";
