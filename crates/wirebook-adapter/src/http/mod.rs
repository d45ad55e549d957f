/*
[INPUT]:  HTTP client configuration and snapshot requests
[OUTPUT]: REST snapshots for stream bootstrap
[POS]:    HTTP layer - REST API communication
[UPDATE]: When adding new snapshot sources or changing client behavior
*/

pub mod client;
pub mod fetcher;

pub use client::{ClientConfig, RestClient};
pub use fetcher::{SnapshotFetcher, SnapshotRequest};
