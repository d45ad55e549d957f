/*
[INPUT]:  YAML watch configuration and a StreamClient
[OUTPUT]: Long-running watch tasks that log cache updates
[POS]:    Library root for the monitor binary
[UPDATE]: When adding modules or changing public exports
*/

pub mod config;
pub mod watcher;

pub use config::{CredentialEnv, MonitorConfig, WatchChannel, WatchConfig};
pub use watcher::{WatchExit, Watcher, backoff_duration, spawn_watchers, summarize};
