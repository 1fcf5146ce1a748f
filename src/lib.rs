pub mod args;
pub mod batch;
pub mod classify;
pub mod config;
pub mod dates;
pub mod fetch;
pub mod ga4;
pub mod patterns;
pub mod report;
pub mod stats;
pub mod table;
pub mod trend;
pub mod utils;
pub mod validate;
pub mod window;

pub use args::{Args, Command};
pub use batch::{BatchOptions, BatchReport, BatchRunner, Pause, Progress, ThreadSleep};
pub use classify::{classify, classify_users, Granularity, Milestone};
pub use config::{load_config, Config};
pub use fetch::{fetch_user_count, fetch_users, FetchOutcome, FetchStatus};
pub use ga4::{Ga4Client, PathCount, ReportBackend, ReportError};
pub use patterns::PatternBuilder;
pub use table::ResultTable;
pub use window::{Window, WindowDecision, WindowPolicy};
