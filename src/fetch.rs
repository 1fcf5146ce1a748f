use std::time::Instant;
use tracing::{debug, warn};

use crate::ga4::ReportBackend;
use crate::patterns::PatternBuilder;
use crate::window::Window;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Ok,
    /// The query failed and the count was defaulted to zero
    Failed,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Ok => "ok",
            FetchStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOutcome {
    pub users: u64,
    pub status: FetchStatus,
    pub matched_paths: usize,
}

/// Queries total users for every page path the pattern is found in and sums
/// them, since one article can be tracked under several paths. A failed query
/// is logged and yields zero users with [`FetchStatus::Failed`].
pub fn fetch_users<B: ReportBackend + ?Sized>(
    backend: &B,
    property_id: &str,
    patterns: &PatternBuilder,
    url: &str,
    window: &Window,
    custom_pattern: Option<&str>,
) -> FetchOutcome {
    let start_time = Instant::now();
    let resolved = patterns.resolve(url, custom_pattern);
    debug!(
        action = "start",
        component = "metric_fetch",
        url = url,
        window = %window,
        pattern = %resolved.pattern,
        pattern_source = resolved.source.as_str(),
        "Fetching users for URL"
    );

    match backend.run_report(property_id, window, &resolved.pattern) {
        Ok(rows) => {
            let users = rows
                .iter()
                .fold(0u64, |total, row| total.saturating_add(row.users));
            debug!(
                action = "complete",
                component = "metric_fetch",
                url = url,
                window = %window,
                matched_paths = rows.len(),
                users,
                duration_ms = start_time.elapsed().as_millis(),
                "Fetched users for URL"
            );
            FetchOutcome {
                users,
                status: FetchStatus::Ok,
                matched_paths: rows.len(),
            }
        }
        Err(e) => {
            warn!(
                action = "error",
                component = "metric_fetch",
                url = url,
                window = %window,
                pattern = %resolved.pattern,
                error = %e,
                "Fetch failed, recording 0 users"
            );
            FetchOutcome {
                users: 0,
                status: FetchStatus::Failed,
                matched_paths: 0,
            }
        }
    }
}

/// Count-only form of [`fetch_users`]. Zero is ambiguous here: it may be
/// genuine or the result of a failed query.
pub fn fetch_user_count<B: ReportBackend + ?Sized>(
    backend: &B,
    property_id: &str,
    patterns: &PatternBuilder,
    url: &str,
    window: &Window,
    custom_pattern: Option<&str>,
) -> u64 {
    fetch_users(backend, property_id, patterns, url, window, custom_pattern).users
}
