use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::batch::Pause;
use crate::classify::{classify, Granularity, Milestone};
use crate::fetch::{fetch_users, FetchStatus};
use crate::ga4::ReportBackend;
use crate::patterns::PatternBuilder;
use crate::window::{Window, WindowDecision, WindowPolicy};

/// Users for one URL over `days` days from its start date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub days: u32,
    pub start_date: String,
    pub end_date: String,
    pub users: u64,
    pub category: Milestone,
    pub detailed_category: Milestone,
    #[serde(skip)]
    pub status: FetchStatus,
}

/// Fetches cumulative users for each period, shortest first. Duplicate
/// periods are queried once. Once `interrupt` is set no further periods are
/// requested and the points gathered so far are returned.
#[allow(clippy::too_many_arguments)]
pub fn analyze_trend<B: ReportBackend + ?Sized>(
    backend: &B,
    property_id: &str,
    patterns: &PatternBuilder,
    url: &str,
    start: NaiveDate,
    periods: &[u32],
    pause: &mut dyn Pause,
    sleep: Duration,
    interrupt: Option<&AtomicBool>,
) -> Vec<TrendPoint> {
    let mut periods = periods.to_vec();
    periods.sort_unstable();
    periods.dedup();

    let mut points = Vec::with_capacity(periods.len());
    for days in periods {
        if interrupt.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            warn!(action = "interrupted", component = "trend", fetched = points.len(), "Trend interrupted");
            break;
        }
        let window = match (WindowPolicy::FixedOffset { days }).resolve(Some(start)) {
            WindowDecision::Fetch(window) => window,
            _ => {
                warn!(action = "skip", component = "trend", days, "Window end is out of range");
                continue;
            }
        };
        info!(action = "fetch", component = "trend", days, window = %window, "Fetching trend period");
        let outcome = fetch_users(backend, property_id, patterns, url, &window, None);
        points.push(TrendPoint {
            days,
            start_date: window.start_str(),
            end_date: window.end_str(),
            users: outcome.users,
            category: classify(outcome.users, Granularity::Standard),
            detailed_category: classify(outcome.users, Granularity::Detailed),
            status: outcome.status,
        });
        pause.pause(sleep);
    }
    points
}

pub fn write_trend_csv(path: &Path, points: &[TrendPoint]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create output file {:?}", path))?;
    for point in points {
        writer.serialize(point)?;
    }
    writer.flush()?;
    info!(action = "save", component = "trend", file_path = ?path, row_count = points.len(), "Trend saved");
    Ok(())
}

/// Result of the quick single-URL check over a trailing window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleCheck {
    pub window: Window,
    pub users: u64,
    pub category: Milestone,
    pub detailed_category: Milestone,
    pub status: FetchStatus,
}

pub fn check_single<B: ReportBackend + ?Sized>(
    backend: &B,
    property_id: &str,
    patterns: &PatternBuilder,
    url: &str,
    today: NaiveDate,
    days: u32,
) -> Result<SingleCheck> {
    let window = Window::trailing(today, days)
        .with_context(|| format!("Cannot look back {} days from {}", days, today))?;
    let outcome = fetch_users(backend, property_id, patterns, url, &window, None);
    Ok(SingleCheck {
        window,
        users: outcome.users,
        category: classify(outcome.users, Granularity::Standard),
        detailed_category: classify(outcome.users, Granularity::Detailed),
        status: outcome.status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ga4::{PathCount, ReportError};
    use std::cell::RefCell;

    /// Reports 200 users per day in the window.
    struct PerDay {
        windows: RefCell<Vec<Window>>,
    }

    impl ReportBackend for PerDay {
        fn run_report(&self, _: &str, window: &Window, _: &str) -> Result<Vec<PathCount>, ReportError> {
            self.windows.borrow_mut().push(*window);
            Ok(vec![PathCount {
                path: "/a".into(),
                users: 200 * (window.span_days() as u64 + 1),
            }])
        }
    }

    struct Count(usize);

    impl Pause for Count {
        fn pause(&mut self, _: Duration) {
            self.0 += 1;
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn sorted_unique_periods() {
        let backend = PerDay {
            windows: RefCell::new(Vec::new()),
        };
        let mut pauses = Count(0);
        let points = analyze_trend(
            &backend,
            "1",
            &PatternBuilder::default(),
            "/a",
            date(2023, 1, 1),
            &[90, 7, 30, 7],
            &mut pauses,
            Duration::ZERO,
            None,
        );

        let days: Vec<u32> = points.iter().map(|p| p.days).collect();
        assert_eq!(days, vec![7, 30, 90]);
        assert_eq!(pauses.0, 3);
        assert_eq!(points[0].start_date, "2023-01-01");
        assert_eq!(points[0].end_date, "2023-01-08");
        assert_eq!(points[0].users, 1_600);
        assert_eq!(points[2].users, 18_200);
        assert_eq!(points[2].category, Milestone::From10kTo20k);
        assert!(points.windows(2).all(|w| w[0].users <= w[1].users));
    }

    #[test]
    fn interrupt_stops_remaining_periods() {
        struct Trip<'f>(&'f AtomicBool);

        impl Pause for Trip<'_> {
            fn pause(&mut self, _: Duration) {
                self.0.store(true, Ordering::Relaxed);
            }
        }

        let backend = PerDay {
            windows: RefCell::new(Vec::new()),
        };
        let flag = AtomicBool::new(false);
        let points = analyze_trend(
            &backend,
            "1",
            &PatternBuilder::default(),
            "/a",
            date(2023, 1, 1),
            &[7, 14, 30, 60, 90, 180, 360],
            &mut Trip(&flag),
            Duration::from_secs(10),
            Some(&flag),
        );
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].days, 7);
        assert_eq!(backend.windows.borrow().len(), 1);
    }

    #[test]
    fn trend_csv_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trend.csv");
        let points = vec![TrendPoint {
            days: 30,
            start_date: "2023-01-01".into(),
            end_date: "2023-01-31".into(),
            users: 45_000,
            category: Milestone::Over40k,
            detailed_category: Milestone::From40kTo100k,
            status: FetchStatus::Ok,
        }];
        write_trend_csv(&path, &points).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(
            text,
            "days,start_date,end_date,users,category,detailed_category\n\
             30,2023-01-01,2023-01-31,45000,>40k,40k-100k\n"
        );
    }

    #[test]
    fn single_check_uses_trailing_window() {
        let backend = PerDay {
            windows: RefCell::new(Vec::new()),
        };
        let result = check_single(
            &backend,
            "1",
            &PatternBuilder::default(),
            "/a",
            date(2024, 3, 1),
            30,
        )
        .unwrap();
        assert_eq!(result.window.start(), date(2024, 1, 31));
        assert_eq!(result.users, 200 * 31);
        assert_eq!(result.category, Milestone::UpTo10k);
    }
}
