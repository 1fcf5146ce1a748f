use chrono::NaiveDate;
use std::cell::RefCell;
use std::fs;
use std::time::Duration;

use pagetally::batch::{BatchOptions, BatchRunner, Pause};
use pagetally::config::ColumnConfig;
use pagetally::ga4::{PathCount, ReportBackend, ReportError};
use pagetally::patterns::PatternBuilder;
use pagetally::table::{write_invalid_entries, ResultTable};
use pagetally::validate::InvalidEntry;
use pagetally::window::{Window, WindowPolicy};

const PREFIX: &str = "https://www.yourpage.com/";

/// Answers every query with 12,000 users split over two paths and records
/// what was asked.
#[derive(Default)]
struct FakeGa4 {
    queries: RefCell<Vec<(String, Window)>>,
}

impl ReportBackend for FakeGa4 {
    fn run_report(
        &self,
        _property_id: &str,
        window: &Window,
        pattern: &str,
    ) -> Result<Vec<PathCount>, ReportError> {
        self.queries.borrow_mut().push((pattern.to_string(), *window));
        Ok(vec![
            PathCount {
                path: format!("/{}", pattern),
                users: 11_000,
            },
            PathCount {
                path: format!("/{}/", pattern),
                users: 1_000,
            },
        ])
    }
}

struct NoPause;

impl Pause for NoPause {
    fn pause(&mut self, _: Duration) {}
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn up_to(cutoff: NaiveDate) -> BatchOptions {
    BatchOptions {
        property_id: "123456".into(),
        policies: vec![WindowPolicy::UpToCutoff { cutoff }],
        sleep: Duration::ZERO,
        columns: ColumnConfig::default(),
        status_columns: false,
    }
}

#[test]
fn up_to_cutoff_batch_over_csv_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("posts.csv");
    fs::write(
        &input,
        "url,date_published\n\
         https://www.yourpage.com/blog/first_post,2023-03-01\n\
         https://www.yourpage.com/blog/no_date,\n\
         https://www.yourpage.com/blog/future_post,2024-02-01\n",
    )
    .unwrap();

    let backend = FakeGa4::default();
    let mut runner = BatchRunner::new(&backend, PatternBuilder::new(Some(PREFIX)), up_to(date(2023, 12, 31)))
        .with_pause(NoPause);
    let report = runner.run_file(&input).unwrap();

    // only the first row reaches the backend
    {
        let queries = backend.queries.borrow();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].0, "blog/first_post");
        assert_eq!(queries[0].1.start(), date(2023, 3, 1));
        assert_eq!(queries[0].1.end(), date(2023, 12, 31));
    }

    assert_eq!(report.table.len(), 3);
    assert_eq!(
        report.invalid,
        vec![InvalidEntry {
            row: 2,
            url: "https://www.yourpage.com/blog/no_date".into(),
        }]
    );
    assert_eq!(report.summary.api_calls(), 1);
    assert_eq!(report.summary.periods[0].skipped, 1);
    assert_eq!(report.summary.periods[0].total_users, 12_000);

    let output = dir.path().join("ga4_uptodate_posts.csv");
    report.table.save(&output).unwrap();
    let invalid_file = dir.path().join("invalid_date_published_rows.csv");
    write_invalid_entries(&invalid_file, &report.invalid).unwrap();

    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "url,date_published,users_to_2023-12-31,user_milestone_to_2023-12-31,user_milestone_to_2023-12-31_detailed\n\
         https://www.yourpage.com/blog/first_post,2023-03-01,12000,10-20k,10-20k\n\
         https://www.yourpage.com/blog/no_date,,0,0-10k,0-10k\n\
         https://www.yourpage.com/blog/future_post,2024-02-01,0,0-10k,0-10k\n"
    );
    assert_eq!(
        fs::read_to_string(&invalid_file).unwrap(),
        "row,url\n2,https://www.yourpage.com/blog/no_date\n"
    );

    // the written output can be fed back in and classified for another period
    let reloaded = ResultTable::load(&output).unwrap();
    let mut runner = BatchRunner::new(
        &backend,
        PatternBuilder::new(Some(PREFIX)),
        BatchOptions {
            policies: vec![WindowPolicy::FixedOffset { days: 30 }],
            ..up_to(date(2023, 12, 31))
        },
    )
    .with_pause(NoPause);
    let second = runner.run(reloaded).unwrap();
    let column = second.table.column_index("users_30_days").unwrap();
    assert_eq!(second.table.get(0, column), Some("12000"));
    assert_eq!(second.table.get(2, column), Some("12000"));
    assert_eq!(
        second.table.get(0, second.table.column_index("users_to_2023-12-31").unwrap()),
        Some("12000")
    );
}

#[test]
fn custom_pattern_column_overrides_derived_pattern() {
    let table = ResultTable::from_reader(
        "url,date_published,regex\n\
         https://www.yourpage.com/blog/a,2023-01-01,^/blog/a/?$\n\
         https://www.yourpage.com/blog/b,2023-01-01,\n"
            .as_bytes(),
    )
    .unwrap();

    let backend = FakeGa4::default();
    let mut runner = BatchRunner::new(&backend, PatternBuilder::new(Some(PREFIX)), up_to(date(2023, 6, 30)))
        .with_pause(NoPause);
    runner.run(table).unwrap();

    let patterns: Vec<String> = backend.queries.borrow().iter().map(|(p, _)| p.clone()).collect();
    assert_eq!(patterns, vec!["^/blog/a/?$".to_string(), "blog/b".to_string()]);
}

#[test]
fn range_over_url_list() {
    let window = Window::new(date(2023, 1, 1), date(2023, 1, 31)).unwrap();
    let urls = vec![
        "https://www.yourpage.com/a".to_string(),
        "https://www.yourpage.com/b".to_string(),
    ];
    let backend = FakeGa4::default();
    let mut runner = BatchRunner::new(
        &backend,
        PatternBuilder::new(Some(PREFIX)),
        BatchOptions {
            policies: vec![WindowPolicy::FixedCalendar { window }],
            ..up_to(date(2023, 1, 31))
        },
    )
    .with_pause(NoPause);

    let report = runner.run(ResultTable::from_urls("url", &urls)).unwrap();
    assert!(report.invalid.is_empty());
    assert!(backend.queries.borrow().iter().all(|(_, w)| *w == window));
    let period = &report.summary.periods[0];
    assert_eq!(period.total_users, 24_000);
    assert_eq!(period.top_url.as_ref().map(|(_, users)| *users), Some(12_000));
}
