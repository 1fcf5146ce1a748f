use anyhow::Result;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::classify::{classify, Granularity};
use crate::config::ColumnConfig;
use crate::fetch::{fetch_users, FetchOutcome};
use crate::ga4::ReportBackend;
use crate::patterns::PatternBuilder;
use crate::stats::{PeriodSummary, RunSummary};
use crate::table::ResultTable;
use crate::validate::{validate, InvalidEntry};
use crate::window::{WindowDecision, WindowPolicy};

const STATUS_SKIPPED: &str = "skipped";
const STATUS_INVALID: &str = "invalid";

/// Rate-limit hook called after every backend request.
pub trait Pause {
    fn pause(&mut self, duration: Duration);
}

/// Sleeps the current thread, waking early once the interrupt flag is set.
#[derive(Debug, Default)]
pub struct ThreadSleep {
    interrupt: Option<Arc<AtomicBool>>,
}

impl ThreadSleep {
    const SLICE: Duration = Duration::from_millis(200);

    pub fn new(interrupt: Option<Arc<AtomicBool>>) -> Self {
        Self { interrupt }
    }
}

impl Pause for ThreadSleep {
    fn pause(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            if self
                .interrupt
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Relaxed))
            {
                return;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            thread::sleep(remaining.min(Self::SLICE));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Loading,
    Validating,
    Fetching { period: usize },
    Classifying,
    Done,
}

#[derive(Debug)]
pub enum ProgressEvent<'a> {
    State(RunState),
    Fetched {
        period: &'a str,
        row: usize,
        rows: usize,
        url: &'a str,
        outcome: FetchOutcome,
    },
    Skipped {
        period: &'a str,
        row: usize,
        url: &'a str,
    },
    Interrupted {
        api_calls: usize,
    },
}

/// Observer for run progress. Keeps console or log narration out of the
/// orchestration logic.
pub trait Progress {
    fn on_event(&mut self, event: &ProgressEvent<'_>);
}

/// Reports progress as structured log events.
#[derive(Debug, Default)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn on_event(&mut self, event: &ProgressEvent<'_>) {
        match event {
            ProgressEvent::State(state) => {
                debug!(action = "state", component = "batch", state = ?state, "Batch state changed")
            }
            ProgressEvent::Fetched {
                period,
                row,
                rows,
                url,
                outcome,
            } => info!(
                action = "fetched",
                component = "batch",
                period = %period,
                row = *row,
                rows = *rows,
                url = %url,
                users = outcome.users,
                status = outcome.status.as_str(),
                "Processed row"
            ),
            ProgressEvent::Skipped { period, row, url } => debug!(
                action = "skip",
                component = "batch",
                period = %period,
                row = *row,
                url = %url,
                "Published after the window end, skipping"
            ),
            ProgressEvent::Interrupted { api_calls } => warn!(
                action = "interrupted",
                component = "batch",
                api_calls = *api_calls,
                "Run interrupted, keeping results gathered so far"
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub property_id: String,
    pub policies: Vec<WindowPolicy>,
    pub sleep: Duration,
    pub columns: ColumnConfig,
    /// Adds a `status_<period>` column telling failed fetches apart from zeros
    pub status_columns: bool,
}

#[derive(Debug)]
pub struct BatchReport {
    pub table: ResultTable,
    pub invalid: Vec<InvalidEntry>,
    pub summary: RunSummary,
}

pub struct BatchRunner<'a, B: ReportBackend + ?Sized> {
    backend: &'a B,
    patterns: PatternBuilder,
    options: BatchOptions,
    pause: Box<dyn Pause + 'a>,
    progress: Box<dyn Progress + 'a>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<'a, B: ReportBackend + ?Sized> BatchRunner<'a, B> {
    pub fn new(backend: &'a B, patterns: PatternBuilder, options: BatchOptions) -> Self {
        Self {
            backend,
            patterns,
            options,
            pause: Box::new(ThreadSleep::default()),
            progress: Box::new(LogProgress),
            interrupt: None,
        }
    }

    pub fn with_pause(mut self, pause: impl Pause + 'a) -> Self {
        self.pause = Box::new(pause);
        self
    }

    pub fn with_progress(mut self, progress: impl Progress + 'a) -> Self {
        self.progress = Box::new(progress);
        self
    }

    /// Stops issuing requests once `flag` is set; the current request finishes.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    pub fn run_file(&mut self, path: &Path) -> Result<BatchReport> {
        self.progress.on_event(&ProgressEvent::State(RunState::Loading));
        let table = ResultTable::load(path)?;
        self.run(table)
    }

    /// Runs every policy over the table. Fails only when the table lacks a
    /// required column; row-level problems are recorded and the run goes on.
    pub fn run(&mut self, mut table: ResultTable) -> Result<BatchReport> {
        let start_time = Instant::now();
        if self.options.policies.is_empty() {
            anyhow::bail!("No time windows requested");
        }

        self.progress.on_event(&ProgressEvent::State(RunState::Validating));
        let require_date = self
            .options
            .policies
            .iter()
            .any(WindowPolicy::requires_publication_date);
        let raw = table.raw_records(&self.options.columns, require_date)?;
        let validated = validate(&raw, require_date);
        info!(
            action = "validated",
            component = "batch",
            rows = raw.len(),
            valid_rows = validated.records.len(),
            invalid_rows = validated.invalid.len(),
            "Input rows validated"
        );

        let mut summary = RunSummary {
            rows: raw.len(),
            valid_rows: validated.records.len(),
            invalid_rows: validated.invalid.len(),
            ..RunSummary::default()
        };

        let mut policies: Vec<WindowPolicy> = Vec::with_capacity(self.options.policies.len());
        for policy in &self.options.policies {
            if policies.contains(policy) {
                debug!(action = "dedup", component = "batch", period = %policy.period_label(), "Ignoring repeated period");
            } else {
                policies.push(*policy);
            }
        }
        let mut users_columns = Vec::with_capacity(policies.len());
        let mut status_columns = Vec::with_capacity(policies.len());
        for policy in &policies {
            users_columns.push(table.reset_column(&policy.users_column(), "0"));
            if self.options.status_columns {
                let column = table.reset_column(&policy.status_column(), "");
                for entry in &validated.invalid {
                    table.set(entry.row - 1, column, STATUS_INVALID);
                }
                status_columns.push(Some(column));
            } else {
                status_columns.push(None);
            }
        }

        let row_count = table.len();
        'periods: for (period_index, policy) in policies.iter().enumerate() {
            self.progress.on_event(&ProgressEvent::State(RunState::Fetching {
                period: period_index,
            }));
            let label = policy.period_label();
            let mut period = PeriodSummary::new(label.as_str());
            info!(action = "start", component = "batch", period = %label, "Fetching period");

            for record in &validated.records {
                if self.interrupted() {
                    summary.interrupted = true;
                    summary.periods.push(period);
                    break 'periods;
                }

                match policy.resolve(record.publication_date) {
                    WindowDecision::Fetch(window) => {
                        let outcome = fetch_users(
                            self.backend,
                            &self.options.property_id,
                            &self.patterns,
                            &record.url,
                            &window,
                            record.custom_pattern.as_deref(),
                        );
                        table.set(
                            record.row_index,
                            users_columns[period_index],
                            outcome.users.to_string(),
                        );
                        if let Some(column) = status_columns[period_index] {
                            table.set(record.row_index, column, outcome.status.as_str());
                        }
                        period.record_fetch(&record.url, &outcome);
                        self.progress.on_event(&ProgressEvent::Fetched {
                            period: &label,
                            row: record.row_index + 1,
                            rows: row_count,
                            url: &record.url,
                            outcome,
                        });
                        self.pause.pause(self.options.sleep);
                    }
                    WindowDecision::NotApplicable | WindowDecision::MissingDate => {
                        if let Some(column) = status_columns[period_index] {
                            table.set(record.row_index, column, STATUS_SKIPPED);
                        }
                        period.record_skip();
                        self.progress.on_event(&ProgressEvent::Skipped {
                            period: &label,
                            row: record.row_index + 1,
                            url: &record.url,
                        });
                    }
                }
            }
            summary.periods.push(period);
        }

        if summary.interrupted {
            self.progress.on_event(&ProgressEvent::Interrupted {
                api_calls: summary.api_calls(),
            });
        }

        self.progress.on_event(&ProgressEvent::State(RunState::Classifying));
        for (policy, &users_column) in policies.iter().zip(&users_columns) {
            let standard = table.ensure_column(&policy.milestone_column(), "");
            let detailed = table.ensure_column(&policy.detailed_milestone_column(), "");
            for row in 0..table.len() {
                let users = table.count(row, users_column);
                table.set(row, standard, classify(users, Granularity::Standard).label());
                table.set(row, detailed, classify(users, Granularity::Detailed).label());
            }
        }

        self.progress.on_event(&ProgressEvent::State(RunState::Done));
        info!(
            action = "complete",
            component = "batch",
            api_calls = summary.api_calls(),
            failed_fetches = summary.failed_fetches(),
            interrupted = summary.interrupted,
            duration_ms = start_time.elapsed().as_millis(),
            "Batch run finished"
        );

        Ok(BatchReport {
            table,
            invalid: validated.invalid,
            summary,
        })
    }
}
