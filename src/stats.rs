use crate::fetch::{FetchOutcome, FetchStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodSummary {
    pub label: String,
    pub fetched: usize,
    /// Fetches that failed and were recorded as 0 users
    pub failed: usize,
    /// Rows the window did not apply to (published after the cutoff)
    pub skipped: usize,
    pub total_users: u64,
    pub top_url: Option<(String, u64)>,
}

impl PeriodSummary {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn record_fetch(&mut self, url: &str, outcome: &FetchOutcome) {
        self.fetched += 1;
        if outcome.status == FetchStatus::Failed {
            self.failed += 1;
        }
        self.total_users = self.total_users.saturating_add(outcome.users);
        let is_new_top = match &self.top_url {
            Some((_, users)) => outcome.users > *users,
            None => true,
        };
        if is_new_top {
            self.top_url = Some((url.to_string(), outcome.users));
        }
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub periods: Vec<PeriodSummary>,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn api_calls(&self) -> usize {
        self.periods.iter().map(|p| p.fetched).sum()
    }

    pub fn failed_fetches(&self) -> usize {
        self.periods.iter().map(|p| p.failed).sum()
    }
}
