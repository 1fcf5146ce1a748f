use chrono::{Days, NaiveDate};
use std::fmt;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive date range sent to the reporting API. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    start: NaiveDate,
    end: NaiveDate,
}

impl Window {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// `[today - days, today]`
    pub fn trailing(today: NaiveDate, days: u32) -> Option<Self> {
        let start = today.checked_sub_days(Days::new(u64::from(days)))?;
        Self::new(start, today)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Days between start and end, so a one-day window is 0.
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn start_str(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start_str(), self.end_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPolicy {
    /// `[published, published + days]`
    FixedOffset { days: u32 },
    /// The same window for every row
    FixedCalendar { window: Window },
    /// `[published, cutoff]` for rows published on or before the cutoff
    UpToCutoff { cutoff: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDecision {
    Fetch(Window),
    /// Published after the cutoff, or the end date is not representable.
    NotApplicable,
    MissingDate,
}

impl WindowPolicy {
    pub fn requires_publication_date(&self) -> bool {
        !matches!(self, WindowPolicy::FixedCalendar { .. })
    }

    pub fn resolve(&self, published: Option<NaiveDate>) -> WindowDecision {
        match *self {
            WindowPolicy::FixedCalendar { window } => WindowDecision::Fetch(window),
            WindowPolicy::FixedOffset { days } => {
                let Some(start) = published else {
                    return WindowDecision::MissingDate;
                };
                start
                    .checked_add_days(Days::new(u64::from(days)))
                    .and_then(|end| Window::new(start, end))
                    .map_or(WindowDecision::NotApplicable, WindowDecision::Fetch)
            }
            WindowPolicy::UpToCutoff { cutoff } => {
                let Some(start) = published else {
                    return WindowDecision::MissingDate;
                };
                Window::new(start, cutoff)
                    .map_or(WindowDecision::NotApplicable, WindowDecision::Fetch)
            }
        }
    }

    /// Suffix shared by the metric, milestone and status columns.
    pub fn period_label(&self) -> String {
        match self {
            WindowPolicy::FixedOffset { days } => format!("{}_days", days),
            WindowPolicy::FixedCalendar { window } => {
                format!("{}_to_{}", window.start_str(), window.end_str())
            }
            WindowPolicy::UpToCutoff { cutoff } => format!("to_{}", cutoff.format(DATE_FORMAT)),
        }
    }

    pub fn users_column(&self) -> String {
        format!("users_{}", self.period_label())
    }

    pub fn milestone_column(&self) -> String {
        format!("user_milestone_{}", self.period_label())
    }

    pub fn detailed_milestone_column(&self) -> String {
        format!("user_milestone_{}_detailed", self.period_label())
    }

    pub fn status_column(&self) -> String {
        format!("status_{}", self.period_label())
    }
}
