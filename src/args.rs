use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pagetally",
    about = "Fetch GA4 user counts for URLs over time windows and classify them into milestones",
    version,
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a configuration file (defaults to ./pagetally.toml, then built-in defaults)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// GA4 property ID
    #[arg(long, global = true)]
    pub property_id: Option<String>,

    /// Service account credentials JSON file
    #[arg(long, global = true)]
    pub credentials: Option<PathBuf>,

    /// Site prefix stripped from URLs before pattern matching
    #[arg(long, global = true)]
    pub site_prefix: Option<String>,

    /// Seconds to wait after each API request
    #[arg(long, global = true)]
    pub sleep: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Users in the N days after each URL's publication date
    Days {
        /// Input CSV with url and date_published columns
        #[arg(short, long)]
        input: PathBuf,

        /// Periods in days after publication (e.g. 30 90 360)
        #[arg(short, long, num_args = 1.., default_values_t = [360])]
        days: Vec<u32>,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Users from each URL's publication date up to a fixed end date
    UpTo {
        /// Input CSV with url and date_published columns, optionally regex
        #[arg(short, long)]
        input: PathBuf,

        /// End date (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Users for every URL within the same date range
    Range {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start_date: NaiveDate,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end_date: NaiveDate,

        /// URLs to analyze
        #[arg(long, num_args = 1.., conflicts_with = "input")]
        urls: Vec<String>,

        /// Input CSV with a url column
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// User growth of one URL over several periods from a start date
    Trend {
        #[arg(long)]
        url: String,

        /// Publication or start date (YYYY-MM-DD)
        #[arg(long)]
        start_date: NaiveDate,

        /// Periods in days
        #[arg(long, num_args = 1.., default_values_t = [7, 14, 30, 60, 90, 180, 360])]
        periods: Vec<u32>,

        /// Optional CSV output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Users of one URL over the last N days
    Single {
        #[arg(long)]
        url: String,

        #[arg(short, long, default_value_t = 30)]
        days: u32,
    },

    /// Write pagetally.toml with the default settings
    Init,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct BatchArgs {
    /// Output CSV file (defaults depend on the command)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Add a status_<period> column marking ok, failed, skipped and invalid rows
    #[arg(long)]
    pub status_columns: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_defaults_to_360() {
        let args = Args::try_parse_from(["pagetally", "days", "-i", "posts.csv"]).unwrap();
        match args.command {
            Command::Days { days, input, batch } => {
                assert_eq!(days, vec![360]);
                assert_eq!(input, PathBuf::from("posts.csv"));
                assert!(!batch.status_columns);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "pagetally",
            "up-to",
            "--input",
            "posts.csv",
            "--date",
            "2023-12-31",
            "--property-id",
            "42",
            "--sleep",
            "0",
        ])
        .unwrap();
        assert_eq!(args.property_id.as_deref(), Some("42"));
        assert_eq!(args.sleep, Some(0));
        match args.command {
            Command::UpTo { date, .. } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap())
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_date_is_rejected() {
        assert!(Args::try_parse_from(["pagetally", "up-to", "-i", "x.csv", "--date", "31/12/2023"]).is_err());
    }

    #[test]
    fn trend_default_periods() {
        let args = Args::try_parse_from([
            "pagetally",
            "trend",
            "--url",
            "https://www.yourpage.com/a",
            "--start-date",
            "2023-01-01",
        ])
        .unwrap();
        match args.command {
            Command::Trend { periods, .. } => assert_eq!(periods, vec![7, 14, 30, 60, 90, 180, 360]),
            other => panic!("unexpected {other:?}"),
        }
    }
}
