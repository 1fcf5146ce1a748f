use time::macros::format_description;
use tracing_subscriber::{fmt::time::LocalTime, EnvFilter};

use crate::args::{Args, Command};

/// `RUST_LOG` wins when set; otherwise `--verbose` selects info output.
pub fn setup_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pagetally={}", default_level)));

    let timer = LocalTime::new(format_description!(
        "[hour]:[minute]:[second].[subsecond digits:3]"
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(timer)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn format_number(num: u64) -> String {
    let digits = num.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn validate_args(args: &Args) -> anyhow::Result<()> {
    if let Some(sleep) = args.sleep {
        if sleep > 3600 {
            anyhow::bail!("--sleep must be at most 3600 seconds");
        }
    }

    match &args.command {
        Command::Days { days, .. } => {
            if days.is_empty() {
                anyhow::bail!("--days needs at least one period");
            }
        }
        Command::Range {
            start_date,
            end_date,
            urls,
            input,
            ..
        } => {
            if end_date < start_date {
                anyhow::bail!("--end-date must not be before --start-date");
            }
            if urls.is_empty() && input.is_none() {
                anyhow::bail!("range needs --urls or --input");
            }
        }
        Command::Trend { periods, .. } => {
            if periods.is_empty() {
                anyhow::bail!("--periods needs at least one period");
            }
        }
        Command::Single { days, .. } => {
            if *days == 0 {
                anyhow::bail!("--days must be greater than 0");
            }
        }
        Command::UpTo { .. } | Command::Init => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn thousands_separators() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(12_345), "12,345");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn rejects_inverted_range() {
        let args = Args::try_parse_from([
            "pagetally",
            "range",
            "--start-date",
            "2023-02-01",
            "--end-date",
            "2023-01-01",
            "--urls",
            "https://www.yourpage.com/a",
        ])
        .unwrap();
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn range_needs_urls_or_input() {
        let args = Args::try_parse_from([
            "pagetally",
            "range",
            "--start-date",
            "2023-01-01",
            "--end-date",
            "2023-01-31",
        ])
        .unwrap();
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn accepts_days_batch() {
        let args = Args::try_parse_from([
            "pagetally",
            "days",
            "--input",
            "posts.csv",
            "--days",
            "30",
            "90",
            "360",
        ])
        .unwrap();
        assert!(validate_args(&args).is_ok());
    }

    #[test]
    fn rejects_long_sleep() {
        let args =
            Args::try_parse_from(["pagetally", "--sleep", "7200", "single", "--url", "/a"]).unwrap();
        assert!(validate_args(&args).is_err());
    }
}
