use std::path::Path;

use crate::fetch::FetchStatus;
use crate::stats::RunSummary;
use crate::trend::{SingleCheck, TrendPoint};
use crate::utils::format_number;

/// Console summary after a batch run.
pub fn print_run_summary(title: &str, summary: &RunSummary, output: &Path, invalid_file: Option<&Path>) {
    println!("\n--- {} ---", title);
    println!("Rows processed: {}", format_number(summary.rows as u64));
    println!("Valid rows: {}", format_number(summary.valid_rows as u64));
    if summary.invalid_rows > 0 {
        match invalid_file {
            Some(path) => println!(
                "Invalid rows: {} (written to {})",
                format_number(summary.invalid_rows as u64),
                path.display()
            ),
            None => println!("Invalid rows: {}", format_number(summary.invalid_rows as u64)),
        }
    }
    println!("API requests: {}", format_number(summary.api_calls() as u64));

    let failed = summary.failed_fetches();
    if failed > 0 {
        println!(
            "Failed requests: {} (recorded as 0 users, not a genuine zero)",
            format_number(failed as u64)
        );
    }

    for period in &summary.periods {
        println!("\nPeriod {}:", period.label);
        println!("- Total users: {}", format_number(period.total_users));
        if period.skipped > 0 {
            println!(
                "- Skipped (published after the window end): {}",
                format_number(period.skipped as u64)
            );
        }
        if let Some((url, users)) = &period.top_url {
            println!("- Top URL: {} ({} users)", url, format_number(*users));
        }
    }

    if summary.interrupted {
        println!("\nRun was interrupted; counts not yet fetched are 0.");
    }
    println!("\nResults saved to {}", output.display());
}

pub fn print_trend(url: &str, points: &[TrendPoint]) {
    println!("\n--- Trend for {} ---", url);
    println!(
        "{:>6}  {:<10}  {:<10}  {:>12}  {:<7}  {:<9}",
        "days", "start", "end", "users", "range", "detailed"
    );
    for point in points {
        println!(
            "{:>6}  {:<10}  {:<10}  {:>12}  {:<7}  {:<9}{}",
            point.days,
            point.start_date,
            point.end_date,
            format_number(point.users),
            point.category.label(),
            point.detailed_category.label(),
            if point.status == FetchStatus::Failed { "  (request failed)" } else { "" }
        );
    }
}

pub fn print_single(url: &str, check: &SingleCheck) {
    println!("\n--- {} ---", url);
    println!("Window: {} ({} days)", check.window, check.window.span_days());
    println!("Users: {}", format_number(check.users));
    println!("Range: {}", check.category.label());
    println!("Detailed range: {}", check.detailed_category.label());
    if check.status == FetchStatus::Failed {
        println!("The request failed; the count above is not a genuine zero.");
    }
}
