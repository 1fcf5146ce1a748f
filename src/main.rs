use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use pagetally::args::{Args, BatchArgs, Command};
use pagetally::batch::{BatchOptions, BatchRunner, ThreadSleep};
use pagetally::config::{init_default_config, load_config, Config};
use pagetally::ga4::Ga4Client;
use pagetally::patterns::PatternBuilder;
use pagetally::report;
use pagetally::table::{write_invalid_entries, ResultTable};
use pagetally::trend::{analyze_trend, check_single, write_trend_csv};
use pagetally::utils::{setup_logging, validate_args};
use pagetally::window::{Window, WindowPolicy};

const RANGE_OUTPUT_FILE: &str = "date_range_results.csv";

/// Where a batch reads its rows from.
enum BatchInput<'a> {
    File(&'a Path),
    Table(ResultTable),
}

/// Settings resolved from the config file and CLI overrides.
struct Session {
    config: Config,
    property_id: String,
    patterns: PatternBuilder,
    client: Ga4Client,
    sleep: Duration,
    interrupt: Arc<AtomicBool>,
}

impl Session {
    fn build(args: &Args) -> Result<Self> {
        let mut config = load_config(args.config.as_deref())?;
        if let Some(property_id) = &args.property_id {
            config.property_id = Some(property_id.clone());
        }
        if let Some(credentials) = &args.credentials {
            config.credentials = credentials.clone();
        }
        if let Some(prefix) = &args.site_prefix {
            config.site_prefix = Some(prefix.clone());
        }
        if let Some(sleep) = args.sleep {
            config.sleep_seconds = sleep;
        }

        let property_id = config.require_property_id()?.to_string();
        let client = Ga4Client::from_credentials_file(&config.credentials, &config.api)
            .with_context(|| format!("Failed to set up GA4 client from {:?}", config.credentials))?;

        let interrupt = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, Arc::clone(&interrupt))?;
        signal_hook::flag::register(SIGINT, Arc::clone(&interrupt))?;

        Ok(Self {
            patterns: PatternBuilder::new(config.site_prefix.as_deref()),
            sleep: Duration::from_secs(config.sleep_seconds),
            property_id,
            client,
            interrupt,
            config,
        })
    }

    fn run_batch(
        &self,
        title: &str,
        input: BatchInput<'_>,
        policies: Vec<WindowPolicy>,
        batch: &BatchArgs,
        output: &Path,
    ) -> Result<()> {
        let options = BatchOptions {
            property_id: self.property_id.clone(),
            policies,
            sleep: self.sleep,
            columns: self.config.columns.clone(),
            status_columns: batch.status_columns,
        };
        let mut runner = BatchRunner::new(&self.client, self.patterns.clone(), options)
            .with_pause(ThreadSleep::new(Some(Arc::clone(&self.interrupt))))
            .with_interrupt(Arc::clone(&self.interrupt));
        let result = match input {
            BatchInput::File(path) => runner.run_file(path)?,
            BatchInput::Table(table) => runner.run(table)?,
        };

        result.table.save(output)?;
        let invalid_file = if result.invalid.is_empty() {
            None
        } else {
            write_invalid_entries(&self.config.invalid_rows_file, &result.invalid)?;
            Some(self.config.invalid_rows_file.as_path())
        };

        report::print_run_summary(title, &result.summary, output, invalid_file);
        Ok(())
    }
}

/// `posts.csv` becomes `ga4_posts.csv` next to the input.
fn prefixed_output(input: &Path, prefix: &str) -> Result<PathBuf> {
    let name = input
        .file_name()
        .with_context(|| format!("Input path {:?} has no file name", input))?;
    Ok(input.with_file_name(format!("{}{}", prefix, name.to_string_lossy())))
}

fn run(args: &Args) -> Result<()> {
    let start_time = Instant::now();
    let ctx = match &args.command {
        Command::Init => return init_default_config(),
        _ => Session::build(args)?,
    };

    match &args.command {
        Command::Days { input, days, batch } => {
            let output = match &batch.output {
                Some(path) => path.clone(),
                None => prefixed_output(input, "ga4_")?,
            };
            let policies = days
                .iter()
                .map(|&days| WindowPolicy::FixedOffset { days })
                .collect();
            ctx.run_batch(
                "Days After Publication",
                BatchInput::File(input),
                policies,
                batch,
                &output,
            )?;
        }
        Command::UpTo { input, date, batch } => {
            let output = match &batch.output {
                Some(path) => path.clone(),
                None => prefixed_output(input, "ga4_uptodate_")?,
            };
            let policies = vec![WindowPolicy::UpToCutoff { cutoff: *date }];
            ctx.run_batch(
                &format!("Users Up To {}", date),
                BatchInput::File(input),
                policies,
                batch,
                &output,
            )?;
        }
        Command::Range {
            start_date,
            end_date,
            urls,
            input,
            batch,
        } => {
            let window = Window::new(*start_date, *end_date)
                .context("--end-date must not be before --start-date")?;
            let source = match input {
                Some(path) => BatchInput::File(path),
                None => BatchInput::Table(ResultTable::from_urls(&ctx.config.columns.url, urls)),
            };
            let output = batch
                .output
                .clone()
                .unwrap_or_else(|| PathBuf::from(RANGE_OUTPUT_FILE));
            let policies = vec![WindowPolicy::FixedCalendar { window }];
            ctx.run_batch(&format!("Users {}", window), source, policies, batch, &output)?;
        }
        Command::Trend {
            url,
            start_date,
            periods,
            output,
        } => {
            let mut pause = ThreadSleep::new(Some(Arc::clone(&ctx.interrupt)));
            let points = analyze_trend(
                &ctx.client,
                &ctx.property_id,
                &ctx.patterns,
                url,
                *start_date,
                periods,
                &mut pause,
                ctx.sleep,
                Some(ctx.interrupt.as_ref()),
            );
            report::print_trend(url, &points);
            if let Some(path) = output {
                write_trend_csv(path, &points)?;
                println!("\nTrend saved to {}", path.display());
            }
        }
        Command::Single { url, days } => {
            let today = Local::now().date_naive();
            let check = check_single(&ctx.client, &ctx.property_id, &ctx.patterns, url, today, *days)?;
            report::print_single(url, &check);
        }
        Command::Init => {}
    }

    info!(
        action = "complete",
        component = "main",
        duration_ms = start_time.elapsed().as_millis(),
        "Command finished"
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);
    validate_args(&args)?;

    match run(&args) {
        Ok(()) => Ok(()),
        Err(e) => {
            error!(error = ?e, "Command failed");
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
