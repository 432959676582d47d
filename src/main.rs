//! deepscan binary: collect the start URL and search term, run the crawl,
//! and print the matched pages.

use clap::Parser;
use deepscan::controls::Cli;
use deepscan::normalizer;
use deepscan::runtime::{self, CrawlSummary};
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let raw_url = match required_input(cli.start_url.clone(), "Start URL: ") {
        Ok(value) => value,
        Err(err) => {
            eprintln!("failed to read start URL: {err}");
            return ExitCode::from(2);
        }
    };
    let start_url = match normalizer::normalize_start_url(&raw_url) {
        Ok(url) => url,
        Err(err) => {
            eprintln!("invalid start URL {raw_url:?}: {err}");
            return ExitCode::from(2);
        }
    };

    let search_term = match required_input(cli.search_term.clone(), "Search term: ") {
        Ok(value) => value,
        Err(err) => {
            eprintln!("failed to read search term: {err}");
            return ExitCode::from(2);
        }
    };
    if search_term.trim().is_empty() {
        eprintln!("search term must not be empty");
        return ExitCode::from(2);
    }

    let controls = cli.build_controls(start_url, search_term.clone());
    match runtime::run(controls) {
        Ok(summary) => {
            print_results(&search_term, &summary);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("fatal: {err}");
            ExitCode::from(2)
        }
    }
}

/// Uses the CLI argument when present, otherwise prompts on stdin.
fn required_input(arg: Option<String>, prompt: &str) -> io::Result<String> {
    if let Some(value) = arg {
        return Ok(value);
    }
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn print_results(search_term: &str, summary: &CrawlSummary) {
    if summary.cancelled {
        println!("crawl cancelled; reporting matches found so far");
    } else if summary.budget_exhausted {
        println!("page budget reached");
    }

    if summary.matches.is_empty() {
        println!("no pages matched {search_term:?}");
        return;
    }

    println!("pages matching {search_term:?}:");
    for record in &summary.matches {
        println!("  -> {}", record.url);
        for snippet in &record.snippets {
            println!("     ...{snippet}...");
        }
    }
}
