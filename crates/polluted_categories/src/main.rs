use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use polluted_categories_core::config::{ReportConfig, load_config};
use polluted_categories_core::pipeline::{RunOptions, RunReport, run_report};

#[derive(Debug, Parser)]
#[command(
    name = "polluted-categories",
    version,
    about = "Update [[Wikipedia:Database reports/Polluted categories (2)]] from the enwiki replica"
)]
struct Cli {
    #[arg(
        long,
        value_name = "PATH",
        help = "TOML file with [wiki] api_url/user_agent overrides"
    )]
    config: Option<PathBuf>,
    #[arg(long, help = "Print the report wikitext instead of saving it")]
    dry_run: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ReportConfig::default(),
    };

    let report = run_report(&RunOptions {
        config,
        dry_run: cli.dry_run,
    })?;
    write_report(&mut io::stdout().lock(), &report)?;
    log::info!("task complete");
    Ok(())
}

/// Dry runs write only the page text, so stdout can be redirected to a file.
fn write_report<W: Write>(out: &mut W, report: &RunReport) -> io::Result<()> {
    if let Some(text) = &report.text {
        writeln!(out, "{text}")?;
        log::info!(
            "dry run of {}: {} rows, {} bytes",
            report.title,
            report.rows,
            report.bytes
        );
        return Ok(());
    }
    writeln!(out, "report: {}", report.title)?;
    writeln!(out, "dry_run: {}", format_flag(report.dry_run))?;
    writeln!(out, "rows: {}", report.rows)?;
    writeln!(out, "bytes: {}", report.bytes)?;
    match report.revision_id {
        Some(revision_id) if !report.no_change => writeln!(out, "revision: {revision_id}")?,
        _ => writeln!(out, "revision: <no change>")?,
    }
    writeln!(out, "requests: {}", report.request_count)
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::{CommandFactory, Parser};
    use polluted_categories_core::pipeline::RunReport;

    use super::{Cli, write_report};

    fn report(text: Option<&str>, revision_id: Option<u64>) -> RunReport {
        RunReport {
            title: "Wikipedia:Database reports/Polluted categories (2)".to_string(),
            dry_run: text.is_some(),
            rows: 2,
            bytes: text.map_or(512, str::len),
            revision_id,
            no_change: false,
            request_count: 4,
            text: text.map(ToString::to_string),
        }
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::parse_from(["polluted-categories", "--dry-run", "--config", "bot.toml"]);
        assert!(cli.dry_run);
        assert_eq!(cli.config, Some(PathBuf::from("bot.toml")));

        let cli = Cli::parse_from(["polluted-categories"]);
        assert!(!cli.dry_run);
        assert!(cli.config.is_none());
    }

    #[test]
    fn dry_run_output_is_page_text_only() {
        let text = "Categories that contain pages\n\n{| class=\"wikitable sortable\"\n! Category !! Drafts\n|}";
        let mut out = Vec::new();
        write_report(&mut out, &report(Some(text), None)).expect("write");
        assert_eq!(String::from_utf8(out).expect("utf8"), format!("{text}\n"));
    }

    #[test]
    fn saved_run_output_is_summary() {
        let mut out = Vec::new();
        write_report(&mut out, &report(None, Some(101))).expect("write");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "report: Wikipedia:Database reports/Polluted categories (2)\ndry_run: no\nrows: 2\nbytes: 512\nrevision: 101\nrequests: 4\n"
        );
    }
}
