use std::io::{self, Write};

use serde::Serialize;

use crate::app::{LookupResult, ProgressEvent, ProgressSink};
use crate::report::{ImportReport, RunMode};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Console,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &ImportReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_lookup(result: &LookupResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Plain-text progress lines and summaries on stdout.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => println!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => println!("{}", event.message),
        }
    }
}

impl ConsoleOutput {
    pub fn print_report(report: &ImportReport) {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let red = "\x1b[31m";
        let reset = "\x1b[0m";
        let stats = &report.stats;

        let title = match report.mode {
            RunMode::Load => "import summary",
            RunMode::Audit => "audit summary (nothing written)",
        };
        println!("{cyan}rarekb {title}{reset}");
        println!("  source:      {}", report.source);
        println!("  destination: {}", report.destination);
        println!(
            "  map:         orpha={} omim={} hpo={} placeholders={}",
            report.map.orpha_codes,
            report.map.omim_codes,
            report.map.hpo_terms,
            report.map.placeholder_codes
        );
        println!(
            "{green}  imported:    {} (new {}, already present {}){reset}",
            stats.imported(),
            stats.inserted,
            stats.duplicates
        );
        println!(
            "{yellow}  skipped:     {} missing phenotype, {} missing disease{reset}",
            stats.skipped_missing_left, stats.skipped_missing_right
        );
        if stats.placeholders_created > 0 {
            println!(
                "{yellow}  placeholders created: {}{reset}",
                stats.placeholders_created
            );
        }
        let color = if stats.errored > 0 { red } else { green };
        println!("{color}  errored:     {}{reset}", stats.errored);
        println!("  total seen:  {}", stats.total_seen);

        for problem in report.problems.iter().take(10) {
            println!("{red}  ! {problem}{reset}");
        }
        if report.problems.len() > 10 {
            println!("{red}  ! ... {} more in report{reset}", report.problems.len() - 10);
        }
    }

    pub fn print_lookup(result: &LookupResult) {
        match (result.destination_id, result.matched_by) {
            (Some(id), Some(path)) => {
                println!("{} -> {id} (via {path:?})", result.normalized)
            }
            (Some(id), None) => println!("{} -> {id}", result.normalized),
            (None, _) => println!("{} -> not found", result.normalized),
        }
    }
}
