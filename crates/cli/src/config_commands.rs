use std::path::Path;

use {
    anyhow::Result,
    cadence_config::{CadenceConfig, Severity, ValidationResult, validate, validate_file},
    cadence_jobs::Schedule,
    chrono::Utc,
};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Validate the config and preview each job's next firing.
///
/// Exits the process with status 1 when any error is reported.
pub fn check(path: Option<&Path>, verbose: bool) -> Result<()> {
    let result = match path.map(Path::to_path_buf).or_else(cadence_config::find_config_file) {
        Some(path) => validate_file(&path),
        None => validate(&CadenceConfig::default()),
    };

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    print_diagnostics(&result, verbose);

    let errors = result.count(Severity::Error);
    if errors > 0 {
        std::process::exit(1);
    }

    if let Some(path) = &result.config_path {
        print_next_firings(&cadence_config::load_config(path)?);
    }
    Ok(())
}

fn print_diagnostics(result: &ValidationResult, verbose: bool) {
    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
            Severity::Info => CYAN,
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{}{RESET} {}", d.severity, d.message);
        } else {
            eprintln!("  {BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }
}

fn print_next_firings(config: &CadenceConfig) {
    if config.jobs.is_empty() {
        return;
    }
    eprintln!();
    let now = Utc::now();
    for job in &config.jobs {
        let next = Schedule::parse(&job.schedule)
            .ok()
            .and_then(|s| s.next_after(now));
        match next {
            Some(at) if job.enabled => eprintln!("  {:<24} next {}", job.name, at.to_rfc3339()),
            Some(_) => eprintln!("  {:<24} disabled", job.name),
            None => eprintln!("  {:<24} never fires again", job.name),
        }
    }
}
