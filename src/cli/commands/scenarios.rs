//! The `scenarios` command: list and validate authored content.

use serde_json::json;

use crate::cli::args::{OutputFormat, ScenariosListArgs, ScenariosValidateArgs};
use crate::error::{RedArenaError, ScenarioError, Severity};
use crate::scenario::loader;
use crate::scenario::store::{FsScenarioStore, ScenarioStore};

/// List the scenarios in a directory.
///
/// # Errors
///
/// Returns a scenario error when the directory cannot be read.
pub fn list(args: &ScenariosListArgs) -> Result<(), RedArenaError> {
    let store = FsScenarioStore::scan(&args.scenario_dir)?;
    let summaries = store.list();

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        OutputFormat::Human => {
            if summaries.is_empty() {
                println!("no scenarios in {}", args.scenario_dir.display());
                return Ok(());
            }
            for s in &summaries {
                println!(
                    "{:<24} {:<14} {:<8} {:>6}s  {}",
                    s.id,
                    s.mode,
                    s.difficulty,
                    s.time_limit_ms / 1000,
                    s.name
                );
            }
        }
    }
    Ok(())
}

/// Validate scenario files without starting the server.
///
/// # Errors
///
/// Returns the first validation or parse failure after reporting all files.
pub fn validate(args: &ScenariosValidateArgs) -> Result<(), RedArenaError> {
    let mut failed = false;
    let mut reports = Vec::new();

    for path in &args.files {
        let raw = std::fs::read_to_string(path).map_err(|_| ScenarioError::MissingFile {
            path: path.clone(),
        })?;
        match loader::parse(&raw) {
            Err(message) => {
                failed = true;
                reports.push((path, vec![format!("parse error: {message}")], true));
            }
            Ok(scenario) => {
                let issues = loader::validate(&scenario);
                let has_errors = issues.iter().any(|i| {
                    i.severity == Severity::Error
                        || (args.strict && i.severity == Severity::Warning)
                });
                failed |= has_errors;
                reports.push((
                    path,
                    issues.iter().map(ToString::to_string).collect(),
                    has_errors,
                ));
            }
        }
    }

    match args.format {
        OutputFormat::Json => {
            let report = reports
                .iter()
                .map(|(path, issues, has_errors)| {
                    json!({
                        "file": path.display().to_string(),
                        "valid": !has_errors,
                        "issues": issues,
                    })
                })
                .collect::<Vec<_>>();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Human => {
            for (path, issues, has_errors) in &reports {
                let verdict = if *has_errors { "FAIL" } else { "ok" };
                println!("{}: {verdict}", path.display());
                for issue in issues {
                    println!("  {issue}");
                }
            }
        }
    }

    if failed {
        return Err(ScenarioError::ValidationError {
            path: args
                .files
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            issues: Vec::new(),
        }
        .into());
    }
    Ok(())
}
