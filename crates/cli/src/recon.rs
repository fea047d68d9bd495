//! `ledgerline recon` — config-driven cancellation reconciliation.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use log::info;
use ledgerline_recon::config::InputConfig;
use ledgerline_recon::{load_csv_rows, AuditReport, ReconConfig, ReconError, ReconResult};

use crate::exit_codes::{
    EXIT_RECON_BLOCKING, EXIT_RECON_INVALID_CONFIG, EXIT_RECON_RUNTIME, EXIT_RECON_WARNINGS,
};
use crate::tables::{write_tables, AUDIT_JSON};
use crate::CliError;

#[derive(Subcommand)]
pub enum ReconCommands {
    /// Run reconciliation from a TOML config file
    #[command(after_help = "\
Examples:
  ledgerline recon run daily.recon.toml --output-dir out/
  ledgerline recon run daily.recon.toml --input snapshot.csv --json
  ledgerline recon run daily.recon.toml --output-dir out/ --strict")]
    Run {
        /// Path to the .recon.toml config file
        config: PathBuf,

        /// Transaction snapshot CSV (overrides [input].file)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Directory for the output tables and audit.json
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Output the full result as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Treat non-blocking findings as failure
        #[arg(long)]
        strict: bool,
    },

    /// Validate a recon config without running
    #[command(after_help = "\
Examples:
  ledgerline recon validate daily.recon.toml")]
    Validate {
        /// Path to the .recon.toml config file
        config: PathBuf,
    },
}

pub fn cmd_recon(cmd: ReconCommands) -> Result<(), CliError> {
    match cmd {
        ReconCommands::Run { config, input, output_dir, json, strict } => {
            cmd_recon_run(config, input, output_dir, json, strict)
        }
        ReconCommands::Validate { config } => cmd_recon_validate(config),
    }
}

fn recon_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError::new(code, msg)
}

fn read_config(config_path: &Path) -> Result<ReconConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot read config: {e}")))?;
    ReconConfig::from_toml(&config_str)
        .map_err(|e| recon_err(EXIT_RECON_INVALID_CONFIG, e.to_string()))
}

/// `--input` wins; otherwise `[input].file` relative to the config's directory.
fn resolve_input(
    config_path: &Path,
    config: &ReconConfig,
    input_override: Option<PathBuf>,
) -> Result<(PathBuf, InputConfig), CliError> {
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    match (input_override, &config.input) {
        (Some(path), Some(input)) => Ok((path, input.clone())),
        (Some(path), None) => {
            let input = InputConfig::new(path.display().to_string());
            Ok((path, input))
        }
        (None, Some(input)) => Ok((base_dir.join(&input.file), input.clone())),
        (None, None) => Err(recon_err(EXIT_RECON_INVALID_CONFIG, "no input file configured")
            .with_hint("add an [input] section with `file = ...` or pass --input")),
    }
}

fn cmd_recon_run(
    config_path: PathBuf,
    input_override: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    json_output: bool,
    strict: bool,
) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    let (csv_path, input_config) = resolve_input(&config_path, &config, input_override)?;

    let csv_data = std::fs::read_to_string(&csv_path).map_err(|e| {
        recon_err(EXIT_RECON_RUNTIME, format!("cannot read {}: {e}", csv_path.display()))
    })?;
    let input = load_csv_rows(&csv_data, &input_config).map_err(|e| {
        let err = recon_err(EXIT_RECON_RUNTIME, format!("{}: {e}", csv_path.display()));
        match e {
            ReconError::MissingColumn { .. } => {
                err.with_hint("check [input.columns] against the CSV header")
            }
            _ => err,
        }
    })?;
    info!("loaded {} rows from {}", input.records.len(), csv_path.display());

    let result = ledgerline_recon::run(&config, &input)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, e.to_string()))?;

    if let Some(ref dir) = output_dir {
        write_outputs(dir, &result)?;
    }

    if json_output {
        let json_str = serde_json::to_string_pretty(&result)
            .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    }

    print_summary(&result);

    audit_gate(&result.audit, strict, output_dir.as_deref())
}

/// Exit status of a finished run: blocking findings fail, warnings fail
/// only with `--strict`.
fn audit_gate(audit: &AuditReport, strict: bool, output_dir: Option<&Path>) -> Result<(), CliError> {
    if !audit.passed {
        let err = recon_err(
            EXIT_RECON_BLOCKING,
            format!("{} blocking invariant violation(s); output not promoted", audit.blocking),
        );
        return Err(match output_dir {
            Some(dir) => err.with_hint(format!("see {}", dir.join(AUDIT_JSON).display())),
            None => err.with_hint("rerun with --output-dir to write audit.json"),
        });
    }

    if strict && audit.warnings > 0 {
        return Err(recon_err(
            EXIT_RECON_WARNINGS,
            format!("{} non-blocking finding(s) (--strict)", audit.warnings),
        ));
    }

    Ok(())
}

/// Always writes `audit.json`; the tables only when the audit passed.
fn write_outputs(dir: &Path, result: &ReconResult) -> Result<(), CliError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        recon_err(EXIT_RECON_RUNTIME, format!("cannot create {}: {e}", dir.display()))
    })?;

    let audit_path = dir.join(AUDIT_JSON);
    let audit_json = serde_json::to_string_pretty(&result.audit)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("JSON serialization error: {e}")))?;
    std::fs::write(&audit_path, audit_json)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot write output: {e}")))?;
    eprintln!("wrote {}", audit_path.display());

    if !result.audit.passed {
        eprintln!("blocking findings: output tables not written");
        return Ok(());
    }

    let written = write_tables(dir, result)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot write output: {e}")))?;
    for path in written {
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}

fn print_summary(result: &ReconResult) {
    let s = &result.summary;
    eprintln!(
        "recon '{}': {} rows ({} excluded), {} buckets, {} pairs, {} effectively cancelled ({} inherited)",
        result.meta.config_name,
        s.input_rows,
        s.excluded_rows,
        s.buckets,
        s.pairs,
        s.effective_cancelled,
        s.inherited_cancellations,
    );
    for (status, count) in &s.status_counts {
        if *count > 0 {
            eprintln!("  {status}: {count}");
        }
    }
    eprintln!(
        "audit: {} ({} blocking, {} warnings)",
        if result.audit.passed { "passed" } else { "FAILED" },
        s.blocking_findings,
        s.warnings,
    );
}

fn cmd_recon_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;

    eprintln!(
        "valid: recon '{}' cutover {}, max_bucket_size {}, {} type mapping(s)",
        config.name,
        config.cutover_date,
        config.max_bucket_size,
        config.transaction_types.len(),
    );
    for (code, label) in config.transaction_types.iter() {
        println!("{code}\t{label}");
    }
    Ok(())
}
