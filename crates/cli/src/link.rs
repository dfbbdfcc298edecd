//! `reclink run|validate|columns` — config-driven record linkage.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use reclink_linkage::config::SourceConfig;
use reclink_linkage::{load_csv, LinkConfig, LinkError, Linker, LogDiagnostics, RecordSet};

use crate::exit_codes::{
    link_exit_code, EXIT_LINK_INVALID_CONFIG, EXIT_LINK_NO_MATCHES, EXIT_LINK_RUNTIME,
};
use crate::CliError;

#[derive(Subcommand)]
pub enum LinkCommands {
    /// Run linkage from a TOML config file
    #[command(after_help = "\
Examples:
  reclink run link.toml
  reclink run link.toml --json
  reclink run link.toml --output matches.json
  reclink run link.toml --threshold 0.95 --fail-on-empty")]
    Run {
        /// Path to the link config file
        config: PathBuf,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Override match_threshold from the config
        #[arg(long)]
        threshold: Option<f64>,

        /// Exit with a distinct code when no pair reaches the threshold
        #[arg(long)]
        fail_on_empty: bool,
    },

    /// Validate a link config (and its input headers, when sources are set) without running
    #[command(after_help = "\
Examples:
  reclink validate link.toml")]
    Validate {
        /// Path to the link config file
        config: PathBuf,
    },

    /// Print the standardized column names of a CSV file
    #[command(after_help = "\
Examples:
  reclink columns sba.csv
  reclink columns gl.csv --json")]
    Columns {
        /// CSV file to inspect
        file: PathBuf,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },
}

pub fn cmd_link(cmd: LinkCommands) -> Result<(), CliError> {
    match cmd {
        LinkCommands::Run {
            config,
            json,
            output,
            threshold,
            fail_on_empty,
        } => cmd_link_run(config, json, output, threshold, fail_on_empty),
        LinkCommands::Validate { config } => cmd_link_validate(config),
        LinkCommands::Columns { file, json } => cmd_link_columns(file, json),
    }
}

fn link_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError::new(code, msg)
}

fn engine_err(err: LinkError) -> CliError {
    link_err(link_exit_code(&err), err.to_string())
}

fn load_config(config_path: &Path) -> Result<LinkConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| link_err(EXIT_LINK_RUNTIME, format!("cannot read config: {e}")))?;
    LinkConfig::from_toml(&config_str).map_err(engine_err)
}

/// Load both sources. File paths resolve relative to the config file's directory.
fn load_sources(
    config_path: &Path,
    config: &LinkConfig,
) -> Result<(RecordSet, RecordSet), CliError> {
    let sources = config.sources.as_ref().ok_or_else(|| {
        link_err(EXIT_LINK_INVALID_CONFIG, "config has no [sources] section")
            .with_hint("add [sources.left] and [sources.right] with name and file")
    })?;
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let left = load_source(base_dir, &sources.left, &config.id_field)?;
    let right = load_source(base_dir, &sources.right, &config.id_field)?;
    Ok((left, right))
}

fn load_source(
    base_dir: &Path,
    source: &SourceConfig,
    id_field: &str,
) -> Result<RecordSet, CliError> {
    let csv_path = base_dir.join(&source.file);
    let csv_data = std::fs::read_to_string(&csv_path).map_err(|e| {
        link_err(EXIT_LINK_RUNTIME, format!("cannot read {}: {e}", csv_path.display()))
    })?;
    let set = load_csv(&source.name, &csv_data, id_field, &LogDiagnostics).map_err(engine_err)?;
    log::debug!("loaded {} rows from {}", set.len(), csv_path.display());
    Ok(set)
}

fn cmd_link_run(
    config_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
    threshold: Option<f64>,
    fail_on_empty: bool,
) -> Result<(), CliError> {
    let mut config = load_config(&config_path)?;
    if let Some(t) = threshold {
        config.match_threshold = t;
        config.validate().map_err(|e| {
            engine_err(e).with_hint("--threshold must be between 0 and 1")
        })?;
    }

    let (left, right) = load_sources(&config_path, &config)?;

    let linker = Linker::new(config, &LogDiagnostics).map_err(engine_err)?;
    let result = linker.link(&left, &right).map_err(engine_err)?;

    // Output
    let json_str = serde_json::to_string_pretty(&result)
        .map_err(|e| link_err(EXIT_LINK_RUNTIME, format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| link_err(EXIT_LINK_RUNTIME, format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }

    // Human summary to stderr
    let s = &result.summary;
    eprintln!(
        "{}: {} x {} records, {} comparison columns, {} candidate pairs, {} matches at p >= {}",
        result.meta.config_name,
        s.left_records,
        s.right_records,
        s.comparison_columns,
        s.candidate_pairs,
        s.matches,
        s.match_threshold,
    );
    for pass in &result.training {
        eprintln!(
            "  training '{}': {} pairs, {} iterations ({})",
            pass.rule, pass.candidate_pairs, pass.iterations, pass.stop_reason
        );
    }
    if let Some(mean) = s.mean_match_probability {
        eprintln!("  mean match probability {mean:.4}");
    }

    if fail_on_empty && s.matches == 0 {
        return Err(link_err(
            EXIT_LINK_NO_MATCHES,
            format!("no pair reached match threshold {}", s.match_threshold),
        ));
    }

    Ok(())
}

fn cmd_link_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;

    if config.sources.is_none() {
        eprintln!("config ok: {} (no sources to check)", config.name);
        return Ok(());
    }

    let (left, right) = load_sources(&config_path, &config)?;
    let linker = Linker::new(config, &LogDiagnostics).map_err(engine_err)?;
    let frame = linker.prepare(&left, &right).map_err(engine_err)?;
    eprintln!(
        "config ok: {} ({} comparison columns over {} x {} records)",
        linker.config().name,
        frame.column_count(),
        frame.left_len(),
        frame.right_len()
    );
    for column in &frame.schema.columns {
        eprintln!(
            "  {} = {}.{} ~ {}.{} ({})",
            column.name,
            left.source,
            column.left_field,
            right.source,
            column.right_field,
            column.kind
        );
    }
    Ok(())
}

fn cmd_link_columns(file: PathBuf, json_output: bool) -> Result<(), CliError> {
    let csv_data = std::fs::read_to_string(&file)
        .map_err(|e| link_err(EXIT_LINK_RUNTIME, format!("cannot read {}: {e}", file.display())))?;
    let source = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".into());
    let id_field = LinkConfig::new("").id_field;
    let set = load_csv(&source, &csv_data, &id_field, &LogDiagnostics).map_err(engine_err)?;

    if json_output {
        let val = serde_json::json!({
            "source": set.source,
            "columns": set.columns,
            "rows": set.len(),
        });
        let json_str = serde_json::to_string_pretty(&val)
            .map_err(|e| link_err(EXIT_LINK_RUNTIME, format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    } else {
        for column in &set.columns {
            println!("{column}");
        }
    }
    Ok(())
}
