//! Mistake finder CLI
//!
//! Reads a PGN game from a file or stdin, runs it through a local Stockfish,
//! and prints the result as JSON on stdout. Logs go to stderr.

use std::io::Read;

use anyhow::Context;
use serde_json::json;
use tracing::info;

use analysis_worker::analyzer::{self, AnalysisSettings};
use analysis_worker::config::WorkerConfig;

const USAGE: &str = "usage: analysis-worker [--depth N] [--fast-depth N] [--scan-only] [FILE|-]";

#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    depth: Option<u32>,
    fast_depth: Option<u32>,
    scan_only: bool,
    /// `None` or "-" reads stdin
    input: Option<String>,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs, String> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--depth" | "--fast-depth" => {
                let value = args
                    .next()
                    .and_then(|v| v.trim().parse().ok())
                    .ok_or_else(|| format!("{arg} expects a number"))?;
                if arg == "--depth" {
                    parsed.depth = Some(value);
                } else {
                    parsed.fast_depth = Some(value);
                }
            }
            "--scan-only" => parsed.scan_only = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with("--") => return Err(format!("unknown option {flag}")),
            path => {
                if parsed.input.replace(path.to_string()).is_some() {
                    return Err("only one input file may be given".to_string());
                }
            }
        }
    }

    Ok(parsed)
}

fn read_pgn(input: Option<&str>) -> anyhow::Result<String> {
    match input {
        None | Some("-") => {
            let mut pgn = String::new();
            std::io::stdin()
                .read_to_string(&mut pgn)
                .context("Failed to read PGN from stdin")?;
            Ok(pgn)
        }
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; stdout is reserved for the JSON result
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let args = parse_args(std::env::args().skip(1)).map_err(anyhow::Error::msg)?;

    let defaults = AnalysisSettings::default();
    let settings = AnalysisSettings {
        depth: args.depth.unwrap_or(defaults.depth),
        fast_depth: args.fast_depth.unwrap_or(defaults.fast_depth),
        ..defaults
    };

    let config = WorkerConfig::from_env();
    info!(
        stockfish_path = ?config.stockfish_path,
        threads = config.engine_options.threads,
        hash_mb = config.engine_options.hash_mb,
        "Worker config loaded"
    );

    let pgn = read_pgn(args.input.as_deref())?;

    let output = if args.scan_only {
        let candidates = analyzer::scan_game(&config, &pgn, &settings).await?;
        json!({ "candidates": candidates })
    } else {
        let mistakes = analyzer::analyze_game(&config, &pgn, &settings).await?;
        json!({ "mistakes": mistakes })
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<CliArgs, String> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args_defaults() {
        assert_eq!(args(&[]).unwrap(), CliArgs::default());
    }

    #[test]
    fn test_parse_args_all_options() {
        let parsed = args(&["--depth", "18", "--fast-depth", "8", "--scan-only", "game.pgn"]).unwrap();
        assert_eq!(
            parsed,
            CliArgs {
                depth: Some(18),
                fast_depth: Some(8),
                scan_only: true,
                input: Some("game.pgn".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(args(&["--depth"]).is_err());
        assert!(args(&["--depth", "deep"]).is_err());
        assert!(args(&["--verbose"]).is_err());
        assert!(args(&["a.pgn", "b.pgn"]).is_err());
    }

    #[test]
    fn test_dash_means_stdin() {
        assert_eq!(args(&["-"]).unwrap().input.as_deref(), Some("-"));
    }
}
