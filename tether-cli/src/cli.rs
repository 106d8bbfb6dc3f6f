//! Command-line interface

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tether_plugin_host::{Loader, LoaderConfig};

use crate::report::LibraryReport;
use crate::tracing_support::TracingFormat;

#[derive(Debug, Parser)]
#[command(name = "tether", version, about = "Inspect tether plugin libraries")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level when RUST_LOG is not set [default: warn]
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<tracing::Level>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = TracingFormat::Compact, global = true)]
    pub log_format: TracingFormat,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the plugins and interfaces a library provides
    Info(InfoArgs),

    /// Load every library in a directory and summarize them
    Scan(ScanArgs),
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Library path, or a logical name looked up in the search paths
    pub library: String,

    /// Print the full registry dump
    #[arg(short, long)]
    pub verbose: bool,

    /// Print a JSON document instead of text
    #[arg(long, conflicts_with = "verbose")]
    pub json: bool,

    /// Extra directories to search (also read from TETHER_PLUGIN_PATH)
    #[arg(long = "plugin-path", value_name = "DIR")]
    pub plugin_paths: Vec<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directory containing plugin libraries
    pub dir: PathBuf,

    /// Print a JSON document instead of text
    #[arg(long)]
    pub json: bool,
}

/// Execute a parsed command line, writing the report to `out`
pub fn run(cli: Cli, out: &mut impl Write) -> anyhow::Result<()> {
    match cli.command {
        Command::Info(args) => info(args, out),
        Command::Scan(args) => scan(args, out),
    }
}

fn info(args: InfoArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let mut config = LoaderConfig::from_env();
    config.search_paths.extend(args.plugin_paths);
    let mut loader = Loader::with_config(&config);

    let path = resolve_library(&loader, &args.library)?;
    let plugins = loader
        .try_load_library(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    tracing::info!(path = %path.display(), count = plugins.len(), "Inspected library");

    let report = LibraryReport::new(&loader, path, &plugins);
    if args.json {
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)?;
    } else if args.verbose {
        write!(out, "{}", loader.pretty_str())?;
    } else {
        write!(out, "{}", report.summary())?;
    }
    Ok(())
}

fn scan(args: ScanArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let mut loader = Loader::new();
    let result = loader
        .load_directory(&args.dir)
        .with_context(|| format!("scanning {}", args.dir.display()))?;

    let reports: Vec<LibraryReport> = result
        .libraries
        .iter()
        .map(|(path, plugins)| LibraryReport::new(&loader, path.clone(), plugins))
        .collect();

    if args.json {
        serde_json::to_writer_pretty(&mut *out, &reports)?;
        writeln!(out)?;
    } else {
        for report in &reports {
            writeln!(out, "{}", report.summary())?;
        }
        for (path, error) in &result.failures {
            writeln!(out, "failed: {}: {}", path.display(), error)?;
        }
        writeln!(
            out,
            "{} of {} librar(ies) loaded",
            result.libraries.len(),
            result.total_found()
        )?;
    }
    Ok(())
}

/// An existing file is used as is; anything else goes through the search paths
fn resolve_library(loader: &Loader, library: &str) -> anyhow::Result<PathBuf> {
    if Path::new(library).is_file() {
        return Ok(PathBuf::from(library));
    }
    match loader.search_paths().find_library(library) {
        Some(path) => Ok(path),
        None => bail!(
            "library '{}' not found in {} search path(s)",
            library,
            loader.search_paths().len()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_info() {
        let cli = Cli::try_parse_from([
            "tether",
            "info",
            "geometry",
            "--json",
            "--plugin-path",
            "/opt/a",
            "--plugin-path",
            "/opt/b",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.log_level, Some(tracing::Level::DEBUG));
        match cli.command {
            Command::Info(args) => {
                assert_eq!(args.library, "geometry");
                assert!(args.json);
                assert!(!args.verbose);
                assert_eq!(args.plugin_paths.len(), 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_json_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["tether", "info", "x", "--json", "-v"]).is_err());
        let cli = Cli::try_parse_from(["tether", "info", "x", "-v"]).unwrap();
        assert!(matches!(cli.command, Command::Info(InfoArgs { verbose: true, .. })));
    }

    #[test]
    fn test_info_unknown_library() {
        let cli = Cli::try_parse_from(["tether", "info", "definitely-not-a-plugin"]).unwrap();
        let mut out = Vec::new();
        let err = run(cli, &mut out).unwrap_err();
        assert!(err.to_string().contains("definitely-not-a-plugin"));
        assert!(out.is_empty());
    }

    #[test]
    fn test_info_rejects_non_library_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("fake.so");
        std::fs::write(&file, b"not a shared object").unwrap();

        let cli = Cli::try_parse_from(["tether", "info", file.to_str().unwrap()]).unwrap();
        let err = run(cli, &mut Vec::new()).unwrap_err();
        assert!(format!("{err:#}").contains("loading"));
    }

    #[test]
    fn test_scan_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from(["tether", "scan", dir.path().to_str().unwrap()]).unwrap();

        let mut out = Vec::new();
        run(cli, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("0 of 0"));
    }
}
