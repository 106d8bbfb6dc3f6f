use clap::Parser;
use tether_cli::tracing_support::{init_subscriber, TracingConfig};
use tether_cli::{run, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let defaults = TracingConfig::default();
    let config = TracingConfig {
        level: cli.log_level.unwrap_or(defaults.level),
        format: cli.log_format,
        ..defaults
    };
    init_subscriber(&config)?;

    run(cli, &mut std::io::stdout().lock())
}
