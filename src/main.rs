use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;

use brainview::config::Config;
use brainview::{runtime, synthetic};

/// Live view and local simulation of a 3D neural graph.
#[derive(Parser)]
#[command(name = "brainview")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// WebSocket URL of the live source
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Port of the display surface
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Base URL of the REST graph source
    #[arg(long, global = true)]
    source_url: Option<String>,

    /// Seed for layout and simulation randomness
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Start in demo mode instead of connecting to the live source
    #[arg(long, global = true)]
    demo: bool,

    /// Log filter, e.g. `brainview=debug` (defaults to RUST_LOG, then `brainview=info`)
    #[arg(long, global = true)]
    log: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the session and the display surface (default behavior)
    Run,
    /// Print the synthetic fallback graph as JSON
    Synth {
        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_path(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(endpoint) = &self.endpoint {
            config.live.endpoint = endpoint.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(url) = &self.source_url {
            config.source.url = Some(url.clone());
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.demo {
            config.live.start_live = false;
        }
        config.validate()?;
        Ok(config)
    }

    fn env_filter(&self) -> EnvFilter {
        match &self.log {
            Some(filter) => EnvFilter::new(filter),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("brainview=info")),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(cli.env_filter())
        .with_writer(std::io::stderr)
        .init();

    let config = cli.load_config()?;

    match cli.command {
        None | Some(Commands::Run) => runtime::run(config).await?,
        Some(Commands::Synth { pretty }) => {
            let seed = config.seed.unwrap_or_else(rand::random);
            let graph = synthetic::generate(
                &mut StdRng::seed_from_u64(seed),
                config.render.bounding_radius,
            );
            let json = if pretty {
                serde_json::to_string_pretty(&graph)?
            } else {
                serde_json::to_string(&graph)?
            };
            println!("{json}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cli_parses_with_defaults() {
        let cli = Cli::try_parse_from(["brainview"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
        assert!(!cli.demo);

        let config = cli.load_config().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn cli_parses_synth_subcommand() {
        let cli = Cli::try_parse_from(["brainview", "synth", "--pretty", "--seed", "7"]).unwrap();
        match cli.command {
            Some(Commands::Synth { pretty }) => assert!(pretty),
            _ => panic!("Expected Synth command"),
        }
        assert_eq!(cli.seed, Some(7));
    }

    #[test]
    fn flags_override_the_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  port: 8081\nlive:\n  endpoint: ws://file/ws").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = Cli::try_parse_from([
            "brainview",
            "run",
            "--config",
            &path,
            "--port",
            "9000",
            "--demo",
            "--source-url",
            "http://store.local",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.live.endpoint, "ws://file/ws");
        assert!(!config.live.start_live);
        assert_eq!(config.source.url.as_deref(), Some("http://store.local"));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let cli = Cli::try_parse_from(["brainview", "--config", "/nonexistent/brainview.yaml"]).unwrap();
        assert!(cli.load_config().is_err());
    }
}
