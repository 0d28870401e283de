use clap::{Args, Parser, Subcommand};
use placeseek::config::Config;
use placeseek::location::{LocationResolver, OpenMeteoClient};
use placeseek::server::{self, CitiesResponse};
use std::path::PathBuf;
use std::sync::Arc;

/// Placeseek: location autocomplete engine
///
/// Resolves free-text place queries into ranked city candidates, expanding
/// country names into their major cities.
///
/// Examples:
///   placeseek serve --port 8080
///   placeseek serve --config placeseek.toml
///   placeseek search Tokyo
///   placeseek search Japan --verbose
#[derive(Parser)]
#[command(name = "placeseek", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (GET /api/cities?q=...).
    Serve {
        #[command(flatten)]
        common: CommonArgs,

        /// Bind address override.
        #[arg(long)]
        host: Option<String>,

        /// Port override.
        #[arg(long, short = 'p')]
        port: Option<u16>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        json_logs: bool,
    },
    /// Resolve one query and print the result as JSON.
    Search {
        /// Free-text place query. Example: "New York"
        query: String,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// TOML configuration file.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Debug logging.
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn load_config(common: &CommonArgs) -> Config {
    Config::load(common.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { common, host, port, json_logs } => {
            placeseek::logging::init(common.verbose, json_logs);
            let mut config = load_config(&common);
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            if let Err(e) = server::start(&config).await {
                tracing::error!(error = %e, "server stopped");
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Command::Search { query, common } => {
            placeseek::logging::init(common.verbose, false);
            let config = load_config(&common);

            let geocoder = OpenMeteoClient::new(config.upstream.endpoint.clone())
                .with_user_agent(config.upstream.user_agent.clone());
            let resolver = LocationResolver::new(Arc::new(geocoder), config.resolver_settings());

            match resolver.resolve(&query).await {
                Ok(cities) => match serde_json::to_string_pretty(&CitiesResponse { cities }) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    eprintln!("Error [{}]: {}", e.code(), e);
                    std::process::exit(1);
                }
            }
        }
    }
}
