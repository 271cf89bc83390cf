#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use pkgfile_core::{default_cache_dir, Config, DEFAULT_INDEX_EXPIRY, DEFAULT_REGISTRY};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "pkgfile")]
#[command(author, version, about = "Fetch single files out of registry packages", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Registry scope, used as the basic-auth user
    #[arg(long, env = "PKGFILE_SCOPE", global = true)]
    scope: Option<String>,

    /// Registry token, used as the basic-auth password
    #[arg(long, env = "PKGFILE_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Registry base URL
    #[arg(long, env = "PKGFILE_REGISTRY", default_value = DEFAULT_REGISTRY, global = true)]
    registry: String,

    /// Cache root (index documents and extracted packages)
    #[arg(long, env = "PKGFILE_CACHE_DIR", value_name = "PATH", global = true)]
    cache_dir: Option<PathBuf>,

    /// How long a cached registry index stays fresh, in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    index_expiry_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Download a file and print its local path
    Get {
        /// File address, e.g. `@scope/name@^1.0.0/dist/index.js`
        address: String,
    },

    /// Resolve the exact version an address points at, without downloading
    Resolve {
        /// File address, e.g. `name@latest/package.json`
        address: String,
    },

    /// Inspect or clear the local cache
    Cache {
        #[command(subcommand)]
        cache_cmd: CacheCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
enum CacheCommands {
    /// List extracted package versions
    List,

    /// Remove cached data for one package, or everything
    Clean {
        /// Package name (omit to clear the whole cache)
        name: Option<String>,
    },
}

impl Cli {
    fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }

    /// Client config. A missing scope is rejected when the client is built.
    fn client_config(&self) -> Config {
        let scope = self.scope.clone().unwrap_or_default();
        let token = self.token.clone().unwrap_or_default();

        Config::new(scope, token)
            .with_registry(self.registry.clone())
            .with_cache_dir(self.cache_dir())
            .with_index_expiry(
                self.index_expiry_ms
                    .map_or(DEFAULT_INDEX_EXPIRY, Duration::from_millis),
            )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(cli.verbose, cli.json);

    match &cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Get { address }) => {
            let span = tracing::info_span!("get", cmd = "get", address = %address);
            let _guard = span.enter();
            commands::get::run(cli.client_config(), address, cli.json)
        }
        Some(Commands::Resolve { address }) => {
            commands::resolve::run(cli.client_config(), address, cli.json)
        }
        Some(Commands::Cache { cache_cmd }) => match cache_cmd {
            CacheCommands::List => commands::cache::list(&cli.cache_dir(), cli.json),
            CacheCommands::Clean { name } => {
                commands::cache::clean(&cli.cache_dir(), name.as_deref(), cli.json)
            }
        },
    }
}
