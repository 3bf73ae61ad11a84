mod commands;

use clap::{CommandFactory, Parser};
use clap_complete::{Shell, generate};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "athenaeum")]
#[command(version, about = "Host a directory of static sites with generated previews", long_about = None)]
struct Cli {
    /// Enable debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Serve the site index and every site under the content root
    Serve {
        /// Installation root containing athenaeum.toml
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Reconcile the registry with the content root once
    Scan {
        /// Installation root containing athenaeum.toml
        #[arg(default_value = ".")]
        root: PathBuf,
    },

    /// Show the persisted registry
    List {
        /// Installation root containing athenaeum.toml
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Print the registry as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Serve { root, host, port } => commands::serve::run(root, host, port).await,
        Command::Scan { root } => commands::scan::run(root).await,
        Command::List { root, json } => commands::list::run(root, json).await,
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "athenaeum", &mut io::stdout());
            Ok(())
        }
    }
}
