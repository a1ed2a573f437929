use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use clfview::model::KeywordModel;
use clfview::Server;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Label {
    /// One subdirectory per category, one file per document
    Folder,
    /// One file per category, one line per document
    File,
}

/// Serve a classifier's live test UI
#[derive(Parser, Debug)]
#[command(name = "clfview", version)]
struct Cli {
    /// Keyword model (JSON)
    model: PathBuf,

    /// Test set directory
    #[arg(short = 'P', long)]
    path: Option<PathBuf>,

    /// Where to read category labels from
    #[arg(short, long, value_enum, default_value = "folder")]
    label: Label,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long, env = "CLFVIEW_PORT", default_value_t = 0)]
    port: u16,

    /// Directory holding the browser UI
    #[arg(short, long, env = "CLFVIEW_RESOURCES", default_value = "resources")]
    resources: PathBuf,

    /// Open the UI in the system browser
    #[arg(long)]
    browser: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let model = KeywordModel::load(&cli.model)
        .with_context(|| format!("No such model: '{}'", cli.model.display()))?;

    let mut server = Server::new(&cli.resources).context("Failed to create the server")?;
    server.set_model(Box::new(model));

    if let Some(path) = &cli.path {
        let found = server.set_testset_from_files(path, matches!(cli.label, Label::Folder))?;
        if !found {
            warn!("no categories found in {}", path.display());
        }
    }

    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || {
        if let Err(e) = shutdown.shutdown() {
            eprintln!("Failed to stop the server: {}", e);
        }
    })
    .context("Failed to set Ctrl+C handler")?;

    server.serve(None, cli.port, cli.browser)?;
    Ok(())
}
