use clap::{Parser, Subcommand};
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ObservabilitySnafu, Result},
    serve::ServeArgs,
    status::StatusArgs,
};

mod error;
mod serve;
mod status;

#[derive(Parser)]
#[command(name = "loadline")]
#[command(about = "Loadline ingestion server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the ingestion server
    Serve {
        #[clap(flatten)]
        inner: ServeArgs,
    },
    /// Query the status of a running server
    Status {
        #[clap(flatten)]
        inner: StatusArgs,
    },
}

#[tokio::main]
#[snafu::report]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    loadline_observability::init_observability(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        .context(ObservabilitySnafu {})?;

    let ct = CancellationToken::new();

    tokio::spawn({
        let ct = ct.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            ct.cancel();
        }
    });

    match cli.command {
        Commands::Serve { inner } => inner.run(ct).await,
        Commands::Status { inner } => inner.run(ct).await,
    }
}
