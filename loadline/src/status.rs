use clap::Args;
use loadline_push_client::HttpWriteClient;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, WriteClientSnafu};

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// The address of the loadline server.
    #[arg(long, env = "LOADLINE_URL", default_value = "http://127.0.0.1:3000")]
    url: String,
}

impl StatusArgs {
    pub async fn run(self, ct: CancellationToken) -> Result<()> {
        let client = HttpWriteClient::new(&self.url).context(WriteClientSnafu {})?;

        tokio::select! {
            _ = ct.cancelled() => {}
            status = client.status() => {
                let status = status.context(WriteClientSnafu {})?;
                println!("{}: {:?}", client.base_url(), status);
            }
        }

        Ok(())
    }
}
