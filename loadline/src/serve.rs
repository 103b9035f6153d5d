use std::{net::SocketAddr, sync::Arc, time::Duration};

use clap::{Args, ValueEnum};
use loadline_ingestor_core::{
    Ingress, IngressOptions, MemoryGate, TelemetryLog, WorkerPool, WorkerPoolOptions,
    run_worker_pool,
};
use loadline_ingestor_http::{DEFAULT_MAX_BODY_SIZE, HttpIngestor};
use loadline_storage::{InfluxOptions, InfluxSessionFactory, MemoryStorage, SessionFactory};
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{
    IngestorSnafu, InvalidArgumentSnafu, InvalidServerAddressSnafu, IoSnafu, Result, StorageSnafu,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// InfluxDB v2 over HTTP.
    Influx,
    /// Keep points in memory.
    Memory,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// The address of the HTTP server.
    #[arg(long, env = "LOADLINE_ADDRESS", default_value = "127.0.0.1:3000")]
    address: String,
    /// Number of writer workers.
    #[arg(long, env = "CONCURRENCY_LIMIT", default_value_t = 1)]
    concurrency_limit: usize,
    /// Number of points per batch.
    #[arg(long, env = "BATCH_SIZE", default_value_t = 100)]
    batch_size: usize,
    /// Flush interval of the storage sessions, in milliseconds.
    #[arg(long, env = "FLUSH_INTERVAL_MS", default_value_t = 10_000)]
    flush_interval_ms: u64,
    /// Payloads are rejected while free memory is at or below this threshold.
    #[arg(long, env = "MEMORY_THRESHOLD_MB", default_value_t = 200)]
    memory_threshold_mb: u64,
    /// File receiving one JSON line per written payload.
    #[arg(long, env = "TELEMETRY_LOG", default_value = "testLogs.txt")]
    telemetry_log: String,
    /// Storage engine receiving the points.
    #[arg(long, env = "LOADLINE_STORAGE", value_enum, default_value_t = StorageKind::Influx)]
    storage: StorageKind,
    #[arg(long, env = "INFLUX_URL", default_value = "http://localhost:8086")]
    influx_url: String,
    #[arg(long, env = "INFLUX_TOKEN")]
    influx_token: Option<String>,
    #[arg(long, env = "INFLUX_ORG")]
    influx_org: Option<String>,
    #[arg(long, env = "INFLUX_BUCKET")]
    influx_bucket: Option<String>,
    /// Maximum size of a request body, in bytes.
    #[arg(long, env = "LOADLINE_MAX_BODY_SIZE", default_value_t = DEFAULT_MAX_BODY_SIZE)]
    max_body_size: usize,
}

impl ServeArgs {
    pub async fn run(self, ct: CancellationToken) -> Result<()> {
        let address = self
            .address
            .parse::<SocketAddr>()
            .context(InvalidServerAddressSnafu {})?;

        let pool_options = WorkerPoolOptions::new(
            self.concurrency_limit,
            self.batch_size,
            Duration::from_millis(self.flush_interval_ms),
        );

        let factory = self.session_factory()?;
        let pool = WorkerPool::new(pool_options, factory).context(IngestorSnafu {})?;
        let memory_gate = MemoryGate::system(self.memory_threshold_mb).context(IngestorSnafu {})?;

        let ingress = Ingress::new(
            IngressOptions::from(&pool_options),
            memory_gate,
            pool.client(),
            TelemetryLog::new(&self.telemetry_log),
        );

        let app = HttpIngestor::new(ingress)
            .with_max_body_size(self.max_body_size)
            .into_router();

        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .context(IoSnafu {})?;

        info!(
            %address,
            storage = ?self.storage,
            concurrency_limit = self.concurrency_limit,
            batch_size = self.batch_size,
            flush_interval_ms = self.flush_interval_ms,
            memory_threshold_mb = self.memory_threshold_mb,
            telemetry_log = %self.telemetry_log,
            "Server listening"
        );

        let server_fut = {
            let ct = ct.clone();
            async move {
                let shutdown = ct.clone();
                let result = axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        shutdown.cancelled().await;
                    })
                    .await
                    .context(IoSnafu {});

                // Stop the worker pool if the server exits on its own.
                ct.cancel();
                result
            }
        };

        let pool_fut = run_worker_pool(pool, ct.clone());

        let (server_res, pool_res) = tokio::join!(server_fut, pool_fut);

        if let Err(err) = &pool_res {
            error!(error = %err, "Worker pool exited with error");
        }

        server_res?;
        pool_res.context(IngestorSnafu {})?;

        info!("Server stopped");

        Ok(())
    }

    fn session_factory(&self) -> Result<Arc<dyn SessionFactory>> {
        match self.storage {
            StorageKind::Memory => Ok(Arc::new(MemoryStorage::with_default_tags(vec![(
                "dataSource".to_string(),
                "testGenerator".to_string(),
            )]))),
            StorageKind::Influx => {
                let Some(org) = self.influx_org.clone() else {
                    return InvalidArgumentSnafu {
                        name: "influx-org",
                        message: "required when using the influx storage",
                    }
                    .fail();
                };

                let Some(bucket) = self.influx_bucket.clone() else {
                    return InvalidArgumentSnafu {
                        name: "influx-bucket",
                        message: "required when using the influx storage",
                    }
                    .fail();
                };

                let options = InfluxOptions::new(self.influx_url.clone(), org, bucket)
                    .with_token(self.influx_token.clone());
                let factory = InfluxSessionFactory::new(options).context(StorageSnafu {})?;

                Ok(Arc::new(factory))
            }
        }
    }
}
