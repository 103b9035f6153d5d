use loadline_observability::{Counter, Histogram};

#[derive(Clone)]
pub struct IngestionMetrics {
    pub received_rows: Counter<u64>,
    pub written_rows: Counter<u64>,
    pub failed_rows: Counter<u64>,
    pub failed_batches: Counter<u64>,
    pub rejected_payloads: Counter<u64>,
    pub payload_duration: Histogram<f64>,
}

impl Default for IngestionMetrics {
    fn default() -> Self {
        let meter = loadline_observability::meter("ingestion");
        Self {
            received_rows: meter
                .u64_counter("server.write.received_rows")
                .with_unit("{row}")
                .with_description("number of rows received by the write endpoint")
                .build(),
            written_rows: meter
                .u64_counter("server.write.rows")
                .with_unit("{row}")
                .with_description("number of rows flushed to the storage engine")
                .build(),
            failed_rows: meter
                .u64_counter("server.write.failed_rows")
                .with_unit("{row}")
                .with_description("number of rows dropped because their batch failed")
                .build(),
            failed_batches: meter
                .u64_counter("server.write.failed_batches")
                .with_unit("{batch}")
                .with_description("number of batches dropped")
                .build(),
            rejected_payloads: meter
                .u64_counter("server.write.rejected_payloads")
                .with_unit("{payload}")
                .with_description("number of payloads rejected because of low memory")
                .build(),
            payload_duration: meter
                .f64_histogram("server.write.duration")
                .with_unit("s")
                .with_description("time to write a whole payload")
                .build(),
        }
    }
}
