//! Resident memory of the processes taking part in a run.
use serde::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Resident set size of each process, in MiB.
///
/// `None` when the process is not watched or no longer running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    pub server: Option<u64>,
    #[serde(rename = "influxDB")]
    pub influx_db: Option<u64>,
    pub generator: Option<u64>,
}

/// Samples the memory of the generator, the server and InfluxDB.
pub struct MemorySampler {
    system: System,
    generator: Option<Pid>,
    server: Option<Pid>,
    influx_db: Option<Pid>,
}

impl MemorySampler {
    pub fn new(server: Option<u32>, influx_db: Option<u32>) -> Self {
        let generator = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(err) => {
                debug!(error = err, "Cannot resolve the generator pid");
                None
            }
        };

        Self {
            system: System::new(),
            generator,
            server: server.map(Pid::from_u32),
            influx_db: influx_db.map(Pid::from_u32),
        }
    }

    pub fn sample(&mut self) -> MemoryUsage {
        let pids = [self.generator, self.server, self.influx_db]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&pids),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );

        MemoryUsage {
            server: self.resident_mb(self.server),
            influx_db: self.resident_mb(self.influx_db),
            generator: self.resident_mb(self.generator),
        }
    }

    fn resident_mb(&self, pid: Option<Pid>) -> Option<u64> {
        let process = self.system.process(pid?)?;
        Some((process.memory() as f64 / BYTES_PER_MB).round() as u64)
    }
}

impl std::fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |value: Option<u64>| value.map_or_else(|| "-".to_string(), |v| v.to_string());

        write!(
            f,
            "server {} MB, influxDB {} MB, generator {} MB",
            show(self.server),
            show(self.influx_db),
            show(self.generator),
        )
    }
}
