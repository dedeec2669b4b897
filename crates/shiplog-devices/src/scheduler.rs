//! Poll scheduler.
//!
//! One cycle walks the catalog: sources in listing order, equipment in
//! listing order within a source, and the variables of one equipment unit
//! read concurrently. Every variable is an isolated unit of work (read,
//! decode, append); its failure is logged and counted, never propagated.
//! Catalog failures are isolated per source.
//!
//! Between cycles the scheduler sleeps for the reading interval, or until
//! the cancellation token fires.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use shiplog_core::catalog::{CatalogResult, DynCatalog};
use shiplog_core::config::AppConfig;
use shiplog_core::decode::decode_f32;
use shiplog_core::model::{Equipment, Source, Variable};
use shiplog_storage::CsvSink;

use crate::client::ModbusTcpClient;
use crate::error::DeviceResult;
use crate::reader::DeviceReader;

/// Wall-clock source for reading timestamps.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Counters for one cycle.
///
/// `sources_failed` counts sources whose catalog listing failed; device
/// failures are counted per variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sources_polled: usize,
    pub sources_failed: usize,
    pub variables_read: usize,
    pub variables_failed: usize,
    pub values_written: usize,
    pub decode_errors: usize,
    /// The source list itself could not be fetched.
    pub catalog_failed: bool,
    pub elapsed: Duration,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.catalog_failed {
            return write!(f, "catalog unavailable after {:?}", self.elapsed);
        }
        write!(
            f,
            "{} sources polled ({} failed), {} variables read ({} failed), \
             {} values written, {} decode errors in {:?}",
            self.sources_polled,
            self.sources_failed,
            self.variables_read,
            self.variables_failed,
            self.values_written,
            self.decode_errors,
            self.elapsed
        )
    }
}

/// Result of one variable's unit of work.
#[derive(Debug, Default)]
struct VariableOutcome {
    values_written: usize,
    decode_errors: usize,
    failed: bool,
}

/// Drives the cycle loop.
pub struct PollScheduler {
    catalog: DynCatalog,
    reader: DeviceReader,
    sink: CsvSink,
    interval: Duration,
    clock: Clock,
}

impl PollScheduler {
    pub fn new(catalog: DynCatalog, reader: DeviceReader, sink: CsvSink, interval: Duration) -> Self {
        Self {
            catalog,
            reader,
            sink,
            interval,
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    /// Wire a Modbus TCP reader and a CSV sink from configuration.
    pub fn from_config(config: &AppConfig, catalog: DynCatalog) -> Self {
        let client = Arc::new(ModbusTcpClient::new(config.protocol.timeout));
        let reader = DeviceReader::new(client, config.protocol.unit_id);
        let sink = CsvSink::new(&config.storage.output_dir, config.identity());
        Self::new(catalog, reader, sink, config.ship.reading_interval)
    }

    /// Replace the timestamp source.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run cycles until `token` is cancelled. Returns the number of cycles run.
    ///
    /// In-flight reads finish; no new cycle starts once cancellation is seen.
    pub async fn run(&self, token: CancellationToken) -> u64 {
        info!(
            catalog = self.catalog.kind(),
            interval = ?self.interval,
            output = %self.sink.root().display(),
            "poll scheduler started"
        );

        let mut cycles = 0u64;
        loop {
            if token.is_cancelled() {
                break;
            }

            cycles += 1;
            self.run_cycle()
                .instrument(info_span!("cycle", n = cycles))
                .await;

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(cycles, "poll scheduler stopped");
        cycles
    }

    /// One full pass over the catalog.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        let sources = match self.catalog.list_sources().await {
            Ok(sources) => sources,
            Err(e) => {
                error!(catalog = self.catalog.kind(), error = %e, "failed to list sources");
                report.catalog_failed = true;
                report.elapsed = started.elapsed();
                return report;
            }
        };

        for source in &sources {
            match self.poll_source(source, &mut report).await {
                Ok(()) => report.sources_polled += 1,
                Err(e) => {
                    report.sources_failed += 1;
                    warn!(source = %source.name, error = %e, "catalog listing failed, skipping source");
                }
            }
        }

        report.elapsed = started.elapsed();
        info!(
            sources = report.sources_polled,
            sources_failed = report.sources_failed,
            variables = report.variables_read,
            variables_failed = report.variables_failed,
            values = report.values_written,
            decode_errors = report.decode_errors,
            elapsed = ?report.elapsed,
            "cycle complete"
        );
        report
    }

    async fn poll_source(&self, source: &Source, report: &mut CycleReport) -> CatalogResult<()> {
        let equipment = self.catalog.list_equipment(source.id).await?;
        debug!(source = %source.name, equipment = equipment.len(), "polling source");

        for unit in &equipment {
            let variables = self.catalog.list_variables(unit.id).await?;

            let outcomes = join_all(
                variables
                    .iter()
                    .map(|variable| self.poll_variable(source, unit, variable)),
            )
            .await;

            for outcome in outcomes {
                if outcome.failed {
                    report.variables_failed += 1;
                } else {
                    report.variables_read += 1;
                }
                report.values_written += outcome.values_written;
                report.decode_errors += outcome.decode_errors;
            }
        }

        Ok(())
    }

    async fn poll_variable(
        &self,
        source: &Source,
        equipment: &Equipment,
        variable: &Variable,
    ) -> VariableOutcome {
        let mut outcome = VariableOutcome::default();

        if let Err(e) = self
            .read_and_store(source, equipment, variable, &mut outcome)
            .await
        {
            outcome.failed = true;
            warn!(
                source = %source.name,
                equipment = %equipment.name,
                variable = %variable.name,
                error = %e,
                "variable produced no data"
            );
        }

        outcome
    }

    async fn read_and_store(
        &self,
        source: &Source,
        equipment: &Equipment,
        variable: &Variable,
        outcome: &mut VariableOutcome,
    ) -> DeviceResult<()> {
        let words = self
            .reader
            .read_variable(source, &equipment.name, variable)
            .await?;
        let timestamp = (self.clock)();

        for value in decode_f32(&words) {
            match value {
                Ok(value) => {
                    self.sink
                        .append(&equipment.name, &variable.name, timestamp, value)
                        .await?;
                    outcome.values_written += 1;
                }
                Err(e) => {
                    outcome.decode_errors += 1;
                    warn!(
                        source = %source.name,
                        equipment = %equipment.name,
                        variable = %variable.name,
                        error = %e,
                        "decode error"
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use shiplog_core::catalog::CatalogProvider;
    use shiplog_core::config::ShipIdentity;
    use shiplog_core::error::CatalogError;

    use crate::client::{RegisterClient, RegisterRequest};

    struct DownCatalog;

    #[async_trait]
    impl CatalogProvider for DownCatalog {
        fn kind(&self) -> &'static str {
            "down"
        }

        async fn list_sources(&self) -> CatalogResult<Vec<Source>> {
            Err(CatalogError::Unavailable("database locked".to_string()))
        }

        async fn list_equipment(&self, _source_id: u32) -> CatalogResult<Vec<Equipment>> {
            unreachable!("no sources listed")
        }

        async fn list_variables(&self, _equipment_id: u32) -> CatalogResult<Vec<Variable>> {
            unreachable!("no sources listed")
        }
    }

    struct NeverCalled;

    #[async_trait]
    impl RegisterClient for NeverCalled {
        async fn read_holding_registers(
            &self,
            _address: &str,
            _port: u16,
            _request: RegisterRequest,
        ) -> DeviceResult<Vec<u16>> {
            panic!("no reads expected")
        }
    }

    #[tokio::test]
    async fn test_source_listing_failure_ends_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = PollScheduler::new(
            Arc::new(DownCatalog),
            DeviceReader::new(Arc::new(NeverCalled), 1),
            CsvSink::new(dir.path(), ShipIdentity::new("ACME", "SHIP01")),
            Duration::from_secs(1),
        );

        let report = scheduler.run_cycle().await;
        assert!(report.catalog_failed);
        assert_eq!(report.sources_polled, 0);
        assert!(report.to_string().starts_with("catalog unavailable"));
    }

    #[test]
    fn test_report_display() {
        let report = CycleReport {
            sources_polled: 2,
            sources_failed: 1,
            variables_read: 5,
            variables_failed: 1,
            values_written: 9,
            decode_errors: 1,
            catalog_failed: false,
            elapsed: Duration::from_millis(120),
        };
        assert_eq!(
            report.to_string(),
            "2 sources polled (1 failed), 5 variables read (1 failed), \
             9 values written, 1 decode errors in 120ms"
        );
    }
}
