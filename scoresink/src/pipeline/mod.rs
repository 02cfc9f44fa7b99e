/*
 * Copyright 2024 Thaddeus Treloar
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 */

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    batch::{flush_decision, BatchAccumulator, FlushReason},
    config::PipelineConfig,
    event,
    sink::EventSink,
    source::{EventSource, SourceRecord},
};

use self::error::PipelineFault;

pub mod error;

/// Counters for everything the loop has seen. Surfaced in the shutdown log
/// line and asserted on by the driver tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub polled: u64,
    pub stored: u64,
    pub flushes: u64,
    pub decode_failures: u64,
    pub source_faults: u64,
    pub sink_faults: u64,
}

/// The sequential control loop: poll, decode, accumulate, trigger-check,
/// flush, acknowledge.
///
/// The acknowledged cursor never advances ahead of a successful sink
/// commit; that ordering is enforced purely by this loop being sequential.
/// A stop signal is observed at the top of each iteration, and in-flight
/// commit/acknowledge calls always run to completion first.
pub struct PipelineDriver<S, K> {
    source: S,
    sink: K,
    accumulator: BatchAccumulator,
    max_batch_size: usize,
    poll_timeout: Duration,
    flush_on_shutdown: bool,
    shutdown: watch::Receiver<bool>,
    stats: IngestStats,
}

impl<S, K> PipelineDriver<S, K>
where
    S: EventSource,
    K: EventSink,
{
    pub fn new(source: S, sink: K, config: &PipelineConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            source,
            sink,
            accumulator: BatchAccumulator::new(),
            max_batch_size: config.max_batch_size(),
            poll_timeout: config.poll_timeout(),
            flush_on_shutdown: config.flush_on_shutdown(),
            shutdown,
            stats: IngestStats::default(),
        }
    }

    pub async fn run(mut self) -> IngestStats {
        info!(
            max_batch_size = self.max_batch_size,
            poll_timeout_ms = self.poll_timeout.as_millis() as u64,
            "pipeline started"
        );

        while !*self.shutdown.borrow() {
            self.cycle().await;
        }

        if !self.accumulator.is_empty() {
            if self.flush_on_shutdown {
                let flushed = self.flush(FlushReason::Idle).await;

                if let Err(fault) = flushed {
                    self.record_fault(fault);
                }
            } else {
                // Never acknowledged, so the source redelivers them on
                // restart.
                warn!(
                    buffered = self.accumulator.len(),
                    "discarding unflushed records, they will be redelivered from the last acknowledged position"
                );
            }
        }

        info!(
            polled = self.stats.polled,
            stored = self.stats.stored,
            flushes = self.stats.flushes,
            decode_failures = self.stats.decode_failures,
            source_faults = self.stats.source_faults,
            sink_faults = self.stats.sink_faults,
            "pipeline stopped"
        );

        self.stats
    }

    async fn cycle(&mut self) {
        let polled = self.source.poll(self.poll_timeout).await;

        let idle_poll = match polled {
            Ok(Some(record)) => {
                self.stats.polled += 1;
                self.accumulate(record);

                false
            }
            Ok(None) => true,
            Err(fault) => {
                // Nothing was acknowledged, so nothing is lost; keep polling.
                self.record_fault(fault.into());

                return;
            }
        };

        if let Some(reason) = flush_decision(self.accumulator.len(), self.max_batch_size, idle_poll)
        {
            let flushed = self.flush(reason).await;

            if let Err(fault) = flushed {
                self.record_fault(fault);
            }
        }
    }

    fn accumulate(&mut self, record: SourceRecord) {
        match event::decode(record.payload.as_deref()) {
            Ok(event) => self.accumulator.append(event, &record.position),
            Err(fault) => self.record_fault(fault.into()),
        }
    }

    /// Commit then acknowledge, in that order. Any failure restores the
    /// batch so the identical contents are retried on the next cycle.
    async fn flush(&mut self, reason: FlushReason) -> Result<(), PipelineFault> {
        let batch = self.accumulator.drain();
        let rows = batch.len();

        let committed = self.sink.commit(&batch).await;

        if let Err(fault) = committed {
            self.accumulator.restore(batch);

            return Err(fault.into());
        }

        let acknowledged = self.source.acknowledge(batch.positions()).await;

        if let Err(fault) = acknowledged {
            // The rows are committed but the cursor did not move; retrying
            // re-inserts them, which downstream readers must tolerate.
            self.accumulator.restore(batch);

            return Err(fault.into());
        }

        self.stats.flushes += 1;
        self.stats.stored += rows as u64;

        info!(rows, reason = ?reason, "flushed batch");

        Ok(())
    }

    fn record_fault(&mut self, fault: PipelineFault) {
        match &fault {
            PipelineFault::Source(fault) => {
                self.stats.source_faults += 1;

                error!("source fault: {}", fault);
            }
            PipelineFault::Decode(fault) => {
                self.stats.decode_failures += 1;

                warn!("dropping undecodable record: {}", fault);
            }
            PipelineFault::Sink(fault) => {
                self.stats.sink_faults += 1;

                error!("sink fault, batch retained for retry: {}", fault);
            }
        }
    }
}
