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

use std::collections::HashMap;

use crate::event::ScoreEvent;
use crate::source::SourcePosition;

/// Highest buffered offset per topic partition.
pub type BatchPositions = HashMap<(String, i32), i64>;

/// An ordered group of events flushed and acknowledged as one unit.
///
/// A batch is written to the sink in full before any of its positions are
/// acknowledged, and discarded only after the acknowledgment round-trip
/// succeeds.
#[derive(Debug, Default, Clone)]
pub struct Batch {
    events: Vec<ScoreEvent>,
    positions: BatchPositions,
}

impl Batch {
    pub fn events(&self) -> &[ScoreEvent] {
        &self.events
    }

    pub fn positions(&self) -> &BatchPositions {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// In-memory buffer of decoded events awaiting a flush. Holds no I/O; the
/// driver's single control thread is the only writer.
#[derive(Debug, Default)]
pub struct BatchAccumulator {
    events: Vec<ScoreEvent>,
    positions: BatchPositions,
}

impl BatchAccumulator {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn append(&mut self, event: ScoreEvent, position: &SourcePosition) {
        self.events.push(event);

        let highest = self
            .positions
            .entry((position.topic.clone(), position.partition))
            .or_insert(position.offset);

        if *highest < position.offset {
            *highest = position.offset;
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Takes the buffered contents, leaving the accumulator empty.
    pub fn drain(&mut self) -> Batch {
        Batch {
            events: std::mem::take(&mut self.events),
            positions: std::mem::take(&mut self.positions),
        }
    }

    /// Reinstates a drained batch ahead of anything appended since. Used
    /// when a flush fails so the identical batch is retried next cycle.
    pub fn restore(&mut self, batch: Batch) {
        let Batch {
            events: mut restored,
            positions,
        } = batch;

        restored.append(&mut self.events);
        self.events = restored;

        for (partition, offset) in positions {
            let highest = self.positions.entry(partition).or_insert(offset);

            if *highest < offset {
                *highest = offset;
            }
        }
    }
}

/// Why a flush fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The accumulator reached the configured batch size.
    Size,
    /// A poll came back empty while records were buffered.
    Idle,
}

/// The single flush decision, evaluated once per poll cycle. Both reasons
/// route through the same flush procedure, so the commit/acknowledge
/// ordering lives in exactly one place.
pub fn flush_decision(buffered: usize, max_batch_size: usize, idle_poll: bool) -> Option<FlushReason> {
    if buffered >= max_batch_size {
        Some(FlushReason::Size)
    } else if idle_poll && buffered > 0 {
        Some(FlushReason::Idle)
    } else {
        None
    }
}
