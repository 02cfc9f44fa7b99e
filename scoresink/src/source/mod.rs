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

use std::{sync::Arc, time::Duration};

use rdkafka::{
    consumer::{BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance},
    message::{Message, OwnedMessage},
    ClientContext, Offset, TopicPartitionList,
};
use tokio::task::spawn_blocking;
use tracing::{debug, error, info};

use crate::{batch::BatchPositions, config::SourceConfig};

use self::error::SourceError;

pub mod error;

/// Position of a record within the source log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePosition {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// One raw record as pulled from the source, before decoding.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub payload: Option<Vec<u8>>,
    pub position: SourcePosition,
}

impl From<OwnedMessage> for SourceRecord {
    fn from(message: OwnedMessage) -> Self {
        SourceRecord {
            payload: message.payload().map(<[u8]>::to_vec),
            position: SourcePosition {
                topic: message.topic().to_owned(),
                partition: message.partition(),
                offset: message.offset(),
            },
        }
    }
}

/// The upstream log the pipeline reads from.
///
/// `poll` must not block longer than `timeout` and advances no cursor.
/// `acknowledge` returns only once the source has durably recorded the new
/// cursor; on error the cursor is unchanged and the caller must assume no
/// advancement occurred.
pub trait EventSource {
    async fn poll(&self, timeout: Duration) -> Result<Option<SourceRecord>, SourceError>;

    async fn acknowledge(&self, positions: &BatchPositions) -> Result<(), SourceError>;
}

#[derive(Clone, Default)]
pub struct ScoresinkConsumerContext;

impl ClientContext for ScoresinkConsumerContext {}

impl ConsumerContext for ScoresinkConsumerContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        debug!("consumer pre rebalance: {:?}", rebalance);
    }

    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        debug!("consumer post rebalance: {:?}", rebalance);
    }

    fn commit_callback(
        &self,
        result: rdkafka::error::KafkaResult<()>,
        offsets: &TopicPartitionList,
    ) {
        match result {
            Ok(()) => debug!("committed offsets: {:?}", offsets),
            Err(e) => error!("failed to commit offsets: {}", e),
        }
    }
}

pub(crate) type ScoresinkConsumer = BaseConsumer<ScoresinkConsumerContext>;

/// Kafka-backed [`EventSource`]. Auto-commit is disabled by the config
/// layer; the group cursor moves only through [`EventSource::acknowledge`].
pub struct KafkaEventSource {
    consumer: Arc<ScoresinkConsumer>,
}

impl KafkaEventSource {
    pub fn from_config(config: &SourceConfig) -> Result<Self, SourceError> {
        let context = ScoresinkConsumerContext;

        let consumer: ScoresinkConsumer = config
            .client_config()
            .create_with_context(context)
            .map_err(SourceError::CreateConsumerError)?;

        consumer
            .subscribe(&[config.topic()])
            .map_err(|err| SourceError::SubscribeError {
                topic: config.topic().to_owned(),
                err,
            })?;

        info!("subscribed to topic: {}", config.topic());

        Ok(Self {
            consumer: Arc::new(consumer),
        })
    }
}

impl EventSource for KafkaEventSource {
    async fn poll(&self, timeout: Duration) -> Result<Option<SourceRecord>, SourceError> {
        let consumer = self.consumer.clone();

        let polled = spawn_blocking(move || {
            consumer
                .poll(timeout)
                .map(|result| result.map(|message| message.detach()))
        })
        .await
        .expect("Failed to spawn blocking");

        match polled {
            None => Ok(None),
            Some(Err(e)) => Err(SourceError::PollError(e)),
            Some(Ok(message)) => Ok(Some(SourceRecord::from(message))),
        }
    }

    async fn acknowledge(&self, positions: &BatchPositions) -> Result<(), SourceError> {
        let mut to_commit = TopicPartitionList::with_capacity(positions.len());

        for ((topic, partition), offset) in positions {
            // The committed offset names the next record to read.
            to_commit
                .add_partition_offset(topic, *partition, Offset::Offset(offset + 1))
                .map_err(SourceError::CommitError)?;
        }

        let consumer = self.consumer.clone();

        spawn_blocking(move || consumer.commit(&to_commit, CommitMode::Sync))
            .await
            .expect("Failed to spawn blocking")
            .map_err(SourceError::CommitError)
    }
}
