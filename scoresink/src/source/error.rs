use rdkafka::error::KafkaError;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to create consumer: {0}")]
    CreateConsumerError(#[source] KafkaError),
    #[error("failed to subscribe to topic '{topic}': {err}")]
    SubscribeError { topic: String, err: KafkaError },
    #[error("failed to poll consumer: {0}")]
    PollError(#[source] KafkaError),
    #[error("failed to commit offsets: {0}")]
    CommitError(#[source] KafkaError),
}
