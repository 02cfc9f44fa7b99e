use std::time::Duration;

use rdkafka::ClientConfig;

use self::builder::{ConfigError, ScoresinkConfigBuilder};

pub mod builder;

/// Everything the process needs, resolved once at startup and handed to
/// each component by reference. No component reads ambient globals.
#[derive(Debug, Clone)]
pub struct ScoresinkConfig {
    pub(crate) source: SourceConfig,
    pub(crate) sink: SinkConfig,
    pub(crate) pipeline: PipelineConfig,
}

impl ScoresinkConfig {
    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    pub fn sink(&self) -> &SinkConfig {
        &self.sink
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }
}

impl TryFrom<ScoresinkConfigBuilder> for ScoresinkConfig {
    type Error = ConfigError;

    fn try_from(builder: ScoresinkConfigBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub(crate) client_config: ClientConfig,
    pub(crate) topic: String,
}

impl SourceConfig {
    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) user: String,
    pub(crate) password: String,
    pub(crate) database: String,
    pub(crate) table: String,
}

impl SinkConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub(crate) max_batch_size: usize,
    pub(crate) poll_timeout: Duration,
    pub(crate) flush_on_shutdown: bool,
}

impl PipelineConfig {
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    pub fn flush_on_shutdown(&self) -> bool {
        self.flush_on_shutdown
    }
}
