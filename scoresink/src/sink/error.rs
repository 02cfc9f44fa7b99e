#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to connect to postgres: {0}")]
    ConnectError(#[source] sqlx::Error),
    #[error("failed to ensure table '{table}': {err}")]
    BootstrapError { table: String, err: sqlx::Error },
    #[error("failed to commit batch of {rows} rows: {err}")]
    CommitError { rows: usize, err: sqlx::Error },
}
