use crate::{event::DecodeError, sink::error::SinkError, source::error::SourceError};

/// Closed classification of every fault the loop handles locally. Faults
/// that can only happen at setup time (connecting, schema bootstrap) are
/// not represented here; those propagate out of `main`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineFault {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}
