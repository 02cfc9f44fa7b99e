use scoresink::{
    config::builder::ScoresinkConfigBuilder,
    init::{init_json_tracing, init_tracing, level_from_env},
    pipeline::PipelineDriver,
    sink::PostgresSink,
    source::KafkaEventSource,
};
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => init_json_tracing(level_from_env()),
        _ => init_tracing(level_from_env()),
    }

    let config = ScoresinkConfigBuilder::from_env().build()?;

    // Setup faults are fatal: an external supervisor restarts the process.
    let sink = PostgresSink::connect(config.sink()).await?;
    sink.bootstrap().await?;

    let source = KafkaEventSource::from_config(config.source())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        wait_for_stop_signal().await;

        info!("stop signal received, finishing the current cycle");

        let _ = shutdown_tx.send(true);
    });

    let driver = PipelineDriver::new(source, sink, config.pipeline(), shutdown_rx);

    driver.run().await;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_stop_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_stop_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
