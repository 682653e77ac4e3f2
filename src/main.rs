use eyre::WrapErr;
use is24_source::{
    MemorySink, NodeSink, Pipeline, PipelineConfig, is24::Is24Client, redis_sink::RedisSink,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_REDIS_PREFIX: &str = "is24";

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target: "is24.cli", "sync failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> eyre::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = PipelineConfig::from_env().wrap_err("loading configuration")?;
    let client = Is24Client::new(config.credentials.clone(), &config.http)
        .wrap_err("building vendor client")?;
    let pipeline = Pipeline::new(config, Arc::new(client))?;

    let sink = open_sink()?;
    let report = pipeline.run(sink.as_ref()).await?;
    info!(
        target: "is24.cli",
        run_id = %report.run_id,
        published = report.published.len(),
        deleted = report.deleted.len(),
        "sync complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn open_sink() -> eyre::Result<Box<dyn NodeSink>> {
    match std::env::var("REDIS_URL").ok().filter(|u| !u.trim().is_empty()) {
        Some(url) => {
            let prefix = std::env::var("IS24_REDIS_PREFIX")
                .unwrap_or_else(|_| DEFAULT_REDIS_PREFIX.to_string());
            let sink = RedisSink::open(&url, prefix).wrap_err("opening redis sink")?;
            Ok(Box::new(sink))
        }
        None => {
            warn!(
                target: "is24.cli",
                "REDIS_URL not set; publishing into a process-local sink"
            );
            Ok(Box::new(MemorySink::default()))
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
