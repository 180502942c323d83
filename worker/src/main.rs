use std::time::Duration;

use clap::Parser;
use queue::PgQueue;
use tokio::sync::watch;
use worker::{claim_lease, CompletionClient, Runner};

#[derive(Parser, Debug)]
struct Args {
    /// Broker database connection string.
    #[arg(
        long,
        env = "BROKER_URL",
        default_value = "host=localhost user=study password=study"
    )]
    broker_url: String,
    /// Channels to listen on, in priority order.
    #[arg(
        long,
        env = "CHANNELS",
        value_delimiter = ',',
        default_value = "high,default,low"
    )]
    channels: Vec<String>,
    /// Chat completions endpoint.
    #[arg(
        long,
        env = "COMPLETION_ENDPOINT",
        default_value = "https://api.openai.com/v1/chat/completions"
    )]
    completion_endpoint: String,
    /// API key for the completion service.
    #[arg(long, env = "COMPLETION_API_KEY", hide_env_values = true)]
    completion_api_key: String,
    /// Model requested from the completion service.
    #[arg(long, env = "COMPLETION_MODEL", default_value = "gpt-4o-mini")]
    completion_model: String,
    /// Seconds one completion call may take before the job is failed.
    #[arg(long, env = "JOB_TIME_LIMIT", default_value_t = 90)]
    time_limit: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let time_limit = Duration::from_secs(args.time_limit);
    let queue = PgQueue::connect(&args.broker_url)
        .await?
        .with_lease(claim_lease(time_limit));
    let completion = CompletionClient::new(
        args.completion_endpoint,
        args.completion_api_key,
        args.completion_model,
    );
    let runner = Runner::new(queue, completion, args.channels, time_limit);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    runner.run(shutdown_rx).await?;
    Ok(())
}
