use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use gateway::{
    app::{create_app, Api, StudyConfig},
    storage::{FileStorage, PgStorage, Storage},
};
use poem::{listener::TcpListener, Server};
use queue::PgQueue;

#[derive(ValueEnum, Clone, Debug)]
enum StorageBackend {
    /// Document rows in the broker database.
    Pg,
    /// Local JSON file.
    File,
}

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind: String,
    /// Broker database connection string.
    #[arg(
        long,
        env = "BROKER_URL",
        default_value = "host=localhost user=study password=study"
    )]
    broker_url: String,
    /// Where participant records are stored.
    #[arg(long, env = "STORAGE_BACKEND", value_enum, default_value = "pg")]
    storage: StorageBackend,
    /// Record file path for the `file` backend.
    #[arg(long, env = "STORAGE_FILE", default_value = "participants.json")]
    storage_file: PathBuf,
    /// Frontend origin allowed by CORS; unset allows any.
    #[arg(long, env = "FRONTEND_URL")]
    frontend_url: Option<String>,
    /// Completion code handed back after a successful save.
    #[arg(long, env = "COMPLETION_CODE")]
    completion_code: Option<String>,
    /// Completion URL handed back after a successful save.
    #[arg(long, env = "COMPLETION_URL")]
    completion_url: Option<String>,
    /// Accepted answers, in task order.
    #[arg(long, env = "RIGHT_CHOICES", value_delimiter = ',')]
    right_choices: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match args.storage {
        StorageBackend::Pg => {
            let storage = PgStorage::connect(&args.broker_url).await?;
            serve(args, storage).await
        }
        StorageBackend::File => {
            let storage = FileStorage::open(&args.storage_file)?;
            serve(args, storage).await
        }
    }
}

async fn serve<S: Storage + Send + Sync + 'static>(args: Args, storage: S) -> anyhow::Result<()> {
    let queue = PgQueue::connect(&args.broker_url).await?;
    let api = Api::new(
        queue,
        storage,
        StudyConfig {
            completion_code: args.completion_code,
            completion_url: args.completion_url,
            right_choices: args.right_choices,
        },
    );
    let app = create_app(api, args.frontend_url);

    tracing::info!("listening on {}", args.bind);
    Server::new(TcpListener::bind(args.bind)).run(app).await?;
    Ok(())
}
