use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use daa_sim::config::{BackendSpec, DispatchMode, ServiceConfig, DEFAULT_JOBS_DIR};
use daa_sim::engine::WorkerPayload;
use daa_sim::job::{JobRequest, JobStorageMap, StorageDescriptor};
use daa_sim::service::DirectAccessService;

#[derive(Parser, Debug)]
#[command(name = "daa-sim")]
#[command(version)]
#[command(about = "Simulated direct-access execution service for quantum primitive jobs")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a single job from an input file and print the final record
    Run(RunArgs),

    /// List the available backends
    Backends(BackendsArgs),

    /// Internal: execute one job handed over on stdin (process dispatch)
    #[command(hide = true)]
    Worker,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the job input payload (JSON)
    input: PathBuf,

    /// Where to write the result payload
    #[arg(long, default_value = "results.json")]
    results: PathBuf,

    /// Where to write the job's execution log
    #[arg(long)]
    logs: Option<PathBuf>,

    /// Backend to run on (default: the first registered backend)
    #[arg(long)]
    backend: Option<String>,

    /// Program kind: sampler or estimator
    #[arg(long, default_value = "sampler")]
    program: String,

    /// Job id (default: a fresh UUID)
    #[arg(long)]
    job_id: Option<String>,

    /// Directory holding job status records
    #[arg(long, default_value = DEFAULT_JOBS_DIR)]
    jobs_dir: PathBuf,

    /// Execute in a spawned worker process instead of a worker thread
    #[arg(long)]
    process: bool,

    /// Job log verbosity (debug, info, warning, error, critical)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Parser, Debug)]
struct BackendsArgs {
    /// Restrict the registry to these backend constructors
    #[arg(long, value_delimiter = ',')]
    backends: Option<Vec<String>>,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run_job(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServiceConfig::new(args.jobs_dir);
    if args.process {
        config = config.with_dispatch(DispatchMode::Process {
            worker_program: None,
        });
    }
    let service = DirectAccessService::new(config)?;

    let request = JobRequest {
        id: args
            .job_id
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        backend: args.backend,
        program_id: args.program,
        storage: JobStorageMap {
            input: StorageDescriptor::file_system(args.input),
            results: StorageDescriptor::file_system(args.results),
            logs: args.logs.map(StorageDescriptor::file_system),
        },
        timeout_secs: None,
        log_level: args.log_level,
    };

    let record = service.execute_job(request).await?;
    let job_id = record.id.clone();

    let final_record = loop {
        let record = service.get_job_detail(&job_id)?;
        if record.status.is_terminal() {
            break record;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    };

    service.close().await?;
    println!("{}", serde_json::to_string_pretty(&final_record)?);
    Ok(())
}

fn list_backends(args: BackendsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServiceConfig::default();
    if let Some(names) = args.backends {
        config = config.with_backends(
            names
                .into_iter()
                .map(|constructor| BackendSpec { constructor })
                .collect(),
        );
    }
    let service = DirectAccessService::new(config)?;
    println!("{}", serde_json::to_string_pretty(&service.backends()?)?);
    Ok(())
}

fn run_worker() -> Result<(), Box<dyn std::error::Error>> {
    let mut payload = String::new();
    std::io::stdin().read_to_string(&mut payload)?;
    let payload: WorkerPayload = serde_json::from_str(&payload)?;
    payload.run()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let args = Args::parse();
    match args.command {
        Commands::Run(run_args) => run_job(run_args).await,
        Commands::Backends(backend_args) => list_backends(backend_args),
        Commands::Worker => run_worker(),
    }
}
