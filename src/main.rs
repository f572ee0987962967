use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use tokio_stream::StreamExt;
use tonic::transport::Channel;
use tracing_subscriber::EnvFilter;

use tierline::config::{NodeConfig, QueueConfig};
use tierline::node::Node;
use tierline::proto::schedule_service_client::ScheduleServiceClient;
use tierline::proto::{
    GetScheduledJobsRequest, GetScheduledJobsResponse, ListJobsRequest, ScheduledJob,
    SubmitJobRequest,
};
use tierline::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "tierline")]
#[command(version)]
#[command(about = "A dependency-aware priority scheduler")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start a scheduler server
    Server(ServerArgs),

    /// Job submission and inspection
    Job {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: JobCommands,
    },

    /// Show the published schedule
    Schedule {
        #[command(flatten)]
        client: ClientArgs,

        /// Only show entries of this category
        #[arg(long, short = 'c')]
        category: Option<String>,

        /// Use the streaming API
        #[arg(short, long)]
        stream: bool,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Port to listen on for gRPC
    #[arg(long, default_value = "50051")]
    port: u16,

    /// Port for the HTTP API (optional)
    #[arg(long)]
    http_port: Option<u16>,

    /// Job categories, one queue and consumer each (comma-separated)
    #[arg(long, default_value = "mail,sms")]
    categories: String,

    /// Deliveries attempted before a failing submission is dropped
    #[arg(long, default_value = "5")]
    max_deliveries: u32,

    /// Messages each category queue holds before refusing submissions
    #[arg(long, default_value = "10000")]
    queue_capacity: usize,

    /// Maximum number of persisted jobs
    #[arg(long, default_value = "100000")]
    max_jobs: usize,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Server address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:50051")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// Submit a job to a category queue
    Submit {
        /// Category (e.g. "mail" or "sms")
        #[arg(long, short = 'c')]
        category: String,

        /// Job name
        #[arg(long, short = 'n')]
        name: String,

        /// High, Medium, Low or 1-3
        #[arg(long, short = 'p')]
        priority: String,

        /// Id of the job this one depends on
        #[arg(long, short = 'd')]
        dependency: Option<u64>,
    },
    /// List persisted jobs in base order
    List {
        /// Number of jobs per page (default: 100, max: 1000)
        #[arg(long, default_value = "100")]
        page_size: u32,

        /// Fetch all pages automatically
        #[arg(long)]
        all: bool,
    },
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct JobSubmitOutput {
    accepted: bool,
    category: String,
    time_stamp: i64,
}

#[derive(Serialize)]
struct JobListItem {
    id: u64,
    name: String,
    priority: u32,
    dependency: Option<u64>,
    category: String,
    submitted_at_ms: i64,
}

#[derive(Serialize)]
struct JobListOutput {
    jobs: Vec<JobListItem>,
    total_count: u32,
    has_more: bool,
}

#[derive(Serialize)]
struct ScheduleOutput {
    version: u64,
    jobs: Vec<ScheduleItem>,
}

#[derive(Serialize)]
struct ScheduleItem {
    name: String,
    #[serde(rename = "type")]
    category: String,
}

impl From<ScheduledJob> for ScheduleItem {
    fn from(job: ScheduledJob) -> Self {
        Self {
            name: job.name,
            category: job.category,
        }
    }
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let mut config = NodeConfig::new(listen_addr).with_categories(args.categories.split(','));
    if let Some(port) = args.http_port {
        config = config.with_http_addr(format!("0.0.0.0:{}", port).parse()?);
    }
    config.queue = QueueConfig {
        max_deliveries: args.max_deliveries,
        capacity: args.queue_capacity,
    };
    config.max_jobs = args.max_jobs;

    if config.categories.is_empty() {
        return Err("at least one category is required (--categories)".into());
    }

    tracing::info!(
        listen_addr = %config.listen_addr,
        http_addr = ?config.http_addr,
        categories = ?config.categories.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
        max_deliveries = config.queue.max_deliveries,
        "Starting tierline scheduler"
    );

    let shutdown = install_shutdown_handler()?;
    Node::new(config).run(shutdown).await?;

    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_job_submit(
    client: &mut ScheduleServiceClient<Channel>,
    request: SubmitJobRequest,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match client.submit_job(request).await {
        Ok(response) => {
            let resp = response.into_inner();
            match output_format {
                OutputFormat::Json => {
                    let output = JobSubmitOutput {
                        accepted: resp.accepted,
                        category: resp.category,
                        time_stamp: resp.time_stamp,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Table => {
                    println!("Job queued on {}", resp.category);
                    println!("Time stamp: {}", resp.time_stamp);
                }
            }
        }
        Err(status) => {
            eprintln!("Error: Job submission failed: {}", status.message());
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn handle_job_list(
    client: &mut ScheduleServiceClient<Channel>,
    page_size: u32,
    all: bool,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut jobs: Vec<JobListItem> = Vec::new();
    let mut page_token = String::new();
    let (total_count, has_more) = loop {
        let response = client
            .list_jobs(ListJobsRequest {
                page_size,
                page_token: page_token.clone(),
            })
            .await?
            .into_inner();

        jobs.extend(response.jobs.into_iter().map(|job| JobListItem {
            id: job.id,
            name: job.name,
            priority: job.priority,
            dependency: job.dependency,
            category: job.category,
            submitted_at_ms: job.submitted_at_ms,
        }));

        if response.next_page_token.is_empty() || !all {
            break (response.total_count, !response.next_page_token.is_empty());
        }
        page_token = response.next_page_token;
    };

    match output_format {
        OutputFormat::Json => {
            let output = JobListOutput {
                jobs,
                total_count,
                has_more,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            if jobs.is_empty() {
                println!("No jobs found.");
                return Ok(());
            }
            println!(
                "{:<8} {:<10} {:<6} {:<8} NAME",
                "ID", "CATEGORY", "PRIO", "DEPENDS"
            );
            println!("{}", "-".repeat(60));
            for job in &jobs {
                let dependency = job
                    .dependency
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<8} {:<10} {:<6} {:<8} {}",
                    job.id, job.category, job.priority, dependency, job.name
                );
            }
            println!();
            println!("Showing {} of {} jobs", jobs.len(), total_count);
            if has_more {
                println!("(Use --all to fetch all pages)");
            }
        }
    }
    Ok(())
}

async fn handle_schedule(
    client: &mut ScheduleServiceClient<Channel>,
    category: Option<String>,
    stream: bool,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = GetScheduledJobsRequest {
        category: category.unwrap_or_default(),
    };

    if !stream {
        let response = client.get_scheduled_jobs(request).await?.into_inner();
        return print_schedule(response, output_format);
    }

    // Runs until the server closes the stream or the user interrupts.
    let mut updates = client.stream_schedule(request).await?.into_inner();
    while let Some(result) = updates.next().await {
        match result {
            Ok(response) => print_schedule(response, output_format)?,
            Err(e) => {
                eprintln!("Stream error: {}", e);
                break;
            }
        }
    }
    Ok(())
}

fn print_schedule(
    response: GetScheduledJobsResponse,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let entries: Vec<ScheduleItem> = response.jobs.into_iter().map(Into::into).collect();

    match output_format {
        OutputFormat::Json => {
            let output = ScheduleOutput {
                version: response.version,
                jobs: entries,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Schedule version {}", response.version);
            if entries.is_empty() {
                println!("Schedule is empty.");
                return Ok(());
            }
            println!("{:<6} {:<10} NAME", "POS", "CATEGORY");
            println!("{}", "-".repeat(40));
            for (pos, entry) in entries.iter().enumerate() {
                println!("{:<6} {:<10} {}", pos + 1, entry.category, entry.name);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Job { client, command } => {
            let mut grpc_client = ScheduleServiceClient::connect(client.addr.clone()).await?;

            match command {
                JobCommands::Submit {
                    category,
                    name,
                    priority,
                    dependency,
                } => {
                    let request = SubmitJobRequest {
                        category,
                        name,
                        priority,
                        dependency: dependency.map(|d| d.to_string()).unwrap_or_default(),
                    };
                    handle_job_submit(&mut grpc_client, request, &client.output).await?;
                }
                JobCommands::List { page_size, all } => {
                    handle_job_list(&mut grpc_client, page_size, all, &client.output).await?;
                }
            }
        }
        Commands::Schedule {
            client,
            category,
            stream,
        } => {
            let mut grpc_client = ScheduleServiceClient::connect(client.addr.clone()).await?;
            handle_schedule(&mut grpc_client, category, stream, &client.output).await?;
        }
    }

    Ok(())
}
