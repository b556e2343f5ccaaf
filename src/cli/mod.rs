pub mod config;
pub mod jobs;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::catalog::ClearCategory;
use crate::models::job::{JobKind, JobStatus};
use crate::registry::JobFilter;
use crate::submit::SubmitPayload;

/// ejobs - submit and manage embedding jobs
#[derive(Parser, Debug)]
#[command(
    name = "ejobs",
    version,
    about = "ejobs - submit, track and manage asynchronous embedding jobs"
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Jobs API base URL (overrides config and environment)
    #[arg(long = "api-url", global = true)]
    pub api_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed an uploaded file
    EmbedFile {
        /// Id of the uploaded file
        #[arg(long = "file-id")]
        file_id: String,

        /// Embedding model id
        #[arg(short = 'm', long)]
        model: String,

        /// Target vector store id
        #[arg(long)]
        store: Option<String>,

        /// Return right after submission instead of following the job
        #[arg(long = "no-wait")]
        no_wait: bool,
    },

    /// Embed a block of text
    EmbedText {
        /// Text to embed
        #[arg(short = 't', long)]
        text: String,

        /// Embedding model id
        #[arg(short = 'm', long)]
        model: String,

        /// Target vector store id
        #[arg(long)]
        store: Option<String>,

        /// Return right after submission instead of following the job
        #[arg(long = "no-wait")]
        no_wait: bool,
    },

    /// Show the live status of a job
    Status {
        /// Execution id returned at submission
        job_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List jobs from the catalog
    List {
        /// Only jobs with this status (e.g. SUCCESS, FAILURE)
        #[arg(long)]
        status: Option<JobStatus>,

        /// Only jobs of this kind (file or text)
        #[arg(long)]
        kind: Option<JobKind>,

        /// Case-insensitive match on ids, provider and model
        #[arg(long)]
        search: Option<String>,

        /// Number of records to skip
        #[arg(long, default_value_t = 0)]
        skip: usize,

        /// Page size (defaults to the configured page size)
        #[arg(long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Cancel a running job
    Cancel {
        /// Execution id returned at submission
        job_id: String,
    },

    /// Delete one job record
    Delete {
        /// Record id (or execution id with --execution-id)
        id: String,

        /// Treat the id as an execution id and resolve its record
        #[arg(long = "execution-id")]
        execution_id: bool,

        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Delete all job records in a category
    Clear {
        /// all, success, failed or completed
        category: ClearCategory,

        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

impl Commands {
    fn payload(&self) -> Option<SubmitPayload> {
        match self {
            Commands::EmbedFile {
                file_id,
                model,
                store,
                ..
            } => Some(SubmitPayload::File {
                file_id: file_id.clone(),
                model_id: model.clone(),
                store_id: store.clone(),
            }),
            Commands::EmbedText {
                text, model, store, ..
            } => Some(SubmitPayload::Text {
                text: text.clone(),
                model_id: model.clone(),
                store_id: store.clone(),
            }),
            _ => None,
        }
    }
}

/// Format a connection error message for when the API is not reachable.
pub fn connection_error_message(api_url: &str) -> String {
    format!(
        "Could not connect to the jobs API at {}. Check --api-url or EJOBS_API_URL.",
        api_url
    )
}

/// Dispatch the CLI command to the appropriate handler.
pub async fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    let Some(command) = &cli.command else {
        // No subcommand provided -- print help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = config::resolve_config(cli.config.as_deref(), cli.api_url.as_deref())?;

    match command {
        Commands::EmbedFile { no_wait, .. } | Commands::EmbedText { no_wait, .. } => {
            let payload = command
                .payload()
                .ok_or_else(|| anyhow::anyhow!("not a submission command"))?;
            jobs::cmd_embed(config, payload, *no_wait).await
        }
        Commands::Status { job_id, json } => jobs::cmd_status(config, job_id, *json).await,
        Commands::List {
            status,
            kind,
            search,
            skip,
            limit,
            json,
        } => {
            let filter = JobFilter {
                status: *status,
                kind: *kind,
                text: search.clone(),
            };
            jobs::cmd_list(config, filter, *skip, *limit, *json).await
        }
        Commands::Cancel { job_id } => jobs::cmd_cancel(config, job_id).await,
        Commands::Delete {
            id,
            execution_id,
            yes,
        } => jobs::cmd_delete(config, id, *execution_id, *yes).await,
        Commands::Clear { category, yes } => jobs::cmd_clear(config, *category, *yes).await,
    }
}
