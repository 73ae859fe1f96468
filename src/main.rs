// ABOUTME: Command-line entry point mapping subcommands onto job pipelines
// ABOUTME: Exit code is 0 on success, 2 on partial failure and 1 on failure

mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use content_jobs::remote::Resource;

#[derive(Parser)]
#[command(
    name = "content-jobs",
    version,
    about = "Submit and follow long-running content service jobs"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML configuration file
    #[arg(long, default_value = "content-jobs.toml", global = true)]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Hide the progress bar while polling
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ResourceArg {
    Site,
    Template,
    Theme,
    Component,
}

impl From<ResourceArg> for Resource {
    fn from(arg: ResourceArg) -> Self {
        match arg {
            ResourceArg::Site => Resource::Sites,
            ResourceArg::Template => Resource::Templates,
            ResourceArg::Theme => Resource::Themes,
            ResourceArg::Component => Resource::Components,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check, or wait on, a job that is already running
    Status {
        /// Job kind label, e.g. export-site or copy-theme
        kind: String,
        /// Status URL returned when the job was submitted
        url: String,
        /// Poll until the job finishes
        #[arg(long)]
        wait: bool,
    },
    /// Export a site or repository to a documents folder
    Export {
        #[arg(long, required_unless_present = "repository", conflicts_with = "repository")]
        site: Option<String>,
        #[arg(long)]
        repository: Option<String>,
        /// Target folder id
        #[arg(long)]
        folder: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "siteAndAssets")]
        policies: String,
    },
    /// Import an uploaded archive into a site or repository
    Import {
        /// File id of the uploaded archive
        file_id: String,
        #[arg(long)]
        site: Option<String>,
        /// Name for a new site created by the import
        #[arg(long)]
        new_site_name: Option<String>,
        #[arg(long, required_unless_present_any = ["site", "new_site_name"])]
        repository: Option<String>,
        #[arg(long, default_value = "createOrUpdate")]
        policy: String,
        /// Fail the import when validation reports errors
        #[arg(long)]
        fail_on_validation_errors: bool,
    },
    /// Copy a site, template, theme or component
    Copy {
        #[arg(value_enum)]
        resource: ResourceArg,
        id: String,
        /// Name of the copy
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Publish a site or a taxonomy
    Publish {
        #[arg(long, required_unless_present = "taxonomy", conflicts_with = "taxonomy")]
        site: Option<String>,
        #[arg(long, requires = "channel")]
        taxonomy: Option<String>,
        /// Publish only assets changed since the last publish
        #[arg(long)]
        only_updated: bool,
        /// Channel to publish a taxonomy to (repeatable)
        #[arg(long)]
        channel: Vec<String>,
    },
    /// Create a site from a template
    CreateSite {
        name: String,
        #[arg(long)]
        template: String,
        #[arg(long)]
        repository: Option<String>,
        #[arg(long)]
        localization_policy: Option<String>,
        #[arg(long)]
        default_language: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Create a template from a site
    CreateTemplate {
        site: String,
        name: String,
        /// Also copy assets that were never published
        #[arg(long)]
        include_unpublished_assets: bool,
    },
    /// Bundle finished export jobs into one archive in a documents folder
    CreateArchive {
        name: String,
        /// Target folder id
        #[arg(long)]
        folder: String,
        /// Export job id to include (repeatable)
        #[arg(long = "job", required = true)]
        jobs: Vec<String>,
    },
    /// Export a site translation job, optionally validating or importing it
    TranslationExport {
        site: String,
        job_name: String,
        /// Target language (repeatable)
        #[arg(long = "language", required = true)]
        languages: Vec<String>,
        #[arg(long, conflicts_with = "import")]
        validate: bool,
        #[arg(long)]
        import: bool,
    },
    /// Import a translated package that is already uploaded
    TranslationImport {
        job_name: String,
        /// File id of the uploaded translation package
        file_id: String,
        /// Validate only; do not import
        #[arg(long)]
        validate: bool,
    },
    /// Send a translation package to a connector
    ConnectorSend {
        /// JSON file describing the connector connection
        connection: PathBuf,
        job_name: String,
        /// Translation package to send
        file: PathBuf,
    },
    /// Download a finished connector translation and ingest it
    ConnectorIngest {
        connection: PathBuf,
        job_name: String,
        /// Directory the translated package is written to
        #[arg(long, default_value = ".")]
        output: PathBuf,
        /// Uploaded copy of the package to ingest into the site
        #[arg(long)]
        ingest_file_id: Option<String>,
        /// Keep polling until the connector finishes
        #[arg(long)]
        wait: bool,
    },
    /// List connector jobs recorded locally with their current status
    ConnectorStatus { connection: PathBuf },
    /// Grant or update member roles on a resource
    Grant {
        #[arg(value_enum)]
        resource: ResourceArg,
        id: String,
        /// user:role pair (repeatable)
        #[arg(long)]
        user: Vec<String>,
        /// group:role pair (repeatable)
        #[arg(long)]
        group: Vec<String>,
        /// Change roles of existing members instead of adding them
        #[arg(long)]
        update: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    let code = commands::execute(cli).await?;
    std::process::exit(code);
}
