// ABOUTME: Runs one CLI subcommand: builds the session and clients, then the matching pipeline
// ABOUTME: Prints the pipeline report and returns the process exit code

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use content_jobs::config::Config;
use content_jobs::connector::{
    file_stem, ConnectorClient, ConnectorConnection, ConnectorJobRecord, RecordStore,
};
use content_jobs::error::JobError;
use content_jobs::pipeline::connector::{
    connector_status, ingest_from_connector, send_to_connector, IngestOptions, TranslationSink,
};
use content_jobs::pipeline::export::export;
use content_jobs::pipeline::import::{import, ValidationPolicy};
use content_jobs::pipeline::jobs::{publish_taxonomy, run_single};
use content_jobs::pipeline::permissions::{grant_members, Grant, GrantAction, Member, Role};
use content_jobs::pipeline::translation::{translation_job, FollowUp};
use content_jobs::pipeline::{PipelineContext, PipelineReport, StageStatus};
use content_jobs::remote::{ArchiveRef, Job, JobClient, JobKind, Operation, Terminal};
use content_jobs::session::Session;
use content_jobs::transport::ReqwestTransport;

use crate::{Cli, Commands};

struct Runtime {
    config: Config,
    transport: Arc<ReqwestTransport>,
    cancel: CancellationToken,
    quiet: bool,
}

impl Runtime {
    fn job_client(&self) -> Result<JobClient<ReqwestTransport>> {
        let authorization = self.config.server.authorization.clone().with_context(|| {
            format!(
                "No authorization configured; set server.authorization or {}",
                content_jobs::config::AUTHORIZATION_ENV
            )
        })?;
        let mut session = Session::new(&self.config.server.base_url, authorization)?;
        if let Some(token) = &self.config.server.csrf_token {
            session = session.with_csrf_token(token);
        }

        let mut client =
            JobClient::new(self.transport.clone(), session, self.config.polling.clone())
                .with_cancellation(self.cancel.clone());
        if !self.quiet {
            let bar = progress_bar();
            client = client.with_observer(Arc::new(move |job: &Job| {
                bar.set_message(format!("{} {}", job.kind(), job.progress));
                if let Some(pct) = job.completed_percentage {
                    bar.set_position(u64::from(pct));
                }
                if job.progress.is_terminal() {
                    bar.finish_and_clear();
                }
            }));
        }
        Ok(client)
    }

    fn connector(&self, connection: &Path) -> Result<ConnectorClient<ReqwestTransport>> {
        let content = std::fs::read_to_string(connection)
            .with_context(|| format!("Failed to read connection file {}", connection.display()))?;
        let connection: ConnectorConnection = serde_json::from_str(&content)
            .with_context(|| format!("Invalid connection file {}", connection.display()))?;
        Ok(ConnectorClient::new(self.transport.clone(), connection))
    }

    fn records(&self) -> RecordStore {
        RecordStore::new(&self.config.connector.records_dir)
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner} {msg} [{bar:30}] {pos}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.enable_steady_tick(Duration::from_millis(200));
    bar
}

/// Writes the translated package to a directory and hands back an uploaded copy's id, if any.
struct DirectorySink<'a> {
    dir: &'a Path,
    ingest_file_id: Option<String>,
}

impl TranslationSink for DirectorySink<'_> {
    fn deliver(
        &mut self,
        record: &ConnectorJobRecord,
        payload: &[u8],
    ) -> content_jobs::Result<Option<String>> {
        std::fs::create_dir_all(self.dir)?;
        let path = self.dir.join(format!("{}.zip", file_stem(&record.job_name)));
        std::fs::write(&path, payload)?;
        println!("Translation written to {}", path.display());
        Ok(self.ingest_file_id.clone())
    }
}

fn print_report<T: Serialize>(report: &PipelineReport<T>) -> i32 {
    for stage in &report.stages {
        match &stage.status {
            StageStatus::Succeeded => println!("  [ok] {}", stage.name),
            StageStatus::Failed(err) => println!("  [{}] {}", err.category(), stage.name),
        }
    }
    if let Some(value) = &report.value {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(e) => tracing::warn!(error = %e, "Could not render result"),
        }
    }
    if let Some(detail) = &report.detail {
        println!("{}: {}", report.pipeline, detail);
    }
    report.exit_code()
}

fn parse_grants(pairs: &[String], group: bool, action: GrantAction) -> Result<Vec<Grant>> {
    pairs
        .iter()
        .map(|pair| {
            let Some((name, role)) = pair.split_once(':') else {
                bail!("Expected name:role, got {}", pair);
            };
            let role: Role = role.parse()?;
            let member = if group {
                Member::Group(name.to_string())
            } else {
                Member::User(name.to_string())
            };
            Ok(Grant {
                member,
                role,
                action,
            })
        })
        .collect()
}

pub async fn execute(cli: Cli) -> Result<i32> {
    let config = Config::load(Some(&cli.config))?;
    let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(
        config.http.timeout_secs,
    ))?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; the remote job keeps running");
            on_signal.cancel();
        }
    });

    let rt = Runtime {
        config,
        transport,
        cancel,
        quiet: cli.quiet,
    };

    let code = match cli.command {
        Commands::Status { kind, url, wait } => {
            let kind: JobKind = kind.parse()?;
            let client = rt.job_client()?;
            let url = client.session().url(&url);
            let mut job = Job::new(url.rsplit('/').next().unwrap_or_default(), kind, url.clone());
            if wait {
                let terminal = client.poll_until_complete(&mut job).await?;
                println!("{} {}: {}", kind, job.id(), terminal);
                if terminal.is_success() {
                    0
                } else {
                    1
                }
            } else {
                let progress = client.refresh_status(&mut job).await?;
                match job.completed_percentage {
                    Some(pct) => println!("{} {}: {} ({}%)", kind, job.id(), progress, pct),
                    None => println!("{} {}: {}", kind, job.id(), progress),
                }
                match Terminal::from_progress(&job) {
                    Some(terminal) if !terminal.is_success() => 1,
                    _ => 0,
                }
            }
        }
        Commands::Export {
            site,
            repository,
            folder,
            name,
            policies,
        } => {
            let operation = match (site, repository) {
                (Some(site_id), _) => Operation::ExportSite {
                    site_id,
                    folder_id: folder,
                    name,
                    policies,
                },
                (None, Some(repository_id)) => Operation::ExportRepository {
                    repository_id,
                    folder_id: folder,
                    name,
                },
                (None, None) => bail!("Either --site or --repository is required"),
            };
            let mut ctx = PipelineContext::default();
            print_report(&export(&rt.job_client()?, &operation, &mut ctx).await)
        }
        Commands::Import {
            file_id,
            site,
            new_site_name,
            repository,
            policy,
            fail_on_validation_errors,
        } => {
            let archive = ArchiveRef { file_id };
            let operation = if site.is_some() || new_site_name.is_some() {
                Operation::ImportSite {
                    archive,
                    site_id: site,
                    new_site_name,
                    repository_id: repository,
                    policy,
                }
            } else {
                Operation::ImportRepository {
                    archive,
                    repository_id: repository.context("--repository is required")?,
                    policy,
                }
            };
            let policy = if fail_on_validation_errors {
                ValidationPolicy::FailOnErrors
            } else {
                ValidationPolicy::Report
            };
            let mut ctx = PipelineContext::default();
            print_report(&import(&rt.job_client()?, &operation, policy, &mut ctx).await)
        }
        Commands::Copy {
            resource,
            id,
            name,
            description,
        } => {
            let operation = Operation::Copy {
                resource: resource.into(),
                id,
                name,
                description,
            };
            print_report(&run_single(&rt.job_client()?, &operation).await)
        }
        Commands::Publish {
            site,
            taxonomy,
            only_updated,
            channel,
        } => {
            let client = rt.job_client()?;
            match (site, taxonomy) {
                (Some(site_id), _) => {
                    let operation = Operation::PublishSite {
                        site_id,
                        only_updated,
                    };
                    print_report(&run_single(&client, &operation).await)
                }
                (None, Some(taxonomy_id)) => {
                    print_report(&publish_taxonomy(&client, &taxonomy_id, &channel).await)
                }
                (None, None) => bail!("Either --site or --taxonomy is required"),
            }
        }
        Commands::CreateSite {
            name,
            template,
            repository,
            localization_policy,
            default_language,
            description,
        } => {
            let operation = Operation::CreateSite {
                name,
                template_id: template,
                repository_id: repository,
                localization_policy_id: localization_policy,
                default_language,
                description,
            };
            print_report(&run_single(&rt.job_client()?, &operation).await)
        }
        Commands::CreateTemplate {
            site,
            name,
            include_unpublished_assets,
        } => {
            let operation = Operation::CreateTemplate {
                site_id: site,
                name,
                include_unpublished_assets,
            };
            print_report(&run_single(&rt.job_client()?, &operation).await)
        }
        Commands::CreateArchive { name, folder, jobs } => {
            let operation = Operation::CreateArchive {
                folder_id: folder,
                name,
                job_ids: jobs,
            };
            print_report(&run_single(&rt.job_client()?, &operation).await)
        }
        Commands::TranslationExport {
            site,
            job_name,
            languages,
            validate,
            import,
        } => {
            let follow_up = match (validate, import) {
                (true, _) => FollowUp::ValidateOnly,
                (false, true) => FollowUp::Import,
                (false, false) => FollowUp::None,
            };
            let operation = Operation::TranslationExport {
                site_id: site,
                job_name: job_name.clone(),
                target_languages: languages,
            };
            let mut ctx = PipelineContext::named(job_name);
            print_report(&translation_job(&rt.job_client()?, &operation, follow_up, &mut ctx).await)
        }
        Commands::TranslationImport {
            job_name,
            file_id,
            validate,
        } => {
            let operation = if validate {
                Operation::TranslationValidate { job_name, file_id }
            } else {
                Operation::TranslationImport { job_name, file_id }
            };
            print_report(&run_single(&rt.job_client()?, &operation).await)
        }
        Commands::ConnectorSend {
            connection,
            job_name,
            file,
        } => {
            let connector = rt.connector(&connection)?;
            let payload = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mut ctx = PipelineContext::named(job_name.clone());
            let report =
                send_to_connector(&connector, &rt.records(), &job_name, payload, &mut ctx).await;
            print_report(&report)
        }
        Commands::ConnectorIngest {
            connection,
            job_name,
            output,
            ingest_file_id,
            wait,
        } => {
            let connector = rt.connector(&connection)?;
            let client = rt.job_client()?;
            let mut sink = DirectorySink {
                dir: &output,
                ingest_file_id,
            };
            let report = ingest_from_connector(
                &connector,
                &client,
                &rt.records(),
                &job_name,
                &mut sink,
                IngestOptions { wait },
            )
            .await;
            print_report(&report)
        }
        Commands::ConnectorStatus { connection } => {
            let connector = rt.connector(&connection)?;
            let records = rt.records().list()?;
            if records.is_empty() {
                println!("No connector jobs recorded");
            }
            let mut failed = 0;
            for (record, job) in connector_status(&connector, &records).await {
                match job {
                    Ok(job) => println!(
                        "{:<30} {:<12} {}",
                        record.job_name,
                        record.status,
                        job.display_status()
                    ),
                    Err(err) => {
                        failed += 1;
                        println!("{:<30} {:<12} error: {}", record.job_name, record.status, err);
                    }
                }
            }
            if failed > 0 {
                2
            } else {
                0
            }
        }
        Commands::Grant {
            resource,
            id,
            user,
            group,
            update,
        } => {
            let action = if update {
                GrantAction::Update
            } else {
                GrantAction::Add
            };
            let mut grants = parse_grants(&user, false, action)?;
            grants.extend(parse_grants(&group, true, action)?);
            if grants.is_empty() {
                return Err(JobError::Validation("no --user or --group given".to_string()).into());
            }
            print_report(&grant_members(&rt.job_client()?, resource.into(), &id, &grants).await)
        }
    };

    Ok(code)
}
