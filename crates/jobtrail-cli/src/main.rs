use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobtrail_core::{JobFilter, JobRecord, JobStatus, ProfileKey};
use jobtrail_storage::JobStore;
use jobtrail_sync::{
    apply_analysis, filter_by_location, recent_runs_markdown, LocationRules, LocationRulesFile,
    RuleAnalyzer, RunOptions, RunScope, SyncConfig, SyncPipeline, STARTER_FEEDS,
};
use tokio::fs;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "jobtrail")]
#[command(about = "Track job postings from feeds and searches through review and application")]
struct Cli {
    /// Workspace directory; defaults to JOBTRAIL_* environment settings.
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the database, feed registry and workspace directories.
    Init,
    /// Pull feeds and pending imports into the store.
    Sync {
        #[arg(long, conflicts_with = "import_only")]
        rss_only: bool,
        #[arg(long)]
        import_only: bool,
        #[arg(long)]
        skip_analyzer: bool,
    },
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        min_score: Option<String>,
        #[arg(long)]
        source: Option<String>,
        /// e.g. "score desc"
        #[arg(long)]
        order_by: Option<String>,
        #[arg(long)]
        limit: Option<String>,
        #[arg(long)]
        json: bool,
    },
    Show {
        url: String,
    },
    Status {
        url: String,
        status: String,
    },
    Score {
        url: String,
        score: f64,
        #[arg(long)]
        rationale: Option<String>,
    },
    Delete {
        url: String,
    },
    /// Review new postings with the rule analyzer.
    Analyze {
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove postings outside the configured locations.
    FilterLocation {
        #[arg(long)]
        dry_run: bool,
    },
    /// Ingest one search-result JSON file.
    Import {
        file: PathBuf,
    },
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Summaries of recent sync runs.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
    #[command(subcommand)]
    Profile(ProfileCommand),
}

#[derive(Debug, Subcommand)]
enum ProfileCommand {
    Set { key: String, value: String },
    Show,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(workspace: Option<PathBuf>) -> SyncConfig {
    match workspace {
        Some(root) => SyncConfig::in_workspace(root),
        None => SyncConfig::from_env(),
    }
}

fn print_job_line(job: &JobRecord) {
    let score = job
        .user
        .score
        .map(|s| format!("{s:>4.1}"))
        .unwrap_or_else(|| "   -".to_string());
    println!("{score}  {:<9} {}  <{}>", job.status().as_str(), job.title, job.url);
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.workspace);

    match cli.command {
        Commands::Init => init_workspace(&config).await?,
        Commands::Sync {
            rss_only,
            import_only,
            skip_analyzer,
        } => {
            let scope = match (rss_only, import_only) {
                (true, _) => RunScope::FeedsOnly,
                (_, true) => RunScope::ImportsOnly,
                _ => RunScope::All,
            };
            let store = JobStore::open(&config.db_path).await?;
            let pipeline = SyncPipeline::new(config, store)?;
            let summary = pipeline
                .run_once(RunOptions {
                    scope,
                    skip_analyzer,
                })
                .await?;
            println!(
                "sync complete: run_id={} created={} refreshed={} failed_feeds={} reports={}",
                summary.run_id,
                summary.totals.created,
                summary.totals.refreshed,
                summary.failed_feeds(),
                summary.reports_dir.display()
            );
        }
        Commands::List {
            status,
            min_score,
            source,
            order_by,
            limit,
            json,
        } => {
            let pairs = [
                ("status", status),
                ("min_score", min_score),
                ("source", source),
                ("order_by", order_by),
                ("limit", limit),
            ];
            let filter = JobFilter::from_pairs(
                pairs
                    .iter()
                    .filter_map(|(key, value)| value.as_deref().map(|v| (*key, v))),
            )?;
            let store = JobStore::open(&config.db_path).await?;
            let jobs = store.query(&filter).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else {
                for job in &jobs {
                    print_job_line(job);
                }
                println!("{} job(s)", jobs.len());
            }
        }
        Commands::Show { url } => {
            let store = JobStore::open(&config.db_path).await?;
            let job = store
                .get(&url)
                .await?
                .with_context(|| format!("no job with url {url}"))?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Commands::Status { url, status } => {
            let status: JobStatus = status.parse()?;
            let store = JobStore::open(&config.db_path).await?;
            let job = store.set_status(&url, status).await?;
            print_job_line(&job);
        }
        Commands::Score {
            url,
            score,
            rationale,
        } => {
            let store = JobStore::open(&config.db_path).await?;
            let job = store.set_score(&url, score, rationale).await?;
            print_job_line(&job);
        }
        Commands::Delete { url } => {
            let store = JobStore::open(&config.db_path).await?;
            if store.delete(&url).await? {
                println!("deleted {url}");
            } else {
                println!("no job with url {url}");
            }
        }
        Commands::Analyze { dry_run } => {
            let store = JobStore::open(&config.db_path).await?;
            let rules = LocationRules::from_workspace_root(&config.workspace_root)?;
            let stats = apply_analysis(&store, &RuleAnalyzer::new(rules), dry_run).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::FilterLocation { dry_run } => {
            let store = JobStore::open(&config.db_path).await?;
            let rules = LocationRules::from_workspace_root(&config.workspace_root)?;
            let sweep = filter_by_location(&store, &rules, dry_run).await?;
            let verb = if dry_run { "would remove" } else { "removed" };
            for job in &sweep.removed {
                println!("{verb}: {}  <{}>", job.title, job.url);
            }
            println!("kept {}, {verb} {}", sweep.kept.len(), sweep.removed.len());
        }
        Commands::Import { file } => {
            let store = JobStore::open(&config.db_path).await?;
            let pipeline = SyncPipeline::new(config, store)?;
            let result = pipeline.import_file(&file).await?;
            println!(
                "imported {}: created={} refreshed={} failed={} skipped={}",
                file.display(),
                result.ingest.created,
                result.ingest.refreshed,
                result.ingest.failures.len(),
                result.skipped
            );
        }
        Commands::Serve { port } => {
            let store = JobStore::open(&config.db_path).await?;
            let port = port.unwrap_or_else(jobtrail_web::port_from_env);
            jobtrail_web::serve(store, port).await?;
        }
        Commands::Report { runs } => {
            println!("{}", recent_runs_markdown(&config.reports_dir(), runs)?);
        }
        Commands::Profile(ProfileCommand::Set { key, value }) => {
            let key: ProfileKey = key.parse()?;
            let store = JobStore::open(&config.db_path).await?;
            store.set_meta(key, &value).await?;
            println!("{key} = {value}");
        }
        Commands::Profile(ProfileCommand::Show) => {
            let store = JobStore::open(&config.db_path).await?;
            for (key, value) in store.all_meta().await? {
                println!("{key}: {value}");
            }
            let skills = store.skills(None).await?;
            if !skills.is_empty() {
                println!("skills:");
                for skill in skills {
                    println!("  {} ({})", skill.value.name, skill.value.category);
                }
            }
        }
    }

    Ok(())
}

async fn init_workspace(config: &SyncConfig) -> Result<()> {
    for dir in [
        config.imports_dir().join("processed"),
        config.reports_dir(),
        config.artifacts_dir.clone(),
        config.workspace_root.join("rules"),
    ] {
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    let feeds = config.feeds_path();
    if !fs::try_exists(&feeds).await? {
        fs::write(&feeds, STARTER_FEEDS)
            .await
            .with_context(|| format!("writing {}", feeds.display()))?;
        info!(path = %feeds.display(), "wrote starter feed registry");
    }
    let rules = config.workspace_root.join("rules").join("location.yaml");
    if !fs::try_exists(&rules).await? {
        let yaml = serde_yaml::to_string(&LocationRulesFile::default())?;
        fs::write(&rules, yaml)
            .await
            .with_context(|| format!("writing {}", rules.display()))?;
    }

    let store = JobStore::open(&config.db_path).await?;
    store.close().await;
    println!("workspace ready: {}", config.workspace_root.display());
    Ok(())
}
