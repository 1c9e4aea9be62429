//! fancat-curator - batch driver for the curation engine
//!
//! Every subcommand prints one outcome line per entity and an end-of-run
//! summary. Per-entity failures are logged and counted; they never abort the
//! run. Ctrl+C stops a run between entities.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use fancat_common::config::{database_path, resolve_config_path, resolve_root_folder};
use fancat_common::{InactiveReason, LinkState, RawEntity};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use fancat_curator::db;
use fancat_curator::services::{
    mismatch_detector, Curator, Enricher, HttpDirectoryClient, HttpMetadataClient,
    LinkLifecycleManager,
};
use fancat_curator::utils::{BackoffPolicy, EntityLocks};
use fancat_curator::workflow::{BatchRunner, RunSummary};
use fancat_curator::CurationConfig;

/// Command-line arguments for fancat-curator
#[derive(Parser, Debug)]
#[command(name = "fancat-curator")]
#[command(about = "Entity association and affiliate-link curation for the fan-content catalog")]
#[command(version)]
struct Args {
    /// Root folder holding fancat.db (falls back to FANCAT_ROOT_FOLDER)
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    /// TOML configuration file (falls back to FANCAT_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Curate a JSON file of entity records for one owner
    Curate {
        #[arg(long)]
        owner: String,
        file: PathBuf,
    },
    /// Merge duplicate records of one owner
    Dedupe {
        #[arg(long)]
        owner: String,
    },
    /// Verify stored links against the directory
    VerifyLinks {
        #[arg(long)]
        owner: Option<String>,
        /// Also re-check inactive links (detects reopened places)
        #[arg(long)]
        include_inactive: bool,
    },
    /// Search the directory for entities without a link
    AttachLinks {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Record a closure/relocation reported by a curator
    CloseLink {
        entity_id: Uuid,
        #[arg(long)]
        reason: InactiveReason,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Replace a wrong entity with corrected data from a JSON file
    Correct {
        entity_id: Uuid,
        file: PathBuf,
        /// Episode the corrected entity belongs to
        #[arg(long)]
        episode: Option<Uuid>,
    },
    /// Report suspected episode/entity mismatches for one owner
    Audit {
        #[arg(long)]
        owner: String,
    },
    /// Fill owner and episode metadata from the metadata service
    Enrich {
        #[arg(long)]
        owner: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fancat_curator=info,fancat_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    info!("Starting fancat-curator");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Step 1: Configuration
    let config_path = resolve_config_path(args.config.as_deref());
    let config = Arc::new(
        CurationConfig::load(config_path.as_deref()).context("Failed to load configuration")?,
    );

    // Step 2: Root folder and database
    let root_folder = resolve_root_folder(args.root_folder.as_deref());
    let db_path = database_path(&root_folder);
    info!("Database: {}", db_path.display());
    let pool = fancat_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let locks = EntityLocks::new();
    let cancel_token = CancellationToken::new();
    spawn_ctrl_c_handler(cancel_token.clone());

    let policy = BackoffPolicy::from(&config.lookup);
    let runner = BatchRunner::new(cancel_token, config.lookup.inter_item_delay());
    let print = |line: &str| println!("{}", line);

    let summary = match args.command {
        Command::Curate { owner, file } => {
            let owner_id = owner_id(&pool, &owner).await?;
            let records = read_records(&file)?;
            let curator = Curator::new(pool.clone(), Arc::clone(&config), locks);
            runner.curate_all(&curator, owner_id, records, print).await
        }
        Command::Dedupe { owner } => {
            let owner_id = owner_id(&pool, &owner).await?;
            let curator = Curator::new(pool.clone(), Arc::clone(&config), locks);
            let report = curator.resolver().resolve_owner(owner_id).await?;
            for merge in &report.merges {
                println!(
                    "merged    {} <- {:?} ({} associations moved)",
                    merge.canonical_id, merge.removed_ids, merge.associations_moved
                );
            }
            for conflict in &report.conflicts {
                println!("conflict  {:?} (several active records; adjudicate manually)", conflict);
            }
            let mut summary = RunSummary::default();
            summary.duplicate = report.merges.iter().map(|m| m.removed_ids.len()).sum();
            summary.error = report.conflicts.len();
            summary
        }
        Command::VerifyLinks { owner, include_inactive } => {
            let owner_id = optional_owner_id(&pool, owner.as_deref()).await?;
            let mut states = vec![LinkState::Candidate, LinkState::Active, LinkState::Corrected];
            if include_inactive {
                states.push(LinkState::Inactive);
            }
            let ids = entity_ids(&pool, &states, owner_id, true).await?;
            let lifecycle = lifecycle_manager(&pool, &config, locks, policy)?;
            runner.verify_links(&lifecycle, &ids, print).await
        }
        Command::AttachLinks { owner } => {
            let owner_id = optional_owner_id(&pool, owner.as_deref()).await?;
            let states = [LinkState::Unlinked, LinkState::Corrected];
            let ids = entity_ids(&pool, &states, owner_id, false).await?;
            let lifecycle = lifecycle_manager(&pool, &config, locks, policy)?;
            runner.attach_links(&lifecycle, &ids, print).await
        }
        Command::CloseLink { entity_id, reason, note } => {
            let lifecycle = lifecycle_manager(&pool, &config, locks, policy)?;
            let entity = lifecycle.close(entity_id, reason, &note).await?;
            println!("inactive:{} {} [{}]", reason, entity.slug, entity.id);
            RunSummary {
                deactivated: 1,
                ..Default::default()
            }
        }
        Command::Correct { entity_id, file, episode } => {
            let mut records = read_records(&file)?;
            if records.len() != 1 {
                return Err(anyhow!("{} must contain exactly one record", file.display()));
            }
            let raw = records.remove(0);
            let curator = Curator::new(pool.clone(), Arc::clone(&config), locks);
            let mut summary = RunSummary::default();
            match curator.correct(entity_id, raw, episode, "curator").await {
                Ok(outcome) => {
                    summary.record_curation(outcome.status);
                    println!("{}", outcome.summary_line());
                }
                Err(e) => {
                    warn!(entity_id = %entity_id, error = %e, "Correction refused");
                    println!("{:<9} {} ({})", "error", entity_id, e);
                    summary.record_error();
                }
            }
            summary
        }
        Command::Audit { owner } => {
            let owner_id = owner_id(&pool, &owner).await?;
            let reports = mismatch_detector::audit_owner(&pool, owner_id, &config).await?;
            for report in &reports {
                println!(
                    "{} | {} | {}",
                    report.episode_title,
                    report.entity_name,
                    serde_json::to_string(&report.mismatches)?
                );
            }
            println!("{} suspected mismatches", reports.len());
            return Ok(());
        }
        Command::Enrich { owner } => {
            let owner_id = owner_id(&pool, &owner).await?;
            let metadata = HttpMetadataClient::new(&config.lookup)
                .map_err(|e| anyhow!("Metadata client unavailable: {}", e))?;
            let enricher = Enricher::new(
                pool.clone(),
                Arc::new(metadata),
                policy,
                config.lookup.inter_item_delay(),
            );
            let report = enricher.enrich_owner(owner_id).await?;
            println!(
                "owner enriched: {}, episodes enriched: {}, skipped: {}",
                report.owner_enriched, report.episodes_enriched, report.skipped
            );
            return Ok(());
        }
    };

    println!("{}", summary.display_string());
    pool.close().await;
    Ok(())
}

fn spawn_ctrl_c_handler(cancel_token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received; stopping after the current entity");
                cancel_token.cancel();
            }
            Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
        }
    });
}

fn lifecycle_manager(
    pool: &SqlitePool,
    config: &CurationConfig,
    locks: EntityLocks,
    policy: BackoffPolicy,
) -> Result<LinkLifecycleManager> {
    let domains = config.vocabulary.directory_domains.clone();
    let directory = HttpDirectoryClient::new(&config.lookup, domains)
        .map_err(|e| anyhow!("Directory client unavailable: {}", e))?;
    Ok(LinkLifecycleManager::new(pool.clone(), locks, Arc::new(directory), policy))
}

/// Read a JSON array of records, or a single record
fn read_records(path: &Path) -> Result<Vec<RawEntity>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match RawEntity::list_from_json(&text) {
        Ok(list) => Ok(list),
        Err(_) => {
            let single = RawEntity::from_json(&text)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(vec![single])
        }
    }
}

async fn owner_id(pool: &SqlitePool, slug: &str) -> Result<Uuid> {
    let mut conn = pool.acquire().await?;
    let owner = db::owners::load_owner_by_slug(&mut conn, slug)
        .await?
        .ok_or_else(|| anyhow!("Unknown owner: {}", slug))?;
    Ok(owner.id)
}

async fn optional_owner_id(pool: &SqlitePool, slug: Option<&str>) -> Result<Option<Uuid>> {
    match slug {
        Some(slug) => Ok(Some(owner_id(pool, slug).await?)),
        None => Ok(None),
    }
}

/// Ids of entities in any of `states`, filtered on whether they carry a link
async fn entity_ids(
    pool: &SqlitePool,
    states: &[LinkState],
    owner_id: Option<Uuid>,
    with_link: bool,
) -> Result<Vec<Uuid>> {
    let mut conn = pool.acquire().await?;
    let mut ids = Vec::new();
    for state in states {
        let entities = db::entities::list_entities_in_state(&mut conn, *state, owner_id).await?;
        ids.extend(
            entities
                .into_iter()
                .filter(|e| e.external_link.is_some() == with_link)
                .map(|e| e.id),
        );
    }
    Ok(ids)
}
