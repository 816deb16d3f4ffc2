//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Commands that write run as the local administrator: whoever can open the
//! database file already has full control over it.

use dealpipe::{
    AppError,
    api::{self, AppState, DealJson, IdentityResolver, StaticSessions},
    config,
};
use dealpipe_core::{
    DealEngine, Identity, MemoryStore, NewStage, RecordStore, RedbStore, Stage, StageId,
    StageRegistry,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// User id the CLI acts as for administrative writes.
const LOCAL_ADMIN: &str = "cli";

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    db_path: &Path,
    backend: &str,
    host: &str,
    port: u16,
    sessions: Option<PathBuf>,
) -> Result<(), AppError> {
    let store = open_store(db_path, backend)?;

    let sessions_path = sessions.or_else(config::sessions_path_from_env);
    let identities = match &sessions_path {
        Some(path) => StaticSessions::new(config::load_sessions(path)?),
        None => StaticSessions::default(),
    };
    if identities.is_empty() {
        tracing::warn!(
            "No sessions configured - every request is anonymous and all writes will be refused. \
             Pass --sessions or set DEALPIPE_SESSIONS."
        );
    } else {
        tracing::info!("Loaded {} session(s)", identities.len());
    }

    println!("dealpipe Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Backend:  {}", backend);
    println!("  Database: {:?}", db_path);
    println!("  Sessions: {} loaded", identities.len());
    println!();
    println!("Endpoints:");
    println!("  GET/POST         /pipeline-stages");
    println!("  GET              /pipeline-stages/all");
    println!("  PUT              /pipeline-stages/order");
    println!("  PUT/DELETE       /pipeline-stages/{{id}}");
    println!("  GET/POST         /deals");
    println!("  GET/PUT/DELETE   /deals/{{id}}");
    println!("  GET              /health");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let resolver: Arc<dyn IdentityResolver> = Arc::new(identities);
    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, AppState::new(store, resolver)).await
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(db_path: &Path, backend: &str, force: bool) -> Result<(), AppError> {
    if backend != "redb" {
        return Err(AppError::Config(format!(
            "Backend '{}' has nothing to initialize",
            backend
        )));
    }
    if db_path.exists() {
        if !force {
            return Err(AppError::Config(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| AppError::Io(format!("Remove existing database: {}", e)))?;
    }

    open_store(db_path, backend)?;
    println!("Initialized new redb database at {:?}", db_path);
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show pipeline counts.
pub fn cmd_status(db_path: &Path, backend: &str, json_mode: bool) -> Result<(), AppError> {
    let (stages, deals) = open_pipeline(db_path, backend)?;
    let admin = local_admin();

    let all_stages = stages.list_all_stages(Some(&admin))?;
    let active_stages = all_stages.iter().filter(|s| s.is_active).count();
    let deal_count = deals.list_deals(Some(&admin))?.len();
    let orphaned = deals.list_orphaned_deals(Some(&admin))?.len();

    if json_mode {
        let output = serde_json::json!({
            "database": db_path.to_string_lossy(),
            "backend": backend,
            "stages": all_stages.len(),
            "active_stages": active_stages,
            "deals": deal_count,
            "orphaned_deals": orphaned,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("dealpipe Pipeline Status");
    println!("========================");
    println!("Database: {:?}", db_path);
    println!("Backend:  {}", backend);
    println!();
    println!("Stages:         {} ({} active)", all_stages.len(), active_stages);
    println!("Deals:          {}", deal_count);
    println!("Orphaned Deals: {}", orphaned);

    Ok(())
}

// =============================================================================
// STAGE COMMANDS
// =============================================================================

/// List stages in pipeline order.
pub fn cmd_stages(db_path: &Path, backend: &str, json_mode: bool, all: bool) -> Result<(), AppError> {
    let (stages, _) = open_pipeline(db_path, backend)?;
    let listed = if all {
        let mut every = stages.list_all_stages(Some(&local_admin()))?;
        every.sort_by_key(|s| (!s.is_active, s.order_index, s.id));
        every
    } else {
        stages.list_active_stages()?
    };

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&listed).unwrap_or_default()
        );
        return Ok(());
    }

    if listed.is_empty() {
        println!("No stages configured.");
        return Ok(());
    }
    println!("{:>6}  {:>6}  {:<8}  NAME", "ID", "ORDER", "STATE");
    for stage in &listed {
        print_stage(stage);
    }
    Ok(())
}

/// Create a stage as the local administrator.
pub fn cmd_stage_add(
    db_path: &Path,
    backend: &str,
    json_mode: bool,
    name: String,
    order: Option<i64>,
    inactive: bool,
) -> Result<(), AppError> {
    let (stages, _) = open_pipeline(db_path, backend)?;
    let new = NewStage {
        name,
        order_index: order,
        is_active: !inactive,
    };
    let stage = stages.create_stage(Some(&local_admin()), new)?;

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&stage).unwrap_or_default()
        );
    } else {
        println!("Created stage:");
        print_stage(&stage);
    }
    Ok(())
}

fn print_stage(stage: &Stage) {
    let state = if stage.is_active { "active" } else { "inactive" };
    println!(
        "{:>6}  {:>6}  {:<8}  {}",
        stage.id, stage.order_index, state, stage.name
    );
}

// =============================================================================
// DEALS COMMAND
// =============================================================================

/// List deals, most recently updated first.
pub fn cmd_deals(
    db_path: &Path,
    backend: &str,
    json_mode: bool,
    stage: Option<u64>,
    orphaned: bool,
) -> Result<(), AppError> {
    let (stages, deals) = open_pipeline(db_path, backend)?;
    let admin = local_admin();

    let listed = match stage {
        Some(id) => deals.list_deals_by_stage(Some(&admin), StageId(id))?,
        None if orphaned => deals.list_orphaned_deals(Some(&admin))?,
        None => deals.list_deals(Some(&admin))?,
    };
    let active = stages.active_stage_ids()?;
    let listed: Vec<DealJson> = listed
        .into_iter()
        .map(|deal| DealJson::new(deal, &active))
        .filter(|deal| !orphaned || deal.orphaned)
        .collect();

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&listed).unwrap_or_default()
        );
        return Ok(());
    }

    if listed.is_empty() {
        println!("No deals found.");
        return Ok(());
    }
    println!(
        "{:>6}  {:>6}  {:<16}  {:<25}  TITLE",
        "ID", "STAGE", "OWNER", "UPDATED"
    );
    for entry in &listed {
        let deal = &entry.deal;
        let marker = if entry.orphaned { " (orphaned)" } else { "" };
        println!(
            "{:>6}  {:>6}  {:<16}  {:<25}  {}{}",
            deal.id,
            deal.stage_id,
            deal.owner_user_id,
            deal.updated_at.to_rfc3339(),
            deal.title.as_deref().unwrap_or("-"),
            marker
        );
    }
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn local_admin() -> Identity {
    Identity::admin(LOCAL_ADMIN)
}

/// Open the record store for a database path with the specified backend.
pub fn open_store(db_path: &Path, backend: &str) -> Result<Arc<dyn RecordStore>, AppError> {
    match backend {
        "redb" => Ok(Arc::new(RedbStore::open(db_path)?)),
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(AppError::Config(format!(
            "Unknown backend '{}' (expected 'redb' or 'memory')",
            other
        ))),
    }
}

fn open_pipeline(db_path: &Path, backend: &str) -> Result<(StageRegistry, DealEngine), AppError> {
    let store = open_store(db_path, backend)?;
    let stages = StageRegistry::new(store.clone());
    let deals = DealEngine::new(store, stages.clone());
    Ok((stages, deals))
}

// =============================================================================
// TESTS
// =============================================================================
