pub mod access;
pub mod claims;
pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod device;
pub mod error;
pub mod ledger;
pub mod sync;
mod utils;
pub mod view;

use std::sync::Arc;

use access::AccessGuard;
use anyhow::Context;
use clap::Parser;
use claims::ClaimCoordinator;
use cli::Cli;
use config::RegistryConfig;
use db::Database;
use device::{FileLocalStore, LocalStore};
use ledger::OwnershipLedger;

pub use error::{RegistryError, RegistryResult};

/// Handles shared by every command. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub claims: ClaimCoordinator,
    pub ledger: OwnershipLedger,
    pub access: AccessGuard,
    pub config: RegistryConfig,
}

impl AppState {
    /// Open the database and device state named by the config.
    pub fn new(config: RegistryConfig) -> anyhow::Result<Self> {
        let db = Database::with_busy_timeout(config.database_path.clone(), config.busy_timeout())?;
        let store = FileLocalStore::new(config.device_state_path.clone())?;
        Ok(Self::with_parts(db, Arc::new(store), config))
    }

    pub fn with_parts(db: Database, store: Arc<dyn LocalStore>, config: RegistryConfig) -> Self {
        Self {
            claims: ClaimCoordinator::new(db.clone(), config.anonymous_name.clone()),
            ledger: OwnershipLedger::new(store.clone()),
            access: AccessGuard::new(db.clone(), store),
            db,
            config,
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    // RUST_LOG overrides the default level.
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let config = RegistryConfig::load(Some(&cli.config))?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(async move {
        let state = AppState::new(config)?;
        cli::dispatch(cli.command, state).await
    })
}
