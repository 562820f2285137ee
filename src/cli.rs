use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;

use crate::{
    commands::{couple, guest},
    sync::{SyncController, SyncMode},
    view::{couple_view, guest_view},
    AppState,
};

#[derive(Parser, Debug)]
#[command(version, about = "Wedding gift registry")]
pub struct Cli {
    /// JSON config file. Missing means defaults.
    #[arg(long, short = 'c', value_name = "FILE", default_value = "wedding-registry.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a wedding; this device stays unlocked for it.
    CreateWedding {
        #[arg(long = "couple", value_name = "NAMES")]
        couple_name: String,
        #[arg(long)]
        pin: String,
    },
    /// Guest view of a registry.
    Show { wedding: String },
    /// Guest adds a bring-your-own item.
    PostGift {
        wedding: String,
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Display name used if the item is claimed for you.
        #[arg(long = "as", value_name = "NAME")]
        guest_name: Option<String>,
    },
    Claim {
        wedding: String,
        gift: String,
        #[arg(long = "as", value_name = "NAME")]
        guest_name: Option<String>,
    },
    Unclaim { wedding: String, gift: String },
    /// Check a PIN and remember it on this device.
    Unlock {
        wedding: String,
        #[arg(long)]
        pin: String,
    },
    /// Forget the remembered PIN.
    Lock { wedding: String },
    /// Couple view of a registry.
    Dashboard {
        wedding: String,
        /// Show who claimed what.
        #[arg(long)]
        reveal: bool,
    },
    AddWish {
        wedding: String,
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    ThankYou {
        wedding: String,
        gift: String,
        /// Clear the flag instead of setting it.
        #[arg(long)]
        unset: bool,
    },
    RemoveGift { wedding: String, gift: String },
    RotatePin {
        wedding: String,
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },
    /// Follow a registry live until Ctrl-C.
    Watch {
        wedding: String,
        /// Couple view (needs an unlocked dashboard).
        #[arg(long)]
        dashboard: bool,
        #[arg(long, requires = "dashboard")]
        reveal: bool,
    },
}

pub async fn dispatch(command: Command, state: AppState) -> Result<()> {
    match command {
        Command::CreateWedding { couple_name, pin } => {
            print_json(&couple::create_wedding(&state, &couple_name, &pin).await?)
        }
        Command::Show { wedding } => print_json(&guest::load_registry(&state, &wedding).await?),
        Command::PostGift {
            wedding,
            name,
            description,
            guest_name,
        } => print_json(
            &guest::post_gift(&state, &wedding, &name, description, guest_name.as_deref()).await?,
        ),
        Command::Claim {
            wedding,
            gift,
            guest_name,
        } => print_json(
            &guest::claim_gift(&state, &wedding, &gift, guest_name.as_deref()).await?,
        ),
        Command::Unclaim { wedding, gift } => {
            print_json(&guest::unclaim_gift(&state, &wedding, &gift).await?)
        }
        Command::Unlock { wedding, pin } => {
            let unlocked = couple::unlock_dashboard(&state, &wedding, &pin).await?;
            print_json(&serde_json::json!({ "unlocked": unlocked }))
        }
        Command::Lock { wedding } => {
            couple::lock_dashboard(&state, &wedding);
            print_json(&serde_json::json!({ "locked": true }))
        }
        Command::Dashboard { wedding, reveal } => {
            print_json(&couple::load_dashboard(&state, &wedding, reveal).await?)
        }
        Command::AddWish {
            wedding,
            name,
            description,
        } => print_json(&couple::add_wish(&state, &wedding, &name, description).await?),
        Command::ThankYou {
            wedding,
            gift,
            unset,
        } => {
            let updated = couple::set_thank_you(&state, &wedding, &gift, !unset).await?;
            print_json(&serde_json::json!({ "updated": updated }))
        }
        Command::RemoveGift { wedding, gift } => {
            let removed = couple::remove_gift(&state, &wedding, &gift).await?;
            print_json(&serde_json::json!({ "removed": removed }))
        }
        Command::RotatePin {
            wedding,
            current,
            new,
        } => {
            couple::rotate_pin(&state, &wedding, &current, &new).await?;
            print_json(&serde_json::json!({ "rotated": true }))
        }
        Command::Watch {
            wedding,
            dashboard,
            reveal,
        } => watch(state, wedding, dashboard, reveal).await,
    }
}

async fn watch(state: AppState, wedding_id: String, dashboard: bool, reveal: bool) -> Result<()> {
    if dashboard {
        state.access.ensure_unlocked(&wedding_id).await?;
    }
    // Fail fast instead of waiting on a registry that is not there.
    state.db.get_wedding(&wedding_id).await?;

    // Writers are other processes, which the in-process change feed never
    // sees, so a CLI watcher always polls.
    let mode = state.config.poll_mode();
    if state.config.sync_mode() == SyncMode::Notify {
        info!("Change notifications only cover this process; polling instead");
    }

    let mut sync = SyncController::new(state.config.fetch_timeout());
    let mut snapshots = sync.subscribe(state.db.clone(), wedding_id.clone(), mode)?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("Stopping watch on wedding {wedding_id}");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                match snapshot {
                    Some(details) if dashboard => print_line(&couple_view(&details, reveal))?,
                    Some(details) => print_line(&guest_view(&details, &state.ledger))?,
                    None => warn!("Wedding {wedding_id} is not available"),
                }
            }
        }
    }

    sync.unsubscribe().await
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_line<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
