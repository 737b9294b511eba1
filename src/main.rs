//! ptpsync-rs — CLI over the camera sync-state database.
//!
//! Lists and inspects the devices a host has synced with, forgets one so it
//! starts from scratch, and exports/imports the record set as a JSON
//! snapshot for moving sync history between hosts.

#![warn(clippy::all)]

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ptpsync_rs::cli::{self, Command};
use ptpsync_rs::config::Config;
use ptpsync_rs::device::{CameraVendor, DeviceIdentity};
use ptpsync_rs::snapshot;
use ptpsync_rs::state::{SqliteSyncStore, SyncRecord, SyncStore};
use ptpsync_rs::types::LogLevel;

fn vendor_label(record: &SyncRecord) -> &'static str {
    CameraVendor::from_vendor_id(record.vendor_id).as_str()
}

/// Run the devices command.
async fn run_devices(store: &dyn SyncStore) -> anyhow::Result<()> {
    let records = store.list_all().await?;

    if records.is_empty() {
        println!("No devices recorded yet.");
        return Ok(());
    }

    for record in &records {
        println!("{}", record.identity_key);
        println!(
            "  {} {} [{}]  {}  synced handles: {}",
            record.manufacturer_name,
            record.product_name,
            vendor_label(record),
            if record.is_syncing { "syncing" } else { "idle" },
            record.synced_handles.len()
        );
    }
    Ok(())
}

/// Run the status command.
async fn run_status(store: &dyn SyncStore, args: cli::StatusArgs) -> anyhow::Result<()> {
    let identity = DeviceIdentity::from(args.identity.as_str());

    let record = match store.get(&identity).await? {
        Some(record) => record,
        None => {
            println!("No sync record for identity {}", identity);
            println!("Run `ptpsync-rs devices` to list known devices.");
            return Ok(());
        }
    };

    println!("Device: {}", record.identity_key);
    println!();
    println!("  Manufacturer: {}", record.manufacturer_name);
    println!(
        "  Product:      {} [{}]",
        record.product_name,
        vendor_label(&record)
    );
    if !record.display_name.is_empty() {
        println!("  Device node:  {}", record.display_name);
    }
    if record.serial_number.is_empty() {
        println!("  Serial:       (not readable)");
    } else {
        println!("  Serial:       {}", record.serial_number);
    }
    if !record.firmware_version.is_empty() {
        println!("  Firmware:     {}", record.firmware_version);
    }
    println!(
        "  USB ids:      {:04x}:{:04x} (attachment {})",
        record.vendor_id, record.product_id, record.internal_device_id
    );
    println!();
    println!(
        "  Syncing:        {}",
        if record.is_syncing { "yes" } else { "no" }
    );
    println!("  Synced handles: {}", record.synced_handles.len());
    match &record.first_sync_at {
        Some(at) => println!("  First sync:     {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("  First sync:     never"),
    }
    println!(
        "  Updated:        {}",
        record.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  Created:        {}",
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

/// Run the forget command.
async fn run_forget(store: &dyn SyncStore, args: cli::ForgetArgs) -> anyhow::Result<()> {
    let identity = DeviceIdentity::from(args.identity.as_str());

    if store.get(&identity).await?.is_none() {
        println!("No sync record for identity {}", identity);
        return Ok(());
    }

    if !args.yes {
        println!("This will forget all sync state for:");
        println!("  {}", identity);
        println!();
        println!("The device will be treated as brand new on its next attachment.");
        print!("Are you sure? [y/N] ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    if store.remove(&identity).await? {
        println!("Sync record removed.");
    } else {
        println!("No sync record for identity {}", identity);
    }
    Ok(())
}

/// Run the export command.
async fn run_export(store: &dyn SyncStore, args: cli::ExportArgs) -> anyhow::Result<()> {
    let records = store.list_all().await?;
    let json = snapshot::to_json(&records)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &json)?;
            println!("Exported {} records to {}", records.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Run the import command.
async fn run_import(store: &dyn SyncStore, args: cli::ImportArgs) -> anyhow::Result<()> {
    let count = snapshot::load_into(store, &args.input).await?;
    println!("Imported {} records from {}", count, args.input.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let filter = match cli.log_level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = Config::from_cli(&cli);
    let db_path = config.db_path();

    // Commands that only inspect state get a friendly message instead of a
    // freshly created empty database.
    if !matches!(cli.command, Command::Import(_)) && !db_path.exists() {
        println!("No sync database found at {}", db_path.display());
        println!("Run a sync first, or import a snapshot, to create it.");
        return Ok(());
    }

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Open the store once and hand it to whichever command runs.
    let store: Arc<dyn SyncStore> = Arc::new(SqliteSyncStore::open(&db_path).await?);
    tracing::debug!(path = %db_path.display(), "Sync database opened");

    match cli.command {
        Command::Devices => run_devices(store.as_ref()).await,
        Command::Status(args) => run_status(store.as_ref(), args).await,
        Command::Forget(args) => run_forget(store.as_ref(), args).await,
        Command::Export(args) => run_export(store.as_ref(), args).await,
        Command::Import(args) => run_import(store.as_ref(), args).await,
    }
}
