//! Cache inspection and housekeeping command handlers.

use std::time::Duration;

use anyhow::{Context, Result};

use gyschat::cache::{expiry_from_now, CacheService, CacheStore};
use gyschat::config::Config;

use super::CacheAction;

fn namespace_store(service: &CacheService, name: &str) -> Result<CacheStore> {
    service
        .store(name)
        .ok_or_else(|| anyhow::anyhow!("Unknown namespace '{}' (expected chunks, images or suggestions)", name))
}

/// Handle `gyschat cache` subcommands.
pub(crate) fn cmd_cache(config: &Config, action: CacheAction) -> Result<()> {
    let service = CacheService::open(&config.cache).with_context(|| "Failed to open cache")?;

    match action {
        CacheAction::Get { namespace, key } => {
            let store = namespace_store(&service, &namespace)?;
            match store.get::<serde_json::Value>(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => println!("(miss)"),
            }
        }
        CacheAction::Set {
            namespace,
            key,
            value,
            ttl_secs,
        } => {
            let store = namespace_store(&service, &namespace)?;
            let value: serde_json::Value =
                serde_json::from_str(&value).with_context(|| "Value must be valid JSON")?;
            let ttl = ttl_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| store.namespace().default_ttl());
            store.set(&key, expiry_from_now(ttl), &value);
            println!("Stored {}/{} for {}s", namespace, key, ttl.as_secs());
        }
        CacheAction::List { namespace } => {
            let store = namespace_store(&service, &namespace)?;
            let keys = store.keys();
            if keys.is_empty() {
                println!("No entries in '{}'.", namespace);
                return Ok(());
            }
            println!("{} entr{} in '{}':", keys.len(), if keys.len() == 1 { "y" } else { "ies" }, namespace);
            for key in keys {
                println!("- {}", key);
            }
        }
        CacheAction::Clear { namespace } => {
            let store = namespace_store(&service, &namespace)?;
            let removed = store.clear();
            println!("Cleared {} entr{} from '{}'.", removed, if removed == 1 { "y" } else { "ies" }, namespace);
        }
        CacheAction::Sweep => {
            let report = service.sweep_now();
            println!(
                "Sweep complete: scanned {}, removed {}, errors {}.",
                report.scanned, report.removed, report.errors
            );
        }
    }

    Ok(())
}

/// Run the housekeeper in the foreground until Ctrl-C.
pub(crate) async fn cmd_housekeep(config: &Config) -> Result<()> {
    if !config.cache.enabled {
        println!("Cache is disabled; nothing to sweep.");
        return Ok(());
    }
    let service = CacheService::start(&config.cache).with_context(|| "Failed to start cache")?;
    println!(
        "Housekeeper running every {}s. Press Ctrl-C to stop.",
        config.cache.sweep_interval_secs
    );

    tokio::signal::ctrl_c()
        .await
        .with_context(|| "Failed to listen for Ctrl-C")?;

    service.shutdown().await;
    println!("Housekeeper stopped.");
    Ok(())
}
