use {
    serde_json::Value,
    solace_vault::{KeyStatus, KvStore, StoredRecord, service::keys},
};

use crate::context::Vault;

/// Parse a command-line value: JSON when it parses, a plain string otherwise.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub async fn read(vault: &Vault, key: &str) -> anyhow::Result<()> {
    match vault.read_with_format(key).await? {
        Some((value, format)) => {
            tracing::debug!(key, %format, "record read");
            println!("{}", serde_json::to_string_pretty(&value)?);
        },
        None => eprintln!("No value stored for '{key}'."),
    }
    Ok(())
}

pub async fn write(vault: &Vault, key: &str, raw: &str) -> anyhow::Result<()> {
    if !keys::ALL.contains(&key) {
        eprintln!("Note: '{key}' is not a known record key.");
    }
    vault.write(key, &parse_value(raw)).await?;
    println!("Stored '{key}' (encrypted).");
    Ok(())
}

pub async fn status(vault: &Vault) -> anyhow::Result<()> {
    // Loading the key is what reveals whether the keychain works.
    vault.key_manager().get_or_create_master_key().await?;
    let label = match vault.key_status().await {
        KeyStatus::Secure => "secure (platform keychain)",
        KeyStatus::InsecureFallback => "INSECURE fallback key (keychain unavailable)",
        KeyStatus::NotLoaded => "not loaded",
    };
    println!("Master key: {label}");

    println!("Records:");
    for key in keys::ALL {
        let state = match vault.store().get(key).await? {
            Some(raw) => StoredRecord::parse(&raw).format().to_string(),
            None => "-".to_string(),
        };
        println!("  {key:<22} {state}");
    }
    Ok(())
}

pub async fn reset(vault: &Vault, yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!("reset deletes the master key and every record; pass --yes to confirm");
    }
    let outcome = vault.reset_all().await?;
    println!("Removed {} records.", outcome.records_removed);
    if outcome.key_deleted {
        println!("Master key deleted. Existing encrypted records can no longer be read.");
    } else {
        eprintln!(
            "Warning: the keychain was unavailable, so the master key was not deleted. \
             Copies of old records may still be readable."
        );
    }
    Ok(())
}
