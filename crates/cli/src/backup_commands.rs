use std::path::{Path, PathBuf};

use {
    solace_config::SolaceConfig,
    solace_vault::{ImportOutcome, PlainExportConsent},
};

use crate::context::Vault;

/// Flags for `solace export`.
#[derive(clap::Args)]
pub struct ExportArgs {
    /// Destination file (defaults to the configured export directory).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Write the backup without encryption.
    #[arg(long)]
    pub plain: bool,
    /// First confirmation for --plain: the file will be readable by anyone.
    #[arg(long, requires = "plain")]
    pub i_understand_unencrypted: bool,
    /// Second confirmation for --plain.
    #[arg(long, requires = "plain")]
    pub confirm_plain: bool,
}

/// Default file name for an export made today.
pub fn default_file_name(today: chrono::NaiveDate) -> String {
    format!("solace-backup-{}.json", today.format("%Y-%m-%d"))
}

/// Pick the password from the flag/env first, then the config file.
pub fn resolve_password<'a>(flag: Option<&'a str>, config: &'a SolaceConfig) -> Option<&'a str> {
    flag.or_else(|| config.backup.resolved_password())
}

pub async fn export(
    vault: &Vault,
    config: &SolaceConfig,
    args: ExportArgs,
    password: Option<&str>,
) -> anyhow::Result<()> {
    let snapshot = vault.snapshot().await?;

    let bytes = if args.plain {
        let mut consent = PlainExportConsent::new();
        if args.i_understand_unencrypted {
            consent = consent.acknowledge_unencrypted();
        }
        if args.confirm_plain {
            consent = consent.confirm_again();
        }
        if !consent.is_complete() {
            eprintln!(
                "A plain export is readable by anyone who gets the file.\n\
                 Re-run with --i-understand-unencrypted --confirm-plain to continue."
            );
        }
        vault.export_plain(&snapshot, consent).await?
    } else {
        let Some(password) = password else {
            anyhow::bail!(
                "an export password is required (--password or SOLACE_BACKUP_PASSWORD)"
            );
        };
        vault.export_encrypted(&snapshot, password).await?
    };

    let path = args.output.unwrap_or_else(|| {
        config
            .backup
            .export_path(&default_file_name(chrono::Local::now().date_naive()))
    });
    write_file(&path, &bytes)?;

    let kind = if args.plain {
        "UNENCRYPTED"
    } else {
        "encrypted"
    };
    println!("Wrote {kind} backup to {}", path.display());
    Ok(())
}

pub async fn import(vault: &Vault, file: &Path, password: Option<&str>) -> anyhow::Result<()> {
    let bytes = std::fs::read(file)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", file.display()))?;

    match vault.import_file(&bytes, password).await? {
        ImportOutcome::Restored(snapshot) => {
            let entries = snapshot.emotion_history.as_ref().map_or(0, Vec::len);
            let sessions = snapshot.chat_sessions.as_ref().map_or(0, Vec::len);
            println!(
                "Restored {entries} journal entries and {sessions} chat sessions from {}",
                file.display()
            );
            Ok(())
        },
        ImportOutcome::PasswordRequired => anyhow::bail!(
            "{} is encrypted; pass --password or set SOLACE_BACKUP_PASSWORD",
            file.display()
        ),
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))
}
