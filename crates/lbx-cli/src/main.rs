//! lbx: lockbox secrets vault CLI
//!
//! Vault commands:
//!   init [--force]                    - create an empty vault
//!   add / get / update / rm <KEY>     - secret CRUD
//!   list                              - keys and versions, never values
//!   export / import                   - plaintext interchange (json, env)
//!   info                              - unencrypted envelope metadata
//!
//! Sync commands:
//!   sync enable | disable             - manage the vault's sync sidecar
//!   sync run [<vault>...]             - reconcile with the remote copy
//!   sync resolve <local|remote|merge> - settle a conflict explicitly
//!   sync status | versions | watch

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use lbx_core::config::{expand_tilde, LockboxConfig};
use lbx_storage::ProviderRegistry;
use lbx_sync::{
    AutoSync, ConflictResolution, Resolution, SyncConflictError, SyncEngine, SyncResult,
    VaultSyncConfig,
};
use lbx_vault::{ExportFormat, SealedVault, VaultStore};
use secrecy::{ExposeSecret, SecretString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use zeroize::Zeroizing;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "lbx",
    version,
    about = "Local-first encrypted secrets vault",
    long_about = "lbx: store credentials in an encrypted vault file and sync it with cloud storage"
)]
struct Cli {
    /// Path to lockbox.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "LBX_CONFIG",
        default_value = "~/.lockbox/config.toml"
    )]
    config: PathBuf,

    /// Vault file (overrides vault.default_path)
    #[arg(long, short = 'V', env = "LBX_VAULT", global = true)]
    vault: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides log.level
    #[arg(long, env = "LBX_LOG")]
    log: Option<String>,

    /// Log format (json, text); overrides log.format
    #[arg(long, env = "LBX_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Json,
    Env,
}

impl From<FormatArg> for ExportFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Env => ExportFormat::Env,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new, empty vault
    Init {
        /// Replace an existing vault file (its secrets are lost)
        #[arg(long)]
        force: bool,
    },

    /// Add a secret; fails if the key exists
    Add {
        key: String,
        /// Secret value (prompted without echo when omitted)
        value: Option<String>,
        #[arg(long, short = 'd')]
        description: Option<String>,
    },

    /// Print a secret's value
    Get {
        key: String,
        /// Print the full record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change a secret's value (and optionally its description)
    Update {
        key: String,
        value: Option<String>,
        #[arg(long, short = 'd')]
        description: Option<String>,
    },

    /// Delete a secret
    #[command(alias = "remove")]
    Rm { key: String },

    /// List secrets (keys and metadata, never values)
    List {
        #[arg(long)]
        json: bool,
    },

    /// Write all secrets in plaintext
    Export {
        #[arg(long, short = 'f', value_enum, default_value = "env")]
        format: FormatArg,
        /// Output file (default: stdout); created with owner-only permissions
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Import secrets from a json or env file ("-" for stdin)
    Import {
        file: PathBuf,
        #[arg(long, short = 'f', value_enum, default_value = "env")]
        format: FormatArg,
        /// Overwrite existing keys instead of skipping them
        #[arg(long)]
        overwrite: bool,
    },

    /// Show the vault's unencrypted envelope metadata (no password needed)
    Info,

    /// Cloud synchronization
    Sync {
        #[command(subcommand)]
        action: SyncCommand,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum SyncCommand {
    /// Enable sync for the vault
    Enable {
        /// Provider name (s3, azblob, fs, memory); default from sync.default_provider
        #[arg(long, short = 'p')]
        provider: Option<String>,
        /// Remote identifier of this vault
        #[arg(long)]
        vault_id: String,
        /// Provider credential as KEY=VALUE (repeatable)
        #[arg(long = "cred", value_name = "KEY=VALUE")]
        credentials: Vec<String>,
        /// manual, local-wins, remote-wins or merge; default from config
        #[arg(long)]
        conflict: Option<String>,
        /// Reconcile periodically under `lbx sync watch`
        #[arg(long)]
        auto: bool,
        /// Auto-sync interval in seconds; default from config
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Disable sync and remove the sidecar files (the remote copy is kept)
    Disable,

    /// Reconcile with the remote copy
    Run {
        /// Vault files (default: the configured vault)
        vaults: Vec<PathBuf>,
    },

    /// Resolve a sync conflict explicitly
    Resolve {
        #[arg(value_enum)]
        strategy: ResolveArg,
    },

    /// Show sync status without contacting the provider
    Status {
        #[arg(long)]
        json: bool,
    },

    /// List the remote upload history
    Versions,

    /// Auto-sync opted-in vaults until interrupted
    Watch {
        /// Vault files (default: the configured vault)
        vaults: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ResolveArg {
    Local,
    Remote,
    Merge,
}

impl From<ResolveArg> for Resolution {
    fn from(r: ResolveArg) -> Self {
        match r {
            ResolveArg::Local => Resolution::Local,
            ResolveArg::Remote => Resolution::Remote,
            ResolveArg::Merge => Resolution::Merge,
        }
    }
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = LockboxConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    let vault_path = expand_tilde(cli.vault.as_deref().unwrap_or(&config.vault.default_path));
    info!(
        version = env!("CARGO_PKG_VERSION"),
        vault = %vault_path.display(),
        "lbx starting"
    );

    match cli.command {
        Commands::Init { force } => cmd_init(&vault_path, force),
        Commands::Add { key, value, description } => {
            cmd_add(&vault_path, &key, value, description.as_deref())
        }
        Commands::Get { key, json } => cmd_get(&vault_path, &key, json),
        Commands::Update { key, value, description } => {
            cmd_update(&vault_path, &key, value, description.as_deref())
        }
        Commands::Rm { key } => cmd_rm(&vault_path, &key),
        Commands::List { json } => cmd_list(&vault_path, json),
        Commands::Export { format, output } => {
            cmd_export(&vault_path, format.into(), output.as_deref())
        }
        Commands::Import { file, format, overwrite } => {
            cmd_import(&vault_path, &file, format.into(), overwrite)
        }
        Commands::Info => cmd_info(&vault_path),
        Commands::Sync { action } => cmd_sync(&config, &vault_path, action).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so `lbx get` / `lbx export` output stays pipeable.
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Vault password from `LBX_PASSWORD`, or prompted without echo.
fn read_password(prompt: &str) -> Result<SecretString> {
    if let Ok(pw) = std::env::var("LBX_PASSWORD") {
        return Ok(SecretString::from(pw));
    }
    let pw = rpassword::prompt_password(prompt).context("reading password")?;
    Ok(SecretString::from(pw))
}

fn read_new_password() -> Result<SecretString> {
    if std::env::var_os("LBX_PASSWORD").is_some() {
        return read_password("");
    }
    let first = read_password("New vault password: ")?;
    let second = read_password("Repeat password: ")?;
    if first.expose_secret() != second.expose_secret() {
        anyhow::bail!("passwords do not match");
    }
    if first.expose_secret().is_empty() {
        anyhow::bail!("password must not be empty");
    }
    Ok(first)
}

fn read_value(key: &str, value: Option<String>) -> Result<Zeroizing<String>> {
    match value {
        Some(v) => Ok(Zeroizing::new(v)),
        None => Ok(Zeroizing::new(
            rpassword::prompt_password(format!("Value for {key}: ")).context("reading value")?,
        )),
    }
}

fn open_vault(vault_path: &Path) -> Result<VaultStore> {
    let mut store = VaultStore::new(vault_path);
    if !store.exists() {
        anyhow::bail!(
            "no vault at {} (create one with `lbx init`)",
            vault_path.display()
        );
    }
    let password = read_password("Vault password: ")?;
    store.load(&password)?;
    Ok(store)
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn fmt_time(ts: Option<chrono::DateTime<chrono::Utc>>) -> String {
    ts.map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| "never".to_string())
}

// ── Vault commands ────────────────────────────────────────────────────────────

fn cmd_init(vault_path: &Path, force: bool) -> Result<()> {
    let mut store = VaultStore::new(vault_path);
    if store.exists() && !force {
        anyhow::bail!(
            "a vault already exists at {} (use --force to replace it)",
            vault_path.display()
        );
    }
    let password = read_new_password()?;
    store
        .initialize(&password)
        .with_context(|| format!("creating vault: {}", vault_path.display()))?;
    println!("Created vault {}", vault_path.display());
    Ok(())
}

fn cmd_add(
    vault_path: &Path,
    key: &str,
    value: Option<String>,
    description: Option<&str>,
) -> Result<()> {
    let mut store = open_vault(vault_path)?;
    let value = read_value(key, value)?;
    store.add_secret(key, &value, description)?;
    println!("Added {key}");
    Ok(())
}

fn cmd_get(vault_path: &Path, key: &str, json: bool) -> Result<()> {
    let store = open_vault(vault_path)?;
    let record = store.get_secret(key)?;
    if json {
        let rendered = Zeroizing::new(serde_json::to_string_pretty(&record)?);
        println!("{}", rendered.as_str());
    } else {
        println!("{}", record.value);
    }
    Ok(())
}

fn cmd_update(
    vault_path: &Path,
    key: &str,
    value: Option<String>,
    description: Option<&str>,
) -> Result<()> {
    let mut store = open_vault(vault_path)?;
    if !store.has_secret(key)? {
        anyhow::bail!("secret not found: {key}");
    }
    let value = read_value(key, value)?;
    let version = store.update_secret(key, &value, description)?;
    println!("Updated {key} (version {version})");
    Ok(())
}

fn cmd_rm(vault_path: &Path, key: &str) -> Result<()> {
    let mut store = open_vault(vault_path)?;
    store.remove_secret(key)?;
    println!("Removed {key}");
    Ok(())
}

fn cmd_list(vault_path: &Path, json: bool) -> Result<()> {
    let store = open_vault(vault_path)?;
    let secrets = store.get_all_secrets()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&secrets)?);
        return Ok(());
    }
    if secrets.is_empty() {
        println!("(no secrets)");
        return Ok(());
    }

    let width = secrets.iter().map(|s| s.key.len()).max().unwrap_or(3).max(3);
    println!("{:<width$}  {:>7}  {:<20}  DESCRIPTION", "KEY", "VERSION", "UPDATED");
    for s in &secrets {
        println!(
            "{:<width$}  {:>7}  {:<20}  {}",
            s.key,
            s.version,
            fmt_time(Some(s.updated_at)),
            s.description.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

fn cmd_export(
    vault_path: &Path,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<()> {
    let store = open_vault(vault_path)?;
    let dump = store.export_secrets(format)?;

    match output {
        Some(path) => {
            lbx_core::fs::atomic_write_private(path, dump.as_bytes())
                .with_context(|| format!("writing export: {}", path.display()))?;
            eprintln!(
                "Exported {} secrets to {} (plaintext: handle with care)",
                store.len()?,
                path.display()
            );
        }
        None => print!("{}", dump.as_str()),
    }
    Ok(())
}

fn cmd_import(
    vault_path: &Path,
    file: &Path,
    format: ExportFormat,
    overwrite: bool,
) -> Result<()> {
    let data = if file == Path::new("-") {
        let mut buf = Zeroizing::new(String::new());
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading import data from stdin")?;
        buf
    } else {
        Zeroizing::new(
            std::fs::read_to_string(file)
                .with_context(|| format!("reading import file: {}", file.display()))?,
        )
    };

    let mut store = open_vault(vault_path)?;
    let imported = store.import_secrets(&data, format, overwrite)?;
    println!("Imported {imported} secrets");
    Ok(())
}

fn cmd_info(vault_path: &Path) -> Result<()> {
    let meta = SealedVault::read_metadata(vault_path)?;
    println!("Vault:    {}", vault_path.display());
    println!("Format:   v{}", meta.version);
    println!("Created:  {}", fmt_time(Some(meta.created_at)));
    println!("Salt:     {}…", meta.salt.get(..16).unwrap_or(meta.salt.as_str()));
    if let Ok(mtime) = lbx_core::fs::modified_at(vault_path) {
        println!("Modified: {}", fmt_time(Some(mtime)));
    }
    Ok(())
}

fn cmd_config_show(config: &LockboxConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── Sync commands ─────────────────────────────────────────────────────────────

fn sync_engine(config: &LockboxConfig) -> SyncEngine {
    let author = config
        .sync
        .author
        .clone()
        .or_else(|| std::env::var("USER").ok());
    SyncEngine::new(ProviderRegistry::with_defaults()).with_author(author)
}

async fn cmd_sync(config: &LockboxConfig, vault_path: &Path, action: SyncCommand) -> Result<()> {
    let engine = sync_engine(config);

    match action {
        SyncCommand::Enable {
            provider,
            vault_id,
            credentials,
            conflict,
            auto,
            interval,
        } => {
            let provider = provider.unwrap_or_else(|| config.sync.default_provider.clone());
            let mut cfg = VaultSyncConfig::new(provider, vault_id);
            cfg.auto_sync = auto;
            cfg.sync_interval = interval.unwrap_or(config.sync.default_interval_secs);
            cfg.conflict_resolution = conflict
                .as_deref()
                .unwrap_or(&config.sync.default_conflict_resolution)
                .parse::<ConflictResolution>()?;
            for pair in &credentials {
                let (k, v) = pair
                    .split_once('=')
                    .with_context(|| format!("credential must be KEY=VALUE, got '{pair}'"))?;
                cfg.credentials.insert(k.to_string(), v.to_string());
            }
            let summary = format!("{} → {}", cfg.provider, cfg.vault_id);
            engine.enable_sync(vault_path, cfg)?;
            println!("Sync enabled for {} ({summary})", vault_path.display());
            Ok(())
        }

        SyncCommand::Disable => {
            engine.disable_sync(vault_path)?;
            println!("Sync disabled for {}", vault_path.display());
            Ok(())
        }

        SyncCommand::Run { vaults } => {
            let vaults = if vaults.is_empty() {
                vec![vault_path.to_path_buf()]
            } else {
                vaults.iter().map(|p| expand_tilde(p)).collect()
            };

            let pb = make_spinner("sync");
            pb.set_message(format!("{} vault(s)", vaults.len()));
            let results = engine.sync_all(&vaults).await;
            pb.finish_and_clear();

            let mut failed = 0;
            for (path, result) in &results {
                if !print_sync_result(path, result) {
                    failed += 1;
                }
            }
            if failed > 0 {
                anyhow::bail!("{failed} of {} vault(s) did not sync", results.len());
            }
            Ok(())
        }

        SyncCommand::Resolve { strategy } => {
            let result = engine.resolve_conflicts(vault_path, strategy.into()).await;
            if !print_sync_result(vault_path, &Ok(result)) {
                anyhow::bail!("conflict resolution failed");
            }
            Ok(())
        }

        SyncCommand::Status { json } => {
            let status = engine.sync_status(vault_path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }
            println!("Vault:      {}", vault_path.display());
            println!("Status:     {}", status.status);
            println!("Configured: {}", status.configured);
            println!("Provider:   {}", status.provider.as_deref().unwrap_or("-"));
            println!("Last sync:  {}", fmt_time(status.last_sync));
            if let Some(err) = &status.last_error {
                println!("Last error: {err}");
            }
            Ok(())
        }

        SyncCommand::Versions => {
            let versions = engine.list_remote_versions(vault_path).await?;
            if versions.is_empty() {
                println!("(no remote versions)");
            }
            for v in versions {
                println!(
                    "{:>4}  {}  {}  {:>8} B  {}  {}",
                    v.version,
                    fmt_time(Some(v.last_modified)),
                    v.checksum.get(..12).unwrap_or(v.checksum.as_str()),
                    v.size,
                    v.author.as_deref().unwrap_or("-"),
                    v.version_id,
                );
            }
            Ok(())
        }

        SyncCommand::Watch { vaults } => {
            let vaults = if vaults.is_empty() {
                vec![vault_path.to_path_buf()]
            } else {
                vaults.iter().map(|p| expand_tilde(p)).collect()
            };

            let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
            let runner = tokio::spawn(
                AutoSync::new(Arc::new(engine), vaults).run(shutdown_tx.clone()),
            );

            tokio::signal::ctrl_c()
                .await
                .context("waiting for Ctrl-C")?;
            info!("received SIGINT, stopping auto-sync");
            let _ = shutdown_tx.send(());
            let watched = runner.await.context("auto-sync task panicked")?;
            println!("Stopped auto-sync ({watched} vault(s) watched)");
            Ok(())
        }
    }
}

/// Print one vault's outcome; returns whether it succeeded.
fn print_sync_result(path: &Path, result: &Result<SyncResult, SyncConflictError>) -> bool {
    match result {
        Ok(r) if r.success => {
            let version = r.version.map(|v| format!(" (remote v{v})")).unwrap_or_default();
            println!("{}: {}{version}", path.display(), r.action);
            true
        }
        Ok(r) => {
            println!(
                "{}: failed: {}",
                path.display(),
                r.error.as_deref().unwrap_or("unknown error")
            );
            false
        }
        Err(conflict) => {
            println!("{}: {conflict}", path.display());
            println!("  run `lbx --vault {} sync resolve <local|remote|merge>`", path.display());
            false
        }
    }
}
