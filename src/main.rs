//! Relingo command-line front end
//!
//! Thin wrapper over the translation service: loads configuration, wires the
//! registry and file storage together, and runs one subcommand.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use relingo::cli::{Args, CacheAction, Commands};
use relingo::config::Config;
use relingo::{
    BackendRegistry, BackendType, BatchStatus, FileStorage, LanguageCode, TranslationRequest,
    TranslationService, detect_language,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };
    config.apply_env_overrides();

    // Commands that never touch the service
    match &args.command {
        Commands::InitConfig { path, force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists, pass --force to overwrite", path.display());
            }
            Config::default().save_to_file(path)?;
            println!("Wrote default configuration to {}", path.display());
            return Ok(());
        }
        Commands::Detect { text } => {
            let language = detect_language(text);
            println!("{} ({})", language.code(), language.name());
            return Ok(());
        }
        _ => {}
    }

    let registry = Arc::new(BackendRegistry::with_builtin_backends());
    let storage = Arc::new(FileStorage::new(&config.service.data_dir));
    let service = TranslationService::new(config.clone(), registry.clone(), storage);
    service.initialize().await?;

    let outcome = run(&service, args.command).await;
    service.destroy().await;
    outcome
}

async fn run(service: &TranslationService, command: Commands) -> Result<()> {
    match command {
        Commands::Translate { text, to, from, backend } => {
            let request = TranslationRequest::new(
                text,
                from.parse::<LanguageCode>()?,
                to.parse::<LanguageCode>()?,
                backend.parse::<BackendType>()?,
            );
            let response = service.translate_text(request).await;
            if !response.is_success() {
                anyhow::bail!(
                    "Translation failed [{}]: {}",
                    response.error_code.map(|c| c.to_string()).unwrap_or_default(),
                    response.error.unwrap_or_default()
                );
            }
            println!("{}", response.translated_text);
        }
        Commands::Batch { input, to, from, backend, output } => {
            let content = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let texts: Vec<String> = content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
            if texts.is_empty() {
                anyhow::bail!("{} contains no text to translate", input.display());
            }

            let task_id = service.start_batch_translation(
                texts,
                from.parse()?,
                to.parse()?,
                backend.parse()?,
            );
            let task = follow_batch(service, &task_id).await?;

            let lines: Vec<&str> = task
                .results
                .iter()
                .map(|r| if r.is_success() { r.translated_text.as_str() } else { "" })
                .collect();
            match output {
                Some(path) => {
                    tokio::fs::write(&path, lines.join("\n")).await?;
                    info!("Wrote {} translations to {}", lines.len(), path.display());
                }
                None => println!("{}", lines.join("\n")),
            }

            for error in &task.errors {
                match error.index {
                    Some(index) => warn!("Line {}: {}", index + 1, error.message),
                    None => warn!("{}", error.message),
                }
            }
            if task.status == BatchStatus::Failed {
                anyhow::bail!("Batch {} failed", task.id);
            }
        }
        Commands::History { limit, clear } => {
            if clear {
                service.clear_history().await;
                println!("History cleared.");
                return Ok(());
            }
            let entries = service.history(limit);
            if entries.is_empty() {
                println!("No translation history.");
            }
            for entry in entries {
                println!(
                    "{} [{} -> {}] {} => {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.source_lang,
                    entry.target_lang,
                    entry.original_text,
                    entry.translated_text
                );
            }
        }
        Commands::Cache { action } => match action {
            CacheAction::Info => println!("{} cached translations", service.cache_len()),
            CacheAction::Clear => {
                service.clear_cache().await;
                println!("Cache cleared.");
            }
        },
        Commands::Backends { check } => {
            let settings = service.settings();
            println!("{:<10} {:<12} {:<10} {}", "Type", "Name", "Enabled", "Description");
            println!("{}", "-".repeat(80));
            for info in service.registry().registered_backends() {
                let enabled = settings.backends.get(info.backend_type).enabled();
                println!(
                    "{:<10} {:<12} {:<10} {}",
                    info.backend_type, info.display_name, enabled, info.description
                );
                if check && enabled {
                    let config = settings.backends.get(info.backend_type);
                    match service.registry().create_instance(info.backend_type, config, None).await {
                        Ok(_) => {}
                        Err(e) => warn!("Could not create {} instance: {}", info.backend_type, e),
                    }
                }
            }
            if check {
                let available = service.registry().get_available_instances().await;
                println!("\nAvailable instances: {}", available.len());
                for (id, core) in available {
                    println!("  {} ({})", id, core.display_name());
                }
            }
        }
        Commands::InitConfig { .. } | Commands::Detect { .. } => {}
    }

    Ok(())
}

/// Poll a batch task, mirroring its progress on a terminal bar
async fn follow_batch(service: &TranslationService, task_id: &str) -> Result<relingo::BatchTask> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("#>-"),
    );

    let interval = Duration::from_millis(service.settings().service.batch_poll_interval_ms.max(1));
    loop {
        let task = service
            .get_batch_progress(task_id)
            .with_context(|| format!("Batch task {} disappeared", task_id))?;
        pb.set_position(u64::from(task.progress));
        pb.set_message(format!("{}/{} chunks", task.results.len(), task.texts.len()));

        if task.is_terminal() {
            pb.finish_with_message(format!("{} chunks, {} failed", task.results.len(), task.failed_count()));
            return Ok(task);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".relingo").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotation; the guard must outlive the program
    let file_appender = rolling::daily(&log_dir, "relingo.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console output goes to stderr so translations on stdout stay pipeable
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("relingo.log").display()
    );

    Ok(())
}
