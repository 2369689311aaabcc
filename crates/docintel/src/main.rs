mod cli;

use std::env;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use docintel_core::{
    AppConfig, DocumentIntelligence, DocumentPipeline, ExportFile, Generator, IngestOptions,
    OfflineGenerator, OllamaClient, Storage, StoredFile,
};
use serde::Serialize;
use serde_json::json;

use crate::cli::{Cli, Commands, GlobalArgs};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let pipeline = open_pipeline(&cli.global).await?;

    let outcome = dispatch(cli.command, &pipeline).await;
    pipeline.storage().close().await;
    outcome
}

fn load_config(global: &GlobalArgs) -> AppConfig {
    let mut config = AppConfig::from_env();

    if let Some(dir) = &global.data_dir {
        let relocated = AppConfig::with_data_dir(dir);
        let db_from_env = env::var("DOC_INTEL_DB_PATH").is_ok_and(|v| !v.trim().is_empty());
        if !db_from_env {
            config.db_path = relocated.db_path;
        }
        config.data_dir = relocated.data_dir;
    }
    if let Some(db) = &global.db_path {
        config.db_path.clone_from(db);
    }
    if let Some(url) = &global.ollama_url {
        config.generation.base_url.clone_from(url);
    }
    if let Some(model) = &global.model {
        config.generation.model.clone_from(model);
    }

    config
}

async fn open_pipeline(global: &GlobalArgs) -> Result<DocumentPipeline> {
    let config = load_config(global);
    config
        .ensure_dirs()
        .with_context(|| format!("cannot create data directory {}", config.data_dir.display()))?;

    let chunker = config.chunker()?;
    let storage = Storage::open(&config.db_path)
        .await
        .with_context(|| format!("cannot open database {}", config.db_path.display()))?;

    let generator: Arc<dyn Generator> = if global.offline {
        Arc::new(OfflineGenerator)
    } else {
        Arc::new(OllamaClient::new(&config.generation)?)
    };
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        model = generator.model(),
        offline = global.offline,
        "pipeline ready"
    );

    let intelligence =
        DocumentIntelligence::new(generator).with_max_context_chars(config.max_context_chars);
    Ok(DocumentPipeline::new(storage, intelligence, config).with_chunker(chunker))
}

async fn dispatch(command: Commands, pipeline: &DocumentPipeline) -> Result<()> {
    match command {
        Commands::Ingest {
            paths,
            group,
            parent,
            no_analyze,
        } => {
            let mut options = IngestOptions::default().with_auto_analyze(!no_analyze);
            if let Some(group) = group {
                options = options.with_version_group(group);
            }
            if let Some(parent) = parent {
                options = options.with_parent(parent);
            }

            let mut outputs = Vec::with_capacity(paths.len());
            for path in &paths {
                let output = pipeline
                    .ingest_file(path, options.clone())
                    .await
                    .with_context(|| format!("failed to ingest {}", path.display()))?;
                outputs.push(output);
            }
            print_json(&outputs)
        }
        Commands::Dashboard => print_json(&pipeline.dashboard().await?),
        Commands::List => print_json(&pipeline.list_documents().await?),
        Commands::Show { id } => print_json(&pipeline.document_detail(id).await?),
        Commands::Analyze { id } => print_json(&pipeline.analyze(id).await?),
        Commands::Summary { id, level, refresh } => {
            print_json(&pipeline.summary(id, level, refresh).await?)
        }
        Commands::Compare { left, right } => print_json(&pipeline.compare(left, right).await?),
        Commands::Entities { id } => print_json(&pipeline.entities(id).await?),
        Commands::Chunks { id } => print_json(&pipeline.chunks(id).await?),
        Commands::Versions { id } => print_json(&pipeline.versions(id).await?),
        Commands::File { id, out } => {
            let file = pipeline.document_file(id).await?;
            match out {
                Some(out) => write_original(&file, &out),
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&file.content)?;
                    stdout.flush()?;
                    Ok(())
                }
            }
        }
        Commands::Delete { id } => {
            pipeline.delete_document(id).await?;
            print_json(&json!({ "deleted": id }))
        }
        Commands::Export { ids, format, out } => {
            let file = pipeline.export(&ids, format).await?;
            match out {
                Some(out) => write_export(&file, &out),
                None => {
                    print!("{}", file.content);
                    Ok(())
                }
            }
        }
        Commands::Health => print_json(&pipeline.health().await?),
    }
}

/// Writes into `out`, or into `out/<generated name>` when `out` is a directory.
fn write_export(file: &ExportFile, out: &Path) -> Result<()> {
    let target = if out.is_dir() {
        out.join(&file.filename)
    } else {
        out.to_path_buf()
    };
    std::fs::write(&target, &file.content)
        .with_context(|| format!("cannot write {}", target.display()))?;

    print_json(&json!({
        "path": target,
        "media_type": file.media_type,
    }))
}

/// Writes into `out`, or into `out/<original filename>` when `out` is a directory.
fn write_original(file: &StoredFile, out: &Path) -> Result<()> {
    let target = if out.is_dir() {
        out.join(&file.filename)
    } else {
        out.to_path_buf()
    };
    std::fs::write(&target, &file.content)
        .with_context(|| format!("cannot write {}", target.display()))?;

    print_json(&json!({
        "path": target,
        "filename": file.filename,
        "media_type": file.media_type,
    }))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
