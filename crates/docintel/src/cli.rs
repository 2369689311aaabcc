use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use docintel_core::{ExportFormat, SummaryLevel};
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "docintel",
    about = "Document intelligence: extraction, summaries, comparisons and exports",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides applied on top of the environment configuration.
#[derive(Args)]
pub struct GlobalArgs {
    /// Data directory (uploads and database)
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,
    /// Database file (defaults to <data-dir>/document_intel.db)
    #[arg(long = "db", global = true)]
    pub db_path: Option<PathBuf>,
    /// Ollama base URL
    #[arg(long = "ollama-url", global = true)]
    pub ollama_url: Option<String>,
    /// Model used for generation
    #[arg(long, global = true)]
    pub model: Option<String>,
    /// Never contact the model; use deterministic fallbacks only
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload documents, extract their text and analyze them
    Ingest {
        /// File path(s) to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Version group the documents belong to
        #[arg(long)]
        group: Option<String>,
        /// Document this upload is a revision of
        #[arg(long)]
        parent: Option<Uuid>,
        /// Store and chunk only; skip auto-analysis
        #[arg(long = "no-analyze")]
        no_analyze: bool,
    },
    /// Document count and the most recent uploads
    Dashboard,
    /// List stored documents, newest first
    List,
    /// Show a document with its text, entities, analyses and versions
    Show {
        /// Document id
        id: Uuid,
    },
    /// Re-run auto-extraction for a document
    Analyze {
        /// Document id
        id: Uuid,
    },
    /// Summarize a document
    Summary {
        /// Document id
        id: Uuid,
        /// brief, detailed or bullets
        #[arg(long, default_value = "brief")]
        level: SummaryLevel,
        /// Ignore any cached summary
        #[arg(long)]
        refresh: bool,
    },
    /// Compare two documents
    Compare {
        /// Earlier document id
        left: Uuid,
        /// Later document id
        right: Uuid,
    },
    /// List the entities extracted from a document
    Entities {
        /// Document id
        id: Uuid,
    },
    /// List the stored chunks of a document
    Chunks {
        /// Document id
        id: Uuid,
    },
    /// Show the version history a document belongs to
    Versions {
        /// Document id
        id: Uuid,
    },
    /// Copy out the stored original of a document
    File {
        /// Document id
        id: Uuid,
        /// Output file or directory; raw bytes to stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete a document and its stored file
    Delete {
        /// Document id
        id: Uuid,
    },
    /// Export documents (all of them when no ids are given)
    Export {
        /// Document ids
        ids: Vec<Uuid>,
        /// json, csv or report
        #[arg(long, default_value = "json")]
        format: ExportFormat,
        /// Output file or directory; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Report generator availability and store statistics
    Health,
}
