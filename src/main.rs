//! # Virtual TA retrieval CLI
//!
//! Builds the course-material vector index and queries it.
//!
//! Usage:
//!   vta init                              # Write ~/.vta/config.toml
//!   vta ingest                            # Append res/ to the index
//!   vta ingest --root notes/ --fresh      # Rebuild from scratch
//!   vta search "How do I submit GA4?"     # Ranked excerpts
//!   vta search "..." --prompt             # Rendered grounding prompt
//!   vta stats                             # Index summary

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vta_core::{Embedder, VtaConfig};
use vta_knowledge::prompt::{NO_CONTEXT_ANSWER, augment_query, build_prompt};
use vta_knowledge::{Cl100kTokenizer, IngestPipeline, Retriever, SharedIndex, TokenChunker, VectorIndex};

#[derive(Parser)]
#[command(name = "vta", version, about = "📚 Virtual TA — course material retrieval")]
struct Cli {
    /// Config file (default: ~/.vta/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Chunk, embed and index a document tree
    Ingest {
        /// Document root (default: ingest.root)
        #[arg(long)]
        root: Option<String>,

        /// Start from an empty index instead of appending
        #[arg(long)]
        fresh: bool,
    },
    /// Retrieve excerpts for a question
    Search {
        question: String,

        /// Hits per query variant (default: index.top_k)
        #[arg(short, long)]
        k: Option<usize>,

        /// Extra text extracted from an attachment, searched as a second variant
        #[arg(long)]
        extra: Option<String>,

        /// Print the grounding prompt instead of the excerpts
        #[arg(long)]
        prompt: bool,
    },
    /// Show index statistics
    Stats,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(VtaConfig::default_path)
}

fn load_config(cli: &Cli) -> Result<VtaConfig> {
    let config = match &cli.config {
        Some(p) => VtaConfig::load_from(&expand_path(p))?,
        None => VtaConfig::load()?,
    };
    Ok(config)
}

fn index_paths(config: &VtaConfig) -> (PathBuf, PathBuf) {
    (
        expand_path(&config.index.index_path),
        expand_path(&config.index.metadata_path),
    )
}

fn open_index(config: &VtaConfig) -> Result<VectorIndex> {
    let (index_path, meta_path) = index_paths(config);
    Ok(VectorIndex::open(
        config.embedding.dimensions,
        config.index.similarity_threshold,
        &index_path,
        &meta_path,
    )?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "vta=debug,vta_knowledge=debug,vta_providers=debug"
    } else {
        "vta=info,vta_knowledge=info,vta_providers=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    match &cli.command {
        Command::Init { force } => init(&config_path(&cli), *force),
        Command::Ingest { root, fresh } => ingest(&load_config(&cli)?, root.as_deref(), *fresh).await,
        Command::Search {
            question,
            k,
            extra,
            prompt,
        } => search(&load_config(&cli)?, question, *k, extra.as_deref(), *prompt).await,
        Command::Stats => stats(&load_config(&cli)?),
    }
}

fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("⚠️  {} already exists (use --force to overwrite).", path.display());
        return Ok(());
    }
    VtaConfig::default().save_to(path)?;
    println!("✅ Wrote default config to {}", path.display());
    Ok(())
}

async fn ingest(config: &VtaConfig, root: Option<&str>, fresh: bool) -> Result<()> {
    let root = expand_path(root.unwrap_or(config.ingest.root.as_str()));
    let (index_path, meta_path) = index_paths(config);

    let embedder: Arc<dyn Embedder> = Arc::from(vta_providers::create_embedder(config)?);
    let chunker = TokenChunker::new(
        Arc::new(Cl100kTokenizer::new()?),
        config.chunking.max_tokens,
        config.chunking.overlap,
    )?;
    let pipeline = IngestPipeline::from_config(config, chunker, embedder)?;

    // A damaged pair is an error here; the save below would replace it.
    let mut index = if fresh {
        VectorIndex::new(config.embedding.dimensions, config.index.similarity_threshold)?
    } else {
        VectorIndex::load_or_new(
            config.embedding.dimensions,
            config.index.similarity_threshold,
            &index_path,
            &meta_path,
        )
        .with_context(|| {
            format!(
                "cannot append to {} / {}; repair the files or rerun with --fresh",
                index_path.display(),
                meta_path.display()
            )
        })?
    };
    if !index.is_empty() {
        tracing::warn!(
            "Appending to an index with {} vectors; documents already indexed will be duplicated",
            index.len()
        );
    }

    let report = pipeline
        .ingest(&root, &mut index, &index_path, &meta_path)
        .await
        .with_context(|| format!("ingesting {}", root.display()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn search(
    config: &VtaConfig,
    question: &str,
    k: Option<usize>,
    extra: Option<&str>,
    show_prompt: bool,
) -> Result<()> {
    let index = SharedIndex::new(open_index(config)?);
    let embedder: Arc<dyn Embedder> = Arc::from(vta_providers::create_embedder(config)?);
    let retriever = Retriever::new(embedder, index);

    let augmented = augment_query(question, extra);
    let mut variants = vec![augmented.as_str()];
    if augmented != question {
        variants.push(question);
    }

    let k = k.unwrap_or(config.index.top_k);
    let excerpts = retriever.retrieve(&variants, k).await?;
    if excerpts.is_empty() {
        println!("{NO_CONTEXT_ANSWER}");
        return Ok(());
    }

    if show_prompt {
        println!("{}", build_prompt(&excerpts, &augmented));
    } else {
        println!("{}", serde_json::to_string_pretty(&excerpts)?);
    }
    Ok(())
}

fn stats(config: &VtaConfig) -> Result<()> {
    let index = open_index(config)?;
    let sources: HashSet<&str> = index
        .entries()
        .iter()
        .map(|e| e.metadata.source.as_str())
        .collect();
    println!("📚 Virtual TA index");
    println!("   Vectors:    {}", index.len());
    println!("   Dimension:  {}", index.embed_dim());
    println!("   Threshold:  {}", index.similarity_threshold());
    println!("   Sources:    {}", sources.len());
    Ok(())
}
