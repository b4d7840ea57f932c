use anyhow::{anyhow, Result};
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::info;

use crate::config::Config;
use crate::merge::MergeKind;
use crate::metadata;
use crate::scanner;

/// One cache unit as shown by the listing
#[derive(Debug, Clone)]
pub enum ListEntry {
    /// Unit whose descriptor resolved; a merge run would attempt it
    Ready {
        dir: PathBuf,
        title: String,
        collection: String,
        operation: MergeKind,
    },
    /// Unit a merge run would report as failed
    Broken { dir: PathBuf, reason: String },
}

/// Everything found by one listing pass
#[derive(Debug, Clone)]
pub struct ListReport {
    pub root: PathBuf,
    pub entries: Vec<ListEntry>,
}

impl ListReport {
    pub fn ready(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, ListEntry::Ready { .. }))
            .count()
    }

    pub fn broken(&self) -> usize {
        self.entries.len() - self.ready()
    }
}

/// Command to preview cache units without merging anything
pub struct ListCommand {
    root: PathBuf,
}

impl ListCommand {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Scan for units and resolve each descriptor. Read-only.
    pub async fn execute(&self) -> Result<ListReport> {
        if !self.root.exists() {
            return Err(anyhow!("Cache directory does not exist: {:?}", self.root));
        }

        if !self.root.is_dir() {
            return Err(anyhow!("Path is not a directory: {:?}", self.root));
        }

        let config = Config::from_env();

        info!("🔎 Scanning for cache units in: {:?}", self.root);
        let units = scanner::discover(&self.root, &config)?;

        // Descriptor parsing is independent per unit, so resolve them in
        // parallel.
        let entries: Vec<ListEntry> = units
            .par_iter()
            .map(|unit| {
                let resolved = metadata::read_metadata(&unit.dir, &config).and_then(|meta| {
                    MergeKind::for_media_type(meta.media_type).map(|operation| (meta, operation))
                });

                match resolved {
                    Ok((meta, operation)) => ListEntry::Ready {
                        dir: unit.dir.clone(),
                        title: meta.episode_title,
                        collection: meta.collection_title,
                        operation,
                    },
                    Err(e) => ListEntry::Broken {
                        dir: unit.dir.clone(),
                        reason: e.to_string(),
                    },
                }
            })
            .collect();

        info!("✅ Resolved {} cache unit(s)", entries.len());

        Ok(ListReport {
            root: self.root.clone(),
            entries,
        })
    }

    /// Print the listing to stdout
    pub fn print_report(&self, report: &ListReport) {
        println!("\n📊 Cache units in {}", report.root.display());
        println!("─────────────────────────");

        if report.entries.is_empty() {
            println!("No cache units found.");
            return;
        }

        for entry in &report.entries {
            match entry {
                ListEntry::Ready {
                    dir,
                    title,
                    collection,
                    operation,
                } => {
                    if collection.is_empty() || collection == title {
                        println!("✅ [{}] {}", operation, title);
                    } else {
                        println!("✅ [{}] {} ({})", operation, title, collection);
                    }
                    println!("   {}", dir.display());
                }
                ListEntry::Broken { dir, reason } => {
                    println!("❌ {}", reason);
                    println!("   {}", dir.display());
                }
            }
        }

        println!("\n📁 {} ready, {} broken", report.ready(), report.broken());
        if report.broken() == 0 {
            println!("✅ Every unit is ready to merge!");
        }
    }
}
