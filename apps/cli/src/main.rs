//! tagfs CLI
//!
//! Thin argument-parsing shell over the core operations; every invariant
//! lives in `tagfs-core`.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tagfs_core::infra::db::entities::file;
use tagfs_core::{Config, Core};

#[derive(Parser, Debug)]
#[command(name = "tagfs", about = "Organize files with tags, browse them as a filesystem")]
struct Cli {
	/// Path to the tagfs data directory
	#[arg(long)]
	data_dir: Option<PathBuf>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Index file(s) under their canonical paths
	Add {
		paths: Vec<PathBuf>,
	},
	/// Import a directory tree, deriving tags from its hierarchy
	Import {
		path: PathBuf,
	},
	/// Remove a file from the index
	Rm {
		file: String,
	},
	/// Tag a file: `tagfs tag notes.md urgent project=tagfs`
	Tag {
		file: String,
		/// Tags, each optionally `name=value`
		tags: Vec<String>,
	},
	/// Remove tag(s) from a file
	Untag {
		file: String,
		tags: Vec<String>,
	},
	/// Put tag(s) under parent tag(s): `tagfs metatag human animal`
	Metatag {
		child: String,
		parents: Vec<String>,
	},
	/// Remove a hierarchy edge
	Unmetatag {
		child: String,
		parent: String,
	},
	/// Merge all associations of one tag into another, dropping the first
	Merge {
		src: String,
		dst: String,
	},
	/// Query files with `and` / `or` / `minus` set operators
	Query {
		terms: Vec<String>,
		/// Print full canonical paths instead of display names
		#[arg(long)]
		path: bool,
		/// Exact tag names only, no fuzzy matching
		#[arg(long)]
		exact: bool,
		/// Show how each term resolved
		#[arg(long)]
		verbose: bool,
	},
	/// List indexed entities
	Show {
		/// One of: tags, files, queries
		#[arg(default_value = "tags")]
		what: String,
		#[arg(long)]
		path: bool,
	},
	/// Show all tags of the given file(s)
	Tags {
		files: Vec<String>,
	},
	/// Show the parent tags of the given tag(s)
	Metatags {
		tags: Vec<String>,
	},
	/// Rebuild the projection tree
	Mount,
	/// Watch the projection and import roots, syncing edits back
	Daemon,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let config = match &cli.data_dir {
		Some(dir) => Config::load_from(dir)?,
		None => Config::load()?,
	};
	let _log_guard = tagfs_core::init_logging(&config.log_dir());

	let core = Core::new(config).await?;

	match cli.command {
		Commands::Add { paths } => {
			let mut added = 0;
			for path in paths {
				let path = std::fs::canonicalize(&path)
					.with_context(|| format!("No such file: {}", path.display()))?;
				core.store.add_file(&path).await?;
				added += 1;
			}
			println!("Added {added} file(s)");
			core.project().await?;
		}

		Commands::Import { path } => {
			let path = std::fs::canonicalize(&path)?;
			let summary = core.importer()?.import_root(&path).await?;
			println!(
				"Imported {} file(s), skipped {}",
				summary.files, summary.skipped
			);
			core.project().await?;
		}

		Commands::Rm { file } => {
			let file = resolve_file(&core, &file).await?;
			core.store.remove_file(file.id).await?;
			println!("Removed {}", file.name);
			core.project().await?;
		}

		Commands::Tag { file, tags } => {
			let file = resolve_file(&core, &file).await?;
			for spec in &tags {
				let (name, value) = split_tag_spec(spec);
				core.store.tag(file.id, name, value).await?;
			}
			println!("Tagged {} with {} tag(s)", file.name, tags.len());
			core.project().await?;
		}

		Commands::Untag { file, tags } => {
			let file = resolve_file(&core, &file).await?;
			for name in &tags {
				core.store.untag(file.id, name).await?;
			}
			core.project().await?;
		}

		Commands::Metatag { child, parents } => {
			for parent in &parents {
				core.store.metatag(&child, parent).await?;
			}
			core.project().await?;
		}

		Commands::Unmetatag { child, parent } => {
			core.store.unmetatag(&child, &parent).await?;
			core.project().await?;
		}

		Commands::Merge { src, dst } => {
			core.store.merge_tag(&src, &dst).await?;
			println!("Merged {src} into {dst}");
			core.project().await?;
		}

		Commands::Query {
			terms,
			path,
			exact,
			verbose,
		} => {
			let mut options = core.query_options();
			if exact {
				options.fuzzy = false;
			}
			let evaluator =
				tagfs_core::QueryEvaluator::with_options(&core.store, options);
			let (files, diagnostics) = evaluator.evaluate_files(&terms.join(" ")).await?;

			if verbose {
				for d in &diagnostics {
					match (&d.resolved, &d.attempted) {
						(Some(name), _) => {
							eprintln!("term '{}' -> tag '{}' ({} file(s))", d.term, name, d.matched)
						}
						(None, Some(attempt)) => eprintln!(
							"term '{}' -> no tag (closest: '{}', score {:.2})",
							d.term, attempt.name, attempt.score
						),
						(None, None) => eprintln!("term '{}' -> no tag", d.term),
					}
				}
			}

			for f in files {
				println!("{}", if path { &f.path } else { &f.name });
			}
		}

		Commands::Show { what, path } => match what.as_str() {
			"files" => {
				for f in core.store.files().await? {
					println!("{}", if path { &f.path } else { &f.name });
				}
			}
			"queries" => {
				for q in core.store.saved_queries().await? {
					println!("{} ({} file(s))", q.name, q.result_ids().len());
				}
			}
			_ => {
				for t in core.store.tags().await? {
					println!("{}", t.name);
				}
			}
		},

		Commands::Tags { files } => {
			let mut names = std::collections::BTreeSet::new();
			for file in &files {
				let file = resolve_file(&core, file).await?;
				for (tag, value) in core.store.tags_of_file(file.id).await? {
					names.insert(match value {
						Some(v) => format!("{}={v}", tag.name),
						None => tag.name,
					});
				}
			}
			for name in names {
				println!("{name}");
			}
		}

		Commands::Metatags { tags } => {
			let mut names = std::collections::BTreeSet::new();
			for tag in &tags {
				for parent in core.store.metatags_of(tag).await? {
					names.insert(parent.name);
				}
			}
			for name in names {
				println!("{name}");
			}
		}

		Commands::Mount => {
			let summary = core.project().await?;
			println!(
				"Projection at {}: {} created, {} removed, {} unchanged",
				core.projection.root().display(),
				summary.created,
				summary.removed,
				summary.unchanged
			);
		}

		Commands::Daemon => {
			println!(
				"Watching {} (and {} import root(s)); Ctrl-C to stop",
				core.projection.root().display(),
				core.config.import_roots.len()
			);
			let daemon = core.start_daemon(None, None).await?;
			tokio::signal::ctrl_c().await?;
			daemon.shutdown().await;
		}
	}

	Ok(())
}

/// Resolve a user-supplied file reference: an existing path first, then an
/// indexed canonical path, then a display name.
async fn resolve_file(core: &Arc<Core>, reference: &str) -> Result<file::Model> {
	if let Ok(canonical) = std::fs::canonicalize(reference) {
		if let Some(found) = core.store.file_by_path(&canonical).await? {
			return Ok(found);
		}
	}

	if let Some(found) = core.store.file_by_path(std::path::Path::new(reference)).await? {
		return Ok(found);
	}

	if let Some(found) = core.store.file_by_name(reference).await? {
		return Ok(found);
	}

	bail!("No indexed file matches '{reference}'");
}

fn split_tag_spec(spec: &str) -> (&str, Option<&str>) {
	match spec.split_once('=') {
		Some((name, value)) if !name.is_empty() => (name, Some(value)),
		_ => (spec, None),
	}
}
