//! Directory import
//!
//! Walks an import root and feeds `(source path, tag hierarchy)` pairs into
//! the store: every path segment below the root becomes a tag on the file,
//! and consecutive segments are chained with metatag edges. Hidden path
//! segments and ignore-list matches are skipped.

use crate::store::{TagStore, TagStoreError};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ImportError {
	#[error(transparent)]
	Store(#[from] TagStoreError),

	#[error("I/O error at {path}: {source}")]
	Io {
		path: PathBuf,
		source: std::io::Error,
	},

	#[error("Invalid ignore pattern: {0}")]
	IgnorePattern(#[from] globset::Error),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImportSummary {
	pub files: usize,
	pub skipped: usize,
}

/// Recursive importer with an ignore list.
pub struct Importer {
	store: Arc<TagStore>,
	ignore: GlobSet,
}

impl Importer {
	pub fn new(store: Arc<TagStore>, ignore_patterns: &[String]) -> Result<Self, ImportError> {
		let mut builder = GlobSetBuilder::new();
		for pattern in ignore_patterns {
			builder.add(Glob::new(pattern)?);
		}

		Ok(Self {
			store,
			ignore: builder.build()?,
		})
	}

	/// Import everything under `root`.
	pub async fn import_root(&self, root: &Path) -> Result<ImportSummary, ImportError> {
		self.import_tree(root, root).await
	}

	/// Import the subtree at `start`, tagging relative to `import_root`.
	pub async fn import_tree(
		&self,
		import_root: &Path,
		start: &Path,
	) -> Result<ImportSummary, ImportError> {
		let mut summary = ImportSummary::default();
		let mut pending = vec![start.to_path_buf()];

		while let Some(dir) = pending.pop() {
			let mut entries = fs::read_dir(&dir).await.map_err(|source| ImportError::Io {
				path: dir.clone(),
				source,
			})?;

			while let Some(entry) = entries
				.next_entry()
				.await
				.map_err(|source| ImportError::Io {
					path: dir.clone(),
					source,
				})? {
				let path = entry.path();
				let name = entry.file_name().to_string_lossy().to_string();

				if name.starts_with('.') || self.ignore.is_match(&name) {
					debug!(path = %path.display(), "Skipping ignored entry");
					summary.skipped += 1;
					continue;
				}

				let file_type = entry.file_type().await.map_err(|source| ImportError::Io {
					path: path.clone(),
					source,
				})?;

				if file_type.is_dir() {
					pending.push(path);
				} else if file_type.is_file() {
					self.import_file(import_root, &path).await?;
					summary.files += 1;
				}
				// symlinks inside import roots are not followed
			}
		}

		info!(
			root = %import_root.display(),
			files = summary.files,
			skipped = summary.skipped,
			"Import finished"
		);

		Ok(summary)
	}

	/// Whether any path segment below the import root is hidden or matches
	/// the ignore list.
	pub fn is_ignored(&self, import_root: &Path, path: &Path) -> bool {
		let Ok(relative) = path.strip_prefix(import_root) else {
			return false;
		};

		relative.components().any(|component| {
			let segment = component.as_os_str().to_string_lossy();
			segment.starts_with('.') || self.ignore.is_match(segment.as_ref())
		})
	}

	/// Import a single file, deriving its tag hierarchy from the path
	/// segments between `import_root` and the file.
	pub async fn import_file(&self, import_root: &Path, path: &Path) -> Result<(), ImportError> {
		let tags = hierarchy_tags(import_root, path);

		let file = self.store.add_file(path).await?;
		for tag in &tags {
			self.store.tag(file.id, tag, None).await?;
		}

		// Chain the hierarchy: each segment becomes a child of the one above
		for pair in tags.windows(2) {
			match self.store.metatag(&pair[1], &pair[0]).await {
				Ok(()) => {}
				Err(TagStoreError::CycleDetected { child, parent }) => {
					warn!(%child, %parent, "Skipping import metatag edge that would close a cycle");
				}
				Err(e) => return Err(e.into()),
			}
		}

		Ok(())
	}
}

/// Directory segments between the import root and the file, in hierarchy
/// order (topmost first).
pub fn hierarchy_tags(import_root: &Path, path: &Path) -> Vec<String> {
	path.parent()
		.and_then(|parent| parent.strip_prefix(import_root).ok())
		.map(|relative| {
			relative
				.components()
				.map(|c| c.as_os_str().to_string_lossy().to_string())
				.filter(|segment| !segment.is_empty())
				.collect()
		})
		.unwrap_or_default()
}
