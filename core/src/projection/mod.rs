//! Projection builder
//!
//! Renders the authoritative tag graph as a directory tree of symlinks:
//! one directory per tag, saved-query directories under `Queries`, the
//! semantic-search roots, and one folder per file-type group. The
//! projection is derived state; rebuilding is always safe, idempotent,
//! and touches only the difference against the last-known-good snapshot
//! so the watcher is not flooded with churn.

use crate::filetype::FileTypeGroup;
use crate::infra::db::entities::file;
use crate::query::codec;
use crate::store::{TagStore, TagStoreError};

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub mod snapshot;

pub use snapshot::{ChangeKind, EntryKind, ProjectionState, Snapshot};

/// Saved-query directories live here.
pub const QUERIES_DIR: &str = "Queries";
/// Directories created here are handed to the embedding index (text).
pub const SEARCH_TEXTS_DIR: &str = "Search Texts";
/// Directories created here are handed to the embedding index (images).
pub const SEARCH_IMAGES_DIR: &str = "Search Images";

#[derive(Error, Debug)]
pub enum ProjectionError {
	#[error(transparent)]
	Store(#[from] TagStoreError),

	#[error("I/O error at {path}: {source}")]
	Io {
		path: PathBuf,
		source: std::io::Error,
	},
}

/// Counters for one rebuild pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct RebuildSummary {
	pub created: usize,
	pub removed: usize,
	pub unchanged: usize,
	pub conflicts: usize,
}

/// Root entries the projection reserves for itself; a tag with one of
/// these names is never materialized.
pub fn is_reserved_name(name: &str) -> bool {
	name.eq_ignore_ascii_case(QUERIES_DIR)
		|| name.eq_ignore_ascii_case(SEARCH_TEXTS_DIR)
		|| name.eq_ignore_ascii_case(SEARCH_IMAGES_DIR)
		|| FileTypeGroup::is_group_name(name)
}

/// Rebuilds the symlink tree from current store state.
pub struct ProjectionBuilder {
	store: Arc<TagStore>,
	root: PathBuf,
	state: Arc<Mutex<ProjectionState>>,
}

impl ProjectionBuilder {
	pub fn new(store: Arc<TagStore>, root: PathBuf) -> Self {
		Self {
			store,
			root,
			state: Arc::new(Mutex::new(ProjectionState::default())),
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Shared snapshot + journal, consumed by the sync daemon.
	pub fn state(&self) -> Arc<Mutex<ProjectionState>> {
		Arc::clone(&self.state)
	}

	/// Bring the tree under the projection root in line with the store.
	pub async fn rebuild(&self) -> Result<RebuildSummary, ProjectionError> {
		let (desired, reserved_conflicts) = self.desired_tree().await?;

		let mut state = self.state.lock().await;
		let previous = state.snapshot().clone();

		let mut summary = RebuildSummary {
			conflicts: reserved_conflicts,
			..Default::default()
		};

		fs::create_dir_all(&self.root)
			.await
			.map_err(|source| ProjectionError::Io {
				path: self.root.clone(),
				source,
			})?;

		// Stale entries: owned previously, no longer justified. Symlinks
		// first, then directories deepest-first so they are empty by the
		// time we get to them.
		let mut stale: Vec<(&PathBuf, &EntryKind)> = previous
			.iter()
			.filter(|(path, _)| !desired.contains_key(*path))
			.collect();
		stale.sort_by_key(|(path, kind)| {
			(
				matches!(kind, EntryKind::Directory),
				std::cmp::Reverse(path.components().count()),
			)
		});

		for (path, kind) in stale {
			match kind {
				EntryKind::Symlink(_) => match fs::symlink_metadata(path).await {
					Ok(meta) if meta.file_type().is_symlink() => {
						fs::remove_file(path)
							.await
							.map_err(|source| ProjectionError::Io {
								path: path.clone(),
								source,
							})?;
						state.record(path.clone(), ChangeKind::Removed);
						summary.removed += 1;
					}
					Ok(_) => {
						warn!(path = %path.display(), "Projection conflict: expected symlink, found foreign entry; leaving it");
						summary.conflicts += 1;
					}
					Err(_) => {} // already gone, nothing to undo
				},
				EntryKind::Directory => match fs::remove_dir(path).await {
					Ok(()) => {
						state.record(path.clone(), ChangeKind::Removed);
						summary.removed += 1;
					}
					Err(e) if e.kind() == ErrorKind::NotFound => {}
					Err(_) => {
						warn!(path = %path.display(), "Projection conflict: stale directory not empty; leaving it");
						summary.conflicts += 1;
					}
				},
			}
		}

		// Desired entries: BTreeMap order puts parents before children, so
		// directories exist before their symlinks are created.
		let mut confirmed = Snapshot::new();
		for (path, kind) in &desired {
			match fs::symlink_metadata(path).await {
				Ok(meta) => {
					let intact = match kind {
						EntryKind::Directory => meta.is_dir(),
						EntryKind::Symlink(target) => {
							meta.file_type().is_symlink()
								&& fs::read_link(path).await.ok().as_deref()
									== Some(target.as_path())
						}
					};
					if intact {
						confirmed.insert(path.clone(), kind.clone());
						summary.unchanged += 1;
					} else {
						warn!(path = %path.display(), "Projection conflict: entry exists but is not owned by the projection; skipping");
						summary.conflicts += 1;
					}
				}
				Err(_) => match kind {
					EntryKind::Directory => {
						fs::create_dir_all(path)
							.await
							.map_err(|source| ProjectionError::Io {
								path: path.clone(),
								source,
							})?;
						state.record(path.clone(), ChangeKind::Created);
						confirmed.insert(path.clone(), kind.clone());
						summary.created += 1;
					}
					EntryKind::Symlink(target) => match create_symlink(target, path).await {
						Ok(()) => {
							state.record(path.clone(), ChangeKind::Created);
							confirmed.insert(path.clone(), kind.clone());
							summary.created += 1;
						}
						Err(e) => {
							warn!(path = %path.display(), error = %e, "Failed to create symlink; skipping");
							summary.conflicts += 1;
						}
					},
				},
			}
		}

		state.set_snapshot(confirmed);

		info!(
			created = summary.created,
			removed = summary.removed,
			unchanged = summary.unchanged,
			conflicts = summary.conflicts,
			root = %self.root.display(),
			"Projection rebuilt"
		);

		Ok(summary)
	}

	/// Compute the full tree the projection should consist of.
	async fn desired_tree(&self) -> Result<(Snapshot, usize), ProjectionError> {
		let mut desired = Snapshot::new();
		let mut reserved_conflicts = 0;

		for fixed in [QUERIES_DIR, SEARCH_TEXTS_DIR, SEARCH_IMAGES_DIR] {
			desired.insert(self.root.join(fixed), EntryKind::Directory);
		}

		let files = self.store.files().await?;

		// File-type-group folders: extension classification, independent of
		// tags.
		for group in FileTypeGroup::all() {
			let dir = self.root.join(group.name());
			desired.insert(dir.clone(), EntryKind::Directory);

			let members = files.iter().filter(|f| {
				f.extension()
					.and_then(|ext| FileTypeGroup::from_extension(&ext))
					== Some(group)
			});
			insert_links(&mut desired, &dir, members);
		}

		// One directory per tag, holding the tag's transitive file set.
		let tags = self.store.tags().await?;
		let dag = self.store.dag().await?;
		for tag in &tags {
			if is_reserved_name(&tag.name) {
				// Group tags share names with group folders by design; any
				// other collision is worth a warning.
				if !FileTypeGroup::is_group_name(&tag.name) {
					warn!(tag = %tag.name, "Tag name collides with a reserved root entry; not materialized");
					reserved_conflicts += 1;
				}
				continue;
			}

			let dir = self.root.join(codec::encode_dirname(&tag.name));
			desired.insert(dir.clone(), EntryKind::Directory);

			let mut tag_ids = vec![tag.id];
			tag_ids.extend(dag.descendants_of(tag.id));

			let rows = self.store.files_with_tag_ids(&tag_ids).await?;
			let mut seen = HashSet::new();
			let members = rows
				.iter()
				.filter(|(file, _)| seen.insert(file.id))
				.map(|(file, _)| file);
			insert_links(&mut desired, &dir, members);
		}

		// Saved queries, from their cached result sets.
		let files_by_id: std::collections::HashMap<i32, &file::Model> =
			files.iter().map(|f| (f.id, f)).collect();
		for query in self.store.saved_queries().await? {
			let dir = self
				.root
				.join(QUERIES_DIR)
				.join(codec::encode_dirname(&query.name));
			desired.insert(dir.clone(), EntryKind::Directory);

			let members = query
				.result_ids()
				.into_iter()
				.filter_map(|id| files_by_id.get(&id).copied());
			insert_links(&mut desired, &dir, members);
		}

		Ok((desired, reserved_conflicts))
	}
}

/// Insert one symlink per file into `dir`, disambiguating display-name
/// collisions with a numeric suffix.
fn insert_links<'a>(
	desired: &mut Snapshot,
	dir: &Path,
	files: impl IntoIterator<Item = &'a file::Model>,
) {
	let mut used: HashSet<String> = HashSet::new();
	for file in files {
		let name = disambiguate(&file.name, &mut used);
		desired.insert(dir.join(name), EntryKind::Symlink(PathBuf::from(&file.path)));
	}
}

fn disambiguate(name: &str, used: &mut HashSet<String>) -> String {
	if used.insert(name.to_string()) {
		return name.to_string();
	}

	let path = Path::new(name);
	let stem = path
		.file_stem()
		.map(|s| s.to_string_lossy().to_string())
		.unwrap_or_else(|| name.to_string());
	let extension = path.extension().map(|e| e.to_string_lossy().to_string());

	for n in 1u32.. {
		let candidate = match &extension {
			Some(ext) => format!("{stem} ({n}).{ext}"),
			None => format!("{stem} ({n})"),
		};
		if used.insert(candidate.clone()) {
			return candidate;
		}
	}

	unreachable!("disambiguation counter exhausted");
}

#[cfg(unix)]
pub(crate) async fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
	fs::symlink(target, link).await
}

#[cfg(windows)]
pub(crate) async fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
	tokio::fs::symlink_file(target, link).await
}
