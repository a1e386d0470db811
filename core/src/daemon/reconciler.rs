//! Event reconciliation
//!
//! Translates a logical filesystem change into the equivalent store
//! mutation: echo suppression first (against the projection's change
//! journal), then classification by position under the watched root, then
//! apply. A failed apply is logged and the projection rebuilt, visibly
//! undoing the invalid edit; the same interpretation is never retried.

use crate::daemon::{DaemonError, FsChange};
use crate::embedding::{self, EmbeddingIndex};
use crate::import::Importer;
use crate::projection::{
	self, ChangeKind, EntryKind, ProjectionBuilder, ProjectionState, QUERIES_DIR,
	SEARCH_IMAGES_DIR, SEARCH_TEXTS_DIR,
};
use crate::query::{codec, parser, QueryEvaluator, QueryOptions};
use crate::store::{TagStore, TagStoreError};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

/// Results returned for a search directory when no `top_k=N` is given.
const DEFAULT_SEARCH_TOP_K: usize = 10;

/// Which kind of root an event came from.
#[derive(Debug, Clone)]
pub enum WatchedRoot {
	Projection(PathBuf),
	Import(PathBuf),
}

impl WatchedRoot {
	pub fn path(&self) -> &Path {
		match self {
			Self::Projection(path) => path,
			Self::Import(path) => path,
		}
	}
}

/// Whether an applied change mutated the store (and so requires a
/// re-projection).
enum Outcome {
	Mutated,
	Ignored,
}

/// Collaborators handed to the reconciler at daemon start.
pub struct ReconcilerOptions {
	pub query_options: QueryOptions,
	pub text_index: Option<Arc<dyn EmbeddingIndex>>,
	pub image_index: Option<Arc<dyn EmbeddingIndex>>,
}

impl Default for ReconcilerOptions {
	fn default() -> Self {
		Self {
			query_options: QueryOptions::default(),
			text_index: None,
			image_index: None,
		}
	}
}

pub struct Reconciler {
	store: Arc<TagStore>,
	builder: Arc<ProjectionBuilder>,
	state: Arc<Mutex<ProjectionState>>,
	importer: Importer,
	options: ReconcilerOptions,
}

impl Reconciler {
	pub fn new(
		store: Arc<TagStore>,
		builder: Arc<ProjectionBuilder>,
		importer: Importer,
		options: ReconcilerOptions,
	) -> Self {
		let state = builder.state();
		Self {
			store,
			builder,
			state,
			importer,
			options,
		}
	}

	pub(crate) fn builder(&self) -> &ProjectionBuilder {
		&self.builder
	}

	pub(crate) fn importer(&self) -> &Importer {
		&self.importer
	}

	/// One full reconciliation pass for one logical change.
	pub async fn reconcile(&self, root: &WatchedRoot, change: FsChange) {
		trace!(?root, ?change, "Reconciling");

		let result = match root {
			WatchedRoot::Projection(path) => self.reconcile_projection(path, change).await,
			WatchedRoot::Import(path) => self.reconcile_import(path, change).await,
		};

		match result {
			Ok(Outcome::Ignored) => {}
			Ok(Outcome::Mutated) => {
				if let Err(e) =
					crate::query::refresh_saved_queries(&self.store, &self.options.query_options)
						.await
				{
					warn!(?e, "Refreshing saved queries failed;");
				}
				if let Err(e) = self.builder.rebuild().await {
					warn!(?e, "Re-projection after reconciliation failed;");
				}
			}
			Err(e) => {
				warn!(?e, "Reconciliation failed; rebuilding to restore the expected state");
				if let Err(e) = self.builder.rebuild().await {
					warn!(?e, "Restoring rebuild failed;");
				}
			}
		}
	}

	// ---- projection root -------------------------------------------------

	async fn reconcile_projection(
		&self,
		root: &Path,
		change: FsChange,
	) -> Result<Outcome, DaemonError> {
		// Echo suppression: a change the builder journaled is our own write
		// bouncing back.
		let journal_kind = match &change {
			FsChange::Created { path, .. } => Some((path.clone(), ChangeKind::Created)),
			FsChange::Removed { path, .. } => Some((path.clone(), ChangeKind::Removed)),
			FsChange::Renamed { .. } => None,
		};
		if let Some((path, kind)) = journal_kind {
			if self.state.lock().await.consume(&path, kind) {
				trace!(path = %path.display(), "Suppressed projection echo");
				return Ok(Outcome::Ignored);
			}
		}

		match change {
			FsChange::Created { path, is_dir: true } => {
				self.projection_dir_created(root, &path).await
			}
			FsChange::Created { .. } => Ok(Outcome::Ignored),
			FsChange::Removed { path, was_dir } => {
				self.projection_entry_removed(root, &path, was_dir).await
			}
			// The builder never renames; a user rename is a removal of the
			// entry we owned, and the rebuild restores the rest.
			FsChange::Renamed { from, .. } => {
				self.projection_entry_removed(root, &from, None).await
			}
		}
	}

	async fn projection_dir_created(
		&self,
		root: &Path,
		path: &Path,
	) -> Result<Outcome, DaemonError> {
		let Some(components) = relative_components(root, path) else {
			return Ok(Outcome::Ignored);
		};

		match components.as_slice() {
			[name] if !projection::is_reserved_name(&codec::decode_dirname(name)) => {
				self.root_dir_created(path, name).await
			}

			[queries, name] if queries == QUERIES_DIR => {
				let decoded = codec::decode_dirname(name);
				info!(query = %decoded, "New query directory");
				self.save_query(&decoded).await?;
				Ok(Outcome::Mutated)
			}

			[search, name] if search == SEARCH_TEXTS_DIR => {
				self.populate_search_dir(self.options.text_index.clone(), path, name)
					.await
			}

			[search, name] if search == SEARCH_IMAGES_DIR => {
				self.populate_search_dir(self.options.image_index.clone(), path, name)
					.await
			}

			_ => Ok(Outcome::Ignored),
		}
	}

	/// A directory created directly under the tag root: a single bare term
	/// creates that tag; anything else becomes a saved query under the
	/// query root and the hand-made directory is retired.
	async fn root_dir_created(&self, path: &Path, name: &str) -> Result<Outcome, DaemonError> {
		let decoded = codec::decode_dirname(name);
		let tokens = parser::tokenize(&decoded);
		let steps = parser::parse(&tokens);

		if steps.is_empty() {
			return Ok(Outcome::Ignored);
		}

		if tokens.len() == 1 && steps[0].1.value.is_none() {
			info!(tag = %decoded, "New tag directory");
			self.store.create_tag(&decoded).await?;
			return Ok(Outcome::Mutated);
		}

		info!(query = %decoded, "New query directory at tag root");
		self.save_query(&decoded).await?;

		// The canonical directory is materialized under the query root;
		// retire the hand-made one and journal our own removal so it does
		// not come back as a user edit.
		if fs::remove_dir(path).await.is_ok() {
			self.state
				.lock()
				.await
				.record(path.to_path_buf(), ChangeKind::Removed);
		}

		Ok(Outcome::Mutated)
	}

	async fn save_query(&self, decoded: &str) -> Result<(), DaemonError> {
		let evaluator =
			QueryEvaluator::with_options(&self.store, self.options.query_options.clone());
		let outcome = evaluator.evaluate(decoded).await?;

		for diagnostic in &outcome.diagnostics {
			if diagnostic.resolved.is_none() {
				debug!(
					term = %diagnostic.term,
					attempted = ?diagnostic.attempted,
					"Query term did not resolve"
				);
			}
		}

		self.store
			.upsert_saved_query(decoded, decoded, &outcome.file_ids)
			.await?;

		Ok(())
	}

	async fn projection_entry_removed(
		&self,
		root: &Path,
		path: &Path,
		was_dir: Option<bool>,
	) -> Result<Outcome, DaemonError> {
		let Some(components) = relative_components(root, path) else {
			return Ok(Outcome::Ignored);
		};

		// Remove events do not always say what the entry was; fall back to
		// what the projection last put there.
		let was_dir = match was_dir {
			Some(known) => Some(known),
			None => self
				.state
				.lock()
				.await
				.expected(path)
				.map(|kind| matches!(kind, EntryKind::Directory)),
		};

		match components.as_slice() {
			[name] if was_dir != Some(false) => {
				let decoded = codec::decode_dirname(name);
				if projection::is_reserved_name(&decoded) {
					info!(dir = %decoded, "Reserved root entry removed; restoring");
					return Ok(Outcome::Mutated);
				}

				info!(tag = %decoded, "Tag directory removed, removing tag");
				match self.store.remove_tag(&decoded).await {
					Ok(()) => Ok(Outcome::Mutated),
					Err(TagStoreError::UnknownTag(_)) => {
						debug!(tag = %decoded, "No such tag; nothing to remove");
						Ok(Outcome::Ignored)
					}
					Err(e) => Err(e.into()),
				}
			}

			[queries, name] if queries == QUERIES_DIR => {
				let decoded = codec::decode_dirname(name);
				info!(query = %decoded, "Query directory removed, forgetting saved query");
				self.store.remove_saved_query(&decoded).await?;
				Ok(Outcome::Mutated)
			}

			[search, _] if search == SEARCH_TEXTS_DIR || search == SEARCH_IMAGES_DIR => {
				// Search directories are session artifacts, not owned state
				Ok(Outcome::Ignored)
			}

			[dir_name, _link] if was_dir != Some(true) => {
				self.symlink_removed(path, dir_name).await
			}

			_ => Ok(Outcome::Ignored),
		}
	}

	/// A symlink disappeared under a tag directory: untag the file it
	/// pointed at. Under a group folder there is no tag to remove; the
	/// rebuild restores the link.
	async fn symlink_removed(&self, path: &Path, dir_name: &str) -> Result<Outcome, DaemonError> {
		let tag_name = codec::decode_dirname(dir_name);

		if projection::is_reserved_name(&tag_name) {
			debug!(dir = %tag_name, "Symlink removed under reserved folder; restoring");
			return Ok(Outcome::Mutated);
		}

		let expected = self.state.lock().await.expected(path).cloned();
		let Some(EntryKind::Symlink(target)) = expected else {
			debug!(path = %path.display(), "Removed entry was not an owned symlink; restoring");
			return Ok(Outcome::Mutated);
		};

		let Some(file) = self.store.file_by_path(&target).await? else {
			debug!(target = %target.display(), "Symlink target no longer indexed");
			return Ok(Outcome::Mutated);
		};

		info!(file = %file.name, tag = %tag_name, "Symlink removed, untagging");
		self.store.untag(file.id, &tag_name).await?;

		Ok(Outcome::Mutated)
	}

	async fn populate_search_dir(
		&self,
		index: Option<Arc<dyn EmbeddingIndex>>,
		dir: &Path,
		name: &str,
	) -> Result<Outcome, DaemonError> {
		let Some(index) = index else {
			warn!("No embedding index attached; search directory left empty");
			return Ok(Outcome::Ignored);
		};

		let decoded = codec::decode_dirname(name);
		let (tokens, top_k) = parser::extract_top_k(parser::tokenize(&decoded));
		let query = tokens.join(" ");
		let top_k = top_k.unwrap_or(DEFAULT_SEARCH_TOP_K);

		info!(query = %query, top_k, "Populating search directory");
		let results = embedding::search(index.as_ref(), &query, top_k).await;

		let mut used = HashSet::new();
		for (file_id, score) in results {
			let Some(file) = self.store.file_by_id(file_id).await? else {
				continue;
			};

			let link_name = {
				let mut candidate = file.name.clone();
				let mut n = 1u32;
				while !used.insert(candidate.clone()) {
					candidate = format!("{} ({n})", file.name);
					n += 1;
				}
				candidate
			};

			let link = dir.join(link_name);
			if let Err(e) = projection::create_symlink(Path::new(&file.path), &link).await {
				warn!(link = %link.display(), error = %e, "Failed to link search result");
			} else {
				trace!(file = %file.name, score, "Linked search result");
			}
		}

		// Search results are ephemeral: no store mutation, no rebuild.
		Ok(Outcome::Ignored)
	}

	// ---- import roots ----------------------------------------------------

	async fn reconcile_import(
		&self,
		root: &Path,
		change: FsChange,
	) -> Result<Outcome, DaemonError> {
		match change {
			FsChange::Created { path, is_dir } => {
				if self.importer.is_ignored(root, &path) {
					return Ok(Outcome::Ignored);
				}

				if is_dir {
					info!(dir = %path.display(), "Directory appeared under import root");
					self.importer.import_tree(root, &path).await?;
				} else {
					debug!(file = %path.display(), "File appeared under import root");
					self.importer.import_file(root, &path).await?;
				}
				Ok(Outcome::Mutated)
			}

			FsChange::Removed { path, .. } => {
				// Confirm the canonical path is really gone before dropping
				// the row; a late event after an atomic save must not.
				if fs::symlink_metadata(&path).await.is_ok() {
					return Ok(Outcome::Ignored);
				}

				let Some(file) = self.store.file_by_path(&path).await? else {
					return Ok(Outcome::Ignored);
				};

				info!(file = %file.name, "Canonical path deleted, removing file");
				self.store.remove_file(file.id).await?;
				Ok(Outcome::Mutated)
			}

			FsChange::Renamed { from, to } => {
				if let Some(file) = self.store.file_by_path(&from).await? {
					info!(
						from = %from.display(),
						to = %to.display(),
						"Canonical path moved"
					);
					self.store.rename_canonical_path(file.id, &to).await?;
					return Ok(Outcome::Mutated);
				}

				// Moved in from outside the indexed world: a plain import
				if self.importer.is_ignored(root, &to) {
					return Ok(Outcome::Ignored);
				}
				match fs::symlink_metadata(&to).await {
					Ok(meta) if meta.is_dir() => {
						self.importer.import_tree(root, &to).await?;
						Ok(Outcome::Mutated)
					}
					Ok(meta) if meta.is_file() => {
						self.importer.import_file(root, &to).await?;
						Ok(Outcome::Mutated)
					}
					_ => Ok(Outcome::Ignored),
				}
			}
		}
	}
}

/// Path components of `path` relative to `root`, as strings. `None` when
/// the path is outside the root or not valid UTF-8.
fn relative_components(root: &Path, path: &Path) -> Option<Vec<String>> {
	let relative = path.strip_prefix(root).ok()?;
	let components: Vec<String> = relative
		.components()
		.map(|c| c.as_os_str().to_str().map(str::to_string))
		.collect::<Option<_>>()?;

	if components.is_empty() {
		None
	} else {
		Some(components)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn relative_components_splits_under_root() {
		let components =
			relative_components(Path::new("/proj"), Path::new("/proj/papers/a.pdf")).unwrap();
		assert_eq!(components, vec!["papers", "a.pdf"]);
	}

	#[test]
	fn paths_outside_root_are_rejected() {
		assert!(relative_components(Path::new("/proj"), Path::new("/other/x")).is_none());
		assert!(relative_components(Path::new("/proj"), Path::new("/proj")).is_none());
	}
}
