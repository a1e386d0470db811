//! Tag Store
//!
//! The authoritative tag graph: files, tags, valued associations, metatag
//! edges and saved queries. All mutations are serialized through a single
//! write lock and run inside one transaction, so concurrent readers always
//! observe a consistent snapshot and a failed mutation leaves committed
//! state untouched.

use crate::infra::db::entities::{file, file_tag, saved_query, tag, tag_edge};
use crate::infra::db::Database;
use crate::filetype::FileTypeGroup;

use std::path::Path;
use std::sync::Arc;

use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
	ActiveModelBehavior, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr,
	EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub mod hierarchy;

pub use hierarchy::TagDag;

pub type FileId = i32;
pub type TagId = i32;

#[derive(Error, Debug)]
pub enum TagStoreError {
	#[error("Unknown tag: {0}")]
	UnknownTag(String),

	#[error("Metatag edge would create a cycle: {child} -> {parent}")]
	CycleDetected { child: String, parent: String },

	#[error("File not found (id: {0})")]
	FileNotFound(FileId),

	#[error("Tag name is empty")]
	EmptyTagName,

	#[error("Database error: {0}")]
	Database(#[from] DbErr),
}

/// Authoritative store for the tag graph.
///
/// Reads go straight to the connection pool; writes serialize on
/// `write_lock` and commit in one transaction.
pub struct TagStore {
	db: Arc<Database>,
	write_lock: Mutex<()>,
}

impl TagStore {
	pub fn new(db: Arc<Database>) -> Self {
		Self {
			db,
			write_lock: Mutex::new(()),
		}
	}

	fn conn(&self) -> &sea_orm::DatabaseConnection {
		self.db.conn()
	}

	// ---- mutations -------------------------------------------------------

	/// Index a file under its canonical absolute path.
	///
	/// Idempotent: if the path is already indexed, returns the existing row
	/// untouched. Freshly indexed files are auto-tagged with their extension
	/// tag and the matching file-type-group tag.
	pub async fn add_file(&self, path: &Path) -> Result<file::Model, TagStoreError> {
		let _guard = self.write_lock.lock().await;
		let path_str = path.to_string_lossy().to_string();

		if let Some(existing) = file::Entity::find()
			.filter(file::Column::Path.eq(path_str.clone()))
			.one(self.conn())
			.await?
		{
			debug!(path = %path_str, "File already indexed");
			return Ok(existing);
		}

		let name = path
			.file_name()
			.map(|n| n.to_string_lossy().to_string())
			.unwrap_or_else(|| path_str.clone());

		let txn = self.conn().begin().await?;

		let inserted = file::ActiveModel {
			name: Set(name),
			path: Set(path_str),
			..file::ActiveModel::new()
		}
		.insert(&txn)
		.await?;

		if let Some(extension) = inserted.extension() {
			let ext_tag = ensure_tag(&txn, &extension).await?;
			upsert_association(&txn, inserted.id, ext_tag.id, None).await?;

			if let Some(group) = FileTypeGroup::from_extension(&extension) {
				let group_tag = ensure_tag(&txn, group.name()).await?;
				upsert_association(&txn, inserted.id, group_tag.id, None).await?;
			}
		}

		txn.commit().await?;

		Ok(inserted)
	}

	/// Remove a file and all of its associations. Idempotent.
	pub async fn remove_file(&self, file_id: FileId) -> Result<(), TagStoreError> {
		let _guard = self.write_lock.lock().await;
		let txn = self.conn().begin().await?;

		file_tag::Entity::delete_many()
			.filter(file_tag::Column::FileId.eq(file_id))
			.exec(&txn)
			.await?;
		file::Entity::delete_many()
			.filter(file::Column::Id.eq(file_id))
			.exec(&txn)
			.await?;

		txn.commit().await?;
		Ok(())
	}

	/// Attach `tag_name` to a file, optionally with a value. The tag is
	/// created if absent (exact name, case-insensitive; no fuzzy matching
	/// on mutation). Re-tagging overwrites the previous value.
	pub async fn tag(
		&self,
		file_id: FileId,
		tag_name: &str,
		value: Option<&str>,
	) -> Result<(), TagStoreError> {
		let _guard = self.write_lock.lock().await;

		file::Entity::find_by_id(file_id)
			.one(self.conn())
			.await?
			.ok_or(TagStoreError::FileNotFound(file_id))?;

		let txn = self.conn().begin().await?;
		let tag = ensure_tag(&txn, tag_name).await?;
		upsert_association(&txn, file_id, tag.id, value).await?;
		txn.commit().await?;

		Ok(())
	}

	/// Create a tag by exact name if absent, returning it either way.
	pub async fn create_tag(&self, name: &str) -> Result<tag::Model, TagStoreError> {
		let _guard = self.write_lock.lock().await;
		ensure_tag(self.conn(), name).await
	}

	/// Remove the association between a file and a tag. Removing an absent
	/// association is a no-op, not an error.
	pub async fn untag(&self, file_id: FileId, tag_name: &str) -> Result<(), TagStoreError> {
		let _guard = self.write_lock.lock().await;

		let Some(tag) = find_tag(self.conn(), tag_name).await? else {
			return Ok(());
		};

		file_tag::Entity::delete_many()
			.filter(file_tag::Column::FileId.eq(file_id))
			.filter(file_tag::Column::TagId.eq(tag.id))
			.exec(self.conn())
			.await?;

		Ok(())
	}

	/// Add the hierarchy edge `child → parent`, creating either tag if
	/// absent. Rejected with [`TagStoreError::CycleDetected`], with the
	/// graph left untouched, when the parent is already a descendant of
	/// the child.
	pub async fn metatag(&self, child_name: &str, parent_name: &str) -> Result<(), TagStoreError> {
		let _guard = self.write_lock.lock().await;
		let txn = self.conn().begin().await?;

		let child = ensure_tag(&txn, child_name).await?;
		let parent = ensure_tag(&txn, parent_name).await?;

		let dag = load_dag(&txn).await?;
		if dag.would_create_cycle(child.id, parent.id) {
			txn.rollback().await?;
			return Err(TagStoreError::CycleDetected {
				child: child.name,
				parent: parent.name,
			});
		}

		let already = tag_edge::Entity::find()
			.filter(tag_edge::Column::ChildTagId.eq(child.id))
			.filter(tag_edge::Column::ParentTagId.eq(parent.id))
			.one(&txn)
			.await?;
		if already.is_none() {
			tag_edge::ActiveModel {
				child_tag_id: Set(child.id),
				parent_tag_id: Set(parent.id),
				..tag_edge::ActiveModel::new()
			}
			.insert(&txn)
			.await?;
		}

		txn.commit().await?;
		Ok(())
	}

	/// Remove the hierarchy edge `child → parent`. Idempotent.
	pub async fn unmetatag(
		&self,
		child_name: &str,
		parent_name: &str,
	) -> Result<(), TagStoreError> {
		let _guard = self.write_lock.lock().await;

		let (Some(child), Some(parent)) = (
			find_tag(self.conn(), child_name).await?,
			find_tag(self.conn(), parent_name).await?,
		) else {
			return Ok(());
		};

		tag_edge::Entity::delete_many()
			.filter(tag_edge::Column::ChildTagId.eq(child.id))
			.filter(tag_edge::Column::ParentTagId.eq(parent.id))
			.exec(self.conn())
			.await?;

		Ok(())
	}

	/// Merge every association and hierarchy edge of `src` into `dst`, then
	/// delete `src`. Atomic: either the whole merge commits or nothing does.
	///
	/// Where both tags hold a value for the same file, the destination value
	/// wins. Re-pointed edges that would duplicate an existing edge, become
	/// self-edges, or close a cycle are dropped.
	pub async fn merge_tag(&self, src_name: &str, dst_name: &str) -> Result<(), TagStoreError> {
		let _guard = self.write_lock.lock().await;

		let src = find_tag(self.conn(), src_name)
			.await?
			.ok_or_else(|| TagStoreError::UnknownTag(src_name.to_string()))?;
		let dst = find_tag(self.conn(), dst_name)
			.await?
			.ok_or_else(|| TagStoreError::UnknownTag(dst_name.to_string()))?;

		if src.id == dst.id {
			return Ok(());
		}

		let txn = self.conn().begin().await?;

		// Associations: dst wins on conflict, otherwise the row moves over
		// keeping its value.
		let dst_assocs = file_tag::Entity::find()
			.filter(file_tag::Column::TagId.eq(dst.id))
			.all(&txn)
			.await?;
		let dst_files: std::collections::HashSet<FileId> =
			dst_assocs.iter().map(|a| a.file_id).collect();

		let src_assocs = file_tag::Entity::find()
			.filter(file_tag::Column::TagId.eq(src.id))
			.all(&txn)
			.await?;
		for assoc in src_assocs {
			if dst_files.contains(&assoc.file_id) {
				file_tag::Entity::delete_by_id(assoc.id).exec(&txn).await?;
			} else {
				let mut active: file_tag::ActiveModel = assoc.into();
				active.tag_id = Set(dst.id);
				active.update(&txn).await?;
			}
		}

		// Edges: rebuild the neighborhood of src around dst, dropping
		// duplicates, self-edges and anything that would close a cycle now
		// that the two vertices are contracted.
		let all_edges = tag_edge::Entity::find()
			.order_by_asc(tag_edge::Column::Id)
			.all(&txn)
			.await?;

		let mut dag = TagDag::default();
		let mut kept: std::collections::HashSet<(TagId, TagId)> = Default::default();
		for edge in all_edges
			.iter()
			.filter(|e| e.child_tag_id != src.id && e.parent_tag_id != src.id)
		{
			dag.add_edge(edge.child_tag_id, edge.parent_tag_id);
			kept.insert((edge.child_tag_id, edge.parent_tag_id));
		}

		for edge in all_edges
			.iter()
			.filter(|e| e.child_tag_id == src.id || e.parent_tag_id == src.id)
		{
			tag_edge::Entity::delete_by_id(edge.id).exec(&txn).await?;

			let child = if edge.child_tag_id == src.id { dst.id } else { edge.child_tag_id };
			let parent = if edge.parent_tag_id == src.id { dst.id } else { edge.parent_tag_id };

			if child == parent || kept.contains(&(child, parent)) {
				continue;
			}
			if dag.would_create_cycle(child, parent) {
				warn!(
					src = %src.name,
					dst = %dst.name,
					child_id = child,
					parent_id = parent,
					"Dropping re-pointed edge that would close a cycle"
				);
				continue;
			}

			dag.add_edge(child, parent);
			kept.insert((child, parent));
			tag_edge::ActiveModel {
				child_tag_id: Set(child),
				parent_tag_id: Set(parent),
				..tag_edge::ActiveModel::new()
			}
			.insert(&txn)
			.await?;
		}

		tag::Entity::delete_by_id(src.id).exec(&txn).await?;

		txn.commit().await?;
		Ok(())
	}

	/// Remove a tag and cascade: associations and hierarchy edges go with it.
	pub async fn remove_tag(&self, tag_name: &str) -> Result<(), TagStoreError> {
		let _guard = self.write_lock.lock().await;

		let tag = find_tag(self.conn(), tag_name)
			.await?
			.ok_or_else(|| TagStoreError::UnknownTag(tag_name.to_string()))?;

		let txn = self.conn().begin().await?;

		file_tag::Entity::delete_many()
			.filter(file_tag::Column::TagId.eq(tag.id))
			.exec(&txn)
			.await?;
		tag_edge::Entity::delete_many()
			.filter(
				tag_edge::Column::ChildTagId
					.eq(tag.id)
					.or(tag_edge::Column::ParentTagId.eq(tag.id)),
			)
			.exec(&txn)
			.await?;
		tag::Entity::delete_by_id(tag.id).exec(&txn).await?;

		txn.commit().await?;
		Ok(())
	}

	/// Update a file's canonical path (and display name) after an observed
	/// move or rename.
	pub async fn rename_canonical_path(
		&self,
		file_id: FileId,
		new_path: &Path,
	) -> Result<file::Model, TagStoreError> {
		let _guard = self.write_lock.lock().await;

		let existing = file::Entity::find_by_id(file_id)
			.one(self.conn())
			.await?
			.ok_or(TagStoreError::FileNotFound(file_id))?;

		let name = new_path
			.file_name()
			.map(|n| n.to_string_lossy().to_string())
			.unwrap_or_else(|| existing.name.clone());

		let mut active: file::ActiveModel = existing.into();
		active.path = Set(new_path.to_string_lossy().to_string());
		active.name = Set(name);
		active.updated_at = Set(chrono::Utc::now());

		Ok(active.update(self.conn()).await?)
	}

	// ---- saved queries ---------------------------------------------------

	/// Create or refresh a saved query and its cached result set.
	pub async fn upsert_saved_query(
		&self,
		name: &str,
		expression: &str,
		results: &[FileId],
	) -> Result<saved_query::Model, TagStoreError> {
		let _guard = self.write_lock.lock().await;

		let cached = serde_json::to_value(results)
			.map_err(|e| DbErr::Custom(format!("Failed to serialize query results: {e}")))?;

		match saved_query::Entity::find()
			.filter(saved_query::Column::Name.eq(name))
			.one(self.conn())
			.await?
		{
			Some(existing) => {
				let mut active: saved_query::ActiveModel = existing.into();
				active.expression = Set(expression.to_string());
				active.results = Set(cached);
				active.updated_at = Set(chrono::Utc::now());
				Ok(active.update(self.conn()).await?)
			}
			None => Ok(saved_query::ActiveModel {
				name: Set(name.to_string()),
				expression: Set(expression.to_string()),
				results: Set(cached),
				..saved_query::ActiveModel::new()
			}
			.insert(self.conn())
			.await?),
		}
	}

	/// Delete a saved query. Idempotent.
	pub async fn remove_saved_query(&self, name: &str) -> Result<(), TagStoreError> {
		let _guard = self.write_lock.lock().await;

		saved_query::Entity::delete_many()
			.filter(saved_query::Column::Name.eq(name))
			.exec(self.conn())
			.await?;

		Ok(())
	}

	// ---- reads -----------------------------------------------------------

	pub async fn files(&self) -> Result<Vec<file::Model>, TagStoreError> {
		Ok(file::Entity::find()
			.order_by_asc(file::Column::Id)
			.all(self.conn())
			.await?)
	}

	pub async fn file_by_id(&self, file_id: FileId) -> Result<Option<file::Model>, TagStoreError> {
		Ok(file::Entity::find_by_id(file_id).one(self.conn()).await?)
	}

	pub async fn file_by_path(&self, path: &Path) -> Result<Option<file::Model>, TagStoreError> {
		Ok(file::Entity::find()
			.filter(file::Column::Path.eq(path.to_string_lossy().to_string()))
			.one(self.conn())
			.await?)
	}

	/// First file whose display name matches, case-insensitively. Display
	/// names are not unique; the earliest indexed file wins.
	pub async fn file_by_name(&self, name: &str) -> Result<Option<file::Model>, TagStoreError> {
		Ok(file::Entity::find()
			.filter(Expr::expr(Func::lower(Expr::col(file::Column::Name))).eq(name.to_lowercase()))
			.order_by_asc(file::Column::Id)
			.one(self.conn())
			.await?)
	}

	pub async fn tags(&self) -> Result<Vec<tag::Model>, TagStoreError> {
		Ok(tag::Entity::find()
			.order_by_asc(tag::Column::Name)
			.all(self.conn())
			.await?)
	}

	/// Case-insensitive exact-name resolution.
	pub async fn resolve_tag(&self, name: &str) -> Result<Option<tag::Model>, TagStoreError> {
		find_tag(self.conn(), name).await.map_err(Into::into)
	}

	/// Tags attached to a file, with their association values.
	pub async fn tags_of_file(
		&self,
		file_id: FileId,
	) -> Result<Vec<(tag::Model, Option<String>)>, TagStoreError> {
		let rows = file_tag::Entity::find()
			.filter(file_tag::Column::FileId.eq(file_id))
			.find_also_related(tag::Entity)
			.order_by_asc(file_tag::Column::Id)
			.all(self.conn())
			.await?;

		Ok(rows
			.into_iter()
			.filter_map(|(assoc, tag)| tag.map(|t| (t, assoc.value)))
			.collect())
	}

	/// Direct parents of a tag in the metatag hierarchy.
	pub async fn metatags_of(&self, tag_name: &str) -> Result<Vec<tag::Model>, TagStoreError> {
		let tag = find_tag(self.conn(), tag_name)
			.await?
			.ok_or_else(|| TagStoreError::UnknownTag(tag_name.to_string()))?;

		let parent_ids: Vec<TagId> = tag_edge::Entity::find()
			.filter(tag_edge::Column::ChildTagId.eq(tag.id))
			.all(self.conn())
			.await?
			.into_iter()
			.map(|e| e.parent_tag_id)
			.collect();

		Ok(tag::Entity::find()
			.filter(tag::Column::Id.is_in(parent_ids))
			.order_by_asc(tag::Column::Name)
			.all(self.conn())
			.await?)
	}

	/// Adjacency snapshot of the whole metatag DAG.
	pub async fn dag(&self) -> Result<TagDag, TagStoreError> {
		Ok(load_dag(self.conn()).await?)
	}

	/// Associations for any of the given tag ids, in association-insertion
	/// order, joined with their files. A file appears once per matching
	/// association, each with that association's value.
	pub async fn files_with_tag_ids(
		&self,
		tag_ids: &[TagId],
	) -> Result<Vec<(file::Model, Option<String>)>, TagStoreError> {
		if tag_ids.is_empty() {
			return Ok(Vec::new());
		}

		let rows = file_tag::Entity::find()
			.filter(file_tag::Column::TagId.is_in(tag_ids.to_vec()))
			.find_also_related(file::Entity)
			.order_by_asc(file_tag::Column::Id)
			.all(self.conn())
			.await?;

		Ok(rows
			.into_iter()
			.filter_map(|(assoc, file)| file.map(|f| (f, assoc.value)))
			.collect())
	}

	pub async fn saved_queries(&self) -> Result<Vec<saved_query::Model>, TagStoreError> {
		Ok(saved_query::Entity::find()
			.order_by_asc(saved_query::Column::Id)
			.all(self.conn())
			.await?)
	}
}

// ---- transaction helpers -----------------------------------------------

async fn find_tag<C: ConnectionTrait>(db: &C, name: &str) -> Result<Option<tag::Model>, DbErr> {
	let trimmed = name.trim();
	if trimmed.is_empty() {
		return Ok(None);
	}

	tag::Entity::find()
		.filter(Expr::expr(Func::lower(Expr::col(tag::Column::Name))).eq(trimmed.to_lowercase()))
		.one(db)
		.await
}

async fn ensure_tag<C: ConnectionTrait>(db: &C, name: &str) -> Result<tag::Model, TagStoreError> {
	let trimmed = name.trim();
	if trimmed.is_empty() {
		return Err(TagStoreError::EmptyTagName);
	}

	if let Some(existing) = find_tag(db, trimmed).await? {
		return Ok(existing);
	}

	Ok(tag::ActiveModel {
		name: Set(trimmed.to_string()),
		..tag::ActiveModel::new()
	}
	.insert(db)
	.await?)
}

async fn upsert_association<C: ConnectionTrait>(
	db: &C,
	file_id: FileId,
	tag_id: TagId,
	value: Option<&str>,
) -> Result<(), DbErr> {
	match file_tag::Entity::find()
		.filter(file_tag::Column::FileId.eq(file_id))
		.filter(file_tag::Column::TagId.eq(tag_id))
		.one(db)
		.await?
	{
		Some(existing) => {
			// Re-tagging with a new value overwrites the old one
			let mut active: file_tag::ActiveModel = existing.into();
			active.value = Set(value.map(str::to_string));
			active.update(db).await?;
		}
		None => {
			file_tag::ActiveModel {
				file_id: Set(file_id),
				tag_id: Set(tag_id),
				value: Set(value.map(str::to_string)),
				..file_tag::ActiveModel::new()
			}
			.insert(db)
			.await?;
		}
	}

	Ok(())
}

async fn load_dag<C: ConnectionTrait>(db: &C) -> Result<TagDag, DbErr> {
	let edges = tag_edge::Entity::find()
		.order_by_asc(tag_edge::Column::Id)
		.all(db)
		.await?;

	Ok(TagDag::from_edges(
		edges.into_iter().map(|e| (e.child_tag_id, e.parent_tag_id)),
	))
}
