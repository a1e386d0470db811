//! Seed the file-type tag hierarchy
//!
//! Creates one tag per file-type group and one per known extension, with a
//! `extension → group` edge each, so freshly added files can be auto-tagged
//! and group queries resolve transitively like any other metatag query.

use crate::filetype::FileTypeGroup;
use crate::infra::db::entities::{tag, tag_edge};

use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		let db = manager.get_connection();

		for group in FileTypeGroup::all() {
			let group_id = ensure_tag(db, group.name()).await?;

			for extension in group.extensions() {
				let extension_id = ensure_tag(db, extension).await?;
				ensure_edge(db, extension_id, group_id).await?;
			}
		}

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		let db = manager.get_connection();

		let mut names: Vec<String> = Vec::new();
		for group in FileTypeGroup::all() {
			names.push(group.name().to_string());
			names.extend(group.extensions().iter().map(|&e| e.to_string()));
		}

		tag::Entity::delete_many()
			.filter(tag::Column::Name.is_in(names))
			.exec(db)
			.await?;

		Ok(())
	}
}

async fn ensure_tag(db: &impl sea_orm::ConnectionTrait, name: &str) -> Result<i32, DbErr> {
	if let Some(existing) = tag::Entity::find()
		.filter(tag::Column::Name.eq(name))
		.one(db)
		.await?
	{
		return Ok(existing.id);
	}

	let inserted = tag::ActiveModel {
		name: Set(name.to_string()),
		created_at: Set(chrono::Utc::now()),
		..Default::default()
	}
	.insert(db)
	.await?;

	Ok(inserted.id)
}

async fn ensure_edge(
	db: &impl sea_orm::ConnectionTrait,
	child_tag_id: i32,
	parent_tag_id: i32,
) -> Result<(), DbErr> {
	let existing = tag_edge::Entity::find()
		.filter(tag_edge::Column::ChildTagId.eq(child_tag_id))
		.filter(tag_edge::Column::ParentTagId.eq(parent_tag_id))
		.one(db)
		.await?;

	if existing.is_none() {
		tag_edge::ActiveModel {
			child_tag_id: Set(child_tag_id),
			parent_tag_id: Set(parent_tag_id),
			created_at: Set(chrono::Utc::now()),
			..Default::default()
		}
		.insert(db)
		.await?;
	}

	Ok(())
}
