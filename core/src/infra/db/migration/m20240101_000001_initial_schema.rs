//! Initial database schema
//!
//! Creates the file, tag, association, hierarchy-edge and saved-query
//! tables. The tag graph is authoritative; everything the projection
//! renders is derived from these tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.create_table(
				Table::create()
					.table(File::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(File::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(File::Name).string().not_null())
					.col(ColumnDef::new(File::Path).string().not_null().unique_key())
					.col(
						ColumnDef::new(File::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(
						ColumnDef::new(File::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Tag::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Tag::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(Tag::Name).string().not_null().unique_key())
					.col(
						ColumnDef::new(Tag::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(FileTag::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(FileTag::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(FileTag::FileId).integer().not_null())
					.col(ColumnDef::new(FileTag::TagId).integer().not_null())
					.col(ColumnDef::new(FileTag::Value).string())
					.col(
						ColumnDef::new(FileTag::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.foreign_key(
						ForeignKey::create()
							.from(FileTag::Table, FileTag::FileId)
							.to(File::Table, File::Id)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.foreign_key(
						ForeignKey::create()
							.from(FileTag::Table, FileTag::TagId)
							.to(Tag::Table, Tag::Id)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.to_owned(),
			)
			.await?;

		// At most one association per (file, tag) pair
		manager
			.create_index(
				Index::create()
					.name("idx_file_tag_unique")
					.table(FileTag::Table)
					.col(FileTag::FileId)
					.col(FileTag::TagId)
					.unique()
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(TagEdge::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(TagEdge::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(TagEdge::ChildTagId).integer().not_null())
					.col(ColumnDef::new(TagEdge::ParentTagId).integer().not_null())
					.col(
						ColumnDef::new(TagEdge::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.foreign_key(
						ForeignKey::create()
							.from(TagEdge::Table, TagEdge::ChildTagId)
							.to(Tag::Table, Tag::Id)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.foreign_key(
						ForeignKey::create()
							.from(TagEdge::Table, TagEdge::ParentTagId)
							.to(Tag::Table, Tag::Id)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_tag_edge_unique")
					.table(TagEdge::Table)
					.col(TagEdge::ChildTagId)
					.col(TagEdge::ParentTagId)
					.unique()
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(SavedQuery::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(SavedQuery::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(
						ColumnDef::new(SavedQuery::Name)
							.string()
							.not_null()
							.unique_key(),
					)
					.col(ColumnDef::new(SavedQuery::Expression).string().not_null())
					.col(ColumnDef::new(SavedQuery::Results).json().not_null())
					.col(
						ColumnDef::new(SavedQuery::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(
						ColumnDef::new(SavedQuery::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_table(Table::drop().table(SavedQuery::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(TagEdge::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(FileTag::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Tag::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(File::Table).to_owned())
			.await?;

		Ok(())
	}
}

#[derive(DeriveIden)]
enum File {
	Table,
	Id,
	Name,
	Path,
	CreatedAt,
	UpdatedAt,
}

#[derive(DeriveIden)]
enum Tag {
	Table,
	Id,
	Name,
	CreatedAt,
}

#[derive(DeriveIden)]
enum FileTag {
	Table,
	Id,
	FileId,
	TagId,
	Value,
	CreatedAt,
}

#[derive(DeriveIden)]
enum TagEdge {
	Table,
	Id,
	ChildTagId,
	ParentTagId,
	CreatedAt,
}

#[derive(DeriveIden)]
enum SavedQuery {
	Table,
	Id,
	Name,
	Expression,
	Results,
	CreatedAt,
	UpdatedAt,
}
