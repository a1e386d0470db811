//! File ↔ Tag association entity
//!
//! Junction table between files and tags. At most one row per
//! `(file_id, tag_id)` pair (unique index); re-tagging overwrites `value`.

use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file_tag")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,

	pub file_id: i32,
	pub tag_id: i32,

	/// Optional association value, e.g. `name=Sean Pedersen`.
	pub value: Option<String>,

	pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		belongs_to = "super::file::Entity",
		from = "Column::FileId",
		to = "super::file::Column::Id"
	)]
	File,

	#[sea_orm(
		belongs_to = "super::tag::Entity",
		from = "Column::TagId",
		to = "super::tag::Column::Id"
	)]
	Tag,
}

impl Related<super::file::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::File.def()
	}
}

impl Related<super::tag::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::Tag.def()
	}
}

impl ActiveModelBehavior for ActiveModel {
	fn new() -> Self {
		Self {
			created_at: Set(chrono::Utc::now()),
			..ActiveModelTrait::default()
		}
	}
}
