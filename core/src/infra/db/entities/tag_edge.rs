//! Tag hierarchy edge entity
//!
//! Directed edge `child → parent` in the metatag graph. The edge set must
//! remain a DAG after every mutation; the store rejects edges that would
//! close a cycle before they reach this table.

use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tag_edge")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,

	pub child_tag_id: i32,
	pub parent_tag_id: i32,

	pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		belongs_to = "super::tag::Entity",
		from = "Column::ChildTagId",
		to = "super::tag::Column::Id"
	)]
	ChildTag,

	#[sea_orm(
		belongs_to = "super::tag::Entity",
		from = "Column::ParentTagId",
		to = "super::tag::Column::Id"
	)]
	ParentTag,
}

impl ActiveModelBehavior for ActiveModel {
	fn new() -> Self {
		Self {
			created_at: Set(chrono::Utc::now()),
			..ActiveModelTrait::default()
		}
	}
}

impl Model {
	/// A self-edge is the degenerate cycle; it must never be stored.
	pub fn is_self_edge(&self) -> bool {
		self.child_tag_id == self.parent_tag_id
	}
}
