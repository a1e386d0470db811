//! Tag entity
//!
//! Tags are unique by name, case-insensitively. The store's single write
//! path enforces the case-insensitive uniqueness; `name` keeps the casing
//! the user first typed.

use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tag")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,

	#[sea_orm(unique)]
	pub name: String,

	pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
	FileTags,
	ParentEdges,
	ChildEdges,
}

// `Relation` is defined by hand rather than via `DeriveRelation`. The two
// edges to `tag_edge` are `has_many`, and sea-orm's `has_many` builder
// requires `tag_edge::Entity: Related<tag::Entity>` — an impl we deliberately
// omit below because it would be ambiguous. Building the `RelationDef`s
// directly yields exactly what the derive would emit while keeping that impl
// absent.
impl RelationTrait for Relation {
	fn def(&self) -> RelationDef {
		match self {
			Relation::FileTags => Entity::has_many(super::file_tag::Entity)
				.from(Column::Id)
				.to(super::file_tag::Column::TagId)
				.into(),
			Relation::ParentEdges => {
				let mut def: RelationDef = Entity::belongs_to(super::tag_edge::Entity)
					.from(Column::Id)
					.to(super::tag_edge::Column::ChildTagId)
					.into();
				def.rel_type = sea_orm::RelationType::HasMany;
				def.is_owner = true;
				def
			}
			Relation::ChildEdges => {
				let mut def: RelationDef = Entity::belongs_to(super::tag_edge::Entity)
					.from(Column::Id)
					.to(super::tag_edge::Column::ParentTagId)
					.into();
				def.rel_type = sea_orm::RelationType::HasMany;
				def.is_owner = true;
				def
			}
		}
	}
}

impl Related<super::file_tag::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::FileTags.def()
	}
}

// No Related impl for tag_edge: both endpoints are tags, so the relation is
// ambiguous. Use the specific Relation variant instead.

impl ActiveModelBehavior for ActiveModel {
	fn new() -> Self {
		Self {
			created_at: Set(chrono::Utc::now()),
			..ActiveModelTrait::default()
		}
	}
}

impl Model {
	/// Check whether this tag answers to `name`, ignoring case.
	pub fn matches_name(&self, name: &str) -> bool {
		self.name.eq_ignore_ascii_case(name.trim())
	}
}
