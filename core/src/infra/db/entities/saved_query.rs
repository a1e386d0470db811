//! Saved query entity
//!
//! A directory whose name is a query expression, materialized under the
//! query root and refreshed whenever the store changes.

use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "saved_query")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,

	/// Decoded query text, which doubles as the directory name.
	#[sea_orm(unique)]
	pub name: String,

	/// The query expression, as tokenized by the evaluator.
	pub expression: String,

	/// Cached result file ids in evaluation order, as a JSON array.
	pub results: Json,

	pub created_at: DateTimeUtc,
	pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {
	fn new() -> Self {
		Self {
			created_at: Set(chrono::Utc::now()),
			updated_at: Set(chrono::Utc::now()),
			..ActiveModelTrait::default()
		}
	}
}

impl Model {
	/// Cached result ids, oldest insertion first.
	pub fn result_ids(&self) -> Vec<i32> {
		serde_json::from_value(self.results.clone()).unwrap_or_default()
	}
}
