//! File entity
//!
//! One row per indexed file. `path` is the canonical absolute source path,
//! exclusively owned by this row; every other filesystem appearance of the
//! file is a symlink generated by the projection.

use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub id: i32,

	/// Display name, the final component of `path`.
	pub name: String,

	/// Canonical absolute source path.
	#[sea_orm(unique)]
	pub path: String,

	pub created_at: DateTimeUtc,
	pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		has_many = "super::file_tag::Entity",
		from = "Column::Id",
		to = "super::file_tag::Column::FileId"
	)]
	FileTags,
}

impl Related<super::file_tag::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::FileTags.def()
	}
}

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
	/// Lowercased extension of the display name, if it has one.
	pub fn extension(&self) -> Option<String> {
		Path::new(&self.name)
			.extension()
			.and_then(|ext| ext.to_str())
			.map(str::to_lowercase)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extension_is_lowercased() {
		let file = Model {
			id: 1,
			name: "Report.PDF".to_string(),
			path: "/home/user/Report.PDF".to_string(),
			created_at: chrono::Utc::now(),
			updated_at: chrono::Utc::now(),
		};

		assert_eq!(file.extension().as_deref(), Some("pdf"));
	}

	#[test]
	fn extension_absent_for_bare_names() {
		let file = Model {
			id: 1,
			name: "Makefile".to_string(),
			path: "/src/Makefile".to_string(),
			created_at: chrono::Utc::now(),
			updated_at: chrono::Utc::now(),
		};

		assert_eq!(file.extension(), None);
	}
}
