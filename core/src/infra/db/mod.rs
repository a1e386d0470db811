//! Database infrastructure using SeaORM
//!
//! SQLite file per data directory; schema managed by the versioned
//! migrator in [`migration`].

use sea_orm::{ConnectOptions, Database as SeaDatabase, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod entities;
pub mod migration;

/// Database handle owning the SeaORM connection pool.
pub struct Database {
	conn: DatabaseConnection,
}

impl Database {
	/// Open the database at `path`, creating it if absent, and bring the
	/// schema up to date.
	pub async fn open(path: &Path) -> Result<Self, DbErr> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)
				.map_err(|e| DbErr::Custom(format!("Failed to create directory: {e}")))?;
		}

		let db_url = format!("sqlite://{}?mode=rwc", path.display());

		let mut opt = ConnectOptions::new(db_url);
		opt.max_connections(10)
			.min_connections(1)
			.connect_timeout(Duration::from_secs(8))
			.idle_timeout(Duration::from_secs(8))
			.sqlx_logging(false); // We use tracing instead

		let conn = SeaDatabase::connect(opt).await?;

		migration::Migrator::up(&conn, None).await?;

		info!(path = %path.display(), "Opened database");

		Ok(Self { conn })
	}

	/// The underlying connection.
	pub fn conn(&self) -> &DatabaseConnection {
		&self.conn
	}
}
