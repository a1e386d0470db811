//! tagfs core
//!
//! Organize files by attaching tags instead of moving them, then navigate
//! the tag graph through a generated filesystem of directories and
//! symlinks. The core owns the authoritative tag store, the query
//! evaluator, the projection builder and the sync daemon; front-ends stay
//! thin.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

pub mod config;
pub mod daemon;
pub mod embedding;
pub mod filetype;
pub mod import;
pub mod infra;
pub mod projection;
pub mod query;
pub mod store;

pub use config::{Config, ConfigError};
pub use daemon::{Reconciler, ReconcilerOptions, SyncDaemon};
pub use embedding::EmbeddingIndex;
pub use import::Importer;
pub use infra::db::Database;
pub use projection::ProjectionBuilder;
pub use query::{QueryEvaluator, QueryOptions};
pub use store::TagStore;

#[derive(Error, Debug)]
pub enum CoreError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error("Database error: {0}")]
	Database(#[from] sea_orm::DbErr),

	#[error(transparent)]
	Query(#[from] query::QueryError),

	#[error(transparent)]
	Projection(#[from] projection::ProjectionError),
}

#[cfg(debug_assertions)]
const CONSOLE_LOG_FILTER: LevelFilter = LevelFilter::DEBUG;

#[cfg(not(debug_assertions))]
const CONSOLE_LOG_FILTER: LevelFilter = LevelFilter::INFO;

/// Console + daily-rolling file logging. Keep the returned guard alive for
/// the lifetime of the process or buffered log lines are lost.
pub fn init_logging(log_dir: &Path) -> WorkerGuard {
	let (non_blocking, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, "log"));

	tracing_subscriber::registry()
		.with(
			fmt::Layer::default()
				.with_writer(non_blocking)
				.with_ansi(false)
				.with_filter(LevelFilter::DEBUG),
		)
		.with(
			fmt::Layer::default().with_filter(
				EnvFilter::builder()
					.with_default_directive(CONSOLE_LOG_FILTER.into())
					.from_env_lossy(),
			),
		)
		.init();

	guard
}

/// Wired-up core: config, database, store and projection builder.
pub struct Core {
	pub config: Config,
	pub db: Arc<Database>,
	pub store: Arc<TagStore>,
	pub projection: Arc<ProjectionBuilder>,
}

impl Core {
	pub async fn new(config: Config) -> Result<Arc<Self>, CoreError> {
		let db = Arc::new(Database::open(&config.db_path()).await?);
		let store = Arc::new(TagStore::new(Arc::clone(&db)));
		let projection = Arc::new(ProjectionBuilder::new(
			Arc::clone(&store),
			config.projection_root.clone(),
		));

		info!(
			data_dir = %config.data_dir.display(),
			projection_root = %config.projection_root.display(),
			"Core initialized"
		);

		Ok(Arc::new(Self {
			config,
			db,
			store,
			projection,
		}))
	}

	/// Query options as configured.
	pub fn query_options(&self) -> QueryOptions {
		QueryOptions {
			fuzzy: self.config.fuzzy,
			fuzzy_threshold: self.config.fuzzy_threshold,
		}
	}

	/// An evaluator over this core's store.
	pub fn evaluator(&self) -> QueryEvaluator<'_> {
		QueryEvaluator::with_options(&self.store, self.query_options())
	}

	/// An importer honoring the configured ignore list.
	pub fn importer(&self) -> Result<Importer, import::ImportError> {
		Importer::new(Arc::clone(&self.store), &self.config.ignore_patterns)
	}

	/// Refresh saved queries and bring the projection in line with the
	/// store. Call after any interactive mutation burst.
	pub async fn project(&self) -> Result<projection::RebuildSummary, CoreError> {
		query::refresh_saved_queries(&self.store, &self.query_options()).await?;
		Ok(self.projection.rebuild().await?)
	}

	/// Start the background sync daemon over the projection root and the
	/// configured import roots.
	pub async fn start_daemon(
		&self,
		text_index: Option<Arc<dyn EmbeddingIndex>>,
		image_index: Option<Arc<dyn EmbeddingIndex>>,
	) -> Result<SyncDaemon, daemon::DaemonError> {
		let reconciler = Arc::new(Reconciler::new(
			Arc::clone(&self.store),
			Arc::clone(&self.projection),
			self.importer()?,
			ReconcilerOptions {
				query_options: self.query_options(),
				text_index,
				image_index,
			},
		));

		SyncDaemon::start(
			reconciler,
			self.config.import_roots.clone(),
			std::time::Duration::from_millis(self.config.debounce_ms),
		)
		.await
	}
}
