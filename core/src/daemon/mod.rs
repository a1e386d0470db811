//! Sync daemon
//!
//! One watcher task per watched root: the projection root plus every
//! auto-import root. Raw notify events are funneled through an unbounded
//! channel, coalesced per path inside a debounce window, and reconciled
//! strictly in arrival order; each reconciliation awaits its store
//! mutation and the triggered re-projection before the next event is
//! taken. Roots reconcile concurrently; all writes still pass through the
//! store's single write path.

use crate::import::ImportError;
use crate::projection::ProjectionError;
use crate::store::TagStoreError;

use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use async_channel as chan;
use futures::StreamExt;
use futures_concurrency::stream::Merge;
use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, info, trace};

pub mod reconciler;

pub use reconciler::{Reconciler, ReconcilerOptions, WatchedRoot};

#[derive(Error, Debug)]
pub enum DaemonError {
	#[error("Watcher error: {0}")]
	Notify(#[from] notify::Error),

	#[error(transparent)]
	Store(#[from] TagStoreError),

	#[error(transparent)]
	Projection(#[from] ProjectionError),

	#[error(transparent)]
	Import(#[from] ImportError),

	#[error(transparent)]
	Query(#[from] crate::query::QueryError),
}

/// Logical filesystem change, after raw-event coalescing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsChange {
	Created { path: PathBuf, is_dir: bool },
	Removed { path: PathBuf, was_dir: Option<bool> },
	Renamed { from: PathBuf, to: PathBuf },
}

impl FsChange {
	/// Key path used for coalescing.
	fn key(&self) -> &Path {
		match self {
			Self::Created { path, .. } => path,
			Self::Removed { path, .. } => path,
			Self::Renamed { from, .. } => from,
		}
	}
}

/// Map one raw notify event to logical changes.
///
/// Rename pairs are only delivered pre-joined on platforms that report
/// `RenameMode::Both`; lone From/To halves degrade to remove/create, which
/// the reconciler treats equivalently.
fn classify_raw(event: &Event) -> Vec<FsChange> {
	match &event.kind {
		EventKind::Create(kind) => event
			.paths
			.first()
			.map(|path| FsChange::Created {
				path: path.clone(),
				is_dir: *kind == CreateKind::Folder,
			})
			.into_iter()
			.collect(),

		// A file closed after writing is a creation or update; indexing is
		// idempotent so both collapse to Created.
		EventKind::Access(AccessKind::Close(AccessMode::Write)) => event
			.paths
			.first()
			.map(|path| FsChange::Created {
				path: path.clone(),
				is_dir: false,
			})
			.into_iter()
			.collect(),

		EventKind::Remove(kind) => event
			.paths
			.first()
			.map(|path| FsChange::Removed {
				path: path.clone(),
				was_dir: match kind {
					RemoveKind::Folder => Some(true),
					RemoveKind::File => Some(false),
					_ => None,
				},
			})
			.into_iter()
			.collect(),

		EventKind::Modify(ModifyKind::Name(mode)) => match (mode, event.paths.as_slice()) {
			(RenameMode::Both, [from, to]) => vec![FsChange::Renamed {
				from: from.clone(),
				to: to.clone(),
			}],
			(RenameMode::From, [path]) => vec![FsChange::Removed {
				path: path.clone(),
				was_dir: None,
			}],
			(RenameMode::To, [path]) => vec![FsChange::Created {
				path: path.clone(),
				is_dir: false,
			}],
			_ => Vec::new(),
		},

		other => {
			trace!(kind = ?other, "Ignoring event kind");
			Vec::new()
		}
	}
}

/// Per-path coalescing buffer; entries become ready once no new event for
/// the same path arrived within the window.
struct DebounceBuffer {
	window: Duration,
	pending: Vec<(FsChange, Instant)>,
}

impl DebounceBuffer {
	fn new(window: Duration) -> Self {
		Self {
			window,
			pending: Vec::new(),
		}
	}

	fn push(&mut self, change: FsChange) {
		if let Some((existing, at)) = self
			.pending
			.iter_mut()
			.find(|(c, _)| c.key() == change.key())
		{
			*existing = coalesce(existing.clone(), change);
			*at = Instant::now();
		} else {
			self.pending.push((change, Instant::now()));
		}
	}

	fn drain_ready(&mut self) -> Vec<FsChange> {
		let window = self.window;
		let mut ready = Vec::new();
		self.pending.retain(|(change, at)| {
			if at.elapsed() >= window {
				ready.push(change.clone());
				false
			} else {
				true
			}
		});
		ready
	}

	fn drain_all(&mut self) -> Vec<FsChange> {
		self.pending.drain(..).map(|(change, _)| change).collect()
	}
}

/// Merge two changes for the same path into one logical event.
fn coalesce(old: FsChange, new: FsChange) -> FsChange {
	match (old, new) {
		// create+delete inside one window cancels down to the delete; the
		// reconciler confirms against the real filesystem either way
		(FsChange::Created { is_dir, .. }, FsChange::Removed { path, .. }) => FsChange::Removed {
			path,
			was_dir: Some(is_dir),
		},
		// editor atomic save: delete then recreate is just an update
		(FsChange::Removed { .. }, created @ FsChange::Created { .. }) => created,
		(_, new) => new,
	}
}

/// A live watcher over one root.
struct RootWatcher {
	root: PathBuf,
	// Held to keep the OS watch registered.
	_watcher: RecommendedWatcher,
	stop_tx: chan::Sender<()>,
	handle: Option<JoinHandle<()>>,
}

impl RootWatcher {
	fn spawn(
		root: WatchedRoot,
		reconciler: Arc<Reconciler>,
		window: Duration,
	) -> Result<Self, DaemonError> {
		let path = root.path().to_path_buf();

		let (events_tx, events_rx) = chan::unbounded();
		let (stop_tx, stop_rx) = chan::bounded(1);

		let mut watcher = RecommendedWatcher::new(
			move |result| {
				if !events_tx.is_closed() && events_tx.send_blocking(result).is_err() {
					error!("Unable to send watcher event to sync daemon;");
				}
			},
			NotifyConfig::default(),
		)?;
		watcher.watch(&path, RecursiveMode::Recursive)?;

		info!(root = %path.display(), "Watching root");

		let handle = spawn(Self::run(root, reconciler, events_rx, stop_rx, window));

		Ok(Self {
			root: path,
			_watcher: watcher,
			stop_tx,
			handle: Some(handle),
		})
	}

	async fn run(
		root: WatchedRoot,
		reconciler: Arc<Reconciler>,
		events_rx: chan::Receiver<notify::Result<Event>>,
		stop_rx: chan::Receiver<()>,
		window: Duration,
	) {
		enum StreamMessage {
			NewEvent(notify::Result<Event>),
			Tick,
			Stop,
		}

		let mut buffer = DebounceBuffer::new(window);

		let mut tick = interval_at(Instant::now() + window, window);
		tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

		let mut msg_stream = pin!((
			events_rx.map(StreamMessage::NewEvent),
			IntervalStream::new(tick).map(|_| StreamMessage::Tick),
			stop_rx.map(|()| StreamMessage::Stop),
		)
			.merge());

		while let Some(msg) = msg_stream.next().await {
			match msg {
				StreamMessage::NewEvent(Ok(event)) => {
					for change in classify_raw(&event) {
						buffer.push(change);
					}
				}

				StreamMessage::NewEvent(Err(e)) => error!(?e, "Watcher error;"),

				// Reconciliation is awaited inline: events keep queuing in
				// the channel, but nothing is applied out of order.
				StreamMessage::Tick => {
					for change in buffer.drain_ready() {
						reconciler.reconcile(&root, change).await;
					}
				}

				StreamMessage::Stop => {
					for change in buffer.drain_all() {
						reconciler.reconcile(&root, change).await;
					}
					debug!(root = %root.path().display(), "Root watcher received stop signal");
					break;
				}
			}
		}

		info!(root = %root.path().display(), "Root watcher stopped");
	}

	async fn shutdown(&mut self) {
		if self.stop_tx.send(()).await.is_err() {
			error!(root = %self.root.display(), "Root watcher stop channel closed;");
		}
		if let Some(handle) = self.handle.take() {
			if let Err(e) = handle.await {
				error!(?e, "Failed to join root watcher task;");
			}
		}
	}
}

/// The long-lived background synchronizer.
pub struct SyncDaemon {
	watchers: Vec<RootWatcher>,
}

impl SyncDaemon {
	/// Sweep the import roots, restore the projection, then start watching.
	/// The initial rebuild happens before any watcher exists, so it cannot
	/// echo into the event stream.
	pub async fn start(
		reconciler: Arc<Reconciler>,
		import_roots: Vec<PathBuf>,
		debounce: Duration,
	) -> Result<Self, DaemonError> {
		for root in &import_roots {
			if !root.is_dir() {
				error!(root = %root.display(), "Import root is not a directory, skipping;");
				continue;
			}
			reconciler.importer().import_root(root).await?;
		}

		reconciler.builder().rebuild().await?;

		let mut watchers = vec![RootWatcher::spawn(
			WatchedRoot::Projection(reconciler.builder().root().to_path_buf()),
			Arc::clone(&reconciler),
			debounce,
		)?];

		for root in import_roots {
			if !root.is_dir() {
				continue;
			}
			watchers.push(RootWatcher::spawn(
				WatchedRoot::Import(root),
				Arc::clone(&reconciler),
				debounce,
			)?);
		}

		Ok(Self { watchers })
	}

	/// Graceful shutdown: every in-flight reconciliation finishes first.
	pub async fn shutdown(mut self) {
		for watcher in &mut self.watchers {
			watcher.shutdown().await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn created(path: &str) -> FsChange {
		FsChange::Created {
			path: PathBuf::from(path),
			is_dir: false,
		}
	}

	fn removed(path: &str) -> FsChange {
		FsChange::Removed {
			path: PathBuf::from(path),
			was_dir: None,
		}
	}

	#[test]
	fn coalesce_collapses_atomic_save() {
		let merged = coalesce(removed("/r/a.txt"), created("/r/a.txt"));
		assert_eq!(merged, created("/r/a.txt"));
	}

	#[test]
	fn coalesce_keeps_delete_after_create() {
		let merged = coalesce(created("/r/a.txt"), removed("/r/a.txt"));
		assert_eq!(
			merged,
			FsChange::Removed {
				path: PathBuf::from("/r/a.txt"),
				was_dir: Some(false),
			}
		);
	}

	#[tokio::test(start_paused = true)]
	async fn debounce_merges_bursts_per_path() {
		let mut buffer = DebounceBuffer::new(Duration::from_millis(100));

		buffer.push(created("/r/a.txt"));
		buffer.push(created("/r/a.txt"));
		buffer.push(created("/r/b.txt"));
		assert!(buffer.drain_ready().is_empty());

		tokio::time::advance(Duration::from_millis(150)).await;
		let ready = buffer.drain_ready();
		assert_eq!(ready.len(), 2);
		assert!(buffer.drain_ready().is_empty());
	}
}
