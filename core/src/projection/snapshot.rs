//! Last-known-good projection state
//!
//! The builder records every entry it owns (`Snapshot`) and every
//! filesystem change it makes (`ChangeJournal`). The daemon suppresses
//! echoes by consuming journal entries that explain an observed event:
//! an explicit diff against recorded writes, not a timing heuristic.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::trace;

/// What the projection put at a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
	Directory,
	/// Symlink and its expected target.
	Symlink(PathBuf),
}

/// Every path the projection currently owns, with its expected kind.
pub type Snapshot = BTreeMap<PathBuf, EntryKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
	Created,
	Removed,
}

/// Journal entries older than this many recorded changes are considered
/// stale; their matching watcher events were lost or never subscribed.
const JOURNAL_CAPACITY: usize = 8192;

/// Snapshot plus the journal of self-made changes awaiting their echo.
#[derive(Debug, Default)]
pub struct ProjectionState {
	snapshot: Snapshot,
	journal: HashMap<(PathBuf, ChangeKind), u32>,
	journal_len: usize,
}

impl ProjectionState {
	/// Expected kind for a path, if the projection owns it.
	pub fn expected(&self, path: &Path) -> Option<&EntryKind> {
		self.snapshot.get(path)
	}

	pub fn snapshot(&self) -> &Snapshot {
		&self.snapshot
	}

	/// Replace the snapshot after a rebuild.
	pub fn set_snapshot(&mut self, snapshot: Snapshot) {
		self.snapshot = snapshot;
	}

	/// Record a change the builder just made to the filesystem.
	pub fn record(&mut self, path: PathBuf, kind: ChangeKind) {
		if self.journal_len >= JOURNAL_CAPACITY {
			trace!("Change journal full, dropping stale entries");
			self.journal.clear();
			self.journal_len = 0;
		}
		*self.journal.entry((path, kind)).or_insert(0) += 1;
		self.journal_len += 1;
	}

	/// Consume one journal entry matching the observed event. Returns true
	/// when the event is an echo of the builder's own write.
	pub fn consume(&mut self, path: &Path, kind: ChangeKind) -> bool {
		let key = (path.to_path_buf(), kind);
		match self.journal.get_mut(&key) {
			Some(count) => {
				*count -= 1;
				if *count == 0 {
					self.journal.remove(&key);
				}
				self.journal_len = self.journal_len.saturating_sub(1);
				true
			}
			None => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn consume_matches_recorded_changes_once() {
		let mut state = ProjectionState::default();
		let path = PathBuf::from("/p/Tag/file.txt");

		state.record(path.clone(), ChangeKind::Created);
		assert!(state.consume(&path, ChangeKind::Created));
		assert!(!state.consume(&path, ChangeKind::Created));
	}

	#[test]
	fn kinds_do_not_cross_match() {
		let mut state = ProjectionState::default();
		let path = PathBuf::from("/p/Tag");

		state.record(path.clone(), ChangeKind::Removed);
		assert!(!state.consume(&path, ChangeKind::Created));
		assert!(state.consume(&path, ChangeKind::Removed));
	}

	#[test]
	fn duplicate_records_need_duplicate_consumes() {
		let mut state = ProjectionState::default();
		let path = PathBuf::from("/p/x");

		state.record(path.clone(), ChangeKind::Created);
		state.record(path.clone(), ChangeKind::Created);
		assert!(state.consume(&path, ChangeKind::Created));
		assert!(state.consume(&path, ChangeKind::Created));
		assert!(!state.consume(&path, ChangeKind::Created));
	}
}
