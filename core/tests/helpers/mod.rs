//! Shared setup for integration tests

// not every test binary uses every helper
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tagfs_core::{Config, Core};
use tempfile::TempDir;
use tokio::fs;

/// Everything a test needs: an isolated data dir, a projection root, a
/// source directory for real files, and a wired-up core.
pub struct TestEnv {
	pub core: Arc<Core>,
	pub source: PathBuf,
	pub import_root: PathBuf,
	// Dropped last, removing all of the above.
	_dir: TempDir,
}

impl TestEnv {
	pub fn projection_root(&self) -> &Path {
		self.core.projection.root()
	}
}

pub async fn test_env() -> TestEnv {
	let dir = tempfile::tempdir().expect("Failed to create temp dir");

	let source = dir.path().join("source");
	let import_root = dir.path().join("inbox");
	fs::create_dir_all(&source).await.unwrap();
	fs::create_dir_all(&import_root).await.unwrap();

	let mut config = Config::default_with_dir(dir.path().join("data"));
	config.projection_root = dir.path().join("TagFS");
	config.import_roots = vec![import_root.clone()];
	config.debounce_ms = 50;

	let core = Core::new(config).await.expect("Failed to init core");

	TestEnv {
		core,
		source,
		import_root,
		_dir: dir,
	}
}

/// Create a real file with content and return its canonical path.
pub async fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
	let path = dir.join(name);
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).await.unwrap();
	}
	fs::write(&path, content).await.unwrap();
	path
}

/// Names of the entries in a directory, sorted.
pub async fn dir_names(path: &Path) -> Vec<String> {
	let mut names = Vec::new();
	let mut entries = match fs::read_dir(path).await {
		Ok(entries) => entries,
		Err(_) => return names,
	};
	while let Some(entry) = entries.next_entry().await.unwrap() {
		names.push(entry.file_name().to_string_lossy().to_string());
	}
	names.sort();
	names
}

/// Every symlink below `root` as `(relative path, target)`, sorted.
pub async fn symlink_tree(root: &Path) -> Vec<(PathBuf, PathBuf)> {
	let mut out = Vec::new();
	let mut pending = vec![root.to_path_buf()];

	while let Some(dir) = pending.pop() {
		let mut entries = match fs::read_dir(&dir).await {
			Ok(entries) => entries,
			Err(_) => continue,
		};
		while let Some(entry) = entries.next_entry().await.unwrap() {
			let path = entry.path();
			let file_type = entry.file_type().await.unwrap();
			if file_type.is_dir() {
				pending.push(path);
			} else if file_type.is_symlink() {
				let target = fs::read_link(&path).await.unwrap();
				out.push((path.strip_prefix(root).unwrap().to_path_buf(), target));
			}
		}
	}

	out.sort();
	out
}
