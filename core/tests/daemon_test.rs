//! Sync daemon integration tests: real watchers over real symlink trees.
//!
//! These tests drive the daemon the way a user would, by editing the
//! projection or dropping files into an import root, and assert on the
//! store state it infers. Waits are generous because inotify delivery and
//! the debounce window are both asynchronous.

mod helpers;

use helpers::{dir_names, test_env, write_file};
use std::time::Duration;
use tokio::fs;
use tokio::time::sleep;

const SETTLE: Duration = Duration::from_millis(900);

#[tokio::test]
async fn deleting_a_symlink_untags_exactly_that_tag() {
	let env = test_env().await;
	let store = &env.core.store;

	let file = store
		.add_file(&write_file(&env.source, "doc.txt", "x").await)
		.await
		.unwrap();
	store.tag(file.id, "alpha", None).await.unwrap();
	store.tag(file.id, "beta", None).await.unwrap();

	let daemon = env.core.start_daemon(None, None).await.unwrap();
	sleep(SETTLE).await;

	let link = env.projection_root().join("alpha").join("doc.txt");
	assert!(fs::symlink_metadata(&link).await.is_ok());
	fs::remove_file(&link).await.unwrap();

	sleep(SETTLE).await;

	let tags: Vec<String> = store
		.tags_of_file(file.id)
		.await
		.unwrap()
		.into_iter()
		.map(|(tag, _)| tag.name)
		.collect();
	assert!(!tags.contains(&"alpha".to_string()), "alpha should be gone");
	assert!(tags.contains(&"beta".to_string()), "beta must survive");

	// still present under every other tag directory
	assert!(dir_names(&env.projection_root().join("beta"))
		.await
		.contains(&"doc.txt".to_string()));

	daemon.shutdown().await;
}

#[tokio::test]
async fn deleting_a_tag_directory_removes_the_tag() {
	let env = test_env().await;
	let store = &env.core.store;

	let file = store
		.add_file(&write_file(&env.source, "doc.txt", "x").await)
		.await
		.unwrap();
	store.tag(file.id, "victim", None).await.unwrap();

	let daemon = env.core.start_daemon(None, None).await.unwrap();
	sleep(SETTLE).await;

	fs::remove_dir_all(env.projection_root().join("victim"))
		.await
		.unwrap();
	sleep(SETTLE).await;

	assert!(store.resolve_tag("victim").await.unwrap().is_none());

	daemon.shutdown().await;
}

#[tokio::test]
async fn creating_a_query_directory_saves_and_populates_it() {
	let env = test_env().await;
	let store = &env.core.store;

	let file = store
		.add_file(&write_file(&env.source, "notes.md", "x").await)
		.await
		.unwrap();
	store.tag(file.id, "notes", None).await.unwrap();

	let daemon = env.core.start_daemon(None, None).await.unwrap();
	sleep(SETTLE).await;

	let query_dir = env.projection_root().join("Queries").join("notes and md");
	fs::create_dir(&query_dir).await.unwrap();
	sleep(SETTLE).await;

	let saved = store.saved_queries().await.unwrap();
	assert!(saved.iter().any(|q| q.name == "notes and md"));
	assert!(dir_names(&query_dir).await.contains(&"notes.md".to_string()));

	daemon.shutdown().await;
}

#[tokio::test]
async fn creating_a_bare_term_directory_creates_the_tag() {
	let env = test_env().await;
	let store = &env.core.store;

	let daemon = env.core.start_daemon(None, None).await.unwrap();
	sleep(SETTLE).await;

	fs::create_dir(env.projection_root().join("fresh-tag"))
		.await
		.unwrap();
	sleep(SETTLE).await;

	assert!(store.resolve_tag("fresh-tag").await.unwrap().is_some());

	daemon.shutdown().await;
}

#[tokio::test]
async fn import_root_files_are_indexed_with_hierarchy_tags() {
	let env = test_env().await;
	let store = &env.core.store;

	let daemon = env.core.start_daemon(None, None).await.unwrap();
	sleep(SETTLE).await;

	let path = write_file(&env.import_root, "projects/rust/notes.md", "x").await;
	sleep(SETTLE).await;

	let file = store
		.file_by_path(&path)
		.await
		.unwrap()
		.expect("file should be auto-imported");

	let tags: Vec<String> = store
		.tags_of_file(file.id)
		.await
		.unwrap()
		.into_iter()
		.map(|(tag, _)| tag.name)
		.collect();
	assert!(tags.contains(&"projects".to_string()));
	assert!(tags.contains(&"rust".to_string()));

	// hierarchy order became a metatag chain
	let parents: Vec<String> = store
		.metatags_of("rust")
		.await
		.unwrap()
		.into_iter()
		.map(|t| t.name)
		.collect();
	assert!(parents.contains(&"projects".to_string()));

	daemon.shutdown().await;
}

#[tokio::test]
async fn deleting_an_imported_file_removes_it_from_the_store() {
	let env = test_env().await;
	let store = &env.core.store;

	let path = write_file(&env.import_root, "todo.txt", "x").await;

	// startup sweep picks up pre-existing files
	let daemon = env.core.start_daemon(None, None).await.unwrap();
	sleep(SETTLE).await;
	assert!(store.file_by_path(&path).await.unwrap().is_some());

	fs::remove_file(&path).await.unwrap();
	sleep(SETTLE).await;

	assert!(store.file_by_path(&path).await.unwrap().is_none());

	daemon.shutdown().await;
}

#[tokio::test]
async fn moving_an_imported_file_renames_its_canonical_path() {
	let env = test_env().await;
	let store = &env.core.store;

	let old_path = write_file(&env.import_root, "draft.md", "x").await;

	let daemon = env.core.start_daemon(None, None).await.unwrap();
	sleep(SETTLE).await;
	let file = store.file_by_path(&old_path).await.unwrap().unwrap();

	let new_path = env.import_root.join("published.md");
	fs::rename(&old_path, &new_path).await.unwrap();
	sleep(SETTLE).await;

	let renamed = store.file_by_id(file.id).await.unwrap().unwrap();
	assert_eq!(renamed.name, "published.md");
	assert!(store.file_by_path(&old_path).await.unwrap().is_none());

	daemon.shutdown().await;
}

#[tokio::test]
async fn projection_writes_do_not_bounce_back_as_mutations() {
	let env = test_env().await;
	let store = &env.core.store;

	let file = store
		.add_file(&write_file(&env.source, "stable.txt", "x").await)
		.await
		.unwrap();
	store.tag(file.id, "keep", None).await.unwrap();

	let daemon = env.core.start_daemon(None, None).await.unwrap();
	sleep(SETTLE).await;

	let tags_before = store.tags_of_file(file.id).await.unwrap().len();

	// interactive mutation + re-projection while the watcher is live: the
	// builder's own writes must be swallowed by echo suppression
	store.tag(file.id, "extra", None).await.unwrap();
	env.core.project().await.unwrap();
	sleep(SETTLE).await;

	store.untag(file.id, "extra").await.unwrap();
	env.core.project().await.unwrap();
	sleep(SETTLE).await;

	let tags_after = store.tags_of_file(file.id).await.unwrap().len();
	assert_eq!(tags_before, tags_after);
	assert!(store.resolve_tag("keep").await.unwrap().is_some());
	assert!(dir_names(&env.projection_root().join("keep"))
		.await
		.contains(&"stable.txt".to_string()));

	daemon.shutdown().await;
}
