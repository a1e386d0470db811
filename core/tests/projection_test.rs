//! Projection builder integration tests: real symlink trees under a temp
//! root.

mod helpers;

use helpers::{dir_names, symlink_tree, test_env, write_file};

#[tokio::test]
async fn rebuild_renders_tag_dirs_with_transitive_files() {
	let env = test_env().await;
	let store = &env.core.store;

	let human_file = store
		.add_file(&write_file(&env.source, "human.txt", "x").await)
		.await
		.unwrap();
	store.tag(human_file.id, "human", None).await.unwrap();
	store.metatag("human", "animal").await.unwrap();

	env.core.projection.rebuild().await.unwrap();

	let root = env.projection_root();
	let human_dir = dir_names(&root.join("human")).await;
	assert!(human_dir.contains(&"human.txt".to_string()));

	// the parent tag's directory carries the descendant's files
	let animal_dir = dir_names(&root.join("animal")).await;
	assert!(animal_dir.contains(&"human.txt".to_string()));

	// fixed roots exist
	let top = dir_names(root).await;
	assert!(top.contains(&"Queries".to_string()));
	assert!(top.contains(&"Search Texts".to_string()));
	assert!(top.contains(&"Search Images".to_string()));
}

#[tokio::test]
async fn rebuild_is_idempotent() {
	let env = test_env().await;
	let store = &env.core.store;

	let a = store
		.add_file(&write_file(&env.source, "a.md", "x").await)
		.await
		.unwrap();
	let b = store
		.add_file(&write_file(&env.source, "b.md", "x").await)
		.await
		.unwrap();
	store.tag(a.id, "notes", None).await.unwrap();
	store.tag(b.id, "notes", None).await.unwrap();

	env.core.projection.rebuild().await.unwrap();
	let first = symlink_tree(env.projection_root()).await;

	let summary = env.core.projection.rebuild().await.unwrap();
	let second = symlink_tree(env.projection_root()).await;

	assert_eq!(first, second);
	assert_eq!(summary.created, 0);
	assert_eq!(summary.removed, 0);
}

#[tokio::test]
async fn group_folders_classify_by_extension() {
	let env = test_env().await;
	let store = &env.core.store;

	store
		.add_file(&write_file(&env.source, "photo.png", "x").await)
		.await
		.unwrap();
	store
		.add_file(&write_file(&env.source, "main.rs", "x").await)
		.await
		.unwrap();

	env.core.projection.rebuild().await.unwrap();

	let root = env.projection_root();
	assert!(dir_names(&root.join("Images")).await.contains(&"photo.png".to_string()));
	assert!(dir_names(&root.join("Source Code")).await.contains(&"main.rs".to_string()));
	assert!(!dir_names(&root.join("Images")).await.contains(&"main.rs".to_string()));
}

#[tokio::test]
async fn display_name_collisions_are_disambiguated() {
	let env = test_env().await;
	let store = &env.core.store;

	let first = store
		.add_file(&write_file(&env.source, "one/report.pdf", "1").await)
		.await
		.unwrap();
	let second = store
		.add_file(&write_file(&env.source, "two/report.pdf", "2").await)
		.await
		.unwrap();
	store.tag(first.id, "papers", None).await.unwrap();
	store.tag(second.id, "papers", None).await.unwrap();

	env.core.projection.rebuild().await.unwrap();

	let names = dir_names(&env.projection_root().join("papers")).await;
	assert_eq!(names, vec!["report (1).pdf".to_string(), "report.pdf".to_string()]);
}

#[tokio::test]
async fn stale_entries_are_removed_on_rebuild() {
	let env = test_env().await;
	let store = &env.core.store;

	let file = store
		.add_file(&write_file(&env.source, "a.txt", "x").await)
		.await
		.unwrap();
	store.tag(file.id, "temp", None).await.unwrap();
	env.core.projection.rebuild().await.unwrap();
	assert!(env.projection_root().join("temp").is_dir());

	store.remove_tag("temp").await.unwrap();
	env.core.projection.rebuild().await.unwrap();

	assert!(!env.projection_root().join("temp").exists());
	// the file's symlink under its extension tag is untouched
	assert!(dir_names(&env.projection_root().join("txt"))
		.await
		.contains(&"a.txt".to_string()));
}

#[tokio::test]
async fn foreign_entries_are_never_overwritten() {
	let env = test_env().await;
	let store = &env.core.store;

	let file = store
		.add_file(&write_file(&env.source, "a.txt", "x").await)
		.await
		.unwrap();
	store.tag(file.id, "docs", None).await.unwrap();

	// the user (or something else) already owns this path as a real file
	tokio::fs::create_dir_all(env.projection_root().join("docs"))
		.await
		.unwrap();
	tokio::fs::write(env.projection_root().join("docs/a.txt"), b"precious")
		.await
		.unwrap();

	let summary = env.core.projection.rebuild().await.unwrap();
	assert!(summary.conflicts > 0);

	let content = tokio::fs::read(env.projection_root().join("docs/a.txt"))
		.await
		.unwrap();
	assert_eq!(content, b"precious");
}

#[tokio::test]
async fn saved_queries_materialize_under_the_query_root() {
	let env = test_env().await;
	let store = &env.core.store;

	let file = store
		.add_file(&write_file(&env.source, "a.md", "x").await)
		.await
		.unwrap();
	store.tag(file.id, "notes", None).await.unwrap();

	store
		.upsert_saved_query("notes and md", "notes and md", &[file.id])
		.await
		.unwrap();

	env.core.projection.rebuild().await.unwrap();

	let query_dir = env
		.projection_root()
		.join("Queries")
		.join("notes and md");
	assert!(dir_names(&query_dir).await.contains(&"a.md".to_string()));
}

#[tokio::test]
async fn tag_names_with_separators_are_encoded() {
	let env = test_env().await;
	let store = &env.core.store;

	let file = store
		.add_file(&write_file(&env.source, "a.txt", "x").await)
		.await
		.unwrap();
	store.tag(file.id, "a/b", None).await.unwrap();

	env.core.projection.rebuild().await.unwrap();

	let top = dir_names(env.projection_root()).await;
	assert!(top.contains(&"a%2Fb".to_string()));
	assert!(dir_names(&env.projection_root().join("a%2Fb"))
		.await
		.contains(&"a.txt".to_string()));
}
