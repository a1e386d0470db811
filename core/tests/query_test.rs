//! Query evaluator integration tests: left-to-right semantics, transitive
//! metatag expansion, value patterns, fuzzy degradation.

mod helpers;

use helpers::{test_env, write_file};
use tagfs_core::QueryEvaluator;

#[tokio::test]
async fn evaluation_is_left_to_right_without_precedence() {
	let env = test_env().await;
	let store = &env.core.store;

	let fx = store
		.add_file(&write_file(&env.source, "fx.txt", "x").await)
		.await
		.unwrap();
	let fy = store
		.add_file(&write_file(&env.source, "fy.txt", "x").await)
		.await
		.unwrap();
	let fz = store
		.add_file(&write_file(&env.source, "fz.txt", "x").await)
		.await
		.unwrap();

	// fx: X; fy: X+Y; fz: Z
	store.tag(fx.id, "x", None).await.unwrap();
	store.tag(fy.id, "x", None).await.unwrap();
	store.tag(fy.id, "y", None).await.unwrap();
	store.tag(fz.id, "z", None).await.unwrap();

	let evaluator = QueryEvaluator::new(store);

	// ((X − Y) ∪ Z), not (X − (Y ∪ Z))
	let outcome = evaluator.evaluate("x minus y or z").await.unwrap();
	assert_eq!(outcome.file_ids, vec![fx.id, fz.id]);

	// the other association order proves order sensitivity
	let outcome = evaluator.evaluate("x or z minus y").await.unwrap();
	assert_eq!(outcome.file_ids, vec![fx.id, fz.id]);

	let outcome = evaluator.evaluate("x minus y").await.unwrap();
	assert_eq!(outcome.file_ids, vec![fx.id]);
}

#[tokio::test]
async fn implicit_and_between_adjacent_terms() {
	let env = test_env().await;
	let store = &env.core.store;

	let both = store
		.add_file(&write_file(&env.source, "both.txt", "x").await)
		.await
		.unwrap();
	let one = store
		.add_file(&write_file(&env.source, "one.txt", "x").await)
		.await
		.unwrap();

	store.tag(both.id, "rust", None).await.unwrap();
	store.tag(both.id, "paper", None).await.unwrap();
	store.tag(one.id, "rust", None).await.unwrap();

	let evaluator = QueryEvaluator::new(store);
	let outcome = evaluator.evaluate("rust paper").await.unwrap();
	assert_eq!(outcome.file_ids, vec![both.id]);
}

#[tokio::test]
async fn human_homo_sapiens_animal_scenario() {
	let env = test_env().await;
	let store = &env.core.store;

	let f1 = store
		.add_file(&write_file(&env.source, "f1.txt", "x").await)
		.await
		.unwrap();

	store.tag(f1.id, "human", None).await.unwrap();
	store.tag(f1.id, "Homo Sapiens", None).await.unwrap();

	let evaluator = QueryEvaluator::new(store);

	let outcome = evaluator.evaluate("human").await.unwrap();
	assert_eq!(outcome.file_ids, vec![f1.id]);

	let outcome = evaluator
		.evaluate(r#"human minus "Homo Sapiens""#)
		.await
		.unwrap();
	assert!(outcome.file_ids.is_empty());

	store.metatag("human", "animal").await.unwrap();

	// transitive closure through the metatag edge
	let outcome = evaluator.evaluate("animal").await.unwrap();
	assert_eq!(outcome.file_ids, vec![f1.id]);
}

#[tokio::test]
async fn value_patterns_filter_associations() {
	let env = test_env().await;
	let store = &env.core.store;

	let sean = store
		.add_file(&write_file(&env.source, "sean.txt", "x").await)
		.await
		.unwrap();
	store
		.tag(sean.id, "name", Some("Sean Pedersen"))
		.await
		.unwrap();

	let evaluator = QueryEvaluator::new(store);

	let outcome = evaluator.evaluate("name=Sean*").await.unwrap();
	assert_eq!(outcome.file_ids, vec![sean.id]);

	let outcome = evaluator.evaluate("name=Bob*").await.unwrap();
	assert!(outcome.file_ids.is_empty());

	let outcome = evaluator.evaluate("name=*sen").await.unwrap();
	assert_eq!(outcome.file_ids, vec![sean.id]);

	let outcome = evaluator.evaluate("name=*").await.unwrap();
	assert_eq!(outcome.file_ids, vec![sean.id]);

	// exact match needs the full value
	let outcome = evaluator.evaluate("name=Sean").await.unwrap();
	assert!(outcome.file_ids.is_empty());
	let outcome = evaluator.evaluate("name=Sean Pedersen").await.unwrap();
	assert!(outcome.file_ids.is_empty(), "unquoted spaces split the term");
	let outcome = evaluator
		.evaluate(r#""name=Sean Pedersen""#)
		.await
		.unwrap();
	assert_eq!(outcome.file_ids, vec![sean.id]);
}

#[tokio::test]
async fn unknown_terms_degrade_to_empty_with_diagnostics() {
	let env = test_env().await;
	let store = &env.core.store;

	let file = store
		.add_file(&write_file(&env.source, "a.txt", "x").await)
		.await
		.unwrap();
	store.tag(file.id, "paper", None).await.unwrap();

	let evaluator = QueryEvaluator::new(store);

	// a typo still finds the closest tag fuzzily
	let outcome = evaluator.evaluate("papre").await.unwrap();
	assert_eq!(outcome.file_ids, vec![file.id]);
	assert_eq!(outcome.diagnostics[0].resolved.as_deref(), Some("paper"));
	assert!(outcome.diagnostics[0].attempted.as_ref().unwrap().score < 1.0);

	// with fuzzy disabled the same typo matches nothing, but still reports
	// what it tried
	let exact = QueryEvaluator::with_options(
		store,
		tagfs_core::QueryOptions {
			fuzzy: false,
			..Default::default()
		},
	);
	let outcome = exact.evaluate("papre").await.unwrap();
	assert!(outcome.file_ids.is_empty());
	assert!(outcome.diagnostics[0].resolved.is_none());
}

#[tokio::test]
async fn merge_preserves_query_union() {
	let env = test_env().await;
	let store = &env.core.store;

	let fa = store
		.add_file(&write_file(&env.source, "fa.txt", "x").await)
		.await
		.unwrap();
	let fb = store
		.add_file(&write_file(&env.source, "fb.txt", "x").await)
		.await
		.unwrap();

	store.tag(fa.id, "alpha", None).await.unwrap();
	store.tag(fb.id, "beta", None).await.unwrap();

	let evaluator = QueryEvaluator::new(store);
	let before_a = evaluator.evaluate("alpha").await.unwrap().file_ids;
	let before_b = evaluator.evaluate("beta").await.unwrap().file_ids;

	store.merge_tag("alpha", "beta").await.unwrap();

	let after = evaluator.evaluate("beta").await.unwrap().file_ids;
	let mut expected: Vec<i32> = before_a.into_iter().chain(before_b).collect();
	expected.sort_unstable();
	let mut actual = after.clone();
	actual.sort_unstable();
	assert_eq!(actual, expected);

	// alpha no longer resolves exactly; exact-mode query returns nothing
	let exact = QueryEvaluator::with_options(
		store,
		tagfs_core::QueryOptions {
			fuzzy: false,
			..Default::default()
		},
	);
	assert!(exact.evaluate("alpha").await.unwrap().file_ids.is_empty());
}

#[tokio::test]
async fn group_queries_resolve_transitively_through_seeded_hierarchy() {
	let env = test_env().await;
	let store = &env.core.store;

	let doc = store
		.add_file(&write_file(&env.source, "thesis.pdf", "x").await)
		.await
		.unwrap();

	let evaluator = QueryEvaluator::new(store);
	let outcome = evaluator.evaluate("Documents").await.unwrap();
	assert_eq!(outcome.file_ids, vec![doc.id]);
}
