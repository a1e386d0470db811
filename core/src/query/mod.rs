//! Query evaluator
//!
//! Evaluates a flat query as a strict left-to-right fold over set
//! operations: no precedence, no nesting. Each term resolves through the
//! fuzzy matcher, expands to the transitive descendant closure in the
//! metatag DAG, and filters on the value pattern when present. Unknown
//! terms evaluate to the empty set; the diagnostics name the closest match
//! attempted so a typo degrades to "no results" with an explanation.

use crate::infra::db::entities::file;
use crate::store::{FileId, TagStore, TagStoreError};

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

pub mod codec;
pub mod fuzzy;
pub mod parser;

pub use fuzzy::TagMatch;
pub use parser::{Operator, Term, ValuePattern};

/// Default acceptance threshold: any similarity above zero is taken.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.0;

#[derive(Error, Debug)]
pub enum QueryError {
	#[error(transparent)]
	Store(#[from] TagStoreError),
}

/// Knobs for one evaluation.
#[derive(Debug, Clone)]
pub struct QueryOptions {
	/// Disable to force exact-name-only resolution.
	pub fuzzy: bool,
	/// Matches scoring at or below this are treated as "no such tag".
	pub fuzzy_threshold: f64,
}

impl Default for QueryOptions {
	fn default() -> Self {
		Self {
			fuzzy: true,
			fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
		}
	}
}

/// Per-term resolution record, returned for verbose output.
#[derive(Debug, Clone)]
pub struct TermDiagnostic {
	/// The term as typed.
	pub term: String,
	/// Tag name the term resolved to, if any candidate was accepted.
	pub resolved: Option<String>,
	/// Closest candidate attempted, even when rejected by the threshold.
	pub attempted: Option<TagMatch>,
	/// Size of the term's file set after value filtering.
	pub matched: usize,
}

/// Result of one evaluation: file ids in first-insertion order plus the
/// per-term diagnostics.
#[derive(Debug, Default)]
pub struct QueryOutcome {
	pub file_ids: Vec<FileId>,
	pub diagnostics: Vec<TermDiagnostic>,
}

/// Left-to-right query evaluation against a [`TagStore`].
pub struct QueryEvaluator<'a> {
	store: &'a TagStore,
	options: QueryOptions,
}

impl<'a> QueryEvaluator<'a> {
	pub fn new(store: &'a TagStore) -> Self {
		Self {
			store,
			options: QueryOptions::default(),
		}
	}

	pub fn with_options(store: &'a TagStore, options: QueryOptions) -> Self {
		Self { store, options }
	}

	/// Evaluate a query string.
	pub async fn evaluate(&self, query: &str) -> Result<QueryOutcome, QueryError> {
		let tokens = parser::tokenize(query);
		let steps = parser::parse(&tokens);
		if steps.is_empty() {
			return Ok(QueryOutcome::default());
		}

		let tags = self.store.tags().await?;
		let dag = self.store.dag().await?;
		let names_by_id: HashMap<i32, String> =
			tags.iter().map(|t| (t.id, t.name.clone())).collect();
		let ids_by_lower: HashMap<String, i32> =
			tags.iter().map(|t| (t.name.to_lowercase(), t.id)).collect();

		let mut result: Vec<FileId> = Vec::new();
		let mut members: HashSet<FileId> = HashSet::new();
		let mut diagnostics = Vec::new();

		for (op, term) in steps {
			let attempted = fuzzy::best_match(
				&term.tag,
				names_by_id.values().map(String::as_str),
				self.options.fuzzy,
			);

			let resolved = attempted
				.as_ref()
				.filter(|m| m.score > self.options.fuzzy_threshold)
				.map(|m| m.name.clone());

			let term_set = match resolved
				.as_ref()
				.and_then(|name| ids_by_lower.get(&name.to_lowercase()).copied())
			{
				Some(tag_id) => {
					let mut tag_ids = vec![tag_id];
					tag_ids.extend(dag.descendants_of(tag_id));
					self.term_file_ids(&tag_ids, term.value.as_ref()).await?
				}
				None => {
					debug!(term = %term.tag, ?attempted, "Query term did not resolve");
					Vec::new()
				}
			};

			diagnostics.push(TermDiagnostic {
				term: display_term(&term),
				resolved,
				attempted,
				matched: term_set.len(),
			});

			match op {
				Operator::Or => {
					for id in term_set {
						if members.insert(id) {
							result.push(id);
						}
					}
				}
				Operator::And => {
					let keep: HashSet<FileId> = term_set.into_iter().collect();
					result.retain(|id| keep.contains(id));
					members.retain(|id| keep.contains(id));
				}
				Operator::Minus => {
					let drop: HashSet<FileId> = term_set.into_iter().collect();
					result.retain(|id| !drop.contains(id));
					members.retain(|id| !drop.contains(id));
				}
			}
		}

		Ok(QueryOutcome {
			file_ids: result,
			diagnostics,
		})
	}

	/// Evaluate and join the ids back to file rows, preserving order.
	pub async fn evaluate_files(
		&self,
		query: &str,
	) -> Result<(Vec<file::Model>, Vec<TermDiagnostic>), QueryError> {
		let outcome = self.evaluate(query).await?;

		let by_id: HashMap<FileId, file::Model> = self
			.store
			.files()
			.await?
			.into_iter()
			.map(|f| (f.id, f))
			.collect();

		let files = outcome
			.file_ids
			.iter()
			.filter_map(|id| by_id.get(id).cloned())
			.collect();

		Ok((files, outcome.diagnostics))
	}

	/// File ids associated with any of `tag_ids`, filtered by the value
	/// pattern, deduplicated in first-association order.
	async fn term_file_ids(
		&self,
		tag_ids: &[i32],
		pattern: Option<&ValuePattern>,
	) -> Result<Vec<FileId>, QueryError> {
		let rows = self.store.files_with_tag_ids(tag_ids).await?;

		let mut seen = HashSet::new();
		let mut out = Vec::new();
		for (file, value) in rows {
			let passes = match pattern {
				None => true,
				Some(p) => value.as_deref().is_some_and(|v| p.matches(v)),
			};
			if passes && seen.insert(file.id) {
				out.push(file.id);
			}
		}

		Ok(out)
	}
}

/// Re-evaluate every saved query against current store state and refresh
/// its cached result set.
pub async fn refresh_saved_queries(
	store: &TagStore,
	options: &QueryOptions,
) -> Result<usize, QueryError> {
	let evaluator = QueryEvaluator::with_options(store, options.clone());
	let queries = store.saved_queries().await?;
	let refreshed = queries.len();

	for query in queries {
		let outcome = evaluator.evaluate(&query.expression).await?;
		store
			.upsert_saved_query(&query.name, &query.expression, &outcome.file_ids)
			.await?;
	}

	Ok(refreshed)
}

fn display_term(term: &Term) -> String {
	match &term.value {
		None => term.tag.clone(),
		Some(pattern) => format!("{}={pattern}", term.tag),
	}
}
