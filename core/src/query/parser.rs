//! Query tokenizer and term grammar
//!
//! Queries are flat token sequences, no nesting: terms interleaved with the
//! operator words `and`, `or`, `minus` (case-insensitive). Quoted tokens
//! keep embedded whitespace. A term is `name` or `name=pattern`, where the
//! pattern supports `*` as a prefix and/or suffix wildcard.

use regex::Regex;
use std::sync::OnceLock;

/// Set operator applied between the running result and the next term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
	And,
	Or,
	Minus,
}

impl Operator {
	pub fn from_token(token: &str) -> Option<Self> {
		match token.to_lowercase().as_str() {
			"and" => Some(Self::And),
			"or" => Some(Self::Or),
			"minus" => Some(Self::Minus),
			_ => None,
		}
	}
}

/// Value filter attached to a term via `name=pattern`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValuePattern {
	/// Bare `*`: any value at all.
	Any,
	Exact(String),
	Prefix(String),
	Suffix(String),
	Contains(String),
}

impl ValuePattern {
	pub fn parse(pattern: &str) -> Self {
		let starts = pattern.starts_with('*');
		let ends = pattern.len() > 1 && pattern.ends_with('*');
		let core = pattern.trim_matches('*');

		if core.is_empty() {
			Self::Any
		} else if starts && ends {
			Self::Contains(core.to_string())
		} else if ends {
			Self::Prefix(core.to_string())
		} else if starts {
			Self::Suffix(core.to_string())
		} else {
			Self::Exact(pattern.to_string())
		}
	}

	/// Match an association value, case-insensitively.
	pub fn matches(&self, value: &str) -> bool {
		let value = value.to_lowercase();
		match self {
			Self::Any => true,
			Self::Exact(p) => value == p.to_lowercase(),
			Self::Prefix(p) => value.starts_with(&p.to_lowercase()),
			Self::Suffix(p) => value.ends_with(&p.to_lowercase()),
			Self::Contains(p) => value.contains(&p.to_lowercase()),
		}
	}
}

impl std::fmt::Display for ValuePattern {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Any => write!(f, "*"),
			Self::Exact(p) => write!(f, "{p}"),
			Self::Prefix(p) => write!(f, "{p}*"),
			Self::Suffix(p) => write!(f, "*{p}"),
			Self::Contains(p) => write!(f, "*{p}*"),
		}
	}
}

/// One query term: a tag reference plus an optional value filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
	pub tag: String,
	pub value: Option<ValuePattern>,
}

impl Term {
	fn parse(token: &str) -> Self {
		match token.split_once('=') {
			Some((tag, pattern)) if !tag.is_empty() => Self {
				tag: tag.trim().to_string(),
				value: Some(ValuePattern::parse(pattern)),
			},
			_ => Self {
				tag: token.trim().to_string(),
				value: None,
			},
		}
	}
}

fn token_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r#"'[^']*'|"[^"]*"|\S+"#).expect("token regex is valid"))
}

/// Split a query string into tokens, stripping surrounding quotes.
pub fn tokenize(query: &str) -> Vec<String> {
	token_regex()
		.find_iter(query)
		.map(|m| {
			let token = m.as_str();
			if (token.starts_with('"') && token.ends_with('"') && token.len() >= 2)
				|| (token.starts_with('\'') && token.ends_with('\'') && token.len() >= 2)
			{
				token[1..token.len() - 1].to_string()
			} else {
				token.to_string()
			}
		})
		.collect()
}

/// Fold a token stream into `(operator, term)` steps, left to right.
///
/// The first term gets `Or` so the fold can start from the empty set;
/// adjacent terms with no explicit operator get the implicit `And`. A
/// trailing operator with no term is dropped.
pub fn parse(tokens: &[String]) -> Vec<(Operator, Term)> {
	let mut steps = Vec::new();
	let mut pending: Option<Operator> = None;

	for token in tokens {
		if let Some(op) = Operator::from_token(token) {
			// consecutive operators: the latest one wins
			pending = Some(op);
			continue;
		}

		let op = match (pending.take(), steps.is_empty()) {
			(_, true) => Operator::Or,
			(Some(op), false) => op,
			(None, false) => Operator::And,
		};
		steps.push((op, Term::parse(token)));
	}

	steps
}

/// Strip a `top_k=N` token anywhere in the list and return it separately;
/// used by the daemon for semantic-search directory names.
pub fn extract_top_k(tokens: Vec<String>) -> (Vec<String>, Option<usize>) {
	let mut top_k = None;
	let rest = tokens
		.into_iter()
		.filter(|token| {
			if let Some(value) = token.strip_prefix("top_k=") {
				top_k = value.parse().ok();
				false
			} else {
				true
			}
		})
		.collect();

	(rest, top_k)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tokenizes_quoted_terms() {
		let tokens = tokenize(r#"human minus "Homo Sapiens""#);
		assert_eq!(tokens, vec!["human", "minus", "Homo Sapiens"]);
	}

	#[test]
	fn parses_operators_left_to_right() {
		let steps = parse(&tokenize("x minus y or z"));
		assert_eq!(steps.len(), 3);
		assert_eq!(steps[0].0, Operator::Or);
		assert_eq!(steps[1].0, Operator::Minus);
		assert_eq!(steps[2].0, Operator::Or);
	}

	#[test]
	fn adjacent_terms_get_implicit_and() {
		let steps = parse(&tokenize("papers pdf"));
		assert_eq!(steps[1].0, Operator::And);
	}

	#[test]
	fn trailing_operator_is_dropped() {
		let steps = parse(&tokenize("papers and"));
		assert_eq!(steps.len(), 1);
	}

	#[test]
	fn value_terms_parse_patterns() {
		let steps = parse(&tokenize("name=Sean*"));
		let term = &steps[0].1;
		assert_eq!(term.tag, "name");
		assert_eq!(term.value, Some(ValuePattern::Prefix("Sean".to_string())));

		assert_eq!(ValuePattern::parse("*"), ValuePattern::Any);
		assert_eq!(ValuePattern::parse("*sen"), ValuePattern::Suffix("sen".to_string()));
		assert_eq!(
			ValuePattern::parse("*ped*"),
			ValuePattern::Contains("ped".to_string())
		);
	}

	#[test]
	fn value_matching_is_case_insensitive() {
		assert!(ValuePattern::parse("Sean*").matches("sean pedersen"));
		assert!(ValuePattern::parse("*SEN").matches("Sean Pedersen"));
		assert!(!ValuePattern::parse("Bob*").matches("Sean Pedersen"));
		assert!(ValuePattern::parse("*").matches("anything"));
	}

	#[test]
	fn extracts_top_k_suffix() {
		let (tokens, top_k) = extract_top_k(tokenize("winter landscape top_k=5"));
		assert_eq!(tokens, vec!["winter", "landscape"]);
		assert_eq!(top_k, Some(5));

		let (tokens, top_k) = extract_top_k(tokenize("just a query"));
		assert_eq!(tokens.len(), 3);
		assert_eq!(top_k, None);
	}
}
