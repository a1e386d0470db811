//! Query text ⇄ directory name encoding
//!
//! Directory names double as serialized queries, so characters the
//! filesystem reserves (and the escape character itself) are percent-encoded
//! when a query is materialized and decoded when the daemon reads the name
//! back. `decode(encode(s)) == s` for every string.

/// Escape a query string for use as a single directory name.
pub fn encode_dirname(query: &str) -> String {
	let mut out = String::with_capacity(query.len());
	for (i, c) in query.chars().enumerate() {
		match c {
			'%' => out.push_str("%25"),
			'/' => out.push_str("%2F"),
			'\\' => out.push_str("%5C"),
			'\0' => out.push_str("%00"),
			// a leading dot would make the directory hidden
			'.' if i == 0 => out.push_str("%2E"),
			_ => out.push(c),
		}
	}
	out
}

/// Reverse [`encode_dirname`]. Malformed escapes pass through verbatim.
pub fn decode_dirname(name: &str) -> String {
	let bytes = name.as_bytes();
	let mut out = String::with_capacity(name.len());
	let mut i = 0;

	while i < bytes.len() {
		if bytes[i] == b'%' {
			if let (Some(hi), Some(lo)) = (
				bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
				bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
			) {
				out.push(char::from((hi * 16 + lo) as u8));
				i += 3;
				continue;
			}
		}

		// not an escape: copy the full char
		let c = name[i..].chars().next().expect("index is on a char boundary");
		out.push(c);
		i += c.len_utf8();
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_reserved_characters() {
		for query in [
			"papers and pdf",
			"path=/usr/local/*",
			"50% off",
			".hidden minus dot",
			r"back\slash",
			"plain",
			"ünïcode tåg",
		] {
			assert_eq!(decode_dirname(&encode_dirname(query)), query);
		}
	}

	#[test]
	fn encoded_names_contain_no_separators() {
		let encoded = encode_dirname("a/b\\c");
		assert!(!encoded.contains('/'));
		assert!(!encoded.contains('\\'));
	}

	#[test]
	fn leading_dot_is_escaped() {
		assert!(!encode_dirname(".config").starts_with('.'));
	}

	#[test]
	fn malformed_escape_passes_through() {
		assert_eq!(decode_dirname("50%"), "50%");
		assert_eq!(decode_dirname("%zz"), "%zz");
	}
}
