//! File type grouping
//!
//! Extension → group classification used for the group folders in the
//! projection and for the seeded group/extension tag hierarchy. Extension
//! matching only; files without a known extension fall outside every group.

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

/// Coarse file-type groups rendered as folders under the projection root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
pub enum FileTypeGroup {
	Images,
	Videos,
	Documents,
	SourceCode,
	Configs,
	Archives,
	Blobs,
	Misc,
}

impl FileTypeGroup {
	/// Folder/tag name for this group.
	pub fn name(&self) -> &'static str {
		match self {
			Self::Images => "Images",
			Self::Videos => "Videos",
			Self::Documents => "Documents",
			Self::SourceCode => "Source Code",
			Self::Configs => "Configs",
			Self::Archives => "Archives",
			Self::Blobs => "Blobs",
			Self::Misc => "Misc",
		}
	}

	/// Extensions classified into this group, lowercased, without dots.
	pub fn extensions(&self) -> &'static [&'static str] {
		match self {
			Self::Images => &["jpg", "jpeg", "png", "svg", "tif", "ico", "icns", "webp"],
			Self::Videos => &["mp4", "gif", "webm", "avi", "mkv", "mov"],
			Self::Documents => &["txt", "md", "rst", "pdf", "epub", "doc", "docx"],
			Self::SourceCode => &[
				"sh", "py", "pyx", "ipynb", "c", "h", "cpp", "rs", "erl", "ex", "js", "ts",
				"css", "html", "sql",
			],
			Self::Configs => &["yml", "yaml", "xml", "conf", "ini", "toml", "json", "lock"],
			Self::Archives => &[
				"zip", "gz", "xz", "z", "sz", "lz", "bz2", "tar", "iso", "7z", "rar",
			],
			Self::Blobs => &[
				"bin", "pyc", "so", "o", "ar", "a", "lib", "rmeta", "jar", "exe",
			],
			Self::Misc => &["ll", "d", "tag", "blend", "map"],
		}
	}

	/// Classify a lowercased extension.
	pub fn from_extension(extension: &str) -> Option<Self> {
		let extension = extension.to_lowercase();
		Self::iter().find(|group| group.extensions().contains(&extension.as_str()))
	}

	/// All groups, in rendering order.
	pub fn all() -> impl Iterator<Item = Self> {
		Self::iter()
	}

	/// Whether `name` collides with a group folder, ignoring case.
	pub fn is_group_name(name: &str) -> bool {
		Self::iter().any(|group| group.name().eq_ignore_ascii_case(name))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classifies_known_extensions() {
		assert_eq!(FileTypeGroup::from_extension("rs"), Some(FileTypeGroup::SourceCode));
		assert_eq!(FileTypeGroup::from_extension("PDF"), Some(FileTypeGroup::Documents));
		assert_eq!(FileTypeGroup::from_extension("tar"), Some(FileTypeGroup::Archives));
	}

	#[test]
	fn unknown_extension_has_no_group() {
		assert_eq!(FileTypeGroup::from_extension("xyz123"), None);
	}

	#[test]
	fn extensions_do_not_overlap_between_groups() {
		let mut seen = std::collections::HashSet::new();
		for group in FileTypeGroup::all() {
			for ext in group.extensions() {
				assert!(seen.insert(*ext), "extension {ext} appears in two groups");
			}
		}
	}

	#[test]
	fn group_names_are_reserved() {
		assert!(FileTypeGroup::is_group_name("source code"));
		assert!(!FileTypeGroup::is_group_name("rust"));
	}
}
