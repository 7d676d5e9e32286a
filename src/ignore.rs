//! Three-tier ignore matcher (`spec.md` §4.2)
//!
//! Seeded at configuration time with file patterns, folder patterns, and
//! extension strings. Patterns use shell-style wildcards (`*`, `?`,
//! `[...]`, `[!...]`) compiled with `globset` (the same crate the teacher
//! uses for its exclusion engine) rather than hand-rolled matching code.
//!
//! A relative path is ignored iff:
//! (a) any path segment equals a folder pattern under wildcard matching, or
//! (b) the final segment matches any file pattern, or
//! (c) the extension (including the leading dot) equals any listed
//!     extension.
//!
//! Patterns are evaluated case-insensitively when the source root is a
//! Windows path, case-sensitively otherwise (open question 3).

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::ConfigurationError;

pub struct IgnoreMatcher {
	folder_patterns: GlobSet,
	file_patterns: GlobSet,
	extensions: Vec<String>,
	case_insensitive: bool,
}

impl IgnoreMatcher {
	pub fn new(
		files: &[String],
		folders: &[String],
		extensions: &[String],
		case_insensitive: bool,
	) -> Result<Self, ConfigurationError> {
		Ok(IgnoreMatcher {
			folder_patterns: build_set(folders, case_insensitive)?,
			file_patterns: build_set(files, case_insensitive)?,
			extensions: extensions.to_vec(),
			case_insensitive,
		})
	}

	/// Check whether a slash-normalized relative path is ignored.
	pub fn is_ignored(&self, rel_path: &str) -> bool {
		let segments: Vec<&str> = rel_path.split('/').filter(|s| !s.is_empty()).collect();
		if segments.is_empty() {
			return false;
		}

		if segments[..segments.len() - 1].iter().any(|seg| self.folder_patterns.is_match(seg)) {
			return true;
		}

		let last = segments[segments.len() - 1];
		if self.file_patterns.is_match(last) {
			return true;
		}

		if let Some(dot) = last.rfind('.') {
			let ext = &last[dot..];
			let matches_ext = if self.case_insensitive {
				self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
			} else {
				self.extensions.iter().any(|e| e == ext)
			};
			if matches_ext {
				return true;
			}
		}

		false
	}
}

fn build_set(patterns: &[String], case_insensitive: bool) -> Result<GlobSet, ConfigurationError> {
	let mut builder = GlobSetBuilder::new();
	for pat in patterns {
		let glob: Glob = GlobBuilder::new(pat)
			.case_insensitive(case_insensitive)
			.literal_separator(false)
			.build()
			.map_err(|e| ConfigurationError::InvalidValue {
				field: "ignore".into(),
				message: format!("invalid pattern \"{}\": {}", pat, e),
			})?;
		builder.add(glob);
	}
	builder.build().map_err(|e| ConfigurationError::InvalidValue {
		field: "ignore".into(),
		message: e.to_string(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn matcher(files: &[&str], folders: &[&str], exts: &[&str], ci: bool) -> IgnoreMatcher {
		IgnoreMatcher::new(
			&files.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
			&folders.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
			&exts.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
			ci,
		)
		.unwrap()
	}

	#[test]
	fn ignores_by_folder_segment() {
		let m = matcher(&[], &["node_modules", ".git"], &[], false);
		assert!(m.is_ignored("node_modules/pkg/index.js"));
		assert!(m.is_ignored("a/.git/HEAD"));
		assert!(!m.is_ignored("src/node_modules_helper.js"));
	}

	#[test]
	fn ignores_by_file_pattern() {
		let m = matcher(&["*.log", "Thumbs.db"], &[], &[], false);
		assert!(m.is_ignored("a/b/out.log"));
		assert!(m.is_ignored("Thumbs.db"));
		assert!(!m.is_ignored("out.log.bak"));
	}

	#[test]
	fn ignores_by_extension() {
		let m = matcher(&[], &[], &[".tmp", ".bak"], false);
		assert!(m.is_ignored("a/b/file.tmp"));
		assert!(!m.is_ignored("a/b/file.tmpx"));
	}

	#[test]
	fn case_sensitivity_follows_flag() {
		let insensitive = matcher(&[], &[], &[".LOG"], true);
		assert!(insensitive.is_ignored("a/b.log"));

		let sensitive = matcher(&[], &[], &[".LOG"], false);
		assert!(!sensitive.is_ignored("a/b.log"));
	}

	#[test]
	fn character_classes_work() {
		let m = matcher(&["file[0-9].txt"], &[], &[], false);
		assert!(m.is_ignored("file3.txt"));
		assert!(!m.is_ignored("fileA.txt"));
	}
}

// vim: ts=4
