use std::collections::BTreeMap;
use std::collections::HashSet;

use derive_more::Deref;

/// The preamble lines accumulated for a single language.
///
/// Dereferences to the lines in insertion order.
#[derive(Debug, Clone, Default, Deref)]
pub struct HeaderBucket {
	#[deref]
	lines: Vec<String>,
	/// Every block added so far, joined with `\n`, used to suppress exact
	/// duplicates.
	blocks: HashSet<String>,
}

impl HeaderBucket {
	fn add(&mut self, lines: &[String]) -> bool {
		if !self.blocks.insert(lines.join("\n")) {
			return false;
		}

		self.lines.extend(lines.iter().cloned());
		true
	}
}

/// Per-language header lines prepended to every block of that language
/// before hashing and execution.
///
/// The registry is append-only for the lifetime of a build. Adding a block
/// of lines that was already added for the same language is a no-op.
#[derive(Debug, Clone, Default)]
pub struct HeaderRegistry {
	buckets: BTreeMap<String, HeaderBucket>,
}

impl HeaderRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Append `lines` to the bucket for `language`. Returns `false` when the
	/// exact same block was already registered for that language.
	pub fn add<S: AsRef<str>>(&mut self, language: &str, lines: &[S]) -> bool {
		let lines: Vec<String> = lines.iter().map(|line| line.as_ref().to_string()).collect();
		let added = self
			.buckets
			.entry(language.to_string())
			.or_default()
			.add(&lines);

		if added {
			tracing::debug!(language, lines = lines.len(), "registered header lines");
		} else {
			tracing::debug!(language, "skipped duplicate header block");
		}

		added
	}

	/// Header lines for `language` in insertion order. Empty when nothing was
	/// registered.
	pub fn lines(&self, language: &str) -> &[String] {
		match self.buckets.get(language) {
			Some(bucket) => bucket.as_slice(),
			None => &[],
		}
	}

	/// Languages that have at least one header block.
	pub fn languages(&self) -> impl Iterator<Item = &str> {
		self.buckets.keys().map(String::as_str)
	}

	pub fn is_empty(&self) -> bool {
		self.buckets.values().all(|bucket| bucket.is_empty())
	}
}
