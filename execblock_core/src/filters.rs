/// Literal substrings removed from every displayed output.
///
/// Filters are applied in registration order. When two filters overlap (one
/// contains part of another) the result depends on that order: removing the
/// first may break up or create an occurrence of the second.
#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
	filters: Vec<String>,
}

impl FilterRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a filter. Empty strings and filters that are already
	/// registered are ignored. Returns whether the filter was added.
	pub fn add(&mut self, filter: impl Into<String>) -> bool {
		let filter = filter.into();
		if filter.is_empty() || self.filters.contains(&filter) {
			return false;
		}

		tracing::debug!(filter = %filter.escape_debug(), "registered output filter");
		self.filters.push(filter);
		true
	}

	/// Register the content lines of a filter directive, joined by `\n`.
	pub fn add_lines<S: AsRef<str>>(&mut self, lines: &[S]) -> bool {
		let joined = lines
			.iter()
			.map(AsRef::as_ref)
			.collect::<Vec<_>>()
			.join("\n");
		self.add(joined)
	}

	/// Remove every occurrence of every registered filter from `text`.
	pub fn apply(&self, text: &str) -> String {
		let mut result = text.to_string();

		for filter in &self.filters {
			if result.contains(filter.as_str()) {
				result = result.replace(filter.as_str(), "");
			}
		}

		result
	}

	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.filters.iter().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.filters.len()
	}

	pub fn is_empty(&self) -> bool {
		self.filters.is_empty()
	}
}
