use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::ExecBlockError;
use crate::ExecBlockResult;

const INPUT_EXTENSION: &str = "in";
const OUTPUT_EXTENSION: &str = "out";

/// Lowercase hex SHA-256 digest of `source`.
pub fn hash_source(source: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(source.as_bytes());
	hex::encode(hasher.finalize())
}

/// Identifies a cache entry: the digest of the full source and the language
/// tag it was written for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SnippetKey {
	pub hash: String,
	pub language: String,
}

impl SnippetKey {
	/// Build the key for `full_source` written in `language`.
	pub fn for_source(language: &str, full_source: &str) -> Self {
		Self {
			hash: hash_source(full_source),
			language: language.to_string(),
		}
	}

	/// `<hash>.<language>.in`
	pub fn input_file_name(&self) -> String {
		format!("{}.{}.{INPUT_EXTENSION}", self.hash, self.language)
	}

	/// `<hash>.<language>.out`
	pub fn output_file_name(&self) -> String {
		format!("{}.{}.{OUTPUT_EXTENSION}", self.hash, self.language)
	}

	/// Parse a cache file name back into its key and extension.
	fn from_file_name(name: &str) -> Option<(Self, &str)> {
		let (hash, rest) = name.split_once('.')?;
		let (language, extension) = rest.rsplit_once('.')?;

		if hash.is_empty() || language.is_empty() || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
			return None;
		}

		if extension != INPUT_EXTENSION && extension != OUTPUT_EXTENSION {
			return None;
		}

		Some((
			Self {
				hash: hash.to_string(),
				language: language.to_string(),
			},
			extension,
		))
	}
}

impl std::fmt::Display for SnippetKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}.{}", self.hash, self.language)
	}
}

/// A cache entry discovered on disk.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
	pub key: SnippetKey,
	pub input_path: Option<PathBuf>,
	pub output_path: Option<PathBuf>,
}

impl CacheEntry {
	/// Whether the snippet has been executed.
	pub fn has_output(&self) -> bool {
		self.output_path.is_some()
	}
}

/// Flat directory of `<hash>.<language>.in` / `.out` file pairs.
///
/// Writes are plain writes. A missing or unreadable output file means the
/// snippet has not been executed yet, never an error.
#[derive(Debug, Clone)]
pub struct SnippetCache {
	dir: PathBuf,
}

impl SnippetCache {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	pub fn input_path(&self, key: &SnippetKey) -> PathBuf {
		self.dir.join(key.input_file_name())
	}

	pub fn output_path(&self, key: &SnippetKey) -> PathBuf {
		self.dir.join(key.output_file_name())
	}

	/// Write the full source of a snippet, creating the directory on demand.
	pub fn store_input(&self, key: &SnippetKey, full_source: &str) -> ExecBlockResult<PathBuf> {
		let path = self.input_path(key);
		self.write(&path, full_source)?;
		Ok(path)
	}

	/// Write the captured output of a snippet.
	pub fn store_output(&self, key: &SnippetKey, output: &str) -> ExecBlockResult<PathBuf> {
		let path = self.output_path(key);
		self.write(&path, output)?;
		Ok(path)
	}

	/// Read the stored source of a snippet.
	pub fn read_input(&self, key: &SnippetKey) -> ExecBlockResult<String> {
		Ok(std::fs::read_to_string(self.input_path(key))?)
	}

	/// Read the stored output of a snippet. `None` when it is missing or
	/// unreadable.
	pub fn read_output(&self, key: &SnippetKey) -> Option<String> {
		std::fs::read_to_string(self.output_path(key)).ok()
	}

	/// List every entry in the cache directory, sorted by language then hash.
	/// A missing directory is an empty cache.
	pub fn entries(&self) -> ExecBlockResult<Vec<CacheEntry>> {
		let mut entries: BTreeMap<(String, String), CacheEntry> = BTreeMap::new();

		if !self.dir.is_dir() {
			return Ok(Vec::new());
		}

		for entry in std::fs::read_dir(&self.dir)? {
			let entry = entry?;
			let path = entry.path();
			if !path.is_file() {
				continue;
			}

			let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
				continue;
			};
			let Some((key, extension)) = SnippetKey::from_file_name(name) else {
				continue;
			};

			let slot = entries
				.entry((key.language.clone(), key.hash.clone()))
				.or_insert_with(|| {
					CacheEntry {
						key,
						input_path: None,
						output_path: None,
					}
				});

			if extension == INPUT_EXTENSION {
				slot.input_path = Some(path);
			} else {
				slot.output_path = Some(path);
			}
		}

		Ok(entries.into_values().collect())
	}

	fn write(&self, path: &Path, content: &str) -> ExecBlockResult<()> {
		std::fs::create_dir_all(&self.dir).map_err(|e| {
			ExecBlockError::WriteFailed {
				path: self.dir.display().to_string(),
				reason: e.to_string(),
			}
		})?;

		std::fs::write(path, content).map_err(|e| {
			ExecBlockError::WriteFailed {
				path: path.display().to_string(),
				reason: e.to_string(),
			}
		})
	}
}
