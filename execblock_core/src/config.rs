use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::ExecBlockError;
use crate::ExecBlockResult;

/// Default maximum file size in bytes (10 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default directory, relative to the project root, holding cached snippets.
pub const DEFAULT_CACHE_DIR: &str = "snippets";

/// Default directory, relative to the project root, receiving rendered
/// documents.
pub const DEFAULT_OUT_DIR: &str = "_build";

/// Marker that hides a line from the rendered block while keeping it in the
/// executed source.
pub const DEFAULT_HIDDEN_MARKER: &str = " [hidden]";

/// Text shown in place of output when a snippet has not been executed yet.
pub const DEFAULT_PLACEHOLDER: &str = "(Output not available)";

/// Class attached to every rendered output block.
pub const DEFAULT_OUTPUT_CLASS: &str = "exec-block-output";

/// Token replaced with the path of the cached input file in runner commands.
/// Commands without it receive the path as their last argument.
pub const RUNNER_INPUT_TOKEN: &str = "{input}";

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = [
	"execblock.toml",
	".execblock.toml",
	".config/execblock.toml",
];

/// Runner entry for a `[runners]` language.
///
/// The short form is a bare command string:
///
/// ```toml
/// [runners]
/// python = "python3 {input}"
/// ```
///
/// The table form allows extra environment variables:
///
/// ```toml
/// [runners.sh]
/// command = "sh {input}"
/// env = { LC_ALL = "C" }
/// ```
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
#[non_exhaustive]
pub enum RunnerConfig {
	Command(String),
	Table(RunnerTable),
}

impl RunnerConfig {
	/// The shell command template for this runner.
	pub fn command(&self) -> &str {
		match self {
			Self::Command(command) => command.as_str(),
			Self::Table(table) => table.command.as_str(),
		}
	}

	/// Extra environment variables passed to the runner process.
	pub fn env(&self) -> Option<&BTreeMap<String, String>> {
		match self {
			Self::Command(_) => None,
			Self::Table(table) => Some(&table.env),
		}
	}
}

/// Table form of a [`RunnerConfig`].
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
pub struct RunnerTable {
	pub command: String,
	#[serde(default)]
	pub env: BTreeMap<String, String>,
}

/// Configuration loaded from an `execblock.toml` file.
///
/// ```toml
/// cache_dir = "snippets"
/// out_dir = "_build"
/// hidden_marker = " [hidden]"
/// placeholder = "(Output not available)"
///
/// [exclude]
/// patterns = ["drafts/"]
///
/// [include]
/// patterns = ["guides/**/*.txt"]
///
/// [headers]
/// python = ["import math"]
///
/// [filters]
/// strings = ["Warning: deprecated\n"]
///
/// [runners]
/// python = "python3 {input}"
/// ```
#[derive(Debug, Deserialize)]
pub struct ExecBlockConfig {
	/// Directory holding `<hash>.<lang>.in` and `<hash>.<lang>.out` files.
	#[serde(default = "default_cache_dir")]
	pub cache_dir: PathBuf,
	/// Directory where rendered documents are written.
	#[serde(default = "default_out_dir")]
	pub out_dir: PathBuf,
	/// Lines containing this marker are executed but not displayed.
	#[serde(default = "default_hidden_marker")]
	pub hidden_marker: String,
	/// Text displayed when a snippet has no cached output.
	#[serde(default = "default_placeholder")]
	pub placeholder: String,
	/// Class attached to rendered output blocks.
	#[serde(default = "default_output_class")]
	pub output_class: String,
	/// Maximum document size in bytes. Larger documents abort the build.
	#[serde(default = "default_max_file_size")]
	pub max_file_size: u64,
	/// When true, `.gitignore` files are not used for filtering.
	#[serde(default)]
	pub disable_gitignore: bool,
	/// Exclusion configuration using gitignore-style patterns.
	#[serde(default)]
	pub exclude: ExcludeConfig,
	/// Extra files to treat as documents.
	#[serde(default)]
	pub include: IncludeConfig,
	/// Header lines registered for each language before any document is
	/// processed.
	#[serde(default)]
	pub headers: BTreeMap<String, Vec<String>>,
	/// Filters registered before any document is processed.
	#[serde(default)]
	pub filters: FiltersConfig,
	/// Commands used by `execblock run`, keyed by language tag.
	#[serde(default)]
	pub runners: BTreeMap<String, RunnerConfig>,
}

impl Default for ExecBlockConfig {
	fn default() -> Self {
		Self {
			cache_dir: default_cache_dir(),
			out_dir: default_out_dir(),
			hidden_marker: default_hidden_marker(),
			placeholder: default_placeholder(),
			output_class: default_output_class(),
			max_file_size: DEFAULT_MAX_FILE_SIZE,
			disable_gitignore: false,
			exclude: ExcludeConfig::default(),
			include: IncludeConfig::default(),
			headers: BTreeMap::new(),
			filters: FiltersConfig::default(),
			runners: BTreeMap::new(),
		}
	}
}

fn default_cache_dir() -> PathBuf {
	PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_out_dir() -> PathBuf {
	PathBuf::from(DEFAULT_OUT_DIR)
}

fn default_hidden_marker() -> String {
	DEFAULT_HIDDEN_MARKER.to_string()
}

fn default_placeholder() -> String {
	DEFAULT_PLACEHOLDER.to_string()
}

fn default_output_class() -> String {
	DEFAULT_OUTPUT_CLASS.to_string()
}

fn default_max_file_size() -> u64 {
	DEFAULT_MAX_FILE_SIZE
}

/// Configuration for excluding files and directories from scanning.
///
/// Patterns follow gitignore syntax and are applied on top of any `.gitignore`
/// rules (unless `disable_gitignore` is set).
#[derive(Debug, Default, Deserialize)]
pub struct ExcludeConfig {
	/// Gitignore-style patterns relative to the project root.
	#[serde(default)]
	pub patterns: Vec<String>,
}

/// Configuration for including additional files in scanning.
#[derive(Debug, Default, Deserialize)]
pub struct IncludeConfig {
	/// Glob patterns, relative to the project root, for files to process in
	/// addition to markdown files.
	#[serde(default)]
	pub patterns: Vec<String>,
}

/// Filters registered from configuration.
#[derive(Debug, Default, Deserialize)]
pub struct FiltersConfig {
	/// Literal strings removed from every displayed output.
	#[serde(default)]
	pub strings: Vec<String>,
}

impl ExecBlockConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if no config file exists.
	pub fn load(root: &Path) -> ExecBlockResult<Option<ExecBlockConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config = Self::from_toml(&content)?;
		tracing::debug!(path = %config_path.display(), "loaded config");

		Ok(Some(config))
	}

	/// Load the discovered config or fall back to the defaults.
	pub fn load_or_default(root: &Path) -> ExecBlockResult<ExecBlockConfig> {
		Ok(Self::load(root)?.unwrap_or_default())
	}

	/// Parse a config from TOML source.
	pub fn from_toml(content: &str) -> ExecBlockResult<ExecBlockConfig> {
		toml::from_str(content).map_err(|e| ExecBlockError::ConfigParse(e.to_string()))
	}

	/// Absolute path of the snippet cache directory.
	pub fn cache_path(&self, root: &Path) -> PathBuf {
		root.join(&self.cache_dir)
	}

	/// Absolute path of the rendered documents directory.
	pub fn out_path(&self, root: &Path) -> PathBuf {
		root.join(&self.out_dir)
	}
}
