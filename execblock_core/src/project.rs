use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use globset::Glob;
use globset::GlobSet;
use globset::GlobSetBuilder;
use ignore::gitignore::Gitignore;
use ignore::gitignore::GitignoreBuilder;

use crate::ExecBlockError;
use crate::ExecBlockResult;
use crate::cache::SnippetCache;
use crate::config::CONFIG_FILE_CANDIDATES;
use crate::config::DEFAULT_MAX_FILE_SIZE;
use crate::config::ExecBlockConfig;
use crate::document::BuildDiagnostic;
use crate::document::DocumentReport;
use crate::document::Registries;
use crate::document::RenderedBlock;
use crate::document::process_document;
use crate::renderer::BlockRenderer;
use crate::renderer::RenderSettings;

/// Options for controlling how documents are discovered.
///
/// Use [`ScanOptions::default()`] for sensible defaults or
/// [`ScanOptions::from_config`] to construct from an [`ExecBlockConfig`].
#[derive(Debug, Clone)]
pub struct ScanOptions {
	/// Gitignore-style patterns to exclude from scanning.
	pub exclude_patterns: Vec<String>,
	/// Glob patterns adding files that are not markdown by extension.
	pub include_set: GlobSet,
	/// Maximum document size in bytes.
	pub max_file_size: u64,
	/// Whether to disable `.gitignore` integration.
	pub disable_gitignore: bool,
	/// Directories never scanned, such as the cache and output directories.
	pub skip_dirs: Vec<PathBuf>,
}

impl Default for ScanOptions {
	fn default() -> Self {
		Self {
			exclude_patterns: Vec::new(),
			include_set: GlobSet::empty(),
			max_file_size: DEFAULT_MAX_FILE_SIZE,
			disable_gitignore: false,
			skip_dirs: Vec::new(),
		}
	}
}

impl ScanOptions {
	/// Construct [`ScanOptions`] for the project at `root`.
	pub fn from_config(root: &Path, config: &ExecBlockConfig) -> Self {
		Self {
			exclude_patterns: config.exclude.patterns.clone(),
			include_set: build_glob_set(&config.include.patterns),
			max_file_size: config.max_file_size,
			disable_gitignore: config.disable_gitignore,
			skip_dirs: vec![config.cache_path(root), config.out_path(root)],
		}
	}
}

/// A project root together with its loaded configuration.
///
/// This is the main entry point consumed by [`build_project`],
/// [`write_build`] and [`run_snippets`](crate::run_snippets).
#[derive(Debug)]
pub struct ProjectContext {
	pub root: PathBuf,
	pub config: ExecBlockConfig,
	/// The config file that was loaded. `None` when running on defaults.
	pub config_path: Option<PathBuf>,
}

impl ProjectContext {
	/// Load the configuration discovered at `root`, falling back to the
	/// defaults.
	pub fn load(root: &Path) -> ExecBlockResult<Self> {
		let config_path = ExecBlockConfig::resolve_path(root);
		let config = ExecBlockConfig::load_or_default(root)?;

		Ok(Self {
			root: root.to_path_buf(),
			config,
			config_path,
		})
	}

	pub fn with_config(root: &Path, config: ExecBlockConfig) -> Self {
		Self {
			root: root.to_path_buf(),
			config,
			config_path: None,
		}
	}

	pub fn cache(&self) -> SnippetCache {
		SnippetCache::new(self.config.cache_path(&self.root))
	}

	pub fn settings(&self) -> RenderSettings {
		RenderSettings::from(&self.config)
	}

	/// Fresh registries seeded from the configuration.
	pub fn registries(&self) -> Registries {
		Registries::from_config(&self.config)
	}

	pub fn scan_options(&self) -> ScanOptions {
		ScanOptions::from_config(&self.root, &self.config)
	}

	pub fn out_path(&self) -> PathBuf {
		self.config.out_path(&self.root)
	}

	/// Every document of the project in build order.
	pub fn documents(&self) -> ExecBlockResult<Vec<PathBuf>> {
		collect_documents(&self.root, &self.scan_options())
	}
}

/// The result of one build pass.
#[derive(Debug, Default)]
pub struct BuildResult {
	/// One report per document, in build order.
	pub documents: Vec<DocumentReport>,
}

impl BuildResult {
	/// Number of exec and output blocks that reached the cache.
	pub fn block_count(&self) -> usize {
		self.documents.iter().map(|doc| doc.blocks.len()).sum()
	}

	/// Documents that contain at least one directive.
	pub fn documents_with_directives(&self) -> impl Iterator<Item = &DocumentReport> {
		self.documents.iter().filter(|doc| doc.directive_count > 0)
	}

	/// Blocks rendered with the placeholder, paired with their document.
	pub fn missing_outputs(&self) -> Vec<(&Path, &RenderedBlock)> {
		self.documents
			.iter()
			.flat_map(|doc| doc.missing_outputs().map(|block| (doc.file.as_path(), block)))
			.collect()
	}

	pub fn diagnostics(&self) -> impl Iterator<Item = &BuildDiagnostic> {
		self.documents.iter().flat_map(|doc| doc.diagnostics.iter())
	}

	/// Returns true if every block has output and nothing was reported.
	pub fn is_ok(&self) -> bool {
		self.missing_outputs().is_empty() && self.diagnostics().next().is_none()
	}
}

/// Build every document of the project with one shared set of registries.
///
/// Cached inputs are written as a side effect; rendered documents are kept
/// in memory until passed to [`write_build`].
pub fn build_project(ctx: &ProjectContext) -> ExecBlockResult<BuildResult> {
	let files = ctx.documents()?;
	let cache = ctx.cache();
	let settings = ctx.settings();
	let renderer = BlockRenderer::new(&cache, &settings);
	let mut registries = ctx.registries();
	let mut result = BuildResult::default();

	for file in &files {
		let content = read_document(file, ctx.config.max_file_size)?;
		let report = process_document(file, &content, &mut registries, &renderer)?;
		tracing::debug!(
			file = %file.display(),
			blocks = report.blocks.len(),
			"processed document"
		);
		result.documents.push(report);
	}

	Ok(result)
}

/// Write every rendered document below the output directory, mirroring its
/// path relative to the project root. Returns the written paths.
pub fn write_build(ctx: &ProjectContext, result: &BuildResult) -> ExecBlockResult<Vec<PathBuf>> {
	let out_dir = ctx.out_path();
	let mut written = Vec::with_capacity(result.documents.len());

	for report in &result.documents {
		let relative = report
			.file
			.strip_prefix(&ctx.root)
			.unwrap_or(report.file.as_path());
		let target = out_dir.join(relative);

		if let Some(parent) = target.parent() {
			std::fs::create_dir_all(parent).map_err(|e| {
				ExecBlockError::WriteFailed {
					path: parent.display().to_string(),
					reason: e.to_string(),
				}
			})?;
		}

		std::fs::write(&target, &report.rendered).map_err(|e| {
			ExecBlockError::WriteFailed {
				path: target.display().to_string(),
				reason: e.to_string(),
			}
		})?;
		written.push(target);
	}

	Ok(written)
}

/// Read a document, enforcing the size limit and normalizing line endings.
pub fn read_document(path: &Path, max_file_size: u64) -> ExecBlockResult<String> {
	let metadata = std::fs::metadata(path)?;
	if metadata.len() > max_file_size {
		return Err(ExecBlockError::FileTooLarge {
			path: path.display().to_string(),
			size: metadata.len(),
			limit: max_file_size,
		});
	}

	let content = std::fs::read_to_string(path).map_err(|e| {
		ExecBlockError::DocumentRead {
			path: path.display().to_string(),
			reason: e.to_string(),
		}
	})?;

	Ok(normalize_line_endings(&content))
}

/// Normalize CRLF line endings to LF.
pub fn normalize_line_endings(content: &str) -> String {
	if content.contains('\r') {
		content.replace("\r\n", "\n").replace('\r', "\n")
	} else {
		content.to_string()
	}
}

/// Build a `GlobSet` from a list of glob pattern strings. Invalid patterns
/// are skipped.
fn build_glob_set(patterns: &[String]) -> GlobSet {
	let mut builder = GlobSetBuilder::new();
	for pattern in patterns {
		match Glob::new(pattern) {
			Ok(glob) => {
				builder.add(glob);
			}
			Err(error) => tracing::warn!(%pattern, %error, "ignoring invalid include pattern"),
		}
	}
	builder.build().unwrap_or_else(|_| GlobSet::empty())
}

/// Collect every document under `root` in sorted order.
///
/// Markdown files are found by extension. Files matched by the include set
/// are added on top. When `disable_gitignore` is false (the default), files
/// matched by the project's `.gitignore` are skipped. Exclude patterns follow
/// gitignore syntax and are always applied.
pub fn collect_documents(root: &Path, options: &ScanOptions) -> ExecBlockResult<Vec<PathBuf>> {
	let mut files = Vec::new();
	let mut visited_dirs = HashSet::new();

	let gitignore = if options.disable_gitignore {
		Gitignore::empty()
	} else {
		build_gitignore(root)
	};
	let custom_exclude = build_exclude_matcher(root, &options.exclude_patterns)?;
	let walker = Walker {
		root,
		gitignore: &gitignore,
		custom_exclude: &custom_exclude,
		skip_dirs: &options.skip_dirs,
	};

	walker.walk_dir(root, &mut files, true, &mut visited_dirs)?;

	if !options.include_set.is_empty() {
		walker.collect_included_files(root, &options.include_set, &mut files, true)?;
	}

	files.sort();
	files.dedup();
	Ok(files)
}

/// Build a `Gitignore` matcher from the `[exclude]` patterns.
fn build_exclude_matcher(root: &Path, patterns: &[String]) -> ExecBlockResult<Gitignore> {
	let mut builder = GitignoreBuilder::new(root);
	for pattern in patterns {
		builder.add_line(None, pattern).map_err(|e| {
			ExecBlockError::ConfigParse(format!("invalid exclude pattern `{pattern}`: {e}"))
		})?;
	}
	builder
		.build()
		.map_err(|e| ExecBlockError::ConfigParse(format!("failed to build exclude rules: {e}")))
}

/// Build a `Gitignore` matcher from the project's `.gitignore` file (if any).
fn build_gitignore(root: &Path) -> Gitignore {
	let mut builder = GitignoreBuilder::new(root);
	let gitignore_path = root.join(".gitignore");
	if gitignore_path.exists() {
		if let Some(error) = builder.add(gitignore_path) {
			tracing::warn!(%error, "failed to read .gitignore");
		}
	}
	builder.build().unwrap_or_else(|_| Gitignore::empty())
}

fn is_ignored_directory_name(name: &str) -> bool {
	name.starts_with('.') || name == "node_modules" || name == "target"
}

fn has_project_config(dir: &Path) -> bool {
	CONFIG_FILE_CANDIDATES
		.iter()
		.any(|candidate| dir.join(candidate).is_file())
}

fn is_markdown_file(path: &Path) -> bool {
	let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
		return false;
	};

	matches!(ext, "md" | "mdx" | "markdown")
}

/// Shared matchers for one directory walk.
struct Walker<'a> {
	root: &'a Path,
	gitignore: &'a Gitignore,
	custom_exclude: &'a Gitignore,
	skip_dirs: &'a [PathBuf],
}

impl Walker<'_> {
	/// Whether the entry at `path` must not be visited.
	fn is_skipped(&self, path: &Path, is_dir: bool) -> bool {
		if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
			if is_dir && is_ignored_directory_name(name) {
				return true;
			}
		}

		if is_dir && self.skip_dirs.iter().any(|skip| skip == path) {
			return true;
		}

		self.gitignore.matched(path, is_dir).is_ignore()
			|| self.custom_exclude.matched(path, is_dir).is_ignore()
	}

	fn walk_dir(
		&self,
		dir: &Path,
		files: &mut Vec<PathBuf>,
		is_root: bool,
		visited_dirs: &mut HashSet<PathBuf>,
	) -> ExecBlockResult<()> {
		if !dir.is_dir() {
			return Ok(());
		}

		// Detect symlink cycles by tracking canonical paths.
		let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
		if !visited_dirs.insert(canonical) {
			return Err(ExecBlockError::SymlinkCycle {
				path: dir.display().to_string(),
			});
		}

		for entry in std::fs::read_dir(dir)? {
			let path = entry?.path();
			let is_dir = path.is_dir();

			if self.is_skipped(&path, is_dir) {
				continue;
			}

			if is_dir {
				// A nested config file marks a separate project.
				if !is_root && has_project_config(&path) {
					continue;
				}
				self.walk_dir(&path, files, false, visited_dirs)?;
			} else if is_markdown_file(&path) {
				files.push(path);
			}
		}

		Ok(())
	}

	/// Recursively collect files matching include patterns.
	fn collect_included_files(
		&self,
		dir: &Path,
		include_set: &GlobSet,
		files: &mut Vec<PathBuf>,
		is_root: bool,
	) -> ExecBlockResult<()> {
		if !dir.is_dir() {
			return Ok(());
		}

		for entry in std::fs::read_dir(dir)? {
			let path = entry?.path();
			let is_dir = path.is_dir();

			if self.is_skipped(&path, is_dir) {
				continue;
			}

			if is_dir {
				if !is_root && has_project_config(&path) {
					continue;
				}
				self.collect_included_files(&path, include_set, files, false)?;
			} else if let Ok(relative) = path.strip_prefix(self.root) {
				if include_set.is_match(relative) && !files.contains(&path) {
					files.push(path);
				}
			}
		}

		Ok(())
	}
}
