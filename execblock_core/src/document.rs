use std::path::Path;
use std::path::PathBuf;

use miette::Diagnostic;
use serde::Serialize;

use crate::DirectiveKind;
use crate::ExecBlockError;
use crate::ExecBlockResult;
use crate::FilterRegistry;
use crate::HeaderRegistry;
use crate::Position;
use crate::cache::SnippetKey;
use crate::config::ExecBlockConfig;
use crate::directive::find_directive_blocks;
use crate::renderer::BlockRenderer;
use crate::renderer::LiteralBlock;

/// The state accumulated across every document of a single build.
#[derive(Debug, Clone, Default)]
pub struct Registries {
	pub headers: HeaderRegistry,
	pub filters: FilterRegistry,
}

impl Registries {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registries seeded with the `[headers]` and `[filters]` of a config.
	pub fn from_config(config: &ExecBlockConfig) -> Self {
		let mut registries = Self::new();

		for (language, lines) in &config.headers {
			registries.headers.add(language, lines);
		}
		for filter in &config.filters.strings {
			registries.filters.add(filter.as_str());
		}

		registries
	}
}

/// How a diagnostic affected the rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
	/// The block was still rendered.
	Warning,
	/// The block was dropped from the rendered document.
	Error,
}

/// A problem found while building a document. Never fatal.
#[derive(Debug, Clone, Serialize)]
pub struct BuildDiagnostic {
	/// The document containing the directive.
	pub file: PathBuf,
	pub severity: Severity,
	/// Diagnostic code, e.g. `execblock::invalid_line_spec`.
	pub code: Option<String>,
	pub message: String,
	/// 1-indexed line of the directive's opening fence.
	pub line: usize,
	/// 1-indexed column of the directive's opening fence.
	pub column: usize,
}

impl BuildDiagnostic {
	fn new(file: &Path, severity: Severity, position: &Position, error: &ExecBlockError) -> Self {
		Self {
			file: file.to_path_buf(),
			severity,
			code: error.code().map(|code| code.to_string()),
			message: error.to_string(),
			line: position.start.line,
			column: position.start.column,
		}
	}
}

/// A block that reached the snippet cache.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedBlock {
	pub kind: DirectiveKind,
	pub key: SnippetKey,
	/// Whether the cache held an output for this block.
	pub output_found: bool,
	/// 1-indexed line of the directive's opening fence.
	pub line: usize,
	/// 1-indexed column of the directive's opening fence.
	pub column: usize,
}

/// The result of building one document.
#[derive(Debug, Clone)]
pub struct DocumentReport {
	pub file: PathBuf,
	/// The document with every directive replaced by its rendered blocks.
	pub rendered: String,
	pub blocks: Vec<RenderedBlock>,
	pub diagnostics: Vec<BuildDiagnostic>,
	/// Number of directives found, including header and filter directives.
	pub directive_count: usize,
}

impl DocumentReport {
	/// Blocks that rendered the placeholder because no output was cached.
	pub fn missing_outputs(&self) -> impl Iterator<Item = &RenderedBlock> {
		self.blocks.iter().filter(|block| !block.output_found)
	}
}

/// Build one document.
///
/// Directives are processed in document order so header and filter
/// directives only affect the blocks that follow them (in this and every
/// later document sharing `registries`).
pub fn process_document(
	file: &Path,
	source: &str,
	registries: &mut Registries,
	renderer: &BlockRenderer<'_>,
) -> ExecBlockResult<DocumentReport> {
	let directive_blocks = find_directive_blocks(source)?;
	let mut replacements: Vec<(Position, String)> = Vec::new();
	let mut blocks = Vec::new();
	let mut diagnostics = Vec::new();

	for block in &directive_blocks {
		let directive = match block.parse() {
			Ok(directive) => directive,
			Err(error) => {
				tracing::warn!(
					file = %file.display(),
					line = block.position.start.line,
					%error,
					"skipping invalid directive"
				);
				diagnostics.push(BuildDiagnostic::new(
					file,
					Severity::Error,
					&block.position,
					&error,
				));
				replacements.push((block.position, String::new()));
				continue;
			}
		};

		match directive.kind {
			DirectiveKind::AddHeader => {
				let language = directive.language.as_deref().unwrap_or_default();
				registries.headers.add(language, &directive.content);
				replacements.push((directive.position, String::new()));
			}
			DirectiveKind::AddFilter => {
				registries.filters.add_lines(&directive.content);
				replacements.push((directive.position, String::new()));
			}
			DirectiveKind::ExecBlock | DirectiveKind::OutputBlock => {
				let outcome =
					renderer.render(&directive, &registries.headers, &registries.filters)?;

				let severity = if outcome.key.is_some() {
					Severity::Warning
				} else {
					Severity::Error
				};
				for warning in &outcome.warnings {
					tracing::warn!(
						file = %file.display(),
						line = directive.position.start.line,
						error = %warning,
						"problem rendering block"
					);
					diagnostics.push(BuildDiagnostic::new(
						file,
						severity,
						&directive.position,
						warning,
					));
				}

				if let Some(key) = outcome.key {
					blocks.push(RenderedBlock {
						kind: directive.kind,
						key,
						output_found: outcome.output_found,
						line: directive.position.start.line,
						column: directive.position.start.column,
					});
				}

				let replacement = emit_nodes(source, &directive.position, &outcome.nodes);
				replacements.push((directive.position, replacement));
			}
		}
	}

	Ok(DocumentReport {
		file: file.to_path_buf(),
		rendered: splice(source, replacements),
		blocks,
		diagnostics,
		directive_count: directive_blocks.len(),
	})
}

/// Emit literal blocks as markdown, continuing any container prefix (block
/// quote markers, list indentation) of the line the directive started on.
fn emit_nodes(source: &str, position: &Position, nodes: &[LiteralBlock]) -> String {
	let start = position.start.offset.min(source.len());
	let line_start = source[..start].rfind('\n').map_or(0, |index| index + 1);
	let prefix: String = source[line_start..start]
		.chars()
		.map(|c| if c == '>' || c.is_whitespace() { c } else { ' ' })
		.collect();
	let blank_prefix = prefix.trim_end();

	let emitted = nodes
		.iter()
		.map(LiteralBlock::to_markdown)
		.collect::<Vec<_>>()
		.join("\n\n");

	let mut result = String::with_capacity(emitted.len());
	for (index, line) in emitted.split('\n').enumerate() {
		if index > 0 {
			result.push('\n');
			if line.is_empty() {
				result.push_str(blank_prefix);
			} else {
				result.push_str(&prefix);
			}
		}
		result.push_str(line);
	}

	result
}

/// Replace each span with its text. Spans are applied from the end of the
/// document so earlier offsets stay valid.
fn splice(source: &str, mut replacements: Vec<(Position, String)>) -> String {
	replacements.sort_by(|a, b| b.0.start.offset.cmp(&a.0.start.offset));

	let mut result = source.to_string();
	for (position, text) in replacements {
		let range = position.range();
		if range.start <= range.end && range.end <= result.len() {
			result.replace_range(range, &text);
		}
	}

	result
}
