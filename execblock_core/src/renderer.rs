use serde::Serialize;

use crate::Dedent;
use crate::Directive;
use crate::ExecBlockError;
use crate::ExecBlockResult;
use crate::FilterRegistry;
use crate::HeaderRegistry;
use crate::cache::SnippetCache;
use crate::cache::SnippetKey;
use crate::config::DEFAULT_HIDDEN_MARKER;
use crate::config::DEFAULT_OUTPUT_CLASS;
use crate::config::DEFAULT_PLACEHOLDER;
use crate::config::ExecBlockConfig;
use crate::text::assemble_full_source;
use crate::text::auto_dedent_lines;
use crate::text::dedent_lines;
use crate::text::parse_line_spec;
use crate::text::remove_leading_empty_lines;
use crate::text::remove_leading_empty_lines_str;
use crate::text::split_hidden_lines;

/// Language given to rendered output blocks.
pub const OUTPUT_LANGUAGE: &str = "none";

/// Settings shared by every block of a build.
#[derive(Debug, Clone)]
pub struct RenderSettings {
	pub hidden_marker: String,
	pub placeholder: String,
	pub output_class: String,
}

impl Default for RenderSettings {
	fn default() -> Self {
		Self {
			hidden_marker: DEFAULT_HIDDEN_MARKER.to_string(),
			placeholder: DEFAULT_PLACEHOLDER.to_string(),
			output_class: DEFAULT_OUTPUT_CLASS.to_string(),
		}
	}
}

impl From<&ExecBlockConfig> for RenderSettings {
	fn from(config: &ExecBlockConfig) -> Self {
		Self {
			hidden_marker: config.hidden_marker.clone(),
			placeholder: config.placeholder.clone(),
			output_class: config.output_class.clone(),
		}
	}
}

/// Whether a literal block shows the code or its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteralRole {
	Input,
	Output,
}

/// Extra arguments for the highlighter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HighlightArgs {
	/// 1-based lines to emphasize.
	pub hl_lines: Option<Vec<usize>>,
	/// First displayed line number.
	pub linenostart: Option<usize>,
}

/// A rendered block of literal text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiteralBlock {
	pub role: LiteralRole,
	pub text: String,
	pub language: String,
	pub linenos: bool,
	pub classes: Vec<String>,
	pub highlight: HighlightArgs,
	pub caption: Option<String>,
	pub name: Option<String>,
}

impl LiteralBlock {
	/// Emit this block as a fenced markdown code block. Attributes are
	/// written in a trailing `{...}` list when any are set.
	pub fn to_markdown(&self) -> String {
		let fence = "`".repeat(longest_backtick_run(&self.text).max(2) + 1);
		let attributes = self.attributes();
		let mut info = self.language.clone();
		if !attributes.is_empty() {
			info.push_str(" {");
			info.push_str(&attributes.join(" "));
			info.push('}');
		}

		let body = self.text.trim_end_matches('\n');
		let mut result = format!("{fence}{info}\n");
		if !body.is_empty() {
			result.push_str(body);
			result.push('\n');
		}
		result.push_str(&fence);
		result
	}

	fn attributes(&self) -> Vec<String> {
		let mut attributes = Vec::new();

		if let Some(name) = &self.name {
			attributes.push(format!("#{}", name.replace(' ', "-")));
		}
		for class in &self.classes {
			attributes.push(format!(".{class}"));
		}
		if self.linenos {
			attributes.push("linenos=true".to_string());
		}
		if let Some(start) = self.highlight.linenostart {
			attributes.push(format!("linenostart={start}"));
		}
		if let Some(lines) = &self.highlight.hl_lines {
			let lines: Vec<String> = lines.iter().map(ToString::to_string).collect();
			attributes.push(format!("hl_lines=\"{}\"", lines.join(" ")));
		}
		if let Some(caption) = &self.caption {
			attributes.push(format!("caption={}", quote_attribute(caption)));
		}

		attributes
	}
}

fn longest_backtick_run(text: &str) -> usize {
	let mut longest = 0;
	let mut current = 0;

	for ch in text.chars() {
		if ch == '`' {
			current += 1;
			longest = longest.max(current);
		} else {
			current = 0;
		}
	}

	longest
}

fn quote_attribute(value: &str) -> String {
	let escaped = value
		.replace('\\', "\\\\")
		.replace('"', "\\\"")
		.replace('\n', " ");
	format!("\"{escaped}\"")
}

/// Everything produced by rendering one directive.
#[derive(Debug, Default)]
pub struct RenderOutcome {
	/// Visible code and/or output, in display order.
	pub nodes: Vec<LiteralBlock>,
	/// The cache entry used. `None` when the block was rejected before
	/// reaching the cache.
	pub key: Option<SnippetKey>,
	/// Whether the cache held an output for this block.
	pub output_found: bool,
	/// Problems reported at the block's location. None of them abort the
	/// build.
	pub warnings: Vec<ExecBlockError>,
}

/// Turns `exec-block` and `output-block` directives into literal blocks,
/// reading and writing the snippet cache along the way.
#[derive(Debug, Clone)]
pub struct BlockRenderer<'a> {
	cache: &'a SnippetCache,
	settings: &'a RenderSettings,
}

impl<'a> BlockRenderer<'a> {
	pub fn new(cache: &'a SnippetCache, settings: &'a RenderSettings) -> Self {
		Self { cache, settings }
	}

	/// Render a block. Only a failure to write the cached input is fatal.
	pub fn render(
		&self,
		directive: &Directive,
		headers: &HeaderRegistry,
		filters: &FilterRegistry,
	) -> ExecBlockResult<RenderOutcome> {
		let mut outcome = RenderOutcome::default();
		let language = directive.language.as_deref().unwrap_or_default();
		let options = &directive.options;

		let split = split_hidden_lines(&directive.content, &self.settings.hidden_marker);
		let mut visible_code = remove_leading_empty_lines(&split.visible);
		let full_source = assemble_full_source(headers.lines(language), &split.executed);

		let hl_lines = match &options.emphasize_lines {
			Some(spec) => {
				let total = directive.content.len();
				let lines = match parse_line_spec(spec, total) {
					Ok(lines) => lines,
					Err(error) => {
						tracing::warn!(%error, "skipping block with invalid emphasize-lines");
						outcome.warnings.push(error);
						return Ok(outcome);
					}
				};

				if lines.iter().any(|line| *line >= total) {
					outcome.warnings.push(ExecBlockError::LineSpecOutOfRange {
						spec: spec.clone(),
						total,
					});
				}

				Some(
					lines
						.into_iter()
						.filter(|line| *line < total)
						.map(|line| line + 1)
						.collect::<Vec<_>>(),
				)
			}
			None => None,
		};

		if let Some(dedent) = options.dedent {
			let lines: Vec<&str> = visible_code.split('\n').collect();
			let lines = match dedent {
				Dedent::Auto => auto_dedent_lines(&lines),
				Dedent::Columns(amount) => {
					let dedented = dedent_lines(&lines, amount);
					if dedented.over_dedent {
						outcome.warnings.push(ExecBlockError::InvalidOptionValue {
							option: "dedent".to_string(),
							reason: "over dedent has been detected".to_string(),
						});
					}
					dedented.lines
				}
			};
			visible_code = lines.join("\n");
		}

		if !directive.kind.hides_input() {
			outcome.nodes.push(LiteralBlock {
				role: LiteralRole::Input,
				text: visible_code,
				language: language.to_string(),
				linenos: options.linenos || options.lineno_start.is_some(),
				classes: options.classes.clone(),
				highlight: HighlightArgs {
					hl_lines,
					linenostart: options.lineno_start,
				},
				caption: options.caption.clone(),
				name: options.name.clone(),
			});
		}

		let key = SnippetKey::for_source(language, &full_source);
		self.cache.store_input(&key, &full_source)?;

		let raw_output = self.cache.read_output(&key);
		outcome.output_found = raw_output.is_some();
		let output_text = raw_output.unwrap_or_else(|| self.settings.placeholder.clone());
		tracing::debug!(
			key = %key,
			output_found = outcome.output_found,
			"rendered block"
		);

		let output_hidden = output_text.trim_end().is_empty() || options.hide_output;
		if !output_hidden {
			let output_text = remove_leading_empty_lines_str(&filters.apply(&output_text));
			outcome.nodes.push(LiteralBlock {
				role: LiteralRole::Output,
				text: output_text,
				language: OUTPUT_LANGUAGE.to_string(),
				linenos: false,
				classes: vec![self.settings.output_class.clone()],
				highlight: HighlightArgs::default(),
				caption: None,
				name: None,
			});
		}

		outcome.key = Some(key);
		Ok(outcome)
	}
}
