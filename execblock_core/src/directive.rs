use markdown::ParseOptions;
use markdown::mdast::Code;
use markdown::mdast::Node;
use markdown::to_mdast;
use serde::Serialize;

use crate::ExecBlockError;
use crate::ExecBlockResult;
use crate::Position;
use crate::lexer::InfoItem;
use crate::lexer::tokenize_info;

/// The four block-level directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[non_exhaustive]
pub enum DirectiveKind {
	/// Show the code and its cached output.
	///
	/// ````md
	/// ```exec-block python linenos
	/// print("hello")
	/// ```
	/// ````
	ExecBlock,
	/// Run the code but only show its cached output.
	///
	/// ````md
	/// ```output-block python
	/// print("hello")
	/// ```
	/// ````
	OutputBlock,
	/// Register header lines for every later block of the same language.
	///
	/// ````md
	/// ```exec-block-add-header python
	/// import math
	/// ```
	/// ````
	AddHeader,
	/// Register a literal string to strip from every displayed output.
	///
	/// ````md
	/// ```exec-block-add-filter
	/// DeprecationWarning
	/// ```
	/// ````
	AddFilter,
}

impl DirectiveKind {
	/// Look up a directive by the first word of a fenced block info string.
	/// MyST style braces (`{exec-block}`) are accepted.
	pub fn from_name(name: &str) -> Option<Self> {
		let name = name
			.strip_prefix('{')
			.and_then(|name| name.strip_suffix('}'))
			.unwrap_or(name);

		match name {
			"exec-block" => Some(Self::ExecBlock),
			"output-block" => Some(Self::OutputBlock),
			"exec-block-add-header" => Some(Self::AddHeader),
			"exec-block-add-filter" => Some(Self::AddFilter),
			_ => None,
		}
	}

	pub fn name(self) -> &'static str {
		match self {
			Self::ExecBlock => "exec-block",
			Self::OutputBlock => "output-block",
			Self::AddHeader => "exec-block-add-header",
			Self::AddFilter => "exec-block-add-filter",
		}
	}

	fn required_arguments(self) -> usize {
		match self {
			Self::ExecBlock | Self::OutputBlock | Self::AddHeader => 1,
			Self::AddFilter => 0,
		}
	}

	fn accepts_options(self) -> bool {
		matches!(self, Self::ExecBlock | Self::OutputBlock)
	}

	/// Whether the rendered result omits the code itself.
	pub fn hides_input(self) -> bool {
		matches!(self, Self::OutputBlock)
	}
}

impl std::fmt::Display for DirectiveKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.name())
	}
}

/// How the visible code of a block is dedented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Dedent {
	/// Remove the whitespace shared by every non-blank line.
	Auto,
	/// Remove this many characters from every line.
	Columns(usize),
}

/// Display options of an `exec-block` or `output-block` directive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct BlockOptions {
	/// `linenos`: show line numbers.
	pub linenos: bool,
	/// `dedent` or `dedent=N`.
	pub dedent: Option<Dedent>,
	/// `lineno-start=N`: first line number, implies line numbers.
	pub lineno_start: Option<usize>,
	/// `emphasize-lines="1,3-5"`: raw spec, parsed while rendering.
	pub emphasize_lines: Option<String>,
	/// `caption="..."`
	pub caption: Option<String>,
	/// `class="a b"`: extra classes on the visible block.
	pub classes: Vec<String>,
	/// `name=id`: anchor for cross references.
	pub name: Option<String>,
	/// `hide-output`: never show the output block.
	pub hide_output: bool,
}

impl BlockOptions {
	fn set(&mut self, directive: DirectiveKind, name: &str, value: Option<&str>) -> ExecBlockResult<()> {
		match name {
			"linenos" => self.linenos = parse_flag(name, value)?,
			"hide-output" => self.hide_output = parse_flag(name, value)?,
			"dedent" => {
				self.dedent = Some(match value {
					None => Dedent::Auto,
					Some(value) => Dedent::Columns(parse_integer(name, value)?),
				});
			}
			"lineno-start" => {
				self.lineno_start = Some(parse_integer(name, require_value(name, value)?)?);
			}
			"emphasize-lines" => {
				self.emphasize_lines = Some(require_value(name, value)?.to_string());
			}
			"caption" => self.caption = Some(require_value(name, value)?.to_string()),
			"class" => self.classes = parse_classes(name, require_value(name, value)?)?,
			"name" => {
				let value = require_value(name, value)?.split_whitespace().collect::<Vec<_>>();
				self.name = Some(value.join(" "));
			}
			_ => {
				return Err(ExecBlockError::UnknownOption {
					directive: directive.name().to_string(),
					option: name.to_string(),
				});
			}
		}

		Ok(())
	}
}

fn require_value<'v>(option: &str, value: Option<&'v str>) -> ExecBlockResult<&'v str> {
	match value {
		Some(value) if !value.trim().is_empty() => Ok(value),
		_ => {
			Err(ExecBlockError::InvalidOptionValue {
				option: option.to_string(),
				reason: "a value is required".to_string(),
			})
		}
	}
}

fn parse_flag(option: &str, value: Option<&str>) -> ExecBlockResult<bool> {
	let Some(value) = value else {
		return Ok(true);
	};

	match value.trim().to_ascii_lowercase().as_str() {
		"true" | "yes" | "on" | "1" => Ok(true),
		"false" | "no" | "off" | "0" => Ok(false),
		other => {
			Err(ExecBlockError::InvalidOptionValue {
				option: option.to_string(),
				reason: format!("expected a boolean, got `{other}`"),
			})
		}
	}
}

fn parse_integer(option: &str, value: &str) -> ExecBlockResult<usize> {
	value.trim().parse::<usize>().map_err(|e| {
		ExecBlockError::InvalidOptionValue {
			option: option.to_string(),
			reason: e.to_string(),
		}
	})
}

/// Normalize a space separated class list into identifier-safe names.
fn parse_classes(option: &str, value: &str) -> ExecBlockResult<Vec<String>> {
	value
		.split_whitespace()
		.map(|name| {
			let normalized = normalize_class(name);
			if normalized.is_empty() {
				Err(ExecBlockError::InvalidOptionValue {
					option: option.to_string(),
					reason: format!("cannot make `{name}` into a class name"),
				})
			} else {
				Ok(normalized)
			}
		})
		.collect()
}

fn normalize_class(name: &str) -> String {
	let mut normalized = String::with_capacity(name.len());
	for ch in name.chars().map(|c| c.to_ascii_lowercase()) {
		if ch.is_ascii_alphanumeric() {
			normalized.push(ch);
		} else if !normalized.is_empty() && !normalized.ends_with('-') {
			normalized.push('-');
		}
	}

	normalized
		.trim_start_matches(|c: char| c.is_ascii_digit() || c == '-')
		.trim_end_matches('-')
		.to_string()
}

/// A fenced code block whose info string names a directive, before its
/// arguments are validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveBlock {
	pub kind: DirectiveKind,
	/// The info string after the directive name.
	pub info: String,
	/// The body of the fenced block split into lines.
	pub content: Vec<String>,
	/// Span of the whole fenced block, fences included.
	pub position: Position,
}

impl DirectiveBlock {
	/// Validate the arguments and options of this block.
	pub fn parse(&self) -> ExecBlockResult<Directive> {
		let items = tokenize_info(&self.info)?;
		let required = self.kind.required_arguments();
		let mut arguments = Vec::new();
		let mut options = BlockOptions::default();

		for item in items {
			match item {
				InfoItem::Bare(word) if arguments.len() < required => arguments.push(word),
				InfoItem::Bare(word) if self.kind.accepts_options() => {
					options.set(self.kind, &word, None)?;
				}
				InfoItem::Pair { name, value } if self.kind.accepts_options() => {
					options.set(self.kind, &name, Some(&value))?;
				}
				InfoItem::Bare(_) => {
					return Err(ExecBlockError::DirectiveArguments {
						directive: self.kind.name().to_string(),
						expected: required,
						got: arguments.len() + 1,
					});
				}
				InfoItem::Pair { name, .. } => {
					return Err(ExecBlockError::UnknownOption {
						directive: self.kind.name().to_string(),
						option: name,
					});
				}
			}
		}

		if arguments.len() < required {
			return Err(ExecBlockError::DirectiveArguments {
				directive: self.kind.name().to_string(),
				expected: required,
				got: arguments.len(),
			});
		}

		let language = arguments.into_iter().next();
		if let Some(language) = &language {
			if language.contains(['/', '\\']) {
				return Err(ExecBlockError::InvalidLanguage(language.clone()));
			}
		}

		Ok(Directive {
			kind: self.kind,
			language,
			options,
			content: self.content.clone(),
			position: self.position,
		})
	}
}

/// A validated directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
	pub kind: DirectiveKind,
	/// Language tag. Present for every directive except
	/// [`DirectiveKind::AddFilter`].
	pub language: Option<String>,
	pub options: BlockOptions,
	pub content: Vec<String>,
	pub position: Position,
}

/// Find every directive block in a markdown document, in document order.
pub fn find_directive_blocks(content: impl AsRef<str>) -> ExecBlockResult<Vec<DirectiveBlock>> {
	let code_nodes = get_code_nodes(content)?;
	let mut blocks = Vec::new();

	for node in code_nodes {
		let Some(lang) = node.lang.as_deref() else {
			continue;
		};
		let Some(kind) = DirectiveKind::from_name(lang) else {
			continue;
		};
		let Some(position) = node.position.clone().map(Position::from) else {
			continue;
		};

		blocks.push(DirectiveBlock {
			kind,
			info: node.meta.clone().unwrap_or_default(),
			content: node.value.lines().map(str::to_string).collect(),
			position,
		});
	}

	Ok(blocks)
}

pub fn get_code_nodes(content: impl AsRef<str>) -> ExecBlockResult<Vec<Code>> {
	let options = ParseOptions::gfm();
	let mdast = to_mdast(content.as_ref(), &options)
		.map_err(|e| ExecBlockError::Markdown(e.to_string()))?;
	let mut code_nodes = vec![];
	collect_code(&mdast, &mut code_nodes);

	Ok(code_nodes)
}

fn collect_code(node: &Node, nodes: &mut Vec<Code>) {
	match node {
		Node::Code(code) => nodes.push(code.clone()),
		_ => {
			if let Some(children) = node.children() {
				for child in children {
					collect_code(child, nodes);
				}
			}
		}
	}
}
