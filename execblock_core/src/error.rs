use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum ExecBlockError {
	#[error(transparent)]
	#[diagnostic(code(execblock::io_error))]
	Io(#[from] std::io::Error),

	#[error("failure to load markdown: {0}")]
	#[diagnostic(code(execblock::markdown))]
	Markdown(String),

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(execblock::config_parse),
		help("check that execblock.toml is valid TOML; see `execblock init` for a sample")
	)]
	ConfigParse(String),

	#[error("failed to read document `{path}`: {reason}")]
	#[diagnostic(code(execblock::document_read))]
	DocumentRead { path: String, reason: String },

	#[error("failed to write `{path}`: {reason}")]
	#[diagnostic(code(execblock::write_failed))]
	WriteFailed { path: String, reason: String },

	#[error("invalid line number spec: `{0}`")]
	#[diagnostic(
		code(execblock::invalid_line_spec),
		help("use comma separated line numbers or ranges, e.g. `1,3-5,8-`")
	)]
	InvalidLineSpec(String),

	#[error("line number spec is out of range(1-{total}): `{spec}`")]
	#[diagnostic(code(execblock::line_spec_out_of_range))]
	LineSpecOutOfRange { spec: String, total: usize },

	#[error("directive `{directive}` requires {expected} argument(s), got {got}")]
	#[diagnostic(code(execblock::directive_arguments))]
	DirectiveArguments {
		directive: String,
		expected: usize,
		got: usize,
	},

	#[error("unknown option `{option}` for directive `{directive}`")]
	#[diagnostic(
		code(execblock::unknown_option),
		help(
			"available options: linenos, dedent, lineno-start, emphasize-lines, caption, class, \
			 name, hide-output"
		)
	)]
	UnknownOption { directive: String, option: String },

	#[error("invalid value for option `{option}`: {reason}")]
	#[diagnostic(code(execblock::invalid_option_value))]
	InvalidOptionValue { option: String, reason: String },

	#[error("invalid language tag `{0}`")]
	#[diagnostic(
		code(execblock::invalid_language),
		help("language tags name cache files and cannot contain `/` or `\\`")
	)]
	InvalidLanguage(String),

	#[error("malformed directive arguments: `{0}`")]
	#[diagnostic(code(execblock::malformed_arguments))]
	MalformedArguments(String),

	#[error("runner for `{language}` failed: {reason}")]
	#[diagnostic(code(execblock::runner_failed))]
	RunnerFailed { language: String, reason: String },

	#[error("file too large: `{path}` is {size} bytes (limit: {limit} bytes)")]
	#[diagnostic(
		code(execblock::file_too_large),
		help("increase `max_file_size` in execblock.toml or exclude this file")
	)]
	FileTooLarge { path: String, size: u64, limit: u64 },

	#[error("symlink cycle detected at: `{path}`")]
	#[diagnostic(
		code(execblock::symlink_cycle),
		help("remove the circular symlink or exclude this path")
	)]
	SymlinkCycle { path: String },
}

pub type ExecBlockResult<T> = Result<T, ExecBlockError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
