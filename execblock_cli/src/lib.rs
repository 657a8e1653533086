use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Render executable code blocks in markdown with a content-addressed snippet cache.",
	long_about = "execblock renders `exec-block` fenced code blocks in markdown documents \
	              together with the output captured the last time each snippet ran.\n\nEvery \
	              block's source is cached by its SHA-256 hash. Outputs are read from the cache, \
	              so builds never run code; `execblock run` does.\n\nQuick start:\n  execblock \
	              init   Create an execblock.toml\n  execblock build  Render documents into the \
	              output directory\n  execblock run    Execute snippets without an output\n  \
	              execblock check  Fail when a snippet has not been run"
)]
pub struct ExecBlockCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output and debug logging.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Initialize execblock in a project by creating a sample config file.
	///
	/// Creates an `execblock.toml` in the project root with the default
	/// settings commented out. If a config file already exists, this command
	/// is a no-op and exits successfully.
	Init,
	/// Render every document into the output directory.
	///
	/// Each directive is replaced with plain fenced code blocks: the visible
	/// code and the cached output. The full source of every block is written
	/// to the snippet cache so `execblock run` can execute it.
	Build {
		/// Report what would be written without writing rendered documents.
		/// Cached inputs are still stored.
		#[arg(long, default_value_t = false)]
		dry_run: bool,

		/// Watch for file changes and rebuild automatically with fresh header
		/// and filter registries.
		#[arg(long, default_value_t = false)]
		watch: bool,
	},
	/// Check that every block has a cached output and no directive is
	/// invalid.
	///
	/// Builds the project in memory. Exits with a non-zero status code when a
	/// block would render the placeholder or a diagnostic was reported.
	Check {
		/// Output format for check results. Use `text` for human-readable
		/// output, `json` for programmatic consumption, or `github` for
		/// GitHub Actions annotations that appear inline on PRs.
		#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
		format: OutputFormat,
	},
	/// Execute cached snippets that have no output yet.
	///
	/// Uses the `[runners]` commands from the config. Run `execblock build`
	/// (or `check`) first so the cache holds the latest sources.
	Run {
		/// Re-run snippets that already have an output.
		#[arg(long, default_value_t = false)]
		force: bool,

		/// Only run snippets of this language.
		#[arg(long)]
		language: Option<String>,
	},
	/// List every snippet in the cache with its status.
	List,
	/// Print a summary of the project configuration and cache.
	Info,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text output with colors and formatting.
	Text,
	/// JSON output for programmatic consumption.
	Json,
	/// GitHub Actions annotation format. Emits `::warning` or `::error`
	/// annotations that appear inline on pull request diffs.
	Github,
}
