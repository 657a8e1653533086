use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use execblock_cli::Commands;
use execblock_cli::ExecBlockCli;
use execblock_cli::OutputFormat;
use execblock_core::BuildDiagnostic;
use execblock_core::BuildResult;
use execblock_core::ExecBlockConfig;
use execblock_core::ProjectContext;
use execblock_core::RunOptions;
use execblock_core::RunStatus;
use execblock_core::Severity;
use execblock_core::build_project;
use execblock_core::run_snippets;
use execblock_core::write_build;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,yellow) => {
		if color_enabled() {
			format!("{}", $text.yellow())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const SAMPLE_CONFIG: &str = r#"# execblock configuration

# Directory holding cached snippets (<hash>.<lang>.in / .out).
# cache_dir = "snippets"

# Directory receiving rendered documents.
# out_dir = "_build"

# Lines containing this marker run but are not displayed.
# hidden_marker = " [hidden]"

# Text shown for snippets that have not been run yet.
# placeholder = "(Output not available)"

# [exclude]
# patterns = ["drafts/"]

# Header lines prepended to every block of a language.
# [headers]
# python = ["import math"]

# Literal strings removed from every displayed output.
# [filters]
# strings = []

# Commands used by `execblock run`. `{input}` is the cached source file.
[runners]
python = "python3 {input}"
sh = "sh {input}"
"#;

fn main() {
	let args = ExecBlockCli::parse();

	// Respect NO_COLOR env var, --no-color flag and terminal support.
	let use_color = !args.no_color
		&& std::env::var_os("NO_COLOR").is_none()
		&& supports_color::on(supports_color::Stream::Stdout).is_some();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	init_tracing(args.verbose);

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	let result = match &args.command {
		Some(Commands::Init) => run_init(&args),
		Some(Commands::Build { dry_run, watch }) => run_build(&args, *dry_run, *watch),
		Some(Commands::Check { format }) => run_check(&args, *format),
		Some(Commands::Run { force, language }) => run_run(&args, *force, language.clone()),
		Some(Commands::List) => run_list(&args),
		Some(Commands::Info) => run_info(&args),
		None => {
			eprintln!("No subcommand specified. Run `execblock --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		// Try to render through miette for rich diagnostics with help text
		// and error codes.
		match e.downcast::<execblock_core::ExecBlockError>() {
			Ok(err) => {
				let report: miette::Report = (*err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

/// Log to stderr. `EXECBLOCK_LOG` takes precedence unless `--verbose` is set.
fn init_tracing(verbose: bool) {
	let filter = if verbose {
		EnvFilter::new("debug")
	} else {
		EnvFilter::try_from_env("EXECBLOCK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
	};

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.without_time()
		.init();
}

fn resolve_root(args: &ExecBlockCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn load_context(args: &ExecBlockCli) -> CliResult<ProjectContext> {
	let root = resolve_root(args);
	let ctx = ProjectContext::load(&root)?;

	if args.verbose {
		match &ctx.config_path {
			Some(path) => println!("Using config: {}", path.display()),
			None => println!("No config file found, using defaults"),
		}
	}

	Ok(ctx)
}

fn print_section(title: &str) {
	println!();
	println!("{}", colored!(title, bold));
}

fn print_field(label: &str, value: impl std::fmt::Display) {
	println!("{label:<20} {value}");
}

fn run_init(args: &ExecBlockCli) -> CliResult<()> {
	let root = resolve_root(args);

	if let Some(existing) = ExecBlockConfig::resolve_path(&root) {
		println!("Config file already exists: {}", existing.display());
		return Ok(());
	}

	let config_path = root.join("execblock.toml");
	std::fs::write(&config_path, SAMPLE_CONFIG)?;
	println!("Created execblock.toml");
	println!();
	println!("Next steps:");
	println!("  1. Add an executable block to a markdown file:");
	println!("     ```exec-block python");
	println!("     print(\"hello\")");
	println!("     ```");
	println!("  2. Run `execblock build` to cache the snippet sources");
	println!("  3. Run `execblock run` to execute them, then build again");

	Ok(())
}

fn run_build(args: &ExecBlockCli, dry_run: bool, watch: bool) -> CliResult<()> {
	run_build_once(args, dry_run)?;

	if !watch || dry_run {
		return Ok(());
	}

	println!("\nWatching for file changes... (press Ctrl+C to stop)");

	let ctx = load_context(args)?;
	let generated = [ctx.config.cache_path(&ctx.root), ctx.out_path()];
	let (tx, rx) = mpsc::channel();

	let mut watcher =
		notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
			if let Ok(event) = res {
				// Writes into the cache and output directories come from the
				// build itself.
				let is_source_change = event
					.paths
					.iter()
					.any(|path| !generated.iter().any(|dir| path.starts_with(dir)));

				if is_source_change
					&& matches!(
						event.kind,
						notify::EventKind::Modify(_)
							| notify::EventKind::Create(_)
							| notify::EventKind::Remove(_)
					) {
					let _ = tx.send(());
				}
			}
		})?;

	use notify::Watcher;
	watcher.watch(&ctx.root, notify::RecursiveMode::Recursive)?;
	tracing::debug!(root = %ctx.root.display(), "watching for changes");

	loop {
		rx.recv()?;
		// Debounce: drain additional events within 200ms.
		while rx.recv_timeout(Duration::from_millis(200)).is_ok() {}

		println!("\nFile change detected, rebuilding...");
		if let Err(e) = run_build_once(args, false) {
			eprintln!("{} {e}", colored!("error:", red));
		}
	}
}

fn run_build_once(args: &ExecBlockCli, dry_run: bool) -> CliResult<()> {
	let ctx = load_context(args)?;
	let result = build_project(&ctx)?;
	print_diagnostics(&result, &ctx.root);

	if args.verbose {
		for doc in result.documents_with_directives() {
			println!(
				"  {} ({} block(s))",
				make_relative(&doc.file, &ctx.root),
				doc.blocks.len()
			);
		}
	}

	if dry_run {
		let out_dir = ctx.out_path();
		for doc in &result.documents {
			let relative = make_relative(&doc.file, &ctx.root);
			println!(
				"Would write: {}",
				out_dir.join(&relative).display()
			);
		}
		println!(
			"\nDry run: {} document(s) would be written.",
			result.documents.len()
		);
	} else {
		let written = write_build(&ctx, &result)?;
		println!(
			"{} {} document(s) to {}",
			colored!("Wrote", green),
			written.len(),
			ctx.out_path().display()
		);
	}

	let missing = result.missing_outputs().len();
	println!("{}", build_summary(result.block_count(), missing));
	if missing > 0 {
		println!("Run `execblock run` to execute pending snippets.");
	}

	Ok(())
}

fn build_summary(blocks: usize, missing: usize) -> String {
	if missing == 0 {
		format!("{blocks} block(s) rendered, all with output.")
	} else {
		format!("{blocks} block(s) rendered, {missing} without output.")
	}
}

fn run_check(args: &ExecBlockCli, format: OutputFormat) -> CliResult<()> {
	let ctx = load_context(args)?;
	let root = ctx.root.clone();
	let result = build_project(&ctx)?;

	if result.is_ok() {
		match format {
			OutputFormat::Json => {
				println!("{{\"ok\":true,\"missing\":[],\"diagnostics\":[]}}");
			}
			OutputFormat::Github => {
				println!("All blocks have cached output.");
			}
			OutputFormat::Text => {
				println!(
					"Check passed: {} block(s) with cached output.",
					result.block_count()
				);
			}
		}
		return Ok(());
	}

	let missing = result.missing_outputs();
	let diagnostics: Vec<&BuildDiagnostic> = result.diagnostics().collect();

	match format {
		OutputFormat::Json => {
			let missing_entries: Vec<serde_json::Value> = missing
				.iter()
				.map(|(file, block)| {
					serde_json::json!({
						"file": make_relative(file, &root),
						"line": block.line,
						"column": block.column,
						"language": block.key.language,
						"hash": block.key.hash,
					})
				})
				.collect();
			let diagnostic_entries: Vec<serde_json::Value> = diagnostics
				.iter()
				.map(|diag| {
					serde_json::json!({
						"file": make_relative(&diag.file, &root),
						"line": diag.line,
						"column": diag.column,
						"severity": diag.severity,
						"code": diag.code,
						"message": diag.message,
					})
				})
				.collect();
			let output = serde_json::json!({
				"ok": false,
				"missing": missing_entries,
				"diagnostics": diagnostic_entries,
			});
			println!("{output}");
		}
		OutputFormat::Github => {
			for diag in &diagnostics {
				let level = match diag.severity {
					Severity::Error => "error",
					Severity::Warning => "warning",
				};
				println!(
					"::{level} file={},line={},col={}::{}",
					make_relative(&diag.file, &root),
					diag.line,
					diag.column,
					diag.message
				);
			}
			for (file, block) in &missing {
				println!(
					"::warning file={},line={},col={}::`{}` block has no cached output",
					make_relative(file, &root),
					block.line,
					block.column,
					block.key.language
				);
			}
			eprintln!("{}", check_summary(missing.len(), diagnostics.len()));
		}
		OutputFormat::Text => {
			print_diagnostics(&result, &root);
			eprintln!("Check failed.");

			if !missing.is_empty() {
				eprintln!();
				eprintln!("Blocks without output:");
				for (file, block) in &missing {
					eprintln!(
						"  {} block at {}:{}:{} ({})",
						block.key.language,
						make_relative(file, &root),
						block.line,
						block.column,
						block.key.input_file_name()
					);
				}
			}

			eprintln!();
			eprintln!("{}", check_summary(missing.len(), diagnostics.len()));
		}
	}

	process::exit(1);
}

fn check_summary(missing: usize, diagnostics: usize) -> String {
	let mut parts = Vec::new();
	if missing > 0 {
		parts.push(format!("{missing} block(s) without output"));
	}
	if diagnostics > 0 {
		parts.push(format!("{diagnostics} diagnostic(s)"));
	}

	let mut summary = parts.join(", ");
	if missing > 0 {
		summary.push_str(". Run `execblock run` to execute pending snippets.");
	}
	summary
}

fn run_run(args: &ExecBlockCli, force: bool, language: Option<String>) -> CliResult<()> {
	let ctx = load_context(args)?;
	let report = run_snippets(&ctx, &RunOptions { force, language })?;

	for record in &report.executed {
		match record.status {
			RunStatus::Succeeded => {
				println!("{} {}", colored!("ran", green), record.key);
			}
			RunStatus::Failed { exit_code } => {
				let code = exit_code.map_or_else(|| "signal".to_string(), |code| code.to_string());
				println!(
					"{} {} (exit code {code})",
					colored!("failed", red),
					record.key
				);
			}
		}
	}

	for key in &report.skipped {
		eprintln!(
			"{} no runner configured for `{}` ({key})",
			colored!("warning:", yellow),
			key.language
		);
	}

	let failures = report.failures().count();
	println!(
		"\n{} snippet(s) run, {failures} failed, {} skipped, {} up to date.",
		report.executed.len(),
		report.skipped.len(),
		report.up_to_date
	);

	if failures > 0 {
		process::exit(1);
	}

	Ok(())
}

fn run_list(args: &ExecBlockCli) -> CliResult<()> {
	let ctx = load_context(args)?;
	let entries = ctx.cache().entries()?;

	if entries.is_empty() {
		println!("No snippets cached. Run `execblock build` first.");
		return Ok(());
	}

	println!("{}", colored!("Snippets:", bold));
	for entry in &entries {
		let status = if entry.has_output() {
			colored!("ready  ", green)
		} else {
			colored!("pending", yellow)
		};
		println!("  {status} {:<12} {}", entry.key.language, entry.key.hash);
	}

	let ready = entries.iter().filter(|entry| entry.has_output()).count();
	println!();
	println!(
		"{} snippet(s), {ready} ready, {} pending",
		entries.len(),
		entries.len() - ready
	);

	Ok(())
}

fn run_info(args: &ExecBlockCli) -> CliResult<()> {
	let ctx = load_context(args)?;
	let documents = ctx.documents()?;
	let entries = ctx.cache().entries()?;
	let ready = entries.iter().filter(|entry| entry.has_output()).count();

	print_section("Project");
	print_field("root", ctx.root.display());
	print_field(
		"config",
		ctx.config_path
			.as_ref()
			.map_or_else(|| "(defaults)".to_string(), |path| path.display().to_string()),
	);
	print_field("cache directory", ctx.config.cache_path(&ctx.root).display());
	print_field("output directory", ctx.out_path().display());
	print_field("documents", documents.len());

	print_section("Snippets");
	print_field("total", entries.len());
	print_field("ready", ready);
	print_field("pending", entries.len() - ready);

	print_section("Configuration");
	let runners: Vec<&str> = ctx.config.runners.keys().map(String::as_str).collect();
	print_field("runners", list_or_none(&runners));
	let headers: Vec<&str> = ctx.config.headers.keys().map(String::as_str).collect();
	print_field("header languages", list_or_none(&headers));
	print_field("filters", ctx.config.filters.strings.len());
	print_field("hidden marker", format!("{:?}", ctx.config.hidden_marker));

	Ok(())
}

fn list_or_none(items: &[&str]) -> String {
	if items.is_empty() {
		"(none)".to_string()
	} else {
		items.join(", ")
	}
}

fn print_diagnostics(result: &BuildResult, root: &Path) {
	for diag in result.diagnostics() {
		let report = diagnostic_to_report(diag, &make_relative(&diag.file, root));
		eprintln!("{report:?}");
	}
}

/// Make a path relative to root for display purposes.
fn make_relative(path: &Path, root: &Path) -> String {
	path.strip_prefix(root)
		.unwrap_or(path)
		.display()
		.to_string()
}

/// Convert a `BuildDiagnostic` into a `miette::Report` for rich terminal
/// display.
fn diagnostic_to_report(diag: &BuildDiagnostic, rel_path: &str) -> miette::Report {
	let location = format!("{rel_path}:{}:{}", diag.line, diag.column);
	let (severity, help) = match diag.severity {
		Severity::Error => {
			(
				miette::Severity::Error,
				"this block was left out of the rendered document",
			)
		}
		Severity::Warning => (miette::Severity::Warning, "the block was still rendered"),
	};

	let message = format!("[{location}] {}", diag.message);
	let diag_value = miette::MietteDiagnostic::new(message)
		.with_code(diag.code.clone().unwrap_or_else(|| "execblock::diagnostic".to_string()))
		.with_help(help)
		.with_severity(severity);
	miette::Report::new(diag_value)
}
