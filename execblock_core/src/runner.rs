use std::path::Path;
use std::process::Command;
use std::process::Output;

use serde::Serialize;

use crate::ExecBlockError;
use crate::ExecBlockResult;
use crate::cache::CacheEntry;
use crate::cache::SnippetKey;
use crate::config::RUNNER_INPUT_TOKEN;
use crate::config::RunnerConfig;
use crate::project::ProjectContext;

/// Options for [`run_snippets`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
	/// Re-run snippets that already have an output.
	pub force: bool,
	/// Only run snippets of this language.
	pub language: Option<String>,
}

/// How a snippet run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "status")]
pub enum RunStatus {
	Succeeded,
	/// The command exited with a non-zero status, or was killed by a signal
	/// when `exit_code` is `None`. Its output is stored anyway.
	Failed { exit_code: Option<i32> },
}

/// A snippet that was executed.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
	pub key: SnippetKey,
	#[serde(flatten)]
	pub status: RunStatus,
}

/// Summary of a [`run_snippets`] call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
	pub executed: Vec<RunRecord>,
	/// Pending snippets whose language has no configured runner.
	pub skipped: Vec<SnippetKey>,
	/// Number of snippets left alone because they already had an output.
	pub up_to_date: usize,
}

impl RunReport {
	pub fn failures(&self) -> impl Iterator<Item = &RunRecord> {
		self.executed
			.iter()
			.filter(|record| record.status != RunStatus::Succeeded)
	}

	pub fn is_ok(&self) -> bool {
		self.failures().next().is_none()
	}
}

/// Execute cached snippets and store what they print as their output.
///
/// Every cache entry with an input but no output is run with the command
/// configured for its language. With `force`, entries that already have an
/// output are run again.
pub fn run_snippets(ctx: &ProjectContext, options: &RunOptions) -> ExecBlockResult<RunReport> {
	let cache = ctx.cache();
	let mut report = RunReport::default();

	for entry in cache.entries()? {
		if let Some(language) = &options.language {
			if &entry.key.language != language {
				continue;
			}
		}

		let Some(input_path) = entry.input_path.as_deref() else {
			continue;
		};

		if entry.has_output() && !options.force {
			report.up_to_date += 1;
			continue;
		}

		let Some(runner) = ctx.config.runners.get(&entry.key.language) else {
			tracing::debug!(key = %entry.key, "no runner configured");
			report.skipped.push(entry.key.clone());
			continue;
		};

		let (record, output) = run_entry(&ctx.root, &entry, input_path, runner)?;
		cache.store_output(&entry.key, &output)?;
		report.executed.push(record);
	}

	Ok(report)
}

fn run_entry(
	root: &Path,
	entry: &CacheEntry,
	input_path: &Path,
	runner: &RunnerConfig,
) -> ExecBlockResult<(RunRecord, String)> {
	let command = build_command(runner.command(), input_path);
	tracing::debug!(key = %entry.key, %command, "running snippet");

	let output = execute_command(root, &command, runner).map_err(|e| {
		ExecBlockError::RunnerFailed {
			language: entry.key.language.clone(),
			reason: e.to_string(),
		}
	})?;

	let status = if output.status.success() {
		RunStatus::Succeeded
	} else {
		tracing::warn!(
			key = %entry.key,
			exit_code = ?output.status.code(),
			"snippet exited unsuccessfully"
		);
		RunStatus::Failed {
			exit_code: output.status.code(),
		}
	};

	let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
	captured.push_str(&String::from_utf8_lossy(&output.stderr));

	Ok((
		RunRecord {
			key: entry.key.clone(),
			status,
		},
		captured,
	))
}

/// Substitute the quoted input path into a command template. When the
/// template has no `{input}` token the path is appended as the last
/// argument.
pub fn build_command(template: &str, input_path: &Path) -> String {
	let path = input_path.display().to_string();
	let quoted = snailquote::escape(&path);

	if template.contains(RUNNER_INPUT_TOKEN) {
		template.replace(RUNNER_INPUT_TOKEN, &quoted)
	} else {
		format!("{template} {quoted}")
	}
}

fn execute_command(root: &Path, command: &str, runner: &RunnerConfig) -> std::io::Result<Output> {
	let mut process = if cfg!(windows) {
		let mut process = Command::new("cmd");
		process.arg("/C").arg(command);
		process
	} else {
		let mut process = Command::new("sh");
		process.arg("-c").arg(command);
		process
	};

	if let Some(env) = runner.env() {
		process.envs(env);
	}

	process.current_dir(root).output()
}
