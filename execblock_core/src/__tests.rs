use std::path::Path;
use std::path::PathBuf;

use rstest::rstest;
use similar_asserts::assert_eq;
use tracing_test::traced_test;

use super::*;
use crate::lexer::InfoItem;
use crate::lexer::tokenize_info;
use crate::text::auto_dedent_lines;
use crate::text::dedent_lines;
use crate::text::parse_line_spec;
use crate::text::remove_leading_empty_lines;
use crate::text::split_hidden_lines;

fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
	let path = root.join(relative);
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("create_dir_all: {e}"));
	}
	std::fs::write(&path, content).unwrap_or_else(|e| panic!("write: {e}"));
	path
}

fn parse_single(markdown: &str) -> ExecBlockResult<Directive> {
	let blocks = find_directive_blocks(markdown)?;
	assert_eq!(blocks.len(), 1, "expected exactly one directive");
	blocks[0].parse()
}

fn render_markdown(
	cache: &SnippetCache,
	markdown: &str,
	headers: &HeaderRegistry,
	filters: &FilterRegistry,
) -> ExecBlockResult<RenderOutcome> {
	let settings = RenderSettings::default();
	let renderer = BlockRenderer::new(cache, &settings);
	renderer.render(&parse_single(markdown)?, headers, filters)
}

// --- Hashing and cache ---

#[test]
fn hash_of_empty_source_is_sha256() {
	assert_eq!(
		hash_source(""),
		"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
	);
}

#[test]
fn hash_is_stable_for_identical_source() {
	let first = SnippetKey::for_source("python", "import math\nprint(1)");
	let second = SnippetKey::for_source("python", "import math\nprint(1)");

	assert_eq!(first, second);
	assert_eq!(first.hash.len(), 64);
	assert_eq!(first.input_file_name(), format!("{}.python.in", first.hash));
	assert_eq!(first.output_file_name(), format!("{}.python.out", first.hash));
}

#[test]
fn distinct_bodies_yield_distinct_hashes() {
	assert_ne!(hash_source("print(1)"), hash_source("print(2)"));
}

#[test]
fn cache_entries_are_sorted_and_skip_unrelated_files() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("snippets"));
	let python = SnippetKey::for_source("python", "print(1)");
	let bash = SnippetKey::for_source("bash", "echo 1");

	cache.store_input(&python, "print(1)")?;
	cache.store_input(&bash, "echo 1")?;
	cache.store_output(&bash, "1\n")?;
	write_file(cache.dir(), "readme.txt", "not a snippet");

	let entries = cache.entries()?;
	assert_eq!(entries.len(), 2);
	assert_eq!(entries[0].key, bash);
	assert!(entries[0].has_output());
	assert_eq!(entries[1].key, python);
	assert!(!entries[1].has_output());
	assert_eq!(cache.read_input(&python)?, "print(1)");
	assert_eq!(cache.read_output(&bash).as_deref(), Some("1\n"));
	assert_eq!(cache.read_output(&python), None);

	Ok(())
}

#[test]
fn missing_cache_directory_is_empty() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("missing"));
	assert!(cache.entries()?.is_empty());

	Ok(())
}

// --- Registries ---

#[test]
fn header_registry_suppresses_exact_duplicates() {
	let mut headers = HeaderRegistry::new();

	assert!(headers.add("python", &["import math"]));
	assert!(!headers.add("python", &["import math"]));
	assert!(headers.add("python", &["import os", "import sys"]));
	assert!(headers.add("rust", &["use std::fmt;"]));

	assert_eq!(
		headers.lines("python").to_vec(),
		vec!["import math", "import os", "import sys"]
	);
	assert_eq!(headers.lines("rust").to_vec(), vec!["use std::fmt;"]);
	assert!(headers.lines("ruby").is_empty());
	assert_eq!(headers.languages().collect::<Vec<_>>(), vec!["python", "rust"]);
}

#[test]
fn filter_registry_removes_every_occurrence() {
	let mut filters = FilterRegistry::new();
	assert!(filters.add("WARN: slow\n"));
	assert!(!filters.add("WARN: slow\n"));
	assert!(!filters.add(""));

	assert_eq!(filters.apply("WARN: slow\nresult\nWARN: slow\n"), "result\n");
	assert_eq!(filters.len(), 1);
}

#[rstest]
#[case::long_first(&["abc", "b"], " ")]
#[case::short_first(&["b", "abc"], "ac ")]
fn overlapping_filters_apply_in_registration_order(
	#[case] registered: &[&str],
	#[case] expected: &str,
) {
	let mut filters = FilterRegistry::new();
	for filter in registered {
		filters.add(*filter);
	}

	assert_eq!(filters.apply("abc b"), expected);
}

#[test]
fn filter_directive_lines_are_joined() {
	let mut filters = FilterRegistry::new();
	filters.add_lines(&["first", "second"]);

	assert_eq!(filters.iter().collect::<Vec<_>>(), vec!["first\nsecond"]);
}

// --- Text normalization ---

#[rstest]
#[case::no_blank_lines(&["a", "b"], "a\nb")]
#[case::leading_blank_lines(&["", "  ", "a", "", "b"], "a\n\nb")]
#[case::only_blank_lines(&["", " "], "")]
fn removes_leading_empty_lines(#[case] lines: &[&str], #[case] expected: &str) {
	assert_eq!(remove_leading_empty_lines(lines), expected);
}

#[test]
fn hidden_lines_are_executed_but_not_visible() {
	let split = split_hidden_lines(&["import os [hidden]", "print(os.sep)"], " [hidden]");

	assert_eq!(split.visible, vec!["print(os.sep)"]);
	assert_eq!(split.executed, "import os\nprint(os.sep)");
}

#[rstest]
#[case::single_and_range("1,3-5", 10, vec![0, 2, 3, 4])]
#[case::open_start("-3", 10, vec![0, 1, 2])]
#[case::open_end("8-", 10, vec![7, 8, 9])]
#[case::open_end_past_total("12-", 10, vec![11])]
#[case::range_past_total("9-20", 10, vec![8, 9, 10])]
#[case::huge_range("1-99999999999999", 2, vec![0, 1, 2])]
#[case::huge_start("99999999999999-99999999999999", 2, vec![99_999_999_999_998])]
#[case::spaces(" 2 , 4 ", 10, vec![1, 3])]
fn parses_line_specs(#[case] spec: &str, #[case] total: usize, #[case] expected: Vec<usize>) {
	assert_eq!(parse_line_spec(spec, total).ok(), Some(expected));
}

#[rstest]
#[case::zero("0")]
#[case::word("a")]
#[case::reversed("5-3")]
#[case::empty("")]
#[case::lone_dash("-")]
#[case::double_range("1-2-3")]
fn rejects_invalid_line_specs(#[case] spec: &str) {
	assert!(matches!(
		parse_line_spec(spec, 10),
		Err(ExecBlockError::InvalidLineSpec(_))
	));
}

#[test]
fn dedent_reports_over_dedent() {
	let dedented = dedent_lines(&["    a", "  b"], 2);
	assert_eq!(dedented.lines, vec!["  a", "b"]);
	assert!(!dedented.over_dedent);

	let dedented = dedent_lines(&["    a", "  b"], 3);
	assert_eq!(dedented.lines, vec![" a", ""]);
	assert!(dedented.over_dedent);
}

#[test]
fn auto_dedent_ignores_blank_lines() {
	assert_eq!(auto_dedent_lines(&["    a", "      b", ""]), vec!["a", "  b", ""]);
}

// --- Directive parsing ---

#[test]
fn tokenizes_info_strings() -> ExecBlockResult<()> {
	let items = tokenize_info(r#"python  a=1 'b c' d="e f""#)?;

	assert_eq!(
		items,
		vec![
			InfoItem::Bare("python".to_string()),
			InfoItem::Pair {
				name: "a".to_string(),
				value: "1".to_string(),
			},
			InfoItem::Bare("b c".to_string()),
			InfoItem::Pair {
				name: "d".to_string(),
				value: "e f".to_string(),
			},
		]
	);

	Ok(())
}

#[test]
fn unescapes_double_quoted_values() -> ExecBlockResult<()> {
	let items = tokenize_info(r#"caption="say \"hi\"""#)?;

	assert_eq!(
		items,
		vec![InfoItem::Pair {
			name: "caption".to_string(),
			value: "say \"hi\"".to_string(),
		}]
	);

	Ok(())
}

#[rstest]
#[case::stray_equals("python =x")]
#[case::unterminated_quote(r#"python "open"#)]
#[case::missing_value("python caption=")]
fn rejects_malformed_info_strings(#[case] info: &str) {
	assert!(matches!(
		tokenize_info(info),
		Err(ExecBlockError::MalformedArguments(_))
	));
}

#[test]
fn parses_exec_block_options() -> ExecBlockResult<()> {
	let directive = parse_single(concat!(
		"```exec-block python linenos lineno-start=5 emphasize-lines=\"1,2\" ",
		"caption='A \"quoted\" caption' class=\"Demo Extra_Wide\" name=intro hide-output\n",
		"print(1)\n",
		"```\n",
	))?;

	assert_eq!(directive.kind, DirectiveKind::ExecBlock);
	assert_eq!(directive.language.as_deref(), Some("python"));
	assert_eq!(
		directive.options,
		BlockOptions {
			linenos: true,
			dedent: None,
			lineno_start: Some(5),
			emphasize_lines: Some("1,2".to_string()),
			caption: Some("A \"quoted\" caption".to_string()),
			classes: vec!["demo".to_string(), "extra-wide".to_string()],
			name: Some("intro".to_string()),
			hide_output: true,
		}
	);
	assert_eq!(directive.content, vec!["print(1)"]);

	Ok(())
}

#[rstest]
#[case::bare("dedent", Dedent::Auto)]
#[case::columns("dedent=4", Dedent::Columns(4))]
fn parses_dedent_option(#[case] option: &str, #[case] expected: Dedent) -> ExecBlockResult<()> {
	let directive = parse_single(&format!("```exec-block python {option}\n  x\n```\n"))?;
	assert_eq!(directive.options.dedent, Some(expected));

	Ok(())
}

#[test]
fn accepts_myst_style_names() -> ExecBlockResult<()> {
	let directive = parse_single("```{output-block} bash\necho hi\n```\n")?;
	assert_eq!(directive.kind, DirectiveKind::OutputBlock);
	assert!(directive.kind.hides_input());

	Ok(())
}

#[test]
fn ignores_ordinary_code_blocks() -> ExecBlockResult<()> {
	let blocks = find_directive_blocks("```python\nprint(1)\n```\n\n~~~\nplain\n~~~\n")?;
	assert!(blocks.is_empty());

	Ok(())
}

#[test]
fn finds_directives_nested_in_lists() -> ExecBlockResult<()> {
	let blocks = find_directive_blocks("- item\n\n  ```exec-block python\n  print(1)\n  ```\n")?;
	assert_eq!(blocks.len(), 1);
	assert_eq!(blocks[0].content, vec!["print(1)"]);

	Ok(())
}

#[rstest]
#[case::missing_language("```exec-block\nx\n```\n")]
#[case::header_with_option("```exec-block-add-header python linenos\nx\n```\n")]
fn rejects_wrong_argument_count(#[case] markdown: &str) {
	assert!(matches!(
		parse_single(markdown),
		Err(ExecBlockError::DirectiveArguments { .. })
	));
}

#[rstest]
#[case::unknown_exec_option("```exec-block python bogus\nx\n```\n")]
#[case::filter_with_option("```exec-block-add-filter foo=bar\nx\n```\n")]
fn rejects_unknown_options(#[case] markdown: &str) {
	assert!(matches!(
		parse_single(markdown),
		Err(ExecBlockError::UnknownOption { .. })
	));
}

#[rstest]
#[case::non_numeric_start("lineno-start=abc")]
#[case::flag_value("linenos=maybe")]
#[case::empty_class("class=\"---\"")]
fn rejects_invalid_option_values(#[case] option: &str) {
	let markdown = format!("```exec-block python {option}\nx\n```\n");
	assert!(matches!(
		parse_single(&markdown),
		Err(ExecBlockError::InvalidOptionValue { .. })
	));
}

// --- Rendering ---

#[test]
fn renders_placeholder_when_output_is_missing() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("snippets"));
	let outcome = render_markdown(
		&cache,
		"```exec-block python\nprint(\"hi\")\n```\n",
		&HeaderRegistry::new(),
		&FilterRegistry::new(),
	)?;

	assert!(!outcome.output_found);
	assert_eq!(outcome.nodes.len(), 2);
	assert_eq!(outcome.nodes[0].role, LiteralRole::Input);
	assert_eq!(outcome.nodes[0].text, "print(\"hi\")");
	assert_eq!(outcome.nodes[0].language, "python");
	assert_eq!(outcome.nodes[1].role, LiteralRole::Output);
	assert_eq!(outcome.nodes[1].text, DEFAULT_PLACEHOLDER);
	assert_eq!(outcome.nodes[1].language, OUTPUT_LANGUAGE);
	assert_eq!(outcome.nodes[1].classes, vec![DEFAULT_OUTPUT_CLASS]);

	let key = outcome.key.unwrap_or_else(|| panic!("expected a cache key"));
	assert_eq!(cache.read_input(&key)?, "print(\"hi\")");

	Ok(())
}

#[test]
fn hidden_lines_reach_the_cache_but_not_the_page() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("snippets"));
	let outcome = render_markdown(
		&cache,
		"```exec-block python\nimport os [hidden]\n\nprint(os.sep)\n```\n",
		&HeaderRegistry::new(),
		&FilterRegistry::new(),
	)?;

	assert_eq!(outcome.nodes[0].text, "print(os.sep)");
	let key = outcome.key.unwrap_or_else(|| panic!("expected a cache key"));
	assert_eq!(cache.read_input(&key)?, "import os\n\nprint(os.sep)");

	Ok(())
}

#[test]
fn headers_change_the_hash_and_the_cached_source() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("snippets"));
	let markdown = "```exec-block python\nprint(math.pi)\n```\n";
	let mut headers = HeaderRegistry::new();

	let without = render_markdown(&cache, markdown, &headers, &FilterRegistry::new())?;
	headers.add("python", &["import math"]);
	let with = render_markdown(&cache, markdown, &headers, &FilterRegistry::new())?;

	let without = without.key.unwrap_or_else(|| panic!("expected a cache key"));
	let with = with.key.unwrap_or_else(|| panic!("expected a cache key"));
	assert_ne!(without, with);
	assert_eq!(cache.read_input(&with)?, "import math\nprint(math.pi)");

	Ok(())
}

#[test]
fn cached_output_is_filtered_and_trimmed() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("snippets"));
	let markdown = "```exec-block python\n\n\nprint(2)\n```\n";
	let key = SnippetKey::for_source("python", "\n\nprint(2)");
	cache.store_output(&key, "WARN: slow\n\n2\nWARN: slow\n")?;
	let mut filters = FilterRegistry::new();
	filters.add("WARN: slow\n");

	let outcome = render_markdown(&cache, markdown, &HeaderRegistry::new(), &filters)?;

	assert!(outcome.output_found);
	assert_eq!(outcome.nodes[0].text, "print(2)");
	assert_eq!(outcome.nodes[1].text, "2\n");

	Ok(())
}

#[rstest]
#[case::whitespace_output("```exec-block python\nprint()\n```\n", "  \n\n")]
#[case::hide_output_flag("```exec-block python hide-output\nprint()\n```\n", "visible\n")]
fn output_node_is_omitted(#[case] markdown: &str, #[case] output: &str) -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("snippets"));
	cache.store_output(&SnippetKey::for_source("python", "print()"), output)?;

	let outcome = render_markdown(&cache, markdown, &HeaderRegistry::new(), &FilterRegistry::new())?;

	assert!(outcome.output_found);
	assert_eq!(outcome.nodes.len(), 1);
	assert_eq!(outcome.nodes[0].role, LiteralRole::Input);

	Ok(())
}

#[test]
fn output_block_hides_the_input() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("snippets"));
	let outcome = render_markdown(
		&cache,
		"```output-block bash\necho hi\n```\n",
		&HeaderRegistry::new(),
		&FilterRegistry::new(),
	)?;

	assert_eq!(outcome.nodes.len(), 1);
	assert_eq!(outcome.nodes[0].role, LiteralRole::Output);
	assert!(outcome.key.is_some());

	Ok(())
}

#[test]
fn out_of_range_emphasis_is_dropped_with_a_warning() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("snippets"));
	let outcome = render_markdown(
		&cache,
		"```exec-block python emphasize-lines=\"1,5\"\na\nb\nc\n```\n",
		&HeaderRegistry::new(),
		&FilterRegistry::new(),
	)?;

	assert_eq!(outcome.nodes[0].highlight.hl_lines, Some(vec![1]));
	assert_eq!(outcome.warnings.len(), 1);
	assert!(matches!(
		&outcome.warnings[0],
		ExecBlockError::LineSpecOutOfRange { total: 3, .. }
	));

	Ok(())
}

#[test]
#[traced_test]
fn huge_emphasis_range_is_clamped_with_a_warning() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("snippets"));
	let settings = RenderSettings::default();
	let renderer = BlockRenderer::new(&cache, &settings);
	let mut registries = Registries::new();

	let report = process_document(
		Path::new("huge.md"),
		"```exec-block python emphasize-lines=\"1-99999999999999\"\nprint(1)\n```\n",
		&mut registries,
		&renderer,
	)?;

	assert_eq!(report.blocks.len(), 1);
	assert!(
		report
			.rendered
			.starts_with("```python {hl_lines=\"1\"}\nprint(1)\n```")
	);
	assert_eq!(report.diagnostics.len(), 1);
	assert_eq!(report.diagnostics[0].severity, Severity::Warning);
	assert_eq!(
		report.diagnostics[0].code.as_deref(),
		Some("execblock::line_spec_out_of_range")
	);
	assert!(logs_contain("problem rendering block"));

	Ok(())
}

#[test]
#[traced_test]
fn invalid_emphasis_renders_nothing() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("snippets"));
	let outcome = render_markdown(
		&cache,
		"```exec-block python emphasize-lines=\"x\"\na\n```\n",
		&HeaderRegistry::new(),
		&FilterRegistry::new(),
	)?;

	assert!(outcome.nodes.is_empty());
	assert!(outcome.key.is_none());
	assert!(matches!(
		&outcome.warnings[..],
		[ExecBlockError::InvalidLineSpec(_)]
	));
	assert!(cache.entries()?.is_empty());
	assert!(logs_contain("invalid emphasize-lines"));

	Ok(())
}

#[test]
fn dedent_applies_to_visible_code_only() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("snippets"));
	let outcome = render_markdown(
		&cache,
		"```exec-block python dedent=2\n  if x:\n    y()\n```\n",
		&HeaderRegistry::new(),
		&FilterRegistry::new(),
	)?;

	assert_eq!(outcome.nodes[0].text, "if x:\n  y()");
	let key = outcome.key.unwrap_or_else(|| panic!("expected a cache key"));
	assert_eq!(cache.read_input(&key)?, "  if x:\n    y()");

	Ok(())
}

#[test]
fn literal_block_markdown_carries_attributes() {
	let block = LiteralBlock {
		role: LiteralRole::Input,
		text: "a = 1\nb = 2\n".to_string(),
		language: "python".to_string(),
		linenos: true,
		classes: vec!["demo".to_string()],
		highlight: HighlightArgs {
			hl_lines: Some(vec![2]),
			linenostart: Some(5),
		},
		caption: Some("Sample \"one\"".to_string()),
		name: Some("first block".to_string()),
	};

	insta::assert_snapshot!(block.to_markdown(), @r###"
```python {#first-block .demo linenos=true linenostart=5 hl_lines="2" caption="Sample \"one\""}
a = 1
b = 2
```
"###);
}

#[test]
fn literal_block_fence_outgrows_backticks_in_the_body() {
	let block = LiteralBlock {
		role: LiteralRole::Output,
		text: "````\nnested\n````".to_string(),
		language: OUTPUT_LANGUAGE.to_string(),
		linenos: false,
		classes: vec![],
		highlight: HighlightArgs::default(),
		caption: None,
		name: None,
	};

	assert_eq!(block.to_markdown(), "`````none\n````\nnested\n````\n`````");
}

// --- Documents ---

#[test]
fn process_document_replaces_directives() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("snippets"));
	let settings = RenderSettings::default();
	let renderer = BlockRenderer::new(&cache, &settings);
	let mut registries = Registries::new();
	let source = concat!(
		"# Title\n\n",
		"```exec-block-add-header python\nimport math\n```\n\n",
		"```exec-block python\nprint(math.pi)\n```\n\n",
		"```rust\nfn main() {}\n```\n",
	);

	let report = process_document(Path::new("doc.md"), source, &mut registries, &renderer)?;

	assert_eq!(
		report.rendered,
		concat!(
			"# Title\n\n\n\n",
			"```python\nprint(math.pi)\n```\n\n",
			"```none {.exec-block-output}\n(Output not available)\n```\n\n",
			"```rust\nfn main() {}\n```\n",
		)
	);
	assert_eq!(report.directive_count, 2);
	assert_eq!(report.blocks.len(), 1);
	assert_eq!(report.missing_outputs().count(), 1);
	assert_eq!(report.blocks[0].line, 7);
	assert_eq!(
		cache.read_input(&report.blocks[0].key)?,
		"import math\nprint(math.pi)"
	);

	Ok(())
}

#[test]
fn process_document_keeps_block_quote_prefix() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("snippets"));
	let settings = RenderSettings::default();
	let renderer = BlockRenderer::new(&cache, &settings);
	let mut registries = Registries::new();

	let report = process_document(
		Path::new("quote.md"),
		"> ```exec-block python\n> print(1)\n> ```\n",
		&mut registries,
		&renderer,
	)?;

	assert_eq!(
		report.rendered,
		concat!(
			"> ```python\n> print(1)\n> ```\n>\n",
			"> ```none {.exec-block-output}\n> (Output not available)\n> ```\n",
		)
	);

	Ok(())
}

#[test]
fn invalid_directives_become_diagnostics() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("snippets"));
	let settings = RenderSettings::default();
	let renderer = BlockRenderer::new(&cache, &settings);
	let mut registries = Registries::new();

	let report = process_document(
		Path::new("bad.md"),
		"intro\n\n```exec-block python bogus\nx\n```\n",
		&mut registries,
		&renderer,
	)?;

	assert_eq!(report.rendered, "intro\n\n\n");
	assert!(report.blocks.is_empty());
	assert_eq!(report.diagnostics.len(), 1);
	let diagnostic = &report.diagnostics[0];
	assert_eq!(diagnostic.severity, Severity::Error);
	assert_eq!(diagnostic.line, 3);
	assert_eq!(diagnostic.column, 1);
	assert_eq!(diagnostic.code.as_deref(), Some("execblock::unknown_option"));

	Ok(())
}

#[test]
fn language_tags_with_path_separators_are_rejected() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("snippets"));
	let settings = RenderSettings::default();
	let renderer = BlockRenderer::new(&cache, &settings);
	let mut registries = Registries::new();

	let report = process_document(
		Path::new("lang.md"),
		"```exec-block py/3\nprint(1)\n```\n\n```exec-block python\nprint(2)\n```\n",
		&mut registries,
		&renderer,
	)?;

	assert_eq!(report.blocks.len(), 1);
	assert_eq!(report.blocks[0].key.language, "python");
	assert_eq!(report.diagnostics.len(), 1);
	assert_eq!(report.diagnostics[0].severity, Severity::Error);
	assert_eq!(
		report.diagnostics[0].code.as_deref(),
		Some("execblock::invalid_language")
	);
	assert_eq!(cache.entries()?.len(), 1);

	Ok(())
}

#[test]
fn filters_only_affect_later_blocks() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let cache = SnippetCache::new(tmp.path().join("snippets"));
	cache.store_output(&SnippetKey::for_source("sh", "echo a"), "noise a\n")?;
	cache.store_output(&SnippetKey::for_source("sh", "echo b"), "noise b\n")?;
	let settings = RenderSettings::default();
	let renderer = BlockRenderer::new(&cache, &settings);
	let mut registries = Registries::new();

	let report = process_document(
		Path::new("filters.md"),
		concat!(
			"```output-block sh\necho a\n```\n\n",
			"```exec-block-add-filter\nnoise \n```\n\n",
			"```output-block sh\necho b\n```\n",
		),
		&mut registries,
		&renderer,
	)?;

	assert_eq!(
		report.rendered,
		concat!(
			"```none {.exec-block-output}\nnoise a\n```\n\n",
			"\n\n",
			"```none {.exec-block-output}\nb\n```\n",
		)
	);

	Ok(())
}

// --- Projects ---

#[test]
fn collect_documents_honors_ignores_and_includes() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let root = tmp.path();
	write_file(root, "a.md", "a");
	write_file(root, "sub/b.markdown", "b");
	write_file(root, "notes.txt", "notes");
	write_file(root, "other.txt.bak", "bak");
	write_file(root, ".hidden/c.md", "c");
	write_file(root, "node_modules/d.md", "d");
	write_file(root, "snippets/e.md", "e");
	write_file(root, "_build/f.md", "f");
	write_file(root, "drafts/g.md", "g");
	write_file(root, "ignored.md", "ignored");
	write_file(root, ".gitignore", "ignored.md\n");

	let config = ExecBlockConfig::from_toml(
		"[exclude]\npatterns = [\"drafts/\"]\n\n[include]\npatterns = [\"*.txt\"]\n",
	)?;
	let ctx = ProjectContext::with_config(root, config);
	let files = ctx.documents()?;

	assert_eq!(
		files,
		vec![root.join("a.md"), root.join("notes.txt"), root.join("sub/b.markdown")]
	);

	Ok(())
}

#[test]
fn disable_gitignore_includes_ignored_documents() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let root = tmp.path();
	write_file(root, "ignored.md", "ignored");
	write_file(root, ".gitignore", "ignored.md\n");

	let config = ExecBlockConfig::from_toml("disable_gitignore = true\n")?;
	let files = ProjectContext::with_config(root, config).documents()?;
	assert_eq!(files, vec![root.join("ignored.md")]);

	Ok(())
}

#[test]
fn registries_are_shared_across_documents() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let root = tmp.path();
	write_file(root, "a.md", "```exec-block-add-header python\nimport math\n```\n");
	write_file(root, "b.md", "```exec-block python\nprint(math.e)\n```\n");

	let ctx = ProjectContext::load(root)?;
	let result = build_project(&ctx)?;

	assert_eq!(result.documents.len(), 2);
	assert_eq!(result.block_count(), 1);
	let (file, block) = result.missing_outputs()[0];
	assert_eq!(file, root.join("b.md"));
	assert_eq!(
		ctx.cache().read_input(&block.key)?,
		"import math\nprint(math.e)"
	);
	assert!(!result.is_ok());

	Ok(())
}

#[test]
fn config_seeds_headers_and_filters() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let root = tmp.path();
	write_file(
		root,
		"execblock.toml",
		"cache_dir = \"cache\"\n\n[headers]\npython = [\"import sys\"]\n\n[filters]\nstrings = \
		 [\"noise\\n\"]\n",
	);
	write_file(root, "doc.md", "```output-block python\nprint(sys.argv)\n```\n");
	let key = SnippetKey::for_source("python", "import sys\nprint(sys.argv)");
	SnippetCache::new(root.join("cache")).store_output(&key, "noise\n['x']\n")?;

	let ctx = ProjectContext::load(root)?;
	assert_eq!(ctx.config_path, Some(root.join("execblock.toml")));
	let result = build_project(&ctx)?;

	assert!(result.is_ok());
	assert_eq!(
		result.documents[0].rendered,
		"```none {.exec-block-output}\n['x']\n```\n"
	);

	Ok(())
}

#[test]
fn build_normalizes_crlf_line_endings() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let root = tmp.path();
	write_file(root, "doc.md", "```exec-block python\r\nprint(1)\r\n```\r\n");

	let ctx = ProjectContext::load(root)?;
	let result = build_project(&ctx)?;
	let key = &result.documents[0].blocks[0].key;

	assert_eq!(ctx.cache().read_input(key)?, "print(1)");

	Ok(())
}

#[test]
fn write_build_mirrors_relative_paths() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let root = tmp.path();
	write_file(root, "guide/intro.md", "# Intro\n\n```exec-block sh\necho hi\n```\n");

	let ctx = ProjectContext::load(root)?;
	let result = build_project(&ctx)?;
	let written = write_build(&ctx, &result)?;

	let target = root.join("_build/guide/intro.md");
	assert_eq!(written, vec![target.clone()]);
	let content = std::fs::read_to_string(target)?;
	assert!(content.starts_with("# Intro\n\n```sh\necho hi\n```"));

	// The output directory is never scanned as a source of documents.
	assert_eq!(ctx.documents()?, vec![root.join("guide/intro.md")]);

	Ok(())
}

#[test]
fn oversized_documents_abort_the_build() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let root = tmp.path();
	write_file(root, "big.md", "this document is larger than the limit");

	let config = ExecBlockConfig::from_toml("max_file_size = 10\n")?;
	let ctx = ProjectContext::with_config(root, config);

	assert!(matches!(
		build_project(&ctx),
		Err(ExecBlockError::FileTooLarge { limit: 10, .. })
	));

	Ok(())
}

// --- Config ---

#[test]
fn parses_runner_forms() -> ExecBlockResult<()> {
	let config = ExecBlockConfig::from_toml(concat!(
		"[runners]\n",
		"python = \"python3 {input}\"\n\n",
		"[runners.sh]\n",
		"command = \"sh {input}\"\n",
		"env = { LC_ALL = \"C\" }\n",
	))?;

	let python = &config.runners["python"];
	assert_eq!(python.command(), "python3 {input}");
	assert!(python.env().is_none());

	let sh = &config.runners["sh"];
	assert_eq!(sh.command(), "sh {input}");
	assert_eq!(
		sh.env().and_then(|env| env.get("LC_ALL")).map(String::as_str),
		Some("C")
	);
	assert_eq!(config.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));

	Ok(())
}

#[test]
fn invalid_config_is_a_parse_error() {
	assert!(matches!(
		ExecBlockConfig::from_toml("cache_dir = [1]"),
		Err(ExecBlockError::ConfigParse(_))
	));
}

// --- Runner ---

#[rstest]
#[case::token("python3 {input} --flag", "python3 {} --flag")]
#[case::appended("python3 -u", "python3 -u {}")]
#[case::quoted_path("python3 {input}", "python3 {}")]
fn builds_runner_commands(#[case] template: &str, #[case] expected: &str) {
	for path in ["/tmp/a.in", "/tmp/with space/a.in"] {
		let quoted = snailquote::escape(path);
		assert_eq!(
			build_command(template, Path::new(path)),
			expected.replace("{}", &quoted)
		);
	}
}

#[cfg(unix)]
#[test]
fn run_snippets_stores_outputs() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let root = tmp.path();
	write_file(root, "execblock.toml", "[runners]\nsh = \"sh {input}\"\n");
	write_file(
		root,
		"doc.md",
		concat!(
			"```exec-block sh\necho hello\n```\n\n",
			"```exec-block sh\necho oops; exit 3\n```\n\n",
			"```exec-block ruby\nputs 1\n```\n",
		),
	);

	let ctx = ProjectContext::load(root)?;
	build_project(&ctx)?;
	let report = run_snippets(&ctx, &RunOptions::default())?;

	assert_eq!(report.executed.len(), 2);
	assert_eq!(report.skipped.len(), 1);
	assert_eq!(report.skipped[0].language, "ruby");
	assert_eq!(report.failures().count(), 1);
	assert_eq!(
		report.failures().next().map(|record| record.status),
		Some(RunStatus::Failed { exit_code: Some(3) })
	);

	let result = build_project(&ctx)?;
	let rendered = &result.documents[0].rendered;
	assert!(rendered.contains("```none {.exec-block-output}\nhello\n```"));
	assert!(rendered.contains("```none {.exec-block-output}\noops\n```"));
	assert_eq!(result.missing_outputs().len(), 1);

	let rerun = run_snippets(&ctx, &RunOptions::default())?;
	assert!(rerun.executed.is_empty());
	assert_eq!(rerun.up_to_date, 2);

	let forced = run_snippets(
		&ctx,
		&RunOptions {
			force: true,
			language: Some("sh".to_string()),
		},
	)?;
	assert_eq!(forced.executed.len(), 2);
	assert!(forced.skipped.is_empty());

	Ok(())
}

#[cfg(unix)]
#[test]
fn runner_env_is_passed_to_the_command() -> ExecBlockResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let root = tmp.path();
	write_file(
		root,
		"execblock.toml",
		"[runners.sh]\ncommand = \"sh {input}\"\nenv = { GREETING = \"bonjour\" }\n",
	);
	write_file(root, "doc.md", "```output-block sh\necho $GREETING\n```\n");

	let ctx = ProjectContext::load(root)?;
	build_project(&ctx)?;
	let report = run_snippets(&ctx, &RunOptions::default())?;
	assert!(report.is_ok());

	let result = build_project(&ctx)?;
	assert_eq!(
		result.documents[0].rendered,
		"```none {.exec-block-output}\nbonjour\n```\n"
	);

	Ok(())
}
