use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use rstest::rstest;
use similar_asserts::assert_eq;
use syn::Item;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

use super::*;
use crate::exec::execute_command;
use crate::typegen::DependencyCoordinate;
use crate::typegen::declares_struct;
use crate::typegen::extract_sample;
use crate::typegen::synthesize;

fn ctx(path: &str) -> SourceContext {
	SourceContext::new(CancellationToken::new(), path)
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
	let path = dir.join(name);
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("mkdir: {e}"));
	}
	std::fs::write(&path, content).unwrap_or_else(|e| panic!("write: {e}"));
	path
}

fn read(path: &Path) -> String {
	std::fs::read_to_string(path).unwrap_or_else(|e| panic!("read: {e}"))
}

/// Rewrites `x` to `y` and records the line range of every link.
#[derive(Default)]
struct RecordingLinks {
	closed: AtomicUsize,
	lines: Mutex<Vec<String>>,
}

impl LinkTransformer for RecordingLinks {
	fn transform_destination(&self, ctx: &SourceContext, destination: &str) -> MdtidyResult<String> {
		self.lines
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push(ctx.line_numbers().to_string());

		Ok(if destination == "x" {
			"y".to_string()
		} else {
			destination.to_string()
		})
	}

	fn close(&self, _ctx: &SourceContext) -> MdtidyResult<()> {
		self.closed.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

struct UppercaseLinks;

impl LinkTransformer for UppercaseLinks {
	fn transform_destination(&self, _ctx: &SourceContext, destination: &str) -> MdtidyResult<String> {
		Ok(destination.to_uppercase())
	}
}

/// Panics on links pointing at `boom`.
struct PanickingLinks;

impl LinkTransformer for PanickingLinks {
	fn transform_destination(&self, _ctx: &SourceContext, destination: &str) -> MdtidyResult<String> {
		assert_ne!(destination, "boom", "link transformer blew up");
		Ok(destination.to_string())
	}
}

#[derive(Default)]
struct FailingLinks {
	closed: AtomicUsize,
}

impl LinkTransformer for FailingLinks {
	fn transform_destination(&self, _ctx: &SourceContext, _destination: &str) -> MdtidyResult<String> {
		Err(MdtidyError::Transformer("boom".to_string()))
	}

	fn close(&self, _ctx: &SourceContext) -> MdtidyResult<()> {
		self.closed.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

#[derive(Default)]
struct RecordingCodeBlocks {
	closed: AtomicUsize,
	calls: Mutex<Vec<(String, String)>>,
}

impl CodeBlockTransformer for RecordingCodeBlocks {
	fn transform_code_block(&self, ctx: &SourceContext, info: &str, code: &str) -> MdtidyResult<String> {
		self.calls
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push((info.to_string(), ctx.line_numbers().to_string()));
		Ok(code.to_string())
	}

	fn close(&self, _ctx: &SourceContext) -> MdtidyResult<()> {
		self.closed.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

#[derive(Default)]
struct CountingFrontMatter {
	closed: AtomicUsize,
}

impl FrontMatterTransformer for CountingFrontMatter {
	fn transform_front_matter(
		&self,
		_ctx: &SourceContext,
		front_matter: &FrontMatter,
	) -> MdtidyResult<Option<String>> {
		format_front_matter(front_matter)
	}

	fn close(&self, _ctx: &SourceContext) -> MdtidyResult<()> {
		self.closed.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

#[derive(Default)]
struct Footer {
	closed: AtomicUsize,
}

impl BackMatterTransformer for Footer {
	fn transform_back_matter(&self, _ctx: &SourceContext) -> MdtidyResult<String> {
		Ok("\nFooter\n".to_string())
	}

	fn close(&self, _ctx: &SourceContext) -> MdtidyResult<()> {
		self.closed.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

#[test]
fn split_yaml_front_matter() {
	let split = split_front_matter("---\ntitle: Hello\nweight: 3\n---\n\n# Body\n");

	assert_eq!(split.front_matter.len(), 2);
	assert_eq!(
		split.front_matter.get("title").and_then(|v| v.as_str()),
		Some("Hello")
	);
	assert_eq!(
		split.front_matter.get("weight").and_then(serde_yaml_ng::Value::as_i64),
		Some(3)
	);
	assert_eq!(split.body.trim_start(), "# Body\n");
}

#[test]
fn split_toml_front_matter() {
	let split = split_front_matter("+++\ntitle = \"Hello\"\ndraft = true\n+++\n\nText\n");

	assert_eq!(
		split.front_matter.get("title").and_then(|v| v.as_str()),
		Some("Hello")
	);
	assert_eq!(
		split.front_matter.get("draft").and_then(serde_yaml_ng::Value::as_bool),
		Some(true)
	);
	assert_eq!(split.body.trim_start(), "Text\n");
}

#[rstest]
#[case::no_front_matter("# Title\n\nText\n")]
#[case::empty_front_matter("---\n---\n\nText\n")]
#[case::not_at_start("Text\n\n---\ntitle: x\n---\n")]
fn split_without_front_matter_keeps_whole_input(#[case] input: &str) {
	let split = split_front_matter(input);

	assert!(split.front_matter.is_empty());
	assert_eq!(split.body, input);
	assert_eq!(split.line_offset, 0);
}

#[test]
#[traced_test]
fn split_degrades_on_invalid_front_matter() {
	let input = "---\n- not\n- a map\n---\n\nText\n";
	let split = split_front_matter(input);

	assert!(split.front_matter.is_empty());
	assert_eq!(split.body, input);
	assert!(logs_contain("ignoring front matter"));
}

#[test]
fn format_front_matter_sorts_keys_descending() -> MdtidyResult<()> {
	let split = split_front_matter("---\nalpha: 1\ncharlie: true\nbravo: x\n---\n");
	let header = format_front_matter(&split.front_matter)?;

	assert_eq!(
		header.as_deref(),
		Some("---\ncharlie: true\nbravo: x\nalpha: 1\n---\n\n")
	);
	assert_eq!(format_front_matter(&FrontMatter::new())?, None);

	Ok(())
}

#[rstest]
#[case::nested_mapping("author:\n  name: Ada\n  links:\n    site: https://example.com\n")]
#[case::sequences("tags:\n  - rust\n  - markdown\nmatrix:\n  - [1, 2]\n  - [3, 4]\n")]
#[case::multiline_with_fence("desc: |\n  line\n  ---\n  more\ntitle: Fences\n")]
#[case::folded_string("summary: >\n  one\n  two\n\nweight: 2\n")]
#[case::mixed("draft: false\nitems:\n  - name: a\n    sizes: [1, 2]\n  - name: b\n    note: |\n      +++\n      done\n")]
fn front_matter_round_trips(#[case] yaml: &str) -> AnyEmptyResult {
	let source: FrontMatter = serde_yaml_ng::from_str(yaml)?;

	let Some(header) = format_front_matter(&source)? else {
		panic!("expected a front matter header");
	};
	let document = format!("{header}# Body\n");
	let split = split_front_matter(&document);

	assert_eq!(split.front_matter, source);
	assert_eq!(split.body.trim_start(), "# Body\n");

	Ok(())
}

#[test]
fn format_rewrites_link_destinations() -> MdtidyResult<()> {
	let links = Arc::new(RecordingLinks::default());
	let formatter = Formatter::new().with_link_transformer(links.clone());

	let output = formatter.format(&ctx("doc.md"), "# Title\n\nSee [here](x)\n")?;

	assert_eq!(output, "# Title\n\nSee [here](y)\n");
	assert_eq!(links.closed.load(Ordering::SeqCst), 1);

	Ok(())
}

#[test]
fn format_rewrites_link_and_image_destinations() -> MdtidyResult<()> {
	let formatter = Formatter::new().with_link_transformer(Arc::new(UppercaseLinks));

	let output = formatter.format(&ctx("doc.md"), "[text](old-dest)\n")?;
	assert_eq!(output, "[text](OLD-DEST)\n");

	let output = formatter.format(&ctx("doc.md"), "An ![image](img/b.png).\n")?;
	assert_eq!(output, "An ![image](IMG/B.PNG).\n");

	Ok(())
}

#[test]
fn format_reports_original_line_numbers() -> MdtidyResult<()> {
	let links = Arc::new(RecordingLinks::default());
	let blocks = Arc::new(RecordingCodeBlocks::default());
	let formatter = Formatter::new()
		.with_link_transformer(links.clone())
		.with_code_block_transformer(blocks.clone());
	let input = "---\ntitle: x\n---\n\nSee [here](x).\n\n```sh\necho hi\n```\n";

	formatter.format(&ctx("doc.md"), input)?;

	let lines = links.lines.lock().unwrap_or_else(PoisonError::into_inner);
	assert_eq!(*lines, vec!["5-5".to_string()]);
	let calls = blocks.calls.lock().unwrap_or_else(PoisonError::into_inner);
	assert_eq!(*calls, vec![("sh".to_string(), "7-9".to_string())]);

	Ok(())
}

#[test]
fn format_skips_indented_code_blocks() -> MdtidyResult<()> {
	let blocks = Arc::new(RecordingCodeBlocks::default());
	let formatter = Formatter::new().with_code_block_transformer(blocks.clone());

	formatter.format(&ctx("doc.md"), "Text\n\n    indented code\n")?;

	assert!(
		blocks
			.calls
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.is_empty()
	);
	assert_eq!(blocks.closed.load(Ordering::SeqCst), 1);

	Ok(())
}

#[test]
fn format_keeps_front_matter_header() -> MdtidyResult<()> {
	let output = Formatter::new().format(
		&ctx("doc.md"),
		"---\nauthor: Me\ntitle: Hello\n---\n\n# Body\n",
	)?;

	assert_eq!(output, "---\ntitle: Hello\nauthor: Me\n---\n\n# Body\n");

	Ok(())
}

#[test]
fn remove_front_matter_drops_header() -> MdtidyResult<()> {
	let formatter = Formatter::new().with_front_matter_transformer(Arc::new(RemoveFrontMatter));

	let output = formatter.format(&ctx("doc.md"), "---\ntitle: Hello\n---\n\n# Body\n")?;

	assert_eq!(output, "# Body\n");

	Ok(())
}

#[test]
fn formatter_from_options_honours_flags() -> MdtidyResult<()> {
	let input = "---\ntitle: Hello\n---\n\n```text a=b\nkeep\n```\n";
	let options = FormatOptions {
		remove_front_matter: true,
		directives: false,
		..FormatOptions::default()
	};

	let output = Formatter::from_options(&options).format(&ctx("doc.md"), input)?;

	assert_eq!(output, "```text a=b\nkeep\n```\n");
	assert!(
		Formatter::from_options(&FormatOptions::default())
			.format(&ctx("doc.md"), "```a=b\n```\n")
			.is_err()
	);

	Ok(())
}

#[test]
fn back_matter_is_appended_and_each_transformer_closed_once() -> MdtidyResult<()> {
	let front = Arc::new(CountingFrontMatter::default());
	let back = Arc::new(Footer::default());
	let formatter = Formatter::new()
		.with_front_matter_transformer(front.clone())
		.with_back_matter_transformer(back.clone());

	let output = formatter.format(&ctx("doc.md"), "# Title\n")?;

	assert_eq!(output, "# Title\n\nFooter\n");
	assert_eq!(front.closed.load(Ordering::SeqCst), 1);
	assert_eq!(back.closed.load(Ordering::SeqCst), 1);

	Ok(())
}

#[test]
fn failing_transformer_is_still_closed() {
	let links = Arc::new(FailingLinks::default());
	let formatter = Formatter::new().with_link_transformer(links.clone());

	let result = formatter.format(&ctx("doc.md"), "See [here](x)\n");

	let Err(error) = result else {
		panic!("expected the link transformer error");
	};
	assert!(matches!(
		error,
		MdtidyError::Format {
			phase: FormatPhase::FirstPass,
			..
		}
	));
	assert_eq!(error.to_string(), "first formatting phase for doc.md");
	assert_eq!(links.closed.load(Ordering::SeqCst), 1);
}

const SAMPLE_DOCUMENT: &str = "---
title: Doc
tags:
  - a
  - b
---

Intro *emphasis* and __strong__.

* one
* two

1) first
2) second

```rust
fn main() {}
```

> quoted
> text

| a | b |
|---|:-:|
| 1 | 2 |
";

#[test]
fn format_is_idempotent() -> MdtidyResult<()> {
	let formatter = Formatter::new();

	let once = formatter.format(&ctx("doc.md"), SAMPLE_DOCUMENT)?;
	let twice = formatter.format(&ctx("doc.md"), &once)?;

	assert_eq!(once, twice);

	Ok(())
}

#[test]
fn second_pass_is_a_fixed_point() -> MdtidyResult<()> {
	let formatter = Formatter::new().with_width(40);
	let body = split_front_matter(SAMPLE_DOCUMENT).body;

	let once = formatter.canonicalize(body)?;
	let twice = formatter.canonicalize(&once)?;

	assert_eq!(once, twice);

	Ok(())
}

#[rstest]
#[case::id("# Title {#custom-id}\n")]
#[case::id_before_text("# Title {#custom-id}\n\nText\n")]
#[case::class_and_key("## Install {.steps data-level=2}\n")]
#[case::quoted_value("### Usage {#usage title=\"Getting started\"}\n")]
#[case::setext("Title {#setext}\n=====\n")]
fn heading_attributes_are_kept_verbatim(#[case] input: &str) -> MdtidyResult<()> {
	let formatter = Formatter::new();

	let once = formatter.format(&ctx("doc.md"), input)?;
	let twice = formatter.format(&ctx("doc.md"), &once)?;

	assert!(once.contains('{'), "attributes dropped: {once}");
	assert!(!once.contains("\\#"), "attributes escaped: {once}");
	assert_eq!(once, twice);

	Ok(())
}

#[test]
fn heading_attributes_survive_the_second_pass() -> MdtidyResult<()> {
	let formatter = Formatter::new();

	assert_eq!(
		formatter.canonicalize("# Title {#custom-id}\n")?,
		"# Title {#custom-id}\n"
	);
	assert_eq!(
		formatter.format(&ctx("doc.md"), "# Title {#custom-id}\n\nText\n")?,
		"# Title {#custom-id}\n\nText\n"
	);

	Ok(())
}

#[rstest]
#[case::id("Title {#custom-id}", Some(("Title ", "{#custom-id}")))]
#[case::attributes_only("{.lead}", Some(("", "{.lead}")))]
#[case::trailing_space("Title {#id}  ", Some(("Title ", "{#id}")))]
#[case::not_attributes("Sets {a, b}", None)]
#[case::glued_to_text("Title{#id}", None)]
#[case::empty_braces("Title {}", None)]
#[case::bare_hash("Title {#}", None)]
#[case::no_braces("Title", None)]
fn split_heading_attribute_blocks(#[case] text: &str, #[case] expected: Option<(&str, &str)>) {
	assert_eq!(crate::formatter::split_heading_attributes(text), expected);
}

#[test]
fn format_file_rejects_invalid_utf8() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let path = tmp.path().join("binary.md");
	std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap_or_else(|e| panic!("write: {e}"));

	let result = Formatter::new().format_file(&CancellationToken::new(), &path);

	assert!(matches!(
		result,
		Err(MdtidyError::Format {
			phase: FormatPhase::Read,
			..
		})
	));
}

#[rstest]
#[case::empty("", None)]
#[case::language_only("rust", None)]
#[case::unknown_keys("rust title=example.rs", None)]
#[case::execute(
	r#"text execute-command="echo hi""#,
	Some(Directive::Execute { command: "echo hi".into(), expected_exit_code: None })
)]
#[case::execute_with_exit_code(
	r#"text execute-command="sh -c 'exit 3'" expect-exit-code=3"#,
	Some(Directive::Execute { command: "sh -c 'exit 3'".into(), expected_exit_code: Some(3) })
)]
#[case::generate(
	"yaml generate-from-type=src/config.rs:Config",
	Some(Directive::GenerateFromType(TypeLocation {
		location: "src/config.rs".into(),
		type_name: "Config".into(),
	}))
)]
#[case::generate_from_crate(
	"yaml generate-from-type=serde_json@1.0.120/src:Map",
	Some(Directive::GenerateFromType(TypeLocation {
		location: "serde_json@1.0.120/src".into(),
		type_name: "Map".into(),
	}))
)]
fn parse_valid_directives(
	#[case] info: &str,
	#[case] expected: Option<Directive>,
) -> MdtidyResult<()> {
	assert_eq!(parse_directives(info)?, expected);

	Ok(())
}

#[rstest]
#[case::missing_language("execute-command=ls", "missing_language")]
#[case::missing_value("text execute-command", "missing_value")]
#[case::both_primaries(
	"text execute-command=ls generate-from-type=a.rs:A",
	"ambiguous"
)]
#[case::generate_with_exit_code(
	"yaml generate-from-type=a.rs:A expect-exit-code=1",
	"ambiguous"
)]
#[case::exit_code_alone("text expect-exit-code=1", "missing_primary")]
#[case::non_integer_exit_code(
	"text execute-command=ls expect-exit-code=abc",
	"invalid_exit_code"
)]
#[case::unterminated_quote(r#"text execute-command="ls"#, "info_string")]
#[case::missing_type_name("yaml generate-from-type=Config", "type_location")]
fn parse_invalid_directives(#[case] info: &str, #[case] kind: &str) {
	let error = parse_directives(info).err();

	let matched = match (kind, &error) {
		("missing_language", Some(MdtidyError::MissingLanguage(_)))
		| ("missing_value", Some(MdtidyError::MissingDirectiveValue { .. }))
		| ("ambiguous", Some(MdtidyError::AmbiguousDirectives { .. }))
		| ("missing_primary", Some(MdtidyError::MissingPrimaryDirective(_)))
		| ("invalid_exit_code", Some(MdtidyError::InvalidExitCode(_)))
		| ("info_string", Some(MdtidyError::InfoStringParse(_)))
		| ("type_location", Some(MdtidyError::InvalidTypeLocation(_))) => true,
		_ => false,
	};

	assert!(matched, "expected {kind} error, got {error:?}");
}

#[test]
fn ambiguous_directives_never_execute() -> MdtidyResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let marker = tmp.path().join("marker");
	let info = format!(
		"text execute-command=\"touch {}\" generate-from-type=a.rs:A",
		marker.display()
	);
	let transformer = DirectiveCodeBlockTransformer::new();

	let result = transformer.transform_code_block(&ctx("doc.md"), &info, "old\n");

	assert!(result.is_err());
	assert!(!marker.exists());

	Ok(())
}

#[cfg(unix)]
#[test]
fn execute_command_returns_output() -> MdtidyResult<()> {
	let output = execute_command(&CancellationToken::new(), "echo hello", None)?;

	assert_eq!(output, "hello\n");

	Ok(())
}

#[cfg(unix)]
#[test]
fn execute_command_interleaves_stdout_and_stderr() -> MdtidyResult<()> {
	let output = execute_command(
		&CancellationToken::new(),
		"sh -c 'echo one; echo two >&2; echo three'",
		None,
	)?;

	assert_eq!(output, "one\ntwo\nthree\n");

	Ok(())
}

#[cfg(unix)]
#[test]
fn execute_command_tolerates_expected_exit_code() -> MdtidyResult<()> {
	let output = execute_command(
		&CancellationToken::new(),
		"sh -c 'echo out; exit 3'",
		Some(3),
	)?;

	assert_eq!(output, "out\n");

	Ok(())
}

#[cfg(unix)]
#[rstest]
#[case::no_expected_code(None)]
#[case::expects_zero(Some(0))]
#[case::other_expected_code(Some(2))]
fn execute_command_fails_on_unexpected_exit_code(#[case] expected: Option<i32>) {
	let result = execute_command(
		&CancellationToken::new(),
		"sh -c 'echo out; exit 3'",
		expected,
	);

	let Err(MdtidyError::CommandFailed { code, output, .. }) = result else {
		panic!("expected command failure, got {result:?}");
	};
	assert_eq!(code, Some(3));
	assert_eq!(output, "out\n");
}

#[test]
fn execute_command_reports_missing_program() {
	let result = execute_command(
		&CancellationToken::new(),
		"mdtidy-definitely-not-a-program --flag",
		None,
	);

	assert!(matches!(result, Err(MdtidyError::CommandSpawn { .. })));
}

#[cfg(unix)]
#[test]
fn cancelled_command_is_killed() {
	let cancel = CancellationToken::new();
	cancel.cancel();

	let result = execute_command(&cancel, "sleep 30", None);

	assert!(matches!(result, Err(MdtidyError::Cancelled(_))));
}

#[cfg(unix)]
#[test]
fn directive_replaces_code_block_content() -> MdtidyResult<()> {
	let formatter = Formatter::new()
		.with_code_block_transformer(Arc::new(DirectiveCodeBlockTransformer::new()));
	let input = "# Usage\n\n```text execute-command=\"echo hello\"\nstale\n```\n";

	let once = formatter.format(&ctx("doc.md"), input)?;
	let twice = formatter.format(&ctx("doc.md"), &once)?;

	assert!(once.contains("execute-command=\"echo hello\"\nhello\n```"), "{once}");
	assert!(!once.contains("stale"));
	assert_eq!(once, twice);

	Ok(())
}

#[test]
fn directive_errors_name_the_block() {
	let formatter = Formatter::new()
		.with_code_block_transformer(Arc::new(DirectiveCodeBlockTransformer::new()));

	let result = formatter.format(&ctx("doc.md"), "Text\n\n```a=b\ncode\n```\n");

	let Err(MdtidyError::Format { source, .. }) = result else {
		panic!("expected a formatting error, got {result:?}");
	};
	let MdtidyError::CodeBlock { info, lines, source } = *source else {
		panic!("expected a code block error");
	};
	assert_eq!(info, "a=b");
	assert_eq!(lines, "3-5");
	assert!(matches!(*source, MdtidyError::MissingLanguage(_)));
}

#[tokio::test]
async fn format_files_rewrites_changed_files() -> MdtidyResult<()> {
	let tmp = tempfile::tempdir()?;
	let messy = write(tmp.path(), "messy.md", "Title\n=====\n\n* a\n* b\n");
	let tidy = write(tmp.path(), "tidy.md", "# Tidy\n");
	let formatter = Formatter::new();
	let expected = formatter.format(&ctx("messy.md"), "Title\n=====\n\n* a\n* b\n")?;

	format_files(&formatter, vec![messy.clone(), tidy.clone()], &BatchOptions::default())
		.await
		.unwrap_or_else(|e| panic!("batch failed: {e:?}"));

	assert_eq!(read(&messy), expected);
	assert_eq!(read(&tidy), "# Tidy\n");

	Ok(())
}

#[tokio::test]
async fn check_files_reports_diffs_without_writing() -> MdtidyResult<()> {
	let tmp = tempfile::tempdir()?;
	let messy = write(tmp.path(), "messy.md", "Title\n=====\n");
	let tidy = write(tmp.path(), "tidy.md", "# Tidy\n");

	let diffs = check_files(
		&Formatter::new(),
		vec![tidy, messy.clone()],
		&BatchOptions::default(),
	)
	.await
	.unwrap_or_else(|e| panic!("batch failed: {e:?}"));

	assert_eq!(diffs.len(), 1);
	let diff = diffs.iter().next().unwrap_or_else(|| panic!("missing diff"));
	assert_eq!(diff.path, messy);
	assert!(diff.unified.contains("(formatted)"));
	assert!(diff.unified.contains("-Title"));
	assert!(diff.unified.contains("+# Title"));
	assert_eq!(read(&messy), "Title\n=====\n");

	Ok(())
}

#[tokio::test]
async fn check_files_without_changes_has_no_diff() -> MdtidyResult<()> {
	let tmp = tempfile::tempdir()?;
	let tidy = write(tmp.path(), "tidy.md", "# Tidy\n\nText.\n");

	let diffs = check_files(&Formatter::new(), vec![tidy], &BatchOptions::default())
		.await
		.unwrap_or_else(|e| panic!("batch failed: {e:?}"));

	assert!(diffs.is_empty());
	assert_eq!(diffs.to_string(), "files the same; no diff");

	Ok(())
}

#[rstest]
#[case::unbounded(0)]
#[case::one_at_a_time(1)]
#[tokio::test]
async fn one_failing_file_does_not_stop_the_batch(#[case] max_concurrency: usize) -> MdtidyResult<()> {
	let tmp = tempfile::tempdir()?;
	let first = write(tmp.path(), "a.md", "* one\n");
	let broken = write(tmp.path(), "b.md", "```a=b\ncode\n```\n");
	let last = write(tmp.path(), "c.md", "* three\n");
	let formatter = Formatter::new()
		.with_code_block_transformer(Arc::new(DirectiveCodeBlockTransformer::new()));
	let options = BatchOptions {
		max_concurrency,
		..BatchOptions::default()
	};

	let result = format_files(&formatter, vec![first.clone(), broken.clone(), last.clone()], &options).await;

	let Err(error) = result else {
		panic!("expected one failure");
	};
	assert_eq!(error.errors.len(), 1);
	assert!(error.errors[0].to_string().contains("b.md"));
	assert_eq!(read(&first), "- one\n");
	assert_eq!(read(&last), "- three\n");
	assert_eq!(read(&broken), "```a=b\ncode\n```\n");

	Ok(())
}

#[tokio::test]
async fn batch_errors_are_sorted_by_path() -> MdtidyResult<()> {
	let tmp = tempfile::tempdir()?;
	let later = write(tmp.path(), "z.md", "```a=b\n```\n");
	let earlier = write(tmp.path(), "a.md", "```c=d\n```\n");
	let formatter = Formatter::new()
		.with_code_block_transformer(Arc::new(DirectiveCodeBlockTransformer::new()));

	let result = check_files(&formatter, vec![later, earlier], &BatchOptions::default()).await;

	let Err(error) = result else {
		panic!("expected failures");
	};
	assert_eq!(error.errors.len(), 2);
	assert!(error.errors[0].to_string().contains("a.md"));
	assert!(error.errors[1].to_string().contains("z.md"));

	Ok(())
}

#[rstest]
#[case::write(false)]
#[case::check(true)]
#[tokio::test]
async fn cancelled_batch_reports_every_file_without_touching_it(#[case] check: bool) -> MdtidyResult<()> {
	let tmp = tempfile::tempdir()?;
	let files = vec![
		write(tmp.path(), "a.md", "* a\n"),
		write(tmp.path(), "b.md", "* b\n"),
	];
	let options = BatchOptions::default();
	options.cancel.cancel();

	let errors = if check {
		check_files(&Formatter::new(), files.clone(), &options).await.err()
	} else {
		format_files(&Formatter::new(), files.clone(), &options).await.err()
	};

	let Some(error) = errors else {
		panic!("expected cancellation errors");
	};
	assert_eq!(error.errors.len(), 2);
	assert!(
		error
			.errors
			.iter()
			.all(|error| matches!(error, MdtidyError::Cancelled(_)))
	);
	assert_eq!(read(&files[0]), "* a\n");
	assert_eq!(read(&files[1]), "* b\n");

	Ok(())
}

#[tokio::test]
async fn panicking_file_is_reported_with_its_path() -> MdtidyResult<()> {
	let tmp = tempfile::tempdir()?;
	let fine = write(tmp.path(), "fine.md", "* [ok](ok)\n");
	let broken = write(tmp.path(), "broken.md", "[bad](boom)\n");
	let formatter = Formatter::new().with_link_transformer(Arc::new(PanickingLinks));

	let result = format_files(&formatter, vec![fine.clone(), broken.clone()], &BatchOptions::default()).await;

	let Err(error) = result else {
		panic!("expected the panicking file to fail");
	};
	assert_eq!(error.errors.len(), 1);
	assert!(matches!(error.errors[0], MdtidyError::Task(_)));
	let message = error.errors[0].to_string();
	assert!(message.contains("broken.md"), "missing path: {message}");
	assert_eq!(read(&fine), "- [ok](ok)\n");
	assert_eq!(read(&broken), "[bad](boom)\n");

	Ok(())
}

#[test]
fn discover_walks_markdown_files() -> MdtidyResult<()> {
	let tmp = tempfile::tempdir()?;
	let root = tmp.path();
	write(root, "readme.md", "# Readme\n");
	write(root, "notes.txt", "plain");
	write(root, "docs/guide.markdown", "# Guide\n");
	write(root, "docs/page.mdx", "# Page\n");
	write(root, ".hidden/secret.md", "# Secret\n");
	write(root, "target/build.md", "# Build\n");
	write(root, "node_modules/pkg/readme.md", "# Pkg\n");
	write(root, "ignored/skip.md", "# Skip\n");
	write(root, "vendor/third.md", "# Third\n");
	write(root, ".gitignore", "ignored/\n");
	let options = FormatOptions {
		exclude_patterns: vec!["vendor/".to_string()],
		..FormatOptions::default()
	};

	let files = discover_markdown_files(root, &[], &options)?;

	assert_eq!(
		files,
		vec![
			root.join("docs/guide.markdown"),
			root.join("docs/page.mdx"),
			root.join("readme.md"),
		]
	);

	Ok(())
}

#[test]
fn discover_keeps_explicit_files_and_respects_disabled_gitignore() -> MdtidyResult<()> {
	let tmp = tempfile::tempdir()?;
	let root = tmp.path();
	write(root, "notes.txt", "plain");
	write(root, "ignored/skip.md", "# Skip\n");
	write(root, ".gitignore", "ignored/\n");
	let options = FormatOptions {
		disable_gitignore: true,
		..FormatOptions::default()
	};

	let files = discover_markdown_files(
		root,
		&[PathBuf::from("notes.txt"), PathBuf::from("ignored")],
		&options,
	)?;

	assert_eq!(
		files,
		vec![root.join("ignored/skip.md"), root.join("notes.txt")]
	);

	Ok(())
}

#[test]
fn discover_anchors_patterns_at_the_root_for_nested_inputs() -> MdtidyResult<()> {
	let tmp = tempfile::tempdir()?;
	let root = tmp.path();
	write(root, "docs/guide.md", "# Guide\n");
	write(root, "docs/drafts/wip.md", "# Wip\n");
	write(root, "docs/generated/api.md", "# Api\n");
	write(root, "docs/target/out.md", "# Out\n");
	write(root, ".gitignore", "/docs/generated/\n");
	let options = FormatOptions {
		exclude_patterns: vec!["/docs/drafts".to_string()],
		..FormatOptions::default()
	};

	let files = discover_markdown_files(root, &[PathBuf::from("docs")], &options)?;

	assert_eq!(files, vec![root.join("docs/guide.md")]);

	Ok(())
}

#[cfg(unix)]
#[test]
fn discover_reports_symlink_cycles() -> MdtidyResult<()> {
	let tmp = tempfile::tempdir()?;
	let root = tmp.path();
	write(root, "docs/page.md", "# Page\n");
	std::os::unix::fs::symlink(root.join("docs"), root.join("docs/again"))?;

	let result = discover_markdown_files(root, &[], &FormatOptions::default());

	assert!(
		matches!(result, Err(MdtidyError::SymlinkCycle { .. })),
		"{result:?}"
	);

	Ok(())
}

#[rstest]
#[case::md("readme.md", true)]
#[case::mdx("page.mdx", true)]
#[case::markdown("guide.markdown", true)]
#[case::text("notes.txt", false)]
#[case::no_extension("Makefile", false)]
#[case::uppercase("README.MD", false)]
fn markdown_extensions(#[case] name: &str, #[case] expected: bool) {
	assert_eq!(has_markdown_extension(Path::new(name)), expected);
}

#[test]
fn config_is_loaded_into_options() -> MdtidyResult<()> {
	let tmp = tempfile::tempdir()?;
	write(
		tmp.path(),
		".config/mdtidy.toml",
		"[front_matter]\nremove = true\n\n[code]\ndirectives = false\n\n[render]\nwidth = \
		 80\n\n[batch]\nmax_concurrency = 4\n\n[exclude]\npatterns = [\"vendor/\"]\n",
	);

	let config = MdtidyConfig::load(tmp.path())?;
	let options = FormatOptions::from_config(config.as_ref());

	assert_eq!(
		options,
		FormatOptions {
			remove_front_matter: true,
			directives: false,
			cargo: "cargo".to_string(),
			width: 80,
			max_concurrency: 4,
			exclude_patterns: vec!["vendor/".to_string()],
			disable_gitignore: false,
		}
	);

	Ok(())
}

#[test]
fn missing_config_uses_defaults() -> MdtidyResult<()> {
	let tmp = tempfile::tempdir()?;

	let config = MdtidyConfig::load(tmp.path())?;

	assert!(config.is_none());
	assert_eq!(FormatOptions::from_config(None), FormatOptions::default());

	Ok(())
}

#[test]
fn sample_config_parses() -> MdtidyResult<()> {
	let tmp = tempfile::tempdir()?;
	write(tmp.path(), "mdtidy.toml", SAMPLE_CONFIG);

	let config = MdtidyConfig::load(tmp.path())?;

	assert_eq!(
		FormatOptions::from_config(config.as_ref()),
		FormatOptions::default()
	);

	Ok(())
}

#[test]
fn invalid_config_is_an_error() -> MdtidyResult<()> {
	let tmp = tempfile::tempdir()?;
	write(tmp.path(), "mdtidy.toml", "[render\nwidth = ");

	let result = MdtidyConfig::load(tmp.path());

	assert!(matches!(result, Err(MdtidyError::ConfigParse(_))));

	Ok(())
}

#[test]
fn extract_sample_picks_the_labelled_section() -> MdtidyResult<()> {
	let output = "---\nServer\nport: 0\nhost: ''\n---\nClient\nretries: 0\n";

	assert_eq!(extract_sample(output, "Server")?, "port: 0\nhost: ''\n");
	assert_eq!(extract_sample(output, "Client")?, "retries: 0\n");
	assert!(matches!(
		extract_sample(output, "Missing"),
		Err(MdtidyError::SampleSectionMissing(_))
	));

	Ok(())
}

const TYPE_SOURCE: &str = r#"
use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

pub type Labels = BTreeMap<String, String>;

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
	/// Listen address.
	#[serde(rename = "listen")]
	pub address: String,
	pub backends: Vec<Backend>,
	pub mode: Mode,
	pub shape: Shape,
	pub labels: Labels,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backend {
	#[serde(skip_serializing_if = "String::is_empty")]
	pub url: String,
	pub weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Mode {
	Fast,
	Safe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Shape {
	Circle { radius: u32 },
	Square(u32),
}

pub struct Wrapper<T> {
	pub inner: T,
}

impl Config {
	pub fn new() -> Self {
		todo!()
	}
}
"#;

fn synthesized_items() -> MdtidyResult<Vec<Item>> {
	let program = synthesize(TYPE_SOURCE, "config.rs", "Config")?;
	let file = syn::parse_file(&program).unwrap_or_else(|e| panic!("invalid program: {e}"));
	Ok(file.items)
}

fn derives(attrs: &[syn::Attribute]) -> String {
	attrs
		.iter()
		.filter(|attr| attr.path().is_ident("derive"))
		.map(|attr| quote::quote!(#attr).to_string())
		.collect()
}

#[test]
fn synthesize_copies_types_with_sample_derives() -> MdtidyResult<()> {
	let items = synthesized_items()?;

	let config = items
		.iter()
		.find_map(|item| {
			match item {
				Item::Struct(item) if item.ident == "Config" => Some(item),
				_ => None,
			}
		})
		.unwrap_or_else(|| panic!("missing Config"));
	let derive = derives(&config.attrs);
	assert!(derive.contains("Default"), "{derive}");
	assert!(derive.contains("Serialize"), "{derive}");
	assert!(!derive.contains("Clone"), "{derive}");
	assert!(config.attrs.iter().any(|attr| attr.path().is_ident("serde")));
	assert!(!config.attrs.iter().any(|attr| attr.path().is_ident("doc")));

	let address = config
		.fields
		.iter()
		.next()
		.unwrap_or_else(|| panic!("missing field"));
	assert!(address.attrs.iter().all(|attr| attr.path().is_ident("serde")));
	assert_eq!(address.attrs.len(), 1);

	assert!(
		items
			.iter()
			.any(|item| matches!(item, Item::Type(item) if item.ident == "Labels"))
	);
	assert!(
		!items
			.iter()
			.any(|item| matches!(item, Item::Struct(item) if item.ident == "Wrapper"))
	);
	assert!(!items.iter().any(|item| matches!(item, Item::Impl(impl_item) if impl_item.trait_.is_none())));

	Ok(())
}

#[test]
fn synthesize_copies_only_standard_library_imports() -> MdtidyResult<()> {
	let items = synthesized_items()?;

	let imports: Vec<String> = items
		.iter()
		.filter_map(|item| {
			match item {
				Item::Use(item) => Some(quote::quote!(#item).to_string()),
				_ => None,
			}
		})
		.collect();

	assert_eq!(imports.len(), 1, "{imports:?}");
	assert!(imports[0].contains("BTreeMap"));

	Ok(())
}

#[test]
fn synthesize_gives_every_enum_a_default() -> MdtidyResult<()> {
	let items = synthesized_items()?;

	let mode = items
		.iter()
		.find_map(|item| {
			match item {
				Item::Enum(item) if item.ident == "Mode" => Some(item),
				_ => None,
			}
		})
		.unwrap_or_else(|| panic!("missing Mode"));
	assert!(derives(&mode.attrs).contains("Default"));
	let first = mode.variants.first().unwrap_or_else(|| panic!("no variants"));
	assert!(first.attrs.iter().any(|attr| attr.path().is_ident("default")));

	let shape_default = items.iter().any(|item| {
		match item {
			Item::Impl(item) => {
				let self_ty = &item.self_ty;
				item.trait_.is_some() && quote::quote!(#self_ty).to_string() == "Shape"
			}
			_ => false,
		}
	});
	assert!(shape_default, "missing Default impl for Shape");

	Ok(())
}

#[test]
fn synthesize_records_serde_options_of_fields() -> MdtidyResult<()> {
	let items = synthesized_items()?;

	let fields = items
		.iter()
		.find_map(|item| {
			match item {
				Item::Const(item) if item.ident == "MDTIDY_FIELDS" => Some(quote::quote!(#item).to_string()),
				_ => None,
			}
		})
		.unwrap_or_else(|| panic!("missing field table"));

	assert!(fields.contains("\"skip_serializing_if\""), "{fields}");
	assert!(fields.contains("\"Backend\""), "{fields}");
	assert!(fields.contains("\"rename\""), "{fields}");

	Ok(())
}

#[rstest]
#[case::missing("Missing", "not_found")]
#[case::generic("Wrapper", "unsupported")]
fn synthesize_rejects_unusable_types(#[case] type_name: &str, #[case] kind: &str) {
	let result = synthesize(TYPE_SOURCE, "config.rs", type_name);

	let matched = match (kind, &result) {
		("not_found", Err(MdtidyError::TypeNotFound { .. }))
		| ("unsupported", Err(MdtidyError::UnsupportedType { .. })) => true,
		_ => false,
	};
	assert!(matched, "expected {kind}, got {result:?}");
}

#[test]
fn synthesize_rejects_invalid_rust() {
	let result = synthesize("pub struct {", "broken.rs", "Config");

	assert!(matches!(result, Err(MdtidyError::RustSyntax { .. })));
}

#[test]
fn support_module_is_valid_rust() {
	assert!(syn::parse_file(typegen::SUPPORT_SOURCE).is_ok());
}

#[rstest]
#[case::declared("pub struct Config {\n\tport: u16,\n}\n", true)]
#[case::only_mentioned("// struct Config is documented elsewhere\nfn config() {}\n", false)]
#[case::prefix_of_other("struct ConfigBuilder;\n", false)]
fn declares_struct_checks_top_level_items(#[case] source: &str, #[case] expected: bool) {
	assert_eq!(declares_struct(source, "Config"), expected);
}

#[rstest]
#[case::name_only("toml", Some(("toml", None, None)))]
#[case::with_version("toml@0.8.19", Some(("toml", Some("0.8.19"), None)))]
#[case::with_subdir("serde@1.0.200/src/de", Some(("serde", Some("1.0.200"), Some("src/de"))))]
#[case::subdir_without_version("tokio-util/src/sync", Some(("tokio-util", None, Some("src/sync"))))]
#[case::empty_version("toml@", None)]
#[case::invalid_name("not a crate", None)]
fn parse_dependency_coordinates(
	#[case] value: &str,
	#[case] expected: Option<(&str, Option<&str>, Option<&str>)>,
) {
	let expected = expected.map(|(name, version, subdir)| {
		DependencyCoordinate {
			name: name.to_string(),
			version: version.map(ToString::to_string),
			subdir: subdir.map(ToString::to_string),
		}
	});

	assert_eq!(DependencyCoordinate::parse(value), expected);
}

#[test]
#[ignore = "builds a sample program with cargo and downloads serde from crates.io"]
fn generate_sample_from_local_file() -> MdtidyResult<()> {
	let tmp = tempfile::tempdir()?;
	let source = write(
		tmp.path(),
		"config.rs",
		"pub struct Config {\n\tpub name: String,\n\tpub ports: Vec<u16>,\n\tpub verbose: \
		 bool,\n}\n",
	);
	let location = TypeLocation {
		location: source.display().to_string(),
		type_name: "Config".to_string(),
	};

	let sample = typegen::generate_sample(&CancellationToken::new(), DEFAULT_CARGO, &location)?;

	assert_eq!(sample, "name: ''\nports:\n- 0\nverbose: false\n");

	Ok(())
}

#[test]
#[ignore = "builds a sample program with cargo and downloads serde from crates.io"]
fn generate_sample_rejects_optional_fields() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let source = write(
		tmp.path(),
		"config.rs",
		"pub struct Config {\n\tpub name: Option<String>,\n}\n",
	);
	let location = TypeLocation {
		location: source.display().to_string(),
		type_name: "Config".to_string(),
	};

	let result = typegen::generate_sample(&CancellationToken::new(), DEFAULT_CARGO, &location);

	let Err(MdtidyError::CommandFailed { output, .. }) = result else {
		panic!("expected the sample program to fail, got {result:?}");
	};
	assert!(output.contains("null values are not allowed"), "{output}");
}
