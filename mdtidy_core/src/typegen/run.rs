use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::synth::SUPPORT_MODULE;
use super::synth::SUPPORT_SOURCE;
use crate::MdtidyError;
use crate::MdtidyResult;
use crate::exec::run_captured;

const SAMPLE_MANIFEST: &str = r#"[package]
name = "mdtidy-sample"
version = "0.0.0"
edition = "2021"
publish = false

[dependencies]
serde = { version = "1", features = ["derive"] }
serde_yaml_ng = "0.10"

[workspace]
"#;

/// Build and run a generated sample program, returning its stdout.
///
/// The program lives in a temporary cargo project that is removed when this
/// returns. `type_name` is passed as the program's only argument.
pub fn run_program(
	cancel: &CancellationToken,
	cargo: &str,
	program: &str,
	type_name: &str,
) -> MdtidyResult<String> {
	let project = TempDir::with_prefix("mdtidy-sample-")?;
	let src = project.path().join("src");
	std::fs::create_dir_all(&src)?;
	std::fs::write(project.path().join("Cargo.toml"), SAMPLE_MANIFEST)?;
	std::fs::write(src.join("main.rs"), program)?;
	std::fs::write(src.join(format!("{SUPPORT_MODULE}.rs")), SUPPORT_SOURCE)?;

	let fetch = run_captured(cancel, cargo, &["fetch", "--quiet"], project.path())?;
	if fetch.code != Some(0) {
		return Err(MdtidyError::CommandFailed {
			command: format!("{cargo} fetch"),
			code: fetch.code,
			output: fetch.stderr,
		});
	}

	let run = run_captured(
		cancel,
		cargo,
		&["run", "--quiet", "--", type_name],
		project.path(),
	)?;
	if run.code != Some(0) {
		return Err(MdtidyError::CommandFailed {
			command: format!("{cargo} run --quiet -- {type_name}"),
			code: run.code,
			output: format!("{}{}", run.stdout, run.stderr),
		});
	}

	if !run.stderr.trim().is_empty() {
		tracing::warn!(stderr = %run.stderr.trim(), "some sample types were skipped");
	}

	Ok(run.stdout)
}

/// Pick the YAML body of the section labelled `type_name` out of the
/// program output.
///
/// Sections start with a `---` line followed by the label line and run
/// until the next `---` line. The body is returned with a trailing newline.
pub fn extract_sample(output: &str, type_name: &str) -> MdtidyResult<String> {
	let mut lines = output.lines();

	while let Some(line) = lines.next() {
		if line != "---" {
			continue;
		}

		if lines.clone().next() != Some(type_name) {
			continue;
		}
		lines.next();

		let body: Vec<&str> = lines.take_while(|line| *line != "---").collect();
		let mut sample = body.join("\n");
		sample.push('\n');
		return Ok(sample);
	}

	Err(MdtidyError::SampleSectionMissing(type_name.to_string()))
}
