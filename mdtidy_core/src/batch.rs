use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use similar::TextDiff;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::BatchError;
use crate::FormatPhase;
use crate::Formatter;
use crate::MdtidyError;
use crate::MdtidyResult;
use crate::SourceContext;
use crate::formatter::decode_markdown;

/// Settings shared by every file of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
	/// Cancels the run. Checked before a file is read, before it is written
	/// and while subprocesses run.
	pub cancel: CancellationToken,
	/// Maximum number of files processed at once, `0` for no bound.
	pub max_concurrency: usize,
}

/// A unified diff between a file and its formatted content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
	pub path: PathBuf,
	pub unified: String,
}

impl Diff {
	pub fn new(path: &Path, original: &str, formatted: &str) -> Self {
		let from = path.display().to_string();
		let to = format!("{from} (formatted)");
		let diff = TextDiff::from_lines(original, formatted);
		let unified = diff.unified_diff().header(&from, &to).to_string();

		Self {
			path: path.to_path_buf(),
			unified,
		}
	}
}

impl fmt::Display for Diff {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.unified)
	}
}

/// Diffs collected by [`check_files`], sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diffs(Vec<Diff>);

impl Diffs {
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Diff> {
		self.0.iter()
	}

	pub fn into_inner(self) -> Vec<Diff> {
		self.0
	}
}

impl fmt::Display for Diffs {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.0.is_empty() {
			return f.write_str("files the same; no diff");
		}

		for diff in &self.0 {
			write!(f, "{diff}")?;
		}

		Ok(())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
	Write,
	Check,
}

/// Format every file in place, rewriting only files whose content changed.
///
/// Files are processed concurrently and independently: a failing file never
/// stops the others, and every failure is reported in the returned
/// [`BatchError`].
pub async fn format_files(
	formatter: &Formatter,
	files: Vec<PathBuf>,
	options: &BatchOptions,
) -> Result<(), BatchError> {
	run(formatter, files, options, Mode::Write).await.map(|_| ())
}

/// Format every file in memory and return a diff for each file whose
/// formatted content differs. Files are never modified.
pub async fn check_files(
	formatter: &Formatter,
	files: Vec<PathBuf>,
	options: &BatchOptions,
) -> Result<Diffs, BatchError> {
	run(formatter, files, options, Mode::Check).await.map(Diffs)
}

async fn run(
	formatter: &Formatter,
	files: Vec<PathBuf>,
	options: &BatchOptions,
	mode: Mode,
) -> Result<Vec<Diff>, BatchError> {
	let total = files.len();
	let semaphore =
		(options.max_concurrency > 0).then(|| Arc::new(Semaphore::new(options.max_concurrency)));
	let mut tasks = JoinSet::new();
	let mut paths = HashMap::new();
	let mut failures: Vec<(PathBuf, MdtidyError)> = Vec::new();

	for path in files {
		let permit = match &semaphore {
			Some(semaphore) => {
				match Arc::clone(semaphore).acquire_owned().await {
					Ok(permit) => Some(permit),
					Err(e) => {
						failures.push((path, MdtidyError::Task(e.to_string())));
						continue;
					}
				}
			}
			None => None,
		};
		let formatter = formatter.clone();
		let cancel = options.cancel.clone();
		let task_path = path.clone();

		let task = tasks.spawn_blocking(move || {
			let _permit = permit;
			process_file(&formatter, &cancel, &task_path, mode)
		});
		paths.insert(task.id(), path);
	}

	let mut diffs = Vec::new();
	while let Some(joined) = tasks.join_next_with_id().await {
		let (id, result) = match joined {
			Ok((id, result)) => (id, Ok(result)),
			Err(error) => (error.id(), Err(error)),
		};
		let path = paths.remove(&id).unwrap_or_default();

		match result {
			Ok(Ok(Some(diff))) => diffs.push(diff),
			Ok(Ok(None)) => {}
			Ok(Err(error)) => failures.push((path, error)),
			Err(error) => {
				let error = MdtidyError::Task(format!("{}: {error}", path.display()));
				failures.push((path, error));
			}
		}
	}

	failures.sort_by(|a, b| a.0.cmp(&b.0));
	diffs.sort_by(|a, b| a.path.cmp(&b.path));

	tracing::info!(
		files = total,
		failed = failures.len(),
		changed = diffs.len(),
		"batch finished"
	);

	BatchError::from_errors(failures.into_iter().map(|(_, error)| error).collect())?;

	Ok(diffs)
}

fn process_file(
	formatter: &Formatter,
	cancel: &CancellationToken,
	path: &Path,
	mode: Mode,
) -> MdtidyResult<Option<Diff>> {
	if cancel.is_cancelled() {
		return Err(MdtidyError::Cancelled(path.display().to_string()));
	}

	let ctx = SourceContext::new(cancel.clone(), path);
	let mut file = open(path, mode)?;

	let mut bytes = Vec::new();
	file.read_to_end(&mut bytes)
		.map_err(|e| MdtidyError::Io(e).in_phase(path, FormatPhase::Read))?;
	let input = decode_markdown(path, bytes)?;
	let output = formatter.format(&ctx, &input)?;

	if cancel.is_cancelled() {
		return Err(MdtidyError::Cancelled(path.display().to_string()));
	}

	let diff = match mode {
		Mode::Write => {
			if output != input {
				rewrite(&mut file, &output)
					.map_err(|e| MdtidyError::Io(e).in_phase(path, FormatPhase::Write))?;
				tracing::debug!(path = %path.display(), "rewrote file");
			}
			None
		}
		Mode::Check => (output != input).then(|| Diff::new(path, &input, &output)),
	};

	Ok(diff)
}

fn open(path: &Path, mode: Mode) -> MdtidyResult<File> {
	OpenOptions::new()
		.read(true)
		.write(mode == Mode::Write)
		.open(path)
		.map_err(|source| {
			MdtidyError::Open {
				path: path.to_path_buf(),
				source,
			}
			.in_phase(path, FormatPhase::Read)
		})
}

fn rewrite(file: &mut File, content: &str) -> std::io::Result<()> {
	file.seek(SeekFrom::Start(0))?;
	file.write_all(content.as_bytes())?;
	file.set_len(content.len() as u64)?;
	file.flush()
}
