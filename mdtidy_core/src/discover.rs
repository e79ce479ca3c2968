use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use ignore::DirEntry;
use ignore::WalkBuilder;
use ignore::gitignore::Gitignore;
use ignore::gitignore::GitignoreBuilder;

use crate::FormatOptions;
use crate::MdtidyError;
use crate::MdtidyResult;

/// File extensions collected when walking a directory.
pub const MARKDOWN_EXTENSIONS: [&str; 3] = ["md", "mdx", "markdown"];

/// Directory names never descended into, on top of hidden directories.
const SKIPPED_DIRECTORIES: [&str; 2] = ["node_modules", "target"];

/// Expand the given inputs into the markdown files to format.
///
/// Files are kept as given, even when their extension is not a markdown one.
/// Directories are walked recursively and only markdown files are collected,
/// skipping hidden entries, `node_modules`, `target`, anything matched by
/// the root `.gitignore` (unless disabled) and the configured exclude
/// patterns. With no inputs the whole `root` is walked.
///
/// The result is sorted and free of duplicates.
pub fn discover_markdown_files(
	root: &Path,
	inputs: &[PathBuf],
	options: &FormatOptions,
) -> MdtidyResult<Vec<PathBuf>> {
	let rules = Arc::new(SkipRules::new(root, options)?);

	let default_input = [root.to_path_buf()];
	let inputs = if inputs.is_empty() {
		&default_input[..]
	} else {
		inputs
	};

	let mut files = BTreeSet::new();

	for input in inputs {
		let input = if input.is_absolute() {
			input.clone()
		} else {
			root.join(input)
		};

		if input.is_dir() {
			collect_markdown_files(&input, &rules, &mut files)?;
		} else {
			files.insert(input);
		}
	}

	tracing::debug!(count = files.len(), "discovered markdown files");

	Ok(files.into_iter().collect())
}

/// Whether `path` has one of the [`MARKDOWN_EXTENSIONS`].
pub fn has_markdown_extension(path: &Path) -> bool {
	path.extension()
		.and_then(|extension| extension.to_str())
		.is_some_and(|extension| MARKDOWN_EXTENSIONS.contains(&extension))
}

/// Ignore rules anchored at the project root, shared by every walk.
struct SkipRules {
	gitignore: Gitignore,
	exclude: Gitignore,
}

impl SkipRules {
	fn new(root: &Path, options: &FormatOptions) -> MdtidyResult<Self> {
		let gitignore = if options.disable_gitignore {
			Gitignore::empty()
		} else {
			root_gitignore(root)
		};

		let mut exclude = GitignoreBuilder::new(root);
		for pattern in &options.exclude_patterns {
			exclude.add_line(None, pattern).map_err(|e| {
				MdtidyError::ConfigParse(format!("invalid exclude pattern `{pattern}`: {e}"))
			})?;
		}
		let exclude = exclude
			.build()
			.map_err(|e| MdtidyError::ConfigParse(format!("failed to build exclude rules: {e}")))?;

		Ok(Self { gitignore, exclude })
	}

	fn keeps(&self, entry: &DirEntry) -> bool {
		let is_dir = entry.file_type().is_some_and(|kind| kind.is_dir());
		let path = entry.path();

		if is_dir
			&& entry
				.file_name()
				.to_str()
				.is_some_and(|name| SKIPPED_DIRECTORIES.contains(&name))
		{
			return false;
		}

		!(self.gitignore.matched(path, is_dir).is_ignore()
			|| self.exclude.matched(path, is_dir).is_ignore())
	}
}

fn root_gitignore(root: &Path) -> Gitignore {
	let path = root.join(".gitignore");
	if !path.is_file() {
		return Gitignore::empty();
	}

	let (gitignore, error) = Gitignore::new(&path);
	if let Some(error) = error {
		tracing::warn!(path = %path.display(), %error, "skipping invalid .gitignore lines");
	}

	gitignore
}

fn collect_markdown_files(
	dir: &Path,
	rules: &Arc<SkipRules>,
	files: &mut BTreeSet<PathBuf>,
) -> MdtidyResult<()> {
	let rules = Arc::clone(rules);
	let walker = WalkBuilder::new(dir)
		.standard_filters(false)
		.hidden(true)
		.follow_links(true)
		.filter_entry(move |entry| rules.keeps(entry))
		.build();

	for entry in walker {
		let entry = entry.map_err(walk_error)?;
		let is_file = entry.file_type().is_some_and(|kind| kind.is_file());

		if is_file && has_markdown_extension(entry.path()) {
			files.insert(entry.into_path());
		}
	}

	Ok(())
}

fn walk_error(error: ignore::Error) -> MdtidyError {
	match error {
		ignore::Error::WithDepth { err, .. } => walk_error(*err),
		ignore::Error::Loop { child, .. } => {
			MdtidyError::SymlinkCycle {
				path: child.display().to_string(),
			}
		}
		error => {
			let kind = error
				.io_error()
				.map_or(std::io::ErrorKind::Other, std::io::Error::kind);
			MdtidyError::Io(std::io::Error::new(kind, error.to_string()))
		}
	}
}
