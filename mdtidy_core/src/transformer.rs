use std::path::Path;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::FrontMatter;
use crate::MdtidyResult;
use crate::format_front_matter;

/// Per-call context handed to every transformer.
///
/// A fresh context is created for each file. Node level calls receive a copy
/// carrying the node's line range in the original file.
#[derive(Debug, Clone)]
pub struct SourceContext {
	cancel: CancellationToken,
	path: PathBuf,
	line_numbers: String,
}

impl SourceContext {
	pub fn new(cancel: CancellationToken, path: impl Into<PathBuf>) -> Self {
		Self {
			cancel,
			path: path.into(),
			line_numbers: String::new(),
		}
	}

	/// A copy of this context pointing at lines `start..=end` (1-indexed).
	#[must_use]
	pub fn with_line_numbers(&self, start: usize, end: usize) -> Self {
		Self {
			cancel: self.cancel.clone(),
			path: self.path.clone(),
			line_numbers: format!("{start}-{end}"),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// The `"<start>-<end>"` line range of the current node, empty outside
	/// of a node.
	pub fn line_numbers(&self) -> &str {
		&self.line_numbers
	}

	pub fn cancellation_token(&self) -> &CancellationToken {
		&self.cancel
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}
}

/// Produces the header written in place of a document's front matter.
pub trait FrontMatterTransformer: Send + Sync {
	/// Returns the header to write before the body, `None` writes nothing.
	fn transform_front_matter(
		&self,
		ctx: &SourceContext,
		front_matter: &FrontMatter,
	) -> MdtidyResult<Option<String>>;

	/// Called once per file after the header has been written.
	fn close(&self, _ctx: &SourceContext) -> MdtidyResult<()> {
		Ok(())
	}
}

/// Produces content appended to the body before it is parsed.
pub trait BackMatterTransformer: Send + Sync {
	fn transform_back_matter(&self, ctx: &SourceContext) -> MdtidyResult<String>;

	fn close(&self, _ctx: &SourceContext) -> MdtidyResult<()> {
		Ok(())
	}
}

/// Rewrites the destination of every link and image.
pub trait LinkTransformer: Send + Sync {
	fn transform_destination(&self, ctx: &SourceContext, destination: &str)
	-> MdtidyResult<String>;

	fn close(&self, _ctx: &SourceContext) -> MdtidyResult<()> {
		Ok(())
	}
}

/// Rewrites the content of every fenced code block.
///
/// The info string is the full text after the opening fence, the code is the
/// literal block content. The returned text replaces the content while the
/// info string is kept.
pub trait CodeBlockTransformer: Send + Sync {
	fn transform_code_block(
		&self,
		ctx: &SourceContext,
		info: &str,
		code: &str,
	) -> MdtidyResult<String>;

	fn close(&self, _ctx: &SourceContext) -> MdtidyResult<()> {
		Ok(())
	}
}

/// Re-serializes front matter deterministically. The default front matter
/// transformer.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatFrontMatter;

impl FrontMatterTransformer for FormatFrontMatter {
	fn transform_front_matter(
		&self,
		_ctx: &SourceContext,
		front_matter: &FrontMatter,
	) -> MdtidyResult<Option<String>> {
		format_front_matter(front_matter)
	}
}

/// Drops front matter from the output.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoveFrontMatter;

impl FrontMatterTransformer for RemoveFrontMatter {
	fn transform_front_matter(
		&self,
		_ctx: &SourceContext,
		_front_matter: &FrontMatter,
	) -> MdtidyResult<Option<String>> {
		Ok(None)
	}
}
