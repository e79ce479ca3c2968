use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use comrak::Arena;
use comrak::Options;
use comrak::format_commonmark;
use comrak::nodes::AstNode;
use comrak::nodes::NodeValue;
use comrak::parse_document;
use tokio_util::sync::CancellationToken;

use crate::BackMatterTransformer;
use crate::CodeBlockTransformer;
use crate::DirectiveCodeBlockTransformer;
use crate::FormatFrontMatter;
use crate::FormatOptions;
use crate::FormatPhase;
use crate::FrontMatterTransformer;
use crate::LinkTransformer;
use crate::MdtidyError;
use crate::MdtidyResult;
use crate::RemoveFrontMatter;
use crate::SourceContext;
use crate::split_front_matter;

/// Formats markdown documents through a two-pass parse and render pipeline.
///
/// The first pass parses the body, runs the link and code block transformers
/// over every matching node and renders CommonMark. The second pass parses
/// and renders that output again without any transformers, which settles
/// whitespace and alignment so that formatting is idempotent.
///
/// Transformers are shared with every clone of the formatter.
#[derive(Clone)]
pub struct Formatter {
	front_matter: Option<Arc<dyn FrontMatterTransformer>>,
	back_matter: Option<Arc<dyn BackMatterTransformer>>,
	link: Option<Arc<dyn LinkTransformer>>,
	code_block: Option<Arc<dyn CodeBlockTransformer>>,
	width: usize,
}

impl Default for Formatter {
	fn default() -> Self {
		Self {
			front_matter: Some(Arc::new(FormatFrontMatter)),
			back_matter: None,
			link: None,
			code_block: None,
			width: 0,
		}
	}
}

impl fmt::Debug for Formatter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Formatter")
			.field("front_matter", &self.front_matter.is_some())
			.field("back_matter", &self.back_matter.is_some())
			.field("link", &self.link.is_some())
			.field("code_block", &self.code_block.is_some())
			.field("width", &self.width)
			.finish()
	}
}

impl Formatter {
	pub fn new() -> Self {
		Self::default()
	}

	/// The formatter described by resolved options: front matter is removed
	/// or re-serialized and directives run with the configured cargo.
	pub fn from_options(options: &FormatOptions) -> Self {
		let mut formatter = Self::new().with_width(options.width);

		if options.remove_front_matter {
			formatter = formatter.with_front_matter_transformer(Arc::new(RemoveFrontMatter));
		}

		if options.directives {
			formatter = formatter.with_code_block_transformer(Arc::new(
				DirectiveCodeBlockTransformer::new().with_cargo(options.cargo.clone()),
			));
		}

		formatter
	}

	/// Replace the default [`FormatFrontMatter`] transformer.
	#[must_use]
	pub fn with_front_matter_transformer(
		mut self,
		transformer: Arc<dyn FrontMatterTransformer>,
	) -> Self {
		self.front_matter = Some(transformer);
		self
	}

	/// Drop front matter without calling any transformer.
	#[must_use]
	pub fn without_front_matter_transformer(mut self) -> Self {
		self.front_matter = None;
		self
	}

	#[must_use]
	pub fn with_back_matter_transformer(mut self, transformer: Arc<dyn BackMatterTransformer>) -> Self {
		self.back_matter = Some(transformer);
		self
	}

	#[must_use]
	pub fn with_link_transformer(mut self, transformer: Arc<dyn LinkTransformer>) -> Self {
		self.link = Some(transformer);
		self
	}

	#[must_use]
	pub fn with_code_block_transformer(mut self, transformer: Arc<dyn CodeBlockTransformer>) -> Self {
		self.code_block = Some(transformer);
		self
	}

	/// Soft-wrap rendered paragraphs at `width` columns. `0` never wraps.
	#[must_use]
	pub fn with_width(mut self, width: usize) -> Self {
		self.width = width;
		self
	}

	/// Format a whole document.
	///
	/// The front matter header (if any) is written first, the back matter is
	/// appended to the body and the body goes through both rendering passes.
	/// Errors are tagged with the file path and the failing phase.
	pub fn format(&self, ctx: &SourceContext, input: &str) -> MdtidyResult<String> {
		let path = ctx.path();
		let split = split_front_matter(input);
		let mut output = String::new();

		tracing::debug!(
			path = %path.display(),
			front_matter_keys = split.front_matter.len(),
			"formatting document"
		);

		if let Some(transformer) = &self.front_matter {
			let header = transformer
				.transform_front_matter(ctx, &split.front_matter)
				.map_err(|e| e.in_phase(path, FormatPhase::FrontMatter))?;
			if let Some(header) = header {
				output.push_str(&header);
			}
			transformer
				.close(ctx)
				.map_err(|e| e.in_phase(path, FormatPhase::FrontMatter))?;
		}

		let mut body = Cow::Borrowed(split.body);
		if let Some(transformer) = &self.back_matter {
			let back = transformer
				.transform_back_matter(ctx)
				.map_err(|e| e.in_phase(path, FormatPhase::BackMatter))?;
			body.to_mut().push_str(&back);
			transformer
				.close(ctx)
				.map_err(|e| e.in_phase(path, FormatPhase::BackMatter))?;
		}

		let first = self
			.first_pass(ctx, &body, split.line_offset)
			.map_err(|e| e.in_phase(path, FormatPhase::FirstPass))?;
		let second = self
			.canonicalize(&first)
			.map_err(|e| e.in_phase(path, FormatPhase::SecondPass))?;
		output.push_str(&second);

		Ok(output)
	}

	/// Parse and render `body` without any transformers.
	pub fn canonicalize(&self, body: &str) -> MdtidyResult<String> {
		let arena = Arena::new();
		let mut options = Options::default();
		configure(&mut options, self.width);

		let root = parse(&arena, body, &options);
		render(root, &options)
	}

	/// Read the file at `path` and format it.
	pub fn format_file(&self, cancel: &CancellationToken, path: &Path) -> MdtidyResult<String> {
		let ctx = SourceContext::new(cancel.clone(), path);
		let input = read_markdown(path)?;
		self.format(&ctx, &input)
	}

	fn first_pass(&self, ctx: &SourceContext, body: &str, line_offset: usize) -> MdtidyResult<String> {
		let arena = Arena::new();
		let mut options = Options::default();
		configure(&mut options, self.width);

		let root = parse(&arena, body, &options);
		let walked = self.transform_nodes(ctx, root, line_offset);
		let closed = self.close_node_transformers(ctx);
		walked?;
		closed?;

		render(root, &options)
	}

	fn transform_nodes<'a>(
		&self,
		ctx: &SourceContext,
		root: &'a AstNode<'a>,
		line_offset: usize,
	) -> MdtidyResult<()> {
		if self.link.is_none() && self.code_block.is_none() {
			return Ok(());
		}

		for node in root.descendants() {
			let mut ast = node.data.borrow_mut();
			let start = ast.sourcepos.start.line + line_offset;
			let end = ast.sourcepos.end.line + line_offset;

			match &mut ast.value {
				NodeValue::Link(link) | NodeValue::Image(link) => {
					if let Some(transformer) = &self.link {
						let node_ctx = ctx.with_line_numbers(start, end);
						link.url = transformer.transform_destination(&node_ctx, &link.url)?;
					}
				}
				NodeValue::CodeBlock(block) if block.fenced => {
					if let Some(transformer) = &self.code_block {
						let node_ctx = ctx.with_line_numbers(start, end);
						block.literal =
							transformer.transform_code_block(&node_ctx, &block.info, &block.literal)?;
					}
				}
				_ => {}
			}
		}

		Ok(())
	}

	fn close_node_transformers(&self, ctx: &SourceContext) -> MdtidyResult<()> {
		let link = self.link.as_ref().map_or(Ok(()), |t| t.close(ctx));
		let code_block = self.code_block.as_ref().map_or(Ok(()), |t| t.close(ctx));
		link.and(code_block)
	}
}

fn configure(options: &mut Options, width: usize) {
	options.extension.table = true;
	options.extension.strikethrough = true;
	options.extension.autolink = true;
	options.extension.tasklist = true;
	options.render.width = width;
}

fn parse<'a>(arena: &'a Arena<'a>, body: &str, options: &Options) -> &'a AstNode<'a> {
	let root = parse_document(arena, body, options);
	preserve_heading_attributes(arena, root);
	root
}

/// Moves a trailing `{#id .class key=value}` attribute block of every heading
/// into a raw inline node so it is rendered without escaping.
fn preserve_heading_attributes<'a>(arena: &'a Arena<'a>, root: &'a AstNode<'a>) {
	let headings: Vec<&'a AstNode<'a>> = root
		.descendants()
		.filter(|node| matches!(node.data.borrow().value, NodeValue::Heading(_)))
		.collect();

	for heading in headings {
		let mut tail = Vec::new();
		let mut current = heading.last_child();
		while let Some(node) = current {
			if !matches!(node.data.borrow().value, NodeValue::Text(_)) {
				break;
			}
			tail.push(node);
			current = node.previous_sibling();
		}
		tail.reverse();

		let Some((first, rest)) = tail.split_first() else {
			continue;
		};
		let text: String = tail.iter().copied().map(text_content).collect();
		let Some((heading_text, attributes)) = split_heading_attributes(&text) else {
			continue;
		};

		if let NodeValue::Text(value) = &mut first.data.borrow_mut().value {
			*value = heading_text.to_string().into();
		}
		for node in rest {
			node.detach();
		}

		let raw = arena.alloc(NodeValue::HtmlInline(attributes.to_string().into()).into());
		first.insert_after(raw);
	}
}

fn text_content(node: &AstNode<'_>) -> String {
	match &node.data.borrow().value {
		NodeValue::Text(value) => value.to_string(),
		_ => String::new(),
	}
}

/// Splits `Title {#id .class key=value}` into the heading text (with its
/// trailing whitespace) and the attribute block.
pub(crate) fn split_heading_attributes(text: &str) -> Option<(&str, &str)> {
	let trimmed = text.trim_end();
	let open = trimmed.strip_suffix('}').and_then(|inner| inner.rfind('{'))?;
	let (heading_text, attributes) = trimmed.split_at(open);

	if !(heading_text.is_empty() || heading_text.ends_with(char::is_whitespace)) {
		return None;
	}

	let inner = &attributes[1..attributes.len() - 1];
	let tokens = shlex::split(inner)?;
	let valid = !tokens.is_empty()
		&& tokens.iter().all(|token| {
			match token.split_once('=') {
				Some((key, _)) => !key.is_empty(),
				None => (token.starts_with('#') || token.starts_with('.')) && token.len() > 1,
			}
		});

	valid.then_some((heading_text, attributes))
}

fn render<'a>(root: &'a AstNode<'a>, options: &Options) -> MdtidyResult<String> {
	let mut output = String::new();
	format_commonmark(root, options, &mut output)
		.map_err(|e| MdtidyError::Markdown(e.to_string()))?;
	Ok(output)
}

/// Read a markdown file, requiring UTF-8 content.
pub(crate) fn read_markdown(path: &Path) -> MdtidyResult<String> {
	let bytes = std::fs::read(path).map_err(|source| {
		MdtidyError::Open {
			path: path.to_path_buf(),
			source,
		}
		.in_phase(path, FormatPhase::Read)
	})?;
	decode_markdown(path, bytes)
}

pub(crate) fn decode_markdown(path: &Path, bytes: Vec<u8>) -> MdtidyResult<String> {
	String::from_utf8(bytes).map_err(|_| {
		MdtidyError::InvalidUtf8(path.to_path_buf()).in_phase(path, FormatPhase::Read)
	})
}
