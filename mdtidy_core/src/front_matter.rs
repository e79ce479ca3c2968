use std::collections::BTreeMap;

use markdown::ParseOptions;
use markdown::mdast::Node;
use markdown::to_mdast;
use serde_yaml_ng::Mapping;
use serde_yaml_ng::Value;

use crate::MdtidyError;
use crate::MdtidyResult;

/// Front matter metadata keyed by field name.
pub type FrontMatter = BTreeMap<String, Value>;

/// A document split into its front matter and body.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitDocument<'a> {
	/// Parsed front matter, empty when the document has none.
	pub front_matter: FrontMatter,
	/// The text following the front matter block.
	pub body: &'a str,
	/// Number of lines of the original input preceding `body`.
	pub line_offset: usize,
}

/// Split `input` into front matter and body.
///
/// Both `---` delimited YAML and `+++` delimited TOML blocks at the very
/// start of the document are recognized. A block that is missing, fails to
/// parse or holds no keys leaves the whole input as the body. This never
/// fails.
pub fn split_front_matter(input: &str) -> SplitDocument<'_> {
	let whole = SplitDocument {
		front_matter: FrontMatter::new(),
		body: input,
		line_offset: 0,
	};

	let Some((raw, end_offset)) = find_front_matter_block(input) else {
		return whole;
	};

	let front_matter = match raw {
		RawFrontMatter::Yaml(value) => parse_yaml(&value),
		RawFrontMatter::Toml(value) => parse_toml(&value),
	};

	let front_matter = match front_matter {
		Ok(front_matter) if !front_matter.is_empty() => front_matter,
		Ok(_) => return whole,
		Err(reason) => {
			tracing::warn!(%reason, "ignoring front matter that failed to parse");
			return whole;
		}
	};

	let rest = &input[end_offset..];
	let rest = rest
		.strip_prefix("\r\n")
		.or_else(|| rest.strip_prefix('\n'))
		.unwrap_or(rest);
	let body_start = input.len() - rest.len();
	let line_offset = input[..body_start].matches('\n').count();

	SplitDocument {
		front_matter,
		body: rest,
		line_offset,
	}
}

enum RawFrontMatter {
	Yaml(String),
	Toml(String),
}

fn find_front_matter_block(input: &str) -> Option<(RawFrontMatter, usize)> {
	let mut options = ParseOptions::default();
	options.constructs.frontmatter = true;

	let root = to_mdast(input, &options).ok()?;
	let first = root.children()?.first()?;

	match first {
		Node::Yaml(yaml) => {
			let end = yaml.position.as_ref()?.end.offset;
			Some((RawFrontMatter::Yaml(yaml.value.clone()), end))
		}
		Node::Toml(toml) => {
			let end = toml.position.as_ref()?.end.offset;
			Some((RawFrontMatter::Toml(toml.value.clone()), end))
		}
		_ => None,
	}
}

fn parse_yaml(value: &str) -> Result<FrontMatter, String> {
	if value.trim().is_empty() {
		return Ok(FrontMatter::new());
	}

	serde_yaml_ng::from_str(value).map_err(|e| e.to_string())
}

fn parse_toml(value: &str) -> Result<FrontMatter, String> {
	let table: toml::Table = toml::from_str(value).map_err(|e| e.to_string())?;

	Ok(table
		.into_iter()
		.map(|(key, value)| (key, toml_to_yaml(value)))
		.collect())
}

fn toml_to_yaml(value: toml::Value) -> Value {
	match value {
		toml::Value::String(s) => Value::String(s),
		toml::Value::Integer(i) => Value::Number(i.into()),
		toml::Value::Float(f) => Value::Number(f.into()),
		toml::Value::Boolean(b) => Value::Bool(b),
		toml::Value::Datetime(dt) => Value::String(dt.to_string()),
		toml::Value::Array(arr) => Value::Sequence(arr.into_iter().map(toml_to_yaml).collect()),
		toml::Value::Table(table) => {
			let mut mapping = Mapping::new();
			for (k, v) in table {
				mapping.insert(Value::String(k), toml_to_yaml(v));
			}
			Value::Mapping(mapping)
		}
	}
}

/// Serialize front matter as a `---` delimited YAML header followed by a
/// blank line.
///
/// Top level keys are written in descending order. Returns `None` for empty
/// front matter.
pub fn format_front_matter(front_matter: &FrontMatter) -> MdtidyResult<Option<String>> {
	if front_matter.is_empty() {
		return Ok(None);
	}

	let mut mapping = Mapping::new();
	for (key, value) in front_matter.iter().rev() {
		mapping.insert(Value::String(key.clone()), value.clone());
	}

	let yaml =
		serde_yaml_ng::to_string(&mapping).map_err(|e| MdtidyError::FrontMatter(e.to_string()))?;

	Ok(Some(format!("---\n{yaml}---\n\n")))
}
