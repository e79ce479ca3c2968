use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// The stage of the formatting pipeline in which a file failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatPhase {
	/// Reading the file from disk.
	Read,
	/// Running the front matter transformer.
	FrontMatter,
	/// Running the back matter transformer.
	BackMatter,
	/// Parsing, transforming and rendering the body.
	FirstPass,
	/// Re-rendering the first pass output without transformers.
	SecondPass,
	/// Writing the result back or comparing it with the original.
	Write,
}

impl fmt::Display for FormatPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let phase = match self {
			Self::Read => "read",
			Self::FrontMatter => "front matter transformation",
			Self::BackMatter => "back matter transformation",
			Self::FirstPass => "first formatting phase",
			Self::SecondPass => "second formatting phase",
			Self::Write => "write",
		};
		f.write_str(phase)
	}
}

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum MdtidyError {
	#[error(transparent)]
	#[diagnostic(code(mdtidy::io_error))]
	Io(#[from] std::io::Error),

	#[error("failed to open `{path}`")]
	#[diagnostic(code(mdtidy::open))]
	Open {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("`{0}` is not valid UTF-8")]
	#[diagnostic(
		code(mdtidy::invalid_utf8),
		help("mdtidy only formats UTF-8 encoded markdown files")
	)]
	InvalidUtf8(PathBuf),

	#[error("{phase} for {path}")]
	#[diagnostic(code(mdtidy::format))]
	Format {
		path: PathBuf,
		phase: FormatPhase,
		#[source]
		source: Box<MdtidyError>,
	},

	#[error("failure to render markdown: {0}")]
	#[diagnostic(code(mdtidy::markdown))]
	Markdown(String),

	#[error("failed to serialize front matter: {0}")]
	#[diagnostic(code(mdtidy::front_matter))]
	FrontMatter(String),

	#[error("code block `{info}` at lines {lines}")]
	#[diagnostic(code(mdtidy::code_block))]
	CodeBlock {
		info: String,
		lines: String,
		#[source]
		source: Box<MdtidyError>,
	},

	#[error("parsing info string `{0}`")]
	#[diagnostic(
		code(mdtidy::info_string),
		help("check that every quote in the info string is closed")
	)]
	InfoStringParse(String),

	#[error("missing language info in fenced code block, got info string `{0}`")]
	#[diagnostic(
		code(mdtidy::missing_language),
		help("start the info string with a language, e.g. ```text execute-command=\"...\"")
	)]
	MissingLanguage(String),

	#[error("got `{key}` without a value in info string `{info}`")]
	#[diagnostic(
		code(mdtidy::missing_directive_value),
		help("expected format is e.g. ```yaml {key}=\"<value>\"")
	)]
	MissingDirectiveValue { key: String, info: String },

	#[error("got ambiguous directives [{keys}] in info string `{info}`")]
	#[diagnostic(
		code(mdtidy::ambiguous_directives),
		help(
			"use either `execute-command` (optionally with `expect-exit-code`) or \
			 `generate-from-type`, not both"
		)
	)]
	AmbiguousDirectives { keys: String, info: String },

	#[error("`expect-exit-code` requires `execute-command` in info string `{0}`")]
	#[diagnostic(code(mdtidy::missing_primary_directive))]
	MissingPrimaryDirective(String),

	#[error("invalid expected exit code `{0}`")]
	#[diagnostic(
		code(mdtidy::invalid_exit_code),
		help("`expect-exit-code` must be an integer")
	)]
	InvalidExitCode(String),

	#[error("parsing command `{0}`")]
	#[diagnostic(code(mdtidy::command_parse))]
	CommandParse(String),

	#[error("failed to run `{command}`")]
	#[diagnostic(code(mdtidy::command_spawn))]
	CommandSpawn {
		command: String,
		#[source]
		source: std::io::Error,
	},

	#[error("run `{command}` exited with {}, out: {output}", exit_code_display(*.code))]
	#[diagnostic(
		code(mdtidy::command_failed),
		help("set `expect-exit-code` if a non-zero exit code is intended")
	)]
	CommandFailed {
		command: String,
		code: Option<i32>,
		output: String,
	},

	#[error("`{0}` was cancelled")]
	#[diagnostic(code(mdtidy::cancelled))]
	Cancelled(String),

	#[error("invalid type location `{0}`")]
	#[diagnostic(
		code(mdtidy::type_location),
		help("expected `<file or crate[@version][/dir]>:<TypeName>`")
	)]
	InvalidTypeLocation(String),

	#[error("read file for sample generation `{path}`")]
	#[diagnostic(code(mdtidy::type_source))]
	TypeSource {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to fetch dependency `{dependency}`: {reason}")]
	#[diagnostic(code(mdtidy::dependency_fetch))]
	DependencyFetch { dependency: String, reason: String },

	#[error("type `{name}` not found in `{location}`")]
	#[diagnostic(code(mdtidy::type_not_found))]
	TypeNotFound { name: String, location: String },

	#[error("cannot generate a sample for `{name}`: {reason}")]
	#[diagnostic(code(mdtidy::unsupported_type))]
	UnsupportedType { name: String, reason: String },

	#[error("failed to parse rust source `{location}`: {reason}")]
	#[diagnostic(code(mdtidy::rust_syntax))]
	RustSyntax { location: String, reason: String },

	#[error("sample for `{0}` is missing from the generated program output")]
	#[diagnostic(
		code(mdtidy::sample_missing),
		help("only non-generic structs can be used to generate samples")
	)]
	SampleSectionMissing(String),

	#[error("generate sample for `{directive}`")]
	#[diagnostic(code(mdtidy::generate_sample))]
	GenerateSample {
		directive: String,
		#[source]
		source: Box<MdtidyError>,
	},

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(mdtidy::config_parse),
		help("check that mdtidy.toml is valid TOML")
	)]
	ConfigParse(String),

	#[error("symlink cycle detected at: `{path}`")]
	#[diagnostic(
		code(mdtidy::symlink_cycle),
		help("remove the circular symlink or exclude this path")
	)]
	SymlinkCycle { path: String },

	#[error("formatting task failed: {0}")]
	#[diagnostic(code(mdtidy::task))]
	Task(String),

	#[error("{0}")]
	#[diagnostic(code(mdtidy::transformer))]
	Transformer(String),
}

fn exit_code_display(code: Option<i32>) -> String {
	code.map_or_else(|| "signal".to_string(), |code| format!("exit code {code}"))
}

impl MdtidyError {
	/// Wrap this error with the file and pipeline phase it occurred in.
	pub fn in_phase(self, path: impl Into<PathBuf>, phase: FormatPhase) -> Self {
		Self::Format {
			path: path.into(),
			phase,
			source: Box::new(self),
		}
	}
}

/// Every file failure of a batch run, sorted by path.
#[derive(Debug, Diagnostic, Error)]
#[error("{} file(s) failed to format", .errors.len())]
#[diagnostic(code(mdtidy::batch))]
pub struct BatchError {
	#[related]
	pub errors: Vec<MdtidyError>,
}

impl BatchError {
	/// Returns `Err` when any error was collected.
	pub fn from_errors(errors: Vec<MdtidyError>) -> Result<(), Self> {
		if errors.is_empty() {
			Ok(())
		} else {
			Err(Self { errors })
		}
	}
}

pub type MdtidyResult<T> = Result<T, MdtidyError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
