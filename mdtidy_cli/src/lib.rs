use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Format markdown deterministically and keep generated code blocks in sync.",
	long_about = "mdtidy re-renders markdown files into a canonical CommonMark form, normalizes \
	              their front matter and refreshes code blocks that carry directives.\n\nCode \
	              block directives:\n  execute-command=\"<cmd>\"        Replace the block with \
	              the command output\n  expect-exit-code=<n>            Accept a non-zero exit \
	              code\n  generate-from-type=<loc>:<Type>  Replace the block with a YAML sample \
	              of a struct\n\nQuick start:\n  mdtidy init          Create an mdtidy.toml\n  \
	              mdtidy fmt           Format every markdown file in place\n  mdtidy fmt --check   \
	              Print diffs and fail when files are not formatted"
)]
pub struct MdtidyCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Create an `mdtidy.toml` with the default settings.
	///
	/// Fails when a config file already exists in the project root.
	Init,
	/// Format markdown files.
	///
	/// Without paths every markdown file under the project root is formatted,
	/// skipping hidden directories, `target`, `node_modules` and anything
	/// matched by `.gitignore` or the configured exclude patterns. Directory
	/// arguments are searched the same way and file arguments are always
	/// formatted.
	Fmt {
		/// Files or directories to format, relative to the project root.
		paths: Vec<PathBuf>,

		/// Do not write anything. Print a unified diff for every file that
		/// would change and exit with status 1 when there is at least one.
		#[arg(long, default_value_t = false)]
		check: bool,

		/// Drop front matter instead of re-serializing it.
		#[arg(long, default_value_t = false)]
		remove_front_matter: bool,

		/// Leave `execute-command` and `generate-from-type` code blocks
		/// untouched.
		#[arg(long, default_value_t = false)]
		no_directives: bool,

		/// Maximum number of files formatted at once. `0` formats every file
		/// at once.
		#[arg(long)]
		max_concurrency: Option<usize>,

		/// Soft-wrap paragraphs at this column. `0` never wraps.
		#[arg(long)]
		width: Option<usize>,
	},
	/// Print the YAML sample `generate-from-type` would produce.
	///
	/// The location is either a rust file or a crate coordinate
	/// (`name[@version][/sub/dir]`), followed by `:` and the struct name.
	Gen {
		/// Type location such as `src/config.rs:Config` or
		/// `serde_json@1.0.120/src:Map`.
		location: String,
	},
}
