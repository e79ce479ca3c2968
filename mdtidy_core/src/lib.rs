//! `mdtidy_core` is the engine behind the `mdtidy` markdown formatter. It
//! re-renders markdown deterministically, normalizes front matter and keeps
//! code blocks that document commands or configuration types up to date.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Markdown file
//!   → Splitter (front matter map + body)
//!   → Front matter transformer (header) and back matter transformer (appended)
//!   → First pass (parse, link + code block transformers, render CommonMark)
//!   → Second pass (parse and render again without transformers)
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from `mdtidy.toml`.
//! - [`typegen`]: YAML samples generated from rust struct declarations.
//!
//! ## Key Types
//!
//! - [`Formatter`]: The two-pass formatter and its transformers.
//! - [`SourceContext`]: Cancellation token, file path and line range handed
//!   to every transformer.
//! - [`DirectiveCodeBlockTransformer`]: Runs `execute-command` and
//!   `generate-from-type` code block directives.
//! - [`Diffs`]: Unified diffs produced by [`check_files`].
//!
//! ## Code Block Directives
//!
//! ````markdown
//! ```text execute-command="mdtidy --help"
//! ```
//!
//! ```text execute-command="sh -c 'exit 3'" expect-exit-code=3
//! ```
//!
//! ```yaml generate-from-type=src/config.rs:Config
//! ```
//! ````
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mdtidy_core::BatchOptions;
//! use mdtidy_core::DirectiveCodeBlockTransformer;
//! use mdtidy_core::Formatter;
//! use mdtidy_core::check_files;
//!
//! # async fn run() -> Result<(), mdtidy_core::BatchError> {
//! let formatter = Formatter::new()
//! 	.with_code_block_transformer(Arc::new(DirectiveCodeBlockTransformer::new()));
//! let diffs = check_files(&formatter, vec!["readme.md".into()], &BatchOptions::default()).await?;
//! println!("{diffs}");
//! # Ok(())
//! # }
//! ```

pub use batch::*;
pub use code_block::*;
pub use config::*;
pub use directives::*;
pub use discover::*;
pub use error::*;
pub use formatter::*;
pub use front_matter::*;
pub use transformer::*;

mod batch;
mod code_block;
pub mod config;
mod directives;
mod discover;
#[allow(unused_assignments)]
mod error;
pub mod exec;
mod formatter;
mod front_matter;
mod transformer;
pub mod typegen;

#[cfg(test)]
mod __tests;
