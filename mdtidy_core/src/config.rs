use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::MdtidyError;
use crate::MdtidyResult;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] =
	["mdtidy.toml", ".mdtidy.toml", ".config/mdtidy.toml"];

/// Default program used to fetch, build and run generated sample programs.
pub const DEFAULT_CARGO: &str = "cargo";

/// The config written by `mdtidy init`.
pub const SAMPLE_CONFIG: &str = r#"[front_matter]
# Drop front matter instead of re-serializing it.
remove = false

[code]
# Run `execute-command` and `generate-from-type` code block directives.
directives = true
# Program used to build samples for `generate-from-type`.
cargo = "cargo"

[render]
# Soft-wrap column for rendered paragraphs, 0 never wraps.
width = 0

[batch]
# Maximum number of files formatted at once, 0 formats every file at once.
max_concurrency = 0

[exclude]
patterns = []
disable_gitignore = false
"#;

/// Configuration loaded from an `mdtidy.toml` file.
///
/// ```toml
/// [front_matter]
/// remove = false
///
/// [code]
/// directives = true
/// cargo = "cargo"
///
/// [render]
/// width = 80
///
/// [batch]
/// max_concurrency = 8
///
/// [exclude]
/// patterns = ["vendor/", "CHANGELOG.md"]
/// disable_gitignore = false
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct MdtidyConfig {
	#[serde(default)]
	pub front_matter: FrontMatterConfig,
	#[serde(default)]
	pub code: CodeConfig,
	#[serde(default)]
	pub render: RenderConfig,
	#[serde(default)]
	pub batch: BatchConfig,
	/// Exclusion configuration using gitignore-style patterns.
	#[serde(default)]
	pub exclude: ExcludeConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct FrontMatterConfig {
	/// When true, front matter is dropped from every formatted file.
	#[serde(default)]
	pub remove: bool,
}

/// Controls the code block directive subsystem.
#[derive(Debug, Deserialize)]
pub struct CodeConfig {
	/// When false, fenced code blocks are never executed or regenerated.
	#[serde(default = "default_true")]
	pub directives: bool,
	/// Program used for `generate-from-type` directives.
	#[serde(default = "default_cargo")]
	pub cargo: String,
}

impl Default for CodeConfig {
	fn default() -> Self {
		Self {
			directives: true,
			cargo: DEFAULT_CARGO.to_string(),
		}
	}
}

#[derive(Debug, Default, Deserialize)]
pub struct RenderConfig {
	/// Column at which paragraphs are soft wrapped. `0` disables wrapping.
	#[serde(default)]
	pub width: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchConfig {
	/// Upper bound on files formatted concurrently. `0` means one task per
	/// file with no bound.
	#[serde(default)]
	pub max_concurrency: usize,
}

/// Configuration for excluding files and directories from discovery.
///
/// Patterns follow gitignore syntax and are applied on top of any `.gitignore`
/// rules (unless `disable_gitignore` is set). Supports negation (`!pattern`),
/// directory markers (trailing `/`), and all standard gitignore wildcards.
#[derive(Debug, Default, Deserialize)]
pub struct ExcludeConfig {
	/// Gitignore-style patterns relative to the project root.
	///
	/// Examples: `"build/"`, `"CHANGELOG.md"`, `"!important.md"`.
	#[serde(default)]
	pub patterns: Vec<String>,
	/// When true, `.gitignore` files are not used for filtering.
	#[serde(default)]
	pub disable_gitignore: bool,
}

fn default_true() -> bool {
	true
}

fn default_cargo() -> String {
	DEFAULT_CARGO.to_string()
}

impl MdtidyConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if no config file exists.
	pub fn load(root: &Path) -> MdtidyResult<Option<MdtidyConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config: MdtidyConfig =
			toml::from_str(&content).map_err(|e| MdtidyError::ConfigParse(e.to_string()))?;

		Ok(Some(config))
	}
}

/// Runtime options derived from the config file and command line flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
	pub remove_front_matter: bool,
	pub directives: bool,
	pub cargo: String,
	pub width: usize,
	pub max_concurrency: usize,
	pub exclude_patterns: Vec<String>,
	pub disable_gitignore: bool,
}

impl Default for FormatOptions {
	fn default() -> Self {
		Self {
			remove_front_matter: false,
			directives: true,
			cargo: DEFAULT_CARGO.to_string(),
			width: 0,
			max_concurrency: 0,
			exclude_patterns: Vec::new(),
			disable_gitignore: false,
		}
	}
}

impl FormatOptions {
	/// Build options from an optional config, falling back to defaults.
	pub fn from_config(config: Option<&MdtidyConfig>) -> Self {
		let Some(config) = config else {
			return Self::default();
		};

		Self {
			remove_front_matter: config.front_matter.remove,
			directives: config.code.directives,
			cargo: config.code.cargo.clone(),
			width: config.render.width,
			max_concurrency: config.batch.max_concurrency,
			exclude_patterns: config.exclude.patterns.clone(),
			disable_gitignore: config.exclude.disable_gitignore,
		}
	}
}
