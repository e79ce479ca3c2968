use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::MdtidyError;
use crate::MdtidyResult;

/// Replace the block content with the output of a command.
pub const EXECUTE_COMMAND: &str = "execute-command";
/// Exit code of `execute-command` that is not treated as a failure.
pub const EXPECT_EXIT_CODE: &str = "expect-exit-code";
/// Replace the block content with a sample generated from a struct.
pub const GENERATE_FROM_TYPE: &str = "generate-from-type";

const KNOWN_KEYS: [&str; 3] = [EXECUTE_COMMAND, EXPECT_EXIT_CODE, GENERATE_FROM_TYPE];

/// The action requested by a fenced code block's info string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
	/// Run `command` and use its combined stdout and stderr.
	Execute {
		command: String,
		expected_exit_code: Option<i32>,
	},
	/// Generate a YAML sample of a struct's default value.
	GenerateFromType(TypeLocation),
}

/// Where to find a struct declaration: `<location>:<TypeName>`.
///
/// `location` is either a path to a rust source file or a dependency
/// coordinate `crate[@version][/sub/dir]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeLocation {
	pub location: String,
	pub type_name: String,
}

impl FromStr for TypeLocation {
	type Err = MdtidyError;

	fn from_str(value: &str) -> Result<Self, Self::Err> {
		let invalid = || MdtidyError::InvalidTypeLocation(value.to_string());
		let (location, type_name) = value.rsplit_once(':').ok_or_else(invalid)?;

		if location.is_empty() || !is_identifier(type_name) {
			return Err(invalid());
		}

		Ok(Self {
			location: location.to_string(),
			type_name: type_name.to_string(),
		})
	}
}

impl fmt::Display for TypeLocation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.location, self.type_name)
	}
}

fn is_identifier(value: &str) -> bool {
	let mut chars = value.chars();
	chars
		.next()
		.is_some_and(|c| c.is_alphabetic() || c == '_')
		&& chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Parse the directive attributes of a fenced code block's info string.
///
/// The info string is split into shell words. The first word is the language
/// and may not be a `key=value` pair. Unknown keys are ignored, and an info
/// string without any known key yields `None` so the block is left alone.
pub fn parse_directives(info: &str) -> MdtidyResult<Option<Directive>> {
	if info.trim().is_empty() {
		return Ok(None);
	}

	let words =
		shlex::split(info).ok_or_else(|| MdtidyError::InfoStringParse(info.to_string()))?;
	let mut attributes: BTreeMap<&'static str, String> = BTreeMap::new();

	for (index, word) in words.iter().enumerate() {
		let (key, value) = match word.split_once('=') {
			Some((key, value)) => (key, Some(value)),
			None => (word.as_str(), None),
		};

		if index == 0 && value.is_some() {
			return Err(MdtidyError::MissingLanguage(info.to_string()));
		}

		let Some(known) = KNOWN_KEYS.iter().find(|known| **known == key) else {
			continue;
		};

		let Some(value) = value else {
			return Err(MdtidyError::MissingDirectiveValue {
				key: key.to_string(),
				info: info.to_string(),
			});
		};

		attributes.insert(*known, value.to_string());
	}

	if attributes.is_empty() {
		return Ok(None);
	}

	let ambiguous = || MdtidyError::AmbiguousDirectives {
		keys: attributes.keys().copied().collect::<Vec<_>>().join(", "),
		info: info.to_string(),
	};

	if let Some(command) = attributes.get(EXECUTE_COMMAND) {
		if attributes.contains_key(GENERATE_FROM_TYPE) {
			return Err(ambiguous());
		}

		let expected_exit_code = attributes
			.get(EXPECT_EXIT_CODE)
			.map(|code| {
				code.trim()
					.parse::<i32>()
					.map_err(|_| MdtidyError::InvalidExitCode(code.clone()))
			})
			.transpose()?;

		return Ok(Some(Directive::Execute {
			command: command.clone(),
			expected_exit_code,
		}));
	}

	if let Some(location) = attributes.get(GENERATE_FROM_TYPE) {
		if attributes.len() > 1 {
			return Err(ambiguous());
		}

		return Ok(Some(Directive::GenerateFromType(location.parse()?)));
	}

	Err(MdtidyError::MissingPrimaryDirective(info.to_string()))
}
