use crate::CodeBlockTransformer;
use crate::DEFAULT_CARGO;
use crate::Directive;
use crate::GENERATE_FROM_TYPE;
use crate::MdtidyError;
use crate::MdtidyResult;
use crate::SourceContext;
use crate::exec::execute_command;
use crate::parse_directives;
use crate::typegen::generate_sample;

/// Replaces the content of code blocks carrying `execute-command` or
/// `generate-from-type` directives. Other blocks are left untouched.
#[derive(Debug, Clone)]
pub struct DirectiveCodeBlockTransformer {
	cargo: String,
}

impl Default for DirectiveCodeBlockTransformer {
	fn default() -> Self {
		Self {
			cargo: DEFAULT_CARGO.to_string(),
		}
	}
}

impl DirectiveCodeBlockTransformer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Use `cargo` to build `generate-from-type` samples.
	#[must_use]
	pub fn with_cargo(mut self, cargo: impl Into<String>) -> Self {
		self.cargo = cargo.into();
		self
	}

	fn apply(&self, ctx: &SourceContext, info: &str, code: &str) -> MdtidyResult<String> {
		let Some(directive) = parse_directives(info)? else {
			return Ok(code.to_string());
		};

		match directive {
			Directive::Execute {
				command,
				expected_exit_code,
			} => execute_command(ctx.cancellation_token(), &command, expected_exit_code),
			Directive::GenerateFromType(location) => {
				generate_sample(ctx.cancellation_token(), &self.cargo, &location).map_err(|e| {
					MdtidyError::GenerateSample {
						directive: format!("{GENERATE_FROM_TYPE}={location}"),
						source: Box::new(e),
					}
				})
			}
		}
	}
}

impl CodeBlockTransformer for DirectiveCodeBlockTransformer {
	fn transform_code_block(
		&self,
		ctx: &SourceContext,
		info: &str,
		code: &str,
	) -> MdtidyResult<String> {
		self.apply(ctx, info, code).map_err(|e| {
			MdtidyError::CodeBlock {
				info: info.to_string(),
				lines: ctx.line_numbers().to_string(),
				source: Box::new(e),
			}
		})
	}
}
