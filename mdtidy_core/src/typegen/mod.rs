//! Sample generation for `generate-from-type` code blocks.
//!
//! The struct declaration is located, a standalone program serializing a
//! default instance of it is synthesized, and that program is built and run
//! with cargo. The YAML it prints for the requested type becomes the code
//! block content.

pub use locate::DependencyCoordinate;
pub use locate::TypeSource;
pub use locate::declares_struct;
pub use locate::locate_source;
pub use run::extract_sample;
pub use run::run_program;
pub use synth::SUPPORT_SOURCE;
pub use synth::synthesize;

use tokio_util::sync::CancellationToken;

use crate::MdtidyResult;
use crate::TypeLocation;

mod locate;
mod run;
mod synth;

/// Generate the YAML sample for the struct at `location`.
pub fn generate_sample(
	cancel: &CancellationToken,
	cargo: &str,
	location: &TypeLocation,
) -> MdtidyResult<String> {
	let source = locate_source(cancel, cargo, location)?;
	let origin = source.origin.display().to_string();
	let program = synthesize(&source.source, &origin, &location.type_name)?;

	tracing::debug!(%location, origin, "running sample program");

	let output = run_program(cancel, cargo, &program, &location.type_name)?;
	extract_sample(&output, &location.type_name)
}
