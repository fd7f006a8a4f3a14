//! Whole-pipeline entry points: text or module in, lowered module out.

use grebe_hlo::HloModule;
use grebe_lir::Module;

use crate::platform::PlatformRegistry;
use crate::{lower_module, LowerError};

/// Errors of the combined parse, optimize, assign, and lower pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    /// The requested platform is not registered.
    #[error("unknown platform '{name}' (available: {available})")]
    UnknownPlatform { name: String, available: String },

    #[error(transparent)]
    Parse(#[from] grebe_parser::ParseError),

    #[error(transparent)]
    Assign(#[from] grebe_buffer::AssignError),

    #[error(transparent)]
    Lower(#[from] LowerError),
}

/// Runs the selected platform's pipeline over `module` (when `optimize` is
/// set), assigns buffers, and lowers the result.
pub fn optimize_and_lower(
    module: &mut HloModule,
    platform_name: &str,
    optimize: bool,
) -> Result<Module, TranslateError> {
    let registry = PlatformRegistry::with_builtins();
    let platform =
        registry
            .find(platform_name)
            .ok_or_else(|| TranslateError::UnknownPlatform {
                name: platform_name.to_string(),
                available: registry.names().join(", "),
            })?;
    if optimize {
        platform.pipeline().run(module);
    }
    let assignment = platform.assign(module)?;
    Ok(lower_module(module, &assignment)?)
}

/// Parses module text and runs [`optimize_and_lower`] over it.
pub fn hlo_text_to_lir(
    text: &str,
    platform_name: &str,
    optimize: bool,
) -> Result<Module, TranslateError> {
    let mut module = grebe_parser::parse(text)?;
    optimize_and_lower(&mut module, platform_name, optimize)
}
