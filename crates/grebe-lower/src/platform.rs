//! Target platforms: an optimization pipeline plus a buffer assigner.

use grebe_buffer::{assign_buffers, AssignError, BufferAssignment};
use grebe_hlo::HloModule;
use grebe_opt::{OptLevel, PassManager};

/// A lowering target.
///
/// A platform contributes the two pieces that vary per target: which passes
/// to run before assignment, and how buffers are assigned. The lowering
/// itself is platform-independent.
pub trait Platform {
    /// Stable name used to select the platform.
    fn name(&self) -> &str;

    /// The pass pipeline run when optimization is requested.
    fn pipeline(&self) -> PassManager;

    /// Produces the buffer assignment the lowering consumes.
    fn assign(&self, module: &HloModule) -> Result<BufferAssignment, AssignError>;
}

/// The built-in platform: the default pipeline and the reference assigner.
#[derive(Debug, Default)]
pub struct GenericPlatform;

impl Platform for GenericPlatform {
    fn name(&self) -> &str {
        "generic"
    }

    fn pipeline(&self) -> PassManager {
        PassManager::for_level(OptLevel::O1)
    }

    fn assign(&self, module: &HloModule) -> Result<BufferAssignment, AssignError> {
        assign_buffers(module)
    }
}

/// Platforms known to the translation entry points, found by name.
#[derive(Default)]
pub struct PlatformRegistry {
    platforms: Vec<Box<dyn Platform>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in platforms.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GenericPlatform));
        registry
    }

    pub fn register(&mut self, platform: Box<dyn Platform>) {
        log::debug!("registered platform '{}'", platform.name());
        self.platforms.push(platform);
    }

    pub fn find(&self, name: &str) -> Option<&dyn Platform> {
        self.platforms
            .iter()
            .map(Box::as_ref)
            .find(|platform| platform.name() == name)
    }

    /// The registered platform names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.platforms.iter().map(|p| p.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_finds_generic() {
        let registry = PlatformRegistry::with_builtins();
        assert!(registry.find("generic").is_some());
        assert!(registry.find("nonesuch").is_none());
        assert_eq!(registry.names(), vec!["generic"]);
    }

    #[test]
    fn custom_platform_registration() {
        #[derive(Debug)]
        struct Quiet;
        impl Platform for Quiet {
            fn name(&self) -> &str {
                "quiet"
            }
            fn pipeline(&self) -> PassManager {
                PassManager::for_level(OptLevel::O0)
            }
            fn assign(&self, module: &HloModule) -> Result<BufferAssignment, AssignError> {
                assign_buffers(module)
            }
        }

        let mut registry = PlatformRegistry::with_builtins();
        registry.register(Box::new(Quiet));
        assert_eq!(registry.find("quiet").map(|p| p.name()), Some("quiet"));
    }
}
