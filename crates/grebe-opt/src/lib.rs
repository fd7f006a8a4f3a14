//! Graph cleanup passes.
//!
//! Provides a [`Pass`] trait, a [`PassManager`] with fixed-point iteration,
//! and the built-in passes run before buffer assignment (tuple
//! simplification, dead code elimination, constant renaming).

mod dce;
mod sanitize;
mod tuple_simplify;

pub use dce::DeadCodeElimination;
pub use sanitize::SanitizeConstantNames;
pub use tuple_simplify::TupleSimplification;

use std::fmt::Debug;

use grebe_hlo::HloModule;

/// A pass that transforms a scheduled module.
pub trait Pass: Debug {
    /// Human-readable name of the pass.
    fn name(&self) -> &str;

    /// Run the pass on a module. Returns `true` if anything was modified.
    fn run(&self, module: &mut HloModule) -> bool;
}

/// Optimization level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptLevel {
    /// No cleanup.
    O0,
    /// Tuple forwarding and dead code elimination.
    O1,
    /// O1 plus constant-name canonicalization.
    O2,
}

/// Maximum number of fixed-point iterations before giving up.
const MAX_ITERATIONS: usize = 10;

/// Runs passes in sequence with fixed-point iteration.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PassManager {
    /// Creates an empty pass manager with no passes.
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Creates a pass manager with passes appropriate for the given level.
    pub fn for_level(level: OptLevel) -> Self {
        let mut pm = Self::new();
        match level {
            OptLevel::O0 => {}
            OptLevel::O1 => {
                pm.add_pass(Box::new(TupleSimplification));
                pm.add_pass(Box::new(DeadCodeElimination));
            }
            OptLevel::O2 => {
                pm.add_pass(Box::new(TupleSimplification));
                pm.add_pass(Box::new(DeadCodeElimination));
                pm.add_pass(Box::new(SanitizeConstantNames));
            }
        }
        pm
    }

    /// Adds a pass to the pipeline.
    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Runs all passes until a fixed point is reached or the iteration limit.
    pub fn run(&self, module: &mut HloModule) {
        for _ in 0..MAX_ITERATIONS {
            let mut changed = false;
            for pass in &self.passes {
                let pass_changed = pass.run(module);
                if pass_changed {
                    log::debug!("pass '{}' changed module '{}'", pass.name(), module.name);
                }
                changed |= pass_changed;
            }
            if !changed {
                break;
            }
        }
    }
}

/// Convenience function: runs the O1 pipeline on a module.
pub fn optimize(module: &mut HloModule) {
    PassManager::for_level(OptLevel::O1).run(module);
}
