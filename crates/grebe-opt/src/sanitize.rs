//! Constant renaming pass.
//!
//! Constant instruction names become global symbols when the assigner turns
//! them into read-only allocations. Source names carry `.` and `-`, which are
//! not symbol characters, so this pass rewrites constant names up front and
//! keeps them unique module-wide.

use std::collections::HashSet;

use grebe_hlo::{sanitize_symbol_name, HloModule, Opcode};

use crate::Pass;

/// Rewrites constant instruction names into legal, unique symbols.
#[derive(Debug)]
pub struct SanitizeConstantNames;

impl Pass for SanitizeConstantNames {
    fn name(&self) -> &str {
        "sanitize-constant-names"
    }

    fn run(&self, module: &mut HloModule) -> bool {
        let mut taken: HashSet<String> = module
            .instructions
            .iter()
            .map(|(_, i)| i.name.clone())
            .collect();
        let targets: Vec<_> = module
            .instructions
            .iter()
            .filter(|(_, i)| matches!(i.opcode, Opcode::Constant { .. }))
            .map(|(h, _)| h)
            .collect();

        let mut changed = false;
        for handle in targets {
            let current = module.instructions[handle].name.clone();
            let sanitized = sanitize_symbol_name(&current);
            if sanitized == current {
                continue;
            }
            taken.remove(&current);
            let unique = uniquify(&sanitized, &taken);
            log::debug!("sanitize: renamed constant '{current}' to '{unique}'");
            taken.insert(unique.clone());
            module.instructions[handle].name = unique;
            changed = true;
        }
        changed
    }
}

fn uniquify(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    let mut n = 1;
    loop {
        let candidate = format!("{base}_{n}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
