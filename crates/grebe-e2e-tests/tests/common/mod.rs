use grebe_lir::{Function, Module, OpKind};
use grebe_lower::TranslateError;

/// Parse module text, optionally optimize, assign buffers, and lower.
#[allow(dead_code)]
pub fn lower_text(source: &str, optimize: bool) -> Module {
    grebe_lower::hlo_text_to_lir(source, "generic", optimize).expect("lowering failed")
}

/// Like `lower_text` but returns the error instead of panicking.
#[allow(dead_code)]
pub fn try_lower_text(source: &str) -> Result<Module, TranslateError> {
    grebe_lower::hlo_text_to_lir(source, "generic", false)
}

/// The single function of a lowered module.
#[allow(dead_code)]
pub fn entry(module: &Module) -> &Function {
    module
        .functions
        .iter()
        .next()
        .expect("module has no functions")
        .1
}

/// Top-level operation kinds in execution order.
#[allow(dead_code)]
pub fn op_kinds(f: &Function) -> Vec<&OpKind> {
    f.body.iter().map(|&h| &f.ops[h].kind).collect()
}

/// Operation kinds of a nested region, in execution order.
#[allow(dead_code)]
pub fn region_op_kinds(f: &Function, region: grebe_hlo::Handle<grebe_lir::Region>) -> Vec<&OpKind> {
    f.regions[region].body.iter().map(|&h| &f.ops[h].kind).collect()
}

/// Hex-encodes a backend-config blob for embedding in module text.
#[allow(dead_code)]
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
