//! Text parser for scheduled modules.
//!
//! Parses the `HloModule ...` text shape produced by
//! [`grebe_hlo::dump_module`] (and written by hand in tests) into an
//! [`grebe_hlo::HloModule`]: a scanner turns the source into tokens with
//! positions, and a recursive-descent parser assembles computations,
//! resolving operand and computation references as it goes. Callees must be
//! defined before the instruction that references them.

mod parse;
mod token;

pub use token::Location;

/// Parses module text into a scheduled module.
///
/// The result is syntactically well formed but not semantically validated;
/// run [`grebe_hlo::HloModule::validate`] before handing it to a consumer
/// that relies on the structural invariants.
pub fn parse(source: &str) -> Result<grebe_hlo::HloModule, ParseError> {
    let tokens = token::scan(source)?;
    parse::Parser::new(tokens).parse_module()
}

/// Scanner and parser errors, each carrying the source position.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("{location}: unexpected character '{ch}'")]
    UnexpectedCharacter { ch: char, location: Location },

    #[error("{location}: unterminated string")]
    UnterminatedString { location: Location },

    #[error("{location}: malformed number '{text}'")]
    InvalidNumber { text: String, location: Location },

    #[error("{location}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        location: Location,
    },

    #[error("{location}: unknown opcode '{name}'")]
    UnknownOpcode { name: String, location: Location },

    #[error("{location}: unknown element type '{name}'")]
    UnknownType { name: String, location: Location },

    #[error("{location}: '{name}' is not defined")]
    UndefinedName { name: String, location: Location },

    #[error("{location}: '{name}' is defined twice")]
    DuplicateName { name: String, location: Location },

    #[error("{location}: unknown attribute '{name}'")]
    UnknownAttribute { name: String, location: Location },

    #[error("{location}: attribute '{name}' {detail}")]
    InvalidAttribute {
        name: String,
        detail: String,
        location: Location,
    },

    #[error("{location}: opcode '{opcode}' requires attribute '{name}'")]
    MissingAttribute {
        opcode: String,
        name: String,
        location: Location,
    },

    #[error("{location}: {detail}")]
    InvalidLiteral { detail: String, location: Location },

    #[error("{location}: literal has {found} elements, the shape wants {expected}")]
    LiteralCount {
        expected: u64,
        found: usize,
        location: Location,
    },

    #[error("computation '{computation}' has no ROOT instruction")]
    MissingRoot { computation: String },

    #[error("{location}: computation '{computation}' marks a second ROOT")]
    DuplicateRoot {
        computation: String,
        location: Location,
    },

    #[error("{location}: a second ENTRY computation")]
    DuplicateEntry { location: Location },

    #[error("computation '{computation}': parameter '{name}' does not match its signature")]
    SignatureMismatch { computation: String, name: String },

    #[error("computation '{computation}' declares result {declared} but its root produces {actual}")]
    ResultMismatch {
        computation: String,
        declared: String,
        actual: String,
    },
}
