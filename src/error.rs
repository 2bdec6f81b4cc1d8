use thiserror::Error;

use crate::convert::ConversionError;

/// A problem with the user-supplied input.
///
/// These are recoverable at the call site: the parser state is left exactly as
/// it was before the offending token, and each variant carries that token for
/// diagnostic surfacing. Schema bugs (malformed expansions, implicit
/// requirements that do not parse, un-constructable schemas) are not errors of
/// this type; they terminate the program.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsParsingError {
    #[error("Unrecognized option: {token}")]
    UnrecognizedOption { token: String },

    #[error("Invalid options syntax: {token}")]
    InvalidSyntax { token: String },

    #[error("Illegal use of 'no' prefix on non-boolean option: {token}")]
    IllegalNoPrefix { token: String },

    #[error("Unexpected value after boolean option: {token}")]
    UnexpectedBooleanValue { token: String },

    #[error("Expected value after {token}")]
    MissingValue { token: String },

    #[error("Invalid --{name} value format. You may have meant --{name}=--{value}")]
    InvalidWrapperValue { name: String, value: String },

    #[error("Unparsed options remain after unwrapping {token}: {residue}")]
    UnwrappedResidue { token: String, residue: String },

    #[error("While parsing option {token}: {source}")]
    InvalidValue {
        token: String,
        #[source]
        source: ConversionError,
    },

    #[error("Failed to pre-process arguments: {0}")]
    PreProcessor(String),
}

impl OptionsParsingError {
    /// The offending token, where the failure is pinned to one.
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::UnrecognizedOption { token }
            | Self::InvalidSyntax { token }
            | Self::IllegalNoPrefix { token }
            | Self::UnexpectedBooleanValue { token }
            | Self::MissingValue { token }
            | Self::UnwrappedResidue { token, .. }
            | Self::InvalidValue { token, .. } => Some(token),
            Self::InvalidWrapperValue { .. } | Self::PreProcessor(_) => None,
        }
    }
}
