use std::collections::HashSet;

/// The trust tier an occurrence of an option was parsed at.
///
/// Priorities segregate the sources feeding a parser, from the least trusted
/// (hard-coded defaults) to the most trusted (a policy override applied after
/// the user's command line). Within a single [parse](crate::OptionsParser::parse)
/// call, a later occurrence overwrites an earlier one; across calls, the caller
/// is expected to parse in ascending priority so that the last-seen value wins.
/// The parser records the priority on every occurrence and sorts its views with
/// a stable sort, but it does not enforce that callers proceed monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptionPriority {
    /// The value the option declaration carries when nothing sets it.
    DefaultValue,
    /// A default computed from other options.
    ComputedDefault,
    /// An rc or configuration file.
    RcFile,
    /// The invoking command line.
    CommandLine,
    /// A policy override applied on top of the command line.
    InvocationPolicy,
}

impl std::fmt::Display for OptionPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The value shape of an option, as far as surface syntax is concerned.
///
/// Conversion of the raw string into the field type is always the converter's
/// job; this tag only decides how many tokens an occurrence consumes and which
/// spellings (`--noNAME`, `-x-`) apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Boolean syntax: `--name`, `--noname`, `-x`, `-x-`, `--name=0`.
    Bool,
    /// Nullary: the option's presence is the whole story.
    Void,
    /// Takes a single value token, converted by the option's converter.
    Typed,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Machine-readable tags attached to an option definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataTag {
    /// The option exists in the registry but must not be recognized from user
    /// supplied input.
    Internal,
    /// Hidden from generated documentation, but otherwise parsed normally.
    Hidden,
    /// Use of the option appends a deprecation warning.
    Deprecated,
    /// The option is not yet stable.
    Experimental,
}

pub(crate) type MetadataTags = HashSet<MetadataTag>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(OptionPriority::DefaultValue < OptionPriority::ComputedDefault);
        assert!(OptionPriority::ComputedDefault < OptionPriority::RcFile);
        assert!(OptionPriority::RcFile < OptionPriority::CommandLine);
        assert!(OptionPriority::CommandLine < OptionPriority::InvocationPolicy);
    }

    #[test]
    fn display() {
        assert_eq!(OptionPriority::CommandLine.to_string(), "CommandLine");
        assert_eq!(ValueType::Bool.to_string(), "Bool");
    }
}
