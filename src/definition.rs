use std::sync::Arc;

use crate::convert::Converter;
use crate::model::{MetadataTag, MetadataTags, ValueType};
use crate::registry::ConfigError;

/// How an expansion option produces the argument tokens it stands for.
///
/// Expansion graphs must be acyclic; the registry is responsible for that and
/// the parse engine does not detect cycles. A cyclic expansion recurses until
/// the stack runs out.
#[derive(Clone)]
pub enum Expansion {
    /// Not an expansion option.
    None,
    /// Expands to a fixed, predeclared token list; any provided value is
    /// ignored.
    Fixed(Vec<String>),
    /// Expands to a token list computed from the (optional) unconverted value.
    Computed(Arc<dyn Fn(Option<&str>) -> Vec<String> + Send + Sync>),
}

impl Expansion {
    /// Convenience constructor for [`Expansion::Fixed`].
    pub fn fixed<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Expansion::Fixed(tokens.into_iter().map(Into::into).collect())
    }

    pub(crate) fn is_none(&self) -> bool {
        matches!(self, Expansion::None)
    }

    pub(crate) fn evaluate(&self, value: Option<&str>) -> Vec<String> {
        match self {
            Expansion::None => Vec::default(),
            Expansion::Fixed(tokens) => tokens.clone(),
            Expansion::Computed(producer) => producer(value),
        }
    }
}

impl std::fmt::Debug for Expansion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expansion::None => write!(f, "None"),
            Expansion::Fixed(tokens) => f.debug_tuple("Fixed").field(tokens).finish(),
            Expansion::Computed(_) => write!(f, "Computed(..)"),
        }
    }
}

/// The immutable description of a single option, derived once from its schema
/// declaration and shared by every parser using the registry.
pub struct OptionDefinition {
    long_name: String,
    abbrev: Option<char>,
    value_type: ValueType,
    default_value: Option<String>,
    allows_multiple: bool,
    expansion: Expansion,
    implicit_requirements: Vec<String>,
    is_wrapper: bool,
    deprecation_warning: Option<String>,
    metadata_tags: MetadataTags,
    help: Option<String>,
    category: Option<String>,
    converter: Option<Arc<dyn Converter>>,
}

impl OptionDefinition {
    /// The unique long name, without any dash prefix.
    pub fn long_name(&self) -> &str {
        &self.long_name
    }

    /// The single-character abbreviation, if one was declared.
    pub fn abbrev(&self) -> Option<char> {
        self.abbrev
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// The declared default, still unconverted. `None` means the option has no
    /// default and an unset field keeps its struct initialization.
    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    /// Whether repeated occurrences accumulate rather than overwrite.
    pub fn allows_multiple(&self) -> bool {
        self.allows_multiple
    }

    pub fn is_expansion(&self) -> bool {
        !self.expansion.is_none()
    }

    pub(crate) fn expansion(&self) -> &Expansion {
        &self.expansion
    }

    pub fn has_implicit_requirements(&self) -> bool {
        !self.implicit_requirements.is_empty()
    }

    /// Argument tokens set as if by an unseen caller whenever this option is.
    pub fn implicit_requirements(&self) -> &[String] {
        &self.implicit_requirements
    }

    /// Whether the option's value is itself a fully-formed argument token,
    /// re-parsed at the same priority.
    pub fn is_wrapper(&self) -> bool {
        self.is_wrapper
    }

    /// Whether the option is hidden from user-supplied input.
    pub fn is_internal(&self) -> bool {
        self.metadata_tags.contains(&MetadataTag::Internal)
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecation_warning
            .as_deref()
            .is_some_and(|warning| !warning.is_empty())
            || self.metadata_tags.contains(&MetadataTag::Deprecated)
    }

    pub fn deprecation_warning(&self) -> Option<&str> {
        self.deprecation_warning.as_deref()
    }

    pub fn metadata_tags(&self) -> &MetadataTags {
        &self.metadata_tags
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub(crate) fn converter(&self) -> Option<&Arc<dyn Converter>> {
        self.converter.as_ref()
    }

    /// Whether `--noNAME` and `-x-` spellings apply.
    pub fn uses_boolean_value_syntax(&self) -> bool {
        self.value_type == ValueType::Bool
    }
}

impl std::fmt::Debug for OptionDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionDefinition")
            .field("long_name", &self.long_name)
            .field("abbrev", &self.abbrev)
            .field("value_type", &self.value_type)
            .field("default_value", &self.default_value)
            .field("allows_multiple", &self.allows_multiple)
            .field("expansion", &self.expansion)
            .field("implicit_requirements", &self.implicit_requirements)
            .field("is_wrapper", &self.is_wrapper)
            .finish()
    }
}

/// Builder for the declarative half of an [`OptionDefinition`].
///
/// The value shape (typed, flag, nullary, expansion, wrapper) is decided by
/// the [SchemaBuilder](crate::SchemaBuilder) method the definition is handed
/// to, which also supplies the converter; everything declared here is shape
/// independent.
#[derive(Debug, Clone)]
pub struct Definition {
    name: String,
    abbrev: Option<char>,
    default_value: Option<String>,
    implicit_requirements: Vec<String>,
    deprecation_warning: Option<String>,
    metadata_tags: MetadataTags,
    help: Option<String>,
    category: Option<String>,
}

impl Definition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            abbrev: None,
            default_value: None,
            implicit_requirements: Vec::default(),
            deprecation_warning: None,
            metadata_tags: MetadataTags::default(),
            help: None,
            category: None,
        }
    }

    /// Declare a single-character abbreviation (`-x` style).
    pub fn abbrev(mut self, abbrev: char) -> Self {
        self.abbrev = Some(abbrev);
        self
    }

    /// Declare the unconverted default value.
    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Declare argument tokens that are implicitly required whenever this
    /// option is set. The implied occurrences are never counted as explicit.
    pub fn requires<I, T>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.implicit_requirements = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a deprecation warning; using the option appends the warning to
    /// the parser's warning list, once per occurrence.
    pub fn deprecated(mut self, warning: impl Into<String>) -> Self {
        self.deprecation_warning = Some(warning.into());
        self
    }

    pub fn tag(mut self, tag: MetadataTag) -> Self {
        self.metadata_tags.insert(tag);
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn build(
        self,
        value_type: ValueType,
        allows_multiple: bool,
        expansion: Expansion,
        is_wrapper: bool,
        converter: Option<Arc<dyn Converter>>,
    ) -> Result<OptionDefinition, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError(
                "Cannot declare an option with an empty name.".to_string(),
            ));
        }

        if self.name.starts_with('-') || self.name.contains('=') {
            return Err(ConfigError(format!(
                "Cannot declare the option '{}': names must not contain '-' prefixes or '='.",
                self.name
            )));
        }

        if is_wrapper && !expansion.is_none() {
            return Err(ConfigError(format!(
                "Cannot declare the option '{}' as both an expansion and a wrapper.",
                self.name
            )));
        }

        Ok(OptionDefinition {
            long_name: self.name,
            abbrev: self.abbrev,
            value_type,
            default_value: self.default_value,
            allows_multiple,
            expansion,
            implicit_requirements: self.implicit_requirements,
            is_wrapper,
            deprecation_warning: self.deprecation_warning,
            metadata_tags: self.metadata_tags,
            help: self.help,
            category: self.category,
            converter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::BooleanConverter;

    #[test]
    fn build() {
        let definition = Definition::new("verbose")
            .abbrev('v')
            .default("0")
            .help("Noisy output.")
            .category("logging")
            .tag(MetadataTag::Experimental)
            .build(
                ValueType::Bool,
                false,
                Expansion::None,
                false,
                Some(Arc::new(BooleanConverter)),
            )
            .unwrap();

        assert_eq!(definition.long_name(), "verbose");
        assert_eq!(definition.abbrev(), Some('v'));
        assert_eq!(definition.value_type(), ValueType::Bool);
        assert_eq!(definition.default_value(), Some("0"));
        assert!(!definition.allows_multiple());
        assert!(!definition.is_expansion());
        assert!(!definition.is_wrapper());
        assert!(!definition.is_internal());
        assert!(!definition.is_deprecated());
        assert!(definition.uses_boolean_value_syntax());
        assert_eq!(definition.help(), Some("Noisy output."));
        assert_eq!(definition.category(), Some("logging"));
        assert!(definition
            .metadata_tags()
            .contains(&MetadataTag::Experimental));
    }

    #[test]
    fn build_empty_name() {
        let result = Definition::new("  ").build(ValueType::Typed, false, Expansion::None, false, None);

        assert_matches!(result, Err(ConfigError(_)));
    }

    #[test]
    fn build_dashed_name() {
        let result =
            Definition::new("--flag").build(ValueType::Typed, false, Expansion::None, false, None);

        assert_matches!(result, Err(ConfigError(_)));
    }

    #[test]
    fn build_expansion_wrapper_conflict() {
        let result = Definition::new("both").build(
            ValueType::Void,
            false,
            Expansion::fixed(["--a=1"]),
            true,
            None,
        );

        assert_matches!(result, Err(ConfigError(_)));
    }

    #[test]
    fn deprecated_marker() {
        let by_warning = Definition::new("old")
            .deprecated("use --new")
            .build(ValueType::Typed, false, Expansion::None, false, None)
            .unwrap();
        let by_tag = Definition::new("older")
            .tag(MetadataTag::Deprecated)
            .build(ValueType::Typed, false, Expansion::None, false, None)
            .unwrap();
        let by_empty_warning = Definition::new("oldest")
            .deprecated("")
            .build(ValueType::Typed, false, Expansion::None, false, None)
            .unwrap();

        assert!(by_warning.is_deprecated());
        assert_eq!(by_warning.deprecation_warning(), Some("use --new"));
        assert!(by_tag.is_deprecated());
        assert_eq!(by_tag.deprecation_warning(), None);
        // An empty warning without the marker tag does not count.
        assert!(!by_empty_warning.is_deprecated());
    }

    #[test]
    fn expansion_evaluate() {
        assert_eq!(Expansion::None.evaluate(None), Vec::<String>::default());
        assert_eq!(
            Expansion::fixed(["--a=1", "--b=2"]).evaluate(Some("ignored")),
            vec!["--a=1".to_string(), "--b=2".to_string()]
        );

        let computed = Expansion::Computed(Arc::new(|value: Option<&str>| match value {
            Some("deep") => vec!["--depth=99".to_string()],
            _ => vec!["--depth=1".to_string()],
        }));
        assert_eq!(computed.evaluate(Some("deep")), vec!["--depth=99".to_string()]);
        assert_eq!(computed.evaluate(None), vec!["--depth=1".to_string()]);
    }
}
