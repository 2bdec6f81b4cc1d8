use std::sync::Arc;

use crate::convert::ConvertedValue;
use crate::definition::OptionDefinition;
use crate::error::OptionsParsingError;
use crate::model::OptionPriority;

/// Where one occurrence of an option came from.
#[derive(Debug, Clone)]
pub struct OptionOrigin {
    priority: OptionPriority,
    source: Option<String>,
    implicit_dependent: Option<Arc<OptionDefinition>>,
    expanded_from: Option<Arc<OptionDefinition>>,
}

impl OptionOrigin {
    pub(crate) fn new(
        priority: OptionPriority,
        source: Option<String>,
        implicit_dependent: Option<Arc<OptionDefinition>>,
        expanded_from: Option<Arc<OptionDefinition>>,
    ) -> Self {
        Self {
            priority,
            source,
            implicit_dependent,
            expanded_from,
        }
    }

    pub fn priority(&self) -> OptionPriority {
        self.priority
    }

    /// Human-readable provenance, as produced by the source function the
    /// occurrence was parsed under.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// The option whose implicit requirements set this occurrence, if any.
    pub fn implicit_dependent(&self) -> Option<&Arc<OptionDefinition>> {
        self.implicit_dependent.as_ref()
    }

    /// The expansion option this occurrence was expanded from, if any.
    pub fn expanded_from(&self) -> Option<&Arc<OptionDefinition>> {
        self.expanded_from.as_ref()
    }
}

/// One successfully recognized occurrence of an option.
///
/// The value is unconverted, still the string as it was read from the input,
/// or partially altered where the occurrence used a non `--flag=value`
/// spelling; e.g. `--nofoo` becomes `--foo=0`.
#[derive(Debug, Clone)]
pub struct ParsedOption {
    definition: Arc<OptionDefinition>,
    command_line_form: String,
    unconverted_value: Option<String>,
    origin: OptionOrigin,
}

impl ParsedOption {
    pub(crate) fn new(
        definition: Arc<OptionDefinition>,
        command_line_form: String,
        unconverted_value: Option<String>,
        origin: OptionOrigin,
    ) -> Self {
        Self {
            definition,
            command_line_form,
            unconverted_value,
            origin,
        }
    }

    pub fn definition(&self) -> &Arc<OptionDefinition> {
        &self.definition
    }

    /// The occurrence verbatim, as reconstructed (e.g. `--foo=bar`, `-f bar`).
    pub fn command_line_form(&self) -> &str {
        &self.command_line_form
    }

    pub fn unconverted_value(&self) -> Option<&str> {
        self.unconverted_value.as_deref()
    }

    pub fn origin(&self) -> &OptionOrigin {
        &self.origin
    }

    /// An occurrence is explicit precisely when it has neither an implicit
    /// dependent nor an expanded-from provenance.
    pub fn is_explicit(&self) -> bool {
        self.origin.implicit_dependent.is_none() && self.origin.expanded_from.is_none()
    }

    /// The normalized `--name=value` form used for canonical output.
    pub fn canonical_form(&self) -> String {
        format!(
            "--{}={}",
            self.definition.long_name(),
            self.unconverted_value.as_deref().unwrap_or_default()
        )
    }

    /// Round-trip the unconverted value through the definition's converter.
    /// Options without a converter (nullary, expansion, wrapper) convert to
    /// nothing.
    pub(crate) fn convert(&self) -> Result<Option<ConvertedValue>, OptionsParsingError> {
        match (self.definition.converter(), &self.unconverted_value) {
            (Some(converter), Some(value)) => converter
                .convert(value)
                .map(Some)
                .map_err(|source| OptionsParsingError::InvalidValue {
                    token: self.command_line_form.clone(),
                    source,
                }),
            _ => Ok(None),
        }
    }
}

/// The accumulated value of one option across every occurrence seen so far.
///
/// `Default` is only ever synthesized for effective-value queries; the store
/// never holds one. The other variants are chosen on first occurrence from
/// the definition and mutated exclusively by [`add_option_instance`]
/// (OptionValueDescription::add_option_instance).
#[derive(Debug, Clone)]
pub enum OptionValueDescription {
    /// The option was never set; its effective value is the declared default.
    Default { definition: Arc<OptionDefinition> },
    /// A single-valued option: the last occurrence wins.
    Singleton { instance: ParsedOption },
    /// An `allows_multiple` option: occurrences accumulate in parse order.
    Accumulating { instances: Vec<ParsedOption> },
    /// An expansion option was triggered; only its expansion carries values.
    Expansion { instance: ParsedOption },
}

impl OptionValueDescription {
    pub(crate) fn of_first(parsed: ParsedOption) -> Self {
        let definition = Arc::clone(parsed.definition());

        if definition.is_expansion() {
            OptionValueDescription::Expansion { instance: parsed }
        } else if definition.allows_multiple() {
            OptionValueDescription::Accumulating {
                instances: vec![parsed],
            }
        } else {
            OptionValueDescription::Singleton { instance: parsed }
        }
    }

    /// Fold one further occurrence into this description. The caller has
    /// already enforced priority ordering by invoking in priority order, so a
    /// singleton overwrites unconditionally.
    pub(crate) fn add_option_instance(&mut self, parsed: ParsedOption, warnings: &mut Vec<String>) {
        match self {
            OptionValueDescription::Default { .. } => {
                unreachable!("internal error - the store must not hold a default description")
            }
            OptionValueDescription::Singleton { instance } => {
                if let Some(expanded_from) = parsed.origin().expanded_from() {
                    if instance.is_explicit() {
                        warnings.push(format!(
                            "Option '{}' was expanded from option '--{}' and overrides a previous \
                             explicitly specified value",
                            parsed.definition().long_name(),
                            expanded_from.long_name(),
                        ));
                    }
                }
                *instance = parsed;
            }
            OptionValueDescription::Accumulating { instances } => {
                instances.push(parsed);
            }
            OptionValueDescription::Expansion { instance } => {
                *instance = parsed;
            }
        }
    }

    pub fn definition(&self) -> &Arc<OptionDefinition> {
        match self {
            OptionValueDescription::Default { definition } => definition,
            OptionValueDescription::Singleton { instance } => instance.definition(),
            OptionValueDescription::Accumulating { instances } => instances
                .first()
                .expect("internal error - an accumulating description cannot be empty")
                .definition(),
            OptionValueDescription::Expansion { instance } => instance.definition(),
        }
    }

    /// The occurrences backing this description, in parse order. Empty for a
    /// synthesized default.
    pub fn instances(&self) -> &[ParsedOption] {
        match self {
            OptionValueDescription::Default { .. } => &[],
            OptionValueDescription::Singleton { instance } => std::slice::from_ref(instance),
            OptionValueDescription::Accumulating { instances } => instances,
            OptionValueDescription::Expansion { instance } => std::slice::from_ref(instance),
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, OptionValueDescription::Default { .. })
    }

    /// The effective converted value(s): each backing occurrence, or the
    /// declared default for a never-set option, pushed through the converter.
    ///
    /// This surfaces type errors uniformly, including invalid defaults, which
    /// is how the engine validates state at the end of every parse call.
    pub fn get_value(&self) -> Result<Vec<ConvertedValue>, OptionsParsingError> {
        match self {
            OptionValueDescription::Default { definition } => {
                match (definition.converter(), definition.default_value()) {
                    (Some(converter), Some(default)) => converter
                        .convert(default)
                        .map(|value| vec![value])
                        .map_err(|source| OptionsParsingError::InvalidValue {
                            token: format!("--{}={}", definition.long_name(), default),
                            source,
                        }),
                    _ => Ok(Vec::default()),
                }
            }
            OptionValueDescription::Singleton { instance } => {
                Ok(instance.convert()?.into_iter().collect())
            }
            OptionValueDescription::Accumulating { instances } => {
                let mut values = Vec::with_capacity(instances.len());
                for instance in instances {
                    if let Some(value) = instance.convert()? {
                        values.push(value);
                    }
                }
                Ok(values)
            }
            OptionValueDescription::Expansion { .. } => Ok(Vec::default()),
        }
    }
}

/// Insertion-ordered multimap backing the canonical view.
///
/// Multiple entries per key only occur for `allows_multiple` definitions;
/// replacing a singleton removes its existing entries and appends at the
/// tail.
#[derive(Debug, Clone, Default)]
pub(crate) struct CanonicalValues {
    entries: Vec<(String, ParsedOption)>,
}

impl CanonicalValues {
    pub(crate) fn append(&mut self, parsed: ParsedOption) {
        let name = parsed.definition().long_name().to_string();
        self.entries.push((name, parsed));
    }

    pub(crate) fn replace_all(&mut self, parsed: ParsedOption) {
        let name = parsed.definition().long_name().to_string();
        self.entries.retain(|(entry_name, _)| entry_name != &name);
        self.entries.push((name, parsed));
    }

    pub(crate) fn remove_all(&mut self, name: &str) {
        self.entries.retain(|(entry_name, _)| entry_name != name);
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &ParsedOption> {
        self.entries.iter().map(|(_, parsed)| parsed)
    }
}
