use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::constant::{SHORT_PREFIX, TERMINATOR};
use crate::definition::OptionDefinition;
use crate::error::OptionsParsingError;
use crate::model::OptionPriority;
use crate::parser::recognize::TokenRecognizer;
use crate::parser::store::{CanonicalValues, OptionValueDescription, ParsedOption};
use crate::registry::{FieldSetter, OptionRegistry};

/// Maps a definition to a human-readable provenance string for occurrences
/// parsed under it.
pub type SourceFunction<'a> = dyn Fn(&OptionDefinition) -> Option<String> + 'a;

/// Rewrites the raw argument list before each parse invocation. The only
/// collaborator allowed to perform I/O; the default is the identity.
pub type ArgsPreProcessor = Box<dyn Fn(Vec<String>) -> Result<Vec<String>, OptionsParsingError>>;

/// What would happen if an option were parsed: its definition plus the
/// pre-parsed occurrences its implicit requirements would introduce. Produced
/// by [`OptionsParser::get_option_description`] without mutating any state.
#[derive(Debug)]
pub struct OptionDescription {
    definition: Arc<OptionDefinition>,
    implicit_requirements: Vec<ParsedOption>,
}

impl OptionDescription {
    pub fn definition(&self) -> &Arc<OptionDefinition> {
        &self.definition
    }

    pub fn implicit_requirements(&self) -> &[ParsedOption] {
        &self.implicit_requirements
    }
}

/// The options parser: a single-owner mutable state machine fed by repeated
/// [parse](OptionsParser::parse) calls at varying priorities.
///
/// The registry may be shared across parsers concurrently; a parser instance
/// must not be shared across threads without external mutual exclusion.
/// Priority ordering is the caller's obligation: parse the least trusted
/// source first and the engine's last-write-wins rule produces the expected
/// precedence.
pub struct OptionsParser {
    registry: Arc<OptionRegistry>,
    values: HashMap<String, OptionValueDescription>,
    parsed_options: Vec<ParsedOption>,
    canonical_values: CanonicalValues,
    warnings: Vec<String>,
    allow_single_dash_long: bool,
    args_preprocessor: ArgsPreProcessor,
}

impl std::fmt::Debug for OptionsParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionsParser{..}").finish()
    }
}

impl OptionsParser {
    pub fn new(registry: Arc<OptionRegistry>) -> Self {
        Self {
            registry,
            values: HashMap::default(),
            parsed_options: Vec::default(),
            canonical_values: CanonicalValues::default(),
            warnings: Vec::default(),
            allow_single_dash_long: false,
            args_preprocessor: Box::new(|args| Ok(args)),
        }
    }

    pub fn registry(&self) -> &Arc<OptionRegistry> {
        &self.registry
    }

    /// Accept long options with a single dash (`-example`) in addition to the
    /// usual double dash.
    pub fn set_allow_single_dash_long(&mut self, allow_single_dash_long: bool) {
        self.allow_single_dash_long = allow_single_dash_long;
    }

    /// Replace the argument pre-processor. Register-and-replace: the previous
    /// pre-processor is dropped.
    pub fn set_args_preprocessor(&mut self, args_preprocessor: ArgsPreProcessor) {
        self.args_preprocessor = args_preprocessor;
    }

    /// Warnings accumulated across all parse calls, in encounter order.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Parse `args` at the given priority, returning the residual tokens it
    /// does not recognize as options.
    ///
    /// May be called repeatedly; within one call, a later occurrence of a
    /// single-valued option overwrites an earlier one, so callers feeding
    /// multiple sources should parse them in ascending priority. `source` is
    /// recorded as the provenance of every occurrence in this call.
    pub fn parse<I, T>(
        &mut self,
        priority: OptionPriority,
        source: Option<&str>,
        args: I,
    ) -> Result<Vec<String>, OptionsParsingError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let source = source.map(str::to_string);
        let source_function = move |_: &OptionDefinition| source.clone();
        let args = args.into_iter().map(Into::into).collect();
        self.parse_args(priority, &source_function, None, None, args)
    }

    /// As [parse](OptionsParser::parse), with per-definition provenance.
    pub fn parse_with_source_function<I, T>(
        &mut self,
        priority: OptionPriority,
        source_function: &SourceFunction<'_>,
        args: I,
    ) -> Result<Vec<String>, OptionsParsingError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let args = args.into_iter().map(Into::into).collect();
        self.parse_args(priority, source_function, None, None, args)
    }

    fn parse_args(
        &mut self,
        priority: OptionPriority,
        source_function: &SourceFunction<'_>,
        implicit_dependent: Option<Arc<OptionDefinition>>,
        expanded_from: Option<Arc<OptionDefinition>>,
        args: Vec<String>,
    ) -> Result<Vec<String>, OptionsParsingError> {
        let args = (self.args_preprocessor)(args)?;
        debug!(priority = %priority, count = args.len(), "parsing arguments");

        let registry = Arc::clone(&self.registry);
        let recognizer = TokenRecognizer::new(&registry, self.allow_single_dash_long);

        let mut leftovers: Vec<String> = Vec::default();
        let mut implicit_requirements: Vec<(Arc<OptionDefinition>, Vec<String>)> = Vec::default();
        let mut args_iter = args.into_iter();

        while let Some(arg) = args_iter.next() {
            if !arg.starts_with(SHORT_PREFIX) {
                // Not an option.
                leftovers.push(arg);
                continue;
            }

            if arg == TERMINATOR {
                // All remaining tokens are residue.
                leftovers.extend(args_iter.by_ref());
                break;
            }

            let parsed = recognizer.recognize(
                &arg,
                &mut args_iter,
                priority,
                source_function,
                implicit_dependent.as_ref(),
                expanded_from.as_ref(),
            )?;
            let definition = Arc::clone(parsed.definition());

            // Any option can be deprecated; warn before the shape-specific
            // work.
            self.maybe_add_deprecation_warning(&definition);

            self.add_option_instance(parsed.clone());

            if definition.is_wrapper() {
                self.unwrap_wrapper(&arg, &definition, &parsed, priority)?;
                // Only the wrapped option shows up in the explicit and
                // canonical views, and neither expansion nor implicit
                // requirements apply to the wrapper itself.
                continue;
            }

            if implicit_dependent.is_none() {
                // Log explicit and expanded occurrences in discovery order,
                // remembering their expansion provenance; canonicalization
                // needs both.
                self.parsed_options.push(parsed.clone());

                if definition.allows_multiple() {
                    self.canonical_values.append(parsed.clone());
                } else {
                    self.canonical_values.replace_all(parsed.clone());
                }
            }

            if definition.is_expansion() {
                let expansion =
                    registry.evaluate_expansion(&definition, parsed.unconverted_value());
                let source_message = match source_function(&definition) {
                    Some(source) => format!(
                        "expanded from option --{} from {}",
                        definition.long_name(),
                        source
                    ),
                    None => format!("expanded from option --{}", definition.long_name()),
                };
                debug!(option = definition.long_name(), "expanding option");

                let expansion_source = move |_: &OptionDefinition| Some(source_message.clone());
                let unparsed = self.parse_args(
                    priority,
                    &expansion_source,
                    None,
                    Some(Arc::clone(&definition)),
                    expansion,
                )?;

                if !unparsed.is_empty() {
                    // A fault in the expansion declaration, not in the input
                    // as provided by the user.
                    panic!(
                        "internal error - unparsed options remain after parsing expansion of {}: {}",
                        arg,
                        unparsed.join(" ")
                    );
                }
            }

            if definition.has_implicit_requirements()
                && !implicit_requirements
                    .iter()
                    .any(|(existing, _)| existing.long_name() == definition.long_name())
            {
                implicit_requirements.push((
                    Arc::clone(&definition),
                    definition.implicit_requirements().to_vec(),
                ));
            }
        }

        // Now parse the implicit requirements collected over this call, in
        // the order their dependents were encountered.
        for (definition, tokens) in implicit_requirements {
            let source_message = match source_function(&definition) {
                Some(source) => format!(
                    "implicit requirement of option --{} from {}",
                    definition.long_name(),
                    source
                ),
                None => format!("implicit requirement of option --{}", definition.long_name()),
            };
            debug!(
                option = definition.long_name(),
                "applying implicit requirements"
            );

            let requirement_source = move |_: &OptionDefinition| Some(source_message.clone());
            let unparsed = self.parse_args(
                priority,
                &requirement_source,
                Some(Arc::clone(&definition)),
                None,
                tokens,
            )?;

            if !unparsed.is_empty() {
                // A fault in the implicit requirement declaration.
                panic!(
                    "internal error - unparsed options remain after parsing implicit requirements of --{}: {}",
                    definition.long_name(),
                    unparsed.join(" ")
                );
            }
        }

        // Check that every effective value survives its converter, including
        // the defaults of options that were never set.
        for description in self.as_list_of_effective_options() {
            description.get_value()?;
        }

        Ok(leftovers)
    }

    fn unwrap_wrapper(
        &mut self,
        arg: &str,
        definition: &Arc<OptionDefinition>,
        parsed: &ParsedOption,
        priority: OptionPriority,
    ) -> Result<(), OptionsParsingError> {
        let value = parsed
            .unconverted_value()
            .expect("internal error - a wrapper option always carries a value")
            .to_string();

        if !value.starts_with(SHORT_PREFIX) {
            return Err(OptionsParsingError::InvalidWrapperValue {
                name: definition.long_name().to_string(),
                value,
            });
        }

        debug!(option = definition.long_name(), "unwrapping option");
        let source_message = format!("Unwrapped from wrapper option --{}", definition.long_name());
        let wrapper_source = move |_: &OptionDefinition| Some(source_message.clone());
        let unparsed = self.parse_args(priority, &wrapper_source, None, None, vec![value])?;

        if !unparsed.is_empty() {
            return Err(OptionsParsingError::UnwrappedResidue {
                token: arg.to_string(),
                residue: unparsed.join(" "),
            });
        }

        Ok(())
    }

    fn maybe_add_deprecation_warning(&mut self, definition: &OptionDefinition) {
        if definition.is_deprecated() {
            let warning = match definition.deprecation_warning() {
                Some(warning) if !warning.is_empty() => {
                    format!(
                        "Option '{}' is deprecated: {}",
                        definition.long_name(),
                        warning
                    )
                }
                _ => format!("Option '{}' is deprecated", definition.long_name()),
            };
            self.warnings.push(warning);
        }
    }

    fn add_option_instance(&mut self, parsed: ParsedOption) {
        let name = parsed.definition().long_name().to_string();

        match self.values.get_mut(&name) {
            Some(description) => description.add_option_instance(parsed, &mut self.warnings),
            None => {
                self.values
                    .insert(name, OptionValueDescription::of_first(parsed));
            }
        }
    }

    /// Every occurrence in discovery order, stably sorted by priority.
    pub fn as_complete_list_of_parsed_options(&self) -> Vec<ParsedOption> {
        let mut list = self.parsed_options.clone();
        // The sort must be stable so occurrences on the same priority keep
        // their discovery order.
        list.sort_by_key(|parsed| parsed.origin().priority());
        list
    }

    /// As [as_complete_list_of_parsed_options](OptionsParser::as_complete_list_of_parsed_options),
    /// filtered to explicit occurrences.
    pub fn as_list_of_explicit_options(&self) -> Vec<ParsedOption> {
        let mut list: Vec<ParsedOption> = self
            .parsed_options
            .iter()
            .filter(|parsed| parsed.is_explicit())
            .cloned()
            .collect();
        list.sort_by_key(|parsed| parsed.origin().priority());
        list
    }

    /// The canonical command line: a deterministic, order-stable
    /// `--name=value` encoding of the effective state, insensitive to
    /// expansions and duplicated assignments. Suitable for re-invocation and
    /// cache-key derivation.
    pub fn as_canonicalized_list(&self) -> Vec<String> {
        let mut values: Vec<&ParsedOption> = self.canonical_values.values().collect();
        // Options carrying implicit requirements go to the tail in insertion
        // order; the rest sort lexicographically.
        values.sort_by(|left, right| {
            let left_requires = left.definition().has_implicit_requirements();
            let right_requires = right.definition().has_implicit_requirements();
            match (left_requires, right_requires) {
                (true, true) => std::cmp::Ordering::Equal,
                (true, false) => std::cmp::Ordering::Greater,
                (false, true) => std::cmp::Ordering::Less,
                (false, false) => left
                    .definition()
                    .long_name()
                    .cmp(right.definition().long_name()),
            }
        });

        values
            .into_iter()
            // Only the members of an expansion survive, not the expansion
            // itself.
            .filter(|parsed| !parsed.definition().is_expansion())
            .map(ParsedOption::canonical_form)
            .collect()
    }

    /// One description per registered definition: the accumulated value where
    /// the option was set, or a synthesized default otherwise.
    pub fn as_list_of_effective_options(&self) -> Vec<OptionValueDescription> {
        self.registry
            .all_definitions()
            .map(
                |definition| match self.values.get(definition.long_name()) {
                    Some(description) => description.clone(),
                    None => OptionValueDescription::Default {
                        definition: Arc::clone(definition),
                    },
                },
            )
            .collect()
    }

    /// Whether a value has been recorded for the option, by any means.
    ///
    /// Panics if `name` is not a registered option.
    pub fn contains_explicit(&self, name: &str) -> bool {
        self.require_definition(name);
        self.values.contains_key(name)
    }

    /// The accumulated value description for the option, if it was ever set.
    ///
    /// Panics if `name` is not a registered option.
    pub fn get_option_value_description(&self, name: &str) -> Option<&OptionValueDescription> {
        self.require_definition(name);
        self.values.get(name)
    }

    /// Describe what parsing `name` at the given priority would entail,
    /// pre-parsing its implicit requirements without mutating any state.
    /// `None` when the option is unknown.
    pub fn get_option_description(
        &self,
        name: &str,
        priority: OptionPriority,
        source: &str,
    ) -> Result<Option<OptionDescription>, OptionsParsingError> {
        let definition = match self.registry.get(name) {
            Some(definition) => Arc::clone(definition),
            None => return Ok(None),
        };

        let source_message = format!(
            "implicitly required for option {} (source: {})",
            definition.long_name(),
            source
        );
        let source_function = move |_: &OptionDefinition| Some(source_message.clone());
        let implicit_requirements = self.describe_tokens(
            definition.implicit_requirements().to_vec(),
            priority,
            &source_function,
            Some(&definition),
            None,
        )?;

        Ok(Some(OptionDescription {
            definition,
            implicit_requirements,
        }))
    }

    /// Describe the occurrences the expansion of `name` (for the given value)
    /// would introduce, without mutating any state.
    ///
    /// Panics if `name` is not a registered option.
    pub fn get_expansion_option_value_descriptions(
        &self,
        name: &str,
        value: Option<&str>,
        priority: OptionPriority,
        source: &str,
    ) -> Result<Vec<ParsedOption>, OptionsParsingError> {
        let definition = self.require_definition(name);
        let tokens = self.registry.evaluate_expansion(&definition, value);
        let source_message = format!(
            "expanded from {} (source: {})",
            definition.long_name(),
            source
        );
        let source_function = move |_: &OptionDefinition| Some(source_message.clone());
        self.describe_tokens(tokens, priority, &source_function, None, Some(&definition))
    }

    fn describe_tokens(
        &self,
        tokens: Vec<String>,
        priority: OptionPriority,
        source_function: &SourceFunction<'_>,
        implicit_dependent: Option<&Arc<OptionDefinition>>,
        expanded_from: Option<&Arc<OptionDefinition>>,
    ) -> Result<Vec<ParsedOption>, OptionsParsingError> {
        let recognizer = TokenRecognizer::new(&self.registry, self.allow_single_dash_long);
        let mut parsed = Vec::default();
        let mut tokens_iter = tokens.into_iter();

        while let Some(arg) = tokens_iter.next() {
            parsed.push(recognizer.recognize(
                &arg,
                &mut tokens_iter,
                priority,
                source_function,
                implicit_dependent,
                expanded_from,
            )?);
        }

        Ok(parsed)
    }

    /// Remove the option's accumulated state from the value store and the
    /// canonical view, returning the prior description. Occurrences already
    /// logged in the parsed views are kept.
    ///
    /// Panics if `name` is not a registered option.
    pub fn clear(&mut self, name: &str) -> Option<OptionValueDescription> {
        self.require_definition(name);
        self.canonical_values.remove_all(name);
        self.values.remove(name)
    }

    /// Materialize the schema record `S`: construct it and populate each
    /// field from its effective value, converted, falling back to the
    /// declared default where unset.
    ///
    /// The schema is presumed validated at registration time; failures here
    /// are internal state errors and panic.
    pub fn materialize<S>(&self) -> S
    where
        S: Any,
    {
        let binding = self
            .registry
            .binding(TypeId::of::<S>())
            .unwrap_or_else(|| {
                panic!(
                    "internal error - the schema '{}' is not registered",
                    std::any::type_name::<S>()
                )
            });
        let mut instance = binding.construct();

        for name in binding.members() {
            let definition = self
                .registry
                .get(name)
                .expect("internal error - a schema member must be registered");
            let description = match self.values.get(name) {
                Some(description) => description.clone(),
                None => OptionValueDescription::Default {
                    definition: Arc::clone(definition),
                },
            };

            match binding.setter(name) {
                Some(FieldSetter::Valued(set)) => {
                    let values = description.get_value().unwrap_or_else(|error| {
                        panic!(
                            "internal error - effective value failed to convert during materialization: {}",
                            error
                        )
                    });
                    for value in values {
                        set(instance.as_mut(), value);
                    }
                }
                Some(FieldSetter::Presence(set)) => {
                    if !description.instances().is_empty() {
                        set(instance.as_mut());
                    }
                }
                None => {
                    // Expansion and wrapper options bind no field.
                }
            }
        }

        *instance
            .downcast::<S>()
            .expect("internal error - schema instance type mismatch")
    }

    fn require_definition(&self, name: &str) -> Arc<OptionDefinition> {
        self.registry
            .get(name)
            .map(Arc::clone)
            .unwrap_or_else(|| panic!("internal error - no such option '{}'", name))
    }
}
