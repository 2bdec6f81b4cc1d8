use std::sync::Arc;

use crate::constant::{LONG_PREFIX, NEGATION_PREFIX, SHORT_PREFIX};
use crate::definition::OptionDefinition;
use crate::error::OptionsParsingError;
use crate::model::{OptionPriority, ValueType};
use crate::parser::engine::SourceFunction;
use crate::parser::store::{OptionOrigin, ParsedOption};
use crate::registry::OptionRegistry;

/// Recognizes one surface token (plus, for detached values, the following
/// token) as an occurrence of a registered option.
pub(crate) struct TokenRecognizer<'r> {
    registry: &'r OptionRegistry,
    allow_single_dash_long: bool,
}

impl<'r> TokenRecognizer<'r> {
    pub(crate) fn new(registry: &'r OptionRegistry, allow_single_dash_long: bool) -> Self {
        Self {
            registry,
            allow_single_dash_long,
        }
    }

    /// Recognize `arg`, consuming one further token from `next_args` when the
    /// option takes a detached value. The caller dispatches only tokens that
    /// begin with `-` and has already intercepted the bare `--` terminator.
    pub(crate) fn recognize(
        &self,
        arg: &str,
        next_args: &mut dyn Iterator<Item = String>,
        priority: OptionPriority,
        source_function: &SourceFunction<'_>,
        implicit_dependent: Option<&Arc<OptionDefinition>>,
        expanded_from: Option<&Arc<OptionDefinition>>,
    ) -> Result<ParsedOption, OptionsParsingError> {
        debug_assert!(arg.starts_with(SHORT_PREFIX));

        let mut command_line_form = arg.to_string();
        let mut unconverted_value: Option<String> = None;
        let mut boolean_value = true;
        let mut definition: Option<&Arc<OptionDefinition>> = None;

        if arg.len() == 2 {
            // -x  (may be nullary or unary)
            let abbrev = arg
                .chars()
                .nth(1)
                .expect("internal error - a two byte token has a second character");
            definition = self.registry.get_by_abbrev(abbrev);
        } else if arg.len() == 3 && arg.ends_with('-') {
            // -x-  (boolean, negated)
            let abbrev = arg
                .chars()
                .nth(1)
                .expect("internal error - a three byte token has a second character");
            definition = self.registry.get_by_abbrev(abbrev);
            boolean_value = false;
        } else if self.allow_single_dash_long || arg.starts_with(LONG_PREFIX) {
            // --name, --name=value, or the single-dash spellings thereof.
            let name_starts_at = if arg.starts_with(LONG_PREFIX) {
                LONG_PREFIX.len()
            } else {
                SHORT_PREFIX.len()
            };
            let (name, inline_value) = match arg[name_starts_at..].split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (&arg[name_starts_at..], None),
            };

            if name.trim().is_empty() {
                return Err(OptionsParsingError::InvalidSyntax {
                    token: arg.to_string(),
                });
            }

            unconverted_value = inline_value.map(str::to_string);
            definition = self.registry.get(name);

            // Look for a "no"-prefixed spelling: "no<name>".
            if definition.is_none() && name.starts_with(NEGATION_PREFIX) {
                let negated = &name[NEGATION_PREFIX.len()..];
                definition = self.registry.get(negated);
                boolean_value = false;

                if let Some(found) = definition {
                    if !found.uses_boolean_value_syntax() {
                        return Err(OptionsParsingError::IllegalNoPrefix {
                            token: arg.to_string(),
                        });
                    }

                    if unconverted_value.is_some() {
                        return Err(OptionsParsingError::UnexpectedBooleanValue {
                            token: arg.to_string(),
                        });
                    }

                    // "no<name>" signifies a boolean option with a false value.
                    unconverted_value = Some("0".to_string());
                }
            }
        } else {
            return Err(OptionsParsingError::InvalidSyntax {
                token: arg.to_string(),
            });
        }

        let definition = match definition {
            // Internal options are treated as if they did not exist.
            Some(definition) if !definition.is_internal() => Arc::clone(definition),
            _ => {
                return Err(OptionsParsingError::UnrecognizedOption {
                    token: arg.to_string(),
                })
            }
        };

        if unconverted_value.is_none() {
            if definition.uses_boolean_value_syntax() {
                unconverted_value = Some(if boolean_value { "1" } else { "0" }.to_string());
            } else if definition.value_type() == ValueType::Void && !definition.is_wrapper() {
                // Nullary; the option's presence is the whole occurrence.
            } else if let Some(next) = next_args.next() {
                // "--flag value" form
                command_line_form.push(' ');
                command_line_form.push_str(&next);
                unconverted_value = Some(next);
            } else {
                return Err(OptionsParsingError::MissingValue {
                    token: arg.to_string(),
                });
            }
        }

        let source = source_function(&definition);

        Ok(ParsedOption::new(
            definition,
            command_line_form,
            unconverted_value,
            OptionOrigin::new(
                priority,
                source,
                implicit_dependent.map(Arc::clone),
                expanded_from.map(Arc::clone),
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Definition;
    use crate::model::MetadataTag;
    use crate::registry::RegistryBuilder;
    use rstest::rstest;

    #[derive(Debug, Default)]
    struct Fixture {
        verbose: bool,
        host: String,
        xray: String,
        refreshed: bool,
    }

    fn fixture_registry() -> OptionRegistry {
        let mut builder = OptionRegistry::builder();
        add_fixture_schema(&mut builder);
        builder.build()
    }

    fn add_fixture_schema(builder: &mut RegistryBuilder) {
        let mut schema = builder.schema::<Fixture>().unwrap();
        schema
            .flag(Definition::new("verbose").abbrev('v'), |s, v| s.verbose = v)
            .unwrap()
            .single::<String, _>(Definition::new("host"), |s, v| s.host = v)
            .unwrap()
            .single::<String, _>(Definition::new("xray").abbrev('x'), |s, v| s.xray = v)
            .unwrap()
            .single::<String, _>(
                Definition::new("secret").tag(MetadataTag::Internal),
                |_, _: String| {},
            )
            .unwrap()
            .nullary(Definition::new("refresh"), |s| s.refreshed = true)
            .unwrap();
    }

    fn recognize(
        registry: &OptionRegistry,
        allow_single_dash_long: bool,
        tokens: Vec<&str>,
    ) -> Result<(ParsedOption, Vec<String>), OptionsParsingError> {
        let recognizer = TokenRecognizer::new(registry, allow_single_dash_long);
        let mut iter = tokens
            .iter()
            .skip(1)
            .map(|token| token.to_string())
            .collect::<Vec<String>>()
            .into_iter();
        let source = |_: &OptionDefinition| -> Option<String> { None };

        let parsed = recognizer.recognize(
            tokens[0],
            &mut iter,
            OptionPriority::CommandLine,
            &source,
            None,
            None,
        )?;
        Ok((parsed, iter.collect()))
    }

    #[rstest]
    #[case(vec!["--verbose"], "verbose", Some("1"), "--verbose")]
    #[case(vec!["--noverbose"], "verbose", Some("0"), "--noverbose")]
    #[case(vec!["-v"], "verbose", Some("1"), "-v")]
    #[case(vec!["-v-"], "verbose", Some("0"), "-v-")]
    #[case(vec!["--verbose=0"], "verbose", Some("0"), "--verbose=0")]
    #[case(vec!["--host=a"], "host", Some("a"), "--host=a")]
    #[case(vec!["--host="], "host", Some(""), "--host=")]
    #[case(vec!["--host", "a"], "host", Some("a"), "--host a")]
    #[case(vec!["-x", "val"], "xray", Some("val"), "-x val")]
    #[case(vec!["--refresh"], "refresh", None, "--refresh")]
    fn recognition(
        #[case] tokens: Vec<&str>,
        #[case] expected_name: &str,
        #[case] expected_value: Option<&str>,
        #[case] expected_form: &str,
    ) {
        let registry = fixture_registry();

        let (parsed, _) = recognize(&registry, false, tokens).unwrap();

        assert_eq!(parsed.definition().long_name(), expected_name);
        assert_eq!(parsed.unconverted_value(), expected_value);
        assert_eq!(parsed.command_line_form(), expected_form);
        assert!(parsed.is_explicit());
    }

    #[test]
    fn detached_value_consumes_one_token() {
        let registry = fixture_registry();

        let (parsed, rest) = recognize(&registry, false, vec!["--host", "a", "b"]).unwrap();

        assert_eq!(parsed.unconverted_value(), Some("a"));
        assert_eq!(rest, vec!["b".to_string()]);
    }

    #[test]
    fn nullary_consumes_nothing() {
        let registry = fixture_registry();

        let (parsed, rest) = recognize(&registry, false, vec!["--refresh", "next"]).unwrap();

        assert_eq!(parsed.unconverted_value(), None);
        assert_eq!(rest, vec!["next".to_string()]);
    }

    #[rstest]
    #[case(vec!["--moot"])]
    #[case(vec!["-z"])]
    #[case(vec!["-z-"])]
    #[case(vec!["--"])] // the engine intercepts "--"; here it is a failed abbreviation
    #[case(vec!["--secret=1"])] // internal options do not exist for user input
    fn unrecognized(#[case] tokens: Vec<&str>) {
        let registry = fixture_registry();

        let result = recognize(&registry, false, tokens);

        assert_matches!(result, Err(OptionsParsingError::UnrecognizedOption { .. }));
    }

    #[rstest]
    #[case(vec!["--=value"])]
    #[case(vec!["-host=a"])] // single-dash long form is disabled by default
    fn invalid_syntax(#[case] tokens: Vec<&str>) {
        let registry = fixture_registry();

        let result = recognize(&registry, false, tokens);

        assert_matches!(result, Err(OptionsParsingError::InvalidSyntax { .. }));
    }

    #[test]
    fn single_dash_long_form() {
        let registry = fixture_registry();

        let (parsed, _) = recognize(&registry, true, vec!["-host=a"]).unwrap();

        assert_eq!(parsed.definition().long_name(), "host");
        assert_eq!(parsed.unconverted_value(), Some("a"));
    }

    #[test]
    fn no_prefix_on_non_boolean() {
        let registry = fixture_registry();

        let result = recognize(&registry, false, vec!["--nohost"]);

        assert_matches!(result, Err(OptionsParsingError::IllegalNoPrefix { .. }));
    }

    #[test]
    fn no_prefix_with_value() {
        let registry = fixture_registry();

        let result = recognize(&registry, false, vec!["--noverbose=1"]);

        assert_matches!(
            result,
            Err(OptionsParsingError::UnexpectedBooleanValue { .. })
        );
    }

    #[test]
    fn missing_value() {
        let registry = fixture_registry();

        let result = recognize(&registry, false, vec!["--host"]);

        assert_matches!(result, Err(OptionsParsingError::MissingValue { token }) if token == "--host");
    }

    #[test]
    fn origin_references() {
        let registry = fixture_registry();
        let recognizer = TokenRecognizer::new(&registry, false);
        let dependent = Arc::clone(registry.get("refresh").unwrap());
        let mut iter = Vec::<String>::default().into_iter();
        let source = |definition: &OptionDefinition| {
            Some(format!("rc file, for --{}", definition.long_name()))
        };

        let parsed = recognizer
            .recognize(
                "--verbose",
                &mut iter,
                OptionPriority::RcFile,
                &source,
                Some(&dependent),
                None,
            )
            .unwrap();

        assert_eq!(parsed.origin().priority(), OptionPriority::RcFile);
        assert_eq!(parsed.origin().source(), Some("rc file, for --verbose"));
        assert_eq!(
            parsed
                .origin()
                .implicit_dependent()
                .map(|definition| definition.long_name()),
            Some("refresh")
        );
        assert!(parsed.origin().expanded_from().is_none());
        assert!(!parsed.is_explicit());
    }
}
