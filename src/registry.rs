use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::convert::{BooleanConverter, ConvertedValue, Converter, FromStrConverter};
use crate::definition::{Definition, Expansion, OptionDefinition};
use crate::model::ValueType;

#[derive(Debug, Error)]
#[error("Config error: {0}")]
pub struct ConfigError(pub(crate) String);

/// Type-erased assignment of a converted value onto a schema instance.
pub(crate) enum FieldSetter {
    /// The field takes the converter's output; invoked once per effective
    /// value (so repeated options invoke it once per accumulated instance).
    Valued(Box<dyn Fn(&mut dyn Any, ConvertedValue) + Send + Sync>),
    /// The field reacts to the option's presence alone.
    Presence(Box<dyn Fn(&mut dyn Any) + Send + Sync>),
}

/// Everything the binder needs to instantiate one schema record and populate
/// its fields: a constructor handle plus a setter per member option.
pub(crate) struct SchemaBinding {
    construct: Box<dyn Fn() -> Box<dyn Any> + Send + Sync>,
    members: Vec<String>,
    setters: HashMap<String, FieldSetter>,
}

impl SchemaBinding {
    pub(crate) fn construct(&self) -> Box<dyn Any> {
        (self.construct)()
    }

    pub(crate) fn members(&self) -> &[String] {
        &self.members
    }

    pub(crate) fn setter(&self, name: &str) -> Option<&FieldSetter> {
        self.setters.get(name)
    }
}

/// The immutable metadata registry: every known option definition, keyed by
/// long name and by single-character abbreviation.
///
/// Build one via [`OptionRegistry::builder`], then share it (it is cheap to
/// clone behind an `Arc`, and reads are thread-safe) across as many
/// [OptionsParser](crate::OptionsParser) instances as needed.
pub struct OptionRegistry {
    by_name: BTreeMap<String, Arc<OptionDefinition>>,
    by_abbrev: HashMap<char, Arc<OptionDefinition>>,
    schemas: HashMap<TypeId, SchemaBinding>,
}

impl std::fmt::Debug for OptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionRegistry")
            .field("options", &self.by_name.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OptionRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            by_name: BTreeMap::default(),
            by_abbrev: HashMap::default(),
            schemas: HashMap::default(),
        }
    }

    /// Look up a definition by its long name.
    pub fn get(&self, name: &str) -> Option<&Arc<OptionDefinition>> {
        self.by_name.get(name)
    }

    /// Look up a definition by its single-character abbreviation.
    pub fn get_by_abbrev(&self, abbrev: char) -> Option<&Arc<OptionDefinition>> {
        self.by_abbrev.get(&abbrev)
    }

    /// All definitions, in lexicographic order of long name.
    pub fn all_definitions(&self) -> impl Iterator<Item = &Arc<OptionDefinition>> {
        self.by_name.values()
    }

    /// Evaluate an expansion option into the argument tokens it stands for.
    pub fn evaluate_expansion(
        &self,
        definition: &OptionDefinition,
        value: Option<&str>,
    ) -> Vec<String> {
        definition.expansion().evaluate(value)
    }

    pub(crate) fn binding(&self, type_id: TypeId) -> Option<&SchemaBinding> {
        self.schemas.get(&type_id)
    }
}

/// Accumulates schemas into an [`OptionRegistry`].
pub struct RegistryBuilder {
    by_name: BTreeMap<String, Arc<OptionDefinition>>,
    by_abbrev: HashMap<char, Arc<OptionDefinition>>,
    schemas: HashMap<TypeId, SchemaBinding>,
}

impl RegistryBuilder {
    /// Start registering the options belonging to the schema record `S`.
    ///
    /// `S::default()` provides the constructor handle used at
    /// materialization; the returned [`SchemaBuilder`] records a setter per
    /// field.
    pub fn schema<S>(&mut self) -> Result<SchemaBuilder<'_, S>, ConfigError>
    where
        S: Default + Any,
    {
        let type_id = TypeId::of::<S>();

        if self.schemas.contains_key(&type_id) {
            return Err(ConfigError(format!(
                "Cannot register the schema '{}' twice.",
                std::any::type_name::<S>()
            )));
        }

        self.schemas.insert(
            type_id,
            SchemaBinding {
                construct: Box::new(|| -> Box<dyn Any> { Box::new(S::default()) }),
                members: Vec::default(),
                setters: HashMap::default(),
            },
        );

        Ok(SchemaBuilder {
            builder: self,
            type_id,
            _phantom: PhantomData,
        })
    }

    pub fn build(self) -> OptionRegistry {
        OptionRegistry {
            by_name: self.by_name,
            by_abbrev: self.by_abbrev,
            schemas: self.schemas,
        }
    }
}

/// Registers the fields of one schema record `S`.
///
/// Each method takes the shape-independent [`Definition`] and, where the field
/// carries a value, a setter closure accepting the converter's typed output.
pub struct SchemaBuilder<'rb, S> {
    builder: &'rb mut RegistryBuilder,
    type_id: TypeId,
    _phantom: PhantomData<fn() -> S>,
}

impl<'rb, S> std::fmt::Debug for SchemaBuilder<'rb, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaBuilder")
            .field("type_id", &self.type_id)
            .finish()
    }
}

impl<'rb, S> SchemaBuilder<'rb, S>
where
    S: Any,
{
    /// A typed option holding a single value; repeated occurrences overwrite.
    pub fn single<T, F>(&mut self, definition: Definition, set: F) -> Result<&mut Self, ConfigError>
    where
        T: FromStr + Any,
        F: Fn(&mut S, T) + Send + Sync + 'static,
    {
        self.field(
            definition,
            ValueType::Typed,
            false,
            Expansion::None,
            false,
            Some(Arc::new(FromStrConverter::<T>::new())),
            Some(Self::valued(set)),
        )
    }

    /// A typed option whose repeated occurrences accumulate in order; the
    /// setter runs once per accumulated instance.
    pub fn repeated<T, F>(
        &mut self,
        definition: Definition,
        set: F,
    ) -> Result<&mut Self, ConfigError>
    where
        T: FromStr + Any,
        F: Fn(&mut S, T) + Send + Sync + 'static,
    {
        self.field(
            definition,
            ValueType::Typed,
            true,
            Expansion::None,
            false,
            Some(Arc::new(FromStrConverter::<T>::new())),
            Some(Self::valued(set)),
        )
    }

    /// A boolean-syntax option: `--name`, `--noname`, `-x`, `-x-`.
    pub fn flag<F>(&mut self, definition: Definition, set: F) -> Result<&mut Self, ConfigError>
    where
        F: Fn(&mut S, bool) + Send + Sync + 'static,
    {
        self.field(
            definition,
            ValueType::Bool,
            false,
            Expansion::None,
            false,
            Some(Arc::new(BooleanConverter)),
            Some(Self::valued(set)),
        )
    }

    /// A nullary option: presence is the whole story, no value token.
    pub fn nullary<F>(&mut self, definition: Definition, set: F) -> Result<&mut Self, ConfigError>
    where
        F: Fn(&mut S) + Send + Sync + 'static,
    {
        self.field(
            definition,
            ValueType::Void,
            false,
            Expansion::None,
            false,
            None,
            Some(FieldSetter::Presence(Box::new(move |instance| {
                let instance = instance
                    .downcast_mut::<S>()
                    .expect("internal error - schema instance type mismatch");
                set(instance);
            }))),
        )
    }

    /// An expansion option: its presence expands to further argument tokens.
    /// The expansion option itself binds to no field.
    pub fn expansion(
        &mut self,
        definition: Definition,
        expansion: Expansion,
    ) -> Result<&mut Self, ConfigError> {
        if expansion.is_none() {
            return Err(ConfigError(format!(
                "Cannot declare the expansion option '{}' without an expansion.",
                definition.name()
            )));
        }

        self.field(definition, ValueType::Void, false, expansion, false, None, None)
    }

    /// A wrapper option: its value is a single fully-formed argument token,
    /// re-parsed at the same priority. Binds to no field.
    pub fn wrapper(&mut self, definition: Definition) -> Result<&mut Self, ConfigError> {
        self.field(definition, ValueType::Void, false, Expansion::None, true, None, None)
    }

    fn valued<T, F>(set: F) -> FieldSetter
    where
        T: Any,
        F: Fn(&mut S, T) + Send + Sync + 'static,
    {
        FieldSetter::Valued(Box::new(move |instance, value| {
            let instance = instance
                .downcast_mut::<S>()
                .expect("internal error - schema instance type mismatch");
            let value = value
                .downcast::<T>()
                .expect("internal error - converter output type mismatch");
            set(instance, *value);
        }))
    }

    #[allow(clippy::too_many_arguments)]
    fn field(
        &mut self,
        definition: Definition,
        value_type: ValueType,
        allows_multiple: bool,
        expansion: Expansion,
        is_wrapper: bool,
        converter: Option<Arc<dyn Converter>>,
        setter: Option<FieldSetter>,
    ) -> Result<&mut Self, ConfigError> {
        let built = definition.build(value_type, allows_multiple, expansion, is_wrapper, converter)?;
        let name = built.long_name().to_string();

        if self.builder.by_name.contains_key(&name) {
            return Err(ConfigError(format!(
                "Cannot duplicate the option '{}'.",
                name
            )));
        }

        if let Some(abbrev) = built.abbrev() {
            if self.builder.by_abbrev.contains_key(&abbrev) {
                return Err(ConfigError(format!(
                    "Cannot duplicate the abbreviation '{}'.",
                    abbrev
                )));
            }
        }

        let built = Arc::new(built);
        self.builder.by_name.insert(name.clone(), Arc::clone(&built));

        if let Some(abbrev) = built.abbrev() {
            self.builder.by_abbrev.insert(abbrev, Arc::clone(&built));
        }

        let binding = self
            .builder
            .schemas
            .get_mut(&self.type_id)
            .expect("internal error - schema binding must exist while its builder is alive");
        binding.members.push(name.clone());

        if let Some(setter) = setter {
            binding.setters.insert(name, setter);
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Sample {
        host: String,
        verbose: bool,
        counts: Vec<u32>,
        refreshed: bool,
    }

    fn sample_registry() -> OptionRegistry {
        let mut builder = OptionRegistry::builder();
        let mut schema = builder.schema::<Sample>().unwrap();
        schema
            .single::<String, _>(Definition::new("host").abbrev('h').default("localhost"), |s, v| {
                s.host = v
            })
            .unwrap()
            .flag(Definition::new("verbose").abbrev('v'), |s, v| s.verbose = v)
            .unwrap()
            .repeated::<u32, _>(Definition::new("count"), |s, v| s.counts.push(v))
            .unwrap()
            .nullary(Definition::new("refresh"), |s| s.refreshed = true)
            .unwrap()
            .expansion(
                Definition::new("all"),
                Expansion::fixed(["--verbose", "--count=3"]),
            )
            .unwrap();
        builder.build()
    }

    #[test]
    fn lookups() {
        let registry = sample_registry();

        assert_eq!(registry.get("host").unwrap().long_name(), "host");
        assert_eq!(registry.get_by_abbrev('v').unwrap().long_name(), "verbose");
        assert!(registry.get("moot").is_none());
        assert!(registry.get_by_abbrev('x').is_none());
    }

    #[test]
    fn enumeration_is_lexicographic() {
        let registry = sample_registry();

        let names: Vec<&str> = registry
            .all_definitions()
            .map(|definition| definition.long_name())
            .collect();

        assert_eq!(names, vec!["all", "count", "host", "refresh", "verbose"]);
    }

    #[test]
    fn expansion_evaluation() {
        let registry = sample_registry();
        let definition = registry.get("all").unwrap();

        assert_eq!(
            registry.evaluate_expansion(definition, None),
            vec!["--verbose".to_string(), "--count=3".to_string()]
        );
    }

    #[test]
    fn duplicate_option() {
        let mut builder = OptionRegistry::builder();
        let mut schema = builder.schema::<Sample>().unwrap();
        schema
            .single::<String, _>(Definition::new("host"), |s, v| s.host = v)
            .unwrap();

        let result = schema.single::<String, _>(Definition::new("host"), |s, v| s.host = v);

        assert_matches!(result, Err(ConfigError(_)));
    }

    #[test]
    fn duplicate_abbrev() {
        let mut builder = OptionRegistry::builder();
        let mut schema = builder.schema::<Sample>().unwrap();
        schema
            .flag(Definition::new("verbose").abbrev('v'), |s, v| s.verbose = v)
            .unwrap();

        let result = schema.single::<String, _>(Definition::new("value").abbrev('v'), |s, v| s.host = v);

        assert_matches!(result, Err(ConfigError(_)));
    }

    #[test]
    fn duplicate_schema() {
        let mut builder = OptionRegistry::builder();
        builder.schema::<Sample>().unwrap();

        let result = builder.schema::<Sample>();

        assert_matches!(result, Err(ConfigError(_)));
    }

    #[test]
    fn expansion_requires_tokens() {
        let mut builder = OptionRegistry::builder();
        let mut schema = builder.schema::<Sample>().unwrap();

        let result = schema.expansion(Definition::new("all"), Expansion::None);

        assert_matches!(result, Err(ConfigError(_)));
    }

    #[test]
    fn binding_constructs_and_sets() {
        let registry = sample_registry();
        let binding = registry.binding(TypeId::of::<Sample>()).unwrap();
        let mut instance = binding.construct();

        match binding.setter("host").unwrap() {
            FieldSetter::Valued(set) => set(instance.as_mut(), Box::new("example.com".to_string())),
            FieldSetter::Presence(_) => panic!("host must be a valued field"),
        }
        match binding.setter("refresh").unwrap() {
            FieldSetter::Presence(set) => set(instance.as_mut()),
            FieldSetter::Valued(_) => panic!("refresh must be a presence field"),
        }

        let sample = *instance.downcast::<Sample>().unwrap();
        assert_eq!(
            sample,
            Sample {
                host: "example.com".to_string(),
                verbose: false,
                counts: Vec::default(),
                refreshed: true,
            }
        );
    }

    #[test]
    fn expansion_binds_no_setter() {
        let registry = sample_registry();
        let binding = registry.binding(TypeId::of::<Sample>()).unwrap();

        assert!(binding.setter("all").is_none());
        assert_eq!(
            binding.members(),
            &["host", "verbose", "count", "refresh", "all"]
        );
    }
}
