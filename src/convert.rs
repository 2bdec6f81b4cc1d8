use std::any::Any;
use std::marker::PhantomData;
use std::str::FromStr;

use thiserror::Error;

/// The output of a [`Converter`], type-erased so definitions of varying field
/// types can live in a single registry.
pub type ConvertedValue = Box<dyn Any>;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot convert '{token}' to {type_name}")]
pub struct ConversionError {
    pub token: String,
    pub type_name: &'static str,
}

/// Behaviour to convert an unconverted option value into its field type.
///
/// Converters are opaque to the parse engine: it only asks them to convert
/// when validating effective values or materializing a schema. A converter is
/// attached to an [OptionDefinition](crate::OptionDefinition) at registration
/// time and shared with the registry, so it must be usable from concurrent
/// readers.
pub trait Converter: Send + Sync {
    /// Convert a single unconverted value.
    fn convert(&self, value: &str) -> Result<ConvertedValue, ConversionError>;

    /// The name of the produced type, for diagnostics.
    fn type_name(&self) -> &'static str;
}

/// The stock converter: any `T: FromStr` converts via its `from_str`.
pub struct FromStrConverter<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> FromStrConverter<T> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for FromStrConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Converter for FromStrConverter<T>
where
    T: FromStr + Any,
{
    fn convert(&self, value: &str) -> Result<ConvertedValue, ConversionError> {
        let converted: T = T::from_str(value).map_err(|_| ConversionError {
            token: value.to_string(),
            type_name: std::any::type_name::<T>(),
        })?;
        Ok(Box::new(converted))
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Converter for boolean-syntax options.
///
/// Accepts `1`/`0`, `true`/`false`, and `yes`/`no`, case-insensitively. The
/// recognizer injects `1` and `0` for the value-less spellings, so this is the
/// complete boolean surface.
pub struct BooleanConverter;

impl Converter for BooleanConverter {
    fn convert(&self, value: &str) -> Result<ConvertedValue, ConversionError> {
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(Box::new(true)),
            "0" | "false" | "no" => Ok(Box::new(false)),
            _ => Err(ConversionError {
                token: value.to_string(),
                type_name: "bool",
            }),
        }
    }

    fn type_name(&self) -> &'static str {
        "bool"
    }
}
