//! `optrail` is a command line options parser for tools in a large build
//! system.
//!
//! Although other crates provide command line parser functionality, build
//! tooling has concerns they do not prioritize. Beyond populating a typed
//! record from argument tokens, `optrail` produces a normalized, canonical
//! record of the effective command line suitable for re-invocation and
//! cache-key derivation, plus an audit trail of how each option acquired its
//! value. Specifically:
//!
//! * *Multiple sources, explicit precedence*:
//! Arguments arrive from sources of differing trust ([`OptionPriority`]):
//! defaults, rc files, the command line, policy overrides. Callers parse each
//! source in ascending priority and the last-seen value wins; every
//! occurrence records the priority and a human-readable provenance string it
//! was parsed under.
//! * *Canonicalization*:
//! [OptionsParser::as_canonicalized_list](crate::OptionsParser::as_canonicalized_list)
//! renders the effective state as deterministic `--name=value` tokens,
//! order-stable and insensitive to expansions and duplicated assignments.
//! * *Expansion, implicit requirement, and wrapper options*:
//! An option may textually expand to further options, imply that other
//! options be set as if by an unseen caller, or wrap a single fully-formed
//! argument token that is re-parsed in its place.
//! * *Schema materialization*:
//! Option metadata is registered per schema record together with a setter
//! closure per field; [OptionsParser::materialize](crate::OptionsParser::materialize)
//! instantiates the record and populates it from the effective values.
//!
//! # Usage
//!
//! ```
//! use optrail::{Definition, OptionPriority, OptionRegistry, OptionsParser};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default)]
//! struct ServerOptions {
//!     host: String,
//!     port: u16,
//!     verbose: bool,
//! }
//!
//! let mut builder = OptionRegistry::builder();
//! let mut schema = builder.schema::<ServerOptions>().unwrap();
//! schema
//!     .single::<String, _>(Definition::new("host").default("localhost"), |s, v| s.host = v)
//!     .unwrap()
//!     .single::<u16, _>(Definition::new("port").abbrev('p').default("80"), |s, v| s.port = v)
//!     .unwrap()
//!     .flag(Definition::new("verbose").abbrev('v'), |s, v| s.verbose = v)
//!     .unwrap();
//! let registry = Arc::new(builder.build());
//!
//! let mut parser = OptionsParser::new(registry);
//! let residue = parser
//!     .parse(
//!         OptionPriority::CommandLine,
//!         Some("the command line"),
//!         ["--host=example.com", "-p", "8080", "input.txt"],
//!     )
//!     .unwrap();
//!
//! assert_eq!(residue, vec!["input.txt".to_string()]);
//! assert_eq!(
//!     parser.as_canonicalized_list(),
//!     vec!["--host=example.com".to_string(), "--port=8080".to_string()]
//! );
//!
//! let options: ServerOptions = parser.materialize();
//! assert_eq!(options.host, "example.com");
//! assert_eq!(options.port, 8080);
//! assert!(!options.verbose);
//! ```
//!
//! # Surface syntax
//!
//! * `--name`, `--name=VALUE`, `--name VALUE`;
//! * `--noname` (boolean options only; equivalent to `--name=0`);
//! * `-x`, `-x-` (boolean short forms), `-x VALUE`;
//! * `-name` / `-name=VALUE` when single-dash long options are enabled;
//! * a bare `--` terminates option parsing, and tokens not beginning with
//!   `-` are residue, both returned from [parse](crate::OptionsParser::parse).
//!
//! # Errors
//!
//! Problems in user input surface as [`OptionsParsingError`] and leave the
//! offending token available for diagnostics. Problems in the schema
//! declarations themselves (an expansion that does not re-parse cleanly, an
//! implicit requirement that does not apply, a schema that cannot be
//! populated) are bugs, not input errors, and panic.

mod constant;
mod convert;
mod definition;
mod error;
mod model;
mod parser;
mod registry;

pub use convert::{BooleanConverter, ConversionError, ConvertedValue, Converter, FromStrConverter};
pub use definition::{Definition, Expansion, OptionDefinition};
pub use error::OptionsParsingError;
pub use model::{MetadataTag, OptionPriority, ValueType};
pub use parser::{
    ArgsPreProcessor, OptionDescription, OptionOrigin, OptionValueDescription, OptionsParser,
    ParsedOption, SourceFunction,
};
pub use registry::{ConfigError, OptionRegistry, RegistryBuilder, SchemaBuilder};

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

#[cfg(test)]
pub(crate) mod test {
    macro_rules! assert_contains {
        ($base:expr, $sub:expr) => {
            assert!(
                $base.contains($sub),
                "'{b}' does not contain '{s}'",
                b = $base,
                s = $sub,
            );
        };
    }

    pub(crate) use assert_contains;
}
