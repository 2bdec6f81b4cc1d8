pub(crate) const LONG_PREFIX: &str = "--";
pub(crate) const SHORT_PREFIX: &str = "-";
pub(crate) const TERMINATOR: &str = "--";
pub(crate) const NEGATION_PREFIX: &str = "no";
