//! SQL column type to Excel display format resolution
//!
//! Every column is described by a [`TypeKey`] such as `DECIMAL(10,2)`. The
//! [`TypeFormatRegistry`] holds an ordered list of [`FormatRule`]s; the first
//! rule whose pattern matches the whole key decides the display format, and
//! keys no rule matches fall back to [`TEXT_FORMAT`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Display format used when no rule matches
pub const TEXT_FORMAT: &str = "text";

/// Uppercased `TYPE(precision,scale)` descriptor used as the match subject
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeKey(String);

impl TypeKey {
    /// Build a key from a declared SQL type name, precision and scale
    pub fn new(type_name: &str, precision: i32, scale: i32) -> Self {
        TypeKey(format!("{}({},{})", type_name, precision, scale).to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A (pattern, display format) pair
#[derive(Debug, Clone)]
pub struct FormatRule {
    pattern: Regex,
    format: &'static str,
}

impl FormatRule {
    /// Compile a rule; the pattern is anchored so it must match the whole key
    pub fn new(pattern: &str, format: &'static str) -> Result<Self, regex::Error> {
        Ok(FormatRule {
            pattern: Regex::new(&format!("^(?:{})$", pattern))?,
            format,
        })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.pattern.is_match(key)
    }

    pub fn format(&self) -> &'static str {
        self.format
    }
}

const STANDARD_RULES: &[(&str, &str)] = &[
    (r"NUMBER\(\d+,2\)", "0.00"),
    (r"NUMBER\(\d+,0\)", "0"),
    (r"NUMBER.*", "0.###"),
    (r"INT\(\d+,0\)", "0"),
    (r"BIGINT\(\d+,0\)", "0"),
    (r"BIT\(1,0\)", "0"),
    (r"DECIMAL\(\d+,2\)", "0.00"),
    (r"DECIMAL\(\d+,0\)", "0"),
    (r"DECIMAL.*", "0.####"),
    (r"NUMERIC.*", "0.####"),
    (r".*CHAR.*", TEXT_FORMAT),
    (r"DATETIME\(\d+,3\)", "dd.MM.yyyy h:mm:ss.000"),
    (r"DATETIME\(\d+,0\)", "dd.MM.yyyy h:mm:ss"),
    (r"DATE.*", "dd.MM.yyyy"),
    (r"TIMESTAMP.*", "dd.MM.yyyy h:mm:ss.000"),
];

static GLOBAL: Lazy<TypeFormatRegistry> = Lazy::new(TypeFormatRegistry::standard);

/// Ordered, first-match-wins list of format rules
#[derive(Debug, Clone)]
pub struct TypeFormatRegistry {
    rules: Vec<FormatRule>,
}

impl TypeFormatRegistry {
    /// Build a registry from custom rules, keeping their order
    pub fn new(rules: Vec<FormatRule>) -> Self {
        TypeFormatRegistry { rules }
    }

    /// Compile a `(pattern, format)` table, failing on the first bad pattern
    pub fn from_table(table: &[(&str, &'static str)]) -> Result<Self, regex::Error> {
        let rules = table
            .iter()
            .map(|(pattern, format)| FormatRule::new(pattern, format))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TypeFormatRegistry { rules })
    }

    /// The built-in rule table
    ///
    /// # Panics
    ///
    /// If a built-in pattern does not compile.
    pub fn standard() -> Self {
        Self::from_table(STANDARD_RULES)
            .expect("Failed to compile built-in format rules - this is a bug")
    }

    /// Process-wide registry holding the built-in rules
    pub fn global() -> &'static TypeFormatRegistry {
        &GLOBAL
    }

    /// Display format of the first rule matching `type_key`, or `"text"`
    pub fn resolve_format(&self, type_key: &str) -> &'static str {
        self.rules
            .iter()
            .find(|rule| rule.matches(type_key))
            .map(FormatRule::format)
            .unwrap_or(TEXT_FORMAT)
    }

    pub fn resolve(&self, key: &TypeKey) -> &'static str {
        self.resolve_format(key.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for TypeFormatRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Resolve a type key against the process-wide registry
pub fn resolve_format(type_key: &str) -> &'static str {
    TypeFormatRegistry::global().resolve_format(type_key)
}
