//! Identifier quoting and literal escaping.
//!
//! ```rust
//! use sqlweave_core::{IdentifierPreparer, Paramstyle};
//!
//! let preparer = IdentifierPreparer::new(Paramstyle::Qmark);
//! assert_eq!(preparer.quote("users"), "users");
//! assert_eq!(preparer.quote("Users"), "\"Users\"");
//! assert_eq!(preparer.quote("select"), "\"select\"");
//! ```

use std::borrow::Cow;

use crate::dialect::Paramstyle;

/// Words that must be quoted in every dialect.
pub const ANSI_RESERVED_WORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "authorization", "between", "binary", "both", "case", "cast", "check", "collate",
    "column", "constraint", "create", "cross", "current_date", "current_role",
    "current_time", "current_timestamp", "current_user", "default", "deferrable", "desc",
    "distinct", "do", "else", "end", "except", "false", "for", "foreign", "freeze", "from",
    "full", "grant", "group", "having", "ilike", "in", "initially", "inner", "intersect",
    "into", "is", "isnull", "join", "leading", "left", "like", "limit", "localtime",
    "localtimestamp", "natural", "new", "not", "notnull", "null", "off", "offset", "old",
    "on", "only", "or", "order", "outer", "overlaps", "placing", "primary", "references",
    "right", "select", "session_user", "set", "similar", "some", "symmetric", "table",
    "then", "to", "trailing", "true", "union", "unique", "user", "using", "verbose", "when",
    "where",
];

const ILLEGAL_INITIAL_CHARACTERS: &[char] = &['0', '1', '2', '3', '4', '5', '6', '7', '8', '9', '$'];

/// Quotes identifiers and escapes literal text for one dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierPreparer {
    initial_quote: char,
    final_quote: char,
    reserved_words: &'static [&'static str],
    double_percents: bool,
}

impl IdentifierPreparer {
    /// ANSI preparer for a dialect with the given paramstyle.
    ///
    /// Percent signs are doubled when the paramstyle is `format` or
    /// `pyformat`, since the driver would otherwise read them as placeholders.
    pub fn new(paramstyle: Paramstyle) -> Self {
        Self {
            initial_quote: '"',
            final_quote: '"',
            reserved_words: ANSI_RESERVED_WORDS,
            double_percents: paramstyle.uses_percent(),
        }
    }

    /// Use different quote characters.
    pub fn with_quotes(mut self, initial: char, final_quote: char) -> Self {
        self.initial_quote = initial;
        self.final_quote = final_quote;
        self
    }

    /// Use a different reserved word list (lowercase).
    pub fn with_reserved_words(mut self, words: &'static [&'static str]) -> Self {
        self.reserved_words = words;
        self
    }

    /// Override whether literal percent signs are doubled.
    pub fn with_double_percents(mut self, double: bool) -> Self {
        self.double_percents = double;
        self
    }

    /// Whether literal percent signs are doubled.
    pub fn double_percents(&self) -> bool {
        self.double_percents
    }

    /// Opening quote character.
    pub fn initial_quote(&self) -> char {
        self.initial_quote
    }

    /// Closing quote character.
    pub fn final_quote(&self) -> char {
        self.final_quote
    }

    /// Check if a word is reserved, case-insensitively.
    pub fn is_reserved(&self, word: &str) -> bool {
        self.reserved_words
            .iter()
            .any(|w| w.eq_ignore_ascii_case(word))
    }

    /// Escape an identifier body so it can sit between the quote characters.
    pub fn escape_identifier(&self, value: &str) -> String {
        let doubled: String = [self.final_quote, self.final_quote].iter().collect();
        let escaped = value.replace(self.final_quote, &doubled);
        if self.double_percents {
            escaped.replace('%', "%%")
        } else {
            escaped
        }
    }

    /// Quote an identifier unconditionally.
    pub fn quote_identifier(&self, value: &str) -> String {
        format!(
            "{}{}{}",
            self.initial_quote,
            self.escape_identifier(value),
            self.final_quote
        )
    }

    /// Check if an identifier needs quoting.
    ///
    /// Reserved words, names starting with a digit or `$`, names with
    /// characters outside `[A-Za-z0-9_$]`, and names that are not all
    /// lowercase are quoted.
    pub fn requires_quotes(&self, value: &str) -> bool {
        let Some(first) = value.chars().next() else {
            return true;
        };
        self.is_reserved(value)
            || ILLEGAL_INITIAL_CHARACTERS.contains(&first)
            || !value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
            || value.to_lowercase() != value
    }

    /// Quote an identifier only if it needs it.
    pub fn quote<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if self.requires_quotes(value) {
            Cow::Owned(self.quote_identifier(value))
        } else {
            Cow::Borrowed(value)
        }
    }

    /// Quote a schema name, splitting `database.owner` style names.
    pub fn quote_schema(&self, schema: &str) -> String {
        schema
            .split('.')
            .map(|part| self.quote(part).into_owned())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Render a possibly schema-qualified table name.
    pub fn format_table(&self, schema: Option<&str>, name: &str) -> String {
        match schema {
            Some(schema) => format!("{}.{}", self.quote_schema(schema), self.quote(name)),
            None => self.quote(name).into_owned(),
        }
    }

    /// Escape percent signs in literal SQL text when the driver needs it.
    pub fn escape_literal_percents<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.double_percents && text.contains('%') {
            Cow::Owned(text.replace('%', "%%"))
        } else {
            Cow::Borrowed(text)
        }
    }
}
