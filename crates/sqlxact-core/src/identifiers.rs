//! Name validation for fields, members and schema objects.
//!
//! Names are spliced directly into generated SQL, so they are restricted to
//! plain identifiers. Names starting with a double underscore are reserved for
//! the tags sqlxact itself writes into contexts and JSON documents (for
//! example `__name__` and `__record__`).

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Prefix reserved for internal keys.
pub const RESERVED_PREFIX: &str = "__";

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

/// Check that `name` is a plain, unreserved identifier.
pub fn validate_identifier(name: &str) -> Result<()> {
    if !identifier_regex().is_match(name) {
        return Err(Error::Definition(format!("'{name}' is not a valid identifier")));
    }
    if name.starts_with(RESERVED_PREFIX) {
        return Err(Error::Definition(format!(
            "'{name}' uses the reserved prefix '{RESERVED_PREFIX}'"
        )));
    }
    Ok(())
}

/// Check that every name is a valid identifier and that none repeats.
pub fn validate_unique_names<'a, I>(owner: &str, names: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for name in names {
        validate_identifier(name)?;
        if !seen.insert(name) {
            return Err(Error::Definition(format!(
                "'{name}' is declared more than once in {owner}"
            )));
        }
    }
    Ok(())
}
