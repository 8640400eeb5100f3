//! Positional `%s` placeholder rendering.
//!
//! Callers write DB-API `format`-style SQL; before execution the `%s`
//! markers are replaced, in order, with either the provider's native
//! placeholder token or a literal `NULL`. `%%` escapes a percent sign.

use crate::error::AdoDbError;

/// Substitute the ordered `replacements` into the `%s` markers of
/// `format`. The replacement count must match the marker count exactly.
pub fn render(format: &str, replacements: &[String]) -> Result<String, AdoDbError> {
    let mut rendered = String::with_capacity(format.len() + 8 * replacements.len());
    let mut next = 0usize;
    let mut chars = format.chars();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            rendered.push(ch);
            continue;
        }
        match chars.next() {
            Some('s') => {
                let token = replacements.get(next).ok_or_else(|| {
                    AdoDbError::Programming(format!(
                        "statement has more %s markers than the {} parameters supplied",
                        replacements.len()
                    ))
                })?;
                rendered.push_str(token);
                next += 1;
            }
            Some('%') => rendered.push('%'),
            Some(other) => {
                return Err(AdoDbError::Programming(format!(
                    "unsupported format directive %{other} in statement"
                )));
            }
            None => {
                return Err(AdoDbError::Programming(
                    "statement ends with a dangling % directive".into(),
                ));
            }
        }
    }

    if next != replacements.len() {
        return Err(AdoDbError::Programming(format!(
            "statement used {next} of {} parameters",
            replacements.len()
        )));
    }
    Ok(rendered)
}
