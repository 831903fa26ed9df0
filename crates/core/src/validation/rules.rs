//! Field rules shared by every row validator.
//!
//! [`RowCheck`] reads one raw row and accumulates field errors. Every rule
//! runs independently, so a row reports all of its problems at once.

use std::sync::LazyLock;

use regex::Regex;

use crate::tabular::RawRow;
use crate::types::RowIndex;
use crate::validation::ValidationError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const MSG_REQUIRED: &str = "required";
pub const MSG_INVALID_EMAIL: &str = "invalid email address";

/// Tokens accepted as `true` by boolean-ish fields (case-insensitive).
pub const TRUE_TOKENS: &[&str] = &["true", "1", "si", "sí", "yes", "y", "s"];
/// Tokens accepted as `false` by boolean-ish fields (case-insensitive).
pub const FALSE_TOKENS: &[&str] = &["false", "0", "no", "n"];

const DEFAULT_URL_SCHEME: &str = "https://";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]{2,}$").expect("valid regex"));
static URL_SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").expect("valid regex"));

// ---------------------------------------------------------------------------
// Standalone helpers
// ---------------------------------------------------------------------------

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

/// Return a copy of `value` with `https://` prefixed when it has no scheme.
pub fn normalize_url(value: &str) -> String {
    if URL_SCHEME_RE.is_match(value) {
        value.to_string()
    } else {
        format!("{DEFAULT_URL_SCHEME}{value}")
    }
}

/// Parse a boolean-ish token. `None` when the token is not recognized.
pub fn parse_bool_token(value: &str) -> Option<bool> {
    let token = value.trim().to_lowercase();
    if TRUE_TOKENS.contains(&token.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&token.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Parse a decimal, accepting `,` as the decimal separator.
pub fn parse_decimal(value: &str) -> Option<f64> {
    value
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// RowCheck
// ---------------------------------------------------------------------------

/// Error-accumulating reader over one raw row.
pub struct RowCheck<'a> {
    row: &'a RawRow,
    row_index: RowIndex,
    errors: Vec<ValidationError>,
}

impl<'a> RowCheck<'a> {
    pub fn new(row: &'a RawRow, row_index: RowIndex) -> Self {
        Self {
            row,
            row_index,
            errors: Vec::new(),
        }
    }

    /// Trimmed value, `None` when empty.
    pub fn text(&self, field: &str) -> Option<String> {
        let value = self.row.get(field).trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    /// Trimmed value; records a `required` error when empty.
    pub fn required(&mut self, field: &str) -> String {
        match self.text(field) {
            Some(value) => value,
            None => {
                self.push(field, MSG_REQUIRED, None);
                String::new()
            }
        }
    }

    /// Lowercased email, validated when present.
    pub fn email(&mut self, field: &str, required: bool) -> Option<String> {
        let value = if required {
            Some(self.required(field)).filter(|v| !v.is_empty())
        } else {
            self.text(field)
        }?;

        let value = value.to_lowercase();
        if is_valid_email(&value) {
            Some(value)
        } else {
            self.push(field, MSG_INVALID_EMAIL, None);
            None
        }
    }

    /// URL with a default scheme added when missing. Never errors.
    pub fn url(&self, field: &str) -> Option<String> {
        self.text(field).map(|v| normalize_url(&v))
    }

    /// Case-insensitive match against `allowed`; `default` when empty.
    pub fn enumerated<T: Copy>(
        &mut self,
        field: &str,
        allowed: &[(&str, T)],
        default: T,
        suggestion: Option<&str>,
    ) -> T {
        let Some(value) = self.text(field) else {
            return default;
        };
        let lowered = value.to_lowercase();
        match allowed
            .iter()
            .find(|(token, _)| token.to_lowercase() == lowered)
        {
            Some((_, variant)) => *variant,
            None => {
                let names: Vec<&str> = allowed.iter().map(|(token, _)| *token).collect();
                self.push(
                    field,
                    &format!("invalid value '{value}'; allowed values: {}", names.join(", ")),
                    suggestion,
                );
                default
            }
        }
    }

    /// Like [`enumerated`](Self::enumerated) but returns the matched token and
    /// `None` when the field is empty.
    pub fn optional_token(
        &mut self,
        field: &str,
        allowed: &[&'static str],
        suggestion: Option<&str>,
    ) -> Option<&'static str> {
        let value = self.text(field)?;
        let lowered = value.to_lowercase();
        let found = allowed.iter().copied().find(|token| *token == lowered);
        if found.is_none() {
            self.push(
                field,
                &format!("invalid value '{value}'; allowed values: {}", allowed.join(", ")),
                suggestion,
            );
        }
        found
    }

    /// Boolean-ish token; `default` when empty.
    pub fn boolean(&mut self, field: &str, default: bool) -> bool {
        let Some(value) = self.text(field) else {
            return default;
        };
        match parse_bool_token(&value) {
            Some(b) => b,
            None => {
                let accepted: Vec<&str> = TRUE_TOKENS.iter().chain(FALSE_TOKENS).copied().collect();
                self.push(
                    field,
                    &format!("invalid boolean '{value}'; accepted values: {}", accepted.join(", ")),
                    None,
                );
                default
            }
        }
    }

    /// Decimal within `[min, max]` (either bound optional); `default` when empty.
    pub fn number(&mut self, field: &str, min: Option<f64>, max: Option<f64>, default: f64) -> f64 {
        let Some(value) = self.text(field) else {
            return default;
        };
        let Some(number) = parse_decimal(&value) else {
            self.push(field, &format!("invalid number '{value}'"), None);
            return default;
        };

        let message = match (min, max) {
            (Some(lo), Some(hi)) if number < lo || number > hi => {
                format!("must be between {lo} and {hi}")
            }
            (Some(lo), None) if number < lo => format!("must be at least {lo}"),
            (None, Some(hi)) if number > hi => format!("must be at most {hi}"),
            _ => return number,
        };
        self.push(field, &message, None);
        default
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Return `record` when no rule failed, else the collected errors.
    pub fn finish<T>(self, record: T) -> Result<T, Vec<ValidationError>> {
        if self.errors.is_empty() {
            Ok(record)
        } else {
            Err(self.errors)
        }
    }

    fn push(&mut self, field: &str, message: &str, suggestion: Option<&str>) {
        self.errors.push(ValidationError {
            row_index: self.row_index,
            field: field.to_string(),
            message: message.to_string(),
            suggestion: suggestion.map(String::from),
        });
    }
}

/// Join present name parts with one space, falling back through `fallbacks`
/// and finally to `unnamed`.
pub fn compose_name(parts: &[Option<&str>], fallbacks: &[Option<&str>]) -> String {
    let joined = parts
        .iter()
        .flatten()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if !joined.is_empty() {
        return joined;
    }
    fallbacks
        .iter()
        .flatten()
        .map(|f| f.trim())
        .find(|f| !f.is_empty())
        .unwrap_or(UNNAMED)
        .to_string()
}

pub const UNNAMED: &str = "unnamed";

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
