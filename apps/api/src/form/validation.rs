//! Validation engine: a per-field rule set evaluated over a whole form value.
//!
//! `validate` is pure and total. A field absent from the returned map is valid.
//! Rules for a field run in registration order and the first failure wins.

use std::collections::BTreeMap;
use std::fmt;

/// Field name → human-readable message. Ordered so output is deterministic.
pub type FieldErrors = BTreeMap<String, String>;

type Check<T> = Box<dyn Fn(&T) -> Option<String> + Send + Sync>;

struct FieldRule<T> {
    field: String,
    check: Check<T>,
}

pub struct RuleSet<T> {
    rules: Vec<FieldRule<T>>,
}

impl<T> Default for RuleSet<T> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<T> fmt::Debug for RuleSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field(
                "fields",
                &self.rules.iter().map(|r| r.field.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<T> RuleSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule for `field`. The check returns `Some(message)` on failure.
    pub fn rule<F>(mut self, field: &str, check: F) -> Self
    where
        F: Fn(&T) -> Option<String> + Send + Sync + 'static,
    {
        self.rules.push(FieldRule {
            field: field.to_string(),
            check: Box::new(check),
        });
        self
    }

    pub fn validate(&self, values: &T) -> FieldErrors {
        let mut errors = FieldErrors::new();
        for rule in &self.rules {
            if errors.contains_key(&rule.field) {
                continue;
            }
            if let Some(message) = (rule.check)(values) {
                errors.insert(rule.field.clone(), message);
            }
        }
        errors
    }

    /// Like `validate`, restricted to the given fields.
    pub fn validate_fields<'a, I>(&self, values: &T, fields: I) -> FieldErrors
    where
        I: IntoIterator<Item = &'a String>,
    {
        let wanted: Vec<&String> = fields.into_iter().collect();
        self.validate(values)
            .into_iter()
            .filter(|(field, _)| wanted.contains(&field))
            .collect()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.field.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Reusable checks
// ────────────────────────────────────────────────────────────────────────────

pub fn required_text(value: &str, label: &str) -> Option<String> {
    if value.trim().is_empty() {
        Some(format!("{label} is required"))
    } else {
        None
    }
}

pub fn max_length(value: &str, max: usize, label: &str) -> Option<String> {
    if value.chars().count() > max {
        Some(format!("{label} must be at most {max} characters"))
    } else {
        None
    }
}

pub fn email_shape(value: &str) -> Option<String> {
    let value = value.trim();
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        None
    } else {
        Some("Enter a valid email address".to_string())
    }
}

pub fn positive_amount(value: Option<f64>, label: &str) -> Option<String> {
    match value {
        None => Some(format!("{label} is required")),
        Some(v) if !v.is_finite() || v <= 0.0 => Some(format!("{label} must be greater than zero")),
        Some(_) => None,
    }
}
