//! FizzBuzz request domain
//!
//! The request type served by the HTTP surface and recorded in the ranking cache,
//! its input validation, and the computation itself.

use serde::{Deserialize, Serialize};

/// Largest accepted `limit`.
pub const MAX_LIMIT: i64 = 100_000;

/// A validated FizzBuzz request.
///
/// Field order is part of the canonical serialization and therefore of the
/// content hash: reordering fields changes every stored hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FizzBuzzRequest {
    #[serde(rename = "fst_mod")]
    pub fst_modulo: i64,
    #[serde(rename = "snd_mod")]
    pub snd_modulo: i64,
    pub limit: i64,
    pub fst_str: String,
    pub snd_str: String,
}

impl FizzBuzzRequest {
    pub fn new(
        fst_modulo: i64,
        snd_modulo: i64,
        limit: i64,
        fst_str: impl Into<String>,
        snd_str: impl Into<String>,
    ) -> Self {
        Self {
            fst_modulo,
            snd_modulo,
            limit,
            fst_str: fst_str.into(),
            snd_str: snd_str.into(),
        }
    }

    /// Run the computation for `1..=limit`.
    pub fn compute(&self) -> Vec<String> {
        fizzbuzz(
            self.limit,
            self.fst_modulo,
            self.snd_modulo,
            &self.fst_str,
            &self.snd_str,
        )
    }
}

/// Replace multiples of `fst_mod` by `fst_str`, multiples of `snd_mod` by `snd_str`,
/// and multiples of both by their concatenation.
pub fn fizzbuzz(limit: i64, fst_mod: i64, snd_mod: i64, fst_str: &str, snd_str: &str) -> Vec<String> {
    if limit <= 0 || fst_mod <= 0 || snd_mod <= 0 {
        return Vec::new();
    }

    (1..=limit)
        .map(|n| match (n % fst_mod == 0, n % snd_mod == 0) {
            (true, true) => format!("{fst_str}{snd_str}"),
            (true, false) => fst_str.to_string(),
            (false, true) => snd_str.to_string(),
            (false, false) => n.to_string(),
        })
        .collect()
}

// =============================================================================
// Validation
// =============================================================================

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field_name: String,
    pub message: String,
}

impl FieldError {
    fn new(field_name: &str, message: impl Into<String>) -> Self {
        Self {
            field_name: field_name.to_string(),
            message: message.into(),
        }
    }
}

/// Unvalidated request body, every field optional so missing ones can be reported
/// individually.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFizzBuzzRequest {
    pub fst_mod: Option<i64>,
    pub snd_mod: Option<i64>,
    pub limit: Option<i64>,
    pub fst_str: Option<String>,
    pub snd_str: Option<String>,
}

impl RawFizzBuzzRequest {
    /// Validate into a [`FizzBuzzRequest`], collecting every field error.
    pub fn validate(self) -> std::result::Result<FizzBuzzRequest, Vec<FieldError>> {
        let mut errors = Vec::new();

        let fst_mod = check_int(&mut errors, "fst_mod", self.fst_mod, None);
        let snd_mod = check_int(&mut errors, "snd_mod", self.snd_mod, None);
        let limit = check_int(&mut errors, "limit", self.limit, Some(MAX_LIMIT));
        let fst_str = check_str(&mut errors, "fst_str", self.fst_str);
        let snd_str = check_str(&mut errors, "snd_str", self.snd_str);

        match (fst_mod, snd_mod, limit, fst_str, snd_str) {
            (Some(fst_modulo), Some(snd_modulo), Some(limit), Some(fst_str), Some(snd_str))
                if errors.is_empty() =>
            {
                Ok(FizzBuzzRequest {
                    fst_modulo,
                    snd_modulo,
                    limit,
                    fst_str,
                    snd_str,
                })
            }
            _ => Err(errors),
        }
    }
}

fn check_int(
    errors: &mut Vec<FieldError>,
    field: &str,
    value: Option<i64>,
    max: Option<i64>,
) -> Option<i64> {
    match value {
        // zero is indistinguishable from "unset" for a required numeric field
        None | Some(0) => {
            errors.push(FieldError::new(field, "This field is required"));
            None
        }
        Some(v) if v < 1 => {
            errors.push(FieldError::new(field, "Should be greater than 1"));
            None
        }
        Some(v) => match max {
            Some(max) if v > max => {
                errors.push(FieldError::new(field, format!("Should be less than {max}")));
                None
            }
            _ => Some(v),
        },
    }
}

fn check_str(errors: &mut Vec<FieldError>, field: &str, value: Option<String>) -> Option<String> {
    match value {
        Some(s) if !s.is_empty() => Some(s),
        _ => {
            errors.push(FieldError::new(field, "This field is required"));
            None
        }
    }
}
