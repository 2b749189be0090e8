//! Subject validation and wildcard matching
//!
//! Subjects are dot-separated tokens. Subscription patterns may use `*` to
//! match exactly one token and a trailing `>` to match one or more tokens.

use crate::error::{BusError, Result};

const SINGLE_WILDCARD: &str = "*";
const FULL_WILDCARD: &str = ">";

/// Validate a concrete subject used for publishing
pub fn validate_subject(subject: &str) -> Result<()> {
    let valid = !subject.is_empty()
        && subject.split('.').all(|token| {
            !token.is_empty()
                && token != SINGLE_WILDCARD
                && token != FULL_WILDCARD
                && !token.chars().any(char::is_whitespace)
        });
    if valid {
        Ok(())
    } else {
        Err(BusError::InvalidSubject(subject.to_string()))
    }
}

/// Validate a subscription pattern
pub fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(BusError::InvalidSubject(pattern.to_string()));
    }
    let tokens: Vec<&str> = pattern.split('.').collect();
    let last = tokens.len() - 1;
    for (i, token) in tokens.iter().enumerate() {
        if token.is_empty() || token.chars().any(char::is_whitespace) {
            return Err(BusError::InvalidSubject(pattern.to_string()));
        }
        if *token == FULL_WILDCARD && i != last {
            return Err(BusError::InvalidSubject(pattern.to_string()));
        }
        if token.len() > 1 && (token.contains('*') || token.contains('>')) {
            return Err(BusError::InvalidSubject(pattern.to_string()));
        }
    }
    Ok(())
}

/// Check whether `subject` is matched by subscription `pattern`
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(FULL_WILDCARD), Some(_)) => return true,
            (Some(SINGLE_WILDCARD), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
