//! Deterministic operator → pseudonym mapping
//!
//! A pseudonym is `"w"` followed by the first 7 hex characters of the MD5
//! digest of the operator id. The mapping is a pure function of its input, so
//! re-running a fetch reproduces the same pseudonyms without persisting state.
//!
//! Seven hex characters give 2^28 pseudonyms. Collision odds reach 50% at
//! roughly 19,300 distinct operators and stay below 0.02% at 300; a collision
//! is logged when observed but not otherwise resolved.

use crate::error::AnonymizeError;
use md5::{Digest, Md5};
use std::collections::HashMap;

const PSEUDONYM_PREFIX: char = 'w';
const PSEUDONYM_HEX_LEN: usize = 7;

/// Splits `"<operator_id>:<session_id>"` into its two parts.
pub fn split_identifier(raw_id: &str) -> Result<(&str, &str), AnonymizeError> {
    match raw_id.split_once(':') {
        Some((operator, session))
            if !operator.is_empty() && !session.is_empty() && !session.contains(':') =>
        {
            Ok((operator, session))
        }
        _ => Err(AnonymizeError::MalformedIdentifier(raw_id.to_string())),
    }
}

/// Pseudonym for an operator id, without caching.
pub fn derive_pseudonym(operator_id: &str) -> String {
    let digest = hex::encode(Md5::digest(operator_id.as_bytes()));
    let mut pseudonym = String::with_capacity(PSEUDONYM_HEX_LEN + 1);
    pseudonym.push(PSEUDONYM_PREFIX);
    pseudonym.push_str(&digest[..PSEUDONYM_HEX_LEN]);
    pseudonym
}

/// Memoized pseudonymizer owned by one pipeline run.
///
/// The mapping only grows. Its iteration order is the order in which operators
/// were first seen, which is what `identifiers.csv` is written in.
#[derive(Debug, Default)]
pub struct Anonymizer {
    order: Vec<(String, String)>,
    by_operator: HashMap<String, usize>,
    by_pseudonym: HashMap<String, String>,
}

impl Anonymizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a raw participant id to its operator's pseudonym.
    ///
    /// Two sessions by the same operator collapse onto one pseudonym.
    pub fn pseudonymize(&mut self, raw_id: &str) -> Result<String, AnonymizeError> {
        let (operator, _session) = split_identifier(raw_id)?;

        if let Some(&idx) = self.by_operator.get(operator) {
            return Ok(self.order[idx].1.clone());
        }

        let pseudonym = derive_pseudonym(operator);
        if let Some(existing) = self.by_pseudonym.get(&pseudonym) {
            log::warn!(
                "Pseudonym collision: operators '{}' and '{}' both map to {}",
                existing,
                operator,
                pseudonym
            );
        } else {
            self.by_pseudonym
                .insert(pseudonym.clone(), operator.to_string());
        }

        self.by_operator
            .insert(operator.to_string(), self.order.len());
        self.order.push((operator.to_string(), pseudonym.clone()));
        Ok(pseudonym)
    }

    /// `(operator_id, pseudonym)` pairs in first-seen order.
    pub fn mapping(&self) -> &[(String, String)] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
