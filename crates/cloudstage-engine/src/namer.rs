//! Collision-free names for derived resources
//!
//! Appends a random base-36 suffix to a base name (`app1` -> `app1.k3x9q0zd`)
//! and checks it against what already exists. Eight base-36 characters give
//! about 2^41 combinations, so a retry is rare and the retry cap is only
//! there to guarantee termination.

use crate::error::{ProvisionError, Result};
use cloudstage_provider::{ResourceKind, ResourceProvider};
use rand::Rng;
use std::collections::HashSet;
use tracing::debug;

pub const BASE36: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

const DEFAULT_SUFFIX_LEN: usize = 8;
const DEFAULT_MAX_ATTEMPTS: u32 = 20;

#[derive(Debug, Clone)]
pub struct UniqueNamer {
    alphabet: Vec<char>,
    suffix_len: usize,
    max_attempts: u32,
    separator: String,
}

impl Default for UniqueNamer {
    fn default() -> Self {
        Self {
            alphabet: BASE36.chars().collect(),
            suffix_len: DEFAULT_SUFFIX_LEN,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            separator: ".".to_string(),
        }
    }
}

impl UniqueNamer {
    pub fn new(alphabet: &str, suffix_len: usize, max_attempts: u32) -> Result<Self> {
        let alphabet: Vec<char> = alphabet.chars().collect();
        if alphabet.is_empty() {
            return Err(ProvisionError::validation("name alphabet must not be empty"));
        }
        if suffix_len == 0 {
            return Err(ProvisionError::validation("name suffix length must be at least 1"));
        }
        if max_attempts == 0 {
            return Err(ProvisionError::validation("naming needs at least one attempt"));
        }
        Ok(Self {
            alphabet,
            suffix_len,
            max_attempts,
            separator: ".".to_string(),
        })
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn candidate(&self, base: &str, rng: &mut impl Rng) -> String {
        let suffix: String = (0..self.suffix_len)
            .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())])
            .collect();
        format!("{}{}{}", base, self.separator, suffix)
    }

    /// Generate a name for which `is_taken` returns false.
    ///
    /// Fails with [`ProvisionError::NamingExhausted`] once the retry cap is
    /// hit.
    pub fn generate(&self, base: &str, mut is_taken: impl FnMut(&str) -> bool) -> Result<String> {
        let mut rng = rand::thread_rng();
        for attempt in 1..=self.max_attempts {
            let name = self.candidate(base, &mut rng);
            if !is_taken(&name) {
                return Ok(name);
            }
            debug!(base, attempt, candidate = %name, "generated name already taken");
        }
        Err(ProvisionError::NamingExhausted {
            base: base.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Generate a name that no live resource of `kind` currently uses
    pub async fn unique_name(
        &self,
        provider: &dyn ResourceProvider,
        kind: ResourceKind,
        base: &str,
    ) -> Result<String> {
        let existing = existing_names(provider, kind).await?;
        self.generate(base, |candidate| existing.contains(candidate))
    }
}

pub(crate) async fn existing_names(
    provider: &dyn ResourceProvider,
    kind: ResourceKind,
) -> Result<HashSet<String>> {
    Ok(provider
        .list(kind)
        .await?
        .into_iter()
        .map(|state| state.name)
        .collect())
}
