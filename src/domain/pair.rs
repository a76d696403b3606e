//! Currency pair representation shared by orders, filters and configuration.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Delimiters recognised when parsing a pair from a string.
const DELIMITERS: [char; 3] = ['/', '-', '_'];

/// Error returned when a pair string cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid currency pair: {0}")]
pub struct PairParseError(pub String);

/// Pair is a base/quote currency pair, e.g. BTC/USDT.
///
/// Comparison and hashing are case-insensitive on the currency codes and
/// ignore the delimiter, so "btc-usdt" and "BTC/USDT" refer to the same
/// market.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pair {
    base: String,
    quote: String,
    delimiter: char,
}

impl Pair {
    /// Creates a pair from base and quote currency codes with the default
    /// "/" delimiter.
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
            delimiter: '/',
        }
    }

    /// Sets the delimiter used when formatting the pair.
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Base currency code, upper-cased.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Quote currency code, upper-cased.
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// True when either currency code is missing.
    pub fn is_empty(&self) -> bool {
        self.base.is_empty() || self.quote.is_empty()
    }
}

impl PartialEq for Pair {
    fn eq(&self, other: &Self) -> bool {
        self.base.eq_ignore_ascii_case(&other.base)
            && self.quote.eq_ignore_ascii_case(&other.quote)
    }
}

impl Eq for Pair {}

impl Hash for Pair {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.base.to_ascii_uppercase().hash(state);
        self.quote.to_ascii_uppercase().hash(state);
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.base, self.delimiter, self.quote)
    }
}

impl FromStr for Pair {
    type Err = PairParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let delimiter = s
            .chars()
            .find(|c| DELIMITERS.contains(c))
            .ok_or_else(|| PairParseError(s.to_string()))?;
        let (base, quote) = s
            .split_once(delimiter)
            .ok_or_else(|| PairParseError(s.to_string()))?;
        if base.is_empty() || quote.is_empty() {
            return Err(PairParseError(s.to_string()));
        }
        Ok(Self::new(base, quote).with_delimiter(delimiter))
    }
}

impl TryFrom<String> for Pair {
    type Error = PairParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Pair> for String {
    fn from(p: Pair) -> Self {
        p.to_string()
    }
}
