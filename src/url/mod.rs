//! URL handling for the crawl engine
//!
//! This module provides address normalization and the two identities the
//! engine works with: [`Address`], the unit of visitation, and [`Origin`], the
//! unit of politeness.

mod normalize;
mod origin;

pub use normalize::{normalize_parsed, normalize_url};
pub use origin::Origin;

use crate::{UrlError, UrlResult};
use serde::{Serialize, Serializer};
use std::fmt;
use url::Url;

/// A normalized absolute http(s) URL
///
/// Two inputs that normalize to the same string are the same node of the link
/// graph. An `Address` can only be built through normalization, so holding
/// one guarantees the invariant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    url: Url,
    origin: Origin,
}

impl Address {
    /// Parses and normalizes an absolute URL string
    ///
    /// # Examples
    ///
    /// ```
    /// use omnivore_crawler::url::Address;
    ///
    /// let a = Address::parse("HTTPS://Example.com/docs/#intro").unwrap();
    /// let b = Address::parse("https://example.com/docs").unwrap();
    /// assert_eq!(a, b);
    /// ```
    pub fn parse(s: &str) -> UrlResult<Self> {
        Self::from_normalized(normalize_url(s)?)
    }

    /// Resolves a possibly relative reference against this address
    pub fn join(&self, reference: &str) -> UrlResult<Self> {
        let joined = self
            .url
            .join(reference)
            .map_err(|e| UrlError::Parse(e.to_string()))?;
        Self::from_url(joined)
    }

    /// Normalizes an already parsed URL
    pub fn from_url(url: Url) -> UrlResult<Self> {
        Self::from_normalized(normalize_parsed(url)?)
    }

    fn from_normalized(url: Url) -> UrlResult<Self> {
        let origin = Origin::from_url(&url).ok_or(UrlError::MissingHost)?;
        Ok(Self { url, origin })
    }

    pub fn as_url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// The origin this address belongs to
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Path and query, as matched against robots.txt rules
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.url.as_str())
    }
}
