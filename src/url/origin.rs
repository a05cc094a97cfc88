use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use url::Url;

/// The unit of politeness: scheme, host and port of an address
///
/// The port is always explicit, so `http://a.test/` and `http://a.test:80/`
/// share one origin while `http://a.test:8080/` is a different one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Origin {
    scheme: String,
    host: String,
    port: u16,
}

impl Origin {
    /// Derives the origin of a URL
    ///
    /// Returns None for URLs without a host or without a known port.
    ///
    /// # Examples
    ///
    /// ```
    /// use url::Url;
    /// use omnivore_crawler::url::Origin;
    ///
    /// let url = Url::parse("https://Example.com/path").unwrap();
    /// let origin = Origin::from_url(&url).unwrap();
    /// assert_eq!(origin.to_string(), "https://example.com");
    /// assert_eq!(origin.port(), 443);
    /// ```
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?.to_lowercase();
        let port = url.port_or_known_default()?;
        Some(Self {
            scheme: url.scheme().to_lowercase(),
            host,
            port,
        })
    }

    /// Parses an origin from a string such as `https://example.com:8443`
    ///
    /// Any path, query or fragment is ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let url = Url::parse(s.trim()).ok()?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return None;
        }
        Self::from_url(&url)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn is_default_port(&self) -> bool {
        matches!(
            (self.scheme.as_str(), self.port),
            ("http", 80) | ("https", 443)
        )
    }

    /// Location of this origin's robots exclusion file
    pub fn robots_url(&self) -> Option<Url> {
        Url::parse(&format!("{}/robots.txt", self)).ok()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default_port() {
            write!(f, "{}://{}", self.scheme, self.host)
        } else {
            write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
        }
    }
}

impl Serialize for Origin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Origin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Origin::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid origin '{}'", s)))
    }
}
