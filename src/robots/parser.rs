//! Robots.txt parser implementation
//!
//! Allow/Disallow matching is delegated to the robotstxt crate; Crawl-delay,
//! which that crate does not expose, is parsed here.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Parsed robots.txt data for one origin
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content
    content: String,
    /// Whether every path is allowed regardless of content
    allow_all: bool,
}

impl ParsedRobots {
    /// Wraps raw robots.txt content
    ///
    /// Content that cannot be interpreted as rules matches nothing, which the
    /// matcher treats as "allow".
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: content.trim().is_empty(),
        }
    }

    /// A ruleset that allows everything
    ///
    /// Used when robots.txt is absent, unreachable, or compliance is disabled.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    pub fn is_allow_all(&self) -> bool {
        self.allow_all
    }

    /// Checks whether `url` may be fetched by `user_agent`
    ///
    /// `url` should be the full absolute URL; the matcher extracts path and
    /// query itself. `user_agent` is the product token (e.g. "Omnivore").
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Gets the crawl delay that applies to `user_agent`
    ///
    /// A group naming the agent takes precedence over the `*` group. Agent
    /// names match case-insensitively as substrings of the given token.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        if self.allow_all {
            return None;
        }

        let normalized_agent = user_agent.to_lowercase();

        let mut group_agents: Vec<String> = Vec::new();
        // A User-agent line after any rule line starts a new group.
        let mut group_has_rules = false;

        let mut delay_for_wildcard: Option<f64> = None;
        let mut delay_for_agent: Option<f64> = None;

        for line in self.content.lines() {
            let line = match line.split_once('#') {
                Some((before, _)) => before,
                None => line,
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let Some((key, value)) = trimmed.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if group_has_rules {
                        group_agents.clear();
                        group_has_rules = false;
                    }
                    group_agents.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    group_has_rules = true;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if !delay.is_finite() || delay < 0.0 {
                        continue;
                    }

                    let names_agent = group_agents
                        .iter()
                        .any(|ua| ua != "*" && !ua.is_empty() && normalized_agent.contains(ua.as_str()));
                    if names_agent {
                        delay_for_agent = Some(delay);
                    } else if group_agents.iter().any(|ua| ua == "*") {
                        delay_for_wildcard = Some(delay);
                    }
                }
                _ => group_has_rules = true,
            }
        }

        delay_for_agent
            .or(delay_for_wildcard)
            .map(Duration::from_secs_f64)
    }
}
