// robots.txt policy for outbound Airbnb requests

use crate::tools::client::AirbnbClient;
use anyhow::{Context, Result};
use std::sync::{Arc, OnceLock};
use url::Url;

pub const ROBOTS_DISALLOWED_MESSAGE: &str = "This path is disallowed by Airbnb's robots.txt to this User-agent. You may or may not want to run the server with '--ignore-robots-txt' args";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    allow: bool,
    pattern: String,
}

#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

/// Parsed robots.txt
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    groups: Vec<Group>,
}

impl RobotsRules {
    pub fn parse(text: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut collecting_agents = false;

        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !collecting_agents {
                        groups.push(Group::default());
                        collecting_agents = true;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                }
                "allow" | "disallow" => {
                    collecting_agents = false;
                    // An empty Disallow grants everything; it adds no rule.
                    if value.is_empty() {
                        continue;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.rules.push(Rule {
                            allow: key == "allow",
                            pattern: value.to_string(),
                        });
                    }
                }
                _ => collecting_agents = false,
            }
        }

        Self { groups }
    }

    /// Check a path (with optional query) for the given user agent.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let token = product_token(user_agent);

        let specific: Vec<&Group> = self
            .groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| a != "*" && !a.is_empty() && token.contains(a.as_str())))
            .collect();

        let applicable = if specific.is_empty() {
            self.groups
                .iter()
                .filter(|g| g.agents.iter().any(|a| a == "*"))
                .collect()
        } else {
            specific
        };

        let mut best: Option<(usize, bool)> = None;
        for rule in applicable.iter().flat_map(|g| g.rules.iter()) {
            if !pattern_matches(&rule.pattern, path) {
                continue;
            }
            let len = rule.pattern.len();
            best = match best {
                Some((best_len, best_allow)) if best_len > len || (best_len == len && best_allow) => {
                    Some((best_len, best_allow))
                }
                _ => Some((len, rule.allow)),
            };
        }

        best.map(|(_, allow)| allow).unwrap_or(true)
    }
}

/// Lowercased product token of a user agent: `Foo/1.0 (...)` -> `foo`
fn product_token(user_agent: &str) -> String {
    user_agent
        .split(['/', ' '])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Prefix match with `*` wildcards and an optional trailing `$` anchor.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(stripped) => (stripped, true),
        None => (pattern, false),
    };

    let parts: Vec<&str> = pattern.split('*').collect();
    let Some(rest) = path.strip_prefix(parts[0]) else {
        return false;
    };
    let mut rest = rest;

    let last = parts.len() - 1;
    for (i, part) in parts.iter().enumerate().skip(1) {
        if i == last && anchored {
            return rest.ends_with(part);
        }
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }

    !anchored || rest.is_empty()
}

/// Decides whether a URL may be fetched. Rules are loaded once by
/// [`RobotsPolicy::prefetch`] before serving starts and never change after.
pub struct RobotsPolicy {
    client: Arc<AirbnbClient>,
    ignore_all: bool,
    rules: OnceLock<RobotsRules>,
}

impl RobotsPolicy {
    pub fn new(client: Arc<AirbnbClient>, ignore_all: bool) -> Self {
        Self {
            client,
            ignore_all,
            rules: OnceLock::new(),
        }
    }

    /// Build a policy with rules already loaded
    pub fn with_rules(client: Arc<AirbnbClient>, rules: RobotsRules) -> Self {
        let policy = Self::new(client, false);
        let _ = policy.rules.set(rules);
        policy
    }

    /// Fetch and parse `{base}/robots.txt`. Skipped when checks are disabled.
    pub async fn prefetch(&self) -> Result<()> {
        if self.ignore_all {
            tracing::info!("robots.txt checks disabled; skipping prefetch");
            return Ok(());
        }

        let url = self.client.url_for(&["robots.txt"])?;
        let text = self
            .client
            .fetch_text(&url)
            .await
            .context("Failed to fetch robots.txt")?;

        let rules = RobotsRules::parse(&text);
        tracing::info!(groups = rules.groups.len(), "Loaded robots.txt");
        let _ = self.rules.set(rules);

        Ok(())
    }

    /// `ignore_for_call` lets a single request opt out of the check.
    /// Without loaded rules every path is allowed.
    pub fn is_allowed(&self, url: &Url, ignore_for_call: bool) -> bool {
        if self.ignore_all || ignore_for_call {
            return true;
        }

        let Some(rules) = self.rules.get() else {
            return true;
        };

        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        let allowed = rules.is_allowed(self.client.user_agent(), &path);
        if !allowed {
            tracing::info!(path = %path, "Path disallowed by robots.txt");
        }
        allowed
    }
}
