// HTTP client for the Airbnb web front end

use airbnb_mcp_core::config::AirbnbSection;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

/// Fetches Airbnb pages. One instance is shared by every tool.
pub struct AirbnbClient {
    http: reqwest::Client,
    base_url: Url,
    user_agent: String,
}

impl AirbnbClient {
    pub fn new(config: &AirbnbSection) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid Airbnb base URL: {}", config.base_url))?;

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url,
            user_agent: config.user_agent.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Build `{base}/{segments...}`, percent-encoding each segment.
    pub fn url_for(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Base URL cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET a page and return its body. Non-2xx statuses are errors.
    pub async fn fetch_text(&self, url: &Url) -> Result<String> {
        tracing::debug!(url = %url, "Fetching page");

        let response = self
            .http
            .get(url.as_str())
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Cache-Control", "no-cache")
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("{url} responded with HTTP {status}"));
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {url}"))
    }
}

fn deferred_state_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)<script[^>]*\bid="data-deferred-state-0"[^>]*>(.*?)</script>"#)
            .expect("deferred state pattern is valid")
    })
}

/// Extract the client data tree Airbnb embeds in
/// `<script id="data-deferred-state-0">`: `niobeClientData[0][1]`.
pub fn extract_client_data(html: &str) -> Result<Value> {
    let script = deferred_state_pattern()
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| anyhow!("Page did not contain the data-deferred-state-0 script"))?;

    let state: Value =
        serde_json::from_str(script.trim()).context("Failed to parse embedded page state")?;

    state
        .pointer("/niobeClientData/0/1")
        .cloned()
        .ok_or_else(|| anyhow!("Embedded page state has no niobeClientData entry"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(base: &str) -> AirbnbClient {
        AirbnbClient::new(&AirbnbSection {
            base_url: base.to_string(),
            ..AirbnbSection::default()
        })
        .unwrap()
    }

    #[test]
    fn test_url_for_encodes_segments() {
        let client = client("https://www.airbnb.com");
        let url = client.url_for(&["s", "New York, NY", "homes"]).unwrap();
        assert_eq!(url.as_str(), "https://www.airbnb.com/s/New%20York,%20NY/homes");

        let url = client.url_for(&["rooms", "42"]).unwrap();
        assert_eq!(url.path(), "/rooms/42");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = AirbnbClient::new(&AirbnbSection {
            base_url: "not a url".to_string(),
            ..AirbnbSection::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_extract_client_data() {
        let html = r#"<html><head></head><body>
            <script id="data-deferred-state-0" data-deferred-state-0="true" type="application/json">
            {"niobeClientData":[["StaysSearch",{"data":{"presentation":{"ok":true}}}]]}
            </script></body></html>"#;

        let data = extract_client_data(html).unwrap();
        assert_eq!(data, json!({"data": {"presentation": {"ok": true}}}));
    }

    #[test]
    fn test_extract_client_data_missing_script() {
        let err = extract_client_data("<html><body>Nothing here</body></html>").unwrap_err();
        assert!(err.to_string().contains("data-deferred-state-0"));
    }

    #[test]
    fn test_extract_client_data_bad_json() {
        let html = r#"<script id="data-deferred-state-0">{broken</script>"#;
        assert!(extract_client_data(html).is_err());
    }
}
