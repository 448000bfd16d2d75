/// Profile enrichment for a lead
///
/// Two calls per lead:
/// 1. Search the lead's display name and pick the profile link out of the answer
/// 2. Scrape that profile and strip the fields nobody reads
use crate::config::{ApiKeys, ServiceEndpoints};
use crate::errors::PipelineError;
use crate::models::ProfileDocument;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

/// Top-level keys dropped from every scraped profile.
pub const NOISY_PROFILE_FIELDS: [&str; 2] = ["people_also_viewed", "certifications"];

/// Per-group key dropped from every entry of `groups`.
pub const GROUP_IMAGE_FIELD: &str = "profile_pic_url";

/// One tier of the search answer: where to look, and how to read it.
pub struct ExtractorRule {
    pub name: &'static str,
    pub extract: fn(&Value) -> Option<String>,
}

fn string_at(res: &Value, pointer: &str) -> Option<String> {
    res.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn answer(res: &Value) -> Option<String> {
    string_at(res, "/answer_box/answer")
}

fn snippet(res: &Value) -> Option<String> {
    string_at(res, "/answer_box/snippet")
}

fn snippet_highlighted_word(res: &Value) -> Option<String> {
    string_at(res, "/answer_box/snippet_highlighted_words/0")
}

fn game_spotlight(res: &Value) -> Option<String> {
    string_at(res, "/sports_results/game_spotlight")
}

fn knowledge_graph_description(res: &Value) -> Option<String> {
    string_at(res, "/knowledge_graph/description")
}

fn first_organic_link(res: &Value) -> Option<String> {
    let first = res.pointer("/organic_results/0")?;
    // Only results that come with a snippet are trusted.
    first.get("snippet")?;
    string_at(first, "/link")
}

/// Search answer tiers, highest precedence first. The first tier whose text
/// holds a link wins.
pub const EXTRACTOR_RULES: [ExtractorRule; 6] = [
    ExtractorRule {
        name: "answer_box.answer",
        extract: answer,
    },
    ExtractorRule {
        name: "answer_box.snippet",
        extract: snippet,
    },
    ExtractorRule {
        name: "answer_box.snippet_highlighted_words",
        extract: snippet_highlighted_word,
    },
    ExtractorRule {
        name: "sports_results.game_spotlight",
        extract: game_spotlight,
    },
    ExtractorRule {
        name: "knowledge_graph.description",
        extract: knowledge_graph_description,
    },
    ExtractorRule {
        name: "organic_results.link",
        extract: first_organic_link,
    },
];

/// Picks the profile link out of a search response.
///
/// Tiers are tried in [`EXTRACTOR_RULES`] order. A tier that is present but
/// holds no link (a prose description, say) falls through to the next one.
/// Returns `Err(SearchService)` when the service put an `error` in the body and
/// `Ok(None)` when no tier yields a link.
pub fn extract_profile_link(res: &Value) -> Result<Option<String>, PipelineError> {
    if let Some(error) = res.get("error") {
        let message = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(PipelineError::SearchService(format!(
            "Got error from SerpAPI: {}",
            message
        )));
    }

    for rule in &EXTRACTOR_RULES {
        let Some(text) = (rule.extract)(res) else {
            continue;
        };
        match profile_link(&text) {
            Some(link) => {
                tracing::debug!("Profile link taken from {}", rule.name);
                return Ok(Some(link));
            }
            None => tracing::debug!("{} has no link, trying next tier", rule.name),
        }
    }

    Ok(None)
}

fn link_regex() -> &'static Regex {
    static LINK: OnceLock<Regex> = OnceLock::new();
    LINK.get_or_init(|| Regex::new(r#"https?://[^\s"'<>()\[\]]+"#).expect("valid link regex"))
}

/// First plausible profile link in an answer text.
///
/// LinkedIn links win over any other link in the same text.
pub fn profile_link(text: &str) -> Option<String> {
    let links: Vec<String> = link_regex()
        .find_iter(text)
        .map(|m| {
            m.as_str()
                .trim_end_matches(|c| matches!(c, '.' | ',' | ';' | ':' | '!' | '?'))
                .to_string()
        })
        .filter(|candidate| url::Url::parse(candidate).is_ok())
        .collect();

    links
        .iter()
        .find(|link| link.contains("linkedin.com"))
        .or_else(|| links.first())
        .cloned()
}

/// Strips empty and noisy fields from a raw scraped profile.
///
/// Keys whose value is null, `""` or `[]` are dropped, as are
/// [`NOISY_PROFILE_FIELDS`]. Each entry of `groups` loses [`GROUP_IMAGE_FIELD`].
pub fn filter_profile(raw: serde_json::Map<String, Value>) -> ProfileDocument {
    let mut profile: ProfileDocument = raw
        .into_iter()
        .filter(|(key, value)| {
            !NOISY_PROFILE_FIELDS.contains(&key.as_str()) && !is_empty_value(value)
        })
        .collect();

    if let Some(Value::Array(groups)) = profile.get_mut("groups") {
        for group in groups.iter_mut() {
            if let Value::Object(group) = group {
                group.remove(GROUP_IMAGE_FIELD);
            }
        }
    }

    profile
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Client for the search and scraping services.
#[derive(Clone)]
pub struct EnrichmentClient {
    client: Client,
    search_base_url: String,
    scrape_base_url: String,
    search_api_key: String,
    scrape_api_key: String,
}

impl EnrichmentClient {
    pub fn new(keys: &ApiKeys, endpoints: &ServiceEndpoints) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                PipelineError::SearchService(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            search_base_url: endpoints.serpapi_base_url.trim_end_matches('/').to_string(),
            scrape_base_url: endpoints
                .proxycurl_base_url
                .trim_end_matches('/')
                .to_string(),
            search_api_key: keys.serpapi.clone(),
            scrape_api_key: keys.proxycurl.clone(),
        })
    }

    /// Resolves a lead's public profile URL from its display name.
    pub async fn lookup_profile_url(&self, display_name: &str) -> Result<String, PipelineError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/search", self.search_base_url),
            &[
                ("engine", "google"),
                ("q", display_name),
                ("api_key", self.search_api_key.as_str()),
            ],
        )
        .map_err(|e| PipelineError::SearchService(format!("Failed to build URL: {}", e)))?;

        tracing::info!("Searching profile for: {}", display_name);
        tracing::debug!(
            "SerpAPI URL: {}/search?engine=google&q={}&api_key=[REDACTED]",
            self.search_base_url,
            display_name
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::SearchService(format!("SerpAPI request failed: {}", e)))?;

        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            PipelineError::SearchService(format!("Failed to parse SerpAPI response: {}", e))
        })?;

        // Errors come back in the body, usually alongside a non-success status.
        let link = extract_profile_link(&body)?;
        if !status.is_success() {
            return Err(PipelineError::SearchService(format!(
                "SerpAPI returned status {}",
                status
            )));
        }

        link.ok_or_else(|| {
            tracing::warn!("No search tier for '{}' holds a link", display_name);
            PipelineError::NoResult(display_name.to_string())
        })
    }

    /// Scrapes a profile and returns it filtered.
    pub async fn fetch_profile(&self, profile_url: &str) -> Result<ProfileDocument, PipelineError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/proxycurl/api/v2/linkedin", self.scrape_base_url),
            &[("url", profile_url)],
        )
        .map_err(|e| PipelineError::ScrapeService(format!("Failed to build URL: {}", e)))?;

        tracing::info!("Scraping profile: {}", profile_url);

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.scrape_api_key))
            .send()
            .await
            .map_err(|e| {
                PipelineError::ScrapeService(format!("Proxycurl request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Proxycurl returned error {}: {}", status, error_text);
            return Err(PipelineError::ScrapeService(format!(
                "Proxycurl returned status {}: {}",
                status, error_text
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            PipelineError::ScrapeService(format!("Failed to parse Proxycurl response: {}", e))
        })?;

        match body {
            Value::Object(raw) => Ok(filter_profile(raw)),
            other => Err(PipelineError::ScrapeService(format!(
                "Expected a JSON object from Proxycurl, got: {}",
                other
            ))),
        }
    }
}
