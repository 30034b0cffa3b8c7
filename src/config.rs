//! Environment configuration

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CouncilError, Result};

const DEFAULT_OPENAI_API_VERSION: &str = "2024-08-01-preview";
const DEFAULT_SEARCH_API_VERSION: &str = "2024-07-01";
const DEFAULT_BIND: &str = "0.0.0.0:8000";
const DEFAULT_MAX_ROUNDS: usize = 10;
const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_TOP_K: usize = 3;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// How a `/chat` request is orchestrated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationMode {
    /// Model-driven group chat with a summarizing manager
    GroupChat,
    /// Group chat where participants speak in registry order
    RoundRobin,
    /// All agents answer in parallel
    Concurrent,
    /// Agents run one after another, each refining the previous answer
    Sequential,
}

impl FromStr for OrchestrationMode {
    type Err = CouncilError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "group_chat" | "groupchat" => Ok(Self::GroupChat),
            "round_robin" | "roundrobin" => Ok(Self::RoundRobin),
            "concurrent" => Ok(Self::Concurrent),
            "sequential" => Ok(Self::Sequential),
            other => Err(CouncilError::Config(format!(
                "unknown orchestration mode: {other}"
            ))),
        }
    }
}

/// Azure OpenAI chat-completion settings
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
}

/// Azure AI Search settings
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
}

/// Full service configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub completion: CompletionSettings,
    /// None when no search service is configured; agents fall back to static data
    pub search: Option<SearchSettings>,
    pub bind: SocketAddr,
    pub mode: OrchestrationMode,
    pub max_rounds: usize,
    pub agent_timeout: Duration,
    /// Bound on every outbound completion or search call
    pub request_timeout: Duration,
    pub top_k: usize,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| CouncilError::Config(format!("{key} is not set")))
        };

        let completion = CompletionSettings {
            endpoint: require("AZURE_OPENAI_ENDPOINT")?,
            api_key: require("AZURE_OPENAI_KEY")?,
            deployment: require("AZURE_OPENAI_DEPLOYMENT")?,
            api_version: get("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_OPENAI_API_VERSION.to_string()),
        };

        let search = match get("AZURE_SEARCH_ENDPOINT") {
            Some(endpoint) => Some(SearchSettings {
                endpoint,
                api_key: require("AZURE_SEARCH_KEY")?,
                api_version: get("AZURE_SEARCH_API_VERSION")
                    .unwrap_or_else(|| DEFAULT_SEARCH_API_VERSION.to_string()),
            }),
            None => None,
        };

        let bind = parse_or("COUNCIL_BIND", get("COUNCIL_BIND"), || {
            DEFAULT_BIND.parse::<SocketAddr>().map_err(|e| e.to_string())
        })?;
        let mode = match get("COUNCIL_MODE") {
            Some(raw) => raw.parse()?,
            None => OrchestrationMode::GroupChat,
        };
        let max_rounds = parse_or("COUNCIL_MAX_ROUNDS", get("COUNCIL_MAX_ROUNDS"), || {
            Ok(DEFAULT_MAX_ROUNDS)
        })?;
        let timeout_secs = parse_or(
            "COUNCIL_AGENT_TIMEOUT_SECS",
            get("COUNCIL_AGENT_TIMEOUT_SECS"),
            || Ok(DEFAULT_AGENT_TIMEOUT_SECS),
        )?;
        let request_secs = parse_or(
            "COUNCIL_REQUEST_TIMEOUT_SECS",
            get("COUNCIL_REQUEST_TIMEOUT_SECS"),
            || Ok(DEFAULT_REQUEST_TIMEOUT_SECS),
        )?;
        let top_k = parse_or("COUNCIL_TOP_K", get("COUNCIL_TOP_K"), || Ok(DEFAULT_TOP_K))?;

        Ok(Self {
            completion,
            search,
            bind,
            mode,
            max_rounds,
            agent_timeout: Duration::from_secs(timeout_secs),
            request_timeout: Duration::from_secs(request_secs),
            top_k,
        })
    }

    /// Shared HTTP client for the completion and search services
    pub fn http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()?)
    }
}

fn parse_or<T, D>(key: &str, raw: Option<String>, default: D) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    D: FnOnce() -> std::result::Result<T, String>,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| CouncilError::Config(format!("{key}: {e}"))),
        None => default().map_err(|e| CouncilError::Config(format!("{key}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com"),
        ("AZURE_OPENAI_KEY", "secret"),
        ("AZURE_OPENAI_DEPLOYMENT", "gpt-4o"),
    ];

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(settings.mode, OrchestrationMode::GroupChat);
        assert_eq!(settings.max_rounds, 10);
        assert_eq!(settings.agent_timeout, Duration::from_secs(20));
        assert_eq!(settings.top_k, 3);
        assert_eq!(settings.request_timeout, Duration::from_secs(60));
        assert_eq!(settings.bind.port(), 8000);
        assert!(settings.search.is_none());
        assert_eq!(settings.completion.api_version, DEFAULT_OPENAI_API_VERSION);
    }

    #[test]
    fn test_missing_required_key() {
        let err = Settings::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(err.to_string().contains("AZURE_OPENAI_DEPLOYMENT"));
    }

    #[test]
    fn test_search_requires_key() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("AZURE_SEARCH_ENDPOINT", "https://example.search.windows.net"));
        let err = Settings::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("AZURE_SEARCH_KEY"));

        pairs.push(("AZURE_SEARCH_KEY", "search-secret"));
        let settings = Settings::from_lookup(lookup(&pairs)).unwrap();
        let search = settings.search.unwrap();
        assert_eq!(search.api_version, DEFAULT_SEARCH_API_VERSION);
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("COUNCIL_MODE", "Concurrent"),
            ("COUNCIL_MAX_ROUNDS", "4"),
            ("COUNCIL_AGENT_TIMEOUT_SECS", "5"),
            ("COUNCIL_BIND", "127.0.0.1:9000"),
            ("COUNCIL_REQUEST_TIMEOUT_SECS", "15"),
        ]);
        let settings = Settings::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(settings.mode, OrchestrationMode::Concurrent);
        assert_eq!(settings.max_rounds, 4);
        assert_eq!(settings.agent_timeout, Duration::from_secs(5));
        assert_eq!(settings.bind.port(), 9000);
        assert_eq!(settings.request_timeout, Duration::from_secs(15));
        assert!(settings.http_client().is_ok());
    }

    #[test]
    fn test_bad_number_is_config_error() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("COUNCIL_MAX_ROUNDS", "many"));
        let err = Settings::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, CouncilError::Config(_)));
    }

    #[test]
    fn test_unknown_mode() {
        assert!("handoff".parse::<OrchestrationMode>().is_err());
        assert_eq!(
            "round_robin".parse::<OrchestrationMode>().unwrap(),
            OrchestrationMode::RoundRobin
        );
    }
}
