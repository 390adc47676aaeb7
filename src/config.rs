use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::RvarError;
use crate::retry::RetryPolicy;
use crate::topics::TopicFilter;

pub const DEFAULT_CONFIG_FILE: &str = "rvar-data.json";
pub const DEFAULT_REFERENCE_PREFIX: &str = "pubmed/";
pub const DEFAULT_EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
pub const DEFAULT_KEYWORDS_GATEWAY: &str = "http://api.zemanta.com/services/rest/0.0/";
pub const DEFAULT_RDF_PREFIX: &str = "http://rdf.freebase.com/ns";
pub const DEFAULT_TOPICS_BASE: &str = "http://www.freebase.com/experimental/topic/standard";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub reference_prefix: Option<String>,
    #[serde(default)]
    pub accept_topics: Option<Vec<String>>,
    #[serde(default)]
    pub avoid_topics: Option<Vec<String>>,
    #[serde(default)]
    pub backoff_secs: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub cache_file: Option<String>,
    #[serde(default)]
    pub pubmed: PubmedEntry,
    #[serde(default)]
    pub keywords: KeywordsEntry,
    #[serde(default)]
    pub topics: TopicsEntry,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PubmedEntry {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct KeywordsEntry {
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub markup_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TopicsEntry {
    #[serde(default)]
    pub rdf_prefix: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PubmedSettings {
    pub base_url: String,
    pub email: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct KeywordSettings {
    pub gateway: String,
    pub api_key: Option<String>,
    pub markup_limit: u32,
}

#[derive(Debug, Clone)]
pub struct TopicSettings {
    pub rdf_prefix: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub reference_prefix: String,
    pub topic_filter: TopicFilter,
    pub retry: RetryPolicy,
    pub cache_file: Option<Utf8PathBuf>,
    pub pubmed: PubmedSettings,
    pub keywords: KeywordSettings,
    pub topics: TopicSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `rvar-data.json` when present; defaults apply otherwise.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, RvarError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| RvarError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| RvarError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, RvarError> {
        let reference_prefix = config
            .reference_prefix
            .unwrap_or_else(|| DEFAULT_REFERENCE_PREFIX.to_string());
        if reference_prefix.trim().is_empty() {
            return Err(RvarError::ConfigParse(
                "reference_prefix must not be empty".to_string(),
            ));
        }

        let accept = config.accept_topics.unwrap_or_else(default_accept_topics);
        let avoid = config.avoid_topics.unwrap_or_else(default_avoid_topics);
        let topic_filter = TopicFilter::new(
            accept.into_iter().collect::<BTreeSet<_>>(),
            avoid.into_iter().collect::<BTreeSet<_>>(),
        );

        let backoff = Duration::from_secs(config.backoff_secs.unwrap_or(5));
        let retry = match config.max_attempts {
            Some(0) => {
                return Err(RvarError::ConfigParse(
                    "max_attempts must be at least 1".to_string(),
                ));
            }
            Some(max) => RetryPolicy::bounded(backoff, max),
            None => RetryPolicy::unbounded(backoff),
        };

        let pubmed = PubmedSettings {
            base_url: config
                .pubmed
                .base_url
                .unwrap_or_else(|| DEFAULT_EUTILS_BASE.to_string()),
            email: non_empty(config.pubmed.email),
            api_key: non_empty(config.pubmed.api_key).or_else(|| env_value("NCBI_API_KEY")),
        };
        let keywords = KeywordSettings {
            gateway: config
                .keywords
                .gateway
                .unwrap_or_else(|| DEFAULT_KEYWORDS_GATEWAY.to_string()),
            api_key: non_empty(config.keywords.api_key)
                .or_else(|| env_value("KEYWORDS_API_KEY")),
            markup_limit: config.keywords.markup_limit.unwrap_or(25),
        };
        let topics = TopicSettings {
            rdf_prefix: config
                .topics
                .rdf_prefix
                .unwrap_or_else(|| DEFAULT_RDF_PREFIX.to_string()),
            base_url: config
                .topics
                .base_url
                .unwrap_or_else(|| DEFAULT_TOPICS_BASE.to_string()),
        };

        Ok(ResolvedConfig {
            reference_prefix,
            topic_filter,
            retry,
            cache_file: config.cache_file.map(Utf8PathBuf::from),
            pubmed,
            keywords,
            topics,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_value(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

pub fn default_accept_topics() -> Vec<String> {
    [
        "medicine",
        "biology",
        "measurement_unit",
        "education",
        "chemistry",
        "award",
        "physics",
    ]
    .iter()
    .map(|topic| topic.to_string())
    .collect()
}

pub fn default_avoid_topics() -> Vec<String> {
    [
        "location",
        "organization",
        "business",
        "book",
        "freebase",
        "internet",
        "aviation",
        "computer",
        "people",
        "fictional_universe",
        "law",
        "geography",
        "religion",
        "architecture",
        "language",
        "sports",
        "baseball",
        "metropolitan_transit",
        "media_common",
        "film",
        "event",
        "transportation",
        "food",
        "finance",
        "spaceflight",
    ]
    .iter()
    .map(|topic| topic.to_string())
    .collect()
}
