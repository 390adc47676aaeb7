use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ResolvedConfig;
use crate::domain::ReferenceId;
use crate::error::{RvarError, Service};
use crate::keywords::KeywordClient;
use crate::literature::LiteratureClient;
use crate::retry::RetryPolicy;
use crate::topics::{TopicClient, TopicFilter, TopicInfo, Verdict, classification_url};

/// Keywords describing one literature reference.
pub trait KeywordSource {
    fn keywords(&mut self, id: &ReferenceId) -> Result<Vec<String>, RvarError>;
}

#[derive(Debug, Clone)]
pub struct RetrieverSettings {
    pub filter: TopicFilter,
    pub retry: RetryPolicy,
    pub rdf_prefix: String,
    pub topics_base: String,
}

impl RetrieverSettings {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            filter: config.topic_filter.clone(),
            retry: config.retry,
            rdf_prefix: config.topics.rdf_prefix.clone(),
            topics_base: config.topics.base_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LookupStats {
    pub article_fetches: usize,
    pub keyword_calls: usize,
    pub topic_lookups: usize,
    pub cache_hits: usize,
    pub dropped_keywords: usize,
    pub ambiguous_keywords: usize,
}

/// Article fetch, keyword extraction and topic filtering behind two memo caches:
/// reference id -> keywords, and classification URL -> topic info.
pub struct KeywordRetriever<L, K, T> {
    literature: L,
    extractor: K,
    topics: T,
    settings: RetrieverSettings,
    cache: HashMap<ReferenceId, Vec<String>>,
    topic_cache: HashMap<String, Option<TopicInfo>>,
    stats: LookupStats,
}

impl<L: LiteratureClient, K: KeywordClient, T: TopicClient> KeywordRetriever<L, K, T> {
    pub fn new(literature: L, extractor: K, topics: T, settings: RetrieverSettings) -> Self {
        Self {
            literature,
            extractor,
            topics,
            settings,
            cache: HashMap::new(),
            topic_cache: HashMap::new(),
            stats: LookupStats::default(),
        }
    }

    /// Preloads keyword results, e.g. from a previous run's on-disk cache.
    pub fn seed(&mut self, entries: HashMap<ReferenceId, Vec<String>>) {
        self.cache.extend(entries);
    }

    pub fn cache(&self) -> &HashMap<ReferenceId, Vec<String>> {
        &self.cache
    }

    pub fn stats(&self) -> LookupStats {
        self.stats
    }

    fn fetch_keywords(&mut self, id: &ReferenceId) -> Result<Vec<String>, RvarError> {
        let retry = self.settings.retry;
        let article = retry.run(Service::Literature, || self.literature.fetch_article(id))?;
        self.stats.article_fetches += 1;

        let text = article.text();
        let links = retry.run(Service::Keywords, || self.extractor.suggest(&text))?;
        self.stats.keyword_calls += 1;

        let mut keywords = Vec::with_capacity(links.len());
        for link in &links {
            let Some(keyword) = link.keyword() else {
                continue;
            };
            let url = classification_url(
                link,
                &self.settings.rdf_prefix,
                &self.settings.topics_base,
            );
            let info = match url {
                Some(url) => self.topic_info(&url)?,
                None => None,
            };
            let verdict = self.settings.filter.verdict(info.as_ref());
            if verdict == Verdict::Ambiguous {
                self.stats.ambiguous_keywords += 1;
                let types = info.map(|info| info.types).unwrap_or_default();
                warn!(
                    reference = %id,
                    keyword,
                    types = ?types,
                    "keyword topics outside accept/avoid sets, keeping for review"
                );
            }
            if verdict.keeps() {
                keywords.push(keyword.to_string());
            } else {
                self.stats.dropped_keywords += 1;
            }
        }
        Ok(keywords)
    }

    fn topic_info(&mut self, url: &str) -> Result<Option<TopicInfo>, RvarError> {
        if let Some(info) = self.topic_cache.get(url) {
            return Ok(info.clone());
        }
        let retry = self.settings.retry;
        let info = retry.run(Service::Topics, || self.topics.lookup(url))?;
        self.stats.topic_lookups += 1;
        self.topic_cache.insert(url.to_string(), info.clone());
        Ok(info)
    }
}

impl<L: LiteratureClient, K: KeywordClient, T: TopicClient> KeywordSource
    for KeywordRetriever<L, K, T>
{
    fn keywords(&mut self, id: &ReferenceId) -> Result<Vec<String>, RvarError> {
        if let Some(hit) = self.cache.get(id) {
            self.stats.cache_hits += 1;
            debug!(reference = %id, "keyword cache hit");
            return Ok(hit.clone());
        }
        let keywords = self.fetch_keywords(id)?;
        self.cache.insert(id.clone(), keywords.clone());
        Ok(keywords)
    }
}

impl<S: KeywordSource + ?Sized> KeywordSource for &mut S {
    fn keywords(&mut self, id: &ReferenceId) -> Result<Vec<String>, RvarError> {
        (**self).keywords(id)
    }
}
