#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use rvar_data::domain::ReferenceId;
use rvar_data::error::{RvarError, Service};
use rvar_data::keywords::{KeywordClient, KeywordLink, LinkTarget};
use rvar_data::literature::{Article, LiteratureClient};
use rvar_data::retriever::{KeywordRetriever, RetrieverSettings};
use rvar_data::retry::RetryPolicy;
use rvar_data::topics::{TopicClient, TopicFilter, TopicInfo};

pub const RDF_PREFIX: &str = "http://rdf.example/ns";
pub const TOPICS_BASE: &str = "http://topics.example/standard";

/// Returns `article <id>` as the title; counts fetches per id.
#[derive(Default)]
pub struct MockLiterature {
    pub calls: RefCell<HashMap<String, usize>>,
    pub failing: HashSet<String>,
    pub transient_failures: Cell<u32>,
}

impl MockLiterature {
    pub fn failing_on(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.borrow().get(id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.borrow().values().sum()
    }
}

impl LiteratureClient for &MockLiterature {
    fn fetch_article(&self, id: &ReferenceId) -> Result<Article, RvarError> {
        *self
            .calls
            .borrow_mut()
            .entry(id.as_str().to_string())
            .or_default() += 1;
        if self.transient_failures.get() > 0 {
            self.transient_failures.set(self.transient_failures.get() - 1);
            return Err(RvarError::ServiceUnavailable {
                service: Service::Literature,
                message: "connection reset".to_string(),
            });
        }
        if self.failing.contains(id.as_str()) {
            return Err(RvarError::ServiceStatus {
                service: Service::Literature,
                status: 400,
                message: "bad id".to_string(),
            });
        }
        Ok(Article {
            title: format!("article {}", id.as_str()),
            abstract_text: String::new(),
        })
    }
}

/// Keyword links per article text; an rdf target is added when a topic path is given.
#[derive(Default)]
pub struct MockExtractor {
    pub links: HashMap<String, Vec<(String, Option<String>)>>,
    pub calls: Cell<usize>,
    pub transient_failures: Cell<u32>,
}

impl MockExtractor {
    pub fn with(mut self, id: &str, keywords: &[(&str, Option<&str>)]) -> Self {
        self.links.insert(
            format!("article {id}"),
            keywords
                .iter()
                .map(|(kw, topic)| (kw.to_string(), topic.map(str::to_string)))
                .collect(),
        );
        self
    }
}

impl KeywordClient for &MockExtractor {
    fn suggest(&self, text: &str) -> Result<Vec<KeywordLink>, RvarError> {
        self.calls.set(self.calls.get() + 1);
        if self.transient_failures.get() > 0 {
            self.transient_failures.set(self.transient_failures.get() - 1);
            return Err(RvarError::ServiceUnavailable {
                service: Service::Keywords,
                message: "status 503: busy".to_string(),
            });
        }
        let entries = self.links.get(text).cloned().unwrap_or_default();
        Ok(entries
            .into_iter()
            .map(|(keyword, topic)| {
                let mut targets = vec![LinkTarget {
                    kind: "wikipedia".to_string(),
                    url: format!("http://wiki.example/{keyword}"),
                    title: keyword.clone(),
                }];
                if let Some(topic) = topic {
                    targets.push(LinkTarget {
                        kind: "rdf".to_string(),
                        url: format!("{RDF_PREFIX}{topic}"),
                        title: keyword.clone(),
                    });
                }
                KeywordLink { targets }
            })
            .collect())
    }
}

/// Topic info per lookup URL.
#[derive(Default)]
pub struct MockTopics {
    pub infos: HashMap<String, TopicInfo>,
    pub calls: RefCell<HashMap<String, usize>>,
    pub transient_failures: Cell<u32>,
}

impl MockTopics {
    pub fn with(mut self, path: &str, types: &[&str]) -> Self {
        self.infos.insert(
            format!("{TOPICS_BASE}{path}"),
            TopicInfo {
                types: types.iter().map(|t| t.to_string()).collect(),
            },
        );
        self
    }

    pub fn total_calls(&self) -> usize {
        self.calls.borrow().values().sum()
    }
}

impl TopicClient for &MockTopics {
    fn lookup(&self, url: &str) -> Result<Option<TopicInfo>, RvarError> {
        *self.calls.borrow_mut().entry(url.to_string()).or_default() += 1;
        if self.transient_failures.get() > 0 {
            self.transient_failures.set(self.transient_failures.get() - 1);
            return Err(RvarError::ServiceUnavailable {
                service: Service::Topics,
                message: "connection reset".to_string(),
            });
        }
        Ok(self.infos.get(url).cloned())
    }
}

pub fn settings() -> RetrieverSettings {
    RetrieverSettings {
        filter: TopicFilter::new(
            BTreeSet::from(["medicine".to_string(), "biology".to_string()]),
            BTreeSet::from(["location".to_string(), "sports".to_string()]),
        ),
        retry: RetryPolicy::bounded(Duration::ZERO, 5),
        rdf_prefix: RDF_PREFIX.to_string(),
        topics_base: TOPICS_BASE.to_string(),
    }
}

pub type MockRetriever<'a> =
    KeywordRetriever<&'a MockLiterature, &'a MockExtractor, &'a MockTopics>;

pub fn retriever<'a>(
    literature: &'a MockLiterature,
    extractor: &'a MockExtractor,
    topics: &'a MockTopics,
) -> MockRetriever<'a> {
    KeywordRetriever::new(literature, extractor, topics, settings())
}
