use std::collections::BTreeSet;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RvarError, Service, check_status, parse_json_body, read_body};
use crate::keywords::KeywordLink;

/// Knowledge-graph types attached to a linked entity, e.g. `/medicine/disease`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    pub types: Vec<String>,
}

impl TopicInfo {
    /// First path segment of every type id.
    pub fn topics(&self) -> BTreeSet<&str> {
        self.types
            .iter()
            .filter_map(|id| id.split('/').nth(1))
            .filter(|topic| !topic.is_empty())
            .collect()
    }
}

pub trait TopicClient {
    /// `Ok(None)` when the service knows nothing about the entity.
    fn lookup(&self, url: &str) -> Result<Option<TopicInfo>, RvarError>;
}

#[derive(Clone)]
pub struct TopicHttpClient {
    client: Client,
}

impl TopicHttpClient {
    pub fn new() -> Result<Self, RvarError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!("rvar-data/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| RvarError::from_reqwest(Service::Topics, err))?;
        Ok(Self { client })
    }
}

impl TopicClient for TopicHttpClient {
    fn lookup(&self, url: &str) -> Result<Option<TopicInfo>, RvarError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| RvarError::from_reqwest(Service::Topics, err))?;
        let response = check_status(Service::Topics, response)?;
        let body = read_body(Service::Topics, response)?;
        let payload = parse_json_body(Service::Topics, &body)?;
        parse_topic_info(&payload)
    }
}

pub fn parse_topic_info(payload: &Value) -> Result<Option<TopicInfo>, RvarError> {
    let result = match payload.get("result") {
        None | Some(Value::Null) => return Ok(None),
        Some(result) => result,
    };
    let Some(types) = result.get("type") else {
        return Ok(Some(TopicInfo { types: Vec::new() }));
    };
    let types = types
        .as_array()
        .ok_or_else(|| RvarError::malformed(Service::Topics, "result.type is not a list"))?;
    let mut ids = Vec::with_capacity(types.len());
    for item in types {
        let id = item
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| RvarError::malformed(Service::Topics, "type without id"))?;
        ids.push(id.to_string());
    }
    Ok(Some(TopicInfo { types: ids }))
}

/// Topic lookup URL for a link: its last `rdf` target under `rdf_prefix`, rebased onto `base_url`.
pub fn classification_url(link: &KeywordLink, rdf_prefix: &str, base_url: &str) -> Option<String> {
    link.targets
        .iter()
        .filter(|target| target.kind == "rdf")
        .filter_map(|target| target.url.strip_prefix(rdf_prefix))
        .last()
        .map(|rest| format!("{base_url}{rest}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No classification available.
    Unclassified,
    Accept,
    Avoid,
    /// Classified, but outside both topic sets.
    Ambiguous,
}

impl Verdict {
    pub fn keeps(self) -> bool {
        !matches!(self, Verdict::Avoid)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicFilter {
    accept: BTreeSet<String>,
    avoid: BTreeSet<String>,
}

impl TopicFilter {
    pub fn new(accept: BTreeSet<String>, avoid: BTreeSet<String>) -> Self {
        Self { accept, avoid }
    }

    pub fn accept(&self) -> &BTreeSet<String> {
        &self.accept
    }

    pub fn avoid(&self) -> &BTreeSet<String> {
        &self.avoid
    }

    /// Accepted topics win over avoided ones when an entity carries both.
    pub fn verdict(&self, info: Option<&TopicInfo>) -> Verdict {
        let Some(info) = info else {
            return Verdict::Unclassified;
        };
        let topics = info.topics();
        if topics.is_empty() {
            return Verdict::Unclassified;
        }
        if topics.iter().any(|topic| self.accept.contains(*topic)) {
            Verdict::Accept
        } else if topics.iter().any(|topic| self.avoid.contains(*topic)) {
            Verdict::Avoid
        } else {
            Verdict::Ambiguous
        }
    }
}
