use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::KeywordSettings;
use crate::error::{RvarError, Service, check_status, parse_json_body, read_body};

/// One entity the suggestion service recognised in the submitted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordLink {
    pub targets: Vec<LinkTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTarget {
    pub kind: String,
    pub url: String,
    pub title: String,
}

impl KeywordLink {
    /// Keyword text: the title of the first target.
    pub fn keyword(&self) -> Option<&str> {
        self.targets.first().map(|target| target.title.as_str())
    }
}

pub trait KeywordClient {
    fn suggest(&self, text: &str) -> Result<Vec<KeywordLink>, RvarError>;
}

#[derive(Clone)]
pub struct KeywordHttpClient {
    client: Client,
    gateway: String,
    api_key: String,
    markup_limit: u32,
}

impl KeywordHttpClient {
    pub fn new(settings: &KeywordSettings) -> Result<Self, RvarError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| RvarError::MissingCredential("KEYWORDS_API_KEY".to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(format!("rvar-data/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| RvarError::from_reqwest(Service::Keywords, err))?;
        Ok(Self {
            client,
            gateway: settings.gateway.clone(),
            api_key,
            markup_limit: settings.markup_limit,
        })
    }
}

impl KeywordClient for KeywordHttpClient {
    fn suggest(&self, text: &str) -> Result<Vec<KeywordLink>, RvarError> {
        let markup_limit = self.markup_limit.to_string();
        let form = [
            ("method", "zemanta.suggest"),
            ("api_key", self.api_key.as_str()),
            ("text", text),
            ("return_categories", "dmoz"),
            ("articles_limit", "0"),
            ("return_images", "0"),
            ("markup_limit", markup_limit.as_str()),
            ("return_rdf_links", "1"),
            ("format", "json"),
        ];
        let response = self
            .client
            .post(&self.gateway)
            .form(&form)
            .send()
            .map_err(|err| RvarError::from_reqwest(Service::Keywords, err))?;
        let response = check_status(Service::Keywords, response)?;
        let body = read_body(Service::Keywords, response)?;
        let payload = parse_json_body(Service::Keywords, &body)?;
        parse_suggestions(&payload)
    }
}

/// Extracts `markup.links[].target[]` from a suggestion response.
pub fn parse_suggestions(payload: &Value) -> Result<Vec<KeywordLink>, RvarError> {
    let links = payload
        .get("markup")
        .and_then(|v| v.get("links"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| RvarError::malformed(Service::Keywords, "missing markup.links"))?;

    let mut output = Vec::with_capacity(links.len());
    for link in links {
        let targets = link
            .get("target")
            .and_then(|v| v.as_array())
            .ok_or_else(|| RvarError::malformed(Service::Keywords, "link without target list"))?;
        if targets.is_empty() {
            return Err(RvarError::malformed(
                Service::Keywords,
                "link with empty target list",
            ));
        }
        let mut parsed = Vec::with_capacity(targets.len());
        for target in targets {
            let title = target
                .get("title")
                .and_then(|v| v.as_str())
                .ok_or_else(|| RvarError::malformed(Service::Keywords, "target without title"))?;
            parsed.push(LinkTarget {
                kind: string_field(target, "type"),
                url: string_field(target, "url"),
                title: title.to_string(),
            });
        }
        output.push(KeywordLink { targets: parsed });
    }
    Ok(output)
}

fn string_field(value: &Value, name: &str) -> String {
    value
        .get(name)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}
