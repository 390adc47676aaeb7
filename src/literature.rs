use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use serde::Serialize;

use crate::config::PubmedSettings;
use crate::domain::ReferenceId;
use crate::error::{RvarError, Service, check_status, read_body};

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<ArticleTitle[^>]*>(.*?)</ArticleTitle>").unwrap());
static ABSTRACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<AbstractText[^>]*>(.*?)</AbstractText>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    pub title: String,
    pub abstract_text: String,
}

impl Article {
    /// Title and abstract joined, the text submitted for keyword extraction.
    pub fn text(&self) -> String {
        if self.abstract_text.is_empty() {
            return self.title.clone();
        }
        format!("{} {}", self.title, self.abstract_text)
    }
}

pub trait LiteratureClient {
    fn fetch_article(&self, id: &ReferenceId) -> Result<Article, RvarError>;
}

#[derive(Clone)]
pub struct PubmedHttpClient {
    client: Client,
    base_url: String,
    email: Option<String>,
    api_key: Option<String>,
}

impl PubmedHttpClient {
    pub fn new(settings: &PubmedSettings) -> Result<Self, RvarError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(format!("rvar-data/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| RvarError::from_reqwest(Service::Literature, err))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            email: settings.email.clone(),
            api_key: settings.api_key.clone(),
        })
    }
}

impl LiteratureClient for PubmedHttpClient {
    fn fetch_article(&self, id: &ReferenceId) -> Result<Article, RvarError> {
        let url = format!("{}/efetch.fcgi", self.base_url);
        let mut params = vec![
            ("db", "pubmed"),
            ("id", id.as_str()),
            ("retmode", "xml"),
            ("tool", "rvar-data"),
        ];
        if let Some(email) = &self.email {
            params.push(("email", email.as_str()));
        }
        if let Some(api_key) = &self.api_key {
            params.push(("api_key", api_key.as_str()));
        }
        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .map_err(|err| RvarError::from_reqwest(Service::Literature, err))?;
        let response = check_status(Service::Literature, response)?;
        let body = read_body(Service::Literature, response)?;
        let body = String::from_utf8(body)
            .map_err(|err| RvarError::malformed(Service::Literature, err.to_string()))?;
        parse_efetch_xml(&body)
    }
}

/// Pulls the first article's title and abstract out of an efetch XML document.
pub fn parse_efetch_xml(xml: &str) -> Result<Article, RvarError> {
    let title = TITLE_RE
        .captures(xml)
        .and_then(|caps| caps.get(1))
        .map(|m| clean_text(m.as_str()))
        .ok_or_else(|| RvarError::malformed(Service::Literature, "missing ArticleTitle"))?;
    let sections: Vec<String> = ABSTRACT_RE
        .captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        .map(|m| clean_text(m.as_str()))
        .filter(|text| !text.is_empty())
        .collect();
    Ok(Article {
        title,
        abstract_text: sections.join(" "),
    })
}

fn clean_text(raw: &str) -> String {
    let stripped = TAG_RE.replace_all(raw, "");
    let decoded = stripped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const EFETCH: &str = r#"<?xml version="1.0" ?>
<PubmedArticleSet>
 <PubmedArticle>
  <MedlineCitation Status="MEDLINE" Owner="NLM">
   <PMID Version="1">111</PMID>
   <Article PubModel="Print">
    <ArticleTitle>Variants in <i>ADRB2</i> and asthma &amp; lung function.</ArticleTitle>
    <Abstract>
     <AbstractText Label="BACKGROUND">Asthma is a common
       disease.</AbstractText>
     <AbstractText Label="RESULTS">rs1042713 was associated.</AbstractText>
    </Abstract>
   </Article>
  </MedlineCitation>
 </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn parses_title_and_abstract_sections() {
        let article = parse_efetch_xml(EFETCH).unwrap();
        assert_eq!(article.title, "Variants in ADRB2 and asthma & lung function.");
        assert_eq!(
            article.abstract_text,
            "Asthma is a common disease. rs1042713 was associated."
        );
        assert!(article.text().starts_with("Variants in ADRB2"));
    }

    #[test]
    fn missing_title_is_malformed() {
        let err = parse_efetch_xml("<PubmedArticleSet></PubmedArticleSet>").unwrap_err();
        assert_matches!(
            err,
            RvarError::MalformedResponse {
                service: Service::Literature,
                ..
            }
        );
    }

    #[test]
    fn article_without_abstract_uses_title() {
        let article =
            parse_efetch_xml("<Article><ArticleTitle>Only a title</ArticleTitle></Article>").unwrap();
        assert_eq!(article.text(), "Only a title");
    }
}
