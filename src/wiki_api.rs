//! MediaWiki action API endpoints and the JSON envelopes they answer with.

use std::collections::HashMap;

use serde::Deserialize;
use url::Url;

/// One wiki's `api.php` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaWikiApi {
    endpoint: Url,
}

impl MediaWikiApi {
    /// Wraps an `api.php` URL such as `https://en.wikipedia.org/w/api.php`.
    pub fn new(endpoint: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
        })
    }

    /// Rendered HTML of a page, or of one section when `section` is set.
    pub fn parse_text_url(&self, page: &str, section: Option<&str>) -> Url {
        let mut url = self.query(&[("action", "parse"), ("page", page), ("prop", "text")]);
        if let Some(index) = section {
            url.query_pairs_mut().append_pair("section", index);
        }
        url
    }

    /// Raw wikitext of a page.
    pub fn parse_wikitext_url(&self, page: &str) -> Url {
        self.query(&[("action", "parse"), ("page", page), ("prop", "wikitext")])
    }

    /// Section outline of a page.
    pub fn sections_url(&self, page: &str) -> Url {
        self.query(&[("action", "parse"), ("page", page), ("prop", "sections")])
    }

    /// Plain-text intro paragraph of an article, following redirects.
    pub fn intro_extract_url(&self, title: &str) -> Url {
        self.query(&[
            ("action", "query"),
            ("prop", "extracts"),
            ("exintro", "1"),
            ("explaintext", "1"),
            ("redirects", "1"),
            ("titles", title),
        ])
    }

    fn query(&self, pairs: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in pairs {
                query.append_pair(key, value);
            }
            query.append_pair("format", "json");
            query.append_pair("origin", "*");
        }
        url
    }
}

/// Entry of a `prop=sections` outline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SectionInfo {
    /// Section index as the API reports it (a string such as `"3"`).
    pub index: String,
    /// Heading text, may carry inline markup.
    #[serde(default)]
    pub line: String,
}

#[derive(Debug, Deserialize)]
struct ParseEnvelope {
    parse: Option<ParseBody>,
}

#[derive(Debug, Deserialize)]
struct ParseBody {
    text: Option<Star>,
    wikitext: Option<Star>,
    #[serde(default)]
    sections: Vec<SectionInfo>,
}

#[derive(Debug, Deserialize)]
struct Star {
    #[serde(rename = "*")]
    content: String,
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    query: Option<QueryBody>,
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    #[serde(default)]
    pages: HashMap<String, PageExtract>,
}

#[derive(Debug, Deserialize)]
struct PageExtract {
    extract: Option<String>,
}

/// Rendered HTML from a `prop=text` response; empty when the envelope lacks it.
pub fn parse_text(body: &str) -> serde_json::Result<String> {
    let envelope: ParseEnvelope = serde_json::from_str(body)?;
    Ok(envelope
        .parse
        .and_then(|parse| parse.text)
        .map(|star| star.content)
        .unwrap_or_default())
}

/// Wikitext from a `prop=wikitext` response; empty when the envelope lacks it.
pub fn parse_wikitext(body: &str) -> serde_json::Result<String> {
    let envelope: ParseEnvelope = serde_json::from_str(body)?;
    Ok(envelope
        .parse
        .and_then(|parse| parse.wikitext)
        .map(|star| star.content)
        .unwrap_or_default())
}

/// Outline from a `prop=sections` response.
pub fn parse_sections(body: &str) -> serde_json::Result<Vec<SectionInfo>> {
    let envelope: ParseEnvelope = serde_json::from_str(body)?;
    Ok(envelope
        .parse
        .map(|parse| parse.sections)
        .unwrap_or_default())
}

/// First non-empty intro extract of a `prop=extracts` response.
pub fn intro_extract(body: &str) -> serde_json::Result<Option<String>> {
    let envelope: QueryEnvelope = serde_json::from_str(body)?;
    Ok(envelope.query.and_then(|query| {
        query
            .pages
            .into_values()
            .filter_map(|page| page.extract)
            .map(|extract| extract.trim().to_string())
            .find(|extract| !extract.is_empty())
    }))
}
