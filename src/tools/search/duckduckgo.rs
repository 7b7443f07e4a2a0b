//! DuckDuckGo HTML search (no API key required).

use std::time::Duration;

use scraper::{Html, Selector};

use crate::llm::error::ProviderError;
use crate::llm::retry::with_timeout;
use crate::tools::search::{SearchBackend, SearchFuture, SearchHit, SearchRequest, SearchResponse, SearchTopic};

const SERVICE: &str = "duckduckgo";

/// Base URL for DuckDuckGo HTML search.
const DDG_HTML_URL: &str = "https://html.duckduckgo.com/html/";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// DuckDuckGo HTML backend.
pub struct DuckDuckGoBackend {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl DuckDuckGoBackend {
    /// Backend with a request deadline.
    ///
    /// # Errors
    /// Returns a transport error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| ProviderError::transport(SERVICE, err.to_string()))?;
        Ok(Self {
            client,
            url: DDG_HTML_URL.to_string(),
            timeout,
        })
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<SearchResponse, ProviderError> {
        let response = self
            .client
            .post(&self.url)
            .form(&build_params(request))
            .send()
            .await
            .map_err(|err| ProviderError::from_reqwest(SERVICE, &err, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::status(SERVICE, status.as_u16(), &body));
        }

        let html = response
            .text()
            .await
            .map_err(|err| ProviderError::from_reqwest(SERVICE, &err, self.timeout))?;
        Ok(SearchResponse {
            answer: None,
            results: parse_results(&html, request.max_results)?,
        })
    }
}

impl SearchBackend for DuckDuckGoBackend {
    fn name(&self) -> &'static str {
        SERVICE
    }

    fn search<'a>(&'a self, request: &'a SearchRequest) -> SearchFuture<'a> {
        Box::pin(with_timeout(SERVICE, self.timeout, self.fetch(request)))
    }
}

/// Form parameters; news restricts results to the past week.
fn build_params(request: &SearchRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![("q", request.query.clone()), ("b", String::new()), ("kp", "-1".to_string())];
    if request.topic == SearchTopic::News {
        params.push(("df", "w".to_string()));
    }
    params
}

fn selector(css: &str) -> Result<Selector, ProviderError> {
    Selector::parse(css).map_err(|e| ProviderError::malformed(SERVICE, format!("invalid selector {css}: {e:?}")))
}

/// Parse DuckDuckGo HTML results.
fn parse_results(html: &str, max_results: usize) -> Result<Vec<SearchHit>, ProviderError> {
    let document = Html::parse_document(html);
    let result_selector = selector(".result")?;
    let title_selector = selector(".result__a")?;
    let snippet_selector = selector(".result__snippet")?;

    let mut results = Vec::new();
    for element in document.select(&result_selector) {
        if results.len() >= max_results {
            break;
        }
        let Some(anchor) = element.select(&title_selector).next() else {
            continue;
        };
        let title = anchor.text().collect::<String>().trim().to_string();
        let url = anchor
            .value()
            .attr("href")
            .map(extract_url_from_ddg_redirect)
            .unwrap_or_default();
        if title.is_empty() || url.is_empty() {
            continue;
        }
        let snippet = element
            .select(&snippet_selector)
            .next()
            .map(|e| e.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        results.push(SearchHit { title, url, snippet });
    }

    if results.is_empty() {
        tracing::warn!("no results found in DuckDuckGo HTML response");
    }
    Ok(results)
}

/// Extract the target URL from DuckDuckGo's redirect link.
fn extract_url_from_ddg_redirect(href: &str) -> String {
    // //duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com&rut=...
    if let Some(uddg_start) = href.find("uddg=") {
        let start = uddg_start + 5;
        let end = href[start..].find('&').map_or(href.len(), |i| start + i);
        let encoded = &href[start..end];
        urlencoding::decode(encoded).map_or_else(|_| encoded.to_string(), |s| s.into_owned())
    } else if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    }
}
