//! Web search-and-scrape tool.
//!
//! Four sequential stages per invocation: generate a search query from the
//! plan, fetch results from the serper.dev API, pick the best result page,
//! scrape its text. Provider and fetch failures are folded into the stage
//! output as text so the pipeline keeps its `url -> content` shape; only
//! malformed completion replies abort the invocation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::Config;
use crate::llm::{CompletionClient, FieldSchema, UpstreamError};

use super::{Tool, ToolOutput};

const SERPER_URL: &str = "https://google.serper.dev/search";

/// Page fetches block for at most this long.
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

const SEARCH_QUERY_SCHEMA: FieldSchema = FieldSchema {
    function_name: "fetch_search_results",
    function_description: "Fetch search results based on the search query",
    field: "search_engine_queries",
    field_description: "The most suitable search query for the plan",
};

const BEST_PAGE_SCHEMA: FieldSchema = FieldSchema {
    function_name: "decide_best_pages",
    function_description: "Decide the best pages to visit based on the search results",
    field: "best_search_page",
    field_description: "The URL link of the best search page based on the Search Results, \
                        Plan and Query. Do not select pdf files.",
};

/// Capability summary shown to the planning agent.
const WEB_SEARCHER_SPECS: &str = "Searches the web for a given plan and query: generates a \
    search-engine query, fetches results from a search provider, selects the single most \
    relevant result page, and returns that page's URL together with its extracted text \
    content. Returns one source per invocation.";

/// The search provider call failed. Recovered locally: rendered into the
/// result text instead of propagating, so later stages still run with a
/// degraded signal.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error occurred: {0}")]
    Status(reqwest::StatusCode),

    #[error("Request exception occurred: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Key error in handling response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The page retrieval failed. Recovered locally: rendered into the content
/// value so the `url -> content` shape is preserved.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error {0}")]
    Status(reqwest::StatusCode),

    #[error("{0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    organic: Option<Vec<OrganicResult>>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
}

/// Search-and-scrape tool backed by serper.dev and a completion client.
///
/// One shared instance is constructed at startup and handed to the loop;
/// nothing is re-instantiated per call.
pub struct WebSearcher {
    llm: Arc<dyn CompletionClient>,
    http: reqwest::Client,
    serper_api_key: String,
    search_url: String,
}

impl WebSearcher {
    /// Create a new searcher sharing the given completion client.
    pub fn new(config: &Config, llm: Arc<dyn CompletionClient>) -> Self {
        Self {
            llm,
            http: reqwest::Client::new(),
            serper_api_key: config.serper_api_key.clone(),
            search_url: SERPER_URL.to_string(),
        }
    }

    /// Override the search provider URL (useful for testing).
    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }

    /// Stage 1: derive a search-engine query from the plan and query.
    /// Any non-empty string the completion produces is accepted as-is.
    pub async fn generate_searches(&self, plan: &str, query: &str) -> Result<String, UpstreamError> {
        let message = format!("Query:{}\n\n Plan:{}", query, plan);
        let search_queries = self
            .llm
            .complete_structured(&message, &SEARCH_QUERY_SCHEMA)
            .await?;

        tracing::info!("Search engine queries: {}", search_queries);
        Ok(search_queries)
    }

    /// Stage 2: fetch results from the search provider. Never fails past
    /// this boundary; provider errors come back as descriptive text.
    pub async fn fetch_search_results(&self, search_queries: &str) -> String {
        match self.query_provider(search_queries).await {
            Ok(Some(results)) => format_results(&results),
            Ok(None) => "No organic results found.".to_string(),
            Err(e) => {
                tracing::warn!("Search provider call failed: {}", e);
                e.to_string()
            }
        }
    }

    async fn query_provider(
        &self,
        search_queries: &str,
    ) -> Result<Option<Vec<OrganicResult>>, ProviderError> {
        let response = self
            .http
            .post(&self.search_url)
            .header("X-API-KEY", &self.serper_api_key)
            .json(&json!({ "q": search_queries }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status));
        }

        let body = response.bytes().await?;
        let parsed: SerperResponse = serde_json::from_slice(&body)?;
        Ok(parsed.organic)
    }

    /// Stage 3: pick the single best result page. The returned URL is
    /// passed through unvalidated.
    pub async fn get_search_page(
        &self,
        search_results: &str,
        plan: &str,
        query: &str,
    ) -> Result<String, UpstreamError> {
        let message = format!(
            "Query:{}\n\n Plan:{} \n\n Search Results:{}",
            query, plan, search_results
        );
        let best_page = self.llm.complete_structured(&message, &BEST_PAGE_SCHEMA).await?;

        tracing::info!("Best page: {}", best_page);
        Ok(best_page)
    }

    /// Stage 4: fetch the page and flatten it to text. Never fails past
    /// this boundary; the URL key is preserved and fetch errors become the
    /// content value.
    pub async fn scrape_content(&self, url: &str) -> ToolOutput {
        match self.fetch_page(url).await {
            Ok(text) => ToolOutput {
                url: url.to_string(),
                content: text,
            },
            Err(e) => {
                tracing::warn!("Error retrieving content from {}: {}", url, e);
                ToolOutput {
                    url: url.to_string(),
                    content: format!("Failed to retrieve content due to an error: {}", e),
                }
            }
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .http
            .get(url)
            .headers(browser_headers())
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;
        Ok(extract_text(&body))
    }
}

#[async_trait]
impl Tool for WebSearcher {
    fn name(&self) -> &str {
        "web_searcher"
    }

    fn description(&self) -> &str {
        WEB_SEARCHER_SPECS
    }

    async fn use_tool(&self, plan: &str, query: &str) -> Result<ToolOutput, UpstreamError> {
        let search_queries = self.generate_searches(plan, query).await?;
        let search_results = self.fetch_search_results(&search_queries).await;
        let best_page = self.get_search_page(&search_results, plan, query).await?;
        let output = self.scrape_content(&best_page).await;

        tracing::debug!("Search results:\n{}", search_results);
        tracing::debug!(
            "Scraped {} chars from {}",
            output.content.len(),
            output.url
        );

        Ok(output)
    }
}

/// Format organic results as Title/Link/Snippet blocks. Absent fields get
/// placeholder text.
fn format_results(organic_results: &[OrganicResult]) -> String {
    organic_results
        .iter()
        .map(|result| {
            format!(
                "Title: {}\nLink: {}\nSnippet: {}\n---",
                result.title.as_deref().unwrap_or("No Title"),
                result.link.as_deref().unwrap_or("#"),
                result.snippet.as_deref().unwrap_or("No snippet available.")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Browser-emulating headers to reduce anti-scraping rejections.
fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "User-Agent",
        HeaderValue::from_static(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36",
        ),
    );
    headers.insert(
        "Accept",
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,\
             image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.9",
        ),
    );
    headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert("Referer", HeaderValue::from_static("https://www.google.com/"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
    // Accept-Encoding is left to reqwest's own content negotiation.
    headers
}

/// Flatten HTML to readable text: scripts/styles removed, tags stripped,
/// entities decoded, blank lines dropped, runs of whitespace collapsed.
fn extract_text(html: &str) -> String {
    let text = strip_element(html, "<script", "</script>");
    let text = strip_element(&text, "<style", "</style>");

    // Tags become line breaks so block boundaries survive.
    let mut flattened = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        if c == '<' {
            in_tag = true;
        } else if c == '>' {
            in_tag = false;
            flattened.push('\n');
        } else if !in_tag {
            flattened.push(c);
        }
    }

    html_decode(&flattened)
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove every element between `open` and `close`, including the tags.
fn strip_element(html: &str, open: &str, close: &str) -> String {
    let mut text = html.to_string();
    while let Some(start) = text.find(open) {
        match text[start..].find(close) {
            Some(end) => text.replace_range(start..start + end + close.len(), ""),
            None => break,
        }
    }
    text
}

/// Basic HTML entity decoding.
fn html_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Completion stub that replays queued structured replies.
    struct StubLlm {
        structured: Mutex<VecDeque<String>>,
    }

    impl StubLlm {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                structured: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for StubLlm {
        async fn complete_free_text(
            &self,
            _system_prompt: &str,
            _user_message: &str,
        ) -> Result<String, UpstreamError> {
            Ok("unused".to_string())
        }

        async fn complete_structured(
            &self,
            _user_message: &str,
            _schema: &FieldSchema,
        ) -> Result<String, UpstreamError> {
            self.structured
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(UpstreamError::MissingToolCall)
        }
    }

    fn searcher(llm: Arc<StubLlm>, search_url: String) -> WebSearcher {
        let config = Config::new("sk-test".to_string(), "serper-test".to_string());
        WebSearcher::new(&config, llm).with_search_url(search_url)
    }

    #[test]
    fn format_results_substitutes_placeholders() {
        let results = vec![
            OrganicResult {
                title: Some("Boiling point".to_string()),
                link: Some("https://example.com/boiling".to_string()),
                snippet: Some("100°C".to_string()),
            },
            OrganicResult {
                title: None,
                link: None,
                snippet: None,
            },
        ];

        let formatted = format_results(&results);

        assert!(formatted.contains("Title: Boiling point"));
        assert!(formatted.contains("Link: https://example.com/boiling"));
        assert!(formatted.contains("Snippet: 100°C"));
        assert!(formatted.contains("Title: No Title"));
        assert!(formatted.contains("Link: #"));
        assert!(formatted.contains("Snippet: No snippet available."));
    }

    #[test]
    fn extract_text_strips_markup_and_blank_lines() {
        let html = "<html><head><style>body { color: red; }</style>\
                    <script>var x = 1;</script></head>\
                    <body><h1>Title</h1>\n\n<p>Water   boils&nbsp;at\n100&#39;</p></body></html>";

        let text = extract_text(html);

        assert_eq!(text, "Title\nWater boils at\n100'");
    }

    #[tokio::test]
    async fn fetch_search_results_formats_organic_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("X-API-KEY", "serper-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "organic": [
                    {"title": "Boiling point", "link": "https://example.com/boiling",
                     "snippet": "100°C"}
                ]
            })))
            .mount(&server)
            .await;

        let tool = searcher(StubLlm::new(&[]), format!("{}/search", server.uri()));
        let results = tool.fetch_search_results("boiling point of water").await;

        assert!(results.contains("Title: Boiling point"));
    }

    #[tokio::test]
    async fn fetch_search_results_without_organic_key_is_a_fixed_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"news": []})))
            .mount(&server)
            .await;

        let tool = searcher(StubLlm::new(&[]), format!("{}/search", server.uri()));
        let results = tool.fetch_search_results("anything").await;

        assert_eq!(results, "No organic results found.");
    }

    #[tokio::test]
    async fn fetch_search_results_renders_http_errors_as_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let tool = searcher(StubLlm::new(&[]), format!("{}/search", server.uri()));
        let results = tool.fetch_search_results("anything").await;

        assert!(results.starts_with("HTTP error occurred:"));
    }

    #[tokio::test]
    async fn fetch_search_results_renders_transport_errors_as_text() {
        // Nothing listens here, so the connection is refused.
        let tool = searcher(StubLlm::new(&[]), "http://127.0.0.1:9/search".to_string());
        let results = tool.fetch_search_results("anything").await;

        assert!(results.starts_with("Request exception occurred:"));
    }

    #[tokio::test]
    async fn fetch_search_results_renders_decode_errors_as_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let tool = searcher(StubLlm::new(&[]), format!("{}/search", server.uri()));
        let results = tool.fetch_search_results("anything").await;

        assert!(results.starts_with("Key error in handling response:"));
    }

    #[tokio::test]
    async fn scrape_content_keeps_url_key_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tool = searcher(StubLlm::new(&[]), "unused".to_string());
        let url = format!("{}/missing", server.uri());
        let output = tool.scrape_content(&url).await;

        assert_eq!(output.url, url);
        assert!(output
            .content
            .starts_with("Failed to retrieve content due to an error:"));
    }

    #[tokio::test]
    async fn use_tool_chains_all_four_stages() {
        let server = MockServer::start().await;
        let page_url = format!("{}/boiling", server.uri());

        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "organic": [
                    {"title": "Boiling point", "link": page_url.clone(), "snippet": "100°C"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/boiling"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><p>Water boils at 100°C at sea level.</p></body></html>",
            ))
            .mount(&server)
            .await;

        let llm = StubLlm::new(&["boiling point of water", page_url.as_str()]);
        let tool = searcher(llm, format!("{}/search", server.uri()));

        let output = tool.use_tool("Look up the boiling point", "query").await.unwrap();

        assert_eq!(output.url, page_url);
        assert_eq!(output.content, "Water boils at 100°C at sea level.");
    }

    #[tokio::test]
    async fn use_tool_survives_a_degraded_provider() {
        let server = MockServer::start().await;
        let page_url = format!("{}/page", server.uri());

        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<p>still reachable</p>"),
            )
            .mount(&server)
            .await;

        // Provider is unreachable; the page choice is made from the
        // degraded result text.
        let llm = StubLlm::new(&["some query", page_url.as_str()]);
        let tool = searcher(llm, "http://127.0.0.1:9/search".to_string());

        let output = tool.use_tool("plan", "query").await.unwrap();

        assert_eq!(output.url, page_url);
        assert_eq!(output.content, "still reachable");
    }

    #[tokio::test]
    async fn use_tool_propagates_malformed_completions() {
        // No queued replies: the first structured call fails.
        let tool = searcher(StubLlm::new(&[]), "unused".to_string());

        let err = tool.use_tool("plan", "query").await.unwrap_err();

        assert!(matches!(err, UpstreamError::MissingToolCall));
    }
}
