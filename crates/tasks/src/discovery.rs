//! Site discovery: crawl a careers site and report pages that look like job
//! listings.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::{PageFetcher, StepLog, TaskBody, WorkflowResult};

const DEFAULT_JOB_PATTERNS: &[&str] = &["job", "career", "position", "opening", "vacanc"];

fn default_max_pages() -> usize {
    50
}

fn default_max_depth() -> usize {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    pub site_id: String,
    pub base_url: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Case-insensitive path fragments marking a job page.  Empty selects the
    /// built-in list.
    #[serde(default)]
    pub include_patterns: Vec<String>,
}

impl DiscoveryConfig {
    fn patterns(&self) -> Vec<String> {
        if self.include_patterns.is_empty() {
            DEFAULT_JOB_PATTERNS.iter().map(|p| p.to_string()).collect()
        } else {
            self.include_patterns.iter().map(|p| p.to_lowercase()).collect()
        }
    }
}

pub struct DiscoveryTask {
    fetcher: Arc<dyn PageFetcher>,
}

impl DiscoveryTask {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }
}

/// Every `href` of an `<a>` element, entity-decoded, in document order.
pub fn extract_hrefs(html: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return vec![];
    };

    Html::parse_document(html)
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve `href` against `base`, keeping only http(s) links on the same host.
fn resolve_same_host(base: &Url, href: &str) -> Option<Url> {
    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str() != base.host_str() {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

fn looks_like_job_page(url: &Url, patterns: &[String]) -> bool {
    let path = url.path().to_lowercase();
    patterns.iter().any(|p| path.contains(p.as_str()))
}

#[async_trait]
impl TaskBody for DiscoveryTask {
    fn name(&self) -> &'static str {
        "discovery"
    }

    async fn execute(&self, config: &Value) -> WorkflowResult {
        let mut log = StepLog::new();

        let config: DiscoveryConfig = match serde_json::from_value(config.clone()) {
            Ok(c) => c,
            Err(e) => {
                let error = format!("invalid discovery config: {e}");
                return log.finish(false, None, vec![error], vec![]);
            }
        };
        let root = match Url::parse(&config.base_url) {
            Ok(u) => u,
            Err(e) => {
                let error = format!("invalid base_url '{}': {e}", config.base_url);
                return log.finish(false, None, vec![error], vec![]);
            }
        };

        info!(site_id = %config.site_id, base_url = %root, "starting site discovery");

        // ------------------------------------------------------------------
        // Breadth-first crawl bounded by max_pages / max_depth.
        // ------------------------------------------------------------------
        let crawl = log.begin("crawl_site");
        let mut warnings = Vec::new();
        let mut seen: HashSet<String> = HashSet::from([root.to_string()]);
        let mut queue: VecDeque<(Url, usize)> = VecDeque::from([(root.clone(), 0)]);
        let mut discovered: BTreeSet<String> = BTreeSet::new();
        let mut crawled = 0usize;
        let mut root_error: Option<String> = None;

        while let Some((url, depth)) = queue.pop_front() {
            if crawled >= config.max_pages {
                break;
            }
            crawled += 1;
            log.use_resources(1);

            let fetched = match self.fetcher.fetch(url.as_str()).await {
                Ok(p) if p.is_success() => Ok(p),
                Ok(p) => Err(format!("{url} returned HTTP {}", p.status)),
                Err(e) => Err(format!("{url}: {e}")),
            };
            let page = match fetched {
                Ok(p) => p,
                // The root page is the only one whose failure is fatal.
                Err(message) if depth == 0 => {
                    root_error = Some(message);
                    break;
                }
                Err(message) => {
                    warnings.push(message);
                    continue;
                }
            };

            for href in extract_hrefs(&page.body) {
                let Some(link) = resolve_same_host(&url, &href) else {
                    continue;
                };
                let key = link.to_string();
                discovered.insert(key.clone());
                if depth < config.max_depth && seen.insert(key) {
                    queue.push_back((link, depth + 1));
                }
            }
            debug!(url = %url, depth, links = discovered.len(), "page crawled");
        }

        if let Some(message) = root_error {
            log.fail(crawl, message.clone());
            let error = format!("failed to crawl {root}: {message}");
            return log.finish(false, None, vec![error], vec![]);
        }
        log.succeed(crawl);

        // ------------------------------------------------------------------
        // Classify.
        // ------------------------------------------------------------------
        let classify = log.begin("classify_job_pages");
        let patterns = config.patterns();
        let job_urls: Vec<String> = discovered
            .iter()
            .filter(|u| Url::parse(u).map_or(false, |u| looks_like_job_page(&u, &patterns)))
            .cloned()
            .collect();
        log.succeed(classify);

        if !warnings.is_empty() {
            warn!(
                site_id = %config.site_id,
                count = warnings.len(),
                "some pages could not be fetched"
            );
        }
        info!(
            site_id = %config.site_id,
            pages_crawled = crawled,
            job_urls = job_urls.len(),
            "site discovery finished"
        );

        let data = json!({
            "site_id": config.site_id,
            "base_url": root.to_string(),
            "pages_crawled": crawled,
            "discovered_urls": discovered.into_iter().collect::<Vec<_>>(),
            "job_urls": job_urls,
        });
        log.finish(true, Some(data), vec![], warnings)
    }
}
