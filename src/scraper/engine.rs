use crate::analyzer::SiteAnalyzer;
use crate::breaker::CircuitBreaker;
use crate::config::defaults;
use crate::core::error::ErrorKind;
use crate::governor::ConcurrencyGovernor;
use crate::model::{Proxy, ProtectionType, ScrapedPage, ScrapeResult, ScrapingStrategy, StrategyConfig};
use crate::protection::ProtectionDetector;
use crate::proxy::ProxyPool;
use crate::scraper::fetch::{FetchOutcome, fetch_once};
use crate::scraper::links::extract_same_origin_links;
use crate::strategy::StrategySelector;
use futures::stream::{self, StreamExt};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub max_links: usize,
    pub subpage_count: usize,
    pub user_agent: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_links: 50,
            subpage_count: 5,
            user_agent: defaults::DEFAULT_APP_USER_AGENT.to_string(),
        }
    }
}

/// C7 — fetches a company's main page and a bounded set of subpages through the proxy
/// pool, concurrency governor and circuit breaker, cascading through strategies per
/// §4.7.
pub struct Scraper {
    proxy_pool: Arc<ProxyPool>,
    governor: Arc<ConcurrencyGovernor>,
    breaker: Arc<CircuitBreaker>,
    protection_detector: Arc<ProtectionDetector>,
    analyzer: Arc<SiteAnalyzer>,
    strategy_selector: Arc<StrategySelector>,
    fallback_client: reqwest::Client,
    config: ScraperConfig,
}

impl Scraper {
    pub fn new(
        proxy_pool: Arc<ProxyPool>,
        governor: Arc<ConcurrencyGovernor>,
        breaker: Arc<CircuitBreaker>,
        protection_detector: Arc<ProtectionDetector>,
        analyzer: Arc<SiteAnalyzer>,
        strategy_selector: Arc<StrategySelector>,
        config: ScraperConfig,
    ) -> anyhow::Result<Self> {
        // Curl-like fallback engine: no proxy, no compression, single static minimal UA.
        let fallback_client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible)")
            .no_gzip()
            .no_deflate()
            .timeout(Duration::from_secs(15))
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            proxy_pool,
            governor,
            breaker,
            protection_detector,
            analyzer,
            strategy_selector,
            fallback_client,
            config,
        })
    }

    fn build_client(&self, proxy: Option<&Proxy>) -> anyhow::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(self.config.user_agent.clone())
            .danger_accept_invalid_certs(true);
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(&proxy.endpoint)?);
        }
        Ok(builder.build()?)
    }

    /// Executes the full pipeline for one company URL (§4.7).
    pub async fn scrape_company(&self, company_url: &str) -> ScrapeResult {
        let mut result = ScrapeResult::new(company_url);
        let overall_start = Instant::now();

        if self.breaker.is_open(company_url) {
            result.main_page_fail_reason = Some(ErrorKind::CircuitOpen.as_fail_reason().to_string());
            result.timings.total_time_ms = overall_start.elapsed().as_millis() as u64;
            return result;
        }

        let ticket = match self.governor.acquire(company_url).await {
            Ok(ticket) => ticket,
            Err(_) => {
                result.main_page_fail_reason =
                    Some(ErrorKind::ConcurrencyTimeout.as_fail_reason().to_string());
                result.timings.total_time_ms = overall_start.elapsed().as_millis() as u64;
                return result;
            }
        };

        let probe_start = Instant::now();
        let probe_proxy = self.proxy_pool.get_next();
        let profile = self.analyzer.analyze(company_url, probe_proxy.as_ref()).await;
        result.timings.probe_time_ms = probe_start.elapsed().as_millis() as u64;

        let strategies = self.strategy_selector.select(&profile);

        let main_start = Instant::now();
        let (main_page, fail_reason, strategy_used) =
            self.fetch_main_cascade(company_url, &strategies).await;
        result.timings.main_scrape_time_ms = main_start.elapsed().as_millis() as u64;

        // Subpages acquire their own per-domain tickets; release the main-page ticket
        // first so it doesn't hold a slot for the whole subpage fan-out.
        drop(ticket);

        result.main_page = main_page;
        result.main_page_fail_reason = fail_reason;
        result.strategy_used = strategy_used;

        if let Some(page) = result.main_page.as_ref().filter(|p| p.success()) {
            let raw_links = extract_same_origin_links(&page.content, company_url, usize::MAX);
            result.funnel.links_found = raw_links.len();
            let filtered = extract_same_origin_links(&page.content, company_url, self.config.max_links);
            result.funnel.links_after_filter = filtered.len();

            let selected: Vec<String> = filtered.into_iter().take(self.config.subpage_count).collect();
            result.funnel.links_selected = selected.len();

            let subpage_start = Instant::now();
            let subpage_strategies = strategy_used
                .map(|s| self.strategy_selector.select_for_subpage(s))
                .unwrap_or_else(|| vec![ScrapingStrategy::Standard, ScrapingStrategy::Robust]);

            let subpages: Vec<ScrapedPage> = stream::iter(selected.into_iter())
                .map(|url| {
                    let strategies = subpage_strategies.clone();
                    async move { self.fetch_subpage(&url, &strategies).await }
                })
                .buffer_unordered(self.config.subpage_count.max(1))
                .collect()
                .await;

            result.timings.subpages_time_ms = subpage_start.elapsed().as_millis() as u64;
            result.funnel.subpages_fetched = subpages.len();
            result.funnel.subpages_succeeded = subpages.iter().filter(|p| p.success()).count();
            result.subpages = subpages;
        }

        result.timings.total_time_ms = overall_start.elapsed().as_millis() as u64;
        result
    }

    /// Cascades through strategies for the main page; falls back to a minimal-header
    /// alternate engine if every strategy fails (§4.7 steps 3-5).
    async fn fetch_main_cascade(
        &self,
        url: &str,
        strategies: &[ScrapingStrategy],
    ) -> (Option<ScrapedPage>, Option<String>, Option<ScrapingStrategy>) {
        let mut last_fail = ErrorKind::Other;

        for strategy in strategies {
            let cfg = self.strategy_selector.get_strategy_config(*strategy);
            match self.try_strategy(url, &cfg).await {
                FetchOutcome::Ok { html, text, status, elapsed_ms, .. } => {
                    let links = extract_same_origin_links(&html, url, self.config.max_links);
                    return (
                        Some(ScrapedPage {
                            url: url.to_string(),
                            content: text,
                            links,
                            document_links: Vec::new(),
                            status_code: Some(status),
                            response_time_ms: elapsed_ms,
                            error: None,
                        }),
                        None,
                        Some(*strategy),
                    );
                }
                FetchOutcome::Protection(p) => {
                    last_fail = protection_to_error_kind(p);
                }
                FetchOutcome::Fail(kind) => {
                    last_fail = kind;
                }
            }
        }

        match self.fetch_fallback(url).await {
            FetchOutcome::Ok { html, text, status, elapsed_ms, .. } => {
                let links = extract_same_origin_links(&html, url, self.config.max_links);
                (
                    Some(ScrapedPage {
                        url: url.to_string(),
                        content: text,
                        links,
                        document_links: Vec::new(),
                        status_code: Some(status),
                        response_time_ms: elapsed_ms,
                        error: None,
                    }),
                    None,
                    None,
                )
            }
            FetchOutcome::Protection(p) => {
                (None, Some(protection_to_error_kind(p).as_fail_reason().to_string()), None)
            }
            FetchOutcome::Fail(kind) => (None, Some(kind.as_fail_reason().to_string()), None),
        }
    }

    /// A bounded cascade for one subpage: try the strategy that worked on the main page,
    /// then its automatic downgrade, each with its own normal retry budget.
    async fn fetch_subpage(&self, url: &str, strategies: &[ScrapingStrategy]) -> ScrapedPage {
        let Ok(ticket) = self.governor.acquire(url).await else {
            return ScrapedPage {
                url: url.to_string(),
                content: String::new(),
                links: Vec::new(),
                document_links: Vec::new(),
                status_code: None,
                response_time_ms: 0,
                error: Some(ErrorKind::ConcurrencyTimeout.as_fail_reason().to_string()),
            };
        };

        let start = Instant::now();
        let mut last_error = ErrorKind::Other;
        for strategy in strategies.iter().take(2) {
            let cfg = self.strategy_selector.get_strategy_config(*strategy);
            match self.try_strategy(url, &cfg).await {
                FetchOutcome::Ok { text, status, .. } => {
                    drop(ticket);
                    return ScrapedPage {
                        url: url.to_string(),
                        content: text,
                        links: Vec::new(),
                        document_links: Vec::new(),
                        status_code: Some(status),
                        response_time_ms: start.elapsed().as_millis() as u64,
                        error: None,
                    };
                }
                FetchOutcome::Protection(p) => last_error = protection_to_error_kind(p),
                FetchOutcome::Fail(kind) => last_error = kind,
            }
        }
        drop(ticket);

        ScrapedPage {
            url: url.to_string(),
            content: String::new(),
            links: Vec::new(),
            document_links: Vec::new(),
            status_code: None,
            response_time_ms: start.elapsed().as_millis() as u64,
            error: Some(last_error.as_fail_reason().to_string()),
        }
    }

    /// One strategy's worth of attempts: up to `retry_count` tries with a fresh proxy on
    /// each infra failure, bounded jittered backoff between attempts (§4.7 step 4).
    async fn try_strategy(&self, url: &str, strategy: &StrategyConfig) -> FetchOutcome {
        let mut excluded: HashSet<String> = HashSet::new();
        let mut attempt = 0u32;

        loop {
            let proxy = if strategy.use_proxy {
                if excluded.is_empty() {
                    self.proxy_pool.get_next()
                } else {
                    self.proxy_pool.get_excluding(&excluded)
                }
            } else {
                None
            };

            if strategy.use_proxy && proxy.is_none() && !self.proxy_pool.degraded_mode_allowed() {
                return FetchOutcome::Fail(ErrorKind::NoResponse);
            }

            let client = match self.build_client(proxy.as_ref()) {
                Ok(c) => c,
                Err(_) => return FetchOutcome::Fail(ErrorKind::Other),
            };
            let ua_override = strategy.rotate_user_agent.then(random_user_agent);

            let outcome =
                fetch_once(&client, url, strategy, &self.protection_detector, ua_override.as_deref()).await;

            match outcome {
                FetchOutcome::Ok { .. } => {
                    if let Some(p) = &proxy {
                        self.proxy_pool.record_success(&p.endpoint);
                    }
                    self.breaker.record_success(url);
                    self.governor.record_domain_outcome(&host_of(url), true).await;
                    return outcome;
                }
                FetchOutcome::Protection(_) => {
                    if let Some(p) = &proxy {
                        self.proxy_pool.record_success(&p.endpoint);
                    }
                    self.breaker.record_failure(url, true);
                    return outcome;
                }
                FetchOutcome::Fail(kind) => {
                    if let Some(p) = &proxy {
                        self.proxy_pool.record_failure(&p.endpoint);
                        excluded.insert(p.endpoint.clone());
                    }
                    self.breaker.record_failure(url, false);
                    self.governor.record_domain_outcome(&host_of(url), false).await;

                    let allowed = kind.max_retries(strategy.retry_count);
                    if attempt >= allowed {
                        return outcome;
                    }
                    tokio::time::sleep(jittered_delay(strategy.delay_between_requests_s, attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn fetch_fallback(&self, url: &str) -> FetchOutcome {
        let cfg = StrategyConfig {
            timeout_s: 15.0,
            use_proxy: false,
            rotate_user_agent: false,
            rotate_proxy: false,
            retry_count: 0,
            delay_between_requests_s: 0.0,
            custom_headers: false,
        };
        fetch_once(&self.fallback_client, url, &cfg, &self.protection_detector, None).await
    }
}

fn protection_to_error_kind(protection: ProtectionType) -> ErrorKind {
    match protection {
        ProtectionType::Cloudflare => ErrorKind::Cloudflare,
        ProtectionType::Waf => ErrorKind::Waf,
        ProtectionType::Captcha => ErrorKind::Captcha,
        ProtectionType::Bot => ErrorKind::Bot,
        ProtectionType::RateLimit => ErrorKind::RateLimit,
        ProtectionType::None => ErrorKind::Other,
    }
}

fn host_of(url: &str) -> String {
    crate::core::utils::ErrorUtils::extract_domain(url).unwrap_or_else(|| url.to_string())
}

fn random_user_agent() -> String {
    let idx = rand::thread_rng().gen_range(0..defaults::USER_AGENTS.len());
    defaults::USER_AGENTS[idx].to_string()
}

/// Bounded exponential-ish jitter: `base * (attempt + 1)`, +/-30%, capped at 10s.
fn jittered_delay(base_s: f64, attempt: u32) -> Duration {
    let scaled = base_s * (attempt as f64 + 1.0);
    let jitter = rand::thread_rng().gen_range(0.7..1.3);
    Duration::from_secs_f64((scaled * jitter).min(10.0).max(0.0))
}
