use crate::model::{Proxy, ProtectionType, ScrapingStrategy, SiteProfile, SiteType};
use crate::protection::ProtectionDetector;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;

const SPA_SIGNATURES: &[&str] = &[
    "react", "__next", "__nuxt", "ng-app", "ng-controller", "data-v-", "vue-", "ember", "_app.js",
    "main.js", "bundle.js",
];

const MINIMAL_CONTENT_SIGNATURES: &[&str] = &[
    "<div id=\"root\"></div>",
    "<div id=\"app\"></div>",
    "<div id=\"__next\"></div>",
    "loading...",
    "please wait",
    "javascript required",
];

/// Probes a site exactly once and produces a `SiteProfile` with a recommended strategy.
pub struct SiteAnalyzer {
    timeout: Duration,
    user_agent: String,
    protection_detector: ProtectionDetector,
}

impl SiteAnalyzer {
    pub fn new(timeout: Duration, user_agent: impl Into<String>, protection_detector: ProtectionDetector) -> Self {
        Self {
            timeout,
            user_agent: user_agent.into(),
            protection_detector,
        }
    }

    fn build_client(&self, proxy: Option<&Proxy>) -> anyhow::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.timeout)
            .danger_accept_invalid_certs(true);
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(&proxy.endpoint)?);
        }
        Ok(builder.build()?)
    }

    /// Single-probe analysis. Any transport or non-2xx/3xx failure yields a profile whose
    /// `best_strategy` is ROBUST rather than a specific recommendation — there is no
    /// enough information yet to pick something narrower.
    pub async fn analyze(&self, url: &str, proxy: Option<&Proxy>) -> SiteProfile {
        let mut profile = SiteProfile::new(url);

        let client = match self.build_client(proxy) {
            Ok(c) => c,
            Err(_) => {
                profile.best_strategy = ScrapingStrategy::Robust;
                return profile;
            }
        };

        let start = std::time::Instant::now();
        let response = match client.get(url).send().await {
            Ok(r) => r,
            Err(_) => {
                profile.best_strategy = ScrapingStrategy::Robust;
                return profile;
            }
        };

        let status = response.status().as_u16();
        let headers: std::collections::HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();

        let html = match response.text().await {
            Ok(body) => body,
            Err(_) => {
                profile.best_strategy = ScrapingStrategy::Robust;
                return profile;
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        profile.response_time_ms = elapsed_ms;
        profile.status_code = Some(status);
        profile.headers = headers.clone();
        profile.content_length = html.len();

        if html.is_empty() || status >= 400 {
            profile.best_strategy = ScrapingStrategy::Robust;
            return profile;
        }

        profile.protection = self.protection_detector.detect(&headers, Some(&html), status);
        profile.site_type = detect_site_type(&html);
        profile.raw_html = Some(html);
        profile.best_strategy = select_best_strategy(&profile);

        profile
    }
}

/// Length of text content outside `<script>`/`<style>`/`<noscript>`, the Rust analogue
/// of stripping those tags with BeautifulSoup before measuring `get_text()`.
fn visible_text_length(html: &str) -> usize {
    let document = Html::parse_document(html);
    let strip = Selector::parse("script, style, noscript").unwrap();
    let excluded: HashSet<_> = document.select(&strip).map(|el| el.id()).collect();

    document
        .tree
        .nodes()
        .filter(|node| node.value().is_text())
        .filter(|node| !node.ancestors().any(|a| excluded.contains(&a.id())))
        .map(|node| node.value().as_text().map(|t| t.len()).unwrap_or(0))
        .sum()
}

fn detect_site_type(html: &str) -> SiteType {
    if html.is_empty() {
        return SiteType::Unknown;
    }
    let lower = html.to_lowercase();

    let is_minimal = MINIMAL_CONTENT_SIGNATURES.iter().any(|sig| lower.contains(sig));
    let spa_count = SPA_SIGNATURES.iter().filter(|sig| lower.contains(*sig)).count();
    let text_length = visible_text_length(html);

    if is_minimal && text_length < 500 {
        SiteType::Spa
    } else if spa_count >= 3 && text_length < 2000 {
        SiteType::Hybrid
    } else if spa_count >= 2 {
        SiteType::Hybrid
    } else {
        SiteType::Static
    }
}

fn select_best_strategy(profile: &SiteProfile) -> ScrapingStrategy {
    match profile.protection {
        ProtectionType::Cloudflare => return ScrapingStrategy::Aggressive,
        ProtectionType::Waf | ProtectionType::Bot => return ScrapingStrategy::Robust,
        ProtectionType::RateLimit => return ScrapingStrategy::Standard,
        ProtectionType::Captcha | ProtectionType::None => {}
    }

    match profile.site_type {
        SiteType::Spa => return ScrapingStrategy::Robust,
        SiteType::Hybrid => return ScrapingStrategy::Standard,
        SiteType::Static | SiteType::Unknown => {}
    }

    if profile.response_time_ms < 1000 {
        ScrapingStrategy::Fast
    } else if profile.response_time_ms > 3000 {
        ScrapingStrategy::Robust
    } else {
        ScrapingStrategy::Standard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SiteProfile;

    #[test]
    fn spa_minimal_shell_classified_as_spa() {
        let html = r#"<html><body><div id="root"></div></body></html>"#;
        assert_eq!(detect_site_type(html), SiteType::Spa);
    }

    #[test]
    fn heavy_framework_markers_with_little_text_is_hybrid() {
        let html = r#"<html><body><div data-v-1 class="vue-app"></div>
            <script src="/static/bundle.js"></script>
            <script src="/static/main.js"></script>
            <div id="__next"></div></body></html>"#;
        assert_eq!(detect_site_type(html), SiteType::Hybrid);
    }

    #[test]
    fn plain_markup_is_static() {
        let html = "<html><body><p>hello world, this is a normal page</p></body></html>";
        assert_eq!(detect_site_type(html), SiteType::Static);
    }

    #[test]
    fn strategy_selection_prioritizes_protection_over_site_type() {
        let mut profile = SiteProfile::new("https://example.com");
        profile.protection = ProtectionType::Cloudflare;
        profile.site_type = SiteType::Static;
        assert_eq!(select_best_strategy(&profile), ScrapingStrategy::Aggressive);
    }

    #[test]
    fn fast_response_on_static_site_picks_fast_strategy() {
        let mut profile = SiteProfile::new("https://example.com");
        profile.response_time_ms = 200;
        assert_eq!(select_best_strategy(&profile), ScrapingStrategy::Fast);
    }
}
