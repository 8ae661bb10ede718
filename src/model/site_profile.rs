//! Site profile data model (§3 SiteProfile, §4.5 Site Analyzer, §4.6 Strategy Selector).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SiteType {
    Static,
    Spa,
    Hybrid,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtectionType {
    None,
    Cloudflare,
    Waf,
    Captcha,
    RateLimit,
    Bot,
}

impl ProtectionType {
    pub fn is_blocking(self) -> bool {
        matches!(
            self,
            ProtectionType::Cloudflare | ProtectionType::Captcha | ProtectionType::Bot
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScrapingStrategy {
    Fast,
    Standard,
    Robust,
    Aggressive,
}

impl ScrapingStrategy {
    pub const ALL: [ScrapingStrategy; 4] = [
        ScrapingStrategy::Fast,
        ScrapingStrategy::Standard,
        ScrapingStrategy::Robust,
        ScrapingStrategy::Aggressive,
    ];
}

/// Built once per company; immutable after construction (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteProfile {
    pub url: String,
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    pub content_length: usize,
    pub site_type: SiteType,
    pub protection: ProtectionType,
    pub best_strategy: ScrapingStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
    #[serde(skip)]
    pub headers: HashMap<String, String>,
}

impl SiteProfile {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status_code: None,
            response_time_ms: 0,
            content_length: 0,
            site_type: SiteType::Unknown,
            protection: ProtectionType::None,
            best_strategy: ScrapingStrategy::Standard,
            raw_html: None,
            headers: HashMap::new(),
        }
    }
}

/// A retry recommendation returned alongside a protection classification (§4.4).
#[derive(Debug, Clone, Serialize)]
pub struct RetryRecommendation {
    pub can_retry: bool,
    pub delay_s: f64,
    pub change_strategy: bool,
    pub recommended_strategy: Option<ScrapingStrategy>,
}

/// A configuration bundle backing one named strategy (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub timeout_s: f64,
    pub use_proxy: bool,
    pub rotate_user_agent: bool,
    #[serde(default)]
    pub rotate_proxy: bool,
    pub retry_count: u32,
    pub delay_between_requests_s: f64,
    #[serde(default)]
    pub custom_headers: bool,
}
