use crate::model::{ProtectionType, ScrapingStrategy, SiteProfile, SiteType, StrategyConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// JSON-configurable tables backing strategy selection (§4.6). Loaded from a side-file
/// so operators can retune priorities without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyBundle {
    #[serde(default = "default_protection_strategies")]
    pub protection_strategies: HashMap<ProtectionType, Vec<ScrapingStrategy>>,
    #[serde(default = "default_site_type_strategies")]
    pub site_type_strategies: HashMap<SiteType, Vec<ScrapingStrategy>>,
    #[serde(default = "default_strategy_configs")]
    pub strategy_configs: HashMap<ScrapingStrategy, StrategyConfig>,
}

impl Default for StrategyBundle {
    fn default() -> Self {
        Self {
            protection_strategies: default_protection_strategies(),
            site_type_strategies: default_site_type_strategies(),
            strategy_configs: default_strategy_configs(),
        }
    }
}

impl StrategyBundle {
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

use ScrapingStrategy::*;

fn default_protection_strategies() -> HashMap<ProtectionType, Vec<ScrapingStrategy>> {
    HashMap::from([
        (ProtectionType::None, vec![Fast, Standard, Robust]),
        (ProtectionType::Cloudflare, vec![Aggressive, Robust, Standard]),
        (ProtectionType::Waf, vec![Robust, Aggressive, Standard]),
        (ProtectionType::Captcha, vec![Aggressive, Robust]),
        (ProtectionType::RateLimit, vec![Standard, Robust]),
        (ProtectionType::Bot, vec![Aggressive, Robust, Standard]),
    ])
}

fn default_site_type_strategies() -> HashMap<SiteType, Vec<ScrapingStrategy>> {
    HashMap::from([
        (SiteType::Static, vec![Fast, Standard, Robust]),
        (SiteType::Spa, vec![Robust, Aggressive, Standard]),
        (SiteType::Hybrid, vec![Standard, Robust, Aggressive]),
        (SiteType::Unknown, vec![Standard, Fast, Robust, Aggressive]),
    ])
}

fn default_strategy_configs() -> HashMap<ScrapingStrategy, StrategyConfig> {
    HashMap::from([
        (
            Fast,
            StrategyConfig {
                timeout_s: 10.0,
                use_proxy: true,
                rotate_user_agent: false,
                rotate_proxy: false,
                retry_count: 1,
                delay_between_requests_s: 0.1,
                custom_headers: false,
            },
        ),
        (
            Standard,
            StrategyConfig {
                timeout_s: 15.0,
                use_proxy: true,
                rotate_user_agent: false,
                rotate_proxy: false,
                retry_count: 2,
                delay_between_requests_s: 0.5,
                custom_headers: false,
            },
        ),
        (
            Robust,
            StrategyConfig {
                timeout_s: 20.0,
                use_proxy: true,
                rotate_user_agent: true,
                rotate_proxy: false,
                retry_count: 3,
                delay_between_requests_s: 1.0,
                custom_headers: false,
            },
        ),
        (
            Aggressive,
            StrategyConfig {
                timeout_s: 25.0,
                use_proxy: true,
                rotate_user_agent: true,
                rotate_proxy: true,
                retry_count: 3,
                delay_between_requests_s: 2.0,
                custom_headers: true,
            },
        ),
    ])
}

pub struct StrategySelector {
    bundle: StrategyBundle,
}

impl StrategySelector {
    pub fn new(bundle: StrategyBundle) -> Self {
        Self { bundle }
    }

    /// Ordered list of strategies to try for the main page, per §4.6: protection (if
    /// any) takes priority over site type, every strategy appears exactly once, and
    /// response time can bump FAST or ROBUST to the front.
    pub fn select(&self, profile: &SiteProfile) -> Vec<ScrapingStrategy> {
        let mut combined = if profile.protection != ProtectionType::None {
            self.bundle
                .protection_strategies
                .get(&profile.protection)
                .or_else(|| self.bundle.protection_strategies.get(&ProtectionType::None))
                .cloned()
                .unwrap_or_default()
        } else {
            self.bundle
                .site_type_strategies
                .get(&profile.site_type)
                .or_else(|| self.bundle.site_type_strategies.get(&SiteType::Unknown))
                .cloned()
                .unwrap_or_default()
        };

        for strat in ScrapingStrategy::ALL {
            if !combined.contains(&strat) {
                combined.push(strat);
            }
        }

        if profile.response_time_ms > 5000 {
            if let Some(pos) = combined.iter().position(|s| *s == Robust) {
                combined.remove(pos);
                combined.insert(0, Robust);
            }
        } else if profile.response_time_ms < 500 && profile.site_type == SiteType::Static {
            if let Some(pos) = combined.iter().position(|s| *s == Fast) {
                combined.remove(pos);
                combined.insert(0, Fast);
            }
        }

        combined
    }

    /// Fallback cascade for a subpage, seeded with whatever strategy worked on the main
    /// page (§4.6).
    pub fn select_for_subpage(&self, main_strategy: ScrapingStrategy) -> Vec<ScrapingStrategy> {
        let mut strategies = vec![main_strategy];
        let fallbacks: &[ScrapingStrategy] = match main_strategy {
            Fast => &[Standard, Robust],
            Standard => &[Fast, Robust],
            Robust => &[Standard, Aggressive],
            Aggressive => &[Robust, Standard],
        };
        strategies.extend_from_slice(fallbacks);
        strategies
    }

    pub fn get_strategy_config(&self, strategy: ScrapingStrategy) -> StrategyConfig {
        self.bundle
            .strategy_configs
            .get(&strategy)
            .cloned()
            .unwrap_or_else(|| self.bundle.strategy_configs[&Standard].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> StrategySelector {
        StrategySelector::new(StrategyBundle::default())
    }

    #[test]
    fn protection_takes_priority_over_site_type() {
        let s = selector();
        let mut profile = SiteProfile::new("https://example.com");
        profile.protection = ProtectionType::Cloudflare;
        profile.site_type = SiteType::Static;
        let strategies = s.select(&profile);
        assert_eq!(strategies[0], Aggressive);
    }

    #[test]
    fn every_strategy_appears_exactly_once() {
        let s = selector();
        let profile = SiteProfile::new("https://example.com");
        let strategies = s.select(&profile);
        assert_eq!(strategies.len(), 4);
        for strat in ScrapingStrategy::ALL {
            assert_eq!(strategies.iter().filter(|s| **s == strat).count(), 1);
        }
    }

    #[test]
    fn slow_site_prioritizes_robust() {
        let s = selector();
        let mut profile = SiteProfile::new("https://example.com");
        profile.response_time_ms = 6000;
        let strategies = s.select(&profile);
        assert_eq!(strategies[0], Robust);
    }

    #[test]
    fn fast_static_site_prioritizes_fast() {
        let s = selector();
        let mut profile = SiteProfile::new("https://example.com");
        profile.response_time_ms = 200;
        profile.site_type = SiteType::Static;
        let strategies = s.select(&profile);
        assert_eq!(strategies[0], Fast);
    }

    #[test]
    fn subpage_fallback_for_robust_tries_standard_then_aggressive() {
        let s = selector();
        assert_eq!(s.select_for_subpage(Robust), vec![Robust, Standard, Aggressive]);
    }
}
