use super::signatures::ProtectionSignatures;
use crate::model::{ProtectionType, RetryRecommendation, ScrapingStrategy};
use std::collections::HashMap;

/// Classifies a response as a protection challenge based on status code, headers and
/// body signatures. Status-code short-circuits first, then Cloudflare, then Captcha,
/// WAF, rate limit, bot detection, in that priority order.
pub struct ProtectionDetector {
    signatures: ProtectionSignatures,
}

impl ProtectionDetector {
    pub fn new(signatures: ProtectionSignatures) -> Self {
        Self { signatures }
    }

    pub fn detect(
        &self,
        headers: &HashMap<String, String>,
        body: Option<&str>,
        status_code: u16,
    ) -> ProtectionType {
        let body = body.unwrap_or_default().to_lowercase();
        let headers_lower: HashMap<String, String> = headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.to_lowercase()))
            .collect();

        if status_code == 429 {
            return ProtectionType::RateLimit;
        }

        if status_code == 403 {
            if self.check_rate_limit(&body, &headers_lower) {
                return ProtectionType::RateLimit;
            }
            if self.check_waf(&body, &headers_lower) {
                return ProtectionType::Waf;
            }
        }

        if self.check_cloudflare(&body, &headers_lower) {
            return ProtectionType::Cloudflare;
        }
        if self.check_captcha(&body) {
            return ProtectionType::Captcha;
        }
        if self.check_waf(&body, &headers_lower) {
            return ProtectionType::Waf;
        }
        if self.check_rate_limit(&body, &headers_lower) {
            return ProtectionType::RateLimit;
        }
        if self.check_bot_detection(&body) {
            return ProtectionType::Bot;
        }

        ProtectionType::None
    }

    fn check_cloudflare(&self, body: &str, headers: &HashMap<String, String>) -> bool {
        let top_signatures = &self.signatures.cloudflare_body_signatures[..self
            .signatures
            .cloudflare_body_signatures
            .len()
            .min(5)];
        let has_challenge = top_signatures.iter().any(|sig| body.contains(sig.as_str()));

        let header_hit = self
            .signatures
            .cloudflare_headers
            .iter()
            .any(|h| headers.keys().any(|k| k.contains(h.as_str())));
        if header_hit && has_challenge {
            return true;
        }

        body.contains("cloudflare") && has_challenge
    }

    fn check_waf(&self, body: &str, headers: &HashMap<String, String>) -> bool {
        let header_hit = headers.keys().any(|k| {
            self.signatures
                .waf_headers
                .iter()
                .any(|waf| k.contains(waf.as_str()))
        });
        if header_hit {
            return true;
        }
        let match_count = self
            .signatures
            .waf_body_signatures
            .iter()
            .filter(|sig| body.contains(sig.as_str()))
            .count();
        match_count >= 2
    }

    fn check_captcha(&self, body: &str) -> bool {
        self.signatures
            .captcha_signatures
            .iter()
            .any(|sig| body.contains(sig.as_str()))
    }

    fn check_rate_limit(&self, body: &str, headers: &HashMap<String, String>) -> bool {
        if headers.contains_key("retry-after") {
            return true;
        }
        self.signatures
            .rate_limit_signatures
            .iter()
            .any(|sig| body.contains(sig.as_str()))
    }

    fn check_bot_detection(&self, body: &str) -> bool {
        self.signatures
            .bot_detection_signatures
            .iter()
            .any(|sig| body.contains(sig.as_str()))
    }

    pub fn is_blocking_protection(&self, protection: ProtectionType) -> bool {
        protection.is_blocking()
    }

    pub fn get_retry_recommendation(&self, protection: ProtectionType) -> RetryRecommendation {
        match protection {
            ProtectionType::None => RetryRecommendation {
                can_retry: true,
                delay_s: 0.0,
                change_strategy: false,
                recommended_strategy: None,
            },
            ProtectionType::Cloudflare => RetryRecommendation {
                can_retry: true,
                delay_s: 5.0,
                change_strategy: true,
                recommended_strategy: Some(ScrapingStrategy::Aggressive),
            },
            ProtectionType::Waf => RetryRecommendation {
                can_retry: true,
                delay_s: 3.0,
                change_strategy: true,
                recommended_strategy: Some(ScrapingStrategy::Robust),
            },
            ProtectionType::Captcha => RetryRecommendation {
                can_retry: false,
                delay_s: 0.0,
                change_strategy: false,
                recommended_strategy: None,
            },
            ProtectionType::RateLimit => RetryRecommendation {
                can_retry: true,
                delay_s: 60.0,
                change_strategy: false,
                recommended_strategy: None,
            },
            ProtectionType::Bot => RetryRecommendation {
                can_retry: true,
                delay_s: 10.0,
                change_strategy: true,
                recommended_strategy: Some(ScrapingStrategy::Aggressive),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> ProtectionDetector {
        ProtectionDetector::new(ProtectionSignatures::default())
    }

    #[test]
    fn status_429_is_rate_limit_regardless_of_body() {
        let d = detector();
        let headers = HashMap::new();
        assert_eq!(d.detect(&headers, Some("hello"), 429), ProtectionType::RateLimit);
    }

    #[test]
    fn cloudflare_needs_both_header_and_challenge_body() {
        let d = detector();
        let mut headers = HashMap::new();
        headers.insert("CF-RAY".to_string(), "abc123".to_string());
        let body = "Checking your browser before accessing this site. Just a moment...";
        assert_eq!(d.detect(&headers, Some(body), 200), ProtectionType::Cloudflare);
    }

    #[test]
    fn waf_requires_two_body_signatures() {
        let d = detector();
        let headers = HashMap::new();
        let body = "Access Denied. This request has been blocked by our security check.";
        assert_eq!(d.detect(&headers, Some(body), 200), ProtectionType::Waf);
    }

    #[test]
    fn single_waf_signature_is_not_enough() {
        let d = detector();
        let headers = HashMap::new();
        let body = "access denied for this resource";
        assert_eq!(d.detect(&headers, Some(body), 200), ProtectionType::None);
    }

    #[test]
    fn captcha_signature_detected() {
        let d = detector();
        let headers = HashMap::new();
        let body = "Please complete the g-recaptcha challenge to continue";
        assert_eq!(d.detect(&headers, Some(body), 200), ProtectionType::Captcha);
    }

    #[test]
    fn blocking_classification_matches_spec() {
        let d = detector();
        assert!(d.is_blocking_protection(ProtectionType::Cloudflare));
        assert!(d.is_blocking_protection(ProtectionType::Captcha));
        assert!(d.is_blocking_protection(ProtectionType::Bot));
        assert!(!d.is_blocking_protection(ProtectionType::RateLimit));
        assert!(!d.is_blocking_protection(ProtectionType::Waf));
    }
}
