use serde::{Deserialize, Serialize};
use std::path::Path;

/// Signature lists used to classify protection from response headers/body (§4.4).
/// Loaded from a JSON side-file so operators can extend detection without a rebuild;
/// falls back to a built-in baseline when the file is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionSignatures {
    #[serde(default = "default_cloudflare_body")]
    pub cloudflare_body_signatures: Vec<String>,
    #[serde(default = "default_cloudflare_headers")]
    pub cloudflare_headers: Vec<String>,
    #[serde(default = "default_waf_body")]
    pub waf_body_signatures: Vec<String>,
    #[serde(default = "default_waf_headers")]
    pub waf_headers: Vec<String>,
    #[serde(default = "default_captcha")]
    pub captcha_signatures: Vec<String>,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_signatures: Vec<String>,
    #[serde(default = "default_bot_detection")]
    pub bot_detection_signatures: Vec<String>,
}

impl Default for ProtectionSignatures {
    fn default() -> Self {
        Self {
            cloudflare_body_signatures: default_cloudflare_body(),
            cloudflare_headers: default_cloudflare_headers(),
            waf_body_signatures: default_waf_body(),
            waf_headers: default_waf_headers(),
            captcha_signatures: default_captcha(),
            rate_limit_signatures: default_rate_limit(),
            bot_detection_signatures: default_bot_detection(),
        }
    }
}

impl ProtectionSignatures {
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

fn default_cloudflare_body() -> Vec<String> {
    strs(&[
        "checking your browser before accessing",
        "cf-browser-verification",
        "cf_chl_",
        "just a moment",
        "ray id",
        "attention required! | cloudflare",
    ])
}

fn default_cloudflare_headers() -> Vec<String> {
    strs(&["cf-ray", "cf-cache-status", "server: cloudflare"])
}

fn default_waf_body() -> Vec<String> {
    strs(&[
        "access denied",
        "request blocked",
        "web application firewall",
        "security check",
        "suspicious activity",
        "mod_security",
    ])
}

fn default_waf_headers() -> Vec<String> {
    strs(&["x-waf", "x-sucuri-id", "x-akamai", "x-imperva"])
}

fn default_captcha() -> Vec<String> {
    strs(&[
        "recaptcha",
        "g-recaptcha",
        "hcaptcha",
        "cf-turnstile",
        "verify you are human",
    ])
}

fn default_rate_limit() -> Vec<String> {
    strs(&[
        "rate limit exceeded",
        "too many requests",
        "slow down",
        "quota exceeded",
    ])
}

fn default_bot_detection() -> Vec<String> {
    strs(&[
        "automated access",
        "unusual traffic",
        "bot detected",
        "please enable javascript and cookies",
    ])
}

fn strs(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
