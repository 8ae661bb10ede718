use crate::config::defaults;
use crate::core::error::{ErrorKind, classify_transport_error};
use crate::model::{ProtectionType, StrategyConfig};
use crate::protection::ProtectionDetector;
use crate::scraper::links::extract_visible_text;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Outcome of a single fetch attempt (§4.7 step 3): a clean success, a detected
/// protection response, or a classified failure.
pub enum FetchOutcome {
    Ok {
        status: u16,
        html: String,
        text: String,
        headers: HashMap<String, String>,
        elapsed_ms: u64,
    },
    Protection(ProtectionType),
    Fail(ErrorKind),
}

/// Performs one HTTP GET with the given strategy's parameters against an
/// already-proxy-configured client, then classifies the response.
pub async fn fetch_once(
    client: &reqwest::Client,
    url: &str,
    strategy: &StrategyConfig,
    detector: &ProtectionDetector,
    user_agent_override: Option<&str>,
) -> FetchOutcome {
    let mut request = client
        .get(url)
        .timeout(Duration::from_secs_f64(strategy.timeout_s));
    if let Some(ua) = user_agent_override {
        request = request.header(reqwest::header::USER_AGENT, ua);
    }
    if strategy.custom_headers {
        request = request
            .header(reqwest::header::ACCEPT_LANGUAGE, defaults::FALLBACK_ACCEPT_LANGUAGE)
            .header(reqwest::header::ACCEPT, defaults::ACCEPT_HEADER);
    }

    let start = Instant::now();
    let response = match request.send().await {
        Ok(r) => r,
        Err(err) => return FetchOutcome::Fail(classify_transport_error(&err)),
    };

    let status = response.status().as_u16();
    let headers: HashMap<String, String> = response
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();

    if status == 429 {
        return FetchOutcome::Protection(ProtectionType::RateLimit);
    }

    let html = match response.text().await {
        Ok(body) => body,
        Err(_) => return FetchOutcome::Fail(ErrorKind::NoResponse),
    };
    let elapsed_ms = start.elapsed().as_millis() as u64;

    let protection = detector.detect(&headers, Some(&html), status);
    if protection != ProtectionType::None {
        return FetchOutcome::Protection(protection);
    }

    if status >= 400 {
        return FetchOutcome::Fail(ErrorKind::NotFound);
    }

    let text = extract_visible_text(&html);
    if text.len() < defaults::MIN_CONTENT_LENGTH_BYTES {
        return FetchOutcome::Fail(ErrorKind::EmptyContent);
    }

    FetchOutcome::Ok {
        status,
        html,
        text,
        headers,
        elapsed_ms,
    }
}
