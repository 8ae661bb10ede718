/// URL helpers shared by the governor, breaker, and scraper for domain bucketing and
/// link deduplication.
pub struct ErrorUtils;

impl ErrorUtils {
    /// Normalize URL for deduplication: drops the fragment, sorts query params, and
    /// trims a trailing slash.
    pub fn normalize_url(url: &str) -> String {
        if let Ok(mut parsed) = url::Url::parse(url) {
            parsed.set_fragment(None);

            if let Some(query) = parsed.query() {
                let mut params: Vec<_> = query.split('&').collect();
                params.sort();
                parsed.set_query(Some(&params.join("&")));
            }

            if parsed.path().ends_with('/') && parsed.path().len() > 1 {
                let trimmed = parsed.path().trim_end_matches('/');
                let mut new_url = parsed.clone();
                new_url.set_path(trimmed);
                return new_url.to_string();
            }

            parsed.to_string()
        } else {
            url.to_string()
        }
    }

    /// Extract the host from a URL, used to bucket governor/breaker state per domain.
    pub fn extract_domain(url: &str) -> Option<String> {
        url::Url::parse(url).ok().and_then(|u| u.host_str().map(|h| h.to_string()))
    }
}
