use crate::core::utils::ErrorUtils;
use scraper::{Html, Selector};
use std::collections::HashSet;

const EXCLUDED_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".ico", ".css", ".js", ".pdf", ".zip",
    ".doc", ".docx", ".xls", ".xlsx", ".mp4", ".mp3", ".avi", ".woff", ".woff2", ".ttf", ".eot",
];

const EXCLUDED_PATH_PATTERNS: &[&str] = &[
    "/wp-content/", "/assets/", "/static/", "/media/", "/uploads/", "/images/", "/img/", "/css/",
    "/js/", "/fonts/",
];

/// Same-origin anchors extracted from `html`, filtered and deduplicated, capped at
/// `max_links` (§4.7 step 6).
pub fn extract_same_origin_links(html: &str, base_url: &str, max_links: usize) -> Vec<String> {
    let Ok(base) = url::Url::parse(base_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let Ok(anchor) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&anchor) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if resolved.host_str() != base.host_str() {
            continue;
        }
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }

        let path_lower = resolved.path().to_lowercase();
        if EXCLUDED_EXTENSIONS.iter().any(|ext| path_lower.ends_with(ext)) {
            continue;
        }
        if EXCLUDED_PATH_PATTERNS.iter().any(|pat| path_lower.contains(pat)) {
            continue;
        }

        let normalized = ErrorUtils::normalize_url(resolved.as_str());
        if seen.insert(normalized.clone()) {
            links.push(normalized);
        }
        if links.len() >= max_links {
            break;
        }
    }

    links
}

/// Visible text of the document with scripts/styles/noscript removed and whitespace
/// collapsed — the extraction half of the Chunker's preprocessing contract (§4.8).
pub fn extract_visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(strip) = Selector::parse("script, style, noscript") else {
        return String::new();
    };
    let excluded: HashSet<_> = document.select(&strip).map(|el| el.id()).collect();

    let raw: String = document
        .tree
        .nodes()
        .filter(|node| node.value().is_text())
        .filter(|node| !node.ancestors().any(|a| excluded.contains(&a.id())))
        .filter_map(|node| node.value().as_text().map(|t| t.as_ref()))
        .collect::<Vec<_>>()
        .join(" ");

    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_only_same_origin_http_links() {
        let html = r#"
            <a href="/about">About</a>
            <a href="https://other.example.com/page">Other</a>
            <a href="mailto:hi@example.com">Mail</a>
            <a href="/docs/file.pdf">PDF</a>
        "#;
        let links = extract_same_origin_links(html, "https://example.com", 50);
        assert_eq!(links, vec!["https://example.com/about"]);
    }

    #[test]
    fn deduplicates_and_caps_at_max_links() {
        let html = (0..10)
            .map(|i| format!(r#"<a href="/page{}">p</a><a href="/page{}">dup</a>"#, i, i))
            .collect::<String>();
        let links = extract_same_origin_links(&html, "https://example.com", 5);
        assert_eq!(links.len(), 5);
    }

    #[test]
    fn excludes_asset_path_patterns() {
        let html = r#"<a href="/static/app.html">asset</a><a href="/contact">contact</a>"#;
        let links = extract_same_origin_links(html, "https://example.com", 50);
        assert_eq!(links, vec!["https://example.com/contact"]);
    }

    #[test]
    fn strips_script_and_style_text() {
        let html = r#"<html><body><script>var x = 1;</script><style>.a{}</style><p>Hello world</p></body></html>"#;
        let text = extract_visible_text(html);
        assert_eq!(text, "Hello world");
    }
}
