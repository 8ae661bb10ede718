//! Site analyzer: a single HTTP probe classifying a site's type, protection, and
//! SPA/minimal-content signals. Retrying on proxy error is left to the caller, which
//! already retries with a fresh proxy per strategy attempt.

mod analyzer;

pub use analyzer::SiteAnalyzer;
