//! Glob matching for URL and origin lists from configuration.

/// Compiled glob pattern for URL matching.
///
/// Compiles once; invalid patterns fall back to exact matching.
#[derive(Debug, Clone)]
pub struct UrlPattern {
	source: String,
	pattern: Option<glob::Pattern>,
}

impl UrlPattern {
	pub fn new(pattern: &str) -> Self {
		Self {
			source: pattern.to_string(),
			pattern: glob::Pattern::new(pattern).ok(),
		}
	}

	/// Returns `true` if the URL matches this pattern.
	pub fn is_match(&self, url: &str) -> bool {
		match &self.pattern {
			Some(pattern) => pattern.matches(url),
			None => self.source == url,
		}
	}

	pub fn as_str(&self) -> &str {
		&self.source
	}
}

/// Ordered list of patterns; matches when any pattern does.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
	patterns: Vec<UrlPattern>,
}

impl PatternSet {
	pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
		Self {
			patterns: patterns.iter().map(|p| UrlPattern::new(p.as_ref())).collect(),
		}
	}

	pub fn is_match(&self, url: &str) -> bool {
		self.patterns.iter().any(|p| p.is_match(url))
	}

	pub fn is_empty(&self) -> bool {
		self.patterns.is_empty()
	}
}
