/// Number of code points of the path kept in a derived pattern.
pub const MAX_PATTERN_CHARS: usize = 40;

/// Builds GA4 `PARTIAL_REGEXP` patterns for the `pagePath` dimension.
#[derive(Debug, Clone, Default)]
pub struct PatternBuilder {
    site_prefix: Option<String>,
}

impl PatternBuilder {
    pub fn new(site_prefix: Option<&str>) -> Self {
        Self {
            site_prefix: site_prefix
                .filter(|prefix| !prefix.is_empty())
                .map(str::to_string),
        }
    }

    pub fn site_prefix(&self) -> Option<&str> {
        self.site_prefix.as_deref()
    }

    /// Strips the site prefix, keeps the first 40 characters and escapes
    /// everything the regex engine would otherwise interpret.
    pub fn build(&self, url: &str) -> String {
        regex::escape(&self.path_fragment(url))
    }

    /// The literal text a derived pattern matches, before escaping.
    pub fn path_fragment(&self, url: &str) -> String {
        let path = match &self.site_prefix {
            Some(prefix) => url.strip_prefix(prefix.as_str()).unwrap_or(url),
            None => url,
        };
        path.chars().take(MAX_PATTERN_CHARS).collect()
    }

    /// A per-row pattern wins over the derived one; blank cells do not count.
    pub fn resolve(&self, url: &str, custom: Option<&str>) -> ResolvedPattern {
        match custom.map(str::trim).filter(|p| !p.is_empty()) {
            Some(pattern) => ResolvedPattern {
                pattern: pattern.to_string(),
                source: PatternSource::Custom,
            },
            None => ResolvedPattern {
                pattern: self.build(url),
                source: PatternSource::Derived,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternSource {
    Custom,
    Derived,
}

impl PatternSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternSource::Custom => "custom",
            PatternSource::Derived => "derived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPattern {
    pub pattern: String,
    pub source: PatternSource,
}
