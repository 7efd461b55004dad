use regex::{Regex, RegexBuilder};

/// A hostname pattern as written in site lists and resolver aliases.
///
/// * `example.com` matches only that host.
/// * `.example.com` matches the domain and every subdomain.
/// * `*` wildcards match any run of characters (`*.example.com`).
/// * `re:` introduces a case-insensitive regular expression.
#[derive(Debug, Clone)]
pub enum HostPattern {
    Exact(String),
    Suffix(String),
    Wildcard(String),
    Regex(Regex),
}

#[derive(Debug, thiserror::Error)]
#[error("invalid host pattern {pattern:?}: {message}")]
pub struct PatternError {
    pub pattern: String,
    pub message: String,
}

impl HostPattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PatternError {
                pattern: raw.to_string(),
                message: "empty pattern".to_string(),
            });
        }
        if let Some(expression) = trimmed.strip_prefix("re:") {
            return RegexBuilder::new(expression)
                .case_insensitive(true)
                .build()
                .map(HostPattern::Regex)
                .map_err(|err| PatternError {
                    pattern: raw.to_string(),
                    message: err.to_string(),
                });
        }
        let lowered = trimmed.to_ascii_lowercase();
        if lowered.contains('*') {
            return Ok(HostPattern::Wildcard(lowered));
        }
        if let Some(domain) = lowered.strip_prefix('.') {
            return Ok(HostPattern::Suffix(domain.to_string()));
        }
        Ok(HostPattern::Exact(lowered))
    }

    /// `host` must already be normalized with [`normalize_host`].
    pub fn matches(&self, host: &str) -> bool {
        match self {
            HostPattern::Exact(expected) => host == expected,
            HostPattern::Suffix(domain) => {
                host == domain
                    || host
                        .strip_suffix(domain.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
            HostPattern::Wildcard(pattern) => wildcard_match(pattern, host),
            HostPattern::Regex(regex) => regex.is_match(host),
        }
    }
}

/// Lowercases `host` and strips any port, IPv6 brackets and trailing dot.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let host = if let Some(rest) = host.strip_prefix('[') {
        rest.split(']').next().unwrap_or(rest)
    } else if host.matches(':').count() == 1 {
        host.split(':').next().unwrap_or(host)
    } else {
        host
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn wildcard_match(pattern: &str, value: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return false,
    };
    if !value.starts_with(first) {
        return false;
    }
    let mut pos = first.len();

    let Some((last, middle)) = rest.split_last() else {
        return value == *first;
    };
    for part in middle {
        if part.is_empty() {
            continue;
        }
        match value[pos..].find(part) {
            Some(index) => pos += index + part.len(),
            None => return false,
        }
    }
    value.len() >= pos + last.len() && value.ends_with(last)
}
