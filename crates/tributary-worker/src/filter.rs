use tributary_core::types::LogRow;

const DEFAULT_NOISE_PREFIXES: &[&str] = &[
    "ENOENT: no such file or directory",
    "connect ECONNREFUSED",
];

/// Drops log rows whose body starts with a known noisy prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoiseFilter {
    prefixes: Vec<String>,
}

impl NoiseFilter {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// A filter that keeps every row
    pub fn disabled() -> Self {
        Self {
            prefixes: Vec::new(),
        }
    }

    pub fn is_noise(&self, body: &str) -> bool {
        self.prefixes.iter().any(|prefix| body.starts_with(prefix))
    }

    /// Keep the rows that are not noise; returns how many were dropped.
    pub fn retain(&self, rows: &mut Vec<LogRow>) -> usize {
        let before = rows.len();
        rows.retain(|row| !self.is_noise(&row.body));
        before - rows.len()
    }
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self::new(DEFAULT_NOISE_PREFIXES.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prefixes() {
        let filter = NoiseFilter::default();
        assert!(filter.is_noise("ENOENT: no such file or directory, open '/app/.next'"));
        assert!(filter.is_noise("connect ECONNREFUSED 127.0.0.1:5432"));
        assert!(!filter.is_noise("Error: connect ECONNREFUSED 127.0.0.1:5432"));
        assert!(!filter.is_noise("user signed in"));
    }

    #[test]
    fn test_disabled_keeps_everything() {
        assert!(!NoiseFilter::disabled().is_noise("connect ECONNREFUSED"));
    }
}
