use serde::{Deserialize, Serialize};
use std::fmt;

/// Billable product a quota decision applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Sessions,
    Errors,
    Logs,
    Traces,
    Metrics,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Sessions => "sessions",
            ProductType::Errors => "errors",
            ProductType::Logs => "logs",
            ProductType::Traces => "traces",
            ProductType::Metrics => "metrics",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage threshold that triggers a quota notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThresholdBucket {
    EightyPercent,
    HundredPercent,
}

impl ThresholdBucket {
    /// Highest bucket crossed by `percent_used` (1.0 = 100%) for a product.
    ///
    /// Only log and trace ingestion notify.
    pub fn crossed(product: ProductType, percent_used: f64) -> Option<Self> {
        if !matches!(product, ProductType::Logs | ProductType::Traces) {
            return None;
        }

        if percent_used >= 1.0 {
            Some(ThresholdBucket::HundredPercent)
        } else if percent_used >= 0.8 {
            Some(ThresholdBucket::EightyPercent)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdBucket::EightyPercent => "80%",
            ThresholdBucket::HundredPercent => "100%",
        }
    }
}

impl fmt::Display for ThresholdBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the billing evaluator for one workspace
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaUsage {
    pub within_quota: bool,
    /// Fraction of the plan limit used, 1.0 = 100%
    pub percent_used: f64,
}

/// Kind of backend instrumentation a project has been seen sending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendSetupKind {
    Logs,
    Traces,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_buckets() {
        assert_eq!(ThresholdBucket::crossed(ProductType::Logs, 0.5), None);
        assert_eq!(
            ThresholdBucket::crossed(ProductType::Logs, 0.8),
            Some(ThresholdBucket::EightyPercent)
        );
        assert_eq!(
            ThresholdBucket::crossed(ProductType::Traces, 1.3),
            Some(ThresholdBucket::HundredPercent)
        );
        assert_eq!(ThresholdBucket::crossed(ProductType::Sessions, 2.0), None);
    }
}
