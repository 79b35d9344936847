use serde::{Deserialize, Serialize};

/// Snapshots whose stockout horizon is at or under this many days are at risk.
pub const AT_RISK_DAYS: u32 = 14;

/// Stockout risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Tier for a stockout horizon; `None` means demand never exhausts stock.
    pub fn assess(days_until_stockout: Option<u32>) -> Self {
        match days_until_stockout {
            Some(d) if d <= 3 => RiskLevel::Critical,
            Some(d) if d <= 7 => RiskLevel::High,
            Some(d) if d <= AT_RISK_DAYS => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    pub fn suggested_action(self) -> &'static str {
        match self {
            RiskLevel::Critical => "Place emergency order immediately",
            RiskLevel::High => "Order within 1-2 days",
            RiskLevel::Medium => "Schedule order for next week",
            RiskLevel::Low => "Monitor stock levels",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl core::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
