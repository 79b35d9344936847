use serde::{Deserialize, Serialize};

use stockwise_core::DomainError;

/// Granularity tag carried on a forecast.
///
/// The local model always predicts per day; the tag is stored on snapshots and
/// forwarded to the remote predictor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForecastPeriod {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl ForecastPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            ForecastPeriod::Daily => "DAILY",
            ForecastPeriod::Weekly => "WEEKLY",
            ForecastPeriod::Monthly => "MONTHLY",
        }
    }
}

impl core::fmt::Display for ForecastPeriod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ForecastPeriod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(ForecastPeriod::Daily),
            "WEEKLY" => Ok(ForecastPeriod::Weekly),
            "MONTHLY" => Ok(ForecastPeriod::Monthly),
            other => Err(DomainError::validation(format!(
                "unknown forecast period: {other}"
            ))),
        }
    }
}
