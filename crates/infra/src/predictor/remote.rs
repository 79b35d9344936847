//! HTTP client for an external demand prediction service.
//!
//! `POST {url}/api/forecast` with the dense sales history; the response is a
//! per-day curve with bounds and confidence.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use stockwise_forecast::{
    DemandPredictor, ForecastPeriod, PredictedDay, PredictionCurve, PredictionRequest,
    PredictorError,
};

use crate::config::PredictorConfig;

const FORECAST_PATH: &str = "/api/forecast";

/// Request body sent to the prediction service
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ForecastRequestBody<'a> {
    product_id: String,
    product_sku: &'a str,
    historical_data: Vec<HistoricalPoint>,
    period: ForecastPeriod,
    horizon: u32,
    include_seasonality: bool,
    include_trends: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoricalPoint {
    date: NaiveDate,
    quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<u64>,
}

/// Response from the prediction service
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForecastResponseBody {
    model_used: Option<String>,
    model_version: Option<String>,
    accuracy: Option<f64>,
    #[serde(default)]
    predictions: Option<Vec<PredictionPoint>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictionPoint {
    date: NaiveDate,
    predicted_quantity: i64,
    lower_bound: Option<i64>,
    upper_bound: Option<i64>,
    confidence: Option<f64>,
}

impl ForecastResponseBody {
    /// A curve needs predictions and the model's accuracy; a response
    /// missing either is rejected so the engine falls back.
    fn into_curve(self) -> Result<PredictionCurve, PredictorError> {
        let predictions = match self.predictions {
            Some(predictions) if !predictions.is_empty() => predictions,
            _ => return Err(PredictorError::EmptyResponse),
        };
        let accuracy = self
            .accuracy
            .ok_or_else(|| PredictorError::InvalidResponse("response carries no accuracy".into()))?;
        let model_version = match (self.model_used, self.model_version) {
            (Some(model), Some(version)) => format!("{model}_{version}"),
            (Some(model), None) => model,
            (None, Some(version)) => version,
            (None, None) => "REMOTE".to_string(),
        };

        let days = predictions
            .into_iter()
            .map(|p| PredictedDay {
                date: p.date,
                predicted: p.predicted_quantity,
                lower: p.lower_bound.unwrap_or(p.predicted_quantity),
                upper: p.upper_bound.unwrap_or(p.predicted_quantity),
                confidence: p.confidence.unwrap_or(accuracy),
            })
            .collect();

        PredictionCurve::from_days(model_version, accuracy, days)
    }
}

/// Client for the external prediction service.
#[derive(Debug, Clone)]
pub struct RemotePredictor {
    endpoint: String,
    http_client: Client,
}

impl RemotePredictor {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PredictorError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PredictorError::Transport(e.to_string()))?;

        Ok(Self {
            endpoint: format!("{}{FORECAST_PATH}", base_url.trim_end_matches('/')),
            http_client,
        })
    }

    pub fn from_config(config: &PredictorConfig) -> Result<Self, PredictorError> {
        if !config.enabled {
            return Err(PredictorError::Disabled);
        }
        Self::new(&config.url, config.timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn body<'a>(request: &PredictionRequest<'a>) -> ForecastRequestBody<'a> {
        ForecastRequestBody {
            product_id: request.product_id.to_string(),
            product_sku: request.sku,
            historical_data: request
                .history
                .iter()
                .map(|d| HistoricalPoint {
                    date: d.date,
                    quantity: d.quantity,
                    price: d.unit_price,
                })
                .collect(),
            period: request.period,
            horizon: request.horizon,
            include_seasonality: request.include_seasonality,
            include_trends: request.include_trends,
        }
    }
}

fn transport_error(err: reqwest::Error) -> PredictorError {
    if err.is_timeout() {
        PredictorError::Timeout
    } else if err.is_decode() {
        PredictorError::InvalidResponse(err.to_string())
    } else {
        PredictorError::Transport(err.to_string())
    }
}

impl DemandPredictor for RemotePredictor {
    fn name(&self) -> &str {
        "remote"
    }

    fn predict(&self, request: &PredictionRequest<'_>) -> Result<PredictionCurve, PredictorError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&Self::body(request))
            .send()
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(PredictorError::Transport(format!(
                "prediction service returned {}",
                response.status()
            )));
        }

        let body: Option<ForecastResponseBody> = response.json().map_err(transport_error)?;
        body.ok_or(PredictorError::EmptyResponse)?.into_curve()
    }
}
