use chrono::{DateTime, Utc};

use stockwise_forecast::{AT_RISK_DAYS, DemandForecast, RiskLevel};
use stockwise_inventory::{Product, StockStatus};

use crate::intent::{AlertIntent, AlertKind, AlertSeverity};

const PRODUCT_ENTITY: &str = "Product";

pub fn should_alert_low_stock(product: &Product) -> bool {
    product.stock_status().needs_attention()
}

pub fn should_alert_forecast(forecast: &DemandForecast) -> bool {
    forecast
        .days_until_stockout
        .is_some_and(|d| d <= AT_RISK_DAYS)
}

/// Low-stock or out-of-stock alert; `None` while the product is in stock.
pub fn low_stock_alert(product: &Product, raised_at: DateTime<Utc>) -> Option<AlertIntent> {
    if !should_alert_low_stock(product) {
        return None;
    }

    let out = product.stock_status() == StockStatus::OutOfStock;
    let (kind, severity, title, state) = if out {
        (AlertKind::OutOfStock, AlertSeverity::Critical, "Out of Stock Alert", "out of stock")
    } else {
        (AlertKind::LowStock, AlertSeverity::High, "Low Stock Alert", "running low")
    };

    Some(AlertIntent {
        entity_type: PRODUCT_ENTITY.to_string(),
        entity_id: product.id_typed(),
        kind,
        severity,
        title: title.to_string(),
        message: format!(
            "Product {} ({}) is {state}. Current stock: {}, Reorder level: {}",
            product.name(),
            product.sku(),
            product.current_stock(),
            product.reorder_level()
        ),
        suggested_action: format!("Reorder {} units", product.reorder_quantity()),
        raised_at,
    })
}

/// Stockout-risk alert for a forecast snapshot; `None` unless it is at risk.
pub fn forecast_alert(
    product: &Product,
    forecast: &DemandForecast,
    raised_at: DateTime<Utc>,
) -> Option<AlertIntent> {
    let days = forecast.days_until_stockout.filter(|d| *d <= AT_RISK_DAYS)?;

    let severity = match RiskLevel::assess(Some(days)) {
        RiskLevel::Critical => AlertSeverity::Critical,
        RiskLevel::High => AlertSeverity::High,
        _ => AlertSeverity::Medium,
    };

    Some(AlertIntent {
        entity_type: PRODUCT_ENTITY.to_string(),
        entity_id: forecast.product_id,
        kind: AlertKind::StockoutForecast,
        severity,
        title: "Stockout Risk Alert".to_string(),
        message: format!(
            "Forecast alert: product {} ({}) is predicted to run out of stock in {days} days. \
             Current stock: {}, Reorder level: {}",
            product.name(),
            product.sku(),
            forecast.current_stock,
            product.reorder_level()
        ),
        suggested_action: forecast.suggested_action().to_string(),
        raised_at,
    })
}

pub fn restock_suggestion_alert(
    product: &Product,
    suggested_quantity: i64,
    reason: &str,
    raised_at: DateTime<Utc>,
) -> AlertIntent {
    AlertIntent {
        entity_type: PRODUCT_ENTITY.to_string(),
        entity_id: product.id_typed(),
        kind: AlertKind::RestockSuggestion,
        severity: AlertSeverity::Medium,
        title: "Restock Suggestion".to_string(),
        message: format!(
            "Suggests restocking {} ({}). Suggested quantity: {suggested_quantity} units. Reason: {reason}",
            product.name(),
            product.sku()
        ),
        suggested_action: format!("Create a reorder request for {suggested_quantity} units"),
        raised_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use stockwise_core::{Aggregate, AggregateId, RecordId, UserId};
    use stockwise_forecast::ForecastPeriod;
    use stockwise_inventory::{ProductCommand, ProductId, RegisterProduct};

    fn product_with_stock(stock: i64) -> Product {
        let id = ProductId::new(AggregateId::new());
        let mut product = Product::empty(id);
        let events = product
            .handle(&ProductCommand::RegisterProduct(RegisterProduct {
                product_id: id,
                sku: "SKU-7".to_string(),
                name: "Bolt".to_string(),
                reorder_level: 20,
                reorder_quantity: 50,
                unit_price: None,
                initial_stock: stock,
                opening_movement_id: RecordId::new(),
                actor: UserId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        for e in &events {
            product.apply(e);
        }
        product
    }

    fn snapshot(product: &Product, days: Option<u32>) -> DemandForecast {
        DemandForecast {
            product_id: product.id_typed(),
            as_of: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            computed_at: Utc::now(),
            period: ForecastPeriod::Daily,
            predicted_demand: 70,
            lower_bound: 49,
            upper_bound: 91,
            confidence_score: 0.75,
            current_stock: product.current_stock(),
            recommended_restock: 100,
            days_until_stockout: days,
            is_at_risk: days.is_some_and(|d| d <= 14),
            model_version: "LOCAL_SMA_V1".to_string(),
        }
    }

    #[test]
    fn in_stock_raises_nothing() {
        assert!(low_stock_alert(&product_with_stock(21), Utc::now()).is_none());
    }

    #[test]
    fn low_stock_is_high_and_out_of_stock_is_critical() {
        let low = low_stock_alert(&product_with_stock(20), Utc::now()).unwrap();
        assert_eq!(low.kind, AlertKind::LowStock);
        assert_eq!(low.severity, AlertSeverity::High);
        assert_eq!(
            low.message,
            "Product Bolt (SKU-7) is running low. Current stock: 20, Reorder level: 20"
        );

        let out = low_stock_alert(&product_with_stock(0), Utc::now()).unwrap();
        assert_eq!(out.kind, AlertKind::OutOfStock);
        assert_eq!(out.severity, AlertSeverity::Critical);
        assert_eq!(out.entity_type, "Product");
    }

    #[test]
    fn forecast_severity_tracks_days() {
        let product = product_with_stock(50);
        let cases = [
            (Some(3), Some(AlertSeverity::Critical)),
            (Some(7), Some(AlertSeverity::High)),
            (Some(14), Some(AlertSeverity::Medium)),
            (Some(15), None),
            (None, None),
        ];
        for (days, expected) in cases {
            let forecast = snapshot(&product, days);
            assert_eq!(should_alert_forecast(&forecast), expected.is_some());
            assert_eq!(
                forecast_alert(&product, &forecast, Utc::now()).map(|a| a.severity),
                expected,
                "{days:?}"
            );
        }
    }

    #[test]
    fn forecast_alert_carries_suggested_action() {
        let product = product_with_stock(50);
        let alert = forecast_alert(&product, &snapshot(&product, Some(10)), Utc::now()).unwrap();
        assert_eq!(alert.suggested_action, "Schedule order for next week");
        assert_eq!(alert.dedup_key(), (AlertKind::StockoutForecast, product.id_typed()));
    }
}
