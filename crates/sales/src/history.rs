use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::record::SaleRecord;

/// Sales for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub quantity: i64,
    /// Last unit price sold at that day, if any sale happened.
    pub unit_price: Option<u64>,
}

/// Dense, zero-filled daily series over `[start, end]` (inclusive).
///
/// Records outside the window are ignored. An inverted window yields an empty
/// series. Callers pass records of a single product.
pub fn dense_daily_series<'a, I>(records: I, start: NaiveDate, end: NaiveDate) -> Vec<DailySales>
where
    I: IntoIterator<Item = &'a SaleRecord>,
{
    if start > end {
        return Vec::new();
    }

    // date -> (quantity, latest (sold_at, unit_price))
    let mut buckets: BTreeMap<NaiveDate, (i64, Option<(DateTime<Utc>, u64)>)> = BTreeMap::new();
    for record in records {
        if record.sale_date < start || record.sale_date > end {
            continue;
        }
        let bucket = buckets.entry(record.sale_date).or_insert((0, None));
        bucket.0 += record.quantity;
        match bucket.1 {
            Some((at, _)) if at > record.sold_at => {}
            _ => bucket.1 = Some((record.sold_at, record.unit_price)),
        }
    }

    let mut series = Vec::new();
    let mut day = start;
    loop {
        let (quantity, priced) = buckets.get(&day).copied().unwrap_or((0, None));
        series.push(DailySales {
            date: day,
            quantity,
            unit_price: priced.map(|(_, price)| price),
        });
        if day >= end {
            break;
        }
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }
    series
}

pub fn total_quantity(series: &[DailySales]) -> i64 {
    series.iter().map(|d| d.quantity).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};
    use stockwise_core::{AggregateId, RecordId};
    use stockwise_inventory::ProductId;

    use crate::record::SaleReferences;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sale(day: NaiveDate, hour: u32, quantity: i64, unit_price: u64) -> SaleRecord {
        let sold_at = Utc
            .with_ymd_and_hms(day.year(), day.month(), day.day(), hour, 0, 0)
            .unwrap();
        SaleRecord {
            id: RecordId::new(),
            product_id: ProductId::new(AggregateId::new()),
            movement_id: RecordId::new(),
            sale_date: day,
            sold_at,
            quantity,
            unit_price,
            total_amount: quantity as u64 * unit_price,
            references: SaleReferences::default(),
        }
    }

    #[test]
    fn gaps_are_zero_filled_and_bounds_inclusive() {
        let records = vec![
            sale(date(2024, 1, 1), 9, 3, 100),
            sale(date(2024, 1, 4), 9, 5, 100),
        ];

        let series = dense_daily_series(&records, date(2024, 1, 1), date(2024, 1, 5));

        let quantities: Vec<i64> = series.iter().map(|d| d.quantity).collect();
        assert_eq!(quantities, vec![3, 0, 0, 5, 0]);
        assert_eq!(series[1].unit_price, None);
        assert_eq!(total_quantity(&series), 8);
    }

    #[test]
    fn same_day_sales_are_summed_with_latest_price() {
        let records = vec![
            sale(date(2024, 2, 10), 15, 2, 900),
            sale(date(2024, 2, 10), 8, 1, 1_000),
        ];

        let series = dense_daily_series(&records, date(2024, 2, 10), date(2024, 2, 10));

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].quantity, 3);
        assert_eq!(series[0].unit_price, Some(900));
    }

    #[test]
    fn out_of_window_records_are_ignored() {
        let records = vec![
            sale(date(2023, 12, 31), 9, 10, 100),
            sale(date(2024, 1, 2), 9, 1, 100),
            sale(date(2024, 1, 3), 9, 10, 100),
        ];
        let series = dense_daily_series(&records, date(2024, 1, 1), date(2024, 1, 2));
        assert_eq!(total_quantity(&series), 1);
    }

    #[test]
    fn inverted_window_is_empty() {
        let records: Vec<SaleRecord> = vec![sale(date(2024, 1, 1), 9, 1, 100)];
        assert!(dense_daily_series(&records, date(2024, 1, 2), date(2024, 1, 1)).is_empty());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// The series has one entry per day and conserves in-window quantity.
            #[test]
            fn series_is_dense_and_conserves_quantity(
                offsets in prop::collection::vec((0u64..60, 1i64..50), 0..40),
                window_start in 0u64..30,
                window_len in 0u64..30,
            ) {
                let base = date(2024, 1, 1);
                let records: Vec<SaleRecord> = offsets
                    .iter()
                    .map(|(off, qty)| sale(base + Days::new(*off), 12, *qty, 100))
                    .collect();

                let start = base + Days::new(window_start);
                let end = start + Days::new(window_len);
                let series = dense_daily_series(&records, start, end);

                prop_assert_eq!(series.len() as u64, window_len + 1);
                let expected: i64 = records
                    .iter()
                    .filter(|r| r.sale_date >= start && r.sale_date <= end)
                    .map(|r| r.quantity)
                    .sum();
                prop_assert_eq!(total_quantity(&series), expected);
            }
        }
    }
}
