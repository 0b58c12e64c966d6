//! Validation: raw extracted items → [`FundRecord`]s.
//!
//! Pure and total: every input item ends up either as a record or as a
//! [`Rejection`] with the first reason it failed. Checks run in the order
//! fund id → date → price.

use crate::model::FundRecord;
use crate::output::{RejectReason, Rejection, ValidationReport};
use crate::registry::FundRegistry;
use crate::store::decimal_from_number;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

/// Field names accepted for the fund identifier, in priority order.
/// `idFund` is the key older report prompts asked the model for.
const FUND_ID_KEYS: [&str; 2] = ["fundId", "idFund"];

static RE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})[-/](\d{1,2})[-/](\d{1,2})(?:[T ].*)?$").unwrap()
});

/// Validate every item against the registry and the value schema.
pub fn validate_items(items: &[Value], registry: &FundRegistry) -> ValidationReport {
    items
        .iter()
        .enumerate()
        .fold(ValidationReport::default(), |mut report, (index, item)| {
            match validate_item(item, registry) {
                Ok(record) => report.records.push(record),
                Err(reason) => report.rejects.push(Rejection { index, reason }),
            }
            report
        })
}

/// Validate a single item.
pub fn validate_item(item: &Value, registry: &FundRegistry) -> Result<FundRecord, RejectReason> {
    let obj = item.as_object().ok_or(RejectReason::NotAnObject)?;

    let fund_id = fund_id(obj)?;
    if !registry.contains(&fund_id) {
        return Err(RejectReason::UnknownFund(fund_id));
    }

    let date = match obj.get("date") {
        Some(Value::String(s)) if !s.trim().is_empty() => {
            normalize_date(s).ok_or_else(|| RejectReason::InvalidDate(s.clone()))?
        }
        _ => return Err(RejectReason::MissingDate),
    };

    let price = parse_price(obj.get("price"))?;

    Ok(FundRecord::new(fund_id, date, price))
}

fn fund_id(obj: &Map<String, Value>) -> Result<String, RejectReason> {
    FUND_ID_KEYS
        .iter()
        .filter_map(|k| obj.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .ok_or(RejectReason::MissingFundId)
}

/// Parse `YYYY-MM-DD` or `YYYY/MM/DD` (an optional time suffix is ignored).
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let caps = RE_DATE.captures(raw.trim())?;
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let day = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_price(value: Option<&Value>) -> Result<Decimal, RejectReason> {
    let price = match value {
        None | Some(Value::Null) => return Err(RejectReason::MissingPrice),
        Some(Value::Number(n)) => {
            decimal_from_number(n).ok_or_else(|| RejectReason::InvalidPrice(n.to_string()))?
        }
        Some(Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                return Err(RejectReason::MissingPrice);
            }
            Decimal::from_str(t)
                .or_else(|_| Decimal::from_scientific(t))
                .map_err(|_| RejectReason::InvalidPrice(s.clone()))?
        }
        Some(other) => return Err(RejectReason::InvalidPrice(other.to_string())),
    };
    if price.is_sign_negative() && !price.is_zero() {
        return Err(RejectReason::NegativePrice(price.to_string()));
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::KnownFund;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn registry() -> FundRegistry {
        FundRegistry::new(vec![KnownFund::new("A", "Alpha"), KnownFund::new("B", "Beta")])
    }

    #[test]
    fn keeps_valid_and_reports_distinct_reasons() {
        let items = vec![
            json!({"fundId": "A", "date": "2025-06-18", "price": 1234.54}),
            json!({"fundId": "B", "date": "2025-06-18", "price": -1}),
            json!({"fundId": "Z", "date": "2025-06-18", "price": 1}),
            json!({"fundId": "B", "date": "2025-06-18", "price": 123.54}),
        ];
        let report = validate_items(&items, &registry());
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].price, dec!(1234.54));
        assert_eq!(report.records[1].fund_id, "B");

        assert_eq!(report.rejects.len(), 2);
        assert_eq!(report.rejects[0].index, 1);
        assert!(matches!(report.rejects[0].reason, RejectReason::NegativePrice(_)));
        assert_eq!(report.rejects[1].reason, RejectReason::UnknownFund("Z".into()));
    }

    #[test]
    fn accepts_legacy_key_and_string_price() {
        let item = json!({"idFund": "A", "date": "2025/06/18", "price": "123.54777"});
        let rec = validate_item(&item, &registry()).unwrap();
        assert_eq!(rec.fund_id, "A");
        assert_eq!(rec.date_key(), "2025-06-18");
        assert_eq!(rec.price, dec!(123.54777));
    }

    #[test]
    fn number_price_keeps_all_digits() {
        let item = json!({"fundId": "A", "date": "2025-06-18", "price": 121231233.54});
        assert_eq!(validate_item(&item, &registry()).unwrap().price, dec!(121231233.54));
    }

    #[test]
    fn seventeen_digit_number_price_is_exact() {
        // Parsed from text, as a model reply is; an f64 would end in ...787.
        let item: Value = serde_json::from_str(
            r#"{"fundId": "A", "date": "2025-06-18", "price": 12345678.123456789}"#,
        )
        .unwrap();
        assert_eq!(
            validate_item(&item, &registry()).unwrap().price,
            dec!(12345678.123456789)
        );
    }

    #[test]
    fn missing_fields() {
        let reg = registry();
        assert_eq!(validate_item(&json!([1]), &reg), Err(RejectReason::NotAnObject));
        assert_eq!(
            validate_item(&json!({"date": "2025-06-18", "price": 1}), &reg),
            Err(RejectReason::MissingFundId)
        );
        assert_eq!(
            validate_item(&json!({"fundId": "A", "date": "", "price": 1}), &reg),
            Err(RejectReason::MissingDate)
        );
        assert_eq!(
            validate_item(&json!({"fundId": "A", "date": "2025-06-18"}), &reg),
            Err(RejectReason::MissingPrice)
        );
        assert_eq!(
            validate_item(&json!({"fundId": "A", "date": "2025-06-18", "price": null}), &reg),
            Err(RejectReason::MissingPrice)
        );
    }

    #[test]
    fn invalid_values() {
        let reg = registry();
        assert_eq!(
            validate_item(&json!({"fundId": "A", "date": "yesterday", "price": 1}), &reg),
            Err(RejectReason::InvalidDate("yesterday".into()))
        );
        assert_eq!(
            validate_item(&json!({"fundId": "A", "date": "2025-02-30", "price": 1}), &reg),
            Err(RejectReason::InvalidDate("2025-02-30".into()))
        );
        assert_eq!(
            validate_item(&json!({"fundId": "A", "date": "2025-06-18", "price": "n/a"}), &reg),
            Err(RejectReason::InvalidPrice("n/a".into()))
        );
        assert!(matches!(
            validate_item(&json!({"fundId": "A", "date": "2025-06-18", "price": true}), &reg),
            Err(RejectReason::InvalidPrice(_))
        ));
    }

    #[test]
    fn zero_price_is_allowed() {
        let item = json!({"fundId": "A", "date": "2025-06-18", "price": 0});
        assert_eq!(validate_item(&item, &registry()).unwrap().price, Decimal::ZERO);
    }

    #[test]
    fn date_with_time_suffix() {
        assert_eq!(
            normalize_date("2025-06-18T00:00:00Z"),
            NaiveDate::from_ymd_opt(2025, 6, 18)
        );
        assert_eq!(normalize_date("18/06/2025"), None);
    }
}
