// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Query Composer
//!
//! Builds the query text sent to the remote service. A base query is combined
//! with watermark predicates (and optionally a forced "deleted rows only"
//! condition) while any trailing `LIMIT` clause is kept at the very end.
//!
//! The same helpers build the record-count query used by the chunking
//! decision and the max-watermark query.

use crate::domain::entities::WatermarkType;
use crate::domain::errors::{ExtractError, Result};
use chrono::{NaiveDate, NaiveDateTime};

const SOURCE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000Z";
const SOURCE_DATE_FORMAT: &str = "%Y-%m-%d";
const SOURCE_HOUR_FORMAT: &str = "%H";

/// Internal watermark encoding, e.g. `20240115103000`.
const WATERMARK_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Returns the trailing ` limit <n>` clause of `query` (case-insensitive),
/// or an empty string. Columns such as `LimitAmount` are not a limit.
pub fn limit_clause(query: &str) -> &str {
    // ASCII lowercasing keeps byte offsets valid for the input.
    let idx = match query.to_ascii_lowercase().rfind(" limit") {
        Some(idx) if idx > 0 => idx,
        _ => return "",
    };
    let rest = &query[idx + " limit".len()..];
    let count = rest.trim();
    let bare = rest.starts_with(char::is_whitespace)
        && !count.is_empty()
        && count.bytes().all(|b| b.is_ascii_digit());
    if bare {
        &query[idx..]
    } else {
        ""
    }
}

/// Returns everything from the first ` where ` onwards, or an empty string.
pub fn existing_predicate(query: &str) -> &str {
    match query.to_ascii_lowercase().find(" where ") {
        Some(idx) if idx > 0 => &query[idx..],
        _ => "",
    }
}

/// Appends one condition conjunctively.
///
/// The first condition opens a `where` clause; later ones are wrapped in
/// parentheses and joined with `and`. The query must not carry a limit,
/// ordering, grouping or having clause at this point.
pub fn add_predicate(query: &str, condition: &str) -> Result<String> {
    let condition = condition.trim();
    if condition.is_empty() {
        return Ok(query.to_string());
    }

    let normalized = query.to_ascii_lowercase();
    if !normalized.contains(" from ") {
        return Err(ExtractError::Query(format!("query does not contain 'from': {}", query)));
    }
    for keyword in [" by ", " having ", " limit "] {
        if normalized.contains(keyword) {
            return Err(ExtractError::Query(format!(
                "cannot add a predicate after '{}': {}",
                keyword.trim(),
                query
            )));
        }
    }

    if normalized.contains(" where ") {
        Ok(format!("{} and ({})", query, condition))
    } else {
        Ok(format!("{} where {}", query, condition))
    }
}

/// Composes the extraction query.
///
/// `deleted_marker` forces `<marker> = true`, which is how the soft-delete
/// fallback restricts a query to logically deleted rows.
pub fn compose_query(base: &str, predicates: &[String], deleted_marker: Option<&str>) -> Result<String> {
    if predicates.is_empty() && deleted_marker.is_none() {
        return Ok(base.to_string());
    }

    let limit = limit_clause(base);
    let mut query = base[..base.len() - limit.len()].to_string();

    for predicate in predicates {
        query = add_predicate(&query, predicate)?;
    }
    if let Some(marker) = deleted_marker {
        query = add_predicate(&query, &format!("{} = true", marker))?;
    }

    query.push_str(limit);
    Ok(query)
}

/// Builds `SELECT COUNT() FROM <entity>` restricted like the base query.
/// A limit on the base query is dropped.
pub fn count_query(entity: &str, base: &str, predicates: &[String]) -> Result<String> {
    let scoped = format!("SELECT COUNT() FROM {}{}", entity, existing_predicate(base));
    let limit = limit_clause(&scoped).len();
    let mut query = scoped[..scoped.len() - limit].to_string();
    for predicate in predicates {
        query = add_predicate(&query, predicate)?;
    }
    Ok(query)
}

/// Builds the query selecting the single largest non-null watermark value.
pub fn watermark_query(entity: &str, base: &str, column: &str, predicates: &[String]) -> Result<String> {
    let scoped = format!("SELECT {} FROM {}{}", column, entity, existing_predicate(base));
    let limit = limit_clause(&scoped).len();
    let mut query = scoped[..scoped.len() - limit].to_string();
    for predicate in predicates {
        query = add_predicate(&query, predicate)?;
    }
    query = add_predicate(&query, &format!("{} != null", column))?;
    query.push_str(&format!(" ORDER BY {} desc LIMIT 1", column));
    Ok(query)
}

/// A watermark bound such as `LastModifiedDate >= 2024-01-15T10:30:00.000Z`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    /// Watermark value in the internal encoding (`yyyyMMddHHmmss` for
    /// timestamps, `yyyyMMdd` for dates, `yyyyMMddHH` for hours).
    pub value: i64,
    pub operator: String,
    pub kind: WatermarkType,
}

impl Predicate {
    pub fn new(column: &str, value: i64, operator: &str, kind: WatermarkType) -> Self {
        Self {
            column: column.to_string(),
            value,
            operator: operator.to_string(),
            kind,
        }
    }

    /// Renders the condition in the source's literal syntax.
    pub fn condition(&self) -> Result<String> {
        let raw = self.value.to_string();
        let literal = match self.kind {
            WatermarkType::Simple => raw,
            WatermarkType::Timestamp => parse_internal(&raw, "%Y%m%d%H%M%S")?
                .format(SOURCE_TIMESTAMP_FORMAT)
                .to_string(),
            WatermarkType::Hour => parse_internal(&format!("{}0000", raw), "%Y%m%d%H%M%S")?
                .format(SOURCE_HOUR_FORMAT)
                .to_string(),
            WatermarkType::Date => NaiveDate::parse_from_str(&raw, "%Y%m%d")
                .map_err(|e| ExtractError::Query(format!("invalid date watermark {}: {}", raw, e)))?
                .format(SOURCE_DATE_FORMAT)
                .to_string(),
        };
        Ok(format!("{} {} {}", self.column, self.operator, literal))
    }
}

fn parse_internal(raw: &str, format: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, format)
        .map_err(|e| ExtractError::Query(format!("invalid watermark {}: {}", raw, e)))
}

/// Converts a watermark value returned by the source into the internal
/// `yyyyMMddHHmmss` encoding. Sub-second and zone suffixes are ignored.
pub fn parse_high_watermark(value: &str, kind: WatermarkType) -> Result<i64> {
    let value = value.trim();
    let parsed = match kind {
        WatermarkType::Simple => {
            return value
                .parse::<i64>()
                .map_err(|e| ExtractError::Decode(format!("watermark '{}' is not numeric: {}", value, e)));
        }
        WatermarkType::Date => {
            let prefix = value.get(..10).unwrap_or(value);
            NaiveDateTime::parse_from_str(&format!("{}T00:00:00", prefix), "%Y-%m-%dT%H:%M:%S")
        }
        WatermarkType::Timestamp | WatermarkType::Hour => {
            let prefix = value.get(..19).unwrap_or(value);
            NaiveDateTime::parse_from_str(prefix, "%Y-%m-%dT%H:%M:%S")
        }
    };

    let ts = parsed.map_err(|e| ExtractError::Decode(format!("invalid watermark '{}': {}", value, e)))?;
    ts.format(WATERMARK_TIMESTAMP_FORMAT)
        .to_string()
        .parse::<i64>()
        .map_err(|e| ExtractError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_clause_is_case_insensitive() {
        assert_eq!(limit_clause("SELECT Id FROM Account LIMIT 10"), " LIMIT 10");
        assert_eq!(limit_clause("select Id from Account limit 5"), " limit 5");
        assert_eq!(limit_clause("SELECT Id FROM Account"), "");
        assert_eq!(limit_clause("SELECT Id FROM Account limit 5 "), " limit 5 ");
    }

    #[test]
    fn test_limit_prefixed_columns_are_not_a_limit() {
        assert_eq!(limit_clause("SELECT Id, LimitAmount FROM Opportunity"), "");
        assert_eq!(limit_clause("SELECT Id FROM Opportunity WHERE LimitAmount > 5"), "");
        assert_eq!(limit_clause("SELECT Id, LimitAmount FROM Opportunity LIMIT 7"), " LIMIT 7");

        let query = compose_query("SELECT Id, LimitAmount FROM Opportunity", &["Id > '0'".to_string()], None).unwrap();
        assert_eq!(query, "SELECT Id, LimitAmount FROM Opportunity where Id > '0'");

        let query =
            compose_query("SELECT Id, LimitAmount FROM Opportunity LIMIT 7", &["Id > '0'".to_string()], None).unwrap();
        assert_eq!(query, "SELECT Id, LimitAmount FROM Opportunity where Id > '0' LIMIT 7");
    }

    #[test]
    fn test_compose_without_predicates_is_identity() {
        let q = "SELECT Id FROM Account LIMIT 10";
        assert_eq!(compose_query(q, &[], None).unwrap(), q);
    }

    #[test]
    fn test_compose_keeps_limit_at_end() {
        let q = compose_query(
            "SELECT Id, Name FROM Account LiMiT 100",
            &["SystemModstamp >= 2024-01-01T00:00:00.000Z".into(), "Name != null".into()],
            None,
        )
        .unwrap();
        assert_eq!(
            q,
            "SELECT Id, Name FROM Account where SystemModstamp >= 2024-01-01T00:00:00.000Z and (Name != null) LiMiT 100"
        );
    }

    #[test]
    fn test_compose_with_deleted_marker() {
        let q = compose_query("SELECT Id FROM Account where Type = 'X'", &[], Some("IsDeleted")).unwrap();
        assert_eq!(q, "SELECT Id FROM Account where Type = 'X' and (IsDeleted = true)");
    }

    #[test]
    fn test_add_predicate_rejects_queries_without_from() {
        assert!(matches!(add_predicate("SELECT 1", "a = b"), Err(ExtractError::Query(_))));
        assert!(matches!(
            add_predicate("SELECT Id FROM Account ORDER BY Id", "a = b"),
            Err(ExtractError::Query(_))
        ));
    }

    #[test]
    fn test_count_query_reuses_existing_where_and_drops_limit() {
        let q = count_query(
            "Account",
            "SELECT Id FROM Account WHERE Type = 'A' LIMIT 50",
            &["Id > '0'".into()],
        )
        .unwrap();
        assert_eq!(q, "SELECT COUNT() FROM Account WHERE Type = 'A' and (Id > '0')");
    }

    #[test]
    fn test_watermark_query() {
        let q = watermark_query("Account", "SELECT Id FROM Account", "SystemModstamp", &[]).unwrap();
        assert_eq!(
            q,
            "SELECT SystemModstamp FROM Account where SystemModstamp != null ORDER BY SystemModstamp desc LIMIT 1"
        );
    }

    #[test]
    fn test_predicate_rendering() {
        let ts = Predicate::new("SystemModstamp", 20240115103000, ">=", WatermarkType::Timestamp);
        assert_eq!(ts.condition().unwrap(), "SystemModstamp >= 2024-01-15T10:30:00.000Z");

        let date = Predicate::new("CloseDate", 20240115, "<", WatermarkType::Date);
        assert_eq!(date.condition().unwrap(), "CloseDate < 2024-01-15");

        let hour = Predicate::new("HourCol", 2024011510, "=", WatermarkType::Hour);
        assert_eq!(hour.condition().unwrap(), "HourCol = 10");

        let simple = Predicate::new("Seq", 42, ">", WatermarkType::Simple);
        assert_eq!(simple.condition().unwrap(), "Seq > 42");

        let bad = Predicate::new("SystemModstamp", 2024, ">=", WatermarkType::Timestamp);
        assert!(bad.condition().is_err());
    }

    #[test]
    fn test_parse_high_watermark() {
        assert_eq!(
            parse_high_watermark("2024-01-15T10:30:00.000+0000", WatermarkType::Timestamp).unwrap(),
            20240115103000
        );
        assert_eq!(parse_high_watermark("2024-01-15", WatermarkType::Date).unwrap(), 20240115000000);
        assert_eq!(parse_high_watermark("77", WatermarkType::Simple).unwrap(), 77);
        assert!(parse_high_watermark("yesterday", WatermarkType::Timestamp).is_err());
    }
}
