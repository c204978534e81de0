//! Header mapping and per-row field validation for sub-activity imports.
//!
//! Parsing never fails the file: every problem becomes a row error (the row is
//! skipped) or a row warning (a default is substituted).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

use crate::planning::{ActivityDetails, ActivityType, BudgetCalculationType, BudgetLine};
use crate::sheet_parser::RawRecord;

pub const COL_MAIN_ACTIVITY_NAME: &str = "main_activity_name";
pub const COL_NAME: &str = "name";

/// Columns the file must carry for any row to be importable.
pub const REQUIRED_COLUMNS: [&str; 2] = [COL_MAIN_ACTIVITY_NAME, COL_NAME];

/// Every column understood by the importer, in template order.
pub const IMPORT_COLUMNS: [&str; 18] = [
    "main_activity_name",
    "name",
    "activity_type",
    "description",
    "budget_calculation_type",
    "estimated_cost_with_tool",
    "estimated_cost_without_tool",
    "government_treasury",
    "sdg_funding",
    "partners_funding",
    "other_funding",
    "organization_id",
    "training_details",
    "meeting_workshop_details",
    "procurement_details",
    "printing_details",
    "supervision_details",
    "partners_details",
];

/// A validated line of the import file.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRow {
    pub line: usize,
    pub main_activity_name: String,
    pub name: String,
    pub activity_type: ActivityType,
    pub description: Option<String>,
    pub budget_calculation_type: BudgetCalculationType,
    pub estimated_cost_with_tool: Decimal,
    pub estimated_cost_without_tool: Decimal,
    pub government_treasury: Decimal,
    pub sdg_funding: Decimal,
    pub partners_funding: Decimal,
    pub other_funding: Decimal,
    pub organization_id: Option<i64>,
    pub details: ActivityDetails,
}

impl ImportRow {
    pub fn budget_line(&self) -> BudgetLine {
        BudgetLine {
            budget_calculation_type: self.budget_calculation_type,
            activity_type: self.activity_type,
            estimated_cost_with_tool: self.estimated_cost_with_tool,
            estimated_cost_without_tool: self.estimated_cost_without_tool,
            government_treasury: self.government_treasury,
            sdg_funding: self.sdg_funding,
            partners_funding: self.partners_funding,
            other_funding: self.other_funding,
            details: self.details.clone(),
        }
    }
}

/// Problems found on one row.
#[derive(Debug, Default)]
pub struct RowIssues {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl RowIssues {
    pub fn error(&mut self, line: usize, field: &str, reason: impl AsRef<str>) {
        self.errors
            .push(format!("Row {}: {}: {}", line, field, reason.as_ref()));
    }

    pub fn warning(&mut self, line: usize, field: &str, reason: impl AsRef<str>) {
        self.warnings
            .push(format!("Row {}: {}: {}", line, field, reason.as_ref()));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Column name → index, built once per file from normalized headers.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    index: HashMap<String, usize>,
}

impl ColumnMap {
    pub fn new(headers: &[String]) -> Self {
        let mut index = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            // First occurrence wins on duplicated headers
            index.entry(header.clone()).or_insert(i);
        }
        Self { index }
    }

    /// Required columns absent from the header.
    pub fn missing_required(&self) -> Vec<String> {
        REQUIRED_COLUMNS
            .iter()
            .filter(|c| !self.index.contains_key(**c))
            .map(|c| c.to_string())
            .collect()
    }

    /// Recognised columns present in the header, in template order.
    pub fn known_columns(&self) -> Vec<&'static str> {
        IMPORT_COLUMNS
            .iter()
            .copied()
            .filter(|c| self.index.contains_key(*c))
            .collect()
    }

    /// Trimmed cell value; missing column or short row reads as empty.
    fn get<'a>(&self, record: &'a RawRecord, column: &str) -> &'a str {
        self.index
            .get(column)
            .and_then(|&i| record.values.get(i))
            .map(|v| v.trim())
            .unwrap_or("")
    }
}

/// Validate one record. Returns `None` when the row has errors.
pub fn parse_row(columns: &ColumnMap, record: &RawRecord, issues: &mut RowIssues) -> Option<ImportRow> {
    let line = record.line;

    let main_activity_name = columns.get(record, COL_MAIN_ACTIVITY_NAME).to_string();
    if main_activity_name.is_empty() {
        issues.error(line, COL_MAIN_ACTIVITY_NAME, "is required");
    }

    let name = columns.get(record, COL_NAME).to_string();
    if name.is_empty() {
        issues.error(line, COL_NAME, "is required");
    }

    let raw_type = columns.get(record, "activity_type");
    let activity_type = match ActivityType::parse(raw_type) {
        Some(t) => t,
        None => {
            if raw_type.is_empty() {
                issues.warning(line, "activity_type", "missing, defaulting to Other");
            } else {
                issues.warning(
                    line,
                    "activity_type",
                    format!("unrecognised value '{}', defaulting to Other", raw_type),
                );
            }
            ActivityType::Other
        }
    };

    let description = Some(columns.get(record, "description"))
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    let raw_calc = columns.get(record, "budget_calculation_type");
    let budget_calculation_type = match BudgetCalculationType::parse(raw_calc) {
        Some(c) => c,
        None => {
            issues.warning(
                line,
                "budget_calculation_type",
                format!("unrecognised value '{}', defaulting to WITHOUT_TOOL", raw_calc),
            );
            BudgetCalculationType::WithoutTool
        }
    };

    let mut amount = |column: &str| -> Decimal {
        match parse_amount(columns.get(record, column)) {
            Ok(value) => value,
            Err(reason) => {
                issues.error(line, column, reason);
                Decimal::ZERO
            }
        }
    };
    let estimated_cost_with_tool = amount("estimated_cost_with_tool");
    let estimated_cost_without_tool = amount("estimated_cost_without_tool");
    let government_treasury = amount("government_treasury");
    let sdg_funding = amount("sdg_funding");
    let partners_funding = amount("partners_funding");
    let other_funding = amount("other_funding");

    let raw_org = columns.get(record, "organization_id");
    let organization_id = if raw_org.is_empty() {
        None
    } else {
        match parse_id(raw_org) {
            Some(id) => Some(id),
            None => {
                issues.error(
                    line,
                    "organization_id",
                    format!("'{}' is not a valid organization id", raw_org),
                );
                None
            }
        }
    };

    let mut detail =
        |column: &str| parse_details(columns.get(record, column), line, column, &mut *issues);
    let details = ActivityDetails {
        training: detail("training_details"),
        meeting_workshop: detail("meeting_workshop_details"),
        procurement: detail("procurement_details"),
        printing: detail("printing_details"),
        supervision: detail("supervision_details"),
        partners: detail("partners_details"),
    };

    if issues.has_errors() {
        return None;
    }

    let row = ImportRow {
        line,
        main_activity_name,
        name,
        activity_type,
        description,
        budget_calculation_type,
        estimated_cost_with_tool,
        estimated_cost_without_tool,
        government_treasury,
        sdg_funding,
        partners_funding,
        other_funding,
        organization_id,
        details,
    };

    if row.budget_line().funding_gap().is_none() {
        issues.error(line, "funding", "amounts too large to total");
        return None;
    }
    Some(row)
}

/// Non-negative decimal. Blank reads as zero; thousands separators are dropped.
pub fn parse_amount(raw: &str) -> Result<Decimal, String> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let value = Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| format!("'{}' is not a number", raw.trim()))?;

    if value.is_sign_negative() && !value.is_zero() {
        return Err(format!("'{}' must not be negative", raw.trim()));
    }
    Ok(value.normalize())
}

/// Integer id. Spreadsheets often hand back `2.0` for `2`.
fn parse_id(raw: &str) -> Option<i64> {
    if let Ok(id) = raw.parse::<i64>() {
        return Some(id);
    }
    let value = Decimal::from_str(raw).ok()?;
    if value.fract().is_zero() {
        value.to_i64()
    } else {
        None
    }
}

fn parse_details(
    raw: &str,
    line: usize,
    column: &str,
    issues: &mut RowIssues,
) -> serde_json::Map<String, serde_json::Value> {
    if raw.is_empty() {
        return serde_json::Map::new();
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(serde_json::Value::Null) => serde_json::Map::new(),
        Ok(_) => {
            issues.warning(line, column, "expected a JSON object, using {}");
            serde_json::Map::new()
        }
        Err(e) => {
            issues.warning(line, column, format!("invalid JSON ({}), using {{}}", e));
            serde_json::Map::new()
        }
    }
}
