//! Planning hierarchy types touched by the sub-activity importer.
//!
//! Organizations and main activities are reference data; sub-activities and
//! their budgets are what the importer creates.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A unit in the organizational tree (ministry, directorate, regional office...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub org_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
}

/// A unit of work under a strategic initiative. Parent of sub-activities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainActivity {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiative_id: Option<i64>,
    /// Owning organization, used to disambiguate main activities sharing a name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActivityType {
    Training,
    Meeting,
    Procurement,
    Printing,
    Supervision,
    #[default]
    Other,
}

impl ActivityType {
    /// Case-insensitive parse. Returns `None` for unknown or blank input.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "training" => Some(Self::Training),
            "meeting" => Some(Self::Meeting),
            "procurement" => Some(Self::Procurement),
            "printing" => Some(Self::Printing),
            "supervision" => Some(Self::Supervision),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Whether the cost comes from the costing tool or is entered directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BudgetCalculationType {
    WithTool,
    #[default]
    WithoutTool,
}

impl BudgetCalculationType {
    /// Accepts `WITH_TOOL` / `WITHOUT_TOOL` in any case, with spaces or hyphens
    /// in place of the underscore.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();

        match normalized.as_str() {
            "WITH_TOOL" => Some(Self::WithTool),
            "WITHOUT_TOOL" => Some(Self::WithoutTool),
            _ => None,
        }
    }
}

/// Free-form detail blobs, one per activity kind. The shape of each object is
/// owned by the costing tool, so they are kept as opaque JSON objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityDetails {
    #[serde(default, rename = "training_details")]
    pub training: serde_json::Map<String, serde_json::Value>,
    #[serde(default, rename = "meeting_workshop_details")]
    pub meeting_workshop: serde_json::Map<String, serde_json::Value>,
    #[serde(default, rename = "procurement_details")]
    pub procurement: serde_json::Map<String, serde_json::Value>,
    #[serde(default, rename = "printing_details")]
    pub printing: serde_json::Map<String, serde_json::Value>,
    #[serde(default, rename = "supervision_details")]
    pub supervision: serde_json::Map<String, serde_json::Value>,
    #[serde(default, rename = "partners_details")]
    pub partners: serde_json::Map<String, serde_json::Value>,
}

/// Costs and funding of one activity, without persistence identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetLine {
    pub budget_calculation_type: BudgetCalculationType,
    pub activity_type: ActivityType,
    pub estimated_cost_with_tool: Decimal,
    pub estimated_cost_without_tool: Decimal,
    pub government_treasury: Decimal,
    pub sdg_funding: Decimal,
    pub partners_funding: Decimal,
    pub other_funding: Decimal,
    #[serde(flatten)]
    pub details: ActivityDetails,
}

/// Display classification of a funding gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingStatus {
    /// Funding falls short of the estimated cost.
    Gap,
    /// Fully funded or over-funded.
    Covered,
}

impl BudgetLine {
    /// The cost selected by the calculation type.
    pub fn estimated_cost(&self) -> Decimal {
        match self.budget_calculation_type {
            BudgetCalculationType::WithTool => self.estimated_cost_with_tool,
            BudgetCalculationType::WithoutTool => self.estimated_cost_without_tool,
        }
    }

    /// Sum of the four funding sources. `None` if the sum overflows.
    pub fn total_funding(&self) -> Option<Decimal> {
        self.government_treasury
            .checked_add(self.sdg_funding)?
            .checked_add(self.partners_funding)?
            .checked_add(self.other_funding)
    }

    /// Negative when the activity is over-funded. `None` on overflow.
    pub fn funding_gap(&self) -> Option<Decimal> {
        self.estimated_cost().checked_sub(self.total_funding()?)
    }

    pub fn funding_status(&self) -> Option<FundingStatus> {
        let status = if self.funding_gap()? > Decimal::ZERO {
            FundingStatus::Gap
        } else {
            FundingStatus::Covered
        };
        Some(status)
    }
}

/// Persisted budget owned by a sub-activity.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityBudget {
    pub id: i64,
    pub sub_activity_id: i64,
    #[serde(flatten)]
    pub line: BudgetLine,
}

/// Fields needed to create a sub-activity.
#[derive(Debug, Clone)]
pub struct NewSubActivity {
    pub main_activity_id: i64,
    pub organization_id: i64,
    pub name: String,
    pub activity_type: ActivityType,
    pub description: Option<String>,
}

/// Line item under a main activity, carrying its own budget.
#[derive(Debug, Clone, Serialize)]
pub struct SubActivity {
    pub id: i64,
    pub main_activity_id: i64,
    pub organization_id: i64,
    pub name: String,
    pub activity_type: ActivityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SubActivity {
    pub fn display_name(&self) -> String {
        format!("Sub-Activity: {}", self.name)
    }
}

/// Sub-activity joined with its budget and derived figures, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SubActivitySummary {
    #[serde(flatten)]
    pub sub_activity: SubActivity,
    pub main_activity_name: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<ActivityBudget>,
    pub estimated_cost: Decimal,
    pub total_funding: Option<Decimal>,
    pub funding_gap: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_status: Option<FundingStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(calc: BudgetCalculationType) -> BudgetLine {
        BudgetLine {
            budget_calculation_type: calc,
            activity_type: ActivityType::Training,
            estimated_cost_with_tool: dec!(50000),
            estimated_cost_without_tool: dec!(12000),
            government_treasury: dec!(30000),
            sdg_funding: dec!(10000),
            partners_funding: dec!(5000),
            other_funding: dec!(5000),
            details: ActivityDetails::default(),
        }
    }

    #[test]
    fn test_estimated_cost_follows_calculation_type() {
        assert_eq!(line(BudgetCalculationType::WithTool).estimated_cost(), dec!(50000));
        assert_eq!(line(BudgetCalculationType::WithoutTool).estimated_cost(), dec!(12000));
    }

    #[test]
    fn test_unselected_cost_does_not_change_estimate() {
        let mut budget = line(BudgetCalculationType::WithTool);
        budget.estimated_cost_without_tool = dec!(999999);
        assert_eq!(budget.estimated_cost(), dec!(50000));
    }

    #[test]
    fn test_funding_totals_and_gap() {
        let budget = line(BudgetCalculationType::WithTool);
        assert_eq!(budget.total_funding(), Some(dec!(50000)));
        assert_eq!(budget.funding_gap(), Some(dec!(0)));
        assert_eq!(budget.funding_status(), Some(FundingStatus::Covered));
    }

    #[test]
    fn test_negative_gap_when_over_funded() {
        let budget = line(BudgetCalculationType::WithoutTool);
        assert_eq!(budget.funding_gap(), Some(dec!(-38000)));
        assert_eq!(budget.funding_status(), Some(FundingStatus::Covered));

        let mut short = line(BudgetCalculationType::WithTool);
        short.sdg_funding = dec!(0);
        assert_eq!(short.funding_gap(), Some(dec!(10000)));
        assert_eq!(short.funding_status(), Some(FundingStatus::Gap));
    }

    #[test]
    fn test_overflowing_totals_are_none() {
        let mut budget = line(BudgetCalculationType::WithTool);
        budget.government_treasury = Decimal::MAX;
        budget.sdg_funding = Decimal::MAX;
        assert_eq!(budget.total_funding(), None);
        assert_eq!(budget.funding_gap(), None);
        assert_eq!(budget.funding_status(), None);

        let mut gap = line(BudgetCalculationType::WithoutTool);
        gap.estimated_cost_without_tool = Decimal::MAX;
        gap.government_treasury = dec!(0);
        gap.sdg_funding = dec!(0);
        gap.partners_funding = dec!(0);
        gap.other_funding = dec!(0);
        assert_eq!(gap.funding_gap(), Some(Decimal::MAX));
    }

    #[test]
    fn test_amounts_serialize_as_exact_strings() {
        let mut budget = line(BudgetCalculationType::WithTool);
        budget.government_treasury = dec!(9007199254740993.25);
        let json = serde_json::to_value(&budget).unwrap();
        assert_eq!(json["government_treasury"], "9007199254740993.25");
        assert_eq!(json["budget_calculation_type"], "WITH_TOOL");
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!(ActivityType::parse(" TRAINING "), Some(ActivityType::Training));
        assert_eq!(ActivityType::parse("Workshop"), None);
        assert_eq!(
            BudgetCalculationType::parse("with tool"),
            Some(BudgetCalculationType::WithTool)
        );
        assert_eq!(
            BudgetCalculationType::parse("Without-Tool"),
            Some(BudgetCalculationType::WithoutTool)
        );
        assert_eq!(BudgetCalculationType::parse("manual"), None);
    }

    #[test]
    fn test_details_serialize_with_column_names() {
        let mut details = ActivityDetails::default();
        details
            .training
            .insert("participants".to_string(), serde_json::json!(25));
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["training_details"]["participants"], 25);
        assert!(json["partners_details"].as_object().unwrap().is_empty());
    }
}
