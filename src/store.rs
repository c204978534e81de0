//! In-memory planning store with row-scoped transactions.
//!
//! Reference data (organizations, main activities) is seeded at startup.
//! Sub-activities and budgets are written through [`PlanningStore::transaction`],
//! which stages writes and applies all of them or none under one write lock.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::PlanningSeed;
use crate::planning::{
    ActivityBudget, BudgetLine, MainActivity, NewSubActivity, Organization, SubActivity,
    SubActivitySummary,
};
use rust_decimal::Decimal;

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Organization not found: {0}")]
    OrganizationNotFound(i64),

    #[error("Main activity not found: {0}")]
    MainActivityNotFound(i64),

    #[error("Duplicate organization id in seed: {0}")]
    DuplicateOrganization(i64),

    #[error("Duplicate main activity id in seed: {0}")]
    DuplicateMainActivity(i64),

    /// A budget was staged for a handle that is not a staged sub-activity.
    #[error("Budget references unknown staged sub-activity #{0}")]
    UnknownStagedSubActivity(usize),

    #[error("Sub-activity #{0} already has a budget")]
    BudgetAlreadyAttached(usize),

    #[error("Sub-activity #{0} was staged without a budget")]
    MissingBudget(usize),
}

#[derive(Debug, Default)]
struct PlanningData {
    organizations: BTreeMap<i64, Organization>,
    main_activities: BTreeMap<i64, MainActivity>,
    sub_activities: BTreeMap<i64, SubActivity>,
    /// Keyed by sub-activity id (one budget per sub-activity).
    budgets: BTreeMap<i64, ActivityBudget>,
    last_sub_activity_id: i64,
    last_budget_id: i64,
}

/// Shared planning store. Cloning shares the underlying data.
#[derive(Debug, Clone, Default)]
pub struct PlanningStore {
    inner: Arc<RwLock<PlanningData>>,
}

/// Handle to a sub-activity staged inside a [`RowTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagedSubActivity(usize);

/// Writes staged for a single row. Nothing is visible until commit.
#[derive(Debug, Default)]
pub struct RowTransaction {
    sub_activities: Vec<NewSubActivity>,
    budgets: Vec<Option<BudgetLine>>,
}

impl RowTransaction {
    pub fn create_sub_activity(&mut self, new: NewSubActivity) -> StagedSubActivity {
        self.sub_activities.push(new);
        self.budgets.push(None);
        StagedSubActivity(self.sub_activities.len() - 1)
    }

    pub fn create_budget(
        &mut self,
        sub_activity: StagedSubActivity,
        line: BudgetLine,
    ) -> Result<(), StoreError> {
        let slot = self
            .budgets
            .get_mut(sub_activity.0)
            .ok_or(StoreError::UnknownStagedSubActivity(sub_activity.0))?;
        if slot.is_some() {
            return Err(StoreError::BudgetAlreadyAttached(sub_activity.0));
        }
        *slot = Some(line);
        Ok(())
    }
}

/// Ids assigned by a successful commit.
#[derive(Debug, Clone, Default)]
pub struct CommitSummary {
    pub sub_activity_ids: Vec<i64>,
    pub budget_ids: Vec<i64>,
}

impl PlanningStore {
    /// Build a store from seeded reference data. Rejects duplicate ids.
    pub fn from_seed(seed: PlanningSeed) -> Result<Self, StoreError> {
        let mut data = PlanningData::default();

        for org in seed.organizations {
            let id = org.id;
            if data.organizations.insert(id, org).is_some() {
                return Err(StoreError::DuplicateOrganization(id));
            }
        }
        for activity in seed.main_activities {
            let id = activity.id;
            if data.main_activities.insert(id, activity).is_some() {
                return Err(StoreError::DuplicateMainActivity(id));
            }
        }

        tracing::debug!(
            "PlanningStore: seeded {} organizations, {} main activities",
            data.organizations.len(),
            data.main_activities.len()
        );

        Ok(Self {
            inner: Arc::new(RwLock::new(data)),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, PlanningData> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PlanningData> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn organization(&self, id: i64) -> Option<Organization> {
        self.read().organizations.get(&id).cloned()
    }

    /// All organizations ordered by name.
    pub fn organizations(&self) -> Vec<Organization> {
        let mut orgs: Vec<Organization> = self.read().organizations.values().cloned().collect();
        orgs.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        orgs
    }

    /// Main activities whose name matches, trimmed and case-insensitive.
    pub fn main_activities_named(&self, name: &str) -> Vec<MainActivity> {
        let wanted = name.trim().to_lowercase();
        self.read()
            .main_activities
            .values()
            .filter(|a| a.name.trim().to_lowercase() == wanted)
            .cloned()
            .collect()
    }

    /// Whether a sub-activity with this name already exists under the main activity.
    pub fn has_sub_activity(&self, main_activity_id: i64, name: &str) -> bool {
        let wanted = name.trim().to_lowercase();
        self.read().sub_activities.values().any(|s| {
            s.main_activity_id == main_activity_id && s.name.trim().to_lowercase() == wanted
        })
    }

    pub fn sub_activity_count(&self) -> usize {
        self.read().sub_activities.len()
    }

    #[cfg(test)]
    pub fn budget_count(&self) -> usize {
        self.read().budgets.len()
    }

    #[cfg(test)]
    pub fn budget_for(&self, sub_activity_id: i64) -> Option<ActivityBudget> {
        self.read().budgets.get(&sub_activity_id).cloned()
    }

    /// Sub-activities ordered by main activity then name, with budget figures.
    pub fn sub_activities(&self) -> Vec<SubActivitySummary> {
        let data = self.read();
        let mut summaries: Vec<SubActivitySummary> = data
            .sub_activities
            .values()
            .map(|sub| {
                let budget = data.budgets.get(&sub.id).cloned();
                let (estimated_cost, total_funding, funding_gap, funding_status) = match &budget {
                    Some(b) => (
                        b.line.estimated_cost(),
                        b.line.total_funding(),
                        b.line.funding_gap(),
                        b.line.funding_status(),
                    ),
                    None => (Decimal::ZERO, Some(Decimal::ZERO), Some(Decimal::ZERO), None),
                };
                SubActivitySummary {
                    main_activity_name: data
                        .main_activities
                        .get(&sub.main_activity_id)
                        .map(|a| a.name.clone())
                        .unwrap_or_default(),
                    display_name: sub.display_name(),
                    sub_activity: sub.clone(),
                    budget,
                    estimated_cost,
                    total_funding,
                    funding_gap,
                    funding_status,
                }
            })
            .collect();

        summaries.sort_by(|a, b| {
            a.main_activity_name
                .to_lowercase()
                .cmp(&b.main_activity_name.to_lowercase())
                .then_with(|| {
                    a.sub_activity
                        .name
                        .to_lowercase()
                        .cmp(&b.sub_activity.name.to_lowercase())
                })
        });
        summaries
    }

    /// Run `f` against a fresh [`RowTransaction`] and commit its writes.
    ///
    /// If `f` fails, or any staged write references missing data, nothing is
    /// applied and earlier commits are untouched.
    pub fn transaction<F>(&self, f: F) -> Result<CommitSummary, StoreError>
    where
        F: FnOnce(&mut RowTransaction) -> Result<(), StoreError>,
    {
        let mut tx = RowTransaction::default();
        f(&mut tx)?;
        self.commit(tx)
    }

    fn commit(&self, tx: RowTransaction) -> Result<CommitSummary, StoreError> {
        let mut data = self.write();

        // Validate everything before touching the maps.
        for (idx, new) in tx.sub_activities.iter().enumerate() {
            if !data.main_activities.contains_key(&new.main_activity_id) {
                return Err(StoreError::MainActivityNotFound(new.main_activity_id));
            }
            if !data.organizations.contains_key(&new.organization_id) {
                return Err(StoreError::OrganizationNotFound(new.organization_id));
            }
            if tx.budgets[idx].is_none() {
                return Err(StoreError::MissingBudget(idx));
            }
        }

        let mut summary = CommitSummary::default();
        for (new, line) in tx.sub_activities.into_iter().zip(tx.budgets) {
            data.last_sub_activity_id += 1;
            let sub_id = data.last_sub_activity_id;
            data.sub_activities.insert(
                sub_id,
                SubActivity {
                    id: sub_id,
                    main_activity_id: new.main_activity_id,
                    organization_id: new.organization_id,
                    name: new.name,
                    activity_type: new.activity_type,
                    description: new.description,
                },
            );
            summary.sub_activity_ids.push(sub_id);

            if let Some(line) = line {
                data.last_budget_id += 1;
                let budget_id = data.last_budget_id;
                data.budgets.insert(
                    sub_id,
                    ActivityBudget {
                        id: budget_id,
                        sub_activity_id: sub_id,
                        line,
                    },
                );
                summary.budget_ids.push(budget_id);
            }
        }

        Ok(summary)
    }
}
