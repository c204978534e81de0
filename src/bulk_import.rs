//! Bulk sub-activity import from CSV/Excel files.
//!
//! Each row is validated on its own; one bad row never aborts the batch. In
//! live mode every accepted row is committed in its own store transaction.

use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::import_row::{parse_row, ColumnMap, ImportRow, RowIssues};
use crate::planning::{MainActivity, NewSubActivity};
use crate::sheet_parser::{self, SheetError};
use crate::store::PlanningStore;

/// Failures of the whole file. Row problems are reported through
/// [`BulkSubActivityImporter::errors`] instead.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Sheet(#[from] SheetError),

    #[error("Missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

/// Outcome of one import call.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ImportResult {
    pub accepted: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub struct BulkSubActivityImporter {
    store: PlanningStore,
    default_organization_id: Option<i64>,
    skip_duplicates: bool,
    /// (main activity id, lowercased name) of rows accepted in the current call.
    accepted_keys: HashSet<(i64, String)>,
    accepted: usize,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl BulkSubActivityImporter {
    /// `default_organization_id` applies to rows that leave `organization_id` blank.
    pub fn new(store: PlanningStore, default_organization_id: Option<i64>) -> Self {
        Self {
            store,
            default_organization_id,
            skip_duplicates: false,
            accepted_keys: HashSet::new(),
            accepted: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Skip rows whose (main activity, name) already exists instead of
    /// creating a second copy. Off by default.
    pub fn skip_duplicates(mut self, skip: bool) -> Self {
        self.skip_duplicates = skip;
        self
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn result(&self) -> ImportResult {
        ImportResult {
            accepted: self.accepted,
            errors: self.errors.clone(),
            warnings: self.warnings.clone(),
        }
    }

    /// Import every row of `path`. Returns how many rows were accepted
    /// (dry run) or committed (live).
    pub fn import_from_file(&mut self, path: &Path, dry_run: bool) -> Result<usize, ImportError> {
        self.accepted = 0;
        self.accepted_keys.clear();
        self.errors.clear();
        self.warnings.clear();

        info!(
            "Starting sub-activity import from {:?} (dry_run={}, default_org={:?})",
            path, dry_run, self.default_organization_id
        );

        let sheet = sheet_parser::parse_file(path)?;
        let columns = ColumnMap::new(&sheet.headers);

        let missing = columns.missing_required();
        if !missing.is_empty() {
            return Err(ImportError::MissingColumns(missing));
        }
        debug!(
            "Sheet '{}' ({:?}): {} rows, recognised columns {:?}",
            sheet.name,
            sheet.source_type,
            sheet.rows.len(),
            columns.known_columns()
        );

        for record in &sheet.rows {
            let mut issues = RowIssues::default();
            let accepted = match parse_row(&columns, record, &mut issues) {
                Some(row) => self.process_row(row, dry_run, &mut issues),
                None => false,
            };

            if !accepted && !issues.errors.is_empty() {
                debug!("Row {} rejected: {:?}", record.line, issues.errors);
            }
            self.errors.append(&mut issues.errors);
            self.warnings.append(&mut issues.warnings);
            if accepted {
                self.accepted += 1;
            }
        }

        info!(
            "Import finished: {} of {} rows {} ({} errors, {} warnings)",
            self.accepted,
            sheet.rows.len(),
            if dry_run { "valid" } else { "imported" },
            self.errors.len(),
            self.warnings.len()
        );

        Ok(self.accepted)
    }

    /// Resolve references and, when live, persist. Returns whether the row counts.
    fn process_row(&mut self, row: ImportRow, dry_run: bool, issues: &mut RowIssues) -> bool {
        let line = row.line;

        let Some(organization_id) = row.organization_id.or(self.default_organization_id) else {
            issues.error(
                line,
                "organization_id",
                "not given and no default organization selected",
            );
            return false;
        };
        if self.store.organization(organization_id).is_none() {
            issues.error(
                line,
                "organization_id",
                format!("organization {} does not exist", organization_id),
            );
            return false;
        }

        let main_activity = match self.resolve_main_activity(&row.main_activity_name, organization_id) {
            Ok(activity) => activity,
            Err(reason) => {
                issues.error(line, "main_activity_name", reason);
                return false;
            }
        };

        // Rows accepted earlier in this call count as existing.
        let key = (main_activity.id, row.name.trim().to_lowercase());
        if self.skip_duplicates
            && (self.accepted_keys.contains(&key)
                || self.store.has_sub_activity(main_activity.id, &row.name))
        {
            issues.warning(
                line,
                "name",
                format!(
                    "sub-activity '{}' already exists under '{}', skipped",
                    row.name, main_activity.name
                ),
            );
            return false;
        }

        if dry_run {
            self.accepted_keys.insert(key);
            return true;
        }

        let budget = row.budget_line();
        let new = NewSubActivity {
            main_activity_id: main_activity.id,
            organization_id,
            name: row.name,
            activity_type: row.activity_type,
            description: row.description,
        };

        match self.store.transaction(|tx| {
            let staged = tx.create_sub_activity(new);
            tx.create_budget(staged, budget)
        }) {
            Ok(summary) => {
                debug!(
                    "Row {} committed as sub-activity {:?} (budget {:?})",
                    line, summary.sub_activity_ids, summary.budget_ids
                );
                self.accepted_keys.insert(key);
                true
            }
            Err(e) => {
                warn!("Row {} failed to save: {}", line, e);
                issues.error(line, "save", e.to_string());
                false
            }
        }
    }

    /// Exactly one main activity must match the name. Several matches are
    /// narrowed to the row's organization.
    fn resolve_main_activity(&self, name: &str, organization_id: i64) -> Result<MainActivity, String> {
        let mut candidates = self.store.main_activities_named(name);

        if candidates.len() > 1 {
            let total = candidates.len();
            candidates.retain(|a| a.organization_id == Some(organization_id));
            if candidates.len() != 1 {
                return Err(format!(
                    "'{}' matches {} main activities; cannot tell which belongs to organization {}",
                    name, total, organization_id
                ));
            }
        }

        candidates
            .pop()
            .ok_or_else(|| format!("main activity '{}' not found", name))
    }
}
