//! User-facing summaries of an import run.

use serde::Serialize;
use uuid::Uuid;

use crate::bulk_import::ImportResult;

/// Errors/warnings shown in a dry-run preview before collapsing to a count.
const PREVIEW_SAMPLE: usize = 5;
/// Errors listed when a live import imports nothing.
const FAILURE_SAMPLE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Success,
    Error,
}

/// Response body of the bulk-import endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub id: String,
    pub source_file: String,
    pub file_sha256: String,
    pub dry_run: bool,
    pub level: MessageLevel,
    pub message: String,
    #[serde(flatten)]
    pub result: ImportResult,
}

impl ImportReport {
    /// Build the report. `organization_name` is the default organization, if one
    /// was selected and exists.
    pub fn new(
        source_file: String,
        file_sha256: String,
        dry_run: bool,
        result: ImportResult,
        organization_name: Option<&str>,
    ) -> Self {
        let (level, message) = if dry_run {
            dry_run_message(&result)
        } else {
            live_message(&result, organization_name)
        };

        Self {
            id: format!("imp_{}", Uuid::new_v4().simple()),
            source_file,
            file_sha256,
            dry_run,
            level,
            message,
            result,
        }
    }
}

/// Message for an input-level failure.
pub fn failure_message(error: &impl std::fmt::Display) -> String {
    format!("Import failed: {}", error)
}

fn dry_run_message(result: &ImportResult) -> (MessageLevel, String) {
    let mut preview = format!(
        "DRY RUN PREVIEW: {} sub-activities ready for import",
        result.accepted
    );
    push_sample(&mut preview, "ERRORS", "errors", &result.errors);
    push_sample(&mut preview, "WARNINGS", "warnings", &result.warnings);

    if result.accepted > 0 {
        (MessageLevel::Success, preview)
    } else {
        (
            MessageLevel::Error,
            format!("DRY RUN FAILED: No valid sub-activities found.\n\n{}", preview),
        )
    }
}

fn push_sample(message: &mut String, title: &str, noun: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let shown = items.len().min(PREVIEW_SAMPLE);
    message.push_str(&format!(
        "\n\n{} ({}):\n{}",
        title,
        items.len(),
        items[..shown].join("\n")
    ));
    if items.len() > PREVIEW_SAMPLE {
        message.push_str(&format!(
            "\n... and {} more {}",
            items.len() - PREVIEW_SAMPLE,
            noun
        ));
    }
}

fn live_message(result: &ImportResult, organization_name: Option<&str>) -> (MessageLevel, String) {
    if result.accepted > 0 {
        let mut message = format!(
            "IMPORT COMPLETED: {} sub-activities successfully imported!",
            result.accepted
        );
        if let Some(name) = organization_name {
            message.push_str(&format!("\nAll imported to organization: {}", name));
        }
        return (MessageLevel::Success, message);
    }

    let mut message = "IMPORT FAILED: No sub-activities were imported.".to_string();
    if !result.errors.is_empty() {
        let shown = result.errors.len().min(FAILURE_SAMPLE);
        message.push_str(&format!(
            "\n\nERRORS:\n{}",
            result.errors[..shown].join("\n")
        ));
    }
    (MessageLevel::Error, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{} {}", prefix, i)).collect()
    }

    fn report(dry_run: bool, result: ImportResult, org: Option<&str>) -> ImportReport {
        ImportReport::new("plan.csv".to_string(), "abc".to_string(), dry_run, result, org)
    }

    #[test]
    fn test_dry_run_preview_truncates_samples() {
        let r = report(
            true,
            ImportResult {
                accepted: 4,
                errors: numbered("err", 7),
                warnings: numbered("warn", 2),
            },
            None,
        );

        assert_eq!(r.level, MessageLevel::Success);
        assert!(r.id.starts_with("imp_"));
        assert_eq!(
            r.message,
            "DRY RUN PREVIEW: 4 sub-activities ready for import\n\n\
             ERRORS (7):\nerr 1\nerr 2\nerr 3\nerr 4\nerr 5\n... and 2 more errors\n\n\
             WARNINGS (2):\nwarn 1\nwarn 2"
        );
    }

    #[test]
    fn test_dry_run_with_nothing_valid_is_an_error() {
        let r = report(
            true,
            ImportResult {
                accepted: 0,
                errors: numbered("err", 1),
                warnings: vec![],
            },
            None,
        );
        assert_eq!(r.level, MessageLevel::Error);
        assert!(r
            .message
            .starts_with("DRY RUN FAILED: No valid sub-activities found.\n\nDRY RUN PREVIEW: 0"));
    }

    #[test]
    fn test_live_success_names_the_organization() {
        let r = report(
            false,
            ImportResult {
                accepted: 3,
                ..Default::default()
            },
            Some("Ministry of Health"),
        );
        assert_eq!(r.level, MessageLevel::Success);
        assert_eq!(
            r.message,
            "IMPORT COMPLETED: 3 sub-activities successfully imported!\n\
             All imported to organization: Ministry of Health"
        );
    }

    #[test]
    fn test_live_failure_lists_ten_errors() {
        let r = report(
            false,
            ImportResult {
                accepted: 0,
                errors: numbered("err", 12),
                warnings: vec![],
            },
            None,
        );
        assert_eq!(r.level, MessageLevel::Error);
        assert!(r.message.contains("err 10"));
        assert!(!r.message.contains("err 11"));
    }

    #[test]
    fn test_failure_message() {
        assert_eq!(failure_message(&"bad zip"), "Import failed: bad zip");
    }

    #[test]
    fn test_serializes_result_inline() {
        let r = report(true, ImportResult { accepted: 1, ..Default::default() }, None);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["accepted"], 1);
        assert_eq!(json["level"], "success");
        assert!(json["errors"].as_array().unwrap().is_empty());
    }
}
