//! Bulk-import upload handling that does not depend on the multipart stream:
//! picking the file part, checking it, staging it on disk and running the
//! importer.

use axum::http::StatusCode;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use tracing::{error, info};

use crate::bulk_import::BulkSubActivityImporter;
use crate::report::{self, ImportReport};
use crate::sheet_parser;
use crate::store::PlanningStore;

/// Multipart field names accepted for the uploaded file, in priority order.
pub const FILE_FIELDS: [&str; 3] = ["csv_file", "file", "upload_file"];

/// A file part pulled out of the multipart body.
#[derive(Debug, Clone)]
pub struct Upload {
    pub field: String,
    pub filename: String,
    pub data: Vec<u8>,
}

/// Fields of the bulk-import form as received.
#[derive(Debug, Default)]
pub struct ImportForm {
    pub uploads: Vec<Upload>,
    pub organization_id: Option<String>,
    pub dry_run: bool,
    pub skip_duplicates: bool,
}

/// A checked form, ready to run.
#[derive(Debug)]
pub struct ImportRequest {
    pub upload: Upload,
    pub default_organization_id: Option<i64>,
    pub dry_run: bool,
    pub skip_duplicates: bool,
}

impl ImportForm {
    /// Pick the file by field priority and validate the form.
    pub fn into_request(mut self) -> Result<ImportRequest, (StatusCode, String)> {
        let upload = FILE_FIELDS
            .iter()
            .find_map(|wanted| {
                self.uploads
                    .iter()
                    .position(|u| u.field == *wanted)
                    .map(|idx| self.uploads.swap_remove(idx))
            })
            .ok_or_else(|| (StatusCode::BAD_REQUEST, "Please select a file to upload.".to_string()))?;

        let default_organization_id = match self.organization_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                (StatusCode::BAD_REQUEST, format!("organization_id must be an integer, got '{}'", raw))
            })?),
        };

        if !sheet_parser::is_supported(&upload.filename) {
            return Err((StatusCode::BAD_REQUEST, "Please upload a CSV or Excel file.".to_string()));
        }

        Ok(ImportRequest {
            upload,
            default_organization_id,
            dry_run: self.dry_run,
            skip_duplicates: self.skip_duplicates,
        })
    }
}

impl ImportRequest {
    /// Stage the upload in `staging_dir`, import it and build the report.
    ///
    /// Blocking. The staged file is removed before returning, on success and
    /// on failure alike.
    pub fn run(self, store: &PlanningStore, staging_dir: &Path) -> Result<ImportReport, (StatusCode, String)> {
        let upload = self.upload;
        let file_sha256 = {
            let mut hasher = Sha256::new();
            hasher.update(&upload.data);
            format!("{:x}", hasher.finalize())
        };

        info!(
            "Received import file: {} ({} bytes, sha256={}, dry_run={}, default_org={:?})",
            upload.filename,
            upload.data.len(),
            file_sha256,
            self.dry_run,
            self.default_organization_id
        );

        let ext = sheet_parser::extension_of(Path::new(&upload.filename));
        let mut staged = tempfile::Builder::new()
            .prefix("subactivity-import-")
            .suffix(&format!(".{}", ext))
            .tempfile_in(staging_dir)
            .map_err(|e| internal_error("Failed to create temp file", e))?;
        staged
            .write_all(&upload.data)
            .and_then(|_| staged.flush())
            .map_err(|e| internal_error("Failed to store upload", e))?;

        let mut importer = BulkSubActivityImporter::new(store.clone(), self.default_organization_id)
            .skip_duplicates(self.skip_duplicates);
        let outcome = importer
            .import_from_file(staged.path(), self.dry_run)
            .map(|_| importer.result());
        drop(staged);

        let result = outcome.map_err(|e| {
            error!("Import of {} failed: {}", upload.filename, e);
            (StatusCode::UNPROCESSABLE_ENTITY, report::failure_message(&e))
        })?;

        let organization_name = self
            .default_organization_id
            .and_then(|id| store.organization(id))
            .map(|org| org.name);

        Ok(ImportReport::new(
            upload.filename,
            file_sha256,
            self.dry_run,
            result,
            organization_name.as_deref(),
        ))
    }
}

pub fn internal_error(context: &str, e: impl std::fmt::Display) -> (StatusCode, String) {
    error!("{}: {}", context, e);
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{}: {}", context, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanningSeed;
    use crate::planning::{MainActivity, Organization};
    use crate::report::MessageLevel;
    use crate::template;

    fn store() -> PlanningStore {
        PlanningStore::from_seed(PlanningSeed {
            organizations: vec![
                Organization {
                    id: 1,
                    name: "Ministry of Health".to_string(),
                    org_type: None,
                    parent_id: None,
                },
                Organization {
                    id: 2,
                    name: "Regional Health Bureau".to_string(),
                    org_type: None,
                    parent_id: Some(1),
                },
            ],
            main_activities: ["Health System Strengthening", "Quality Assurance", "Infrastructure Development"]
                .iter()
                .enumerate()
                .map(|(i, name)| MainActivity {
                    id: i as i64 + 1,
                    name: name.to_string(),
                    initiative_id: None,
                    organization_id: Some(if i == 2 { 2 } else { 1 }),
                })
                .collect(),
        })
        .unwrap()
    }

    fn upload(field: &str, filename: &str, data: &[u8]) -> Upload {
        Upload {
            field: field.to_string(),
            filename: filename.to_string(),
            data: data.to_vec(),
        }
    }

    fn template_form() -> ImportForm {
        ImportForm {
            uploads: vec![upload("csv_file", "plan.csv", template::template_csv().as_bytes())],
            ..Default::default()
        }
    }

    fn is_empty_dir(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn test_file_field_priority() {
        let form = ImportForm {
            uploads: vec![
                upload("upload_file", "c.csv", b"x"),
                upload("file", "b.csv", b"x"),
                upload("csv_file", "a.csv", b"x"),
            ],
            ..Default::default()
        };
        assert_eq!(form.into_request().unwrap().upload.filename, "a.csv");

        let form = ImportForm {
            uploads: vec![upload("upload_file", "c.csv", b"x"), upload("file", "b.csv", b"x")],
            ..Default::default()
        };
        assert_eq!(form.into_request().unwrap().upload.filename, "b.csv");
    }

    #[test]
    fn test_missing_file_and_bad_extension_are_bad_requests() {
        let err = ImportForm::default().into_request().unwrap_err();
        assert_eq!(err, (StatusCode::BAD_REQUEST, "Please select a file to upload.".to_string()));

        let form = ImportForm {
            uploads: vec![upload("file", "plan.pdf", b"%PDF")],
            ..Default::default()
        };
        let err = form.into_request().unwrap_err();
        assert_eq!(err, (StatusCode::BAD_REQUEST, "Please upload a CSV or Excel file.".to_string()));
    }

    #[test]
    fn test_organization_field() {
        let mut form = template_form();
        form.organization_id = Some("  ".to_string());
        assert_eq!(form.into_request().unwrap().default_organization_id, None);

        let mut form = template_form();
        form.organization_id = Some(" 2 ".to_string());
        assert_eq!(form.into_request().unwrap().default_organization_id, Some(2));

        let mut form = template_form();
        form.organization_id = Some("two".to_string());
        assert_eq!(form.into_request().unwrap_err().0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_run_imports_and_removes_staged_file() {
        let staging = tempfile::tempdir().unwrap();
        let store = store();
        let mut form = template_form();
        form.organization_id = Some("1".to_string());

        let report = form.into_request().unwrap().run(&store, staging.path()).unwrap();

        assert_eq!(report.result.accepted, 3);
        assert_eq!(report.level, MessageLevel::Success);
        assert!(report.message.ends_with("All imported to organization: Ministry of Health"));
        assert_eq!(report.file_sha256.len(), 64);
        assert_eq!(store.sub_activity_count(), 3);
        assert!(is_empty_dir(staging.path()));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let staging = tempfile::tempdir().unwrap();
        let store = store();
        let mut form = template_form();
        form.dry_run = true;

        let report = form.into_request().unwrap().run(&store, staging.path()).unwrap();

        assert!(report.dry_run);
        assert_eq!(report.result.accepted, 3);
        assert_eq!(store.sub_activity_count(), 0);
        assert!(is_empty_dir(staging.path()));
    }

    #[test]
    fn test_input_failure_is_unprocessable_and_removes_staged_file() {
        let staging = tempfile::tempdir().unwrap();
        let form = ImportForm {
            uploads: vec![upload("file", "plan.csv", b"activity_type\nTraining\n")],
            ..Default::default()
        };

        let (status, message) = form
            .into_request()
            .unwrap()
            .run(&store(), staging.path())
            .unwrap_err();

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(message.starts_with("Import failed: "), "{}", message);
        assert!(is_empty_dir(staging.path()));
    }
}
