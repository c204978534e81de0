//! Downloadable CSV template for the sub-activity import.

pub const TEMPLATE_FILENAME: &str = "subactivity_import_template.csv";

const TEMPLATE_LINES: [&str; 4] = [
    "main_activity_name,name,activity_type,description,budget_calculation_type,estimated_cost_with_tool,estimated_cost_without_tool,government_treasury,sdg_funding,partners_funding,other_funding,organization_id,training_details,meeting_workshop_details,procurement_details,printing_details,supervision_details,partners_details",
    r#""Health System Strengthening","Training on Health Management",Training,"Capacity building training for health workers",WITH_TOOL,50000,0,30000,10000,5000,5000,1,"{}","{}","{}","{}","{}","{}""#,
    r#""Quality Assurance","Regional Health Meeting",Meeting,"Quarterly review meeting with regional offices",WITHOUT_TOOL,0,30000,20000,5000,3000,2000,1,"{}","{}","{}","{}","{}","{}""#,
    r#""Infrastructure Development","Medical Equipment Procurement",Procurement,"Procurement of essential medical equipment",WITH_TOOL,200000,0,150000,50000,0,0,2,"{}","{}","{}","{}","{}","{}""#,
];

/// Header plus three example rows.
pub fn template_csv() -> String {
    TEMPLATE_LINES.join("\n")
}

/// `Content-Disposition` value for the download.
pub fn content_disposition() -> String {
    format!("attachment; filename=\"{}\"", TEMPLATE_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import_row::IMPORT_COLUMNS;

    #[test]
    fn test_header_lists_every_import_column() {
        let csv = template_csv();
        let header = csv.lines().next().unwrap();
        assert_eq!(header, IMPORT_COLUMNS.join(","));
    }

    #[test]
    fn test_rows_have_full_width() {
        let csv = template_csv();
        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let widths: Vec<usize> = reader.records().map(|r| r.unwrap().len()).collect();
        assert_eq!(widths, vec![18, 18, 18]);
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition(),
            "attachment; filename=\"subactivity_import_template.csv\""
        );
    }
}
