use crate::error::{GradeError, Result};
use crate::models::{Application, AssessmentRow};
use chrono::{NaiveDate, NaiveDateTime};
use std::io::Read;
use std::path::Path;

const TIMESTAMP_FORMATS: [&str; 3] = [
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];
const ASSESSMENT_HINT: &str = "Please make sure you're uploading an assessment results export.";

/// Number of leading identity columns (timestamp, email, first, last, score).
pub const IDENTITY_COLUMNS: usize = 5;

/// One uploaded assessment export.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentTable {
    pub file_name: String,
    pub application: Application,
    pub questions: Vec<String>,
    pub rows: Vec<AssessmentRow>,
}

/// Which submission dates take part in grading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateFilter {
    pub since: Option<NaiveDate>,
    pub dates: Vec<NaiveDate>,
}

impl DateFilter {
    pub fn is_active(&self) -> bool {
        self.since.is_some() || !self.dates.is_empty()
    }

    pub fn accepts(&self, submitted_at: Option<NaiveDateTime>) -> bool {
        if !self.is_active() {
            return true;
        }
        let Some(date) = submitted_at.map(|at| at.date()) else {
            return false;
        };
        if let Some(since) = self.since {
            if date < since {
                return false;
            }
        }
        self.dates.is_empty() || self.dates.contains(&date)
    }
}

impl AssessmentTable {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_reader(&file_name, std::fs::File::open(path)?)
    }

    pub fn from_bytes(file_name: &str, bytes: &[u8]) -> Result<Self> {
        Self::from_reader(file_name, bytes)
    }

    pub fn from_reader<R: Read>(file_name: &str, reader: R) -> Result<Self> {
        let application = Application::from_file_name(file_name);
        let mut csv_reader = csv::ReaderBuilder::new().from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let timestamp_idx = column_index(&headers, "Timestamp")?;
        let email_idx = column_index(&headers, "Email Address")?;
        let first_idx = column_index(&headers, "First Name")?;
        let last_idx = column_index(&headers, "Last Name")?;
        let score_idx = column_index(&headers, "Score")?;

        let questions: Vec<String> = headers
            .iter()
            .skip(IDENTITY_COLUMNS)
            .map(|header| header.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let cell = |idx: usize| record.get(idx).unwrap_or("").to_string();
            let timestamp = cell(timestamp_idx).trim().to_string();

            rows.push(AssessmentRow {
                application,
                submitted_at: parse_timestamp(&timestamp),
                timestamp,
                email: cell(email_idx),
                first_name: cell(first_idx),
                last_name: cell(last_idx),
                score: cell(score_idx).trim().to_string(),
                answers: record.iter().skip(IDENTITY_COLUMNS).map(str::to_string).collect(),
            });
        }

        Ok(Self {
            file_name: file_name.to_string(),
            application,
            questions,
            rows,
        })
    }

    pub fn is_gradable(&self) -> bool {
        self.application.is_graded()
    }

    /// Keep only the rows submitted on the dates the filter accepts.
    pub fn filter_dates(&self, filter: &DateFilter) -> Self {
        Self {
            rows: self
                .rows
                .iter()
                .filter(|row| filter.accepts(row.submitted_at))
                .cloned()
                .collect(),
            ..self.clone()
        }
    }
}

fn column_index(headers: &csv::StringRecord, column: &'static str) -> Result<usize> {
    headers
        .iter()
        .position(|header| header.trim() == column)
        .ok_or(GradeError::MissingColumn {
            table: "Assessment",
            column,
            hint: ASSESSMENT_HINT,
        })
}

/// Parse an export timestamp; unknown formats yield `None` rather than an error.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw.trim(), format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORD: &str = "\
Timestamp,Email Address,First Name,Last Name,Score,Q1 Bold shortcut,Q2 Sum
9/13/2023 10:01:00,alice@school.edu,Alice,Smith,100 / 100,Ctrl+B,=SUM(A1:A2)
9/16/2023 11:30:00,bob@school.edu,Bob,Jones,50 / 100,Ctrl+I,42
10/14/2023 09:00:00,zoe@school.edu,Zoe,Adams,90 / 100,Ctrl+B,=SUM(A1:A2)
";

    #[test]
    fn missing_timestamp_is_schema_error() {
        let csv = "Email Address,First Name,Last Name,Score,Q1\nx@y.z,A,B,1 / 1,a\n";
        let err = AssessmentTable::from_bytes("word.csv", csv.as_bytes()).unwrap_err();
        match err {
            GradeError::MissingColumn { column, table, .. } => {
                assert_eq!(column, "Timestamp");
                assert_eq!(table, "Assessment");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parses_rows_and_questions() {
        let table = AssessmentTable::from_bytes("word_results.csv", WORD.as_bytes()).unwrap();
        assert_eq!(table.application, Application::Word);
        assert_eq!(table.questions, vec!["Q1 Bold shortcut", "Q2 Sum"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[1].score, "50 / 100");
        assert_eq!(table.rows[1].answers, vec!["Ctrl+I", "42"]);
        assert_eq!(
            table.rows[0].submitted_at.map(|at| at.date()),
            NaiveDate::from_ymd_opt(2023, 9, 13)
        );
    }

    #[test]
    fn info_files_are_not_gradable() {
        let table = AssessmentTable::from_bytes("roster.csv", WORD.as_bytes()).unwrap();
        assert_eq!(table.application, Application::Info);
        assert!(!table.is_gradable());
    }

    #[test]
    fn unparseable_timestamp_is_kept_as_text() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2023-10-28 08:15:00").is_some());
    }

    #[test]
    fn date_filter_since_and_dates() {
        let table = AssessmentTable::from_bytes("word.csv", WORD.as_bytes()).unwrap();

        let since = DateFilter { since: NaiveDate::from_ymd_opt(2023, 9, 15), dates: vec![] };
        assert_eq!(table.filter_dates(&since).rows.len(), 2);

        let on = DateFilter {
            since: None,
            dates: vec![NaiveDate::from_ymd_opt(2023, 9, 13).unwrap()],
        };
        let kept = table.filter_dates(&on);
        assert_eq!(kept.rows.len(), 1);
        assert_eq!(kept.rows[0].first_name, "Alice");

        assert_eq!(table.filter_dates(&DateFilter::default()).rows.len(), 3);
    }

    #[test]
    fn active_filter_drops_rows_without_timestamp() {
        let filter = DateFilter { since: NaiveDate::from_ymd_opt(2000, 1, 1), dates: vec![] };
        assert!(!filter.accepts(None));
        assert!(DateFilter::default().accepts(None));
    }
}
