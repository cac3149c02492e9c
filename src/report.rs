//! Report workbooks and the archive that bundles them.
//!
//! Every output is first assembled as plain [`ReportFile`] data (sheets of
//! cells) and only serialized to `.xlsx` when the archive is written, so the
//! layout can be inspected without decoding a workbook.

use crate::error::{GradeError, Result};
use crate::models::{
    guard_formula, AnswerKey, Application, AssessmentRow, RosterRecord, SectionId,
};
use crate::reconcile::{Reconciliation, StudentSubmissions, UnmatchedRow};
use rust_xlsxwriter::{Format, Workbook};
use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const MASKED_ANSWER: &str = "-";
pub const UNMATCHED_FILE_NAME: &str = "unmatched_rows.csv";
pub const ANSWER_KEY_FILE_NAME: &str = "answer_keys.xlsx";

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl ReportSheet {
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|cells| cells.get(col))
    }
}

/// One workbook destined for the archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportFile {
    pub file_name: String,
    pub sheets: Vec<ReportSheet>,
}

impl ReportFile {
    pub fn sheet(&self, name: &str) -> Option<&ReportSheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    /// Serialize to `.xlsx` bytes. The first row of every sheet is bold.
    pub fn to_xlsx(&self) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();

        for sheet in &self.sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&sheet.name)?;

            for (r, cells) in sheet.rows.iter().enumerate() {
                for (c, cell) in cells.iter().enumerate() {
                    let (row, col) = (r as u32, c as u16);
                    match cell {
                        Cell::Text(text) if r == 0 => {
                            worksheet.write_string_with_format(row, col, text, &header)?;
                        }
                        Cell::Text(text) => {
                            worksheet.write_string(row, col, text)?;
                        }
                        Cell::Number(value) => {
                            worksheet.write_number(row, col, *value)?;
                        }
                        Cell::Empty => {}
                    }
                }
            }
            worksheet.set_column_width(0, 40.0)?;
        }

        Ok(workbook.save_to_buffer()?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportOptions {
    pub mask_correct_answers: bool,
    pub report_suffix: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            mask_correct_answers: false,
            report_suffix: "_report".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentReport {
    pub student: RosterRecord,
    pub file: ReportFile,
}

/// Answer key column block followed by one column block per submission.
pub fn application_sheet(
    key: &AnswerKey,
    rows: &[AssessmentRow],
    options: &ReportOptions,
) -> ReportSheet {
    let mut header = vec![Cell::text("Question"), Cell::text("Answer Key")];
    header.extend(rows.iter().map(|row| Cell::text(row.timestamp.as_str())));

    let mut score = vec![Cell::text("Score"), Cell::text(key.score.as_str())];
    score.extend(rows.iter().map(|row| Cell::text(row.score.as_str())));

    let mut sheet_rows = vec![header, score];
    for (q, qa) in key.questions_and_answers.iter().enumerate() {
        let mut line = vec![Cell::text(qa.question.as_str()), Cell::text(qa.answer.as_str())];
        for row in rows {
            let answer = guard_formula(row.answers.get(q).map(String::as_str).unwrap_or(""));
            if options.mask_correct_answers && answer == qa.answer {
                line.push(Cell::text(MASKED_ANSWER));
            } else {
                line.push(Cell::Text(answer));
            }
        }
        sheet_rows.push(line);
    }

    ReportSheet {
        name: key.application.display_name().to_string(),
        rows: sheet_rows,
    }
}

/// Workbook for one student, or `None` when they submitted nothing gradable.
pub fn student_report(
    entry: &StudentSubmissions,
    keys: &BTreeMap<Application, AnswerKey>,
    options: &ReportOptions,
) -> Option<StudentReport> {
    let sheets: Vec<ReportSheet> = entry
        .submissions
        .iter()
        .filter(|(_, rows)| !rows.is_empty())
        .filter_map(|(application, rows)| {
            keys.get(application)
                .map(|key| application_sheet(key, rows, options))
        })
        .collect();

    if sheets.is_empty() {
        return None;
    }

    Some(StudentReport {
        student: entry.student.clone(),
        file: ReportFile {
            file_name: format!("{}{}.xlsx", entry.student.full_name(), options.report_suffix),
            sheets,
        },
    })
}

pub fn student_reports(
    reconciliation: &Reconciliation,
    keys: &BTreeMap<Application, AnswerKey>,
    options: &ReportOptions,
) -> Vec<StudentReport> {
    reconciliation
        .students
        .iter()
        .filter_map(|entry| student_report(entry, keys, options))
        .collect()
}

/// Earliest submission's score and the best score among later attempts.
pub fn pre_post_scores(rows: &[AssessmentRow]) -> (Option<f64>, Option<f64>) {
    let mut scores = rows.iter().map(|row| row.parsed_score().map(|score| score.earned));
    let pre = scores.next().flatten();
    let post = scores.flatten().fold(None, |best: Option<f64>, earned| {
        Some(best.map_or(earned, |best| best.max(earned)))
    });
    (pre, post)
}

pub fn summary_file_name(section: &SectionId) -> String {
    format!("Section{}_summary.xlsx", section)
}

/// Per-section overview with one sheet per graded application.
pub fn section_summary(
    section: &SectionId,
    reconciliation: &Reconciliation,
    applications: impl IntoIterator<Item = Application>,
) -> ReportFile {
    let sheets = applications
        .into_iter()
        .map(|application| {
            let mut rows = vec![vec![
                Cell::text("Name"),
                Cell::text("Pre-class"),
                Cell::text("Post-class"),
                Cell::text("Attempts"),
            ]];
            for entry in &reconciliation.students {
                let submissions = entry
                    .submissions
                    .get(&application)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                let (pre, post) = pre_post_scores(submissions);
                rows.push(vec![
                    Cell::Text(entry.student.full_name()),
                    pre.map_or(Cell::Empty, Cell::Number),
                    post.map_or(Cell::Empty, Cell::Number),
                    Cell::Number(submissions.len() as f64),
                ]);
            }
            ReportSheet {
                name: application.display_name().to_string(),
                rows,
            }
        })
        .collect();

    ReportFile {
        file_name: summary_file_name(section),
        sheets,
    }
}

pub fn answer_key_file(keys: &BTreeMap<Application, AnswerKey>) -> ReportFile {
    let sheets = keys
        .values()
        .map(|key| {
            let mut rows = vec![vec![Cell::text("Question"), Cell::text("Answer")]];
            rows.extend(key.questions_and_answers.iter().map(|qa| {
                vec![Cell::text(qa.question.as_str()), Cell::text(qa.answer.as_str())]
            }));
            ReportSheet {
                name: key.application.display_name().to_string(),
                rows,
            }
        })
        .collect();

    ReportFile {
        file_name: ANSWER_KEY_FILE_NAME.to_string(),
        sheets,
    }
}

pub fn unmatched_csv(unmatched: &[UnmatchedRow]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "Application",
        "Timestamp",
        "First Name",
        "Last Name",
        "Email Address",
        "Score",
    ])?;
    for row in unmatched {
        writer.write_record([
            row.application.display_name(),
            row.timestamp.as_str(),
            row.first_name.as_str(),
            row.last_name.as_str(),
            row.email.as_str(),
            row.score.as_str(),
        ])?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|err| GradeError::Io(err.into_error()))
}

/// Named blob to place in the archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub file_name: String,
    pub data: Vec<u8>,
}

impl ArchiveEntry {
    pub fn from_report(file: &ReportFile) -> Result<Self> {
        Ok(Self {
            file_name: file.file_name.clone(),
            data: file.to_xlsx()?,
        })
    }
}

/// Entry name that extracts in place: path separators become `_`.
pub fn sanitize_entry_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Claim `name`, or `stem (2).ext`, `stem (3).ext`... when it is already taken.
fn unique_entry_name(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name.as_str(), ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{} ({}){}", stem, n, ext);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Zip every entry. Names are sanitized and deduplicated so no entry shadows another.
pub fn create_zip(entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut used = HashSet::new();

    for entry in entries {
        let name = unique_entry_name(sanitize_entry_name(&entry.file_name), &mut used);
        zip.start_file(name, opts)?;
        zip.write_all(&entry.data)?;
    }

    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer_key::extract;
    use crate::assessment::AssessmentTable;
    use crate::reconcile::reconcile;
    use std::io::Read;

    const EXCEL: &str = "\
Timestamp,Email Address,First Name,Last Name,Score,Q1,Q2
9/13/2023 10:00:00,k@x.org,Key,Maker,100 / 100,=SUM(A1:A2),42
9/14/2023 10:00:00,a@x.org,Alice,Smith,50 / 100,=SUM(A1:A2),41
9/20/2023 10:00:00,a@x.org,Alice,Smith,90 / 100,=AVERAGE(A1),42
9/21/2023 10:00:00,a@x.org,Alice,Smith,70 / 100,x,y
";

    fn roster() -> Vec<RosterRecord> {
        ["Alice Smith", "Bob Jones"]
            .iter()
            .map(|name| {
                let (first, last) = name.split_once(' ').unwrap();
                RosterRecord {
                    first_name: first.to_string(),
                    last_name: last.to_string(),
                    emails: vec![],
                    section: SectionId::from("2"),
                    status: "Active".to_string(),
                }
            })
            .collect()
    }

    fn fixture() -> (BTreeMap<Application, AnswerKey>, Reconciliation) {
        let table = AssessmentTable::from_bytes("Excel results.csv", EXCEL.as_bytes()).unwrap();
        let key = extract(&table).unwrap();
        let result = reconcile(&roster(), &[(&key, &table)]).unwrap();
        (BTreeMap::from([(Application::Excel, key)]), result)
    }

    fn entry(name: &str) -> ArchiveEntry {
        ArchiveEntry {
            file_name: name.to_string(),
            data: name.as_bytes().to_vec(),
        }
    }

    #[test]
    fn student_sheet_concatenates_key_and_submissions() {
        let (keys, result) = fixture();
        let reports = student_reports(&result, &keys, &ReportOptions::default());
        assert_eq!(reports.len(), 1, "Bob has no submissions and is skipped");

        let report = &reports[0];
        assert_eq!(report.file.file_name, "Alice Smith_report.xlsx");
        let sheet = report.file.sheet("Excel").unwrap();
        assert_eq!(sheet.rows.len(), 4);
        assert_eq!(sheet.rows[0].len(), 5);
        assert_eq!(sheet.cell(0, 2), Some(&Cell::text("9/14/2023 10:00:00")));
        assert_eq!(sheet.cell(1, 3), Some(&Cell::text("90 / 100")));
        assert_eq!(sheet.cell(2, 1), Some(&Cell::text("(=SUM(A1:A2))")));
        assert_eq!(sheet.cell(2, 3), Some(&Cell::text("(=AVERAGE(A1))")));
    }

    #[test]
    fn masking_hides_correct_answers() {
        let (keys, result) = fixture();
        let options = ReportOptions {
            mask_correct_answers: true,
            ..ReportOptions::default()
        };
        let report = student_report(&result.students[0], &keys, &options).unwrap();
        let sheet = report.file.sheet("Excel").unwrap();
        assert_eq!(sheet.cell(2, 2), Some(&Cell::text(MASKED_ANSWER)));
        assert_eq!(sheet.cell(3, 2), Some(&Cell::text("41")));
        assert_eq!(sheet.cell(3, 3), Some(&Cell::text(MASKED_ANSWER)));
    }

    #[test]
    fn summary_reports_pre_and_best_post_scores() {
        let (_, result) = fixture();
        let summary = section_summary(&SectionId::from("2"), &result, [Application::Excel]);
        assert_eq!(summary.file_name, "Section2_summary.xlsx");

        let sheet = summary.sheet("Excel").unwrap();
        assert_eq!(sheet.rows[1][0], Cell::text("Alice Smith"));
        assert_eq!(sheet.rows[1][1], Cell::Number(50.0));
        assert_eq!(sheet.rows[1][2], Cell::Number(90.0));
        assert_eq!(sheet.rows[1][3], Cell::Number(3.0));
        assert_eq!(sheet.rows[2][1], Cell::Empty);
    }

    #[test]
    fn pre_post_with_single_attempt() {
        let (_, result) = fixture();
        let rows = &result.students[0].submissions[&Application::Excel][..1];
        assert_eq!(pre_post_scores(rows), (Some(50.0), None));
        assert_eq!(pre_post_scores(&[]), (None, None));
    }

    #[test]
    fn zip_holds_every_entry() {
        let (keys, _) = fixture();
        let entries = vec![
            ArchiveEntry::from_report(&answer_key_file(&keys)).unwrap(),
            ArchiveEntry { file_name: "notes.csv".into(), data: b"a,b\n".to_vec() },
        ];
        let bytes = create_zip(&entries).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut notes = String::new();
        archive.by_name("notes.csv").unwrap().read_to_string(&mut notes).unwrap();
        assert_eq!(notes, "a,b\n");
        let xlsx = archive.by_name(ANSWER_KEY_FILE_NAME).unwrap();
        assert!(xlsx.size() > 0);
    }

    #[test]
    fn colliding_entry_names_get_numbered() {
        let entries = vec![
            entry("Mary Ann Lee_report.xlsx"),
            entry("Mary Ann Lee_report.xlsx"),
            entry("Mary Ann Lee_report.xlsx"),
        ];
        let bytes = create_zip(&entries).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "Mary Ann Lee_report (2).xlsx",
                "Mary Ann Lee_report (3).xlsx",
                "Mary Ann Lee_report.xlsx",
            ]
        );
        let mut second = String::new();
        archive
            .by_name("Mary Ann Lee_report (2).xlsx")
            .unwrap()
            .read_to_string(&mut second)
            .unwrap();
        assert_eq!(second, "Mary Ann Lee_report.xlsx");
    }

    #[test]
    fn entry_names_cannot_leave_the_archive_root() {
        assert_eq!(
            sanitize_entry_name("../etc/passwd_report.xlsx"),
            ".._etc_passwd_report.xlsx"
        );
        assert_eq!(sanitize_entry_name("A\\B_report.xlsx"), "A_B_report.xlsx");
        assert_eq!(sanitize_entry_name(".."), "_");

        let entries = [entry("O/Neil_report.xlsx"), entry("O_Neil_report.xlsx")];
        let bytes = create_zip(&entries).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(names, vec!["O_Neil_report (2).xlsx", "O_Neil_report.xlsx"]);
        assert!(names.iter().all(|name| !name.contains('/')));
    }

    #[test]
    fn unmatched_rows_export_as_csv() {
        let rows = vec![UnmatchedRow {
            application: Application::Word,
            timestamp: "9/13/2023 10:00:00".into(),
            first_name: "Ghost".into(),
            last_name: "Writer".into(),
            email: "g@x.org".into(),
            score: "10 / 100".into(),
        }];
        let text = String::from_utf8(unmatched_csv(&rows).unwrap()).unwrap();
        assert!(text.starts_with("Application,Timestamp"));
        assert!(text.contains("Word,9/13/2023 10:00:00,Ghost,Writer,g@x.org,10 / 100"));
    }
}
