use crate::error::{GradeError, Result};
use crate::models::{RosterRecord, SectionId, StudentInfo};
use regex::Regex;
use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::Path;

const SECTION_HINT: &str = "Please make sure you're using the right file or rename the column \
                            containing the section numbers to 'Section'.";
const COLUMN_HINT: &str = "Please make sure you're using the right student information file.";

/// Validation pattern the roster editor applies to email cells.
pub const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

#[derive(Debug, Clone, Default)]
pub struct Roster {
    records: Vec<RosterRecord>,
}

impl Roster {
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_reader(std::fs::File::open(path)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(bytes)
    }

    /// Parse a roster CSV. `Section` is checked before any other column.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let section_idx = column_index(&headers, "Section", SECTION_HINT)?;
        let status_idx = column_index(&headers, "Status", COLUMN_HINT)?;
        let first_idx = column_index(&headers, "First Name", COLUMN_HINT)?;
        let last_idx = column_index(&headers, "Last Name", COLUMN_HINT)?;
        let email_idx = column_index(&headers, "Email", COLUMN_HINT)?;

        let mut records = Vec::new();
        for row in csv_reader.records() {
            let row = row?;
            let cell = |idx: usize| row.get(idx).unwrap_or("").to_string();

            records.push(RosterRecord {
                first_name: cell(first_idx),
                last_name: cell(last_idx),
                emails: split_emails(&cell(email_idx)),
                section: SectionId::new(&cell(section_idx)),
                status: cell(status_idx),
            });
        }

        Ok(Self { records })
    }

    /// Build a single-section roster from a previously exported student-info file.
    pub fn from_student_info(section: SectionId, students: &[StudentInfo]) -> Self {
        let records = students
            .iter()
            .map(|student| RosterRecord {
                first_name: student.first_name.clone(),
                last_name: student.last_name.clone(),
                emails: split_emails(&student.email),
                section: section.clone(),
                status: "Active".to_string(),
            })
            .collect();
        Self { records }
    }

    pub fn records(&self) -> &[RosterRecord] {
        &self.records
    }

    /// Distinct section values in ascending order.
    pub fn sections(&self) -> Vec<SectionId> {
        self.records
            .iter()
            .map(|record| record.section.clone())
            .filter(|section| !section.as_str().is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Active students of one section, sorted by first name.
    pub fn section(&self, section: &SectionId) -> Vec<RosterRecord> {
        let mut records: Vec<RosterRecord> = self
            .records
            .iter()
            .filter(|record| &record.section == section && record.is_active())
            .cloned()
            .collect();
        records.sort_by(|a, b| a.first_name.cmp(&b.first_name));
        records
    }

    pub fn student_info(&self, section: &SectionId) -> Vec<StudentInfo> {
        self.section(section)
            .iter()
            .map(RosterRecord::to_student_info)
            .collect()
    }
}

fn column_index(
    headers: &csv::StringRecord,
    column: &'static str,
    hint: &'static str,
) -> Result<usize> {
    headers
        .iter()
        .position(|header| header.trim() == column)
        .ok_or(GradeError::MissingColumn {
            table: "Student",
            column,
            hint,
        })
}

fn split_emails(raw: &str) -> Vec<String> {
    raw.split([';', ','])
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn student_info_file_name(section: &SectionId) -> String {
    format!("ORS_Section{}_Student_Info.csv", section)
}

pub fn write_student_info<W: Write>(writer: W, students: &[StudentInfo]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for student in students {
        csv_writer.serialize(student)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn student_info_to_csv(students: &[StudentInfo]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_student_info(&mut buffer, students)?;
    Ok(buffer)
}

/// Read a student-info CSV back, normalizing whatever was edited by hand.
pub fn read_student_info<R: Read>(reader: R) -> Result<Vec<StudentInfo>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    column_index(&headers, "First Name", COLUMN_HINT)?;
    column_index(&headers, "Last Name", COLUMN_HINT)?;

    let mut students = Vec::new();
    for row in csv_reader.deserialize::<StudentInfo>() {
        students.push(row?.normalized());
    }
    Ok(students)
}

/// Entries whose email fails the editor's validation pattern.
pub fn invalid_emails(students: &[StudentInfo]) -> Vec<&StudentInfo> {
    let email_regex = Regex::new(EMAIL_PATTERN).expect("email pattern is valid");
    students
        .iter()
        .filter(|student| {
            split_emails(&student.email)
                .iter()
                .any(|email| !email_regex.is_match(email))
                || student.email.trim().is_empty()
        })
        .collect()
}
