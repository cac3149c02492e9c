use crate::answer_key;
use crate::assessment::{AssessmentTable, DateFilter};
use crate::error::{GradeError, Result};
use crate::models::{AnswerKey, Application, Config, RosterRecord, SectionId, StudentInfo};
use crate::reconcile::{reconcile, Reconciliation};
use crate::report::{self, ArchiveEntry, ReportFile, ReportOptions, StudentReport};
use crate::roster::{self, Roster};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// Uploaded file held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(file_name, std::fs::read(path)?))
    }

    fn content_hash(&self, with_name: bool) -> String {
        let mut hasher = Sha256::new();
        if with_name {
            hasher.update(self.file_name.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(&self.bytes);
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssessmentLoad {
    pub graded: Vec<Application>,
    /// Files whose name matched no application.
    pub skipped: Vec<String>,
    /// Applications uploaded more than once in the batch; the last file wins.
    pub replaced: Vec<Application>,
}

#[derive(Debug, Clone)]
pub struct GradingOutcome {
    pub section: SectionId,
    pub reconciliation: Reconciliation,
    pub reports: Vec<StudentReport>,
    pub summary: ReportFile,
    pub answer_keys: ReportFile,
}

impl GradingOutcome {
    pub fn skipped_students(&self) -> Vec<&RosterRecord> {
        self.reconciliation.students_without_submissions().collect()
    }

    /// Every workbook plus the unmatched-row listing, ready to zip.
    pub fn archive_entries(&self) -> Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::with_capacity(self.reports.len() + 3);
        for student in &self.reports {
            entries.push(ArchiveEntry::from_report(&student.file)?);
        }
        entries.push(ArchiveEntry::from_report(&self.summary)?);
        entries.push(ArchiveEntry::from_report(&self.answer_keys)?);
        if !self.reconciliation.unmatched.is_empty() {
            entries.push(ArchiveEntry {
                file_name: report::UNMATCHED_FILE_NAME.to_string(),
                data: report::unmatched_csv(&self.reconciliation.unmatched)?,
            });
        }
        Ok(entries)
    }

    pub fn to_zip(&self) -> Result<Vec<u8>> {
        report::create_zip(&self.archive_entries()?)
    }
}

/// State carried between steps of one grading run.
#[derive(Debug, Default)]
pub struct GradingSession {
    config: Config,
    roster: Option<Roster>,
    section: Option<SectionId>,
    students: Vec<RosterRecord>,
    tables: BTreeMap<Application, AssessmentTable>,
    answer_keys: BTreeMap<Application, AnswerKey>,
    roster_cache: HashMap<String, Roster>,
    table_cache: HashMap<String, AssessmentTable>,
}

impl GradingSession {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn load_roster(&mut self, upload: &Upload) -> Result<&Roster> {
        let hash = upload.content_hash(false);
        let roster = match self.roster_cache.get(&hash) {
            Some(cached) => cached.clone(),
            None => {
                let parsed = Roster::from_bytes(&upload.bytes)?;
                self.roster_cache.insert(hash, parsed.clone());
                parsed
            }
        };
        self.clear_students();
        Ok(&*self.roster.insert(roster))
    }

    /// Use a previously exported student-info CSV as the section roster.
    pub fn load_student_info(
        &mut self,
        section: SectionId,
        upload: &Upload,
    ) -> Result<&[RosterRecord]> {
        let students = roster::read_student_info(upload.bytes.as_slice())?;
        let roster = Roster::from_student_info(section.clone(), &students);
        self.clear_students();
        self.roster = Some(roster);
        self.select_section(section)
    }

    pub fn sections(&self) -> Vec<SectionId> {
        self.roster.as_ref().map(Roster::sections).unwrap_or_default()
    }

    pub fn select_section(&mut self, section: SectionId) -> Result<&[RosterRecord]> {
        let roster = self.roster.as_ref().ok_or(GradeError::NoRoster)?;
        self.students = roster.section(&section);
        self.section = Some(section);
        Ok(&self.students)
    }

    pub fn section(&self) -> Option<&SectionId> {
        self.section.as_ref()
    }

    pub fn students(&self) -> &[RosterRecord] {
        &self.students
    }

    pub fn student_info(&self) -> Vec<StudentInfo> {
        self.students.iter().map(RosterRecord::to_student_info).collect()
    }

    pub fn answer_key(&self, application: Application) -> Option<&AnswerKey> {
        self.answer_keys.get(&application)
    }

    pub fn cached_files(&self) -> usize {
        self.roster_cache.len() + self.table_cache.len()
    }

    /// Parse a batch of assessment exports and rebuild their answer keys.
    pub fn load_assessments(&mut self, uploads: &[Upload]) -> Result<AssessmentLoad> {
        let max = self.config.max_assessment_files;
        if uploads.len() > max {
            return Err(GradeError::TooManyAssessmentFiles {
                given: uploads.len(),
                max,
            });
        }

        let mut load = AssessmentLoad::default();
        let mut tables = Vec::with_capacity(uploads.len());
        for upload in uploads {
            if !Application::from_file_name(&upload.file_name).is_graded() {
                load.skipped.push(upload.file_name.clone());
                continue;
            }
            let hash = upload.content_hash(true);
            let table = match self.table_cache.get(&hash) {
                Some(cached) => cached.clone(),
                None => {
                    let parsed = AssessmentTable::from_bytes(&upload.file_name, &upload.bytes)?;
                    self.table_cache.insert(hash, parsed.clone());
                    parsed
                }
            };
            tables.push(table);
        }

        let mut batch: BTreeMap<Application, (AssessmentTable, AnswerKey)> = BTreeMap::new();
        for table in tables {
            let key = answer_key::extract_with_score(&table, &self.config.perfect_score)?;
            let application = table.application;
            if batch.insert(application, (table, key)).is_some() {
                load.replaced.push(application);
            }
        }

        self.clear_assessments();
        for (application, (table, key)) in batch {
            load.graded.push(application);
            self.tables.insert(application, table);
            self.answer_keys.insert(application, key);
        }
        Ok(load)
    }

    pub fn date_filter(&self) -> DateFilter {
        DateFilter {
            since: self.config.since,
            dates: self.config.assessment_dates.clone(),
        }
    }

    pub fn grade(&self) -> Result<GradingOutcome> {
        let section = self.section.clone().ok_or(GradeError::NoSection)?;
        let filter = self.date_filter();

        let filtered: Vec<(&AnswerKey, AssessmentTable)> = self
            .answer_keys
            .iter()
            .filter_map(|(application, key)| {
                self.tables
                    .get(application)
                    .map(|table| (key, table.filter_dates(&filter)))
            })
            .collect();
        let pairs: Vec<(&AnswerKey, &AssessmentTable)> =
            filtered.iter().map(|(key, table)| (*key, table)).collect();

        let reconciliation = reconcile(&self.students, &pairs)?;
        let options = ReportOptions {
            mask_correct_answers: self.config.mask_correct_answers,
            report_suffix: self.config.report_suffix.clone(),
        };

        Ok(GradingOutcome {
            reports: report::student_reports(&reconciliation, &self.answer_keys, &options),
            summary: report::section_summary(
                &section,
                &reconciliation,
                self.answer_keys.keys().copied(),
            ),
            answer_keys: report::answer_key_file(&self.answer_keys),
            section,
            reconciliation,
        })
    }

    pub fn clear_students(&mut self) {
        self.section = None;
        self.students.clear();
    }

    pub fn clear_assessments(&mut self) {
        self.tables.clear();
        self.answer_keys.clear();
    }
}
