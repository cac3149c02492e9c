use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Score string an answer-key row must carry, exactly as the form export writes it.
pub const PERFECT_SCORE: &str = "100 / 100";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_assessment_files: usize,
    pub perfect_score: String,
    pub output_directory: String,
    // Date filter applied to assessment rows
    pub since: Option<NaiveDate>,
    pub assessment_dates: Vec<NaiveDate>,
    pub mask_correct_answers: bool,
    pub report_suffix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_assessment_files: 3,
            perfect_score: PERFECT_SCORE.to_string(),
            output_directory: "output".to_string(),
            since: None,
            assessment_dates: Vec::new(),
            mask_correct_answers: false,
            report_suffix: "_report".to_string(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }
}

/// Office program an assessment export belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Application {
    #[serde(rename = "word")]
    Word,
    #[serde(rename = "excel")]
    Excel,
    #[serde(rename = "ppt")]
    PowerPoint,
    /// Not a gradable export.
    #[serde(rename = "info")]
    Info,
}

impl Application {
    /// Infer the application from an upload's file name.
    ///
    /// The search is a case-insensitive substring match, checked in the order
    /// `word`, `excel`, `powerpoint`/`ppt`. Anything else is [`Application::Info`].
    pub fn from_file_name(file_name: &str) -> Self {
        let lowered = file_name.to_lowercase();

        if lowered.contains("word") {
            Application::Word
        } else if lowered.contains("excel") {
            Application::Excel
        } else if lowered.contains("powerpoint") || lowered.contains("ppt") {
            Application::PowerPoint
        } else {
            Application::Info
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Application::Word => "word",
            Application::Excel => "excel",
            Application::PowerPoint => "ppt",
            Application::Info => "info",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Application::Word => "Word",
            Application::Excel => "Excel",
            Application::PowerPoint => "PowerPoint",
            Application::Info => "Info",
        }
    }

    pub fn is_graded(&self) -> bool {
        !matches!(self, Application::Info)
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Section value from the roster, ordered numerically when both sides are integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(pub String);

impl SectionId {
    pub fn new(raw: &str) -> Self {
        SectionId(raw.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for SectionId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<i64>(), other.0.parse::<i64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for SectionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SectionId {
    fn from(raw: &str) -> Self {
        SectionId::new(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRecord {
    pub first_name: String,
    pub last_name: String,
    pub emails: Vec<String>,
    pub section: SectionId,
    pub status: String,
}

impl RosterRecord {
    pub fn is_active(&self) -> bool {
        self.status == "Active"
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }

    pub fn identity(&self) -> StudentIdentity {
        StudentIdentity::new(&self.first_name, &self.last_name)
    }

    /// Normalized projection used by the student-info export.
    pub fn to_student_info(&self) -> StudentInfo {
        StudentInfo {
            first_name: normalize(&self.first_name),
            last_name: normalize(&self.last_name),
            email: normalize(&self.emails.join(";")),
        }
    }
}

/// Row of the exported (and possibly hand-edited) student information CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentInfo {
    #[serde(rename = "First Name")]
    pub first_name: String,
    #[serde(rename = "Last Name")]
    pub last_name: String,
    #[serde(rename = "Email", default)]
    pub email: String,
}

impl StudentInfo {
    pub fn normalized(&self) -> Self {
        Self {
            first_name: normalize(&self.first_name),
            last_name: normalize(&self.last_name),
            email: normalize(&self.email),
        }
    }
}

/// Normalized (first, last) pair that reconciliation matches on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StudentIdentity {
    pub first_name: String,
    pub last_name: String,
}

impl StudentIdentity {
    pub fn new(first_name: &str, last_name: &str) -> Self {
        Self {
            first_name: normalize(first_name),
            last_name: normalize(last_name),
        }
    }
}

impl fmt::Display for StudentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentRow {
    pub application: Application,
    pub timestamp: String,
    pub submitted_at: Option<NaiveDateTime>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub score: String,
    pub answers: Vec<String>,
}

impl AssessmentRow {
    pub fn identity(&self) -> StudentIdentity {
        StudentIdentity::new(&self.first_name, &self.last_name)
    }

    pub fn parsed_score(&self) -> Option<Score> {
        Score::parse(&self.score)
    }
}

/// `earned / possible` as written in the export's score column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub earned: f64,
    pub possible: f64,
}

impl Score {
    pub fn parse(raw: &str) -> Option<Self> {
        let (earned, possible) = raw.split_once('/')?;
        Some(Score {
            earned: earned.trim().parse().ok()?,
            possible: possible.trim().parse().ok()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerKey {
    pub application: Application,
    pub timestamp: String,
    pub score: String,
    pub questions_and_answers: Vec<QuestionAnswer>,
}

impl AnswerKey {
    pub fn questions(&self) -> impl Iterator<Item = &str> {
        self.questions_and_answers.iter().map(|qa| qa.question.as_str())
    }
}

/// Lowercase, trim and drop every space. Idempotent.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase().replace(' ', "")
}

/// Wrap an answer starting with `=` in parentheses so spreadsheets keep it as text.
pub fn guard_formula(answer: &str) -> String {
    if answer.starts_with('=') {
        format!("({})", answer)
    } else {
        answer.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["  Mary Ann ", "O Brien", "ALICE@Example.COM ", "already"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
        assert_eq!(normalize("  Mary Ann "), "maryann");
    }

    #[test]
    fn formula_guard_only_touches_leading_equals() {
        assert_eq!(guard_formula("=SUM(A1:A2)"), "(=SUM(A1:A2))");
        assert_eq!(guard_formula("42"), "42");
        assert_eq!(guard_formula("a=b"), "a=b");
    }

    #[test]
    fn application_from_file_name() {
        assert_eq!(Application::from_file_name("word_results.csv"), Application::Word);
        assert_eq!(Application::from_file_name("ORS Excel Assessment.csv"), Application::Excel);
        assert_eq!(Application::from_file_name("PowerPoint.csv"), Application::PowerPoint);
        assert_eq!(Application::from_file_name("ppt-oct.csv"), Application::PowerPoint);
        assert_eq!(Application::from_file_name("student_info.csv"), Application::Info);
        // word wins over excel when both appear
        assert_eq!(Application::from_file_name("word_excel.csv"), Application::Word);
    }

    #[test]
    fn sections_sort_numerically() {
        let mut sections: Vec<SectionId> =
            ["4", "10", "1", "2"].into_iter().map(SectionId::from).collect();
        sections.sort();
        let sorted: Vec<&str> = sections.iter().map(SectionId::as_str).collect();
        assert_eq!(sorted, vec!["1", "2", "4", "10"]);
    }

    #[test]
    fn score_parses_with_or_without_spaces() {
        assert_eq!(Score::parse("100 / 100"), Some(Score { earned: 100.0, possible: 100.0 }));
        assert_eq!(Score::parse("80/100").map(|s| s.earned), Some(80.0));
        assert_eq!(Score::parse("n/a"), None);
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = Config {
            since: NaiveDate::from_ymd_opt(2023, 9, 1),
            mask_correct_answers: true,
            ..Config::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, config);

        let partial: Config = toml::from_str("max_assessment_files = 5").unwrap();
        assert_eq!(partial.max_assessment_files, 5);
        assert_eq!(partial.perfect_score, PERFECT_SCORE);
    }
}
