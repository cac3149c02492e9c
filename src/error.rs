use crate::models::Application;

pub type Result<T> = std::result::Result<T, GradeError>;

#[derive(Debug, thiserror::Error)]
pub enum GradeError {
    #[error(
        "'{column}' info not found: {table} data does not contain a column named \
         '{column}' (case-sensitive). {hint}"
    )]
    MissingColumn {
        table: &'static str,
        column: &'static str,
        hint: &'static str,
    },
    #[error("too many assessment files: got {given}, at most {max} can be graded at once")]
    TooManyAssessmentFiles { given: usize, max: usize },
    #[error("no {application} submission scored a perfect score, cannot build an answer key")]
    NoPerfectScore { application: Application },
    #[error("{application} questions do not line up with the answer key: {detail}")]
    ColumnMismatch {
        application: Application,
        detail: String,
    },
    #[error("no student roster loaded")]
    NoRoster,
    #[error("no section selected")]
    NoSection,
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xlsx error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl GradeError {
    pub fn is_schema_error(&self) -> bool {
        matches!(self, GradeError::MissingColumn { .. } | GradeError::ColumnMismatch { .. })
    }
}
