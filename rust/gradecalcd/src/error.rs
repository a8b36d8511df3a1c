use thiserror::Error;

#[derive(Debug, Error)]
pub enum GradeError {
    #[error("{0}")]
    BadParams(String),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("z-score setting required for subject {subject}")]
    MissingZScore { subject: String },

    #[error("no subjects configured for {0}")]
    NoSubjects(&'static str),

    #[error("pasted text looks like log output, not spreadsheet cells")]
    LooksLikeLog,

    #[error("expected at least 2 rows of class/name/grade data, got {0}")]
    TooFewRows(usize),

    #[error("spreadsheet header must have class, name and at least one subject column")]
    BadHeader,

    #[error("storage failed: {0}")]
    Storage(String),

    #[error("stored document is invalid: {0}")]
    Load(#[from] serde_json::Error),
}

impl GradeError {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::BadParams(message.into())
    }

    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadParams(_) => "bad_params",
            Self::NotFound { .. } => "not_found",
            Self::MissingZScore { .. } => "missing_zscore",
            Self::NoSubjects(_) => "no_subjects",
            Self::LooksLikeLog => "looks_like_log",
            Self::TooFewRows(_) => "too_few_rows",
            Self::BadHeader => "bad_header",
            Self::Storage(_) => "storage_failed",
            Self::Load(_) => "load_failed",
        }
    }
}

impl From<anyhow::Error> for GradeError {
    fn from(e: anyhow::Error) -> Self {
        Self::Storage(format!("{e:#}"))
    }
}
