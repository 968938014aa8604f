use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("LLM response could not be parsed: {0}")]
    ParseError(#[from] ParseError),

    #[error("LLM request failed: {message}")]
    LlmError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

/// 網頁抓取失敗。對驗證流程而言只是「找不到證據」，從不中止批次。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("server responded with HTTP {0}")]
    HttpError(u16),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::HttpError(status.as_u16())
        } else if e.is_builder() {
            FetchError::InvalidUrl(e.to_string())
        } else {
            FetchError::ConnectionFailed(e.to_string())
        }
    }
}

/// LLM 輸出格式錯誤
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("no JSON object found in response")]
    NoJsonFound,

    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("record {index} rejected: {reason}")]
    InvalidRecord { index: usize, reason: String },
}

/// 單一學校驗證途中的非預期錯誤；批次會跳過並繼續。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("starting confidence is not a finite number: {0}")]
    NonFiniteConfidence(f64),

    #[error("validation worker failed: {0}")]
    WorkerFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Data,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ScoutError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ScoutError::ApiError(_) | ScoutError::LlmError { .. } => ErrorCategory::Network,
            ScoutError::CsvError(_)
            | ScoutError::SerializationError(_)
            | ScoutError::ParseError(_)
            | ScoutError::ProcessingError { .. } => ErrorCategory::Data,
            ScoutError::ConfigError { .. }
            | ScoutError::ConfigValidationError { .. }
            | ScoutError::InvalidConfigValueError { .. }
            | ScoutError::MissingConfigError { .. } => ErrorCategory::Configuration,
            ScoutError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            // 網路問題通常重試即可
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Data => ErrorSeverity::High,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            ScoutError::ApiError(_) => {
                "Check your network connection and try again in a few minutes".to_string()
            }
            ScoutError::LlmError { .. } => {
                "Verify the API key and model name, then retry the query".to_string()
            }
            ScoutError::ParseError(_) => {
                "The model returned unusable output; retry or try a different model".to_string()
            }
            ScoutError::CsvError(_) | ScoutError::SerializationError(_) => {
                "Check that the input file is a results file produced by this tool".to_string()
            }
            ScoutError::IoError(_) => {
                "Check that the output directory exists and is writable".to_string()
            }
            ScoutError::MissingConfigError { field } => {
                format!("Set '{}' via environment, config file or command line", field)
            }
            ScoutError::InvalidConfigValueError { field, .. }
            | ScoutError::ConfigValidationError { field, .. } => {
                format!("Fix the value of '{}' and run again", field)
            }
            ScoutError::ConfigError { .. } => {
                "Review the configuration file for typos".to_string()
            }
            ScoutError::ProcessingError { .. } => {
                "Re-run with --verbose to see which record failed".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not reach a remote service: {}", self),
            ErrorCategory::Data => format!("Could not process the data: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoutError>;
