use crate::utils::error::{Result, ScoutError};
use crate::utils::validation::{
    validate_non_empty_string, validate_one_of, validate_path, validate_positive_number,
    validate_range, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
/// One hour; anything longer is treated as a typo.
pub const MAX_REQUEST_DELAY_SECS: f64 = 3600.0;

static ENV_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
    Both,
}

impl OutputFormat {
    pub const ALLOWED: [&'static str; 3] = ["json", "csv", "both"];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Both => "both",
        }
    }

    pub fn writes_json(&self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Both)
    }

    pub fn writes_csv(&self) -> bool {
        matches!(self, OutputFormat::Csv | OutputFormat::Both)
    }
}

impl FromStr for OutputFormat {
    type Err = ScoutError;

    fn from_str(raw: &str) -> Result<Self> {
        let value = raw.trim().to_ascii_lowercase();
        validate_one_of("output.format", &value, &Self::ALLOWED)?;
        Ok(match value.as_str() {
            "csv" => OutputFormat::Csv,
            "both" => OutputFormat::Both,
            _ => OutputFormat::Json,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            max_tokens: 4000,
            timeout_secs: 60,
        }
    }
}

impl LlmSettings {
    /// 只有探索步驟需要金鑰；重新驗證既有檔案時可以沒有
    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() && !ENV_PLACEHOLDER.is_match(key) => Ok(key),
            _ => Err(ScoutError::MissingConfigError {
                field: "GROQ_API_KEY (or OPENAI_API_KEY)".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub request_delay_secs: f64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub workers: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_delay_secs: 1.5,
            request_timeout_secs: 30,
            user_agent: "Educational Data Validator 1.0".to_string(),
            workers: 1,
        }
    }
}

impl FetchSettings {
    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_delay_secs.clamp(0.0, MAX_REQUEST_DELAY_SECS))
            .unwrap_or_default()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdSettings {
    pub min_confidence: f64,
    pub verification: f64,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            verification: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub max_colleges: usize,
    pub fetch_courses: bool,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            max_colleges: 20,
            fetch_courses: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub output_dir: String,
    pub format: OutputFormat,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            output_dir: "outputs".to_string(),
            format: OutputFormat::Json,
        }
    }
}

/// Runtime settings: defaults, then environment, then a TOML file, then CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub fetch: FetchSettings,
    pub thresholds: ThresholdSettings,
    pub discovery: DiscoverySettings,
    pub output: OutputSettings,
}

fn parse_env<T: FromStr>(field: &str, raw: String) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ScoutError::InvalidConfigValueError {
            field: field.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
}

/// 替換 ${VAR}；找不到的變數原樣保留
fn substitute_env_vars<F>(content: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_PLACEHOLDER
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            lookup(var_name).unwrap_or_else(|| format!("${{{}}}", var_name))
        })
        .into_owned()
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(incoming) => {
                if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, incoming);
                    continue;
                }
                base.insert(key, toml::Value::Table(incoming));
            }
            other => {
                base.insert(key, other);
            }
        }
    }
}

fn toml_error(e: impl std::fmt::Display) -> ScoutError {
    ScoutError::ConfigValidationError {
        field: "toml_parsing".to_string(),
        message: format!("TOML parsing error: {}", e),
    }
}

impl Settings {
    /// Reads the process environment once.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        settings.llm.api_key = lookup("GROQ_API_KEY")
            .or_else(|| lookup("OPENAI_API_KEY"))
            .filter(|key| !key.trim().is_empty());
        if let Some(base_url) = lookup("LLM_BASE_URL") {
            settings.llm.base_url = base_url;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            settings.llm.model = model;
        }
        if let Some(raw) = lookup("REQUEST_DELAY") {
            settings.fetch.request_delay_secs = parse_env("REQUEST_DELAY", raw)?;
        }
        if let Some(raw) = lookup("REQUEST_TIMEOUT") {
            settings.fetch.request_timeout_secs = parse_env("REQUEST_TIMEOUT", raw)?;
        }
        if let Some(raw) = lookup("MAX_COLLEGES_PER_QUERY") {
            settings.discovery.max_colleges = parse_env("MAX_COLLEGES_PER_QUERY", raw)?;
        }
        if let Some(raw) = lookup("MIN_CONFIDENCE_THRESHOLD") {
            settings.thresholds.min_confidence = parse_env("MIN_CONFIDENCE_THRESHOLD", raw)?;
        }
        if let Some(raw) = lookup("VERIFICATION_THRESHOLD") {
            settings.thresholds.verification = parse_env("VERIFICATION_THRESHOLD", raw)?;
        }
        if let Some(output_dir) = lookup("OUTPUT_DIR") {
            settings.output.output_dir = output_dir;
        }
        if let Some(raw) = lookup("DEFAULT_OUTPUT_FORMAT") {
            settings.output.format = raw.parse()?;
        }

        Ok(settings)
    }

    /// Overlays a TOML file; keys the file leaves out keep their current value.
    pub fn merge_toml_file<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        self.merge_toml_str(&content)
    }

    pub fn merge_toml_str(self, content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content, |key| std::env::var(key).ok());
        let overlay: toml::Table = toml::from_str(&processed).map_err(toml_error)?;

        let mut base = match toml::Value::try_from(&self).map_err(toml_error)? {
            toml::Value::Table(table) => table,
            _ => toml::Table::new(),
        };
        merge_tables(&mut base, overlay);

        toml::Value::Table(base).try_into().map_err(toml_error)
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validate_url("llm.base_url", &self.llm.base_url)?;
        validate_non_empty_string("llm.model", &self.llm.model)?;

        validate_range(
            "fetch.request_delay_secs",
            self.fetch.request_delay_secs,
            0.0,
            MAX_REQUEST_DELAY_SECS,
        )?;
        validate_positive_number(
            "fetch.request_timeout_secs",
            self.fetch.request_timeout_secs as usize,
            1,
        )?;
        validate_positive_number("fetch.workers", self.fetch.workers, 1)?;
        validate_non_empty_string("fetch.user_agent", &self.fetch.user_agent)?;

        validate_range(
            "thresholds.min_confidence",
            self.thresholds.min_confidence,
            0.0,
            1.0,
        )?;
        validate_range(
            "thresholds.verification",
            self.thresholds.verification,
            0.0,
            1.0,
        )?;

        validate_positive_number("discovery.max_colleges", self.discovery.max_colleges, 1)?;
        validate_path("output.output_dir", &self.output.output_dir)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.fetch.delay(), Duration::from_millis(1500));
        assert_eq!(settings.output.format, OutputFormat::Json);
        assert!(settings.llm.require_api_key().is_err());
    }

    #[test]
    fn test_env_overrides_defaults() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-openai"),
            ("LLM_MODEL", "gpt-4o-mini"),
            ("REQUEST_DELAY", "0.25"),
            ("REQUEST_TIMEOUT", "10"),
            ("MAX_COLLEGES_PER_QUERY", "5"),
            ("DEFAULT_OUTPUT_FORMAT", "Both"),
        ]))
        .unwrap();

        assert_eq!(settings.llm.require_api_key().unwrap(), "sk-openai");
        assert_eq!(settings.llm.model, "gpt-4o-mini");
        assert_eq!(settings.fetch.delay(), Duration::from_millis(250));
        assert_eq!(settings.fetch.timeout(), Duration::from_secs(10));
        assert_eq!(settings.discovery.max_colleges, 5);
        assert_eq!(settings.output.format, OutputFormat::Both);
    }

    #[test]
    fn test_groq_key_wins_over_openai_key() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("GROQ_API_KEY", "gsk-groq"),
            ("OPENAI_API_KEY", "sk-openai"),
        ]))
        .unwrap();
        assert_eq!(settings.llm.api_key.as_deref(), Some("gsk-groq"));
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let err = Settings::from_lookup(lookup_from(&[("REQUEST_DELAY", "soon")])).unwrap_err();
        match err {
            ScoutError::InvalidConfigValueError { field, value, .. } => {
                assert_eq!(field, "REQUEST_DELAY");
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err =
            Settings::from_lookup(lookup_from(&[("DEFAULT_OUTPUT_FORMAT", "xml")])).unwrap_err();
        assert!(matches!(err, ScoutError::InvalidConfigValueError { .. }));
    }

    #[test]
    fn test_toml_overlays_only_given_keys() {
        let base = Settings::from_lookup(lookup_from(&[("LLM_MODEL", "from-env")])).unwrap();
        let merged = base
            .merge_toml_str(
                r#"
[fetch]
workers = 3

[output]
format = "csv"
"#,
            )
            .unwrap();

        assert_eq!(merged.fetch.workers, 3);
        assert_eq!(merged.fetch.request_timeout_secs, 30);
        assert_eq!(merged.output.format, OutputFormat::Csv);
        assert_eq!(merged.llm.model, "from-env");
    }

    #[test]
    fn test_toml_env_substitution() {
        std::env::set_var("SCOUT_TEST_MODEL_NAME", "mixtral-8x7b");
        let merged = Settings::default()
            .merge_toml_str(
                r#"
[llm]
model = "${SCOUT_TEST_MODEL_NAME}"
api_key = "${SCOUT_TEST_UNSET_KEY}"
"#,
            )
            .unwrap();
        std::env::remove_var("SCOUT_TEST_MODEL_NAME");

        assert_eq!(merged.llm.model, "mixtral-8x7b");
        assert!(merged.llm.require_api_key().is_err());
    }

    #[test]
    fn test_toml_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[thresholds]\nmin_confidence = 0.45\n")
            .unwrap();

        let merged = Settings::default().merge_toml_file(temp_file.path()).unwrap();
        assert_eq!(merged.thresholds.min_confidence, 0.45);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Settings::default().merge_toml_str("[fetch\nworkers = ").unwrap_err();
        assert!(matches!(err, ScoutError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_validation_rejects_out_of_range_values() {
        let mut settings = Settings::default();
        settings.thresholds.verification = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.fetch.request_delay_secs = f64::NAN;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.fetch.workers = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.llm.base_url = "groq".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_huge_request_delay_is_rejected() {
        let mut settings = Settings::default();
        settings.fetch.request_delay_secs = 1e20;
        assert!(settings.validate().is_err());
        // 未驗證時也不會變成零延遲
        assert_eq!(settings.fetch.delay(), Duration::from_secs(3600));

        settings.fetch.request_delay_secs = MAX_REQUEST_DELAY_SECS;
        assert!(settings.validate().is_ok());
        assert_eq!(settings.fetch.delay(), Duration::from_secs(3600));
    }
}
