//! Two-step discovery: list colleges for a query, then list courses per college.
//!
//! The model is treated as a plain text-in/text-out function. Its answers are
//! parsed leniently: a bad record is skipped, never the whole answer.

use crate::core::fetcher::RateLimiter;
use crate::domain::model::{College, Course, SearchQuery};
use crate::domain::ports::LlmClient;
use crate::utils::error::{ParseError, Result};
use serde_json::Value;
use std::time::Duration;

pub const SYSTEM_PROMPT: &str =
    "You are a precise educational data expert. Always return valid JSON.";

const DEFAULT_COLLEGE_CONFIDENCE: f64 = 0.5;
const DEFAULT_DEGREE_LEVEL: &str = "UG";

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub max_colleges: usize,
    pub fetch_courses: bool,
    /// Minimum spacing between model calls.
    pub delay: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_colleges: 20,
            fetch_courses: true,
            delay: Duration::from_millis(1500),
        }
    }
}

pub fn colleges_prompt(query: &SearchQuery, max_colleges: usize) -> String {
    format!(
        "List up to {max} colleges physically located in {location} that offer courses \
         related to {career}. Return JSON of the form \
         {{\"colleges\": [{{\"name\": \"\", \"city\": \"\", \"state\": \"\", \"type\": \"\", \
         \"website\": \"\", \"confidence\": 0.0, \"courses\": []}}]}}. \
         Use official website domains and omit anything you are unsure of.",
        max = max_colleges,
        location = query.location,
        career = query.career_path,
    )
}

pub fn courses_prompt(college: &College, query: &SearchQuery) -> String {
    format!(
        "List the courses related to {career} offered by {name} ({city}, {state}, website {website}). \
         Return JSON of the form {{\"courses\": [{{\"course_name\": \"\", \"degree_level\": \
         \"UG|PG|Diploma|Certificate|PhD\", \"duration\": \"\", \"annual_fees\": \"\", \"seats\": 0, \
         \"entrance_exams\": [], \"specializations\": [], \"confidence\": 0.0}}]}}.",
        career = query.career_path,
        name = college.name,
        city = college.city,
        state = college.state,
        website = college.website,
    )
}

/// Finds the JSON object in a model answer, with or without markdown fences.
pub fn extract_json(response: &str) -> std::result::Result<&str, ParseError> {
    let fenced = if let Some((_, rest)) = response.split_once("```json") {
        rest.split("```").next()
    } else {
        response.split("```").nth(1)
    };

    let candidate = fenced.map(str::trim).unwrap_or(response);
    let start = candidate.find('{');
    let end = candidate.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => Ok(&candidate[start..=end]),
        _ => Err(ParseError::NoJsonFound),
    }
}

fn parse_root(response: &str) -> std::result::Result<Value, ParseError> {
    let json = extract_json(response)?;
    serde_json::from_str(json).map_err(|e| ParseError::Malformed(e.to_string()))
}

// 模型常把數字寫成字串，反之亦然
fn text_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// "NaN" 與 "inf" 也能被 parse，一律當作沒給
fn number_field(value: Option<&Value>) -> Option<f64> {
    let number: f64 = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn confidence_field(value: Option<&Value>) -> Option<f64> {
    number_field(value).map(|n| n.clamp(0.0, 1.0))
}

fn list_field(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| text_field(Some(item)))
            .collect(),
        Some(Value::String(s)) => s
            .split([',', ';'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn course_from_value(
    index: usize,
    value: &Value,
    website: &str,
    college_confidence: f64,
) -> std::result::Result<Course, ParseError> {
    let record = value.as_object().ok_or_else(|| ParseError::InvalidRecord {
        index,
        reason: "course is not an object".to_string(),
    })?;

    let name = text_field(record.get("course_name").or_else(|| record.get("name")))
        .ok_or_else(|| ParseError::InvalidRecord {
            index,
            reason: "course has no name".to_string(),
        })?;

    Ok(Course {
        name,
        degree_level: text_field(record.get("degree_level"))
            .unwrap_or_else(|| DEFAULT_DEGREE_LEVEL.to_string()),
        official_source_url: website.to_string(),
        row_confidence: confidence_field(record.get("confidence")).unwrap_or(college_confidence),
        duration: text_field(record.get("duration")),
        annual_fees: text_field(record.get("annual_fees")),
        seats: number_field(record.get("seats"))
            .filter(|n| *n >= 0.0 && n.fract() == 0.0)
            .map(|n| n as u32),
        entrance_exams: list_field(record.get("entrance_exams")),
        specializations: list_field(record.get("specializations")),
        evidence_urls: Vec::new(),
    })
}

fn courses_from_values(values: &[Value], website: &str, college_confidence: f64) -> Vec<Course> {
    values
        .iter()
        .enumerate()
        .filter_map(
            |(index, value)| match course_from_value(index, value, website, college_confidence) {
                Ok(course) => Some(course),
                Err(e) => {
                    tracing::warn!("🔶 Skipping course record: {}", e);
                    None
                }
            },
        )
        .collect()
}

fn college_from_value(index: usize, value: &Value) -> std::result::Result<College, ParseError> {
    let record = value.as_object().ok_or_else(|| ParseError::InvalidRecord {
        index,
        reason: "college is not an object".to_string(),
    })?;

    let name = text_field(record.get("name")).ok_or_else(|| ParseError::InvalidRecord {
        index,
        reason: "college has no name".to_string(),
    })?;

    let website = text_field(record.get("website")).unwrap_or_default();
    let confidence =
        confidence_field(record.get("confidence")).unwrap_or(DEFAULT_COLLEGE_CONFIDENCE);
    let courses = record
        .get("courses")
        .and_then(Value::as_array)
        .map(|values| courses_from_values(values, &website, confidence))
        .unwrap_or_default();

    let mut college = College::discovered(name, website, confidence).with_courses(courses);
    college.city = text_field(record.get("city")).unwrap_or_default();
    college.state = text_field(record.get("state")).unwrap_or_default();
    college.kind = text_field(record.get("type")).unwrap_or_default();
    Ok(college)
}

pub fn parse_colleges(response: &str) -> std::result::Result<Vec<College>, ParseError> {
    let root = parse_root(response)?;
    let records = root
        .get("colleges")
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::Malformed("missing 'colleges' array".to_string()))?;

    let colleges = records
        .iter()
        .enumerate()
        .filter_map(|(index, value)| match college_from_value(index, value) {
            Ok(college) => Some(college),
            Err(e) => {
                tracing::warn!("🔶 Skipping college record: {}", e);
                None
            }
        })
        .collect();
    Ok(colleges)
}

pub fn parse_courses(
    response: &str,
    college: &College,
) -> std::result::Result<Vec<Course>, ParseError> {
    let root = parse_root(response)?;
    let records = root
        .get("courses")
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::Malformed("missing 'courses' array".to_string()))?;

    Ok(courses_from_values(
        records,
        &college.website,
        college.overall_confidence,
    ))
}

pub struct DiscoveryEngine<L: LlmClient> {
    llm: L,
    config: DiscoveryConfig,
    limiter: RateLimiter,
}

impl<L: LlmClient> DiscoveryEngine<L> {
    pub fn new(llm: L, config: DiscoveryConfig) -> Self {
        Self {
            llm,
            limiter: RateLimiter::new(config.delay),
            config,
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    async fn ask(&self, prompt: &str) -> Result<String> {
        self.limiter.acquire().await;
        self.llm.complete(SYSTEM_PROMPT, prompt).await
    }

    pub async fn list_colleges(&self, query: &SearchQuery) -> Result<Vec<College>> {
        let response = self
            .ask(&colleges_prompt(query, self.config.max_colleges))
            .await?;
        let mut colleges = parse_colleges(&response)?;
        colleges.truncate(self.config.max_colleges);
        Ok(colleges)
    }

    pub async fn list_courses(&self, college: &College, query: &SearchQuery) -> Result<Vec<Course>> {
        let response = self.ask(&courses_prompt(college, query)).await?;
        Ok(parse_courses(&response, college)?)
    }

    /// Runs both steps. Never fails: a failed first step yields no colleges,
    /// a failed second step keeps whatever courses the first step returned.
    pub async fn discover(&self, query: &SearchQuery) -> Vec<College> {
        tracing::info!(
            "🔎 Discovering colleges in {} for {}",
            query.location,
            query.career_path
        );

        let mut colleges = match self.list_colleges(query).await {
            Ok(colleges) => colleges,
            Err(e) => {
                tracing::error!("❌ College discovery failed: {}", e);
                return Vec::new();
            }
        };
        tracing::info!("🏫 Found {} colleges", colleges.len());

        if !self.config.fetch_courses {
            return colleges;
        }

        for college in colleges.iter_mut() {
            match self.list_courses(college, query).await {
                Ok(courses) if !courses.is_empty() => {
                    tracing::debug!("📚 {}: {} courses", college.name, courses.len());
                    college.courses = courses;
                }
                Ok(_) => {
                    tracing::debug!("📚 {}: no courses listed, keeping first answer", college.name)
                }
                Err(e) => {
                    tracing::warn!("🔶 {}: course listing failed: {}", college.name, e);
                }
            }
        }

        colleges
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::model::{EvidenceStatus, VerificationStatus};
    use crate::utils::error::ScoutError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Answers prompts from a script, in order.
    pub(crate) struct ScriptedLlm {
        answers: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        pub(crate) fn new(answers: Vec<Result<String>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(ScoutError::LlmError {
                        message: "script exhausted".to_string(),
                    })
                })
        }
    }

    fn no_delay(fetch_courses: bool) -> DiscoveryConfig {
        DiscoveryConfig {
            max_colleges: 20,
            fetch_courses,
            delay: Duration::ZERO,
        }
    }

    const COLLEGES_ANSWER: &str = r#"Here you go:
```json
{"colleges": [
  {"name": "ABC Institute of Technology", "city": "Bangalore", "state": "Karnataka",
   "type": "Private", "website": "https://abc.ac.in", "confidence": 0.85,
   "courses": [{"course_name": "B.Tech Computer Science", "degree_level": "UG",
                "seats": "120", "entrance_exams": ["JEE Main", "KCET"]}]},
  {"city": "Nowhere"},
  {"name": "XYZ College", "website": "xyz.edu.in", "confidence": "0.6"}
]}
```"#;

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json(r#"{"a": 1}"#).unwrap(), r#"{"a": 1}"#);
        assert_eq!(
            extract_json("text ```json\n{\"a\": 1}\n``` more").unwrap(),
            "{\"a\": 1}"
        );
        assert_eq!(extract_json("```\n{\"a\": 1}\n```").unwrap(), "{\"a\": 1}");
        assert_eq!(
            extract_json("prefix {\"a\": {\"b\": 2}} suffix").unwrap(),
            "{\"a\": {\"b\": 2}}"
        );
        assert_eq!(extract_json("no json here"), Err(ParseError::NoJsonFound));
    }

    #[test]
    fn test_parse_colleges_skips_bad_records() {
        let colleges = parse_colleges(COLLEGES_ANSWER).unwrap();
        assert_eq!(colleges.len(), 2);

        let abc = &colleges[0];
        assert_eq!(abc.name, "ABC Institute of Technology");
        assert_eq!(abc.kind, "Private");
        assert_eq!(abc.overall_confidence, 0.85);
        assert_eq!(abc.evidence_status, EvidenceStatus::PendingVerification);
        assert_eq!(abc.verification_status, VerificationStatus::Draft);
        assert_eq!(abc.courses.len(), 1);

        let course = &abc.courses[0];
        assert_eq!(course.seats, Some(120));
        assert_eq!(course.official_source_url, "https://abc.ac.in");
        assert_eq!(course.row_confidence, 0.85);
        assert_eq!(course.entrance_exams, vec!["JEE Main", "KCET"]);

        assert_eq!(colleges[1].overall_confidence, 0.6);
        assert!(colleges[1].courses.is_empty());
    }

    #[test]
    fn test_parse_colleges_defaults() {
        let colleges = parse_colleges(r#"{"colleges": [{"name": "Only Name"}]}"#).unwrap();
        assert_eq!(colleges[0].overall_confidence, DEFAULT_COLLEGE_CONFIDENCE);
        assert_eq!(colleges[0].website, "");
    }

    #[test]
    fn test_parse_colleges_sanitizes_confidence() {
        let answer = r#"{"colleges": [
            {"name": "Not A Number", "confidence": "NaN",
             "courses": [{"course_name": "B.A. History", "confidence": "-inf"}]},
            {"name": "Infinite", "confidence": "inf"},
            {"name": "Too Sure", "confidence": 1.7,
             "courses": [{"course_name": "B.Com", "confidence": -0.2}]}
        ]}"#;
        let colleges = parse_colleges(answer).unwrap();

        assert_eq!(colleges[0].overall_confidence, DEFAULT_COLLEGE_CONFIDENCE);
        assert_eq!(colleges[0].courses[0].row_confidence, DEFAULT_COLLEGE_CONFIDENCE);
        assert_eq!(colleges[1].overall_confidence, DEFAULT_COLLEGE_CONFIDENCE);
        assert_eq!(colleges[2].overall_confidence, 1.0);
        assert_eq!(colleges[2].courses[0].row_confidence, 0.0);

        // 匯出後必須能再讀回
        let document = crate::app::export::build_results(
            SearchQuery::new("Pune", "Arts"),
            colleges,
            &crate::config::settings::ThresholdSettings::default(),
        );
        let json = crate::app::export::to_json(&document).unwrap();
        let reread = crate::app::export::read_results(json.as_bytes()).unwrap();
        assert_eq!(reread.colleges.len(), 3);
    }

    #[test]
    fn test_parse_colleges_rejects_unusable_answers() {
        assert_eq!(parse_colleges("sorry"), Err(ParseError::NoJsonFound));
        assert!(matches!(
            parse_colleges("{\"colleges\": [ }"),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_colleges("{\"schools\": []}"),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_courses_uses_course_confidence() {
        let college = College::discovered("ABC", "https://abc.ac.in", 0.7);
        let answer = r#"{"courses": [
            {"course_name": "M.Tech Data Science", "degree_level": "PG", "confidence": 0.9,
             "duration": 2, "specializations": "AI, ML"},
            {"degree_level": "UG"},
            {"name": "B.Sc Physics"}
        ]}"#;
        let courses = parse_courses(answer, &college).unwrap();

        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].row_confidence, 0.9);
        assert_eq!(courses[0].duration.as_deref(), Some("2"));
        assert_eq!(courses[0].specializations, vec!["AI", "ML"]);
        assert_eq!(courses[1].name, "B.Sc Physics");
        assert_eq!(courses[1].degree_level, "UG");
        assert_eq!(courses[1].row_confidence, 0.7);
    }

    #[tokio::test]
    async fn test_discover_runs_both_steps() {
        let llm = ScriptedLlm::new(vec![
            Ok(COLLEGES_ANSWER.to_string()),
            Ok(r#"{"courses": [{"course_name": "B.Tech CSE"}, {"course_name": "M.Tech CSE"}]}"#
                .to_string()),
            Err(ScoutError::LlmError {
                message: "rate limited".to_string(),
            }),
        ]);
        let engine = DiscoveryEngine::new(llm, no_delay(true));
        let query = SearchQuery::new("Bangalore, Karnataka", "Computer Science Engineering");

        let colleges = engine.discover(&query).await;

        assert_eq!(colleges.len(), 2);
        assert_eq!(colleges[0].courses.len(), 2);
        assert_eq!(colleges[0].courses[1].name, "M.Tech CSE");
        // 第二步失敗時保留第一步結果
        assert!(colleges[1].courses.is_empty());

        let prompts = engine.llm.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("Bangalore, Karnataka"));
        assert!(prompts[1].contains("ABC Institute of Technology"));
    }

    #[tokio::test]
    async fn test_discover_keeps_first_step_courses_when_second_is_empty() {
        let llm = ScriptedLlm::new(vec![
            Ok(COLLEGES_ANSWER.to_string()),
            Ok(r#"{"courses": []}"#.to_string()),
            Ok(r#"{"courses": []}"#.to_string()),
        ]);
        let engine = DiscoveryEngine::new(llm, no_delay(true));
        let colleges = engine.discover(&SearchQuery::new("Bangalore", "CSE")).await;

        assert_eq!(colleges[0].courses[0].name, "B.Tech Computer Science");
    }

    #[tokio::test]
    async fn test_discover_without_course_step() {
        let llm = ScriptedLlm::new(vec![Ok(COLLEGES_ANSWER.to_string())]);
        let engine = DiscoveryEngine::new(llm, no_delay(false));
        let colleges = engine.discover(&SearchQuery::new("Bangalore", "CSE")).await;

        assert_eq!(colleges.len(), 2);
        assert_eq!(engine.llm.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_discover_failure_yields_nothing() {
        let llm = ScriptedLlm::new(vec![Ok("I cannot help with that".to_string())]);
        let engine = DiscoveryEngine::new(llm, no_delay(true));
        let colleges = engine.discover(&SearchQuery::new("Delhi", "Data Science")).await;

        assert!(colleges.is_empty());
    }

    #[tokio::test]
    async fn test_list_colleges_respects_cap() {
        let llm = ScriptedLlm::new(vec![Ok(COLLEGES_ANSWER.to_string())]);
        let config = DiscoveryConfig {
            max_colleges: 1,
            ..no_delay(false)
        };
        let engine = DiscoveryEngine::new(llm, config);
        let colleges = engine
            .list_colleges(&SearchQuery::new("Bangalore", "CSE"))
            .await
            .unwrap();

        assert_eq!(colleges.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_calls_are_paced() {
        let llm = ScriptedLlm::new(vec![
            Ok(COLLEGES_ANSWER.to_string()),
            Ok(r#"{"courses": []}"#.to_string()),
            Ok(r#"{"courses": []}"#.to_string()),
        ]);
        let config = DiscoveryConfig {
            delay: Duration::from_secs(2),
            ..no_delay(true)
        };
        let engine = DiscoveryEngine::new(llm, config);

        let start = tokio::time::Instant::now();
        engine.discover(&SearchQuery::new("Bangalore", "CSE")).await;
        assert!(start.elapsed() >= Duration::from_secs(4));
    }
}
