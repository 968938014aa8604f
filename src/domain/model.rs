use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 人工審核流程的生命週期；驗證器不會修改
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    Draft,
    Verified,
    Published,
}

/// 證據層級，只由驗證器設定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceStatus {
    Verified,
    #[serde(rename = "Partially Verified")]
    PartiallyVerified,
    #[serde(rename = "No Evidence Found")]
    NoEvidenceFound,
    #[serde(rename = "Pending Verification")]
    PendingVerification,
}

impl EvidenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceStatus::Verified => "Verified",
            EvidenceStatus::PartiallyVerified => "Partially Verified",
            EvidenceStatus::NoEvidenceFound => "No Evidence Found",
            EvidenceStatus::PendingVerification => "Pending Verification",
        }
    }
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Draft => "Draft",
            VerificationStatus::Verified => "Verified",
            VerificationStatus::Published => "Published",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegreeLevel {
    #[serde(rename = "UG")]
    Undergraduate,
    #[serde(rename = "PG")]
    Postgraduate,
    Diploma,
    Certificate,
    #[serde(rename = "PhD")]
    Doctorate,
}

impl DegreeLevel {
    /// 模型輸出的學位層級是自由字串，這裡只認得常見寫法
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ug" | "undergraduate" | "bachelor" | "bachelors" => Some(DegreeLevel::Undergraduate),
            "pg" | "postgraduate" | "master" | "masters" => Some(DegreeLevel::Postgraduate),
            "diploma" => Some(DegreeLevel::Diploma),
            "certificate" => Some(DegreeLevel::Certificate),
            "phd" | "ph.d" | "ph.d." | "doctorate" => Some(DegreeLevel::Doctorate),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            DegreeLevel::Undergraduate => "UG",
            DegreeLevel::Postgraduate => "PG",
            DegreeLevel::Diploma => "Diploma",
            DegreeLevel::Certificate => "Certificate",
            DegreeLevel::Doctorate => "PhD",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    #[serde(rename = "course_name", alias = "name")]
    pub name: String,
    pub degree_level: String,
    pub official_source_url: String,
    pub row_confidence: f64,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub annual_fees: Option<String>,
    #[serde(default)]
    pub seats: Option<u32>,
    #[serde(default)]
    pub entrance_exams: Vec<String>,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default)]
    pub evidence_urls: Vec<String>,
}

impl Course {
    pub fn new(name: impl Into<String>, degree_level: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            degree_level: degree_level.into(),
            official_source_url: String::new(),
            row_confidence: 0.5,
            duration: None,
            annual_fees: None,
            seats: None,
            entrance_exams: Vec::new(),
            specializations: Vec::new(),
            evidence_urls: Vec::new(),
        }
    }

    pub fn degree(&self) -> Option<DegreeLevel> {
        DegreeLevel::parse(&self.degree_level)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct College {
    pub name: String,
    pub city: String,
    pub state: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub website: String,
    pub overall_confidence: f64,
    pub last_collected: DateTime<Utc>,
    pub verification_status: VerificationStatus,
    pub evidence_status: EvidenceStatus,
    #[serde(default)]
    pub evidence_urls: Vec<String>,
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_details: Option<ValidationDetails>,
}

impl College {
    /// 探索階段建立的新紀錄：Draft + PendingVerification
    pub fn discovered(
        name: impl Into<String>,
        website: impl Into<String>,
        overall_confidence: f64,
    ) -> Self {
        Self {
            name: name.into(),
            city: String::new(),
            state: String::new(),
            kind: String::new(),
            website: website.into(),
            overall_confidence,
            last_collected: Utc::now(),
            verification_status: VerificationStatus::Draft,
            evidence_status: EvidenceStatus::PendingVerification,
            evidence_urls: Vec::new(),
            courses: Vec::new(),
            validation_details: None,
        }
    }

    pub fn with_courses(mut self, courses: Vec<Course>) -> Self {
        self.courses = courses;
        self
    }

    pub fn is_validated(&self) -> bool {
        self.evidence_status != EvidenceStatus::PendingVerification
    }
}

/// 各訊號對信心分數的增減量
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Adjustments {
    pub website: f64,
    pub course_evidence: f64,
    pub govt_verification: f64,
    pub domain_quality: f64,
}

impl Adjustments {
    pub fn total(&self) -> f64 {
        self.website + self.course_evidence + self.govt_verification + self.domain_quality
    }
}

/// Diagnostic record attached to a college by the evidence validator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationDetails {
    pub website_accessible: bool,
    pub website_appears_educational: bool,
    pub edu_keywords_found: usize,
    pub courses_found: usize,
    pub total_courses: usize,
    /// `None` when the college has no courses to check.
    pub course_match_percentage: Option<f64>,
    pub govt_verified: bool,
    pub domain_type: String,
    pub adjustments: Adjustments,
    pub base_confidence: f64,
    pub final_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_url: Option<String>,
    #[serde(default)]
    pub name_suggests_public_institution: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub location: String,
    pub career_path: String,
    pub timestamp: DateTime<Utc>,
}

impl SearchQuery {
    pub fn new(location: impl Into<String>, career_path: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            career_path: career_path.into(),
            timestamp: Utc::now(),
        }
    }
}
