//! Results document and its JSON/CSV renderings.

use crate::config::settings::ThresholdSettings;
use crate::core::confidence::ConfidenceLevel;
use crate::domain::model::{College, EvidenceStatus, SearchQuery};
use crate::utils::error::{Result, ScoutError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CSV_HEADERS: [&str; 16] = [
    "College Name",
    "City",
    "State",
    "Type",
    "Website",
    "Overall Confidence",
    "Confidence Level",
    "Verification Status",
    "Evidence Status",
    "Course Name",
    "Degree Level",
    "Duration",
    "Annual Fees",
    "Seats",
    "Entrance Exams",
    "Specializations",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_colleges: usize,
    pub verified_colleges: usize,
    pub partially_verified_colleges: usize,
    pub total_courses: usize,
    pub avg_confidence: f64,
    pub below_min_confidence: usize,
    pub above_verification_threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollegeRecord {
    #[serde(flatten)]
    pub college: College,
    pub confidence_level: ConfidenceLevel,
    pub recommended_action: String,
}

impl From<College> for CollegeRecord {
    fn from(college: College) -> Self {
        let level = ConfidenceLevel::from_score(college.overall_confidence);
        Self {
            college,
            confidence_level: level,
            recommended_action: level.recommendation().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsDocument {
    pub search_query: SearchQuery,
    pub summary: Summary,
    pub colleges: Vec<CollegeRecord>,
}

impl ResultsDocument {
    pub fn into_colleges(self) -> Vec<College> {
        self.colleges.into_iter().map(|r| r.college).collect()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn summarize(colleges: &[College], thresholds: &ThresholdSettings) -> Summary {
    let count_status = |status: EvidenceStatus| {
        colleges
            .iter()
            .filter(|c| c.evidence_status == status)
            .count()
    };

    let avg_confidence = if colleges.is_empty() {
        0.0
    } else {
        colleges.iter().map(|c| c.overall_confidence).sum::<f64>() / colleges.len() as f64
    };

    Summary {
        total_colleges: colleges.len(),
        verified_colleges: count_status(EvidenceStatus::Verified),
        partially_verified_colleges: count_status(EvidenceStatus::PartiallyVerified),
        total_courses: colleges.iter().map(|c| c.courses.len()).sum(),
        avg_confidence: round2(avg_confidence),
        below_min_confidence: colleges
            .iter()
            .filter(|c| c.overall_confidence < thresholds.min_confidence)
            .count(),
        above_verification_threshold: colleges
            .iter()
            .filter(|c| c.overall_confidence >= thresholds.verification)
            .count(),
    }
}

pub fn build_results(
    query: SearchQuery,
    colleges: Vec<College>,
    thresholds: &ThresholdSettings,
) -> ResultsDocument {
    let summary = summarize(&colleges, thresholds);
    ResultsDocument {
        search_query: query,
        summary,
        colleges: colleges.into_iter().map(CollegeRecord::from).collect(),
    }
}

pub fn to_json(document: &ResultsDocument) -> Result<String> {
    Ok(serde_json::to_string_pretty(document)?)
}

pub fn read_results(data: &[u8]) -> Result<ResultsDocument> {
    Ok(serde_json::from_slice(data)?)
}

/// One row per course; a college without courses still gets one row.
pub fn to_csv(document: &ResultsDocument) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADERS)?;

    for record in &document.colleges {
        let college = &record.college;
        let confidence = college.overall_confidence.to_string();
        let base = [
            college.name.as_str(),
            college.city.as_str(),
            college.state.as_str(),
            college.kind.as_str(),
            college.website.as_str(),
            confidence.as_str(),
            record.confidence_level.as_str(),
            college.verification_status.as_str(),
            college.evidence_status.as_str(),
        ];

        if college.courses.is_empty() {
            let mut row: Vec<&str> = base.to_vec();
            row.extend(["", "", "", "", "", "", ""]);
            writer.write_record(&row)?;
            continue;
        }

        for course in &college.courses {
            let seats = course.seats.map(|s| s.to_string()).unwrap_or_default();
            let exams = course.entrance_exams.join("; ");
            let specializations = course.specializations.join("; ");

            let mut row: Vec<&str> = base.to_vec();
            row.extend([
                course.name.as_str(),
                course.degree_level.as_str(),
                course.duration.as_deref().unwrap_or_default(),
                course.annual_fees.as_deref().unwrap_or_default(),
                seats.as_str(),
                exams.as_str(),
                specializations.as_str(),
            ]);
            writer.write_record(&row)?;
        }
    }

    writer
        .into_inner()
        .map_err(|e| ScoutError::IoError(e.into_error()))
}

fn clean_segment(raw: &str) -> String {
    raw.trim()
        .replace(", ", "_")
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect()
}

/// `{location}_{career}_{timestamp}` without an extension.
pub fn output_base_name(query: &SearchQuery, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}",
        clean_segment(&query.location),
        clean_segment(&query.career_path),
        at.format("%Y%m%d_%H%M%S")
    )
}
