//! Evidence validation and confidence adjustment.
//!
//! Each college goes through four signal stages in a fixed order:
//!
//! 1. website reachability and educational content
//! 2. course evidence on the fetched page
//! 3. government recognition terms on the fetched page
//! 4. domain quality of the website address
//!
//! Every stage contributes a bounded delta. The deltas are added to the
//! college's current confidence and the sum is clamped to `[0, 1]`.
//! Running the validator twice on the same college therefore adds the
//! deltas twice.

use crate::core::signals::{
    classify_domain, count_edu_keywords, course_matches, find_recognition_terms,
    name_suggests_public_institution, PageText, EDUCATIONAL_MIN_KEYWORDS,
};
use crate::domain::model::{Adjustments, College, Course, EvidenceStatus, ValidationDetails};
use crate::domain::ports::{FetchedPage, PageFetcher};
use crate::utils::error::{FetchError, ValidationError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

pub const WEBSITE_UNREACHABLE: f64 = -0.30;
pub const WEBSITE_REACHABLE: f64 = 0.10;
pub const EDUCATIONAL_CONTENT: f64 = 0.10;
pub const NON_EDUCATIONAL_CONTENT: f64 = -0.10;

pub const NO_COURSES_FOUND: f64 = -0.20;
pub const FEW_COURSES_FOUND: f64 = -0.05;
pub const SOME_COURSES_FOUND: f64 = 0.10;
pub const MOST_COURSES_FOUND: f64 = 0.20;

pub const GOVT_RECOGNITION: f64 = 0.15;

/// Match percentage at or above which course evidence counts as strong.
pub const STRONG_COURSE_MATCH: f64 = 70.0;
const WEAK_COURSE_MATCH: f64 = 30.0;

/// 驗證結果；由 `apply_outcome` 套用到 College
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub details: ValidationDetails,
    pub evidence_status: EvidenceStatus,
    pub new_confidence: f64,
    /// Parallel to the college's course list.
    pub matched_courses: Vec<bool>,
}

impl ValidationOutcome {
    /// Outcome for a college whose validation could not run to completion.
    pub fn failed(college: &College, error: &ValidationError) -> Self {
        let confidence = clamp_confidence(college.overall_confidence);
        let details = ValidationDetails {
            total_courses: college.courses.len(),
            domain_type: classify_domain(&college.website).label().to_string(),
            base_confidence: college.overall_confidence,
            final_confidence: confidence,
            name_suggests_public_institution: name_suggests_public_institution(&college.name),
            error: Some(error.to_string()),
            ..Default::default()
        };

        Self {
            details,
            evidence_status: EvidenceStatus::NoEvidenceFound,
            new_confidence: confidence,
            matched_courses: vec![false; college.courses.len()],
        }
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn course_adjustment(courses_found: usize, total_courses: usize) -> f64 {
    if courses_found == 0 || total_courses == 0 {
        return NO_COURSES_FOUND;
    }
    let percentage = courses_found as f64 * 100.0 / total_courses as f64;
    if percentage < WEAK_COURSE_MATCH {
        FEW_COURSES_FOUND
    } else if percentage < STRONG_COURSE_MATCH {
        SOME_COURSES_FOUND
    } else {
        MOST_COURSES_FOUND
    }
}

// Stage 1
fn website_signal(
    fetch: Result<FetchedPage, FetchError>,
    details: &mut ValidationDetails,
) -> Option<PageText> {
    match fetch {
        Ok(page) => {
            let text = PageText::from_html(&page.body_text);
            let keywords = count_edu_keywords(&text);
            let educational = keywords >= EDUCATIONAL_MIN_KEYWORDS;

            details.website_accessible = true;
            details.edu_keywords_found = keywords;
            details.website_appears_educational = educational;
            details.adjustments.website = WEBSITE_REACHABLE
                + if educational {
                    EDUCATIONAL_CONTENT
                } else {
                    NON_EDUCATIONAL_CONTENT
                };
            details.evidence_url = Some(page.final_url);

            tracing::debug!(
                "🌐 website reachable, {} educational keywords (educational: {})",
                keywords,
                educational
            );
            Some(text)
        }
        Err(e) => {
            tracing::warn!("🔶 Website check failed: {}", e);
            details.website_accessible = false;
            details.adjustments.website = WEBSITE_UNREACHABLE;
            None
        }
    }
}

// Stage 2: 沒有課程就完全跳過
fn course_signal(
    page: Option<&PageText>,
    courses: &[Course],
    details: &mut ValidationDetails,
) -> Vec<bool> {
    details.total_courses = courses.len();
    if courses.is_empty() {
        details.course_match_percentage = None;
        return Vec::new();
    }

    let matched: Vec<bool> = courses
        .iter()
        .map(|course| page.is_some_and(|p| course_matches(p, &course.name)))
        .collect();
    let found = matched.iter().filter(|m| **m).count();

    details.courses_found = found;
    details.course_match_percentage = Some(found as f64 * 100.0 / courses.len() as f64);
    details.adjustments.course_evidence = course_adjustment(found, courses.len());

    tracing::debug!("📚 {}/{} courses found on page", found, courses.len());
    matched
}

// Stage 3: 沒有提到不扣分
fn recognition_signal(page: Option<&PageText>, details: &mut ValidationDetails) {
    let terms = page.map(find_recognition_terms).unwrap_or_default();
    details.govt_verified = !terms.is_empty();
    details.adjustments.govt_verification = if details.govt_verified {
        GOVT_RECOGNITION
    } else {
        0.0
    };
    if details.govt_verified {
        tracing::debug!("🏛️ recognition terms found: {:?}", terms);
    }
}

// Stage 4
fn domain_signal(website: &str, details: &mut ValidationDetails) {
    let domain = classify_domain(website);
    details.domain_type = domain.label().to_string();
    details.adjustments.domain_quality = domain.adjustment();
}

pub fn decide_status(details: &ValidationDetails) -> EvidenceStatus {
    let courses_strong = details.total_courses == 0
        || details
            .course_match_percentage
            .is_some_and(|p| p >= STRONG_COURSE_MATCH);

    if details.website_accessible && details.govt_verified && courses_strong {
        EvidenceStatus::Verified
    } else if details.website_accessible && (details.govt_verified || details.courses_found > 0)
    {
        EvidenceStatus::PartiallyVerified
    } else {
        EvidenceStatus::NoEvidenceFound
    }
}

const SCORE_PRECISION: f64 = 1e9;

// 0.7 + 0.10 must land on 0.8, not 0.7999999999999999
fn round_score(value: f64) -> f64 {
    (value * SCORE_PRECISION).round() / SCORE_PRECISION
}

fn aggregate(base: f64, adjustments: &Adjustments) -> Result<f64, ValidationError> {
    if !base.is_finite() {
        return Err(ValidationError::NonFiniteConfidence(base));
    }
    Ok(round_score((base + adjustments.total()).clamp(0.0, 1.0)))
}

/// Scores one college against a fixed fetch result. Deterministic.
pub fn score_college(
    college: &College,
    fetch: Result<FetchedPage, FetchError>,
) -> ValidationOutcome {
    let mut details = ValidationDetails {
        base_confidence: college.overall_confidence,
        name_suggests_public_institution: name_suggests_public_institution(&college.name),
        ..Default::default()
    };

    let page = website_signal(fetch, &mut details);
    let matched_courses = course_signal(page.as_ref(), &college.courses, &mut details);
    recognition_signal(page.as_ref(), &mut details);
    domain_signal(&college.website, &mut details);

    match aggregate(college.overall_confidence, &details.adjustments) {
        Ok(confidence) => {
            details.final_confidence = confidence;
            let evidence_status = decide_status(&details);
            ValidationOutcome {
                details,
                evidence_status,
                new_confidence: confidence,
                matched_courses,
            }
        }
        Err(e) => {
            tracing::warn!("🔶 {}: {}", college.name, e);
            // 起始值無效時以 0 為基準，只保留證據本身的分數
            let confidence = round_score(clamp_confidence(details.adjustments.total()));
            details.final_confidence = confidence;
            details.error = Some(e.to_string());
            ValidationOutcome {
                details,
                evidence_status: EvidenceStatus::NoEvidenceFound,
                new_confidence: confidence,
                matched_courses,
            }
        }
    }
}

/// The only place a college record is changed by validation.
pub fn apply_outcome(mut college: College, outcome: ValidationOutcome) -> College {
    college.overall_confidence = outcome.new_confidence;
    college.evidence_status = outcome.evidence_status;

    if let Some(url) = &outcome.details.evidence_url {
        college.evidence_urls.push(url.clone());
        for (course, matched) in college.courses.iter_mut().zip(&outcome.matched_courses) {
            if *matched {
                course.evidence_urls.push(url.clone());
            }
        }
    }

    college.validation_details = Some(outcome.details);
    college
}

/// Shared stop signal for a running batch. Colleges already in flight finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Number of pacing slots; each one has its own fetcher and delay.
    pub workers: usize,
    pub cancel: CancellationFlag,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            cancel: CancellationFlag::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Same length and order as the input.
    pub colleges: Vec<College>,
    pub validated: usize,
    pub failed: usize,
    pub cancelled: usize,
}

type WorkQueue = Arc<Mutex<VecDeque<(usize, College)>>>;

fn next_job(queue: &WorkQueue) -> Option<(usize, College)> {
    queue
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .pop_front()
}

/// 每所學校在獨立 task 中驗證；panic 只影響該校
async fn validate_isolated<F: PageFetcher + 'static>(fetcher: Arc<F>, college: College) -> College {
    let snapshot = college.clone();
    let task = tokio::spawn(async move {
        let fetch = fetcher.fetch(&college.website).await;
        let outcome = score_college(&college, fetch);
        apply_outcome(college, outcome)
    });

    match task.await {
        Ok(validated) => validated,
        Err(join_error) => {
            let error = ValidationError::WorkerFailed(join_error.to_string());
            tracing::error!("❌ {}: {}", snapshot.name, error);
            let outcome = ValidationOutcome::failed(&snapshot, &error);
            apply_outcome(snapshot, outcome)
        }
    }
}

async fn run_slot<F: PageFetcher + 'static>(
    fetcher: Arc<F>,
    queue: WorkQueue,
    cancel: CancellationFlag,
) -> Vec<(usize, College)> {
    let mut done = Vec::new();
    while !cancel.is_cancelled() {
        let Some((index, college)) = next_job(&queue) else {
            break;
        };

        let before = college.overall_confidence;
        let validated = validate_isolated(fetcher.clone(), college).await;
        tracing::info!(
            "🎓 {}: {} (confidence {:.2} → {:.2})",
            validated.name,
            validated.evidence_status.as_str(),
            before,
            validated.overall_confidence
        );
        done.push((index, validated));
    }
    done
}

pub struct EvidenceValidator<F: PageFetcher> {
    fetcher: Arc<F>,
}

impl<F: PageFetcher + 'static> EvidenceValidator<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Collects all signals for one college without changing it.
    pub async fn evaluate(&self, college: &College) -> ValidationOutcome {
        let fetch = self.fetcher.fetch(&college.website).await;
        score_college(college, fetch)
    }

    /// Validates one college, isolating any failure to that college.
    pub async fn validate_college(&self, college: College) -> College {
        validate_isolated(self.fetcher.clone(), college).await
    }

    /// Sequential validation through this validator's own pacing slot.
    pub async fn validate(&self, colleges: Vec<College>) -> Vec<College> {
        self.run_batch(colleges, vec![self.fetcher.clone()], CancellationFlag::new())
            .await
            .colleges
    }

    async fn run_batch(
        &self,
        colleges: Vec<College>,
        slots: Vec<Arc<F>>,
        cancel: CancellationFlag,
    ) -> BatchReport {
        let total = colleges.len();
        tracing::info!(
            "🔍 Validating {} colleges with {} worker(s)",
            total,
            slots.len()
        );

        let queue: WorkQueue = Arc::new(Mutex::new(colleges.into_iter().enumerate().collect()));
        let mut workers = JoinSet::new();
        for fetcher in slots {
            workers.spawn(run_slot(fetcher, queue.clone(), cancel.clone()));
        }

        let mut results: Vec<Option<College>> = vec![None; total];
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(done) => {
                    for (index, college) in done {
                        results[index] = Some(college);
                    }
                }
                Err(e) => tracing::error!("❌ Validation worker stopped: {}", e),
            }
        }

        let validated = results.iter().flatten().count();
        let failed = results
            .iter()
            .flatten()
            .filter(|c| {
                c.validation_details
                    .as_ref()
                    .is_some_and(|d| d.error.is_some())
            })
            .count();

        // 取消後尚未開始的學校原封不動地放回
        let remaining: Vec<(usize, College)> = queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        let cancelled = remaining.len();
        for (index, college) in remaining {
            results[index] = Some(college);
        }
        if cancelled > 0 {
            tracing::warn!(
                "🛑 Validation cancelled, {} colleges left unvalidated",
                cancelled
            );
        }

        let colleges: Vec<College> = results.into_iter().flatten().collect();
        if colleges.len() != total {
            tracing::error!(
                "❌ {} colleges lost by a failed worker",
                total - colleges.len()
            );
        }

        BatchReport {
            colleges,
            validated,
            failed,
            cancelled,
        }
    }
}

impl<F: PageFetcher + Clone + 'static> EvidenceValidator<F> {
    /// Validates with a bounded pool of pacing slots and honours cancellation.
    pub async fn validate_batch(&self, colleges: Vec<College>, options: &BatchOptions) -> BatchReport {
        let workers = options.workers.max(1).min(colleges.len().max(1));
        let mut slots = vec![self.fetcher.clone()];
        for _ in 1..workers {
            slots.push(Arc::new(self.fetcher.as_ref().clone()));
        }
        self.run_batch(colleges, slots, options.cancel.clone()).await
    }
}
