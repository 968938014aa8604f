use college_scout::domain::model::{College, Course, EvidenceStatus};
use college_scout::{BatchOptions, CancellationFlag, EvidenceValidator, FetchConfig, WebFetcher};
use httpmock::prelude::*;
use std::time::Duration;

const EPS: f64 = 1e-9;

fn fetcher(delay: Duration) -> WebFetcher {
    WebFetcher::new(FetchConfig {
        timeout: Duration::from_secs(5),
        delay,
        user_agent: "Educational Data Validator 1.0".to_string(),
    })
    .unwrap()
}

fn college(name: &str, website: String, confidence: f64, courses: &[&str]) -> College {
    College::discovered(name, website, confidence)
        .with_courses(courses.iter().map(|c| Course::new(*c, "UG")).collect())
}

fn serve(server: &MockServer, path: &str, status: u16, body: &str) {
    let body = body.to_string();
    let path = path.to_string();
    server.mock(move |when, then| {
        when.method(GET).path(path);
        then.status(status)
            .header("Content-Type", "text/html")
            .body(body);
    });
}

#[tokio::test]
async fn test_scenarios_against_live_http() {
    let server = MockServer::start();
    serve(
        &server,
        "/verified",
        200,
        "<h1>Admissions open</h1><p>Faculty, campus and placement cell. Approved by AICTE.</p>\
         <ul><li>B.Tech Computer Science</li></ul>",
    );
    serve(
        &server,
        "/partial",
        200,
        "<p>Admission and syllabus for our Department of Mechanical Engineering.</p>",
    );
    serve(&server, "/shop", 200, "<p>Buy shoes online, free delivery.</p>");
    serve(&server, "/gone", 404, "not found");

    let colleges = vec![
        college(
            "ABC Institute of Technology",
            server.url("/verified"),
            0.5,
            &["B.Tech Computer Science"],
        ),
        college(
            "Partial College",
            server.url("/partial"),
            0.5,
            &["Mechanical Engineering", "Aeronautical Design"],
        ),
        college("Shoe Shop", server.url("/shop"), 0.6, &[]),
        college("Gone College", server.url("/gone"), 0.85, &["B.Sc Physics"]),
    ];

    let validator = EvidenceValidator::new(fetcher(Duration::ZERO));
    let validated = validator.validate(colleges).await;

    // 全部證據齊全，分數封頂
    let verified = &validated[0];
    assert_eq!(verified.evidence_status, EvidenceStatus::Verified);
    assert!((verified.overall_confidence - 1.0).abs() < EPS);
    assert_eq!(verified.evidence_urls, vec![server.url("/verified")]);
    assert_eq!(
        verified.courses[0].evidence_urls,
        vec![server.url("/verified")]
    );

    // 一半課程相符、沒有認可字樣
    let partial = &validated[1];
    assert_eq!(partial.evidence_status, EvidenceStatus::PartiallyVerified);
    assert!((partial.overall_confidence - 0.8).abs() < EPS);
    let details = partial.validation_details.as_ref().unwrap();
    assert_eq!(details.courses_found, 1);
    assert_eq!(details.course_match_percentage, Some(50.0));
    assert!(partial.courses[1].evidence_urls.is_empty());

    let shop = &validated[2];
    assert_eq!(shop.evidence_status, EvidenceStatus::NoEvidenceFound);
    assert!((shop.overall_confidence - 0.6).abs() < EPS);
    let details = shop.validation_details.as_ref().unwrap();
    assert!(details.website_accessible);
    assert!(!details.website_appears_educational);
    assert_eq!(details.course_match_percentage, None);

    let gone = &validated[3];
    assert_eq!(gone.evidence_status, EvidenceStatus::NoEvidenceFound);
    assert!((gone.overall_confidence - 0.35).abs() < EPS);
    assert!(gone.evidence_urls.is_empty());
}

#[tokio::test]
async fn test_batch_preserves_order_with_workers() {
    let server = MockServer::start();
    serve(&server, "/a", 200, "<p>Admission and faculty.</p>");
    serve(&server, "/c", 200, "<p>Campus and semester calendar.</p>");

    let colleges = vec![
        college("A", server.url("/a"), 0.5, &[]),
        college("B", server.url("/b-missing"), 0.5, &[]),
        college("C", server.url("/c"), 0.5, &[]),
    ];

    let validator = EvidenceValidator::new(fetcher(Duration::from_millis(10)));
    let report = validator
        .validate_batch(
            colleges,
            &BatchOptions {
                workers: 2,
                cancel: CancellationFlag::new(),
            },
        )
        .await;

    let names: Vec<&str> = report.colleges.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B", "C"]);
    assert_eq!(report.validated, 3);
    assert_eq!(report.cancelled, 0);
    assert!(report.colleges.iter().all(|c| c.is_validated()));
}

#[tokio::test]
async fn test_cancelled_batch_returns_colleges_untouched() {
    let server = MockServer::start();
    let page = server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200).body("admission faculty");
    });

    let colleges = vec![
        college("A", server.url("/"), 0.7, &[]),
        college("B", server.url("/"), 0.4, &[]),
    ];
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let validator = EvidenceValidator::new(fetcher(Duration::ZERO));
    let report = validator
        .validate_batch(
            colleges.clone(),
            &BatchOptions {
                workers: 1,
                cancel,
            },
        )
        .await;

    page.assert_hits(0);
    assert_eq!(report.cancelled, 2);
    assert_eq!(report.validated, 0);
    assert_eq!(report.colleges, colleges);
}

#[tokio::test]
async fn test_evaluate_does_not_change_college() {
    let server = MockServer::start();
    serve(&server, "/", 200, "<p>Admission, faculty, recognized by UGC.</p>");

    let original = college("ABC", server.url("/"), 0.5, &[]);
    let validator = EvidenceValidator::new(fetcher(Duration::ZERO));

    let outcome = validator.evaluate(&original).await;
    tokio_test::assert_ok!(serde_json::to_string(&outcome.details));

    assert_eq!(outcome.evidence_status, EvidenceStatus::Verified);
    assert!((outcome.new_confidence - 0.85).abs() < EPS);
    assert_eq!(original.evidence_status, EvidenceStatus::PendingVerification);
    assert_eq!(original.overall_confidence, 0.5);
}
