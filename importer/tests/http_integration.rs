//! End-to-end runs against a mocked Kordiam server.

use std::sync::Arc;

use kordiam_importer::{
    ClientCredentialsClient, Connection, ElementAssembler, KordiamClient, MappingSpec, Outcome,
    Pipeline, PipelineOptions, Remote, Row, RowError, SubmissionError, TokenManager,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote_for(server: &MockServer) -> Remote {
    let connection = Connection::new(server.uri(), "importer", "s3cret");
    let fetcher = Arc::new(ClientCredentialsClient::new(&connection).unwrap());
    Remote {
        tokens: Arc::new(TokenManager::new(fetcher)),
        submitter: Arc::new(KordiamClient::new(&connection).unwrap()),
    }
}

fn pipeline(server: &MockServer, concurrency: usize) -> Pipeline {
    let options = PipelineOptions {
        concurrency,
        ..Default::default()
    };
    let assembler = ElementAssembler::new(Arc::new(MappingSpec::reference()));
    Pipeline::new(assembler, options, Some(remote_for(server))).unwrap()
}

fn rows(n: usize) -> Vec<(usize, Row)> {
    (1..=n)
        .map(|i| {
            let row: Row = [
                ("Title", format!("Story {}", i)),
                ("Task Status ID", "1".to_string()),
                ("Task Format ID", "18".to_string()),
                ("Task Deadline", "2024-03-15 16:00".to_string()),
            ]
            .into_iter()
            .collect();
            (i, row)
        })
        .collect()
}

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=importer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn rows_share_one_token_and_are_created_in_order() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/v1_0_1/elements/"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 100})))
        .expect(6)
        .mount(&server)
        .await;

    let report = pipeline(&server, 3).run(rows(6)).await;

    assert_eq!(report.summary().created, 6);
    let numbers: Vec<usize> = report.rows.iter().map(|r| r.row).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
    assert!(!report.has_failures());
}

#[tokio::test]
async fn submitted_body_carries_nested_sections() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/v1_0_1/elements/"))
        .and(body_string_contains("\"deadline\":{\"date\":\"2024-03-15\",\"time\":\"16:00\"}"))
        .and(body_string_contains("\"confirmationStatus\":-2"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "e-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let report = pipeline(&server, 1).run(rows(1)).await;
    assert!(matches!(&report.rows[0].outcome, Outcome::Created(id) if id.as_str() == "e-1"));
}

#[tokio::test]
async fn rejected_rows_do_not_stop_the_run() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/v1_0_1/elements/"))
        .and(body_string_contains("Story 2"))
        .respond_with(ResponseTemplate::new(400).set_body_string("{\"tasks\":[\"bad format\"]}"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1_0_1/elements/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7})))
        .mount(&server)
        .await;

    let report = pipeline(&server, 1).run(rows(3)).await;

    assert!(report.rows[0].outcome.is_created());
    assert!(matches!(
        &report.rows[1].outcome,
        Outcome::Failed(RowError::Submission(SubmissionError::Rejected { status: 400, .. }))
    ));
    assert!(report.rows[2].outcome.is_created());
    assert_eq!(report.failures()[0].row, 2);
}

#[tokio::test]
async fn token_endpoint_failure_aborts_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("{\"error\":\"invalid_client\"}"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1_0_1/elements/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .expect(0)
        .mount(&server)
        .await;

    let report = pipeline(&server, 1).run(rows(4)).await;

    assert!(matches!(report.rows[0].outcome, Outcome::Failed(RowError::Auth(_))));
    assert!(report.rows[1..].iter().all(|r| matches!(r.outcome, Outcome::Skipped(_))));
    assert!(report.aborted.is_some());
    assert!(report.has_failures());
}

#[tokio::test]
async fn unauthorized_submission_triggers_reauthentication() {
    let server = MockServer::start().await;
    mount_token(&server, 2).await;
    Mock::given(method("POST"))
        .and(path("/api/v1_0_1/elements/"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1_0_1/elements/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9})))
        .mount(&server)
        .await;

    let report = pipeline(&server, 1).run(rows(2)).await;

    assert!(matches!(
        report.rows[0].outcome,
        Outcome::Failed(RowError::Submission(SubmissionError::Unauthorized(401)))
    ));
    assert!(report.rows[1].outcome.is_created());
}
