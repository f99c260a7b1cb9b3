//! Integration tests against the live model endpoint.
//!
//! These tests make real API calls to xAI.
//! Run with: XAI_API_KEY=your_key cargo test --test llm_integration -- --ignored

use std::sync::Arc;
use std::time::Duration;

use gradeforge::llm::{ChatClient, GenerationRequest, LlmProvider, Message};
use gradeforge::pipeline::config::{DEFAULT_API_BASE, DEFAULT_MODEL};
use gradeforge::pipeline::ItemFailurePolicy;
use gradeforge::stages::{parse_score_summary, Rubric, RubricScorer};

fn get_test_api_key() -> String {
    std::env::var("XAI_API_KEY")
        .expect("XAI_API_KEY environment variable must be set for integration tests")
}

fn create_test_client() -> ChatClient {
    ChatClient::new(DEFAULT_API_BASE, DEFAULT_MODEL, Duration::from_secs(120))
        .expect("Should build HTTP client")
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_simple_generation() {
    let client = create_test_client();

    let request = GenerationRequest::with_default_model(vec![
        Message::system("You are a helpful assistant. Reply concisely."),
        Message::user("What is 2 + 2? Reply with just the number."),
    ])
    .with_temperature(0.0);

    let response = client.generate(&get_test_api_key(), request).await;
    assert!(response.is_ok(), "Generation failed: {:?}", response.err());

    let response = response.expect("Should have response");
    let content = response.first_content().expect("Should have content");
    assert!(
        content.contains('4'),
        "Response should contain '4', got: {}",
        content
    );
}

#[tokio::test]
#[ignore]
async fn test_invalid_api_key() {
    let client = create_test_client();

    let request = GenerationRequest::with_default_model(vec![Message::user("test")]);

    let response = client.generate("invalid-key", request).await;
    assert!(response.is_err(), "Should fail with invalid API key");
}

#[tokio::test]
#[ignore]
async fn test_live_evaluation_has_score_summary() {
    let scorer = RubricScorer::new(Arc::new(create_test_client()), ItemFailurePolicy::FailStage);
    let rubric = Rubric {
        rubric: "Thesis: 5 points\nEvidence: 5 points".to_string(),
        question: "Should homework be banned?".to_string(),
        correct_answers: Vec::new(),
    };
    let paper = "Homework should not be banned. It helps students practice. \
                 For example, math drills improve speed.";

    let evaluation = scorer
        .evaluate(&get_test_api_key(), &rubric, paper)
        .await
        .expect("Evaluation should succeed");

    assert!(!evaluation.grader_a.is_empty());
    assert!(!evaluation.grader_b.is_empty());
    let summary = parse_score_summary(&evaluation.moderator);
    assert!(
        summary.total.is_some(),
        "Moderator output should contain a score summary, got: {}",
        evaluation.moderator
    );
}
