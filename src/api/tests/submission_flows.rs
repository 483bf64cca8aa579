use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::json;

use super::{classroom, create_paper, paper_summary, send, upload_document};
use crate::db::types::UserRole;
use crate::test_support::{self, FailingGenerator, FixedGenerator};

async fn answer_rows(ctx: &test_support::TestContext, assignment_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM answers WHERE assignment_id = $1")
        .bind(assignment_id)
        .fetch_one(ctx.state.db())
        .await
        .expect("count answers")
}

#[tokio::test]
async fn structured_answers_move_assignment_to_submitted() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let class = classroom(&ctx, 2).await;
    let (_, assignment_ids) = create_paper(&ctx.app, &class.teacher_token, &["stu1", "stu2"]).await;
    let (_, student_token) = &class.students[0];

    let (status, body) = send(
        &ctx.app,
        test_support::json_request(
            Method::POST,
            &format!("/api/v1/student/assignments/{}/answers", assignment_ids[0]),
            Some(student_token),
            Some(json!({"answers": {"q1": "F = ma", "q2": "p = mv"}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {body}");
    assert_eq!(body["kind"], "structured");
    assert_eq!(body["status"], "submitted");
    assert!(body.get("grading").is_none());

    let summary = paper_summary(&ctx.app, &class.teacher_token).await;
    assert_eq!(summary["total_assigned"], 2);
    assert_eq!(summary["pending"], 1);
    assert_eq!(summary["submitted"], 1);
    assert_eq!(summary["graded"], 0);

    let (status, body) = send(
        &ctx.app,
        test_support::json_request(
            Method::POST,
            &format!("/api/v1/student/assignments/{}/answers", assignment_ids[0]),
            Some(student_token),
            Some(json!({"answers": {"q9": "??"}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");
}

#[tokio::test]
async fn resubmission_replaces_the_single_answer() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let class = classroom(&ctx, 1).await;
    let (paper_id, assignment_ids) = create_paper(&ctx.app, &class.teacher_token, &["stu1"]).await;
    let (_, student_token) = &class.students[0];

    let (status, first) =
        upload_document(&ctx.app, student_token, &assignment_ids[0], "draft.txt", b"draft", None).await;
    assert_eq!(status, StatusCode::CREATED, "response: {first}");
    let (status, second) =
        upload_document(&ctx.app, student_token, &assignment_ids[0], "final.txt", b"final", None).await;
    assert_eq!(status, StatusCode::CREATED, "response: {second}");

    assert_eq!(first["answer_id"], second["answer_id"]);
    assert_eq!(answer_rows(&ctx, &assignment_ids[0]).await, 1);

    let (status, body) = send(
        &ctx.app,
        test_support::json_request(
            Method::GET,
            &format!("/api/v1/teacher/papers/{paper_id}/submissions"),
            Some(&class.teacher_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    let rows = body.as_array().expect("submissions");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["student_username"], "stu1");
    assert_eq!(rows[0]["kind"], "document");
    assert_eq!(rows[0]["graded"], false);
}

#[tokio::test]
async fn document_without_key_is_not_auto_graded() {
    let generator = Arc::new(FixedGenerator::new(test_support::DEFAULT_GRADING_RESPONSE));
    let Some(ctx) = test_support::setup_test_context_with(generator.clone()).await else {
        return;
    };
    let class = classroom(&ctx, 1).await;
    let (_, assignment_ids) = create_paper(&ctx.app, &class.teacher_token, &["stu1"]).await;
    let (_, student_token) = &class.students[0];

    let (status, body) =
        upload_document(&ctx.app, student_token, &assignment_ids[0], "work.txt", b"F = ma", None).await;
    assert_eq!(status, StatusCode::CREATED, "response: {body}");
    assert_eq!(body["status"], "submitted");
    assert!(body.get("grading").is_none());
    assert!(body.get("grading_error").is_none());
    assert!(generator.requests().is_empty());
}

#[tokio::test]
async fn document_with_key_is_graded_on_submission() {
    let generator = Arc::new(FixedGenerator::new(test_support::DEFAULT_GRADING_RESPONSE));
    let Some(ctx) = test_support::setup_test_context_with(generator.clone()).await else {
        return;
    };
    let class = classroom(&ctx, 1).await;
    let (_, assignment_ids) = create_paper(&ctx.app, &class.teacher_token, &["stu1"]).await;
    let (_, student_token) = &class.students[0];

    let (status, body) = upload_document(
        &ctx.app,
        student_token,
        &assignment_ids[0],
        "work.txt",
        b"Newton: F = ma",
        Some("student-key"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {body}");
    assert_eq!(body["status"], "graded");
    assert_eq!(body["grading"]["grade"], "8/10");
    assert_eq!(body["grading"]["feedback"], test_support::DEFAULT_GRADING_RESPONSE);

    let requests = generator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].api_key.as_deref(), Some("student-key"));
    assert!(requests[0].prompt.contains("Newton: F = ma"));
    assert!(requests[0].prompt.contains("State Newton's second law."));

    let answer_id = body["answer_id"].as_str().expect("answer id");
    let (status, body) = send(
        &ctx.app,
        test_support::json_request(
            Method::GET,
            &format!("/api/v1/student/submissions/{answer_id}"),
            Some(student_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["graded"], true);
    assert_eq!(body["grade"], "8/10");
    assert!(body["graded_at"].is_string());

    let summary = paper_summary(&ctx.app, &class.teacher_token).await;
    assert_eq!(summary["graded"], 1);
    assert_eq!(summary["submitted"], 0);
}

#[tokio::test]
async fn long_score_line_still_grades_the_submission() {
    let response = "Fine.\nOVERALL_SCORE: 7/10 - solid grasp of Newtonian mechanics, \
                    but the derivations skip several steps and omit units\n";
    let generator = Arc::new(FixedGenerator::new(response));
    let Some(ctx) = test_support::setup_test_context_with(generator).await else {
        return;
    };
    let class = classroom(&ctx, 1).await;
    let (_, assignment_ids) = create_paper(&ctx.app, &class.teacher_token, &["stu1"]).await;
    let (_, student_token) = &class.students[0];

    let (status, body) = upload_document(
        &ctx.app,
        student_token,
        &assignment_ids[0],
        "work.txt",
        b"F = ma",
        Some("student-key"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {body}");
    assert_eq!(body["status"], "graded", "response: {body}");
    assert!(body.get("grading_error").is_none(), "response: {body}");
    let grade = body["grading"]["grade"].as_str().expect("grade");
    assert_eq!(grade.chars().count(), 64);
    assert!(grade.starts_with("7/10 - solid grasp"));

    let summary = paper_summary(&ctx.app, &class.teacher_token).await;
    assert_eq!(summary["graded"], 1);
}

#[tokio::test]
async fn generation_failure_keeps_submission_ungraded() {
    let Some(ctx) =
        test_support::setup_test_context_with(Arc::new(FailingGenerator::status(500))).await
    else {
        return;
    };
    let class = classroom(&ctx, 1).await;
    let (_, assignment_ids) = create_paper(&ctx.app, &class.teacher_token, &["stu1"]).await;
    let (_, student_token) = &class.students[0];

    let (status, body) = upload_document(
        &ctx.app,
        student_token,
        &assignment_ids[0],
        "work.txt",
        b"answer text",
        Some("student-key"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {body}");
    assert_eq!(body["status"], "submitted");
    assert!(body.get("grading").is_none());
    assert!(body["grading_error"].is_string(), "response: {body}");

    let graded: bool = sqlx::query_scalar("SELECT graded FROM answers WHERE assignment_id = $1")
        .bind(&assignment_ids[0])
        .fetch_one(ctx.state.db())
        .await
        .expect("answer");
    assert!(!graded);

    let summary = paper_summary(&ctx.app, &class.teacher_token).await;
    assert_eq!(summary["submitted"], 1);
    assert_eq!(summary["graded"], 0);
}

#[tokio::test]
async fn disallowed_extension_is_rejected() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let class = classroom(&ctx, 1).await;
    let (_, assignment_ids) = create_paper(&ctx.app, &class.teacher_token, &["stu1"]).await;
    let (_, student_token) = &class.students[0];

    let (status, body) =
        upload_document(&ctx.app, student_token, &assignment_ids[0], "run.exe", b"MZ", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");
    assert_eq!(answer_rows(&ctx, &assignment_ids[0]).await, 0);
}

#[tokio::test]
async fn students_cannot_submit_to_foreign_assignments() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let class = classroom(&ctx, 2).await;
    let (_, assignment_ids) = create_paper(&ctx.app, &class.teacher_token, &["stu1"]).await;
    let (_, intruder_token) = &class.students[1];

    let (status, body) =
        upload_document(&ctx.app, intruder_token, &assignment_ids[0], "work.txt", b"x", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "response: {body}");

    let (status, body) = send(
        &ctx.app,
        test_support::json_request(
            Method::POST,
            &format!("/api/v1/student/assignments/{}/answers", assignment_ids[0]),
            Some(intruder_token),
            Some(json!({"answers": {"q1": "x"}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "response: {body}");
    assert_eq!(answer_rows(&ctx, &assignment_ids[0]).await, 0);
}

#[tokio::test]
async fn manual_grading_is_owner_only_and_reset_by_resubmission() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let class = classroom(&ctx, 1).await;
    let (_, assignment_ids) = create_paper(&ctx.app, &class.teacher_token, &["stu1"]).await;
    let (_, student_token) = &class.students[0];

    let (_, body) = send(
        &ctx.app,
        test_support::json_request(
            Method::POST,
            &format!("/api/v1/student/assignments/{}/answers", assignment_ids[0]),
            Some(student_token),
            Some(json!({"answers": {"q1": "F = ma"}})),
        ),
    )
    .await;
    let answer_id = body["answer_id"].as_str().expect("answer id").to_string();

    let other =
        test_support::insert_user(ctx.state.db(), "teacher2", "teacher2@school.test", UserRole::Teacher)
            .await;
    let other_token = test_support::bearer_token(&other, ctx.state.settings());
    let grade_uri = format!("/api/v1/teacher/answers/{answer_id}/grade");

    let (status, body) = send(
        &ctx.app,
        test_support::json_request(
            Method::POST,
            &grade_uri,
            Some(&other_token),
            Some(json!({"grade": "10/10"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "response: {body}");
    let graded: bool = sqlx::query_scalar("SELECT graded FROM answers WHERE id = $1")
        .bind(&answer_id)
        .fetch_one(ctx.state.db())
        .await
        .expect("answer");
    assert!(!graded);

    let (status, body) = send(
        &ctx.app,
        test_support::json_request(
            Method::POST,
            &grade_uri,
            Some(&class.teacher_token),
            Some(json!({"grade": "   "})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");

    let (status, body) = send(
        &ctx.app,
        test_support::json_request(
            Method::POST,
            &grade_uri,
            Some(&class.teacher_token),
            Some(json!({"grade": " 9/10 ", "feedback": "Good units."})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["grade"], "9/10");
    assert_eq!(body["feedback"], "Good units.");
    assert_eq!(paper_summary(&ctx.app, &class.teacher_token).await["graded"], 1);

    let (status, body) = send(
        &ctx.app,
        test_support::json_request(
            Method::POST,
            &format!("/api/v1/student/assignments/{}/answers", assignment_ids[0]),
            Some(student_token),
            Some(json!({"answers": {"q1": "F = m * a"}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {body}");
    assert_eq!(body["answer_id"], answer_id.as_str());

    let (status, body) = send(
        &ctx.app,
        test_support::json_request(
            Method::GET,
            &format!("/api/v1/student/submissions/{answer_id}"),
            Some(student_token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["graded"], false);
    assert!(body["grade"].is_null());

    let summary = paper_summary(&ctx.app, &class.teacher_token).await;
    assert_eq!(summary["submitted"], 1);
    assert_eq!(summary["graded"], 0);
}

#[tokio::test]
async fn regrade_rejects_structured_answers() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let class = classroom(&ctx, 1).await;
    let (_, assignment_ids) = create_paper(&ctx.app, &class.teacher_token, &["stu1"]).await;
    let (_, student_token) = &class.students[0];

    let (_, body) = send(
        &ctx.app,
        test_support::json_request(
            Method::POST,
            &format!("/api/v1/student/assignments/{}/answers", assignment_ids[0]),
            Some(student_token),
            Some(json!({"answers": {"q1": "F = ma"}})),
        ),
    )
    .await;
    let answer_id = body["answer_id"].as_str().expect("answer id");

    let (status, body) = send(
        &ctx.app,
        test_support::json_request(
            Method::POST,
            &format!("/api/v1/teacher/answers/{answer_id}/regrade"),
            Some(&class.teacher_token),
            Some(json!({"api_key": "teacher-key"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");
}

#[tokio::test]
async fn regrade_reads_the_stored_document() {
    let generator = Arc::new(FixedGenerator::new("Detailed.\nOVERALL_SCORE: 6/10\n"));
    let Some(ctx) = test_support::setup_test_context_with(generator.clone()).await else {
        return;
    };
    let class = classroom(&ctx, 1).await;
    let (_, assignment_ids) = create_paper(&ctx.app, &class.teacher_token, &["stu1"]).await;
    let (_, student_token) = &class.students[0];

    let (_, body) = upload_document(
        &ctx.app,
        student_token,
        &assignment_ids[0],
        "work.txt",
        b"stored answer",
        None,
    )
    .await;
    let answer_id = body["answer_id"].as_str().expect("answer id");

    let (status, body) = send(
        &ctx.app,
        test_support::json_request(
            Method::POST,
            &format!("/api/v1/teacher/answers/{answer_id}/regrade"),
            Some(&class.teacher_token),
            Some(json!({"api_key": "teacher-key"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["grade"], "6/10");
    assert!(generator.requests()[0].prompt.contains("stored answer"));
}
