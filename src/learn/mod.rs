//! # Learn Module - Learning Management System (LMS)
//!
//! Course, module, lesson and quiz management with per-user progress
//! tracking:
//! - Course management (CRUD operations)
//! - Ordered modules and lessons
//! - Quiz engine with graded attempts and attempt limits
//! - Enrollments and lesson completion per user
//!
//! Completion events recorded here feed the certification module, which
//! decides when a course counts as completed and issues certificates.
//!
//! ## Architecture
//!
//! - Diesel ORM for database operations
//! - Axum handlers for HTTP routes
//! - Serde for JSON serialization
//! - UUID for unique identifiers

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

pub mod types;

use crate::certification::expiry::ExpiryPolicy;
use crate::certification::{CertificationService, UserScope};
use crate::shared::schema::*;
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;
use types::*;

// ============================================================================
// LEARN ENGINE
// ============================================================================

/// Main Learn engine that handles all LMS operations
pub struct LearnEngine {
    db: DbPool,
}

impl LearnEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    // ----- Course Operations -----

    pub async fn create_course(&self, req: CreateCourseRequest) -> Result<Course, String> {
        let policy = req.expiry_policy.unwrap_or(ExpiryPolicy::Never);
        // Authoring boundary: an explicitly configured period must be
        // positive. Legacy rows with a missing value still evaluate to
        // "no expiry" at issuance time.
        match policy {
            ExpiryPolicy::PeriodDays { days: n }
            | ExpiryPolicy::PeriodMonths { months: n }
            | ExpiryPolicy::PeriodYears { years: n }
                if n <= 0 =>
            {
                return Err("expiry period must be positive".to_string());
            }
            _ => {}
        }
        let (expiry_mode, expiry_value, expiry_fixed_at) = policy.as_columns();

        let now = Utc::now();
        let course = Course {
            id: Uuid::new_v4(),
            title: req.title,
            description: req.description,
            instructor_name: req.instructor_name,
            expiry_mode: expiry_mode.to_string(),
            expiry_value,
            expiry_fixed_at,
            is_published: false,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.db.get().map_err(|e| e.to_string())?;
        diesel::insert_into(learn_courses::table)
            .values(&course)
            .execute(&mut conn)
            .map_err(|e| e.to_string())?;

        Ok(course)
    }

    pub async fn get_course(&self, course_id: Uuid) -> Result<Option<Course>, String> {
        let mut conn = self.db.get().map_err(|e| e.to_string())?;
        learn_courses::table
            .filter(learn_courses::id.eq(course_id))
            .first::<Course>(&mut conn)
            .optional()
            .map_err(|e| e.to_string())
    }

    pub async fn list_courses(&self) -> Result<Vec<Course>, String> {
        let mut conn = self.db.get().map_err(|e| e.to_string())?;
        learn_courses::table
            .filter(learn_courses::is_published.eq(true))
            .order(learn_courses::created_at.desc())
            .load::<Course>(&mut conn)
            .map_err(|e| e.to_string())
    }

    pub async fn publish_course(&self, course_id: Uuid) -> Result<(), String> {
        let mut conn = self.db.get().map_err(|e| e.to_string())?;
        diesel::update(learn_courses::table.filter(learn_courses::id.eq(course_id)))
            .set((
                learn_courses::is_published.eq(true),
                learn_courses::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub async fn delete_course(&self, course_id: Uuid) -> Result<(), String> {
        let mut conn = self.db.get().map_err(|e| e.to_string())?;

        let module_ids: Vec<Uuid> = learn_modules::table
            .filter(learn_modules::course_id.eq(course_id))
            .select(learn_modules::id)
            .load(&mut conn)
            .map_err(|e| e.to_string())?;

        // Delete related records first
        let lesson_ids: Vec<Uuid> = learn_lessons::table
            .filter(learn_lessons::module_id.eq_any(&module_ids))
            .select(learn_lessons::id)
            .load(&mut conn)
            .map_err(|e| e.to_string())?;
        let quiz_ids: Vec<Uuid> = learn_quizzes::table
            .filter(learn_quizzes::module_id.eq_any(&module_ids))
            .select(learn_quizzes::id)
            .load(&mut conn)
            .map_err(|e| e.to_string())?;

        diesel::delete(
            learn_lesson_progress::table
                .filter(learn_lesson_progress::lesson_id.eq_any(&lesson_ids)),
        )
        .execute(&mut conn)
        .map_err(|e| e.to_string())?;
        diesel::delete(
            learn_quiz_attempts::table.filter(learn_quiz_attempts::quiz_id.eq_any(&quiz_ids)),
        )
        .execute(&mut conn)
        .map_err(|e| e.to_string())?;
        diesel::delete(learn_lessons::table.filter(learn_lessons::module_id.eq_any(&module_ids)))
            .execute(&mut conn)
            .map_err(|e| e.to_string())?;
        diesel::delete(learn_quizzes::table.filter(learn_quizzes::module_id.eq_any(&module_ids)))
            .execute(&mut conn)
            .map_err(|e| e.to_string())?;
        diesel::delete(learn_modules::table.filter(learn_modules::course_id.eq(course_id)))
            .execute(&mut conn)
            .map_err(|e| e.to_string())?;
        diesel::delete(
            learn_enrollments::table.filter(learn_enrollments::course_id.eq(course_id)),
        )
        .execute(&mut conn)
        .map_err(|e| e.to_string())?;
        diesel::delete(learn_courses::table.filter(learn_courses::id.eq(course_id)))
            .execute(&mut conn)
            .map_err(|e| e.to_string())?;

        Ok(())
    }

    // ----- Module Operations -----

    pub async fn create_module(
        &self,
        course_id: Uuid,
        req: CreateModuleRequest,
    ) -> Result<CourseModule, String> {
        let mut conn = self.db.get().map_err(|e| e.to_string())?;

        let max_position: Option<i32> = learn_modules::table
            .filter(learn_modules::course_id.eq(course_id))
            .select(diesel::dsl::max(learn_modules::position))
            .first(&mut conn)
            .map_err(|e| e.to_string())?;

        let module = CourseModule {
            id: Uuid::new_v4(),
            course_id,
            title: req.title,
            position: max_position.unwrap_or(0) + 1,
            created_at: Utc::now(),
        };

        diesel::insert_into(learn_modules::table)
            .values(&module)
            .execute(&mut conn)
            .map_err(|e| e.to_string())?;

        Ok(module)
    }

    pub async fn get_modules(&self, course_id: Uuid) -> Result<Vec<CourseModule>, String> {
        let mut conn = self.db.get().map_err(|e| e.to_string())?;
        learn_modules::table
            .filter(learn_modules::course_id.eq(course_id))
            .order(learn_modules::position.asc())
            .load::<CourseModule>(&mut conn)
            .map_err(|e| e.to_string())
    }

    // ----- Lesson Operations -----

    pub async fn create_lesson(
        &self,
        module_id: Uuid,
        req: CreateLessonRequest,
    ) -> Result<Lesson, String> {
        let mut conn = self.db.get().map_err(|e| e.to_string())?;

        let max_position: Option<i32> = learn_lessons::table
            .filter(learn_lessons::module_id.eq(module_id))
            .select(diesel::dsl::max(learn_lessons::position))
            .first(&mut conn)
            .map_err(|e| e.to_string())?;

        let now = Utc::now();
        let lesson = Lesson {
            id: Uuid::new_v4(),
            module_id,
            title: req.title,
            content: req.content,
            position: max_position.unwrap_or(0) + 1,
            created_at: now,
            updated_at: now,
        };

        diesel::insert_into(learn_lessons::table)
            .values(&lesson)
            .execute(&mut conn)
            .map_err(|e| e.to_string())?;

        Ok(lesson)
    }

    pub async fn get_lessons(&self, module_id: Uuid) -> Result<Vec<Lesson>, String> {
        let mut conn = self.db.get().map_err(|e| e.to_string())?;
        learn_lessons::table
            .filter(learn_lessons::module_id.eq(module_id))
            .order(learn_lessons::position.asc())
            .load::<Lesson>(&mut conn)
            .map_err(|e| e.to_string())
    }

    // ----- Quiz Operations -----

    pub async fn create_quiz(&self, module_id: Uuid, req: CreateQuizRequest) -> Result<Quiz, String> {
        let mut conn = self.db.get().map_err(|e| e.to_string())?;

        let existing: i64 = learn_quizzes::table
            .filter(learn_quizzes::module_id.eq(module_id))
            .count()
            .get_result(&mut conn)
            .map_err(|e| e.to_string())?;
        if existing > 0 {
            return Err("module already has a quiz".to_string());
        }

        let now = Utc::now();
        let quiz = Quiz {
            id: Uuid::new_v4(),
            module_id,
            title: req.title,
            is_required: req.is_required.unwrap_or(true),
            passing_score: req.passing_score.unwrap_or(70),
            max_attempts: req.max_attempts,
            questions: serde_json::to_value(&req.questions).unwrap_or(serde_json::json!([])),
            created_at: now,
            updated_at: now,
        };

        diesel::insert_into(learn_quizzes::table)
            .values(&quiz)
            .execute(&mut conn)
            .map_err(|e| e.to_string())?;

        Ok(quiz)
    }

    pub async fn submit_quiz(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
        submission: QuizSubmission,
    ) -> Result<QuizResult, String> {
        let mut conn = self.db.get().map_err(|e| e.to_string())?;

        let quiz: Quiz = learn_quizzes::table
            .filter(learn_quizzes::id.eq(quiz_id))
            .first(&mut conn)
            .map_err(|e| e.to_string())?;

        let previous_attempts: i64 = learn_quiz_attempts::table
            .filter(learn_quiz_attempts::user_id.eq(user_id))
            .filter(learn_quiz_attempts::quiz_id.eq(quiz_id))
            .count()
            .get_result(&mut conn)
            .map_err(|e| e.to_string())?;

        if let Some(max_attempts) = quiz.max_attempts {
            if previous_attempts >= max_attempts as i64 {
                return Err("maximum quiz attempts reached".to_string());
            }
        }

        let questions: Vec<QuizQuestion> =
            serde_json::from_value(quiz.questions.clone()).unwrap_or_default();
        let (earned_points, total_points, answers_breakdown) = grade(&questions, &submission);

        let percentage = if total_points > 0 {
            (earned_points as f32 / total_points as f32) * 100.0
        } else {
            0.0
        };
        let passed = percentage >= quiz.passing_score as f32;

        let now = Utc::now();
        let attempt = QuizAttempt {
            id: Uuid::new_v4(),
            user_id,
            quiz_id,
            score_percent: percentage as i32,
            passed,
            started_at: now,
            completed_at: Some(now),
        };
        diesel::insert_into(learn_quiz_attempts::table)
            .values(&attempt)
            .execute(&mut conn)
            .map_err(|e| e.to_string())?;

        Ok(QuizResult {
            quiz_id,
            user_id,
            score: earned_points,
            max_score: total_points,
            percentage,
            passed,
            attempt_number: previous_attempts as i32 + 1,
            answers_breakdown,
        })
    }

    /// Course the quiz belongs to, through its module.
    pub async fn quiz_course(&self, quiz_id: Uuid) -> Result<Uuid, String> {
        let mut conn = self.db.get().map_err(|e| e.to_string())?;
        learn_quizzes::table
            .inner_join(learn_modules::table.on(learn_modules::id.eq(learn_quizzes::module_id)))
            .filter(learn_quizzes::id.eq(quiz_id))
            .select(learn_modules::course_id)
            .first::<Uuid>(&mut conn)
            .map_err(|e| e.to_string())
    }

    // ----- Enrollment and Progress Operations -----

    pub async fn enroll(&self, user_id: Uuid, course_id: Uuid) -> Result<Enrollment, String> {
        let mut conn = self.db.get().map_err(|e| e.to_string())?;

        // Check if already enrolled
        let existing: Option<Enrollment> = learn_enrollments::table
            .filter(learn_enrollments::user_id.eq(user_id))
            .filter(learn_enrollments::course_id.eq(course_id))
            .first(&mut conn)
            .optional()
            .map_err(|e| e.to_string())?;
        if let Some(enrollment) = existing {
            return Ok(enrollment);
        }

        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            user_id,
            course_id,
            enrolled_at: Utc::now(),
            completed_at: None,
        };
        diesel::insert_into(learn_enrollments::table)
            .values(&enrollment)
            .execute(&mut conn)
            .map_err(|e| e.to_string())?;

        Ok(enrollment)
    }

    /// Mark a lesson completed for the user. Idempotent. Returns the course
    /// the lesson belongs to so callers can trigger a completion evaluation.
    pub async fn complete_lesson(&self, user_id: Uuid, lesson_id: Uuid) -> Result<Uuid, String> {
        let mut conn = self.db.get().map_err(|e| e.to_string())?;

        let course_id: Uuid = learn_lessons::table
            .inner_join(learn_modules::table.on(learn_modules::id.eq(learn_lessons::module_id)))
            .filter(learn_lessons::id.eq(lesson_id))
            .select(learn_modules::course_id)
            .first(&mut conn)
            .map_err(|e| e.to_string())?;

        let now = Utc::now();
        let existing: Option<LessonProgress> = learn_lesson_progress::table
            .filter(learn_lesson_progress::user_id.eq(user_id))
            .filter(learn_lesson_progress::lesson_id.eq(lesson_id))
            .first(&mut conn)
            .optional()
            .map_err(|e| e.to_string())?;

        match existing {
            Some(progress) if progress.completed => {}
            Some(progress) => {
                diesel::update(
                    learn_lesson_progress::table
                        .filter(learn_lesson_progress::id.eq(progress.id)),
                )
                .set((
                    learn_lesson_progress::completed.eq(true),
                    learn_lesson_progress::completed_at.eq(Some(now)),
                    learn_lesson_progress::updated_at.eq(now),
                ))
                .execute(&mut conn)
                .map_err(|e| e.to_string())?;
            }
            None => {
                let progress = LessonProgress {
                    id: Uuid::new_v4(),
                    user_id,
                    lesson_id,
                    completed: true,
                    completed_at: Some(now),
                    updated_at: now,
                };
                diesel::insert_into(learn_lesson_progress::table)
                    .values(&progress)
                    .execute(&mut conn)
                    .map_err(|e| e.to_string())?;
            }
        }

        Ok(course_id)
    }

    pub async fn get_course_progress(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<CourseProgressResponse, String> {
        let mut conn = self.db.get().map_err(|e| e.to_string())?;

        let course: Course = learn_courses::table
            .filter(learn_courses::id.eq(course_id))
            .first(&mut conn)
            .map_err(|e| e.to_string())?;

        let module_ids: Vec<Uuid> = learn_modules::table
            .filter(learn_modules::course_id.eq(course_id))
            .select(learn_modules::id)
            .load(&mut conn)
            .map_err(|e| e.to_string())?;

        let lesson_ids: Vec<Uuid> = learn_lessons::table
            .filter(learn_lessons::module_id.eq_any(&module_ids))
            .select(learn_lessons::id)
            .load(&mut conn)
            .map_err(|e| e.to_string())?;

        let lessons_completed: i64 = learn_lesson_progress::table
            .filter(learn_lesson_progress::user_id.eq(user_id))
            .filter(learn_lesson_progress::lesson_id.eq_any(&lesson_ids))
            .filter(learn_lesson_progress::completed.eq(true))
            .count()
            .get_result(&mut conn)
            .map_err(|e| e.to_string())?;

        let required_quiz_ids: Vec<Uuid> = learn_quizzes::table
            .filter(learn_quizzes::module_id.eq_any(&module_ids))
            .filter(learn_quizzes::is_required.eq(true))
            .select(learn_quizzes::id)
            .load(&mut conn)
            .map_err(|e| e.to_string())?;

        let passed_quiz_ids: Vec<Uuid> = learn_quiz_attempts::table
            .filter(learn_quiz_attempts::user_id.eq(user_id))
            .filter(learn_quiz_attempts::quiz_id.eq_any(&required_quiz_ids))
            .filter(learn_quiz_attempts::passed.eq(true))
            .filter(learn_quiz_attempts::completed_at.is_not_null())
            .select(learn_quiz_attempts::quiz_id)
            .distinct()
            .load(&mut conn)
            .map_err(|e| e.to_string())?;

        let enrollment: Option<Enrollment> = learn_enrollments::table
            .filter(learn_enrollments::user_id.eq(user_id))
            .filter(learn_enrollments::course_id.eq(course_id))
            .first(&mut conn)
            .optional()
            .map_err(|e| e.to_string())?;

        Ok(CourseProgressResponse {
            course_id,
            course_title: course.title,
            lessons_total: lesson_ids.len() as i64,
            lessons_completed,
            required_quizzes_total: required_quiz_ids.len() as i64,
            required_quizzes_passed: passed_quiz_ids.len() as i64,
            enrolled_at: enrollment.as_ref().map(|e| e.enrolled_at),
            completed_at: enrollment.and_then(|e| e.completed_at),
        })
    }
}

/// Grade a submission against the quiz's question bank. Answers are matched
/// as exact sets of selected option indexes.
fn grade(
    questions: &[QuizQuestion],
    submission: &QuizSubmission,
) -> (i32, i32, Vec<AnswerResult>) {
    let mut total_points = 0;
    let mut earned_points = 0;
    let mut answers_breakdown = Vec::new();

    for question in questions {
        total_points += question.points;
        let user_answers = submission
            .answers
            .get(&question.id.to_string())
            .cloned()
            .unwrap_or_default();

        let is_correct = user_answers == question.correct_answers;
        let points_earned = if is_correct { question.points } else { 0 };
        earned_points += points_earned;

        answers_breakdown.push(AnswerResult {
            question_id: question.id,
            is_correct,
            points_earned,
            correct_answers: question.correct_answers.clone(),
            user_answers,
        });
    }

    (earned_points, total_points, answers_breakdown)
}

// ============================================================================
// HTTP HANDLERS
// ============================================================================

fn error_response(e: String) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "success": false,
            "error": e
        })),
    )
        .into_response()
}

/// Create a new course
pub async fn create_course(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCourseRequest>,
) -> impl IntoResponse {
    let engine = LearnEngine::new(state.conn.clone());
    match engine.create_course(req).await {
        Ok(course) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "success": true,
                "data": course
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// List published courses
pub async fn list_courses(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let engine = LearnEngine::new(state.conn.clone());
    match engine.list_courses().await {
        Ok(courses) => Json(serde_json::json!({
            "success": true,
            "data": courses
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Get a single course
pub async fn get_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> impl IntoResponse {
    let engine = LearnEngine::new(state.conn.clone());
    match engine.get_course(course_id).await {
        Ok(Some(course)) => Json(serde_json::json!({
            "success": true,
            "data": course
        }))
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "success": false,
                "error": "Course not found"
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Publish a course
pub async fn publish_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> impl IntoResponse {
    let engine = LearnEngine::new(state.conn.clone());
    match engine.publish_course(course_id).await {
        Ok(()) => Json(serde_json::json!({
            "success": true,
            "message": "Course published"
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Delete a course and its content
pub async fn delete_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> impl IntoResponse {
    let engine = LearnEngine::new(state.conn.clone());
    match engine.delete_course(course_id).await {
        Ok(()) => Json(serde_json::json!({
            "success": true,
            "message": "Course deleted"
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Create a module within a course
pub async fn create_module(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateModuleRequest>,
) -> impl IntoResponse {
    let engine = LearnEngine::new(state.conn.clone());
    match engine.create_module(course_id, req).await {
        Ok(module) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "success": true,
                "data": module
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// List a course's modules
pub async fn get_modules(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> impl IntoResponse {
    let engine = LearnEngine::new(state.conn.clone());
    match engine.get_modules(course_id).await {
        Ok(modules) => Json(serde_json::json!({
            "success": true,
            "data": modules
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Create a lesson within a module
pub async fn create_lesson(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<Uuid>,
    Json(req): Json<CreateLessonRequest>,
) -> impl IntoResponse {
    let engine = LearnEngine::new(state.conn.clone());
    match engine.create_lesson(module_id, req).await {
        Ok(lesson) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "success": true,
                "data": lesson
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// List a module's lessons
pub async fn get_lessons(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<Uuid>,
) -> impl IntoResponse {
    let engine = LearnEngine::new(state.conn.clone());
    match engine.get_lessons(module_id).await {
        Ok(lessons) => Json(serde_json::json!({
            "success": true,
            "data": lessons
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Create a module's quiz
pub async fn create_quiz(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<Uuid>,
    Json(req): Json<CreateQuizRequest>,
) -> impl IntoResponse {
    let engine = LearnEngine::new(state.conn.clone());
    match engine.create_quiz(module_id, req).await {
        Ok(quiz) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "success": true,
                "data": quiz
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Enroll a user in a course
pub async fn enroll(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Query(scope): Query<UserScope>,
) -> impl IntoResponse {
    let engine = LearnEngine::new(state.conn.clone());
    match engine.enroll(scope.user_id, course_id).await {
        Ok(enrollment) => Json(serde_json::json!({
            "success": true,
            "data": enrollment
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Complete a lesson, then evaluate course completion
pub async fn complete_lesson(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<Uuid>,
    Query(scope): Query<UserScope>,
) -> impl IntoResponse {
    let engine = LearnEngine::new(state.conn.clone());
    let course_id = match engine.complete_lesson(scope.user_id, lesson_id).await {
        Ok(course_id) => course_id,
        Err(e) => return error_response(e),
    };

    let service = CertificationService::from_state(&state);
    match service.issuer.evaluate_and_issue(scope.user_id, course_id).await {
        Ok(outcome) => Json(serde_json::json!({
            "success": true,
            "data": {
                "course_id": course_id,
                "certification": outcome
            }
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Submit quiz answers, then evaluate course completion
pub async fn submit_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<Uuid>,
    Query(scope): Query<UserScope>,
    Json(submission): Json<QuizSubmission>,
) -> impl IntoResponse {
    let engine = LearnEngine::new(state.conn.clone());
    let result = match engine.submit_quiz(scope.user_id, quiz_id, submission).await {
        Ok(result) => result,
        Err(e) => return error_response(e),
    };
    let course_id = match engine.quiz_course(quiz_id).await {
        Ok(course_id) => course_id,
        Err(e) => return error_response(e),
    };

    let service = CertificationService::from_state(&state);
    match service.issuer.evaluate_and_issue(scope.user_id, course_id).await {
        Ok(outcome) => Json(serde_json::json!({
            "success": true,
            "data": {
                "result": result,
                "certification": outcome
            }
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get a user's progress in a course
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Query(scope): Query<UserScope>,
) -> impl IntoResponse {
    let engine = LearnEngine::new(state.conn.clone());
    match engine.get_course_progress(scope.user_id, course_id).await {
        Ok(progress) => Json(serde_json::json!({
            "success": true,
            "data": progress
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// ROUTE CONFIGURATION
// ============================================================================

/// Configure all Learn module routes
pub fn configure_learn_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Course routes
        .route("/api/learn/courses", get(list_courses).post(create_course))
        .route(
            "/api/learn/courses/:id",
            get(get_course).delete(delete_course),
        )
        .route("/api/learn/courses/:id/publish", post(publish_course))
        // Module routes
        .route(
            "/api/learn/courses/:id/modules",
            get(get_modules).post(create_module),
        )
        // Lesson routes
        .route(
            "/api/learn/modules/:id/lessons",
            get(get_lessons).post(create_lesson),
        )
        // Quiz routes
        .route("/api/learn/modules/:id/quiz", post(create_quiz))
        .route("/api/learn/quizzes/:id/submit", post(submit_quiz))
        // Enrollment and progress routes
        .route("/api/learn/courses/:id/enroll", post(enroll))
        .route("/api/learn/lessons/:id/complete", post(complete_lesson))
        .route("/api/learn/courses/:id/progress", get(get_progress))
}

/// Simplified configure function for module registration.
pub fn configure(router: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    router.merge(configure_learn_routes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn question(points: i32, correct: Vec<usize>) -> QuizQuestion {
        QuizQuestion {
            id: Uuid::new_v4(),
            text: "?".to_string(),
            options: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            correct_answers: correct,
            points,
        }
    }

    #[test]
    fn grading_sums_points_of_exactly_matched_answers() {
        let q1 = question(2, vec![0]);
        let q2 = question(3, vec![1, 2]);
        let questions = vec![q1.clone(), q2.clone()];

        let mut answers = HashMap::new();
        answers.insert(q1.id.to_string(), vec![0]);
        answers.insert(q2.id.to_string(), vec![1]);
        let (earned, total, breakdown) = grade(&questions, &QuizSubmission { answers });

        assert_eq!(total, 5);
        assert_eq!(earned, 2);
        assert!(breakdown[0].is_correct);
        assert!(!breakdown[1].is_correct);
    }

    #[test]
    fn unanswered_questions_score_zero() {
        let q = question(4, vec![2]);
        let (earned, total, breakdown) = grade(
            &[q],
            &QuizSubmission {
                answers: HashMap::new(),
            },
        );
        assert_eq!(total, 4);
        assert_eq!(earned, 0);
        assert!(!breakdown[0].is_correct);
        assert!(breakdown[0].user_answers.is_empty());
    }

    #[test]
    fn partial_multi_select_is_not_correct() {
        let q = question(1, vec![0, 1]);
        let mut answers = HashMap::new();
        answers.insert(q.id.to_string(), vec![0]);
        let (earned, _, _) = grade(&[q], &QuizSubmission { answers });
        assert_eq!(earned, 0);
    }

    #[test]
    fn course_expiry_policy_round_trips_through_columns() {
        let now = Utc::now();
        let course = Course {
            id: Uuid::new_v4(),
            title: "T".to_string(),
            description: None,
            instructor_name: "I".to_string(),
            expiry_mode: "period_months".to_string(),
            expiry_value: Some(12),
            expiry_fixed_at: None,
            is_published: true,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(
            course.expiry_policy(),
            ExpiryPolicy::PeriodMonths { months: 12 }
        );
    }
}
