//! Diesel schema for all learnserver tables.

diesel::table! {
    learn_courses (id) {
        id -> Uuid,
        title -> Text,
        description -> Nullable<Text>,
        instructor_name -> Text,
        expiry_mode -> Text,
        expiry_value -> Nullable<Int4>,
        expiry_fixed_at -> Nullable<Timestamptz>,
        is_published -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    learn_modules (id) {
        id -> Uuid,
        course_id -> Uuid,
        title -> Text,
        position -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    learn_lessons (id) {
        id -> Uuid,
        module_id -> Uuid,
        title -> Text,
        content -> Nullable<Text>,
        position -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    learn_quizzes (id) {
        id -> Uuid,
        module_id -> Uuid,
        title -> Text,
        is_required -> Bool,
        passing_score -> Int4,
        max_attempts -> Nullable<Int4>,
        questions -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    learn_enrollments (id) {
        id -> Uuid,
        user_id -> Uuid,
        course_id -> Uuid,
        enrolled_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    learn_lesson_progress (id) {
        id -> Uuid,
        user_id -> Uuid,
        lesson_id -> Uuid,
        completed -> Bool,
        completed_at -> Nullable<Timestamptz>,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    learn_quiz_attempts (id) {
        id -> Uuid,
        user_id -> Uuid,
        quiz_id -> Uuid,
        score_percent -> Int4,
        passed -> Bool,
        started_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    certificates (id) {
        id -> Uuid,
        user_id -> Uuid,
        course_id -> Uuid,
        number -> Text,
        course_title -> Text,
        course_description -> Nullable<Text>,
        instructor_name -> Text,
        completed_at -> Timestamptz,
        issued_at -> Timestamptz,
        expires_at -> Nullable<Timestamptz>,
        artifact -> Bytea,
    }
}

diesel::table! {
    certification_levels (id) {
        id -> Uuid,
        name -> Text,
        description -> Nullable<Text>,
        is_active -> Bool,
        visible_from -> Nullable<Timestamptz>,
        visible_until -> Nullable<Timestamptz>,
        expiry_mode -> Text,
        expiry_value -> Nullable<Int4>,
        expiry_fixed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    certification_level_courses (id) {
        id -> Uuid,
        level_id -> Uuid,
        course_id -> Uuid,
        position -> Int4,
    }
}

diesel::table! {
    certification_level_rules (id) {
        id -> Uuid,
        level_id -> Uuid,
        rule_kind -> Text,
        group_id -> Nullable<Uuid>,
        user_id -> Nullable<Uuid>,
    }
}

diesel::table! {
    user_certification_levels (id) {
        id -> Uuid,
        user_id -> Uuid,
        level_id -> Uuid,
        achieved_at -> Timestamptz,
        expires_at -> Nullable<Timestamptz>,
        is_valid -> Bool,
        certificate_number -> Nullable<Text>,
        custom_text -> Nullable<Text>,
        artifact -> Nullable<Bytea>,
    }
}

diesel::table! {
    user_group_members (id) {
        id -> Uuid,
        user_id -> Uuid,
        group_id -> Uuid,
        added_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    learn_courses,
    learn_modules,
    learn_lessons,
    learn_quizzes,
    learn_enrollments,
    learn_lesson_progress,
    learn_quiz_attempts,
    certificates,
    certification_levels,
    certification_level_courses,
    certification_level_rules,
    user_certification_levels,
    user_group_members,
);
