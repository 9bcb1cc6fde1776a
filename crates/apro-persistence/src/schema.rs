//! Esquema Diesel (generado manualmente). Reemplazable con `diesel print-schema`.

diesel::table! {
    workflow_templates (id) {
        id -> Uuid,
        organization_id -> Uuid,
        name -> Text,
        definition -> Jsonb,
        version -> Integer,
        is_active -> Bool,
        is_current -> Bool,
        parent_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    workflow_instances (id) {
        id -> Uuid,
        template_id -> Uuid,
        organization_id -> Uuid,
        title -> Text,
        form_data -> Jsonb,
        status -> Text,
        active_steps -> Jsonb,
        parallel_mode -> Bool,
        started_by -> Text,
        started_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    workflow_step_instances (instance_id, step_id) {
        instance_id -> Uuid,
        step_id -> BigInt,
        step_key -> Text,
        status -> Text,
        assigned_to -> Nullable<Text>,
        assigned_at -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
        comments -> Nullable<Text>,
        data -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    workflow_history (seq) {
        seq -> BigInt,
        instance_id -> Uuid,
        action -> Text,
        performed_by -> Text,
        performed_at -> Timestamptz,
        data -> Jsonb,
        comments -> Nullable<Text>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    workflow_templates,
    workflow_instances,
    workflow_step_instances,
    workflow_history,
);
