//! Esquema Diesel. Debe coincidir con `migrations/`.

diesel::table! {
    event_log (seq) {
        seq -> BigInt,
        run_id -> Uuid,
        ts -> Timestamptz,
        event_type -> Text,
        payload -> Jsonb,
    }
}

diesel::table! {
    run_artifacts (artifact_hash) {
        artifact_hash -> Text,
        kind -> Text,
        payload -> Jsonb,
        metadata -> Nullable<Jsonb>,
        produced_by -> Uuid,
        produced_in_seq -> BigInt,
    }
}

diesel::table! {
    step_execution_errors (id) {
        id -> BigInt,
        run_id -> Uuid,
        step_id -> Text,
        attempt_number -> Integer,
        error_class -> Text,
        details -> Nullable<Jsonb>,
        ts -> Timestamptz,
    }
}

diesel::table! {
    valuation_history (result_id) {
        result_id -> Uuid,
        property_id -> Text,
        run_id -> Uuid,
        source -> Text,
        valuation -> Jsonb,
        risk -> Jsonb,
        overrides -> Nullable<Jsonb>,
        computed_at -> Timestamptz,
    }
}

diesel::joinable!(run_artifacts -> event_log (produced_in_seq));

diesel::allow_tables_to_appear_in_same_query!(
    event_log,
    run_artifacts,
    step_execution_errors,
    valuation_history,
);
