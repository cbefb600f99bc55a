// @generated manually from migrations/ — kept in sync by hand, mirroring the
// shape diesel print-schema would emit.

diesel::table! {
    use diesel::sql_types::*;

    agents (id) {
        id -> Uuid,
        name -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::*;

    blocks (id) {
        id -> Uuid,
        agent_id -> Text,
        label -> Varchar,
        description -> Nullable<Text>,
        value -> Text,
        char_limit -> Int4,
        read_only -> Bool,
        version -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::*;

    messages (id) {
        id -> Int8,
        agent_id -> Uuid,
        role -> Text,
        content -> Text,
        timestamp -> Timestamptz,
        summary_id -> Nullable<Int8>,
        metadata -> Nullable<Jsonb>,
    }
}

diesel::table! {
    use diesel::sql_types::*;
    use pgvector::sql_types::Vector;

    passages (id) {
        id -> Uuid,
        agent_id -> Text,
        content -> Text,
        embedding -> Nullable<Vector>,
        metadata -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(agents, blocks, messages, passages,);
