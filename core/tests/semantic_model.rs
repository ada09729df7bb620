//! The bundled semantic model against the warehouse schemas.

use growth_etl_core::{
    semantic::{Aggregation, Relationship, SemanticModel},
    warehouse::all_schemas,
    EtlError,
};

const MINIMAL: &str = r#"{
  "cubes": [
    {
      "name": "users",
      "table": "dim_users",
      "dimensions": [
        { "name": "user_id", "column": "user_id", "type": "number", "primary_key": true }
      ],
      "measures": [ { "name": "count", "aggregation": "count" } ]
    }
  ]
}"#;

fn model_with_users(extra: &str) -> SemanticModel {
    let json = MINIMAL.replace(
        r#""measures": [ { "name": "count", "aggregation": "count" } ]"#,
        &format!(r#""measures": [ {{ "name": "count", "aggregation": "count" }} ]{extra}"#),
    );
    SemanticModel::from_json(&json).expect("parse model")
}

fn assert_schema_error(model: &SemanticModel) {
    let err = model.validate(&all_schemas()).unwrap_err();
    assert!(matches!(err, EtlError::Schema { .. }), "got {err}");
}

#[test]
fn bundled_model_matches_warehouse() {
    let model = SemanticModel::bundled().expect("bundled model parses");
    model.validate(&all_schemas()).expect("bundled model validates");

    let users = model.cube("users").expect("users cube");
    assert_eq!(users.table, "dim_users");
    assert!(users
        .joins
        .iter()
        .any(|j| j.cube == "transactions" && j.relationship == Relationship::OneToMany));

    let tx = model.cube("transactions").expect("transactions cube");
    assert!(tx
        .measures
        .iter()
        .any(|m| m.aggregation == Aggregation::Sum && m.column.as_deref() == Some("amount_eur")));
    assert!(model.cube("funnel").is_some());
}

#[test]
fn minimal_model_validates() {
    model_with_users("").validate(&all_schemas()).expect("validates");
}

#[test]
fn unknown_column_is_rejected() {
    let mut model = model_with_users("");
    model.cubes[0].dimensions[0].column = "uid".into();
    assert_schema_error(&model);
}

#[test]
fn mismatched_dimension_type_is_rejected() {
    let mut model = model_with_users("");
    model.cubes[0].dimensions[0].column = "country".into();
    assert_schema_error(&model);
}

#[test]
fn sum_over_text_column_is_rejected() {
    let mut model = model_with_users("");
    model.cubes[0].measures[0].aggregation = Aggregation::Sum;
    model.cubes[0].measures[0].column = Some("country".into());
    assert_schema_error(&model);
}

#[test]
fn count_where_needs_a_filter() {
    let mut model = model_with_users("");
    model.cubes[0].measures[0].aggregation = Aggregation::CountWhere;
    assert_schema_error(&model);
}

#[test]
fn join_to_undeclared_cube_is_rejected() {
    let model = model_with_users(
        r#", "joins": [ { "cube": "merchants", "local_column": "user_id",
              "foreign_column": "user_id", "relationship": "one_to_many" } ]"#,
    );
    assert_schema_error(&model);
}

#[test]
fn cube_over_unknown_table_is_rejected() {
    let mut model = model_with_users("");
    model.cubes[0].table = "dim_merchants".into();
    assert_schema_error(&model);
}
