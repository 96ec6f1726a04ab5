mod common;

use async_graphql::dynamic::Schema;
use async_graphql::{Request, Variables};
use docgraph::registry::RequestContext;
use docgraph::{catalog, graphql};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use common::engine_with;

async fn schema() -> Schema {
    let engine = engine_with(catalog::registry().unwrap()).await;
    graphql::build_schema(engine).unwrap()
}

async fn execute(schema: &Schema, query: &str, variables: Value) -> Value {
    let request = Request::new(query)
        .variables(Variables::from_json(variables))
        .data(RequestContext::new().with_user("tester"));
    let response = schema.execute(request).await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    response.data.into_json().unwrap()
}

const CREATE_CUSTOMER: &str = r#"
    mutation Create($input: CreateCustomerInput!) {
        createCustomer(input: $input) { id name email status createdBy displayName }
    }
"#;

async fn create_customer(schema: &Schema, name: &str, email: &str, orders: i64) -> String {
    let data = execute(
        schema,
        CREATE_CUSTOMER,
        json!({"input": {"name": name, "email": email, "numberOfOrders": orders}}),
    )
    .await;
    data["createCustomer"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_create_returns_shaped_document() {
    let schema = schema().await;
    let data = execute(
        &schema,
        CREATE_CUSTOMER,
        json!({"input": {"name": "John", "email": "JOHN@example.com", "password": "secret"}}),
    )
    .await;

    let created = &data["createCustomer"];
    assert_eq!(created["email"], json!("john@example.com"));
    assert_eq!(created["status"], json!("active"));
    assert_eq!(created["createdBy"], json!("tester"));
    assert_eq!(created["displayName"], json!("John <john@example.com>"));
}

#[tokio::test]
async fn test_password_is_not_queryable() {
    let schema = schema().await;
    let response = schema
        .execute(r#"{ paginateCustomers { docs { password } } }"#)
        .await;
    assert_eq!(response.errors.len(), 1);
}

#[tokio::test]
async fn test_paginate_with_filter_and_sort() {
    let schema = schema().await;
    create_customer(&schema, "John", "john@example.com", 10).await;
    create_customer(&schema, "Jane", "jane@example.com", 15).await;
    create_customer(&schema, "Jack", "jack@example.com", 20).await;

    let data = execute(
        &schema,
        r#"
        query Page($filter: CustomerFilter, $sort: [CustomerSort!]) {
            paginateCustomers(page: 1, limit: 1, filter: $filter, sort: $sort) {
                docs { name numberOfOrders }
                totalDocs totalPages page limit
                hasPrevPage hasNextPage prevPage nextPage
            }
        }
        "#,
        json!({
            "filter": {"numberOfOrders": {"gte": 15}},
            "sort": [{"field": "numberOfOrders", "direction": "Desc"}],
        }),
    )
    .await;

    assert_eq!(
        data["paginateCustomers"],
        json!({
            "docs": [{"name": "Jack", "numberOfOrders": 20}],
            "totalDocs": 2,
            "totalPages": 2,
            "page": 1,
            "limit": 1,
            "hasPrevPage": false,
            "hasNextPage": true,
            "prevPage": null,
            "nextPage": 2,
        })
    );
}

#[tokio::test]
async fn test_update_and_find() {
    let schema = schema().await;
    let id = create_customer(&schema, "John", "john@example.com", 1).await;

    let data = execute(
        &schema,
        r#"
        mutation Update($id: ID!, $input: UpdateCustomerInput!) {
            updateCustomer(id: $id, input: $input) { id name numberOfOrders status }
        }
        "#,
        json!({"id": id, "input": {"numberOfOrders": 2}}),
    )
    .await;
    assert_eq!(
        data["updateCustomer"],
        json!({"id": id, "name": "John", "numberOfOrders": 2, "status": "active"})
    );

    let data = execute(
        &schema,
        r#"query Find($id: ID!) { customer(id: $id) { name numberOfOrders } }"#,
        json!({"id": id}),
    )
    .await;
    assert_eq!(data["customer"], json!({"name": "John", "numberOfOrders": 2}));

    let data = execute(
        &schema,
        r#"{ customer(id: "missing") { name } }"#,
        json!({}),
    )
    .await;
    assert_eq!(data["customer"], Value::Null);
}

#[tokio::test]
async fn test_errors_carry_code_extension() {
    let schema = schema().await;

    let response = schema
        .execute(
            Request::new(
                r#"mutation { updateCustomer(id: "missing", input: {name: "x"}) { id } }"#,
            ),
        )
        .await;
    let error = serde_json::to_value(&response.errors[0]).unwrap();
    assert_eq!(error["extensions"]["code"], json!("NOT_FOUND"));

    let response = schema
        .execute(Request::new(
            r#"mutation { createCustomer(input: {name: "x", email: "nope"}) { id } }"#,
        ))
        .await;
    let error = serde_json::to_value(&response.errors[0]).unwrap();
    assert_eq!(error["extensions"]["code"], json!("VALIDATION_ERROR"));
    assert_eq!(error["extensions"]["property"], json!("email"));

    let response = schema
        .execute(Request::new(
            r#"{ paginateCustomers(filter: {name: {regex: "(unclosed"}}) { totalDocs } }"#,
        ))
        .await;
    let error = serde_json::to_value(&response.errors[0]).unwrap();
    assert_eq!(error["extensions"]["code"], json!("INVALID_FILTER_VALUE"));
}

#[tokio::test]
async fn test_relations_resolve_both_ways() {
    let schema = schema().await;
    let customer = create_customer(&schema, "John", "john@example.com", 2).await;
    let other = create_customer(&schema, "Jane", "jane@example.com", 0).await;

    let create_order = r#"
        mutation Order($input: CreateOrderInput!) {
            createOrder(input: $input) { id total placedAt customer { name } }
        }
    "#;
    let data = execute(
        &schema,
        create_order,
        json!({"input": {"customerId": customer, "total": 12.5}}),
    )
    .await;
    assert_eq!(data["createOrder"]["customer"], json!({"name": "John"}));
    assert!(data["createOrder"]["placedAt"].is_string());

    execute(
        &schema,
        create_order,
        json!({"input": {"customerId": customer, "total": 30.5}}),
    )
    .await;

    let data = execute(
        &schema,
        r#"
        query Find($id: ID!, $other: ID!) {
            john: customer(id: $id) { orders { total } }
            jane: customer(id: $other) { orders { total } }
        }
        "#,
        json!({"id": customer, "other": other}),
    )
    .await;
    assert_eq!(data["john"]["orders"], json!([{"total": 12.5}, {"total": 30.5}]));
    assert_eq!(data["jane"]["orders"], json!([]));
}

#[tokio::test]
async fn test_embedded_address_is_typed() {
    let schema = schema().await;
    let data = execute(
        &schema,
        r#"
        mutation Create($input: CreateCustomerInput!) {
            createCustomer(input: $input) { name address { street city country } }
        }
        "#,
        json!({"input": {
            "name": "John",
            "email": "john@example.com",
            "address": {"street": "1 Main St", "city": " Springfield"},
        }}),
    )
    .await;
    assert_eq!(
        data["createCustomer"]["address"],
        json!({"street": "1 Main St", "city": "Springfield", "country": "US"})
    );

    // `city` is non-null on AddressInput, so GraphQL rejects the input itself.
    let response = schema
        .execute(Request::new(
            r#"mutation { createCustomer(input: {name: "x", email: "x@y.z", address: {street: "1 Main St"}}) { id } }"#,
        ))
        .await;
    assert_eq!(response.errors.len(), 1);

    let response = schema
        .execute(Request::new(
            r#"mutation { createCustomer(input: {name: "x", email: "x@y.z", address: {street: "1 Main St", city: 5}}) { id } }"#,
        ))
        .await;
    assert_eq!(response.errors.len(), 1);
}
