//! Integration tests for the matrix REST surface: CRUD, collaborators and algebra.

use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use matrix_collab_server::config::{AlgebraConfig, PresenceConfig};
use matrix_collab_server::state::AppState;

struct TestServer {
    base_url: String,
    state: AppState,
    secret: Vec<u8>,
    client: reqwest::Client,
}

/// Helper: start the server on a random port.
async fn start_test_server() -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = matrix_collab_server::db::init_db(&data_dir).expect("Failed to init DB");
    let secret = matrix_collab_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");
    let state = AppState::new(
        db,
        secret.clone(),
        PresenceConfig::default(),
        AlgebraConfig::default(),
    );

    let app = matrix_collab_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    TestServer {
        base_url: format!("http://{}", addr),
        state,
        secret,
        client: reqwest::Client::new(),
    }
}

fn create_user(server: &TestServer, username: &str) -> (String, String) {
    let user = matrix_collab_server::db::users::create_user(&server.state.db, username, username)
        .expect("Failed to create user");
    let token = matrix_collab_server::auth::jwt::issue_access_token(&server.secret, &user.id, 3600)
        .expect("Failed to issue token");
    (user.id, token)
}

async fn create_matrix(server: &TestServer, token: &str, data: Value) -> Value {
    let rows = data.as_array().unwrap().len();
    let columns = data[0].as_array().unwrap().len();
    let resp = server
        .client
        .post(format!("{}/api/matrices", server.base_url))
        .bearer_auth(token)
        .json(&json!({ "name": "Example", "rows": rows, "columns": columns, "data": data }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201, "Matrix creation failed");
    resp.json().await.unwrap()
}

async fn operate(
    server: &TestServer,
    token: &str,
    matrix_id: &str,
    body: Value,
) -> (u16, Value) {
    let resp = server
        .client
        .post(format!(
            "{}/api/matrices/{}/operations",
            server.base_url, matrix_id
        ))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

fn assert_grid_close(actual: &Value, expected: &[[f64; 2]; 2]) {
    for (i, row) in expected.iter().enumerate() {
        for (j, want) in row.iter().enumerate() {
            let got = actual[i][j].as_f64().unwrap();
            assert!((got - want).abs() < 1e-9, "cell ({}, {}): {} != {}", i, j, got, want);
        }
    }
}

#[tokio::test]
async fn test_owner_runs_algebra_end_to_end() {
    let server = start_test_server().await;
    let (owner_id, token) = create_user(&server, "alice");
    let matrix = create_matrix(&server, &token, json!([[4, 7], [2, 6]])).await;
    let id = matrix["id"].as_str().unwrap();
    assert_eq!(matrix["ownerId"], owner_id.as_str());
    assert_eq!(matrix["dimensions"]["rows"], 2);

    let (status, det) = operate(&server, &token, id, json!({ "operationType": "determinant" })).await;
    assert_eq!(status, 200);
    assert!((det["result"].as_f64().unwrap() - 10.0).abs() < 1e-9);
    assert_eq!(det["performedBy"], owner_id.as_str());

    let (status, inv) = operate(&server, &token, id, json!({ "operationType": "inverse" })).await;
    assert_eq!(status, 200);
    assert_grid_close(&inv["result"], &[[0.6, -0.7], [-0.2, 0.4]]);

    let (status, quotient) = operate(
        &server,
        &token,
        id,
        json!({ "operationType": "divide", "parameters": { "matrix": [[4, 7], [2, 6]] } }),
    )
    .await;
    assert_eq!(status, 200);
    assert_grid_close(&quotient["result"], &[[1.0, 0.0], [0.0, 1.0]]);

    let resp = server
        .client
        .get(format!("{}/api/matrices/{}/operations", server.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let history: Value = resp.json().await.unwrap();
    let types: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["determinant", "inverse", "divide"]);

    // The stored grid is unchanged by operations
    let resp = server
        .client
        .get(format!("{}/api/matrices/{}", server.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let stored: Value = resp.json().await.unwrap();
    assert_eq!(stored["data"], json!([[4.0, 7.0], [2.0, 6.0]]));
}

#[tokio::test]
async fn test_algebra_errors_are_reported_and_not_recorded() {
    let server = start_test_server().await;
    let (_id, token) = create_user(&server, "alice");
    let rect = create_matrix(&server, &token, json!([[1, 2, 3], [4, 5, 6]])).await;
    let rect_id = rect["id"].as_str().unwrap();

    let (status, body) = operate(&server, &token, rect_id, json!({ "operationType": "determinant" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "not_square");

    let (status, body) = operate(
        &server,
        &token,
        rect_id,
        json!({ "operationType": "add", "parameters": { "matrix": [[1, 2], [3, 4]] } }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "dimension_mismatch");

    let (status, body) = operate(&server, &token, rect_id, json!({ "operationType": "eigen" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "unsupported_operation");

    let (status, body) = operate(&server, &token, rect_id, json!({ "operationType": "multiply" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "invalid_input");

    let three = create_matrix(&server, &token, json!([[2, 0, 0], [0, 3, 0], [0, 0, 4]])).await;
    let three_id = three["id"].as_str().unwrap();
    let (status, body) = operate(&server, &token, three_id, json!({ "operationType": "inverse" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "unsupported_operation");

    let (status, body) = operate(&server, &token, three_id, json!({ "operationType": "determinant" })).await;
    assert_eq!(status, 200);
    assert!((body["result"].as_f64().unwrap() - 24.0).abs() < 1e-9);

    let singular = create_matrix(&server, &token, json!([[1, 2], [2, 4]])).await;
    let (status, body) = operate(
        &server,
        &token,
        singular["id"].as_str().unwrap(),
        json!({ "operationType": "inverse" }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "singular_matrix");

    let resp = server
        .client
        .get(format!("{}/api/matrices/{}/operations", server.base_url, rect_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let history: Value = resp.json().await.unwrap();
    assert!(history.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_roles_gate_rest_access() {
    let server = start_test_server().await;
    let (_alice_id, alice) = create_user(&server, "alice");
    let (bob_id, bob) = create_user(&server, "bob");
    let (_carol_id, carol) = create_user(&server, "carol");
    let matrix = create_matrix(&server, &alice, json!([[1, 2], [3, 4]])).await;
    let id = matrix["id"].as_str().unwrap();

    // Stranger sees nothing
    let resp = server
        .client
        .get(format!("{}/api/matrices/{}", server.base_url, id))
        .bearer_auth(&carol)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = server
        .client
        .post(format!("{}/api/matrices/{}/collaborators", server.base_url, id))
        .bearer_auth(&alice)
        .json(&json!({ "userId": bob_id, "role": "viewer" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let shared: Value = resp.json().await.unwrap();
    assert_eq!(shared["collaborators"][0]["role"], "viewer");

    // Viewer can read but not operate or edit
    let resp = server
        .client
        .get(format!("{}/api/matrices/{}", server.base_url, id))
        .bearer_auth(&bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let (status, body) = operate(&server, &bob, id, json!({ "operationType": "transpose" })).await;
    assert_eq!(status, 403);
    assert_eq!(body["error"], "permission_denied");

    let resp = server
        .client
        .put(format!("{}/api/matrices/{}/data", server.base_url, id))
        .bearer_auth(&bob)
        .json(&json!({ "data": [[0, 0], [0, 0]] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Promotion to editor is an upsert, not a second entry
    let resp = server
        .client
        .post(format!("{}/api/matrices/{}/collaborators", server.base_url, id))
        .bearer_auth(&alice)
        .json(&json!({ "userId": bob_id, "role": "editor" }))
        .send()
        .await
        .unwrap();
    let shared: Value = resp.json().await.unwrap();
    assert_eq!(shared["collaborators"].as_array().unwrap().len(), 1);
    assert_eq!(shared["collaborators"][0]["role"], "editor");

    let resp = server
        .client
        .put(format!("{}/api/matrices/{}/data", server.base_url, id))
        .bearer_auth(&bob)
        .json(&json!({ "data": [[9, 8], [7, 6]] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["modificationCount"], 1);

    // Only the owner deletes
    let resp = server
        .client
        .delete(format!("{}/api/matrices/{}", server.base_url, id))
        .bearer_auth(&bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = server
        .client
        .delete(format!("{}/api/matrices/{}", server.base_url, id))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = server
        .client
        .get(format!("{}/api/matrices/{}", server.base_url, id))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_requests_without_valid_token_are_unauthorized() {
    let server = start_test_server().await;

    let resp = server
        .client
        .post(format!("{}/api/matrices", server.base_url))
        .json(&json!({ "name": "x", "rows": 1, "columns": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "authentication_failed");

    let resp = server
        .client
        .get(format!("{}/api/presence", server.base_url))
        .bearer_auth("garbage")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_create_validates_dimensions() {
    let server = start_test_server().await;
    let (_id, token) = create_user(&server, "alice");

    let resp = server
        .client
        .post(format!("{}/api/matrices", server.base_url))
        .bearer_auth(&token)
        .json(&json!({ "name": "Zeros", "rows": 3, "columns": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"], json!([[0.0, 0.0], [0.0, 0.0], [0.0, 0.0]]));

    for bad in [
        json!({ "name": "Big", "rows": 1001, "columns": 1 }),
        json!({ "name": "Empty", "rows": 0, "columns": 2 }),
        json!({ "name": "Ragged", "rows": 2, "columns": 2, "data": [[1, 2], [3]] }),
    ] {
        let resp = server
            .client
            .post(format!("{}/api/matrices", server.base_url))
            .bearer_auth(&token)
            .json(&bad)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "expected rejection for {}", bad);
    }
}

#[tokio::test]
async fn test_owner_removes_collaborator() {
    let server = start_test_server().await;
    let (_alice_id, alice) = create_user(&server, "alice");
    let (bob_id, bob) = create_user(&server, "bob");
    let matrix = create_matrix(&server, &alice, json!([[1, 2], [3, 4]])).await;
    let id = matrix["id"].as_str().unwrap();

    let resp = server
        .client
        .post(format!("{}/api/matrices/{}/collaborators", server.base_url, id))
        .bearer_auth(&alice)
        .json(&json!({ "userId": bob_id, "role": "admin" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Admins share, but only the owner removes
    let resp = server
        .client
        .delete(format!("{}/api/matrices/{}/collaborators/{}", server.base_url, id, bob_id))
        .bearer_auth(&bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = server
        .client
        .delete(format!("{}/api/matrices/{}/collaborators/{}", server.base_url, id, bob_id))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = server
        .client
        .delete(format!("{}/api/matrices/{}/collaborators/{}", server.base_url, id, bob_id))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = server
        .client
        .get(format!("{}/api/matrices/{}", server.base_url, id))
        .bearer_auth(&bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}
