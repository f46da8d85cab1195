mod common;

use serde_json::{json, Value};

use ant::config::Config;

use common::server::{start_test_server, start_test_server_with_config};
use common::vectors::{ids, random_unit_vectors, random_vectors};

async fn create(client: &reqwest::Client, base_url: &str, name: &str, dim: usize, nlist: usize) {
    let resp = client
        .post(format!("{base_url}/v1/instances"))
        .json(&json!({"name": name, "dim": dim, "nlist": nlist}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
}

#[tokio::test]
async fn test_health_check() {
    let server = start_test_server().await;

    let resp = reqwest::get(format!("{}/healthz", server.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().contains_key("x-request-id"));

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = start_test_server().await;
    let resp = reqwest::Client::new()
        .get(format!("{}/healthz", server.base_url))
        .header("x-request-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn test_instance_crud() {
    let server = start_test_server().await;
    let base = &server.base_url;
    let client = reqwest::Client::new();

    create(&client, base, "faces", 8, 2).await;

    let resp = client
        .post(format!("{base}/v1/instances"))
        .json(&json!({"name": "faces", "dim": 8}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let resp = client.get(format!("{base}/v1/instances/faces")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["name"], "faces");
    assert_eq!(body["count"], 0);
    assert_eq!(body["built"], false);
    assert_eq!(body["params"]["dim"], 8);
    assert_eq!(body["params"]["nlist"], 2);

    let body: Value = client
        .get(format!("{base}/v1/instances"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["instances"], json!(["faces"]));

    let resp = client.delete(format!("{base}/v1/instances/faces")).send().await.unwrap();
    assert_eq!(resp.status(), 204);
    let resp = client.get(format!("{base}/v1/instances/faces")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let resp = client.delete(format!("{base}/v1/instances/faces")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_create_validation() {
    let server = start_test_server().await;
    let base = &server.base_url;
    let client = reqwest::Client::new();

    for body in [
        json!({"name": "ok", "dim": 0}),
        json!({"name": "-bad", "dim": 4}),
        json!({"name": "ok", "dim": 4, "nlist": 0}),
        json!({"name": "ok", "dim": 10_000_000}),
    ] {
        let resp = client
            .post(format!("{base}/v1/instances"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "body {body}");
    }
}

#[tokio::test]
async fn test_build_write_and_search() {
    let server = start_test_server().await;
    let base = &server.base_url;
    let client = reqwest::Client::new();
    create(&client, base, "docs", 8, 4).await;

    let vectors = random_unit_vectors(40, 8, 1);
    let resp = client
        .post(format!("{base}/v1/instances/docs/search"))
        .json(&json!({"vectors": [vectors[0]], "top_k": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400, "search before build");

    let resp = client
        .post(format!("{base}/v1/instances/docs/build"))
        .json(&json!({"vectors": vectors, "ids": ids(0..40)}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["total"], 40);

    let resp = client
        .post(format!("{base}/v1/instances/docs/build"))
        .json(&json!({"vectors": vectors, "ids": ids(0..40)}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409, "second build");

    let resp = client
        .post(format!("{base}/v1/instances/docs/vectors"))
        .json(&json!({"vectors": random_vectors(2, 8, 2), "ids": [100, 101]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{base}/v1/instances/docs/vectors"))
        .json(&json!({"vectors": random_vectors(1, 8, 3), "ids": [100]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409, "duplicate insert");

    let resp = client
        .put(format!("{base}/v1/instances/docs/vectors"))
        .json(&json!({"vectors": random_unit_vectors(1, 8, 4), "ids": [5]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .delete(format!("{base}/v1/instances/docs/vectors"))
        .json(&json!({"ids": [100, 101, 9999]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["total"], 40);

    let resp = client
        .post(format!("{base}/v1/instances/docs/search"))
        .json(&json!({"vectors": [vectors[7], vectors[9]], "top_k": 3, "nprobe": 4}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let rows = body["results"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0]["id"], 7);
    assert_eq!(rows[1][0]["id"], 9);
    for row in rows {
        let scores: Vec<f64> = row
            .as_array()
            .unwrap()
            .iter()
            .map(|hit| hit["score"].as_f64().unwrap())
            .collect();
        assert!(scores.len() <= 3);
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }
}

#[tokio::test]
async fn test_dimension_mismatch_is_400() {
    let server = start_test_server().await;
    let base = &server.base_url;
    let client = reqwest::Client::new();
    create(&client, base, "dims", 4, 1).await;

    let resp = client
        .post(format!("{base}/v1/instances/dims/build"))
        .json(&json!({"vectors": [[1.0, 2.0, 3.0]], "ids": [1]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("dimension mismatch"));
}

#[tokio::test]
async fn test_request_limits() {
    let mut config = Config::default();
    config.server.max_batch_size = 4;
    config.server.max_top_k = 5;
    let server = start_test_server_with_config(config).await;
    let base = &server.base_url;
    let client = reqwest::Client::new();
    create(&client, base, "small", 2, 1).await;

    let resp = client
        .post(format!("{base}/v1/instances/small/build"))
        .json(&json!({"vectors": random_vectors(5, 2, 1), "ids": ids(0..5)}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400, "batch too large");

    let resp = client
        .post(format!("{base}/v1/instances/small/build"))
        .json(&json!({"vectors": random_vectors(4, 2, 1), "ids": ids(0..4)}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    for top_k in [0, 6] {
        let resp = client
            .post(format!("{base}/v1/instances/small/search"))
            .json(&json!({"vectors": [[1.0, 0.0]], "top_k": top_k}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "top_k {top_k}");
    }
}

#[tokio::test]
async fn test_unknown_instance_is_404() {
    let server = start_test_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{}/v1/instances/ghost/search", server.base_url))
        .json(&json!({"vectors": [[1.0]], "top_k": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_backup_endpoint() {
    let server = start_test_server().await;
    let base = &server.base_url;
    let client = reqwest::Client::new();
    create(&client, base, "snap", 4, 2).await;

    let resp = client
        .post(format!("{base}/v1/instances/snap/backup"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400, "backup before build");

    client
        .post(format!("{base}/v1/instances/snap/build"))
        .json(&json!({"vectors": random_vectors(8, 4, 1), "ids": ids(0..8)}))
        .send()
        .await
        .unwrap();

    let resp = client
        .post(format!("{base}/v1/instances/snap/backup"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let body: Value = resp.json().await.unwrap();
    let from = body["from_version"].as_str().unwrap().to_string();

    let instance = server.registry.get_instance("snap").unwrap();
    for _ in 0..50 {
        if instance.version() != from {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert_ne!(instance.version(), from);
    assert_eq!(instance.count(), 8);
    assert_eq!(
        server.registry.instance_config("snap").unwrap().version,
        instance.version()
    );
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let server = start_test_server().await;
    reqwest::get(format!("{}/healthz", server.base_url))
        .await
        .unwrap();

    let resp = reqwest::get(format!("{}/metrics", server.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let text = resp.text().await.unwrap();
    assert!(text.contains("ant_http_requests_total"));
}
