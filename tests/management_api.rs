//! Management API tests against a running server.

mod common;

use common::{start_server, MockTree};
use reqwest::{multipart::Form, StatusCode};
use vcs_mock_proxy::Substitution;

async fn register(client: &reqwest::Client, url: &str, form: Form) -> (StatusCode, String) {
    let response = client.post(url).multipart(form).send().await.unwrap();
    let status = response.status();
    (status, response.text().await.unwrap())
}

#[tokio::test]
async fn lists_defaults_in_order() {
    let tree = MockTree::new("");
    let server = start_server(
        &tree,
        vec![Substitution::new("owner", "octo"), Substitution::new("repo", "widgets")],
    )
    .await;

    let listed: Vec<Substitution> = reqwest::get(server.api_url("/substitution-variables"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        listed,
        vec![Substitution::new("owner", "octo"), Substitution::new("repo", "widgets")]
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn registering_appends_then_replaces_in_place() {
    let tree = MockTree::new("");
    let server = start_server(&tree, vec![Substitution::new("owner", "octo")]).await;
    let client = reqwest::Client::new();
    let url = server.api_url("/substitution-variables");

    let (status, body) = register(&client, &url, Form::new().text("key", "branch").text("value", "main")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());

    let (status, _) = register(&client, &url, Form::new().text("key", "owner").text("value", "hubot")).await;
    assert_eq!(status, StatusCode::OK);

    let listed: Vec<Substitution> = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(
        listed,
        vec![Substitution::new("owner", "hubot"), Substitution::new("branch", "main")]
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn incomplete_form_is_rejected() {
    let tree = MockTree::new("");
    let server = start_server(&tree, Vec::new()).await;
    let client = reqwest::Client::new();
    let url = server.api_url("/substitution-variables");

    let (status, body) = register(&client, &url, Form::new().text("key", "owner")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("both key and value must be supplied"));

    let (status, _) = register(&client, &url, Form::new().text("key", "").text("value", "x")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let listed: Vec<Substitution> = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert!(listed.is_empty());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn non_multipart_body_is_a_form_error() {
    let tree = MockTree::new("");
    let server = start_server(&tree, Vec::new()).await;

    let response = reqwest::Client::new()
        .post(server.api_url("/substitution-variables"))
        .body("key=owner&value=octo")
        .header("content-type", "application/x-www-form-urlencoded")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().await.unwrap().contains("error parsing input form"));

    server.stop().await.unwrap();
}
