//! E2E tests for actor documents and collection endpoints

mod common;

use common::TestServer;
use serde_json::Value;

async fn fetch_page(server: &TestServer, n: u32) -> Value {
    let response = server
        .client
        .get(server.url(&format!("/api/self/outbox?page={n}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    response.json::<Value>().await.unwrap()
}

#[tokio::test]
async fn health_check_works() {
    let server = TestServer::new().await;
    let response = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn service_actor_document() {
    let server = TestServer::new().await;
    let response = server
        .client
        .get(server.url("/api/self"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("application/activity+json"));

    let body: Value = response.json().await.unwrap();
    assert!(body.get("@context").is_some());
    assert_eq!(body["type"], "Service");
    assert_eq!(body["id"], "https://test.example.com/api/self");
    assert_eq!(body["preferredUsername"], "kindling-test");
    assert_eq!(body["inbox"], "https://test.example.com/api/self/inbox");
    assert_eq!(body["outbox"], "https://test.example.com/api/self/outbox");
    assert_eq!(
        body["endpoints"]["sharedInbox"],
        "https://test.example.com/api/self/inbox"
    );
    assert_eq!(
        body["endpoints"]["oauthTokenEndpoint"],
        "https://test.example.com/oauth/token"
    );
}

#[tokio::test]
async fn nodeinfo_describes_the_instance() {
    let server = TestServer::new().await;
    let response = server
        .client
        .get(server.url("/api/nodeinfo"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["version"], "2.0");
    assert_eq!(body["software"]["name"], "kindling-test");
    assert_eq!(body["protocols"][0], "activitypub");
}

#[tokio::test]
async fn actor_document_resolves_by_handle_and_by_hash() {
    let server = TestServer::new().await;
    server.seed_account("aabbccdd00112233", "alice");

    let response = server
        .client
        .get(server.url("/api/actors/alice"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "Person");
    assert_eq!(body["preferredUsername"], "alice");
    assert_eq!(body["id"], server.actor_iri("aabbccdd00112233"));
    assert_eq!(
        body["inbox"],
        "https://test.example.com/api/actors/aabbccdd00112233/inbox"
    );
    assert_eq!(body["url"], "https://test.example.com/~alice");

    let by_hash = server
        .client
        .get(server.url("/api/actors/aabbccdd00112233"))
        .send()
        .await
        .unwrap();
    assert_eq!(by_hash.status(), 200);
    let body: Value = by_hash.json().await.unwrap();
    assert_eq!(body["preferredUsername"], "alice");
}

#[tokio::test]
async fn unknown_actor_returns_error_envelope() {
    let server = TestServer::new().await;
    let response = server
        .client
        .get(server.url("/api/actors/nobody"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], 404);
    assert!(body["errors"].as_array().unwrap().len() >= 1);
}

#[tokio::test]
async fn unknown_collection_is_not_found() {
    let server = TestServer::new().await;
    let response = server
        .client
        .get(server.url("/api/self/bookmarks"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn outbox_without_page_carries_count_and_first() {
    let server = TestServer::new().await;
    let alice = server.seed_account("aabbccdd00112233", "alice");
    for n in 0..3 {
        server.seed_item(&format!("item{n:04}0000"), "a short post", &alice);
    }

    let response = server
        .client
        .get(server.url("/api/self/outbox"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "OrderedCollection");
    assert_eq!(body["totalItems"], 3);
    assert_eq!(
        body["first"],
        "https://test.example.com/api/self/outbox?page=1"
    );
    assert!(body.get("next").is_none() || body["next"].is_null());
}

#[tokio::test]
async fn outbox_pages_link_their_neighbors() {
    let server = TestServer::new().await;
    let alice = server.seed_account("aabbccdd00112233", "alice");
    for n in 0..120 {
        server.seed_item(&format!("item{n:04}0000"), "a short post", &alice);
    }

    let first = fetch_page(&server, 1).await;
    assert_eq!(first["type"], "OrderedCollectionPage");
    assert_eq!(first["totalItems"], 120);
    assert_eq!(first["orderedItems"].as_array().unwrap().len(), 50);
    assert_eq!(
        first["next"],
        "https://test.example.com/api/self/outbox?page=2"
    );
    assert!(first.get("prev").is_none() || first["prev"].is_null());
    assert_eq!(
        first["partOf"],
        "https://test.example.com/api/self/outbox"
    );

    // the next link appears only while the count reaches past the
    // following page boundary, so page 2 of 120 already ends the chain
    let middle = fetch_page(&server, 2).await;
    assert_eq!(middle["orderedItems"].as_array().unwrap().len(), 50);
    assert!(middle.get("next").is_none() || middle["next"].is_null());
    assert_eq!(
        middle["prev"],
        "https://test.example.com/api/self/outbox?page=1"
    );

    let last = fetch_page(&server, 3).await;
    assert_eq!(last["orderedItems"].as_array().unwrap().len(), 20);
    assert!(last.get("next").is_none() || last["next"].is_null());
    assert_eq!(
        last["prev"],
        "https://test.example.com/api/self/outbox?page=2"
    );
}

#[tokio::test]
async fn actor_outbox_only_lists_their_items() {
    let server = TestServer::new().await;
    let alice = server.seed_account("aabbccdd00112233", "alice");
    let bob = server.seed_account("bbccddee00112233", "bob");
    server.seed_item("item00010000", "by alice", &alice);
    server.seed_item("item00020000", "by bob", &bob);

    let response = server
        .client
        .get(server.url("/api/actors/alice/outbox"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["totalItems"], 1);
}

#[tokio::test]
async fn activity_and_object_views() {
    let server = TestServer::new().await;
    let alice = server.seed_account("aabbccdd00112233", "alice");
    server.seed_item("item00010000", "hello fediverse", &alice);

    let activity = server
        .client
        .get(server.url(
            "/api/actors/aabbccdd00112233/outbox/item00010000",
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(activity.status(), 200);
    let body: Value = activity.json().await.unwrap();
    assert_eq!(body["type"], "Create");
    assert_eq!(body["actor"], server.actor_iri("aabbccdd00112233"));
    assert_eq!(body["object"]["type"], "Note");

    let object = server
        .client
        .get(server.url(
            "/api/actors/aabbccdd00112233/outbox/item00010000/object",
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(object.status(), 200);
    let body: Value = object.json().await.unwrap();
    assert_eq!(body["type"], "Note");
    assert_eq!(body["mediaType"], "text/html");
    assert_eq!(body["attributedTo"], server.actor_iri("aabbccdd00112233"));
}

#[tokio::test]
async fn deleted_item_serves_a_bare_tombstone() {
    let server = TestServer::new().await;
    let alice = server.seed_account("aabbccdd00112233", "alice");
    server.repo.seed_item(kindling::domain::Item {
        hash: kindling::domain::Hash::from("item00010000"),
        body: "now deleted".to_string(),
        submitted_at: Some(chrono::Utc::now()),
        updated_at: Some(chrono::Utc::now()),
        submitted_by: Some(Box::new(alice)),
        deleted: true,
        ..kindling::domain::Item::default()
    });

    let response = server
        .client
        .get(server.url(
            "/api/self/outbox/item00010000/object",
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "Tombstone");
    assert_eq!(body["formerType"], "Note");
    assert!(body.get("content").is_none() || body["content"].is_null());
    assert!(body.get("name").is_none() || body["name"].is_null());
    assert!(body.get("deleted").is_some());

    let activity = server
        .client
        .get(server.url("/api/self/outbox/item00010000"))
        .send()
        .await
        .unwrap();
    let body: Value = activity.json().await.unwrap();
    assert_eq!(body["type"], "Delete");
    assert_eq!(
        body["actor"],
        "https://test.example.com/api/actors/anonymous"
    );
}

#[tokio::test]
async fn object_with_replies_links_its_collection() {
    let server = TestServer::new().await;
    let alice = server.seed_account("aabbccdd00112233", "alice");
    let parent = server.seed_item("item00010000", "the original post", &alice);
    server.seed_reply("item00020000", &parent, &alice);

    let object = server
        .client
        .get(server.url("/api/self/outbox/item00010000/object"))
        .send()
        .await
        .unwrap();
    let body: Value = object.json().await.unwrap();
    let replies_iri = body["replies"].as_str().unwrap();
    assert!(replies_iri.ends_with("/object/replies"));

    let replies = server
        .client
        .get(server.url("/api/self/outbox/item00010000/object/replies"))
        .send()
        .await
        .unwrap();
    assert_eq!(replies.status(), 200);
    let body: Value = replies.json().await.unwrap();
    assert_eq!(body["totalItems"], 1);
    assert_eq!(body["type"], "OrderedCollection");
}

#[tokio::test]
async fn liked_collection_maps_vote_signs() {
    let server = TestServer::new().await;
    let alice = server.seed_account("aabbccdd00112233", "alice");
    let item = server.seed_item("item00010000", "contested post", &alice);
    server.seed_vote(&alice, &item, -10_000);

    let response = server
        .client
        .get(server.url("/api/actors/alice/liked?page=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["totalItems"], 1);
    let entry = &body["orderedItems"][0];
    assert_eq!(entry["type"], "Dislike");
    assert_eq!(entry["actor"], server.actor_iri("aabbccdd00112233"));
    // vote identifiers key on the voter's handle
    assert!(entry["id"]
        .as_str()
        .unwrap()
        .ends_with("/api/actors/alice/liked/item00010000"));
    assert!(entry["object"]
        .as_str()
        .unwrap()
        .ends_with("/outbox/item00010000/object"));
}

#[tokio::test]
async fn actors_collection_lists_known_accounts() {
    let server = TestServer::new().await;
    server.seed_account("aabbccdd00112233", "alice");
    server.seed_account("bbccddee00112233", "bob");

    let response = server
        .client
        .get(server.url("/api/actors?page=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["totalItems"], 2);
    assert_eq!(body["orderedItems"][0]["type"], "Person");
}
