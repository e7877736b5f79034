mod common;

use anyhow::Result;
use common::*;
use offgrid::{json, CacheUpdates, Document, FetchResult, MutationOptions, MutationUpdater, NormalizedCache, OfflineClient, ResultOrigin};
use std::sync::Arc;

#[tokio::test]
async fn queued_todo_is_replaced_by_the_server_entity() -> Result<()> {
    let network = MockNetwork::new();
    network.respond(server_todo("server-123", "Take out trash"));
    let outcomes = Outcomes::default();
    let client =
        OfflineClient::new(offline_options(&network).client_id_predicate(|id| id.contains(":local-")).callback(outcomes.callback())).await?;
    client.hydrated().await;

    let response = client.mutate(add_todo("local-aaa", "Take out trash")).await?;
    assert_eq!(response.origin, ResultOrigin::Optimistic);
    assert_eq!(response.data(), Some(&json!({"addTodo": {"__typename": "Todo", "id": "local-aaa", "title": "Take out trash"}})));
    assert!(client.cache().read_record("Todo:local-aaa").is_some());
    assert_eq!(client.ids_map().get("local-aaa"), Some(&None));
    assert!(network.requests().is_empty());

    client.set_online(true);
    drain(&client).await?;

    let cache = client.cache().extract();
    assert!(cache.contains("Todo:server-123"));
    assert!(!cache.contains("Todo:local-aaa"));
    assert!(client.ids_map().is_empty());

    let successes = outcomes.successes();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].mutation.as_deref(), Some("addTodo"));
    assert_eq!(successes[0].data.data, Some(server_todo("server-123", "Take out trash")));
    // the caller got its answer when the mutation was queued
    assert!(!successes[0].notified);
    assert!(outcomes.errors().is_empty());
    Ok(())
}

#[tokio::test]
async fn online_caller_receives_the_server_answer() -> Result<()> {
    let network = MockNetwork::new();
    network.respond(server_todo("server-123", "Take out trash"));
    let outcomes = Outcomes::default();
    let client = OfflineClient::new(online_options(&network).callback(outcomes.callback())).await?;

    let response = client.mutate(add_todo(&client_id(), "Take out trash")).await?;

    assert_eq!(response.origin, ResultOrigin::Network);
    assert!(!response.is_optimistic());
    assert_eq!(response.data(), Some(&server_todo("server-123", "Take out trash")));
    assert!(client.cache().read_record("Todo:server-123").is_some());
    assert_eq!(client.outbox_len(), 0);

    let successes = outcomes.successes();
    assert_eq!(successes.len(), 1);
    assert!(successes[0].notified);
    Ok(())
}

#[tokio::test]
async fn dependent_mutation_is_sent_with_the_server_id() -> Result<()> {
    let network = MockNetwork::new();
    network.respond(json!({"createList": {"__typename": "List", "id": "srv-list", "name": "Groceries"}}));
    network.respond(json!({"addItemToList": {"__typename": "Item", "id": "srv-item", "listId": "srv-list", "text": "Milk"}}));
    let client = OfflineClient::new(offline_options(&network)).await?;
    client.hydrated().await;

    let (list, item) = (client_id(), client_id());
    let create_list = Document::mutation("CreateList", &["createList"], "mutation CreateList($name: String!) { createList(name: $name) { id name } }");
    let add_item = Document::mutation(
        "AddItemToList",
        &["addItemToList"],
        "mutation AddItemToList($listId: ID!, $text: String!) { addItemToList(listId: $listId, text: $text) { id listId text } }",
    );

    client
        .mutate(
            MutationOptions::new(create_list)
                .variables(json!({"name": "Groceries"}))
                .optimistic(json!({"createList": {"__typename": "List", "id": list, "name": "Groceries"}})),
        )
        .await?;
    client
        .mutate(
            MutationOptions::new(add_item)
                .variables(json!({"listId": list, "text": "Milk"}))
                .optimistic_fn(move |vars| json!({"addItemToList": {"__typename": "Item", "id": item, "listId": vars["listId"], "text": vars["text"]}})),
        )
        .await?;
    assert_eq!(client.outbox_len(), 2);

    client.set_online(true);
    drain(&client).await?;

    assert_eq!(network.request_names(), vec!["CreateList", "AddItemToList"]);
    let requests = network.requests();
    assert_eq!(requests[1].variables, json!({"listId": "srv-list", "text": "Milk"}));
    assert!(requests.iter().all(|op| op.context.execute));

    let cache = client.cache().extract();
    assert_eq!(cache.get("Item:srv-item").map(|item| &item["listId"]), Some(&json!("srv-list")));
    assert!(!cache.contains(&format!("List:{list}")));
    Ok(())
}

#[tokio::test]
async fn registered_updater_applies_optimistically_and_on_confirmation() -> Result<()> {
    let network = MockNetwork::new();
    network.respond(server_todo("t1", "Water plants"));
    let client = OfflineClient::new(offline_options(&network).cache_updates(CacheUpdates::new().with("AddTodo", append_todo()))).await?;
    client.hydrated().await;

    let local = client_id();
    client.mutate(add_todo(&local, "Water plants")).await?;
    assert_eq!(todo_refs(&client), vec![format!("Todo:{local}")]);

    client.set_online(true);
    drain(&client).await?;

    // replayed onto the snapshot, so the optimistic entry is gone rather than duplicated
    assert_eq!(todo_refs(&client), vec!["Todo:t1".to_owned()]);
    Ok(())
}

#[tokio::test]
async fn panicking_updater_does_not_wedge_the_outbox() -> Result<()> {
    let network = MockNetwork::new();
    network.respond(server_todo("t1", "Water plants"));
    let updater: MutationUpdater = Arc::new(|_: &dyn NormalizedCache, _: &FetchResult| panic!("updater failed"));
    let client = OfflineClient::new(offline_options(&network).cache_updates(CacheUpdates::new().with("AddTodo", updater))).await?;
    client.hydrated().await;

    let local = client_id();
    let response = client.mutate(add_todo(&local, "Water plants")).await?;
    assert_eq!(response.origin, ResultOrigin::Optimistic);
    assert_eq!(client.outbox_len(), 1);
    assert!(client.cache().read_record(&format!("Todo:{local}")).is_some());

    client.set_online(true);
    drain(&client).await?;

    assert_eq!(network.requests().len(), 1);
    assert_eq!(client.cache().read_record("Todo:t1"), Some(json!({"__typename": "Todo", "id": "t1", "title": "Water plants"})));
    Ok(())
}
