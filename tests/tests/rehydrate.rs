mod common;

use anyhow::Result;
use common::*;
use offgrid::{
    json, CacheUpdates, Document, FetchPolicy, LinkError, MemoryStorage, MutationOptions, OfflineClient, OfflineClientOptions, QueryOptions, ResultOrigin,
    Storage,
};
use std::sync::Arc;

fn with_todos(options: OfflineClientOptions, storage: &Arc<MemoryStorage>) -> OfflineClientOptions {
    options.storage(storage.clone()).cache_updates(CacheUpdates::new().with("AddTodo", append_todo()))
}

#[tokio::test]
async fn restart_restores_the_queue_without_duplicating_optimistic_writes() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let (first, second) = (client_id(), client_id());

    {
        let network = MockNetwork::new();
        let client = OfflineClient::new(with_todos(offline_options(&network), &storage)).await?;
        client.hydrated().await;
        client.mutate(add_todo(&first, "Feed cat")).await?;
        client.mutate(add_todo(&second, "Buy milk")).await?;
        client.shutdown().await;
    }

    let network = MockNetwork::new();
    network.respond(server_todo("t1", "Feed cat"));
    network.respond(server_todo("t2", "Buy milk"));
    let client = OfflineClient::new(with_todos(offline_options(&network), &storage)).await?;
    client.hydrated().await;

    assert!(client.is_hydrated());
    assert_eq!(client.outbox_len(), 2);
    assert_eq!(todo_refs(&client), vec![format!("Todo:{first}"), format!("Todo:{second}")]);
    assert_eq!(client.ids_map().len(), 2);
    assert!(network.requests().is_empty());

    client.set_online(true);
    drain(&client).await?;

    let titles: Vec<_> = network.requests().iter().map(|op| op.variables["title"].clone()).collect();
    assert_eq!(titles, vec![json!("Feed cat"), json!("Buy milk")]);
    // the updater was found again by operation name
    assert_eq!(todo_refs(&client), vec!["Todo:t1".to_owned(), "Todo:t2".to_owned()]);
    assert!(!client.cache().extract().contains(&format!("Todo:{first}")));
    Ok(())
}

#[tokio::test]
async fn resolved_ids_survive_a_restart() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let (list, item) = (client_id(), client_id());
    let create_list = Document::mutation("CreateList", &["createList"], "mutation CreateList { createList { id } }");
    let add_item =
        Document::mutation("AddItemToList", &["addItemToList"], "mutation AddItemToList($listId: ID!) { addItemToList(listId: $listId) { id listId } }");

    {
        let network = MockNetwork::new();
        network.respond(json!({"createList": {"__typename": "List", "id": "srv-list"}}));
        network.fail(LinkError::network(None, "connection reset"));
        let client = OfflineClient::new(offline_options(&network).storage(storage.clone())).await?;
        client.hydrated().await;

        client.mutate(MutationOptions::new(create_list).optimistic(json!({"createList": {"__typename": "List", "id": list}}))).await?;
        client
            .mutate(
                MutationOptions::new(add_item.clone())
                    .variables(json!({"listId": list}))
                    .optimistic(json!({"addItemToList": {"__typename": "Item", "id": item, "listId": list}})),
            )
            .await?;

        client.set_online(true);
        // the second request only goes out once the first confirmation is committed and persisted
        eventually(|| network.requests().len() >= 2).await?;
        client.shutdown().await;
    }

    let network = MockNetwork::new();
    network.respond(json!({"addItemToList": {"__typename": "Item", "id": "srv-item", "listId": "srv-list"}}));
    let client = OfflineClient::new(offline_options(&network).storage(storage.clone())).await?;
    client.hydrated().await;

    let outbox = client.outbox();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].operation.variables, json!({"listId": "srv-list"}));
    assert_eq!(client.ids_map().get(&list), Some(&Some("srv-list".to_owned())));

    client.set_online(true);
    drain(&client).await?;
    assert_eq!(network.requests()[0].variables, json!({"listId": "srv-list"}));
    assert!(client.cache().read_record("Item:srv-item").is_some());
    assert!(client.ids_map().is_empty());
    Ok(())
}

#[tokio::test]
async fn unreadable_state_starts_empty() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    storage.set_item("offgrid:outbox", "not json".to_owned()).await?;

    let network = MockNetwork::new();
    let client = OfflineClient::new(offline_options(&network).storage(storage.clone())).await?;
    client.hydrated().await;

    assert_eq!(client.outbox_len(), 0);
    assert!(client.cache().extract().is_empty());

    // and the client still works
    client.mutate(add_todo(&client_id(), "Recover")).await?;
    assert_eq!(client.outbox_len(), 1);
    Ok(())
}

#[tokio::test]
async fn reset_store_wipes_persisted_state() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let network = MockNetwork::new();
    let client = OfflineClient::new(offline_options(&network).storage(storage.clone())).await?;
    client.hydrated().await;
    client.mutate(add_todo(&client_id(), "Temporary")).await?;

    client.reset_store().await?;
    client.shutdown().await;

    let restarted = OfflineClient::new(offline_options(&network).storage(storage.clone())).await?;
    restarted.hydrated().await;
    assert_eq!(restarted.outbox_len(), 0);
    assert!(restarted.cache().extract().is_empty());
    Ok(())
}

#[tokio::test]
async fn query_issued_before_rehydration_sees_the_restored_cache() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let id = client_id();

    {
        let network = MockNetwork::new();
        let client = OfflineClient::new(with_todos(offline_options(&network), &storage)).await?;
        client.hydrated().await;
        client.mutate(add_todo(&id, "Sweep")).await?;
        client.shutdown().await;
    }

    let network = MockNetwork::new();
    let client = OfflineClient::new(with_todos(offline_options(&network), &storage)).await?;
    // no explicit wait for hydration here
    let response = client.query(QueryOptions::new(todos_document()).fetch_policy(FetchPolicy::CacheOnly)).await?;

    assert!(client.is_hydrated());
    assert_eq!(response.origin, ResultOrigin::Cache);
    assert_eq!(response.data(), Some(&json!({"todos": [{"__typename": "Todo", "id": id, "title": "Sweep"}]})));
    assert!(network.requests().is_empty());
    Ok(())
}
