mod common;

use anyhow::Result;
use common::*;
use offgrid::{CacheUpdates, DiscardCondition, LinkError, MutationError, OfflineClient};
use std::time::Duration;

#[tokio::test]
async fn graphql_error_discards_and_rolls_back() -> Result<()> {
    let network = MockNetwork::new();
    network.respond_errors(&["title must not be empty"]);
    let outcomes = Outcomes::default();
    let client = OfflineClient::new(
        offline_options(&network).callback(outcomes.callback()).cache_updates(CacheUpdates::new().with("AddTodo", append_todo())),
    )
    .await?;
    client.hydrated().await;

    let local = client_id();
    client.mutate(add_todo(&local, "")).await?;
    assert!(client.cache().read_record(&format!("Todo:{local}")).is_some());

    client.set_online(true);
    drain(&client).await?;

    let errors = outcomes.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].mutation.as_deref(), Some("addTodo"));
    assert_eq!(errors[0].error.graphql_errors()[0].message, "title must not be empty");
    assert!(!errors[0].notified);
    assert!(outcomes.successes().is_empty());

    assert!(client.cache().read_record(&format!("Todo:{local}")).is_none());
    assert!(todo_refs(&client).is_empty());
    assert!(client.ids_map().is_empty());
    assert_eq!(network.requests().len(), 1);
    Ok(())
}

#[tokio::test]
async fn server_error_status_fails_the_waiting_caller() -> Result<()> {
    let network = MockNetwork::new();
    network.fail(LinkError::network(Some(500), "internal server error"));
    let outcomes = Outcomes::default();
    let client = OfflineClient::new(online_options(&network).callback(outcomes.callback())).await?;

    let local = client_id();
    let err = client.mutate(add_todo(&local, "Doomed")).await.unwrap_err();

    match err {
        MutationError::Discarded(LinkError::Network { status, .. }) => assert_eq!(status, Some(500)),
        other => panic!("unexpected error: {other}"),
    }
    assert!(client.cache().read_record(&format!("Todo:{local}")).is_none());
    assert_eq!(client.outbox_len(), 0);
    drain(&client).await?;
    assert_eq!(outcomes.errors().len(), 1);
    assert!(outcomes.errors()[0].notified);
    Ok(())
}

#[tokio::test]
async fn transient_failure_is_retried_until_it_succeeds() -> Result<()> {
    let network = MockNetwork::new();
    network.fail(LinkError::network(None, "timed out"));
    network.fail(LinkError::network(None, "connection reset"));
    network.respond(server_todo("t1", "Persistent"));
    let outcomes = Outcomes::default();
    let client = OfflineClient::new(offline_options(&network).callback(outcomes.callback())).await?;
    client.hydrated().await;

    client.mutate(add_todo(&client_id(), "Persistent")).await?;
    client.set_online(true);
    drain(&client).await?;

    assert_eq!(network.requests().len(), 3);
    assert!(outcomes.errors().is_empty());
    assert_eq!(outcomes.successes().len(), 1);
    assert!(client.cache().read_record("Todo:t1").is_some());
    Ok(())
}

#[tokio::test]
async fn reconnect_cuts_the_backoff_short() -> Result<()> {
    let network = MockNetwork::new();
    network.fail(LinkError::network(None, "connection reset"));
    network.respond(server_todo("t1", "Patient"));
    let client = OfflineClient::new(offline_options(&network).retry(Duration::from_secs(30), Duration::from_secs(60))).await?;
    client.hydrated().await;

    client.mutate(add_todo(&client_id(), "Patient")).await?;
    client.set_online(true);
    eventually(|| network.requests().len() == 1).await?;

    client.set_online(false);
    client.set_online(true);
    drain(&client).await?;

    assert_eq!(network.requests().len(), 2);
    assert!(client.cache().read_record("Todo:t1").is_some());
    Ok(())
}

#[tokio::test]
async fn discard_condition_gives_up_after_the_allowed_retries() -> Result<()> {
    let network = MockNetwork::new();
    for _ in 0..5 {
        network.fail(LinkError::network(None, "connection refused"));
    }
    let outcomes = Outcomes::default();
    let client =
        OfflineClient::new(offline_options(&network).callback(outcomes.callback()).discard_condition(DiscardCondition::max_retries(2))).await?;
    client.hydrated().await;

    client.mutate(add_todo(&client_id(), "Flaky")).await?;
    client.set_online(true);
    drain(&client).await?;

    assert_eq!(network.requests().len(), 3);
    assert_eq!(outcomes.errors().len(), 1);
    Ok(())
}

#[tokio::test]
async fn later_mutations_survive_a_discard() -> Result<()> {
    let network = MockNetwork::new();
    network.respond_errors(&["duplicate"]);
    network.respond(server_todo("kept", "Kept"));
    let outcomes = Outcomes::default();
    let client = OfflineClient::new(
        offline_options(&network).callback(outcomes.callback()).cache_updates(CacheUpdates::new().with("AddTodo", append_todo())),
    )
    .await?;
    client.hydrated().await;

    let (rejected, kept) = (client_id(), client_id());
    client.mutate(add_todo(&rejected, "Rejected")).await?;
    client.mutate(add_todo(&kept, "Kept")).await?;

    client.set_online(true);
    drain(&client).await?;

    assert_eq!(outcomes.errors().len(), 1);
    assert_eq!(outcomes.successes().len(), 1);
    assert_eq!(todo_refs(&client), vec!["Todo:kept".to_owned()]);
    let cache = client.cache().extract();
    assert!(!cache.contains(&format!("Todo:{rejected}")));
    assert!(!cache.contains(&format!("Todo:{kept}")));
    Ok(())
}
