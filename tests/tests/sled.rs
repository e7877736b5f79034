mod common;

use anyhow::Result;
use common::*;
use offgrid::{OfflineClient, SledStorage, Storage};
use std::sync::Arc;

#[tokio::test]
async fn sled_storage_carries_the_queue_across_clients() -> Result<()> {
    let storage = Arc::new(SledStorage::new_test()?);
    let local = client_id();

    {
        let network = MockNetwork::new();
        let client = OfflineClient::new(offline_options(&network).storage(storage.clone())).await?;
        client.hydrated().await;
        client.mutate(add_todo(&local, "Survive restart")).await?;
        client.shutdown().await;
    }

    let mut keys = storage.get_all_keys().await?;
    keys.sort();
    assert_eq!(keys, vec!["offgrid:metadata", "offgrid:normalized-cache", "offgrid:outbox"]);

    let network = MockNetwork::new();
    network.respond(server_todo("t1", "Survive restart"));
    let client = OfflineClient::new(offline_options(&network).storage(storage.clone())).await?;
    client.hydrated().await;
    assert_eq!(client.outbox_len(), 1);
    assert!(client.cache().read_record(&format!("Todo:{local}")).is_some());

    client.set_online(true);
    drain(&client).await?;
    assert!(client.cache().read_record("Todo:t1").is_some());
    assert_eq!(network.requests().len(), 1);
    Ok(())
}
