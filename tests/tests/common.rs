use anyhow::Result;
use async_trait::async_trait;
use offgrid::{
    cache::{reference, ROOT_QUERY},
    Document, ErrorRecord, FetchResult, GraphQLError, Link, LinkError, MutationOptions, MutationUpdater, NetworkStatus, NextLink,
    NormalizedCache, OfflineCallback, OfflineClient, OfflineClientOptions, Operation, Response, SuccessRecord,
};
use serde_json::{json, Map, Value};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tracing::Level;

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() { tracing_subscriber::fmt().with_max_level(Level::INFO).with_test_writer().init(); }

/// Stand-in for the GraphQL server at the end of the link chain. Answers from a script, in order;
/// once the script runs out every operation is answered with nulls.
#[derive(Default)]
pub struct MockNetwork {
    script: Mutex<VecDeque<Result<FetchResult, LinkError>>>,
    requests: Mutex<Vec<Operation>>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[allow(unused)]
impl MockNetwork {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn respond(&self, data: Value) { self.script.lock().unwrap().push_back(Ok(FetchResult::data(data))); }

    pub fn respond_errors(&self, messages: &[&str]) {
        let errors = messages.iter().map(|m| GraphQLError::new(*m)).collect();
        self.script.lock().unwrap().push_back(Ok(FetchResult::errors(errors)));
    }

    pub fn fail(&self, error: LinkError) { self.script.lock().unwrap().push_back(Err(error)); }

    pub fn set_latency(&self, latency: Duration) { *self.latency.lock().unwrap() = latency; }

    pub fn requests(&self) -> Vec<Operation> { self.requests.lock().unwrap().clone() }

    pub fn request_names(&self) -> Vec<String> { self.requests().iter().map(|op| op.name().unwrap_or_default().to_owned()).collect() }

    pub fn max_in_flight(&self) -> usize { self.max_in_flight.load(Ordering::SeqCst) }
}

#[async_trait]
impl Link for MockNetwork {
    async fn request(&self, operation: Operation, _forward: NextLink) -> Result<Response, LinkError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.requests.lock().unwrap().push(operation.clone());

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match scripted {
            Some(outcome) => outcome.map(Response::network),
            None => Ok(Response::network(FetchResult::data(operation.document.null_response()))),
        }
    }
}

/// Collects what the offline callback reports.
#[derive(Clone, Default)]
pub struct Outcomes {
    errors: Arc<Mutex<Vec<ErrorRecord>>>,
    successes: Arc<Mutex<Vec<SuccessRecord>>>,
}

#[allow(unused)]
impl Outcomes {
    pub fn callback(&self) -> OfflineCallback {
        let outcomes = self.clone();
        Arc::new(move |error: Option<&ErrorRecord>, success: Option<&SuccessRecord>| {
            if let Some(error) = error {
                outcomes.errors.lock().unwrap().push(error.clone());
            }
            if let Some(success) = success {
                outcomes.successes.lock().unwrap().push(success.clone());
            }
        })
    }

    pub fn errors(&self) -> Vec<ErrorRecord> { self.errors.lock().unwrap().clone() }

    pub fn successes(&self) -> Vec<SuccessRecord> { self.successes.lock().unwrap().clone() }
}

/// Options for a client that starts offline and retries quickly.
#[allow(unused)]
pub fn offline_options(network: &Arc<MockNetwork>) -> OfflineClientOptions {
    OfflineClientOptions::new(network.clone()).network(NetworkStatus::new(false)).retry(Duration::from_millis(10), Duration::from_millis(40))
}

#[allow(unused)]
pub fn online_options(network: &Arc<MockNetwork>) -> OfflineClientOptions { offline_options(network).network(NetworkStatus::new(true)) }

#[allow(unused)]
pub async fn drain(client: &OfflineClient) -> Result<()> {
    tokio::time::timeout(Duration::from_secs(5), client.drained()).await?;
    Ok(())
}

/// Poll until `condition` holds.
#[allow(unused)]
pub async fn eventually(condition: impl Fn() -> bool) -> Result<()> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await?;
    Ok(())
}

#[allow(unused)]
pub fn client_id() -> String { uuid::Uuid::new_v4().to_string() }

#[allow(unused)]
pub fn add_todo_document() -> Document {
    Document::mutation("AddTodo", &["addTodo"], "mutation AddTodo($title: String!) { addTodo(title: $title) { id title } }")
}

#[allow(unused)]
pub fn add_todo(id: &str, title: &str) -> MutationOptions {
    MutationOptions::new(add_todo_document())
        .variables(json!({"title": title}))
        .optimistic(json!({"addTodo": {"__typename": "Todo", "id": id, "title": title}}))
}

#[allow(unused)]
pub fn server_todo(id: &str, title: &str) -> Value { json!({"addTodo": {"__typename": "Todo", "id": id, "title": title}}) }

#[allow(unused)]
pub fn todos_document() -> Document { Document::query("Todos", &["todos"], "query Todos { todos { id title } }") }

/// Appends the added todo to `ROOT_QUERY.todos`.
#[allow(unused)]
pub fn append_todo() -> MutationUpdater {
    Arc::new(|cache: &dyn NormalizedCache, result: &FetchResult| {
        let Some(data_id) = result.data.as_ref().and_then(|data| data.get("addTodo")).and_then(|todo| cache.identify(todo)) else { return };
        cache.modify_record(ROOT_QUERY, &mut |root: &mut Map<String, Value>| {
            let todos = root.entry("todos").or_insert_with(|| json!([]));
            if let Some(list) = todos.as_array_mut() {
                list.push(reference(&data_id));
            }
        });
    })
}

/// Data ids referenced by `ROOT_QUERY.todos`, in order.
#[allow(unused)]
pub fn todo_refs(client: &OfflineClient) -> Vec<String> {
    let Some(root) = client.cache().read_record(ROOT_QUERY) else { return Vec::new() };
    root.get("todos")
        .and_then(Value::as_array)
        .map(|todos| todos.iter().filter_map(|todo| todo.get("__ref").and_then(Value::as_str).map(str::to_owned)).collect())
        .unwrap_or_default()
}
