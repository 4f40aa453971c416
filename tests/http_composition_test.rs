use choreo::composition::{decode, Composition};
use choreo::http::ERROR_HEADER;
use choreo::service::HandleAddress;
use choreo::{ChoreoNode, HttpDispatcher, NodeConfig, ServiceSet, StoreConfig};
use serde_json::{json, Map, Value};
use slog::{Drain, Logger};
use tempfile::TempDir;

fn create_logger() -> Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stdout());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, slog::o!())
}

async fn start_node(store: StoreConfig) -> ChoreoNode {
    let port = port_check::free_local_port().expect("Should find free port");
    let config = NodeConfig::new(format!("127.0.0.1:{}", port)).with_store(store);
    ChoreoNode::start(config, ServiceSet::builtin(), create_logger())
        .await
        .expect("Node should start")
}

fn dispatcher() -> HttpDispatcher {
    HttpDispatcher::new(create_logger()).expect("Should create dispatcher")
}

fn inputs(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_construct_then_transform() {
    let node = start_node(StoreConfig::Memory).await;
    let client = dispatcher();

    let created = client
        .call_operation(&format!("{}/util.Scaler::__construct", node.advertised()), vec![])
        .await
        .expect("Construction should succeed");
    assert!(created.is_ok());
    let handle = created.get("out").and_then(Value::as_str).expect("Should return an address");
    let address = HandleAddress::parse(handle).expect("Should be host/kind/id");
    assert_eq!(address.host, node.advertised());
    assert_eq!(address.handle.kind(), "util.Scaler");

    let result = client
        .call_operation(&address.operation_name("transform"), vec![json!(5)])
        .await
        .expect("Transform should succeed");
    assert!(result.is_ok());
    assert_eq!(result.get("out"), Some(&json!(10)));
    assert!(result.get("i1").is_none());

    node.shutdown().await;
}

#[tokio::test]
async fn test_composition_spanning_two_hosts() {
    let a = start_node(StoreConfig::Memory).await;
    let b = start_node(StoreConfig::Memory).await;
    let client = dispatcher();

    let composition = decode(&format!(
        "{{out=s}}={a}/util.Scaler::__construct({{}});\
         {{out=y}}=s::transform({{x=n}});\
         {{out=c}}={b}/util.Counter::__construct({{start=y}});\
         {{out=t}}=c::add({{i1=y}});",
        a = a.advertised(),
        b = b.advertised()
    ))
    .expect("Composition should decode");

    let result = client
        .run_composition(&composition, &inputs(json!({"n": 5})))
        .await
        .expect("Composition should run");

    assert!(result.is_ok(), "unexpected failure: {:?}", result.error);
    assert_eq!(result.get("y"), Some(&json!(10)));
    assert_eq!(result.get("t"), Some(&json!(20)));

    let s = HandleAddress::parse(result.get("s").and_then(Value::as_str).unwrap()).unwrap();
    let c = HandleAddress::parse(result.get("c").and_then(Value::as_str).unwrap()).unwrap();
    assert_eq!(s.host, a.advertised());
    assert_eq!(c.host, b.advertised());

    // the counter lives on b and keeps its state
    let total = client
        .call_operation(&c.operation_name("total"), vec![])
        .await
        .unwrap();
    assert_eq!(total.get("out"), Some(&json!(20)));

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_downstream_failure_keeps_partial_results() {
    let a = start_node(StoreConfig::Memory).await;
    let b = start_node(StoreConfig::Memory).await;
    let client = dispatcher();

    let composition = decode(&format!(
        "{{out=c}}={a}/util.Counter::__construct({{}});\
         {{out=t}}=c::add({{i1=n}});\
         {{out=z}}={b}/util.Shredder::__construct({{}});",
        a = a.advertised(),
        b = b.advertised()
    ))
    .unwrap();

    let result = client
        .run_composition(&composition, &inputs(json!({"n": 3})))
        .await
        .expect("Request itself should succeed");

    assert_eq!(result.get("t"), Some(&json!(3)));
    assert!(result.get("z").is_none());
    let error = result.error.expect("Failure should be reported");
    assert!(error.contains("util.Shredder::__construct"), "{}", error);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_missing_variable_is_caught_before_sending() {
    let client = dispatcher();
    let composition = Composition::new().with(
        choreo::Invocation::builder("127.0.0.1:1/util.Counter/k1::add")
            .input("i1", "n")
            .build()
            .unwrap(),
    );
    assert_eq!(
        client.run_composition(&composition, &Map::new()).await,
        Err(choreo::ChoreoError::MissingVariable("n".into()))
    );
}

#[tokio::test]
async fn test_unknown_structured_input_is_rejected() {
    let node = start_node(StoreConfig::Memory).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/util.Counter/__construct", node.advertised()))
        .form(&[("inputs[v]", "{\"type\":\"onto:Nope\"}")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let error = response.headers().get(ERROR_HEADER).unwrap().to_str().unwrap().to_string();
    assert!(error.contains("onto:Nope"));
    assert_eq!(response.json::<Value>().await.unwrap(), json!({}));

    node.shutdown().await;
}

#[tokio::test]
async fn test_health_endpoint() {
    let node = start_node(StoreConfig::Memory).await;

    let health: Value = reqwest::get(format!("http://{}/health", node.advertised()))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({"status": "ok", "address": node.advertised()}));

    node.shutdown().await;
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let dir = TempDir::new().unwrap();
    let client = dispatcher();

    let first = start_node(StoreConfig::Files(dir.path().to_path_buf())).await;
    let created = client
        .call_operation(&format!("{}/util.Counter::__construct", first.advertised()), vec![json!(41)])
        .await
        .unwrap();
    let address = HandleAddress::parse(created.get("out").and_then(Value::as_str).unwrap()).unwrap();
    first.shutdown().await;

    let second = start_node(StoreConfig::Files(dir.path().to_path_buf())).await;
    let moved = address.handle.address(second.advertised());
    let result = client
        .call_operation(&moved.operation_name("add"), vec![json!(1)])
        .await
        .unwrap();
    assert_eq!(result.get("out"), Some(&json!(42)));

    second.shutdown().await;
}

#[tokio::test]
async fn test_rocksdb_store_backs_instances() {
    let dir = TempDir::new().unwrap();
    let node = start_node(StoreConfig::RocksDb(dir.path().to_path_buf())).await;
    let client = dispatcher();

    let composition = decode(&format!(
        "{{out=c}}={}/util.Counter::__construct({{start=2}});{{out=t}}=c::add({{i1=3}});",
        node.advertised()
    ))
    .unwrap();
    let result = client.run_composition(&composition, &Map::new()).await.unwrap();
    assert_eq!(result.get("t"), Some(&json!(5)));

    let c = HandleAddress::parse(result.get("c").and_then(Value::as_str).unwrap()).unwrap();
    let total = client.call_operation(&c.operation_name("total"), vec![]).await.unwrap();
    assert_eq!(total.get("out"), Some(&json!(5)));

    node.shutdown().await;
}
