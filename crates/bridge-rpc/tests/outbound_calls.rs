use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_core::{BridgeError, CallRequest, CallResponse, MethodKind, RemoteHandle};
use bridge_rpc::{remote_class, BridgeClient, CallChannel, ExchangeMedium, FileCallChannel, FileChannelOptions};

/// Hijo simulado: toma peticiones del medio y responde con `handler`.
fn spawn_fake_child<F>(medium: ExchangeMedium, handler: F) -> tokio::task::JoinHandle<()>
    where F: Fn(&CallRequest) -> CallResponse + Send + Sync + 'static
{
    let handler = Arc::new(handler);
    tokio::spawn(async move {
        loop {
            for req in medium.take_requests().await.unwrap() {
                let medium = medium.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let resp = handler(&req);
                    medium.write_response(&resp).await.unwrap();
                });
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
}

fn fast_opts() -> FileChannelOptions {
    FileChannelOptions { poll_interval: Duration::from_millis(10),
                         ..FileChannelOptions::default() }
}

fn calculator(req: &CallRequest) -> CallResponse {
    match (req.method_kind, req.method_name.as_str()) {
        (MethodKind::Static, "add") => {
            let sum: i64 = req.args.iter().filter_map(Value::as_i64).sum();
            CallResponse::ok(&req.request_id, json!(sum))
        }
        (MethodKind::Constructor, _) => CallResponse::constructed(&req.request_id, "i-42"),
        (MethodKind::Instance, "whoami") => {
            CallResponse::ok(&req.request_id, json!(req.instance_id.clone().unwrap_or_default()))
        }
        (MethodKind::Static, "valueOf") => CallResponse { instance_id: Some(format!("enum-{}", req.args[0].as_str().unwrap())),
                                                          ..CallResponse::ok(&req.request_id, req.args[0].clone()) },
        (_, other) => CallResponse::failed(&req.request_id, format!("NoSuchMethodException: {other}")),
    }
}

#[tokio::test]
async fn static_call_decodes_result() {
    let dir = tempfile::tempdir().unwrap();
    let channel = FileCallChannel::open(dir.path(), fast_opts()).await.unwrap();
    let child = spawn_fake_child(channel.medium().clone(), calculator);

    let req = CallRequest::new_static("Foo", "add", vec![json!(2), json!(3)]).with_request_id("r1");
    let resp = channel.call(req, Duration::from_secs(5)).await.unwrap();
    assert_eq!(resp.request_id, "r1");
    assert_eq!(resp.result, Some(json!(5)));
    assert!(!channel.medium().response_path("r1").exists());
    child.abort();
}

#[tokio::test]
async fn constructor_yields_instance_proxy_used_by_later_calls() {
    let dir = tempfile::tempdir().unwrap();
    let channel = Arc::new(FileCallChannel::open(dir.path(), fast_opts()).await.unwrap());
    let child = spawn_fake_child(channel.medium().clone(), calculator);
    let client = BridgeClient::new(channel).with_timeout(Duration::from_secs(5));

    let bar = client.class("Bar").construct(vec![]).await.unwrap();
    assert_eq!(bar.handle(), &RemoteHandle::new("Bar", "i-42"));
    assert_eq!(bar, client.attach(RemoteHandle::new("Bar", "i-42")));
    assert!(client.instances().contains(bar.handle()));

    let echoed: String = bar.call_as("whoami", vec![]).await.unwrap();
    assert_eq!(echoed, "i-42");
    child.abort();
}

#[tokio::test]
async fn remote_failure_surfaces_as_remote_error() {
    let dir = tempfile::tempdir().unwrap();
    let channel = Arc::new(FileCallChannel::open(dir.path(), fast_opts()).await.unwrap());
    let child = spawn_fake_child(channel.medium().clone(), calculator);
    let client = BridgeClient::new(channel.clone()).with_timeout(Duration::from_secs(5));

    let err = client.call_static("Foo", "explode", vec![]).await.unwrap_err();
    assert_eq!(err, BridgeError::Remote("NoSuchMethodException: explode".into()));
    assert!(channel.medium().response_ids().await.unwrap().is_empty());
    child.abort();
}

#[tokio::test]
async fn timeout_returns_within_bound_even_if_response_arrives_later() {
    let dir = tempfile::tempdir().unwrap();
    let opts = FileChannelOptions { poll_interval: Duration::from_millis(100),
                                    ..FileChannelOptions::default() };
    let channel = FileCallChannel::open(dir.path(), opts).await.unwrap();

    let started = Instant::now();
    let req = CallRequest::new_static("Foo", "never", vec![]);
    let err = channel.call(req, Duration::from_millis(250)).await.unwrap_err();
    let elapsed = started.elapsed();
    assert!(matches!(err, BridgeError::Timeout { .. }));
    assert!(elapsed >= Duration::from_millis(250));
    assert!(elapsed < Duration::from_millis(250 + 100 + 150), "took {elapsed:?}");
}

#[tokio::test]
async fn concurrent_calls_each_consume_their_own_response_once() {
    let dir = tempfile::tempdir().unwrap();
    let channel = Arc::new(FileCallChannel::open(dir.path(), fast_opts()).await.unwrap());
    let served = Arc::new(AtomicUsize::new(0));
    let counter = served.clone();
    let child = spawn_fake_child(channel.medium().clone(), move |req| {
        counter.fetch_add(1, Ordering::SeqCst);
        calculator(req)
    });
    let client = BridgeClient::new(channel.clone()).with_timeout(Duration::from_secs(10));

    let mut tasks = Vec::new();
    for i in 0..24i64 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
                       let v: i64 = client.call_static_as("Foo", "add", vec![json!(i), json!(1000)]).await?;
                       Ok::<_, BridgeError>((i, v))
                   }));
    }
    for t in tasks {
        let (i, v) = t.await.unwrap().unwrap();
        assert_eq!(v, i + 1000);
    }
    assert_eq!(served.load(Ordering::SeqCst), 24);
    assert!(channel.medium().response_ids().await.unwrap().is_empty());
    child.abort();
}

#[tokio::test]
async fn nested_proxy_resolves_constants_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let channel = Arc::new(FileCallChannel::open(dir.path(), fast_opts()).await.unwrap());
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let log = seen.clone();
    let child = spawn_fake_child(channel.medium().clone(), move |req| {
        log.lock().unwrap().push(req.target_class.clone());
        calculator(req)
    });
    let client = BridgeClient::new(channel).with_timeout(Duration::from_secs(5));

    let status = client.nested("io.sagaflow.Saga", "Status");
    assert_eq!(status.class_name(), "io.sagaflow.Saga$Status");
    assert_eq!(status.constant("COMPLETED").await.unwrap(), json!("COMPLETED"));
    let handle = status.constant_instance("FAILED").await.unwrap();
    assert_eq!(handle.instance_id(), "enum-FAILED");
    assert_eq!(seen.lock().unwrap().as_slice(), ["io.sagaflow.Saga$Status", "io.sagaflow.Saga$Status"]);
    child.abort();
}

remote_class! {
    /// Calculadora del lado JVM.
    pub struct Calc = "Bar" {
        new();
        static fn add(a: i64, b: i64) -> i64;
        fn whoami(&self) -> String;
        fn identity(&self) -> String = "whoami";
    }
}

#[tokio::test]
async fn generated_stub_issues_typed_calls() {
    let dir = tempfile::tempdir().unwrap();
    let channel = Arc::new(FileCallChannel::open(dir.path(), fast_opts()).await.unwrap());
    let child = spawn_fake_child(channel.medium().clone(), calculator);
    let client = BridgeClient::new(channel).with_timeout(Duration::from_secs(5));

    assert_eq!(Calc::add(&client, 20, 22).await.unwrap(), 42);
    let calc = Calc::new(&client).await.unwrap();
    assert_eq!(calc.handle().instance_id, "i-42");
    assert_eq!(calc.whoami().await.unwrap(), "i-42");
    assert_eq!(calc.identity().await.unwrap(), "i-42");
    child.abort();
}
