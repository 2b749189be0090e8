//! Service lifecycle integration tests
//!
//! Registration, hook ordering, connect/destroy and connection signal
//! forwarding against the in-process broker.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::{Map, Value, json};

use common::{TestHost, echo_service};
use relay_bus::BusError;
use relay_service::{HostEvent, RelayError, Reply, ServiceDescriptor};

type Journal = Arc<Mutex<Vec<String>>>;

fn journaled(name: &str, journal: &Journal) -> ServiceDescriptor {
    let record = |stage: &'static str| {
        let journal = journal.clone();
        let name = name.to_string();
        move |_ctx: &relay_service::ServiceContext| {
            journal.lock().push(format!("{}:{}", name, stage));
        }
    };
    ServiceDescriptor::new(name)
        .before_create(record("beforeCreate"))
        .created(record("created"))
        .mounted(record("mounted"))
        .destroyed(record("destroyed"))
}

#[tokio::test]
async fn test_echo_round_trip() {
    let t = TestHost::new();
    t.host.register(echo_service()).unwrap();
    t.host.connect().await.unwrap();

    let reply = t.call("echo.ping", json!({"x": 1})).await.unwrap();
    assert_eq!(reply, json!({"x": 1}));
}

#[tokio::test]
async fn test_hook_order_across_services() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let t = TestHost::new();
    t.host.register(journaled("first", &journal)).unwrap();
    t.host.register(journaled("second", &journal)).unwrap();

    assert_eq!(
        *journal.lock(),
        vec!["first:beforeCreate", "second:beforeCreate"]
    );

    t.host.connect().await.unwrap();
    assert_eq!(
        *journal.lock(),
        vec![
            "first:beforeCreate",
            "second:beforeCreate",
            "first:created",
            "second:created",
            "first:mounted",
            "second:mounted",
        ]
    );
}

#[tokio::test]
async fn test_before_create_runs_before_data() {
    let seen = Arc::new(Mutex::new(None));
    let observed = seen.clone();
    let t = TestHost::new();

    let ctx = t
        .host
        .register(
            ServiceDescriptor::new("stateful")
                .before_create(move |ctx| {
                    *observed.lock() = Some(ctx.data().len());
                })
                .data(|| {
                    let mut data = Map::new();
                    data.insert("timestamp".to_string(), json!(42));
                    data
                }),
        )
        .unwrap();

    assert_eq!(*seen.lock(), Some(0));
    assert_eq!(ctx.get("timestamp"), Some(json!(42)));
}

#[tokio::test]
async fn test_storage_attached_before_mounted() {
    let attached = Arc::new(Mutex::new(Vec::new()));
    let t = TestHost::new();

    let on_created = attached.clone();
    let on_mounted = attached.clone();
    t.host
        .register(
            ServiceDescriptor::new("svc")
                .created(move |ctx| on_created.lock().push(ctx.storage().is_ok()))
                .mounted(move |ctx| on_mounted.lock().push(ctx.storage().is_ok())),
        )
        .unwrap();
    t.host.connect().await.unwrap();

    assert_eq!(*attached.lock(), vec![false, true]);
}

#[tokio::test]
async fn test_local_functions() {
    let t = TestHost::new();
    let ctx = t
        .host
        .register(
            ServiceDescriptor::new("clock")
                .function("setTimestamp", |ctx| {
                    ctx.set("timestamp", json!("now"));
                    Value::Null
                })
                .method("tick", |ctx, _payload, reply: Reply| async move {
                    ctx.call("setTimestamp")?;
                    reply.send(ctx.get("timestamp").unwrap_or_default());
                    Ok(())
                })
                .method("bogus", |ctx, _payload, reply: Reply| async move {
                    let err = ctx.call("nope").unwrap_err();
                    reply.send(json!(err.to_string()));
                    Ok(())
                }),
        )
        .unwrap();
    t.host.connect().await.unwrap();

    assert_eq!(t.call("clock.tick", json!({})).await.unwrap(), json!("now"));
    assert_eq!(ctx.get("timestamp"), Some(json!("now")));
    assert_eq!(
        t.call("clock.bogus", json!({})).await.unwrap(),
        json!(RelayError::NotAFunction("nope".to_string()).to_string())
    );
    assert!(ctx.has_function("setTimestamp"));
    assert!(!ctx.has_function("tick"));
}

#[tokio::test]
async fn test_reregister_replaces_service() {
    let t = TestHost::new();
    let old_calls = Arc::new(AtomicUsize::new(0));
    let counter = old_calls.clone();

    t.host
        .register(ServiceDescriptor::new("svc").method(
            "hello",
            move |_ctx, _payload, reply: Reply| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    reply.send(json!("old"));
                    Ok(())
                }
            },
        ))
        .unwrap();
    t.host
        .register(
            ServiceDescriptor::new("svc").method("hello", |_ctx, _payload, reply: Reply| async move {
                reply.send(json!("new"));
                Ok(())
            }),
        )
        .unwrap();
    assert_eq!(t.host.services(), vec!["svc"]);

    t.host.connect().await.unwrap();
    assert_eq!(t.call("svc.hello", json!({})).await.unwrap(), json!("new"));
    assert_eq!(old_calls.load(Ordering::SeqCst), 0);
    assert_eq!(t.broker.subscription_count(), 1);
}

#[tokio::test]
async fn test_reregister_while_connected_revokes_old() {
    let t = TestHost::new();
    t.host
        .register(
            ServiceDescriptor::new("svc")
                .method("old", |_ctx, _payload, reply: Reply| async move {
                    reply.send(json!("old"));
                    Ok(())
                }),
        )
        .unwrap();
    t.host.connect().await.unwrap();
    assert_eq!(t.call("svc.old", json!({})).await.unwrap(), json!("old"));

    let old_ctx = t.host.context("svc").unwrap();
    t.host
        .register(
            ServiceDescriptor::new("svc")
                .method("new", |_ctx, _payload, reply: Reply| async move {
                    reply.send(json!("new"));
                    Ok(())
                }),
        )
        .unwrap();

    assert!(matches!(
        t.call("svc.old", json!({})).await,
        Err(RelayError::Broker(_))
    ));
    assert_eq!(t.call("svc.new", json!({})).await.unwrap(), json!("new"));
    assert!(old_ctx.storage().is_err());
    assert_eq!(t.host.subscriptions("svc").unwrap().len(), 1);
}

#[tokio::test]
async fn test_destroy_stops_dispatch() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let t = TestHost::new();
    t.host
        .register(journaled("svc", &journal).method(
            "work",
            move |_ctx, _payload, reply: Reply| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    reply.send(json!("done"));
                    Ok(())
                }
            },
        ))
        .unwrap();
    t.host.register(echo_service()).unwrap();
    t.host.connect().await.unwrap();
    assert_eq!(t.call("svc.work", json!({})).await.unwrap(), json!("done"));

    let ctx = t.host.context("svc").unwrap();
    t.host.destroy("svc").unwrap();

    assert_eq!(journal.lock().last().map(String::as_str), Some("svc:destroyed"));
    assert_eq!(t.host.services(), vec!["echo"]);
    assert!(ctx.storage().is_err());
    assert!(matches!(
        t.host.context("svc"),
        Err(RelayError::UnknownService(_))
    ));

    // Plain publish and request both go nowhere
    t.client.publish("svc.work", json!({})).unwrap();
    let err = t
        .client
        .request("svc.work", json!({}), relay_service::RequestOptions::max(1))
        .await
        .unwrap_err();
    assert_eq!(err, BusError::NoResponders("svc.work".to_string()));
    tokio::time::sleep(common::QUIET_PERIOD).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Other services keep working
    assert_eq!(t.call("echo.ping", json!(7)).await.unwrap(), json!(7));

    assert_eq!(
        t.host.destroy("svc"),
        Err(RelayError::UnknownService("svc".to_string()))
    );
}

#[tokio::test]
async fn test_connection_signals_forwarded() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let t = TestHost::new();
    t.host.register(journaled("svc", &journal)).unwrap();
    t.host.register(echo_service()).unwrap();

    let mut events = t.host.subscribe_events();
    t.host.connect().await.unwrap();
    assert_eq!(events.recv().await.unwrap(), HostEvent::Connect);
    let hooks_after_connect = journal.lock().len();
    let subscriptions = t.broker.subscription_count();

    t.broker.disconnect_all();
    assert_eq!(events.recv().await.unwrap(), HostEvent::Disconnect);
    assert_eq!(events.recv().await.unwrap(), HostEvent::Reconnecting);

    t.broker.reconnect_all();
    assert_eq!(events.recv().await.unwrap(), HostEvent::Reconnect);

    t.broker.emit_error("stale connection");
    assert_eq!(
        events.recv().await.unwrap(),
        HostEvent::Err("stale connection".to_string())
    );

    // Nothing re-ran and nothing was reinstalled
    assert_eq!(journal.lock().len(), hooks_after_connect);
    assert_eq!(t.broker.subscription_count(), subscriptions);
    assert_eq!(t.call("echo.ping", json!("back")).await.unwrap(), json!("back"));
}

#[tokio::test]
async fn test_method_without_reply_address() {
    let t = TestHost::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    t.host
        .register(ServiceDescriptor::new("sink").method(
            "push",
            move |_ctx, payload, reply: Reply| {
                let sink = sink.clone();
                async move {
                    sink.lock().push((payload, reply.expects_reply()));
                    reply.send(json!("ignored"));
                    Ok(())
                }
            },
        ))
        .unwrap();
    t.host.connect().await.unwrap();

    t.client.publish("sink.push", json!(1)).unwrap();
    tokio::time::sleep(common::QUIET_PERIOD).await;
    assert_eq!(*seen.lock(), vec![(json!(1), false)]);
}

#[tokio::test]
async fn test_close_then_reconnect_with_new_services() {
    let t = TestHost::new();
    t.host.register(echo_service()).unwrap();
    t.host.connect().await.unwrap();
    t.host.close();
    assert!(t.host.services().is_empty());
    assert!(t.host.connection().is_err());

    t.host.register(echo_service()).unwrap();
    t.host.connect().await.unwrap();
    assert_eq!(t.call("echo.ping", json!("again")).await.unwrap(), json!("again"));
}
