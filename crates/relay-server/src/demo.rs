//! Demo services
//!
//! `user-service` keeps users in its storage namespace. `frontend-service`
//! watches the user change events and drives a few requests against it once
//! mounted.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use relay_bus::SubscriptionId;
use relay_common::{rpc_subject, storage_prefix};
use relay_service::{
    Connection, Reply, RequestOptions, Result, ServiceContext, ServiceDescriptor, ServiceHost,
    handler_fn,
};

pub const USER_SERVICE: &str = "user-service";
pub const FRONTEND_SERVICE: &str = "frontend-service";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Register both demo services on `host`
pub fn register(host: &ServiceHost) -> Result<()> {
    host.register(user_service())?;
    host.register(frontend_service())?;
    Ok(())
}

fn now() -> Value {
    json!(chrono::Utc::now().to_rfc3339())
}

/// Reply `{err, data}` the way every user-service method answers
fn respond(reply: &Reply, result: &Result<Value>) {
    match result {
        Ok(data) => reply.send(json!({"err": null, "data": data})),
        Err(e) => reply.send(json!({"err": e.to_string(), "data": null})),
    }
}

pub fn user_service() -> ServiceDescriptor {
    ServiceDescriptor::new(USER_SERVICE)
        .before_create(|ctx| info!(service = %ctx.service(), "hook: before create"))
        .created(|ctx| info!(service = %ctx.service(), "hook: created"))
        .mounted(|ctx| {
            info!(service = %ctx.service(), data = ?ctx.data(), "hook: mounted, service is ready");
        })
        .destroyed(|ctx| info!(service = %ctx.service(), "hook: destroyed"))
        .method("addUser", |ctx, payload, reply: Reply| async move {
            let result: Result<Value> = async { Ok(json!(ctx.storage()?.put(payload).await?)) }.await;
            respond(&reply, &result);
            touch(&ctx);
            result.map(|_| ())
        })
        .method("findUser", |ctx, payload, reply: Reply| async move {
            let result: Result<Value> = async {
                let filter = (!payload.is_null()).then_some(&payload);
                Ok(Value::Array(ctx.storage()?.find(filter).await?))
            }
            .await;
            respond(&reply, &result);
            result.map(|_| ())
        })
        .method("updateUser", |ctx, payload, reply: Reply| async move {
            let result: Result<Value> = async {
                ctx.storage()?.update(payload).await?;
                Ok(Value::Null)
            }
            .await;
            respond(&reply, &result);
            touch(&ctx);
            result.map(|_| ())
        })
        .method("removeUser", |ctx, payload, reply: Reply| async move {
            let result: Result<Value> = async {
                let id = payload
                    .as_str()
                    .or_else(|| payload.get("_id").and_then(Value::as_str))
                    .unwrap_or_default();
                ctx.storage()?.del(id).await?;
                Ok(Value::Null)
            }
            .await;
            respond(&reply, &result);
            touch(&ctx);
            result.map(|_| ())
        })
        .function("setTimestamp", |ctx| {
            let timestamp = now();
            ctx.set("timestamp", timestamp.clone());
            timestamp
        })
        .data(|| {
            let mut data = Map::new();
            data.insert("timestamp".to_string(), now());
            data
        })
}

fn touch(ctx: &ServiceContext) {
    if let Err(e) = ctx.call("setTimestamp") {
        warn!(service = %ctx.service(), error = %e, "failed to refresh timestamp");
    }
}

pub fn frontend_service() -> ServiceDescriptor {
    let watch: Arc<Mutex<Option<(Arc<dyn Connection>, SubscriptionId)>>> =
        Arc::new(Mutex::new(None));
    let unwatch = watch.clone();

    ServiceDescriptor::new(FRONTEND_SERVICE)
        .mounted(move |ctx| {
            let connection = match ctx.connection() {
                Ok(connection) => connection,
                Err(e) => {
                    warn!(service = %ctx.service(), error = %e, "frontend mounted without a connection");
                    return;
                }
            };

            let subject = user_events_subject();
            match connection.subscribe(
                &subject,
                handler_fn(|msg: relay_service::Message| async move {
                    info!(subject = %msg.subject, payload = %msg.payload, "database event from user-service");
                }),
            ) {
                Ok(sid) => *watch.lock() = Some((connection.clone(), sid)),
                Err(e) => warn!(%subject, error = %e, "failed to watch user-service events"),
            }

            tokio::spawn(drive_users(connection));
        })
        .destroyed(move |ctx| {
            if let Some((connection, sid)) = unwatch.lock().take()
                && let Err(e) = connection.unsubscribe(sid)
            {
                warn!(service = %ctx.service(), error = %e, "failed to stop watching user-service");
            }
        })
}

/// Every storage change of `user-service`
fn user_events_subject() -> String {
    format!("{}.>", storage_prefix(USER_SERVICE))
}

/// Add a few users, look two of them up and rename the first match
async fn drive_users(connection: Arc<dyn Connection>) {
    if let Err(e) = run_requests(connection.as_ref()).await {
        warn!(error = %e, "frontend request sequence failed");
    }
}

async fn run_requests(connection: &dyn Connection) -> Result<()> {
    let options = RequestOptions::max(1).with_timeout(REQUEST_TIMEOUT);
    let subject = |method: &str| rpc_subject(USER_SERVICE, method);

    for (name, email) in [
        ("yamigr", "yamigr@42.com"),
        ("joe", "joe@42.com"),
        ("yanosh", "yanosh@42.com"),
    ] {
        let response = connection
            .request(
                &subject("addUser"),
                json!({"name": name, "email": email}),
                options.clone(),
            )
            .await?;
        info!(%response, "response from user-service method addUser");
    }

    let found = connection
        .request(
            &subject("findUser"),
            json!({"name": {"$in": ["yamigr", "yanosh"]}}),
            options.clone(),
        )
        .await?;

    let Some(mut first) = found["data"].get(0).cloned() else {
        warn!(%found, "findUser returned no users");
        return Ok(());
    };
    first["name"] = json!("Updated baaaaaaam");
    let response = connection
        .request(&subject("updateUser"), first, options)
        .await?;
    info!(%response, "response from user-service method updateUser");
    Ok(())
}
