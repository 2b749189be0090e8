//! Service descriptors
//!
//! A descriptor declares one service: its name, lifecycle hooks, RPC methods,
//! local functions and the initializer of its state. It is inert until handed to
//! [`ServiceHost::register`](crate::ServiceHost::register).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};

use relay_common::{RESERVED_NAMES, RelayError, Result, is_valid_token};

use crate::context::{LocalFunction, ServiceContext};
use crate::router::Reply;

/// Lifecycle hook, invoked with the service context
pub type Hook = Arc<dyn Fn(&ServiceContext) + Send + Sync>;

/// RPC method handler: (context, request payload, reply callback)
pub type MethodHandler =
    Arc<dyn Fn(ServiceContext, Value, Reply) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Produces the initial state of a service
pub type DataInitializer = Arc<dyn Fn() -> Map<String, Value> + Send + Sync>;

/// Key naming the service in a JSON declaration
pub const DECLARATION_NAME_KEY: &str = "servicename";

#[derive(Clone, Default)]
pub struct ServiceDescriptor {
    pub(crate) name: String,
    pub(crate) before_create: Option<Hook>,
    pub(crate) created: Option<Hook>,
    pub(crate) mounted: Option<Hook>,
    pub(crate) destroyed: Option<Hook>,
    /// Kept in declaration order; subscriptions are installed in this order
    pub(crate) methods: Vec<(String, MethodHandler)>,
    pub(crate) functions: HashMap<String, LocalFunction>,
    pub(crate) data: Option<DataInitializer>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Build a descriptor from a JSON declaration
    ///
    /// The declaration must be an object carrying a string `servicename`. An
    /// optional `data` object becomes the initial state. Hooks and handlers are
    /// attached afterwards with the builder methods.
    pub fn from_declaration(declaration: &Value) -> Result<Self> {
        let object = declaration
            .as_object()
            .ok_or_else(|| RelayError::invalid_descriptor("declaration is not an object"))?;

        let name = object
            .get(DECLARATION_NAME_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RelayError::invalid_descriptor(format!(
                    "declaration has no string '{}'",
                    DECLARATION_NAME_KEY
                ))
            })?;

        let mut descriptor = Self::new(name);
        match object.get("data") {
            None | Some(Value::Null) => {}
            Some(Value::Object(data)) => {
                let data = data.clone();
                descriptor.data = Some(Arc::new(move || data.clone()));
            }
            Some(_) => {
                return Err(RelayError::invalid_descriptor(
                    "declaration 'data' is not an object",
                ));
            }
        }
        Ok(descriptor)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn before_create(mut self, hook: impl Fn(&ServiceContext) + Send + Sync + 'static) -> Self {
        self.before_create = Some(Arc::new(hook));
        self
    }

    pub fn created(mut self, hook: impl Fn(&ServiceContext) + Send + Sync + 'static) -> Self {
        self.created = Some(Arc::new(hook));
        self
    }

    pub fn mounted(mut self, hook: impl Fn(&ServiceContext) + Send + Sync + 'static) -> Self {
        self.mounted = Some(Arc::new(hook));
        self
    }

    pub fn destroyed(mut self, hook: impl Fn(&ServiceContext) + Send + Sync + 'static) -> Self {
        self.destroyed = Some(Arc::new(hook));
        self
    }

    /// Declare an RPC method reachable on `{service}.{name}`
    ///
    /// Declaring the same name twice replaces the earlier handler.
    pub fn method<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ServiceContext, Value, Reply) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let handler: MethodHandler = Arc::new(move |ctx, payload, reply| {
            Box::pin(handler(ctx, payload, reply))
        });
        match self.methods.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = handler,
            None => self.methods.push((name, handler)),
        }
        self
    }

    /// Declare a local function, callable through [`ServiceContext::call`]
    pub fn function(
        mut self,
        name: impl Into<String>,
        function: impl Fn(&ServiceContext) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    pub fn data(mut self, initializer: impl Fn() -> Map<String, Value> + Send + Sync + 'static) -> Self {
        self.data = Some(Arc::new(initializer));
        self
    }

    pub fn method_names(&self) -> Vec<&str> {
        self.methods.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn function_names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }

    /// Check that every name can be used as a subject token
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RelayError::invalid_descriptor("service name is empty"));
        }
        if !is_valid_token(&self.name) {
            return Err(RelayError::invalid_descriptor(format!(
                "service name '{}' is not a single subject token",
                self.name
            )));
        }

        for (method, _) in &self.methods {
            if RESERVED_NAMES.contains(&method.as_str()) {
                return Err(RelayError::invalid_descriptor(format!(
                    "method name '{}' is reserved",
                    method
                )));
            }
            if !is_valid_token(method) {
                return Err(RelayError::invalid_descriptor(format!(
                    "method name '{}' is not a single subject token",
                    method
                )));
            }
        }

        if self.functions.keys().any(String::is_empty) {
            return Err(RelayError::invalid_descriptor("local function name is empty"));
        }
        Ok(())
    }

    /// Evaluate the data initializer; an absent initializer yields an empty map
    pub(crate) fn initial_data(&self) -> Map<String, Value> {
        self.data.as_ref().map(|init| init()).unwrap_or_default()
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .field("functions", &self.function_names())
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn noop() -> ServiceDescriptor {
        ServiceDescriptor::new("echo").method("ping", |_ctx, payload, reply: Reply| async move {
            reply.send(payload);
            Ok(())
        })
    }

    #[test]
    fn test_valid_descriptor() {
        let descriptor = noop().function("now", |_ctx| json!(1));
        assert!(descriptor.validate().is_ok());
        assert_eq!(descriptor.method_names(), vec!["ping"]);
        assert_eq!(descriptor.function_names(), vec!["now"]);
    }

    #[test]
    fn test_invalid_names() {
        let cases = vec![
            ServiceDescriptor::new(""),
            ServiceDescriptor::new("user.service"),
            ServiceDescriptor::new("user service"),
            ServiceDescriptor::new("users.>"),
            noop().method("$call", |_ctx, _payload, _reply| async { Ok(()) }),
            noop().method("$storage", |_ctx, _payload, _reply| async { Ok(()) }),
            noop().method("a.b", |_ctx, _payload, _reply| async { Ok(()) }),
            noop().method("*", |_ctx, _payload, _reply| async { Ok(()) }),
        ];
        for descriptor in cases {
            let err = descriptor.validate().unwrap_err();
            assert!(
                matches!(err, RelayError::InvalidDescriptor(_)),
                "{:?} accepted",
                descriptor
            );
        }
    }

    #[test]
    fn test_duplicate_method_replaces() {
        let descriptor = noop().method("ping", |_ctx, _payload, _reply| async { Ok(()) });
        assert_eq!(descriptor.method_names(), vec!["ping"]);
    }

    #[test]
    fn test_initial_data() {
        assert!(noop().initial_data().is_empty());

        let descriptor = noop().data(|| {
            let mut data = Map::new();
            data.insert("timestamp".to_string(), json!(0));
            data
        });
        assert_eq!(descriptor.initial_data().get("timestamp"), Some(&json!(0)));
    }

    #[test]
    fn test_from_declaration() {
        let descriptor = ServiceDescriptor::from_declaration(&json!({
            "servicename": "user-service",
            "data": {"timestamp": 0}
        }))
        .unwrap();
        assert_eq!(descriptor.name(), "user-service");
        assert_eq!(descriptor.initial_data().get("timestamp"), Some(&json!(0)));
    }

    #[test]
    fn test_from_declaration_rejects() {
        for declaration in [
            json!("user-service"),
            json!([1, 2]),
            json!({"name": "user-service"}),
            json!({"servicename": 3}),
            json!({"servicename": "a", "data": [1]}),
        ] {
            assert!(matches!(
                ServiceDescriptor::from_declaration(&declaration),
                Err(RelayError::InvalidDescriptor(_))
            ));
        }
    }
}
