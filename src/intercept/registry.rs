//! Handler registry.
//!
//! Maps endpoints (slash commands, callback buttons, free text) to
//! pipelines. Every pipeline gets the registry's default before
//! interceptors in front of its own.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use super::chain::{Chain, ChainError, Interceptor, Pipeline};

/// Something an update can be routed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Slash command, stored lowercase without the slash.
    Command(String),
    /// Inline button, keyed by the part of the callback data before `:`.
    Callback(String),
    /// Any non-command text message.
    Text,
}

impl Endpoint {
    /// Endpoint for `/name`. Case and a leading slash don't matter.
    pub fn command(name: &str) -> Self {
        Endpoint::Command(name.trim_start_matches('/').to_lowercase())
    }

    pub fn callback(unique: &str) -> Self {
        Endpoint::Callback(unique.to_string())
    }

    /// Resolve the endpoint for a message text.
    ///
    /// `/Tip@MyBot 100` routes to `tip` when `bot_username` is `mybot`;
    /// commands addressed to other bots route nowhere.
    pub fn from_text(text: &str, bot_username: &str) -> Option<Self> {
        let Some(rest) = text.strip_prefix('/') else {
            return Some(Endpoint::Text);
        };

        let word = rest.split_whitespace().next().unwrap_or("");
        let (name, addressee) = match word.split_once('@') {
            Some((name, addressee)) => (name, Some(addressee)),
            None => (word, None),
        };

        if name.is_empty() {
            return None;
        }
        if let Some(addressee) = addressee
            && !addressee.eq_ignore_ascii_case(bot_username)
        {
            return None;
        }

        Some(Endpoint::command(name))
    }

    /// Resolve the endpoint for callback data like `pay_confirm:abc`.
    pub fn from_callback_data(data: &str) -> Self {
        let unique = data.split_once(':').map(|(u, _)| u).unwrap_or(data);
        Endpoint::callback(unique)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Command(name) => write!(f, "/{}", name),
            Endpoint::Callback(unique) => write!(f, "callback:{}", unique),
            Endpoint::Text => f.write_str("text"),
        }
    }
}

/// Registered pipelines by endpoint.
pub struct HandlerRegistry<C> {
    handlers: HashMap<Endpoint, Arc<Pipeline<C>>>,
    default_before: Chain<C>,
}

impl<C: Send + 'static> HandlerRegistry<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            default_before: Vec::new(),
        }
    }

    /// Add an interceptor that runs first in every pipeline registered
    /// after this call.
    #[must_use]
    pub fn with_default_before(mut self, interceptor: impl Interceptor<C>) -> Self {
        self.default_before.push(Arc::new(interceptor));
        self
    }

    /// Register `pipeline` for all `endpoints`.
    ///
    /// A later registration for the same endpoint replaces the earlier one.
    pub fn register(&mut self, endpoints: &[Endpoint], pipeline: Pipeline<C>) {
        let pipeline = Arc::new(pipeline.prepend_before(self.default_before.clone()));
        for endpoint in endpoints {
            trace!("Registering {} -> {}", endpoint, pipeline.log_fields().func);
            if self
                .handlers
                .insert(endpoint.clone(), pipeline.clone())
                .is_some()
            {
                debug!("Endpoint {} registered twice, keeping the latest", endpoint);
            }
        }
    }

    pub fn get(&self, endpoint: &Endpoint) -> Option<Arc<Pipeline<C>>> {
        self.handlers.get(endpoint).cloned()
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.handlers.contains_key(endpoint)
    }

    /// Run the pipeline registered for `endpoint`.
    ///
    /// Returns `None` when nothing is registered.
    pub async fn dispatch(
        &self,
        endpoint: &Endpoint,
        ctx: C,
        trace_id: &str,
    ) -> Option<Result<(), ChainError>> {
        let pipeline = self.get(endpoint)?;
        Some(pipeline.run(ctx, trace_id).await)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C: Send + 'static> Default for HandlerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::chain::Step;

    struct Ctx(Vec<&'static str>, std::sync::Arc<parking_lot::Mutex<Vec<&'static str>>>);

    async fn mark_default(mut ctx: Ctx) -> Step<Ctx> {
        ctx.0.push("default");
        Ok(ctx)
    }

    async fn mark_own(mut ctx: Ctx) -> Step<Ctx> {
        ctx.0.push("own");
        Ok(ctx)
    }

    async fn handler(mut ctx: Ctx) -> Step<Ctx> {
        ctx.0.push("handler");
        *ctx.1.lock() = ctx.0.clone();
        Ok(ctx)
    }

    #[test]
    fn test_endpoint_from_text() {
        assert_eq!(Endpoint::from_text("/tip 100", "bot"), Some(Endpoint::command("tip")));
        assert_eq!(Endpoint::from_text("/TIP 100", "bot"), Some(Endpoint::command("tip")));
        assert_eq!(Endpoint::from_text("/Tip@Bot 5", "bot"), Some(Endpoint::command("tip")));
        assert_eq!(Endpoint::from_text("/tip@otherbot 5", "bot"), None);
        assert_eq!(Endpoint::from_text("/", "bot"), None);
        assert_eq!(Endpoint::from_text("hello", "bot"), Some(Endpoint::Text));
    }

    #[test]
    fn test_endpoint_from_callback() {
        assert_eq!(
            Endpoint::from_callback_data("pay_confirm:abc:def"),
            Endpoint::callback("pay_confirm")
        );
        assert_eq!(Endpoint::from_callback_data("node_check"), Endpoint::callback("node_check"));
    }

    #[tokio::test]
    async fn test_aliases_share_a_pipeline_and_defaults_run_first() {
        let mut registry = HandlerRegistry::new().with_default_before(mark_default);
        registry.register(
            &[Endpoint::command("tip"), Endpoint::command("t")],
            Pipeline::new(handler).before(mark_own),
        );

        assert_eq!(registry.len(), 2);

        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let result = registry
            .dispatch(&Endpoint::command("T"), Ctx(Vec::new(), seen.clone()), "t")
            .await;
        assert!(matches!(result, Some(Ok(()))));
        assert_eq!(*seen.lock(), vec!["default", "own", "handler"]);

        let missing = registry
            .dispatch(&Endpoint::command("nope"), Ctx(Vec::new(), seen.clone()), "t")
            .await;
        assert!(missing.is_none());
    }
}
