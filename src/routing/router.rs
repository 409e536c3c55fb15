//! Per-route gate policy lookup.
//!
//! # Responsibilities
//! - Compile `[[routes]]` entries into matchers with resolved options
//! - Look up the policy for a request head
//! - Fall back to the global `[gate]` options
//!
//! # Design Decisions
//! - Immutable after construction; reloads build a new router and swap it in
//! - Highest priority first, declaration order breaks ties
//! - O(n) scan (acceptable for typical route counts)

use std::sync::Arc;

use crate::config::{GateOptions, RoutePolicyConfig, ShieldConfig};
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher, RequestHead};

/// Name reported for requests that match no route.
pub const DEFAULT_ROUTE: &str = "default";

#[derive(Debug)]
struct CompiledRoute {
    name: String,
    matcher: AndMatcher,
    options: Arc<GateOptions>,
}

impl CompiledRoute {
    fn compile(route: &RoutePolicyConfig, base: &GateOptions) -> Self {
        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = &route.host {
            matchers.push(Box::new(HostMatcher::new(host.clone())));
        }
        if let Some(prefix) = &route.path_prefix {
            matchers.push(Box::new(PathPrefixMatcher::new(prefix.clone())));
        }
        Self {
            name: route.name.clone(),
            matcher: AndMatcher::new(matchers),
            options: Arc::new(route.apply(base)),
        }
    }
}

/// Resolves the [`GateOptions`] that apply to a request.
#[derive(Debug)]
pub struct PolicyRouter {
    routes: Vec<CompiledRoute>,
    default: Arc<GateOptions>,
}

impl PolicyRouter {
    pub fn new(default: GateOptions, routes: &[RoutePolicyConfig]) -> Self {
        let mut ordered: Vec<&RoutePolicyConfig> = routes.iter().collect();
        // stable sort keeps declaration order among equal priorities
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        let routes = ordered
            .into_iter()
            .map(|route| CompiledRoute::compile(route, &default))
            .collect::<Vec<_>>();

        tracing::debug!(routes = routes.len(), "Policy router compiled");
        Self {
            routes,
            default: Arc::new(default),
        }
    }

    pub fn from_config(config: &ShieldConfig) -> Self {
        Self::new(config.gate.clone(), &config.routes)
    }

    /// Route name and options for a request. Unmatched requests get the
    /// global options under [`DEFAULT_ROUTE`].
    pub fn options_for(&self, head: &RequestHead<'_>) -> (String, Arc<GateOptions>) {
        self.routes
            .iter()
            .find(|route| route.matcher.matches(head))
            .map(|route| (route.name.clone(), route.options.clone()))
            .unwrap_or_else(|| (DEFAULT_ROUTE.to_string(), self.default.clone()))
    }

    pub fn default_options(&self) -> &Arc<GateOptions> {
        &self.default
    }

    /// Route names in match order.
    pub fn route_names(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.name.as_str()).collect()
    }
}
