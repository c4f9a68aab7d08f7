//! Route → backend bindings.
//!
//! Each turn runs against the binding resolved for its route. The binding is
//! passed to the loop by value, so nothing has to be swapped back afterwards.

use concierge_config::{AppConfig, BindingConfig};
use concierge_core::error::{Error, ProviderError};
use concierge_core::provider::Provider;
use concierge_core::route::Route;
use concierge_providers::ProviderRouter;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A provider and model to run one route against.
#[derive(Clone)]
pub struct Binding {
    pub route: Route,
    pub provider: Arc<dyn Provider>,
    pub model: String,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("route", &self.route)
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Clone)]
struct Target {
    provider: Arc<dyn Provider>,
    model: String,
}

/// Every route's binding, plus the local-only override.
#[derive(Clone)]
pub struct Bindings {
    default: Target,
    routes: HashMap<Route, Target>,
    local: Option<Target>,
}

impl Bindings {
    /// Bind every route to one provider/model.
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            default: Target {
                provider,
                model: model.into(),
            },
            routes: HashMap::new(),
            local: None,
        }
    }

    /// Override the binding for one route.
    pub fn with_route(mut self, route: Route, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        self.routes.insert(
            route,
            Target {
                provider,
                model: model.into(),
            },
        );
        self
    }

    /// Set the binding every route uses while a session is local-only.
    pub fn with_local(mut self, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        self.local = Some(Target {
            provider,
            model: model.into(),
        });
        self
    }

    /// Whether a local binding is configured.
    pub fn has_local(&self) -> bool {
        self.local.is_some()
    }

    /// Resolve the binding for `route`.
    ///
    /// `CODE1..3` fall back to `CODE` before the default. Local-only sessions
    /// use the local binding when one exists.
    pub fn resolve(&self, route: Route, local_only: bool) -> Binding {
        if local_only {
            if let Some(local) = &self.local {
                return Binding {
                    route,
                    provider: Arc::clone(&local.provider),
                    model: local.model.clone(),
                };
            }
        }

        let target = match route {
            Route::Code1 | Route::Code2 | Route::Code3 => self
                .routes
                .get(&route)
                .or_else(|| self.routes.get(&Route::Code)),
            Route::Chat | Route::Plan | Route::Analyze | Route::Ops | Route::Research | Route::Code => {
                self.routes.get(&route)
            }
        }
        .unwrap_or(&self.default);

        Binding {
            route,
            provider: Arc::clone(&target.provider),
            model: target.model.clone(),
        }
    }

    /// Build bindings from `[routing.bindings]` and `[routing.local]`.
    pub fn from_config(config: &AppConfig, providers: &ProviderRouter) -> Result<Self, Error> {
        let provider = providers.default_provider().ok_or_else(|| {
            ProviderError::NotConfigured(format!("default provider '{}'", config.default_provider))
        })?;
        let mut bindings = Self::new(provider, &config.default_model);

        for (name, binding) in &config.routing.bindings {
            let Ok(route) = name.parse::<Route>() else {
                warn!(route = %name, "Ignoring binding for unknown route");
                continue;
            };
            let target = target_from(binding, providers)?;
            debug!(route = %route, model = %target.model, "Bound route");
            bindings.routes.insert(route, target);
        }

        if let Some(local) = &config.routing.local {
            bindings.local = Some(target_from(local, providers)?);
        }

        Ok(bindings)
    }
}

fn target_from(binding: &BindingConfig, providers: &ProviderRouter) -> Result<Target, Error> {
    let provider = providers.resolve(binding.provider.as_deref()).ok_or_else(|| {
        ProviderError::NotConfigured(binding.provider.clone().unwrap_or_else(|| "default".into()))
    })?;
    Ok(Target {
        provider,
        model: binding.model.clone(),
    })
}
