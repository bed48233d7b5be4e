//! Provider router: maps a backend choice to a provider instance.
//!
//! Both backends are built once at startup and shared across requests.

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use charmline_core::Backend;
use charmline_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;

/// A provider paired with the model it should be asked for.
#[derive(Clone)]
pub struct Route {
    pub provider: Arc<dyn Provider>,
    pub model: String,
}

/// Routes completion requests to the provider for the requested backend.
pub struct ProviderRouter {
    routes: HashMap<Backend, Route>,
    default_backend: Backend,
}

impl ProviderRouter {
    /// Create an empty router.
    pub fn new(default_backend: Backend) -> Self {
        Self {
            routes: HashMap::new(),
            default_backend,
        }
    }

    /// Register a provider for a backend.
    pub fn register(
        &mut self,
        backend: Backend,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
    ) {
        self.routes.insert(
            backend,
            Route {
                provider,
                model: model.into(),
            },
        );
    }

    pub fn default_backend(&self) -> Backend {
        self.default_backend
    }

    /// Look up the route for a backend, falling back to the default backend
    /// when none is requested.
    pub fn resolve(&self, backend: Option<Backend>) -> Option<(Backend, Route)> {
        let backend = backend.unwrap_or(self.default_backend);
        self.routes.get(&backend).map(|r| (backend, r.clone()))
    }

    /// List the registered backends.
    pub fn list(&self) -> Vec<Backend> {
        let mut backends: Vec<Backend> = self.routes.keys().copied().collect();
        backends.sort_by_key(|b| b.as_str());
        backends
    }
}

/// Build both backends from configuration.
pub fn build_from_config(config: &charmline_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(config.default_backend);
    let timeout = config.completion_timeout_secs;

    let openai = &config.providers.openai;
    let mut provider = OpenAiCompatProvider::new(
        "openai",
        openai
            .api_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".into()),
        openai.api_key.clone().unwrap_or_default(),
    );
    provider = provider.with_timeout(timeout);
    router.register(Backend::OpenAi, Arc::new(provider), &openai.model);

    let anthropic = &config.providers.anthropic;
    let mut provider =
        AnthropicProvider::new(anthropic.api_key.clone().unwrap_or_default()).with_timeout(timeout);
    if let Some(ref url) = anthropic.api_url {
        provider = provider.with_base_url(url);
    }
    router.register(Backend::Anthropic, Arc::new(provider), &anthropic.model);

    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new(Backend::OpenAi);
        router.register(
            Backend::OpenAi,
            Arc::new(OpenAiCompatProvider::openai("sk-test")),
            "gpt-4",
        );

        let (backend, route) = router.resolve(None).unwrap();
        assert_eq!(backend, Backend::OpenAi);
        assert_eq!(route.model, "gpt-4");
        assert!(router.resolve(Some(Backend::Anthropic)).is_none());
    }

    #[test]
    fn build_from_default_config() {
        let config = charmline_config::AppConfig::default();
        let router = build_from_config(&config);
        assert_eq!(router.list(), vec![Backend::Anthropic, Backend::OpenAi]);

        let (backend, route) = router.resolve(Some(Backend::Anthropic)).unwrap();
        assert_eq!(backend, Backend::Anthropic);
        assert_eq!(route.provider.name(), "anthropic");
        assert_eq!(route.model, "claude-3-opus-20240229");

        let (backend, route) = router.resolve(None).unwrap();
        assert_eq!(backend, Backend::OpenAi);
        assert_eq!(route.provider.name(), "openai");
    }
}
