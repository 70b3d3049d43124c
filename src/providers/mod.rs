//! Payment provider registry and shipped providers.
//!
//! Providers are opaque remote processors. The two shipped here simulate
//! their remote ends deterministically so every environment exercises the
//! full orchestration path without live credentials: the fractional cents
//! of the charge amount select the outcome (`.99` declines, `.50` stays
//! pending, anything else completes).

pub mod paypal;
pub mod stripe;

pub use paypal::PaypalProvider;
pub use stripe::StripeProvider;

use std::collections::HashMap;
use std::sync::Arc;

use crate::interfaces::provider::{PaymentProvider, ProviderError, Result};

/// Name → provider map. Lookups are case-insensitive.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with both shipped providers.
    pub fn with_defaults(webhook_secret: &str) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(StripeProvider::new(webhook_secret)));
        registry.register(Arc::new(PaypalProvider::new(webhook_secret)));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn PaymentProvider>) {
        self.providers
            .insert(provider.name().to_ascii_lowercase(), provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn PaymentProvider>> {
        self.providers
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = ProviderRegistry::with_defaults("whsec");
        assert!(registry.get("stripe").is_ok());
        assert!(registry.get("Stripe").is_ok());
        assert!(registry.get("PAYPAL").is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        let registry = ProviderRegistry::with_defaults("whsec");
        let err = registry.get("adyen").unwrap_err();
        assert!(matches!(err, ProviderError::UnknownProvider(_)));
        assert_eq!(err.code(), "UNKNOWN_PROVIDER");
    }

    #[test]
    fn test_names_sorted() {
        let registry = ProviderRegistry::with_defaults("whsec");
        assert_eq!(registry.names(), vec!["paypal", "stripe"]);
    }
}
