//! Concurrency-limited dispatcher over named completion providers
//!
//! Each provider owns a semaphore sized to its `max-concurrent-requests`.
//! A call holds one permit from acquisition until the call finishes, fails
//! or times out, so a provider never sees more in-flight calls than its
//! permit count.

use crate::config::ProviderConfig;
use crate::dispatch::client::{CompletionClient, HttpCompletionClient};
use crate::dispatch::{DispatchError, DispatchResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Semaphore;

struct ProviderSlot {
    client: Arc<dyn CompletionClient>,
    permits: Arc<Semaphore>,
    capacity: usize,
    model: String,
    timeout: Duration,
}

/// Routes completion calls to named providers
#[derive(Default)]
pub struct Dispatcher {
    providers: HashMap<String, ProviderSlot>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one HTTP client and permit pool per configured provider
    pub fn from_config(providers: &[ProviderConfig]) -> DispatchResult<Self> {
        let mut dispatcher = Self::new();

        for provider in providers {
            let client = HttpCompletionClient::from_config(provider)?;
            dispatcher.register(
                &provider.name,
                &provider.model,
                Arc::new(client),
                provider.max_concurrent_requests,
                Duration::from_secs(provider.timeout_secs),
            );
            tracing::info!(
                "Registered provider '{}' (model: {}, max concurrent: {})",
                provider.name,
                provider.model,
                provider.max_concurrent_requests
            );
        }

        Ok(dispatcher)
    }

    /// Registers (or replaces) a provider
    ///
    /// # Arguments
    ///
    /// * `name` - Name callers dispatch to
    /// * `model` - Model label reported by [`Dispatcher::providers`]
    /// * `client` - The endpoint client
    /// * `max_concurrent` - Permit count; values below 1 are raised to 1
    /// * `timeout` - Upper bound on a single call once a permit is held
    pub fn register(
        &mut self,
        name: &str,
        model: &str,
        client: Arc<dyn CompletionClient>,
        max_concurrent: usize,
        timeout: Duration,
    ) {
        let capacity = max_concurrent.max(1);
        self.providers.insert(
            name.to_string(),
            ProviderSlot {
                client,
                permits: Arc::new(Semaphore::new(capacity)),
                capacity,
                model: model.to_string(),
                timeout,
            },
        );
    }

    fn slot(&self, provider: &str) -> DispatchResult<&ProviderSlot> {
        self.providers
            .get(provider)
            .ok_or_else(|| DispatchError::InvalidProvider(provider.to_string()))
    }

    /// Sends a prompt pair to a provider, waiting for a permit first
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The completion text
    /// * `Err(DispatchError::InvalidProvider)` - Unknown provider name
    /// * `Err(DispatchError::Timeout)` - The call exceeded the provider timeout
    /// * `Err(DispatchError::CallFailed)` - Transport or provider error
    pub async fn complete(
        &self,
        provider: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> DispatchResult<String> {
        let slot = self.slot(provider)?;

        tracing::debug!(
            "Waiting for '{}' permit ({} of {} available)",
            provider,
            slot.permits.available_permits(),
            slot.capacity
        );

        let _permit = Arc::clone(&slot.permits)
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::CallFailed {
                provider: provider.to_string(),
                message: "permit pool closed".to_string(),
            })?;

        tracing::debug!("Acquired '{}' permit", provider);
        let started = Instant::now();

        let outcome =
            tokio::time::timeout(slot.timeout, slot.client.complete(system_prompt, user_prompt))
                .await;

        match outcome {
            Ok(Ok(text)) => {
                tracing::debug!(
                    "'{}' call completed in {}ms, releasing permit",
                    provider,
                    started.elapsed().as_millis()
                );
                Ok(text)
            }
            Ok(Err(e)) => {
                tracing::warn!("'{}' call failed, releasing permit: {}", provider, e);
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    "'{}' call timed out after {:?}, releasing permit",
                    provider,
                    slot.timeout
                );
                Err(DispatchError::Timeout {
                    provider: provider.to_string(),
                    after: slot.timeout,
                })
            }
        }
    }

    /// Blocking form of [`Dispatcher::complete`]
    ///
    /// Usable from plain threads and from multi-threaded runtime workers.
    /// Inside a current-thread runtime it refuses instead of deadlocking.
    pub fn complete_blocking(
        &self,
        provider: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> DispatchResult<String> {
        // Resolve the name before touching any runtime.
        self.slot(provider)?;

        match Handle::try_current() {
            Ok(handle) => {
                if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
                    return Err(DispatchError::CallFailed {
                        provider: provider.to_string(),
                        message: "cannot block inside a current-thread runtime".to_string(),
                    });
                }
                tokio::task::block_in_place(|| {
                    handle.block_on(self.complete(provider, system_prompt, user_prompt))
                })
            }
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| DispatchError::CallFailed {
                        provider: provider.to_string(),
                        message: format!("failed to start runtime: {}", e),
                    })?;
                runtime.block_on(self.complete(provider, system_prompt, user_prompt))
            }
        }
    }

    /// Permits currently free for a provider
    pub fn available_permits(&self, provider: &str) -> Option<usize> {
        self.providers
            .get(provider)
            .map(|slot| slot.permits.available_permits())
    }

    /// Configured permit count for a provider
    pub fn max_concurrent(&self, provider: &str) -> Option<usize> {
        self.providers.get(provider).map(|slot| slot.capacity)
    }

    pub fn has_provider(&self, provider: &str) -> bool {
        self.providers.contains_key(provider)
    }

    /// Configured providers as `(name, model)` pairs, sorted by name
    pub fn providers(&self) -> Vec<(String, String)> {
        let mut list: Vec<_> = self
            .providers
            .iter()
            .map(|(name, slot)| (name.clone(), slot.model.clone()))
            .collect();
        list.sort();
        list
    }
}
