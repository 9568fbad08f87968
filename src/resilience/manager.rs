//! # Resilience Registry
//!
//! Hands out one [`ResilienceExecutor`] per named component, built on first use
//! from [`ResilienceSettings`]. Callers own the registry and pass it to the
//! client wrappers that need it; there is no process-wide instance.

use std::collections::HashMap;

use dashmap::DashMap;
use tracing::{info, warn};

use super::circuit_breaker::CircuitState;
use super::executor::ResilienceExecutor;
use crate::config::ResilienceSettings;

/// Registry of per-component resilience executors
#[derive(Debug, Default)]
pub struct ResilienceRegistry {
    settings: ResilienceSettings,
    executors: DashMap<String, ResilienceExecutor>,
}

impl ResilienceRegistry {
    pub fn new(settings: ResilienceSettings) -> Self {
        info!(
            component_overrides = settings.components.len(),
            "Initializing resilience registry"
        );
        Self {
            settings,
            executors: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &ResilienceSettings {
        &self.settings
    }

    /// Get or create the executor for `component`
    pub fn executor(&self, component: &str) -> ResilienceExecutor {
        if let Some(existing) = self.executors.get(component) {
            return existing.value().clone();
        }

        self.executors
            .entry(component.to_string())
            .or_insert_with(|| {
                let (retry, breaker) = self.settings.config_for_component(component);
                ResilienceExecutor::new(retry, breaker)
            })
            .value()
            .clone()
    }

    /// Install a pre-built executor, replacing any existing one
    pub fn register(&self, component: impl Into<String>, executor: ResilienceExecutor) {
        let component = component.into();
        if self.executors.insert(component.clone(), executor).is_some() {
            warn!(component = %component, "Replaced existing resilience executor");
        }
    }

    pub fn remove(&self, component: &str) -> bool {
        self.executors.remove(component).is_some()
    }

    pub fn components(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Breaker state of every registered component
    pub fn states(&self) -> HashMap<String, CircuitState> {
        self.executors
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect()
    }

    /// True when every registered breaker is healthy
    pub fn is_healthy(&self) -> bool {
        self.executors
            .iter()
            .all(|entry| entry.value().breaker().is_healthy())
    }

    pub fn force_open_all(&self) {
        for entry in self.executors.iter() {
            entry.value().breaker().force_open();
        }
    }

    pub fn force_closed_all(&self) {
        for entry in self.executors.iter() {
            entry.value().breaker().force_closed();
        }
    }
}
