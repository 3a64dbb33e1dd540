//! Kind-to-lookup registry
//!
//! Each registered kind maps to a closure that performs the matching
//! [`ClusterResourceProbe`] lookup for one object. Kinds without an entry are
//! not checked at all; [`KindRegistry::registered_kinds`] makes that gap
//! visible.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::manifest::K8sObject;
use crate::probe::{ClusterResourceProbe, Gvr};
use crate::Error;

/// Future returned by a lookup handler
pub type LookupFuture<'a> = BoxFuture<'a, Result<(), Error>>;

type LookupFn =
    dyn for<'a> Fn(&'a dyn ClusterResourceProbe, &'a K8sObject) -> LookupFuture<'a> + Send + Sync;

/// Lookup handlers keyed by kind
#[derive(Clone, Default)]
pub struct KindRegistry {
    handlers: BTreeMap<String, Arc<LookupFn>>,
}

impl KindRegistry {
    /// Registry with no kinds; every object is skipped
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry covering the kinds an installer manifest is verified against
    pub fn with_default_kinds() -> Self {
        let mut registry = Self::empty();
        registry
            .register("Service", |probe, object| {
                Box::pin(async move {
                    probe.get_service(&object.namespace, &object.name).await.map(drop)
                })
            })
            .register("ServiceAccount", |probe, object| {
                Box::pin(async move {
                    probe
                        .get_service_account(&object.namespace, &object.name)
                        .await
                        .map(drop)
                })
            })
            .register("Deployment", |probe, object| {
                Box::pin(async move {
                    probe.get_deployment(&object.namespace, &object.name).await.map(drop)
                })
            })
            .register("ConfigMap", |probe, object| {
                Box::pin(async move {
                    probe.get_config_map(&object.namespace, &object.name).await.map(drop)
                })
            })
            .register("ValidatingWebhookConfiguration", |probe, object| {
                Box::pin(async move { probe.get_validating_webhook(&object.name).await.map(drop) })
            })
            .register("MutatingWebhookConfiguration", |probe, object| {
                Box::pin(async move { probe.get_mutating_webhook(&object.name).await.map(drop) })
            })
            .register("CustomResourceDefinition", |probe, object| {
                Box::pin(async move { probe.get_crd(&object.name).await.map(drop) })
            })
            .register_custom_resource("EnvoyFilter", Gvr::envoy_filter())
            .register("PodDisruptionBudget", |probe, object| {
                Box::pin(async move {
                    probe
                        .get_pod_disruption_budget(&object.namespace, &object.name)
                        .await
                        .map(drop)
                })
            })
            .register("HorizontalPodAutoscaler", |probe, object| {
                Box::pin(async move {
                    probe
                        .get_horizontal_pod_autoscaler(&object.namespace, &object.name)
                        .await
                        .map(drop)
                })
            });
        registry
    }

    /// Register (or replace) the lookup for `kind`
    pub fn register<F>(&mut self, kind: impl Into<String>, lookup: F) -> &mut Self
    where
        F: for<'a> Fn(&'a dyn ClusterResourceProbe, &'a K8sObject) -> LookupFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(kind.into(), Arc::new(lookup));
        self
    }

    /// Register `kind` as a custom resource addressed by a fixed GVR
    pub fn register_custom_resource(&mut self, kind: impl Into<String>, gvr: Gvr) -> &mut Self {
        self.register(kind, move |probe, object| {
            let gvr = gvr.clone();
            Box::pin(async move {
                probe
                    .get_custom_resource(&gvr, &object.namespace, &object.name)
                    .await
                    .map(drop)
            })
        })
    }

    /// Whether `kind` has a lookup
    pub fn is_registered(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered kinds in sorted order
    pub fn registered_kinds(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Run the lookup for `object`; `None` if its kind is unregistered
    pub fn lookup<'a>(
        &self,
        probe: &'a dyn ClusterResourceProbe,
        object: &'a K8sObject,
    ) -> Option<LookupFuture<'a>> {
        self.handlers
            .get(&object.kind)
            .map(|handler| handler(probe, object))
    }
}

impl fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindRegistry")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
