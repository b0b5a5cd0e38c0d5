use std::sync::Arc;

use super::middleware::ApiAuthenticator;
use crate::health::HealthEngine;
use crate::logs::LogManager;
use crate::metrics::{DaemonMetrics, PrometheusExporter};
use crate::registry::TargetRegistry;
use crate::supervisor::ProcessSupervisor;

/// Shared handles for API handlers. Every field is a cheap clone.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<dyn TargetRegistry>,
    pub health: Arc<HealthEngine>,
    pub supervisor: Arc<ProcessSupervisor>,
    pub logs: Arc<LogManager>,
    pub metrics: Arc<DaemonMetrics>,
    pub exporter: Arc<PrometheusExporter>,
    pub auth: Arc<ApiAuthenticator>,
}

impl ApiState {
    pub fn new(
        registry: Arc<dyn TargetRegistry>,
        health: Arc<HealthEngine>,
        supervisor: Arc<ProcessSupervisor>,
        logs: Arc<LogManager>,
        auth: ApiAuthenticator,
    ) -> Self {
        let metrics = Arc::new(DaemonMetrics::new());
        let exporter = Arc::new(PrometheusExporter::new(
            Arc::clone(&metrics),
            Arc::clone(&health),
            Arc::clone(&supervisor),
            Arc::clone(&logs),
        ));
        Self {
            registry,
            health,
            supervisor,
            logs,
            metrics,
            exporter,
            auth: Arc::new(auth),
        }
    }
}
