use crate::features::observability::repo::ObservabilityRepository;
use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use bundlevisor_supervisor::FleetReport;
use std::sync::Arc;

pub struct ObservabilityService {
    repo: Arc<ObservabilityRepository>,
}

impl ObservabilityService {
    pub fn new(repo: Arc<ObservabilityRepository>) -> Self {
        Self { repo }
    }

    pub fn set_running_instances(&self, count: usize) {
        self.repo.set_running_instances(count as f64);
    }

    pub fn record_start(&self, started: bool) {
        self.repo
            .inc_instance_start(if started { "started" } else { "failed" });
    }

    pub fn record_quota_denied(&self) {
        self.repo.inc_quota_denied();
    }

    pub fn record_fleet_report(&self, report: &FleetReport) {
        for result in &report.results {
            self.repo.inc_fleet_command(result.outcome.label());
        }
    }

    pub fn render_metrics(&self) -> ControlPlaneResult<String> {
        self.repo
            .render_metrics()
            .map_err(ControlPlaneError::StorageError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ObservabilityService {
        ObservabilityService::new(Arc::new(ObservabilityRepository::new().unwrap()))
    }

    #[test]
    fn test_metrics_render_contains_known_metric_names() {
        let service = service();
        service.set_running_instances(2);
        service.record_start(true);
        service.record_start(false);
        service.record_quota_denied();

        let rendered = service.render_metrics().unwrap();
        assert!(rendered.contains("bundlevisor_running_instances 2"));
        assert!(rendered.contains("bundlevisor_instance_start_total{outcome=\"started\"} 1"));
        assert!(rendered.contains("bundlevisor_instance_start_total{outcome=\"failed\"} 1"));
        assert!(rendered.contains("bundlevisor_quota_denied_total 1"));
    }

    #[test]
    fn test_registries_are_independent() {
        let first = service();
        let second = service();
        first.record_quota_denied();

        let rendered = second.render_metrics().unwrap();
        assert!(rendered.contains("bundlevisor_quota_denied_total 0"));
    }
}
