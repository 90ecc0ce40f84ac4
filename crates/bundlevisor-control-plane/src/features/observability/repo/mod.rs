use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, Registry, TextEncoder};

pub struct ObservabilityRepository {
    registry: Registry,
    running_instances: Gauge,
    instance_start_total: CounterVec,
    quota_denied_total: Counter,
    fleet_command_total: CounterVec,
}

impl ObservabilityRepository {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();

        let running_instances = Gauge::with_opts(opts!(
            "bundlevisor_running_instances",
            "Instances with a live child process"
        ))
        .map_err(|e| e.to_string())?;
        let instance_start_total = CounterVec::new(
            opts!(
                "bundlevisor_instance_start_total",
                "Instance start attempts by outcome"
            ),
            &["outcome"],
        )
        .map_err(|e| e.to_string())?;
        let quota_denied_total = Counter::with_opts(opts!(
            "bundlevisor_quota_denied_total",
            "Uploads rejected by the quota enforcer"
        ))
        .map_err(|e| e.to_string())?;
        let fleet_command_total = CounterVec::new(
            opts!(
                "bundlevisor_fleet_command_total",
                "Per-bundle fleet command executions by outcome"
            ),
            &["outcome"],
        )
        .map_err(|e| e.to_string())?;

        registry
            .register(Box::new(running_instances.clone()))
            .map_err(|e| e.to_string())?;
        registry
            .register(Box::new(instance_start_total.clone()))
            .map_err(|e| e.to_string())?;
        registry
            .register(Box::new(quota_denied_total.clone()))
            .map_err(|e| e.to_string())?;
        registry
            .register(Box::new(fleet_command_total.clone()))
            .map_err(|e| e.to_string())?;

        Ok(Self {
            registry,
            running_instances,
            instance_start_total,
            quota_denied_total,
            fleet_command_total,
        })
    }

    pub fn set_running_instances(&self, count: f64) {
        self.running_instances.set(count);
    }

    pub fn inc_instance_start(&self, outcome: &str) {
        self.instance_start_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_quota_denied(&self) {
        self.quota_denied_total.inc();
    }

    pub fn inc_fleet_command(&self, outcome: &str) {
        self.fleet_command_total.with_label_values(&[outcome]).inc();
    }

    pub fn render_metrics(&self) -> Result<String, String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| e.to_string())?;
        String::from_utf8(buffer).map_err(|e| e.to_string())
    }
}
