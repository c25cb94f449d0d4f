//! Zero-downtime deployment controller.
//!
//! A strategy-parameterised state machine: traffic only moves after
//! health gates pass, every step lands on the observable event stream,
//! and a failure rolls the fleet back when configured. One controller
//! runs one deployment at a time; a completed run leaves the new fleet
//! in place for the next.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    DeploymentConfig, DeploymentEvent, DeploymentResult, DeploymentStats, DeploymentStatus,
    DeploymentStrategy, InstanceStatus, ServiceInstance,
};

/// Gradual traffic steps used by the rolling strategy.
const TRAFFIC_STEPS: [u8; 4] = [25, 50, 75, 100];

/// Traffic share a canary receives while under observation.
const CANARY_TRAFFIC_PERCENT: u8 = 10;

/// Event stream capacity.
const EVENT_CAPACITY: usize = 1024;

/// Probes whether an instance is serving.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, instance: &ServiceInstance) -> DomainResult<bool>;
}

/// Probe for environments without a real health endpoint.
pub struct AlwaysHealthy;

#[async_trait]
impl HealthProbe for AlwaysHealthy {
    async fn check(&self, _instance: &ServiceInstance) -> DomainResult<bool> {
        Ok(true)
    }
}

/// Cloneable handle for request accounting; safe to use from traffic
/// paths while a deployment runs.
#[derive(Clone, Default)]
pub struct RequestTracker {
    total: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl RequestTracker {
    pub fn track(&self, success: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> (u64, u64) {
        (
            self.total.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
        )
    }

    fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }
}

pub struct DeploymentController {
    config: DeploymentConfig,
    probe: Arc<dyn HealthProbe>,
    events: broadcast::Sender<DeploymentEvent>,
    requests: RequestTracker,
    current_instances: Vec<ServiceInstance>,
    /// Instances started by the in-flight run, kept for rollback.
    staged_instances: Vec<ServiceInstance>,
    current_version: Option<String>,
    next_port: u16,
    total_deployments: u64,
    failed_deployments: u64,
}

impl DeploymentController {
    pub fn new(config: DeploymentConfig, probe: Arc<dyn HealthProbe>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            probe,
            events,
            requests: RequestTracker::default(),
            current_instances: Vec::new(),
            staged_instances: Vec::new(),
            current_version: None,
            next_port: 8000,
            total_deployments: 0,
            failed_deployments: 0,
        }
    }

    /// Observe the deployment event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<DeploymentEvent> {
        self.events.subscribe()
    }

    /// Request accounting handle for traffic paths.
    pub fn request_tracker(&self) -> RequestTracker {
        self.requests.clone()
    }

    /// Record one request outcome against the live fleet.
    pub fn track_request(&self, success: bool) {
        self.requests.track(success);
    }

    pub fn current_instances(&self) -> &[ServiceInstance] {
        &self.current_instances
    }

    pub fn stats(&self) -> DeploymentStats {
        DeploymentStats::compute(self.total_deployments, self.failed_deployments)
    }

    fn emit(&self, event: DeploymentEvent) {
        let _ = self.events.send(event);
    }

    fn emit_status(&self, id: Uuid, status: DeploymentStatus) {
        self.emit(DeploymentEvent::DeploymentStatus { id, status });
    }

    /// Run one deployment to the given version. Never throws: failures
    /// come back as a failed result with the error recorded.
    pub async fn deploy(&mut self, version: &str, strategy: DeploymentStrategy) -> DeploymentResult {
        let id = Uuid::new_v4();
        let started = Instant::now();
        self.total_deployments += 1;
        self.requests.reset();

        self.emit(DeploymentEvent::DeploymentStarted {
            id,
            version: version.to_string(),
        });
        self.emit(DeploymentEvent::DeploymentStrategy { id, strategy });
        self.emit_status(id, DeploymentStatus::Pending);
        self.emit_status(id, DeploymentStatus::InProgress);

        info!(deployment_id = %id, version, strategy = strategy.as_str(), "deployment started");

        let old_instances = self.current_instances.clone();
        self.staged_instances.clear();
        let run = match strategy {
            DeploymentStrategy::BlueGreen => self.run_blue_green(id, version).await,
            DeploymentStrategy::Rolling => self.run_rolling(id, version).await,
            DeploymentStrategy::Canary => self.run_canary(id, version).await,
        };

        let (total_requests, failed_requests) = self.requests.snapshot();
        let deployment_time_ms = started.elapsed().as_millis() as u64;

        match run {
            Ok(new_instances) => {
                self.staged_instances.clear();
                self.current_instances = new_instances;
                self.current_version = Some(version.to_string());
                self.emit_status(id, DeploymentStatus::Completed);
                self.emit(DeploymentEvent::DeploymentCompleted {
                    id,
                    version: version.to_string(),
                    duration_ms: deployment_time_ms,
                });
                info!(deployment_id = %id, version, "deployment completed");
                DeploymentResult {
                    success: failed_requests == 0,
                    final_status: DeploymentStatus::Completed,
                    failed_requests,
                    total_requests,
                    deployment_time_ms,
                    error: None,
                }
            }
            Err(err) => {
                self.failed_deployments += 1;
                warn!(deployment_id = %id, error = %err, "deployment failed");
                if self.config.rollback_on_failure {
                    self.rollback(id, &old_instances);
                }
                self.emit_status(id, DeploymentStatus::Failed);
                self.emit(DeploymentEvent::DeploymentFailed {
                    id,
                    error: err.to_string(),
                });
                DeploymentResult {
                    success: false,
                    final_status: DeploymentStatus::Failed,
                    failed_requests,
                    total_requests,
                    deployment_time_ms,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    /// Start a full new fleet, flip traffic once everything is healthy,
    /// stop the old fleet.
    async fn run_blue_green(
        &mut self,
        id: Uuid,
        version: &str,
    ) -> DomainResult<Vec<ServiceInstance>> {
        let mut new_instances = Vec::with_capacity(self.config.instance_count);
        for _ in 0..self.config.instance_count {
            new_instances.push(self.start_instance(version));
        }

        self.emit_status(id, DeploymentStatus::HealthCheck);
        for instance in &mut new_instances {
            Self::await_healthy(&self.config, &self.probe, &self.events, instance).await?;
        }

        self.emit_status(id, DeploymentStatus::TrafficShift);
        self.switch_traffic(version);

        let old: Vec<ServiceInstance> = self.current_instances.drain(..).collect();
        for mut instance in old {
            self.stop_instance(&mut instance);
        }

        Ok(new_instances)
    }

    /// Replace the fleet one instance at a time with gradual traffic
    /// shifts. An empty fleet runs a single cycle with one instance.
    async fn run_rolling(
        &mut self,
        id: Uuid,
        version: &str,
    ) -> DomainResult<Vec<ServiceInstance>> {
        let old: Vec<ServiceInstance> = self.current_instances.drain(..).collect();
        let cycles = old.len().max(1);
        let mut new_instances = Vec::with_capacity(cycles);
        let mut old_iter = old.into_iter();

        for _ in 0..cycles {
            let mut instance = self.start_instance(version);
            self.emit_status(id, DeploymentStatus::HealthCheck);
            Self::await_healthy(&self.config, &self.probe, &self.events, &mut instance).await?;

            self.emit_status(id, DeploymentStatus::TrafficShift);
            self.emit(DeploymentEvent::TrafficShifting {
                version: version.to_string(),
            });
            for percent in TRAFFIC_STEPS {
                self.emit(DeploymentEvent::TrafficPercentage {
                    version: version.to_string(),
                    percent,
                });
                sleep(Duration::from_millis(self.config.traffic_shift_delay_ms)).await;
            }

            if let Some(mut retired) = old_iter.next() {
                self.stop_instance(&mut retired);
            }
            new_instances.push(instance);
        }

        Ok(new_instances)
    }

    /// One canary at a small traffic share under observation, then the
    /// blue-green flow for the wider rollout.
    async fn run_canary(
        &mut self,
        id: Uuid,
        version: &str,
    ) -> DomainResult<Vec<ServiceInstance>> {
        let mut canary = self.start_instance(version);
        self.emit_status(id, DeploymentStatus::HealthCheck);
        Self::await_healthy(&self.config, &self.probe, &self.events, &mut canary).await?;

        self.emit_status(id, DeploymentStatus::TrafficShift);
        self.emit(DeploymentEvent::TrafficPercentage {
            version: version.to_string(),
            percent: CANARY_TRAFFIC_PERCENT,
        });

        sleep(Duration::from_millis(self.config.canary_monitor_ms)).await;

        let still_healthy = self.probe.check(&canary).await.unwrap_or(false);
        if !still_healthy {
            canary.status = InstanceStatus::Unhealthy;
            self.stop_instance(&mut canary);
            return Err(DomainError::Degraded(format!(
                "canary for {version} degraded during observation"
            )));
        }

        self.stop_instance(&mut canary);
        self.run_blue_green(id, version).await
    }

    fn start_instance(&mut self, version: &str) -> ServiceInstance {
        let port = self.next_port;
        self.next_port = self.next_port.wrapping_add(1).max(8000);
        let instance = ServiceInstance::start(version, port);
        self.emit(DeploymentEvent::InstanceStarting {
            instance_id: instance.id,
            version: version.to_string(),
            port,
        });
        self.staged_instances.push(instance.clone());
        instance
    }

    fn stop_instance(&self, instance: &mut ServiceInstance) {
        instance.status = InstanceStatus::Stopping;
        self.emit(DeploymentEvent::InstanceStopping {
            instance_id: instance.id,
        });
        instance.status = InstanceStatus::Stopped;
        self.emit(DeploymentEvent::InstanceStopped {
            instance_id: instance.id,
        });
    }

    fn switch_traffic(&self, to_version: &str) {
        self.emit(DeploymentEvent::TrafficSwitching {
            from_version: self.current_version.clone(),
            to_version: to_version.to_string(),
        });
        self.emit(DeploymentEvent::TrafficSwitched {
            version: to_version.to_string(),
        });
    }

    /// Attempt the health gate with a fixed backoff; the final failure
    /// marks the instance unhealthy and raises.
    async fn await_healthy(
        config: &DeploymentConfig,
        probe: &Arc<dyn HealthProbe>,
        events: &broadcast::Sender<DeploymentEvent>,
        instance: &mut ServiceInstance,
    ) -> DomainResult<()> {
        for attempt in 1..=config.health_check_retries {
            let _ = events.send(DeploymentEvent::HealthCheckAttempt {
                instance_id: instance.id,
                attempt,
            });
            match probe.check(instance).await {
                Ok(true) => {
                    instance.status = InstanceStatus::Healthy;
                    let _ = events.send(DeploymentEvent::HealthCheckSuccess {
                        instance_id: instance.id,
                    });
                    let _ = events.send(DeploymentEvent::InstanceStarted {
                        instance_id: instance.id,
                        version: instance.version.clone(),
                    });
                    return Ok(());
                }
                Ok(false) | Err(_) if attempt < config.health_check_retries => {
                    sleep(Duration::from_millis(config.health_check_interval_ms)).await;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(instance_id = %instance.id, error = %err, "health probe errored");
                }
            }
        }

        instance.status = InstanceStatus::Unhealthy;
        let _ = events.send(DeploymentEvent::HealthCheckFailed {
            instance_id: instance.id,
            attempts: config.health_check_retries,
        });
        Err(DomainError::Degraded(format!(
            "instance {} failed health checks",
            instance.id
        )))
    }

    /// Stop anything the failed run started and restore the previous
    /// fleet, bringing stopped old instances back to healthy.
    fn rollback(&mut self, id: Uuid, old_instances: &[ServiceInstance]) {
        self.emit(DeploymentEvent::RollbackStarted { id });

        let staged: Vec<ServiceInstance> = self.staged_instances.drain(..).collect();
        for mut instance in staged {
            self.stop_instance(&mut instance);
        }
        self.current_instances.clear();

        self.current_instances = old_instances
            .iter()
            .cloned()
            .map(|mut instance| {
                if instance.status == InstanceStatus::Stopped {
                    instance.status = InstanceStatus::Healthy;
                }
                instance
            })
            .collect();

        self.emit(DeploymentEvent::RollbackCompleted { id });
        info!(deployment_id = %id, restored = self.current_instances.len(), "rollback completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VersionedProbe;

    #[async_trait]
    impl HealthProbe for VersionedProbe {
        async fn check(&self, instance: &ServiceInstance) -> DomainResult<bool> {
            Ok(!instance.version.contains("bad"))
        }
    }

    fn fast_config() -> DeploymentConfig {
        DeploymentConfig {
            instance_count: 2,
            health_check_retries: 2,
            health_check_interval_ms: 1,
            traffic_shift_delay_ms: 1,
            canary_monitor_ms: 1,
            rollback_on_failure: true,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<DeploymentEvent>) -> Vec<DeploymentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn blue_green_completes_with_zero_drops() {
        let mut controller =
            DeploymentController::new(fast_config(), Arc::new(VersionedProbe));
        let mut rx = controller.subscribe();
        let tracker = controller.request_tracker();

        let traffic = tokio::spawn(async move {
            for _ in 0..100 {
                tracker.track(true);
            }
        });

        let result = controller
            .deploy("v1.0.0", DeploymentStrategy::BlueGreen)
            .await;
        traffic.await.unwrap();

        assert!(result.success);
        assert_eq!(result.final_status, DeploymentStatus::Completed);
        assert_eq!(result.failed_requests, 0);
        assert_eq!(controller.current_instances().len(), 2);
        assert!(controller
            .current_instances()
            .iter()
            .all(|i| i.is_healthy() && i.version == "v1.0.0"));

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, DeploymentEvent::DeploymentStarted { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            DeploymentEvent::DeploymentStrategy {
                strategy: DeploymentStrategy::BlueGreen,
                ..
            }
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, DeploymentEvent::InstanceStarted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, DeploymentEvent::TrafficSwitched { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, DeploymentEvent::DeploymentCompleted { .. })));
    }

    #[tokio::test]
    async fn failed_health_checks_roll_back() {
        let mut controller =
            DeploymentController::new(fast_config(), Arc::new(VersionedProbe));

        let good = controller
            .deploy("v1.0.0", DeploymentStrategy::BlueGreen)
            .await;
        assert!(good.success);
        let healthy_fleet: Vec<Uuid> =
            controller.current_instances().iter().map(|i| i.id).collect();

        let mut rx = controller.subscribe();
        let bad = controller
            .deploy("v2.0.0-bad", DeploymentStrategy::BlueGreen)
            .await;
        assert!(!bad.success);
        assert_eq!(bad.final_status, DeploymentStatus::Failed);
        assert!(bad.error.is_some());

        // The previous fleet is back and healthy.
        let restored: Vec<Uuid> =
            controller.current_instances().iter().map(|i| i.id).collect();
        assert_eq!(restored, healthy_fleet);
        assert!(controller.current_instances().iter().all(|i| i.is_healthy()));

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, DeploymentEvent::HealthCheckFailed { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, DeploymentEvent::RollbackStarted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, DeploymentEvent::RollbackCompleted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, DeploymentEvent::DeploymentFailed { .. })));
    }

    #[tokio::test]
    async fn rolling_replaces_the_fleet_gradually() {
        let mut controller =
            DeploymentController::new(fast_config(), Arc::new(VersionedProbe));
        controller
            .deploy("v1.0.0", DeploymentStrategy::BlueGreen)
            .await;

        let mut rx = controller.subscribe();
        let result = controller
            .deploy("v1.1.0", DeploymentStrategy::Rolling)
            .await;
        assert!(result.success);
        assert!(controller
            .current_instances()
            .iter()
            .all(|i| i.version == "v1.1.0"));

        let percentages: Vec<u8> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                DeploymentEvent::TrafficPercentage { percent, .. } => Some(percent),
                _ => None,
            })
            .collect();
        // Two old instances → two full shift ladders.
        assert_eq!(percentages, vec![25, 50, 75, 100, 25, 50, 75, 100]);
    }

    #[tokio::test]
    async fn rolling_on_empty_fleet_runs_single_cycle() {
        let mut controller =
            DeploymentController::new(fast_config(), Arc::new(VersionedProbe));
        let result = controller
            .deploy("v1.0.0", DeploymentStrategy::Rolling)
            .await;
        assert!(result.success);
        assert_eq!(controller.current_instances().len(), 1);
    }

    #[tokio::test]
    async fn canary_routes_small_share_then_continues() {
        let mut controller =
            DeploymentController::new(fast_config(), Arc::new(VersionedProbe));
        let mut rx = controller.subscribe();

        let result = controller
            .deploy("v1.0.0", DeploymentStrategy::Canary)
            .await;
        assert!(result.success);
        assert_eq!(controller.current_instances().len(), 2);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            DeploymentEvent::TrafficPercentage {
                percent: CANARY_TRAFFIC_PERCENT,
                ..
            }
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, DeploymentEvent::TrafficSwitched { .. })));
    }

    #[tokio::test]
    async fn dropped_requests_spoil_success() {
        let mut controller =
            DeploymentController::new(fast_config(), Arc::new(VersionedProbe));
        let tracker = controller.request_tracker();
        let traffic = tokio::spawn(async move {
            tracker.track(true);
            tracker.track(false);
        });

        let result = controller
            .deploy("v1.0.0", DeploymentStrategy::BlueGreen)
            .await;
        traffic.await.unwrap();

        // The fleet cut over, but a dropped request voids the
        // zero-downtime claim.
        assert_eq!(result.final_status, DeploymentStatus::Completed);
        assert!(!result.success);
        assert_eq!(result.failed_requests, 1);
    }

    #[tokio::test]
    async fn stats_track_sequential_deployments() {
        let mut controller =
            DeploymentController::new(fast_config(), Arc::new(VersionedProbe));
        assert!((controller.stats().success_rate - 100.0).abs() < f64::EPSILON);

        controller
            .deploy("v1.0.0", DeploymentStrategy::BlueGreen)
            .await;
        controller
            .deploy("v2.0.0-bad", DeploymentStrategy::BlueGreen)
            .await;
        controller
            .deploy("v3.0.0", DeploymentStrategy::BlueGreen)
            .await;

        let stats = controller.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.failed, 1);
        assert!((stats.success_rate - (2.0 / 3.0 * 100.0)).abs() < 1e-9);
        assert!(controller
            .current_instances()
            .iter()
            .all(|i| i.version == "v3.0.0"));
    }
}
