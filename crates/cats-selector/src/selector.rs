//! Path selection: resolves one client request to one service instance.
//!
//! The selector reads the current snapshot, probes every instance of the
//! requested service concurrently (one task per instance), and ranks the
//! survivors by cost, then by total delay. The probe fan-out is bounded
//! by a request-level deadline so one unreachable instance cannot stall
//! the response.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use cats_core::config::SelectorSettings;
use cats_core::{Candidate, ClientRequest, Selection, SelectionResult, ServiceInstance};
use cats_probe::{NetProber, Prober};
use cats_state::SnapshotStore;

use crate::catalog::{ServiceCatalog, StaticCatalog};

/// The selector wired to real network probes.
pub type NetSelector = PathSelector<NetProber, StaticCatalog>;

/// Selects the best instance for a request from the current snapshot.
pub struct PathSelector<P, C> {
    store: SnapshotStore,
    prober: Arc<P>,
    catalog: C,
    settings: SelectorSettings,
}

impl NetSelector {
    /// Selector probing real instances as configured by `settings`.
    pub fn with_net_prober(store: SnapshotStore, catalog: StaticCatalog, settings: SelectorSettings) -> Self {
        let prober = NetProber::new(&settings);
        PathSelector::new(store, prober, catalog, settings)
    }
}

impl<P: Prober, C: ServiceCatalog> PathSelector<P, C> {
    pub fn new(store: SnapshotStore, prober: P, catalog: C, settings: SelectorSettings) -> Self {
        Self {
            store,
            prober: Arc::new(prober),
            catalog,
            settings,
        }
    }

    /// Resolve `request` to the best live, affordable instance.
    pub async fn select(&self, request: &ClientRequest) -> SelectionResult {
        let service_id = request.service_id.as_str();

        match self.catalog.is_registered(service_id).await {
            Ok(true) => {}
            Ok(false) => {
                info!(%service_id, "service not registered");
                return SelectionResult::NoCandidate;
            }
            Err(e) => {
                warn!(%service_id, error = %e, "selecting without catalog confirmation");
            }
        }

        let snapshot = self.store.read();
        let instances = snapshot.instances(service_id).to_vec();
        if instances.is_empty() {
            info!(%service_id, cycle = snapshot.cycle(), "no instances known for service");
            return SelectionResult::NoCandidate;
        }
        let known = instances.len();

        let mut candidates = self.probe_candidates(instances, request.max_accept_cost).await;
        if self.settings.enforce_max_delay {
            candidates.retain(|c| c.total_delay_ms <= request.max_accept_delay);
        }
        let ranked = rank_candidates(candidates);

        match ranked.first() {
            Some(best) => {
                let selection = Selection::from(best);
                info!(
                    %service_id,
                    address = %selection.address,
                    cost = selection.cost,
                    delay_ms = selection.delay_ms,
                    measured_delay_ms = best.measured_delay_ms,
                    delay_fallback = best.delay_fallback,
                    candidates = ranked.len(),
                    known,
                    "selected instance"
                );
                SelectionResult::Selected(selection)
            }
            None => {
                warn!(%service_id, known, "no instance satisfies the request");
                SelectionResult::NoCandidate
            }
        }
    }

    /// Probe every instance concurrently and return the candidates in
    /// snapshot order. Instances still being probed at the deadline are
    /// dropped.
    async fn probe_candidates(&self, instances: Vec<ServiceInstance>, max_accept_cost: i64) -> Vec<Candidate> {
        let budget = ProbeBudget::from(&self.settings);
        let mut tasks = JoinSet::new();
        for (idx, instance) in instances.into_iter().enumerate() {
            let prober = self.prober.clone();
            tasks.spawn(async move {
                let candidate = probe_instance(&*prober, instance, max_accept_cost, budget).await;
                (idx, candidate)
            });
        }

        let mut found: Vec<(usize, Candidate)> = Vec::new();
        let deadline = tokio::time::sleep(self.settings.request_deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((idx, Some(candidate)))) => found.push((idx, candidate)),
                    Some(Ok((_, None))) => {}
                    Some(Err(e)) => error!(error = %e, "instance probe task failed"),
                    None => break,
                },
                _ = &mut deadline => {
                    warn!(
                        pending = tasks.len(),
                        deadline_ms = self.settings.request_deadline.as_millis() as u64,
                        "selection deadline reached, dropping unfinished instances"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        found.sort_by_key(|(idx, _)| *idx);
        found.into_iter().map(|(_, c)| c).collect()
    }
}

/// Per-phase time limits for probing one instance.
#[derive(Debug, Clone, Copy)]
struct ProbeBudget {
    liveness_timeout: Duration,
    probe_timeout: Duration,
    default_delay_ms: u64,
}

impl From<&SelectorSettings> for ProbeBudget {
    fn from(settings: &SelectorSettings) -> Self {
        Self {
            liveness_timeout: settings.liveness_timeout,
            probe_timeout: settings.probe_timeout,
            default_delay_ms: settings.default_delay_ms,
        }
    }
}

/// Liveness, then constraints, then latency for one instance.
///
/// A liveness check that outlasts its timeout counts as dead; a latency
/// measurement that outlasts its timeout falls back to the default delay.
async fn probe_instance<P: Prober>(
    prober: &P,
    instance: ServiceInstance,
    max_accept_cost: i64,
    budget: ProbeBudget,
) -> Option<Candidate> {
    let alive = tokio::time::timeout(budget.liveness_timeout, prober.is_alive(&instance.address))
        .await
        .unwrap_or(false);
    if !alive {
        debug!(address = %instance.address, "instance unavailable");
        return None;
    }
    if !meets_constraints(&instance, max_accept_cost) {
        debug!(
            address = %instance.address,
            cost = instance.cost,
            capacity = instance.capacity,
            "instance filtered by constraints"
        );
        return None;
    }

    let measured = tokio::time::timeout(budget.probe_timeout, prober.network_delay(&instance.address))
        .await
        .ok()
        .flatten();
    let candidate = match measured {
        Some(measured) => Candidate::new(instance, measured, false),
        None => {
            warn!(
                address = %instance.address,
                default_delay_ms = budget.default_delay_ms,
                "all latency probes failed, using default delay"
            );
            Candidate::new(instance, budget.default_delay_ms, true)
        }
    };
    debug!(
        address = %candidate.instance.address,
        measured_delay_ms = candidate.measured_delay_ms,
        total_delay_ms = candidate.total_delay_ms,
        delay_fallback = candidate.delay_fallback,
        "candidate"
    );
    Some(candidate)
}

/// Cost within budget and at least one free slot.
pub fn meets_constraints(instance: &ServiceInstance, max_accept_cost: i64) -> bool {
    instance.cost <= max_accept_cost && instance.capacity > 0
}

/// Order candidates by cost, then total delay. The sort is stable, so
/// full ties keep their input order.
pub fn rank_candidates(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by_key(|c| (c.cost(), c.total_delay_ms));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use cats_state::Snapshot;

    use crate::catalog::CatalogError;

    #[derive(Default)]
    struct FakeProber {
        dead: HashSet<String>,
        hanging: HashSet<String>,
        delays: HashMap<String, u64>,
        liveness_lag: Option<Duration>,
        delay_lag: Option<Duration>,
        liveness_calls: AtomicUsize,
    }

    impl FakeProber {
        fn with_delay(mut self, address: &str, ms: u64) -> Self {
            self.delays.insert(address.to_string(), ms);
            self
        }

        fn with_dead(mut self, address: &str) -> Self {
            self.dead.insert(address.to_string());
            self
        }

        fn with_hanging(mut self, address: &str) -> Self {
            self.hanging.insert(address.to_string());
            self
        }

        fn with_lag(mut self, liveness: Duration, delay: Duration) -> Self {
            self.liveness_lag = Some(liveness);
            self.delay_lag = Some(delay);
            self
        }
    }

    impl Prober for FakeProber {
        async fn is_alive(&self, address: &str) -> bool {
            self.liveness_calls.fetch_add(1, Ordering::SeqCst);
            if self.hanging.contains(address) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if let Some(lag) = self.liveness_lag {
                tokio::time::sleep(lag).await;
            }
            !self.dead.contains(address)
        }

        async fn network_delay(&self, address: &str) -> Option<u64> {
            if let Some(lag) = self.delay_lag {
                tokio::time::sleep(lag).await;
            }
            self.delays.get(address).copied()
        }
    }

    struct DownCatalog;

    impl ServiceCatalog for DownCatalog {
        async fn is_registered(&self, _service_id: &str) -> Result<bool, CatalogError> {
            Err(CatalogError("connection refused".to_string()))
        }
    }

    fn inst(address: &str, cost: i64, capacity: u32, delay: u64) -> ServiceInstance {
        ServiceInstance {
            service_id: "S1".to_string(),
            address: address.to_string(),
            capacity,
            cost,
            base_delay_ms: delay,
        }
    }

    fn store_with(instances: Vec<ServiceInstance>) -> SnapshotStore {
        let store = SnapshotStore::new();
        store.replace(Snapshot::from_instances(1, instances));
        store
    }

    fn request(max_cost: i64) -> ClientRequest {
        ClientRequest {
            service_id: "S1".to_string(),
            max_accept_cost: max_cost,
            max_accept_delay: 30,
        }
    }

    fn selector<C: ServiceCatalog>(
        store: SnapshotStore,
        prober: FakeProber,
        catalog: C,
    ) -> PathSelector<FakeProber, C> {
        PathSelector::new(store, prober, catalog, SelectorSettings::default())
    }

    fn selected(result: SelectionResult) -> Selection {
        match result {
            SelectionResult::Selected(s) => s,
            SelectionResult::NoCandidate => panic!("expected a selection"),
        }
    }

    #[test]
    fn constraints_require_budget_and_capacity() {
        let instances = [
            inst("a:1", 5, 1, 0),
            inst("b:1", 10, 0, 0),
            inst("c:1", 15, 2, 0),
        ];
        let kept: Vec<&str> = instances
            .iter()
            .filter(|i| meets_constraints(i, 10))
            .map(|i| i.address.as_str())
            .collect();
        assert_eq!(kept, vec!["a:1"]);
    }

    #[test]
    fn rank_prefers_cost_then_delay_then_input_order() {
        let ranked = rank_candidates(vec![
            Candidate::new(inst("a:1", 5, 1, 20), 0, false),
            Candidate::new(inst("b:1", 5, 1, 10), 0, false),
            Candidate::new(inst("c:1", 3, 1, 90), 0, false),
            Candidate::new(inst("d:1", 5, 1, 10), 0, false),
        ]);
        let order: Vec<&str> = ranked.iter().map(|c| c.instance.address.as_str()).collect();
        assert_eq!(order, vec!["c:1", "b:1", "d:1", "a:1"]);
    }

    #[tokio::test]
    async fn filtering_keeps_only_affordable_instances_with_capacity() {
        let store = store_with(vec![
            inst("a:1", 5, 1, 8),
            inst("b:1", 10, 0, 1),
            inst("c:1", 15, 2, 1),
        ]);
        let prober = FakeProber::default()
            .with_delay("a:1", 2)
            .with_delay("b:1", 2)
            .with_delay("c:1", 2);
        let sel = selector(store, prober, StaticCatalog::open());

        let s = selected(sel.select(&request(10)).await);
        assert_eq!(s.address, "a:1");
        assert_eq!(s.cost, 5);
        assert_eq!(s.delay_ms, 10);
    }

    #[tokio::test]
    async fn equal_cost_picks_lower_total_delay() {
        let store = store_with(vec![inst("slow:1", 5, 1, 20), inst("fast:1", 5, 1, 10)]);
        let prober = FakeProber::default()
            .with_delay("slow:1", 0)
            .with_delay("fast:1", 0);
        let sel = selector(store, prober, StaticCatalog::open());

        let s = selected(sel.select(&request(10)).await);
        assert_eq!(s.address, "fast:1");
        assert_eq!(s.delay_ms, 10);
    }

    #[tokio::test]
    async fn measured_delay_can_reorder_equal_costs() {
        let store = store_with(vec![inst("near:1", 5, 1, 10), inst("far:1", 5, 1, 5)]);
        let prober = FakeProber::default()
            .with_delay("near:1", 1)
            .with_delay("far:1", 40);
        let sel = selector(store, prober, StaticCatalog::open());

        let s = selected(sel.select(&request(10)).await);
        assert_eq!(s.address, "near:1");
        assert_eq!(s.delay_ms, 11);
    }

    #[tokio::test]
    async fn dead_instances_are_excluded_even_if_cheapest() {
        let store = store_with(vec![inst("cheap:1", 1, 5, 1), inst("pricey:1", 9, 5, 1)]);
        let prober = FakeProber::default()
            .with_dead("cheap:1")
            .with_delay("pricey:1", 1);
        let sel = selector(store, prober, StaticCatalog::open());

        let s = selected(sel.select(&request(10)).await);
        assert_eq!(s.address, "pricey:1");
    }

    #[tokio::test]
    async fn every_instance_is_liveness_checked() {
        let store = store_with(vec![
            inst("a:1", 5, 1, 0),
            inst("b:1", 10, 0, 0),
            inst("c:1", 15, 2, 0),
        ]);
        let prober = FakeProber::default();
        let sel = selector(store, prober, StaticCatalog::open());
        sel.select(&request(10)).await;
        assert_eq!(sel.prober.liveness_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn no_live_qualifying_instance_is_no_candidate() {
        let store = store_with(vec![inst("a:1", 50, 1, 0), inst("b:1", 1, 1, 0)]);
        let prober = FakeProber::default().with_dead("b:1");
        let sel = selector(store, prober, StaticCatalog::open());
        assert_eq!(sel.select(&request(10)).await, SelectionResult::NoCandidate);
    }

    #[tokio::test]
    async fn unknown_service_is_no_candidate() {
        let sel = selector(SnapshotStore::new(), FakeProber::default(), StaticCatalog::open());
        let req = ClientRequest {
            service_id: "S9".to_string(),
            max_accept_cost: 100,
            max_accept_delay: 100,
        };
        assert_eq!(sel.select(&req).await, SelectionResult::NoCandidate);
    }

    #[tokio::test]
    async fn unregistered_service_is_no_candidate() {
        let store = store_with(vec![inst("a:1", 1, 1, 1)]);
        let catalog = StaticCatalog::new(["S2".to_string()]);
        let sel = selector(store, FakeProber::default().with_delay("a:1", 1), catalog);
        assert_eq!(sel.select(&request(10)).await, SelectionResult::NoCandidate);
    }

    #[tokio::test]
    async fn unreachable_catalog_does_not_block_selection() {
        let store = store_with(vec![inst("a:1", 1, 1, 1)]);
        let sel = selector(store, FakeProber::default().with_delay("a:1", 1), DownCatalog);
        assert!(sel.select(&request(10)).await.is_selected());
    }

    #[tokio::test]
    async fn failed_latency_probes_fall_back_to_default_delay() {
        let store = store_with(vec![inst("a:1", 3, 1, 7)]);
        let sel = selector(store, FakeProber::default(), StaticCatalog::open());

        let s = selected(sel.select(&request(10)).await);
        assert_eq!(s.address, "a:1");
        assert_eq!(s.delay_ms, 7 + SelectorSettings::default().default_delay_ms);
    }

    #[tokio::test]
    async fn max_delay_ignored_by_default() {
        let store = store_with(vec![inst("a:1", 3, 1, 100)]);
        let sel = selector(store, FakeProber::default().with_delay("a:1", 1), StaticCatalog::open());
        assert!(sel.select(&request(10)).await.is_selected());
    }

    #[tokio::test]
    async fn max_delay_enforced_when_configured() {
        let store = store_with(vec![inst("a:1", 1, 1, 100), inst("b:1", 4, 1, 10)]);
        let prober = FakeProber::default().with_delay("a:1", 1).with_delay("b:1", 1);
        let settings = SelectorSettings {
            enforce_max_delay: true,
            ..SelectorSettings::default()
        };
        let sel = PathSelector::new(store, prober, StaticCatalog::open(), settings);

        let s = selected(sel.select(&request(10)).await);
        assert_eq!(s.address, "b:1");
    }

    #[tokio::test]
    async fn deadline_drops_hanging_instances() {
        let store = store_with(vec![inst("stuck:1", 1, 1, 1), inst("ok:1", 5, 1, 1)]);
        let prober = FakeProber::default()
            .with_hanging("stuck:1")
            .with_delay("ok:1", 1);
        let settings = SelectorSettings {
            request_deadline: Duration::from_millis(200),
            ..SelectorSettings::default()
        };
        let sel = PathSelector::new(store, prober, StaticCatalog::open(), settings);

        let started = Instant::now();
        let s = selected(sel.select(&request(10)).await);
        assert_eq!(s.address, "ok:1");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn slow_but_alive_instance_falls_back_within_deadline() {
        let store = store_with(vec![inst("slow:1", 1, 1, 7)]);
        let prober = FakeProber::default()
            .with_delay("slow:1", 1)
            .with_lag(Duration::from_millis(1500), Duration::from_secs(3));
        let settings = SelectorSettings::default();
        let sel = PathSelector::new(store, prober, StaticCatalog::open(), settings.clone());

        let started = Instant::now();
        let s = selected(sel.select(&request(10)).await);
        assert_eq!(s.address, "slow:1");
        assert_eq!(s.delay_ms, 7 + settings.default_delay_ms);
        assert!(started.elapsed() < settings.request_deadline);
    }

    #[tokio::test]
    async fn liveness_past_its_timeout_counts_as_dead() {
        let store = store_with(vec![inst("slow:1", 1, 1, 1), inst("ok:1", 9, 1, 1)]);
        let prober = FakeProber::default()
            .with_hanging("slow:1")
            .with_delay("ok:1", 1);
        let settings = SelectorSettings {
            liveness_timeout: Duration::from_millis(100),
            probe_timeout: Duration::from_millis(100),
            ..SelectorSettings::default()
        };
        let sel = PathSelector::new(store, prober, StaticCatalog::open(), settings);

        let started = Instant::now();
        let s = selected(sel.select(&request(10)).await);
        assert_eq!(s.address, "ok:1");
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
