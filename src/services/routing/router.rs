use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::api::middleware::AppError;
use crate::models::{DataSourceKey, InvocationDescriptor};

pub const ROUND_ROBIN: &str = "round-robin";
pub const RANDOM: &str = "random";
pub const WEIGHTED_RANDOM: &str = "weighted-random";

/// Load-balancing strategy picking one key among a group's candidates
pub trait DataSourceKeyRouter: Send + Sync {
    /// Unique name the allocation table refers to
    fn name(&self) -> &str;

    /// Pick one key; an empty candidate set is a routing error
    fn select(
        &self,
        candidates: &[DataSourceKey],
        invocation: &InvocationDescriptor,
    ) -> Result<DataSourceKey, AppError>;
}

fn ensure_candidates(router: &str, candidates: &[DataSourceKey], invocation: &InvocationDescriptor) -> Result<(), AppError> {
    if candidates.is_empty() {
        return Err(AppError::Routing(format!(
            "router {} has no candidate datasource for {}",
            router, invocation.operation
        )));
    }
    Ok(())
}

/// Rotates through candidates; the cursor advances exactly once per call
pub struct RoundRobinRouter {
    name: String,
    cursor: AtomicUsize,
}

impl RoundRobinRouter {
    pub fn new() -> Self {
        Self::named(ROUND_ROBIN)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSourceKeyRouter for RoundRobinRouter {
    fn name(&self) -> &str {
        &self.name
    }

    fn select(
        &self,
        candidates: &[DataSourceKey],
        invocation: &InvocationDescriptor,
    ) -> Result<DataSourceKey, AppError> {
        ensure_candidates(&self.name, candidates, invocation)?;
        let position = self.cursor.fetch_add(1, Ordering::Relaxed);
        Ok(candidates[position % candidates.len()].clone())
    }
}

/// Uniform random choice
pub struct RandomRouter {
    name: String,
}

impl RandomRouter {
    pub fn new() -> Self {
        Self::named(RANDOM)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for RandomRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSourceKeyRouter for RandomRouter {
    fn name(&self) -> &str {
        &self.name
    }

    fn select(
        &self,
        candidates: &[DataSourceKey],
        invocation: &InvocationDescriptor,
    ) -> Result<DataSourceKey, AppError> {
        ensure_candidates(&self.name, candidates, invocation)?;
        let index = rand::thread_rng().gen_range(0..candidates.len());
        Ok(candidates[index].clone())
    }
}

/// Random choice proportional to each key's configured weight.
///
/// Keys without a configured weight count as weight 1.
pub struct WeightedRandomRouter {
    name: String,
    weights: HashMap<String, u32>,
}

impl WeightedRandomRouter {
    pub fn new(weights: HashMap<String, u32>) -> Self {
        Self::named(WEIGHTED_RANDOM, weights)
    }

    pub fn named(name: impl Into<String>, weights: HashMap<String, u32>) -> Self {
        Self {
            name: name.into(),
            weights,
        }
    }

    fn weight_of(&self, key: &DataSourceKey) -> u64 {
        u64::from(self.weights.get(key.id()).copied().unwrap_or(1))
    }

    /// Running totals of the candidates' weights
    fn cumulative_weights(&self, candidates: &[DataSourceKey]) -> Vec<u64> {
        candidates
            .iter()
            .scan(0u64, |total, key| {
                *total += self.weight_of(key);
                Some(*total)
            })
            .collect()
    }

    fn pick(cumulative: &[u64], point: u64) -> usize {
        cumulative.partition_point(|&bound| bound <= point)
    }
}

impl DataSourceKeyRouter for WeightedRandomRouter {
    fn name(&self) -> &str {
        &self.name
    }

    fn select(
        &self,
        candidates: &[DataSourceKey],
        invocation: &InvocationDescriptor,
    ) -> Result<DataSourceKey, AppError> {
        ensure_candidates(&self.name, candidates, invocation)?;
        let cumulative = self.cumulative_weights(candidates);
        let total = cumulative.last().copied().unwrap_or(0);
        if total == 0 {
            return Err(AppError::Routing(format!(
                "router {} found only zero-weight candidates",
                self.name
            )));
        }
        let point = rand::thread_rng().gen_range(0..total);
        Ok(candidates[Self::pick(&cumulative, point)].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataSourceRole;
    use std::sync::Mutex;

    fn replicas(n: usize) -> Vec<DataSourceKey> {
        (1..=n)
            .map(|i| DataSourceKey::new("orders", format!("orders-replica-{}", i), DataSourceRole::Replica))
            .collect()
    }

    #[test]
    fn test_round_robin_sequential_distribution() {
        let router = RoundRobinRouter::new();
        let candidates = replicas(3);
        let invocation = InvocationDescriptor::new("findOrder");

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..10 {
            let key = router.select(&candidates, &invocation).unwrap();
            *counts.entry(key.id().to_string()).or_default() += 1;
        }

        // 10 calls over 3 candidates: each picked 3 or 4 times
        for key in &candidates {
            let count = counts[key.id()];
            assert!(count == 3 || count == 4, "{} picked {} times", key, count);
        }
        assert_eq!(counts["orders-replica-1"], 4);
    }

    #[test]
    fn test_round_robin_concurrent_callers() {
        let router = RoundRobinRouter::new();
        let candidates = replicas(4);
        let counts = Mutex::new(HashMap::<String, usize>::new());

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let invocation = InvocationDescriptor::new("findOrder");
                    for _ in 0..250 {
                        let key = router.select(&candidates, &invocation).unwrap();
                        *counts.lock().unwrap().entry(key.id().to_string()).or_default() += 1;
                    }
                });
            }
        });

        // 2000 calls, no lost or duplicated cursor values: exactly 500 each
        let counts = counts.into_inner().unwrap();
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&c| c == 500));
        assert_eq!(router.cursor.load(Ordering::SeqCst), 2000);
    }

    #[test]
    fn test_empty_candidates_fail() {
        let invocation = InvocationDescriptor::new("findOrder");
        let routers: Vec<Box<dyn DataSourceKeyRouter>> = vec![
            Box::new(RoundRobinRouter::new()),
            Box::new(RandomRouter::new()),
            Box::new(WeightedRandomRouter::new(HashMap::new())),
        ];
        for router in routers {
            assert!(matches!(
                router.select(&[], &invocation),
                Err(AppError::Routing(_))
            ));
        }
    }

    #[test]
    fn test_random_stays_within_candidates() {
        let router = RandomRouter::new();
        let candidates = replicas(2);
        let invocation = InvocationDescriptor::new("findOrder");
        for _ in 0..50 {
            let key = router.select(&candidates, &invocation).unwrap();
            assert!(candidates.contains(&key));
        }
    }

    #[test]
    fn test_weighted_pick_boundaries() {
        let mut weights = HashMap::new();
        weights.insert("orders-replica-1".to_string(), 1);
        weights.insert("orders-replica-2".to_string(), 3);
        let router = WeightedRandomRouter::new(weights);
        let candidates = replicas(2);

        let cumulative = router.cumulative_weights(&candidates);
        assert_eq!(cumulative, vec![1, 4]);
        assert_eq!(WeightedRandomRouter::pick(&cumulative, 0), 0);
        assert_eq!(WeightedRandomRouter::pick(&cumulative, 1), 1);
        assert_eq!(WeightedRandomRouter::pick(&cumulative, 3), 1);
    }

    #[test]
    fn test_weighted_zero_weight_never_picked() {
        let mut weights = HashMap::new();
        weights.insert("orders-replica-1".to_string(), 0);
        let router = WeightedRandomRouter::new(weights);
        let candidates = replicas(2);
        let invocation = InvocationDescriptor::new("findOrder");
        for _ in 0..50 {
            let key = router.select(&candidates, &invocation).unwrap();
            assert_eq!(key.id(), "orders-replica-2");
        }
    }
}
