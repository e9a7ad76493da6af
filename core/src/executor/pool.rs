use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::BuildError;
use crate::graph::Cluster;
use crate::operator::OperatorRegistry;

use super::cluster::ClusterRuntime;

/// Reusable runtimes of one cluster. Checkout is exclusive; the guard returns the runtime.
pub struct ClusterPool {
    cluster: Arc<Cluster>,
    registry: Arc<OperatorRegistry>,
    idle: Mutex<Vec<ClusterRuntime>>,
}

impl ClusterPool {
    /// Builds `pool_size` runtimes up front so operator setup errors surface at load time.
    pub(crate) fn new(
        cluster: Arc<Cluster>,
        registry: Arc<OperatorRegistry>,
    ) -> Result<Arc<Self>, BuildError> {
        let mut idle = Vec::with_capacity(cluster.pool_size());
        for _ in 0..cluster.pool_size() {
            idle.push(ClusterRuntime::build(&cluster, &registry)?);
        }
        Ok(Arc::new(Self {
            cluster,
            registry,
            idle: Mutex::new(idle),
        }))
    }

    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(crate) fn checkout(self: &Arc<Self>) -> Result<PooledCluster, BuildError> {
        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let runtime = match pooled {
            Some(runtime) => runtime,
            None => {
                tracing::debug!(cluster = %self.cluster.name(), "cluster pool empty, building runtime");
                ClusterRuntime::build(&self.cluster, &self.registry)?
            }
        };
        Ok(PooledCluster {
            pool: self.clone(),
            runtime,
        })
    }
}

impl fmt::Debug for ClusterPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterPool")
            .field("cluster", &self.cluster.name())
            .field("idle", &self.idle_count())
            .finish()
    }
}

/// Exclusive handle on a checked-out cluster runtime; reset and returned on drop.
pub(crate) struct PooledCluster {
    pool: Arc<ClusterPool>,
    runtime: ClusterRuntime,
}

impl Deref for PooledCluster {
    type Target = ClusterRuntime;

    fn deref(&self) -> &ClusterRuntime {
        &self.runtime
    }
}

impl Drop for PooledCluster {
    fn drop(&mut self) {
        self.runtime.reset();
        self.pool
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.runtime.clone());
    }
}
