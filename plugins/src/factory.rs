use anyhow::{Context, Result};

use dagflow_core::api::{
    start_events_out, EngineConfig, GraphStore, OperatorRegistry, RegistryError,
};

use crate::operators::{ExprOperator, NoopOperator, WhileOperator};

/// Register the expression, loop and no-op operators. Names the host already registered are
/// left alone, so a host can replace any built-in.
pub fn register_builtins(registry: &mut OperatorRegistry) -> Result<(), RegistryError> {
    if !registry.contains(ExprOperator::builder().name()) {
        registry.register(ExprOperator::builder())?;
    }
    if !registry.contains(WhileOperator::builder().name()) {
        registry.register(WhileOperator::builder())?;
    }
    if !registry.contains(NoopOperator::builder().name()) {
        registry.register(NoopOperator::builder())?;
    }
    Ok(())
}

/// Assemble a store from the engine config: built-ins, the optional events sink and every
/// configured cluster file.
pub async fn build_store(cfg: &EngineConfig, mut registry: OperatorRegistry) -> Result<GraphStore> {
    register_builtins(&mut registry)?;
    let events = start_events_out(&cfg.events_out)
        .await
        .with_context(|| format!("open events sink {}", cfg.events_out.path))?;
    let store = match events {
        Some(events) => GraphStore::with_events(registry, events),
        None => GraphStore::new(registry),
    };
    for path in &cfg.clusters {
        store
            .load_cluster_file(path)
            .with_context(|| format!("load cluster {}", path.display()))?;
    }
    Ok(store)
}
