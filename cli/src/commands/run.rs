use std::time::{Duration, Instant};

use dagflow_core::api::{Cancellation, EngineConfig, ExecuteContext, OperatorRegistry, ParamValue, Params};
use dagflow_plugins::build_store;

use crate::error::CliError;

use super::cli::RunArgs;

/// Split a `KEY=VALUE` argument; the value is typed with `ParamValue::parse_literal`.
pub fn parse_kv(raw: &str) -> Result<(String, ParamValue), CliError> {
    let (k, v) = raw
        .split_once('=')
        .ok_or_else(|| CliError::Usage(format!("invalid --arg '{raw}' (expected KEY=VALUE)")))?;
    let key = k.trim();
    if key.is_empty() {
        return Err(CliError::Usage(format!("invalid --arg '{raw}' (empty key)")));
    }
    Ok((key.to_string(), ParamValue::parse_literal(v)))
}

pub async fn handle_run(args: RunArgs, cfg: &EngineConfig) -> Result<i32, CliError> {
    let params = Params::new();
    for raw in &args.args {
        let (key, value) = parse_kv(raw)?;
        params.set(key, value);
    }

    let store = build_store(cfg, OperatorRegistry::new())
        .await
        .map_err(|e| CliError::Config(format!("{e:#}")))?;
    let cluster = store
        .load_cluster_file(&args.file)
        .map_err(|source| CliError::Build {
            path: args.file.display().to_string(),
            source,
        })?;

    let cancel = match args.timeout_ms {
        Some(ms) => Cancellation::with_timeout(Duration::from_millis(ms)),
        None => Cancellation::new(),
    };
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    let bus = ExecuteContext::new();
    let started = Instant::now();
    let result = store
        .execute_graph(&cancel, cluster.name(), &args.graph, &bus, &params)
        .await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let summary = serde_json::json!({
        "cluster": cluster.name(),
        "graph": args.graph,
        "ok": result.is_ok(),
        "cancelled": cancel.is_cancelled(),
        "elapsed_ms": elapsed_ms,
        "error": result.as_ref().err().map(|e| e.to_string()),
    });
    println!("{summary}");
    if let Some(events) = store.events() {
        let dropped = events.dropped_count();
        if dropped > 0 {
            tracing::warn!(dropped, "events dropped: channel full");
        }
    }
    result?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_kv_types_values() {
        assert_eq!(parse_kv("mode=fast").expect("kv"), ("mode".into(), ParamValue::Str("fast".into())));
        assert_eq!(parse_kv(" n = 3").expect("kv"), ("n".into(), ParamValue::Int(3)));
        assert_eq!(parse_kv("on=true").expect("kv"), ("on".into(), ParamValue::Bool(true)));
        assert_eq!(parse_kv("expr=a=b").expect("kv"), ("expr".into(), ParamValue::Str("a=b".into())));
    }

    #[test]
    fn test_parse_kv_rejects_malformed() {
        assert_eq!(parse_kv("novalue").unwrap_err().exit_code(), 2);
        assert_eq!(parse_kv("=1").unwrap_err().exit_code(), 2);
    }

    #[tokio::test]
    async fn test_run_unknown_graph_fails_with_execute_code() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("jobs.toml");
        std::fs::write(
            &path,
            "[[graph]]\nname = \"main\"\n\n[[graph.vertex]]\nprocessor = \"noop\"\nstart = true\n",
        )
        .expect("write");

        let cfg = EngineConfig::default();
        let ok = RunArgs {
            file: path.clone(),
            graph: "main".into(),
            args: vec!["x=1".into()],
            timeout_ms: None,
        };
        assert_eq!(handle_run(ok, &cfg).await.expect("run"), 0);

        let missing = RunArgs {
            file: path,
            graph: "other".into(),
            args: Vec::new(),
            timeout_ms: Some(1_000),
        };
        assert_eq!(handle_run(missing, &cfg).await.unwrap_err().exit_code(), 4);
    }
}
