mod common;

use std::sync::Mutex;

use common::{store, trace_of};
use dagflow_core::api::{Cancellation, DataId, ExecuteContext, Params};
use pretty_assertions::assert_eq;

const LOOPS: &str = r#"
[[graph]]
name = "count_up"

[[graph.vertex]]
processor = "init"
start = true
args = { start = 0 }

[[graph.vertex]]
id = "loop"
while = "VARS.count < 3"
graph = "body"
deps = ["init"]

[[graph]]
name = "body"

[[graph.vertex]]
processor = "incr"
start = true

[[graph]]
name = "fan"

[[graph.vertex]]
while = "loopIdx < 3"
graph = "visit"
async = true
start = true

[[graph]]
name = "walk"

[[graph.vertex]]
while = "loopIdx < 3"
graph = "visit"
start = true

[[graph]]
name = "visit"

[[graph.vertex]]
processor = "collect"
start = true
"#;

#[tokio::test]
async fn test_sync_loop_runs_until_predicate_fails() {
    let store = store();
    store.load_cluster_str("loops", LOOPS).expect("load");

    let bus = ExecuteContext::new();
    let count = DataId::of::<i64>("count");
    bus.fill_entry(&count);
    store
        .execute_graph(&Cancellation::new(), "loops", "count_up", &bus, &Params::new())
        .await
        .expect("execute");
    assert_eq!(bus.get::<i64>("count").as_deref(), Some(&3));
}

#[tokio::test]
async fn test_sync_loop_sees_ordered_indices() {
    let store = store();
    store.load_cluster_str("loops", LOOPS).expect("load");

    for _ in 0..2 {
        let bus = ExecuteContext::new();
        bus.insert("seen", Mutex::new(Vec::<i64>::new()));
        store
            .execute_graph(&Cancellation::new(), "loops", "walk", &bus, &Params::new())
            .await
            .expect("execute");
        let seen = bus.get::<Mutex<Vec<i64>>>("seen").expect("seen");
        assert_eq!(*seen.lock().expect("seen"), vec![0, 1, 2]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_loop_joins_every_iteration() {
    let store = store();
    store.load_cluster_str("loops", LOOPS).expect("load");

    let bus = ExecuteContext::new();
    bus.insert("seen", Mutex::new(Vec::<i64>::new()));
    store
        .execute_graph(&Cancellation::new(), "loops", "fan", &bus, &Params::new())
        .await
        .expect("execute");

    let seen = bus.get::<Mutex<Vec<i64>>>("seen").expect("seen");
    let mut seen = seen.lock().expect("seen").clone();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_cancelled_loop_fails_its_vertex() {
    let store = store();
    store
        .load_cluster_str(
            "loops",
            r#"
[[graph]]
name = "forever"

[[graph.vertex]]
id = "spin"
while = "true"
graph = "idle"
start = true
else = ["stopped"]

[[graph.vertex]]
id = "stopped"
processor = "mark"
args = { tag = "stopped" }

[[graph]]
name = "idle"

[[graph.vertex]]
processor = "noop"
start = true
"#,
        )
        .expect("load");

    let bus = ExecuteContext::new();
    bus.insert("trace", Mutex::new(Vec::<String>::new()));
    let cancel = Cancellation::new();
    cancel.cancel();
    store
        .execute_graph(&cancel, "loops", "forever", &bus, &Params::new())
        .await
        .expect("execute");
    assert_eq!(trace_of(&bus), vec!["stopped"]);
}

#[tokio::test]
async fn test_if_else_on_expression_gate() {
    let store = store();
    store
        .load_cluster_str(
            "branch",
            r#"
[[graph]]
name = "main"

[[graph.vertex]]
cond = 'ARGS.mode == "fast" && level > 1'
start = true
if = ["fast"]
else = ["slow"]

[[graph.vertex]]
id = "fast"
processor = "mark"
args = { tag = "fast" }

[[graph.vertex]]
id = "slow"
processor = "mark"
args = { tag = "slow" }
"#,
        )
        .expect("load");

    for (mode, level, expected) in [("fast", 2i64, "fast"), ("fast", 1, "slow"), ("eco", 5, "slow")] {
        let bus = ExecuteContext::new();
        bus.insert("trace", Mutex::new(Vec::<String>::new()));
        let params = Params::new();
        params.set("mode", mode);
        params.set("level", level);
        store
            .execute_graph(&Cancellation::new(), "branch", "main", &bus, &params)
            .await
            .expect("execute");
        assert_eq!(trace_of(&bus), vec![expected]);
    }
}

#[tokio::test]
async fn test_config_settings_drive_guards_and_args() {
    let store = store();
    store
        .load_cluster_str(
            "settings",
            r#"
[[config_setting]]
name = "verbose"
cond = 'ARGS.log_level == "debug"'

[[graph]]
name = "main"

[[graph.vertex]]
id = "loud"
processor = "mark"
expect = "verbose"
start = true
args = { tag = "loud" }

[[graph.vertex]]
id = "quiet"
processor = "mark"
expect_config = "!verbose"
start = true
args = { tag = "quiet" }

[[graph.vertex]]
id = "tagged"
processor = "mark"
start = true
args = { tag = "plain" }
select_args = [{ match = "verbose", args = { tag = "detailed" } }]
"#,
        )
        .expect("load");

    for (level, expected) in [("debug", vec!["detailed", "loud"]), ("info", vec!["plain", "quiet"])] {
        let bus = ExecuteContext::new();
        bus.insert("trace", Mutex::new(Vec::<String>::new()));
        let params = Params::new();
        params.set("log_level", level);
        store
            .execute_graph(&Cancellation::new(), "settings", "main", &bus, &params)
            .await
            .expect("execute");
        let mut trace = trace_of(&bus);
        trace.sort();
        assert_eq!(trace, expected);
    }
}

#[test]
fn test_host_operator_overrides_builtin() {
    use dagflow_core::api::{OperatorBuilder, OperatorRegistry};

    let mut registry = OperatorRegistry::new();
    registry
        .register(
            OperatorBuilder::new("noop", common::Mark::default)
                .param::<String>("tag", |_, _| {}),
        )
        .expect("host noop");
    dagflow_plugins::register_builtins(&mut registry).expect("builtins");

    let meta = registry.meta("noop").expect("noop");
    assert_eq!(meta.params.len(), 1);
    assert!(registry.contains("dagflow_expr"));
    assert!(registry.contains("dagflow_while"));
}

#[tokio::test]
async fn test_build_store_loads_configured_clusters() {
    use dagflow_core::api::{parse_engine_config, OperatorRegistry};

    let dir = tempfile::tempdir().expect("tempdir");
    let cluster = dir.path().join("jobs.toml");
    std::fs::write(
        &cluster,
        "[[graph]]\nname = \"main\"\n\n[[graph.vertex]]\nprocessor = \"noop\"\nstart = true\n",
    )
    .expect("write cluster");
    let cfg = parse_engine_config(&format!(
        "clusters = [{:?}]\n\n[logging]\nenabled = false\n",
        cluster.display().to_string()
    ))
    .expect("config");

    let store = dagflow_plugins::build_store(&cfg, OperatorRegistry::new())
        .await
        .expect("store");
    assert_eq!(store.cluster_names(), vec!["jobs".to_string()]);
    assert!(store.events().is_none());
    store
        .execute_graph(&Cancellation::new(), "jobs", "main", &ExecuteContext::new(), &Params::new())
        .await
        .expect("execute");
}

#[tokio::test]
async fn test_build_store_reports_missing_cluster_file() {
    use dagflow_core::api::{EngineConfig, OperatorRegistry};

    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = EngineConfig {
        clusters: vec![dir.path().join("absent.toml")],
        ..EngineConfig::default()
    };
    let err = dagflow_plugins::build_store(&cfg, OperatorRegistry::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}
