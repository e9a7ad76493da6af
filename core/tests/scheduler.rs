mod common;

use std::collections::HashMap;
use std::time::Duration;

use common::{params, run, store};
use dagflow_core::api::{
    ClusterDef, EventCollector, ExecCode, ExecuteError, GraphDataDef, GraphDef, ParamValue,
    Params, Phase, VertexDef,
};
use dagflow_core::GraphStore;
use pretty_assertions::assert_eq;

const PIPELINE: &str = r#"
[[graph]]
name = "pipeline"

[[graph.vertex]]
id = "emit"
processor = "emit"
start = true
args = { text = "hello", tag = "emit" }

[[graph.vertex]]
id = "append"
processor = "append"
input = [{ field = "value", required = true }]
args = { suffix = "!", tag = "append" }
"#;

fn cascade(skip_as_error: bool) -> ClusterDef {
    let mut graph = GraphDef::new("cascade")
        .vertex(VertexDef::operator("fail").with_id("f").start().arg("tag", "f"))
        .vertex(VertexDef::operator("mark").with_id("b").deps_on_ok(["f"]).arg("tag", "b"))
        .vertex(VertexDef::operator("mark").with_id("c").deps_on_ok(["b"]).arg("tag", "c"))
        .vertex(VertexDef::operator("mark").with_id("d").deps_on_err(["b"]).arg("tag", "d"))
        .vertex(VertexDef::operator("mark").with_id("e").deps(["b"]).arg("tag", "e"));
    graph.vertex_skip_as_error = skip_as_error;
    ClusterDef::new().graph(graph)
}

#[tokio::test]
async fn test_data_flows_through_in_out_chain() {
    let store = store();
    store.load_cluster_str("main", PIPELINE).expect("load");

    let out = run(&store, "main", "pipeline", &Params::new(), &["value"]).await;
    assert!(out.result.is_ok());
    assert_eq!(out.string("value").as_deref(), Some("hello!"));
    assert_eq!(out.trace, vec!["emit".to_string(), "append".to_string()]);
}

#[tokio::test]
async fn test_skip_counts_as_error_downstream() {
    let store = store();
    store.load_cluster("cascade", &cascade(true)).expect("load");

    let out = run(&store, "cascade", "cascade", &Params::new(), &[]).await;
    assert!(out.result.is_ok(), "vertex failures stay inside the graph");
    assert_eq!(out.sorted_trace(), vec!["d", "e", "f"]);
}

#[tokio::test]
async fn test_skip_propagates_as_skip_when_configured() {
    let store = store();
    store.load_cluster("cascade", &cascade(false)).expect("load");

    let out = run(&store, "cascade", "cascade", &Params::new(), &[]).await;
    assert!(out.result.is_ok());
    assert_eq!(out.sorted_trace(), vec!["e", "f"]);
}

#[tokio::test]
async fn test_gate_selects_branch() {
    let store = store();
    store
        .load_cluster_str(
            "branch",
            r#"
[[graph]]
name = "branch"

[[graph.vertex]]
cond = "go"
start = true
if = ["yes"]
else = ["no"]

[[graph.vertex]]
id = "yes"
processor = "mark"
args = { tag = "yes" }

[[graph.vertex]]
id = "no"
processor = "mark"
args = { tag = "no" }
"#,
        )
        .expect("load");

    let out = run(&store, "branch", "branch", &params(&[("go", true.into())]), &[]).await;
    assert_eq!(out.trace, vec!["yes"]);

    let out = run(&store, "branch", "branch", &params(&[("go", false.into())]), &[]).await;
    assert_eq!(out.trace, vec!["no"]);
}

#[tokio::test]
async fn test_panicking_operator_fails_only_its_vertex() {
    let store = store();
    store
        .load_cluster(
            "main",
            &ClusterDef::new().graph(
                GraphDef::new("g")
                    .vertex(VertexDef::operator("boom").with_id("p").start().on_err(["recover"]))
                    .vertex(VertexDef::operator("mark").with_id("recover").arg("tag", "recover")),
            ),
        )
        .expect("load");

    for _ in 0..2 {
        let out = run(&store, "main", "g", &Params::new(), &[]).await;
        assert!(out.result.is_ok());
        assert_eq!(out.trace, vec!["recover"]);
    }
}

fn recovering(faulty: VertexDef) -> ClusterDef {
    ClusterDef::new().graph(
        GraphDef::new("g")
            .vertex(VertexDef::operator("emit").with_id("e").start().arg("text", "x"))
            .vertex(faulty.with_id("p").deps(["e"]).on_err(["recover"]))
            .vertex(VertexDef::operator("mark").with_id("recover").arg("tag", "recover")),
    )
}

async fn assert_recovers(faulty: VertexDef) {
    let store = store();
    store.load_cluster("main", &recovering(faulty)).expect("load");

    for _ in 0..2 {
        let out = tokio::time::timeout(
            Duration::from_secs(5),
            run(&store, "main", "g", &Params::new(), &[]),
        )
        .await
        .expect("run finished");
        assert!(out.result.is_ok());
        assert_eq!(out.trace, vec!["recover"]);
    }
}

#[tokio::test]
async fn test_panicking_output_getter_fails_only_its_vertex() {
    assert_recovers(VertexDef::operator("bad_output")).await;
}

#[tokio::test]
async fn test_panicking_input_setter_fails_only_its_vertex() {
    assert_recovers(VertexDef::operator("bad_input").input(GraphDataDef::new("value"))).await;
}

#[tokio::test]
async fn test_panicking_param_setter_fails_only_its_vertex() {
    assert_recovers(VertexDef::operator("bad_param").arg("tag", "p")).await;
}

#[tokio::test]
async fn test_panicking_context_setter_fails_only_its_vertex() {
    assert_recovers(VertexDef::operator("bad_context")).await;
}

#[tokio::test]
async fn test_panicking_reset_keeps_graph_reusable() {
    let store = store();
    store
        .load_cluster(
            "main",
            &ClusterDef::new().graph(
                GraphDef::new("g")
                    .vertex(VertexDef::operator("bad_reset").with_id("p").start())
                    .vertex(VertexDef::operator("mark").with_id("after").deps_on_ok(["p"]).arg("tag", "after")),
            ),
        )
        .expect("load");

    for _ in 0..3 {
        let out = tokio::time::timeout(
            Duration::from_secs(5),
            run(&store, "main", "g", &Params::new(), &[]),
        )
        .await
        .expect("run finished");
        assert!(out.result.is_ok());
        assert_eq!(out.trace, vec!["after"]);
    }
}

#[tokio::test]
async fn test_guards_use_settings_and_expressions() {
    let store = store();
    let def = ClusterDef::new()
        .config_setting("fast", "use_fast")
        .graph(
            GraphDef::new("g")
                .vertex(VertexDef::operator("mark").with_id("a").start().expect("fast").arg("tag", "a"))
                .vertex(VertexDef::operator("mark").with_id("b").start().expect("!fast").arg("tag", "b"))
                .vertex(VertexDef::operator("mark").with_id("c").start().expect("go").arg("tag", "c"))
                .vertex(
                    VertexDef::operator("mark")
                        .with_id("d")
                        .start()
                        .expect_config("!fast")
                        .arg("tag", "d"),
                ),
        );
    store.load_cluster("main", &def).expect("load");

    let on = params(&[("use_fast", true.into()), ("go", true.into())]);
    let out = run(&store, "main", "g", &on, &[]).await;
    assert_eq!(out.sorted_trace(), vec!["a", "c"]);

    let off = params(&[("use_fast", false.into()), ("go", false.into())]);
    let out = run(&store, "main", "g", &off, &[]).await;
    assert_eq!(out.sorted_trace(), vec!["b", "d"]);
}

#[tokio::test]
async fn test_select_args_first_match_wins() {
    let store = store();
    let branch = |text: &str| HashMap::from([("text".to_string(), ParamValue::from(text))]);
    let def = ClusterDef::new()
        .config_setting("fast", "use_fast")
        .graph(
            GraphDef::new("g").vertex(
                VertexDef::operator("emit")
                    .start()
                    .arg("text", "slow")
                    .select("fast", branch("fast"))
                    .select("ARGS.turbo", branch("turbo")),
            ),
        );
    store.load_cluster("main", &def).expect("load");

    let cases = [
        (false, false, "slow"),
        (true, true, "fast"),
        (false, true, "turbo"),
    ];
    for (fast, turbo, expected) in cases {
        let args = params(&[("use_fast", fast.into()), ("turbo", turbo.into())]);
        let out = run(&store, "main", "g", &args, &["value"]).await;
        assert_eq!(out.string("value").as_deref(), Some(expected));
    }
}

#[tokio::test]
async fn test_aggregate_input_collects_named_parts() {
    let store = store();
    let def = ClusterDef::new().graph(
        GraphDef::new("g")
            .vertex(
                VertexDef::operator("emit")
                    .with_id("left")
                    .start()
                    .arg("text", "l")
                    .output(GraphDataDef::new("value").with_id("a")),
            )
            .vertex(
                VertexDef::operator("emit")
                    .with_id("right")
                    .start()
                    .arg("text", "r")
                    .output(GraphDataDef::new("value").with_id("b")),
            )
            .vertex(
                VertexDef::operator("gather")
                    .input(GraphDataDef::new("parts").aggregate(["a", "b"]).required()),
            ),
    );
    store.load_cluster("main", &def).expect("load");

    let out = run(&store, "main", "g", &Params::new(), &["joined"]).await;
    assert_eq!(out.string("joined").as_deref(), Some("l,r"));
}

#[tokio::test]
async fn test_unknown_graph_or_cluster() {
    let store = store();
    store.load_cluster_str("main", PIPELINE).expect("load");

    let out = run(&store, "main", "missing", &Params::new(), &[]).await;
    assert!(matches!(out.result, Err(ExecuteError::GraphNotFound { ref graph, .. }) if graph == "missing"));

    let out = run(&store, "nope", "pipeline", &Params::new(), &[]).await;
    assert!(matches!(out.result, Err(ExecuteError::GraphNotFound { ref cluster, .. }) if cluster == "nope"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_are_isolated() {
    let store = store();
    store.load_cluster_str("main", PIPELINE).expect("load");

    let runs = (0..8).map(|_| {
        let store = store.clone();
        tokio::spawn(async move { run(&store, "main", "pipeline", &Params::new(), &["value"]).await })
    });
    for handle in futures::future::join_all(runs).await {
        let out = handle.expect("join");
        assert!(out.result.is_ok());
        assert_eq!(out.string("value").as_deref(), Some("hello!"));
    }
}

#[tokio::test]
async fn test_events_report_skips_and_graph_run() {
    let (collector, mut rx) = EventCollector::channel(64);
    let store = GraphStore::with_events(common::registry(), collector);
    store.load_cluster("cascade", &cascade(true)).expect("load");

    let out = run(&store, "cascade", "cascade", &Params::new(), &[]).await;
    assert!(out.result.is_ok());

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let skipped: Vec<&str> = events
        .iter()
        .filter(|e| e.code == ExecCode::Skipped)
        .filter_map(|e| e.vertex.as_deref())
        .collect();
    assert_eq!(skipped.len(), 2);
    assert!(skipped.contains(&"b") && skipped.contains(&"c"));
    assert!(events
        .iter()
        .any(|e| e.vertex.as_deref() == Some("f") && e.phase == Phase::Exec && e.code == ExecCode::Failed));
    assert!(events
        .iter()
        .any(|e| e.vertex.is_none() && e.graph == "cascade" && e.code == ExecCode::Ok));
    assert!(events.iter().all(|e| e.run_id == events[0].run_id));
}
