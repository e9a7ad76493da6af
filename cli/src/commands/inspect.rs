use std::path::Path;

use dagflow_core::api::{load_cluster_file, Cluster, OperatorRegistry};
use dagflow_plugins::register_builtins;

use crate::error::CliError;

use super::cli::{DotArgs, ValidateArgs};

pub fn builtin_registry() -> Result<OperatorRegistry, CliError> {
    let mut registry = OperatorRegistry::new();
    register_builtins(&mut registry).map_err(|e| CliError::Anyhow(e.into()))?;
    Ok(registry)
}

pub fn build_cluster(path: &Path, registry: &OperatorRegistry) -> Result<Cluster, CliError> {
    let wrap = |source| CliError::Build {
        path: path.display().to_string(),
        source,
    };
    let (name, def) = load_cluster_file(path).map_err(wrap)?;
    Cluster::build(&name, &def, registry).map_err(wrap)
}

/// Build every file, printing one line per cluster. Fails when any cluster is invalid.
pub fn handle_validate(args: ValidateArgs) -> Result<i32, CliError> {
    let registry = builtin_registry()?;
    let mut failed = 0usize;
    for path in &args.files {
        match build_cluster(path, &registry) {
            Ok(cluster) => {
                let graphs: Vec<&str> = cluster.graphs().map(|g| g.name()).collect();
                println!("ok      {} [{}]", path.display(), graphs.join(", "));
            }
            Err(err) => {
                failed += 1;
                tracing::debug!(path = %path.display(), error = %err, "cluster rejected");
                println!("invalid {err}");
            }
        }
    }
    if failed > 0 {
        return Err(CliError::Invalid(failed));
    }
    Ok(0)
}

pub fn handle_dot(args: DotArgs) -> Result<i32, CliError> {
    let registry = builtin_registry()?;
    let cluster = build_cluster(&args.file, &registry)?;
    print!("{}", cluster.to_dot());
    Ok(0)
}

pub fn handle_operators() -> Result<i32, CliError> {
    let registry = builtin_registry()?;
    let json = registry
        .dump_meta_json()
        .map_err(|e| CliError::Anyhow(e.into()))?;
    println!("{json}");
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_cluster_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.toml");
        std::fs::write(
            &path,
            "[[graph]]\nname = \"main\"\n\n[[graph.vertex]]\nprocessor = \"missing_op\"\nstart = true\n",
        )
        .expect("write");

        let registry = builtin_registry().expect("registry");
        let err = build_cluster(&path, &registry).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_build_cluster_with_builtins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("flow.toml");
        std::fs::write(
            &path,
            r#"
[[graph]]
name = "main"

[[graph.vertex]]
cond = "ARGS.on"
start = true
if = ["noop"]

[[graph.vertex]]
processor = "noop"
"#,
        )
        .expect("write");

        let registry = builtin_registry().expect("registry");
        let cluster = build_cluster(&path, &registry).expect("build");
        assert_eq!(cluster.name(), "flow");
        assert!(cluster.to_dot().contains("digraph"));
    }
}
