//! End-to-end resolution and execution tests over fixture registries.

mod common;

use common::FixtureProvider;
use pipewright_core::resolver::SINK_STEP;
use pipewright_core::{
    Activation, Config, Error, ExecutionObserver, NoopObserver, Registry, ResolvedTool, Sequence,
    Target, Tool, Toolchain,
};
use semver::Version;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn always() -> Activation {
    Activation::in_process(|_| true)
}

fn toolchain(registry: Registry, provider: Arc<FixtureProvider>, dir: &TempDir) -> Toolchain {
    Toolchain::new(
        Arc::new(registry),
        provider,
        &Config::default().with_cache_dir(dir.path()),
    )
    .unwrap()
}

#[derive(Default)]
struct Events(Mutex<Vec<String>>);

impl ExecutionObserver for Events {
    fn on_build_start(&self) {
        self.0.lock().unwrap().push("build".into());
    }

    fn on_build_finish(&self, sequence: &Sequence) {
        self.0.lock().unwrap().push(format!("built {sequence}"));
    }

    fn on_tool_start(&self, tool: &ResolvedTool) {
        self.0.lock().unwrap().push(format!("start {}", tool.name()));
    }

    fn on_tool_finish(&self, error: Option<&Error>, tool: &ResolvedTool) {
        let outcome = if error.is_some() { "failed" } else { "done" };
        self.0.lock().unwrap().push(format!("{outcome} {}", tool.name()));
    }
}

#[tokio::test]
async fn test_resolves_direct_pipeline() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new()
        .with(Tool::new("A").consuming(["input"]).producing(["X"]).activated_by(always()))
        .with(Tool::new("B").consuming(["X"]).producing(["Y"]));
    let chain = toolchain(registry, Arc::new(FixtureProvider::new()), &dir);

    let sequence = chain
        .resolve(b"anything", &Target::new("Y"), &NoopObserver)
        .await
        .unwrap();
    assert_eq!(sequence.names(), vec!["A", "B"]);
    assert!(sequence.validate().is_ok());
}

#[tokio::test]
async fn test_resolves_glue_tool() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new()
        .with(
            Tool::new("A")
                .consuming(["input"])
                .producing(["out_a"])
                .activated_by(always()),
        )
        .with(Tool::new("T").consuming(["out_a"]).producing(["in_b"]))
        .with(Tool::new("B").consuming(["in_b"]).producing(["out"]));
    let chain = toolchain(registry, Arc::new(FixtureProvider::new()), &dir);

    let sequence = chain
        .resolve(b"", &Target::new("out").with_depends(["B"]), &NoopObserver)
        .await
        .unwrap();
    assert_eq!(sequence.names(), vec!["A", "T", "B"]);
    assert!(!sequence.names().contains(&SINK_STEP));
}

#[tokio::test]
async fn test_input_selection_by_probe() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new()
        .with(
            Tool::new("tool1")
                .consuming(["input"])
                .producing(["A"])
                .activated_by(Activation::probe("grep")),
        )
        .with(
            Tool::new("tool2")
                .consuming(["input"])
                .producing(["A"])
                .activated_by(Activation::probe("echo $<input>")),
        );
    let chain = toolchain(registry, Arc::new(FixtureProvider::new()), &dir);

    let matching = chain.resolver().matching_input_tools(b"test").await;
    let names: Vec<&str> = matching.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["tool2"]);
}

#[tokio::test]
async fn test_first_matching_input_wins() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new()
        .with(Tool::new("first").consuming(["input"]).producing(["X"]).activated_by(always()))
        .with(Tool::new("second").consuming(["input"]).producing(["X"]).activated_by(always()));
    let chain = toolchain(registry, Arc::new(FixtureProvider::new()), &dir);

    let selected = chain.resolver().select_input_tool(b"x").await.unwrap();
    assert_eq!(selected.name, "first");
}

#[tokio::test]
async fn test_no_matching_input() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new().with(
        Tool::new("json")
            .consuming(["input"])
            .producing(["X"])
            .activated_by(Activation::in_process(|input| input.starts_with(b"{"))),
    );
    let chain = toolchain(registry, Arc::new(FixtureProvider::new()), &dir);

    let err = chain
        .resolve(b"(defco)", &Target::new("X"), &NoopObserver)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoMatchingInput));
}

#[tokio::test]
async fn test_negotiates_and_pins_packages() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(
        FixtureProvider::new()
            .with_package(
                "reader",
                &[
                    ("1.1.0", Some("^0.5.0")),
                    ("1.0.0", Some("^0.4.0")),
                    ("0.9.0", Some("0.3.0")),
                ],
                "cat",
            )
            .with_package("writer", &[("2.0.0", Some("~0.4.0"))], "cat"),
    );
    let registry = Registry::new()
        .with(
            Tool::new("reader")
                .with_package("reader")
                .consuming(["input"])
                .producing(["graph"])
                .activated_by(always()),
        )
        .with(
            Tool::new("writer")
                .with_package("writer")
                .consuming(["graph"])
                .producing(["svg"]),
        );
    let chain = toolchain(registry, provider.clone(), &dir);

    let sequence = chain
        .resolve(b"", &Target::new("svg"), &NoopObserver)
        .await
        .unwrap();
    assert_eq!(sequence.shared_version(), Some(&Version::new(0, 4, 0)));
    let pinned: Vec<String> = sequence.iter().map(ResolvedTool::display_name).collect();
    // 1.1.0 is built against 0.5.0, which still works with 0.4.0 consumers.
    assert_eq!(pinned, vec!["reader@1.1.0", "writer@2.0.0"]);
    assert_eq!(provider.install_count(), 0, "resolution must not install");
}

#[tokio::test]
async fn test_incompatible_packages_name_the_blocker() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(
        FixtureProvider::new()
            .with_package("reader", &[("1.0.0", Some("0.5.0"))], "cat")
            .with_package("legacy", &[("0.1.0", Some("0.3.0"))], "cat"),
    );
    let registry = Registry::new()
        .with(
            Tool::new("reader")
                .with_package("reader")
                .consuming(["input"])
                .producing(["graph"])
                .activated_by(always()),
        )
        .with(
            Tool::new("legacy")
                .with_package("legacy")
                .consuming(["graph"])
                .producing(["svg"]),
        );
    let chain = toolchain(registry, provider, &dir);

    let err = chain
        .resolve(b"", &Target::new("svg"), &NoopObserver)
        .await
        .unwrap_err();
    // legacy's only release is below the floor, so it has nothing to offer.
    assert!(matches!(err, Error::NoCompatibleVersion { ref tool, .. } if tool == "legacy"));
}

#[tokio::test]
async fn test_min_version_excludes_releases() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(FixtureProvider::new().with_package(
        "reader",
        &[("0.1.0", None), ("0.2.0-pre.0", None), ("0.2.1", None)],
        "cat",
    ));
    let registry = Registry::new().with(
        Tool::new("reader")
            .with_package("reader")
            .with_min_version(Version::parse("0.2.0-pre.0").unwrap())
            .consuming(["input"])
            .producing(["graph"])
            .activated_by(always()),
    );
    let chain = toolchain(registry, provider, &dir);

    let sequence = chain
        .resolve(b"", &Target::new("graph"), &NoopObserver)
        .await
        .unwrap();
    assert_eq!(sequence.shared_version(), None);
    assert_eq!(sequence.steps()[0].version, Version::parse("0.2.1").ok());
}

#[tokio::test]
async fn test_runs_packaged_pipeline() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(
        FixtureProvider::new()
            .with_package("upper", &[("1.0.0", None)], "tr a-z A-Z")
            .with_package("suffix", &[("1.0.0", None)], "echo \"$(cat)$1\""),
    );
    let registry = Registry::new()
        .with(
            Tool::new("upper")
                .with_package("upper")
                .with_interpreter("sh")
                .consuming(["input"])
                .producing(["text"])
                .activated_by(always()),
        )
        .with(
            Tool::new("suffix")
                .with_package("suffix")
                .with_interpreter("sh")
                .with_args(["!"])
                .consuming(["text"])
                .producing(["shout"]),
        );
    let chain = toolchain(registry, provider.clone(), &dir);
    let events = Events::default();

    let output = chain
        .run(b"hello".to_vec(), &Target::new("shout"), &events)
        .await
        .unwrap();
    assert_eq!(output, b"HELLO!");
    assert_eq!(provider.install_count(), 2);
    assert_eq!(
        *events.0.lock().unwrap(),
        vec![
            "build",
            "built [upper@1.0.0] --> [suffix@1.0.0]",
            "start upper",
            "done upper",
            "start suffix",
            "done suffix",
        ]
    );
}

#[tokio::test]
async fn test_failed_step_skips_later_installs() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(
        FixtureProvider::new()
            .with_package("parse", &[("1.0.0", None)], "echo 'line 1: unexpected )' >&2; exit 2")
            .with_package("render", &[("1.0.0", None)], "cat"),
    );
    let registry = Registry::new()
        .with(
            Tool::new("parse")
                .with_package("parse")
                .with_interpreter("sh")
                .consuming(["input"])
                .producing(["ast"])
                .activated_by(always()),
        )
        .with(
            Tool::new("render")
                .with_package("render")
                .with_interpreter("sh")
                .consuming(["ast"])
                .producing(["svg"]),
        );
    let chain = toolchain(registry, provider.clone(), &dir);

    let err = chain
        .run(b"(".to_vec(), &Target::new("svg"), &NoopObserver)
        .await
        .unwrap_err();
    match err {
        Error::ToolExecutionFailed {
            tool,
            exit_code,
            stderr,
        } => {
            assert_eq!(tool, "parse");
            assert_eq!(exit_code, Some(2));
            assert_eq!(stderr, "line 1: unexpected )");
        }
        other => panic!("Expected tool failure, got {other:?}"),
    }
    assert_eq!(provider.installed(), vec!["parse@1.0.0"]);
}

#[tokio::test]
async fn test_cycle_in_target_dependencies() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new()
        .with(Tool::new("A").consuming(["input"]).producing(["X"]).activated_by(always()))
        .with(Tool::new("B").consuming(["X"]).producing(["X"]).depending_on(["C"]))
        .with(Tool::new("C").consuming(["X"]).producing(["X"]).depending_on(["B"]));
    let chain = toolchain(registry, Arc::new(FixtureProvider::new()), &dir);

    let err = chain
        .resolve(b"", &Target::new("X").with_depends(["B"]), &NoopObserver)
        .await
        .unwrap_err();
    match err {
        Error::CyclicDependency { cycles } => assert_eq!(cycles, vec![vec!["B", "C"]]),
        other => panic!("Expected cycle, got {other:?}"),
    }
}

#[tokio::test]
async fn test_glue_prerequisites_run_first() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new()
        .with(Tool::new("A").consuming(["input"]).producing(["X"]).activated_by(always()))
        .with(Tool::new("C").consuming(["X"]).producing(["X"]))
        .with(Tool::new("B").consuming(["X"]).producing(["Y"]).depending_on(["C"]));
    let chain = toolchain(registry, Arc::new(FixtureProvider::new()), &dir);

    let sequence = chain
        .resolve(b"", &Target::new("Y"), &NoopObserver)
        .await
        .unwrap();
    assert_eq!(sequence.names(), vec!["A", "C", "B"]);
    assert!(sequence.validate().is_ok());
}

#[tokio::test]
async fn test_required_tool_is_not_reused_as_glue() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new()
        .with(Tool::new("A").consuming(["input"]).producing(["x"]).activated_by(always()))
        .with(Tool::new("P").consuming(["x"]).producing(["y"]))
        .with(Tool::new("L").consuming(["y"]).producing(["y"]))
        .with(Tool::new("M").consuming(["y"]).producing(["x"]));
    let chain = toolchain(registry, Arc::new(FixtureProvider::new()), &dir);

    let err = chain
        .resolve(b"", &Target::new("y").with_depends(["L", "P"]), &NoopObserver)
        .await
        .unwrap_err();
    match err {
        Error::NoPathBetweenTypes { from, to, .. } => {
            assert_eq!((from.as_str(), to.as_str()), ("A", "L"));
        }
        other => panic!("Expected missing path, got {other:?}"),
    }
}
