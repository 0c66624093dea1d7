//! End-to-end check-and-run tests against the in-memory host.

use modelsmith_config::{CapabilitiesConfig, ExecutionConfig, ModelsmithConfig, PolicyConfig};
use modelsmith_protocol::{ExecutionResult, PolicyCategory, RunOutcome};
use modelsmith_sandbox::{
    CadHost, Capability, CodeSandbox, HostError, MemoryHost, SandboxError,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::{Arc, mpsc};
use std::thread;

const BOX_SCRIPT: &str = r#"
let doc = App.active_document();
let body = Part::make_box(10, 20, 30);
doc.add_object("Box", body);
doc.recompute();
Gui.fit_view();
print(`objects=${doc.object_count()}`);
"#;

const DIVIDE_BY_ZERO_SCRIPT: &str = r#"
let doc = App.active_document();
doc.add_object("Box", Part::make_box(1, 1, 1));
let empty = doc.object_count() - 1;
let ratio = 10 / empty;
"#;

fn sandbox_with(host: &MemoryHost, config: ModelsmithConfig) -> CodeSandbox {
    CodeSandbox::new(Arc::new(host.clone()), &config).expect("sandbox")
}

fn default_sandbox(host: &MemoryHost) -> CodeSandbox {
    sandbox_with(host, ModelsmithConfig::default())
}

fn completed(outcome: RunOutcome) -> ExecutionResult {
    match outcome {
        RunOutcome::Completed(result) => result,
        RunOutcome::Denied(violation) => panic!("unexpected denial: {violation}"),
    }
}

#[test]
fn file_operation_is_denied_without_a_workspace() {
    let host = MemoryHost::new();
    let outcome = default_sandbox(&host)
        .check_and_run("App.removeFile('x')")
        .expect("outcome");

    match outcome {
        RunOutcome::Denied(violation) => {
            assert_eq!(violation.category, PolicyCategory::FileSystem);
            assert_eq!(violation.category.to_string(), "file-system");
        }
        other => panic!("expected denial, got {other:?}"),
    }
    assert!(host.workspaces().is_empty());
    assert_eq!(host.active_workspace(), None);
}

#[test]
fn approved_modeling_calls_succeed_in_one_active_workspace() {
    let host = MemoryHost::new();
    let result = completed(default_sandbox(&host).check_and_run(BOX_SCRIPT).expect("outcome"));

    let (workspace, output) = match result {
        ExecutionResult::Success { workspace, output } => (workspace, output),
        other => panic!("expected success, got {other:?}"),
    };
    assert!(workspace.starts_with("ModelsmithModel_"));
    assert_eq!(output, vec!["objects=1".to_string()]);
    assert_eq!(host.workspaces(), vec![workspace.clone()]);
    assert_eq!(host.active_workspace(), Some(workspace.clone()));
    // fit_view from the script plus the lifecycle refresh.
    assert_eq!(host.view_refreshes(), 2);

    let features = host.features(&workspace).expect("features");
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].label, "Box");
    assert_eq!(features[0].solid.volume(), 6000.0);
}

#[test]
fn runtime_fault_discards_the_workspace() {
    let host = MemoryHost::new();
    let result = completed(
        default_sandbox(&host)
            .check_and_run(DIVIDE_BY_ZERO_SCRIPT)
            .expect("outcome"),
    );

    match result {
        ExecutionResult::Failure { message } => {
            assert!(
                message.to_lowercase().contains("division by zero"),
                "{message}"
            );
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(host.workspaces().is_empty());
    assert_eq!(host.active_workspace(), None);
}

#[test]
fn earlier_successes_survive_a_later_fault() {
    let host = MemoryHost::new();
    let sandbox = default_sandbox(&host);
    let first = completed(sandbox.check_and_run(BOX_SCRIPT).expect("first"));
    let workspace = first.workspace().expect("workspace").to_string();

    let second = completed(sandbox.check_and_run(DIVIDE_BY_ZERO_SCRIPT).expect("second"));
    assert!(matches!(second, ExecutionResult::Failure { .. }));
    assert_eq!(host.workspaces(), vec![workspace]);
}

#[test]
fn parse_error_is_a_failure() {
    let host = MemoryHost::new();
    let result = default_sandbox(&host).run("let x = ;").expect("result");
    assert!(matches!(result, ExecutionResult::Failure { .. }));
    assert!(host.workspaces().is_empty());
}

#[test]
fn invalid_dimension_is_a_failure() {
    let host = MemoryHost::new();
    let result = default_sandbox(&host)
        .run("App.active_document().add_object(\"Bad\", Part::make_box(0, 1, 1));")
        .expect("result");
    match result {
        ExecutionResult::Failure { message } => assert!(message.contains("length"), "{message}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(host.workspaces().is_empty());
}

#[test]
fn unapproved_capability_is_not_reachable() {
    let host = MemoryHost::new();
    let result = default_sandbox(&host)
        .run("let p = Sketch::circle(5);")
        .expect("result");
    assert!(matches!(result, ExecutionResult::Failure { .. }));
    assert!(host.workspaces().is_empty());
}

#[test]
fn approved_sketch_namespace_builds_prisms() {
    let host = MemoryHost::new();
    let config = ModelsmithConfig::builder()
        .capabilities(CapabilitiesConfig {
            approved: vec!["App".to_string(), "Sketch".to_string()],
        })
        .build();
    let script = r#"
        let doc = App.active_document();
        let plate = Sketch::extrude(Sketch::rectangle(4, 5), 2);
        doc.add_object("Plate", plate.translate(0, 0, 1));
    "#;
    let result = sandbox_with(&host, config).run(script).expect("result");
    let workspace = result.workspace().expect("success").to_string();
    let features = host.features(&workspace).expect("features");
    assert_eq!(features[0].solid.volume(), 40.0);
    assert_eq!(features[0].solid.placement, [0.0, 0.0, 1.0]);
}

#[test]
fn runaway_loop_is_cancelled_by_operation_budget() {
    let host = MemoryHost::new();
    let config = ModelsmithConfig::builder()
        .execution(ExecutionConfig {
            max_operations: Some(10_000),
            ..ExecutionConfig::default()
        })
        .build();
    let result = sandbox_with(&host, config)
        .run("let n = 0; loop { n += 1; }")
        .expect("result");
    assert!(matches!(result, ExecutionResult::Cancelled { .. }), "{result:?}");
    assert!(host.workspaces().is_empty());
}

#[test]
fn runaway_loop_is_cancelled_by_deadline() {
    let host = MemoryHost::new();
    let config = ModelsmithConfig::builder()
        .execution(ExecutionConfig {
            max_operations: None,
            timeout_ms: Some(50),
            ..ExecutionConfig::default()
        })
        .build();
    let result = sandbox_with(&host, config)
        .run("let n = 0; loop { n += 1; }")
        .expect("result");
    match result {
        ExecutionResult::Cancelled { reason } => assert!(reason.contains("wall-clock"), "{reason}"),
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert!(host.workspaces().is_empty());
}

#[test]
fn unavailable_capability_fails_before_running_and_discards_workspace() {
    let host = MemoryHost::new();
    let config = ModelsmithConfig::builder()
        .capabilities(CapabilitiesConfig {
            approved: vec!["App".to_string(), "Mesh".to_string()],
        })
        .build();
    let err = sandbox_with(&host, config).run(BOX_SCRIPT).unwrap_err();
    assert!(matches!(err, SandboxError::CapabilityUnavailable(ref name) if name == "Mesh"));
    assert!(host.workspaces().is_empty());
}

#[test]
fn refresh_failure_does_not_change_success() {
    let host = MemoryHost::new();
    host.fail_refresh(Some("no display"));
    let result = default_sandbox(&host)
        .run("App.active_document().add_object(\"S\", Part::make_sphere(2));")
        .expect("result");
    assert!(result.is_success());
    assert_eq!(host.workspaces().len(), 1);
}

#[test]
fn close_failure_keeps_the_failure_outcome() {
    let host = MemoryHost::new();
    host.fail_close(Some("document locked"));
    let result = default_sandbox(&host).run(DIVIDE_BY_ZERO_SCRIPT).expect("result");
    assert!(matches!(result, ExecutionResult::Failure { .. }));
}

#[test]
fn oversized_code_is_rejected_before_any_work() {
    let host = MemoryHost::new();
    let config = ModelsmithConfig::builder()
        .policy(PolicyConfig {
            max_code_bytes: Some(16),
            ..PolicyConfig::default()
        })
        .build();
    let sandbox = sandbox_with(&host, config);
    let err = sandbox.check_and_run(BOX_SCRIPT).unwrap_err();
    assert!(matches!(err, SandboxError::CodeTooLarge { limit: 16, .. }));
    let err = sandbox.run(BOX_SCRIPT).unwrap_err();
    assert!(matches!(err, SandboxError::CodeTooLarge { limit: 16, .. }));
    assert!(host.workspaces().is_empty());
}

#[test]
fn built_config_is_validated() {
    let configs = [
        ModelsmithConfig::builder()
            .execution(ExecutionConfig {
                workspace_prefix: "not an identifier".to_string(),
                ..ExecutionConfig::default()
            })
            .build(),
        ModelsmithConfig::builder()
            .policy(PolicyConfig {
                max_code_bytes: Some(0),
                ..PolicyConfig::default()
            })
            .build(),
    ];
    for config in configs {
        let result = CodeSandbox::new(Arc::new(MemoryHost::new()), &config);
        assert!(matches!(result, Err(SandboxError::InvalidConfig(_))));
    }
}

#[test]
fn capability_descriptions_follow_the_approved_list() {
    let host = MemoryHost::new();
    let names: Vec<_> = default_sandbox(&host)
        .capability_descriptions()
        .expect("descriptions")
        .into_iter()
        .map(|description| description.name)
        .collect();
    assert_eq!(names, vec!["App", "Gui", "Part"]);
}

/// Host that parks the first workspace creation until released.
struct GatedHost {
    inner: MemoryHost,
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<Option<mpsc::Receiver<()>>>,
}

impl CadHost for GatedHost {
    fn create_workspace(&self, name: &str) -> Result<(), HostError> {
        if let Some(entered) = self.entered.lock().take() {
            entered.send(()).expect("signal entered");
            if let Some(release) = self.release.lock().take() {
                release.recv().expect("wait for release");
            }
        }
        self.inner.create_workspace(name)
    }

    fn close_workspace(&self, name: &str) -> Result<(), HostError> {
        self.inner.close_workspace(name)
    }

    fn active_workspace(&self) -> Option<String> {
        self.inner.active_workspace()
    }

    fn has_workspace(&self, name: &str) -> bool {
        self.inner.has_workspace(name)
    }

    fn refresh_view(&self) -> Result<(), HostError> {
        self.inner.refresh_view()
    }

    fn capability(&self, name: &str) -> Option<Capability> {
        self.inner.capability(name)
    }
}

#[test]
fn concurrent_attempt_is_rejected_as_busy() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let inner = MemoryHost::new();
    let host = GatedHost {
        inner: inner.clone(),
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(Some(release_rx)),
    };
    let sandbox = CodeSandbox::new(Arc::new(host), &ModelsmithConfig::default()).expect("sandbox");

    thread::scope(|scope| {
        let first = scope.spawn(|| sandbox.check_and_run(BOX_SCRIPT));
        entered_rx.recv().expect("first attempt entered");

        let err = sandbox.check_and_run(BOX_SCRIPT).unwrap_err();
        assert!(matches!(err, SandboxError::Busy));

        release_tx.send(()).expect("release");
        let outcome = first.join().expect("join").expect("outcome");
        assert!(outcome.is_success());
    });
    assert_eq!(inner.workspaces().len(), 1);
}
