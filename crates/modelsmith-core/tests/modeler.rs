//! Modeler integration tests with stub generators and the in-memory host.

use modelsmith_config::ModelsmithConfig;
use modelsmith_core::{AttemptStatus, Modeler, ModelerError, PromptBuilder};
use modelsmith_protocol::{ExecutionResult, GenerationError, PolicyCategory, RunOutcome};
use modelsmith_test_utils::scripts::{
    BOX_SCRIPT, DIVIDE_BY_ZERO_SCRIPT, FENCED_BOX_SCRIPT, FILE_REMOVAL_SCRIPT, RUNAWAY_SCRIPT,
};
use modelsmith_test_utils::{FailingGenerator, FixedGenerator, RecordingGenerator, memory_sandbox};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn modeler_with(code: &str) -> (Modeler, modelsmith_sandbox::MemoryHost) {
    let (sandbox, host) = memory_sandbox(&ModelsmithConfig::default());
    (
        Modeler::new(Arc::new(FixedGenerator::new(code)), sandbox),
        host,
    )
}

#[tokio::test]
async fn generated_model_stays_in_its_workspace() {
    let (modeler, host) = modeler_with(BOX_SCRIPT);
    let report = modeler.submit("a 10x20x30 block").await.expect("submit");
    assert_eq!(report.status(), AttemptStatus::Generated);
    let RunOutcome::Completed(ExecutionResult::Success { workspace, .. }) = &report.outcome else {
        panic!("expected success, got {:?}", report.outcome);
    };
    assert_eq!(host.workspaces(), vec![workspace.clone()]);
    assert_eq!(
        report.user_message(),
        format!("Model generated in workspace {workspace}.")
    );
}

#[tokio::test]
async fn fenced_code_is_cleaned_before_checking() {
    let (modeler, host) = modeler_with(FENCED_BOX_SCRIPT);
    let report = modeler.submit("a block").await.expect("submit");
    assert!(!report.code.contains("```"));
    assert!(report.code.starts_with("let doc"));
    assert_eq!(report.status(), AttemptStatus::Generated);
    assert_eq!(host.workspaces().len(), 1);
}

#[tokio::test]
async fn denied_code_is_not_executed() {
    let (modeler, host) = modeler_with(FILE_REMOVAL_SCRIPT);
    let report = modeler.submit("clean up").await.expect("submit");
    assert_eq!(report.status(), AttemptStatus::PolicyDenied);
    let RunOutcome::Denied(violation) = &report.outcome else {
        panic!("expected denial");
    };
    assert_eq!(violation.category, PolicyCategory::FileSystem);
    assert!(report.user_message().starts_with("Unsafe code detected (file-system)"));
    assert!(report.user_message().ends_with("The code was not executed."));
    assert!(host.workspaces().is_empty());
}

#[tokio::test]
async fn faulting_code_leaves_no_workspace() {
    let (modeler, host) = modeler_with(DIVIDE_BY_ZERO_SCRIPT);
    let report = modeler.submit("a broken block").await.expect("submit");
    assert_eq!(report.status(), AttemptStatus::ExecutionFault);
    assert!(report.user_message().starts_with("Model generation failed: "));
    assert!(host.workspaces().is_empty());
}

#[tokio::test]
async fn runaway_code_is_cancelled() {
    let mut config = ModelsmithConfig::default();
    config.execution.max_operations = Some(10_000);
    let (sandbox, host) = memory_sandbox(&config);
    let modeler = Modeler::new(Arc::new(FixedGenerator::new(RUNAWAY_SCRIPT)), sandbox);
    let report = modeler.submit("spin").await.expect("submit");
    assert_eq!(report.status(), AttemptStatus::Cancelled);
    assert!(report.user_message().starts_with("Model generation cancelled: "));
    assert!(host.workspaces().is_empty());
}

#[tokio::test]
async fn blank_prompt_never_reaches_the_generator() {
    let (sandbox, _host) = memory_sandbox(&ModelsmithConfig::default());
    let generator = RecordingGenerator::new(BOX_SCRIPT);
    let modeler = Modeler::new(Arc::new(generator.clone()), sandbox);
    let err = modeler.submit("   \n").await.expect_err("empty prompt");
    assert!(matches!(err, ModelerError::EmptyPrompt));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn prompt_is_passed_trimmed() {
    let (sandbox, _host) = memory_sandbox(&ModelsmithConfig::default());
    let generator = RecordingGenerator::new(BOX_SCRIPT);
    let modeler = Modeler::new(Arc::new(generator.clone()), sandbox);
    modeler.submit("  an M8 bolt  ").await.expect("submit");
    assert_eq!(generator.prompts.lock().clone(), vec!["an M8 bolt".to_string()]);
}

#[tokio::test]
async fn generation_failure_runs_nothing() {
    let (sandbox, host) = memory_sandbox(&ModelsmithConfig::default());
    let generator = FailingGenerator::new(GenerationError::Api {
        status: 503,
        body: "overloaded".to_string(),
    });
    let modeler = Modeler::new(Arc::new(generator), sandbox);
    let err = modeler.submit("a block").await.expect_err("generation error");
    assert!(matches!(
        err,
        ModelerError::Generation(GenerationError::Api { status: 503, .. })
    ));
    assert!(host.workspaces().is_empty());
}

#[tokio::test]
async fn empty_fence_is_an_empty_response() {
    let (modeler, host) = modeler_with("```rhai\n```");
    let err = modeler.submit("a block").await.expect_err("empty code");
    assert!(matches!(
        err,
        ModelerError::Generation(GenerationError::EmptyResponse(_))
    ));
    assert!(host.workspaces().is_empty());
}

#[tokio::test]
async fn unparsable_code_is_a_malformed_response() {
    let (modeler, host) = modeler_with("let x = ;");
    let err = modeler.submit("a block").await.expect_err("syntax error");
    match err {
        ModelerError::Generation(GenerationError::MalformedResponse(message)) => {
            assert!(message.starts_with("generated code does not parse"), "{message}");
        }
        other => panic!("expected malformed response, got {other:?}"),
    }
    assert!(host.workspaces().is_empty());
}

#[tokio::test]
async fn policy_denial_wins_over_syntax_errors() {
    let (modeler, host) = modeler_with("os.system('ls'");
    let report = modeler.submit("list files").await.expect("submit");
    assert_eq!(report.status(), AttemptStatus::PolicyDenied);
    assert!(host.workspaces().is_empty());
}

#[tokio::test]
async fn each_request_gets_its_own_workspace() {
    let (modeler, host) = modeler_with(BOX_SCRIPT);
    modeler.submit("first").await.expect("first");
    modeler.submit("second").await.expect("second");
    assert_eq!(host.workspaces().len(), 2);
}

#[test]
fn prompt_lists_the_sandbox_capabilities() {
    let (sandbox, _host) = memory_sandbox(&ModelsmithConfig::default());
    let prompt = PromptBuilder::from_sandbox(&sandbox)
        .expect("descriptions")
        .build();
    for name in ["App", "Gui", "Part"] {
        assert!(prompt.contains(&format!("- `{name}`: ")), "missing {name}");
    }
    assert!(!prompt.contains("- `Sketch`: "));
}
