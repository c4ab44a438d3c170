//! End-to-end render passes against in-memory state

use rigging_core::{MemoryStateStore, Release};
use rigging_render::resolver::ValidationErrorKind;
use rigging_render::{
    ControlPlane, DaemonConfirmer, HeadlessResolver, Planner, RenderError, RenderOptions,
    RenderOutcome, RenderStep,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn release(confirm: bool) -> Release {
    let yaml = format!(
        r#"
metadata:
  app_slug: acme
  release_id: rel-7
config:
  - name: main
    items:
      - name: hostname
        required: true
      - name: replicas
        default: "2"
      - name: url
        value: 'https://{{{{repl ConfigOption("hostname") }}}}'
assets:
  - inline:
      contents: |
        host: {{{{repl ConfigOption("hostname") }}}}
        replicas: {{{{repl ConfigOption("replicas") }}}}
        url: {{{{repl ConfigOption("url") }}}}
      dest: manifests/config.yaml
  - inline:
      contents: debug
      dest: debug.txt
      when: '{{{{repl ConfigOptionEquals("replicas", "1") }}}}'
lifecycle:
  - render:
      root: out
      confirm: {confirm}
"#
    );
    Release::from_yaml(&yaml).unwrap()
}

fn step(root: &Path, state: Arc<MemoryStateStore>) -> RenderStep {
    let options = RenderOptions::new(root);
    let resolver = Arc::new(HeadlessResolver::new(options.state_path()));
    let planner = Planner::new(options.clone()).unwrap();
    RenderStep::new(options, state, resolver, planner)
}

fn previous(hostname: &str) -> rigging_core::ConfigValues {
    [("hostname".to_string(), hostname.to_string())]
        .into_iter()
        .collect()
}

#[tokio::test]
async fn test_missing_required_value_aborts_before_persisting() {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(MemoryStateStore::new());

    let err = step(dir.path(), state.clone())
        .run(&CancellationToken::new(), &release(false))
        .await
        .unwrap_err();

    match err {
        RenderError::Validation { errors } => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].name, "hostname");
            assert_eq!(errors[0].kind, ValidationErrorKind::MissingRequiredValue);
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    assert_eq!(state.operation_counts().saves, 0);
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn test_render_writes_assets_and_persists_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(MemoryStateStore::with_config(previous("example.com")));

    let outcome = step(dir.path(), state.clone())
        .run(&CancellationToken::new(), &release(false))
        .await
        .unwrap();
    assert_eq!(outcome, RenderOutcome::Rendered { steps: 1 });

    let written = std::fs::read_to_string(dir.path().join("out/manifests/config.yaml")).unwrap();
    assert_eq!(
        written,
        "host: example.com\nreplicas: 2\nurl: https://example.com\n"
    );
    assert!(!dir.path().join("out/debug.txt").exists());

    let snapshot = state.snapshot();
    let persisted = snapshot.config();
    assert_eq!(persisted.get("hostname").map(String::as_str), Some("example.com"));
    assert_eq!(persisted.get("url").map(String::as_str), Some("https://example.com"));
    assert!(!persisted.contains_key("replicas"));
}

#[tokio::test]
async fn test_second_pass_backs_up_previous_output() {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(MemoryStateStore::with_config(previous("one.example.com")));
    let cancel = CancellationToken::new();

    step(dir.path(), state.clone())
        .run(&cancel, &release(false))
        .await
        .unwrap();

    let state = Arc::new(MemoryStateStore::with_config(previous("two.example.com")));
    step(dir.path(), state)
        .run(&cancel, &release(false))
        .await
        .unwrap();

    let current = std::fs::read_to_string(dir.path().join("out/manifests/config.yaml")).unwrap();
    let backup = std::fs::read_to_string(dir.path().join("out.bak/manifests/config.yaml")).unwrap();
    assert!(current.starts_with("host: two.example.com"));
    assert!(backup.starts_with("host: one.example.com"));
}

#[tokio::test]
async fn test_declined_plan_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(MemoryStateStore::with_config(previous("example.com")));
    let plane = Arc::new(ControlPlane::new());

    let ui = Arc::clone(&plane);
    tokio::spawn(async move {
        while ui.confirm_plan(false).is_err() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let outcome = step(dir.path(), state)
        .with_confirmer(Arc::new(DaemonConfirmer::new(
            plane.clone(),
            Duration::from_millis(50),
        )))
        .run(&CancellationToken::new(), &release(true))
        .await
        .unwrap();

    assert_eq!(outcome, RenderOutcome::Declined);
    assert!(!dir.path().join("out/manifests/config.yaml").exists());
}

#[tokio::test]
async fn test_cancelled_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(MemoryStateStore::with_config(previous("example.com")));
    let plane = Arc::new(ControlPlane::new());
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    let ui = Arc::clone(&plane);
    tokio::spawn(async move {
        while ui.current_step().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        canceller.cancel();
    });

    let err = step(dir.path(), state)
        .with_confirmer(Arc::new(DaemonConfirmer::new(plane, Duration::from_millis(50))))
        .run(&cancel, &release(true))
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(!dir.path().join("out/manifests/config.yaml").exists());
    assert!(matches!(err, RenderError::Context { ref context, .. } if context == "confirm plan"));
}
