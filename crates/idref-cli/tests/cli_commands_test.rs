//! Subcommand handlers driven over in-memory services and files on disk.

use std::io::Write;
use std::sync::Arc;

use idref_cli::grant::{run_grant, GrantArgs};
use idref_cli::resolve::{resolve_document, run_resolve, IdDocument, ResolveArgs};
use idref_client::mock::{HandleCall, MockHandleService, MockShock, ShockCall};
use idref_core::{AuthToken, IdReferenceHandlerSetFactoryBuilder};
use idref_handlers::{HandleIdHandlerFactory, ShockIdHandlerFactory};

fn registry(handle: &MockHandleService, shock: &MockShock) -> IdReferenceHandlerSetFactoryBuilder<String> {
    shock.add_admin("wsadmin");
    IdReferenceHandlerSetFactoryBuilder::builder(100)
        .with_factory(HandleIdHandlerFactory::new(Arc::new(handle.clone()), Arc::new(handle.clone())))
        .with_factory(ShockIdHandlerFactory::new(Arc::new(shock.clone()), shock.client("wsadmin")))
        .build()
}

fn write_temp(text: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(text.as_bytes()).unwrap();
    f
}

#[test]
fn resolve_keeps_document_shape() {
    let handle = MockHandleService::new();
    handle.add_readable(&["KBH_1", "KBH_2"]);
    let shock = MockShock::new();
    let node = shock.add_node("amy");

    let doc: IdDocument = serde_json::from_value(serde_json::json!({
        "reads": {"handle": ["KBH_2", "KBH_1"], "shock": [node.as_str()]},
        "assembly": {"handle": ["KBH_1"], "shock": [node.as_str()]},
    }))
    .unwrap();
    let out = resolve_document(
        &doc,
        AuthToken::new("amy-token", "amy").unwrap(),
        &registry(&handle, &shock),
    )
    .unwrap();

    assert_eq!(out["reads"]["handle"], vec!["KBH_2", "KBH_1"]);
    let copy = &out["reads"]["shock"][0];
    assert_ne!(copy, node.as_str());
    assert_eq!(&out["assembly"]["shock"][0], copy);
    assert_eq!(shock.source_of(copy).as_deref(), Some(node.as_str()));
    assert_eq!(
        handle
            .calls()
            .iter()
            .filter(|c| matches!(c, HandleCall::AreReadable { .. }))
            .count(),
        1
    );
}

#[test]
fn resolve_rejects_unknown_type() {
    let (handle, shock) = (MockHandleService::new(), MockShock::new());
    let doc: IdDocument = serde_json::from_str(r#"{"o1": {"gff": ["x"]}}"#).unwrap();
    let err = resolve_document(&doc, AuthToken::new("t", "amy").unwrap(), &registry(&handle, &shock)).unwrap_err();
    assert_eq!(err.to_string(), "There is no handler registered for the ID type gff");
}

#[test]
fn run_resolve_reads_file_and_token_env() {
    let handle = MockHandleService::new();
    handle.add_readable(&["KBH_9"]);
    let shock = MockShock::new();
    let doc = write_temp(r#"{"o1": {"handle": ["KBH_9"]}}"#);
    std::env::set_var("IDREF_CLI_TEST_TOKEN", "amy-token");
    let args = ResolveArgs {
        user: "amy".into(),
        token_env: "IDREF_CLI_TEST_TOKEN".into(),
        document: doc.path().to_path_buf(),
    };

    let mut out = Vec::new();
    assert_eq!(run_resolve(&args, &registry(&handle, &shock), &mut out).unwrap(), 0);
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v, serde_json::json!({"o1": {"handle": ["KBH_9"]}}));
}

#[test]
fn run_resolve_needs_token() {
    let (handle, shock) = (MockHandleService::new(), MockShock::new());
    let doc = write_temp(r#"{"o1": {"handle": ["KBH_9"]}}"#);
    let args = ResolveArgs {
        user: "amy".into(),
        token_env: "IDREF_CLI_TEST_UNSET_TOKEN".into(),
        document: doc.path().to_path_buf(),
    };
    let err = run_resolve(&args, &registry(&handle, &shock), &mut Vec::new()).unwrap_err();
    assert_eq!(err.to_string(), "environment variable IDREF_CLI_TEST_UNSET_TOKEN is not set");
    assert!(handle.calls().is_empty());
}

#[test]
fn run_resolve_reports_bad_json() {
    let (handle, shock) = (MockHandleService::new(), MockShock::new());
    let doc = write_temp("not json");
    let args = ResolveArgs {
        user: "amy".into(),
        token_env: "IDREF_CLI_TEST_TOKEN".into(),
        document: doc.path().to_path_buf(),
    };
    let err = run_resolve(&args, &registry(&handle, &shock), &mut Vec::new()).unwrap_err();
    assert!(err.to_string().starts_with("failed to parse"));
}

#[test]
fn grant_to_user_and_public() {
    let handle = MockHandleService::new();
    let shock = MockShock::new();
    let node = shock.add_node("wsadmin");
    let reg = registry(&handle, &shock);

    let mut out = Vec::new();
    let args = GrantArgs {
        id_type: "shock".into(),
        user: Some("bob".into()),
        public: false,
        ids: vec![node.to_string()],
    };
    assert_eq!(run_grant(&args, &reg, &mut out).unwrap(), 0);
    assert_eq!(String::from_utf8(out).unwrap(), "OK: granted bob read access to 1 shock id(s)\n");
    assert!(shock.acl_of(&node).unwrap().read.contains(&"bob".to_string()));
    assert!(shock
        .calls()
        .iter()
        .any(|c| matches!(c, ShockCall::AddToAcl { users, .. } if users == &vec!["bob".to_string()])));

    let args = GrantArgs {
        id_type: "handle".into(),
        user: None,
        public: true,
        ids: vec!["KBH_1".into(), "KBH_2".into()],
    };
    assert_eq!(run_grant(&args, &reg, &mut Vec::new()).unwrap(), 0);
    assert!(handle.is_public("KBH_1") && handle.is_public("KBH_2"));
}

#[test]
fn grant_failure_carries_cause() {
    let handle = MockHandleService::new();
    let shock = MockShock::new();
    let args = GrantArgs {
        id_type: "shock".into(),
        user: Some("bob".into()),
        public: false,
        ids: vec!["a1b2c3d4-e5f6-4a5b-8c7d-0123456789ab".into()],
    };
    let err = run_grant(&args, &registry(&handle, &shock), &mut Vec::new()).unwrap_err();
    assert_eq!(err.to_string(), "failed to grant read access on shock ids");
    assert!(format!("{err:#}").contains("a1b2c3d4-e5f6-4a5b-8c7d-0123456789ab"));
}

#[test]
fn config_file_is_loaded() {
    let f = write_temp("handle_service: {url: \"http://localhost:1/hs\", token: t}\nmax_unique_ids: 5\n");
    let cfg = idref_cli::load_config(Some(f.path())).unwrap();
    assert_eq!(cfg.max_unique_ids, 5);
    assert!(cfg.handle_service.is_some());
    assert!(cfg.shock.is_none());

    let err = idref_cli::load_config(Some(std::path::Path::new("/nonexistent/idref.yaml"))).unwrap_err();
    assert!(err.to_string().starts_with("failed to load configuration from /nonexistent/idref.yaml"));
}
