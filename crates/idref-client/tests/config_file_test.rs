use std::io::Write;

use idref_client::{ConfigError, ExternalServicesConfig};

#[test]
fn loads_yaml_file() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(
        file,
        r#"
handle_service:
  url: https://kbase.us/services/handle_service
  token: hs-token
sample_service:
  url: https://kbase.us/services/service_wizard
  token: ss-token
  service_version: beta
timeout_secs: 5
"#
    )
    .expect("write");

    let cfg = ExternalServicesConfig::from_yaml_file(file.path()).expect("config");
    let hs = cfg.handle_service.expect("handle service");
    assert_eq!(hs.url.as_str(), "https://kbase.us/services/handle_service");
    assert_eq!(hs.token.as_str(), "hs-token");
    let ss = cfg.sample_service.expect("sample service");
    assert_eq!(ss.service_version.as_deref(), Some("beta"));
    assert!(cfg.shock.is_none());
    assert_eq!(cfg.timeout_secs, 5);
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = ExternalServicesConfig::from_yaml_file(&dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn shock_section_without_user_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(file, "shock:\n  url: http://localhost:7044\n  token: t").expect("write");
    let err = ExternalServicesConfig::from_yaml_file(file.path()).unwrap_err();
    assert_eq!(err.to_string(), "shock: the user name the token belongs to is required");
}
