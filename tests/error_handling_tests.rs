//! Error taxonomy tests
//! Configuration errors stop everything before a session exists; logout errors never escalate

use nessie_export::{
    config::AppConfig,
    core::{MockCall, MockScanService},
    run_export_workflow, Credentials, ExportError, ExportFormat, ExportJob, NessusClient, Poller,
    ScanId, ScanService, ServiceConfig,
};
use std::sync::Arc;

#[test]
fn test_configuration_errors_surface_before_any_request() {
    let configs = vec![
        ServiceConfig::new("nessus.local:8834"),
        ServiceConfig::new("https://nessus.local:8834").with_request_timeout(0),
        ServiceConfig::new("https://nessus.local:8834")
            .with_fingerprints(vec!["definitely not a fingerprint".to_string()]),
        ServiceConfig::new("https://nessus.local:8834").with_ca_cert("/nonexistent/ca.pem".into()),
    ];

    for config in configs {
        let err = NessusClient::new(&config).unwrap_err();
        assert!(matches!(err, ExportError::ConfigError(_)), "{:?}: {}", config, err);
        assert_eq!(err.exit_code(), 2);
    }
}

#[test]
fn test_config_file_errors() {
    let err = AppConfig::from_toml_file("/nonexistent/nessie-export.toml").unwrap_err();
    assert!(matches!(err, ExportError::ConfigError(_)));

    let err = AppConfig::from_toml_str("[workflow]\nformat = \"docx\"\n").unwrap_err();
    assert_eq!(err.kind(), "configuration");
}

#[tokio::test(start_paused = true)]
async fn test_fatal_errors_are_returned_as_single_value() {
    let mock = Arc::new(MockScanService::new().status("running").status_error("502 Bad Gateway"));
    let service: Arc<dyn ScanService> = Arc::clone(&mock) as Arc<dyn ScanService>;
    let job = ExportJob::new(ScanId(13), None, ExportFormat::Nessus);

    let err = run_export_workflow(service, &Credentials::new("a", "b"), &job, &Poller::default())
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(err.kind(), "remote");
    assert!(err.to_string().contains("502 Bad Gateway"));
    assert_eq!(mock.count(|c| matches!(c, MockCall::EndSession { .. })), 1);
}

#[test]
fn test_logout_error_is_not_fatal() {
    let err = ExportError::LogoutError("token already expired".to_string());
    assert!(!err.is_fatal());
    assert_eq!(err.kind(), "logout");
}
