use std::collections::HashSet;
use std::sync::Arc;

use licforge::machine::{FALLBACK_MACHINE_ID, FINGERPRINT_LEN};
use licforge::{
    ErrorKind, KeyManager, LicenseKeyFormat, LicenseRegistry, LicenseService, ValidationStatus,
};

fn service(dir: &tempfile::TempDir) -> LicenseService {
    LicenseService::new(
        Arc::new(KeyManager::new(dir.path().join("signing_key.enc"), false)),
        Arc::new(LicenseRegistry::open(dir.path().join("licenses.json"))),
        LicenseKeyFormat::default(),
    )
}

#[tokio::test]
async fn generate_validate_list_delete() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    let key = service
        .generate_license_key(
            "Acme".into(),
            "ops@acme.test".into(),
            365,
            vec!["basic".into(), "export".into()],
        )
        .await
        .unwrap();

    let result = service.validate_license_key(key.clone()).await.unwrap();
    assert!(result.is_valid);
    let id = result.info.unwrap().license_id;

    let listed = service.get_licenses().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].license_id, id);

    assert!(service.delete_license_by_id(id.clone()).await.unwrap());
    assert!(!service.delete_license_by_id(id).await.unwrap());
    assert!(service.get_licenses().await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_input_is_reported_as_error() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    let err = service
        .generate_license_key("".into(), "ops@acme.test".into(), 30, vec![])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
    assert!(service.get_licenses().await.unwrap().is_empty());
}

#[tokio::test]
async fn bound_license_against_current_machine() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);
    let machine = service.get_current_machine_id().await.unwrap();

    let issued = service
        .generate_license_key_with_machine_code(
            "Acme".into(),
            "ops@acme.test".into(),
            30,
            vec![],
            machine.fingerprint.clone(),
        )
        .await;

    if machine.degraded {
        assert_eq!(machine.fingerprint, FALLBACK_MACHINE_ID);
        assert_eq!(issued.unwrap_err().kind(), ErrorKind::Input);
        return;
    }

    assert_eq!(machine.fingerprint.len(), FINGERPRINT_LEN);
    let key = issued.unwrap();

    let here = service
        .validate_license_key_with_machine_code(key.clone(), machine.fingerprint)
        .await
        .unwrap();
    assert!(here.is_valid);

    let there = service
        .validate_license_key_with_machine_code(key, "NOT-THIS-MACHINE".into())
        .await
        .unwrap();
    assert_eq!(there.status, ValidationStatus::MachineMismatch);
}

#[tokio::test]
async fn validation_leaves_a_fresh_installation_untouched() {
    let issuing_dir = tempfile::tempdir().unwrap();
    let key = service(&issuing_dir)
        .generate_license_key("Acme".into(), "ops@acme.test".into(), 30, vec![])
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let fresh = service(&dir);
    let result = fresh.validate_license_key(key).await.unwrap();

    assert_eq!(result.status, ValidationStatus::InvalidSignature);
    assert!(!dir.path().join("signing_key.enc").exists());
    assert!(!dir.path().join("licenses.json").exists());
}

#[tokio::test]
async fn exports_pem_public_key() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    let pem = service.export_license_public_key().await.unwrap();
    assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
    assert!(pem.trim_end().ends_with("-----END PUBLIC KEY-----"));
    assert!(dir.path().join("signing_key.enc").exists());

    assert_eq!(service.export_license_public_key().await.unwrap(), pem);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_issuance_shares_one_key_and_registry() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .generate_license_key(
                    format!("Customer {i}"),
                    format!("c{i}@example.test"),
                    30,
                    vec!["basic".into()],
                )
                .await
        }));
    }

    let mut keys = Vec::new();
    for handle in handles {
        keys.push(handle.await.unwrap().unwrap());
    }

    let ids: HashSet<String> = service
        .get_licenses()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.license_id)
        .collect();
    assert_eq!(ids.len(), 8);

    for key in keys {
        let result = service.validate_license_key(key).await.unwrap();
        assert!(result.is_valid);
        assert!(ids.contains(&result.info.unwrap().license_id));
    }
}

#[tokio::test]
async fn from_config_uses_configured_paths_and_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = licforge::config::ForgeConfig::with_data_dir(dir.path());
    config.storage.seal_with_machine = false;
    config.license.key_prefix = "ACME".to_string();

    let service = LicenseService::from_config(&config).unwrap();
    let key = service
        .generate_license_key("Acme".into(), "ops@acme.test".into(), 30, vec![])
        .await
        .unwrap();

    assert!(key.starts_with("ACME."));
    assert!(dir.path().join("signing_key.enc").exists());
    assert!(dir.path().join("licenses.json").exists());
    assert!(service.validate_license_key(key).await.unwrap().is_valid);
}
