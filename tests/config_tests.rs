use std::env;

use serial_test::serial;

use licforge::config::ForgeConfig;

const VARS: [&str; 7] = [
    "LICFORGE_DATA_DIR",
    "LICFORGE_KEY_FILE",
    "LICFORGE_REGISTRY_FILE",
    "LICFORGE_KEY_PREFIX",
    "LICFORGE_SEAL_WITH_MACHINE",
    "LICFORGE_LOGGING_ENABLED",
    "LICFORGE_LOG_LEVEL",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn defaults_without_environment() {
    clear_env();
    let config = ForgeConfig::load().unwrap();

    assert_eq!(config.storage.key_file, "signing_key.enc");
    assert_eq!(config.storage.registry_file, "licenses.json");
    assert!(!config.storage.seal_with_machine);
    assert_eq!(config.license.key_prefix, "LIC");
    assert!(!config.logging.enabled);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn environment_overrides_defaults() {
    clear_env();
    env::set_var("LICFORGE_DATA_DIR", "/tmp/licforge-env");
    env::set_var("LICFORGE_KEY_FILE", "issuer.key");
    env::set_var("LICFORGE_KEY_PREFIX", "ACME");
    env::set_var("LICFORGE_SEAL_WITH_MACHINE", "true");
    env::set_var("LICFORGE_LOGGING_ENABLED", "true");
    env::set_var("LICFORGE_LOG_LEVEL", "debug");

    let config = ForgeConfig::load().unwrap();
    clear_env();

    assert_eq!(
        config.key_path().unwrap(),
        std::path::PathBuf::from("/tmp/licforge-env/issuer.key")
    );
    assert_eq!(config.license.key_prefix, "ACME");
    assert!(config.storage.seal_with_machine);
    assert!(config.logging.enabled);
    assert_eq!(config.logging.level, "debug");
}

#[test]
#[serial]
fn unparsable_boolean_keeps_default() {
    clear_env();
    env::set_var("LICFORGE_SEAL_WITH_MACHINE", "maybe");

    let config = ForgeConfig::load().unwrap();
    clear_env();

    assert!(!config.storage.seal_with_machine);
}

#[test]
#[serial]
fn invalid_prefix_from_environment_fails_validation() {
    clear_env();
    env::set_var("LICFORGE_KEY_PREFIX", "not.valid");

    let config = ForgeConfig::load().unwrap();
    clear_env();

    assert!(config.validate().is_err());
}
