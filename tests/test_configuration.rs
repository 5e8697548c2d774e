use proxykit::frontend::config::{ProxyConfig, CONFIG_FILE_NAME};
use proxykit::{CallerScope, Object, ProxyFactory, ProxyKind, Schema, Value};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const SCHEMA: &str = r#"
[[class]]
name = "Account"

[[class.field]]
name = "id"
default = 0

[[class.field]]
name = "balance"
visibility = "private"
default = 100

[[class.method]]
name = "balance"
body = { kind = "get", property = "balance" }

[[class.method]]
name = "deposit"
params = [{ name = "amount" }]
body = { kind = "set", property = "balance" }
"#;

const CONFIG: &str = r#"
[ghost]
initialize_on_method_call = true

[ghost.skipped_properties]
Account = ["id"]

[naming]
namespace = "Bank"
"#;

fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("schema.toml"), SCHEMA).unwrap();
    fs::write(dir.path().join(CONFIG_FILE_NAME), CONFIG).unwrap();
    dir
}

#[test]
fn test_config_is_discovered_from_nested_directory() {
    let dir = workspace();
    let nested = dir.path().join("a").join("b");
    fs::create_dir_all(&nested).unwrap();

    let (path, config) = ProxyConfig::discover_from(&nested).unwrap();
    assert_eq!(path, dir.path().join(CONFIG_FILE_NAME));
    assert!(config.ghost.initialize_on_method_call);
    assert_eq!(config.naming.namespace, "Bank");
    assert_eq!(config.skipped_for("Account"), &["id".to_string()]);
}

#[test]
fn test_schema_and_config_drive_ghost_behavior() {
    let dir = workspace();
    let registry = Schema::load(&dir.path().join("schema.toml"))
        .unwrap()
        .into_registry()
        .unwrap();
    let config = ProxyConfig::load(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
    let factory = ProxyFactory::with_config(Arc::new(registry), config);

    let definition = factory.definition(ProxyKind::Ghost, "Account").unwrap();
    assert!(definition.name().starts_with("Bank\\__PM__\\Account\\Generated"));

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut ghost = factory
        .create_ghost("Account", move |init| {
            counter.fetch_add(1, Ordering::SeqCst);
            init.properties().set_private("Account", "balance", 250i64);
            Ok(())
        })
        .unwrap();
    let outside = CallerScope::Outside;

    // Skipped
    ghost.set_property(&outside, "id", Value::Int(7)).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Method calls are gated by configuration
    assert_eq!(ghost.call_method(&outside, "balance", &[]).unwrap(), Value::Int(250));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(ghost.get_property(&outside, "id").unwrap(), Value::Int(7));

    ghost.call_method(&outside, "deposit", &[Value::Int(300)]).unwrap();
    assert_eq!(ghost.call_method(&outside, "balance", &[]).unwrap(), Value::Int(300));
}

#[test]
fn test_config_round_trips_through_toml() {
    let mut config = ProxyConfig::parse(CONFIG).unwrap();
    config.scope.allow_dynamic_properties = false;

    let rendered = config.to_toml().unwrap();
    assert_eq!(ProxyConfig::parse(&rendered).unwrap(), config);
}

#[test]
fn test_missing_files_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    assert!(ProxyConfig::load(&dir.path().join("absent.toml")).is_err());
    assert!(Schema::load(&dir.path().join("absent.json")).is_err());
}
