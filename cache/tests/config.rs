#![cfg(feature = "serde")]

use std::time::Duration;

use fibre_resource::{FetchConfig, Store, StoreBuilder, StoreConfig, DEFAULT_MAX_RESOURCE_AGE};

#[test]
fn test_store_config_defaults() {
  let config = StoreConfig::default();
  assert_eq!(config.id, "store");
  assert_eq!(config.max_resource_age, Some(DEFAULT_MAX_RESOURCE_AGE));
}

#[test]
fn test_partial_store_config_fills_defaults() {
  let config: StoreConfig = serde_json::from_str(r#"{ "id": "contacts" }"#).unwrap();
  assert_eq!(config.id, "contacts");
  assert_eq!(config.max_resource_age, Some(DEFAULT_MAX_RESOURCE_AGE));

  let config: StoreConfig = serde_json::from_str(r#"{ "max_resource_age": null }"#).unwrap();
  assert_eq!(config.id, "store");
  assert_eq!(config.max_resource_age, None, "null disables eviction");
}

#[test]
fn test_store_config_round_trips() {
  let config = StoreConfig {
    id: "users".to_string(),
    max_resource_age: Some(Duration::from_secs(30)),
  };
  let json = serde_json::to_string(&config).unwrap();
  let back: StoreConfig = serde_json::from_str(&json).unwrap();
  assert_eq!(back, config);
}

#[test]
fn test_partial_fetch_config_fills_defaults() {
  let config: FetchConfig = serde_json::from_str(r#"{ "skip": true }"#).unwrap();
  assert!(config.skip);
  assert!(config.revalidate_on_focus);
  assert_eq!(config.long_operation_alert, None);

  let config: FetchConfig =
    serde_json::from_str(r#"{ "long_operation_alert": { "secs": 2, "nanos": 0 } }"#).unwrap();
  assert_eq!(config.long_operation_alert, Some(Duration::from_secs(2)));
  assert!(!config.skip);
}

#[test]
fn test_builder_from_loaded_config() {
  let config: StoreConfig = serde_json::from_str(r#"{ "id": "loaded", "max_resource_age": null }"#).unwrap();
  let store: Store<String, u32> = StoreBuilder::from_config(config).build().unwrap();

  assert_eq!(store.id(), "loaded");
  assert_eq!(store.max_resource_age(), None);
}
