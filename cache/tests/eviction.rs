mod common;

use common::{Event, Recorder};
use fibre_resource::{BuildError, Store, DEFAULT_MAX_RESOURCE_AGE};
use tokio::time::{sleep, Duration};

const MAX_AGE: Duration = Duration::from_millis(1000);

fn build_store() -> Store<&'static str, u32> {
  Store::builder()
    .id("eviction")
    .max_resource_age(MAX_AGE)
    .build()
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_idle_resource_is_evicted_after_max_age() {
  let store = build_store();
  let recorder = Recorder::new();
  let _sub = store.read(&"k", recorder.subscriber()).unwrap();

  sleep(Duration::from_millis(950)).await;
  assert!(store.contains_key(&"k"), "should survive until max age elapses");

  sleep(Duration::from_millis(100)).await;
  assert!(!store.contains_key(&"k"), "should be evicted once idle for max age");
  assert_eq!(recorder.events(), vec![Event::Evicted]);
  assert_eq!(store.metrics().evicted_idle, 1);
}

#[tokio::test(start_paused = true)]
async fn test_access_rearms_the_timer() {
  let store = build_store();
  let _first = store.read(&"k", Recorder::new().subscriber()).unwrap();

  // Access again at 0.9 of the max age.
  sleep(Duration::from_millis(900)).await;
  let _second = store.read(&"k", Recorder::new().subscriber()).unwrap();

  sleep(Duration::from_millis(200)).await;
  assert!(store.contains_key(&"k"), "the first deadline was cancelled by the second access");

  sleep(Duration::from_millis(750)).await;
  assert!(store.contains_key(&"k"), "still within max age of the last access");

  sleep(Duration::from_millis(100)).await;
  assert!(!store.contains_key(&"k"), "evicted max age after the last access");
}

#[tokio::test(start_paused = true)]
async fn test_write_rearms_the_timer() {
  let store = build_store();
  store.write("k", 1);

  sleep(Duration::from_millis(800)).await;
  store.write("k", 2);

  sleep(Duration::from_millis(800)).await;
  assert_eq!(store.peek(&"k").map(|v| *v), Some(2));

  sleep(Duration::from_millis(300)).await;
  assert!(store.peek(&"k").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_peek_does_not_count_as_access() {
  let store = build_store();
  store.write("k", 1);

  sleep(Duration::from_millis(900)).await;
  assert!(store.peek(&"k").is_some());
  assert!(store.contains_key(&"k"));

  sleep(Duration::from_millis(200)).await;
  assert!(!store.contains_key(&"k"));
}

#[tokio::test(start_paused = true)]
async fn test_resource_after_idle_eviction_starts_fresh() {
  let store = build_store();
  store.write("k", 1);
  sleep(Duration::from_millis(1100)).await;
  assert!(!store.contains_key(&"k"));

  let sub = store.read(&"k", Recorder::new().subscriber()).unwrap();
  assert!(sub.initial_value().is_none());

  // The replacement gets its own full max age.
  sleep(Duration::from_millis(900)).await;
  assert!(store.contains_key(&"k"));
  sleep(Duration::from_millis(200)).await;
  assert!(!store.contains_key(&"k"));
  assert_eq!(store.metrics().evicted_idle, 2);
}

#[tokio::test(start_paused = true)]
async fn test_manual_eviction_cancels_the_timer() {
  let store = build_store();
  store.write("k", 1);
  store.evict(&"k");

  sleep(Duration::from_millis(500)).await;
  store.write("k", 2);

  // The first resource's timer would have fired at 1000ms.
  sleep(Duration::from_millis(600)).await;
  assert_eq!(store.peek(&"k").map(|v| *v), Some(2));

  let metrics = store.metrics();
  assert_eq!(metrics.evicted_manually, 1);
  assert_eq!(metrics.evicted_idle, 0);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_eviction_keeps_resources() {
  let store: Store<&str, u32> = Store::builder().no_eviction().build().unwrap();
  store.write("k", 1);

  sleep(DEFAULT_MAX_RESOURCE_AGE * 10).await;
  assert_eq!(store.peek(&"k").map(|v| *v), Some(1));
  assert_eq!(store.max_resource_age(), None);
}

#[tokio::test]
async fn test_default_max_age_is_applied() {
  let store: Store<&str, u32> = Store::builder().build().unwrap();
  assert_eq!(store.max_resource_age(), Some(DEFAULT_MAX_RESOURCE_AGE));
  assert!(store.runtime().is_some());
}

#[test]
fn test_eviction_outside_runtime_requires_handle() {
  let err = Store::<&str, u32>::builder().build().unwrap_err();
  assert_eq!(err, BuildError::RuntimeRequired);

  let store = Store::<&str, u32>::builder().no_eviction().build();
  assert!(store.is_ok(), "a store without eviction needs no runtime");
}

#[test]
fn test_zero_max_age_is_rejected() {
  let err = Store::<&str, u32>::builder()
    .max_resource_age(Duration::ZERO)
    .build()
    .unwrap_err();
  assert_eq!(err, BuildError::ZeroMaxAge);
}

#[test]
fn test_explicit_runtime_handle_is_used() {
  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_time()
    .start_paused(true)
    .build()
    .unwrap();

  let store: Store<&str, u32> = Store::builder()
    .max_resource_age(MAX_AGE)
    .runtime(runtime.handle().clone())
    .build()
    .unwrap();
  store.write("k", 1);

  runtime.block_on(async {
    sleep(Duration::from_millis(1100)).await;
  });
  assert!(!store.contains_key(&"k"));
}
