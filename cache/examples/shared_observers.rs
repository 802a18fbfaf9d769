use fibre_resource::{Coordinator, Store};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct Contacts {
  version: usize,
  names: Vec<String>,
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let fetches = Arc::new(AtomicUsize::new(0));
  let store: Store<&str, Contacts> = Store::builder()
    .id("app")
    .max_resource_age(Duration::from_secs(5))
    .build()
    .unwrap();

  let fetch_contacts = {
    let fetches = fetches.clone();
    move |previous: Option<Arc<Contacts>>| {
      let version = fetches.fetch_add(1, Ordering::SeqCst) + 1;
      async move {
        println!(
          "[Producer] Fetching version {} (had {:?})",
          version,
          previous.map(|c| c.version)
        );
        tokio::time::sleep(Duration::from_millis(800)).await;
        Ok::<_, String>(Contacts {
          version,
          names: vec!["Ada".to_string(), "Grace".to_string()],
        })
      }
    }
  };

  // Two independent views of the same key.
  let list = Coordinator::builder(store.clone(), "contacts", fetch_contacts.clone())
    .long_operation_alert(Duration::from_millis(500))
    .build()
    .unwrap();
  let badge = Coordinator::builder(store.clone(), "contacts", fetch_contacts)
    .build()
    .unwrap();

  list.start().unwrap();
  badge.start().unwrap();

  tokio::time::sleep(Duration::from_millis(600)).await;
  let state = list.state();
  println!(
    "[List] loading={} long_load={} data={:?}",
    state.is_loading, state.is_long_load, state.data
  );

  tokio::time::sleep(Duration::from_millis(400)).await;
  println!("[List] {:?}", list.state().data);
  println!("[Badge] {:?}", badge.state().data);

  // An optimistic edit: every view sees it at once, then both refetch.
  store.mutate(
    "contacts",
    |previous| {
      let mut next = previous.map(|c| (*c).clone()).unwrap_or(Contacts {
        version: 0,
        names: Vec::new(),
      });
      next.names.push("Linus".to_string());
      next
    },
    true,
  );
  println!("[Badge] optimistic: {:?}", badge.state().data);

  tokio::time::sleep(Duration::from_secs(1)).await;
  println!("[Badge] confirmed: {:?}", badge.state().data);
  println!("Producer ran {} times", fetches.load(Ordering::SeqCst));

  list.stop();
  badge.stop();
  println!("{:?}", store.metrics());
}
