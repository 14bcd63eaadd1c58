//! Background loads that report back into the event loop.
//!
//! A `Query<T>` owns at most one spawned fetch. When the fetch finishes its
//! result is sent as an [`Event`] into the same channel that carries push
//! events, so loads and pushes are applied in the order they arrive.
//!
//! Every fetch carries a generation number. Starting a new fetch aborts the
//! old one, and a result from an older generation that still slips through
//! is dropped by [`Query::complete`].

use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::event::Event;

/// Result of one fetch, tagged with the generation that started it
#[derive(Debug)]
pub struct Completion<T> {
  pub generation: u64,
  pub result: Result<T, String>,
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;
type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

pub struct Query<T> {
  name: &'static str,
  fetcher: FetcherFn<T>,
  /// Wraps a completion into the event for this query's collection
  deliver: fn(Completion<T>) -> Event,
  generation: u64,
  task: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Query<T> {
  pub fn new<F, Fut>(name: &'static str, deliver: fn(Completion<T>) -> Event, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    Self {
      name,
      fetcher: Box::new(move || Box::pin(fetcher())),
      deliver,
      generation: 0,
      task: None,
    }
  }

  pub fn is_loading(&self) -> bool {
    self.task.is_some()
  }

  /// Start a fetch unless one is already running.
  pub fn fetch(&mut self, events: &mpsc::UnboundedSender<Event>) {
    if self.is_loading() {
      return;
    }
    self.start(events);
  }

  /// Start a fetch, superseding any running one.
  pub fn refetch(&mut self, events: &mpsc::UnboundedSender<Event>) {
    if let Some(task) = self.task.take() {
      tracing::debug!(query = self.name, generation = self.generation, "superseding fetch");
      task.abort();
    }
    self.start(events);
  }

  fn start(&mut self, events: &mpsc::UnboundedSender<Event>) {
    self.generation = self.generation.wrapping_add(1);
    let generation = self.generation;
    tracing::debug!(query = self.name, generation, "query fetching");

    let future = (self.fetcher)();
    let deliver = self.deliver;
    let events = events.clone();
    self.task = Some(tokio::spawn(async move {
      let result = future.await;
      // The loop may be gone already
      let _ = events.send(deliver(Completion { generation, result }));
    }));
  }

  /// Accept a completion delivered through the event loop.
  ///
  /// Returns the result if it belongs to the current fetch, `None` if it
  /// was superseded.
  pub fn complete(&mut self, done: Completion<T>) -> Option<Result<T, String>> {
    if done.generation != self.generation {
      tracing::debug!(
        query = self.name,
        stale = done.generation,
        current = self.generation,
        "dropping superseded result"
      );
      return None;
    }
    self.task = None;
    match &done.result {
      Ok(_) => tracing::debug!(query = self.name, "query succeeded"),
      Err(error) => tracing::warn!(query = self.name, %error, "query failed"),
    }
    Some(done.result)
  }
}

impl<T> Drop for Query<T> {
  fn drop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

impl<T> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("name", &self.name)
      .field("generation", &self.generation)
      .field("loading", &self.task.is_some())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheResult;
  use crate::event::Loaded;
  use crate::inventory::types::Maquina;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  type Maquinas = CacheResult<Vec<Maquina>>;

  fn maquina(id: &str) -> Maquina {
    Maquina {
      id: id.to_string(),
      nombre: format!("Maquina {}", id),
    }
  }

  async fn next_completion(rx: &mut mpsc::UnboundedReceiver<Event>) -> Completion<Maquinas> {
    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
      .await
      .expect("completion in time")
      .expect("channel open");
    match event {
      Event::Loaded(Loaded::Maquinas(done)) => done,
      other => panic!("expected maquinas completion, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_result_arrives_as_event() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut query: Query<Maquinas> = Query::new("maquinas", Loaded::maquinas, || async {
      Ok(CacheResult::from_network(vec![maquina("m1")]))
    });

    query.fetch(&tx);
    assert!(query.is_loading());

    let done = next_completion(&mut rx).await;
    let result = query.complete(done).expect("current").expect("ok");
    assert_eq!(result.data, vec![maquina("m1")]);
    assert!(!query.is_loading());
  }

  #[tokio::test]
  async fn test_error_is_delivered() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut query: Query<Maquinas> =
      Query::new("maquinas", Loaded::maquinas, || async { Err("offline".to_string()) });

    query.fetch(&tx);
    let done = next_completion(&mut rx).await;
    assert!(matches!(query.complete(done), Some(Err(e)) if e == "offline"));
  }

  #[tokio::test]
  async fn test_fetch_while_loading_is_noop() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut query: Query<Maquinas> = Query::new("maquinas", Loaded::maquinas, move || {
      counter.fetch_add(1, Ordering::SeqCst);
      async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(CacheResult::from_network(Vec::new()))
      }
    });

    query.fetch(&tx);
    query.fetch(&tx);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_refetch_supersedes_running_fetch() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut query: Query<Maquinas> = Query::new("maquinas", Loaded::maquinas, move || {
      let n = counter.fetch_add(1, Ordering::SeqCst);
      async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(CacheResult::from_network(vec![maquina(&format!("m{}", n))]))
      }
    });

    query.fetch(&tx);
    query.refetch(&tx);

    let done = next_completion(&mut rx).await;
    let result = query.complete(done).expect("current").expect("ok");
    assert_eq!(result.data, vec![maquina("m1")]);
    // The aborted first fetch never reports
    assert!(tokio::time::timeout(Duration::from_millis(100), rx.recv()).await.is_err());
  }

  #[tokio::test]
  async fn test_superseded_completion_is_dropped() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut query: Query<Maquinas> = Query::new("maquinas", Loaded::maquinas, || async {
      Ok(CacheResult::from_network(Vec::new()))
    });

    query.fetch(&tx);
    let early = next_completion(&mut rx).await;
    query.refetch(&tx);

    assert!(query.complete(early).is_none());
    assert!(query.is_loading());
    let done = next_completion(&mut rx).await;
    assert!(query.complete(done).is_some());
  }
}
