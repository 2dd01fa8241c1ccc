//! Dispatches a synchronous `Store` operation onto the blocking thread pool.
//! Every async call site that touches `rusqlite` goes through this so a slow
//! disk never stalls a `tokio` worker thread.

use std::sync::Arc;

use crate::error::CoreError;
use crate::store::Store;

pub async fn run<T, F>(store: &Arc<Store>, f: F) -> Result<T, CoreError>
where
    F: FnOnce(&Store) -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .expect("store blocking task panicked")
}
