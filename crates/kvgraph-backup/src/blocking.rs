//! Synchronous facade over an async [`Backup`].

use std::sync::Arc;

use kvgraph_store::KeyValueStore;
use tokio::runtime::{Builder, Runtime};

use crate::error::BackupResult;
use crate::traits::Backup;

/// Blocking wrappers for every [`Backup`] hook.
///
/// Each call drives the async hook to completion on a private
/// current-thread runtime. Meant for callers outside any async context;
/// calling it from inside a tokio runtime panics, as `block_on` does.
pub struct BlockingBackup<B: Backup> {
    inner: Arc<B>,
    runtime: Runtime,
}

macro_rules! blocking {
    ($( $(#[$doc:meta])* fn $name:ident($($arg:ident: $ty:ty),*); )*) => {
        $(
            $(#[$doc])*
            pub fn $name(&self, $($arg: $ty),*) -> BackupResult<()> {
                self.runtime.block_on(self.inner.$name($($arg),*))
            }
        )*
    };
}

impl<B: Backup> BlockingBackup<B> {
    pub fn new(inner: Arc<B>) -> BackupResult<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { inner, runtime })
    }

    /// The wrapped async backup.
    pub fn inner(&self) -> &Arc<B> {
        &self.inner
    }

    blocking! {
        fn restore_hash(store: &dyn KeyValueStore, key: &str);
        fn update_hash(key: &str, fields: &[(String, String)]);
        fn update_hash_value(key: &str, field: &str, value: &str);
        fn delete_hash(key: &str);
        fn delete_hash_value(key: &str, field: &str);

        fn restore_list(store: &dyn KeyValueStore, key: &str);
        fn add_list_item(key: &str, value: &str);
        fn push_front_list_item(key: &str, value: &str);
        fn remove_list_item(key: &str, value: &str);
        fn update_list_item(key: &str, old: &str, new: &str);
        fn delete_list(key: &str);

        fn restore_set(store: &dyn KeyValueStore, key: &str);
        fn add_set_item(key: &str, member: &str, score: f64);
        fn update_set_item(key: &str, member: &str, score: f64);
        fn remove_set_item(key: &str, member: &str);
        fn delete_set(key: &str);

        fn restore_string(store: &dyn KeyValueStore, key: &str);
        fn update_string(key: &str, value: &str);
        fn delete_string(key: &str);

        fn restore_counter(store: &dyn KeyValueStore, key: &str);
        /// Record the counter's value after an increment.
        fn update_counter(key: &str, value: i64);
    }
}

impl<B: Backup> std::fmt::Debug for BlockingBackup<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingBackup").finish_non_exhaustive()
    }
}
