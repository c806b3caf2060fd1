use async_trait::async_trait;
use kvgraph_store::KeyValueStore;

use crate::error::BackupResult;
use crate::traits::Backup;

/// A [`Backup`] that keeps no durable copy. Every hook succeeds immediately.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopBackup;

#[async_trait]
impl Backup for NoopBackup {
    async fn restore_hash(&self, _: &dyn KeyValueStore, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn update_hash(&self, _: &str, _: &[(String, String)]) -> BackupResult<()> {
        Ok(())
    }
    async fn update_hash_value(&self, _: &str, _: &str, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn delete_hash(&self, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn delete_hash_value(&self, _: &str, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn restore_list(&self, _: &dyn KeyValueStore, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn add_list_item(&self, _: &str, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn push_front_list_item(&self, _: &str, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn remove_list_item(&self, _: &str, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn update_list_item(&self, _: &str, _: &str, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn delete_list(&self, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn restore_set(&self, _: &dyn KeyValueStore, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn add_set_item(&self, _: &str, _: &str, _: f64) -> BackupResult<()> {
        Ok(())
    }
    async fn update_set_item(&self, _: &str, _: &str, _: f64) -> BackupResult<()> {
        Ok(())
    }
    async fn remove_set_item(&self, _: &str, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn delete_set(&self, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn restore_string(&self, _: &dyn KeyValueStore, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn update_string(&self, _: &str, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn delete_string(&self, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn restore_counter(&self, _: &dyn KeyValueStore, _: &str) -> BackupResult<()> {
        Ok(())
    }
    async fn update_counter(&self, _: &str, _: i64) -> BackupResult<()> {
        Ok(())
    }
}
