//! Category/Preference Service: thin CRUD delegating to the
//! Metadata Store. No in-memory state of its own — unlike the Session
//! Manager, categories and preferences have no live process counterpart, so
//! every operation is a direct (blocking-pool-dispatched) store round trip.

use std::sync::Arc;

use crate::blocking;
use crate::error::{CoreError, CoreResult};
use crate::store::{now_unix, CategoryRecord, NotificationPreferences, Store};
use crate::validate::validate_name;

pub struct CategoryService {
    store: Arc<Store>,
}

impl CategoryService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> CoreResult<Vec<CategoryRecord>> {
        blocking::run(&self.store, |s| s.list_categories()).await
    }

    pub async fn create(&self, name: &str, owner_id: Option<String>) -> CoreResult<CategoryRecord> {
        let name = validate_name(name)?;
        blocking::run(&self.store, move |s| {
            let sort_order = s.next_category_sort_order()?;
            let record = CategoryRecord {
                id: uuid::Uuid::new_v4().to_string(),
                name,
                sort_order,
                collapsed: false,
                owner_id,
                created_at: now_unix(),
            };
            s.insert_category(&record)?;
            Ok(record)
        })
        .await
    }

    pub async fn rename(&self, id: &str, name: &str) -> CoreResult<CategoryRecord> {
        let name = validate_name(name)?;
        let id = id.to_string();
        blocking::run(&self.store, move |s| {
            s.get_category(&id)?
                .ok_or_else(|| CoreError::NotFound("Category not found".to_string()))?;
            s.rename_category(&id, &name)?;
            s.get_category(&id)?
                .ok_or_else(|| CoreError::NotFound("Category not found".to_string()))
        })
        .await
    }

    pub async fn delete(&self, id: &str) -> CoreResult<()> {
        let id = id.to_string();
        blocking::run(&self.store, move |s| s.delete_category(&id)).await
    }

    pub async fn reorder(&self, ordered_ids: &[String]) -> CoreResult<()> {
        let ordered_ids = ordered_ids.to_vec();
        blocking::run(&self.store, move |s| s.reorder_categories(&ordered_ids)).await
    }

    pub async fn toggle(&self, id: &str, collapsed: bool) -> CoreResult<CategoryRecord> {
        let id = id.to_string();
        blocking::run(&self.store, move |s| {
            s.get_category(&id)?
                .ok_or_else(|| CoreError::NotFound("Category not found".to_string()))?;
            s.set_category_collapsed(&id, collapsed)?;
            s.get_category(&id)?
                .ok_or_else(|| CoreError::NotFound("Category not found".to_string()))
        })
        .await
    }

    /// Used by the Session Manager's `move` to validate a target category
    /// exists before the durable mutation.
    pub async fn exists(&self, id: &str) -> CoreResult<bool> {
        let id = id.to_string();
        blocking::run(&self.store, move |s| Ok(s.get_category(&id)?.is_some())).await
    }

    pub async fn get_preferences(&self, user_id: &str) -> CoreResult<NotificationPreferences> {
        let user_id = user_id.to_string();
        blocking::run(&self.store, move |s| s.get_preferences(&user_id)).await
    }

    pub async fn set_preferences(
        &self,
        user_id: &str,
        browser_enabled: Option<bool>,
        visual_enabled: Option<bool>,
        notify_on_input: Option<bool>,
        notify_on_completed: Option<bool>,
    ) -> CoreResult<NotificationPreferences> {
        let user_id = user_id.to_string();
        blocking::run(&self.store, move |s| {
            let mut prefs = s.get_preferences(&user_id)?;
            if let Some(v) = browser_enabled {
                prefs.browser_enabled = v;
            }
            if let Some(v) = visual_enabled {
                prefs.visual_enabled = v;
            }
            if let Some(v) = notify_on_input {
                prefs.notify_on_input = v;
            }
            if let Some(v) = notify_on_completed {
                prefs.notify_on_completed = v;
            }
            prefs.updated_at = now_unix();
            s.upsert_preferences(&prefs)?;
            Ok(prefs)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> CategoryService {
        CategoryService::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn create_assigns_incrementing_sort_order() {
        let svc = service();
        let a = svc.create("Work", None).await.unwrap();
        let b = svc.create("Personal", None).await.unwrap();
        assert_eq!(a.sort_order, 0);
        assert_eq!(b.sort_order, 1);
    }

    #[tokio::test]
    async fn rename_unknown_category_is_not_found() {
        let svc = service();
        let err = svc.rename("nope", "New").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn preferences_default_to_all_true() {
        let svc = service();
        let prefs = svc.get_preferences("alice").await.unwrap();
        assert!(prefs.browser_enabled);
        assert!(prefs.visual_enabled);
        assert!(prefs.notify_on_input);
        assert!(prefs.notify_on_completed);
    }

    #[tokio::test]
    async fn set_preferences_updates_only_given_fields() {
        let svc = service();
        svc.set_preferences("alice", Some(false), None, None, None)
            .await
            .unwrap();
        let prefs = svc.get_preferences("alice").await.unwrap();
        assert!(!prefs.browser_enabled);
        assert!(prefs.notify_on_input);
    }

    #[tokio::test]
    async fn exists_reflects_store_state() {
        let svc = service();
        assert!(!svc.exists("nope").await.unwrap());
        let c = svc.create("Work", None).await.unwrap();
        assert!(svc.exists(&c.id).await.unwrap());
    }
}
