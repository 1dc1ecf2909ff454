use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Per-list "sort by name" toggle shared by every member of the list.
#[async_trait]
pub trait SortPreferences: Send + Sync {
    async fn is_sorted(&self, list_id: &str) -> bool;

    /// Flips the preference and returns the new value.
    async fn toggle(&self, list_id: &str) -> bool;

    async fn forget(&self, list_id: &str);
}

/// Process-local preferences; they reset when the bot restarts.
#[derive(Debug, Default)]
pub struct InMemorySortPreferences {
    sorted: Mutex<HashSet<String>>,
}

#[async_trait]
impl SortPreferences for InMemorySortPreferences {
    async fn is_sorted(&self, list_id: &str) -> bool {
        self.sorted.lock().await.contains(list_id)
    }

    async fn toggle(&self, list_id: &str) -> bool {
        let mut sorted = self.sorted.lock().await;
        if sorted.remove(list_id) {
            false
        } else {
            sorted.insert(list_id.to_string());
            true
        }
    }

    async fn forget(&self, list_id: &str) {
        self.sorted.lock().await.remove(list_id);
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemorySortPreferences, SortPreferences};

    #[tokio::test]
    async fn toggle_flips_per_list_and_forget_resets() {
        let prefs = InMemorySortPreferences::default();
        assert!(!prefs.is_sorted("a").await);

        assert!(prefs.toggle("a").await);
        assert!(prefs.is_sorted("a").await);
        assert!(!prefs.is_sorted("b").await);

        assert!(!prefs.toggle("a").await);
        assert!(!prefs.is_sorted("a").await);

        prefs.toggle("b").await;
        prefs.forget("b").await;
        assert!(!prefs.is_sorted("b").await);
    }
}
