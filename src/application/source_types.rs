use crate::domain::ports::LedgerStore;
use crate::domain::source_type::{SourceType, SourceTypeId};
use crate::error::{LedgerError, Result};
use std::collections::HashMap;
use tracing::info;

/// Read-only map from external source labels to their stored ids.
///
/// Loaded once at start-up; labels added to the store afterwards stay
/// unresolvable for the lifetime of the resolver.
#[derive(Debug, Clone, Default)]
pub struct SourceTypeResolver {
    ids: HashMap<String, SourceTypeId>,
}

impl SourceTypeResolver {
    /// Loads every source type from `store`. Fails start-up if the store can't be read.
    pub async fn load(store: &dyn LedgerStore) -> Result<Self> {
        let source_types = store.source_types().await?;
        info!(count = source_types.len(), "loaded source types");
        Ok(Self::from_source_types(source_types))
    }

    pub fn from_source_types(source_types: impl IntoIterator<Item = SourceType>) -> Self {
        Self {
            ids: source_types
                .into_iter()
                .map(|st| (st.value, st.id))
                .collect(),
        }
    }

    pub fn resolve(&self, label: &str) -> Result<SourceTypeId> {
        self.ids
            .get(label)
            .copied()
            .ok_or_else(|| LedgerError::UnknownSourceType(label.to_string()))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryLedgerStore;

    #[test]
    fn test_resolve_known_and_unknown() {
        let resolver = SourceTypeResolver::from_source_types([
            SourceType::new(1, "game"),
            SourceType::new(3, "payment"),
        ]);
        assert_eq!(resolver.resolve("payment").unwrap(), 3);
        assert!(matches!(
            resolver.resolve("client"),
            Err(LedgerError::UnknownSourceType(label)) if label == "client"
        ));
        assert!(resolver.resolve("Payment").is_err());
    }

    #[tokio::test]
    async fn test_labels_added_after_load_stay_unknown() {
        let store = InMemoryLedgerStore::new();
        store.bootstrap().await.unwrap();
        let resolver = SourceTypeResolver::load(&store).await.unwrap();
        assert_eq!(resolver.len(), 3);

        store.seed_source_type("casino").await.unwrap();
        assert!(resolver.resolve("casino").is_err());
        assert!(resolver.resolve("game").is_ok());
    }
}
