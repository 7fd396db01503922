//! Null catalog reader, used when no catalog store is configured.

use super::{CatalogListing, CatalogReader};
use async_trait::async_trait;

pub struct NullCatalogReader;

#[async_trait]
impl CatalogReader for NullCatalogReader {
    async fn list_entries(&self) -> CatalogListing {
        CatalogListing::unavailable("no catalog store configured")
    }

    fn describe(&self) -> String {
        "none".to_string()
    }
}
