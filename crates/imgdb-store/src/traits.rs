use std::collections::BTreeSet;

use imgdb_types::{GenerationParams, Identity, ImageRecord};

use crate::error::{StoreError, StoreResult};
use crate::query::{collect_tags, CatalogFilter};
use crate::request::PutRequest;

/// An image database keyed by salted content identities.
///
/// All implementations must satisfy these invariants:
/// - An identity names exactly one image payload and one catalog row.
/// - Changing any semantic field of a record rotates its identity; the
///   `labeled`/`label` fields never do.
/// - Mutations are serialized; reads never observe a half-written state
///   through the same lock.
/// - Stored data is never repaired: a structural violation surfaces as
///   [`StoreError::CorruptStore`].
pub trait ImageStore: Send + Sync {
    /// Insert (`identity == None`) or update a record.
    ///
    /// Returns the record's identity after the call, which differs from the
    /// one supplied when the semantic fields changed.
    fn put(&self, identity: Option<&Identity>, request: PutRequest) -> StoreResult<Identity>;

    /// Decompressed image bytes, or `Ok(None)` for an unknown identity.
    fn get(&self, identity: &Identity) -> StoreResult<Option<Vec<u8>>>;

    /// Remove an image and its row. Returns `true` if it existed.
    fn delete(&self, identity: &Identity) -> StoreResult<bool>;

    /// Every catalog row, in catalog order.
    fn list_metadata(&self) -> StoreResult<Vec<ImageRecord>>;

    /// The catalog row for one identity.
    fn record(&self, identity: &Identity) -> StoreResult<Option<ImageRecord>> {
        Ok(self
            .list_metadata()?
            .into_iter()
            .find(|r| r.identity == *identity))
    }

    fn insert(&self, image: Vec<u8>, params: GenerationParams) -> StoreResult<Identity> {
        self.put(None, PutRequest::insert(image, params))
    }

    /// Set a label and mark the record as labeled. Identity is unchanged.
    fn update_label(&self, identity: &Identity, label: &str) -> StoreResult<()> {
        let request = PutRequest::new().labeled(true).label(label);
        let kept = self.put(Some(identity), request)?;
        debug_assert_eq!(kept, *identity);
        Ok(())
    }

    /// Identities of the rows matching `filter`, in catalog order.
    fn identities(&self, filter: &CatalogFilter) -> StoreResult<Vec<Identity>> {
        let records = self.list_metadata()?;
        Ok(filter.apply(&records).iter().map(|r| r.identity).collect())
    }

    /// Distinct prompt tags across the catalog.
    fn tags(&self) -> StoreResult<BTreeSet<String>> {
        Ok(collect_tags(&self.list_metadata()?))
    }

    /// Like [`get`](Self::get), but an unknown identity is an error.
    fn fetch(&self, identity: &Identity) -> StoreResult<Vec<u8>> {
        self.get(identity)?
            .ok_or(StoreError::NotFound(*identity))
    }
}
