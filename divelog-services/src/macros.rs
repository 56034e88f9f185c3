//! Utility macros for reducing boilerplate

/// Implement the read accessors every consistency service shares.
///
/// The service struct must have a `store: ResourceStore<$entity>` field.
///
/// # Example
/// ```ignore
/// impl_resource_reads!(GearService, Gear);
/// // Adds store(), get(), find(), find_one() and construct().
/// ```
#[macro_export]
macro_rules! impl_resource_reads {
    ($service:ty, $entity:ty) => {
        impl $service {
            /// The underlying resource store.
            pub fn store(&self) -> &divelog_storage::ResourceStore<$entity> {
                &self.store
            }

            /// Fetch one entity, optionally projected and with relations
            /// expanded. `None` when absent.
            pub async fn get(
                &self,
                id: impl divelog_core::ResolveId,
                fields: Option<&divelog_core::Projection>,
                relations: &[&str],
            ) -> divelog_core::DiveLogResult<Option<$entity>> {
                let id = divelog_core::require_id(&id, <$entity as divelog_storage::Resource>::NAME)?;
                self.store.get(id, fields, relations).await
            }

            pub async fn find(
                &self,
                query: &divelog_core::Query,
            ) -> divelog_core::DiveLogResult<Vec<$entity>> {
                self.store.find(query).await
            }

            pub async fn find_one(
                &self,
                filter: &divelog_core::Filter,
            ) -> divelog_core::DiveLogResult<Option<$entity>> {
                self.store.find_one(filter).await
            }

            /// Rebuild an entity from plain JSON without persisting it.
            pub fn construct(
                &self,
                value: serde_json::Value,
            ) -> divelog_core::DiveLogResult<$entity> {
                self.store.construct(value)
            }
        }
    };
}
