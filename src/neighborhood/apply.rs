//! Applying `ProfileUpdateItem`s against `neighbor_identities` (§3, §4.8).
//!
//! Shared between the inbound session handler (a neighbor pushing to us,
//! `session::handlers::neighborhood::shared_profile_update`) and the C8
//! outbound processor's `InitializeProfiles` receiver loop, since both
//! sides of that exchange do exactly the same thing with the items once
//! they arrive.

use crate::common::ImageHash;
use crate::error::Result;
use crate::images::ImageManager;
use crate::protocol::ProfileUpdateItem;
use crate::store::types::NeighborIdentity;
use crate::store::Store;

pub async fn apply_items(store: &Store, images: &ImageManager, items: &[ProfileUpdateItem]) -> Result<()> {
    for item in items {
        match item {
            ProfileUpdateItem::AddOrChange {
                hosting_server_network_id,
                network_id,
                name,
                identity_type,
                location,
                extra_data,
                version,
                thumbnail_image,
            } => {
                let thumbnail_hash = thumbnail_image.as_ref().map(|bytes| {
                    let hash = ImageHash::of(bytes);
                    images.save(hash, bytes);
                    hash
                });
                let previous = store
                    .upsert_neighbor_identity(NeighborIdentity {
                        hosting_server_network_id: *hosting_server_network_id,
                        network_id: *network_id,
                        name: name.clone(),
                        identity_type: identity_type.clone(),
                        location: *location,
                        extra_data: extra_data.clone(),
                        version: *version,
                        thumbnail_image: thumbnail_hash,
                    })
                    .await?;
                release_if_replaced(images, previous, thumbnail_hash);
            }
            ProfileUpdateItem::Delete { hosting_server_network_id, network_id } => {
                let previous = store.delete_neighbor_identity(*hosting_server_network_id, *network_id).await?;
                release_if_replaced(images, previous, None);
            }
        }
    }
    Ok(())
}

/// Releases `previous`'s reference when it's being replaced by (or deleted
/// without) `current`, mirroring `session::handlers::profile`'s helper of
/// the same name for hosted identities (§4.4, §8 invariant 1).
fn release_if_replaced(images: &ImageManager, previous: Option<ImageHash>, current: Option<ImageHash>) {
    if let Some(old) = previous {
        if Some(old) != current {
            images.remove_reference(old);
        }
    }
}
