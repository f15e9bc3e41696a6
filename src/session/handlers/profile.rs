//! Profile lifecycle handlers (§3, §4.4, §4.7): `UpdateProfile`,
//! `CancelHostingAgreement`, `GetIdentityInformation`.

use super::now_unix;
use crate::common::ImageHash;
use crate::error::{Error, Result};
use crate::images::thumbnail;
use crate::protocol::{OkPayload, UpdateProfileRequest};
use crate::session::{IdentityState, Session};
use crate::store::types::ActionType;

/// Thumbnail byte budget enforced when a profile update supplies a full
/// image but no pre-shrunk thumbnail (§4.4).
const MAX_THUMBNAIL_BYTES: usize = 32 * 1024;

pub async fn update_profile<S>(session: &mut Session<S>, req: &UpdateProfileRequest) -> Result<OkPayload> {
    let network_id = authenticated_network_id(session)?;
    if !req.location.is_valid() {
        return Err(Error::InvalidValue("location out of range".into()));
    }

    let previous = session.ctx.store.get_hosted_identity(network_id).await?.ok_or_else(|| Error::NotFound("hosted identity".into()))?;
    if previous.cancelled {
        return Err(Error::Rejected("hosting agreement was cancelled".into()));
    }

    let new_profile_hash = match &req.profile_image {
        Some(bytes) => {
            thumbnail::validate(bytes)?;
            let hash = ImageHash::of(bytes);
            session.ctx.images.save(hash, bytes);
            Some(hash)
        }
        None => previous.profile_image,
    };

    let new_thumbnail_hash = match &req.thumbnail_image {
        Some(bytes) => {
            let image = thumbnail::validate(bytes)?;
            let shrunk = if bytes.len() > MAX_THUMBNAIL_BYTES {
                thumbnail::make_thumbnail(&image, MAX_THUMBNAIL_BYTES)?
            } else {
                bytes.clone()
            };
            let hash = ImageHash::of(&shrunk);
            session.ctx.images.save(hash, &shrunk);
            Some(hash)
        }
        None => match (&req.profile_image, new_profile_hash) {
            (Some(bytes), Some(_)) => {
                let image = thumbnail::validate(bytes)?;
                let shrunk = thumbnail::make_thumbnail(&image, MAX_THUMBNAIL_BYTES)?;
                let hash = ImageHash::of(&shrunk);
                session.ctx.images.save(hash, &shrunk);
                Some(hash)
            }
            _ => previous.thumbnail_image,
        },
    };

    session
        .ctx
        .store
        .update_profile(
            network_id,
            req.name.clone(),
            req.identity_type.clone(),
            req.location,
            req.extra_data.clone(),
            req.version,
            new_profile_hash,
            new_thumbnail_hash,
        )
        .await?;

    release_if_replaced(session, previous.profile_image, new_profile_hash);
    release_if_replaced(session, previous.thumbnail_image, new_thumbnail_hash);

    let action = if previous.initialized { ActionType::ChangeProfile } else { ActionType::AddProfile };
    session.ctx.store.fan_out_to_followers(action, network_id, now_unix(), None).await?;

    Ok(OkPayload::Empty)
}

pub async fn cancel_hosting_agreement<S>(session: &mut Session<S>) -> Result<OkPayload> {
    let network_id = authenticated_network_id(session)?;
    let identity = session.ctx.store.get_hosted_identity(network_id).await?.ok_or_else(|| Error::NotFound("hosted identity".into()))?;

    session.ctx.store.mark_cancelled(network_id).await?;
    session.ctx.store.remove_all_for_identity(network_id).await?;
    if let Some(hash) = identity.profile_image {
        session.ctx.images.remove_reference(hash);
    }
    if let Some(hash) = identity.thumbnail_image {
        session.ctx.images.remove_reference(hash);
    }
    session.ctx.store.fan_out_to_followers(ActionType::RemoveProfile, network_id, now_unix(), None).await?;

    Ok(OkPayload::Empty)
}

pub async fn get_identity_information<S>(session: &mut Session<S>, network_id: crate::common::NetworkId) -> Result<OkPayload> {
    authenticated_network_id(session)?;
    let identity = session.ctx.store.get_hosted_identity(network_id).await?.ok_or_else(|| Error::NotFound("identity".into()))?;
    if identity.cancelled {
        return Err(Error::NotFound("identity".into()));
    }

    let profile_image = identity.profile_image.and_then(|h| session.ctx.images.load(h).ok());
    let thumbnail_image = identity.thumbnail_image.and_then(|h| session.ctx.images.load(h).ok());

    Ok(OkPayload::IdentityInformation {
        network_id: identity.network_id,
        name: identity.name,
        identity_type: identity.identity_type,
        location: identity.location,
        extra_data: identity.extra_data,
        version: identity.version,
        profile_image,
        thumbnail_image,
    })
}

fn release_if_replaced<S>(session: &Session<S>, previous: Option<ImageHash>, current: Option<ImageHash>) {
    if let Some(old) = previous {
        if Some(old) != current {
            session.ctx.images.remove_reference(old);
        }
    }
}

fn authenticated_network_id<S>(session: &Session<S>) -> Result<crate::common::NetworkId> {
    match session.state.identity {
        IdentityState::Authenticated { network_id, .. } => Ok(network_id),
        IdentityState::Anonymous => Err(Error::ProtocolViolation("not authenticated".into())),
    }
}
