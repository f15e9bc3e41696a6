//! Conversation handshake handlers (§4.6): `StartConversation`,
//! `RegisterHosting` + `VerifyIdentity` (two-step), and `CheckIn`
//! (one-step re-authentication of an already-hosted identity).

use crate::common::NetworkId;
use crate::error::{Error, Result};
use crate::net::role::Role;
use crate::protocol::OkPayload;
use crate::session::dispatch::require_conversation_none;
use crate::session::{conversation, ConversationState, IdentityState, Session};
use tracing::info;

pub fn start_conversation<S>(session: &mut Session<S>, challenge_from_client: [u8; 32]) -> Result<OkPayload> {
    require_conversation_none(session)?;
    let (challenge_from_server, signature) =
        conversation::start_conversation(&session.ctx.identity, &challenge_from_client);
    session.state.conversation = ConversationState::start(challenge_from_server);
    Ok(OkPayload::StartConversationAck {
        server_public_key: session.ctx.identity.public_key_bytes(),
        challenge_from_server,
        signature_of_client_challenge: signature.to_bytes().to_vec(),
    })
}

/// Declares the public key the peer intends to authenticate with, as a
/// candidate new hosted identity. Does not touch the store until
/// [`verify_identity`] proves ownership.
pub async fn register_hosting<S>(session: &mut Session<S>, public_key: [u8; 32]) -> Result<OkPayload> {
    let count = session.ctx.store.count_hosted_identities().await?;
    if count >= session.ctx.settings.max_hosted_identities {
        return Err(Error::ResourceExhausted("max_hosted_identities reached".into()));
    }
    session.state.conversation = session.state.conversation.declare_public_key(public_key)?;
    Ok(OkPayload::Empty)
}

pub async fn verify_identity<S>(session: &mut Session<S>, signature: &[u8]) -> Result<OkPayload> {
    let public_key = session.state.conversation.verify_pending(signature)?;
    let network_id = NetworkId::from_public_key(&public_key);

    session.ctx.store.register_hosting(network_id, public_key).await?;
    authenticate(session, network_id, public_key).await?;
    info!(session = session.id, %network_id, "identity verified and hosting registered");
    Ok(OkPayload::Empty)
}

/// On client-facing roles, `CheckIn` re-authenticates an already-hosted
/// identity. On the server-neighbor role there is no hosted-identity row
/// for a peer server's own key — proving ownership of the signing key is
/// the whole of server-to-server authentication (§4.8); the resulting
/// network id is matched against the `neighbors`/`followers` tables by the
/// neighborhood handlers, not here.
pub async fn check_in<S>(session: &mut Session<S>, public_key: [u8; 32], signature: &[u8]) -> Result<OkPayload> {
    session.state.conversation.verify_check_in(&public_key, signature)?;
    let network_id = NetworkId::from_public_key(&public_key);

    if session.role != Role::ServerNeighbor {
        let identity = session
            .ctx
            .store
            .get_hosted_identity(network_id)
            .await?
            .ok_or_else(|| Error::NotFound("hosted identity".into()))?;
        if identity.cancelled {
            return Err(Error::Rejected("hosting agreement was cancelled".into()));
        }
    }

    authenticate(session, network_id, public_key).await?;
    Ok(OkPayload::Empty)
}

/// Common tail of every successful handshake: clears any pending
/// expiration (the identity now has a live session, §3), registers in the
/// online map (forcing out a stale session for the same id, §4.6), and
/// marks this session authenticated.
async fn authenticate<S>(session: &mut Session<S>, network_id: NetworkId, public_key: [u8; 32]) -> Result<()> {
    session.ctx.store.set_expiration(network_id, None).await?;
    session.ctx.registry.insert(network_id, session.id, session.close_signal.clone());
    session.state.identity = IdentityState::Authenticated { network_id, public_key };
    Ok(())
}
