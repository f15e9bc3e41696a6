//! Conversation authentication state machine (§4.6).
//!
//! `NONE -> STARTED -> AUTHENTICATED`. `StartConversation` proves the
//! server's identity to the peer (the server signs the peer's challenge);
//! `RegisterHosting`/`VerifyIdentity` or the combined `CheckIn` then prove
//! the peer's identity to the server before any other request is served.

use crate::error::{Error, Result};
use crate::identity::{self, ServerIdentity};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConversationState {
    #[default]
    None,
    /// The server has answered `StartConversation`; `challenge_from_server`
    /// must be signed by the peer's claimed public key before it is
    /// treated as authenticated.
    Started { challenge_from_server: [u8; 32] },
    /// The peer has declared a public key via `RegisterHosting` but has
    /// not yet proven ownership of it with `VerifyIdentity`.
    PendingVerification { challenge_from_server: [u8; 32], public_key: [u8; 32] },
}

impl ConversationState {
    pub fn start(challenge_from_server: [u8; 32]) -> Self {
        ConversationState::Started { challenge_from_server }
    }

    pub fn declare_public_key(&self, public_key: [u8; 32]) -> Result<Self> {
        match *self {
            ConversationState::Started { challenge_from_server } => {
                Ok(ConversationState::PendingVerification { challenge_from_server, public_key })
            }
            _ => Err(Error::ProtocolViolation("RegisterHosting/CheckIn outside STARTED state".into())),
        }
    }

    /// Verifies a signature over the server's challenge for the public key
    /// pinned in `PendingVerification` (the `VerifyIdentity` leg of a
    /// two-step handshake).
    pub fn verify_pending(&self, signature: &[u8]) -> Result<[u8; 32]> {
        match *self {
            ConversationState::PendingVerification { challenge_from_server, public_key } => {
                identity::verify(&public_key, &challenge_from_server, signature)?;
                Ok(public_key)
            }
            _ => Err(Error::ProtocolViolation("VerifyIdentity outside PENDING_VERIFICATION state".into())),
        }
    }

    /// Verifies a signature over the server's challenge for a public key
    /// supplied in the same message (the one-shot `CheckIn` leg).
    pub fn verify_check_in(&self, public_key: &[u8; 32], signature: &[u8]) -> Result<()> {
        match *self {
            ConversationState::Started { challenge_from_server } => {
                identity::verify(public_key, &challenge_from_server, signature)
            }
            _ => Err(Error::ProtocolViolation("CheckIn outside STARTED state".into())),
        }
    }
}

/// Builds the server's half of `StartConversation`: a fresh challenge for
/// the peer to sign plus this server's signature over the peer's own
/// challenge, proving the server's identity.
pub fn start_conversation(identity: &ServerIdentity, challenge_from_client: &[u8; 32]) -> ([u8; 32], Vec<u8>) {
    let challenge_from_server = identity::random_challenge();
    let signature = identity.sign(challenge_from_client);
    (challenge_from_server, signature)
}
