//! Request dispatch (§4.6, §6): routes one decoded `Request` to its
//! handler, enforcing the conversation-state precondition for the request
//! kind before the handler ever sees it.

use super::handlers;
use super::{ConversationState, Session};
use crate::error::{Error, Result};
use crate::protocol::{OkPayload, Request, Response};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Disconnect,
}

pub enum Outcome {
    Reply(Response, Flow),
    NoReply(Flow),
}

pub async fn handle<S>(session: &mut Session<S>, request: &Request) -> Outcome
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let result = route(session, request).await;
    match result {
        Ok(payload) => Outcome::Reply(Response::ok(payload), Flow::Continue),
        Err(e) => {
            let flow = if matches!(e, Error::ProtocolViolation(_)) { Flow::Disconnect } else { Flow::Continue };
            warn!(session = session.id, error = %e, "request failed");
            Outcome::Reply(Response::error(e.status_code()), flow)
        }
    }
}

async fn route<S>(session: &mut Session<S>, request: &Request) -> Result<OkPayload>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    match request {
        Request::StartConversation { challenge_from_client } => {
            handlers::auth::start_conversation(session, *challenge_from_client)
        }
        Request::RegisterHosting { public_key } => handlers::auth::register_hosting(session, *public_key).await,
        Request::VerifyIdentity { signature } => handlers::auth::verify_identity(session, signature).await,
        Request::CheckIn { public_key, signature } => handlers::auth::check_in(session, *public_key, signature).await,

        Request::UpdateProfile(req) => {
            require_authenticated(session)?;
            handlers::profile::update_profile(session, req).await
        }
        Request::CancelHostingAgreement => {
            require_authenticated(session)?;
            handlers::profile::cancel_hosting_agreement(session).await
        }
        Request::GetIdentityInformation { network_id } => {
            require_authenticated(session)?;
            handlers::profile::get_identity_information(session, *network_id).await
        }

        Request::ListRoles => handlers::roles::list_roles(session),

        Request::ProfileSearch(req) => {
            require_authenticated(session)?;
            handlers::search::profile_search(session, req).await
        }

        Request::ApplicationServiceAdd { service_name } => {
            require_authenticated(session)?;
            handlers::search::application_service_add(session, service_name.clone())
        }

        Request::StartNeighborhoodInitialization => {
            require_authenticated(session)?;
            handlers::neighborhood::start_initialization(session).await
        }
        Request::NeighborhoodSharedProfileUpdate { items } => {
            require_authenticated(session)?;
            handlers::neighborhood::shared_profile_update(session, items).await
        }
        Request::FinishNeighborhoodInitialization => {
            require_authenticated(session)?;
            handlers::neighborhood::finish_initialization(session)
        }
        Request::StopNeighborhoodUpdates => {
            require_authenticated(session)?;
            handlers::neighborhood::stop_updates(session).await
        }
        Request::RefreshNeighborStatus => {
            require_authenticated(session)?;
            handlers::neighborhood::refresh_status(session).await
        }
    }
}

fn require_authenticated<S>(session: &Session<S>) -> Result<()> {
    match session.state.identity {
        super::IdentityState::Authenticated { .. } => Ok(()),
        super::IdentityState::Anonymous => {
            Err(Error::ProtocolViolation("request requires an authenticated conversation".into()))
        }
    }
}

pub(super) fn require_conversation_none<S>(session: &Session<S>) -> Result<()> {
    match session.state.conversation {
        ConversationState::None => Ok(()),
        _ => Err(Error::ProtocolViolation("StartConversation outside NONE state".into())),
    }
}
