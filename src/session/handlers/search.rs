//! `ProfileSearch` and `ApplicationServiceAdd` handlers (§4.6, §4.7).

use crate::error::Result;
use crate::net::role::Role;
use crate::protocol::{OkPayload, ProfileSearchRequest};
use crate::search;
use crate::session::Session;

pub async fn profile_search<S>(session: &mut Session<S>, req: &ProfileSearchRequest) -> Result<OkPayload> {
    let results = search::search(&session.ctx.store, req).await?;
    session.state.role_ctx.search_cache = results.clone();
    Ok(OkPayload::SearchResults { results })
}

pub fn application_service_add<S>(session: &mut Session<S>, service_name: String) -> Result<OkPayload> {
    if session.role != Role::ClientAppService {
        return Err(crate::error::Error::Unsupported("ApplicationServiceAdd is only valid on the app-service role".into()));
    }
    let services = &mut session.state.role_ctx.exposed_app_services;
    if !services.contains(&service_name) {
        services.push(service_name);
    }
    Ok(OkPayload::Empty)
}
