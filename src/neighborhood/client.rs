//! Outbound connections to follower/neighbor servers (§4.8, §4.9).
//!
//! One connection per action: TCP connect, TLS handshake (no certificate
//! validation, see `net::tls::build_connector`), the conversation
//! handshake authenticating as this server's own Ed25519 identity, then
//! one or more request/response exchanges. Grounded on the teacher's
//! `network::client` connector, simplified to one-shot-per-action since
//! the processor's own poll loop already paces outbound traffic.

use crate::error::{Error, Result};
use crate::framing;
use crate::identity::{self, ServerIdentity};
use crate::net::role::{MessageIdGenerator, Role};
use crate::net::tls::build_connector;
use crate::protocol::{Envelope, MessageId, OkPayload, Payload, Request, Response};
use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

async fn exchange<S>(stream: &mut S, id_gen: &MessageIdGenerator, request: Request) -> Result<Response>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let id = id_gen.next_id();
    framing::write_message(stream, &Envelope { id, payload: Payload::Request(request) }).await?;
    match framing::read_message(stream).await?.payload {
        Payload::Response(response) => Ok(response),
        Payload::Request(_) => Err(Error::ProtocolViolation("expected a response, got a request".into())),
    }
}

fn unwrap_ok(response: Response) -> Result<OkPayload> {
    match response {
        Response::Ok(payload) => Ok(payload),
        Response::Error(status) => Err(Error::Rejected(format!("peer returned {status:?}"))),
    }
}

/// A neighbor with `sr_neighbor_port = NULL` (it has not told LOC its
/// server-neighbor port) is reachable by first asking its primary port
/// which port to actually use (§4.5 `ListRoles`, §4.9).
pub async fn discover_sr_neighbor_port(ip: &str, primary_port: u16) -> Result<u16> {
    let mut stream = TcpStream::connect((ip, primary_port)).await?;
    let id_gen = MessageIdGenerator::new(Role::Primary);
    match unwrap_ok(exchange(&mut stream, &id_gen, Request::ListRoles).await?)? {
        OkPayload::Roles { sr_neighbor_port: Some(port), .. } => Ok(port),
        _ => Err(Error::Rejected("peer did not advertise a server-neighbor port".into())),
    }
}

/// An authenticated server-neighbor connection, good for one action's
/// worth of request/response traffic.
pub struct NeighborConnection {
    stream: TlsStream<TcpStream>,
    id_gen: MessageIdGenerator,
}

impl NeighborConnection {
    pub async fn open(ip: &str, port: u16, identity: &ServerIdentity) -> Result<Self> {
        let tcp = TcpStream::connect((ip, port)).await?;
        let connector = build_connector();
        let server_name = ServerName::try_from(ip.to_string())
            .map_err(|_| Error::Tls(format!("{ip} is not a valid TLS server name")))?;
        let mut stream = connector.connect(server_name, tcp).await.map_err(|e| Error::Tls(e.to_string()))?;
        let id_gen = MessageIdGenerator::new(Role::ServerNeighbor);

        let challenge_from_client = identity::random_challenge();
        let ack = unwrap_ok(exchange(&mut stream, &id_gen, Request::StartConversation { challenge_from_client }).await?)?;
        let challenge_from_server = match ack {
            OkPayload::StartConversationAck { server_public_key, challenge_from_server, signature_of_client_challenge } => {
                identity::verify(&server_public_key, &challenge_from_client, &signature_of_client_challenge)?;
                challenge_from_server
            }
            _ => return Err(Error::ProtocolViolation("unexpected reply to StartConversation".into())),
        };

        let public_key = identity.public_key_bytes();
        let signature = identity.sign(&challenge_from_server).to_bytes().to_vec();
        unwrap_ok(exchange(&mut stream, &id_gen, Request::CheckIn { public_key, signature }).await?)?;

        Ok(NeighborConnection { stream, id_gen })
    }

    pub async fn call(&mut self, request: Request) -> Result<OkPayload> {
        unwrap_ok(exchange(&mut self.stream, &self.id_gen, request).await?)
    }

    /// Reads one server-initiated request off this connection (used only
    /// while draining an `InitializeProfiles` snapshot push, where the
    /// roles invert and the peer we called becomes the requester).
    pub async fn recv_request(&mut self) -> Result<(MessageId, Request)> {
        let envelope = framing::read_message(&mut self.stream).await?;
        match envelope.payload {
            Payload::Request(request) => Ok((envelope.id, request)),
            Payload::Response(_) => Err(Error::ProtocolViolation("expected a request, got a response".into())),
        }
    }

    pub async fn reply(&mut self, id: MessageId, response: Response) -> Result<()> {
        framing::write_message(&mut self.stream, &Envelope { id, payload: Payload::Response(response) }).await
    }
}
