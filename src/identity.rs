//! Server identity: the singleton Ed25519 key pair persisted at first
//! startup (§3, §4.2), plus the contact-drift detection that tells C10
//! whether to republish the CAN record.

use crate::common::NetworkId;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::store::Store;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;

const SETTING_SIGNING_KEY: &str = "server.signing_key";
const SETTING_CONTACT_ADDRESS: &str = "server.contact_address";
const SETTING_CONTACT_PORT: &str = "server.contact_port";

pub struct ServerIdentity {
    pub signing_key: SigningKey,
    pub network_id: NetworkId,
    /// Set when the configured (external address, primary port) differs
    /// from the persisted values; tells C10 to republish the CAN record
    /// at startup (§4.2).
    pub contact_information_changed: bool,
}

impl ServerIdentity {
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

/// Loads the persisted identity, generating and persisting a fresh Ed25519
/// key pair on first run. Immutable thereafter (§3).
pub fn load_or_create(store: &Store, settings: &Settings) -> Result<ServerIdentity> {
    let existing = store.get_setting(SETTING_SIGNING_KEY)?;

    let signing_key = match existing {
        Some(hex_key) => {
            let bytes = hex::decode(&hex_key).map_err(|e| Error::Internal(format!("corrupt server key: {e}")))?;
            if bytes.len() != 32 {
                return Err(Error::Internal("corrupt server key length".into()));
            }
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&bytes);
            SigningKey::from_bytes(&arr)
        }
        None => {
            let mut seed = [0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut seed);
            let key = SigningKey::from_bytes(&seed);
            store.set_setting(SETTING_SIGNING_KEY, &hex::encode(key.to_bytes()))?;
            key
        }
    };

    let network_id = NetworkId::from_public_key(&signing_key.verifying_key().to_bytes());

    let prior_address = store.get_setting(SETTING_CONTACT_ADDRESS)?;
    let prior_port = store
        .get_setting(SETTING_CONTACT_PORT)?
        .and_then(|s| s.parse::<u16>().ok());

    let contact_information_changed = prior_address.as_deref() != Some(settings.external_server_address.as_str())
        || prior_port != Some(settings.primary_interface_port);

    if contact_information_changed {
        store.set_setting(SETTING_CONTACT_ADDRESS, &settings.external_server_address)?;
        store.set_setting(SETTING_CONTACT_PORT, &settings.primary_interface_port.to_string())?;
    }

    Ok(ServerIdentity {
        signing_key,
        network_id,
        contact_information_changed,
    })
}

pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<()> {
    let key = VerifyingKey::from_bytes(public_key).map_err(|_| Error::InvalidSignature)?;
    let sig = Signature::from_slice(signature).map_err(|_| Error::InvalidSignature)?;
    key.verify(message, &sig).map_err(|_| Error::InvalidSignature)
}

pub fn random_challenge() -> [u8; 32] {
    let mut challenge = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut challenge);
    challenge
}
