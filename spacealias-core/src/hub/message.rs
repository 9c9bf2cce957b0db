//! Signed hub messages
//!
//! The signature covers the canonical JSON encoding of
//! `{address, action, timestamp, payload}`. `serde_json` maps are ordered, so
//! the encoding is stable for a given message.

use super::TransportError;
use crate::identity::{address_from_public_key, Wallet};
use crate::types::{Address, SpaceId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Action carried by a signed message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Bind an alias to the signing owner
    Alias,
    Follow,
    Unfollow,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Alias => "alias",
            Action::Follow => "follow",
            Action::Unfollow => "unfollow",
        };
        f.write_str(name)
    }
}

/// Payload of an `alias` message (signed by the owner)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasPayload {
    pub alias: Address,
}

/// Payload of `follow` / `unfollow` messages (signed by the alias)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowPayload {
    pub from: Address,
    pub space: SpaceId,
}

#[derive(Serialize)]
struct SigningView<'a> {
    address: &'a Address,
    action: Action,
    timestamp: u64,
    payload: &'a Value,
}

fn signing_bytes(
    address: &Address,
    action: Action,
    timestamp: u64,
    payload: &Value,
) -> Result<Vec<u8>, TransportError> {
    serde_json::to_vec(&SigningView { address, action, timestamp, payload })
        .map_err(|e| TransportError::Encoding(e.to_string()))
}

/// Message awaiting a signature
#[derive(Debug, Clone)]
pub struct UnsignedMessage {
    pub address: Address,
    pub action: Action,
    pub timestamp: u64,
    pub payload: Value,
}

impl UnsignedMessage {
    pub fn new<P: Serialize>(
        address: Address,
        action: Action,
        payload: &P,
        timestamp: u64,
    ) -> Result<Self, TransportError> {
        let payload =
            serde_json::to_value(payload).map_err(|e| TransportError::Encoding(e.to_string()))?;
        Ok(Self { address, action, timestamp, payload })
    }

    /// Bytes the signer must sign
    pub fn signing_bytes(&self) -> Result<Vec<u8>, TransportError> {
        signing_bytes(&self.address, self.action, self.timestamp, &self.payload)
    }

    /// Attach an externally produced signature
    pub fn into_signed(self, public_key: &[u8], signature: &[u8]) -> SignedMessage {
        SignedMessage {
            address: self.address,
            action: self.action,
            timestamp: self.timestamp,
            payload: self.payload,
            public_key: hex::encode(public_key),
            signature: hex::encode(signature),
        }
    }

    /// Sign with a local wallet
    pub fn sign_with(self, wallet: &Wallet) -> Result<SignedMessage, TransportError> {
        let signature = wallet.sign(&self.signing_bytes()?);
        Ok(self.into_signed(&wallet.public_key(), &signature))
    }
}

/// Message as submitted to the hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedMessage {
    /// Signer address
    pub address: Address,
    pub action: Action,
    pub timestamp: u64,
    pub payload: Value,
    /// Hex-encoded Ed25519 public key of the signer
    pub public_key: String,
    /// Hex-encoded signature
    pub signature: String,
}

impl SignedMessage {
    /// Check the key belongs to `address` and the signature is valid
    pub fn verify(&self) -> Result<(), TransportError> {
        let public_key = hex::decode(&self.public_key)
            .map_err(|e| TransportError::Rejected(format!("malformed public key: {}", e)))?;
        let signature = hex::decode(&self.signature)
            .map_err(|e| TransportError::Rejected(format!("malformed signature: {}", e)))?;

        if address_from_public_key(&public_key) != self.address {
            return Err(TransportError::Rejected(format!(
                "public key does not belong to {}",
                self.address
            )));
        }

        let bytes = signing_bytes(&self.address, self.action, self.timestamp, &self.payload)?;
        if !Wallet::verify(&public_key, &bytes, &signature) {
            return Err(TransportError::Rejected("invalid signature".to_string()));
        }
        Ok(())
    }

    /// Decode the payload
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| TransportError::Rejected(format!("invalid {} payload: {}", self.action, e)))
    }
}
