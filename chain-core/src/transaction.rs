//! Transaction data structures and operations

use crate::{Amount, CoreError, CoreResult, Hash, Nonce, PublicKey};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

/// Kind of ledger movement a transaction performs
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub enum TransactionKind {
    /// Funding of a peer by the distributor at cluster start
    Initialization,
    /// Transfer between two peers
    Exchange,
    /// Sets the sender's stake to `amount`; the receiver is ignored
    Stake,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionKind::Initialization => "Initialization",
            TransactionKind::Exchange => "Exchange",
            TransactionKind::Stake => "Stake",
        };
        f.write_str(name)
    }
}

/// Fee charged on newly created transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Percentage of the amount charged on exchanges
    pub exchange_percent: u64,
}

impl FeeSchedule {
    pub fn new(exchange_percent: u64) -> Self {
        Self { exchange_percent }
    }

    /// Fee for a transaction of the given kind and amount.
    ///
    /// Only exchanges pay; initialization and stake transitions are free.
    pub fn fee_for(&self, kind: TransactionKind, amount: Amount) -> Amount {
        match kind {
            TransactionKind::Exchange => {
                let fee = u128::from(amount) * u128::from(self.exchange_percent) / 100;
                u64::try_from(fee).unwrap_or(Amount::MAX)
            }
            TransactionKind::Initialization | TransactionKind::Stake => 0,
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            exchange_percent: 3,
        }
    }
}

/// Ed25519 transaction signature
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl Signature {
    /// Create new signature
    pub fn new(r: [u8; 32], s: [u8; 32]) -> Self {
        Self { r, s }
    }

    /// Convert to bytes (64 bytes total)
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes
    }

    /// Create from bytes
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != 64 {
            return Err(CoreError::InvalidSignature);
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);

        Ok(Self { r, s })
    }
}

/// Every transaction field except the signature.
///
/// Its bincode encoding is the canonical payload that gets hashed and signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, bincode::Encode)]
pub struct TransactionDraft {
    pub kind: TransactionKind,
    pub sender: PublicKey,
    pub receiver: PublicKey,
    pub amount: Amount,
    pub fee: Amount,
    pub message: Option<String>,
    pub nonce: Nonce,
}

impl TransactionDraft {
    /// Canonical payload bytes
    pub fn payload(&self) -> CoreResult<Vec<u8>> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CoreError::Bincode(e.to_string()))
    }

    /// Sign the draft with the sender's key.
    ///
    /// Fails if the key does not belong to `sender`.
    pub fn sign(self, key: &SigningKey) -> CoreResult<Transaction> {
        if key.verifying_key().to_bytes() != *self.sender.as_bytes() {
            return Err(CoreError::InvalidPublicKey(
                "signing key does not match sender".to_string(),
            ));
        }

        let digest = Keccak256::digest(self.payload()?);
        let sig_bytes = key.sign(digest.as_slice()).to_bytes();
        let signature = Signature::from_bytes(&sig_bytes)?;

        Ok(Transaction {
            kind: self.kind,
            sender: self.sender,
            receiver: self.receiver,
            amount: self.amount,
            fee: self.fee,
            message: self.message,
            nonce: self.nonce,
            signature,
        })
    }
}

/// Signed transaction. Immutable once signed.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    pub kind: TransactionKind,
    /// Sender's public key
    pub sender: PublicKey,
    /// Receiver's public key (equal to the sender for stake transitions)
    pub receiver: PublicKey,
    pub amount: Amount,
    pub fee: Amount,
    /// Optional note shown to the receiver
    pub message: Option<String>,
    /// Sender's per-wallet counter
    pub nonce: Nonce,
    pub signature: Signature,
}

impl Transaction {
    /// Fields covered by the signature
    pub fn draft(&self) -> TransactionDraft {
        TransactionDraft {
            kind: self.kind,
            sender: self.sender,
            receiver: self.receiver,
            amount: self.amount,
            fee: self.fee,
            message: self.message.clone(),
            nonce: self.nonce,
        }
    }

    /// Canonical payload bytes (everything except the signature)
    pub fn payload(&self) -> CoreResult<Vec<u8>> {
        self.draft().payload()
    }

    /// Keccak-256 of the payload
    pub fn digest(&self) -> CoreResult<Hash> {
        let hash_bytes = Keccak256::digest(self.payload()?);
        Ok(Hash::from_slice(hash_bytes.as_slice()))
    }

    /// Verify the signature against the sender's public key
    pub fn verify_signature(&self) -> CoreResult<bool> {
        let verifying_key = VerifyingKey::from_bytes(self.sender.as_bytes())
            .map_err(|e| CoreError::InvalidPublicKey(e.to_string()))?;
        let signature = ed25519_dalek::Signature::from_bytes(&self.signature.to_bytes());
        let digest = Keccak256::digest(self.payload()?);

        Ok(verifying_key.verify(digest.as_slice(), &signature).is_ok())
    }

    /// Sender and nonce; a finalized pair may never be spent again
    pub fn replay_key(&self) -> (PublicKey, Nonce) {
        (self.sender, self.nonce)
    }
}
