//! Wallet identity: signing keypair and per-wallet nonce

use crate::{
    Amount, CoreError, CoreResult, FeeSchedule, Nonce, PublicKey, Transaction, TransactionDraft,
    TransactionKind,
};
use ed25519_dalek::SigningKey;
use std::fmt;
use std::fs;
use std::path::Path;

/// Signing identity of a node.
///
/// The nonce increases by exactly one per created transaction and is never
/// touched by verification.
pub struct Identity {
    /// The node's signing key
    signing_key: SigningKey,
    /// The derived public key
    public_key: PublicKey,
    /// Nonce of the next transaction
    nonce: Nonce,
    /// Fee charged on created transactions
    fees: FeeSchedule,
}

impl Identity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        Self::from_secret(rand::random())
    }

    /// Rebuild an identity from its 32-byte secret
    pub fn from_secret(secret: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&secret);
        let public_key = PublicKey::new(signing_key.verifying_key().to_bytes());

        Self {
            signing_key,
            public_key,
            nonce: 0,
            fees: FeeSchedule::default(),
        }
    }

    /// Use a custom fee schedule
    pub fn with_fee_schedule(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    /// Load identity from a hex keystore file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let data = fs::read_to_string(path.as_ref())?;
        let bytes = hex::decode(data.trim())?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::Keystore("secret key must be 32 bytes".to_string()))?;

        Ok(Self::from_secret(secret))
    }

    /// Save identity to a hex keystore file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> CoreResult<()> {
        // Create directory if it doesn't exist
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path.as_ref(), hex::encode(self.signing_key.to_bytes()))?;
        Ok(())
    }

    /// Load or generate identity from keystore path
    pub fn load_or_generate<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        match Self::load_from_file(&path) {
            Ok(identity) => {
                tracing::info!("Loaded existing identity: {}", identity.public_key);
                Ok(identity)
            }
            Err(_) => {
                tracing::info!("Generating new identity");
                let identity = Self::generate();
                identity.save_to_file(&path)?;
                tracing::info!("Saved new identity: {}", identity.public_key);
                Ok(identity)
            }
        }
    }

    /// Get the public key
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Nonce the next transaction will carry
    pub fn nonce(&self) -> Nonce {
        self.nonce
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        self.fees
    }

    /// Build and sign a transaction, charging the scheduled fee
    pub fn create_transaction(
        &mut self,
        receiver: PublicKey,
        kind: TransactionKind,
        amount: Amount,
        message: Option<String>,
    ) -> CoreResult<Transaction> {
        let fee = self.fees.fee_for(kind, amount);
        self.create_transaction_with_fee(receiver, kind, amount, fee, message)
    }

    /// Build and sign a transaction with an explicit fee
    pub fn create_transaction_with_fee(
        &mut self,
        receiver: PublicKey,
        kind: TransactionKind,
        amount: Amount,
        fee: Amount,
        message: Option<String>,
    ) -> CoreResult<Transaction> {
        let receiver = match kind {
            TransactionKind::Stake => self.public_key,
            _ => receiver,
        };
        let draft = TransactionDraft {
            kind,
            sender: self.public_key,
            receiver,
            amount,
            fee,
            message,
            nonce: self.nonce,
        };

        let tx = draft.sign(&self.signing_key)?;
        self.nonce += 1;
        Ok(tx)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key)
            .field("nonce", &self.nonce)
            .field("fees", &self.fees)
            .finish_non_exhaustive()
    }
}
