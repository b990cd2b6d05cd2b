//! Connected-account capability handed to the settlement core

use std::str::FromStr;

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;

use crate::errors::{Error, Result};

/// A connected account and the means to sign for it.
///
/// The core never stores a session; every write takes one explicitly, so a
/// wallet switch is just a different value passed on the next call.
#[derive(Debug, Clone)]
pub struct Session {
    signer: PrivateKeySigner,
}

impl Session {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    /// Build a session from a hex private key, binding it to `chain_id`
    pub fn from_private_key(key: &str, chain_id: Option<u64>) -> Result<Self> {
        let signer = PrivateKeySigner::from_str(key.trim())
            .map_err(|e| Error::Wallet(e.to_string()))?
            .with_chain_id(chain_id);
        Ok(Self { signer })
    }

    /// Address of the connected account
    pub fn account(&self) -> Address {
        self.signer.address()
    }

    /// Wallet for building a signing provider
    pub fn wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }
}
