//! X25519 key agreement.
use rand_core::CryptoRngCore;
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

pub const DH_LEN: usize = 32;

/// Used for both the long-term static pair and the per-handshake ephemeral. The secret half is
/// zeroized on drop.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate(rng: &mut impl CryptoRngCore) -> Self {
        Self::from_secret(StaticSecret::random_from_rng(rng))
    }

    /// Fails unless `bytes` is exactly [`DH_LEN`] long.
    pub fn from_private_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; DH_LEN] = bytes.try_into().map_err(|_| {
            Error::config(format!(
                "private key must be {DH_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        let raw = Zeroizing::new(raw);
        Ok(Self::from_secret(StaticSecret::from(*raw)))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn private_bytes(&self) -> Zeroizing<[u8; DH_LEN]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Rejects an all-zero output, which a low-order remote key produces.
    pub fn dh(&self, remote: &PublicKey) -> Result<SharedSecret> {
        let shared = self.secret.diffie_hellman(remote);
        if !shared.was_contributory() {
            return Err(Error::CryptoFailure);
        }
        Ok(shared)
    }
}

impl core::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public.as_bytes())
            .finish_non_exhaustive()
    }
}
