//! Rules about the Noise nonce:
//! Repeated use under one key is catastrophic, so it only ever moves forward.
//! The max value is reserved (it is the rekey nonce), so a counter sitting at `u64::MAX` is
//! exhausted.

use zeroize::Zeroize;

use crate::error::{Error, Result};

#[derive(Zeroize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct Nonce(u64);

impl Nonce {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the chacha nonce bytes for the current counter, plus the nonce to store once the
    /// operation using it has succeeded. The caller decides whether to commit the successor.
    pub fn chacha_harvest(&self) -> Result<([u8; 12], Self)> {
        if self.0 == u64::MAX {
            return Err(Error::NonceExhausted);
        }
        Ok((chacha_bytes(self.0), Self(self.0 + 1)))
    }

    #[cfg(test)]
    pub(crate) fn at(value: u64) -> Self {
        Self(value)
    }
}

impl Default for Nonce {
    fn default() -> Self {
        Self::new()
    }
}

/// 4 zero bytes, then the little-endian counter.
pub(crate) fn chacha_bytes(counter: u64) -> [u8; 12] {
    let mut nonce = [0; 12];
    nonce[4..].copy_from_slice(&counter.to_le_bytes());
    nonce
}
