use std::sync::Arc;

use serde::Deserialize;
use zeroize::Zeroize;

use crate::{
    hs_state::ExportedKeys,
    pattern::{Pattern, Role},
};

/// Decides, once the handshake is complete, whether the remote static key is acceptable
/// (e.g. pinning). Returning `false` fails the session.
pub type KeyVerifier = Arc<dyn Fn(&ExportedKeys) -> bool + Send + Sync + 'static>;

/// Everything needed to start one session.
///
/// ```
/// # use noise_stream::{Pattern, Role, SessionConfig};
/// let config = SessionConfig::new(Role::Initiator, Pattern::XX).with_prologue(b"v1".to_vec());
/// ```
#[derive(Clone, Default, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub pattern: Pattern,
    /// Out-of-band context bound into the transcript. `None` is the empty prologue.
    #[serde(default)]
    pub prologue: Option<Vec<u8>>,
    /// Raw 32-byte X25519 private key. Generated when absent and the pattern needs one.
    #[serde(default)]
    pub static_private_key: Option<Vec<u8>>,
    #[serde(skip)]
    pub verifier: Option<KeyVerifier>,
}

impl SessionConfig {
    pub fn new(role: Role, pattern: Pattern) -> Self {
        Self {
            role,
            pattern,
            prologue: None,
            static_private_key: None,
            verifier: None,
        }
    }

    pub fn with_prologue(mut self, prologue: impl Into<Vec<u8>>) -> Self {
        self.prologue = Some(prologue.into());
        self
    }

    pub fn with_static_private_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        if let Some(old) = self.static_private_key.as_mut() {
            old.zeroize();
        }
        self.static_private_key = Some(key.into());
        self
    }

    pub fn with_verifier(
        mut self,
        verifier: impl Fn(&ExportedKeys) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }
}

impl Drop for SessionConfig {
    fn drop(&mut self) {
        if let Some(key) = self.static_private_key.as_mut() {
            key.zeroize();
        }
    }
}

impl core::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("role", &self.role)
            .field("pattern", &self.pattern)
            .field("prologue", &self.prologue)
            .field(
                "static_private_key",
                &self.static_private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("verifier", &self.verifier.is_some())
            .finish()
    }
}
