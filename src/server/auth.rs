//! Viewer password protection for streams

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::source::StreamConfig;

/// Length of generated passwords
pub const GENERATED_PASSWORD_LEN: usize = 8;

const PASSWORD_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Checks the `pw` request parameter against protected streams
///
/// Streams that are not protected always authenticate.
#[derive(Debug, Default)]
pub struct StreamAuthenticator {
    passwords: Mutex<HashMap<String, String>>,
}

impl StreamAuthenticator {
    /// Collect passwords for every protected stream
    ///
    /// A protected stream without a configured password gets a generated one.
    pub fn new<'a>(configs: impl IntoIterator<Item = &'a StreamConfig>) -> Self {
        let passwords = configs
            .into_iter()
            .filter(|config| config.protect)
            .map(|config| {
                let password = match &config.password {
                    Some(password) => password.clone(),
                    None => {
                        let password = generate_password();
                        tracing::info!(stream = %config.name, "Generated viewer password");
                        password
                    }
                };
                (config.name.clone(), password)
            })
            .collect();

        Self {
            passwords: Mutex::new(passwords),
        }
    }

    /// Whether viewers of `name` must supply a password
    pub fn requires_auth(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Current password of `name`, if protected
    pub fn password(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    /// Check a supplied password
    pub fn authenticate(&self, config: &StreamConfig, password: Option<&str>) -> bool {
        match self.lock().get(&config.name) {
            None => true,
            Some(expected) => password == Some(expected.as_str()),
        }
    }

    /// Issue a new password for a protected, resettable stream
    ///
    /// Returns `None` when the stream may not be reset.
    pub fn reset(&self, config: &StreamConfig) -> Option<String> {
        if !(config.protect && config.resettable) {
            return None;
        }

        let password = generate_password();
        self.lock().insert(config.name.clone(), password.clone());
        tracing::info!(stream = %config.name, "Viewer password reset");
        Some(password)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.passwords.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Random alphanumeric password
fn generate_password() -> String {
    Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(GENERATED_PASSWORD_LEN)
        .map(|b| PASSWORD_CHARS[*b as usize % PASSWORD_CHARS.len()] as char)
        .collect()
}
