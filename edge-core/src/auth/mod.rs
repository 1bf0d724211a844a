//! Static in-memory credential store

use crate::config::UserDefinition;
use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand_core::OsRng;
use std::{collections::HashMap, sync::Arc};

/// Prefix marking a configured password as an already-hashed PHC string.
const HASHED_PREFIX: &str = "{argon2}";

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub roles: Vec<String>,
}

#[derive(Debug)]
struct Credential {
    password_hash: String,
    roles: Vec<String>,
}

/// Fixed set of users, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    users: Arc<HashMap<String, Credential>>,
}

impl CredentialStore {
    /// Build the store, hashing plaintext passwords.
    pub fn from_definitions(definitions: &[UserDefinition]) -> Result<Self> {
        let mut users = HashMap::with_capacity(definitions.len());
        for def in definitions {
            let password_hash = match def.password.strip_prefix(HASHED_PREFIX) {
                Some(phc) => {
                    PasswordHash::new(phc)
                        .map_err(|e| anyhow!("Invalid password hash for '{}': {}", def.username, e))?;
                    phc.to_string()
                }
                None => hash_password(&def.password)?,
            };
            if users
                .insert(
                    def.username.clone(),
                    Credential {
                        password_hash,
                        roles: def.roles.clone(),
                    },
                )
                .is_some()
            {
                return Err(anyhow!("Duplicate user '{}'", def.username));
            }
        }
        Ok(Self {
            users: Arc::new(users),
        })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Check a username/password pair
    pub fn authenticate(&self, username: &str, password: &str) -> Option<Principal> {
        let credential = self.users.get(username)?;
        let parsed = PasswordHash::new(&credential.password_hash).ok()?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .ok()?;
        Some(Principal {
            name: username.to_string(),
            roles: credential.roles.clone(),
        })
    }
}

/// Hash a password for the in-memory store (Argon2id, 8 MiB, one pass)
pub fn hash_password(password: &str) -> Result<String> {
    let params = Params::new(8 * 1024, 1, 1, None)
        .map_err(|e| anyhow!("Invalid argon2 parameters: {}", e))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("Failed to hash password: {}", e))
}
