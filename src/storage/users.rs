use std::collections::HashMap;

use super::models::User;
use crate::config::UserEntry;

/// Resolves an access token presented on connection upgrade to a user
pub trait UserDirectory: Send + Sync {
    fn resolve(&self, token: &str) -> Option<User>;
}

/// Token table loaded from configuration
pub struct StaticUserDirectory {
    users: HashMap<String, User>,
}

impl StaticUserDirectory {
    pub fn new(entries: &[UserEntry]) -> Self {
        let users = entries
            .iter()
            .map(|entry| {
                (
                    entry.token.clone(),
                    User {
                        username: entry.username.clone(),
                        profile: entry.profile.clone(),
                    },
                )
            })
            .collect();

        Self { users }
    }
}

impl UserDirectory for StaticUserDirectory {
    fn resolve(&self, token: &str) -> Option<User> {
        if token.is_empty() {
            return None;
        }
        self.users.get(token).cloned()
    }
}
