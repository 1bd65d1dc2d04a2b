use super::{JsonCollection, StoreError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

fn default_theme() -> String {
    "dark".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default = "default_theme")]
    pub theme: String,
}

/// What the API exposes of a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserView {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub theme: String,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            theme: u.theme.clone(),
        }
    }
}

pub struct AccountStore {
    users: JsonCollection<User>,
    bcrypt_cost: u32,
}

const USERNAME_TAKEN: &str = "Username already exists. Please choose a different one.";
const EMAIL_TAKEN: &str = "Email already exists. Please choose a different one.";

/// bcrypt is CPU-bound, so it runs on the blocking pool
async fn hash_password(password: &str, cost: u32) -> Result<String, StoreError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await?.map_err(StoreError::from)
}

async fn verify_password(password: &str, hash: &str) -> Result<bool, StoreError> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await?.map_err(StoreError::from)
}

/// Lowest cost bcrypt accepts, keeps tests fast
#[cfg(test)]
pub(crate) const TEST_COST: u32 = 4;

fn require(field: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Invalid(format!("{field} is required")));
    }
    Ok(())
}

impl AccountStore {
    pub fn open<P: Into<PathBuf>>(path: P, bcrypt_cost: u32) -> Result<Self, StoreError> {
        Ok(Self {
            users: JsonCollection::open(path)?,
            bcrypt_cost,
        })
    }

    pub async fn signup(&self, username: &str, email: &str, password: &str) -> Result<User, StoreError> {
        require("username", username)?;
        require("email", email)?;
        require("password", password)?;

        // hashing is slow, keep it outside the cache lock
        let password_hash = hash_password(password, self.bcrypt_cost).await?;

        let user = self.users.update(|users| {
            if users.iter().any(|u| u.username == username) {
                return Err(StoreError::Conflict(USERNAME_TAKEN.into()));
            }
            if users.iter().any(|u| u.email == email) {
                return Err(StoreError::Conflict(EMAIL_TAKEN.into()));
            }

            let user = User {
                id: users.iter().map(|u| u.id).max().unwrap_or(0) + 1,
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
                theme: default_theme(),
            };
            users.push(user.clone());
            Ok(user)
        })?;

        info!("[store] account {} created", user.username);
        Ok(user)
    }

    /// `login_id` is an email when it contains '@', a username otherwise
    pub async fn authenticate(&self, login_id: &str, password: &str) -> Result<Option<User>, StoreError> {
        let candidate = self.users.read(|users| {
            users
                .iter()
                .find(|u| {
                    if login_id.contains('@') {
                        u.email == login_id
                    } else {
                        u.username == login_id
                    }
                })
                .cloned()
        });

        let Some(user) = candidate else {
            return Ok(None);
        };
        if verify_password(password, &user.password_hash).await? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    pub fn find_by_username(&self, username: &str) -> Option<User> {
        self.users.read(|users| users.iter().find(|u| u.username == username).cloned())
    }

    /// Uniqueness is checked against every other account
    pub async fn update_settings(
        &self,
        current_username: &str,
        new_username: &str,
        new_email: &str,
        new_password: Option<&str>,
    ) -> Result<User, StoreError> {
        require("username", new_username)?;
        require("email", new_email)?;

        let new_hash = match new_password.filter(|p| !p.is_empty()) {
            Some(password) => Some(hash_password(password, self.bcrypt_cost).await?),
            None => None,
        };

        self.users.update(|users| {
            if users.iter().any(|u| u.username == new_username && u.username != current_username) {
                return Err(StoreError::Conflict(USERNAME_TAKEN.into()));
            }
            if users.iter().any(|u| u.email == new_email && u.username != current_username) {
                return Err(StoreError::Conflict(EMAIL_TAKEN.into()));
            }

            let user = users
                .iter_mut()
                .find(|u| u.username == current_username)
                .ok_or_else(|| StoreError::NotFound("User not found".into()))?;

            user.username = new_username.to_string();
            user.email = new_email.to_string();
            if let Some(hash) = new_hash {
                user.password_hash = hash;
            }
            Ok(user.clone())
        })
    }

    pub fn update_theme(&self, username: &str, theme: &str) -> Result<(), StoreError> {
        self.users.update(|users| {
            let user = users
                .iter_mut()
                .find(|u| u.username == username)
                .ok_or_else(|| StoreError::NotFound("User not found".into()))?;
            user.theme = theme.to_string();
            Ok(())
        })
    }

    /// Puts back a record read earlier, matched by id
    pub fn restore(&self, snapshot: &User) -> Result<(), StoreError> {
        self.users.update(|users| {
            let user = users
                .iter_mut()
                .find(|u| u.id == snapshot.id)
                .ok_or_else(|| StoreError::NotFound("User not found".into()))?;
            *user = snapshot.clone();
            Ok(())
        })
    }

    /// Creates the default admin account if that username is free.
    /// Returns true when an account was created.
    pub async fn ensure_admin(&self, username: &str, email: &str, password: &str) -> Result<bool, StoreError> {
        if self.find_by_username(username).is_some() {
            return Ok(false);
        }
        self.signup(username, email, password).await?;
        info!("[store] default admin user created");
        Ok(true)
    }
}
