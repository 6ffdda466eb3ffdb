use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{dummy_password_hash, hash_password, verify_password};
use crate::store::keys;
use crate::store::{Store, StoreError};
use crate::validation::is_valid_user_name;

/// Rank at and above which a user may manage any channel.
pub const SITE_ADMIN_RANK: u8 = 255;
pub const DEFAULT_RANK: u8 = 1;

pub const INVALID_LOGIN: &str = "Invalid username/password combination";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    pub password_hash: String,
    pub email: String,
    pub global_rank: u8,
    pub ip: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_site_admin(&self) -> bool {
        self.global_rank >= SITE_ADMIN_RANK
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub image: String,
    pub text: String,
}

impl Store {
    pub fn register_user(
        &self,
        name: &str,
        password: &str,
        email: &str,
        ip: &str,
    ) -> Result<User, StoreError> {
        if !is_valid_user_name(name) {
            return Err(StoreError::Validation(
                "Invalid username.  Usernames must be 1-20 characters long and consist only \
                 of characters a-z, A-Z, 0-9, -, and _"
                    .to_string(),
            ));
        }

        let now = Utc::now();
        let user = User {
            name: name.to_string(),
            password_hash: hash_password(password)?,
            email: email.to_string(),
            global_rank: DEFAULT_RANK,
            ip: ip.to_string(),
            created_at: now,
            updated_at: now,
        };

        // 原子 CAS：名称键不存在时才写入，避免并发注册同名账户
        let key = keys::user_key(name);
        let cas_result = self
            .users
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(Self::serialize(&user)?))?;

        if cas_result.is_err() {
            return Err(StoreError::Conflict {
                entity: "user".to_string(),
                key: name.to_string(),
            });
        }

        Ok(user)
    }

    pub fn get_user(&self, name: &str) -> Result<User, StoreError> {
        self.find_user(name)?.ok_or_else(|| StoreError::NotFound {
            entity: "user".to_string(),
            key: name.to_string(),
        })
    }

    pub fn find_user(&self, name: &str) -> Result<Option<User>, StoreError> {
        let key = keys::user_key(name);
        match self.users.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Unknown names and wrong passwords are indistinguishable to the caller.
    pub fn verify_login(&self, name: &str, password: &str) -> Result<User, StoreError> {
        let Some(user) = self.find_user(name)? else {
            let _ = verify_password(password, dummy_password_hash());
            return Err(StoreError::Validation(INVALID_LOGIN.to_string()));
        };

        if !verify_password(password, &user.password_hash)? {
            return Err(StoreError::Validation(INVALID_LOGIN.to_string()));
        }

        Ok(user)
    }

    pub fn set_password(&self, name: &str, password: &str) -> Result<User, StoreError> {
        let password_hash = hash_password(password)?;
        self.update_user(name, move |user| {
            user.password_hash = password_hash.clone();
        })
    }

    pub fn get_email(&self, name: &str) -> Result<String, StoreError> {
        Ok(self.get_user(name)?.email)
    }

    pub fn set_email(&self, name: &str, email: &str) -> Result<User, StoreError> {
        self.update_user(name, |user| {
            user.email = email.to_string();
        })
    }

    pub fn set_global_rank(&self, name: &str, rank: u8) -> Result<User, StoreError> {
        self.update_user(name, |user| {
            user.global_rank = rank;
        })
    }

    pub fn get_profile(&self, name: &str) -> Result<Profile, StoreError> {
        // 先确认用户存在，避免为不存在的账户返回空资料
        self.get_user(name)?;
        let key = keys::profile_key(name);
        match self.profiles.get(key.as_bytes())? {
            Some(raw) => Self::deserialize(&raw),
            None => Ok(Profile::default()),
        }
    }

    pub fn set_profile(&self, name: &str, profile: &Profile) -> Result<(), StoreError> {
        self.get_user(name)?;
        let key = keys::profile_key(name);
        self.profiles
            .insert(key.as_bytes(), Self::serialize(profile)?)?;
        Ok(())
    }

    /// Read-modify-write of one user record through `update_and_fetch`, so
    /// concurrent updates to the same user are applied one after the other.
    fn update_user<F>(&self, name: &str, apply: F) -> Result<User, StoreError>
    where
        F: Fn(&mut User),
    {
        let key = keys::user_key(name);
        let mut decode_error = None;

        let updated = self.users.update_and_fetch(key.as_bytes(), |old| {
            let raw = old?;
            match Self::deserialize::<User>(raw) {
                Ok(mut user) => {
                    apply(&mut user);
                    user.updated_at = Utc::now();
                    match Self::serialize(&user) {
                        Ok(bytes) => Some(bytes),
                        Err(e) => {
                            decode_error = Some(e);
                            Some(raw.to_vec())
                        }
                    }
                }
                Err(e) => {
                    decode_error = Some(e);
                    Some(raw.to_vec())
                }
            }
        })?;

        if let Some(e) = decode_error {
            return Err(e);
        }

        match updated {
            Some(raw) => Self::deserialize(&raw),
            None => Err(StoreError::NotFound {
                entity: "user".to_string(),
                key: name.to_string(),
            }),
        }
    }
}
