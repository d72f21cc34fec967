//! File-locked atomic JSON user store (§6 User file), grounded on
//! `examples/original_source/app/services/user_service.py` and
//! `app/scripts/init_users.py`'s username/role/password mutation set, with
//! the bulk admin endpoints (§6 REST surface) layered on top.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};

use fs2::FileExt as _;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{Role, User};
use crate::error::AppError;

use super::password::hash_password;

/// On-disk record shape — a password hash is kept here (unlike `domain::User`,
/// which redacts it from outbound JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredUser {
    password: String,
    name: String,
    email: String,
    role: Role,
}

/// Username → user record, in insertion order (`BTreeMap` gives the stable
/// key order the spec requires for the written document).
type UserMap = BTreeMap<String, StoredUser>;

#[derive(Clone)]
pub struct UserStore {
    path: PathBuf,
}

impl UserStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read-modify-write under an exclusive file lock on the user document
    /// itself, matching spec.md §5's "process-wide mutex around
    /// read-modify-write sequences" (a file lock substitutes for a process
    /// mutex since the document is the sole shared resource).
    fn with_locked<T>(&self, f: impl FnOnce(&mut UserMap) -> Result<T, AppError>) -> Result<T, AppError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let lock_file = OpenOptions::new().create(true).read(true).write(true).open(&self.path)?;
        lock_file.lock_exclusive().map_err(|e| AppError::Store(format!("user file lock: {e}")))?;

        let mut contents = String::new();
        File::open(&self.path)?.read_to_string(&mut contents)?;
        let mut users: UserMap = if contents.trim().is_empty() {
            UserMap::new()
        } else {
            serde_json::from_str(&contents).map_err(|e| AppError::Store(format!("parse users.json: {e}")))?
        };

        let result = f(&mut users)?;

        let serialized = serde_json::to_string_pretty(&users)
            .map_err(|e| AppError::Store(format!("serialize users.json: {e}")))?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let tmp_path = dir.join(format!(
            ".{}.tmp",
            self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "users.json".into())
        ));
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(serialized.as_bytes())?;
            tmp.write_all(b"\n")?;
            tmp.flush()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        fs2::FileExt::unlock(&lock_file).ok();
        Ok(result)
    }

    pub fn list(&self) -> Result<Vec<User>, AppError> {
        self.with_locked(|users| Ok(users.iter().map(|(u, s)| to_domain(u, s)).collect()))
    }

    pub fn get(&self, username: &str) -> Result<Option<User>, AppError> {
        self.with_locked(|users| Ok(users.get(username).map(|s| to_domain(username, s))))
    }

    /// Returns the full record including the password hash, used only by the
    /// login path.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>, AppError> {
        self.with_locked(|users| {
            let Some(stored) = users.get(username) else { return Ok(None) };
            if super::password::verify_password(password, &stored.password) {
                Ok(Some(to_domain(username, stored)))
            } else {
                Ok(None)
            }
        })
    }

    pub fn create(&self, username: &str, password: &str, name: &str, email: &str, role: Role) -> Result<(), AppError> {
        let hashed = hash_password(password)?;
        self.with_locked(|users| {
            if users.contains_key(username) {
                return Err(AppError::BadRequest(format!("user '{username}' already exists")));
            }
            users.insert(
                username.to_string(),
                StoredUser { password: hashed, name: name_or_username(name, username), email: email.to_string(), role },
            );
            Ok(())
        })
    }

    pub fn update(&self, username: &str, name: Option<&str>, email: Option<&str>) -> Result<(), AppError> {
        self.with_locked(|users| {
            let stored = users
                .get_mut(username)
                .ok_or_else(|| AppError::NotFound(format!("user '{username}' not found")))?;
            if let Some(n) = name {
                stored.name = n.to_string();
            }
            if let Some(e) = email {
                stored.email = e.to_string();
            }
            Ok(())
        })
    }

    pub fn delete(&self, username: &str) -> Result<(), AppError> {
        self.with_locked(|users| {
            if username == "admin" {
                return Err(AppError::Forbidden("the admin account cannot be deleted".into()));
            }
            if !users.contains_key(username) {
                return Err(AppError::NotFound(format!("user '{username}' not found")));
            }
            reject_if_sole_admin(users, &[username.to_string()])?;
            users.remove(username);
            Ok(())
        })
    }

    pub fn set_password(&self, username: &str, new_password: &str) -> Result<(), AppError> {
        let hashed = hash_password(new_password)?;
        self.with_locked(|users| {
            let stored = users
                .get_mut(username)
                .ok_or_else(|| AppError::NotFound(format!("user '{username}' not found")))?;
            stored.password = hashed;
            Ok(())
        })
    }

    pub fn set_username(&self, old_username: &str, new_username: &str) -> Result<(), AppError> {
        self.with_locked(|users| {
            if !users.contains_key(old_username) {
                return Err(AppError::NotFound(format!("user '{old_username}' not found")));
            }
            if users.contains_key(new_username) {
                return Err(AppError::BadRequest(format!("user '{new_username}' already exists")));
            }
            let stored = users.remove(old_username).expect("checked above");
            users.insert(new_username.to_string(), stored);
            Ok(())
        })
    }

    pub fn set_role(&self, username: &str, new_role: Role) -> Result<(), AppError> {
        self.with_locked(|users| {
            if new_role == Role::User {
                reject_if_sole_admin(users, &[username.to_string()])?;
            }
            let stored = users
                .get_mut(username)
                .ok_or_else(|| AppError::NotFound(format!("user '{username}' not found")))?;
            stored.role = new_role;
            Ok(())
        })
    }

    /// Create `count` users with randomly generated usernames and passwords,
    /// returning the plaintext credentials exactly once (the only time they
    /// are ever recoverable, since the store only retains the hash).
    pub fn bulk_random_create(&self, count: usize, role: Role) -> Result<Vec<GeneratedCredential>, AppError> {
        self.with_locked(|users| {
            let mut created = Vec::with_capacity(count);
            for _ in 0..count {
                let username = loop {
                    let candidate = format!("user_{}", random_token(8).to_lowercase());
                    if !users.contains_key(&candidate) {
                        break candidate;
                    }
                };
                let password = random_token(16);
                let hashed = hash_password(&password)?;
                users.insert(
                    username.clone(),
                    StoredUser { password: hashed, name: username.clone(), email: String::new(), role },
                );
                created.push(GeneratedCredential { username, password });
            }
            Ok(created)
        })
    }

    /// Delete every username in `usernames`, refusing the whole batch if it
    /// would delete `admin` or leave no admin account behind.
    pub fn bulk_delete(&self, usernames: &[String]) -> Result<(), AppError> {
        self.with_locked(|users| {
            for username in usernames {
                if username == "admin" {
                    return Err(AppError::Forbidden("the admin account cannot be deleted".into()));
                }
                if !users.contains_key(username) {
                    return Err(AppError::NotFound(format!("user '{username}' not found")));
                }
            }
            reject_if_sole_admin(users, usernames)?;
            for username in usernames {
                users.remove(username);
            }
            Ok(())
        })
    }

    /// Reset the passwords of every username in `usernames` to freshly
    /// generated random ones, returned in the same order.
    pub fn bulk_reset_password(&self, usernames: &[String]) -> Result<Vec<GeneratedCredential>, AppError> {
        self.with_locked(|users| {
            for username in usernames {
                if !users.contains_key(username) {
                    return Err(AppError::NotFound(format!("user '{username}' not found")));
                }
            }
            let mut reset = Vec::with_capacity(usernames.len());
            for username in usernames {
                let password = random_token(16);
                let hashed = hash_password(&password)?;
                users.get_mut(username).expect("checked above").password = hashed;
                reset.push(GeneratedCredential { username: username.clone(), password });
            }
            Ok(reset)
        })
    }

    pub fn export_all(&self) -> Result<Vec<User>, AppError> {
        self.list()
    }
}

pub struct GeneratedCredential {
    pub username: String,
    pub password: String,
}

fn to_domain(username: &str, stored: &StoredUser) -> User {
    User {
        username: username.to_string(),
        password: stored.password.clone(),
        name: stored.name.clone(),
        email: stored.email.clone(),
        role: stored.role,
    }
}

fn name_or_username(name: &str, username: &str) -> String {
    if name.is_empty() {
        username.to_string()
    } else {
        name.to_string()
    }
}

/// Refuse a mutation that would strip the last remaining admin. `affected`
/// lists usernames about to be demoted or removed.
fn reject_if_sole_admin(users: &UserMap, affected: &[String]) -> Result<(), AppError> {
    let admin_count = users.values().filter(|u| u.role == Role::Admin).count();
    let affected_admins = affected
        .iter()
        .filter(|u| users.get(*u).map(|s| s.role == Role::Admin).unwrap_or(false))
        .count();
    if admin_count > 0 && admin_count <= affected_admins {
        return Err(AppError::Forbidden("cannot remove the last remaining admin".into()));
    }
    Ok(())
}

fn random_token(len: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (UserStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (UserStore::new(dir.path().join("users.json")), dir)
    }

    #[test]
    fn create_then_authenticate_round_trips() {
        let (store, _dir) = temp_store();
        store.create("alice", "hunter2", "Alice", "alice@example.com", Role::User).unwrap();
        let user = store.authenticate("alice", "hunter2").unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert!(store.authenticate("alice", "wrong").unwrap().is_none());
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let (store, _dir) = temp_store();
        store.create("alice", "pw", "", "", Role::User).unwrap();
        assert!(store.create("alice", "pw2", "", "", Role::User).is_err());
    }

    #[test]
    fn admin_cannot_be_deleted() {
        let (store, _dir) = temp_store();
        store.create("admin", "pw", "", "", Role::Admin).unwrap();
        assert!(store.delete("admin").is_err());
    }

    #[test]
    fn cannot_remove_last_admin_via_bulk_delete() {
        let (store, _dir) = temp_store();
        store.create("root_admin", "pw", "", "", Role::Admin).unwrap();
        store.create("bob", "pw", "", "", Role::User).unwrap();
        assert!(store.bulk_delete(&["root_admin".to_string()]).is_err());
        assert!(store.bulk_delete(&["bob".to_string()]).is_ok());
    }

    #[test]
    fn bulk_random_create_generates_distinct_credentials() {
        let (store, _dir) = temp_store();
        let created = store.bulk_random_create(3, Role::User).unwrap();
        assert_eq!(created.len(), 3);
        let mut usernames: Vec<_> = created.iter().map(|c| c.username.clone()).collect();
        usernames.sort();
        usernames.dedup();
        assert_eq!(usernames.len(), 3);
        for c in &created {
            assert!(store.authenticate(&c.username, &c.password).unwrap().is_some());
        }
    }

    #[test]
    fn rename_preserves_password_hash() {
        let (store, _dir) = temp_store();
        store.create("alice", "hunter2", "", "", Role::User).unwrap();
        store.set_username("alice", "alicia").unwrap();
        assert!(store.authenticate("alicia", "hunter2").unwrap().is_some());
        assert!(store.authenticate("alice", "hunter2").unwrap().is_none());
    }
}
