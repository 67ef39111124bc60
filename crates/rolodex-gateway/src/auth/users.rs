//! User model and storage.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rolodex_core::UserId;

use super::AuthError;

/// User role for access control.
///
/// Roles are additive: holding more roles never reduces privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Base role every account holds.
    User,
    /// Administrative access; overrides ownership checks.
    Admin,
}

impl Role {
    /// Check if this role grants admin privileges.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(AuthError::Config(format!("Unknown role: {s}"))),
        }
    }
}

/// User account.
///
/// The password hash and the profile fields are storage-internal; outward
/// representations go through [`PublicUser`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Email address (unique, stored normalized).
    pub email: String,
    /// Nickname (unique).
    pub nickname: String,
    /// Argon2 password hash.
    pub password_hash: String,
    /// Roles held by this account (non-empty).
    pub roles: Vec<Role>,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Phone number.
    pub phone_number: String,
    /// Free-text description.
    pub description: String,
    /// Position or job title.
    pub position: String,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create the outward-facing representation.
    ///
    /// Strips the password hash and the profile fields.
    #[must_use]
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            email: self.email.clone(),
            nickname: self.nickname.clone(),
            roles: self.roles.clone(),
            created_at: self.created_at,
        }
    }
}

/// Public user representation (for API responses).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    /// Unique user ID.
    pub id: UserId,
    /// Email address.
    pub email: String,
    /// Nickname.
    pub nickname: String,
    /// Roles held.
    pub roles: Vec<Role>,
    /// When created.
    pub created_at: DateTime<Utc>,
}

/// User store backed by sled.
///
/// Email and nickname uniqueness is enforced here, atomically, via
/// compare-and-swap on the index keys. An application-level existence
/// pre-check can pass and still lose the race; the swap result is the
/// final arbiter and a lost race surfaces as [`AuthError::Conflict`].
pub struct UserStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl UserStore {
    /// Open or create a user store at the given path.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, AuthError> {
        let db = sled::open(path.join("auth"))
            .map_err(|e| AuthError::Storage(format!("Failed to open auth database: {e}")))?;

        Self::with_db(db)
    }

    /// Create a user store on an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if tree cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, AuthError> {
        let tree = db
            .open_tree("users")
            .map_err(|e| AuthError::Storage(format!("Failed to open users tree: {e}")))?;

        Ok(Self { db, tree })
    }

    /// Get the underlying sled database.
    #[must_use]
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Count total users.
    #[must_use]
    pub fn count(&self) -> usize {
        self.tree
            .iter()
            .filter(|r| {
                r.as_ref()
                    .map(|(k, _)| !k.starts_with(b"idx:"))
                    .unwrap_or(false)
            })
            .count()
    }

    /// Persist a new user.
    ///
    /// Claims the email index, then the nickname index, then writes the
    /// record. Each claim is a compare-and-swap from absent, so two
    /// concurrent signups for the same email or nickname cannot both
    /// succeed regardless of any earlier existence check.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Conflict` if a uniqueness constraint was taken
    /// concurrently, or `AuthError::Storage` on database failure.
    pub fn create(&self, user: &User) -> Result<(), AuthError> {
        let email_key = format!("idx:email:{}", user.email);
        let nickname_key = format!("idx:nickname:{}", user.nickname);
        let id_bytes = user.id.as_ref().as_bytes();

        match self
            .tree
            .compare_and_swap(email_key.as_bytes(), None::<&[u8]>, Some(id_bytes))
        {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                return Err(AuthError::Conflict(format!(
                    "email {} already registered",
                    user.email
                )));
            }
            Err(e) => return Err(AuthError::Storage(format!("Index error: {e}"))),
        }

        match self
            .tree
            .compare_and_swap(nickname_key.as_bytes(), None::<&[u8]>, Some(id_bytes))
        {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                // Release the email claim taken above before reporting.
                let _ = self.tree.remove(email_key.as_bytes());
                return Err(AuthError::Conflict(format!(
                    "nickname {} already registered",
                    user.nickname
                )));
            }
            Err(e) => {
                let _ = self.tree.remove(email_key.as_bytes());
                return Err(AuthError::Storage(format!("Index error: {e}")));
            }
        }

        let value = serde_json::to_vec(user)
            .map_err(|e| AuthError::Storage(format!("Serialization error: {e}")))?;

        self.tree
            .insert(id_bytes, value)
            .map_err(|e| AuthError::Storage(format!("Insert error: {e}")))?;

        self.tree
            .flush()
            .map_err(|e| AuthError::Storage(format!("Flush error: {e}")))?;

        Ok(())
    }

    /// Look up a user by ID.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn find_by_id(&self, id: &UserId) -> Result<Option<User>, AuthError> {
        match self.tree.get(id.as_ref().as_bytes()) {
            Ok(Some(value)) => {
                let user: User = serde_json::from_slice(&value)
                    .map_err(|e| AuthError::Storage(format!("Deserialization error: {e}")))?;
                Ok(Some(user))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(AuthError::Storage(format!("Get error: {e}"))),
        }
    }

    /// Look up a user by normalized email.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        self.find_by_index(&format!("idx:email:{email}"))
    }

    /// Look up a user by nickname.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn find_by_nickname(&self, nickname: &str) -> Result<Option<User>, AuthError> {
        self.find_by_index(&format!("idx:nickname:{nickname}"))
    }

    fn find_by_index(&self, index_key: &str) -> Result<Option<User>, AuthError> {
        match self.tree.get(index_key.as_bytes()) {
            Ok(Some(id_bytes)) => {
                let id = String::from_utf8_lossy(&id_bytes).into_owned();
                self.find_by_id(&UserId::new(id))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(AuthError::Storage(format!("Index lookup error: {e}"))),
        }
    }

    /// Delete a user.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn delete(&self, id: &UserId) -> Result<bool, AuthError> {
        // Release the uniqueness claims first
        if let Some(user) = self.find_by_id(id)? {
            let email_key = format!("idx:email:{}", user.email);
            let nickname_key = format!("idx:nickname:{}", user.nickname);
            self.tree
                .remove(email_key.as_bytes())
                .map_err(|e| AuthError::Storage(format!("Index remove error: {e}")))?;
            self.tree
                .remove(nickname_key.as_bytes())
                .map_err(|e| AuthError::Storage(format!("Index remove error: {e}")))?;
        }

        let removed = self
            .tree
            .remove(id.as_ref().as_bytes())
            .map_err(|e| AuthError::Storage(format!("Delete error: {e}")))?
            .is_some();

        self.tree
            .flush()
            .map_err(|e| AuthError::Storage(format!("Flush error: {e}")))?;

        Ok(removed)
    }

    /// List all users.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn list(&self) -> Result<Vec<User>, AuthError> {
        let mut users = Vec::new();

        for result in self.tree.iter() {
            let (key, value) = result.map_err(|e| AuthError::Storage(format!("Iter error: {e}")))?;

            // Skip index entries
            if key.starts_with(b"idx:") {
                continue;
            }

            let user: User = serde_json::from_slice(&value)
                .map_err(|e| AuthError::Storage(format!("Deserialization error: {e}")))?;
            users.push(user);
        }

        Ok(users)
    }
}

/// Generate a simple UUID v4.
pub(crate) fn uuid_v4() -> String {
    use rand::RngCore;
    let mut rng = rand::thread_rng();
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);

    // Set version (4) and variant bits
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_user(email: &str, nickname: &str) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(format!("user_{}", uuid_v4())),
            email: email.to_string(),
            nickname: nickname.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            roles: vec![Role::User],
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            phone_number: "+1 555 0100".to_string(),
            description: String::new(),
            position: "engineer".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_create_and_find() {
        let temp_dir = TempDir::new().unwrap();
        let store = UserStore::open(temp_dir.path()).unwrap();

        let user = test_user("a@x.com", "alice");
        store.create(&user).unwrap();
        assert_eq!(store.count(), 1);

        let by_id = store.find_by_id(&user.id).unwrap().unwrap();
        assert_eq!(by_id.email, "a@x.com");

        let by_email = store.find_by_email("a@x.com").unwrap().unwrap();
        assert_eq!(by_email.id, user.id);

        let by_nickname = store.find_by_nickname("alice").unwrap().unwrap();
        assert_eq!(by_nickname.id, user.id);

        assert!(store.find_by_email("missing@x.com").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_loses_race() {
        let temp_dir = TempDir::new().unwrap();
        let store = UserStore::open(temp_dir.path()).unwrap();

        store.create(&test_user("a@x.com", "alice")).unwrap();
        let result = store.create(&test_user("a@x.com", "bob"));

        assert!(matches!(result, Err(AuthError::Conflict(_))));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_duplicate_nickname_releases_email_claim() {
        let temp_dir = TempDir::new().unwrap();
        let store = UserStore::open(temp_dir.path()).unwrap();

        store.create(&test_user("a@x.com", "alice")).unwrap();

        // Fresh email, taken nickname: conflict
        let result = store.create(&test_user("b@x.com", "alice"));
        assert!(matches!(result, Err(AuthError::Conflict(_))));

        // The failed attempt must not leave b@x.com claimed
        store.create(&test_user("b@x.com", "bob")).unwrap();
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn test_delete_releases_uniqueness_claims() {
        let temp_dir = TempDir::new().unwrap();
        let store = UserStore::open(temp_dir.path()).unwrap();

        let user = test_user("a@x.com", "alice");
        store.create(&user).unwrap();
        assert!(store.delete(&user.id).unwrap());
        assert!(!store.delete(&user.id).unwrap());

        assert!(store.find_by_email("a@x.com").unwrap().is_none());

        // Email and nickname are reusable after deletion
        store.create(&test_user("a@x.com", "alice")).unwrap();
    }

    #[test]
    fn test_list_skips_index_entries() {
        let temp_dir = TempDir::new().unwrap();
        let store = UserStore::open(temp_dir.path()).unwrap();

        store.create(&test_user("a@x.com", "alice")).unwrap();
        store.create(&test_user("b@x.com", "bob")).unwrap();

        let users = store.list().unwrap();
        assert_eq!(users.len(), 2);
    }

    #[test]
    fn test_public_user_has_no_secret_or_profile_fields() {
        let user = test_user("a@x.com", "alice");
        let public = user.to_public();

        let value = serde_json::to_value(&public).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("password_hash"));
        assert!(!obj.contains_key("password"));
        assert!(!obj.contains_key("first_name"));
        assert!(!obj.contains_key("phone_number"));
        assert!(!obj.contains_key("description"));
        assert!(!obj.contains_key("position"));
        assert_eq!(obj["email"], "a@x.com");
    }

    #[test]
    fn test_role_parsing() {
        use std::str::FromStr;

        assert_eq!(Role::from_str("admin").unwrap(), Role::Admin);
        assert_eq!(Role::from_str("User").unwrap(), Role::User);
        assert!(Role::from_str("overlord").is_err());
        assert!(Role::Admin.is_admin());
        assert!(!Role::User.is_admin());
    }
}
