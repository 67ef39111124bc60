//! Company records and ownership-scoped storage.
//!
//! Every company has exactly one owner for its entire lifetime. The owner
//! reference is set at creation from the authenticated caller's resolved
//! identity, never from request-supplied data, and no update path can
//! reassign it.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rolodex_core::types::{CompanyId, UserId};
use rolodex_core::validation::{self, ValidationError, limits};

use crate::auth::{AuthError, Identity, uuid_v4};

/// Company record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    /// Unique company ID.
    pub id: CompanyId,
    /// Owning user, fixed at creation.
    pub owner_id: UserId,
    /// Company name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Parsed company creation body.
#[derive(Debug, Clone, Deserialize)]
pub struct CompanyDraft {
    /// Company name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
}

/// Partial company update. The owner is not updatable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanyUpdate {
    /// New name, if changing.
    pub name: Option<String>,
    /// New description, if changing.
    pub description: Option<String>,
}

/// Verb attempted against an owned company record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerAction {
    /// Read a single record.
    Get,
    /// Modify business fields.
    Update,
    /// Remove the record.
    Delete,
}

impl OwnerAction {
    /// Human-readable verb for denial messages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Decide whether `identity` may perform `action` on `company`.
///
/// Allowed iff the caller owns the record or holds the admin override
/// role. The predicate is the same for every action; only the denial
/// message names the attempted verb.
///
/// # Errors
///
/// Returns `AuthError::Forbidden` when the caller is neither the owner
/// nor an admin.
pub fn authorize_owner(
    company: &Company,
    identity: &Identity,
    action: OwnerAction,
) -> Result<(), AuthError> {
    if company.owner_id == identity.id || identity.is_admin() {
        return Ok(());
    }

    Err(AuthError::Forbidden(format!(
        "Cannot {} a company owned by another user",
        action.as_str()
    )))
}

/// Company store backed by sled.
///
/// Records are keyed by company ID; an `idx:owner:` prefix index backs the
/// owner-scoped listing.
pub struct CompanyStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl CompanyStore {
    /// Open or create a company store at the given path.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, AuthError> {
        let db = sled::open(path.join("companies"))
            .map_err(|e| AuthError::Storage(format!("Failed to open company database: {e}")))?;

        Self::with_db(db)
    }

    /// Create a company store on an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if tree cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, AuthError> {
        let tree = db
            .open_tree("companies")
            .map_err(|e| AuthError::Storage(format!("Failed to open companies tree: {e}")))?;

        Ok(Self { db, tree })
    }

    /// Get the underlying sled database.
    #[must_use]
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Create a company owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for malformed drafts or `Storage` on database
    /// failure.
    pub fn create(&self, owner: &UserId, draft: CompanyDraft) -> Result<Company, AuthError> {
        let name = validate_name(&draft.name)?;
        let description =
            validation::validate_text("description", &draft.description, limits::MAX_TEXT_LENGTH)?;

        let now = Utc::now();
        let company = Company {
            id: CompanyId::new(format!("comp_{}", uuid_v4())),
            owner_id: owner.clone(),
            name,
            description,
            created_at: now,
            updated_at: now,
        };

        self.put(&company)?;

        let index_key = owner_index_key(owner, &company.id);
        self.tree
            .insert(index_key.as_bytes(), company.id.as_ref().as_bytes())
            .map_err(|e| AuthError::Storage(format!("Index error: {e}")))?;

        self.tree
            .flush()
            .map_err(|e| AuthError::Storage(format!("Flush error: {e}")))?;

        Ok(company)
    }

    /// Look up a company by ID.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn find_by_id(&self, id: &CompanyId) -> Result<Option<Company>, AuthError> {
        match self.tree.get(id.as_ref().as_bytes()) {
            Ok(Some(value)) => {
                let company: Company = serde_json::from_slice(&value)
                    .map_err(|e| AuthError::Storage(format!("Deserialization error: {e}")))?;
                Ok(Some(company))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(AuthError::Storage(format!("Get error: {e}"))),
        }
    }

    /// List all companies owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn find_all_by_owner(&self, owner: &UserId) -> Result<Vec<Company>, AuthError> {
        let prefix = format!("idx:owner:{owner}:");
        let mut companies = Vec::new();

        for result in self.tree.scan_prefix(prefix.as_bytes()) {
            let (_, id_bytes) =
                result.map_err(|e| AuthError::Storage(format!("Iter error: {e}")))?;
            let id = CompanyId::new(String::from_utf8_lossy(&id_bytes).into_owned());

            if let Some(company) = self.find_by_id(&id)? {
                companies.push(company);
            }
        }

        Ok(companies)
    }

    /// Apply a partial update to a company's business fields.
    ///
    /// The owner reference is deliberately not touched.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the company doesn't exist, `Validation` for
    /// malformed fields, or `Storage` on database failure.
    pub fn update(&self, id: &CompanyId, update: CompanyUpdate) -> Result<Company, AuthError> {
        let mut company = self
            .find_by_id(id)?
            .ok_or_else(|| AuthError::NotFound(format!("Company {id} not found")))?;

        if let Some(name) = update.name {
            company.name = validate_name(&name)?;
        }

        if let Some(description) = update.description {
            company.description =
                validation::validate_text("description", &description, limits::MAX_TEXT_LENGTH)?;
        }

        company.updated_at = Utc::now();
        self.put(&company)?;

        self.tree
            .flush()
            .map_err(|e| AuthError::Storage(format!("Flush error: {e}")))?;

        Ok(company)
    }

    /// Delete a company.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn delete(&self, id: &CompanyId) -> Result<bool, AuthError> {
        // Remove the owner index entry first
        if let Some(company) = self.find_by_id(id)? {
            let index_key = owner_index_key(&company.owner_id, id);
            self.tree
                .remove(index_key.as_bytes())
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

    fn put(&self, company: &Company) -> Result<(), AuthError> {
        let value = serde_json::to_vec(company)
            .map_err(|e| AuthError::Storage(format!("Serialization error: {e}")))?;

        self.tree
            .insert(company.id.as_ref().as_bytes(), value)
            .map_err(|e| AuthError::Storage(format!("Insert error: {e}")))?;

        Ok(())
    }
}

fn owner_index_key(owner: &UserId, company: &CompanyId) -> String {
    format!("idx:owner:{owner}:{company}")
}

fn validate_name(input: &str) -> Result<String, AuthError> {
    let name = validation::validate_text("name", input, limits::MAX_FIELD_LENGTH)?;
    if name.trim().is_empty() {
        return Err(ValidationError::Empty("name").into());
    }
    Ok(name)
}
