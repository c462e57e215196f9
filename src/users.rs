//! Local user materialization from verified identity data
//!
//! Maps the identity payload returned by the Identity Provider's verify
//! endpoint to a local user record, creating it on first login. Local
//! password authentication is permanently unreachable for SSO-provisioned
//! accounts: the only valid authentication path is the Identity Provider.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SsoError;

/// Identity data returned by the Identity Provider's verify endpoint
///
/// The known field set is explicit; anything else the provider sends
/// lands in `extra_data` instead of being splatted into the user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityPayload {
	pub username: String,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub first_name: Option<String>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub last_name: Option<String>,

	/// Provider-specific extra profile fields
	#[serde(flatten)]
	pub extra_data: HashMap<String, Value>,
}

/// Local user record owned by the Service Provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalUser {
	pub id: Uuid,
	pub username: String,
	pub email: String,
	pub first_name: String,
	pub last_name: String,
	pub is_active: bool,
	pub date_joined: DateTime<Utc>,
	/// `None` means no usable password; resolver-provisioned users never
	/// get one
	pub password_hash: Option<String>,
}

impl LocalUser {
	/// Whether this user could authenticate with a local password
	pub fn has_usable_password(&self) -> bool {
		self.password_hash.is_some()
	}
}

/// User storage seam
///
/// The crate ships [`InMemoryUserStore`] for development and testing;
/// production deployments implement this trait over their own storage.
#[async_trait]
pub trait UserStore: Send + Sync {
	/// Looks up a user by username
	async fn find_by_username(&self, username: &str) -> Result<Option<LocalUser>, SsoError>;

	/// Inserts or updates a user, keyed by id
	///
	/// Implementations should enforce username uniqueness (a database
	/// unique constraint, typically): the resolver's find-then-save
	/// sequence is not atomic, so two concurrent first logins for the
	/// same username may both reach `save` with fresh ids.
	async fn save(&self, user: &LocalUser) -> Result<(), SsoError>;
}

/// In-memory user store for development and testing
///
/// Not suitable for production: users vanish on restart and the store is
/// local to one process.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
	users: Arc<RwLock<HashMap<Uuid, LocalUser>>>,
}

impl InMemoryUserStore {
	/// Creates an empty store
	pub fn new() -> Self {
		Self::default()
	}

	/// Lists all stored users
	pub fn list_all(&self) -> Vec<LocalUser> {
		let users = self.users.read().unwrap_or_else(|e| e.into_inner());
		users.values().cloned().collect()
	}
}

#[async_trait]
impl UserStore for InMemoryUserStore {
	async fn find_by_username(&self, username: &str) -> Result<Option<LocalUser>, SsoError> {
		let users = self.users.read().unwrap_or_else(|e| e.into_inner());
		Ok(users.values().find(|u| u.username == username).cloned())
	}

	async fn save(&self, user: &LocalUser) -> Result<(), SsoError> {
		let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
		users.insert(user.id, user.clone());
		Ok(())
	}
}

/// Maps verified identity data to a local user (create-or-fetch)
///
/// Idempotent on username: resolving the same username repeatedly reuses
/// the existing record and never creates duplicates.
pub struct IdentityResolver<S> {
	store: Arc<S>,
}

impl<S: UserStore> IdentityResolver<S> {
	/// Creates a resolver over the given store
	pub fn new(store: Arc<S>) -> Self {
		Self { store }
	}

	/// Fetches or creates the local user for `payload`
	///
	/// Profile fields present in the payload refresh the stored record on
	/// every login. The local password is forced to the unusable state on
	/// both the create and the fetch path.
	pub async fn resolve(&self, payload: &IdentityPayload) -> Result<LocalUser, SsoError> {
		let mut user = match self.store.find_by_username(&payload.username).await? {
			Some(existing) => existing,
			None => {
				tracing::info!(username = %payload.username, "Provisioning local user");
				LocalUser {
					id: Uuid::new_v4(),
					username: payload.username.clone(),
					email: String::new(),
					first_name: String::new(),
					last_name: String::new(),
					is_active: true,
					date_joined: Utc::now(),
					password_hash: None,
				}
			}
		};

		if let Some(email) = &payload.email {
			user.email = email.clone();
		}
		if let Some(first_name) = &payload.first_name {
			user.first_name = first_name.clone();
		}
		if let Some(last_name) = &payload.last_name {
			user.last_name = last_name.clone();
		}
		user.password_hash = None;

		self.store.save(&user).await?;
		tracing::debug!(username = %user.username, user_id = %user.id, "Resolved local user");
		Ok(user)
	}
}
