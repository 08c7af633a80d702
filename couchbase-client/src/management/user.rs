//! User, role, and group management.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use couchbase_core::{CouchbaseError, Result};

use super::admin;
use crate::cluster::ClientCore;
use crate::dispatch::mapper::ErrorFilter;

/// A role, optionally scoped to a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role name (`data_reader`, `query_select`, ...).
    pub name: String,
    /// Bucket the role is limited to; `None` grants it cluster-wide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

impl Role {
    /// Creates a cluster-wide role.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bucket: None,
        }
    }

    /// Creates a role scoped to one bucket.
    pub fn for_bucket(name: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bucket: Some(bucket.into()),
        }
    }
}

/// A role with its human-readable description, as listed by the cluster.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleAndDescription {
    /// The role itself.
    pub role: Role,
    /// Short display name.
    #[serde(default)]
    pub display_name: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
}

/// A user definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Login name.
    pub username: String,
    /// Human-readable display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Password; write-only, never reported back by the cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Directly granted roles.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Groups the user belongs to.
    #[serde(default)]
    pub groups: Vec<String>,
}

impl User {
    /// Creates a user with no roles or groups.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            display_name: None,
            password: None,
            roles: Vec::new(),
            groups: Vec::new(),
        }
    }
}

/// A group of roles assignable to users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// Group name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Roles granted through this group.
    #[serde(default)]
    pub roles: Vec<Role>,
}

/// Options for dropping a user.
#[derive(Debug, Clone, Default)]
pub struct DropUserOptions {
    /// Per-call deadline; defaults to the configured management timeout.
    pub timeout: Option<Duration>,
    /// Succeed without error if the user does not exist.
    pub ignore_if_not_exists: bool,
}

/// Options for dropping a group.
#[derive(Debug, Clone, Default)]
pub struct DropGroupOptions {
    /// Per-call deadline; defaults to the configured management timeout.
    pub timeout: Option<Duration>,
    /// Succeed without error if the group does not exist.
    pub ignore_if_not_exists: bool,
}

/// Manages users, roles, and groups over the administrative path.
#[derive(Debug)]
pub struct UserManager {
    core: Arc<ClientCore>,
}

impl UserManager {
    pub(crate) fn new(core: Arc<ClientCore>) -> Self {
        Self { core }
    }

    /// Fetches a user by name.
    pub async fn get_user(&self, username: &str) -> Result<User> {
        let mut payload = Map::new();
        payload.insert("username".to_string(), json!(username));

        let body = admin(
            &self.core,
            "user.get",
            payload,
            None,
            ErrorFilter::default(),
            username,
        )
        .await?
        .unwrap_or(Value::Null);

        serde_json::from_value(body.get("user").cloned().unwrap_or(Value::Null))
            .map_err(|e| CouchbaseError::Serialization(format!("user: {e}")))
    }

    /// Lists every user.
    pub async fn get_all_users(&self) -> Result<Vec<User>> {
        let body = admin(
            &self.core,
            "user.get-all",
            Map::new(),
            None,
            ErrorFilter::default(),
            "",
        )
        .await?
        .unwrap_or(Value::Null);

        serde_json::from_value(body.get("users").cloned().unwrap_or_else(|| json!([])))
            .map_err(|e| CouchbaseError::Serialization(format!("user listing: {e}")))
    }

    /// Creates or updates a user.
    pub async fn upsert_user(&self, user: User) -> Result<()> {
        let username = user.username.clone();
        let mut payload = Map::new();
        payload.insert(
            "user".to_string(),
            serde_json::to_value(&user)
                .map_err(|e| CouchbaseError::Serialization(format!("user encode: {e}")))?,
        );

        admin(
            &self.core,
            "user.upsert",
            payload,
            None,
            ErrorFilter::default(),
            &username,
        )
        .await
        .map(|_| ())
    }

    /// Removes a user.
    pub async fn drop_user(&self, username: &str, options: DropUserOptions) -> Result<()> {
        let mut payload = Map::new();
        payload.insert("username".to_string(), json!(username));

        admin(
            &self.core,
            "user.drop",
            payload,
            options.timeout,
            ErrorFilter {
                ignore_existing: false,
                ignore_missing: options.ignore_if_not_exists,
            },
            username,
        )
        .await
        .map(|_| ())
    }

    /// Lists every role the cluster understands.
    pub async fn get_roles(&self) -> Result<Vec<RoleAndDescription>> {
        let body = admin(
            &self.core,
            "user.roles",
            Map::new(),
            None,
            ErrorFilter::default(),
            "",
        )
        .await?
        .unwrap_or(Value::Null);

        serde_json::from_value(body.get("roles").cloned().unwrap_or_else(|| json!([])))
            .map_err(|e| CouchbaseError::Serialization(format!("role listing: {e}")))
    }

    /// Fetches a group by name.
    pub async fn get_group(&self, name: &str) -> Result<Group> {
        let mut payload = Map::new();
        payload.insert("name".to_string(), json!(name));

        let body = admin(
            &self.core,
            "group.get",
            payload,
            None,
            ErrorFilter::default(),
            name,
        )
        .await?
        .unwrap_or(Value::Null);

        serde_json::from_value(body.get("group").cloned().unwrap_or(Value::Null))
            .map_err(|e| CouchbaseError::Serialization(format!("group: {e}")))
    }

    /// Lists every group.
    pub async fn get_all_groups(&self) -> Result<Vec<Group>> {
        let body = admin(
            &self.core,
            "group.get-all",
            Map::new(),
            None,
            ErrorFilter::default(),
            "",
        )
        .await?
        .unwrap_or(Value::Null);

        serde_json::from_value(body.get("groups").cloned().unwrap_or_else(|| json!([])))
            .map_err(|e| CouchbaseError::Serialization(format!("group listing: {e}")))
    }

    /// Creates or updates a group.
    pub async fn upsert_group(&self, group: Group) -> Result<()> {
        let name = group.name.clone();
        let mut payload = Map::new();
        payload.insert(
            "group".to_string(),
            serde_json::to_value(&group)
                .map_err(|e| CouchbaseError::Serialization(format!("group encode: {e}")))?,
        );

        admin(
            &self.core,
            "group.upsert",
            payload,
            None,
            ErrorFilter::default(),
            &name,
        )
        .await
        .map(|_| ())
    }

    /// Removes a group.
    pub async fn drop_group(&self, name: &str, options: DropGroupOptions) -> Result<()> {
        let mut payload = Map::new();
        payload.insert("name".to_string(), json!(name));

        admin(
            &self.core,
            "group.drop",
            payload,
            options.timeout,
            ErrorFilter {
                ignore_existing: false,
                ignore_missing: options.ignore_if_not_exists,
            },
            name,
        )
        .await
        .map(|_| ())
    }
}
