use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CollabError, CollabResult};

/// Rectangular grid of real numbers, row-major.
pub type Grid = Vec<Vec<f64>>;

/// Largest row or column count accepted for a stored matrix.
pub const MAX_DIMENSION: usize = 1000;

/// Collaborator role on a single matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Editor,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "viewer" => Some(Self::Viewer),
            "editor" => Some(Self::Editor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: String,
    pub role: Role,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub rows: usize,
    pub columns: usize,
}

impl Dimensions {
    /// Both dimensions within 1..=MAX_DIMENSION.
    pub fn check_bounds(&self) -> CollabResult<()> {
        if self.rows == 0 || self.columns == 0 {
            return Err(CollabError::InvalidInput(
                "Matrix dimensions must be at least 1x1".to_string(),
            ));
        }
        if self.rows > MAX_DIMENSION || self.columns > MAX_DIMENSION {
            return Err(CollabError::InvalidInput(format!(
                "Matrix dimensions must not exceed {}x{}",
                MAX_DIMENSION, MAX_DIMENSION
            )));
        }
        Ok(())
    }

    pub fn zeros(&self) -> Grid {
        vec![vec![0.0; self.columns]; self.rows]
    }

    /// Check that `data` is exactly `rows` rows of `columns` finite values each.
    pub fn validate(&self, data: &[Vec<f64>]) -> CollabResult<()> {
        self.check_bounds()?;
        if data.len() != self.rows {
            return Err(CollabError::InvalidInput(
                "Data rows do not match dimensions".to_string(),
            ));
        }
        if data.iter().any(|row| row.len() != self.columns) {
            return Err(CollabError::InvalidInput(
                "Data columns do not match dimensions".to_string(),
            ));
        }
        if data.iter().flatten().any(|v| !v.is_finite()) {
            return Err(CollabError::InvalidInput(
                "Matrix values must be finite numbers".to_string(),
            ));
        }
        Ok(())
    }
}

/// A shared matrix as held by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Matrix {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub collaborators: Vec<Collaborator>,
    pub dimensions: Dimensions,
    pub data: Grid,
    pub modification_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Matrix {
    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    pub fn collaborator_role(&self, user_id: &str) -> Option<Role> {
        self.collaborators
            .iter()
            .find(|c| c.user_id == user_id)
            .map(|c| c.role)
    }

    /// Grant `role` to `user_id`. An existing entry is updated in place, so a
    /// user never holds more than one role. The owner cannot be a collaborator.
    pub fn add_collaborator(&mut self, user_id: &str, role: Role) -> CollabResult<()> {
        if self.is_owner(user_id) {
            return Err(CollabError::InvalidInput(
                "The owner cannot be added as a collaborator".to_string(),
            ));
        }
        match self.collaborators.iter_mut().find(|c| c.user_id == user_id) {
            Some(existing) => existing.role = role,
            None => self.collaborators.push(Collaborator {
                user_id: user_id.to_string(),
                role,
                added_at: Utc::now(),
            }),
        }
        Ok(())
    }

    /// Returns true if an entry was removed.
    pub fn remove_collaborator(&mut self, user_id: &str) -> bool {
        let before = self.collaborators.len();
        self.collaborators.retain(|c| c.user_id != user_id);
        self.collaborators.len() < before
    }
}

/// One entry of a matrix's operation history. Written once, never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub op_type: String,
    pub parameters: serde_json::Value,
    pub result: serde_json::Value,
    pub performed_by: String,
    pub timestamp: DateTime<Utc>,
}
