use bitflags::bitflags;

use super::model::{Matrix, Role};
use crate::error::{CollabError, CollabResult};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u8 {
        const VIEW  = 1 << 0;
        const EDIT  = 1 << 1;
        const ADMIN = 1 << 2;
    }
}

impl Role {
    /// Roles are cumulative: each grants everything the one below it does.
    pub fn permissions(self) -> Permissions {
        match self {
            Role::Viewer => Permissions::VIEW,
            Role::Editor => Permissions::VIEW | Permissions::EDIT,
            Role::Admin => Permissions::all(),
        }
    }
}

/// Action a user asks to perform on a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Edit,
    Admin,
}

impl Action {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "view" => Some(Self::View),
            "edit" => Some(Self::Edit),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::Admin => "admin",
        }
    }

    fn required(self) -> Permissions {
        match self {
            Self::View => Permissions::VIEW,
            Self::Edit => Permissions::EDIT,
            Self::Admin => Permissions::ADMIN,
        }
    }
}

/// Effective permissions of `user_id` on `matrix`.
/// The owner always holds everything; anyone else gets what their role grants.
pub fn compute_user_permissions(matrix: &Matrix, user_id: &str) -> Permissions {
    if matrix.is_owner(user_id) {
        return Permissions::all();
    }
    matrix
        .collaborator_role(user_id)
        .map(Role::permissions)
        .unwrap_or_else(Permissions::empty)
}

pub fn can(matrix: &Matrix, user_id: &str, action: Action) -> bool {
    compute_user_permissions(matrix, user_id).contains(action.required())
}

/// String-keyed check. Unknown actions are denied.
pub fn has_permission(matrix: &Matrix, user_id: &str, action: &str) -> bool {
    Action::parse(action)
        .map(|a| can(matrix, user_id, a))
        .unwrap_or(false)
}

pub fn require(matrix: &Matrix, user_id: &str, action: Action) -> CollabResult<()> {
    if can(matrix, user_id, action) {
        Ok(())
    } else {
        Err(CollabError::PermissionDenied(format!(
            "{} permission required",
            action.as_str()
        )))
    }
}

/// Deletion and collaborator removal are reserved for the owner; roles do not grant them.
pub fn require_owner(matrix: &Matrix, user_id: &str, what: &str) -> CollabResult<()> {
    if matrix.is_owner(user_id) {
        Ok(())
    } else {
        Err(CollabError::PermissionDenied(format!(
            "Only the owner can {}",
            what
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::model::Dimensions;
    use chrono::Utc;

    fn matrix_with(collaborators: &[(&str, Role)]) -> Matrix {
        let mut m = Matrix {
            id: "m".into(),
            name: "m".into(),
            description: String::new(),
            owner_id: "owner".into(),
            collaborators: vec![],
            dimensions: Dimensions { rows: 1, columns: 1 },
            data: vec![vec![0.0]],
            modification_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        for (user, role) in collaborators {
            m.add_collaborator(user, *role).unwrap();
        }
        m
    }

    #[test]
    fn viewer_can_only_view() {
        let m = matrix_with(&[("v", Role::Viewer)]);
        assert!(has_permission(&m, "v", "view"));
        assert!(!has_permission(&m, "v", "edit"));
        assert!(!has_permission(&m, "v", "admin"));
    }

    #[test]
    fn editor_and_admin_grants() {
        let m = matrix_with(&[("e", Role::Editor), ("a", Role::Admin)]);
        assert!(has_permission(&m, "e", "view"));
        assert!(has_permission(&m, "e", "edit"));
        assert!(!has_permission(&m, "e", "admin"));
        assert!(has_permission(&m, "a", "view"));
        assert!(has_permission(&m, "a", "edit"));
        assert!(has_permission(&m, "a", "admin"));
    }

    #[test]
    fn stranger_is_denied_everything() {
        let m = matrix_with(&[("v", Role::Viewer)]);
        for action in ["view", "edit", "admin"] {
            assert!(!has_permission(&m, "stranger", action));
        }
    }

    #[test]
    fn owner_passes_regardless_of_collaborators() {
        let empty = matrix_with(&[]);
        let crowded = matrix_with(&[("v", Role::Viewer), ("a", Role::Admin)]);
        for m in [&empty, &crowded] {
            for action in ["view", "edit", "admin"] {
                assert!(has_permission(m, "owner", action));
            }
        }
    }

    #[test]
    fn unknown_action_fails_closed() {
        let m = matrix_with(&[("a", Role::Admin)]);
        assert!(!has_permission(&m, "owner", "delete"));
        assert!(!has_permission(&m, "a", ""));
    }

    #[test]
    fn owner_only_actions() {
        let m = matrix_with(&[("a", Role::Admin)]);
        assert!(require_owner(&m, "owner", "delete this matrix").is_ok());
        let err = require_owner(&m, "a", "delete this matrix").unwrap_err();
        assert_eq!(err.kind(), "permission_denied");
    }
}
