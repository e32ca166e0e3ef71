use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use super::model::{Collaborator, Dimensions, Grid, Matrix, OperationRecord, Role};
use crate::db::{lock, DbPool};
use crate::error::{CollabError, CollabResult};

/// Fields supplied when a matrix is created.
#[derive(Debug, Clone)]
pub struct NewMatrix {
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub dimensions: Dimensions,
    pub data: Grid,
}

/// Persistence for matrices, their collaborators and operation history.
///
/// Implementations are synchronous; async callers go through spawn_blocking.
/// Soft-deleted matrices behave as absent.
pub trait MatrixStore: Send + Sync {
    fn get(&self, matrix_id: &str) -> CollabResult<Matrix>;
    fn create(&self, new: NewMatrix) -> CollabResult<Matrix>;
    fn update_data(&self, matrix_id: &str, data: Grid) -> CollabResult<Matrix>;
    fn soft_delete(&self, matrix_id: &str) -> CollabResult<()>;
    fn upsert_collaborator(&self, matrix_id: &str, user_id: &str, role: Role) -> CollabResult<()>;
    fn remove_collaborator(&self, matrix_id: &str, user_id: &str) -> CollabResult<bool>;
    fn append_operation(&self, matrix_id: &str, record: &OperationRecord) -> CollabResult<()>;
    fn operations(&self, matrix_id: &str) -> CollabResult<Vec<OperationRecord>>;
}

/// SQLite-backed [`MatrixStore`].
#[derive(Clone)]
pub struct SqliteMatrixStore {
    db: DbPool,
}

impl SqliteMatrixStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

fn parse_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

fn ensure_active(conn: &Connection, matrix_id: &str) -> CollabResult<()> {
    let active: Option<bool> = conn
        .query_row(
            "SELECT is_active FROM matrices WHERE id = ?1",
            [matrix_id],
            |row| row.get(0),
        )
        .optional()?;
    match active {
        Some(true) => Ok(()),
        _ => Err(CollabError::NotFound("Matrix".to_string())),
    }
}

fn load_matrix(conn: &Connection, matrix_id: &str) -> CollabResult<Matrix> {
    let row = conn
        .query_row(
            "SELECT id, name, description, owner_id, rows, columns, data, modification_count, created_at, updated_at
             FROM matrices WHERE id = ?1 AND is_active = 1",
            [matrix_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| CollabError::NotFound("Matrix".to_string()))?;

    let (id, name, description, owner_id, rows, columns, data, modification_count, created_at, updated_at) =
        row;
    let data: Grid = serde_json::from_str(&data)?;

    let mut stmt = conn.prepare(
        "SELECT user_id, role, added_at FROM matrix_collaborators
         WHERE matrix_id = ?1 ORDER BY added_at ASC, user_id ASC",
    )?;
    let collaborators: Vec<Collaborator> = stmt
        .query_map([matrix_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .filter_map(|r| r.ok())
        .filter_map(|(user_id, role, added_at)| {
            Role::parse(&role).map(|role| Collaborator {
                user_id,
                role,
                added_at: parse_time(&added_at),
            })
        })
        .collect();

    Ok(Matrix {
        id,
        name,
        description,
        owner_id,
        collaborators,
        dimensions: Dimensions {
            rows: rows as usize,
            columns: columns as usize,
        },
        data,
        modification_count,
        created_at: parse_time(&created_at),
        updated_at: parse_time(&updated_at),
    })
}

impl MatrixStore for SqliteMatrixStore {
    fn get(&self, matrix_id: &str) -> CollabResult<Matrix> {
        let conn = lock(&self.db)?;
        load_matrix(&conn, matrix_id)
    }

    fn create(&self, new: NewMatrix) -> CollabResult<Matrix> {
        new.dimensions.validate(&new.data)?;
        let conn = lock(&self.db)?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO matrices (id, name, description, owner_id, rows, columns, data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            rusqlite::params![
                id,
                new.name,
                new.description,
                new.owner_id,
                new.dimensions.rows as i64,
                new.dimensions.columns as i64,
                serde_json::to_string(&new.data)?,
                now,
            ],
        )?;
        load_matrix(&conn, &id)
    }

    fn update_data(&self, matrix_id: &str, data: Grid) -> CollabResult<Matrix> {
        let conn = lock(&self.db)?;
        let current = load_matrix(&conn, matrix_id)?;
        current.dimensions.validate(&data)?;
        conn.execute(
            "UPDATE matrices SET data = ?1, modification_count = modification_count + 1, updated_at = ?2
             WHERE id = ?3",
            rusqlite::params![serde_json::to_string(&data)?, Utc::now().to_rfc3339(), matrix_id],
        )?;
        load_matrix(&conn, matrix_id)
    }

    fn soft_delete(&self, matrix_id: &str) -> CollabResult<()> {
        let conn = lock(&self.db)?;
        let changed = conn.execute(
            "UPDATE matrices SET is_active = 0, updated_at = ?1 WHERE id = ?2 AND is_active = 1",
            rusqlite::params![Utc::now().to_rfc3339(), matrix_id],
        )?;
        if changed == 0 {
            return Err(CollabError::NotFound("Matrix".to_string()));
        }
        Ok(())
    }

    fn upsert_collaborator(&self, matrix_id: &str, user_id: &str, role: Role) -> CollabResult<()> {
        let conn = lock(&self.db)?;
        let matrix = load_matrix(&conn, matrix_id)?;
        if matrix.is_owner(user_id) {
            return Err(CollabError::InvalidInput(
                "The owner cannot be added as a collaborator".to_string(),
            ));
        }
        conn.execute(
            "INSERT INTO matrix_collaborators (matrix_id, user_id, role, added_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(matrix_id, user_id) DO UPDATE SET role = excluded.role",
            rusqlite::params![matrix_id, user_id, role.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove_collaborator(&self, matrix_id: &str, user_id: &str) -> CollabResult<bool> {
        let conn = lock(&self.db)?;
        ensure_active(&conn, matrix_id)?;
        let removed = conn.execute(
            "DELETE FROM matrix_collaborators WHERE matrix_id = ?1 AND user_id = ?2",
            [matrix_id, user_id],
        )?;
        Ok(removed > 0)
    }

    fn append_operation(&self, matrix_id: &str, record: &OperationRecord) -> CollabResult<()> {
        let conn = lock(&self.db)?;
        ensure_active(&conn, matrix_id)?;
        conn.execute(
            "INSERT INTO matrix_operations (id, matrix_id, op_type, parameters, result, performed_by, performed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                record.id,
                matrix_id,
                record.op_type,
                serde_json::to_string(&record.parameters)?,
                serde_json::to_string(&record.result)?,
                record.performed_by,
                record.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn operations(&self, matrix_id: &str) -> CollabResult<Vec<OperationRecord>> {
        let conn = lock(&self.db)?;
        ensure_active(&conn, matrix_id)?;
        let mut stmt = conn.prepare(
            "SELECT id, op_type, parameters, result, performed_by, performed_at
             FROM matrix_operations WHERE matrix_id = ?1 ORDER BY seq ASC",
        )?;
        let rows: Vec<(String, String, String, String, String, String)> = stmt
            .query_map([matrix_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();

        rows.into_iter()
            .map(
                |(id, op_type, parameters, result, performed_by, performed_at)| -> CollabResult<OperationRecord> {
                Ok(OperationRecord {
                    id,
                    op_type,
                    parameters: serde_json::from_str(&parameters)?,
                    result: serde_json::from_str(&result)?,
                    performed_by,
                    timestamp: parse_time(&performed_at),
                })
            },
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, users::create_user};

    fn setup() -> (tempfile::TempDir, DbPool, SqliteMatrixStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = init_db(dir.path().to_str().unwrap()).expect("init db");
        let store = SqliteMatrixStore::new(db.clone());
        (dir, db, store)
    }

    fn two_by_two(owner: &str) -> NewMatrix {
        NewMatrix {
            name: "Sample".into(),
            description: String::new(),
            owner_id: owner.into(),
            dimensions: Dimensions { rows: 2, columns: 2 },
            data: vec![vec![4.0, 7.0], vec![2.0, 6.0]],
        }
    }

    #[test]
    fn create_and_load_round_trip() {
        let (_dir, db, store) = setup();
        let owner = create_user(&db, "alice", "Alice").unwrap();
        let created = store.create(two_by_two(&owner.id)).unwrap();
        let loaded = store.get(&created.id).unwrap();
        assert_eq!(loaded.data, vec![vec![4.0, 7.0], vec![2.0, 6.0]]);
        assert_eq!(loaded.owner_id, owner.id);
        assert!(loaded.collaborators.is_empty());
    }

    #[test]
    fn create_rejects_shape_mismatch() {
        let (_dir, db, store) = setup();
        let owner = create_user(&db, "alice", "Alice").unwrap();
        let mut bad = two_by_two(&owner.id);
        bad.data = vec![vec![1.0, 2.0]];
        assert_eq!(store.create(bad).unwrap_err().kind(), "invalid_input");
    }

    #[test]
    fn collaborator_upsert_keeps_one_entry() {
        let (_dir, db, store) = setup();
        let owner = create_user(&db, "alice", "Alice").unwrap();
        let bob = create_user(&db, "bob", "Bob").unwrap();
        let m = store.create(two_by_two(&owner.id)).unwrap();

        store.upsert_collaborator(&m.id, &bob.id, Role::Viewer).unwrap();
        store.upsert_collaborator(&m.id, &bob.id, Role::Admin).unwrap();
        let loaded = store.get(&m.id).unwrap();
        assert_eq!(loaded.collaborators.len(), 1);
        assert_eq!(loaded.collaborator_role(&bob.id), Some(Role::Admin));

        assert!(store.upsert_collaborator(&m.id, &owner.id, Role::Viewer).is_err());
        assert!(store.remove_collaborator(&m.id, &bob.id).unwrap());
        assert!(!store.remove_collaborator(&m.id, &bob.id).unwrap());
    }

    #[test]
    fn soft_deleted_matrix_is_not_found() {
        let (_dir, db, store) = setup();
        let owner = create_user(&db, "alice", "Alice").unwrap();
        let m = store.create(two_by_two(&owner.id)).unwrap();
        store.soft_delete(&m.id).unwrap();
        assert_eq!(store.get(&m.id).unwrap_err().kind(), "not_found");
        assert_eq!(store.soft_delete(&m.id).unwrap_err().kind(), "not_found");
    }

    #[test]
    fn operations_are_listed_in_insertion_order() {
        let (_dir, db, store) = setup();
        let owner = create_user(&db, "alice", "Alice").unwrap();
        let m = store.create(two_by_two(&owner.id)).unwrap();

        for op in ["determinant", "transpose"] {
            let record = OperationRecord {
                id: Uuid::new_v4().to_string(),
                op_type: op.to_string(),
                parameters: serde_json::json!({}),
                result: serde_json::json!(10.0),
                performed_by: owner.id.clone(),
                timestamp: Utc::now(),
            };
            store.append_operation(&m.id, &record).unwrap();
        }

        let ops = store.operations(&m.id).unwrap();
        let types: Vec<&str> = ops.iter().map(|o| o.op_type.as_str()).collect();
        assert_eq!(types, vec!["determinant", "transpose"]);
    }

    #[test]
    fn update_data_bumps_modification_count() {
        let (_dir, db, store) = setup();
        let owner = create_user(&db, "alice", "Alice").unwrap();
        let m = store.create(two_by_two(&owner.id)).unwrap();
        let updated = store
            .update_data(&m.id, vec![vec![1.0, 0.0], vec![0.0, 1.0]])
            .unwrap();
        assert_eq!(updated.modification_count, 1);
        assert!(store.update_data(&m.id, vec![vec![1.0]]).is_err());
    }
}
