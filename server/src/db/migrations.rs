use rusqlite_migration::{Migrations, M};

/// Schema migrations, tracked through SQLite's user_version pragma.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: users, matrices, collaborators, operation history

CREATE TABLE users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    full_name TEXT NOT NULL DEFAULT '',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE matrices (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    owner_id TEXT NOT NULL,
    rows INTEGER NOT NULL,
    columns INTEGER NOT NULL,
    data TEXT NOT NULL,
    modification_count INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (owner_id) REFERENCES users(id)
);

CREATE INDEX idx_matrices_owner ON matrices(owner_id);

CREATE TABLE matrix_collaborators (
    matrix_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('viewer', 'editor', 'admin')),
    added_at TEXT NOT NULL,
    PRIMARY KEY (matrix_id, user_id),
    FOREIGN KEY (matrix_id) REFERENCES matrices(id),
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX idx_collaborators_user ON matrix_collaborators(user_id);

-- Append-only: rows are inserted, never updated or deleted.
CREATE TABLE matrix_operations (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    matrix_id TEXT NOT NULL,
    op_type TEXT NOT NULL,
    parameters TEXT NOT NULL,
    result TEXT NOT NULL,
    performed_by TEXT NOT NULL,
    performed_at TEXT NOT NULL,
    FOREIGN KEY (matrix_id) REFERENCES matrices(id)
);

CREATE INDEX idx_operations_matrix ON matrix_operations(matrix_id);
",
        ),
        M::up(
            "-- Migration 2: notifications

CREATE TABLE notifications (
    id TEXT PRIMARY KEY,
    recipient_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    matrix_id TEXT,
    is_read INTEGER NOT NULL DEFAULT 0,
    read_at TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (recipient_id) REFERENCES users(id)
);

CREATE INDEX idx_notifications_recipient ON notifications(recipient_id, is_read);
",
        ),
    ])
}
