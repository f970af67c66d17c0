//! SQLite schema definition.

/// Complete database schema for the clinic queue.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Users (identity: patients and doctors)
-- ============================================================================

CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    role TEXT NOT NULL CHECK (role IN ('patient', 'doctor')),
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);

-- ============================================================================
-- Tokens (owned exclusively by the token store)
-- ============================================================================

CREATE TABLE IF NOT EXISTS tokens (
    token_id INTEGER PRIMARY KEY AUTOINCREMENT,
    token_number TEXT NOT NULL,
    patient_id TEXT NOT NULL REFERENCES users(user_id),
    doctor_id TEXT NOT NULL REFERENCES users(user_id),
    status TEXT NOT NULL DEFAULT 'waiting'
        CHECK (status IN ('waiting', 'serving', 'done', 'skipped')),
    issued_at TEXT NOT NULL,                     -- fixed-width RFC 3339, UTC
    called_at TEXT,                              -- set on waiting -> serving
    served_at TEXT,                              -- set on done / skipped
    CHECK ((status IN ('done', 'skipped')) = (served_at IS NOT NULL))
);

-- Queue scans: waiting tokens of one doctor, oldest first
CREATE INDEX IF NOT EXISTS idx_tokens_queue ON tokens(doctor_id, status, issued_at, token_id);
CREATE INDEX IF NOT EXISTS idx_tokens_patient ON tokens(patient_id);

-- At most one serving token per doctor
CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_one_serving ON tokens(doctor_id)
WHERE status = 'serving';

-- Status only moves forward through the state machine
CREATE TRIGGER IF NOT EXISTS tokens_check_transition BEFORE UPDATE OF status ON tokens
WHEN old.status <> new.status AND NOT (
    (old.status = 'waiting' AND new.status IN ('serving', 'skipped'))
    OR (old.status = 'serving' AND new.status IN ('done', 'skipped'))
)
BEGIN
    SELECT RAISE(ABORT, 'Illegal token status transition');
END;

-- ============================================================================
-- Daily Statistics (per doctor per day, created lazily)
-- ============================================================================

CREATE TABLE IF NOT EXISTS daily_stats (
    doctor_id TEXT NOT NULL REFERENCES users(user_id),
    stat_date TEXT NOT NULL,                     -- YYYY-MM-DD (UTC)
    patients_served INTEGER NOT NULL DEFAULT 0,
    patients_skipped INTEGER NOT NULL DEFAULT 0,
    avg_wait_secs REAL NOT NULL DEFAULT 0.0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (doctor_id, stat_date)
);
"#;
