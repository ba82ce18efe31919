//! SQLite schema definitions.

/// Current schema version for migrations.
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema for local SQLite database.
pub const SCHEMA: &str = r#"
-- Signed-in account (bearer token for the sync server)
CREATE TABLE IF NOT EXISTS account (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    token TEXT NOT NULL,
    user_id TEXT
);

-- Remote packages known locally
CREATE TABLE IF NOT EXISTS packages (
    uuid TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    questions_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

-- Learning state per item; owner_id is a package uuid for remote packages
CREATE TABLE IF NOT EXISTS item_progress (
    owner_id TEXT NOT NULL,
    item_id INTEGER NOT NULL,
    score INTEGER NOT NULL DEFAULT 0,
    interval_days REAL NOT NULL DEFAULT 1,
    next_review_at TEXT NOT NULL,
    streak INTEGER NOT NULL DEFAULT 0,
    correct_days INTEGER NOT NULL DEFAULT 0,
    last_correct_date TEXT,
    decay_applied_for TEXT,
    dirty INTEGER NOT NULL DEFAULT 0,
    revision INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (owner_id, item_id)
);

-- Study settings
CREATE TABLE IF NOT EXISTS settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    daily_reset_hour INTEGER NOT NULL DEFAULT 0,
    review_batch_size INTEGER NOT NULL DEFAULT 20,
    decay_policy TEXT NOT NULL DEFAULT 'compounding'
);

-- Last successful pull per package
CREATE TABLE IF NOT EXISTS sync_state (
    package_uuid TEXT PRIMARY KEY,
    last_sync_at TEXT
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_item_progress_dirty ON item_progress(owner_id, dirty);
CREATE INDEX IF NOT EXISTS idx_item_progress_due ON item_progress(next_review_at);
"#;

/// Initialize settings if not exists.
pub const INIT_SETTINGS: &str = r#"
INSERT OR IGNORE INTO settings (id) VALUES (1);
"#;
