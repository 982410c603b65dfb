pub const SCHEMA: &str = r#"
-- Media items owned by a user
CREATE TABLE IF NOT EXISTS media (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    kind TEXT NOT NULL,               -- 'image', 'video', 'audio'
    path TEXT NOT NULL,
    uploaded_at TEXT NOT NULL,        -- RFC 3339, UTC
    is_favorite INTEGER NOT NULL DEFAULT 0,
    analyzed INTEGER NOT NULL DEFAULT 0,
    UNIQUE (owner, path)
);

CREATE INDEX IF NOT EXISTS idx_media_owner_uploaded ON media(owner, uploaded_at);

-- Analysis results; replaced wholesale on re-analysis
CREATE TABLE IF NOT EXISTS media_analysis (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    media_id INTEGER NOT NULL,
    objects TEXT NOT NULL,            -- JSON array
    landmarks TEXT NOT NULL,          -- JSON array
    colors TEXT NOT NULL,             -- JSON array
    emotions TEXT NOT NULL,           -- JSON array
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    confidence REAL NOT NULL,
    error TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (media_id) REFERENCES media(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_media_analysis_media ON media_analysis(media_id);

-- Tags, at most one per name and media
CREATE TABLE IF NOT EXISTS media_tags (
    media_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    source TEXT NOT NULL,             -- 'manual', 'ai', 'system'
    confidence REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL,
    PRIMARY KEY (media_id, name),
    FOREIGN KEY (media_id) REFERENCES media(id) ON DELETE CASCADE
);

-- Albums; auto albums are owned by the rule engine
CREATE TABLE IF NOT EXISTS smart_albums (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    kind TEXT NOT NULL,               -- 'auto', 'manual'
    rule_key TEXT,
    rule_snapshot TEXT,               -- JSON copy of the rule at creation
    cover_media_id INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (cover_media_id) REFERENCES media(id) ON DELETE SET NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_smart_albums_rule
    ON smart_albums(owner, rule_key) WHERE kind = 'auto';

CREATE TABLE IF NOT EXISTS smart_album_media (
    album_id INTEGER NOT NULL,
    media_id INTEGER NOT NULL,
    added_at TEXT NOT NULL,
    PRIMARY KEY (album_id, media_id),
    FOREIGN KEY (album_id) REFERENCES smart_albums(id) ON DELETE CASCADE,
    FOREIGN KEY (media_id) REFERENCES media(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_smart_album_media_media ON smart_album_media(media_id);
"#;

/// Schema changes applied after `SCHEMA`. Each one may fail harmlessly when
/// it has already been applied.
pub const MIGRATIONS: &[&str] = &[
    // Classifier backend that produced an analysis
    "ALTER TABLE media_analysis ADD COLUMN backend TEXT NOT NULL DEFAULT 'heuristic'",
    // Album icon shown by clients
    "ALTER TABLE smart_albums ADD COLUMN icon TEXT NOT NULL DEFAULT ''",
];
