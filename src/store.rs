use rusqlite::{Connection, OpenFlags, ffi, params};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub fn default_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("crossfade")
        .join("settings.sqlite3")
}

pub fn open(path: &Path) -> Result<Connection, rusqlite::Error> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|err| {
            rusqlite::Error::SqliteFailure(
                ffi::Error::new(ffi::SQLITE_CANTOPEN),
                Some(format!(
                    "failed to create parent directory {} for {}: {}",
                    parent.display(),
                    path.display(),
                    err
                )),
            )
        })?;
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
    )?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    migrate(&conn)?;
    Ok(conn)
}

fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS song_settings (
            track_id TEXT PRIMARY KEY,
            tempo REAL,
            speed REAL
        );
        PRAGMA user_version = 1;",
    )?;
    Ok(())
}

/// Per-track tempo/speed override. Both fields are `None` for unknown tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackOverride {
    pub tempo: Option<f64>,
    pub speed: Option<f64>,
}

pub fn get_track_override(
    conn: &Connection,
    track_id: &str,
) -> Result<TrackOverride, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT tempo, speed FROM song_settings WHERE track_id = ?1")?;
    let mut rows = stmt.query_map(params![track_id], |row| {
        Ok(TrackOverride {
            tempo: row.get(0)?,
            speed: row.get(1)?,
        })
    })?;
    match rows.next() {
        Some(Ok(entry)) => Ok(entry),
        Some(Err(e)) => Err(e),
        None => Ok(TrackOverride::default()),
    }
}

/// Replace-by-key. The last write for a track id wins.
pub fn set_track_override(
    conn: &Connection,
    track_id: &str,
    tempo: Option<f64>,
    speed: Option<f64>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO song_settings (track_id, tempo, speed)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(track_id)
         DO UPDATE SET tempo = ?2, speed = ?3",
        params![track_id, tempo, speed],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp_store() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite3");
        let conn = open(&path).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_open_creates_schema() {
        let (_dir, conn) = open_temp_store();
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(tables.contains(&"song_settings".to_string()));
    }

    #[test]
    fn test_open_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite3");

        let conn1 = open(&path).unwrap();
        set_track_override(&conn1, "abc", Some(120.0), None).unwrap();
        drop(conn1);

        let conn2 = open(&path).unwrap();
        let entry = get_track_override(&conn2, "abc").unwrap();
        assert_eq!(entry.tempo, Some(120.0));
    }

    #[test]
    fn test_open_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("settings.sqlite3");
        let conn = open(&path).unwrap();
        drop(conn);
        assert!(path.is_file());
    }

    #[test]
    fn test_open_reports_parent_directory_creation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_directory = dir.path().join("not-a-directory");
        std::fs::write(&not_a_directory, b"blocker").unwrap();
        let db_path = not_a_directory.join("test.sqlite3");

        let err = open(&db_path).unwrap_err();
        match err {
            rusqlite::Error::SqliteFailure(_, Some(message)) => {
                assert!(message.contains("failed to create parent directory"));
                assert!(message.contains("not-a-directory"));
            }
            other => panic!("expected sqlite failure with context, got {other:?}"),
        }
    }

    #[test]
    fn test_override_miss_returns_nulls() {
        let (_dir, conn) = open_temp_store();
        let entry = get_track_override(&conn, "unknown-track").unwrap();
        assert_eq!(entry.tempo, None);
        assert_eq!(entry.speed, None);
    }

    #[test]
    fn test_override_round_trip() {
        let (_dir, conn) = open_temp_store();
        set_track_override(&conn, "4uLU6hMCjMI75M1A2tKUQC", Some(128.0), Some(1.05)).unwrap();

        let entry = get_track_override(&conn, "4uLU6hMCjMI75M1A2tKUQC").unwrap();
        assert_eq!(
            entry,
            TrackOverride {
                tempo: Some(128.0),
                speed: Some(1.05),
            }
        );
    }

    #[test]
    fn test_override_upsert_keeps_latest_only() {
        let (_dir, conn) = open_temp_store();
        set_track_override(&conn, "abc", Some(100.0), Some(0.9)).unwrap();
        set_track_override(&conn, "abc", Some(140.0), None).unwrap();

        let entry = get_track_override(&conn, "abc").unwrap();
        assert_eq!(entry.tempo, Some(140.0));
        assert_eq!(entry.speed, None);

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM song_settings WHERE track_id = ?1",
                params!["abc"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_override_keys_are_independent() {
        let (_dir, conn) = open_temp_store();
        set_track_override(&conn, "a", Some(90.0), None).unwrap();
        set_track_override(&conn, "b", None, Some(1.1)).unwrap();

        assert_eq!(get_track_override(&conn, "a").unwrap().tempo, Some(90.0));
        assert_eq!(get_track_override(&conn, "b").unwrap().tempo, None);
        assert_eq!(get_track_override(&conn, "b").unwrap().speed, Some(1.1));
    }
}
