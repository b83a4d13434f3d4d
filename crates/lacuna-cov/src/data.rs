use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use crate::CoverageError;

const SCHEMA_VERSION: i64 = 7;

pub struct CoverageData {
    conn: Connection,
}

impl CoverageData {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoverageError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let version: i64 = conn
            .query_row("SELECT version FROM coverage_schema", [], |row| row.get(0))
            .map_err(|err| CoverageError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: match err {
                    rusqlite::Error::SqliteFailure(failure, _)
                        if failure.code == rusqlite::ErrorCode::NotADatabase =>
                    {
                        "not a SQLite database, data written by coverage 4.x or older".to_owned()
                    }
                    _ => "missing coverage_schema table".to_owned(),
                },
            })?;
        if version != SCHEMA_VERSION {
            return Err(CoverageError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: format!("schema version {version}, expected {SCHEMA_VERSION}"),
            });
        }

        Ok(Self { conn })
    }

    pub fn executed_rows(&self, source_path: &Path) -> Result<BTreeSet<usize>, CoverageError> {
        let Some(file_id) = self.file_id(source_path)? else {
            return Err(CoverageError::NoData(source_path.to_path_buf()));
        };

        let mut lines: BTreeSet<i64> = BTreeSet::new();

        let mut bits = self
            .conn
            .prepare("SELECT numbits FROM line_bits WHERE file_id = ?1")?;
        let blobs = bits.query_map(params![file_id], |row| row.get::<_, Vec<u8>>(0))?;
        for blob in blobs {
            collect_numbits(&blob?, &mut lines);
        }

        let mut arcs = self
            .conn
            .prepare("SELECT fromno, tono FROM arc WHERE file_id = ?1")?;
        let pairs = arcs.query_map(params![file_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for pair in pairs {
            let (fromno, tono) = pair?;
            lines.insert(fromno);
            lines.insert(tono);
        }

        Ok(lines
            .into_iter()
            .filter(|line| *line > 0)
            .map(|line| (line - 1) as usize)
            .collect())
    }

    fn file_id(&self, source_path: &Path) -> Result<Option<i64>, CoverageError> {
        let mut by_path = self.conn.prepare("SELECT id FROM file WHERE path = ?1")?;

        let wanted = source_path.to_string_lossy().into_owned();
        if let Some(id) = by_path
            .query_row(params![wanted], |row| row.get(0))
            .optional()?
        {
            return Ok(Some(id));
        }

        if let Ok(canonical) = source_path.canonicalize() {
            let canonical = canonical.to_string_lossy().into_owned();
            if let Some(id) = by_path
                .query_row(params![canonical], |row| row.get(0))
                .optional()?
            {
                return Ok(Some(id));
            }
        }

        let mut all = self.conn.prepare("SELECT id, path FROM file ORDER BY path")?;
        let rows = all.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (id, stored) = row?;
            if suffix_match(Path::new(&stored), source_path) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}

fn collect_numbits(blob: &[u8], lines: &mut BTreeSet<i64>) {
    for (byte_index, byte) in blob.iter().enumerate() {
        for bit in 0..8 {
            if byte & (1 << bit) != 0 {
                lines.insert((byte_index * 8 + bit) as i64);
            }
        }
    }
}

fn suffix_match(stored: &Path, wanted: &Path) -> bool {
    let mut stored_parts = stored.components().rev();
    let mut wanted_parts = wanted.components().rev();
    match (stored_parts.next(), wanted_parts.next()) {
        (Some(a), Some(b)) if a == b => {}
        _ => return false,
    }
    loop {
        match (stored_parts.next(), wanted_parts.next()) {
            (Some(a), Some(b)) => {
                if a != b {
                    return false;
                }
            }
            _ => return true,
        }
    }
}
