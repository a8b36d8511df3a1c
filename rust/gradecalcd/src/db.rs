use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "gradecalc.sqlite3";

/// String-keyed blob slot, the only persistence the gradebook needs.
pub trait BlobStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(DB_FILE))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    Ok(conn)
}

impl BlobStore for Connection {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value = self
            .query_row("SELECT value FROM kv_store WHERE key = ?", [key], |r| {
                r.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.execute(
            "INSERT INTO kv_store(key, value, updated_at) VALUES(?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            (key, value, now),
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.execute("DELETE FROM kv_store WHERE key = ?", [key])?;
        Ok(())
    }
}

#[cfg(test)]
pub mod memory {
    use super::BlobStore;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct MemoryStore {
        slots: RefCell<HashMap<String, String>>,
    }

    impl BlobStore for MemoryStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            Ok(self.slots.borrow().get(key).cloned())
        }

        fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            self.slots
                .borrow_mut()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn remove(&self, key: &str) -> anyhow::Result<()> {
            self.slots.borrow_mut().remove(key);
            Ok(())
        }
    }
}
