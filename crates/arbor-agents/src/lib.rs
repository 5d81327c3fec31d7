//! # arbor-agents
//!
//! The relational agent registry: external entities attached to branches of
//! the organization tree, kept in SQLite next to the XML documents.
//!
//! The registry knows nothing about the tree — subtree rules for agent
//! relocation live in the core crate. What it guarantees is transactional
//! writes: adding an agent together with its tags, or deleting an agent and
//! its tags, is a single all-or-nothing transaction, so a failure mid-way
//! leaves no partial rows.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

/// One registered agent, as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRecord {
    pub id: String,
    pub branch: String,
    pub descr: String,
    pub location: String,
    pub extra: String,
    /// Tag rows in insertion order; empty when fetched without tags.
    pub tags: Vec<String>,
}

/// Registry failures. These indicate a broken database, not a bad request —
/// callers surface them as internal errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("agent registry database error: {0}")]
    Db(#[from] rusqlite::Error),
}

/// Handle over the agents database. Opened once at startup, closed on drop.
pub struct AgentRegistry {
    conn: Connection,
}

impl AgentRegistry {
    /// Open (creating if needed) the registry database at `path`.
    pub fn open(path: &Path) -> Result<Self, RegistryError> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "agent registry opened");
        Self::init(conn)
    }

    /// An in-memory registry, used by tests.
    pub fn open_in_memory() -> Result<Self, RegistryError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, RegistryError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS Agents (
                agent_id TEXT PRIMARY KEY,
                branch TEXT,
                descr TEXT,
                location TEXT,
                extra TEXT
            );
            CREATE TABLE IF NOT EXISTS Tags (
                tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id TEXT,
                tag TEXT,
                FOREIGN KEY (agent_id) REFERENCES Agents (agent_id)
            );",
        )?;
        Ok(Self { conn })
    }

    /// Every registered agent id.
    pub fn all_agent_ids(&self) -> Result<Vec<String>, RegistryError> {
        let mut stmt = self.conn.prepare("SELECT agent_id FROM Agents")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// The branch owning `agent_id`, or `None` if unregistered.
    pub fn branch_of(&self, agent_id: &str) -> Result<Option<String>, RegistryError> {
        let branch = self
            .conn
            .query_row(
                "SELECT branch FROM Agents WHERE agent_id = ?1",
                params![agent_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(branch)
    }

    /// Full record for `agent_id`, optionally with its tag rows.
    pub fn get(&self, agent_id: &str, with_tags: bool) -> Result<Option<AgentRecord>, RegistryError> {
        let record = self
            .conn
            .query_row(
                "SELECT agent_id, branch, descr, location, extra FROM Agents WHERE agent_id = ?1",
                params![agent_id],
                |row| {
                    Ok(AgentRecord {
                        id: row.get(0)?,
                        branch: row.get(1)?,
                        descr: row.get(2)?,
                        location: row.get(3)?,
                        extra: row.get(4)?,
                        tags: Vec::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut record) = record else {
            return Ok(None);
        };

        if with_tags {
            let mut stmt = self
                .conn
                .prepare("SELECT tag FROM Tags WHERE agent_id = ?1 ORDER BY tag_id")?;
            record.tags = stmt
                .query_map(params![agent_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
        }
        Ok(Some(record))
    }

    /// Insert an agent and all of its tags as one transaction.
    pub fn add(&mut self, record: &AgentRecord) -> Result<(), RegistryError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO Agents (agent_id, branch, descr, location, extra) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![record.id, record.branch, record.descr, record.location, record.extra],
        )?;
        for tag in &record.tags {
            tx.execute(
                "INSERT INTO Tags (agent_id, tag) VALUES (?1, ?2)",
                params![record.id, tag],
            )?;
        }
        tx.commit()?;
        debug!(agent = %record.id, branch = %record.branch, tags = record.tags.len(), "agent added");
        Ok(())
    }

    /// Delete an agent and its tags as one transaction; true if it existed.
    pub fn delete(&mut self, agent_id: &str) -> Result<bool, RegistryError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM Tags WHERE agent_id = ?1", params![agent_id])?;
        let deleted = tx.execute("DELETE FROM Agents WHERE agent_id = ?1", params![agent_id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// `(agent_id, branch)` pairs for every agent owned by one of `branches`.
    pub fn by_branches(&self, branches: &[String]) -> Result<Vec<(String, String)>, RegistryError> {
        if branches.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; branches.len()].join(",");
        let sql = format!(
            "SELECT agent_id, branch FROM Agents WHERE branch IN ({placeholders})"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(branches.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, branch: &str, tags: &[&str]) -> AgentRecord {
        AgentRecord {
            id: id.to_string(),
            branch: branch.to_string(),
            descr: format!("agent {id}"),
            location: "hall 4".to_string(),
            extra: "<note>x</note>".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn add_and_get_round_trip_with_tags() {
        let mut reg = AgentRegistry::open_in_memory().unwrap();
        reg.add(&record("a1", "b1", &["scanner", "mobile"])).unwrap();

        let bare = reg.get("a1", false).unwrap().unwrap();
        assert_eq!(bare.branch, "b1");
        assert!(bare.tags.is_empty(), "tags only fetched on request");

        let full = reg.get("a1", true).unwrap().unwrap();
        assert_eq!(full.tags, vec!["scanner", "mobile"]);

        assert_eq!(reg.get("missing", true).unwrap(), None);
    }

    #[test]
    fn duplicate_insert_is_rejected_and_leaves_no_tags() {
        let mut reg = AgentRegistry::open_in_memory().unwrap();
        reg.add(&record("a1", "b1", &["x"])).unwrap();

        // Second insert violates the primary key; the whole transaction —
        // including its tag rows — must be rolled back.
        let err = reg.add(&record("a1", "b2", &["y", "z"]));
        assert!(err.is_err());

        let full = reg.get("a1", true).unwrap().unwrap();
        assert_eq!(full.branch, "b1");
        assert_eq!(full.tags, vec!["x"]);
    }

    #[test]
    fn delete_removes_agent_and_tags() {
        let mut reg = AgentRegistry::open_in_memory().unwrap();
        reg.add(&record("a1", "b1", &["x"])).unwrap();

        assert!(reg.delete("a1").unwrap());
        assert_eq!(reg.get("a1", true).unwrap(), None);
        assert!(!reg.delete("a1").unwrap(), "second delete reports absence");
    }

    #[test]
    fn branch_queries() {
        let mut reg = AgentRegistry::open_in_memory().unwrap();
        reg.add(&record("a1", "b1", &[])).unwrap();
        reg.add(&record("a2", "b2", &[])).unwrap();
        reg.add(&record("a3", "b2", &[])).unwrap();

        assert_eq!(reg.branch_of("a2").unwrap().as_deref(), Some("b2"));
        assert_eq!(reg.branch_of("nope").unwrap(), None);

        let mut ids = reg.all_agent_ids().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a1", "a2", "a3"]);

        let mut pairs = reg
            .by_branches(&["b2".to_string(), "b9".to_string()])
            .unwrap();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("a2".to_string(), "b2".to_string()),
                ("a3".to_string(), "b2".to_string())
            ]
        );
        assert!(reg.by_branches(&[]).unwrap().is_empty());
    }

    #[test]
    fn registry_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.db");
        {
            let mut reg = AgentRegistry::open(&path).unwrap();
            reg.add(&record("a1", "b1", &["x"])).unwrap();
        }
        let reg = AgentRegistry::open(&path).unwrap();
        assert_eq!(reg.get("a1", true).unwrap().unwrap().tags, vec!["x"]);
    }
}
