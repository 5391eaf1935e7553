use anyhow::Context;
use rusqlite::{Connection, params};

use crate::replica::{CategoryRow, ReplicaSource};

const REPLICA_SCHEMA_SQL: &str = r#"
PRAGMA case_sensitive_like = ON;
CREATE TABLE page (
    page_id INTEGER PRIMARY KEY,
    page_namespace INTEGER NOT NULL
);
CREATE TABLE categorylinks (
    cl_from INTEGER NOT NULL,
    cl_to TEXT NOT NULL,
    PRIMARY KEY (cl_from, cl_to)
);
"#;

/// In-memory stand-in for the `page` and `categorylinks` replica tables.
pub(crate) struct SqliteReplica {
    connection: Connection,
    pub(crate) queries: usize,
}

impl SqliteReplica {
    pub(crate) fn new() -> Self {
        let connection = Connection::open_in_memory().expect("open in-memory sqlite");
        connection
            .execute_batch(REPLICA_SCHEMA_SQL)
            .expect("create replica schema");
        Self {
            connection,
            queries: 0,
        }
    }

    pub(crate) fn add_page(&mut self, page_id: i64, namespace: i32) {
        self.connection
            .execute(
                "INSERT INTO page (page_id, page_namespace) VALUES (?1, ?2)",
                params![page_id, namespace],
            )
            .expect("insert page");
    }

    pub(crate) fn add_membership(&mut self, page_id: i64, category: &str) {
        self.connection
            .execute(
                "INSERT INTO categorylinks (cl_from, cl_to) VALUES (?1, ?2)",
                params![page_id, category],
            )
            .expect("insert categorylink");
    }
}

impl ReplicaSource for SqliteReplica {
    fn category_rows(&mut self, sql: &str) -> anyhow::Result<Vec<CategoryRow>> {
        self.queries += 1;
        let mut statement = self
            .connection
            .prepare(sql)
            .context("failed to prepare replica query")?;
        let rows = statement
            .query_map([], |row| {
                let members: i64 = row.get(1)?;
                Ok(CategoryRow {
                    name: row.get(0)?,
                    members: members.unsigned_abs(),
                })
            })
            .context("failed to run replica query")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read replica rows")?;
        Ok(rows)
    }
}
