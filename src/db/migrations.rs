use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};

pub const SCHEMA_VERSION: &str = "1";

/// Creates the bundle relations in a fresh database. Runs inside the caller's
/// open transaction.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE "schema_version" ("version" TEXT NOT NULL);
        CREATE TABLE "meta" ("num_result_chunks" INTEGER NOT NULL);
        CREATE TABLE "documents" (
            "path" TEXT PRIMARY KEY NOT NULL,
            "data" BLOB NOT NULL
        );
        CREATE TABLE "result_chunks" (
            "id" INTEGER PRIMARY KEY NOT NULL,
            "data" BLOB NOT NULL
        );
        CREATE TABLE "definitions" (
            "scheme" TEXT NOT NULL,
            "identifier" TEXT NOT NULL,
            "data" BLOB NOT NULL,
            PRIMARY KEY ("scheme", "identifier")
        );
        CREATE TABLE "references" (
            "scheme" TEXT NOT NULL,
            "identifier" TEXT NOT NULL,
            "data" BLOB NOT NULL,
            PRIMARY KEY ("scheme", "identifier")
        );
        "#,
    )
    .context("create bundle tables")?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?)",
        params![SCHEMA_VERSION],
    )?;
    Ok(())
}

/// Verifies that `conn` holds a bundle this crate can read.
pub fn check_schema(conn: &Connection) -> Result<()> {
    for table in [
        "schema_version",
        "meta",
        "documents",
        "result_chunks",
        "definitions",
        "references",
    ] {
        if !has_table(conn, table)? {
            bail!("not a bundle: missing table {table}");
        }
    }

    let version: Option<String> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()
        .context("read schema version")?;
    match version {
        Some(version) if version == SCHEMA_VERSION => Ok(()),
        Some(version) => bail!("unsupported bundle schema version {version}"),
        None => bail!("bundle has no schema version"),
    }
}

fn has_table(conn: &Connection, table: &str) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}
