use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, followers, messages)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE IF NOT EXISTS user (
                user_id     INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL UNIQUE,
                email       TEXT NOT NULL UNIQUE,
                pw_hash     TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS follower (
                who_id      INTEGER NOT NULL REFERENCES user(user_id),
                whom_id     INTEGER NOT NULL REFERENCES user(user_id),
                PRIMARY KEY (who_id, whom_id),
                CHECK (who_id <> whom_id)
            );

            CREATE TABLE IF NOT EXISTS message (
                message_id  INTEGER PRIMARY KEY AUTOINCREMENT,
                author_id   INTEGER NOT NULL REFERENCES user(user_id),
                text        TEXT NOT NULL,
                pub_date    INTEGER NOT NULL,
                flagged     INTEGER NOT NULL DEFAULT 0 CHECK (flagged IN (0, 1))
            );

            CREATE INDEX IF NOT EXISTS idx_message_visible
                ON message(flagged, pub_date);

            CREATE INDEX IF NOT EXISTS idx_message_author
                ON message(author_id, pub_date);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (message publish-date index)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE INDEX IF NOT EXISTS idx_message_pub_date
                ON message(pub_date);

            INSERT INTO schema_version (version) VALUES (2);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rerunning_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        let latest: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 2);
        assert_eq!(latest, 2);
    }
}
