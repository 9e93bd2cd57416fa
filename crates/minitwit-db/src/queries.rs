use crate::Database;
use crate::models::{FeedRow, NewUser, UserRow};
use anyhow::Result;
use rusqlite::{Connection, ErrorCode, Row, Transaction, TransactionBehavior};

impl Database {
    // -- Users --

    /// Insert a user unless the username or email is already present.
    /// The existence checks and the insert share one immediate transaction.
    pub fn create_user(&self, username: &str, email: &str, pw_hash: &str) -> Result<NewUser> {
        self.with_conn(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

            let outcome = match taken_by(&tx, username, email)? {
                Some(taken) => taken,
                None => match tx.execute(
                    "INSERT INTO user (username, email, pw_hash) VALUES (?1, ?2, ?3)",
                    (username, email, pw_hash),
                ) {
                    Ok(_) => NewUser::Created(tx.last_insert_rowid()),
                    // Another process won the race between check and insert
                    Err(e) if is_constraint_violation(&e) => {
                        taken_by(&tx, username, email)?.unwrap_or(NewUser::UsernameTaken)
                    }
                    Err(e) => return Err(e.into()),
                },
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "SELECT user_id, username, email, pw_hash FROM user WHERE username = ?1",
                username,
            )
        })
    }

    pub fn get_user_by_id(&self, user_id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "SELECT user_id, username, email, pw_hash FROM user WHERE user_id = ?1",
                user_id,
            )
        })
    }

    // -- Followers --

    /// Returns `false` if the edge already existed.
    pub fn insert_follower(&self, who_id: i64, whom_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO follower (who_id, whom_id) VALUES (?1, ?2)",
                (who_id, whom_id),
            )?;
            Ok(inserted == 1)
        })
    }

    /// Returns `false` if there was no edge to delete.
    pub fn delete_follower(&self, who_id: i64, whom_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM follower WHERE who_id = ?1 AND whom_id = ?2",
                (who_id, whom_id),
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn is_following(&self, who_id: i64, whom_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM follower WHERE who_id = ?1 AND whom_id = ?2",
                    (who_id, whom_id),
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Usernames followed by `who_id`, in the store's natural order.
    pub fn get_followees(&self, who_id: i64, limit: u32) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.username
                 FROM follower f
                 INNER JOIN user u ON u.user_id = f.whom_id
                 WHERE f.who_id = ?1
                 LIMIT ?2",
            )?;

            let names = stmt
                .query_map((who_id, limit), |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;

            Ok(names)
        })
    }

    // -- Messages --

    /// Insert a visible message. `pub_date` never goes below the newest
    /// stored one, so insertion order and publish order agree. The lookup of
    /// that maximum is served by `idx_message_pub_date`.
    pub fn insert_message(&self, author_id: i64, text: &str, now: i64) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO message (author_id, text, pub_date, flagged)
                 VALUES (?1, ?2, MAX(?3, COALESCE((SELECT MAX(pub_date) FROM message), 0)), 0)",
                (author_id, text, now),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Moderation hook: hide or reveal a message.
    pub fn set_message_flagged(&self, message_id: i64, flagged: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE message SET flagged = ?2 WHERE message_id = ?1",
                (message_id, flagged as i64),
            )?;
            Ok(updated == 1)
        })
    }

    pub fn get_public_messages(&self, limit: u32) -> Result<Vec<FeedRow>> {
        self.with_conn(|conn| {
            query_feed(
                conn,
                "SELECT m.message_id, m.text, m.pub_date, u.username
                 FROM message m
                 INNER JOIN user u ON u.user_id = m.author_id
                 WHERE m.flagged = 0
                 ORDER BY m.pub_date DESC, m.message_id DESC
                 LIMIT ?1",
                rusqlite::params![limit],
            )
        })
    }

    pub fn get_messages_by_author(&self, author_id: i64, limit: u32) -> Result<Vec<FeedRow>> {
        self.with_conn(|conn| {
            query_feed(
                conn,
                "SELECT m.message_id, m.text, m.pub_date, u.username
                 FROM message m
                 INNER JOIN user u ON u.user_id = m.author_id
                 WHERE m.flagged = 0 AND m.author_id = ?1
                 ORDER BY m.pub_date DESC, m.message_id DESC
                 LIMIT ?2",
                rusqlite::params![author_id, limit],
            )
        })
    }

    /// Visible messages written by `user_id` or by anyone `user_id` follows.
    pub fn get_personal_feed(&self, user_id: i64, limit: u32) -> Result<Vec<FeedRow>> {
        self.with_conn(|conn| {
            query_feed(
                conn,
                "SELECT m.message_id, m.text, m.pub_date, u.username
                 FROM message m
                 INNER JOIN user u ON u.user_id = m.author_id
                 WHERE m.flagged = 0
                   AND (m.author_id = ?1
                        OR m.author_id IN (SELECT whom_id FROM follower WHERE who_id = ?1))
                 ORDER BY m.pub_date DESC, m.message_id DESC
                 LIMIT ?2",
                rusqlite::params![user_id, limit],
            )
        })
    }
}

fn taken_by(conn: &Connection, username: &str, email: &str) -> Result<Option<NewUser>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT username, email FROM user WHERE username = ?1 OR email = ?2 LIMIT 1",
            (username, email),
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(row.map(|(existing, _)| {
        if existing == username {
            NewUser::UsernameTaken
        } else {
            NewUser::EmailTaken
        }
    }))
}

fn query_user<P: rusqlite::ToSql>(conn: &Connection, sql: &str, key: P) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(sql)?;

    let row = stmt
        .query_row([key], |row| {
            Ok(UserRow {
                user_id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                pw_hash: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_feed(conn: &Connection, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<FeedRow>> {
    let mut stmt = conn.prepare(sql)?;

    let rows = stmt
        .query_map(params, feed_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn feed_row(row: &Row<'_>) -> rusqlite::Result<FeedRow> {
    Ok(FeedRow {
        message_id: row.get(0)?,
        text: row.get(1)?,
        pub_date: row.get(2)?,
        username: row.get(3)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
