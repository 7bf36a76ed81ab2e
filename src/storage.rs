pub mod entities;

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info, instrument};

use crate::mention::{KeyedMention, Mention, MentionState, Metadata};

const MENTION_COLUMNS: &str = "key, source, target, state, created, \
    title, author, author_url, published, thumbnail";

/// Timestamps are stored as fixed-width UTC text, so they sort chronologically as strings.
static STORED_TIME_FORMAT: &[BorrowedFormatItem<'_>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
);

fn stored_time(time: OffsetDateTime) -> Result<String> {
    time.to_offset(UtcOffset::UTC)
        .format(STORED_TIME_FORMAT)
        .with_context(|| anyhow!("could not format the timestamp {time}"))
}

/// Which of a target's mentions to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionFilter {
    All,
    Good,
}

pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        let pool = SqlitePoolOptions::new()
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .journal_mode(SqliteJournalMode::Wal)
                    .create_if_missing(true),
            )
            .await
            .with_context(|| anyhow!("could not open a SQLite database `{}`", db_path.display()))?;
        info!("Using an SQLite database `{}`", db_path.display());

        Self::migrate(pool).await
    }

    /// A private database that lives as long as the returned value.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        use std::str::FromStr;

        // every connection to `:memory:` opens a separate database, so keep exactly one around.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await
            .context("could not open an in-memory SQLite database")?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!()
            .run(&pool)
            .await
            .with_context(|| anyhow!("could not prepare a database schema"))?;

        Ok(Self { pool })
    }

    pub async fn begin(&self) -> Result<Tx> {
        self.pool
            .begin()
            .await
            .context("could not begin a new DB transaction")
            .map(Tx)
    }
}

pub struct Tx(Transaction<'static, Sqlite>);

impl Tx {
    pub async fn commit(self) -> Result<()> {
        self.0
            .commit()
            .await
            .context("could not commit a DB transaction")
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn get_sent(&mut self, source: &str) -> Result<Option<OffsetDateTime>> {
        sqlx::query_scalar(
            "SELECT sent
            FROM sent
            WHERE source = ?1",
        )
        .bind(source)
        .fetch_optional(self.0.as_mut())
        .await
        .context("could not retrieve the last dispatch time")
    }

    /// Records a dispatch pass over `source`, never moving its timestamp backwards.
    ///
    /// Returns the timestamp stored afterwards.
    #[instrument(level = "TRACE", skip(self))]
    pub async fn record_sent(
        &mut self,
        source: &str,
        updated: OffsetDateTime,
    ) -> Result<OffsetDateTime> {
        let updated = updated.to_offset(UtcOffset::UTC);

        if let Some(existing) = self.get_sent(source).await? {
            if existing >= updated {
                debug!(%existing, "Keeping the newer dispatch time");

                return Ok(existing);
            }
        }

        sqlx::query(
            "INSERT
            INTO sent (source, sent)
            VALUES (?1, ?2)
            ON CONFLICT (source) DO UPDATE SET sent = excluded.sent",
        )
        .bind(source)
        .bind(stored_time(updated)?)
        .execute(self.0.as_mut())
        .await
        .context("could not record the dispatch time")?;

        Ok(updated)
    }

    /// Stores a freshly submitted mention, replacing any earlier submission of the same pair.
    #[instrument(level = "TRACE", skip_all, fields(source = %mention.source, target = %mention.target))]
    pub async fn upsert_mention(&mut self, mention: &Mention) -> Result<String> {
        let key = mention.key();
        let Metadata {
            title,
            author,
            author_url,
            published,
            thumbnail,
        } = &mention.metadata;

        sqlx::query(
            "INSERT
            INTO mentions (
              key,
              source,
              target,
              state,
              created,
              title,
              author,
              author_url,
              published,
              thumbnail
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (key) DO UPDATE SET
              state = excluded.state,
              created = excluded.created,
              title = excluded.title,
              author = excluded.author,
              author_url = excluded.author_url,
              published = excluded.published,
              thumbnail = excluded.thumbnail",
        )
        .bind(&key)
        .bind(&mention.source)
        .bind(&mention.target)
        .bind(mention.state)
        .bind(stored_time(mention.created)?)
        .bind(title)
        .bind(author)
        .bind(author_url)
        .bind(published.map(stored_time).transpose()?)
        .bind(thumbnail)
        .execute(self.0.as_mut())
        .await
        .context("could not store the mention")?;

        Ok(key)
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn get_mention(&mut self, key: &str) -> Result<Option<KeyedMention>> {
        let row: Option<entities::Mention> = sqlx::query_as(&format!(
            "SELECT {MENTION_COLUMNS}
            FROM mentions
            WHERE key = ?1"
        ))
        .bind(key)
        .fetch_optional(self.0.as_mut())
        .await
        .context("could not retrieve the mention")?;

        Ok(row.map(Into::into))
    }

    /// Stores the outcome of verifying a mention. Metadata is only replaced if provided.
    ///
    /// Returns `false` if there is no such mention.
    #[instrument(level = "TRACE", skip(self, metadata))]
    pub async fn apply_verdict(
        &mut self,
        key: &str,
        state: MentionState,
        metadata: Option<&Metadata>,
    ) -> Result<bool> {
        let result = match metadata {
            Some(metadata) => {
                let published = metadata.published.map(stored_time).transpose()?;

                sqlx::query(
                    "UPDATE mentions
                    SET
                      state = ?2,
                      title = ?3,
                      author = ?4,
                      author_url = ?5,
                      published = ?6,
                      thumbnail = ?7
                    WHERE key = ?1",
                )
                .bind(key)
                .bind(state)
                .bind(&metadata.title)
                .bind(&metadata.author)
                .bind(&metadata.author_url)
                .bind(published)
                .bind(&metadata.thumbnail)
                .execute(self.0.as_mut())
                .await
            }

            None => {
                sqlx::query(
                    "UPDATE mentions
                    SET state = ?2
                    WHERE key = ?1",
                )
                .bind(key)
                .bind(state)
                .execute(self.0.as_mut())
                .await
            }
        }
        .context("could not store the verification result")?;

        Ok(result.rows_affected() > 0)
    }

    /// Reads the mention and overwrites its state. Returns `false` if there is no such mention.
    #[instrument(level = "TRACE", skip(self))]
    pub async fn update_state(&mut self, key: &str, state: MentionState) -> Result<bool> {
        let Some(current) = self.get_mention(key).await? else {
            return Ok(false);
        };

        debug!(from = %current.mention.state, to = %state, "Changing the mention state");

        sqlx::query(
            "UPDATE mentions
            SET state = ?2
            WHERE key = ?1",
        )
        .bind(key)
        .bind(state)
        .execute(self.0.as_mut())
        .await
        .context("could not update the mention state")?;

        Ok(true)
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn get_mentions(
        &mut self,
        target: &str,
        filter: MentionFilter,
    ) -> Result<Vec<Mention>> {
        let rows: Vec<entities::Mention> = match filter {
            MentionFilter::All => {
                sqlx::query_as(&format!(
                    "SELECT {MENTION_COLUMNS}
                    FROM mentions
                    WHERE target = ?1
                    ORDER BY created ASC"
                ))
                .bind(target)
                .fetch_all(self.0.as_mut())
                .await
            }

            MentionFilter::Good => {
                sqlx::query_as(&format!(
                    "SELECT {MENTION_COLUMNS}
                    FROM mentions
                    WHERE target = ?1 AND state = ?2
                    ORDER BY created ASC"
                ))
                .bind(target)
                .bind(MentionState::Good)
                .fetch_all(self.0.as_mut())
                .await
            }
        }
        .context("could not retrieve the mentions of a target")?;

        Ok(rows
            .into_iter()
            .map(|row| KeyedMention::from(row).mention)
            .collect())
    }

    /// Untriaged mentions, oldest first.
    #[instrument(level = "TRACE", skip(self))]
    pub async fn get_queued(&mut self) -> Result<Vec<KeyedMention>> {
        let rows: Vec<entities::Mention> = sqlx::query_as(&format!(
            "SELECT {MENTION_COLUMNS}
            FROM mentions
            WHERE state = ?1
            ORDER BY created ASC"
        ))
        .bind(MentionState::Untriaged)
        .fetch_all(self.0.as_mut())
        .await
        .context("could not retrieve queued mentions")?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// A page of all mentions, newest first.
    #[instrument(level = "TRACE", skip(self))]
    pub async fn get_triage(&mut self, limit: u32, offset: u32) -> Result<Vec<KeyedMention>> {
        let rows: Vec<entities::Mention> = sqlx::query_as(&format!(
            "SELECT {MENTION_COLUMNS}
            FROM mentions
            ORDER BY created DESC, key ASC
            LIMIT ?1 OFFSET ?2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.0.as_mut())
        .await
        .context("could not retrieve the triage page")?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(level = "TRACE", skip(self, png), fields(size = png.len()))]
    pub async fn put_thumbnail(&mut self, hash: &str, png: &[u8]) -> Result<()> {
        sqlx::query(
            "INSERT
            INTO thumbnails (hash, png)
            VALUES (?1, ?2)
            ON CONFLICT (hash) DO UPDATE SET png = excluded.png",
        )
        .bind(hash)
        .bind(png)
        .execute(self.0.as_mut())
        .await
        .context("could not store the thumbnail")?;

        Ok(())
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn get_thumbnail(&mut self, hash: &str) -> Result<Option<Vec<u8>>> {
        sqlx::query_scalar(
            "SELECT png
            FROM thumbnails
            WHERE hash = ?1",
        )
        .bind(hash)
        .fetch_optional(self.0.as_mut())
        .await
        .context("could not retrieve the thumbnail")
    }

    #[cfg(test)]
    pub async fn count_thumbnails(&mut self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM thumbnails")
            .fetch_one(self.0.as_mut())
            .await
            .context("could not count thumbnails")
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn mention(source: &str, target: &str, created: OffsetDateTime) -> Mention {
        Mention::new(source.into(), target.into(), created)
    }

    #[tokio::test]
    async fn sent_times_never_go_backwards() {
        let storage = Storage::in_memory().await.unwrap();
        let mut tx = storage.begin().await.unwrap();

        assert_eq!(tx.get_sent("https://me.example/a").await.unwrap(), None);

        let first = datetime!(2016-08-16 22:42:54 -4);
        assert_eq!(
            tx.record_sent("https://me.example/a", first).await.unwrap(),
            first
        );
        assert_eq!(
            tx.get_sent("https://me.example/a").await.unwrap(),
            Some(first)
        );

        let older = datetime!(2016-08-01 00:00:00 UTC);
        assert_eq!(
            tx.record_sent("https://me.example/a", older).await.unwrap(),
            first
        );

        let newer = datetime!(2016-09-01 00:00:00 UTC);
        tx.record_sent("https://me.example/a", newer).await.unwrap();
        assert_eq!(
            tx.get_sent("https://me.example/a").await.unwrap(),
            Some(newer)
        );
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn resubmission_upserts() {
        let storage = Storage::in_memory().await.unwrap();
        let mut tx = storage.begin().await.unwrap();

        let m = mention(
            "https://a.example/",
            "https://bitworking.org/bar",
            datetime!(2024-01-01 0:00 UTC),
        );
        let key = tx.upsert_mention(&m).await.unwrap();
        assert_eq!(key, m.key());

        tx.apply_verdict(&key, MentionState::Spam, None).await.unwrap();

        let again = mention(
            "https://a.example/",
            "https://bitworking.org/bar",
            datetime!(2024-01-02 0:00 UTC),
        );
        assert_eq!(tx.upsert_mention(&again).await.unwrap(), key);

        assert_eq!(tx.get_triage(10, 0).await.unwrap().len(), 1);
        let stored = tx.get_mention(&key).await.unwrap().unwrap();
        assert_eq!(stored.mention, again);
    }

    #[tokio::test]
    async fn sub_second_creation_times_sort_chronologically() {
        let storage = Storage::in_memory().await.unwrap();
        let mut tx = storage.begin().await.unwrap();
        let target = "https://bitworking.org/bar";

        for (source, created) in [
            ("https://c.example/", datetime!(2024-01-01 12:00:00.5 UTC)),
            ("https://a.example/", datetime!(2024-01-01 11:59:59.999 UTC)),
            ("https://b.example/", datetime!(2024-01-01 12:00:00 UTC)),
            ("https://d.example/", datetime!(2024-01-01 13:00:00.25 +1)),
        ] {
            tx.upsert_mention(&mention(source, target, created))
                .await
                .unwrap();
        }

        let sources = |mentions: Vec<KeyedMention>| -> Vec<String> {
            mentions.into_iter().map(|m| m.mention.source).collect()
        };
        let chronological = [
            "https://a.example/",
            "https://b.example/",
            "https://d.example/",
            "https://c.example/",
        ];

        assert_eq!(sources(tx.get_queued().await.unwrap()), chronological);

        let mut newest_first = sources(tx.get_triage(10, 0).await.unwrap());
        newest_first.reverse();
        assert_eq!(newest_first, chronological);

        let by_target: Vec<_> = tx
            .get_mentions(target, MentionFilter::All)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.source)
            .collect();
        assert_eq!(by_target, chronological);

        let stored = tx
            .get_mention(&mention("https://d.example/", target, datetime!(2000-01-01 0:00 UTC)).key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.mention.created, datetime!(2024-01-01 12:00:00.25 UTC));
    }

    #[tokio::test]
    async fn queries_by_target_and_state() {
        let storage = Storage::in_memory().await.unwrap();
        let mut tx = storage.begin().await.unwrap();
        let target = "https://bitworking.org/bar";

        let good = [
            mention("https://stackoverflow.com/foo", target, datetime!(2024-01-01 0:00 UTC)),
            mention("https://news.ycombinator.com/foo", target, datetime!(2024-01-03 0:00 UTC)),
        ];
        let spam = mention("https://spam.com/foo", target, datetime!(2024-01-02 0:00 UTC));
        let elsewhere = mention(
            "https://a.example/",
            "https://bitworking.org/other",
            datetime!(2024-01-04 0:00 UTC),
        );

        for m in &good {
            let key = tx.upsert_mention(m).await.unwrap();
            tx.apply_verdict(&key, MentionState::Good, None).await.unwrap();
        }
        let spam_key = tx.upsert_mention(&spam).await.unwrap();
        tx.apply_verdict(&spam_key, MentionState::Spam, None).await.unwrap();
        tx.upsert_mention(&elsewhere).await.unwrap();

        let found = tx.get_mentions(target, MentionFilter::Good).await.unwrap();
        assert_eq!(
            found.iter().map(|m| m.source.as_str()).collect::<Vec<_>>(),
            vec!["https://stackoverflow.com/foo", "https://news.ycombinator.com/foo"]
        );
        assert_eq!(tx.get_mentions(target, MentionFilter::All).await.unwrap().len(), 3);

        let queued = tx.get_queued().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].mention.source, "https://a.example/");

        let page = tx.get_triage(2, 0).await.unwrap();
        assert_eq!(
            page.iter().map(|m| m.mention.source.as_str()).collect::<Vec<_>>(),
            vec!["https://a.example/", "https://news.ycombinator.com/foo"]
        );
        let next = tx.get_triage(2, 2).await.unwrap();
        assert_eq!(
            next.iter().map(|m| m.mention.source.as_str()).collect::<Vec<_>>(),
            vec!["https://spam.com/foo", "https://stackoverflow.com/foo"]
        );
    }

    #[tokio::test]
    async fn verdicts_and_overrides() {
        let storage = Storage::in_memory().await.unwrap();
        let mut tx = storage.begin().await.unwrap();
        let key = tx
            .upsert_mention(&mention(
                "https://a.example/",
                "https://bitworking.org/bar",
                datetime!(2024-01-01 0:00 UTC),
            ))
            .await
            .unwrap();

        let metadata = Metadata {
            title: Some("Hello".into()),
            author: Some("Joe".into()),
            author_url: Some("https://a.example/about".into()),
            published: Some(datetime!(2018-01-13 00:00:00 -5)),
            thumbnail: Some("abc".into()),
        };
        assert!(tx
            .apply_verdict(&key, MentionState::Good, Some(&metadata))
            .await
            .unwrap());

        let stored = tx.get_mention(&key).await.unwrap().unwrap();
        assert_eq!(stored.mention.state, MentionState::Good);
        assert_eq!(stored.mention.metadata, metadata);

        assert!(tx.update_state(&key, MentionState::Spam).await.unwrap());
        let stored = tx.get_mention(&key).await.unwrap().unwrap();
        assert_eq!(stored.mention.state, MentionState::Spam);
        assert_eq!(stored.mention.metadata, metadata);

        assert!(!tx.update_state("nope", MentionState::Good).await.unwrap());
        assert!(!tx
            .apply_verdict("nope", MentionState::Good, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn thumbnails_are_idempotent() {
        let storage = Storage::in_memory().await.unwrap();
        let mut tx = storage.begin().await.unwrap();

        tx.put_thumbnail("h", b"png").await.unwrap();
        tx.put_thumbnail("h", b"png").await.unwrap();

        assert_eq!(tx.count_thumbnails().await.unwrap(), 1);
        assert_eq!(tx.get_thumbnail("h").await.unwrap(), Some(b"png".to_vec()));
        assert_eq!(tx.get_thumbnail("other").await.unwrap(), None);
    }
}
