use sqlx::FromRow;
use time::OffsetDateTime;

use crate::mention::{self, KeyedMention, MentionState, Metadata};

#[derive(FromRow, Debug, Clone)]
pub struct Mention {
    pub key: String,
    pub source: String,
    pub target: String,
    pub state: MentionState,
    pub created: OffsetDateTime,
    pub title: Option<String>,
    pub author: Option<String>,
    pub author_url: Option<String>,
    pub published: Option<OffsetDateTime>,
    pub thumbnail: Option<String>,
}

impl From<Mention> for KeyedMention {
    fn from(row: Mention) -> Self {
        KeyedMention {
            key: row.key,
            mention: mention::Mention {
                source: row.source,
                target: row.target,
                state: row.state,
                created: row.created,
                metadata: Metadata {
                    title: row.title,
                    author: row.author,
                    author_url: row.author_url,
                    published: row.published,
                    thumbnail: row.thumbnail,
                },
            },
        }
    }
}
