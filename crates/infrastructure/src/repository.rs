//! PostgreSQL 协作者实现
//!
//! 表结构见 `migrations/`：`chat_participants`、`messages`、`contacts`。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ChatId, ContactSource, MembershipSource, MessageId, MessageStore, RepositoryError,
    RepositoryResult, StoredMessage, UserId,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        other => RepositoryError::storage(other.to_string()),
    }
}

#[derive(Debug, FromRow)]
struct ParticipantRecord {
    chat_id: String,
    user_id: String,
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    chat_id: String,
    sender_id: String,
    content: String,
    sent_at: DateTime<Utc>,
}

impl From<MessageRecord> for StoredMessage {
    fn from(value: MessageRecord) -> Self {
        StoredMessage {
            id: MessageId::from(value.id),
            sender_id: UserId::from(value.sender_id),
            chat_id: ChatId::from(value.chat_id),
            content: value.content,
            sent_at: value.sent_at,
        }
    }
}

/// 启动时一次性读取全部 (chat_id, user_id) 映射
#[derive(Clone)]
pub struct PgMembershipSource {
    pool: PgPool,
}

impl PgMembershipSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipSource for PgMembershipSource {
    async fn bulk_load_chat_participants(&self) -> RepositoryResult<Vec<(ChatId, UserId)>> {
        let records = sqlx::query_as::<_, ParticipantRecord>(
            "SELECT chat_id, user_id FROM chat_participants ORDER BY chat_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        tracing::debug!(rows = records.len(), "loaded chat participants");

        Ok(records
            .into_iter()
            .map(|record| (ChatId::from(record.chat_id), UserId::from(record.user_id)))
            .collect())
    }
}

#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn persist(
        &self,
        sender_id: &UserId,
        chat_id: &ChatId,
        content: &str,
    ) -> RepositoryResult<StoredMessage> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (id, chat_id, sender_id, content, sent_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, chat_id, sender_id, content, sent_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(chat_id.as_str())
        .bind(sender_id.as_str())
        .bind(content)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(StoredMessage::from(record))
    }
}

#[derive(Clone)]
pub struct PgContactSource {
    pool: PgPool,
}

impl PgContactSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactSource for PgContactSource {
    async fn get_contacts(&self, user_id: &UserId) -> RepositoryResult<Vec<UserId>> {
        let contacts: Vec<String> = sqlx::query_scalar(
            "SELECT contact_id FROM contacts WHERE user_id = $1 ORDER BY contact_id",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(contacts.into_iter().map(UserId::from).collect())
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
