//! 会话存储
//!
//! 进程内的 token -> 会话状态映射：
//! - 首次访问时惰性创建，token 为随机 UUID，生命周期内不可变
//! - 聊天历史只追加，`reset` 清空但保留 token
//! - 空闲超过 TTL 的会话视为不存在，并由后台任务清理
//!
//! 使用分片 map，每次追加都在分片锁内完成，并发请求不会撕裂或丢失整轮对话。

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

/// 对话角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// 一轮对话
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// 会话中最近一次处理的文档
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_created: Option<u64>,
    /// 下游记录的处理时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downstream_upload_time: Option<String>,
}

/// 会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub chat_history: Vec<ChatTurn>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub document: Option<DocumentInfo>,
}

impl Session {
    fn new(id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            chat_history: Vec::new(),
            created_at: now,
            last_accessed_at: now,
            document: None,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.last_accessed_at > ttl
    }
}

/// 会话存储
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    /// 空闲过期时间
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    fn mint_token() -> String {
        Uuid::new_v4().to_string()
    }

    /// 获取或创建会话
    ///
    /// 未提供 token、token 未知或已过期时，生成新 token 并创建空会话；
    /// 客户端提供的未知 token 不会被沿用。
    pub fn get_or_create(&self, token: Option<&str>) -> (String, Session) {
        self.get_or_create_at(token, Utc::now())
    }

    pub fn get_or_create_at(&self, token: Option<&str>, now: DateTime<Utc>) -> (String, Session) {
        if let Some(token) = token {
            if let Some(session) = self.touch(token, now) {
                return (token.to_string(), session);
            }
            tracing::debug!(token = %token, "[SESSION] unknown or expired token, minting a new one");
        }

        loop {
            let token = Self::mint_token();
            let entry = self.sessions.entry(token.clone());
            if let Entry::Vacant(vacant) = entry {
                let session = Session::new(token.clone(), now);
                vacant.insert(session.clone());
                tracing::info!(session_id = %token, "[SESSION] created");
                return (token, session);
            }
        }
    }

    /// 刷新访问时间并返回快照；过期会话会被移除
    fn touch(&self, token: &str, now: DateTime<Utc>) -> Option<Session> {
        {
            let mut session = self.sessions.get_mut(token)?;
            if !session.is_expired(now, self.ttl) {
                session.last_accessed_at = now;
                return Some(session.clone());
            }
        }
        self.sessions
            .remove_if(token, |_, s| s.is_expired(now, self.ttl));
        None
    }

    /// 读取会话快照
    pub fn get(&self, token: &str) -> Option<Session> {
        let now = Utc::now();
        self.sessions
            .get(token)
            .filter(|s| !s.is_expired(now, self.ttl))
            .map(|s| s.clone())
    }

    /// 追加一轮对话，返回追加后的历史长度
    pub fn append_turn(
        &self,
        token: &str,
        role: ChatRole,
        content: impl Into<String>,
    ) -> Result<usize, SessionError> {
        let mut session = self
            .sessions
            .get_mut(token)
            .ok_or_else(|| SessionError::NotFound(token.to_string()))?;
        session.chat_history.push(ChatTurn {
            role,
            content: content.into(),
        });
        session.last_accessed_at = Utc::now();
        let len = session.chat_history.len();
        tracing::debug!(session_id = %token, role = ?role, history_len = len, "[SESSION] turn appended");
        Ok(len)
    }

    /// 清空聊天历史，token 保持有效
    pub fn reset(&self, token: &str) -> Result<(), SessionError> {
        let mut session = self
            .sessions
            .get_mut(token)
            .ok_or_else(|| SessionError::NotFound(token.to_string()))?;
        let cleared = session.chat_history.len();
        session.chat_history.clear();
        session.last_accessed_at = Utc::now();
        tracing::info!(session_id = %token, cleared, "[SESSION] history reset");
        Ok(())
    }

    /// 记录会话最近处理的文档
    pub fn record_document(&self, token: &str, document: DocumentInfo) -> Result<(), SessionError> {
        let mut session = self
            .sessions
            .get_mut(token)
            .ok_or_else(|| SessionError::NotFound(token.to_string()))?;
        session.document = Some(document);
        Ok(())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.get(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// 清理过期会话，返回清理数量
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Utc::now())
    }

    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired(now, self.ttl));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::info!(removed, "[SESSION] expired sessions cleaned up");
        }
        removed
    }
}
