//! Per-IP aggregate statistics.

use super::chat::{ChatSession, Role};
use chrono::{DateTime, Utc};

/// Aggregated usage for one client IP.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatStats {
    pub total_sessions: u64,
    pub total_messages: u64,
    pub total_tokens: i64,
    pub user_messages: u64,
    pub assistant_messages: u64,
    /// `totalMessages / totalSessions`, two decimal places.
    pub average_messages_per_session: f64,
    /// Earliest `createdAt`.
    pub first_seen: Option<DateTime<Utc>>,
    /// Latest `updatedAt`.
    pub last_seen: Option<DateTime<Utc>>,
}

impl ChatStats {
    /// Aggregate sessions into statistics. No sessions gives the zero value.
    pub fn from_sessions(sessions: &[ChatSession]) -> Self {
        let mut stats = ChatStats::default();

        for session in sessions {
            stats.total_sessions += 1;
            stats.total_messages = stats
                .total_messages
                .saturating_add(session.message_count() as u64);
            stats.total_tokens = stats.total_tokens.saturating_add(session.total_tokens);
            stats.user_messages = stats
                .user_messages
                .saturating_add(session.count_role(Role::User) as u64);
            stats.assistant_messages = stats
                .assistant_messages
                .saturating_add(session.count_role(Role::Assistant) as u64);

            stats.first_seen = Some(match stats.first_seen {
                Some(seen) => seen.min(session.created_at),
                None => session.created_at,
            });
            stats.last_seen = Some(match stats.last_seen {
                Some(seen) => seen.max(session.updated_at),
                None => session.updated_at,
            });
        }

        if stats.total_sessions > 0 {
            stats.average_messages_per_session =
                round2(stats.total_messages as f64 / stats.total_sessions as f64);
        }

        stats
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewMessage;
    use chrono::Duration;

    fn session(id: &str, tokens: &[i64], created: DateTime<Utc>) -> ChatSession {
        let mut s: Option<ChatSession> = None;
        for (i, t) in tokens.iter().enumerate() {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            let msg = NewMessage::new(id, role, format!("message {}", i), "10.0.0.1")
                .with_tokens(*t);
            let at = created + Duration::minutes(i as i64);
            match s.as_mut() {
                Some(existing) => existing.append(&msg, at).unwrap(),
                None => s = Some(ChatSession::start(&msg, at)),
            }
        }
        s.expect("at least one message")
    }

    #[test]
    fn empty_input_is_all_zero() {
        let stats = ChatStats::from_sessions(&[]);
        assert_eq!(stats, ChatStats::default());
        assert_eq!(stats.average_messages_per_session, 0.0);
        assert!(stats.first_seen.is_none());
        assert!(stats.last_seen.is_none());
    }

    #[test]
    fn three_session_fixture() {
        let base = Utc::now() - Duration::days(1);
        let sessions = vec![
            session("a", &[5, 5], base),
            session("b", &[10, 10, 10, 10], base + Duration::hours(1)),
            session("c", &[5], base + Duration::hours(2)),
        ];

        let stats = ChatStats::from_sessions(&sessions);
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.total_messages, 7);
        assert_eq!(stats.total_tokens, 55);
        assert_eq!(stats.average_messages_per_session, 2.33);
        assert_eq!(stats.user_messages, 4);
        assert_eq!(stats.assistant_messages, 3);
        assert_eq!(stats.first_seen, Some(sessions[0].created_at));
        assert_eq!(stats.last_seen, Some(sessions[2].updated_at.max(sessions[1].updated_at)));
    }

    #[test]
    fn last_seen_is_latest_activity_not_latest_creation() {
        let base = Utc::now() - Duration::days(1);
        // Created first but active for longest.
        let long_running = session("long", &[1, 1, 1, 1, 1, 1], base);
        let short = session("short", &[1], base + Duration::minutes(1));

        let stats = ChatStats::from_sessions(&[long_running.clone(), short]);
        assert_eq!(stats.last_seen, Some(long_running.updated_at));
    }

    #[test]
    fn token_total_saturates_instead_of_overflowing() {
        let base = Utc::now() - Duration::days(1);
        let mut heavy = session("heavy", &[1], base);
        heavy.total_tokens = i64::MAX - 10;
        let mut other = session("other", &[1], base + Duration::hours(1));
        other.total_tokens = i64::MAX / 2;

        let stats = ChatStats::from_sessions(&[heavy, other]);
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.total_tokens, i64::MAX);
    }
}
