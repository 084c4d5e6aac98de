//! Demo conversations for local development.
//!
//! Sessions are appended through [`ChatRepository`] with backdated
//! timestamps, so seeded data obeys the same invariants as live traffic.
//! Sessions that already exist are left alone, which makes reseeding safe.

use crate::models::{NewMessage, Role};
use crate::services::ChatRepository;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use service_core::error::AppError;
use std::collections::BTreeMap;

struct DemoSession {
    session_id: &'static str,
    ip_address: &'static str,
    user_id: &'static str,
    user_agent: &'static str,
    hours_ago: i64,
    messages: &'static [(Role, &'static str, i64)],
}

const DEMO_SESSIONS: &[DemoSession] = &[
    DemoSession {
        session_id: "session_ip_001",
        ip_address: "192.168.1.100",
        user_id: "home_user_1",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)",
        hours_ago: 1,
        messages: &[
            (Role::User, "Hi Medusa! Who built this portfolio?", 12),
            (Role::Assistant, "An AI/ML developer studying computer science. What would you like to know?", 45),
            (Role::User, "What are the technical skills?", 8),
            (Role::Assistant, "Python, JavaScript, React, Node.js, PyTorch and TensorFlow, plus SQL and cloud work.", 67),
        ],
    },
    DemoSession {
        session_id: "session_ip_002",
        ip_address: "192.168.1.100",
        user_id: "home_user_1",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)",
        hours_ago: 2,
        messages: &[
            (Role::User, "Show me some projects", 8),
            (Role::Assistant, "Highlights include a computer vision pipeline and a time series forecaster.", 89),
        ],
    },
    DemoSession {
        session_id: "session_ip_003",
        ip_address: "192.168.1.101",
        user_id: "home_user_2",
        user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)",
        hours_ago: 3,
        messages: &[
            (Role::User, "Any work experience?", 7),
            (Role::Assistant, "Research assistant work on NLP plus two software internships.", 82),
            (Role::User, "Which internship was longest?", 6),
            (Role::Assistant, "The second one, a full summer on backend services.", 76),
        ],
    },
    DemoSession {
        session_id: "session_ip_004",
        ip_address: "10.0.0.50",
        user_id: "office_user_1",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
        hours_ago: 4,
        messages: &[
            (Role::User, "Is he open to full-time roles?", 9),
            (Role::Assistant, "Yes, especially in machine learning engineering.", 89),
            (Role::User, "How do I get in touch?", 5),
            (Role::Assistant, "The contact page lists email and LinkedIn.", 95),
        ],
    },
    DemoSession {
        session_id: "session_ip_005",
        ip_address: "172.16.0.25",
        user_id: "dev_user_1",
        user_agent: "curl/8.4.0",
        hours_ago: 5,
        messages: &[
            (Role::User, "What stack runs this site?", 8),
            (Role::Assistant, "A React frontend talking to a small chat history API.", 78),
        ],
    },
    DemoSession {
        session_id: "session_ip_006",
        ip_address: "203.0.113.45",
        user_id: "public_user_1",
        user_agent: "Mozilla/5.0 (X11; Linux x86_64)",
        hours_ago: 6,
        messages: &[
            (Role::User, "Tell me something fun", 8),
            (Role::Assistant, "He once trained a model to sort his music library by mood.", 89),
        ],
    },
];

/// Gap between consecutive demo messages.
const MESSAGE_SPACING_SECS: i64 = 100;

/// Per-IP totals for what a seeding run wrote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IpSeedTotals {
    pub sessions: u64,
    pub messages: u64,
    pub tokens: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedSummary {
    pub inserted: u64,
    pub skipped: u64,
    pub by_ip: BTreeMap<String, IpSeedTotals>,
}

/// Append every demo session that is not already stored.
pub async fn seed_demo_sessions(
    repository: &ChatRepository,
    now: DateTime<Utc>,
) -> Result<SeedSummary, AppError> {
    let mut summary = SeedSummary::default();

    for demo in DEMO_SESSIONS {
        match repository.get_by_session(demo.session_id).await {
            Ok(_) => {
                tracing::info!(session_id = demo.session_id, "Demo session already present");
                summary.skipped += 1;
                continue;
            }
            Err(AppError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let started = now - Duration::hours(demo.hours_ago);
        let metadata = json!({ "userAgent": demo.user_agent }).as_object().cloned();
        let totals = summary.by_ip.entry(demo.ip_address.to_string()).or_default();

        for (i, (role, content, tokens)) in demo.messages.iter().enumerate() {
            let message = NewMessage::new(demo.session_id, *role, *content, demo.ip_address)
                .with_tokens(*tokens)
                .with_user_id(Some(demo.user_id.to_string()))
                .with_metadata(metadata.clone());
            let at = started + Duration::seconds(MESSAGE_SPACING_SECS * i as i64);
            repository.append_message_at(message, at).await?;

            totals.messages += 1;
            totals.tokens += tokens;
        }
        totals.sessions += 1;
        summary.inserted += 1;
    }

    Ok(summary)
}
