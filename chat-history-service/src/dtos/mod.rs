pub mod chat;

pub use chat::{
    parse_limit, ChatMessageResponse, ChatSessionResponse, ChatStatsResponse, DeleteResponse,
    IpListResponse, LimitParams, SaveMessageRequest, SaveMessageResponse, SearchParams,
    SearchResponse, SessionListResponse, SessionResponse, StatsResponse,
};
