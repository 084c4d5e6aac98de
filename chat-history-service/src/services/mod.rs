pub mod database;
pub mod memory;
pub mod metrics;
pub mod repository;
pub mod store;

pub use database::MongoChatStore;
pub use memory::InMemoryChatStore;
pub use repository::{ChatRepository, IpListing};
pub use store::{ChatStore, SessionOrder};
