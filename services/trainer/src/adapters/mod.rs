pub mod db;
pub mod http_turn;
pub mod memory_store;
pub mod openai_turn;

pub use db::DbAdapter;
pub use http_turn::HttpTurnAdapter;
pub use memory_store::InMemoryStore;
pub use openai_turn::OpenAiTurnAdapter;
