pub mod contextual_llm;
pub mod devices;
pub mod engagement_llm;
pub mod history;
pub mod llm;
pub mod query_llm;

pub use contextual_llm::OpenAiContextualAdapter;
pub use devices::ClientMediaDevices;
pub use engagement_llm::OpenAiEngagementAdapter;
pub use history::InMemoryHistoryAdapter;
pub use query_llm::OpenAiQueryAdapter;
