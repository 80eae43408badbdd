//! Agent adapter implementations.

mod command_adapter;
mod http_adapter;
pub mod mock_agent;

pub use command_adapter::CommandAdapter;
pub use http_adapter::HttpAdapter;
pub use mock_agent::MockAgent;
