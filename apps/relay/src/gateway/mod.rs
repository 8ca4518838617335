pub mod audit;
pub mod bridge;
pub mod client;
pub mod dispatch;
pub mod events;
pub mod fanout;
pub mod registry;
pub mod resource;
pub mod server;
