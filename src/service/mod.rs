pub mod client;
pub mod handler;
pub mod protocol;
pub mod server;

pub use client::ServiceClient;
pub use handler::ProctorService;
pub use server::ProctorServer;
