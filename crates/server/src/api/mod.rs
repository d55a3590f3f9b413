pub mod routes;
pub mod handlers;
pub mod extract;
pub mod server;
pub mod types;
mod middleware;

pub use routes::create_router;
pub use server::start_server;
