pub mod events;
pub mod handler;

pub use handler::create_official_router;
