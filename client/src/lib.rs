mod app;
pub mod color;
pub mod config;
mod dom;
pub mod raster;
mod render;
pub mod sampler;
pub mod session;
pub mod tools;
pub mod transport;
mod ws;

pub use app::{run, Whiteboard};
pub use config::SessionConfig;
pub use session::{SessionController, SessionError};
pub use ws::StompClient;
