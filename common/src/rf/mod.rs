pub mod health;
pub mod transport;

pub use health::LinkHealth;
pub use transport::{TimeoutAction, Transport, TransportFailure, TransportState};
