// meshbridge-api: Network-stack boundary for the meshbridge engine
//
// Wire-level requests and descriptors, the `NetworkStack` trait the core
// engine drives, and an in-memory simulated mesh implementing it.

pub mod error;
pub mod sim;
pub mod stack;
pub mod types;

pub use error::Error;
pub use sim::{SimDevice, SimState, SimulatedStack};
pub use stack::{NetworkStack, SUBSCRIPTION_CAPACITY};
pub use types::*;
