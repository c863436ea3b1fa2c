//! Background workers

pub mod status_poller;

pub use status_poller::{PollUpdate, StatusPoller};
