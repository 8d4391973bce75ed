//! Session state shared by the control client and the event relay.
//!
//! One `SessionState` is created per process and handed to both sides as an
//! `Arc`. The connection flag is a single atomic; the last known status and
//! the active run are independent last-write-wins cells.

pub mod state;

pub use state::{ConnectionState, SessionSnapshot, SessionState};
