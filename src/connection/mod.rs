//! Sans-I/O connection state machine.
//!
//! ## Connection Lifecycle
//!
//! 1. **AwaitingHandshake** - Upgrade request not yet processed
//! 2. **Open** - Handshake accepted, messages flow both ways
//! 3. **CloseSent** / **CloseReceived** - One side of the close handshake is done
//! 4. **Closed** - Nothing more is read or written

mod state;

pub use state::ConnectionState;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::{Connection, Messages};
