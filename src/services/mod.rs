//! Domain services behind the websocket route.
//!
//! ARCHITECTURE
//! ============
//! `session` owns per-connection routing and drives the others: `room` for
//! membership and fan-out, `batcher` for rate-limited durable writes (timed by
//! `scheduler`), and `canvas` for snapshot reconciliation. `identity` runs
//! once per connection, before the upgrade.

pub mod batcher;
pub mod canvas;
pub mod identity;
pub mod room;
pub mod scheduler;
pub mod session;
