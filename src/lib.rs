//! inkroom: real-time collaborative whiteboard server.
//!
//! ARCHITECTURE
//! ============
//! Browser sessions connect over one websocket (`routes::ws`), authenticate
//! at the handshake (`services::identity`), and join a board room
//! (`services::room`). The session coordinator (`services::session`) fans
//! every event out to the room immediately and hands durable work to the
//! mutation batcher (`services::batcher`), which writes through the
//! `store::BoardStore` trait to Postgres or an in-process store.

pub mod config;
pub mod db;
pub mod event;
pub mod model;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
