//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! passed by reference into the session coordinator. It holds the store
//! handle, the room registry, and the mutation batcher. One instance per
//! process (and one per test); there are no globals.

use std::sync::Arc;

use crate::config::Config;
use crate::services::batcher::MutationBatcher;
use crate::services::room::RoomRegistry;
use crate::store::BoardStore;

/// Clone is required by Axum; every field is an `Arc` or wraps one.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BoardStore>,
    pub rooms: RoomRegistry,
    pub batcher: MutationBatcher,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn BoardStore>, config: Config) -> Self {
        let batcher = MutationBatcher::new(Arc::clone(&store), config.batch);
        Self { store, rooms: RoomRegistry::new(), batcher, config: Arc::new(config) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
