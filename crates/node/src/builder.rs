//! Engine builder.

use std::sync::Arc;

use cadence_api::{ContentCatalog, EngineConfig, LedgerStore};
use cadence_channel::ChannelClient;
use cadence_settlement::SettlementClient;

use crate::engine::Engine;

/// Assembles an [`Engine`] over caller-supplied collaborators.
///
/// Channel and settlement default to their `Unconfigured` states: a bare
/// builder yields an engine that meters and closes correctly, skips the
/// advisory channel, and disputes any consumption it cannot settle -
/// misconfiguration stays observable instead of being papered over.
pub struct EngineBuilder<L, C> {
    ledger: Arc<L>,
    catalog: Arc<C>,
    channel: ChannelClient,
    settlement: SettlementClient,
    config: EngineConfig,
}

impl<L: LedgerStore, C: ContentCatalog> EngineBuilder<L, C> {
    /// Start a builder over the two mandatory collaborators.
    pub fn new(ledger: Arc<L>, catalog: Arc<C>) -> Self {
        Self {
            ledger,
            catalog,
            channel: ChannelClient::Unconfigured,
            settlement: SettlementClient::Unconfigured,
            config: EngineConfig::default(),
        }
    }

    /// Use a connected channel peer client.
    pub fn with_channel(mut self, channel: ChannelClient) -> Self {
        self.channel = channel;
        self
    }

    /// Use a configured settlement service.
    pub fn with_settlement(mut self, settlement: SettlementClient) -> Self {
        self.settlement = settlement;
        self
    }

    /// Override the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Assemble the engine.
    pub fn build(self) -> Engine<L, C> {
        Engine::assemble(
            self.ledger,
            self.catalog,
            self.channel,
            self.settlement,
            self.config,
        )
    }
}
