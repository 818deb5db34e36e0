// =============================================================================
// Tick Ingestor (C3)
// =============================================================================
//
// Normalizes a raw feed frame, writes it through to the trade store, and — on
// a successful (non-duplicate) write — hands the tick synchronously to the
// whale detector (C4) and order-flow aggregator (C5), per SPEC_FULL §4.1.
// Grounded on the teacher's normalize-then-forward shape in
// market_data/trade_stream.rs, adapted around the new persisted `Tick` row
// instead of an in-memory CVD accumulator.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::candles;
use crate::feed::RawFrame;
use crate::order_flow::OrderFlowAggregator;
use crate::store::ticks::{self, NormalizedTick};
use crate::store::Store;
use crate::whale::WhaleDetector;

pub struct Ingestor {
    store: Arc<Store>,
    whale: Arc<WhaleDetector>,
    order_flow: Arc<OrderFlowAggregator>,
}

impl Ingestor {
    pub fn new(store: Arc<Store>, whale: Arc<WhaleDetector>, order_flow: Arc<OrderFlowAggregator>) -> Self {
        Self { store, whale, order_flow }
    }

    /// Normalizes, persists, and — on success — fans the tick out to C4/C5.
    pub async fn ingest(&self, frame: RawFrame) {
        let tick = NormalizedTick {
            symbol: frame.symbol,
            side: frame.side,
            price: frame.price,
            volume_shares: frame.volume_shares,
            board: frame.board,
            trade_number: frame.trade_number,
        };

        match ticks::insert_tick(self.store.pool(), &tick).await {
            Ok(row) => {
                candles::record_tick(&self.store, &row).await;
                self.whale.on_tick(&row);
                self.order_flow.on_tick(&row);
            }
            Err(e) if e.is_duplicate() => {
                debug!(symbol = %tick.symbol, "duplicate tick, treated as success");
            }
            Err(e) => {
                warn!(symbol = %tick.symbol, error = %e, "tick insert failed, tick dropped from downstream pipeline");
            }
        }
    }

    /// Transactional chunked insert (size 100); a duplicate aborts only its
    /// own chunk. Used for catch-up/backfill paths, not the hot ingest loop.
    pub async fn ingest_batch(&self, batch: &[NormalizedTick]) -> anyhow::Result<usize> {
        ticks::ingest_batch(self.store.pool(), batch).await
    }
}
