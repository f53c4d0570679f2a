//! Trade ingestion: ledger write plus the optional daily journal.

use crate::domain::error::TradeflowError;
use crate::domain::observation::{StoredTrade, Trade};
use crate::ports::store_port::{TradeJournal, TradeLedger};
use tracing::{info, warn};

/// Writes `trade` to the ledger, then appends the stored row to `journal`.
///
/// The ledger is authoritative: a journal failure is logged and does not
/// undo or fail the ledger write.
pub fn record_trade(
    ledger: &dyn TradeLedger,
    journal: Option<&dyn TradeJournal>,
    trade: Trade,
) -> Result<StoredTrade, TradeflowError> {
    let id = ledger.record_trade(&trade)?;
    let stored = StoredTrade { id, trade };

    info!(
        id,
        ticker = %stored.trade.ticker,
        price = stored.trade.price,
        quantity = stored.trade.quantity,
        side = %stored.trade.side,
        "trade recorded"
    );

    if let Some(journal) = journal {
        if let Err(e) = journal.journal(&stored) {
            warn!(id, error = %e, "failed to journal trade");
        }
    }
    Ok(stored)
}
