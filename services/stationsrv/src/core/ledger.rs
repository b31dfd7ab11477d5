//! Material usage ledger
//!
//! Remaining usage per batch material lot. All mutations go through one lock
//! so concurrent scans touching the same lot never interleave their
//! read-modify-write. The counter has no floor: it keeps going negative until
//! the lot is replenished.

use errors::{StationError, StationResult};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::core::config::{BatchMaterialLot, Side};

/// Remaining usage below this many units triggers a low-stock warning
pub const LOW_STOCK_UNITS: f64 = 5.0;

/// One applied decrement
#[derive(Debug, Clone, PartialEq)]
pub struct UsageChange {
    pub lot_id: u32,
    pub before: f64,
    pub after: f64,
}

#[derive(Debug, Default)]
pub struct MaterialUsageLedger {
    lots: Mutex<Vec<BatchMaterialLot>>,
}

impl MaterialUsageLedger {
    pub fn new(lots: Vec<BatchMaterialLot>) -> Self {
        Self {
            lots: Mutex::new(lots),
        }
    }

    /// Lots a scan on `side` binds to
    ///
    /// In bind-all mode that is every lot in configuration order, otherwise
    /// the first lot bound to the side.
    pub fn targets(&self, side: Side, bind_all: bool) -> StationResult<Vec<BatchMaterialLot>> {
        let lots = self.lots.lock();
        let targets: Vec<BatchMaterialLot> = if bind_all {
            lots.clone()
        } else {
            lots.iter()
                .find(|lot| lot.bound_position == side)
                .cloned()
                .into_iter()
                .collect()
        };

        if targets.is_empty() {
            return Err(StationError::NoLotForSide {
                side: side.to_string(),
            });
        }
        Ok(targets)
    }

    /// Subtract `qty` from a lot's remaining usage
    ///
    /// Returns the new value, or `None` when the lot is not usage controlled
    /// or has no remaining usage recorded.
    pub fn decrement(&self, lot_id: u32, qty: f64) -> StationResult<Option<f64>> {
        let mut lots = self.lots.lock();
        let lot = find_mut(&mut lots, lot_id)?;

        if !lot.usage_controlled {
            return Ok(None);
        }
        let Some(before) = lot.remaining_usage else {
            return Ok(None);
        };

        let after = before - qty;
        lot.remaining_usage = Some(after);

        info!("{} remaining usage: {:.2} → {:.2}", lot.name(), before, after);
        if after <= 0.0 {
            warn!("{} remaining usage used up", lot.name());
        } else if after < lot.effective_unit_usage() * LOW_STOCK_UNITS {
            warn!(
                "{} running low: {:.2} left, about {} units",
                lot.name(),
                after,
                (after / lot.effective_unit_usage()).floor()
            );
        }

        Ok(Some(after))
    }

    /// Decrement every target by its unit usage
    pub fn consume(&self, targets: &[BatchMaterialLot]) -> StationResult<Vec<UsageChange>> {
        let mut changes = Vec::with_capacity(targets.len());
        for target in targets {
            let qty = self.unit_usage(target.id)?;
            if let Some(after) = self.decrement(target.id, qty)? {
                changes.push(UsageChange {
                    lot_id: target.id,
                    before: after + qty,
                    after,
                });
            }
        }
        Ok(changes)
    }

    fn unit_usage(&self, lot_id: u32) -> StationResult<f64> {
        let lots = self.lots.lock();
        find(&lots, lot_id).map(BatchMaterialLot::effective_unit_usage)
    }

    /// True iff the lot is usage controlled and has nothing left
    pub fn is_exhausted(&self, lot_id: u32) -> bool {
        let lots = self.lots.lock();
        find(&lots, lot_id).map(exhausted).unwrap_or(false)
    }

    /// First exhausted lot among `targets`, as the halt error
    pub fn check_exhausted(&self, targets: &[BatchMaterialLot]) -> Option<StationError> {
        let lots = self.lots.lock();
        targets
            .iter()
            .filter_map(|t| find(&lots, t.id).ok())
            .find(|lot| exhausted(lot))
            .map(|lot| StationError::MaterialExhausted {
                lot_id: lot.name(),
                remaining: lot.remaining_usage.unwrap_or_default(),
            })
    }

    /// Install a new package on an unlocked lot and lock it again
    pub fn replace_package(
        &self,
        lot_id: u32,
        lot_code: &str,
        capacity: u32,
    ) -> StationResult<BatchMaterialLot> {
        let lot_code = lot_code.trim();
        if lot_code.is_empty() {
            return Err(StationError::InvalidConfig {
                field: "lot_code".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let mut lots = self.lots.lock();
        let lot = find_mut(&mut lots, lot_id)?;
        if lot.locked {
            return Err(StationError::InvalidConfig {
                field: lot.name(),
                reason: "lot is locked, unlock it before replacing the package".to_string(),
            });
        }

        info!(
            "{} package replaced: {} → {} (capacity {})",
            lot.name(),
            lot.lot_code,
            lot_code,
            capacity
        );
        lot.lot_code = lot_code.to_string();
        lot.package_capacity = Some(capacity);
        lot.remaining_usage = Some(f64::from(capacity));
        lot.locked = true;
        Ok(lot.clone())
    }

    pub fn set_locked(&self, lot_id: u32, locked: bool) -> StationResult<()> {
        let mut lots = self.lots.lock();
        let lot = find_mut(&mut lots, lot_id)?;
        lot.locked = locked;
        info!("{} {}", lot.name(), if locked { "locked" } else { "unlocked" });
        Ok(())
    }

    pub fn get(&self, lot_id: u32) -> Option<BatchMaterialLot> {
        let lots = self.lots.lock();
        find(&lots, lot_id).ok().cloned()
    }

    /// Current state of every lot, for persistence
    pub fn snapshot(&self) -> Vec<BatchMaterialLot> {
        self.lots.lock().clone()
    }
}

fn exhausted(lot: &BatchMaterialLot) -> bool {
    lot.usage_controlled && lot.remaining_usage.is_some_and(|r| r <= 0.0)
}

fn find(lots: &[BatchMaterialLot], lot_id: u32) -> StationResult<&BatchMaterialLot> {
    lots.iter()
        .find(|lot| lot.id == lot_id)
        .ok_or_else(|| unknown_lot(lot_id))
}

fn find_mut(lots: &mut [BatchMaterialLot], lot_id: u32) -> StationResult<&mut BatchMaterialLot> {
    lots.iter_mut()
        .find(|lot| lot.id == lot_id)
        .ok_or_else(|| unknown_lot(lot_id))
}

fn unknown_lot(lot_id: u32) -> StationError {
    StationError::InvalidConfig {
        field: "lots".to_string(),
        reason: format!("unknown lot {lot_id}"),
    }
}
