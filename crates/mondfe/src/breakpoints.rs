//! Host-side mirror of the monitor's breakpoint store.
//!
//! Every mutation goes to the monitor first and touches the local table only
//! on success, so a remote failure leaves the mirror consistent with the target.

use std::fmt;

use am29k_isa::{Address, Space};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::CommandError;
use crate::remote::{BreakpointKind, BreakpointSlot, RemoteError, RemoteTarget};

/// Slots queried by [`BreakpointTable::refresh_from_target`] before giving up.
pub const MAX_BREAKPOINT_SLOTS: u32 = 1024;

/// One breakpoint known to both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BreakpointRecord {
    /// Monitor-assigned id.
    pub id: i32,
    /// Address space.
    pub space: Space,
    /// Breakpoint address.
    pub address: u32,
    /// Passes before the breakpoint triggers.
    pub pass_count: i32,
    /// Passes taken so far.
    pub current_count: i32,
    /// Breakpoint variant.
    pub kind: BreakpointKind,
}

impl BreakpointRecord {
    /// Returns `true` when the record sits at `address`.
    #[must_use]
    pub fn matches(&self, address: &Address) -> bool {
        self.space == address.space && self.address == address.offset
    }
}

impl fmt::Display for BreakpointRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>4}  {:<6} 0x{:08x}  pass {}/{}  {}",
            self.id,
            self.space,
            self.address,
            self.current_count,
            self.pass_count,
            self.kind.name()
        )
    }
}

/// Breakpoint table failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BreakpointError {
    /// A record already exists at that address.
    #[error("breakpoint already set")]
    AlreadySet,
    /// No record at that address.
    #[error("no breakpoint at that address")]
    NotFound,
    /// The monitor call failed; the table is unchanged.
    #[error("remote failure: {0}")]
    RemoteFailure(RemoteError),
}

impl From<BreakpointError> for CommandError {
    fn from(err: BreakpointError) -> Self {
        match err {
            BreakpointError::AlreadySet => Self::AlreadySet,
            BreakpointError::NotFound => Self::NotFound,
            BreakpointError::RemoteFailure(remote) => remote.into(),
        }
    }
}

/// Ordered breakpoint records, at most one per `(space, address)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointTable {
    records: Vec<BreakpointRecord>,
}

impl BreakpointTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Creates a breakpoint on the target and records it.
    ///
    /// # Errors
    ///
    /// [`BreakpointError::AlreadySet`] without contacting the monitor if the
    /// address is taken; [`BreakpointError::RemoteFailure`] if the monitor refuses.
    pub fn set(
        &mut self,
        remote: &mut dyn RemoteTarget,
        address: Address,
        pass_count: i32,
        kind: BreakpointKind,
    ) -> Result<i32, BreakpointError> {
        if self.find(&address).is_some() {
            return Err(BreakpointError::AlreadySet);
        }
        let id = remote
            .set_breakpoint(address.space, address.offset, pass_count, kind)
            .map_err(BreakpointError::RemoteFailure)?;
        debug!(id, %address, "breakpoint set");
        self.records.push(BreakpointRecord {
            id,
            space: address.space,
            address: address.offset,
            pass_count,
            current_count: 0,
            kind,
        });
        Ok(id)
    }

    /// Removes the breakpoint at `address` from the target, then from the table.
    ///
    /// # Errors
    ///
    /// [`BreakpointError::NotFound`] if nothing is set there;
    /// [`BreakpointError::RemoteFailure`] leaves the record in place.
    pub fn clear(
        &mut self,
        remote: &mut dyn RemoteTarget,
        address: Address,
    ) -> Result<(), BreakpointError> {
        let index = self
            .records
            .iter()
            .position(|record| record.matches(&address))
            .ok_or(BreakpointError::NotFound)?;
        let id = self.records[index].id;
        remote
            .remove_breakpoint(id)
            .map_err(BreakpointError::RemoteFailure)?;
        debug!(id, %address, "breakpoint cleared");
        self.records.remove(index);
        Ok(())
    }

    /// Removes every breakpoint in table order.
    ///
    /// Stops at the first remote failure: records removed so far stay
    /// removed, the rest stay in the table.
    ///
    /// # Errors
    ///
    /// [`BreakpointError::RemoteFailure`] from the first failing removal.
    pub fn clear_all(&mut self, remote: &mut dyn RemoteTarget) -> Result<(), BreakpointError> {
        while let Some(record) = self.records.first() {
            let id = record.id;
            remote
                .remove_breakpoint(id)
                .map_err(BreakpointError::RemoteFailure)?;
            self.records.remove(0);
        }
        Ok(())
    }

    /// Discards the table and rebuilds it from the monitor's slots.
    ///
    /// Slots are read from 0 until the monitor answers "no more"; empty slots
    /// are skipped and the slot number becomes the record id.
    ///
    /// # Errors
    ///
    /// [`BreakpointError::RemoteFailure`]; records read before the failure are kept.
    pub fn refresh_from_target(
        &mut self,
        remote: &mut dyn RemoteTarget,
    ) -> Result<(), BreakpointError> {
        self.records.clear();
        for slot in 0..MAX_BREAKPOINT_SLOTS {
            match remote
                .breakpoint_status(slot)
                .map_err(BreakpointError::RemoteFailure)?
            {
                BreakpointSlot::Active(bp) => {
                    let id = i32::try_from(slot).unwrap_or(i32::MAX);
                    self.records.push(BreakpointRecord {
                        id,
                        space: bp.space,
                        address: bp.address,
                        pass_count: bp.pass_count,
                        current_count: bp.current_count,
                        kind: bp.kind,
                    });
                }
                BreakpointSlot::Invalid => {}
                BreakpointSlot::NoMore => {
                    debug!(count = self.records.len(), "breakpoint table refreshed");
                    return Ok(());
                }
            }
        }
        warn!(
            limit = MAX_BREAKPOINT_SLOTS,
            "monitor never reported the end of its breakpoint slots"
        );
        Ok(())
    }

    /// First record at `address`.
    #[must_use]
    pub fn find(&self, address: &Address) -> Option<&BreakpointRecord> {
        self.records.iter().find(|record| record.matches(address))
    }

    /// Record with monitor id `id`.
    #[must_use]
    pub fn find_by_id(&self, id: i32) -> Option<&BreakpointRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &BreakpointRecord> {
        self.records.iter()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when no breakpoints are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{LoopbackTarget, RemoteOp};
    use crate::remote::{RemoteBreakpoint, RemoteErrorKind};

    fn imem(offset: u32) -> Address {
        Address::new(Space::InstructionMemory, offset)
    }

    #[test]
    fn set_then_find_returns_remote_id() {
        let mut remote = LoopbackTarget::new();
        let mut table = BreakpointTable::new();
        let id = table
            .set(&mut remote, imem(0x100), 1, BreakpointKind::Software)
            .expect("set");
        let record = table.find(&imem(0x100)).expect("recorded");
        assert_eq!(record.id, id);
        assert_eq!(table.find_by_id(id), Some(record));
    }

    #[test]
    fn duplicate_set_does_not_reach_the_monitor() {
        let mut remote = LoopbackTarget::new();
        let mut table = BreakpointTable::new();
        table
            .set(&mut remote, imem(0x100), 1, BreakpointKind::Software)
            .expect("set");
        assert_eq!(
            table.set(&mut remote, imem(0x100), 1, BreakpointKind::Software),
            Err(BreakpointError::AlreadySet)
        );
        assert_eq!(remote.call_count(RemoteOp::SetBreakpoint), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn same_offset_in_another_space_is_distinct() {
        let mut remote = LoopbackTarget::new();
        let mut table = BreakpointTable::new();
        table
            .set(&mut remote, imem(0x100), 1, BreakpointKind::Software)
            .expect("set");
        table
            .set(
                &mut remote,
                Address::new(Space::InstructionRom, 0x100),
                1,
                BreakpointKind::Software,
            )
            .expect("set in rom");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn failed_set_leaves_table_unchanged() {
        let mut remote = LoopbackTarget::new();
        remote.fail_next(RemoteOp::SetBreakpoint, RemoteErrorKind::Failed(5));
        let mut table = BreakpointTable::new();
        let err = table
            .set(&mut remote, imem(0x100), 1, BreakpointKind::Software)
            .expect_err("remote refused");
        assert!(matches!(err, BreakpointError::RemoteFailure(_)));
        assert!(table.is_empty());
    }

    #[test]
    fn clear_removes_record_after_remote_success() {
        let mut remote = LoopbackTarget::new();
        let mut table = BreakpointTable::new();
        table
            .set(&mut remote, imem(0x100), 1, BreakpointKind::Software)
            .expect("set");
        table.clear(&mut remote, imem(0x100)).expect("clear");
        assert_eq!(table.find(&imem(0x100)), None);
        assert_eq!(
            table.clear(&mut remote, imem(0x100)),
            Err(BreakpointError::NotFound)
        );
    }

    #[test]
    fn failed_clear_keeps_record() {
        let mut remote = LoopbackTarget::new();
        let mut table = BreakpointTable::new();
        table
            .set(&mut remote, imem(0x100), 1, BreakpointKind::Software)
            .expect("set");
        remote.fail_next(RemoteOp::RemoveBreakpoint, RemoteErrorKind::Timeout);
        assert!(table.clear(&mut remote, imem(0x100)).is_err());
        assert!(table.find(&imem(0x100)).is_some());
    }

    #[test]
    fn clear_all_stops_at_first_failure() {
        let mut remote = LoopbackTarget::new();
        let mut table = BreakpointTable::new();
        for addr in [0x100, 0x104, 0x108] {
            table
                .set(&mut remote, imem(addr), 1, BreakpointKind::Software)
                .expect("set");
        }
        remote.fail_nth(RemoteOp::RemoveBreakpoint, 1, RemoteErrorKind::Failed(2));
        assert!(table.clear_all(&mut remote).is_err());
        let left: Vec<u32> = table.iter().map(|r| r.address).collect();
        assert_eq!(left, vec![0x104, 0x108]);
        table.clear_all(&mut remote).expect("second attempt");
        assert!(table.is_empty());
    }

    #[test]
    fn refresh_skips_invalid_slots_and_replaces_table() {
        let mut remote = LoopbackTarget::new();
        let mut table = BreakpointTable::new();
        table
            .set(&mut remote, imem(0x100), 1, BreakpointKind::Software)
            .expect("set");
        remote.set_breakpoint_slots(vec![
            None,
            Some(RemoteBreakpoint {
                space: Space::InstructionMemory,
                address: 0x200,
                pass_count: 3,
                current_count: 1,
                kind: BreakpointKind::Am29050Virtual,
            }),
            None,
        ]);
        table.refresh_from_target(&mut remote).expect("refresh");
        assert_eq!(table.len(), 1);
        let record = table.find(&imem(0x200)).expect("from slot 1");
        assert_eq!(record.id, 1);
        assert_eq!(record.current_count, 1);
        assert_eq!(table.find(&imem(0x100)), None);
    }

    #[test]
    fn refresh_failure_keeps_slots_read_so_far() {
        let mut remote = LoopbackTarget::new();
        remote.set_breakpoint_slots(vec![
            Some(RemoteBreakpoint {
                space: Space::InstructionMemory,
                address: 0x40,
                pass_count: 1,
                current_count: 0,
                kind: BreakpointKind::Software,
            }),
            None,
        ]);
        remote.fail_nth(RemoteOp::BreakpointStatus, 1, RemoteErrorKind::Timeout);
        let mut table = BreakpointTable::new();
        assert!(table.refresh_from_target(&mut remote).is_err());
        assert_eq!(table.len(), 1);
    }
}
