//! Versioned value index - overlay switch and write-down
//!
//! A long-keyed value store over a pluggable base, with three observable
//! states:
//!
//! | State         | get         | put     | put_if_equal      |
//! |---------------|-------------|---------|-------------------|
//! | Base          | base        | base    | base              |
//! | OverlayActive | overlay∪base| overlay | overlay (merged)  |
//! | WriteDown     | overlay∪base| overlay | overlay (merged)  |
//!
//! `set_overlay(true)` activates the overlay so a snapshot consumer can
//! stream a consistent base while writers continue. `set_overlay(false)`
//! merges the overlay back down on the calling thread:
//!
//! 1. Flip to WriteDown (a second disable meeting this state is an error).
//! 2. Drain passes under the shared lock: each buffered slot is moved into
//!    the base while its overlay entry lock is held, so readers never see
//!    a gap and conditional writes never see a half-moved slot. Writers
//!    keep landing in the overlay and are caught by the next pass.
//! 3. A final drain under the exclusive lock, with in-flight writers
//!    excluded, then the flip to Base and the overlay is dropped.
//!
//! A base write failure rolls the state back to OverlayActive with the
//! already-moved slots safely in the base; the caller may retry.

use std::sync::RwLock;

use dashmap::mapref::entry::Entry;

use super::errors::{IndexError, IndexResult};
use super::overlay::OverlayBuffer;
use super::BaseIndex;

/// Observable state of the overlay switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayMode {
    /// Writes and reads go straight to the base.
    Base,
    /// Writes are buffered in the overlay; reads merge.
    OverlayActive,
    /// A write-down is merging the overlay into the base; writes still
    /// land in the overlay and reads still merge.
    WriteDown,
}

#[derive(Debug)]
struct OverlayState {
    mode: OverlayMode,
    overlay: Option<OverlayBuffer>,
}

/// A base index with an overlay buffering switch.
#[derive(Debug)]
pub struct VersionedValueIndex<B: BaseIndex> {
    base: B,
    state: RwLock<OverlayState>,
}

impl<B: BaseIndex> VersionedValueIndex<B> {
    /// Wraps `base` with the overlay switch in the Base state.
    pub fn new(base: B) -> Self {
        Self {
            base,
            state: RwLock::new(OverlayState {
                mode: OverlayMode::Base,
                overlay: None,
            }),
        }
    }

    /// The current observable state.
    pub fn mode(&self) -> OverlayMode {
        self.state.read().expect("overlay state lock poisoned").mode
    }

    /// Reads the value at `index` from the current view.
    pub fn get(&self, index: u64) -> IndexResult<i64> {
        let state = self.state.read().expect("overlay state lock poisoned");
        match &state.overlay {
            Some(overlay) => overlay.get(index, &self.base),
            None => self.base.get(index),
        }
    }

    /// Writes the value at `index` into the current target.
    pub fn put(&self, index: u64, value: i64) -> IndexResult<()> {
        let state = self.state.read().expect("overlay state lock poisoned");
        match &state.overlay {
            Some(overlay) => {
                overlay.put(index, value);
                Ok(())
            }
            None => self.base.put(index, value),
        }
    }

    /// Conditionally writes at `index` if the current view equals
    /// `expected`.
    pub fn put_if_equal(&self, index: u64, expected: i64, new_value: i64) -> IndexResult<bool> {
        let state = self.state.read().expect("overlay state lock poisoned");
        match &state.overlay {
            Some(overlay) => overlay.put_if_equal(index, expected, new_value, &self.base),
            None => self.base.put_if_equal(index, expected, new_value),
        }
    }

    /// Logical size of the current view.
    pub fn size(&self) -> u64 {
        let state = self.state.read().expect("overlay state lock poisoned");
        match &state.overlay {
            Some(overlay) => overlay.size(&self.base),
            None => self.base.size(),
        }
    }

    /// Direct access to the base, for snapshot consumers that stream it
    /// while the overlay absorbs writes.
    pub fn base(&self) -> &B {
        &self.base
    }

    /// Switches overlay buffering on or off.
    ///
    /// Enabling from Base activates an empty overlay; enabling an active
    /// overlay is a no-op. Disabling from OverlayActive drives the
    /// write-down to completion on this thread; disabling from Base is a
    /// no-op. Either transition meeting a write-down in flight reports
    /// `OverlayMisuse`.
    pub fn set_overlay(&self, enabled: bool) -> IndexResult<()> {
        if enabled {
            let mut state = self.state.write().expect("overlay state lock poisoned");
            return match state.mode {
                OverlayMode::Base => {
                    state.overlay = Some(OverlayBuffer::new());
                    state.mode = OverlayMode::OverlayActive;
                    Ok(())
                }
                OverlayMode::OverlayActive => Ok(()),
                OverlayMode::WriteDown => Err(IndexError::OverlayMisuse),
            };
        }

        {
            let mut state = self.state.write().expect("overlay state lock poisoned");
            match state.mode {
                OverlayMode::Base => return Ok(()),
                OverlayMode::WriteDown => return Err(IndexError::OverlayMisuse),
                OverlayMode::OverlayActive => state.mode = OverlayMode::WriteDown,
            }
        }
        self.write_down()
    }

    /// Moves every buffered slot into the base. Concurrent writers are
    /// only ever blocked per-slot, except during the short final drain.
    fn write_down(&self) -> IndexResult<()> {
        // Shared-lock passes: writers keep going; anything they add after a
        // slot was moved shows up again and is moved by a later pass.
        loop {
            let state = self.state.read().expect("overlay state lock poisoned");
            let overlay = state
                .overlay
                .as_ref()
                .expect("overlay present during write-down");
            let indices = overlay.indices();
            if indices.is_empty() {
                break;
            }
            for index in indices {
                if let Err(err) = self.move_slot(overlay, index) {
                    drop(state);
                    return Err(self.abort_write_down(index, err));
                }
            }
        }

        // Exclusive drain: no writer holds the state lock, so the overlay
        // can no longer grow. Flip only once it is empty.
        let mut state = self.state.write().expect("overlay state lock poisoned");
        if let Some(overlay) = &state.overlay {
            for index in overlay.indices() {
                if let Err(err) = self.move_slot(overlay, index) {
                    drop(state);
                    return Err(self.abort_write_down(index, err));
                }
            }
        }
        state.overlay = None;
        state.mode = OverlayMode::Base;
        Ok(())
    }

    /// Moves one slot from the overlay into the base. The overlay entry
    /// lock is held across the base write and the removal, so merged reads
    /// and conditional writes on this slot stay atomic.
    fn move_slot(&self, overlay: &OverlayBuffer, index: u64) -> IndexResult<()> {
        if let Entry::Occupied(occupied) = overlay.slots().entry(index) {
            self.base.put(index, *occupied.get())?;
            occupied.remove();
        }
        Ok(())
    }

    fn abort_write_down(&self, index: u64, source: IndexError) -> IndexError {
        let mut state = self.state.write().expect("overlay state lock poisoned");
        state.mode = OverlayMode::OverlayActive;
        IndexError::WriteDownFailed {
            index,
            source: Box::new(source),
        }
    }
}
