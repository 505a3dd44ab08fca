//! Per-slot frame state.
//!
//! A frame slot cycles `Idle -> Recording -> Submitted -> Readback -> Idle`.
//! The tracker refuses any other move, so a slot is never re-recorded while
//! the device may still write its target.

use gpumtv_core::Sector;
use gpumtv_gpu::{GpuError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameState {
    #[default]
    Idle,
    Recording,
    Submitted,
    Readback,
}

/// State of one frame slot and the sector it is working on.
#[derive(Debug, Default)]
pub struct FrameTracker {
    state: FrameState,
    sector: Option<Sector>,
}

impl FrameTracker {
    pub const fn new() -> Self {
        Self {
            state: FrameState::Idle,
            sector: None,
        }
    }

    pub const fn state(&self) -> FrameState {
        self.state
    }

    pub const fn sector(&self) -> Option<Sector> {
        self.sector
    }

    pub fn is_idle(&self) -> bool {
        self.state == FrameState::Idle
    }

    /// Claim the slot for `sector`.
    pub fn begin_recording(&mut self, sector: Sector) -> Result<()> {
        self.require(FrameState::Idle, "begin recording")?;
        self.state = FrameState::Recording;
        self.sector = Some(sector);
        Ok(())
    }

    pub fn mark_submitted(&mut self) -> Result<()> {
        self.require(FrameState::Recording, "submit")?;
        self.state = FrameState::Submitted;
        Ok(())
    }

    /// The fence has signaled; returns the sector whose data is ready.
    pub fn begin_readback(&mut self) -> Result<Sector> {
        self.require(FrameState::Submitted, "read back")?;
        let sector = self
            .sector
            .ok_or_else(|| GpuError::InvalidState("submitted slot has no sector".to_string()))?;
        self.state = FrameState::Readback;
        Ok(sector)
    }

    pub fn finish_readback(&mut self) -> Result<()> {
        self.require(FrameState::Readback, "finish readback")?;
        self.state = FrameState::Idle;
        self.sector = None;
        Ok(())
    }

    /// Return a slot whose recording failed to idle.
    pub fn abandon_recording(&mut self) {
        if self.state == FrameState::Recording {
            self.state = FrameState::Idle;
            self.sector = None;
        }
    }

    fn require(&self, state: FrameState, action: &str) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(GpuError::InvalidState(format!(
                "cannot {action} a frame slot in state {:?}",
                self.state
            )))
        }
    }
}
