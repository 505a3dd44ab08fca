//! GPU timestamp queries.
//!
//! Each frame slot owns a begin/end pair of queries. Results are read only
//! after the slot's fence has signaled, so a missing result means the
//! queue does not support timestamps rather than that work is pending.

use std::time::Duration;

use crate::error::{GpuError, Result};
use ash::vk;

/// A pool of timestamp queries, two per frame slot.
pub struct TimestampQueries {
    pool: vk::QueryPool,
    pairs: u32,
    valid_bits: u32,
    period_ns: f32,
}

impl TimestampQueries {
    /// Create `pairs` begin/end query pairs.
    ///
    /// `valid_bits` is the queue family's `timestampValidBits` and
    /// `period_ns` the device's `timestampPeriod`.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        pairs: u32,
        valid_bits: u32,
        period_ns: f32,
    ) -> Result<Self> {
        if valid_bits == 0 {
            return Err(GpuError::InvalidState(
                "queue family does not support timestamps".to_string(),
            ));
        }
        let info = vk::QueryPoolCreateInfo::default()
            .query_type(vk::QueryType::TIMESTAMP)
            .query_count(pairs * 2);

        Ok(Self {
            pool: device.create_query_pool(&info, None)?,
            pairs,
            valid_bits,
            period_ns,
        })
    }

    fn first_query(&self, pair: u32) -> Result<u32> {
        if pair >= self.pairs {
            return Err(GpuError::InvalidState(format!(
                "timestamp pair {pair} out of {}",
                self.pairs
            )));
        }
        Ok(pair * 2)
    }

    /// Reset `pair` and write its begin timestamp once all prior commands
    /// have started.
    ///
    /// # Safety
    /// `cmd` must be recording outside a render pass instance.
    pub unsafe fn cmd_begin(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        pair: u32,
    ) -> Result<()> {
        let first = self.first_query(pair)?;
        device.cmd_reset_query_pool(cmd, self.pool, first, 2);
        device.cmd_write_timestamp2(cmd, vk::PipelineStageFlags2::TOP_OF_PIPE, self.pool, first);
        Ok(())
    }

    /// Write the end timestamp of `pair` after all graphics work.
    ///
    /// # Safety
    /// `cmd` must be recording and `cmd_begin` recorded for `pair` first.
    pub unsafe fn cmd_end(&self, device: &ash::Device, cmd: vk::CommandBuffer, pair: u32) -> Result<()> {
        let first = self.first_query(pair)?;
        device.cmd_write_timestamp2(
            cmd,
            vk::PipelineStageFlags2::ALL_GRAPHICS,
            self.pool,
            first + 1,
        );
        Ok(())
    }

    /// Device time between the begin and end timestamps of `pair`, or
    /// `None` if the results are not available.
    ///
    /// # Safety
    /// The device must be valid and the submission that wrote `pair` must
    /// have completed.
    pub unsafe fn elapsed(&self, device: &ash::Device, pair: u32) -> Result<Option<Duration>> {
        let first = self.first_query(pair)?;
        let mut ticks = [0u64; 2];
        match device.get_query_pool_results(
            self.pool,
            first,
            &mut ticks,
            vk::QueryResultFlags::TYPE_64,
        ) {
            Ok(()) => Ok(Some(ticks_to_duration(
                ticks[0],
                ticks[1],
                self.valid_bits,
                self.period_ns,
            ))),
            Err(vk::Result::NOT_READY) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// # Safety
    /// The device must be valid and no query of the pool may be pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_query_pool(self.pool, None);
    }
}

/// Convert a begin/end tick pair into wall time.
///
/// Only the low `valid_bits` of a timestamp are meaningful, and the counter
/// may wrap between the two writes.
pub fn ticks_to_duration(begin: u64, end: u64, valid_bits: u32, period_ns: f32) -> Duration {
    let mask = if valid_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << valid_bits) - 1
    };
    let ticks = (end & mask).wrapping_sub(begin & mask) & mask;
    Duration::from_nanos((ticks as f64 * f64::from(period_ns)).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_scale_by_period() {
        assert_eq!(ticks_to_duration(100, 1100, 64, 1.0), Duration::from_micros(1));
        assert_eq!(ticks_to_duration(0, 1000, 64, 2.5), Duration::from_nanos(2500));
        assert_eq!(ticks_to_duration(7, 7, 64, 83.3), Duration::ZERO);
    }

    #[test]
    fn counter_wraps_within_valid_bits() {
        // 36-bit counter wrapping from near its top back to 10
        let top = (1u64 << 36) - 5;
        assert_eq!(ticks_to_duration(top, 10, 36, 1.0), Duration::from_nanos(15));

        // Garbage above the valid bits is ignored
        let noise = 0xABCD << 48;
        assert_eq!(
            ticks_to_duration(noise | 40, noise | 90, 48, 1.0),
            Duration::from_nanos(50)
        );
    }
}
