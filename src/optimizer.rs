//! # Block Optimizer
//!
//! Coalesces many [`AddressInfo`] entries into as few contiguous reads as
//! the protocol and an efficiency floor allow.
//!
//! Addresses are grouped by `(station, function_code)`, sorted by address,
//! and walked once left to right. Each address either extends the open
//! block or seals it and opens a new one. A merge is refused when the
//! merged span would exceed the block size ceiling, or when the share of
//! requested bytes in the merged span would drop below the minimum
//! efficiency.
//!
//! The pass is greedy and never backtracks. It is not guaranteed to find
//! the fewest blocks, but it bounds request count while never merging
//! into a block below the efficiency floor.
//!
//! The floor governs merges only. A block holding a single member is
//! always formed, even when that member alone sits below the floor: a
//! `Byte` on a register table fills half of its register and yields a
//! ratio of 0.5. The read is needed either way.
//!
//! The ratio is the share of span bytes covered by at least one member.
//! With disjoint members this equals `sum(length_bytes) / span_bytes`.
//! Overlapping or duplicate members count their shared bytes once, which
//! keeps the ratio within `(0, 1]`.
//!
//! Units: register tables (FC03/04/06/16) measure spans in registers and
//! bytes as registers x 2. Coil tables (FC01/02/05/15) measure spans in
//! coils and count each coil as one byte unit.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::address::{AddressInfo, RegisterType};
use crate::constants::DEFAULT_MIN_EFFICIENCY;
use crate::device_limits::DeviceLimits;
use crate::frame::RequestFrame;

/// Tolerance for comparing efficiency ratios.
const RATIO_EPSILON: f64 = 1e-9;

/// Identity of a block's physical exchange: `(station, function, start, length)`.
pub type BlockKey = (u8, u8, u16, u16);

/// A contiguous run of addresses read with one request.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressBlock {
    pub station: u8,
    pub function_code: u8,
    pub start_address: u16,
    /// Span in protocol units (registers or coils).
    pub total_length: u16,
    pub members: Vec<AddressInfo>,
    pub efficiency_ratio: f64,
    /// Bytes of the span covered by at least one member.
    covered_bytes: u32,
    /// Absolute byte position just past the furthest member seen.
    covered_end: u32,
}

impl AddressBlock {
    fn open(first: AddressInfo) -> Self {
        let is_register = !first.register_type().is_bit();
        let (start, end) = byte_range(&first, is_register);
        let mut block = Self {
            station: first.station,
            function_code: first.function_code,
            start_address: first.address,
            total_length: first.unit_span() as u16,
            members: vec![first],
            efficiency_ratio: 0.0,
            covered_bytes: end - start,
            covered_end: end,
        };
        block.efficiency_ratio = block.ratio();
        block
    }

    /// Whether the block reads 16-bit registers.
    pub fn is_register_block(&self) -> bool {
        RegisterType::from_function_code(self.function_code).is_some_and(|t| !t.is_bit())
    }

    /// Exclusive end in protocol units.
    pub fn end(&self) -> u32 {
        u32::from(self.start_address) + u32::from(self.total_length)
    }

    /// Span in byte units: registers x 2, or coils.
    pub fn total_length_bytes(&self) -> u32 {
        if self.is_register_block() {
            u32::from(self.total_length) * 2
        } else {
            u32::from(self.total_length)
        }
    }

    /// Sum of member payload lengths.
    pub fn payload_bytes(&self) -> u32 {
        self.members.iter().map(|m| m.length_bytes).sum()
    }

    /// Offset of `member` in the block's response data: bytes for register
    /// blocks, bits for coil blocks.
    pub fn member_offset(&self, member: &AddressInfo) -> usize {
        let units = usize::from(member.address.saturating_sub(self.start_address));
        if self.is_register_block() {
            units * 2
        } else {
            units
        }
    }

    pub fn key(&self) -> BlockKey {
        (
            self.station,
            self.function_code,
            self.start_address,
            self.total_length,
        )
    }

    /// The read request covering the whole block.
    pub fn to_request(&self) -> RequestFrame {
        RequestFrame::read(
            self.station,
            self.function_code,
            self.start_address,
            self.total_length,
        )
    }

    fn ratio(&self) -> f64 {
        let span = self.total_length_bytes();
        if span == 0 {
            return 0.0;
        }
        f64::from(self.covered_bytes) / f64::from(span)
    }

    /// Grow the block by `next`, or hand the block back untouched when the
    /// merge would break the size ceiling or the efficiency floor.
    fn try_merge(
        mut self,
        next: AddressInfo,
        max_units: u16,
        min_efficiency: f64,
    ) -> Result<Self, (Self, AddressInfo)> {
        let is_register = self.is_register_block();
        let start = u32::from(self.start_address.min(next.address));
        let end = self.end().max(next.end());
        let span = end - start;
        if span > u32::from(max_units) {
            return Err((self, next));
        }

        let (lo, hi) = byte_range(&next, is_register);
        let added = hi.saturating_sub(lo.max(self.covered_end));
        let covered = self.covered_bytes + added;
        let span_bytes = if is_register { span * 2 } else { span };
        let ratio = f64::from(covered) / f64::from(span_bytes);
        if ratio + RATIO_EPSILON < min_efficiency {
            return Err((self, next));
        }

        self.start_address = start as u16;
        self.total_length = span as u16;
        self.covered_bytes = covered;
        self.covered_end = self.covered_end.max(hi);
        self.efficiency_ratio = ratio;
        self.members.push(next);
        Ok(self)
    }
}

/// Absolute byte range of a member.
fn byte_range(info: &AddressInfo, is_register: bool) -> (u32, u32) {
    if is_register {
        let start = u32::from(info.address) * 2;
        (start, start + info.length_bytes)
    } else {
        let start = u32::from(info.address);
        (start, start + info.length_bytes)
    }
}

/// Output of a planning pass.
#[derive(Debug, Clone, Default)]
pub struct OptimizationPlan {
    pub blocks: Vec<AddressBlock>,
    /// Members that alone exceed the block ceiling and cannot be read.
    pub oversized: Vec<AddressInfo>,
}

/// Configurable coalescing pass.
#[derive(Debug, Clone)]
pub struct BlockOptimizer {
    min_efficiency: f64,
    max_block_size: Option<u16>,
    limits: DeviceLimits,
}

impl Default for BlockOptimizer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_EFFICIENCY)
    }
}

impl BlockOptimizer {
    pub fn new(min_efficiency: f64) -> Self {
        Self {
            min_efficiency,
            max_block_size: None,
            limits: DeviceLimits::default(),
        }
    }

    /// Per-function ceilings from the device.
    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Ceiling applied to every group, in protocol units. Never raises a
    /// group above its device limit.
    pub fn with_max_block_size(mut self, max_block_size: u16) -> Self {
        self.max_block_size = Some(max_block_size);
        self
    }

    pub fn min_efficiency(&self) -> f64 {
        self.min_efficiency
    }

    fn max_units(&self, function_code: u8) -> u16 {
        let device = self.limits.max_block_units(function_code);
        self.max_block_size.map_or(device, |m| m.min(device)).max(1)
    }

    /// Coalesce `addresses` into blocks.
    pub fn plan(&self, addresses: &[AddressInfo]) -> OptimizationPlan {
        let mut groups: BTreeMap<(u8, u8), Vec<&AddressInfo>> = BTreeMap::new();
        for info in addresses {
            groups
                .entry((info.station, info.function_code))
                .or_default()
                .push(info);
        }

        let mut plan = OptimizationPlan::default();
        for ((station, function_code), mut members) in groups {
            members.sort_by_key(|m| (m.address, m.end()));
            let max_units = self.max_units(function_code);
            let mut current: Option<AddressBlock> = None;

            for info in members {
                if info.unit_span() > u32::from(max_units) {
                    warn!(
                        "{} spans {} units, above the block ceiling of {}",
                        info.original_address,
                        info.unit_span(),
                        max_units
                    );
                    plan.oversized.push(info.clone());
                    continue;
                }
                current = Some(match current.take() {
                    None => AddressBlock::open(info.clone()),
                    Some(block) => {
                        match block.try_merge(info.clone(), max_units, self.min_efficiency) {
                            Ok(grown) => grown,
                            Err((sealed, next)) => {
                                plan.blocks.push(sealed);
                                AddressBlock::open(next)
                            }
                        }
                    }
                });
            }
            if let Some(block) = current {
                plan.blocks.push(block);
            }
            debug!(
                "station {} FC{:02X}: {} block(s)",
                station,
                function_code,
                plan.blocks
                    .iter()
                    .filter(|b| b.station == station && b.function_code == function_code)
                    .count()
            );
        }
        plan
    }

    pub fn optimize(&self, addresses: &[AddressInfo]) -> Vec<AddressBlock> {
        self.plan(addresses).blocks
    }
}

/// Coalesce with a single ceiling for every group.
///
/// ```rust
/// use modbus_batch::{optimize, parse_address, DataType};
///
/// let addresses: Vec<_> = ["1;3;100", "1;3;101", "1;3;102", "1;3;105"]
///     .iter()
///     .map(|a| parse_address(a, Some(DataType::UInt16), false).unwrap())
///     .collect();
/// let blocks = optimize(&addresses, 0.7, 125);
/// assert_eq!(blocks.len(), 2);
/// ```
pub fn optimize(addresses: &[AddressInfo], min_efficiency: f64, max_block_size: u16) -> Vec<AddressBlock> {
    BlockOptimizer::new(min_efficiency)
        .with_max_block_size(max_block_size)
        .optimize(addresses)
}
