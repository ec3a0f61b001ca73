// src/Decoder/target.rs
use std::collections::HashMap;

/// Default byte budget of a [`BufferTarget`].
pub const DEFAULT_TARGET_BYTES: usize = 64 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("resource {0} does not exist")]
    UnknownResource(u32),
    #[error("resource {0} already exists")]
    ResourceExists(u32),
    #[error("range {offset}+{size} exceeds resource {resource}")]
    OutOfRange { resource: u32, offset: u32, size: u32 },
    #[error("allocating {requested} bytes would exceed the {limit} byte budget")]
    OutOfMemory { requested: usize, limit: usize },
}

#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    Blend = 0,
    DepthTest = 1,
    StencilTest = 2,
    CullFace = 3,
    ScissorTest = 4,
}

impl TryFrom<u32> for Capability {
    type Error = u32;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Blend),
            1 => Ok(Self::DepthTest),
            2 => Ok(Self::StencilTest),
            3 => Ok(Self::CullFace),
            4 => Ok(Self::ScissorTest),
            other => Err(other),
        }
    }
}

#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveMode {
    Points = 0,
    Lines = 1,
    LineStrip = 2,
    Triangles = 3,
    TriangleStrip = 4,
    TriangleFan = 5,
}

impl TryFrom<u32> for PrimitiveMode {
    type Error = u32;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Points),
            1 => Ok(Self::Lines),
            2 => Ok(Self::LineStrip),
            3 => Ok(Self::Triangles),
            4 => Ok(Self::TriangleStrip),
            5 => Ok(Self::TriangleFan),
            other => Err(other),
        }
    }
}

#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// Non-indexed draw.
    None = 0,
    U16 = 1,
    U32 = 2,
}

impl TryFrom<u32> for IndexFormat {
    type Error = u32;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::None),
            1 => Ok(Self::U16),
            2 => Ok(Self::U32),
            other => Err(other),
        }
    }
}

/// Which planes a `Clear` touches.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClearMask(u32);

impl ClearMask {
    pub const COLOR: u32 = 1 << 0;
    pub const DEPTH: u32 = 1 << 1;
    pub const STENCIL: u32 = 1 << 2;
    pub const ALL: u32 = Self::COLOR | Self::DEPTH | Self::STENCIL;

    /// `None` for an empty mask or one with unknown bits.
    pub fn new(bits: u32) -> Option<Self> {
        if bits == 0 || bits & !Self::ALL != 0 {
            return None;
        }
        Some(Self(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, plane: u32) -> bool {
        self.0 & plane == plane
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DrawCall {
    pub mode: PrimitiveMode,
    pub index_format: IndexFormat,
    pub first: u32,
    pub count: u32,
}

/// Whatever consumes decoded commands.
///
/// Arguments reaching these methods have already passed bit-field and
/// shared-memory validation. A `TargetError` rejects the command as invalid.
pub trait ExecutionTarget {
    fn set_capability(&mut self, cap: Capability, enabled: bool);

    fn clear(&mut self, mask: ClearMask, rgba: [f32; 4]);

    fn draw(&mut self, call: DrawCall);

    fn create_resource(&mut self, id: u32, size: u32) -> Result<(), TargetError>;

    fn destroy_resource(&mut self, id: u32) -> Result<(), TargetError>;

    fn write_resource(&mut self, id: u32, offset: u32, data: &[u8]) -> Result<(), TargetError>;

    /// Copy `size` bytes at `offset` out of resource `id`.
    fn read_resource(&mut self, id: u32, offset: u32, size: u32) -> Result<Vec<u8>, TargetError>;
}

/// In-memory target: resources are byte vectors and state changes are recorded.
#[derive(Debug, Clone)]
pub struct BufferTarget {
    resources: HashMap<u32, Vec<u8>>,
    allocated: usize,
    max_bytes: usize,
    capabilities: u32,
    clear_color: [f32; 4],
    last_clear: Option<ClearMask>,
    draw_count: u64,
    last_draw: Option<DrawCall>,
    side_effects: u64,
}

impl Default for BufferTarget {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_BYTES)
    }
}

impl BufferTarget {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            resources: HashMap::new(),
            allocated: 0,
            max_bytes,
            capabilities: 0,
            clear_color: [0.0; 4],
            last_clear: None,
            draw_count: 0,
            last_draw: None,
            side_effects: 0,
        }
    }

    pub fn resource(&self, id: u32) -> Option<&[u8]> {
        self.resources.get(&id).map(Vec::as_slice)
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    pub fn is_enabled(&self, cap: Capability) -> bool {
        self.capabilities & (1 << cap as u32) != 0
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn last_clear(&self) -> Option<ClearMask> {
        self.last_clear
    }

    pub fn draw_count(&self) -> u64 {
        self.draw_count
    }

    pub fn last_draw(&self) -> Option<DrawCall> {
        self.last_draw
    }

    /// Number of calls that changed target state. Rejected calls never count.
    pub fn side_effects(&self) -> u64 {
        self.side_effects
    }

    fn range(&self, id: u32, offset: u32, size: usize) -> Result<std::ops::Range<usize>, TargetError> {
        let res = self.resources.get(&id).ok_or(TargetError::UnknownResource(id))?;
        let start = offset as usize;
        let out_of_range = TargetError::OutOfRange {
            resource: id,
            offset,
            size: u32::try_from(size).unwrap_or(u32::MAX),
        };
        let end = start.checked_add(size).ok_or(out_of_range)?;
        if end > res.len() {
            return Err(out_of_range);
        }
        Ok(start..end)
    }
}

impl ExecutionTarget for BufferTarget {
    fn set_capability(&mut self, cap: Capability, enabled: bool) {
        let bit = 1 << cap as u32;
        if enabled {
            self.capabilities |= bit;
        } else {
            self.capabilities &= !bit;
        }
        self.side_effects += 1;
    }

    fn clear(&mut self, mask: ClearMask, rgba: [f32; 4]) {
        if mask.contains(ClearMask::COLOR) {
            self.clear_color = rgba;
        }
        self.last_clear = Some(mask);
        self.side_effects += 1;
    }

    fn draw(&mut self, call: DrawCall) {
        self.draw_count += 1;
        self.last_draw = Some(call);
        self.side_effects += 1;
    }

    fn create_resource(&mut self, id: u32, size: u32) -> Result<(), TargetError> {
        if self.resources.contains_key(&id) {
            return Err(TargetError::ResourceExists(id));
        }
        let requested = size as usize;
        if self.allocated.saturating_add(requested) > self.max_bytes {
            return Err(TargetError::OutOfMemory {
                requested,
                limit: self.max_bytes,
            });
        }
        self.resources.insert(id, vec![0; requested]);
        self.allocated += requested;
        self.side_effects += 1;
        Ok(())
    }

    fn destroy_resource(&mut self, id: u32) -> Result<(), TargetError> {
        let res = self.resources.remove(&id).ok_or(TargetError::UnknownResource(id))?;
        self.allocated -= res.len();
        self.side_effects += 1;
        Ok(())
    }

    fn write_resource(&mut self, id: u32, offset: u32, data: &[u8]) -> Result<(), TargetError> {
        let range = self.range(id, offset, data.len())?;
        if let Some(res) = self.resources.get_mut(&id) {
            res[range].copy_from_slice(data);
        }
        self.side_effects += 1;
        Ok(())
    }

    fn read_resource(&mut self, id: u32, offset: u32, size: u32) -> Result<Vec<u8>, TargetError> {
        let range = self.range(id, offset, size as usize)?;
        Ok(self.resources.get(&id).map(|r| r[range].to_vec()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_enforced() {
        let mut t = BufferTarget::new(16);
        t.create_resource(1, 12).unwrap();
        assert_eq!(
            t.create_resource(2, 8),
            Err(TargetError::OutOfMemory { requested: 8, limit: 16 })
        );
        t.destroy_resource(1).unwrap();
        t.create_resource(2, 16).unwrap();
        assert_eq!(t.allocated_bytes(), 16);
    }

    #[test]
    fn write_past_end_is_rejected() {
        let mut t = BufferTarget::default();
        t.create_resource(7, 8).unwrap();
        let before = t.side_effects();
        assert!(matches!(
            t.write_resource(7, 6, &[1, 2, 3]),
            Err(TargetError::OutOfRange { .. })
        ));
        assert_eq!(t.side_effects(), before);
        t.write_resource(7, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(t.read_resource(7, 2, 4).unwrap(), vec![0, 0, 1, 2]);
    }
}
