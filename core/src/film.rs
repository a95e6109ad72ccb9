//! Film

use crate::pbrt::*;
use bitflags::bitflags;
use std::collections::BTreeMap;

/// Output passes written alongside the combined RGBA result.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PassType {
    /// Camera depth of the first hit.
    Depth,

    /// Shading normal of the first hit.
    Normal,

    /// Object id of the first hit.
    ObjectId,

    /// Directly visible emission.
    Emission,

    /// Directly visible background.
    Background,

    /// Ambient occlusion.
    AO,

    /// Shadow catcher shadow term.
    Shadow,

    /// Direct diffuse lighting.
    DiffuseDirect,

    /// Indirect diffuse lighting.
    DiffuseIndirect,

    /// Diffuse albedo.
    DiffuseColor,

    /// Direct glossy lighting.
    GlossyDirect,

    /// Indirect glossy lighting.
    GlossyIndirect,

    /// Glossy albedo.
    GlossyColor,

    /// Direct transmission lighting.
    TransmissionDirect,

    /// Indirect transmission lighting.
    TransmissionIndirect,

    /// Transmission albedo.
    TransmissionColor,

    /// Direct subsurface lighting.
    SubsurfaceDirect,

    /// Indirect subsurface lighting.
    SubsurfaceIndirect,

    /// Subsurface albedo.
    SubsurfaceColor,

    /// Direct volume scattering.
    VolumeDirect,

    /// Indirect volume scattering.
    VolumeIndirect,
}

impl PassType {
    /// Every pass in layout order.
    pub const ALL: [PassType; 21] = [
        PassType::Depth,
        PassType::Normal,
        PassType::ObjectId,
        PassType::Emission,
        PassType::Background,
        PassType::AO,
        PassType::Shadow,
        PassType::DiffuseDirect,
        PassType::DiffuseIndirect,
        PassType::DiffuseColor,
        PassType::GlossyDirect,
        PassType::GlossyIndirect,
        PassType::GlossyColor,
        PassType::TransmissionDirect,
        PassType::TransmissionIndirect,
        PassType::TransmissionColor,
        PassType::SubsurfaceDirect,
        PassType::SubsurfaceIndirect,
        PassType::SubsurfaceColor,
        PassType::VolumeDirect,
        PassType::VolumeIndirect,
    ];

    /// Returns the flag bit for this pass.
    pub fn flag(&self) -> PassFlags {
        PassFlags::from_bits_truncate(1 << (*self as u32))
    }

    /// Returns a short name for reporting.
    pub fn name(&self) -> &'static str {
        match self {
            PassType::Depth => "depth",
            PassType::Normal => "normal",
            PassType::ObjectId => "object_id",
            PassType::Emission => "emission",
            PassType::Background => "background",
            PassType::AO => "ao",
            PassType::Shadow => "shadow",
            PassType::DiffuseDirect => "diffuse_direct",
            PassType::DiffuseIndirect => "diffuse_indirect",
            PassType::DiffuseColor => "diffuse_color",
            PassType::GlossyDirect => "glossy_direct",
            PassType::GlossyIndirect => "glossy_indirect",
            PassType::GlossyColor => "glossy_color",
            PassType::TransmissionDirect => "transmission_direct",
            PassType::TransmissionIndirect => "transmission_indirect",
            PassType::TransmissionColor => "transmission_color",
            PassType::SubsurfaceDirect => "subsurface_direct",
            PassType::SubsurfaceIndirect => "subsurface_indirect",
            PassType::SubsurfaceColor => "subsurface_color",
            PassType::VolumeDirect => "volume_direct",
            PassType::VolumeIndirect => "volume_indirect",
        }
    }
}

bitflags! {
    /// Set of enabled passes.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PassFlags: u32 {
        const DEPTH = 1 << 0;
        const NORMAL = 1 << 1;
        const OBJECT_ID = 1 << 2;
        const EMISSION = 1 << 3;
        const BACKGROUND = 1 << 4;
        const AO = 1 << 5;
        const SHADOW = 1 << 6;
        const DIFFUSE_DIRECT = 1 << 7;
        const DIFFUSE_INDIRECT = 1 << 8;
        const DIFFUSE_COLOR = 1 << 9;
        const GLOSSY_DIRECT = 1 << 10;
        const GLOSSY_INDIRECT = 1 << 11;
        const GLOSSY_COLOR = 1 << 12;
        const TRANSMISSION_DIRECT = 1 << 13;
        const TRANSMISSION_INDIRECT = 1 << 14;
        const TRANSMISSION_COLOR = 1 << 15;
        const SUBSURFACE_DIRECT = 1 << 16;
        const SUBSURFACE_INDIRECT = 1 << 17;
        const SUBSURFACE_COLOR = 1 << 18;
        const VOLUME_DIRECT = 1 << 19;
        const VOLUME_INDIRECT = 1 << 20;

        /// First-hit data passes.
        const DATA = Self::DEPTH.bits() | Self::NORMAL.bits() | Self::OBJECT_ID.bits();

        /// Passes that need the per-category radiance split.
        const LIGHT = Self::EMISSION.bits()
            | Self::BACKGROUND.bits()
            | Self::AO.bits()
            | Self::SHADOW.bits()
            | Self::DIFFUSE_DIRECT.bits()
            | Self::DIFFUSE_INDIRECT.bits()
            | Self::DIFFUSE_COLOR.bits()
            | Self::GLOSSY_DIRECT.bits()
            | Self::GLOSSY_INDIRECT.bits()
            | Self::GLOSSY_COLOR.bits()
            | Self::TRANSMISSION_DIRECT.bits()
            | Self::TRANSMISSION_INDIRECT.bits()
            | Self::TRANSMISSION_COLOR.bits()
            | Self::SUBSURFACE_DIRECT.bits()
            | Self::SUBSURFACE_INDIRECT.bits()
            | Self::SUBSURFACE_COLOR.bits()
            | Self::VOLUME_DIRECT.bits()
            | Self::VOLUME_INDIRECT.bits();
    }
}

impl PassFlags {
    /// Returns true if any light pass is enabled.
    pub fn has_light_passes(&self) -> bool {
        self.intersects(Self::LIGHT)
    }

    /// Iterate the enabled passes in layout order.
    pub fn passes(&self) -> impl Iterator<Item = PassType> + '_ {
        PassType::ALL.into_iter().filter(move |p| self.contains(p.flag()))
    }
}

/// Sink for per-sample results, addressed by flattened pixel index.
pub trait OutputBuffer {
    /// Accumulate the combined RGBA result of one sample.
    ///
    /// * `index`  - Flattened pixel index.
    /// * `sample` - Sample number.
    /// * `rgba`   - Radiance and alpha.
    fn write_combined(&mut self, index: usize, sample: u32, rgba: [Float; 4]);

    /// Accumulate an auxiliary pass value.
    ///
    /// * `index` - Flattened pixel index.
    /// * `pass`  - The pass.
    /// * `value` - Value; unused components are zero.
    fn write_pass(&mut self, index: usize, pass: PassType, value: [Float; 4]);

    /// Returns the passes this buffer stores.
    fn passes(&self) -> PassFlags;
}

/// Accumulated pass storage for a rectangular region of the image.
#[derive(Clone, Debug)]
pub struct RenderTile {
    /// Left pixel column.
    pub x0: usize,

    /// Top pixel row.
    pub y0: usize,

    /// Width in pixels.
    pub width: usize,

    /// Height in pixels.
    pub height: usize,

    /// Enabled passes.
    passes: PassFlags,

    /// Running sums of the combined result.
    combined: Vec<[Float; 4]>,

    /// Samples written per pixel.
    sample_count: Vec<u32>,

    /// Running sums of the auxiliary passes.
    aux: BTreeMap<PassType, Vec<[Float; 4]>>,
}

impl RenderTile {
    /// Create a zeroed tile.
    ///
    /// * `x0`     - Left pixel column.
    /// * `y0`     - Top pixel row.
    /// * `width`  - Width in pixels.
    /// * `height` - Height in pixels.
    /// * `passes` - Enabled auxiliary passes.
    pub fn new(x0: usize, y0: usize, width: usize, height: usize, passes: PassFlags) -> Self {
        let n = width * height;
        Self {
            x0,
            y0,
            width,
            height,
            passes,
            combined: vec![[0.0; 4]; n],
            sample_count: vec![0; n],
            aux: passes.passes().map(|p| (p, vec![[0.0; 4]; n])).collect(),
        }
    }

    /// Returns the flattened offset and stride so that
    /// `offset + x + y * stride` addresses image pixel (x, y) in this tile.
    pub fn offset_and_stride(&self) -> (isize, usize) {
        (-((self.x0 + self.y0 * self.width) as isize), self.width)
    }

    /// Returns the accumulated combined sum at a tile-local index.
    ///
    /// * `index` - Flattened tile-local index.
    pub fn combined(&self, index: usize) -> [Float; 4] {
        self.combined[index]
    }

    /// Returns the accumulated pass sum at a tile-local index.
    ///
    /// * `pass`  - The pass.
    /// * `index` - Flattened tile-local index.
    pub fn pass(&self, pass: PassType, index: usize) -> Option<[Float; 4]> {
        self.aux.get(&pass).and_then(|v| v.get(index).copied())
    }

    /// Returns the number of samples written at a tile-local index.
    ///
    /// * `index` - Flattened tile-local index.
    pub fn sample_count(&self, index: usize) -> u32 {
        self.sample_count[index]
    }
}

impl OutputBuffer for RenderTile {
    fn write_combined(&mut self, index: usize, _sample: u32, rgba: [Float; 4]) {
        if let Some(dst) = self.combined.get_mut(index) {
            for (d, s) in dst.iter_mut().zip(rgba) {
                *d += s;
            }
            self.sample_count[index] += 1;
        }
    }

    fn write_pass(&mut self, index: usize, pass: PassType, value: [Float; 4]) {
        if let Some(dst) = self.aux.get_mut(&pass).and_then(|v| v.get_mut(index)) {
            for (d, s) in dst.iter_mut().zip(value) {
                *d += s;
            }
        }
    }

    fn passes(&self) -> PassFlags {
        self.passes
    }
}

/// Full image buffer assembled from rendered tiles.
#[derive(Clone, Debug)]
pub struct RenderBuffer {
    /// Image width.
    pub width: usize,

    /// Image height.
    pub height: usize,

    /// Full-image storage.
    data: RenderTile,
}

impl RenderBuffer {
    /// Create a zeroed buffer.
    ///
    /// * `width`  - Image width.
    /// * `height` - Image height.
    /// * `passes` - Enabled auxiliary passes.
    pub fn new(width: usize, height: usize, passes: PassFlags) -> Self {
        Self {
            width,
            height,
            data: RenderTile::new(0, 0, width, height, passes),
        }
    }

    /// Returns an empty tile covering the given region clipped to the image.
    ///
    /// * `x0`        - Left pixel column.
    /// * `y0`        - Top pixel row.
    /// * `tile_size` - Tile edge length.
    pub fn tile(&self, x0: usize, y0: usize, tile_size: usize) -> RenderTile {
        let w = tile_size.min(self.width.saturating_sub(x0));
        let h = tile_size.min(self.height.saturating_sub(y0));
        RenderTile::new(x0, y0, w, h, self.data.passes)
    }

    /// Add a rendered tile's sums into the image.
    ///
    /// * `tile` - The tile.
    pub fn merge_tile(&mut self, tile: &RenderTile) {
        for ty in 0..tile.height {
            for tx in 0..tile.width {
                let src = tx + ty * tile.width;
                let dst = (tile.x0 + tx) + (tile.y0 + ty) * self.width;
                if tile.x0 + tx >= self.width || dst >= self.data.combined.len() {
                    warn!("Tile pixel ({}, {}) outside the image", tile.x0 + tx, tile.y0 + ty);
                    continue;
                }
                for c in 0..4 {
                    self.data.combined[dst][c] += tile.combined[src][c];
                }
                self.data.sample_count[dst] += tile.sample_count[src];
                for (pass, values) in tile.aux.iter() {
                    if let Some(dv) = self.data.aux.get_mut(pass) {
                        for c in 0..4 {
                            dv[dst][c] += values[src][c];
                        }
                    }
                }
            }
        }
    }

    /// Returns the sample-averaged combined RGBA at pixel (x, y).
    ///
    /// * `x` - Column.
    /// * `y` - Row.
    pub fn pixel(&self, x: usize, y: usize) -> [Float; 4] {
        let i = x + y * self.width;
        let n = self.data.sample_count[i];
        let sum = self.data.combined[i];
        if n == 0 {
            [0.0; 4]
        } else {
            let inv = 1.0 / n as Float;
            [sum[0] * inv, sum[1] * inv, sum[2] * inv, sum[3] * inv]
        }
    }

    /// Returns the sample-averaged value of a pass at pixel (x, y).
    ///
    /// * `pass` - The pass.
    /// * `x`    - Column.
    /// * `y`    - Row.
    pub fn pass_pixel(&self, pass: PassType, x: usize, y: usize) -> Option<[Float; 4]> {
        let i = x + y * self.width;
        let n = max(self.data.sample_count[i], 1) as Float;
        self.data.pass(pass, i).map(|v| [v[0] / n, v[1] / n, v[2] / n, v[3] / n])
    }

    /// Returns the enabled passes.
    pub fn passes(&self) -> PassFlags {
        self.data.passes
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
