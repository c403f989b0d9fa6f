//! Polygon and texture flag sets as supplied by the engine.

bitflags::bitflags! {
    /// Per-polygon render flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PolyFlags: u32 {
        /// Draws nothing to color, only depth
        const INVISIBLE = 0x0000_0001;
        /// Alpha-tested against palette index zero
        const MASKED = 0x0000_0002;
        /// Additive blending
        const TRANSLUCENT = 0x0000_0004;
        const NOT_SOLID = 0x0000_0008;
        const ENVIRONMENT = 0x0000_0010;
        const SEMISOLID = 0x0000_0020;
        /// Multiplicative blending
        const MODULATED = 0x0000_0040;
        const FAKE_BACKDROP = 0x0000_0080;
        const TWO_SIDED = 0x0000_0100;
        /// Nearest filtering
        const NO_SMOOTH = 0x0000_0800;
        /// Blends by texture alpha
        const ALPHA_BLEND = 0x0002_0000;
        const GOURAUD = 0x0020_0000;
        const UNLIT = 0x0040_0000;
        const MEMORIZED = 0x0100_0000;
        /// Premultiplied-alpha style blending
        const HIGHLIGHTED = 0x1000_0000;
        const RENDER_FOG = 0x4000_0000;
        /// Writes depth
        const OCCLUDE = 0x8000_0000;
    }
}

impl PolyFlags {
    /// Bits that select a blend state.
    pub const BLEND_BITS: PolyFlags = PolyFlags::INVISIBLE
        .union(PolyFlags::MASKED)
        .union(PolyFlags::TRANSLUCENT)
        .union(PolyFlags::MODULATED)
        .union(PolyFlags::ALPHA_BLEND)
        .union(PolyFlags::HIGHLIGHTED);

    /// Bits whose change requires a flush and a GPU state call.
    pub const RELEVANT: PolyFlags = PolyFlags::BLEND_BITS
        .union(PolyFlags::OCCLUDE)
        .union(PolyFlags::NO_SMOOTH);
}

bitflags::bitflags! {
    /// Per-texture flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureFlags: u32 {
        /// Texture data changes in realtime
        const REALTIME = 0x0000_0008;
        /// Procedurally generated
        const PARAMETRIC = 0x0000_0010;
        /// Realtime texture changed since it was last uploaded
        const REALTIME_CHANGED = 0x0000_0020;
        const REALTIME_PALETTE = 0x0000_0040;
    }
}

impl TextureFlags {
    /// Textures whose GPU copy is updated in place.
    pub fn is_dynamic(self) -> bool {
        self.intersects(
            TextureFlags::REALTIME | TextureFlags::PARAMETRIC | TextureFlags::REALTIME_CHANGED,
        )
    }
}
