//! Engine draw entry points
//!
//! Every primitive the engine submits is one [`Primitive`] variant. All variants go through the
//! same sequence: cache textures, apply state, bind textures, append vertices. None of them
//! touches the GPU except through those steps.

use glam::{Vec2, Vec3, Vec4};

use crate::batch::{BatchAccumulator, IndexPattern};
use crate::converter::{TextureConverter, TextureInfo};
use crate::error::RenderError;
use crate::flags::PolyFlags;
use crate::gpu::GpuBackend;
use crate::state::StateCoordinator;
use crate::texture_cache::{
    CacheId, ExternalLayer, LayerSet, TextureCache, TextureMetadata, TexturePass,
};
use crate::vertex::{GouraudVertex, LineVertex, PointVertex, SurfaceVertex, TileVertex};

/// Texture-space frame of a surface facet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacetCoords {
    pub origin: Vec3,
    pub x_axis: Vec3,
    pub y_axis: Vec3,
}

/// Textures of a world surface. Only the diffuse texture is required.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceTextures<'a> {
    pub diffuse: &'a TextureInfo<'a>,
    pub light_map: Option<&'a TextureInfo<'a>>,
    pub detail: Option<&'a TextureInfo<'a>>,
    pub fog_map: Option<&'a TextureInfo<'a>>,
    pub macro_texture: Option<&'a TextureInfo<'a>>,
}

/// Multi-pass world surface: convex polygons sharing one texture frame
#[derive(Debug, Clone, Copy)]
pub struct ComplexSurface<'a> {
    pub textures: SurfaceTextures<'a>,
    pub facet: FacetCoords,
    /// Convex polygons in camera space. Polygons with fewer than 3 points are skipped.
    pub polys: &'a [&'a [Vec3]],
    pub flags: PolyFlags,
}

/// Lit fan point of a mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GouraudPoint {
    pub pos: Vec3,
    /// Texel coordinates, normalized by the texture's metadata
    pub uv: Vec2,
    pub light: Vec3,
    pub fog: Vec4,
}

/// Lit triangle fan
#[derive(Debug, Clone, Copy)]
pub struct GouraudPolygon<'a> {
    pub texture: Option<&'a TextureInfo<'a>>,
    pub points: &'a [GouraudPoint],
    pub flags: PolyFlags,
}

/// Screen-space textured rectangle
#[derive(Debug, Clone, Copy)]
pub struct Tile<'a> {
    pub texture: &'a TextureInfo<'a>,
    /// x, y, width, height in pixels
    pub rect: Vec4,
    /// u, v, width, height in texels
    pub uv_rect: Vec4,
    pub z: f32,
    pub color: Vec3,
    pub flags: PolyFlags,
}

/// Camera-space line segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub from: Vec3,
    pub to: Vec3,
    pub color: Vec3,
    pub flags: PolyFlags,
}

/// Screen-space untextured rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// x1, y1, x2, y2 in pixels
    pub rect: Vec4,
    pub z: f32,
    pub color: Vec3,
    pub flags: PolyFlags,
}

/// One engine draw call
#[derive(Debug, Clone, Copy)]
pub enum Primitive<'a> {
    ComplexSurface(ComplexSurface<'a>),
    GouraudPolygon(GouraudPolygon<'a>),
    Tile(Tile<'a>),
    Line(Line),
    Point(Point),
}

impl Primitive<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::ComplexSurface(_) => "complex surface",
            Primitive::GouraudPolygon(_) => "gouraud polygon",
            Primitive::Tile(_) => "tile",
            Primitive::Line(_) => "line",
            Primitive::Point(_) => "point",
        }
    }
}

/// Borrowed components one draw runs through
pub(crate) struct Pipeline<'a, G: ?Sized, C: ?Sized> {
    pub cache: &'a mut TextureCache,
    pub batch: &'a mut BatchAccumulator,
    pub state: &'a mut StateCoordinator,
    pub gpu: &'a mut G,
    pub converter: &'a mut C,
}

impl<G, C> Pipeline<'_, G, C>
where
    G: GpuBackend + ?Sized,
    C: TextureConverter + ?Sized,
{
    pub fn submit(&mut self, primitive: &Primitive<'_>) -> Result<(), RenderError> {
        match primitive {
            Primitive::ComplexSurface(surface) => self.complex_surface(surface),
            Primitive::GouraudPolygon(polygon) => self.gouraud_polygon(polygon),
            Primitive::Tile(tile) => self.tile(tile),
            Primitive::Line(line) => self.line(line),
            Primitive::Point(point) => self.point(point),
        }
    }

    /// Cache a texture and report the poly flags it forces.
    fn precache(
        &mut self,
        info: &TextureInfo<'_>,
        flags: PolyFlags,
    ) -> Result<PolyFlags, RenderError> {
        self.cache
            .ensure_cached(info, flags, self.converter, self.batch, self.gpu)?;
        Ok(self
            .cache
            .metadata(info.cache_id)
            .map_or(PolyFlags::empty(), |m| m.custom_poly_flags))
    }

    fn bind(
        &mut self,
        cache_id: CacheId,
        pass: TexturePass,
        layer: Option<ExternalLayer>,
    ) -> Result<Option<TextureMetadata>, RenderError> {
        self.cache
            .bind(cache_id, pass, layer, self.batch, self.gpu)
    }

    /// Cache and bind an optional texture to its own pass.
    fn bind_optional(
        &mut self,
        info: Option<&TextureInfo<'_>>,
        pass: TexturePass,
    ) -> Result<Option<TextureMetadata>, RenderError> {
        let Some(info) = info else {
            return Ok(None);
        };
        self.precache(info, PolyFlags::empty())?;
        self.bind(info.cache_id, pass, None)
    }

    fn complex_surface(&mut self, surface: &ComplexSurface<'_>) -> Result<(), RenderError> {
        let textures = &surface.textures;
        let custom = self.precache(textures.diffuse, surface.flags)?;
        let flags = self.state.apply(surface.flags | custom, self.batch, self.gpu)?;

        let diffuse_id = textures.diffuse.cache_id;
        let diffuse = self.bind(diffuse_id, TexturePass::Diffuse, None)?;
        let layers = diffuse.map_or(LayerSet::empty(), |m| m.layers);

        let light = self.bind_optional(textures.light_map, TexturePass::Light)?;
        let (detail_info, detail) = if layers.contains(LayerSet::DETAIL) {
            let detail = self.bind(diffuse_id, TexturePass::Detail, Some(ExternalLayer::Detail))?;
            (Some(textures.diffuse), detail)
        } else {
            let detail = self.bind_optional(textures.detail, TexturePass::Detail)?;
            (textures.detail, detail)
        };
        let fog = self.bind_optional(textures.fog_map, TexturePass::Fog)?;
        let macro_texture = self.bind_optional(textures.macro_texture, TexturePass::Macro)?;

        let mut passes = 0;
        for (pass, metadata) in [
            (TexturePass::Diffuse, diffuse),
            (TexturePass::Light, light),
            (TexturePass::Detail, detail),
            (TexturePass::Fog, fog),
            (TexturePass::Macro, macro_texture),
        ] {
            if metadata.is_some() {
                passes |= pass.bit();
            }
        }
        for layer in [ExternalLayer::Bump, ExternalLayer::Height] {
            if layers.contains(layer.bit())
                && self
                    .bind(diffuse_id, layer.pass(), Some(layer))?
                    .is_some()
            {
                passes |= layer.pass().bit();
            }
        }

        // Light and fog maps are sampled at texel centers
        let mappings = [
            TexMapping::new(Some(textures.diffuse), diffuse, false),
            TexMapping::new(textures.light_map, light, true),
            TexMapping::new(detail_info, detail, false),
            TexMapping::new(textures.fog_map, fog, true),
            TexMapping::new(textures.macro_texture, macro_texture, false),
        ];

        let facet = &surface.facet;
        let u_dot = facet.x_axis.dot(facet.origin);
        let v_dot = facet.y_axis.dot(facet.origin);

        for poly in surface.polys.iter().filter(|poly| poly.len() >= 3) {
            let slots = self
                .batch
                .append::<SurfaceVertex, _>(self.gpu, IndexPattern::Fan(poly.len() as u32))?;
            for (v, point) in slots.iter_mut().zip(poly.iter()) {
                let u = facet.x_axis.dot(*point) - u_dot;
                let w = facet.y_axis.dot(*point) - v_dot;
                v.pos = point.to_array();
                for (tex, mapping) in v.tex.iter_mut().zip(&mappings) {
                    *tex = mapping.map(u, w);
                }
                v.passes = passes;
                v.flags = flags.bits();
            }
        }
        Ok(())
    }

    fn gouraud_polygon(&mut self, polygon: &GouraudPolygon<'_>) -> Result<(), RenderError> {
        if polygon.points.len() < 3 {
            return Ok(());
        }
        let custom = match polygon.texture {
            Some(info) => self.precache(info, polygon.flags)?,
            None => PolyFlags::empty(),
        };
        let flags = self
            .state
            .apply(polygon.flags | custom, self.batch, self.gpu)?;
        let metadata = match polygon.texture {
            Some(info) => self.bind(info.cache_id, TexturePass::Diffuse, None)?,
            None => {
                self.cache
                    .unbind(TexturePass::Diffuse, self.batch, self.gpu)?;
                None
            }
        }
        .unwrap_or_default();

        let slots = self.batch.append::<GouraudVertex, _>(
            self.gpu,
            IndexPattern::Fan(polygon.points.len() as u32),
        )?;
        for (v, point) in slots.iter_mut().zip(polygon.points) {
            v.pos = point.pos.to_array();
            v.uv = [point.uv.x * metadata.mult_u, point.uv.y * metadata.mult_v];
            v.color = point.light.extend(1.0).to_array();
            v.fog = point.fog.to_array();
            v.flags = flags.bits();
        }
        Ok(())
    }

    fn tile(&mut self, tile: &Tile<'_>) -> Result<(), RenderError> {
        let custom = self.precache(tile.texture, tile.flags)?;
        let flags = self.state.apply(tile.flags | custom, self.batch, self.gpu)?;
        let metadata = self
            .bind(tile.texture.cache_id, TexturePass::Diffuse, None)?
            .unwrap_or_default();

        let [x, y, w, h] = tile.rect.to_array();
        let [u, v, uw, vh] = tile.uv_rect.to_array();
        let corners = [
            ([x, y], [u, v]),
            ([x + w, y], [u + uw, v]),
            ([x + w, y + h], [u + uw, v + vh]),
            ([x, y + h], [u, v + vh]),
        ];
        let color = tile.color.extend(1.0).to_array();

        let slots = self
            .batch
            .append::<TileVertex, _>(self.gpu, IndexPattern::Quad)?;
        for (vertex, ([px, py], [tu, tv])) in slots.iter_mut().zip(corners) {
            vertex.pos = [px, py, tile.z];
            vertex.uv = [tu * metadata.mult_u, tv * metadata.mult_v];
            vertex.color = color;
            vertex.flags = flags.bits();
        }
        Ok(())
    }

    fn line(&mut self, line: &Line) -> Result<(), RenderError> {
        let flags = self.state.apply(line.flags, self.batch, self.gpu)?;
        let color = line.color.extend(1.0).to_array();
        let slots = self
            .batch
            .append::<LineVertex, _>(self.gpu, IndexPattern::Lines(2))?;
        for (v, pos) in slots.iter_mut().zip([line.from, line.to]) {
            v.pos = pos.to_array();
            v.color = color;
            v.flags = flags.bits();
        }
        Ok(())
    }

    fn point(&mut self, point: &Point) -> Result<(), RenderError> {
        let flags = self.state.apply(point.flags, self.batch, self.gpu)?;
        let [x1, y1, x2, y2] = point.rect.to_array();
        let color = point.color.extend(1.0).to_array();
        let slots = self
            .batch
            .append::<PointVertex, _>(self.gpu, IndexPattern::Quad)?;
        for (v, [x, y]) in slots.iter_mut().zip([[x1, y1], [x2, y1], [x2, y2], [x1, y2]]) {
            v.pos = [x, y, point.z];
            v.color = color;
            v.flags = flags.bits();
        }
        Ok(())
    }
}

/// Texel-to-UV mapping of one surface pass
#[derive(Debug, Clone, Copy, Default)]
struct TexMapping {
    pan: Vec2,
    mult: Vec2,
}

impl TexMapping {
    fn new(info: Option<&TextureInfo<'_>>, metadata: Option<TextureMetadata>, centered: bool) -> Self {
        match (info, metadata) {
            (Some(info), Some(metadata)) => {
                let mut pan = info.pan;
                if centered {
                    pan -= 0.5 * Vec2::new(info.u_scale, info.v_scale);
                }
                Self {
                    pan,
                    mult: Vec2::new(metadata.mult_u, metadata.mult_v),
                }
            }
            _ => Self::default(),
        }
    }

    fn map(&self, u: f32, v: f32) -> [f32; 2] {
        ((Vec2::new(u, v) - self.pan) * self.mult).to_array()
    }
}
