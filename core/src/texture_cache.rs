//! Texture cache
//!
//! Maps engine cache ids to backend textures plus the metadata vertex emission needs, and tracks
//! which id is bound to every pass slot so redundant binds never reach the GPU.
//!
//! Entries live in a [`TextureStore`]: a slot arena indexed by cache id. A store can be shared
//! by several rendering contexts; each context owns a [`TextureCache`] holding its own pass
//! bindings and a handle to the store it was constructed with.
//!
//! A store holds handles of one [`TextureDomain`], so every context sharing it must use a
//! backend of that domain. Contexts sharing a store render frames one at a time: while one of
//! them is in a frame, the others cannot change the store.
//!
//! Any binding change flushes the pending batch first, so geometry queued with the old texture is
//! drawn with the old texture.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;
use slotmap::{SlotMap, new_key_type};

use crate::batch::{BatchAccumulator, FlushReason};
use crate::converter::{ConvertedTexture, TextureConverter, TextureInfo};
use crate::error::RenderError;
use crate::flags::{PolyFlags, TextureFlags};
use crate::gpu::{GpuBackend, GpuTexture, MipData, TextureDomain};

/// Engine-assigned texture identifier
pub type CacheId = u64;

/// Texture slot of the surface shaders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum TexturePass {
    Diffuse = 0,
    Light = 1,
    Detail = 2,
    Fog = 3,
    Macro = 4,
    Bump = 5,
    Height = 6,
}

impl TexturePass {
    pub const COUNT: usize = 7;

    pub const ALL: [TexturePass; Self::COUNT] = [
        TexturePass::Diffuse,
        TexturePass::Light,
        TexturePass::Detail,
        TexturePass::Fog,
        TexturePass::Macro,
        TexturePass::Bump,
        TexturePass::Height,
    ];

    /// Bit of this pass in a vertex pass mask
    pub const fn bit(self) -> u32 {
        1 << self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            TexturePass::Diffuse => "diffuse",
            TexturePass::Light => "light",
            TexturePass::Detail => "detail",
            TexturePass::Fog => "fog",
            TexturePass::Macro => "macro",
            TexturePass::Bump => "bump",
            TexturePass::Height => "height",
        }
    }
}

/// Extra texture attached to a base entry, sharing its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ExternalLayer {
    Detail = 0,
    Bump = 1,
    Height = 2,
}

impl ExternalLayer {
    pub const COUNT: usize = 3;

    pub const ALL: [ExternalLayer; Self::COUNT] =
        [ExternalLayer::Detail, ExternalLayer::Bump, ExternalLayer::Height];

    /// Pass slot the layer is bound to
    pub const fn pass(self) -> TexturePass {
        match self {
            ExternalLayer::Detail => TexturePass::Detail,
            ExternalLayer::Bump => TexturePass::Bump,
            ExternalLayer::Height => TexturePass::Height,
        }
    }

    pub const fn bit(self) -> LayerSet {
        match self {
            ExternalLayer::Detail => LayerSet::DETAIL,
            ExternalLayer::Bump => LayerSet::BUMP,
            ExternalLayer::Height => LayerSet::HEIGHT,
        }
    }
}

bitflags::bitflags! {
    /// External layers attached to a cache entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LayerSet: u8 {
        const DETAIL = 0b001;
        const BUMP = 0b010;
        const HEIGHT = 0b100;
    }
}

/// Per-texture data returned by [`TextureCache::bind`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureMetadata {
    /// Multiplier normalizing U texel coordinates
    pub mult_u: f32,
    /// Multiplier normalizing V texel coordinates
    pub mult_v: f32,
    /// Converted with palette index zero transparent
    pub masked: bool,
    /// Updated in place when the engine reports a change
    pub dynamic: bool,
    pub layers: LayerSet,
    /// Poly flags the texture forces on every polygon using it
    pub custom_poly_flags: PolyFlags,
}

impl Default for TextureMetadata {
    fn default() -> Self {
        Self {
            mult_u: 1.0,
            mult_v: 1.0,
            masked: false,
            dynamic: false,
            layers: LayerSet::empty(),
            custom_poly_flags: PolyFlags::empty(),
        }
    }
}

impl TextureMetadata {
    /// Metadata for a texture converted with `poly_flags`.
    ///
    /// When the first mip disagrees with the declared size (some compressed textures), the
    /// clamp and scale are rescaled to the real size.
    pub fn for_texture(info: &TextureInfo<'_>, poly_flags: PolyFlags) -> Self {
        let (u_clamp, u_scale) = fit_to_mip(
            info.u_size,
            info.mips.first().map(|m| m.width),
            info.u_clamp,
            info.u_scale,
        );
        let (v_clamp, v_scale) = fit_to_mip(
            info.v_size,
            info.mips.first().map(|m| m.height),
            info.v_clamp,
            info.v_scale,
        );
        Self {
            mult_u: normalizer(u_scale, u_clamp),
            mult_v: normalizer(v_scale, v_clamp),
            masked: poly_flags.contains(PolyFlags::MASKED),
            dynamic: info.flags.is_dynamic(),
            layers: LayerSet::empty(),
            custom_poly_flags: PolyFlags::empty(),
        }
    }
}

fn fit_to_mip(size: u32, mip_size: Option<u32>, clamp: u32, scale: f32) -> (f32, f32) {
    let clamp = if clamp == 0 { size } else { clamp } as f32;
    match mip_size {
        Some(mip) if mip != size && size != 0 => {
            let factor = mip as f32 / size as f32;
            (clamp * factor, scale / factor)
        }
        _ => (clamp, scale),
    }
}

fn normalizer(scale: f32, clamp: f32) -> f32 {
    let denom = scale * clamp;
    if denom == 0.0 { 1.0 } else { 1.0 / denom }
}

new_key_type! {
    /// Arena key of a cache entry
    pub struct EntryKey;
}

struct CacheEntry {
    cache_id: CacheId,
    texture: GpuTexture,
    layers: [Option<GpuTexture>; ExternalLayer::COUNT],
    metadata: TextureMetadata,
}

impl CacheEntry {
    fn handles(&self) -> impl Iterator<Item = GpuTexture> + '_ {
        std::iter::once(self.texture).chain(self.layers.iter().flatten().copied())
    }

    fn release<G: GpuBackend + ?Sized>(&self, gpu: &mut G) {
        for texture in self.handles() {
            gpu.release_texture(texture);
        }
    }
}

/// Storage for cached textures, shareable between contexts.
///
/// The epoch changes whenever an entry's GPU handle is released, which tells every
/// [`TextureCache`] using the store to re-check its bindings.
#[derive(Default)]
pub struct TextureStore {
    entries: SlotMap<EntryKey, CacheEntry>,
    index: HashMap<CacheId, EntryKey>,
    epoch: u64,
    /// Handle space of every entry, fixed by the first context
    domain: Option<TextureDomain>,
    next_context: u64,
    /// Context currently in a frame
    frame_owner: Option<u64>,
}

/// Store handle injected into every context sharing it
pub type SharedTextureStore = Rc<RefCell<TextureStore>>;

impl TextureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new store ready to be handed to several contexts.
    pub fn shared() -> SharedTextureStore {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, cache_id: CacheId) -> bool {
        self.index.contains_key(&cache_id)
    }

    pub fn metadata(&self, cache_id: CacheId) -> Option<TextureMetadata> {
        self.get(cache_id).map(|entry| entry.metadata)
    }

    /// Backend handle of an entry or one of its layers.
    pub fn texture(&self, cache_id: CacheId, layer: Option<ExternalLayer>) -> Option<GpuTexture> {
        let entry = self.get(cache_id)?;
        match layer {
            None => Some(entry.texture),
            Some(layer) => entry.layers[layer as usize],
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn domain(&self) -> Option<TextureDomain> {
        self.domain
    }

    /// Whether a context using this store is in a frame.
    pub fn in_frame(&self) -> bool {
        self.frame_owner.is_some()
    }

    /// Register a context whose backend uses `domain`. Returns its context id.
    fn attach(&mut self, domain: TextureDomain) -> Result<u64, RenderError> {
        match self.domain {
            Some(own) if own != domain => {
                return Err(RenderError::TextureDomainMismatch {
                    store: own.id(),
                    backend: domain.id(),
                });
            }
            _ => self.domain = Some(domain),
        }
        let context = self.next_context;
        self.next_context += 1;
        Ok(context)
    }

    fn get(&self, cache_id: CacheId) -> Option<&CacheEntry> {
        self.index.get(&cache_id).and_then(|key| self.entries.get(*key))
    }

    fn get_mut(&mut self, cache_id: CacheId) -> Option<&mut CacheEntry> {
        let key = *self.index.get(&cache_id)?;
        self.entries.get_mut(key)
    }

    fn insert(&mut self, entry: CacheEntry) {
        let cache_id = entry.cache_id;
        let key = self.entries.insert(entry);
        self.index.insert(cache_id, key);
    }

    fn remove(&mut self, cache_id: CacheId) -> Option<CacheEntry> {
        let key = self.index.remove(&cache_id)?;
        self.epoch += 1;
        self.entries.remove(key)
    }

    fn drain(&mut self) -> Vec<CacheEntry> {
        self.index.clear();
        self.epoch += 1;
        self.entries.drain().map(|(_, entry)| entry).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Binding {
    cache_id: CacheId,
    layer: Option<ExternalLayer>,
    texture: GpuTexture,
}

/// What the GPU has in one pass slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassState {
    /// Unknown after a device reset or a release by another context
    Stale,
    Unbound,
    Bound(Binding),
}

/// Result of [`TextureCache::ensure_cached`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Already cached and current
    Hit,
    /// Converted and created
    Created,
    /// Dynamic content rewritten in place
    Updated,
    /// Evicted and converted again with different masking
    Recreated,
    /// Conversion or creation failed; the texture renders untextured
    Failed,
}

/// Cache counters since the last [`TextureCache::reset_stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Binds that reached the GPU
    pub binds: u32,
    /// Binds skipped because the pass already held the texture
    pub redundant_binds: u32,
    /// Binds of ids with no cached texture
    pub not_cached: u32,
    pub conversions: u32,
    pub updates: u32,
    pub evictions: u32,
    pub failures: u32,
}

/// Per-context view of a texture store: pass bindings and cache policy.
pub struct TextureCache {
    store: SharedTextureStore,
    domain: TextureDomain,
    /// Id of this context within the store
    context: u64,
    passes: [PassState; TexturePass::COUNT],
    seen_epoch: u64,
    stats: CacheStats,
}

impl TextureCache {
    /// A cache on `store` for a backend of `domain`.
    ///
    /// Fails when the store already holds handles of another domain.
    pub fn new(store: SharedTextureStore, domain: TextureDomain) -> Result<Self, RenderError> {
        let (context, seen_epoch) = {
            let mut shared = store.borrow_mut();
            (shared.attach(domain)?, shared.epoch)
        };
        Ok(Self {
            store,
            domain,
            context,
            passes: [PassState::Unbound; TexturePass::COUNT],
            seen_epoch,
            stats: CacheStats::default(),
        })
    }

    /// A cache with a store of its own.
    pub fn local(domain: TextureDomain) -> Self {
        let store = TextureStore {
            domain: Some(domain),
            next_context: 1,
            ..TextureStore::default()
        };
        Self {
            store: Rc::new(RefCell::new(store)),
            domain,
            context: 0,
            passes: [PassState::Unbound; TexturePass::COUNT],
            seen_epoch: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn domain(&self) -> TextureDomain {
        self.domain
    }

    /// Take the store for this context's frame.
    pub fn begin_frame(&mut self) -> Result<(), RenderError> {
        let mut store = self.store.borrow_mut();
        match store.frame_owner {
            Some(owner) if owner != self.context => Err(RenderError::StoreInUse {
                operation: "begin_frame",
            }),
            _ => {
                store.frame_owner = Some(self.context);
                Ok(())
            }
        }
    }

    /// Hand the store back after this context's frame.
    pub fn end_frame(&mut self) {
        if let Ok(mut store) = self.store.try_borrow_mut()
            && store.frame_owner == Some(self.context)
        {
            store.frame_owner = None;
        }
    }

    fn check_domain<G: GpuBackend + ?Sized>(&self, gpu: &G) -> Result<(), RenderError> {
        let backend = gpu.texture_domain();
        if backend == self.domain {
            Ok(())
        } else {
            Err(RenderError::TextureDomainMismatch {
                store: self.domain.id(),
                backend: backend.id(),
            })
        }
    }

    /// Changing the store needs the right backend and no other context in a frame.
    fn check_store_access<G: GpuBackend + ?Sized>(
        &self,
        operation: &'static str,
        gpu: &G,
    ) -> Result<(), RenderError> {
        self.check_domain(gpu)?;
        match self.store.borrow().frame_owner {
            Some(owner) if owner != self.context => Err(RenderError::StoreInUse { operation }),
            _ => Ok(()),
        }
    }

    pub fn store(&self) -> &SharedTextureStore {
        &self.store
    }

    /// Bind a cached texture (or one of its external layers) to `pass`.
    ///
    /// Returns the entry's metadata, or `None` when the id is not cached, in which case the pass
    /// is unbound and the draw renders untextured.
    pub fn bind<G: GpuBackend + ?Sized>(
        &mut self,
        cache_id: CacheId,
        pass: TexturePass,
        layer: Option<ExternalLayer>,
        batch: &mut BatchAccumulator,
        gpu: &mut G,
    ) -> Result<Option<TextureMetadata>, RenderError> {
        self.check_domain(gpu)?;
        self.sync_epoch();

        let (wanted, metadata) = {
            let store = self.store.borrow();
            match store.get(cache_id) {
                Some(entry) => {
                    let texture = match layer {
                        None => Some(entry.texture),
                        Some(layer) => entry.layers[layer as usize],
                    };
                    match texture {
                        Some(texture) => (
                            PassState::Bound(Binding {
                                cache_id,
                                layer,
                                texture,
                            }),
                            Some(entry.metadata),
                        ),
                        None => (PassState::Unbound, None),
                    }
                }
                None => (PassState::Unbound, None),
            }
        };

        if metadata.is_none() {
            self.stats.not_cached += 1;
        }
        self.set_pass(pass, wanted, batch, gpu)?;
        Ok(metadata)
    }

    /// Leave `pass` without a texture. Draws sample the backend's white fallback.
    pub fn unbind<G: GpuBackend + ?Sized>(
        &mut self,
        pass: TexturePass,
        batch: &mut BatchAccumulator,
        gpu: &mut G,
    ) -> Result<(), RenderError> {
        self.check_domain(gpu)?;
        self.sync_epoch();
        self.set_pass(pass, PassState::Unbound, batch, gpu)
    }

    fn set_pass<G: GpuBackend + ?Sized>(
        &mut self,
        pass: TexturePass,
        wanted: PassState,
        batch: &mut BatchAccumulator,
        gpu: &mut G,
    ) -> Result<(), RenderError> {
        if self.passes[pass as usize] == wanted {
            self.stats.redundant_binds += 1;
            return Ok(());
        }

        batch.flush(gpu, FlushReason::Texture)?;
        let texture = match wanted {
            PassState::Bound(binding) => Some(binding.texture),
            _ => None,
        };
        gpu.bind_texture(pass, texture);
        self.passes[pass as usize] = wanted;
        self.stats.binds += 1;
        Ok(())
    }

    /// Cache a converted texture, or attach an external layer to an existing entry.
    ///
    /// A base insert replaces any entry with the same id. A layer insert without a base entry
    /// releases `texture` and returns `false`.
    pub fn insert<G: GpuBackend + ?Sized>(
        &mut self,
        cache_id: CacheId,
        texture: GpuTexture,
        metadata: TextureMetadata,
        layer: Option<ExternalLayer>,
        batch: &mut BatchAccumulator,
        gpu: &mut G,
    ) -> Result<bool, RenderError> {
        self.check_store_access("insert", gpu)?;
        let Some(layer) = layer else {
            self.evict(cache_id, batch, gpu)?;
            self.store.borrow_mut().insert(CacheEntry {
                cache_id,
                texture,
                layers: [None; ExternalLayer::COUNT],
                metadata,
            });
            tracing::debug!("Cached texture {:#x} as {:?}", cache_id, texture);
            return Ok(true);
        };

        let attached = self.store.borrow_mut().get_mut(cache_id).map(|entry| {
            entry.metadata.layers |= layer.bit();
            entry.layers[layer as usize].replace(texture)
        });
        let Some(replaced) = attached else {
            tracing::warn!(
                "Cannot attach {:?} layer to uncached texture {:#x}",
                layer,
                cache_id
            );
            gpu.release_texture(texture);
            return Ok(false);
        };

        if let Some(old) = replaced {
            if self.is_bound(cache_id) {
                batch.flush(gpu, FlushReason::TextureUpdate)?;
            }
            gpu.release_texture(old);
            self.store.borrow_mut().epoch += 1;
        }
        tracing::debug!("Attached {:?} layer to texture {:#x}", layer, cache_id);
        Ok(true)
    }

    /// Rewrite a cached texture's contents in place.
    ///
    /// Flushes first when the texture is bound in this context. Returns `false` when the id is
    /// not cached or the backend rejected the update, in which case the entry is evicted.
    pub fn update<G: GpuBackend + ?Sized>(
        &mut self,
        cache_id: CacheId,
        mips: &[MipData],
        batch: &mut BatchAccumulator,
        gpu: &mut G,
    ) -> Result<bool, RenderError> {
        self.check_store_access("update", gpu)?;
        let Some(texture) = self.store.borrow().texture(cache_id, None) else {
            return Ok(false);
        };

        if self.is_bound(cache_id) {
            batch.flush(gpu, FlushReason::TextureUpdate)?;
        }
        match gpu.update_texture(texture, mips) {
            Ok(()) => {
                self.stats.updates += 1;
                Ok(true)
            }
            Err(e) => {
                tracing::warn!("Failed to update texture {:#x}: {}", cache_id, e);
                self.stats.failures += 1;
                self.evict(cache_id, batch, gpu)?;
                Ok(false)
            }
        }
    }

    /// Release an entry and its layers.
    ///
    /// Passes bound to it are marked stale so the next bind always reaches the GPU.
    pub fn evict<G: GpuBackend + ?Sized>(
        &mut self,
        cache_id: CacheId,
        batch: &mut BatchAccumulator,
        gpu: &mut G,
    ) -> Result<bool, RenderError> {
        self.check_store_access("evict", gpu)?;
        self.sync_epoch();
        if !self.store.borrow().contains(cache_id) {
            return Ok(false);
        }
        if self.is_bound(cache_id) {
            batch.flush(gpu, FlushReason::TextureUpdate)?;
        }

        let entry = self.store.borrow_mut().remove(cache_id);
        if let Some(entry) = entry {
            entry.release(gpu);
        }
        for state in &mut self.passes {
            if matches!(state, PassState::Bound(b) if b.cache_id == cache_id) {
                *state = PassState::Stale;
            }
        }
        self.seen_epoch = self.store.borrow().epoch;
        self.stats.evictions += 1;
        tracing::debug!("Evicted texture {:#x}", cache_id);
        Ok(true)
    }

    /// Release every cached texture and unbind every pass.
    pub fn flush_all<G: GpuBackend + ?Sized>(
        &mut self,
        batch: &mut BatchAccumulator,
        gpu: &mut G,
    ) -> Result<(), RenderError> {
        self.check_store_access("flush_all", gpu)?;
        batch.flush(gpu, FlushReason::TextureUpdate)?;

        let entries = self.store.borrow_mut().drain();
        for entry in &entries {
            entry.release(gpu);
        }
        for (pass, state) in TexturePass::ALL.into_iter().zip(&mut self.passes) {
            if *state != PassState::Unbound {
                gpu.bind_texture(pass, None);
                *state = PassState::Unbound;
            }
        }
        self.seen_epoch = self.store.borrow().epoch;
        tracing::debug!("Flushed texture cache ({} entries)", entries.len());
        Ok(())
    }

    /// Forget what the GPU has bound. Used after a device reset.
    pub fn mark_stale(&mut self) {
        self.passes = [PassState::Stale; TexturePass::COUNT];
    }

    /// Make sure a texture is cached and current before it is bound.
    ///
    /// Changed realtime textures are rewritten in place. A static texture cached without
    /// masking that is now requested masked is evicted and converted again.
    pub fn ensure_cached<G, C>(
        &mut self,
        info: &TextureInfo<'_>,
        poly_flags: PolyFlags,
        converter: &mut C,
        batch: &mut BatchAccumulator,
        gpu: &mut G,
    ) -> Result<CacheOutcome, RenderError>
    where
        G: GpuBackend + ?Sized,
        C: TextureConverter + ?Sized,
    {
        self.check_store_access("ensure_cached", gpu)?;
        let cached = self.store.borrow().metadata(info.cache_id);
        let Some(metadata) = cached else {
            return self.convert_and_insert(info, poly_flags, converter, batch, gpu);
        };

        if info.flags.contains(TextureFlags::REALTIME_CHANGED) {
            return match converter.convert_update(info, poly_flags) {
                Ok(mips) => Ok(if self.update(info.cache_id, &mips, batch, gpu)? {
                    CacheOutcome::Updated
                } else {
                    CacheOutcome::Failed
                }),
                Err(e) => {
                    tracing::warn!("Failed to convert update of {:#x}: {}", info.cache_id, e);
                    self.stats.failures += 1;
                    Ok(CacheOutcome::Hit)
                }
            };
        }

        if poly_flags.contains(PolyFlags::MASKED) && !metadata.masked {
            self.evict(info.cache_id, batch, gpu)?;
            return Ok(
                match self.convert_and_insert(info, poly_flags, converter, batch, gpu)? {
                    CacheOutcome::Created => CacheOutcome::Recreated,
                    other => other,
                },
            );
        }

        Ok(CacheOutcome::Hit)
    }

    fn convert_and_insert<G, C>(
        &mut self,
        info: &TextureInfo<'_>,
        poly_flags: PolyFlags,
        converter: &mut C,
        batch: &mut BatchAccumulator,
        gpu: &mut G,
    ) -> Result<CacheOutcome, RenderError>
    where
        G: GpuBackend + ?Sized,
        C: TextureConverter + ?Sized,
    {
        self.stats.conversions += 1;
        let ConvertedTexture {
            desc,
            mips,
            mut metadata,
            layers,
        } = match converter.convert(info, poly_flags) {
            Ok(converted) => converted,
            Err(e) => {
                tracing::warn!("Failed to convert texture {:#x}: {}", info.cache_id, e);
                self.stats.failures += 1;
                return Ok(CacheOutcome::Failed);
            }
        };

        let texture = match gpu.create_texture(&desc, &mips) {
            Ok(texture) => texture,
            Err(e) => {
                tracing::warn!("Failed to create texture {:#x}: {}", info.cache_id, e);
                self.stats.failures += 1;
                return Ok(CacheOutcome::Failed);
            }
        };

        metadata.masked |= poly_flags.contains(PolyFlags::MASKED);
        metadata.layers = LayerSet::empty();
        self.insert(info.cache_id, texture, metadata, None, batch, gpu)?;

        for layer in layers {
            match gpu.create_texture(&layer.desc, &layer.mips) {
                Ok(texture) => {
                    self.insert(
                        info.cache_id,
                        texture,
                        metadata,
                        Some(layer.layer),
                        batch,
                        gpu,
                    )?;
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to create {:?} layer of {:#x}: {}",
                        layer.layer,
                        info.cache_id,
                        e
                    );
                    self.stats.failures += 1;
                }
            }
        }
        Ok(CacheOutcome::Created)
    }

    /// Metadata of a cached entry without binding it.
    pub fn metadata(&self, cache_id: CacheId) -> Option<TextureMetadata> {
        self.store.borrow().metadata(cache_id)
    }

    /// Cache id bound to `pass`, if any.
    pub fn bound(&self, pass: TexturePass) -> Option<CacheId> {
        match self.passes[pass as usize] {
            PassState::Bound(binding) => Some(binding.cache_id),
            _ => None,
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    fn is_bound(&self, cache_id: CacheId) -> bool {
        self.passes
            .iter()
            .any(|state| matches!(state, PassState::Bound(b) if b.cache_id == cache_id))
    }

    /// Drop bindings to handles another context released.
    fn sync_epoch(&mut self) {
        let store = self.store.borrow();
        if store.epoch == self.seen_epoch {
            return;
        }
        for state in &mut self.passes {
            if let PassState::Bound(binding) = state
                && store.texture(binding.cache_id, binding.layer) != Some(binding.texture)
            {
                *state = PassState::Stale;
            }
        }
        self.seen_epoch = store.epoch;
    }
}

impl Drop for TextureCache {
    fn drop(&mut self) {
        self.end_frame();
    }
}
