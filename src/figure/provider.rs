//! Per-figure pipeline orchestration.
//!
//! A [`ControlVertexProvider`] owns everything one figure instance needs
//! per frame: pose evaluation, the occlusion stage, the GPU shaper, the
//! GPU vertex store, and (for the main figure) the staged CPU readback. The composing layer drives providers parent-first each frame:
//!
//! 1. `update_frame` on every provider (CPU: events, pose, uploads),
//! 2. `update_vertex_positions_and_get_deltas` on the main figure,
//! 3. `update_vertex_positions` on each attachment with the main deltas,
//! 4. submit, then `publish_posed_vertices` on the main figure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};

use arc_swap::ArcSwapOption;

use crate::assets::{self, SHAPER_PARAMETERS};
use crate::error::AnimaError;
use crate::figure::definition::FigureDefinition;
use crate::figure::model::{FigureModel, ModelEvent};
use crate::figure::occluder::{load_occluder, FigureRole, Occluder};
use crate::figure::occlusion::{ControlVertexInfo, OcclusionInfo};
use crate::figure::shaper::{DeformationDelta, GpuShaper, ShaperParameters};
use crate::gpu::{ComputeContext, ShaderSet, StagingRing, StructuredBuffer};
use crate::options::PosingOptions;
use crate::pose::{ChannelInputs, ChannelOutputs};

/// A parent-visible handle onto one child figure: its visibility and its
/// baked influence on the parent's occlusion, plus change notification.
///
/// Parents subscribe a dirty flag rather than a callback; the next
/// `update_frame` folds all changes at once.
pub struct ChildEndpoint {
    visible: AtomicBool,
    influence: Mutex<Option<Arc<[OcclusionInfo]>>>,
    subscribers: Mutex<Vec<Arc<AtomicBool>>>,
}

impl ChildEndpoint {
    fn new(visible: bool, influence: Option<Arc<[OcclusionInfo]>>) -> Self {
        Self {
            visible: AtomicBool::new(visible),
            influence: Mutex::new(influence),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Whether the child is currently shown.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    /// The child's baked influence on its parent's vertices, if any.
    #[must_use]
    pub fn influence(&self) -> Option<Arc<[OcclusionInfo]>> {
        self.influence
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Release);
        self.notify();
    }

    fn set_influence(&self, influence: Option<Arc<[OcclusionInfo]>>) {
        *self
            .influence
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = influence;
        self.notify();
    }

    /// Register a dirty flag to be raised on every change. Subscribing the
    /// same flag twice is a no-op.
    pub fn subscribe(&self, flag: &Arc<AtomicBool>) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !subscribers.iter().any(|s| Arc::ptr_eq(s, flag)) {
            subscribers.push(Arc::clone(flag));
        }
    }

    /// Remove a previously subscribed dirty flag.
    pub fn unsubscribe(&self, flag: &Arc<AtomicBool>) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| !Arc::ptr_eq(s, flag));
    }

    fn notify(&self) {
        for flag in self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            flag.store(true, Ordering::Release);
        }
    }
}

/// Lock-free reader handle onto a main figure's most recent completed
/// posed-vertex snapshot. Cheap to clone and safe to poll from any thread.
#[derive(Clone)]
pub struct PosedVertexReader {
    snapshot: Arc<ArcSwapOption<Vec<ControlVertexInfo>>>,
}

impl PosedVertexReader {
    /// The latest completed snapshot, or `None` before the first frame's
    /// readback lands.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<Vec<ControlVertexInfo>>> {
        self.snapshot.load_full()
    }
}

/// Drives one figure instance through the per-frame deformation pipeline.
pub struct ControlVertexProvider {
    definition: Arc<FigureDefinition>,
    shaders: Arc<ShaderSet>,
    role: FigureRole,
    occluder: Occluder,
    occluder_generation: u64,
    shaper: GpuShaper,
    visible: bool,
    vertex_store: StructuredBuffer<ControlVertexInfo>,
    staging: Option<StagingRing<ControlVertexInfo>>,
    children: Vec<Arc<ChildEndpoint>>,
    children_dirty: Arc<AtomicBool>,
    endpoint: Arc<ChildEndpoint>,
    model_events: mpsc::Receiver<ModelEvent>,
    previous_frame: Arc<ArcSwapOption<Vec<ControlVertexInfo>>>,
}

impl ControlVertexProvider {
    /// Load a provider for one figure instance.
    ///
    /// Reads the shaper parameters and role-appropriate occlusion
    /// artifacts, uploads all static data, and subscribes to the model's
    /// change events. Nothing is left half-loaded on error.
    ///
    /// # Errors
    ///
    /// `MissingArtifact` / `ArtifactDecode` when required figure data is
    /// absent or inconsistent.
    pub fn load(
        ctx: &ComputeContext,
        shaders: &Arc<ShaderSet>,
        definition: Arc<FigureDefinition>,
        model: &mut FigureModel,
        options: &PosingOptions,
    ) -> Result<Self, AnimaError> {
        let channel_system = definition.channel_system();
        let role = FigureRole::resolve(channel_system);
        log::info!("loading figure '{}' as {role:?}", definition.name());

        let parameters: ShaperParameters =
            assets::read_json(definition.directory().as_ref(), SHAPER_PARAMETERS)?;
        let shaper = GpuShaper::new(
            &ctx.device,
            shaders,
            channel_system,
            definition.bone_system().bone_count(),
            &parameters,
        )?;
        let vertex_count = shaper.vertex_count();

        let default_occlusion = definition.occlusion_directory();
        let shape_occlusion = model
            .shape()
            .occlusion_directory
            .clone()
            .unwrap_or_else(|| Arc::clone(&default_occlusion));
        let occluder = load_occluder(
            &ctx.device,
            shaders,
            channel_system,
            role,
            vertex_count,
            default_occlusion.as_ref(),
            shape_occlusion.as_ref(),
        )?;

        let vertex_store = StructuredBuffer::new(
            &ctx.device,
            "Control Vertices",
            vertex_count,
            wgpu::BufferUsages::COPY_SRC,
        );
        let staging = role.is_main().then(|| {
            StagingRing::new(
                &ctx.device,
                "Control Vertices",
                vertex_count,
                options.staging_buffer_count,
            )
        });

        let visible = model.is_visible();
        let endpoint = Arc::new(ChildEndpoint::new(
            visible,
            occluder.parent_influence(),
        ));

        Ok(Self {
            definition,
            shaders: Arc::clone(shaders),
            role,
            occluder,
            occluder_generation: 0,
            shaper,
            visible,
            vertex_store,
            staging,
            children: Vec::new(),
            children_dirty: Arc::new(AtomicBool::new(false)),
            endpoint,
            model_events: model.subscribe(),
            previous_frame: Arc::new(ArcSwapOption::const_empty()),
        })
    }

    /// This figure's role in the hierarchy.
    #[must_use]
    pub fn role(&self) -> FigureRole {
        self.role
    }

    /// Number of control vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.shaper.vertex_count()
    }

    /// Whether the figure is currently shown.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Bumped every time the occluder is swapped for a new shape.
    #[must_use]
    pub fn occluder_generation(&self) -> u64 {
        self.occluder_generation
    }

    /// Number of child occluders folded into the current aggregation.
    #[must_use]
    pub fn registered_child_count(&self) -> usize {
        self.occluder.registered_child_count()
    }

    /// This figure's endpoint, for registration with its parent.
    #[must_use]
    pub fn endpoint(&self) -> &Arc<ChildEndpoint> {
        &self.endpoint
    }

    /// A reader onto the previous completed frame's posed vertices (main
    /// figures only; attachments never publish snapshots).
    #[must_use]
    pub fn posed_vertex_reader(&self) -> PosedVertexReader {
        PosedVertexReader {
            snapshot: Arc::clone(&self.previous_frame),
        }
    }

    /// A delta buffer sized for this figure's vertices, to pass between
    /// `update_vertex_positions_and_get_deltas` and children.
    #[must_use]
    pub fn create_delta_buffer(
        &self,
        device: &wgpu::Device,
    ) -> StructuredBuffer<DeformationDelta> {
        StructuredBuffer::new(
            device,
            "Deformation Deltas",
            self.vertex_count(),
            wgpu::BufferUsages::empty(),
        )
    }

    /// Replace this figure's set of child figures.
    ///
    /// Subscribes to every child's endpoint (and unsubscribes from the
    /// removed ones) and immediately re-aggregates child occlusion.
    pub fn register_children(
        &mut self,
        queue: &wgpu::Queue,
        children: Vec<Arc<ChildEndpoint>>,
    ) {
        for child in &self.children {
            child.unsubscribe(&self.children_dirty);
        }
        for child in &children {
            child.subscribe(&self.children_dirty);
        }
        self.children = children;
        self.children_dirty.store(false, Ordering::Release);
        self.refresh_child_occluders(queue);
    }

    /// Per-frame CPU stage: drain model events, fold child changes,
    /// evaluate the pose, and upload channel outputs and bone transforms.
    ///
    /// Returns the evaluated outputs so they can be fed to child
    /// providers as parent outputs. Deterministic for a given pose and
    /// event history. Because providers update parent-first, a child's
    /// shape or visibility change reaches the parent's occlusion
    /// aggregation on the following frame.
    pub fn update_frame(
        &mut self,
        ctx: &ComputeContext,
        inputs: &ChannelInputs,
        parent_outputs: Option<&ChannelOutputs>,
    ) -> ChannelOutputs {
        self.drain_model_events(ctx);
        if self.children_dirty.swap(false, Ordering::AcqRel) {
            self.refresh_child_occluders(&ctx.queue);
        }

        let outputs = self
            .definition
            .channel_system()
            .evaluate(parent_outputs, inputs);
        let transforms = self.definition.bone_system().bone_transforms(&outputs);
        self.occluder.set_values(&ctx.queue, &outputs);
        self.shaper.set_values(&ctx.queue, &outputs, &transforms);
        outputs
    }

    /// Record the main figure's GPU stage: occlusion pass, shaping pass,
    /// per-vertex deltas into `deltas_out`, and (when a staging slot is
    /// free) the readback copy.
    ///
    /// Runs even while hidden, so the figure's state stays current and
    /// re-showing it needs no catch-up work.
    pub fn update_vertex_positions_and_get_deltas(
        &mut self,
        ctx: &ComputeContext,
        encoder: &mut wgpu::CommandEncoder,
        deltas_out: &StructuredBuffer<DeformationDelta>,
    ) {
        self.occluder.calculate_occlusion(encoder);
        self.shaper.calculate_positions_and_deltas(
            &ctx.device,
            encoder,
            self.occluder.occlusion_view(),
            &self.vertex_store,
            deltas_out,
        );
        if let Some(staging) = &mut self.staging {
            let _ = staging.copy_from(encoder, self.vertex_store.buffer());
        }
    }

    /// Record an attachment's GPU stage: shaping with the parent's deltas
    /// applied through the parent vertex map. Runs even while hidden.
    pub fn update_vertex_positions(
        &mut self,
        ctx: &ComputeContext,
        encoder: &mut wgpu::CommandEncoder,
        parent_deltas: &StructuredBuffer<DeformationDelta>,
    ) {
        self.occluder.calculate_occlusion(encoder);
        self.shaper.calculate_positions(
            &ctx.device,
            encoder,
            self.occluder.occlusion_view(),
            &self.vertex_store,
            parent_deltas.buffer(),
        );
    }

    /// Harvest any completed readback and publish it for
    /// [`PosedVertexReader`]s. Call after submitting the frame's commands;
    /// non-blocking, so the snapshot typically lands a frame late.
    pub fn publish_posed_vertices(&mut self, device: &wgpu::Device) {
        let Some(staging) = &mut self.staging else {
            return;
        };
        if let Some(vertices) = staging.resolve(device) {
            self.previous_frame.store(Some(Arc::new(vertices)));
        }
    }

    /// The GPU-resident posed vertex store, for downstream mesh refinement.
    #[must_use]
    pub fn vertex_store(&self) -> &StructuredBuffer<ControlVertexInfo> {
        &self.vertex_store
    }

    /// GPU-readable view of the current occluder's per-vertex occlusion.
    /// Swapped when the shape changes; see [`Self::occluder_generation`].
    #[must_use]
    pub fn occlusion_view(&self) -> &wgpu::Buffer {
        self.occluder.occlusion_view()
    }

    /// The previous completed frame's posed vertices, if any. Possibly
    /// stale; absent until the first readback completes.
    #[must_use]
    pub fn previous_frame_results(&self) -> Option<Arc<Vec<ControlVertexInfo>>> {
        self.previous_frame.load_full()
    }

    fn drain_model_events(&mut self, ctx: &ComputeContext) {
        while let Ok(event) = self.model_events.try_recv() {
            match event {
                ModelEvent::VisibilityChanged(visible) => {
                    self.visible = visible;
                    self.endpoint.set_visible(visible);
                }
                ModelEvent::ShapeChanged(shape) => {
                    let occlusion_directory = shape
                        .occlusion_directory
                        .unwrap_or_else(|| self.definition.occlusion_directory());
                    match load_occluder(
                        &ctx.device,
                        &self.shaders,
                        self.definition.channel_system(),
                        self.role,
                        self.shaper.vertex_count(),
                        self.definition.occlusion_directory().as_ref(),
                        occlusion_directory.as_ref(),
                    ) {
                        Ok(occluder) => self.set_occluder(&ctx.queue, occluder),
                        Err(e) => log::error!(
                            "figure '{}': shape '{}' occlusion load failed, \
                             keeping previous occluder: {e}",
                            self.definition.name(),
                            shape.name
                        ),
                    }
                }
            }
        }
    }

    /// Swap in a freshly loaded occluder, republish the parent influence,
    /// and re-aggregate children against the new occluder.
    fn set_occluder(&mut self, queue: &wgpu::Queue, occluder: Occluder) {
        let old = std::mem::replace(&mut self.occluder, occluder);
        self.occluder_generation += 1;
        self.endpoint.set_influence(self.occluder.parent_influence());
        drop(old);
        self.refresh_child_occluders(queue);
    }

    fn refresh_child_occluders(&mut self, queue: &wgpu::Queue) {
        let influences: Vec<Arc<[OcclusionInfo]>> = self
            .children
            .iter()
            .filter(|child| child.is_visible())
            .filter_map(|child| child.influence())
            .collect();
        self.occluder.register_child_occluders(queue, &influences);
    }
}

impl Drop for ControlVertexProvider {
    fn drop(&mut self) {
        for child in &self.children {
            child.unsubscribe(&self.children_dirty);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{
        MemoryArtifacts, OCCLUDER_PARAMETERS, OCCLUSION_INFOS,
        PARENT_OCCLUSION_INFOS,
    };
    use crate::figure::model::Shape;
    use crate::figure::occluder::OccluderParameters;
    use crate::figure::shaper::ShaperParameters;
    use crate::pose::{Bone, BoneSystem, Channel, ChannelSystem};
    use glam::Vec3;

    fn context() -> Option<ComputeContext> {
        ComputeContext::new_blocking().ok()
    }

    fn flag() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn endpoint_raises_subscribed_flags_on_change() {
        let endpoint = ChildEndpoint::new(true, None);
        let dirty = flag();
        endpoint.subscribe(&dirty);
        endpoint.set_visible(false);
        assert!(dirty.load(Ordering::Acquire));
        assert!(!endpoint.is_visible());
    }

    #[test]
    fn endpoint_subscription_is_idempotent() {
        let endpoint = ChildEndpoint::new(true, None);
        let dirty = flag();
        endpoint.subscribe(&dirty);
        endpoint.subscribe(&dirty);
        assert_eq!(
            endpoint
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            1
        );
    }

    #[test]
    fn unsubscribed_flags_stay_clear() {
        let endpoint = ChildEndpoint::new(true, None);
        let dirty = flag();
        endpoint.subscribe(&dirty);
        endpoint.unsubscribe(&dirty);
        endpoint.set_influence(None);
        assert!(!dirty.load(Ordering::Acquire));
    }

    // GPU fixtures below. Each test bails out quietly when no adapter is
    // available.

    fn shaper_parameters(
        vertex_count: usize,
        parent_vertex_map: Option<Vec<u32>>,
    ) -> ShaperParameters {
        ShaperParameters {
            initial_positions: (0..vertex_count)
                .map(|i| [i as f32, 0.0, 0.0])
                .collect(),
            skin_indices: vec![[0; 4]; vertex_count],
            skin_weights: vec![[1.0, 0.0, 0.0, 0.0]; vertex_count],
            morphs: Vec::new(),
            parent_vertex_map,
        }
    }

    fn one_bone_system() -> Arc<BoneSystem> {
        Arc::new(BoneSystem::new(vec![Bone {
            name: "root".to_owned(),
            parent: None,
            pivot: Vec3::ZERO,
            rotation_channels: [None, None, Some(0)],
        }]))
    }

    fn main_definition(vertex_count: usize) -> Arc<FigureDefinition> {
        let channels = Arc::new(ChannelSystem::new(
            vec![Channel::new("bend", -2.0, 2.0)],
            None,
        ));
        let mut dir = MemoryArtifacts::new("main");
        dir.insert_json(SHAPER_PARAMETERS, &shaper_parameters(vertex_count, None));
        dir.insert_json(
            &format!("occlusion/{OCCLUDER_PARAMETERS}"),
            &OccluderParameters::default(),
        );
        dir.insert_packed_u32s(
            &format!("occlusion/{OCCLUSION_INFOS}"),
            &vec![0xffff_ffff; vertex_count],
        );
        Arc::new(FigureDefinition::new(
            "main",
            channels,
            one_bone_system(),
            Arc::new(dir),
        ))
    }

    fn attachment_definition(
        vertex_count: usize,
        parent: &Arc<FigureDefinition>,
    ) -> Arc<FigureDefinition> {
        let channels = Arc::new(ChannelSystem::new(
            vec![Channel::new("bend", -2.0, 2.0)],
            Some(Arc::clone(parent.channel_system())),
        ));
        let parent_vertex_count = 8;
        let mut dir = MemoryArtifacts::new("attachment");
        dir.insert_json(
            SHAPER_PARAMETERS,
            &shaper_parameters(
                vertex_count,
                Some((0..vertex_count as u32).collect()),
            ),
        );
        dir.insert_packed_u32s(
            &format!("occlusion/{OCCLUSION_INFOS}"),
            &vec![0xffff_ffff; vertex_count],
        );
        // Half-shadowed parent influence so aggregation is observable.
        dir.insert_packed_u32s(
            &format!("occlusion/{PARENT_OCCLUSION_INFOS}"),
            &vec![
                OcclusionInfo { front: 0.5, back: 0.5 }.pack();
                parent_vertex_count
            ],
        );
        Arc::new(FigureDefinition::new(
            "attachment",
            channels,
            one_bone_system(),
            Arc::new(dir),
        ))
    }

    fn load(
        ctx: &ComputeContext,
        shaders: &Arc<ShaderSet>,
        definition: Arc<FigureDefinition>,
        model: &mut FigureModel,
    ) -> Result<ControlVertexProvider, AnimaError> {
        ControlVertexProvider::load(
            ctx,
            shaders,
            definition,
            model,
            &PosingOptions::default(),
        )
    }

    #[test]
    fn main_figure_requires_occluder_parameters() {
        let Some(ctx) = context() else { return };
        let shaders = Arc::new(ShaderSet::new(&ctx.device));

        let channels = Arc::new(ChannelSystem::new(
            vec![Channel::new("bend", -2.0, 2.0)],
            None,
        ));
        let mut dir = MemoryArtifacts::new("broken");
        dir.insert_json(SHAPER_PARAMETERS, &shaper_parameters(4, None));
        let definition = Arc::new(FigureDefinition::new(
            "broken",
            channels,
            one_bone_system(),
            Arc::new(dir),
        ));
        let mut model = FigureModel::new(Shape::default_shape(), true);

        let result = load(&ctx, &shaders, definition, &mut model);
        assert!(matches!(result, Err(AnimaError::MissingArtifact { .. })));
    }

    fn attachment_channels(parent: &Arc<FigureDefinition>) -> Arc<ChannelSystem> {
        Arc::new(ChannelSystem::new(
            vec![Channel::new("bend", -2.0, 2.0)],
            Some(Arc::clone(parent.channel_system())),
        ))
    }

    #[test]
    fn attachment_requires_its_own_occlusion_array() {
        let Some(ctx) = context() else { return };
        let shaders = Arc::new(ShaderSet::new(&ctx.device));
        let main_def = main_definition(8);

        let mut dir = MemoryArtifacts::new("no-own-occlusion");
        dir.insert_json(
            SHAPER_PARAMETERS,
            &shaper_parameters(4, Some(vec![0, 1, 2, 3])),
        );
        dir.insert_packed_u32s(
            &format!("occlusion/{PARENT_OCCLUSION_INFOS}"),
            &[0xffff_ffff; 8],
        );
        let definition = Arc::new(FigureDefinition::new(
            "no-own-occlusion",
            attachment_channels(&main_def),
            one_bone_system(),
            Arc::new(dir),
        ));
        let mut model = FigureModel::new(Shape::default_shape(), true);

        let result = load(&ctx, &shaders, definition, &mut model);
        assert!(matches!(result, Err(AnimaError::MissingArtifact { .. })));
    }

    #[test]
    fn attachment_requires_the_parent_occlusion_array() {
        let Some(ctx) = context() else { return };
        let shaders = Arc::new(ShaderSet::new(&ctx.device));
        let main_def = main_definition(8);

        let mut dir = MemoryArtifacts::new("no-parent-occlusion");
        dir.insert_json(
            SHAPER_PARAMETERS,
            &shaper_parameters(4, Some(vec![0, 1, 2, 3])),
        );
        dir.insert_packed_u32s(
            &format!("occlusion/{OCCLUSION_INFOS}"),
            &[0xffff_ffff; 4],
        );
        let definition = Arc::new(FigureDefinition::new(
            "no-parent-occlusion",
            attachment_channels(&main_def),
            one_bone_system(),
            Arc::new(dir),
        ));
        let mut model = FigureModel::new(Shape::default_shape(), true);

        let result = load(&ctx, &shaders, definition, &mut model);
        assert!(matches!(result, Err(AnimaError::MissingArtifact { .. })));
    }

    #[test]
    fn occlusion_array_must_match_the_shaper_vertex_count() {
        let Some(ctx) = context() else { return };
        let shaders = Arc::new(ShaderSet::new(&ctx.device));

        let channels = Arc::new(ChannelSystem::new(
            vec![Channel::new("bend", -2.0, 2.0)],
            None,
        ));
        let mut dir = MemoryArtifacts::new("short-occlusion");
        dir.insert_json(SHAPER_PARAMETERS, &shaper_parameters(8, None));
        dir.insert_json(
            &format!("occlusion/{OCCLUDER_PARAMETERS}"),
            &OccluderParameters::default(),
        );
        // 4 entries for an 8-vertex figure: inconsistent, must fail the
        // load rather than feed the shaper a short occlusion buffer.
        dir.insert_packed_u32s(
            &format!("occlusion/{OCCLUSION_INFOS}"),
            &[0xffff_ffff; 4],
        );
        let definition = Arc::new(FigureDefinition::new(
            "short-occlusion",
            channels,
            one_bone_system(),
            Arc::new(dir),
        ));
        let mut model = FigureModel::new(Shape::default_shape(), true);

        let result = load(&ctx, &shaders, definition, &mut model);
        assert!(matches!(result, Err(AnimaError::ArtifactDecode { .. })));
    }

    #[test]
    fn full_cycle_publishes_posed_vertices() {
        let Some(ctx) = context() else { return };
        let shaders = Arc::new(ShaderSet::new(&ctx.device));
        let mut model = FigureModel::new(Shape::default_shape(), true);
        let Ok(mut provider) = load(&ctx, &shaders, main_definition(8), &mut model)
        else {
            unreachable!("main figure fixture loads");
        };
        assert!(provider.role().is_main());
        let reader = provider.posed_vertex_reader();
        assert!(reader.latest().is_none());

        let deltas = provider.create_delta_buffer(&ctx.device);
        let inputs = provider.definition.channel_system().default_inputs();
        for _ in 0..3 {
            let _ = provider.update_frame(&ctx, &inputs, None);
            let mut encoder = ctx.create_encoder();
            provider.update_vertex_positions_and_get_deltas(
                &ctx,
                &mut encoder,
                &deltas,
            );
            ctx.submit(encoder);
            provider.publish_posed_vertices(&ctx.device);
            let _ = ctx.device.poll(wgpu::PollType::Wait);
        }
        provider.publish_posed_vertices(&ctx.device);

        let Some(snapshot) = reader.latest() else {
            unreachable!("readback lands within three frames");
        };
        assert_eq!(snapshot.len(), 8);
        // Rest pose with identity bones reproduces the rest positions.
        assert_eq!(snapshot[3].position, [3.0, 0.0, 0.0]);
        assert_eq!(snapshot[3].occlusion, 0xffff_ffff);
    }

    #[test]
    fn hiding_a_child_drops_it_from_the_aggregation() {
        let Some(ctx) = context() else { return };
        let shaders = Arc::new(ShaderSet::new(&ctx.device));

        let main_def = main_definition(8);
        let mut main_model = FigureModel::new(Shape::default_shape(), true);
        let Ok(mut main) = load(&ctx, &shaders, Arc::clone(&main_def), &mut main_model)
        else {
            unreachable!("main figure fixture loads");
        };

        let mut child_model = FigureModel::new(Shape::default_shape(), true);
        let Ok(mut child) = load(
            &ctx,
            &shaders,
            attachment_definition(4, &main_def),
            &mut child_model,
        ) else {
            unreachable!("attachment fixture loads");
        };
        assert_eq!(child.role(), FigureRole::Attachment);

        main.register_children(&ctx.queue, vec![Arc::clone(child.endpoint())]);
        assert_eq!(main.registered_child_count(), 1);

        // Re-registering the same list must not duplicate subscriptions.
        main.register_children(&ctx.queue, vec![Arc::clone(child.endpoint())]);
        assert_eq!(main.registered_child_count(), 1);
        assert_eq!(
            child
                .endpoint()
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            1
        );

        let inputs = main_def.channel_system().default_inputs();
        let child_inputs = child.definition.channel_system().default_inputs();
        let mut frame = |main: &mut ControlVertexProvider,
                         child: &mut ControlVertexProvider| {
            let outputs = main.update_frame(&ctx, &inputs, None);
            let _ = child.update_frame(&ctx, &child_inputs, Some(&outputs));
        };

        // Providers update parent-first, so a child's visibility change
        // reaches the parent's aggregation on the following frame.
        child_model.set_visible(false);
        frame(&mut main, &mut child);
        frame(&mut main, &mut child);
        assert_eq!(main.registered_child_count(), 0);
        assert!(!child.is_visible());

        // Re-showing the child re-includes its influence.
        child_model.set_visible(true);
        frame(&mut main, &mut child);
        frame(&mut main, &mut child);
        assert_eq!(main.registered_child_count(), 1);
    }

    #[test]
    fn shape_swap_replaces_the_occluder() {
        let Some(ctx) = context() else { return };
        let shaders = Arc::new(ShaderSet::new(&ctx.device));
        let mut model = FigureModel::new(Shape::default_shape(), true);
        let Ok(mut provider) = load(&ctx, &shaders, main_definition(8), &mut model)
        else {
            unreachable!("main figure fixture loads");
        };
        assert_eq!(provider.occluder_generation(), 0);

        let mut shape_dir = MemoryArtifacts::new("athletic-occlusion");
        shape_dir.insert_json(OCCLUDER_PARAMETERS, &OccluderParameters::default());
        model.set_shape(Shape {
            name: "athletic".to_owned(),
            occlusion_directory: Some(Arc::new(shape_dir)),
        });

        let inputs = provider.definition.channel_system().default_inputs();
        let _ = provider.update_frame(&ctx, &inputs, None);
        assert_eq!(provider.occluder_generation(), 1);
    }

    #[test]
    fn broken_shape_keeps_the_previous_occluder() {
        let Some(ctx) = context() else { return };
        let shaders = Arc::new(ShaderSet::new(&ctx.device));
        let mut model = FigureModel::new(Shape::default_shape(), true);
        let Ok(mut provider) = load(&ctx, &shaders, main_definition(8), &mut model)
        else {
            unreachable!("main figure fixture loads");
        };

        // Shape directory without occluder parameters: load fails, the
        // previous occluder stays active.
        model.set_shape(Shape {
            name: "broken".to_owned(),
            occlusion_directory: Some(Arc::new(MemoryArtifacts::new("empty"))),
        });
        let inputs = provider.definition.channel_system().default_inputs();
        let _ = provider.update_frame(&ctx, &inputs, None);
        assert_eq!(provider.occluder_generation(), 0);
        assert_eq!(provider.vertex_count(), 8);
    }
}
