//! Asynchronous model build pipeline.
//!
//! A request snapshots a cell's grid, builds one artifact per render layer
//! on the worker pool, and hands the result to the primary thread, which
//! stores it on the cell and notifies the host. Requests for different
//! cells run concurrently; stages of one request run strictly in order.
//!
//! ```text
//! Scheduled -> Computing -> Combining -> Publishing -> Done
//!                  \-> Failed -> Done
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::Sender;
use glam::IVec3;
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use super::cache::{ModelCache, ModelKey};
use super::cell::{CellId, ModelData, VoxelCell};
use super::emitter::{EmitRequest, GeometryEmitter, LayerClassifier};
use super::executor::{PrimaryExecutor, PrimaryTask, primary_channel};
use super::host::HostContext;
use super::neighborhood::{Neighborhood, NeighborhoodSignature};
use super::render_type::{ChiselRenderType, RenderLayer};
use crate::core::{Error, PipelineConfig, Result};
use crate::voxel::{AreaAccessor, AreaSignature, ContentDescriptor, FilteredAreaAccessor};

/// Stage of a build request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStatus {
    /// Queued on the worker pool.
    Scheduled,
    /// Building per-layer artifacts.
    Computing,
    /// Merging the catch-all artifact.
    Combining,
    /// Waiting for the primary thread.
    Publishing,
    /// Computation failed; nothing will be published.
    Failed,
    Done,
}

struct TicketState {
    status: BuildStatus,
    failed: bool,
}

/// Handle to one `update_model_data` request.
#[derive(Clone)]
pub struct BuildTicket {
    id: u64,
    cell: CellId,
    state: Arc<Mutex<TicketState>>,
}

impl BuildTicket {
    fn new(id: u64, cell: CellId) -> Self {
        Self {
            id,
            cell,
            state: Arc::new(Mutex::new(TicketState {
                status: BuildStatus::Scheduled,
                failed: false,
            })),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cell(&self) -> CellId {
        self.cell
    }

    pub fn status(&self) -> BuildStatus {
        self.state.lock().status
    }

    pub fn is_done(&self) -> bool {
        self.status() == BuildStatus::Done
    }

    /// Whether the request ended without publishing.
    pub fn failed(&self) -> bool {
        self.state.lock().failed
    }

    fn advance(&self, status: BuildStatus) {
        self.state.lock().status = status;
    }

    fn fail(&self) {
        let mut state = self.state.lock();
        state.failed = true;
        state.status = BuildStatus::Failed;
    }
}

impl std::fmt::Debug for BuildTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildTicket")
            .field("id", &self.id)
            .field("cell", &self.cell)
            .field("status", &self.status())
            .finish()
    }
}

/// One artifact per (layer, contained state).
#[derive(Clone, Debug, PartialEq)]
pub struct PerStateModels<A> {
    models: BTreeMap<(RenderLayer, ContentDescriptor), A>,
}

impl<A> PerStateModels<A> {
    pub fn get(&self, layer: RenderLayer, state: &ContentDescriptor) -> Option<&A> {
        self.models.get(&(layer, state.clone()))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RenderLayer, &ContentDescriptor, &A)> {
        self.models.iter().map(|((layer, state), artifact)| (*layer, state, artifact))
    }
}

impl<A> Default for PerStateModels<A> {
    fn default() -> Self {
        Self {
            models: BTreeMap::new(),
        }
    }
}

/// Inputs shared by every artifact of one area.
struct AreaContext<'a> {
    area: &'a dyn AreaAccessor,
    area_signature: Arc<AreaSignature>,
    neighborhood: &'a Neighborhood,
    neighborhood_signature: Arc<NeighborhoodSignature>,
    origin: IVec3,
}

/// State shared between the pipeline handle and its worker jobs.
struct BuildShared<E: GeometryEmitter> {
    emitter: E,
    classifier: Box<dyn LayerClassifier>,
    cache: ModelCache<E::Artifact>,
}

impl<E: GeometryEmitter> BuildShared<E> {
    fn emit_cached(
        &self,
        ctx: &AreaContext<'_>,
        primary: &ContentDescriptor,
        render_type: ChiselRenderType,
    ) -> Result<E::Artifact> {
        let key = ModelKey {
            area: Arc::clone(&ctx.area_signature),
            primary: primary.clone(),
            render_type,
            neighborhood: Arc::clone(&ctx.neighborhood_signature),
        };
        if let Some(artifact) = self.cache.get(&key) {
            return Ok(artifact);
        }
        let artifact = self.emitter.emit(&EmitRequest {
            area: ctx.area,
            primary,
            render_type,
            neighborhood: ctx.neighborhood,
            origin: ctx.origin,
        })?;
        self.cache.insert(key, artifact.clone());
        Ok(artifact)
    }

    /// Artifact for one layer: the solid half, plus the fluid half on
    /// fluid layers, merged only when both have content.
    fn build_layer(
        &self,
        ctx: &AreaContext<'_>,
        primary: &ContentDescriptor,
        layer: RenderLayer,
    ) -> Result<Option<E::Artifact>> {
        let solid = self.emit_cached(ctx, primary, ChiselRenderType::solid(layer))?;
        let solid = (!self.emitter.is_empty(&solid)).then_some(solid);
        if !self.classifier.is_fluid_layer(layer) {
            return Ok(solid);
        }

        let fluid = self.emit_cached(ctx, primary, ChiselRenderType::fluid(layer))?;
        let fluid = (!self.emitter.is_empty(&fluid)).then_some(fluid);
        Ok(match (solid, fluid) {
            (Some(solid), Some(fluid)) => Some(self.emitter.combine(vec![solid, fluid])),
            (solid, fluid) => solid.or(fluid),
        })
    }

    fn merge(&self, mut parts: Vec<E::Artifact>) -> Option<E::Artifact> {
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(self.emitter.combine(parts)),
        }
    }

    fn build_model_data(
        &self,
        cell: &VoxelCell<E::Artifact>,
        neighborhood: &Neighborhood,
        ticket: &BuildTicket,
    ) -> Result<ModelData<E::Artifact>> {
        let grid = cell.snapshot();
        let stats = grid.statistics();
        if stats.is_empty_only() {
            return Ok(ModelData::empty());
        }

        let primary = stats.primary_state();
        let layers: BTreeSet<RenderLayer> = stats
            .contained_states()
            .iter()
            .flat_map(|state| self.classifier.layers(state))
            .collect();
        let ctx = AreaContext {
            area: &grid,
            area_signature: Arc::new(grid.signature()),
            neighborhood,
            neighborhood_signature: Arc::new(neighborhood.signature()),
            origin: cell.origin(),
        };

        let mut known = BTreeMap::new();
        for layer in layers {
            if let Some(artifact) = self.build_layer(&ctx, &primary, layer)? {
                known.insert(layer, artifact);
            }
        }

        ticket.advance(BuildStatus::Combining);
        let unknown = self.merge(known.values().cloned().collect());
        Ok(ModelData::new(known, unknown))
    }

    fn build_per_state(
        &self,
        cell: &VoxelCell<E::Artifact>,
        neighborhood: &Neighborhood,
    ) -> Result<PerStateModels<E::Artifact>> {
        let grid = cell.snapshot();
        let neighborhood_signature = Arc::new(neighborhood.signature());
        let mut models = BTreeMap::new();

        for state in grid.statistics().contained_states() {
            let filtered = FilteredAreaAccessor::new(&grid, state.clone());
            let ctx = AreaContext {
                area: &filtered,
                area_signature: Arc::new(filtered.signature()),
                neighborhood,
                neighborhood_signature: Arc::clone(&neighborhood_signature),
                origin: cell.origin(),
            };
            for layer in self.classifier.layers(&state) {
                if let Some(artifact) = self.build_layer(&ctx, &state, layer)? {
                    models.insert((layer, state.clone()), artifact);
                }
            }
        }
        Ok(PerStateModels { models })
    }
}

/// Turn a caught panic payload into an error.
fn panic_error(payload: Box<dyn std::any::Any + Send>) -> Error {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    Error::ComputeFailure(format!("panicked: {}", msg))
}

/// Run `f`, containing panics as `ComputeFailure`.
fn contained<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(panic_error(payload)))
}

/// Builds model data for voxel cells on a bounded worker pool.
pub struct ModelBuildPipeline<E: GeometryEmitter> {
    pool: rayon::ThreadPool,
    shared: Arc<BuildShared<E>>,
    primary: Sender<PrimaryTask>,
    next_request: AtomicU64,
}

impl<E: GeometryEmitter> ModelBuildPipeline<E> {
    /// Create the pipeline and the executor for its primary-thread stage.
    /// The executor is bound to the calling thread.
    pub fn new(
        config: &PipelineConfig,
        emitter: E,
        classifier: impl LayerClassifier,
    ) -> Result<(Self, PrimaryExecutor)> {
        if config.worker_threads == 0 {
            return Err(Error::Config("worker_threads must be positive".to_string()));
        }
        let prefix = config.thread_name_prefix.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(move |i| format!("{}-{}", prefix, i + 1))
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;
        info!(
            "Model build pipeline started: {} workers, cache capacity {}",
            config.worker_threads, config.cache_capacity
        );

        let (primary, executor) = primary_channel();
        let pipeline = Self {
            pool,
            shared: Arc::new(BuildShared {
                emitter,
                classifier: Box::new(classifier),
                cache: ModelCache::new(config.cache_capacity),
            }),
            primary,
            next_request: AtomicU64::new(1),
        };
        Ok((pipeline, executor))
    }

    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn cache(&self) -> &ModelCache<E::Artifact> {
        &self.shared.cache
    }

    /// Rebuild the cell's model data in the background.
    ///
    /// On success the primary executor stores the result on the cell, runs
    /// `on_complete`, and refreshes the host if the cell's region is active.
    /// On failure the error is logged and nothing is published.
    pub fn update_model_data(
        &self,
        cell: &Arc<VoxelCell<E::Artifact>>,
        neighborhood: Neighborhood,
        on_complete: impl FnOnce() + Send + 'static,
    ) -> BuildTicket {
        let ticket = BuildTicket::new(self.next_request.fetch_add(1, Ordering::Relaxed), cell.id());
        let shared = Arc::clone(&self.shared);
        let primary = self.primary.clone();
        let cell = Arc::clone(cell);
        let job_ticket = ticket.clone();

        self.pool.spawn(move || {
            job_ticket.advance(BuildStatus::Computing);
            let outcome = contained(|| shared.build_model_data(&cell, &neighborhood, &job_ticket));
            let data = match outcome {
                Ok(data) => Arc::new(data),
                Err(err) => {
                    job_ticket.fail();
                    error!("Failed to update model data for cell {}: {}", cell.id(), err);
                    job_ticket.advance(BuildStatus::Done);
                    return;
                }
            };

            job_ticket.advance(BuildStatus::Publishing);
            let publish_ticket = job_ticket.clone();
            let task: PrimaryTask = Box::new(move |host: &mut dyn HostContext| {
                debug!("Publishing {} model layers for cell {}", data.len(), cell.id());
                cell.set_model_data(data);
                // Callbacks run host code; a panic must not stall the ticket
                // or the rest of the primary queue.
                let notified = contained(|| {
                    on_complete();
                    if host.active_region() == Some(cell.region()) {
                        host.request_model_data_refresh(cell.id());
                        host.mark_cell_updated(cell.id());
                    }
                    Ok(())
                });
                if let Err(err) = notified {
                    error!("Completion callbacks for cell {} failed: {}", cell.id(), err);
                }
                publish_ticket.advance(BuildStatus::Done);
            });
            if primary.send(task).is_err() {
                job_ticket.fail();
                warn!("Primary executor dropped; discarding model for cell {}", job_ticket.cell());
                job_ticket.advance(BuildStatus::Done);
            }
        });

        ticket
    }

    /// Build one artifact per contained state and layer, handing the result
    /// to `consumer` on a worker thread. The cell is not modified. Failures
    /// are logged and yield an empty result.
    pub fn compute_per_contained_state(
        &self,
        cell: &Arc<VoxelCell<E::Artifact>>,
        neighborhood: Neighborhood,
        consumer: impl FnOnce(PerStateModels<E::Artifact>) + Send + 'static,
    ) {
        let shared = Arc::clone(&self.shared);
        let cell = Arc::clone(cell);
        self.pool.spawn(move || {
            let models = contained(|| shared.build_per_state(&cell, &neighborhood)).unwrap_or_else(|err| {
                error!("Failed to compute per-state models for cell {}: {}", cell.id(), err);
                PerStateModels::default()
            });
            consumer(models);
        });
    }
}
