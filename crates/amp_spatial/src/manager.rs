//! The layer graph and its per-tick demand propagation, build, and
//! cleanup passes (§4, C4). This is the orchestrator every concrete
//! layer (voronoi points, triangulation, heightmap, road, terrain)
//! plugs into as a [`LayerNode`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use amp_core::{Error, Result, WorldgenError};
use amp_math::rect2::Rect2;
use async_trait::async_trait;
use glam::Vec2;

use crate::chunk::{ChunkIndex, ChunkKey, Lod};

/// One node in the layer dependency graph. Each concrete layer (the
/// Voronoi-points layer, the triangulation layer, the heightmap layer,
/// the road layer, the terrain layer) implements this and is wired
/// into a [`LayerManager`] via [`LayerManager::insert_layer`] and
/// [`LayerManager::add_dependency`].
#[async_trait]
pub trait LayerNode: Send + Sync {
    /// Stable name used as this layer's key in the dependency graph
    /// and in log output. Must be unique within one manager.
    fn name(&self) -> &'static str;

    /// Side length of this layer's own chunk tiling.
    fn chunk_size(&self) -> f32;

    /// How far (in world units) this layer's chunks must be grown
    /// before converting to a request against its parents (invariant
    /// 3). Measured in this layer's own space, regardless of what its
    /// parents' chunk sizes are.
    fn padding(&self) -> f32;

    /// Whether this layer distinguishes LOD at all. Layers that don't
    /// (Voronoi points, triangulation) always build at `Lod::default()`
    /// and are invisible to the LOD schedule.
    fn lod_aware(&self) -> bool {
        true
    }

    fn is_loaded(&self, index: ChunkIndex, lod: Lod) -> bool;

    /// Build and insert the chunk at `(index, lod)` into this layer's
    /// registry. Implementations may assume every parent chunk this
    /// build needs is already loaded (the manager's demand propagation
    /// guarantees this per invariant 3) and should treat a missing
    /// parent as a programmer error, not a retryable condition.
    async fn build_and_store(&self, index: ChunkIndex, lod: Lod) -> Result<()>;

    fn unload(&self, index: ChunkIndex, lod: Lod);

    fn loaded_keys(&self) -> Vec<ChunkKey>;

    /// Post-build hook invoked once per tick, after every layer's
    /// build wave for that tick has completed, for every currently
    /// loaded chunk (not just ones built this tick). Most layers leave
    /// this as a no-op; the terrain layer uses it to re-subdivide its
    /// quad-trees toward `reference` every tick regardless of whether
    /// the chunk itself was just (re)built.
    fn refresh(&self, _reference: Vec2) {}
}

struct LayerEntry {
    node: Arc<dyn LayerNode>,
    /// Layers this layer depends on (must build before it).
    depends_on: Vec<String>,
    /// Layers that depend on this layer.
    dependents: Vec<String>,
}

type DemandMap = HashMap<String, HashSet<(ChunkIndex, Lod)>>;

/// One tick's build wave, spawned onto `runtime` and polled (never
/// awaited to completion) from `update()`.
struct InFlightBuild {
    handle: tokio::task::JoinHandle<Result<DemandMap>>,
    camera: Vec2,
}

/// Owns the layer graph, the async runtime layer builds execute on,
/// and the per-tick demand/build/cleanup cycle.
pub struct LayerManager {
    runtime: tokio::runtime::Runtime,
    layers: Mutex<HashMap<String, LayerEntry>>,
    lod_max_distances: Vec<f32>,
    in_flight: Mutex<Option<InFlightBuild>>,
}

impl LayerManager {
    pub fn new(lod_max_distances: Vec<f32>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::internal(format!("failed to start worldgen runtime: {e}")))?;

        Ok(Self {
            runtime,
            layers: Mutex::new(HashMap::new()),
            lod_max_distances,
            in_flight: Mutex::new(None),
        })
    }

    /// Register a layer. Errors if the name is already taken.
    pub fn insert_layer(&self, node: Arc<dyn LayerNode>) -> Result<()> {
        let name = node.name().to_string();
        let mut layers = self.layers.lock().expect("layer manager poisoned");
        if layers.contains_key(&name) {
            return Err(Error::from(WorldgenError::topology(format!(
                "layer '{name}' is already registered"
            ))));
        }
        layers.insert(
            name,
            LayerEntry {
                node,
                depends_on: Vec::new(),
                dependents: Vec::new(),
            },
        );
        Ok(())
    }

    /// Declare that `child` depends on `parent`: `parent` must build a
    /// chunk before `child` can build any chunk that needs it, and
    /// `parent`'s demand propagation must account for `child`'s. Errors
    /// if either name is unregistered or the edge would introduce a
    /// cycle.
    pub fn add_dependency(&self, child: &str, parent: &str) -> Result<()> {
        let mut layers = self.layers.lock().expect("layer manager poisoned");
        if !layers.contains_key(child) {
            return Err(Error::from(WorldgenError::topology(format!(
                "unknown layer '{child}'"
            ))));
        }
        if !layers.contains_key(parent) {
            return Err(Error::from(WorldgenError::topology(format!(
                "unknown layer '{parent}'"
            ))));
        }
        if child == parent {
            return Err(Error::from(WorldgenError::topology(format!(
                "layer '{child}' cannot depend on itself"
            ))));
        }
        if Self::reaches(&layers, child, parent) {
            return Err(Error::from(WorldgenError::topology(format!(
                "dependency '{child}' -> '{parent}' would introduce a cycle"
            ))));
        }

        layers.get_mut(child).unwrap().depends_on.push(parent.to_string());
        layers.get_mut(parent).unwrap().dependents.push(child.to_string());
        Ok(())
    }

    /// Whether `from` can reach `to` by following `depends_on` edges.
    fn reaches(layers: &HashMap<String, LayerEntry>, from: &str, to: &str) -> bool {
        let mut stack = vec![from.to_string()];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(entry) = layers.get(&current) {
                stack.extend(entry.depends_on.iter().cloned());
            }
        }
        false
    }

    /// Parents-first topological order (Kahn's algorithm). Cycle-free
    /// by construction, since `add_dependency` rejects edges that
    /// would create one.
    pub fn topo_order(&self) -> Vec<String> {
        let layers = self.layers.lock().expect("layer manager poisoned");
        let mut in_degree: HashMap<String, usize> =
            layers.iter().map(|(name, e)| (name.clone(), e.depends_on.len())).collect();
        let mut ready: Vec<String> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(name, _)| name.clone())
            .collect();
        ready.sort();

        let mut order = Vec::with_capacity(layers.len());
        let mut queue = ready;
        while let Some(name) = queue.pop() {
            order.push(name.clone());
            let entry = &layers[&name];
            let mut newly_ready = Vec::new();
            for dependent in &entry.dependents {
                let deg = in_degree.get_mut(dependent).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    newly_ready.push(dependent.clone());
                }
            }
            newly_ready.sort();
            queue.extend(newly_ready);
        }
        order
    }

    /// Map a camera distance to an LOD index per the configured max
    /// distances (the first bucket whose max distance exceeds it, or
    /// the coarsest bucket beyond them all).
    pub fn lod_for(&self, distance: f32) -> Lod {
        for (lod, &max_distance) in self.lod_max_distances.iter().enumerate() {
            if distance <= max_distance {
                return lod as Lod;
            }
        }
        self.lod_max_distances.len().saturating_sub(1).max(0) as Lod
    }

    /// Compute the set of `(ChunkIndex, Lod)` every registered layer
    /// must have loaded this tick, per invariant 3. Layers with no
    /// dependents are demand *sources*, seeded directly from the
    /// camera and render distance; every other layer's demand is the
    /// union of its dependents' demand rects, each grown by that
    /// dependent's own padding before being folded in (§4.6).
    pub fn propagate_demand(&self, camera: Vec2, render_distance: f32) -> DemandMap {
        let layers = self.layers.lock().expect("layer manager poisoned");
        let order = self.topo_order();

        let mut demand_rect: HashMap<String, Rect2> = HashMap::new();
        let source_rect = Rect2::new(
            camera - Vec2::splat(render_distance),
            Vec2::splat(render_distance * 2.0),
        );

        for name in order.iter().rev() {
            let entry = &layers[name];
            let mut rect: Option<Rect2> = if entry.dependents.is_empty() {
                Some(source_rect)
            } else {
                None
            };

            for dependent in &entry.dependents {
                let dependent_entry = &layers[dependent];
                let dependent_rect = demand_rect[dependent];
                let grown = dependent_rect.grow(dependent_entry.node.padding());
                rect = Some(match rect {
                    Some(r) => r.union(&grown),
                    None => grown,
                });
            }

            demand_rect.insert(
                name.clone(),
                rect.expect("every layer is either a demand source or has at least one dependent"),
            );
        }

        let mut demand: DemandMap = HashMap::new();
        for (name, entry) in layers.iter() {
            let rect = demand_rect[name];
            let chunk_size = entry.node.chunk_size();
            let mut wanted = HashSet::new();
            for index in ChunkIndex::covering(rect, chunk_size) {
                let lod = if entry.node.lod_aware() {
                    let center = index.bounds(chunk_size).center();
                    self.lod_for(center.distance(camera))
                } else {
                    Lod::default()
                };
                wanted.insert((index, lod));
            }
            demand.insert(name.clone(), wanted);
        }
        demand
    }

    /// Drive one tick of the build schedule (§4.6 step 1, §5). This
    /// never blocks waiting on a build: it polls whatever wave is
    /// already in flight with a zero-timeout check and returns
    /// immediately either way.
    ///
    /// - If a previous tick's wave hasn't finished, this call is a
    ///   no-op for scheduling — no new demand is computed, nothing is
    ///   (re)spawned.
    /// - If a previous tick's wave just finished, this call applies its
    ///   unload and refresh pass, then returns without starting a new
    ///   wave (so unload/refresh for wave N and scheduling of wave N+1
    ///   never share a call).
    /// - If no wave is in flight, this call computes fresh demand,
    ///   spawns the build wave for every layer (parents-first, each
    ///   layer's own chunks built concurrently via a `JoinSet`) onto
    ///   the background runtime, and returns without waiting on it.
    pub fn update(&self, camera: Vec2, render_distance: f32) -> Result<()> {
        let mut in_flight = self.in_flight.lock().expect("layer manager poisoned");

        if let Some(pending) = in_flight.as_ref() {
            if !pending.handle.is_finished() {
                return Ok(());
            }
        }

        if let Some(pending) = in_flight.take() {
            let demand = self
                .runtime
                .block_on(pending.handle)
                .map_err(|e| Error::internal(format!("layer build task panicked: {e}")))??;

            self.cleanup(&demand);
            let layers = self.layers.lock().expect("layer manager poisoned");
            for entry in layers.values() {
                entry.node.refresh(pending.camera);
            }
            return Ok(());
        }

        let demand = self.propagate_demand(camera, render_distance);
        let order = self.topo_order();
        let nodes: HashMap<String, Arc<dyn LayerNode>> = {
            let layers = self.layers.lock().expect("layer manager poisoned");
            layers.iter().map(|(name, e)| (name.clone(), e.node.clone())).collect()
        };

        let task_demand = demand;
        let handle = self.runtime.spawn(async move {
            for name in &order {
                let node = nodes[name].clone();
                let wanted = &task_demand[name];
                let mut set = tokio::task::JoinSet::new();
                for &(index, lod) in wanted {
                    if !node.is_loaded(index, lod) {
                        let node = node.clone();
                        set.spawn(async move { node.build_and_store(index, lod).await });
                    }
                }
                while let Some(joined) = set.join_next().await {
                    joined
                        .map_err(|e| Error::internal(format!("layer '{name}' build task panicked: {e}")))??;
                }
            }
            Ok::<DemandMap, Error>(task_demand)
        });

        *in_flight = Some(InFlightBuild { handle, camera });
        Ok(())
    }

    /// Whether a build wave is currently in flight — `true` between the
    /// `update()` call that spawned it and the later `update()` call
    /// whose poll observes it finished.
    pub fn is_building(&self) -> bool {
        self.in_flight.lock().expect("layer manager poisoned").is_some()
    }

    fn cleanup(&self, demand: &DemandMap) {
        let layers = self.layers.lock().expect("layer manager poisoned");
        for (name, entry) in layers.iter() {
            let wanted = &demand[name];
            let stale: Vec<ChunkKey> = entry
                .node
                .loaded_keys()
                .into_iter()
                .filter(|key| !wanted.contains(&(key.index, key.lod)))
                .collect();
            for key in stale {
                entry.node.unload(key.index, key.lod);
            }
        }
    }
}
