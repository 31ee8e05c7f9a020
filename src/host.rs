use crate::backend::Backend;
use crate::builder::{BuildOutput, Builder, Expanders};
use crate::config::HostConfig;
use crate::descriptor::Descriptor;
use crate::dynamic::{DynamicValue, DynamicValues, ObserverId, Refresh};
use crate::environment::{Environment, ScenePhase, ScenePhaseKey};
use crate::error::{BuildError, CommitError};
use crate::identity::TagValue;
use crate::patch::{commit_partial, CommitStats, Patch, PatchKind};
use crate::reconcile::{reconcile, teardown, ReconcileStats};
use crate::scheduler::{Invalidator, Scheduler};
use crate::tree::{NodeId, NodeTree};
use tracing::{debug, info, info_span, warn};

/// What one pass did.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub generation: u64,
    /// True if every node took over a node from the previous pass.
    pub reused: bool,
    pub stats: ReconcileStats,
    pub commit: CommitStats,
    pub patches: Vec<Patch>,
    pub boundary_replacements: Vec<NodeId>,
    pub diagnostics: Vec<BuildError>,
    pub refresh: Refresh,
}

/// Connects a root descriptor to a native backend.
///
/// The host owns everything a pass needs: the ambient environment, the dynamic value registry and
/// the tree from the previous pass. All of it is only touched from the thread that calls
/// [`Host::poll`]; other threads go through the [`Invalidator`].
pub struct Host<B: Backend> {
    config: HostConfig,
    backend: B,
    root: Box<dyn FnMut(&Environment) -> Descriptor>,
    expanders: Expanders,
    environment: Environment,
    build_environment: Option<Environment>,
    scheduler: Scheduler,
    dynamic: DynamicValues,
    tree: Option<NodeTree>,
    /// Destroys a broken-off commit never reached. Their widgets are in no tree.
    orphans: Vec<Patch>,
    full_rebuild: bool,
    build_count: u64,
    last_report: Option<PassReport>,
}

impl<B: Backend> Host<B> {
    /// Creates a new Host.
    ///
    /// The initial pass is scheduled, but nothing is built until you call `poll`.
    pub fn new<F>(backend: B, config: HostConfig, root: F) -> Host<B>
    where
        F: FnMut(&Environment) -> Descriptor + 'static,
    {
        let scheduler = Scheduler::new();
        scheduler.invalidator().request_rebuild();

        Host {
            config,
            backend,
            root: Box::new(root),
            expanders: Expanders::new(),
            environment: Environment::new(),
            build_environment: None,
            scheduler,
            dynamic: DynamicValues::new(),
            tree: None,
            orphans: Vec::new(),
            full_rebuild: false,
            build_count: 0,
            last_report: None,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Returns a handle that can request rebuilds from any thread.
    pub fn invalidator(&self) -> Invalidator {
        self.scheduler.invalidator()
    }

    pub fn request_rebuild(&self) -> u64 {
        self.scheduler.invalidator().request_rebuild()
    }

    /// Runs one turn: installs handed-over observers and runs a pass if one is due.
    pub fn poll(&mut self) -> Result<Option<PassReport>, CommitError<B::Error>> {
        let turn = self.scheduler.turn();
        for observer in turn.registrations {
            self.dynamic.register_boxed(observer);
        }
        match turn.rebuild {
            Some(generation) => self.pass(generation).map(Some),
            None => Ok(None),
        }
    }

    /// Runs a pass immediately at the current generation, regardless of pending requests.
    pub fn rebuild_now(&mut self) -> Result<PassReport, CommitError<B::Error>> {
        let generation = self.scheduler.generation();
        self.pass(generation)
    }

    fn pass(&mut self, generation: u64) -> Result<PassReport, CommitError<B::Error>> {
        let span = info_span!("rebuild", generation, surface = %self.config.surface);
        let _enter = span.enter();

        let override_env = self.build_environment.take();
        let env = override_env.as_ref().unwrap_or(&self.environment).clone();

        let descriptor = (self.root)(&env);
        let BuildOutput {
            mut tree,
            diagnostics,
        } = Builder::new(&self.expanders, self.config.max_depth).build_root(&descriptor, &env);

        let reuse_nodes = self.config.reuse_nodes && !std::mem::take(&mut self.full_rebuild);
        let reconciliation = reconcile(&mut tree, self.tree.as_ref(), reuse_nodes);

        let committed = match self.destroy_orphans(&mut tree) {
            Ok(reclaimed) => {
                let outcome = commit_partial(&reconciliation.patches, &mut tree, &mut self.backend);
                self.orphans
                    .extend(outcome.unapplied_destroys(&reconciliation.patches));
                match outcome.error {
                    Some(err) => Err(err),
                    None => Ok(CommitStats {
                        destroyed: outcome.stats.destroyed + reclaimed,
                        ..outcome.stats
                    }),
                }
            }
            Err(err) => {
                self.orphans.extend(
                    reconciliation
                        .patches
                        .iter()
                        .filter(|patch| patch.kind() == PatchKind::Destroy)
                        .copied(),
                );
                Err(err)
            }
        };

        // the new tree is the previous tree from now on, even if the commit broke off
        self.tree = Some(tree);
        self.scheduler.mark_built(generation);
        self.build_count += 1;

        let refresh = self
            .dynamic
            .refresh_all(&self.environment, override_env.as_ref());
        debug!(refreshed = refresh.refreshed, missing = refresh.missing.len(), "refreshed dynamic values");

        let commit_stats = committed.map_err(|err| {
            warn!(%err, orphans = self.orphans.len(), "commit broke off");
            err
        })?;

        info!(
            nodes = self.tree.as_ref().map_or(0, NodeTree::len),
            reused = reconciliation.reused,
            created = reconciliation.stats.created,
            destroyed = reconciliation.stats.destroyed,
            boundaries = reconciliation.boundary_replacements.len(),
            diagnostics = diagnostics.len(),
            "pass complete"
        );

        let report = PassReport {
            generation,
            reused: reconciliation.reused,
            stats: reconciliation.stats,
            commit: commit_stats,
            patches: reconciliation.patches,
            boundary_replacements: reconciliation.boundary_replacements,
            diagnostics,
            refresh,
        };
        self.last_report = Some(report.clone());
        Ok(report)
    }

    /// Destroys widgets left behind by an earlier commit that broke off. Returns how many went.
    fn destroy_orphans(&mut self, tree: &mut NodeTree) -> Result<usize, CommitError<B::Error>> {
        if self.orphans.is_empty() {
            return Ok(0);
        }
        let orphans = std::mem::take(&mut self.orphans);
        debug!(orphans = orphans.len(), "destroying orphaned widgets");
        let outcome = commit_partial(&orphans, tree, &mut self.backend);
        // the failed destroy is not retried
        self.orphans.extend(outcome.unapplied_destroys(&orphans));
        match outcome.error {
            Some(err) => Err(err),
            None => Ok(outcome.stats.destroyed),
        }
    }

    /// Number of widgets whose destruction is still outstanding after a failed commit.
    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// The ambient environment.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Replaces the ambient environment with a derived one and requests a rebuild.
    pub fn update_environment(&mut self, f: impl FnOnce(&Environment) -> Environment) {
        self.environment = f(&self.environment);
        self.request_rebuild();
    }

    pub fn set_scene_phase(&mut self, phase: ScenePhase) {
        if self.environment.get::<ScenePhaseKey>() != phase {
            debug!(%phase, "scene phase changed");
            self.update_environment(|env| env.with::<ScenePhaseKey>(phase));
        }
    }

    /// Builds the next pass under `env` instead of the ambient environment. Applies to one pass.
    pub fn set_build_environment(&mut self, env: Environment) {
        self.build_environment = Some(env);
        self.request_rebuild();
    }

    /// Rebuilds every native widget below the root on the next pass, e.g. after the surface's
    /// geometry changed wholesale.
    pub fn invalidate_all(&mut self) {
        self.full_rebuild = true;
        self.request_rebuild();
    }

    pub fn expanders_mut(&mut self) -> &mut Expanders {
        &mut self.expanders
    }

    pub fn register_observer<O: DynamicValue + 'static>(&mut self, observer: O) -> ObserverId {
        self.dynamic.register(observer)
    }

    pub fn unregister_observer(&mut self, id: ObserverId) -> bool {
        self.dynamic.unregister(id)
    }

    /// The tree of the last pass.
    pub fn tree(&self) -> Option<&NodeTree> {
        self.tree.as_ref()
    }

    /// Returns the element value that produced a keyed node of the last pass.
    pub fn tag_of(&self, node: NodeId) -> Option<&TagValue> {
        self.tree.as_ref()?.tag_value(node)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Number of passes run.
    pub fn build_count(&self) -> u64 {
        self.build_count
    }

    pub fn last_report(&self) -> Option<&PassReport> {
        self.last_report.as_ref()
    }

    /// Destroys all native widgets, including the root. The next pass starts from scratch.
    pub fn teardown(&mut self) -> Result<(), CommitError<B::Error>> {
        if let Some(mut tree) = self.tree.take() {
            if let Err(err) = self.destroy_orphans(&mut tree) {
                self.tree = Some(tree);
                return Err(err);
            }
            let patches = teardown(&tree);
            debug!(patches = patches.len(), "tearing down");
            let outcome = commit_partial(&patches, &mut tree, &mut self.backend);
            self.orphans.extend(outcome.unapplied_destroys(&patches));
            if let Some(err) = outcome.error {
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Container, Leaf, WidgetKind};
    use crate::dynamic::EnvValue;
    use crate::headless::Headless;
    use std::cell::Cell;
    use std::rc::Rc;

    fn host(builds: Rc<Cell<usize>>) -> Host<Headless> {
        Host::new(Headless::new(), HostConfig::default(), move |env| {
            builds.set(builds.get() + 1);
            Container::vstack()
                .child(Leaf::new(WidgetKind::new("phase")).prop("value", env.get::<ScenePhaseKey>().to_string()))
                .into()
        })
    }

    #[test]
    fn nothing_is_built_before_poll() {
        let builds = Rc::new(Cell::new(0));
        let mut host = host(Rc::clone(&builds));
        assert_eq!(builds.get(), 0);
        assert!(host.tree().is_none());

        let report = host.poll().unwrap().unwrap();
        assert_eq!(report.generation, 1);
        assert_eq!(builds.get(), 1);
        assert!(host.poll().unwrap().is_none());
        assert_eq!(host.build_count(), 1);
    }

    #[test]
    fn scene_phase_changes_rebuild() {
        let builds = Rc::new(Cell::new(0));
        let mut host = host(Rc::clone(&builds));
        host.poll().unwrap();

        host.set_scene_phase(ScenePhase::Background);
        let report = host.poll().unwrap().unwrap();
        assert!(report.reused);
        assert_eq!(report.stats.updated, 1);
        let root = host.tree().unwrap().root().unwrap();
        let root_handle = host.tree().unwrap()[root].handle().unwrap();
        assert_eq!(
            host.backend().describe(root_handle),
            "root[vstack[phase(value=\"background\")]]"
        );

        // setting the same phase again is not a change
        host.set_scene_phase(ScenePhase::Background);
        assert!(host.poll().unwrap().is_none());
    }

    #[test]
    fn build_environment_applies_to_one_pass() {
        let builds = Rc::new(Cell::new(0));
        let mut host = host(builds);
        let phase = EnvValue::<ScenePhaseKey>::new();
        host.register_observer(phase.clone());
        host.poll().unwrap();
        assert_eq!(phase.get(), ScenePhase::Active);

        host.set_build_environment(Environment::new().with::<ScenePhaseKey>(ScenePhase::Inactive));
        host.poll().unwrap();
        assert_eq!(phase.get(), ScenePhase::Inactive);

        host.rebuild_now().unwrap();
        assert_eq!(phase.get(), ScenePhase::Active);
    }

    #[test]
    fn invalidate_all_rebuilds_everything_once() {
        let mut host = host(Rc::new(Cell::new(0)));
        host.poll().unwrap();
        host.invalidate_all();
        let report = host.poll().unwrap().unwrap();
        assert!(!report.reused);
        assert_eq!(report.stats.created, 2);

        host.request_rebuild();
        assert!(host.poll().unwrap().unwrap().reused);
    }

    #[test]
    fn teardown_destroys_everything() {
        let mut host = host(Rc::new(Cell::new(0)));
        host.poll().unwrap();
        assert_eq!(host.backend().len(), 3);
        host.teardown().unwrap();
        assert!(host.backend().is_empty());
        assert!(host.tree().is_none());
    }
}
