//! Step graph - validated, immutable DAG of steps
//!
//! Steps are collected in a [`StepGraphBuilder`] and frozen into a
//! [`StepGraph`] by [`StepGraphBuilder::build`], which rejects missing
//! dependencies and cycles. The frozen graph has no mutating API.

use crate::error::{Error, Result};
use crate::id::StepId;
use crate::step::{BoxedStep, SharedStep};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

/// Collects steps before validation
#[derive(Default)]
pub struct StepGraphBuilder {
    steps: BTreeMap<StepId, SharedStep>,
}

impl StepGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step, rejecting duplicate IDs
    pub fn add(&mut self, step: BoxedStep) -> Result<&mut Self> {
        self.add_shared(Arc::from(step))
    }

    pub fn add_shared(&mut self, step: SharedStep) -> Result<&mut Self> {
        let id = step.id().clone();
        if self.steps.contains_key(&id) {
            return Err(Error::DuplicateStep(id));
        }
        self.steps.insert(id, step);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Validate dependencies and compute the topological order
    pub fn build(self) -> Result<StepGraph> {
        let mut dependencies: BTreeMap<StepId, BTreeSet<StepId>> = BTreeMap::new();
        let mut dependents: BTreeMap<StepId, BTreeSet<StepId>> = BTreeMap::new();

        for (id, step) in &self.steps {
            let deps = dependencies.entry(id.clone()).or_default();
            dependents.entry(id.clone()).or_default();
            for dep in step.depends_on() {
                if !self.steps.contains_key(dep) {
                    return Err(Error::MissingDependency {
                        step: id.clone(),
                        dependency: dep.clone(),
                    });
                }
                deps.insert(dep.clone());
            }
        }
        for (id, deps) in &dependencies {
            for dep in deps {
                dependents.entry(dep.clone()).or_default().insert(id.clone());
            }
        }

        let order = topological_order(&dependencies, &dependents)?;
        log::debug!("Built step graph with {} step(s)", order.len());

        Ok(StepGraph {
            steps: self.steps,
            order,
            dependencies,
            dependents,
        })
    }
}

/// Kahn's algorithm with a sorted ready set, so ties break by StepId
fn topological_order(
    dependencies: &BTreeMap<StepId, BTreeSet<StepId>>,
    dependents: &BTreeMap<StepId, BTreeSet<StepId>>,
) -> Result<Vec<StepId>> {
    let mut remaining: BTreeMap<&StepId, usize> = dependencies
        .iter()
        .map(|(id, deps)| (id, deps.len()))
        .collect();
    let mut ready: BTreeSet<&StepId> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(dependencies.len());

    while let Some(id) = ready.pop_first() {
        remaining.remove(id);
        order.push(id.clone());
        for dependent in dependents.get(id).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if remaining.is_empty() {
        Ok(order)
    } else {
        let stuck: BTreeSet<&StepId> = remaining.keys().copied().collect();
        Err(Error::Cycle {
            ids: find_cycle(&stuck, dependencies),
        })
    }
}

/// Follow dependencies among the unsorted nodes until one repeats
///
/// Every unsorted node still has an unsorted dependency, so the walk always
/// closes a loop. The result starts at the loop's smallest ID.
fn find_cycle(
    stuck: &BTreeSet<&StepId>,
    dependencies: &BTreeMap<StepId, BTreeSet<StepId>>,
) -> Vec<StepId> {
    let Some(start) = stuck.first() else {
        return Vec::new();
    };

    let mut path: Vec<&StepId> = Vec::new();
    let mut current: &StepId = start;
    loop {
        if let Some(pos) = path.iter().position(|seen| *seen == current) {
            let mut cycle: Vec<StepId> = path[pos..].iter().map(|id| (*id).clone()).collect();
            if let Some(min) = cycle
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.cmp(b.1))
                .map(|(i, _)| i)
            {
                cycle.rotate_left(min);
            }
            return cycle;
        }
        path.push(current);

        let next = dependencies
            .get(current)
            .into_iter()
            .flatten()
            .find(|dep| stuck.contains(dep));
        match next {
            Some(dep) => current = dep,
            None => return path.into_iter().cloned().collect(),
        }
    }
}

/// Immutable, validated step graph
pub struct StepGraph {
    steps: BTreeMap<StepId, SharedStep>,
    order: Vec<StepId>,
    dependencies: BTreeMap<StepId, BTreeSet<StepId>>,
    dependents: BTreeMap<StepId, BTreeSet<StepId>>,
}

impl StepGraph {
    pub fn empty() -> Self {
        Self {
            steps: BTreeMap::new(),
            order: Vec::new(),
            dependencies: BTreeMap::new(),
            dependents: BTreeMap::new(),
        }
    }

    pub fn get(&self, id: &StepId) -> Option<&SharedStep> {
        self.steps.get(id)
    }

    pub fn contains(&self, id: &StepId) -> bool {
        self.steps.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Deterministic topological order (dependencies first)
    pub fn order(&self) -> &[StepId] {
        &self.order
    }

    /// Steps in topological order
    pub fn steps(&self) -> impl Iterator<Item = &SharedStep> {
        self.order.iter().filter_map(|id| self.steps.get(id))
    }

    /// All IDs in sorted order
    pub fn ids(&self) -> impl Iterator<Item = &StepId> {
        self.steps.keys()
    }

    /// Direct dependencies of a step, de-duplicated and sorted
    pub fn dependencies_of(&self, id: &StepId) -> Vec<&StepId> {
        self.dependencies
            .get(id)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Every step that depends on `id`, directly or transitively, in
    /// topological order
    pub fn dependents_of(&self, id: &StepId) -> Vec<&StepId> {
        let mut seen: BTreeSet<&StepId> = BTreeSet::new();
        let mut queue: VecDeque<&StepId> = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents.get(current).into_iter().flatten() {
                if seen.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }
        self.order.iter().filter(|id| seen.contains(id)).collect()
    }

    /// Dependency levels: every step sits one wave after its deepest
    /// dependency, so steps within a wave are mutually independent
    pub fn waves(&self) -> Vec<Vec<&StepId>> {
        let position: BTreeMap<&StepId, usize> =
            self.order.iter().enumerate().map(|(i, id)| (id, i)).collect();
        depth_waves(self.order.len(), |idx| {
            self.dependencies
                .get(&self.order[idx])
                .into_iter()
                .flatten()
                .filter_map(|dep| position.get(dep).copied())
                .collect::<Vec<_>>()
        })
        .into_iter()
        .map(|wave| wave.into_iter().map(|idx| &self.order[idx]).collect())
        .collect()
    }
}

/// Group node indices by dependency depth. Nodes must be given in
/// topological order; `deps` returns the indices a node depends on.
pub(crate) fn depth_waves<I>(len: usize, mut deps: impl FnMut(usize) -> I) -> Vec<Vec<usize>>
where
    I: IntoIterator<Item = usize>,
{
    let mut level: Vec<usize> = Vec::with_capacity(len);
    let mut waves: Vec<Vec<usize>> = Vec::new();
    for idx in 0..len {
        let depth = deps(idx)
            .into_iter()
            .map(|d| level[d] + 1)
            .max()
            .unwrap_or(0);
        level.push(depth);
        if waves.len() <= depth {
            waves.resize_with(depth + 1, Vec::new);
        }
        waves[depth].push(idx);
    }
    waves
}

impl std::fmt::Debug for StepGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepGraph")
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}
