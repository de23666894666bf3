//! The Flow: a directed acyclic graph of named operators.
//!
//! A Flow is a deliberately small, bespoke graph container rather than a
//! general graph library: node names map to operators, edges are name
//! pairs, and every traversal query returns sorted results so execution
//! order is deterministic.

use crate::context::{ExecutionContext, ERRORED_KEY};
use crate::engine::operator::{Operator, Payload, Sensors};
use crate::engine::runner::FlowRunner;
use crate::errors::{FlowError, WeirError};
use crate::registry::StepKind;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{info, warn};

/// A directed acyclic graph of operators describing one data pipeline.
#[derive(Debug, Default)]
pub struct Flow {
    nodes: HashMap<String, Operator>,
    edges: Vec<(String, String)>,
    has_run: bool,
}

impl Flow {
    /// Creates an empty flow.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named step to the DAG.
    ///
    /// # Errors
    ///
    /// Returns a [`FlowError`] when the name is already taken; duplicate
    /// names almost always hide a wiring mistake.
    pub fn add_node(&mut self, name: impl Into<String>, operator: Operator) -> Result<(), WeirError> {
        let name = name.into();
        if self.nodes.contains_key(&name) {
            return Err(FlowError::new(format!(
                "Flow already has a step named '{name}'"
            ))
            .into());
        }
        self.nodes.insert(name, operator);
        Ok(())
    }

    /// Links two steps. Adding the same edge twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a [`FlowError`] when either endpoint is not a node; edges
    /// may only reference names present in the node mapping.
    pub fn add_edge(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Result<(), WeirError> {
        let source = source.into();
        let target = target.into();
        for endpoint in [&source, &target] {
            if !self.nodes.contains_key(endpoint.as_str()) {
                return Err(FlowError::new(format!(
                    "cannot link unknown step '{endpoint}'"
                ))
                .into());
            }
        }
        let edge = (source, target);
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
        Ok(())
    }

    /// Number of nodes in the flow.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The names of outgoing links from a given step, sorted.
    #[must_use]
    pub fn outgoing(&self, name: &str) -> Vec<String> {
        let targets: BTreeSet<&String> = self
            .edges
            .iter()
            .filter(|(source, _)| source == name)
            .map(|(_, target)| target)
            .collect();
        targets.into_iter().cloned().collect()
    }

    /// Steps with no incoming links, sorted.
    #[must_use]
    pub fn entry_points(&self) -> Vec<String> {
        let targets: BTreeSet<&String> = self.edges.iter().map(|(_, target)| target).collect();
        let entries: BTreeSet<&String> = self
            .edges
            .iter()
            .map(|(source, _)| source)
            .filter(|source| !targets.contains(*source))
            .collect();
        entries.into_iter().cloned().collect()
    }

    /// Steps with no outgoing links, sorted.
    #[must_use]
    pub fn exit_points(&self) -> Vec<String> {
        let sources: BTreeSet<&String> = self.edges.iter().map(|(source, _)| source).collect();
        let exits: BTreeSet<&String> = self
            .edges
            .iter()
            .map(|(_, target)| target)
            .filter(|target| !sources.contains(*target))
            .collect();
        exits.into_iter().cloned().collect()
    }

    /// Reports whether the edge set contains no cycles.
    ///
    /// Repeatedly strips the current sinks from a working copy of the
    /// edge set. Each round removes at least one edge when the graph is
    /// acyclic; a round that removes nothing while edges remain proves a
    /// cycle.
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        let mut edges = self.edges.clone();
        while !edges.is_empty() {
            let sources: BTreeSet<String> =
                edges.iter().map(|(source, _)| source.clone()).collect();
            let exits: BTreeSet<String> = edges
                .iter()
                .map(|(_, target)| target.clone())
                .filter(|target| !sources.contains(target))
                .collect();
            if exits.is_empty() {
                return false;
            }
            edges.retain(|(_, target)| !exits.contains(target));
        }
        true
    }

    /// Looks up an operator by step name.
    #[must_use]
    pub fn operator(&self, name: &str) -> Option<&Operator> {
        self.nodes.get(name)
    }

    /// Looks up an operator by step name, mutably.
    pub fn operator_mut(&mut self, name: &str) -> Option<&mut Operator> {
        self.nodes.get_mut(name)
    }

    /// Checks the flow's structural invariants.
    ///
    /// # Errors
    ///
    /// Returns a [`FlowError`] unless the flow has more than one node,
    /// every exit point is the terminal `end` step kind, and the edge set
    /// is acyclic.
    pub fn validate(&self) -> Result<(), WeirError> {
        if self.nodes.len() <= 1 {
            return Err(FlowError::new(
                "Flow failed validation - Flows must have more than one Operator",
            )
            .into());
        }

        let all_ends = self.exit_points().iter().all(|exit| {
            self.operator(exit)
                .is_some_and(|operator| operator.kind() == StepKind::End)
        });
        if !all_ends {
            return Err(FlowError::new(
                "Flow failed validation - Flows must end with an end Operator",
            )
            .into());
        }

        if !self.is_acyclic() {
            return Err(FlowError::new("Flow failed validation - Flows must be acyclic").into());
        }

        Ok(())
    }

    /// Validates the flow and returns a bound runner.
    ///
    /// # Errors
    ///
    /// Returns a [`FlowError`] if the flow has already been run (a fresh
    /// flow must be rebuilt), or if validation fails.
    pub fn begin(&mut self) -> Result<FlowRunner<'_>, WeirError> {
        if self.has_run {
            return Err(FlowError::new(
                "Flows can only have a single runner, build the flow again to re-run it",
            )
            .into());
        }
        self.validate()?;
        Ok(FlowRunner::new(self))
    }

    /// Concludes the flow after a run, successful or not.
    ///
    /// Walks the synthetic terminal signal through the DAG so every
    /// operator observes a clean-shutdown call, emits every node's
    /// sensors to the audit log, and marks the flow as run.
    pub async fn finalize(&mut self, errored: bool) {
        let mut context = ExecutionContext::new();
        context.insert(ERRORED_KEY, json!(errored));

        let mut runner = FlowRunner::new(self);
        if let Err(err) = runner.run(Payload::Shutdown, context, 0.0).await {
            warn!(error = %err, "shutdown signal did not reach every operator");
        }

        for sensors in self.sensor_sweep() {
            match serde_json::to_string(&sensors) {
                Ok(encoded) => info!(target: "weir::audit", sensors = %encoded, "operator sensors"),
                Err(err) => warn!(error = %err, "failed to encode sensors"),
            }
        }
        self.has_run = true;
    }

    /// Reads sensors for every node, in name order.
    #[must_use]
    pub fn sensor_sweep(&self) -> Vec<Sensors> {
        let mut names: Vec<&String> = self.nodes.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| self.nodes.get(name).map(Operator::sensors))
            .collect()
    }

    /// Whether the flow has already been run and finalized.
    #[must_use]
    pub const fn has_run(&self) -> bool {
        self.has_run
    }

    fn render_subtree(&self, f: &mut fmt::Formatter<'_>, node: &str, prefix: &str) -> fmt::Result {
        let tee = " ├─ ";
        let last = " └─ ";
        let branch = " │  ";
        let space = "    ";

        let children = self.outgoing(node);
        let count = children.len();
        for (index, child) in children.iter().enumerate() {
            let is_last = index + 1 == count;
            writeln!(f, "{prefix}{}{child}", if is_last { last } else { tee })?;
            let extension = if is_last { space } else { branch };
            self.render_subtree(f, child, &format!("{prefix}{extension}"))?;
        }
        Ok(())
    }
}

impl fmt::Display for Flow {
    /// Renders a depth-first, alphabetically ordered tree from each entry
    /// point. Diagnostics only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_acyclic() {
            return write!(f, "Flow: cannot represent cyclic flows");
        }
        for entry in self.entry_points() {
            writeln!(f, "{entry}")?;
            self.render_subtree(f, &entry, "")?;
        }
        Ok(())
    }
}
