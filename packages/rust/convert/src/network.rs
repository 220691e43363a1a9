//! Directed graph of formats and adapters, with lazy path execution.
//!
//! Paths are minimum-cost routes found with Dijkstra's algorithm. Among
//! routes of equal cost the one reached first through earlier-registered
//! edges wins, which keeps conversions reproducible when weights are uniform.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use jobdex_shared::{JobdexError, Result};
use tracing::{debug, instrument, warn};

use crate::adapter::Adapter;
use crate::payload::Payload;

struct Edge {
    from: usize,
    to: usize,
    adapter: Arc<dyn Adapter>,
}

/// The conversion network: format nodes joined by adapter edges.
pub struct ConversionNetwork {
    formats: Vec<String>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    /// Outgoing edge ids per node, in registration order.
    outgoing: Vec<Vec<usize>>,
}

impl ConversionNetwork {
    /// Build a network from format names and adapters.
    ///
    /// Adapter endpoints missing from `formats` are added as nodes.
    pub fn new(
        formats: impl IntoIterator<Item = String>,
        adapters: impl IntoIterator<Item = Arc<dyn Adapter>>,
    ) -> Self {
        let mut network = Self {
            formats: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            outgoing: Vec::new(),
        };
        for name in formats {
            network.node(&name);
        }
        for adapter in adapters {
            let from = network.node(adapter.source());
            let to = network.node(adapter.target());
            debug!(adapter = %adapter.name(), "adding adapter to network");
            network.outgoing[from].push(network.edges.len());
            network.edges.push(Edge { from, to, adapter });
        }
        network
    }

    fn node(&mut self, name: &str) -> usize {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.formats.len();
        self.formats.push(name.to_string());
        self.index.insert(name.to_string(), id);
        self.outgoing.push(Vec::new());
        id
    }

    pub fn has_format(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn formats(&self) -> impl Iterator<Item = &str> {
        self.formats.iter().map(String::as_str)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Minimum-cost chain of adapters leading from `source` to `target`.
    ///
    /// Returns an empty chain when both formats are the same.
    pub fn find_path(&self, source: &str, target: &str) -> Result<Vec<Arc<dyn Adapter>>> {
        let no_path = || JobdexError::NoConversionPath {
            source_format: source.to_string(),
            target_format: target.to_string(),
        };
        if source == target {
            return Ok(Vec::new());
        }
        let (Some(&start), Some(&goal)) = (self.index.get(source), self.index.get(target)) else {
            return Err(no_path());
        };

        let mut cost: Vec<Option<u64>> = vec![None; self.formats.len()];
        let mut via: Vec<Option<usize>> = vec![None; self.formats.len()];
        let mut queue = BinaryHeap::new();
        let mut pushed: usize = 0;

        cost[start] = Some(0);
        queue.push(Reverse((0_u64, pushed, start)));

        while let Some(Reverse((dist, _, node))) = queue.pop() {
            if cost[node].is_some_and(|best| dist > best) {
                continue;
            }
            if node == goal {
                break;
            }
            for &edge_id in &self.outgoing[node] {
                let edge = &self.edges[edge_id];
                let next = dist + u64::from(edge.adapter.weight());
                if cost[edge.to].is_none_or(|best| next < best) {
                    cost[edge.to] = Some(next);
                    via[edge.to] = Some(edge_id);
                    pushed += 1;
                    queue.push(Reverse((next, pushed, edge.to)));
                }
            }
        }

        if cost[goal].is_none() {
            return Err(no_path());
        }
        let mut chain = Vec::new();
        let mut node = goal;
        while let Some(edge_id) = via[node] {
            let edge = &self.edges[edge_id];
            chain.push(edge.adapter.clone());
            node = edge.from;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Convert `payload` into `target` along the cheapest path.
    ///
    /// The whole conversion fails on the first adapter error; no other path
    /// is attempted.
    #[instrument(skip_all, fields(source = %payload.format(), target = %target))]
    pub fn convert(&self, payload: Payload, target: &str) -> Result<Payload> {
        let path = self.find_path(payload.format(), target)?;
        let mut current = payload;
        for adapter in path {
            let name = adapter.name();
            debug!(adapter = %name, "applying adapter");
            let output = adapter
                .convert(current)
                .map_err(|e| JobdexError::adapter(name.clone(), e))?;
            if output.format() != adapter.target() {
                return Err(JobdexError::adapter(
                    name,
                    format!(
                        "produced '{}' but declares '{}'",
                        output.format(),
                        adapter.target()
                    ),
                ));
            }
            current = output;
        }
        Ok(current)
    }

    /// Lazily convert every payload of `sources` into `target`.
    ///
    /// With `ignore_errors`, failing items are logged and skipped. Without
    /// it, the first failure is yielded and the sequence ends.
    pub fn converted<I>(&self, sources: I, target: &str, ignore_errors: bool) -> Converted<'_, I::IntoIter>
    where
        I: IntoIterator<Item = Payload>,
    {
        Converted {
            network: self,
            sources: sources.into_iter(),
            target: target.to_string(),
            ignore_errors,
            done: false,
        }
    }
}

/// Convert `source` into `target_format` using `network`.
pub fn convert(source: Payload, target_format: &str, network: &ConversionNetwork) -> Result<Payload> {
    network.convert(source, target_format)
}

/// Lazily convert `sources` into `target_format` using `network`.
pub fn converted<'a, I>(
    sources: I,
    target_format: &str,
    network: &'a ConversionNetwork,
    ignore_errors: bool,
) -> Converted<'a, I::IntoIter>
where
    I: IntoIterator<Item = Payload>,
{
    network.converted(sources, target_format, ignore_errors)
}

/// Iterator returned by [`ConversionNetwork::converted`].
pub struct Converted<'a, I> {
    network: &'a ConversionNetwork,
    sources: I,
    target: String,
    ignore_errors: bool,
    done: bool,
}

impl<I: Iterator<Item = Payload>> Iterator for Converted<'_, I> {
    type Item = Result<Payload>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let source = self.sources.next()?;
            match self.network.convert(source, &self.target) {
                Ok(converted) => return Some(Ok(converted)),
                Err(e) if self.ignore_errors => {
                    warn!(error = %e, target = %self.target, "skipping payload that failed to convert");
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
