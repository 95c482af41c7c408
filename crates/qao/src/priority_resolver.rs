//! Computes integer priorities from a DAG of "A precedes B" / "A depends on
//! B" category declarations via a topological sort, matching
//! `QAO_PriorityResolver2`'s `resolveAll()` in spirit.

use engine_common::CoreError;
use hashbrown::HashMap;
use std::hash::Hash;

use crate::error::QaoError;

/// Whether an edge referencing an undeclared category is a hard error
/// or silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverMode {
    /// Every category referenced by an edge must have been declared.
    Strict,
    /// Edges referencing undeclared categories are skipped.
    Lenient,
}

/// Builds a dependency DAG over category keys and resolves it into a
/// `(key -> priority)` map, highest priority first.
pub struct PriorityResolver<K> {
    mode: ResolverMode,
    nodes: Vec<K>,
    index_of: HashMap<K, usize>,
    // edge (u, v) means u must be assigned a priority before v (u outranks v).
    edges: Vec<(usize, usize)>,
}

impl<K: Eq + Hash + Clone + std::fmt::Debug> PriorityResolver<K> {
    pub fn new(mode: ResolverMode) -> Self {
        Self {
            mode,
            nodes: Vec::new(),
            index_of: HashMap::new(),
            edges: Vec::new(),
        }
    }

    /// Declares a category. Declaring the same category twice is a no-op.
    pub fn add_category(&mut self, key: K) {
        if !self.index_of.contains_key(&key) {
            let idx = self.nodes.len();
            self.nodes.push(key.clone());
            self.index_of.insert(key, idx);
        }
    }

    fn resolve_index(&self, key: &K) -> Result<Option<usize>, QaoError> {
        match self.index_of.get(key) {
            Some(idx) => Ok(Some(*idx)),
            None => match self.mode {
                ResolverMode::Strict => Err(QaoError::Core(CoreError::InvalidArgument(format!(
                    "undeclared priority category {key:?}"
                )))),
                ResolverMode::Lenient => Ok(None),
            },
        }
    }

    /// Declares that `a` must be assigned a priority ranking ahead of `b`.
    pub fn precedes(&mut self, a: K, b: K) -> Result<(), QaoError> {
        let (Some(ua), Some(ub)) = (self.resolve_index(&a)?, self.resolve_index(&b)?) else {
            return Ok(());
        };
        self.edges.push((ua, ub));
        Ok(())
    }

    /// Declares that `a` depends on `b`, i.e. `b` must be assigned a
    /// priority ranking ahead of `a`.
    pub fn depends_on(&mut self, a: K, b: K) -> Result<(), QaoError> {
        self.precedes(b, a)
    }

    /// Resolves the DAG into priorities, starting at `start` and stepping
    /// by `-step` for each subsequent category in topological order
    /// (`step` should be positive; priorities strictly decrease).
    pub fn resolve(&self, start: i32, step: i32) -> Result<HashMap<K, i32>, QaoError> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        for &(u, v) in &self.edges {
            adjacency[u].push(v);
            in_degree[v] += 1;
        }

        // Stable ready queue: lowest declaration index first, so results are
        // deterministic for nodes with no relative ordering constraint.
        let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        ready.sort_unstable();

        let mut order = Vec::with_capacity(n);
        let mut cursor = 0;
        while cursor < ready.len() {
            let u = ready[cursor];
            cursor += 1;
            order.push(u);
            let mut newly_ready = Vec::new();
            for &v in &adjacency[u] {
                in_degree[v] -= 1;
                if in_degree[v] == 0 {
                    newly_ready.push(v);
                }
            }
            newly_ready.sort_unstable();
            ready.splice(cursor..cursor, newly_ready);
        }

        if order.len() != n {
            let stuck: Vec<String> = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| format!("{:?}", self.nodes[i]))
                .collect();
            return Err(QaoError::Core(CoreError::CyclicDependencies(format!(
                "categories involved in a cycle: {}",
                stuck.join(", ")
            ))));
        }

        let mut result = HashMap::with_capacity(n);
        let mut priority = start;
        for idx in order {
            result.insert(self.nodes[idx].clone(), priority);
            priority -= step;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_chain_resolves_in_order() {
        let mut r = PriorityResolver::new(ResolverMode::Strict);
        r.add_category("A");
        r.add_category("B");
        r.add_category("C");
        r.depends_on("B", "A").unwrap();
        r.depends_on("C", "A").unwrap();
        r.depends_on("C", "B").unwrap();
        let prios = r.resolve(1000, 10).unwrap();
        assert!(prios["A"] > prios["B"]);
        assert!(prios["B"] > prios["C"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let mut r = PriorityResolver::new(ResolverMode::Strict);
        r.add_category("A");
        r.add_category("B");
        r.add_category("C");
        r.precedes("A", "C").unwrap();
        r.precedes("C", "B").unwrap();
        r.precedes("B", "A").unwrap();
        assert!(r.resolve(1000, 10).is_err());
    }

    #[test]
    fn lenient_mode_skips_undeclared_categories() {
        let mut r = PriorityResolver::new(ResolverMode::Lenient);
        r.add_category("A");
        // "Ghost" was never declared; in lenient mode this is a no-op.
        r.precedes("A", "Ghost").unwrap();
        let prios = r.resolve(0, 1).unwrap();
        assert_eq!(prios.len(), 1);
    }

    #[test]
    fn strict_mode_rejects_undeclared_categories() {
        let mut r: PriorityResolver<&str> = PriorityResolver::new(ResolverMode::Strict);
        r.add_category("A");
        assert!(r.precedes("A", "Ghost").is_err());
    }
}
