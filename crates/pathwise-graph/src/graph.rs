//! Prerequisite DAG stored as an arena of skill records with index-based edge lists.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillCategory {
    Language,
    Framework,
    Algorithm,
    Design,
    Tool,
    Concept,
}

impl fmt::Display for SkillCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Language => f.write_str("language"),
            Self::Framework => f.write_str("framework"),
            Self::Algorithm => f.write_str("algorithm"),
            Self::Design => f.write_str("design"),
            Self::Tool => f.write_str("tool"),
            Self::Concept => f.write_str("concept"),
        }
    }
}

/// A published skill. Immutable once accepted by a [`SkillGraph`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Skill {
    pub id: String,
    pub category: SkillCategory,
    #[serde(default)]
    pub prerequisites: BTreeSet<String>,
}

impl Skill {
    #[must_use]
    pub fn new(id: impl Into<String>, category: SkillCategory) -> Self {
        Self {
            id: id.into(),
            category,
            prerequisites: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_prerequisites<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites
            .extend(prerequisites.into_iter().map(Into::into));
        self
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Default)]
pub struct SkillGraph {
    nodes: Vec<Skill>,
    index: HashMap<String, usize>,
    /// `edges[i]` holds the arena indices of the direct prerequisites of node `i`.
    edges: Vec<Vec<usize>>,
}

impl SkillGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a full set of skills, in any order.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate ids, prerequisites that name no skill in the set,
    /// or a prerequisite cycle.
    pub fn from_skills(skills: impl IntoIterator<Item = Skill>) -> Result<Self, GraphError> {
        let mut graph = Self::default();
        for skill in skills {
            validate_id(&skill.id)?;
            if graph.index.contains_key(&skill.id) {
                return Err(GraphError::Duplicate(skill.id));
            }
            graph.index.insert(skill.id.clone(), graph.nodes.len());
            graph.nodes.push(skill);
        }
        for idx in 0..graph.nodes.len() {
            let edges = graph.resolve_edges(idx)?;
            graph.edges.push(edges);
        }
        if let Some(cycle) = graph.find_cycle(0..graph.nodes.len()) {
            return Err(GraphError::Cycle { cycle });
        }
        tracing::debug!(skills = graph.nodes.len(), "skill graph loaded");
        Ok(graph)
    }

    /// Append a skill. The mutation is validated on a candidate copy and only committed
    /// when the result is still acyclic.
    ///
    /// Returns `false` when an identical skill is already published.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is already published with different content, a
    /// prerequisite is unknown, or the addition would introduce a cycle.
    pub fn publish(&mut self, skill: Skill) -> Result<bool, GraphError> {
        validate_id(&skill.id)?;
        if let Some(&idx) = self.index.get(&skill.id) {
            if self.nodes[idx] == skill {
                return Ok(false);
            }
            return Err(GraphError::Immutable(skill.id));
        }

        let mut candidate = self.clone();
        let idx = candidate.nodes.len();
        candidate.index.insert(skill.id.clone(), idx);
        candidate.nodes.push(skill);
        let edges = candidate.resolve_edges(idx)?;
        candidate.edges.push(edges);
        if let Some(cycle) = candidate.find_cycle(std::iter::once(idx)) {
            return Err(GraphError::Cycle { cycle });
        }

        *self = candidate;
        Ok(true)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Skill> {
        self.index.get(id).map(|&idx| &self.nodes[idx])
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Skills in publication order.
    pub fn skills(&self) -> impl Iterator<Item = &Skill> {
        self.nodes.iter()
    }

    /// Direct prerequisites of `id`, ascending by identifier.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::UnknownSkill` if `id` is not published.
    pub fn prerequisites_of(&self, id: &str) -> Result<Vec<&Skill>, GraphError> {
        let idx = self.index_of(id)?;
        let mut prerequisites: Vec<&Skill> =
            self.edges[idx].iter().map(|&p| &self.nodes[p]).collect();
        prerequisites.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(prerequisites)
    }

    /// All direct and indirect prerequisites of `id`.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::UnknownSkill` if `id` is not published.
    pub fn transitive_prerequisites(&self, id: &str) -> Result<BTreeSet<String>, GraphError> {
        let start = self.index_of(id)?;
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = self.edges[start].clone();
        let mut out = BTreeSet::new();
        while let Some(idx) = stack.pop() {
            if std::mem::replace(&mut seen[idx], true) {
                continue;
            }
            out.insert(self.nodes[idx].id.clone());
            stack.extend(self.edges[idx].iter().copied());
        }
        Ok(out)
    }

    /// Deterministic topological order of `subset`, prerequisites first.
    ///
    /// A member is placed after every other member it reaches through prerequisite
    /// edges, including paths that pass through skills outside the subset. Among skills
    /// that are ready at the same time, the lowest identifier comes first.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::UnknownSkill` for ids that are not published and
    /// `GraphError::Cycle` if a cycle is reachable from any member of the subset.
    pub fn topological_order<I, S>(&self, subset: I) -> Result<Vec<String>, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut members = BTreeSet::new();
        for id in subset {
            members.insert(self.index_of(id.as_ref())?);
        }
        if let Some(cycle) = self.find_cycle(members.iter().copied()) {
            return Err(GraphError::Cycle { cycle });
        }

        let mut pending: HashMap<usize, usize> = HashMap::with_capacity(members.len());
        let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
        for &idx in &members {
            let reached = self.nearest_members(idx, &members);
            for &prereq in &reached {
                dependents.entry(prereq).or_default().push(idx);
            }
            pending.insert(idx, reached.len());
        }

        let mut ready: BinaryHeap<Reverse<(&str, usize)>> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(&idx, _)| Reverse((self.nodes[idx].id.as_str(), idx)))
            .collect();

        let mut order = Vec::with_capacity(members.len());
        while let Some(Reverse((id, idx))) = ready.pop() {
            order.push(id.to_owned());
            let Some(children) = dependents.get(&idx) else {
                continue;
            };
            for &child in children {
                if let Some(count) = pending.get_mut(&child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse((self.nodes[child].id.as_str(), child)));
                    }
                }
            }
        }

        if order.len() != members.len() {
            let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
            let cycle = members
                .iter()
                .map(|&idx| self.nodes[idx].id.clone())
                .filter(|id| !placed.contains(id.as_str()))
                .collect();
            return Err(GraphError::Cycle { cycle });
        }
        Ok(order)
    }

    /// Members reachable from `start` without passing through another member. Deeper
    /// members are ordered through the ones found here.
    fn nearest_members(&self, start: usize, members: &BTreeSet<usize>) -> Vec<usize> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = self.edges[start].clone();
        let mut found = Vec::new();
        while let Some(idx) = stack.pop() {
            if std::mem::replace(&mut seen[idx], true) {
                continue;
            }
            if members.contains(&idx) {
                found.push(idx);
            } else {
                stack.extend(self.edges[idx].iter().copied());
            }
        }
        found
    }

    fn index_of(&self, id: &str) -> Result<usize, GraphError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownSkill(id.to_owned()))
    }

    fn resolve_edges(&self, idx: usize) -> Result<Vec<usize>, GraphError> {
        let skill = &self.nodes[idx];
        skill
            .prerequisites
            .iter()
            .map(|prereq| {
                self.index
                    .get(prereq)
                    .copied()
                    .ok_or_else(|| GraphError::UnknownPrerequisite {
                        skill: skill.id.clone(),
                        prerequisite: prereq.clone(),
                    })
            })
            .collect()
    }

    /// Iterative DFS over prerequisite edges. Returns the offending path, first node
    /// repeated at the end, when a cycle is reachable from any start.
    fn find_cycle(&self, starts: impl IntoIterator<Item = usize>) -> Option<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        for start in starts {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            marks[start] = Mark::InProgress;
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                let Some(&child) = self.edges[node].get(frame.1) else {
                    marks[node] = Mark::Done;
                    stack.pop();
                    continue;
                };
                frame.1 += 1;
                match marks[child] {
                    Mark::Unvisited => {
                        marks[child] = Mark::InProgress;
                        stack.push((child, 0));
                    }
                    Mark::InProgress => {
                        let from = stack.iter().position(|&(n, _)| n == child).unwrap_or(0);
                        let mut cycle: Vec<String> = stack[from..]
                            .iter()
                            .map(|&(n, _)| self.nodes[n].id.clone())
                            .collect();
                        cycle.push(self.nodes[child].id.clone());
                        return Some(cycle);
                    }
                    Mark::Done => {}
                }
            }
        }
        None
    }

    #[cfg(test)]
    fn from_skills_unchecked(skills: Vec<Skill>) -> Self {
        let mut graph = Self::default();
        for skill in skills {
            graph.index.insert(skill.id.clone(), graph.nodes.len());
            graph.nodes.push(skill);
        }
        for idx in 0..graph.nodes.len() {
            let edges = graph.resolve_edges(idx).unwrap();
            graph.edges.push(edges);
        }
        graph
    }
}

fn validate_id(id: &str) -> Result<(), GraphError> {
    if id.trim().is_empty() {
        return Err(GraphError::Invalid("skill id must not be empty".into()));
    }
    if id.trim() != id {
        return Err(GraphError::Invalid(format!(
            "skill id has surrounding whitespace: {id:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(id: &str, prereqs: &[&str]) -> Skill {
        Skill::new(id, SkillCategory::Concept).with_prerequisites(prereqs.iter().copied())
    }

    fn sample() -> SkillGraph {
        SkillGraph::from_skills([
            skill("variables", &[]),
            skill("loops", &["variables"]),
            skill("functions", &["variables"]),
            skill("arrays", &["loops"]),
            skill("recursion", &["functions", "loops"]),
            skill("sorting", &["arrays", "recursion"]),
        ])
        .unwrap()
    }

    #[test]
    fn loads_in_any_order() {
        let graph = SkillGraph::from_skills([
            skill("arrays", &["loops"]),
            skill("loops", &[]),
        ])
        .unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.contains("arrays"));
    }

    #[test]
    fn rejects_cycle_at_load() {
        let err = SkillGraph::from_skills([
            skill("a", &["b"]),
            skill("b", &["c"]),
            skill("c", &["a"]),
        ])
        .unwrap_err();
        let GraphError::Cycle { cycle } = err else {
            panic!("expected cycle, got {err}");
        };
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 4);
    }

    #[test]
    fn rejects_self_prerequisite() {
        let err = SkillGraph::from_skills([skill("a", &["a"])]).unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }));
    }

    #[test]
    fn rejects_unknown_prerequisite() {
        let err = SkillGraph::from_skills([skill("arrays", &["loops"])]).unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnknownPrerequisite { ref skill, ref prerequisite }
                if skill == "arrays" && prerequisite == "loops"
        ));
    }

    #[test]
    fn rejects_duplicate_and_blank_ids() {
        assert!(matches!(
            SkillGraph::from_skills([skill("a", &[]), skill("a", &[])]),
            Err(GraphError::Duplicate(_))
        ));
        assert!(matches!(
            SkillGraph::from_skills([skill("  ", &[])]),
            Err(GraphError::Invalid(_))
        ));
    }

    #[test]
    fn prerequisites_sorted_by_id() {
        let graph = sample();
        let ids: Vec<&str> = graph
            .prerequisites_of("recursion")
            .unwrap()
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, ["functions", "loops"]);
        assert!(graph.prerequisites_of("variables").unwrap().is_empty());
        assert!(matches!(
            graph.prerequisites_of("nope"),
            Err(GraphError::UnknownSkill(_))
        ));
    }

    #[test]
    fn transitive_prerequisites_collects_all_ancestors() {
        let graph = sample();
        let all = graph.transitive_prerequisites("sorting").unwrap();
        let expected: BTreeSet<String> = ["arrays", "functions", "loops", "recursion", "variables"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn topological_order_breaks_ties_by_id() {
        let graph = sample();
        let order = graph
            .topological_order(["sorting", "recursion", "arrays", "loops", "functions", "variables"])
            .unwrap();
        assert_eq!(
            order,
            ["variables", "functions", "loops", "arrays", "recursion", "sorting"]
        );
    }

    #[test]
    fn topological_order_follows_skills_outside_subset() {
        let graph = sample();
        let order = graph.topological_order(["arrays", "variables"]).unwrap();
        assert_eq!(order, ["variables", "arrays"]);
        let order = graph.topological_order(["sorting", "variables", "arrays"]).unwrap();
        assert_eq!(order, ["variables", "arrays", "sorting"]);
    }

    #[test]
    fn topological_order_leaves_unrelated_members_to_id_order() {
        let graph = sample();
        let order = graph.topological_order(["sorting", "functions"]).unwrap();
        assert_eq!(order, ["functions", "sorting"]);
        let order = graph.topological_order(["recursion", "arrays"]).unwrap();
        assert_eq!(order, ["arrays", "recursion"]);
    }

    #[test]
    fn topological_order_is_stable_across_input_orderings() {
        let graph = sample();
        let a = graph.topological_order(["arrays", "loops", "recursion"]).unwrap();
        let b = graph.topological_order(["recursion", "arrays", "loops", "arrays"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn topological_order_unknown_skill() {
        let graph = sample();
        assert!(matches!(
            graph.topological_order(["loops", "ghost"]),
            Err(GraphError::UnknownSkill(id)) if id == "ghost"
        ));
    }

    #[test]
    fn topological_order_detects_reachable_cycle() {
        let graph = SkillGraph::from_skills_unchecked(vec![
            skill("a", &["b"]),
            skill("b", &["c"]),
            skill("c", &["b"]),
            skill("d", &[]),
        ]);
        assert!(matches!(
            graph.topological_order(["a"]),
            Err(GraphError::Cycle { .. })
        ));
        assert_eq!(graph.topological_order(["d"]).unwrap(), ["d"]);
    }

    #[test]
    fn publish_appends_and_validates() {
        let mut graph = sample();
        assert!(graph.publish(skill("graphs", &["recursion"])).unwrap());
        assert!(graph.contains("graphs"));
        assert!(!graph.publish(skill("graphs", &["recursion"])).unwrap());
    }

    #[test]
    fn publish_rejects_changed_skill_without_mutation() {
        let mut graph = sample();
        let err = graph.publish(skill("loops", &[])).unwrap_err();
        assert!(matches!(err, GraphError::Immutable(_)));
        assert_eq!(
            graph.get("loops").unwrap().prerequisites,
            BTreeSet::from(["variables".to_owned()])
        );
    }

    #[test]
    fn publish_rejects_unknown_prerequisite_without_mutation() {
        let mut graph = sample();
        let before = graph.len();
        assert!(graph.publish(skill("trees", &["pointers"])).is_err());
        assert_eq!(graph.len(), before);
        assert!(!graph.contains("trees"));
    }

    #[test]
    fn category_display() {
        assert_eq!(SkillCategory::Algorithm.to_string(), "algorithm");
        assert_eq!(SkillCategory::Tool.to_string(), "tool");
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn topological_order_respects_every_edge(
            edges in proptest::collection::vec((0usize..12, 0usize..12), 0..40)
        ) {
            // Only allow edges from higher to lower index so the graph is acyclic.
            let mut skills: Vec<Skill> = (0..12).map(|i| skill(&format!("s{i:02}"), &[])).collect();
            for (a, b) in edges {
                if a > b {
                    skills[a].prerequisites.insert(format!("s{b:02}"));
                }
            }
            let graph = SkillGraph::from_skills(skills.clone()).unwrap();
            let order = graph.topological_order(skills.iter().map(|s| s.id.as_str())).unwrap();
            prop_assert_eq!(order.len(), skills.len());
            let pos: HashMap<&str, usize> =
                order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
            for s in &skills {
                for p in &s.prerequisites {
                    prop_assert!(pos[p.as_str()] < pos[s.id.as_str()]);
                }
            }
        }

        #[test]
        fn subset_order_respects_indirect_prerequisites(
            edges in proptest::collection::vec((0usize..12, 0usize..12), 0..40),
            picked in proptest::collection::btree_set(0usize..12, 1..8)
        ) {
            let mut skills: Vec<Skill> = (0..12).map(|i| skill(&format!("s{i:02}"), &[])).collect();
            for (a, b) in edges {
                if a > b {
                    skills[a].prerequisites.insert(format!("s{b:02}"));
                }
            }
            let graph = SkillGraph::from_skills(skills).unwrap();
            let subset: Vec<String> = picked.iter().map(|i| format!("s{i:02}")).collect();
            let order = graph.topological_order(&subset).unwrap();
            prop_assert_eq!(order.len(), subset.len());
            for (i, id) in order.iter().enumerate() {
                let deeper = graph.transitive_prerequisites(id).unwrap();
                prop_assert!(order[i + 1..].iter().all(|later| !deeper.contains(later)));
            }
        }
    }
}
