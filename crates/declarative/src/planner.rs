//! Execution planner - resolves declarations into a dependency-ordered plan

use crate::error::PlanError;
use crate::resource::ResourceDeclaration;
use crate::types::ResourceId;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// A declaration placed in the plan
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub declaration: ResourceDeclaration,
    /// Positions (in plan order) of the declarations this one waits for
    pub dependencies: Vec<usize>,
    /// 0 without dependencies, else 1 + the highest dependency rank
    pub rank: usize,
}

impl PlanNode {
    pub fn id(&self) -> &ResourceId {
        &self.declaration.id
    }
}

/// Declarations in a topological order.
///
/// Every node comes after all nodes it depends on. Among nodes with no
/// ordering constraint between them, caller-supplied order is kept.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    nodes: Vec<PlanNode>,
}

impl ExecutionPlan {
    /// Resolve references and compute the submission order
    pub fn resolve(mut declarations: Vec<ResourceDeclaration>) -> Result<Self, PlanError> {
        let mut index: HashMap<ResourceId, usize> = HashMap::with_capacity(declarations.len());
        for (i, decl) in declarations.iter().enumerate() {
            if index.insert(decl.id.clone(), i).is_some() {
                return Err(PlanError::Duplicate(decl.id.clone()));
            }
        }

        // Pin two-part references to the declaration they actually name
        for decl in &mut declarations {
            let from = decl.id.clone();
            for reference in decl.references_mut() {
                reference.target = resolve_target(&reference.target, &from, &index)?;
            }
            let mut depends_on = Vec::with_capacity(decl.depends_on.len());
            for target in &decl.depends_on {
                depends_on.push(resolve_target(target, &from, &index)?);
            }
            decl.depends_on = depends_on;
        }

        let deps: Vec<Vec<usize>> = declarations
            .iter()
            .map(|d| d.dependencies().iter().map(|t| index[t]).collect())
            .collect();

        let order = topological_order(&declarations, &deps)?;
        log::debug!(
            "Resolved {} declarations: {}",
            order.len(),
            order
                .iter()
                .map(|&i| declarations[i].id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut position = vec![0usize; declarations.len()];
        for (pos, &i) in order.iter().enumerate() {
            position[i] = pos;
        }

        let mut placed: Vec<(usize, PlanNode)> = declarations
            .into_iter()
            .enumerate()
            .map(|(i, declaration)| {
                let node = PlanNode {
                    declaration,
                    dependencies: deps[i].iter().map(|&d| position[d]).collect(),
                    rank: 0,
                };
                (position[i], node)
            })
            .collect();
        placed.sort_by_key(|(pos, _)| *pos);

        let mut plan = Self {
            nodes: placed.into_iter().map(|(_, node)| node).collect(),
        };
        plan.assign_ranks();
        Ok(plan)
    }

    fn assign_ranks(&mut self) {
        for pos in 0..self.nodes.len() {
            let rank = self.nodes[pos]
                .dependencies
                .iter()
                .map(|&d| self.nodes[d].rank + 1)
                .max()
                .unwrap_or(0);
            self.nodes[pos].rank = rank;
        }
    }

    /// Restrict the plan to nodes matching any target plus everything they
    /// depend on, transitively.
    ///
    /// Target format: "Kind" or "Kind.name"
    pub fn select(self, targets: &[String]) -> Self {
        if targets.is_empty() {
            return self;
        }

        let mut keep: Vec<bool> = self
            .nodes
            .iter()
            .map(|n| targets.iter().any(|t| n.id().matches_target(t)))
            .collect();

        // Dependencies always sit at lower positions, so one backward pass closes the set
        for pos in (0..self.nodes.len()).rev() {
            if keep[pos] {
                for &dep in &self.nodes[pos].dependencies {
                    keep[dep] = true;
                }
            }
        }

        let mut remap = vec![usize::MAX; self.nodes.len()];
        let mut nodes = Vec::new();
        for (pos, node) in self.nodes.into_iter().enumerate() {
            if keep[pos] {
                remap[pos] = nodes.len();
                nodes.push(node);
            }
        }
        for node in &mut nodes {
            node.dependencies = node.dependencies.iter().map(|&d| remap[d]).collect();
        }

        let mut plan = Self { nodes };
        plan.assign_ranks();
        plan
    }

    /// Targets that match no declaration in this plan
    pub fn unmatched_targets<'a>(&self, targets: &'a [String]) -> Vec<&'a str> {
        targets
            .iter()
            .filter(|t| !self.nodes.iter().any(|n| n.id().matches_target(t)))
            .map(String::as_str)
            .collect()
    }

    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    /// Identities in submission order
    pub fn order(&self) -> Vec<&ResourceId> {
        self.nodes.iter().map(PlanNode::id).collect()
    }

    /// Position of a declaration in the plan
    pub fn position(&self, id: &ResourceId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id() == id)
    }

    /// Node positions grouped by rank, ascending; each group in plan order
    pub fn ranks(&self) -> Vec<Vec<usize>> {
        let depth = self.nodes.iter().map(|n| n.rank + 1).max().unwrap_or(0);
        let mut ranks = vec![Vec::new(); depth];
        for (pos, node) in self.nodes.iter().enumerate() {
            ranks[node.rank].push(pos);
        }
        ranks
    }

    /// Total number of declarations in the plan
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Find the declaration a reference names.
///
/// A target without namespace first matches the referrer's namespace, then a
/// cluster-scoped declaration.
fn resolve_target(
    target: &ResourceId,
    from: &ResourceId,
    index: &HashMap<ResourceId, usize>,
) -> Result<ResourceId, PlanError> {
    if target.namespace.is_none()
        && let Some(ns) = &from.namespace
    {
        let candidate = ResourceId::namespaced(&target.kind, ns, &target.name);
        if index.contains_key(&candidate) {
            return Ok(candidate);
        }
    }
    if index.contains_key(target) {
        return Ok(target.clone());
    }
    Err(PlanError::UnknownReference {
        from: from.clone(),
        target: target.to_string(),
    })
}

/// Kahn's algorithm, always taking the ready node with the smallest input index
fn topological_order(
    declarations: &[ResourceDeclaration],
    deps: &[Vec<usize>],
) -> Result<Vec<usize>, PlanError> {
    let n = deps.len();
    let mut pending: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, node_deps) in deps.iter().enumerate() {
        for &d in node_deps {
            dependents[d].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| pending[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);

    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &dependent in &dependents[i] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() == n {
        return Ok(order);
    }

    let cycle = find_cycle(deps, &pending);
    Err(PlanError::Cycle {
        cycle: cycle.iter().map(|&i| declarations[i].id.clone()).collect(),
        unresolved: (0..n)
            .filter(|&i| pending[i] > 0)
            .map(|i| declarations[i].id.clone())
            .collect(),
    })
}

/// Walk unresolved dependencies until a node repeats.
///
/// Every unresolved node waits on at least one other unresolved node, so the
/// walk never dead-ends.
fn find_cycle(deps: &[Vec<usize>], pending: &[usize]) -> Vec<usize> {
    let Some(start) = (0..deps.len()).find(|&i| pending[i] > 0) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = Vec::new();
    let mut seen: HashMap<usize, usize> = HashMap::new();
    let mut current = start;
    loop {
        if let Some(&at) = seen.get(&current) {
            let mut cycle = path[at..].to_vec();
            cycle.push(current);
            return cycle;
        }
        seen.insert(current, path.len());
        path.push(current);
        match deps[current].iter().copied().find(|&d| pending[d] > 0) {
            Some(next) => current = next,
            None => return path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value, json};

    fn decl(kind: &str, name: &str, spec: Value) -> ResourceDeclaration {
        let spec: Map<String, Value> = spec.as_object().cloned().unwrap_or_default();
        ResourceDeclaration::new(ResourceId::namespaced(kind, "default", name), "v1", spec).unwrap()
    }

    fn names(plan: &ExecutionPlan) -> Vec<String> {
        plan.order().iter().map(|id| id.name.clone()).collect()
    }

    #[test]
    fn test_claim_before_deployment() {
        let plan = ExecutionPlan::resolve(vec![
            decl(
                "Deployment",
                "y",
                json!({"spec": {"claimName": {"$ref": "PersistentVolumeClaim/x"}}}),
            ),
            decl("PersistentVolumeClaim", "x", json!({})),
        ])
        .unwrap();

        assert_eq!(names(&plan), vec!["x", "y"]);
        assert_eq!(plan.nodes()[1].dependencies, vec![0]);
        assert_eq!(
            plan.nodes()[1].declaration.references()[0].target,
            ResourceId::namespaced("PersistentVolumeClaim", "default", "x")
        );
    }

    #[test]
    fn test_ties_keep_input_order() {
        let plan = ExecutionPlan::resolve(vec![
            decl("Pod", "c", json!({})),
            decl("Pod", "a", json!({})),
            decl("Pod", "d", json!({"x": {"$ref": "Pod/b"}})),
            decl("Pod", "b", json!({})),
        ])
        .unwrap();

        assert_eq!(names(&plan), vec!["c", "a", "b", "d"]);
        assert_eq!(plan.ranks(), vec![vec![0, 1, 2], vec![3]]);
    }

    #[test]
    fn test_every_node_after_its_dependencies() {
        let plan = ExecutionPlan::resolve(vec![
            decl("Pod", "e", json!({"x": {"$ref": "Pod/d"}, "y": {"$ref": "Pod/a"}})),
            decl("Pod", "d", json!({"x": {"$ref": "Pod/c"}})),
            decl("Pod", "c", json!({"x": {"$ref": "Pod/b"}})),
            decl("Pod", "b", json!({})),
            decl("Pod", "a", json!({"x": {"$ref": "Pod/b"}})),
        ])
        .unwrap();

        for (pos, node) in plan.nodes().iter().enumerate() {
            for &dep in &node.dependencies {
                assert!(dep < pos, "{} placed before its dependency", node.id());
            }
        }
        assert_eq!(plan.nodes()[plan.len() - 1].id().name, "e");
        assert_eq!(plan.nodes()[plan.len() - 1].rank, 3);
    }

    #[test]
    fn test_cycle_reports_full_cycle() {
        let err = ExecutionPlan::resolve(vec![
            decl("Pod", "free", json!({})),
            decl("Pod", "a", json!({"x": {"$ref": "Pod/b"}})),
            decl("Pod", "b", json!({"x": {"$ref": "Pod/c"}})),
            decl("Pod", "c", json!({"x": {"$ref": "Pod/a"}})),
            decl("Pod", "tail", json!({"x": {"$ref": "Pod/c"}})),
        ])
        .unwrap_err();

        match err {
            PlanError::Cycle { cycle, unresolved } => {
                let cycle: Vec<&str> = cycle.iter().map(|id| id.name.as_str()).collect();
                assert_eq!(cycle, vec!["a", "b", "c", "a"]);
                let unresolved: Vec<&str> = unresolved.iter().map(|id| id.name.as_str()).collect();
                assert_eq!(unresolved, vec!["a", "b", "c", "tail"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let err = ExecutionPlan::resolve(vec![decl(
            "Service",
            "s",
            json!({"x": {"$ref": "Service/s#spec.clusterIP"}}),
        )])
        .unwrap_err();
        assert!(matches!(err, PlanError::Cycle { ref cycle, .. } if cycle.len() == 2));
    }

    #[test]
    fn test_unknown_reference() {
        let err = ExecutionPlan::resolve(vec![decl(
            "Pod",
            "p",
            json!({"x": {"$ref": "PersistentVolumeClaim/missing"}}),
        )])
        .unwrap_err();
        assert!(matches!(err, PlanError::UnknownReference { .. }));
    }

    #[test]
    fn test_duplicate_declaration() {
        let err = ExecutionPlan::resolve(vec![
            decl("Pod", "p", json!({})),
            decl("Pod", "p", json!({})),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            PlanError::Duplicate(ResourceId::namespaced("Pod", "default", "p"))
        );
    }

    #[test]
    fn test_two_part_reference_falls_back_to_cluster_scoped() {
        let class = ResourceDeclaration::new(
            ResourceId::cluster("StorageClass", "example-nfs"),
            "storage.k8s.io/v1",
            Map::new(),
        )
        .unwrap();
        let claim = decl(
            "PersistentVolumeClaim",
            "nfs",
            json!({"spec": {"storageClassName": {"$ref": "StorageClass/example-nfs"}}}),
        );
        let plan = ExecutionPlan::resolve(vec![claim, class]).unwrap();
        assert_eq!(names(&plan), vec!["example-nfs", "nfs"]);
    }

    #[test]
    fn test_depends_on_orders_without_reference() {
        let role = decl("Role", "leader", json!({}));
        let binding = decl("RoleBinding", "leader", json!({}))
            .with_depends_on(vec![ResourceId::cluster("Role", "leader")]);
        let plan = ExecutionPlan::resolve(vec![binding, role]).unwrap();
        assert_eq!(
            plan.order().iter().map(|id| id.kind.as_str()).collect::<Vec<_>>(),
            vec!["Role", "RoleBinding"]
        );
    }

    #[test]
    fn test_select_pulls_in_dependencies() {
        let plan = ExecutionPlan::resolve(vec![
            decl("PersistentVolumeClaim", "nfs", json!({})),
            decl("Pod", "write-pod", json!({"v": {"$ref": "PersistentVolumeClaim/nfs"}})),
            decl("Pod", "nginx", json!({})),
        ])
        .unwrap();

        let targets = vec!["pod.write-pod".to_string(), "Secret".to_string()];
        assert_eq!(plan.unmatched_targets(&targets), vec!["Secret"]);

        let selected = plan.select(&targets);
        assert_eq!(names(&selected), vec!["nfs", "write-pod"]);
        assert_eq!(selected.nodes()[1].dependencies, vec![0]);
        assert_eq!(selected.nodes()[1].rank, 1);
    }

    #[test]
    fn test_empty_plan() {
        let plan = ExecutionPlan::resolve(Vec::new()).unwrap();
        assert!(plan.is_empty());
        assert!(plan.ranks().is_empty());
    }
}
