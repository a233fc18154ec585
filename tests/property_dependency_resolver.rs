//! Property: for any acyclic set of resource-to-resource dependency edges,
//! `topological_order` produces an order that respects every edge, and
//! resources with no path between them can appear in either relative order.

use std::collections::HashMap;

use proptest::collection::vec as prop_vec;
use proptest::prelude::*;
use serde_json::Value;

use runcore::model::deps::{DependenciesDecl, DependencyRef, DependencySpecMap};
use runcore::model::resource::{RegisterDecl, Registerable, ResourceBuilder};
use runcore::resolver::topological_order;
use runcore::store::Store;

fn resource_id(i: usize) -> String {
    format!("r{i}")
}

/// A DAG over `n` nodes, edges only pointing from a higher index to a
/// lower one, so the generated graph is acyclic by construction.
fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2..=max_nodes).prop_flat_map(|n| {
        let edge_choices: Vec<(usize, usize)> =
            (0..n).flat_map(|i| (0..i).map(move |j| (i, j))).collect();
        let max_edges = edge_choices.len();
        prop_vec(prop::sample::select(edge_choices), 0..=max_edges).prop_map(move |edges| (n, edges))
    })
}

proptest! {
    #[test]
    fn order_respects_every_dependency_edge((n, edges) in dag_strategy(8)) {
        let mut store = Store::new();
        let mut per_node_deps: HashMap<usize, Vec<usize>> = HashMap::new();
        for (from, to) in &edges {
            per_node_deps.entry(*from).or_default().push(*to);
        }

        let mut registerables = Vec::new();
        for i in 0..n {
            let mut spec: DependencySpecMap = DependencySpecMap::new();
            for (k, dep_idx) in per_node_deps.get(&i).cloned().unwrap_or_default().into_iter().enumerate() {
                spec.insert(format!("dep{k}"), DependencyRef::resource(resource_id(dep_idx)));
            }
            let resource = ResourceBuilder::new(resource_id(i))
                .dependencies(DependenciesDecl::Static(spec))
                .init::<(), (), (), _, _>(|_cfg, _deps, _scratch| async { Ok(()) })
                .build()
                .unwrap();
            registerables.push(Registerable::Resource(resource.with(()).unwrap()));
        }

        let app = ResourceBuilder::new("app")
            .register(RegisterDecl::Static(registerables))
            .init::<(), (), (), _, _>(|_cfg, _deps, _scratch| async { Ok(()) })
            .build()
            .unwrap();

        store.register_root(app.with(()).unwrap()).unwrap();

        let order = topological_order(&store).unwrap();
        let position: HashMap<String, usize> =
            order.iter().enumerate().map(|(idx, id)| (id.as_str().to_string(), idx)).collect();

        for (from, to) in &edges {
            let from_pos = position[&resource_id(*from)];
            let to_pos = position[&resource_id(*to)];
            prop_assert!(to_pos < from_pos, "dependency {} must come before dependent {}", resource_id(*to), resource_id(*from));
        }
    }
}
