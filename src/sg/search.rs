//! Lookups of nodes inside a graph by identity, name or predicate.
//!
//! Paths have the same shape as [`Hit::path`](super::Hit::path): the nodes
//! from the search root down to the found node, inclusive. Searches are
//! depth-first in child order and return the first match.

use std::collections::HashSet;
use std::sync::Arc;

use super::node::Node;
use super::scene::Scene;
use super::shape::Shape;
use crate::parser::{object_addr, ObjectExt};

/// Returns the first path from `root` to `target`, which may be `root`.
pub fn find_node_path(root: &Arc<Node>, target: &Node) -> Option<Vec<Arc<Node>>> {
    let addr = object_addr(target);
    find_path_where(root, &|node: &Node| object_addr(node) == addr)
}

/// Returns the first path from `root` to a node named `name`.
pub fn find_node_path_by_name(root: &Arc<Node>, name: &str) -> Option<Vec<Arc<Node>>> {
    find_path_where(root, &|node: &Node| node.name() == name)
}

pub fn find_node_path_in_scene(scene: &Scene, name: &str) -> Option<Vec<Arc<Node>>> {
    find_node_path_by_name(&scene.root_node()?, name)
}

pub fn find_node_in_scene(scene: &Scene, name: &str) -> Option<Arc<Node>> {
    find_node_path_in_scene(scene, name)?.pop()
}

/// Finds a node named `name` strictly below `root`.
pub fn find_node_under_node(root: &Node, name: &str) -> Option<Arc<Node>> {
    root.children().into_iter().find_map(|child| {
        if child.name() == name {
            Some(child)
        } else {
            find_node_under_node(&child, name)
        }
    })
}

/// Every node at or below `root` matching `pred`, in depth-first order. A
/// shared node is reported once for each path that reaches it.
pub fn find_nodes(root: &Arc<Node>, pred: impl Fn(&Node) -> bool) -> Vec<Arc<Node>> {
    let mut found = Vec::new();
    collect_nodes(root, &pred, &mut found);
    found
}

/// Same as [`find_nodes`] with each shared node reported once, sorted by
/// name.
pub fn find_unique_nodes(root: &Arc<Node>, pred: impl Fn(&Node) -> bool) -> Vec<Arc<Node>> {
    let mut seen = HashSet::new();
    let mut found: Vec<Arc<Node>> = find_nodes(root, pred)
        .into_iter()
        .filter(|node| seen.insert(Arc::as_ptr(node) as usize))
        .collect();
    found.sort_by_key(|node| node.name());
    found
}

/// Paths to every node at or below `root` matching `pred`.
pub fn find_node_paths(root: &Arc<Node>, pred: impl Fn(&Node) -> bool) -> Vec<Vec<Arc<Node>>> {
    let mut paths = Vec::new();
    let mut path = vec![Arc::clone(root)];
    collect_paths(&mut path, &pred, &mut paths);
    paths
}

/// Finds a shape of `node` by name.
pub fn find_shape_in_node(node: &Node, name: &str) -> Option<Arc<dyn Shape>> {
    node.shapes().into_iter().find(|shape| shape.name() == name)
}

fn find_path_where(root: &Arc<Node>, pred: &dyn Fn(&Node) -> bool) -> Option<Vec<Arc<Node>>> {
    let mut path = vec![Arc::clone(root)];
    search_path(&mut path, pred).then_some(path)
}

fn search_path(path: &mut Vec<Arc<Node>>, pred: &dyn Fn(&Node) -> bool) -> bool {
    let Some(node) = path.last().cloned() else {
        return false;
    };
    if pred(&*node) {
        return true;
    }
    for child in node.children() {
        path.push(child);
        if search_path(path, pred) {
            return true;
        }
        path.pop();
    }
    false
}

fn collect_nodes(node: &Arc<Node>, pred: &dyn Fn(&Node) -> bool, found: &mut Vec<Arc<Node>>) {
    if pred(&**node) {
        found.push(Arc::clone(node));
    }
    for child in node.children() {
        collect_nodes(&child, pred, found);
    }
}

fn collect_paths(
    path: &mut Vec<Arc<Node>>,
    pred: &dyn Fn(&Node) -> bool,
    paths: &mut Vec<Vec<Arc<Node>>>,
) {
    let Some(node) = path.last().cloned() else {
        return;
    };
    if pred(&*node) {
        paths.push(path.clone());
    }
    for child in node.children() {
        path.push(child);
        collect_paths(path, pred, paths);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use once_cell::sync::Lazy;

    use super::*;
    use crate::parser::{downcast, Parser, Registry};
    use crate::sg::registration::register_scene_types;

    static REGISTRY: Lazy<Arc<Registry>> = Lazy::new(|| {
        let mut registry = Registry::new();
        register_scene_types(&mut registry).expect("register scene types");
        Arc::new(registry)
    });

    fn scene() -> Arc<Scene> {
        let mut parser = Parser::new(Arc::clone(&REGISTRY));
        let obj = parser
            .parse_from_string(
                r#"Scene {
                    root_node: Node "Root" {
                      children: [
                        Node "Arm" {
                          children: [
                            Node "Hand" { shapes: [ Box "Palm" {}, Ellipsoid "Knuckle" {} ] },
                          ],
                        },
                        Node "Leg" {},
                        Node "Arm" {},
                      ],
                    },
                }"#,
            )
            .unwrap();
        let scene = downcast::<Scene>(&obj).unwrap();
        let root = scene.root_node().unwrap();
        let hand = root.child(0).and_then(|arm| arm.child(0)).unwrap();
        root.child(1).unwrap().add_child(hand);
        scene
    }

    fn names(path: &[Arc<Node>]) -> Vec<String> {
        path.iter().map(|node| node.name()).collect()
    }

    #[test]
    fn finds_nested_paths_by_name() {
        let scene = scene();
        let path = find_node_path_in_scene(&scene, "Hand").unwrap();
        assert_eq!(names(&path), vec!["Root", "Arm", "Hand"]);
        assert_eq!(names(&find_node_path_in_scene(&scene, "Root").unwrap()), vec!["Root"]);

        let hand = find_node_in_scene(&scene, "Hand").unwrap();
        assert!(Arc::ptr_eq(&hand, path.last().unwrap()));
    }

    #[test]
    fn missing_nodes_are_not_found() {
        let scene = scene();
        assert!(find_node_path_in_scene(&scene, "Tail").is_none());
        assert!(find_node_in_scene(&scene, "Tail").is_none());
        let root = scene.root_node().unwrap();
        assert!(find_node_under_node(&root, "Root").is_none());
        assert!(find_shape_in_node(&root, "Palm").is_none());
    }

    #[test]
    fn finds_paths_to_a_node_instance() {
        let scene = scene();
        let root = scene.root_node().unwrap();
        let leg = root.child(1).unwrap();
        let hand = find_node_under_node(&leg, "Hand").unwrap();
        // The first path in child order goes through the arm.
        let path = find_node_path(&root, &hand).unwrap();
        assert_eq!(names(&path), vec!["Root", "Arm", "Hand"]);
        let from_leg = find_node_path(&leg, &hand).unwrap();
        assert_eq!(names(&from_leg), vec!["Leg", "Hand"]);

        let second_arm = root.child(2).unwrap();
        assert!(find_node_path(&second_arm, &hand).is_none());
        assert_eq!(find_node_path(&root, &second_arm).unwrap().len(), 2);
    }

    #[test]
    fn predicate_searches_report_every_match() {
        let root = scene().root_node().unwrap();
        let hands = find_nodes(&root, |node| node.name() == "Hand");
        assert_eq!(hands.len(), 2);
        assert!(Arc::ptr_eq(&hands[0], &hands[1]));
        assert_eq!(find_unique_nodes(&root, |node| node.name() == "Hand").len(), 1);

        let unique = find_unique_nodes(&root, |node| {
            !node.shapes().is_empty() || node.child_count() > 0
        });
        assert_eq!(names(&unique), vec!["Arm", "Hand", "Leg", "Root"]);

        let paths = find_node_paths(&root, |node| node.name() == "Hand");
        let paths: Vec<Vec<String>> = paths.iter().map(|path| names(path)).collect();
        assert_eq!(
            paths,
            vec![vec!["Root", "Arm", "Hand"], vec!["Root", "Leg", "Hand"]]
        );
    }

    #[test]
    fn finds_shapes_by_name() {
        let scene = scene();
        let hand = find_node_in_scene(&scene, "Hand").unwrap();
        let knuckle = find_shape_in_node(&hand, "Knuckle").unwrap();
        assert_eq!(knuckle.type_name(), "Ellipsoid");
    }
}
