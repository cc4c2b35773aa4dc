use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::{Mat4, Vec3};
use once_cell::sync::Lazy;

use scene_runtime::parser::{
    downcast, Field, Object, ObjectBase, ObjectExt, ObjectPtr, Parser, Registry, TField, Writer,
};
use scene_runtime::sg::{
    register_scene_types, shape_interface, Bounds, Intersector, Node, Ray, Scene, Shape,
    ShapeHit,
};

/// Box that counts how often it is tested against a ray.
struct CountingBox {
    base: ObjectBase,
    size: TField<Vec3>,
    tests: AtomicUsize,
}

impl Default for CountingBox {
    fn default() -> Self {
        Self {
            base: ObjectBase::default(),
            size: TField::new("size", Vec3::ONE),
            tests: AtomicUsize::new(0),
        }
    }
}

impl Object for CountingBox {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn add_fields<'a>(&'a self, fields: &mut Vec<&'a dyn Field>) {
        fields.push(&self.size);
    }

    fn query_interface(
        self: Arc<Self>,
        interface: TypeId,
    ) -> Option<Box<dyn Any + Send + Sync>> {
        shape_interface(self, interface)
    }
}

impl Shape for CountingBox {
    fn bounds(&self) -> Bounds {
        Bounds::from_center_size(Vec3::ZERO, self.size.get())
    }

    fn intersect_ray(&self, ray: &Ray) -> Option<ShapeHit> {
        self.tests.fetch_add(1, Ordering::Relaxed);
        let hit = self.bounds().intersect_ray(ray)?;
        Some(ShapeHit {
            distance: hit.distance,
            point: ray.point_at(hit.distance),
            normal: hit.face.normal(),
        })
    }

    fn as_object(&self) -> &dyn Object {
        self
    }

    fn into_object(self: Arc<Self>) -> ObjectPtr {
        self
    }
}

static REGISTRY: Lazy<Arc<Registry>> = Lazy::new(|| {
    let mut registry = Registry::new();
    register_scene_types(&mut registry).expect("register scene types");
    registry
        .add_type::<CountingBox>("CountingBox")
        .expect("register CountingBox");
    Arc::new(registry)
});

fn parse_scene(text: &str) -> Arc<Scene> {
    let mut parser = Parser::new(Arc::clone(&REGISTRY));
    let obj = parser.parse_from_string(text).expect("scene parses");
    downcast::<Scene>(&obj).expect("root is a Scene")
}

fn counting_boxes(node: &Arc<Node>, out: &mut Vec<Arc<CountingBox>>) {
    for shape in node.shapes() {
        if let Some(counting) = downcast::<CountingBox>(&shape.into_object()) {
            out.push(counting);
        }
    }
    for child in node.children() {
        counting_boxes(&child, out);
    }
}

/// Tests every shape in the graph without any bounds pruning.
fn brute_force(node: &Arc<Node>, parent: Mat4, ray: &Ray, best: &mut Option<(f32, String)>) {
    let matrix = parent * node.model_matrix();
    let local = ray.transformed(&matrix.inverse());
    for shape in node.shapes() {
        if let Some(hit) = shape.intersect_ray(&local) {
            if best.as_ref().map_or(true, |(distance, _)| hit.distance < *distance) {
                *best = Some((hit.distance, node.name()));
            }
        }
    }
    for child in node.children() {
        brute_force(&child, matrix, ray, best);
    }
}

const PRUNING_SCENE: &str = r#"
Scene {
  root_node: Node "Root" {
    children: [
      Node "Left" {
        translation: -10 0 0,
        children: [
          Node "LeftA" { translation: 0 0 -3, shapes: [ CountingBox {} ] },
          Node "LeftB" { translation: 0 0 -6, shapes: [ CountingBox { size: 2 2 2 } ] },
        ],
      },
      Node "Right" {
        translation: 10 0 0,
        children: [
          Node "RightFar" { translation: 0 0 -8, shapes: [ CountingBox {} ] },
          Node "RightNear" { translation: 0 0 -4, shapes: [ CountingBox {} ] },
        ],
      },
    ],
  },
}
"#;

#[test]
fn pruned_subtrees_are_never_tested() {
    let scene = parse_scene(PRUNING_SCENE);
    let root = scene.root_node().expect("root node");
    let left = root.child(0).expect("left");
    let right = root.child(1).expect("right");
    let ray = Ray::new(Vec3::new(10.0, 0.0, 10.0), Vec3::NEG_Z);

    let hit = Intersector::intersect_scene(&scene, &ray);
    assert_eq!(hit.path_names(), vec!["Root", "Right", "RightNear"]);

    let mut left_boxes = Vec::new();
    counting_boxes(&left, &mut left_boxes);
    assert_eq!(left_boxes.len(), 2);
    assert!(left_boxes
        .iter()
        .all(|shape| shape.tests.load(Ordering::Relaxed) == 0));

    let mut right_boxes = Vec::new();
    counting_boxes(&right, &mut right_boxes);
    let right_tests: usize = right_boxes
        .iter()
        .map(|shape| shape.tests.load(Ordering::Relaxed))
        .sum();
    assert!(right_tests >= 1);

    let mut expected = None;
    brute_force(&root, Mat4::IDENTITY, &ray, &mut expected);
    let (distance, name) = expected.expect("brute force finds a hit");
    assert_eq!(hit.node().map(|node| node.name()), Some(name));
    assert!((hit.distance - distance).abs() < 1e-5);
}

#[test]
fn pruning_matches_brute_force_for_many_rays() {
    let scene = parse_scene(PRUNING_SCENE);
    let root = scene.root_node().expect("root node");
    for x in [-10.9f32, -10.2, -9.6, 0.0, 9.7, 10.0, 10.4, 10.6] {
        for y in [-0.8f32, 0.0, 0.45] {
            let ray = Ray::new(Vec3::new(x, y, 10.0), Vec3::NEG_Z);
            let hit = Intersector::intersect_scene(&scene, &ray);
            let mut expected = None;
            brute_force(&root, Mat4::IDENTITY, &ray, &mut expected);
            match expected {
                Some((distance, name)) => {
                    assert_eq!(hit.node().map(|node| node.name()), Some(name), "ray at {x}, {y}");
                    assert!((hit.distance - distance).abs() < 1e-4, "ray at {x}, {y}");
                }
                None => assert!(!hit.is_valid(), "ray at {x}, {y}"),
            }
        }
    }
}

#[test]
fn subtrees_behind_the_closest_hit_are_never_tested() {
    let scene = parse_scene(
        r#"Scene {
            root_node: Node "Root" {
              children: [
                Node "Near" { translation: 0 0 -3, shapes: [ CountingBox {} ] },
                Node "Far" {
                  translation: 0 0 -8,
                  children: [ Node "FarLeaf" { shapes: [ CountingBox { size: 3 3 1 } ] } ],
                },
              ],
            },
        }"#,
    );
    let root = scene.root_node().expect("root node");
    let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z);

    let hit = Intersector::intersect_scene(&scene, &ray);
    assert_eq!(hit.path_names(), vec!["Root", "Near"]);
    assert!((hit.distance - 12.5).abs() < 1e-5);

    // The far subtree's bounds are crossed by the ray, but only beyond the
    // near hit, so its shapes must not be tested.
    let far = root.child(1).expect("far");
    let far_bounds = far.bounds().transformed(&far.model_matrix());
    assert!(far_bounds.intersect_ray(&ray).is_some());
    let mut far_boxes = Vec::new();
    counting_boxes(&far, &mut far_boxes);
    assert_eq!(far_boxes.len(), 1);
    assert_eq!(far_boxes[0].tests.load(Ordering::Relaxed), 0);

    let mut near_boxes = Vec::new();
    counting_boxes(&root.child(0).expect("near"), &mut near_boxes);
    assert_eq!(near_boxes[0].tests.load(Ordering::Relaxed), 1);
}

const SHARED_SCENE: &str = r#"
Scene "S" {
  root_node: Node "Root" {
    TEMPLATES: [ Node "T" { scale: 2 2 2 } ],
    CONSTANTS: [ SIZE: "1 2 3" ],
    children: [
      Node "Shared" { shapes: [ Box "B" { size: $SIZE } ] },
      Node "User" { children: [ USE "Shared" ] },
      CLONE "T" "Copy" { translation: 1 0 0 },
    ],
  },
}
"#;

#[test]
fn use_shares_one_instance() {
    let scene = parse_scene(SHARED_SCENE);
    let root = scene.root_node().expect("root node");
    let shared = root.child(0).expect("shared");
    let via_user = root.child(1).and_then(|user| user.child(0)).expect("used");
    assert!(Arc::ptr_eq(&shared, &via_user));

    via_user.set_translation(Vec3::new(0.0, 5.0, 0.0));
    assert_eq!(shared.translation(), Vec3::new(0.0, 5.0, 0.0));
    // Both parents observe the shared node.
    assert!(root.is_observing(&*shared));
    assert_eq!(shared.base().observer_count(), 2);
}

#[test]
fn clones_start_equal_and_stay_independent() {
    let scene = parse_scene(SHARED_SCENE);
    let root = scene.root_node().expect("root node");
    let copy = root.child(2).expect("copy");
    assert_eq!(copy.name(), "Copy");
    assert!(copy.base().is_clone());
    assert_eq!(copy.scale(), Vec3::splat(2.0));
    assert_eq!(copy.translation(), Vec3::X);

    let obj: ObjectPtr = copy.clone();
    let twin = downcast::<Node>(&obj.clone_object("Twin", true, true)).expect("node clone");
    twin.set_scale(Vec3::ONE);
    assert_eq!(copy.scale(), Vec3::splat(2.0));
    assert_eq!(twin.translation(), Vec3::X);
}

#[test]
fn written_scene_parses_back_to_the_same_graph() {
    let scene = parse_scene(SHARED_SCENE);
    let first = Writer::write_to_string(&*scene);
    assert!(first.contains("USE \"Shared\""));
    assert!(!first.contains("TEMPLATES"));

    let reparsed = parse_scene(&first);
    let second = Writer::write_to_string(&*reparsed);
    assert_eq!(first, second);

    let root = reparsed.root_node().expect("root node");
    let shared = root.child(0).expect("shared");
    let via_user = root.child(1).and_then(|user| user.child(0)).expect("used");
    assert!(Arc::ptr_eq(&shared, &via_user));
    assert_eq!(
        root.bounds(),
        Bounds::new(Vec3::new(-0.5, -1.0, -1.5), Vec3::new(0.5, 1.0, 1.5))
    );
}

#[test]
fn bounds_follow_enable_flags_and_transforms() {
    let scene = parse_scene(
        r#"Scene {
            root_node: Node "Root" {
              children: [
                Node "A" { translation: 2 0 0, shapes: [ Box {} ] },
                Node "B" { disabled_flags: "Traversal", translation: -2 0 0, shapes: [ Box {} ] },
              ],
            },
        }"#,
    );
    let root = scene.root_node().expect("root node");
    assert_eq!(
        root.bounds(),
        Bounds::new(Vec3::new(1.5, -0.5, -0.5), Vec3::new(2.5, 0.5, 0.5))
    );

    let a = root.child(0).expect("a");
    let computed = a.matrix_computations();
    a.set_enabled(scene_runtime::sg::NodeFlag::Render, false);
    a.model_matrix();
    assert_eq!(a.matrix_computations(), computed);

    a.set_translation(Vec3::new(4.0, 0.0, 0.0));
    assert_eq!(root.bounds().max.x, 4.5);
    assert_eq!(a.matrix_computations(), computed + 1);
}
