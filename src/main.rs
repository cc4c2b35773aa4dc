use std::collections::HashSet;
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use log::info;

use scene_runtime::parser::{ObjectExt, Registry};
use scene_runtime::sg::{
    find_node_path_in_scene, register_scene_types, Bounds, Intersector, Node, Ray, Reader,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;

    let mut registry = Registry::new();
    register_scene_types(&mut registry).context("failed to register scene types")?;
    let mut reader = Reader::new(Arc::new(registry));
    let scene = reader
        .read_scene(&options.path)
        .with_context(|| format!("failed to read scene {}", options.path))?;
    let root = scene
        .root_node()
        .ok_or_else(|| anyhow!("scene has no root node"))?;

    let mut summary = GraphSummary::default();
    summary.visit(&root);
    println!(
        "Loaded scene with {} nodes ({} shapes)",
        summary.nodes.len(),
        summary.shape_count
    );
    for name in &summary.named {
        println!(" - {name} (Node)");
    }
    println!("Bounds: {}", format_bounds(&root.bounds()));

    if let Some(name) = &options.find {
        match find_node_path_in_scene(&scene, name) {
            Some(path) => {
                let names: Vec<String> = path.iter().map(|node| node.name()).collect();
                println!("Found {}", names.join("/"));
            }
            None => println!("Node '{name}' not found"),
        }
    }

    if let Some(ray) = options.pick {
        info!("Picking with ray from {} along {}", ray.origin, ray.direction);
        let hit = Intersector::intersect_scene(&scene, &ray);
        if hit.is_valid() {
            println!(
                "Hit {} at distance {:.2}",
                hit.path_names().join("/"),
                hit.distance
            );
        } else {
            println!("No hit");
        }
    }
    Ok(())
}

#[derive(Default)]
struct GraphSummary {
    nodes: HashSet<usize>,
    named: Vec<String>,
    shape_count: usize,
}

impl GraphSummary {
    /// Counts each node once, however many times it is shared.
    fn visit(&mut self, node: &Arc<Node>) {
        if !self.nodes.insert(Arc::as_ptr(node) as usize) {
            return;
        }
        let name = node.name();
        if !name.is_empty() {
            self.named.push(name);
        }
        self.shape_count += node.shapes().len();
        for child in node.children() {
            self.visit(&child);
        }
    }
}

fn format_bounds(bounds: &Bounds) -> String {
    if bounds.is_empty() {
        return "empty".to_string();
    }
    format!(
        "min=({:.2}, {:.2}, {:.2}) max=({:.2}, {:.2}, {:.2})",
        bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
    )
}

struct CliOptions {
    path: String,
    pick: Option<Ray>,
    find: Option<String>,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(path) = args.next() else {
            return Err(anyhow!(
                "Usage: scene-runtime <scene-file> [--find name] [--pick ox,oy,oz dx,dy,dz]"
            ));
        };
        let mut pick = None;
        let mut find = None;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--pick" => {
                    let (Some(origin), Some(direction)) = (args.next(), args.next()) else {
                        return Err(anyhow!("--pick expects an origin and a direction"));
                    };
                    pick = Some(Ray::new(parse_vec3(&origin)?, parse_vec3(&direction)?));
                }
                "--find" => {
                    let Some(name) = args.next() else {
                        return Err(anyhow!("--find expects a node name"));
                    };
                    find = Some(name);
                }
                other => {
                    return Err(anyhow!("Unknown argument: {other}. Expected --find or --pick"));
                }
            }
        }
        Ok(Self { path, pick, find })
    }
}

fn parse_vec3(text: &str) -> Result<Vec3> {
    let parts = text
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .with_context(|| format!("invalid number '{part}' in vector '{text}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(anyhow!("vector '{text}' must have three components")),
    }
}
