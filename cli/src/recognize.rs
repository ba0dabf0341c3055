use crate::config::SimulationConfig;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use waypost::recognizer::Recognizer;
use waypost::serializer::{DefaultUrlSerializer, UrlSerializer};
use waypost::snapshot::RouteSnapshot;
use waypost::tree::TreeNode;
use waypost::DefaultRecognizer;

/// Print the snapshot tree `url` resolves to.
pub async fn run_recognize_command(path: &Path, url: &str) -> Result<()> {
    let config = SimulationConfig::load(path)?;
    let table = config.router.table()?;
    let tree = DefaultUrlSerializer.parse(url)?;
    let recognized = DefaultRecognizer
        .recognize(&tree, &table, config.router.options.params_inheritance)
        .await?;

    println!("url after redirects: {}", DefaultUrlSerializer.serialize(&recognized.applied_url));
    print_node(&recognized.root, 0)
}

fn print_node(node: &TreeNode<Arc<RouteSnapshot>>, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    let route = &node.value;
    if route.is_root() {
        println!("{}<root>", indent);
    } else {
        println!(
            "{}{}: '{}' -> {} params={} data={}",
            indent,
            route.outlet,
            route.path(),
            route.component.as_deref().unwrap_or("(componentless)"),
            serde_json::to_string(&route.params)?,
            serde_json::to_string(&route.data)?,
        );
    }
    for child in &node.children {
        print_node(child, depth + 1)?;
    }
    Ok(())
}
