//! Route table validation

use crate::config::SimulationConfig;
use anyhow::{Context, Result};
use std::path::Path;
use waypost::config::Route;

/// Validate a route table and print it.
pub fn run_check_command(path: &Path) -> Result<()> {
    let config = SimulationConfig::load(path)?;
    let table = config
        .router
        .table()
        .with_context(|| format!("invalid route table in {}", path.display()))?;

    println!("{}: {} top-level route(s)", path.display(), table.routes().len());
    for route in &config.router.routes {
        print_route(route, 1);
    }
    println!("options: {}", serde_json::to_string(&config.router.options)?);

    if !config.components.is_empty() {
        let problems = config.missing_slots();
        for problem in &problems {
            println!("warning: {}", problem);
        }
        if problems.is_empty() {
            println!("all child routes have a slot to render into");
        }
    }
    Ok(())
}

fn print_route(route: &Route, depth: usize) {
    let indent = "  ".repeat(depth);
    let target = match (&route.component, &route.redirect_to) {
        (Some(component), _) => component.clone(),
        (None, Some(to)) => format!("redirect -> '{}'", to),
        (None, None) => "(componentless)".to_string(),
    };
    let mut line = format!("{}'{}' {:?} {}", indent, route.path, route.path_match, target);
    if let Some(outlet) = &route.outlet {
        line.push_str(&format!(" @{}", outlet));
    }
    for (label, tokens) in [
        ("can-activate", &route.can_activate),
        ("can-activate-child", &route.can_activate_child),
        ("can-deactivate", &route.can_deactivate),
    ] {
        if !tokens.is_empty() {
            line.push_str(&format!(" {}={:?}", label, tokens));
        }
    }
    if !route.resolve.is_empty() {
        line.push_str(&format!(" resolve={:?}", route.resolve));
    }
    println!("{}", line);
    for child in &route.children {
        print_route(child, depth + 1);
    }
}
