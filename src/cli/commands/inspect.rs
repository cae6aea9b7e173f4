//! inspect command - Show where a node id occurs in a template

use std::path::Path;

use anyhow::{bail, Result};

use super::load_template;
use crate::core::template::{Template, TemplatePath};
use crate::core::types::SEPARATOR;

/// Print the template tree, or every path to `node_id`.
///
/// # Arguments
///
/// * `template` - Web template file
/// * `node_id` - Node id to look for; ignored when `tree` is set
/// * `tree` - Render the whole tree instead
/// * `wildcard` - Print addresses with `:*` on repeatable steps
pub fn inspect(template: &Path, node_id: Option<&str>, tree: bool, wildcard: bool) -> Result<()> {
    let template = load_template(template)?;

    if tree {
        print!("{}", template.render_tree());
        return Ok(());
    }

    let Some(node_id) = node_id else {
        bail!("A node id is required unless --tree is given");
    };
    let lines = describe_matches(&template, node_id, wildcard);
    if lines.is_empty() {
        bail!("No node '{}' in template", node_id);
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

fn describe_matches(template: &Template, node_id: &str, wildcard: bool) -> Vec<String> {
    template
        .find(node_id)
        .iter()
        .map(|path| describe(template, path, wildcard))
        .collect()
}

fn describe(template: &Template, path: &TemplatePath<'_>, wildcard: bool) -> String {
    let node = path.node();
    let address = if wildcard {
        let relative = path.relative_address(true);
        if relative.is_empty() {
            template.root().id().to_string()
        } else {
            format!("{}{}{}", template.root().id(), SEPARATOR, relative)
        }
    } else {
        path.to_string()
    };

    let mut line = format!("{} [{}] {}", address, node.rm_type(), node.cardinality());
    if node.in_context() {
        line.push_str(" ctx");
    }
    if let Some(aql) = node.aql_path() {
        line.push_str(&format!("\n    {}", aql));
    }
    line
}
