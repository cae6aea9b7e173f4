//! skeleton command - Print a mapping config skeleton for a template

use std::path::Path;

use anyhow::Result;

use super::load_template;

/// Print a TOML mapping skeleton listing every leaf of the template.
pub fn skeleton(template: &Path) -> Result<()> {
    let template = load_template(template)?;
    print!("{}", template.config_skeleton());
    Ok(())
}
