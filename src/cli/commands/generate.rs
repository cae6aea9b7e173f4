//! generate command - Build flat compositions from a JSON source document

use std::path::Path;

use anyhow::{Context as _, Result};
use tracing::{info, warn};

use super::load_template;
use crate::core::composition::FlatComposition;
use crate::core::config::MappingConfig;
use crate::engine::Builder;
use crate::source::JsonSource;

/// Build one composition per record and print each on its own line.
///
/// # Arguments
///
/// * `input` - Source JSON document
/// * `template` - Web template file
/// * `config` - Mapping config file
/// * `relative_root` - Pattern selecting one record per match; the whole
///   document is one record when absent
/// * `skip_ehr_id` - Print only the flat JSON
pub fn generate(
    input: &Path,
    template: &Path,
    config: &Path,
    relative_root: Option<&str>,
    skip_ehr_id: bool,
) -> Result<()> {
    let template = load_template(template)?;
    let config = MappingConfig::from_file(config)?;
    let builder = Builder::new(&template, &config)?;

    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read input {}", input.display()))?;
    let document = JsonSource::parse(&text)
        .with_context(|| format!("Invalid input {}", input.display()))?;
    let records = match relative_root {
        Some(pattern) => document.roots(pattern)?,
        None => vec![document],
    };
    if records.is_empty() {
        warn!(pattern = relative_root.unwrap_or_default(), "no records matched");
    }

    for (index, record) in records.iter().enumerate() {
        let output = builder
            .build_from(record)
            .with_context(|| format!("Failed to build record {}", index))?;
        let flat = output
            .flatten()
            .with_context(|| format!("Failed to flatten record {}", index))?;
        let ehr_id = if skip_ehr_id {
            None
        } else {
            output.ehr_id.as_deref()
        };
        println!("{}", render_line(ehr_id, &flat)?);
    }

    info!(records = records.len(), "generated compositions");
    Ok(())
}

/// `<ehr_id> <json>`, or just the JSON without an ehr id.
fn render_line(ehr_id: Option<&str>, flat: &FlatComposition) -> Result<String> {
    let json = serde_json::to_string(flat)?;
    Ok(match ehr_id {
        Some(id) => format!("{} {}", id, json),
        None => json,
    })
}
