//! Input collection and mapping lookup.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use walkdir::WalkDir;

use cropflow_core::PendingFile;
use cropflow_utils::mapping::{
    ColumnSelector, MappingReadOptions, NameMap, load_mapping_entries,
};

use crate::args::CropArgs;

/// Collect all image paths from a file or directory, sorted.
pub fn collect_images(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    if !path.is_dir() {
        anyhow::bail!(
            "input path is neither file nor directory: {}",
            path.display()
        );
    }

    let exts = ["jpg", "jpeg", "png", "bmp", "webp"];
    let mut images = Vec::new();
    for entry in WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
            let ext_lower = ext.to_ascii_lowercase();
            if exts.contains(&ext_lower.as_str()) {
                images.push(entry.path().to_path_buf());
            } else {
                debug!("Skipping non-image file {}", entry.path().display());
            }
        }
    }
    images.sort();
    Ok(images)
}

/// Collect input files as pending references, resolving mapping overrides.
pub fn collect_targets(input: &Path, name_map: Option<&NameMap>) -> Result<Vec<PendingFile>> {
    let images = collect_images(input)?;
    if images.is_empty() {
        anyhow::bail!(
            "no images found at {} (supported extensions: jpg, jpeg, png, bmp, webp)",
            input.display()
        );
    }

    let mut mapped = 0usize;
    let targets = images
        .into_iter()
        .map(|path| {
            let output_name = name_map.and_then(|map| {
                let file_name = path.file_name()?.to_str()?;
                let resolved = map.resolve(file_name);
                if resolved.is_some() {
                    mapped += 1;
                }
                resolved.map(str::to_string)
            });
            PendingFile { path, output_name }
        })
        .collect::<Vec<_>>();

    if let Some(map) = name_map {
        info!(
            "mapping matched {mapped} of {} file(s) against {} entr(ies)",
            targets.len(),
            map.len()
        );
    }
    Ok(targets)
}

/// Load the mapping spreadsheet named by the CLI arguments.
pub fn load_name_map(args: &CropArgs) -> Result<Option<NameMap>> {
    let Some(mapping_path) = args.mapping_file.as_ref() else {
        return Ok(None);
    };

    let source = ColumnSelector::parse_token(
        args.mapping_source_col
            .as_deref()
            .ok_or_else(|| anyhow!("--mapping-source-col is required with --mapping-file"))?,
    )?;
    let output = ColumnSelector::parse_token(
        args.mapping_output_col
            .as_deref()
            .ok_or_else(|| anyhow!("--mapping-output-col is required with --mapping-file"))?,
    )?;

    let options = MappingReadOptions {
        delimiter: args.mapping_delimiter.map(|c| c as u8),
        sheet_name: args.mapping_sheet.clone(),
        ..Default::default()
    };

    let entries = load_mapping_entries(mapping_path, &options, &source, &output)
        .with_context(|| format!("failed to load mapping from {}", mapping_path.display()))?;
    if entries.is_empty() {
        anyhow::bail!(
            "no usable rows found in mapping file {}",
            mapping_path.display()
        );
    }

    info!(
        "loaded {} mapping entr(ies) from {}",
        entries.len(),
        mapping_path.display()
    );
    Ok(Some(NameMap::new(entries)))
}
