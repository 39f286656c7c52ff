//! Size presets for cropped outputs.

/// A named output-size preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropPreset {
    /// Human-visible name for CLI selection.
    pub name: &'static str,
    /// Output width in pixels (0 for user-defined custom).
    pub width: u32,
    /// Output height in pixels (0 for user-defined custom).
    pub height: u32,
    /// Short description for tooling.
    pub description: &'static str,
}

impl CropPreset {
    pub const fn new(
        name: &'static str,
        width: u32,
        height: u32,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            width,
            height,
            description,
        }
    }
}

static PRESETS: [CropPreset; 6] = [
    CropPreset::new("LinkedIn", 400, 400, "Square professional profile photo (400×400)"),
    CropPreset::new("Passport", 413, 531, "Passport photo dimensions (413×531)"),
    CropPreset::new("Instagram", 1080, 1080, "Instagram square post (1080×1080)"),
    CropPreset::new("Avatar", 512, 512, "Small square avatar (512×512)"),
    CropPreset::new("Headshot", 600, 800, "Vertical headshot (600×800)"),
    CropPreset::new("Custom", 0, 0, "User-defined custom dimensions"),
];

/// Returns the list of standard presets.
pub fn standard_presets() -> &'static [CropPreset] {
    &PRESETS
}

/// Find a preset by name, ignoring case and spacing. Returns `None` if not found.
pub fn preset_by_name(name: &str) -> Option<CropPreset> {
    let lookup_key = normalize_name(name);
    standard_presets()
        .iter()
        .find(|p| normalize_name(p.name) == lookup_key)
        .cloned()
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}
