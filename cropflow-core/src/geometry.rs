//! Crop-rectangle computation for face-centric crops.
//!
//! Pure and deterministic: a face box, the crop settings, and the source
//! image dimensions fully determine the resulting rectangle. The source
//! region is sized so that, after resizing to the output dimensions, the face
//! occupies the requested fraction of the output height; the region is then
//! positioned according to the configured mode and clamped into the image by
//! translation (never by resizing).

/// Fraction of the face box height at which the eye line is assumed to sit.
///
/// A heuristic calibrated against frontal portraits, not a derived value.
/// Overridable per crop via [`CropSettings::eye_line_fraction`].
pub const EYE_LINE_FRACTION: f32 = 0.35;

/// Axis-aligned face bounding box in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    pub fn center(&self) -> (f32, f32) {
        (
            self.width.mul_add(0.5, self.x),
            self.height.mul_add(0.5, self.y),
        )
    }

    /// Clamp the box into `[0, img_w] x [0, img_h]`.
    pub fn clamped_to(&self, img_w: u32, img_h: u32) -> FaceBox {
        let img_w = img_w as f32;
        let img_h = img_h as f32;
        let x = self.x.clamp(0.0, img_w);
        let y = self.y.clamp(0.0, img_h);
        FaceBox {
            x,
            y,
            width: self.width.min(img_w - x).max(0.0),
            height: self.height.min(img_h - y).max(0.0),
        }
    }
}

/// How to position the face within the crop region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositioningMode {
    /// Center the face in the crop region.
    Center,
    /// Place the eye line a third of the way down the crop.
    RuleOfThirds,
    /// Shift the face by custom offset fractions relative to crop center.
    Custom,
}

impl std::str::FromStr for PositioningMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "center" => Ok(Self::Center),
            "rule-of-thirds" | "rule_of_thirds" | "thirds" => Ok(Self::RuleOfThirds),
            "custom" => Ok(Self::Custom),
            other => Err(format!(
                "unknown positioning mode '{other}'; expected center, rule-of-thirds, or custom"
            )),
        }
    }
}

/// Settings controlling crop geometry.
#[derive(Debug, Clone)]
pub struct CropSettings {
    /// Desired output width in pixels.
    pub output_width: u32,
    /// Desired output height in pixels.
    pub output_height: u32,
    /// Fraction of the output height the face should occupy, in (0, 1].
    pub face_height_frac: f32,
    /// Positioning mode used when placing the face inside the crop.
    pub positioning_mode: PositioningMode,
    /// Horizontal offset fraction in [-1, 1] of half the crop width.
    /// Applies in `Custom` and `RuleOfThirds` modes.
    pub horizontal_offset: f32,
    /// Vertical offset fraction in [-1, 1] of half the crop height.
    /// `Custom` mode only.
    pub vertical_offset: f32,
    /// Where the eye line sits within the face box, as a fraction of its height.
    pub eye_line_fraction: f32,
}

impl Default for CropSettings {
    fn default() -> Self {
        Self {
            output_width: 256,
            output_height: 256,
            face_height_frac: 0.7,
            positioning_mode: PositioningMode::Center,
            horizontal_offset: 0.0,
            vertical_offset: 0.0,
            eye_line_fraction: EYE_LINE_FRACTION,
        }
    }
}

/// Crop rectangle in source image coordinates.
///
/// Kept fractional: rounding is the rasterizer's concern. The origin is
/// always >= 0; the far edge may exceed the image when the crop is larger
/// than the source on that axis (the rasterizer edge-clamps).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropRect {
    /// True when the rectangle lies fully inside the image.
    pub fn fits_within(&self, img_w: u32, img_h: u32) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.x + self.width <= img_w as f32
            && self.y + self.height <= img_h as f32
    }

    /// Integer sample rectangle clamped to the image, for rasterization.
    pub fn sample_rect(&self, img_w: u32, img_h: u32) -> (u32, u32, u32, u32) {
        let x = (self.x.max(0.0).round() as u32).min(img_w.saturating_sub(1));
        let y = (self.y.max(0.0).round() as u32).min(img_h.saturating_sub(1));
        let w = (self.width.round() as u32).clamp(1, img_w - x);
        let h = (self.height.round() as u32).clamp(1, img_h - y);
        (x, y, w, h)
    }
}

/// Compute the crop rectangle for a face under the given settings.
///
/// The face is scaled so it fills `face_height_frac` of the output height:
/// `scale = (output_height * face_height_frac) / face.height`, giving a
/// source region of `output_width / scale` by `output_height / scale`.
pub fn compute_crop_rect(
    face: FaceBox,
    settings: &CropSettings,
    img_w: u32,
    img_h: u32,
) -> CropRect {
    let face_h = face.height.max(1.0);
    let frac = settings.face_height_frac.clamp(0.01, 1.0);

    let out_w = settings.output_width.max(1) as f32;
    let out_h = settings.output_height.max(1) as f32;

    let scale = out_h * frac / face_h;
    let crop_w = out_w / scale;
    let crop_h = out_h / scale;

    let (face_cx, face_cy) = face.center();
    let ho = settings.horizontal_offset.clamp(-1.0, 1.0);
    let vo = settings.vertical_offset.clamp(-1.0, 1.0);

    let (cx, cy) = match settings.positioning_mode {
        PositioningMode::Center => (face_cx, face_cy),
        PositioningMode::RuleOfThirds => {
            // Anchor the eye line a third down the crop: the crop top sits at
            // eye_y - crop_h/3, so the center is eye_y + crop_h/6.
            let eye_y = settings.eye_line_fraction.mul_add(face_h, face.y);
            (crop_w.mul_add(ho * 0.5, face_cx), eye_y + crop_h / 6.0)
        }
        PositioningMode::Custom => (
            crop_w.mul_add(ho * 0.5, face_cx),
            crop_h.mul_add(vo * 0.5, face_cy),
        ),
    };

    let x = clamp_origin(crop_w.mul_add(-0.5, cx), crop_w, img_w as f32);
    let y = clamp_origin(crop_h.mul_add(-0.5, cy), crop_h, img_h as f32);

    CropRect {
        x,
        y,
        width: crop_w,
        height: crop_h,
    }
}

/// Clamp a crop origin by translation so the extent stays within `[0, limit]`.
/// When the extent exceeds the limit the origin clamps to 0 and the far edge
/// overflows.
fn clamp_origin(origin: f32, extent: f32, limit: f32) -> f32 {
    if extent >= limit {
        0.0
    } else {
        origin.clamp(0.0, limit - extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_face() -> FaceBox {
        FaceBox {
            x: 100.0,
            y: 100.0,
            width: 200.0,
            height: 200.0,
        }
    }

    #[test]
    fn center_crop_worked_example() {
        // scale = (256 * 0.7) / 200 = 0.896; crop = 256 / 0.896 ≈ 285.7;
        // center (200, 200) -> origin ≈ (57.1, 57.1), in bounds.
        let settings = CropSettings::default();
        let rect = compute_crop_rect(square_face(), &settings, 800, 600);
        assert!((rect.width - 285.714_28).abs() < 0.01);
        assert!((rect.height - 285.714_28).abs() < 0.01);
        assert!((rect.x - 57.142_86).abs() < 0.01);
        assert!((rect.y - 57.142_86).abs() < 0.01);
        assert!(rect.fits_within(800, 600));
    }

    #[test]
    fn crop_clamps_by_translation_near_edges() {
        let face = FaceBox {
            x: 10.0,
            y: 5.0,
            width: 100.0,
            height: 100.0,
        };
        let settings = CropSettings {
            output_width: 400,
            output_height: 400,
            face_height_frac: 0.5,
            ..CropSettings::default()
        };
        let rect = compute_crop_rect(face, &settings, 800, 600);
        assert_eq!(rect.x, 0.0);
        assert_eq!(rect.y, 0.0);
        // Clamping translates; the extent is untouched.
        assert!((rect.width - 200.0).abs() < 0.01);
        assert!((rect.height - 200.0).abs() < 0.01);
        assert!(rect.fits_within(800, 600));
    }

    #[test]
    fn oversized_crop_pins_origin_to_zero() {
        let face = FaceBox {
            x: 20.0,
            y: 20.0,
            width: 60.0,
            height: 60.0,
        };
        let settings = CropSettings {
            output_width: 1000,
            output_height: 1000,
            face_height_frac: 0.1,
            ..CropSettings::default()
        };
        // Source region is 600x600 on a 200x200 image: origin pinned, far
        // edge overflows.
        let rect = compute_crop_rect(face, &settings, 200, 200);
        assert_eq!(rect.x, 0.0);
        assert_eq!(rect.y, 0.0);
        assert!(rect.width > 200.0);
        assert!(!rect.fits_within(200, 200));
    }

    #[test]
    fn rule_of_thirds_places_eye_line_at_upper_third() {
        let face = square_face();
        let settings = CropSettings {
            output_width: 400,
            output_height: 600,
            face_height_frac: 0.5,
            positioning_mode: PositioningMode::RuleOfThirds,
            ..CropSettings::default()
        };
        let rect = compute_crop_rect(face, &settings, 2000, 2000);
        let eye_y = face.y + EYE_LINE_FRACTION * face.height;
        let eye_frac = (eye_y - rect.y) / rect.height;
        assert!(
            (eye_frac - 1.0 / 3.0).abs() < 0.001,
            "eye line should sit a third down the crop, was {eye_frac}"
        );
    }

    #[test]
    fn rule_of_thirds_sits_above_center_crop() {
        let face = square_face();
        let base = CropSettings {
            output_width: 400,
            output_height: 600,
            face_height_frac: 0.5,
            ..CropSettings::default()
        };
        let thirds = CropSettings {
            positioning_mode: PositioningMode::RuleOfThirds,
            ..base.clone()
        };
        let centered = compute_crop_rect(face, &base, 2000, 2000);
        let shifted = compute_crop_rect(face, &thirds, 2000, 2000);
        assert!(shifted.y > centered.y, "eye-line anchor lowers the crop top toward the face");
    }

    #[test]
    fn custom_offsets_shift_the_crop() {
        let face = square_face();
        let base = CropSettings {
            face_height_frac: 0.5,
            ..CropSettings::default()
        };
        let custom = CropSettings {
            positioning_mode: PositioningMode::Custom,
            horizontal_offset: 0.5,
            vertical_offset: -0.5,
            ..base.clone()
        };
        let centered = compute_crop_rect(face, &base, 2000, 2000);
        let shifted = compute_crop_rect(face, &custom, 2000, 2000);
        assert!(shifted.x > centered.x, "positive horizontal offset moves right");
        assert!(shifted.y < centered.y, "negative vertical offset moves up");
    }

    #[test]
    fn face_box_clamps_into_image_bounds() {
        let face = FaceBox {
            x: -20.0,
            y: 550.0,
            width: 100.0,
            height: 100.0,
        };
        let clamped = face.clamped_to(800, 600);
        assert_eq!(clamped.x, 0.0);
        assert!((clamped.y - 550.0).abs() < f32::EPSILON);
        assert!((clamped.height - 50.0).abs() < f32::EPSILON);
    }

    #[test]
    fn sample_rect_stays_inside_the_image() {
        let rect = CropRect {
            x: 0.0,
            y: 0.0,
            width: 600.0,
            height: 600.0,
        };
        let (x, y, w, h) = rect.sample_rect(200, 150);
        assert_eq!((x, y), (0, 0));
        assert!(x + w <= 200);
        assert!(y + h <= 150);
    }

    #[test]
    fn positioning_mode_parses_aliases() {
        assert_eq!(
            "rule-of-thirds".parse::<PositioningMode>(),
            Ok(PositioningMode::RuleOfThirds)
        );
        assert_eq!(
            "rule_of_thirds".parse::<PositioningMode>(),
            Ok(PositioningMode::RuleOfThirds)
        );
        assert_eq!("CENTER".parse::<PositioningMode>(), Ok(PositioningMode::Center));
        assert!("middle".parse::<PositioningMode>().is_err());
    }
}
