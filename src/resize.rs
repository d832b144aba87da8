//! Width/height fields that keep the source aspect ratio.
//!
//! The linked value is derived by a pure function of the edited dimension, so
//! updating one field never re-triggers an update of the other.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Width,
    Height,
}

/// Field input accepted while typing: digits only, or nothing at all.
pub fn is_numeric_or_blank(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii_digit())
}

/// The other dimension for `value` on the `edited` side, rounded down.
pub fn linked_dimension(edited: Dimension, value: u32, origin_width: u32, origin_height: u32) -> u32 {
    let (from, to) = match edited {
        Dimension::Width => (origin_width, origin_height),
        Dimension::Height => (origin_height, origin_width),
    };
    if from == 0 {
        return value;
    }
    let linked = u64::from(to) * u64::from(value) / u64::from(from);
    u32::try_from(linked).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResizeFields {
    width: String,
    height: String,
    origin: Option<(u32, u32)>,
    last_edited: Option<Dimension>,
}

impl ResizeFields {
    /// Show the native size of a freshly opened image.
    pub fn reset(&mut self, width: u32, height: u32) {
        self.origin = Some((width, height));
        self.width = width.to_string();
        self.height = height.to_string();
        self.last_edited = None;
    }

    /// Apply typed input; returns `false` (and changes nothing) if it is rejected.
    pub fn edit(&mut self, dimension: Dimension, text: &str) -> bool {
        if !is_numeric_or_blank(text) || (!text.is_empty() && text.parse::<u32>().is_err()) {
            return false;
        }

        let value = parse_field(text);
        match dimension {
            Dimension::Width => self.width = text.to_string(),
            Dimension::Height => self.height = text.to_string(),
        }
        self.last_edited = Some(dimension);

        if let Some((origin_width, origin_height)) = self.origin {
            let linked = linked_dimension(dimension, value, origin_width, origin_height).to_string();
            match dimension {
                Dimension::Width => self.height = linked,
                Dimension::Height => self.width = linked,
            }
        }
        true
    }

    /// Requested `(height, width)`, with blank or zero fields clamped to 1.
    pub fn target(&self) -> (u32, u32) {
        (
            parse_field(&self.height).max(1),
            parse_field(&self.width).max(1),
        )
    }

    pub fn width(&self) -> &str {
        &self.width
    }

    pub fn height(&self) -> &str {
        &self.height
    }

    pub const fn last_edited(&self) -> Option<Dimension> {
        self.last_edited
    }
}

fn parse_field(text: &str) -> u32 {
    text.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_or_blank() {
        assert!(is_numeric_or_blank(""));
        assert!(is_numeric_or_blank("1024"));
        assert!(!is_numeric_or_blank("12a"));
        assert!(!is_numeric_or_blank("-3"));
        assert!(!is_numeric_or_blank("1.5"));
    }

    #[test]
    fn test_linked_dimension_keeps_ratio() {
        // 4:3 source
        assert_eq!(linked_dimension(Dimension::Height, 300, 400, 300), 400);
        assert_eq!(linked_dimension(Dimension::Width, 200, 400, 300), 150);
        // rounds down like integer truncation
        assert_eq!(linked_dimension(Dimension::Width, 101, 400, 300), 75);
    }

    #[test]
    fn test_ratio_holds_for_many_targets() {
        let (w, h) = (1920u32, 1080u32);
        for th in [1u32, 7, 100, 333, 1080, 4000] {
            let tw = linked_dimension(Dimension::Height, th, w, h);
            // tw / th == w / h within one pixel of truncation
            let exact = f64::from(th) * f64::from(w) / f64::from(h);
            assert!((exact - f64::from(tw)).abs() < 1.0, "th={th} tw={tw}");
        }
    }

    #[test]
    fn test_edit_updates_other_field() {
        let mut fields = ResizeFields::default();
        fields.reset(640, 480);
        assert!(fields.edit(Dimension::Width, "320"));
        assert_eq!(fields.height(), "240");
        assert_eq!(fields.last_edited(), Some(Dimension::Width));

        assert!(fields.edit(Dimension::Height, "960"));
        assert_eq!(fields.width(), "1280");
    }

    #[test]
    fn test_rejected_input_changes_nothing() {
        let mut fields = ResizeFields::default();
        fields.reset(640, 480);
        assert!(!fields.edit(Dimension::Width, "32x"));
        assert!(!fields.edit(Dimension::Width, "99999999999999"));
        assert_eq!(fields.width(), "640");
        assert_eq!(fields.height(), "480");
    }

    #[test]
    fn test_blank_field_targets_one_pixel() {
        let mut fields = ResizeFields::default();
        fields.reset(640, 480);
        assert!(fields.edit(Dimension::Height, ""));
        assert_eq!(fields.width(), "0");
        assert_eq!(fields.target(), (1, 1));
    }
}
