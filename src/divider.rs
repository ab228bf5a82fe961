//! Divider position of a split, held as a fraction of the available range.
//!
//! The fraction is what gets persisted and what survives window resizes; the
//! pixel offset is derived from it whenever the range is known. Programmatic
//! repositioning raises the same position notification a user drag does, so
//! the notification handler is guarded by a `syncing` flag.

/// Restored fractions are held back until a layout pass has assigned a range.
#[derive(Clone, Debug, PartialEq)]
pub struct Divider {
    fraction: f64,
    pixel: u16,
    range: Option<u16>,
    pending: Option<f64>,
    syncing: bool,
}

impl Default for Divider {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl Divider {
    pub fn new(fraction: f64) -> Self {
        Self {
            fraction: clamp_fraction(fraction),
            pixel: 0,
            range: None,
            pending: None,
            syncing: false,
        }
    }

    /// A divider restored from persisted state; the fraction is applied later.
    pub fn restored(fraction: f64) -> Self {
        let mut divider = Self::default();
        divider.pending = Some(clamp_fraction(fraction));
        divider
    }

    /// The effective fraction, including one still waiting to be applied.
    pub fn fraction(&self) -> f64 {
        self.pending.unwrap_or(self.fraction)
    }

    pub fn pixel(&self) -> u16 {
        self.pixel
    }

    pub fn range(&self) -> Option<u16> {
        self.range
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Programmatic change: store the fraction and recompute the pixel offset.
    pub fn set_fraction(&mut self, fraction: f64) {
        self.pending = None;
        self.fraction = clamp_fraction(fraction);
        self.sync_pixel();
    }

    /// The user dragged the handle to `pixel`. Returns true when the stored
    /// fraction changed.
    pub fn drag_to(&mut self, pixel: u16) -> bool {
        let pixel = match self.range {
            Some(range) => pixel.min(range),
            None => pixel,
        };
        self.pixel = pixel;
        self.position_notified()
    }

    /// Size-allocation hook. The fraction-derived offset is re-applied only
    /// when the range actually changed.
    pub fn on_size_allocate(&mut self, range: u16) -> bool {
        if self.range == Some(range) {
            return false;
        }
        self.range = Some(range);
        self.sync_pixel();
        true
    }

    /// Apply a restored fraction. Does nothing until a range is known.
    pub fn apply_pending(&mut self) -> bool {
        if self.range.is_none() {
            return false;
        }
        match self.pending.take() {
            Some(fraction) => {
                self.fraction = fraction;
                self.sync_pixel();
                true
            }
            None => false,
        }
    }

    fn sync_pixel(&mut self) {
        let Some(range) = self.range else { return };
        self.syncing = true;
        self.pixel = (self.fraction * f64::from(range)).round() as u16;
        self.position_notified();
        self.syncing = false;
    }

    fn position_notified(&mut self) -> bool {
        if self.syncing {
            return false;
        }
        let Some(range) = self.range.filter(|r| *r > 0) else {
            return false;
        };
        let fraction = f64::from(self.pixel) / f64::from(range);
        if (fraction - self.fraction).abs() < f64::EPSILON {
            return false;
        }
        self.fraction = clamp_fraction(fraction);
        self.pending = None;
        true
    }
}

fn clamp_fraction(fraction: f64) -> f64 {
    if fraction.is_nan() {
        return 0.5;
    }
    fraction.clamp(0.0, 1.0)
}
