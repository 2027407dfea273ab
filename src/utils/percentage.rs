use std::{fmt::Display, ops::Deref};

/// Percentage in the `[0, 100]` range. Values are capped on construction, the dashboard never
/// shows more than a full day of progress.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Percentage(f64);

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.rounded())
    }
}

impl Percentage {
    pub const FULL: Percentage = Percentage(100.);

    pub fn new_opt(value: f64) -> Option<Percentage> {
        if value.is_nan() || value < 0. {
            None
        } else {
            Some(Percentage(value.min(100.)))
        }
    }

    /// Nearest whole percent, halves rounded away from zero.
    pub fn rounded(&self) -> u32 {
        self.0.round() as u32
    }
}

impl Deref for Percentage {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Share of `part` in `whole`. A zero `whole` is treated as nothing done.
pub fn ratio_percentage(part: u64, whole: u64) -> Percentage {
    if whole == 0 {
        return Percentage::default();
    }
    Percentage::new_opt(part as f64 / whole as f64 * 100.)
        .unwrap_or_default()
}
