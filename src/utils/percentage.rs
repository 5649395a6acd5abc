use std::{fmt::Display, ops::Deref, str::FromStr};

use anyhow::anyhow;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Percentage(f64);

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Percentage {
    pub fn new_opt(value: f64) -> Option<Percentage> {
        if value < 0. || value.is_nan() {
            None
        } else {
            Some(Percentage(value))
        }
    }
}

impl FromStr for Percentage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // This means that 100%% also works, but I think I'm fine with that
        let s = s.trim_end_matches("%");
        let v = s.parse::<f64>()?;
        Percentage::new_opt(v).ok_or_else(|| anyhow!("Can't parse {s} into percentage"))
    }
}

impl Deref for Percentage {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Share of `whole` taken by `value`, both in seconds. An empty whole yields 0%.
pub fn seconds_percentage(value: f64, whole: f64) -> Percentage {
    if whole <= 0. {
        return Percentage(0.);
    }
    Percentage::new_opt(value / whole * 100.).unwrap_or(Percentage(0.))
}
