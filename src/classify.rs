use serde::Serialize;
use std::fmt;

/// User-count milestone, ordered from the lowest tier to the highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Milestone {
    #[serde(rename = "0-10k")]
    UpTo10k,
    #[serde(rename = "10-20k")]
    From10kTo20k,
    #[serde(rename = "20-30k")]
    From20kTo30k,
    #[serde(rename = "30-40k")]
    From30kTo40k,
    /// Top tier of the standard scale
    #[serde(rename = ">40k")]
    Over40k,
    #[serde(rename = "40k-100k")]
    From40kTo100k,
    /// Top tier of the detailed scale
    #[serde(rename = ">100k")]
    Over100k,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Standard,
    Detailed,
}

impl Milestone {
    pub fn label(&self) -> &'static str {
        match self {
            Milestone::UpTo10k => "0-10k",
            Milestone::From10kTo20k => "10-20k",
            Milestone::From20kTo30k => "20-30k",
            Milestone::From30kTo40k => "30-40k",
            Milestone::Over40k => ">40k",
            Milestone::From40kTo100k => "40k-100k",
            Milestone::Over100k => ">100k",
        }
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lower bounds are inclusive.
pub fn classify(users: u64, granularity: Granularity) -> Milestone {
    match (users, granularity) {
        (0..=9_999, _) => Milestone::UpTo10k,
        (10_000..=19_999, _) => Milestone::From10kTo20k,
        (20_000..=29_999, _) => Milestone::From20kTo30k,
        (30_000..=39_999, _) => Milestone::From30kTo40k,
        (_, Granularity::Standard) => Milestone::Over40k,
        (40_000..=99_999, Granularity::Detailed) => Milestone::From40kTo100k,
        (_, Granularity::Detailed) => Milestone::Over100k,
    }
}

pub fn classify_users(users: u64, detailed: bool) -> &'static str {
    let granularity = if detailed {
        Granularity::Detailed
    } else {
        Granularity::Standard
    };
    classify(users, granularity).label()
}
