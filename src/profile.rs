//! Investor profile: the three preference selectors shown in the side panel.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxSensitivity {
    Low,
    #[default]
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Horizon {
    Short,
    #[default]
    Medium,
    Long,
}

/// A fixed set of choices shown as a selector.
pub trait Choice: Copy + PartialEq + 'static {
    fn all() -> &'static [Self];
    fn as_str(&self) -> &'static str;

    fn next(self) -> Self {
        let all = Self::all();
        let i = all.iter().position(|c| *c == self).unwrap_or(0);
        all[(i + 1) % all.len()]
    }

    fn previous(self) -> Self {
        let all = Self::all();
        let i = all.iter().position(|c| *c == self).unwrap_or(0);
        all[(i + all.len() - 1) % all.len()]
    }
}

impl Choice for RiskTolerance {
    fn all() -> &'static [Self] {
        &[
            RiskTolerance::Conservative,
            RiskTolerance::Moderate,
            RiskTolerance::Aggressive,
        ]
    }

    fn as_str(&self) -> &'static str {
        match self {
            RiskTolerance::Conservative => "conservative",
            RiskTolerance::Moderate => "moderate",
            RiskTolerance::Aggressive => "aggressive",
        }
    }
}

impl Choice for TaxSensitivity {
    fn all() -> &'static [Self] {
        &[
            TaxSensitivity::Low,
            TaxSensitivity::Moderate,
            TaxSensitivity::High,
        ]
    }

    fn as_str(&self) -> &'static str {
        match self {
            TaxSensitivity::Low => "low",
            TaxSensitivity::Moderate => "moderate",
            TaxSensitivity::High => "high",
        }
    }
}

impl Choice for Horizon {
    fn all() -> &'static [Self] {
        &[Horizon::Short, Horizon::Medium, Horizon::Long]
    }

    fn as_str(&self) -> &'static str {
        match self {
            Horizon::Short => "short",
            Horizon::Medium => "medium",
            Horizon::Long => "long",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvestorProfile {
    pub risk: RiskTolerance,
    pub tax: TaxSensitivity,
    pub horizon: Horizon,
}
