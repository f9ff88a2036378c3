use std::fmt;
use std::str::FromStr;

use chrono::Duration;

/// Paid amount (in the provider's currency) at which a membership is
/// classified as the ultimate tier instead of premium
const ULTIMATE_AMOUNT_THRESHOLD: f64 = 10.0;

/// A paid subscription tier. The free tier is implicit and never recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    PremiumMonthly,
    PremiumYearly,
    UltimateMonthly,
    UltimateYearly,
    GenrePack,
    OneTimeSupport,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::PremiumMonthly => "premium-monthly",
            Plan::PremiumYearly => "premium-yearly",
            Plan::UltimateMonthly => "ultimate-monthly",
            Plan::UltimateYearly => "ultimate-yearly",
            Plan::GenrePack => "genre-pack",
            Plan::OneTimeSupport => "one-time-support",
        }
    }

    /// How long a subscription on this plan stays active.
    /// Set once at creation time and never recomputed.
    pub fn term(&self) -> Duration {
        match self {
            Plan::PremiumYearly | Plan::UltimateYearly => Duration::days(365),
            _ => Duration::days(30),
        }
    }

    /// Maximum number of feed items served to this plan
    pub fn item_limit(&self) -> usize {
        match self {
            Plan::UltimateMonthly | Plan::UltimateYearly => 20,
            Plan::PremiumMonthly | Plan::PremiumYearly | Plan::GenrePack => 10,
            Plan::OneTimeSupport => 5,
        }
    }

    /// Whether this plan may select an upstream-ordered candidate list
    /// via the `sort` query parameter
    pub fn allows_upstream_sort(&self) -> bool {
        !matches!(self, Plan::OneTimeSupport)
    }

    /// Classify a provider membership into a plan from its level name and
    /// paid amount. Level names containing "yearly" or "annual" map to the
    /// yearly cadence; amounts at or above the threshold upgrade to ultimate.
    pub fn from_membership(level_name: &str, amount: f64) -> Self {
        let level = level_name.to_lowercase();
        let yearly = level.contains("yearly") || level.contains("annual");
        let ultimate = amount >= ULTIMATE_AMOUNT_THRESHOLD;

        match (ultimate, yearly) {
            (true, true) => Plan::UltimateYearly,
            (true, false) => Plan::UltimateMonthly,
            (false, true) => Plan::PremiumYearly,
            (false, false) => Plan::PremiumMonthly,
        }
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "premium-monthly" => Ok(Plan::PremiumMonthly),
            "premium-yearly" => Ok(Plan::PremiumYearly),
            "ultimate-monthly" => Ok(Plan::UltimateMonthly),
            "ultimate-yearly" => Ok(Plan::UltimateYearly),
            "genre-pack" => Ok(Plan::GenrePack),
            "one-time-support" => Ok(Plan::OneTimeSupport),
            other => Err(format!("{} is not a known plan", other)),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
