//! Generation pricing

/// Where a charge's token cost came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    /// Amount passed by the caller
    Explicit,
    /// Active `custom_user_pricing` row for the account
    AccountCustom,
    /// Active `ai_generation_costs` row
    GlobalDefault,
    /// [`BUILTIN_MODEL_COSTS`]
    BuiltinTable,
    /// [`DEFAULT_TOKEN_COST`]
    ConstantDefault,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::AccountCustom => "account_custom",
            Self::GlobalDefault => "global_default",
            Self::BuiltinTable => "builtin_table",
            Self::ConstantDefault => "constant_default",
        }
    }
}

/// Price sources in the order they are consulted; the first hit wins
pub const PRICE_RESOLUTION_ORDER: &[PriceSource] = &[
    PriceSource::Explicit,
    PriceSource::AccountCustom,
    PriceSource::GlobalDefault,
    PriceSource::BuiltinTable,
    PriceSource::ConstantDefault,
];

/// Fallback costs when the pricing tables have no row
pub const BUILTIN_MODEL_COSTS: &[(&str, i64)] = &[
    ("fal-ai/fast-sdxl", 1),
    ("fal-ai/flux-realism", 4),
    ("fal-ai/insightface-swap", 8),
    ("fal-ai/video-generation", 25),
];

pub const DEFAULT_TOKEN_COST: i64 = 5;

pub fn builtin_cost(model_id: &str) -> Option<i64> {
    BUILTIN_MODEL_COSTS
        .iter()
        .find(|(m, _)| *m == model_id)
        .map(|(_, cost)| *cost)
}

/// A resolved price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Price {
    pub tokens: i64,
    pub source: PriceSource,
}
