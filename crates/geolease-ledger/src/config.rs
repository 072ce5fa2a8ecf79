use serde::{Deserialize, Serialize};

use geolease_types::{AccountId, Amount, GeoZone, Position};

/// Static configuration of the rented asset, fixed at ledger creation.
///
/// Missing fields fall back to [`AssetConfig::default`] when deserialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Display name of the equipment.
    pub equipment_name: String,
    /// Charge per second of active use.
    pub price_per_second: Amount,
    /// Smallest deposit `rent` accepts.
    pub min_deposit: Amount,
    /// Informational flag published with the asset metadata.
    pub is_returnable: bool,
    /// Receives the amount due at settlement.
    pub lessor: AccountId,
    /// Operator account allowed to sweep the held balance.
    pub owner: AccountId,
    /// The allowed working zone.
    pub zone: GeoZone,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            equipment_name: "Excavator".into(),
            price_per_second: Amount::from_base(10_000_000_000_000),
            min_deposit: Amount::from_base(10_000_000_000_000_000),
            is_returnable: true,
            lessor: AccountId::from_label("lessor"),
            owner: AccountId::from_label("owner"),
            zone: GeoZone::new(Position::new(52_370_216, 4_895_168), 500),
        }
    }
}
