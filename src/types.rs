use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

/// The five numeric attributes the map and chart can express. The selector
/// is populated from `Attribute::ALL`, so any attribute arriving from the
/// outside is validated simply by parsing into this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Attribute {
    VarA,
    VarB,
    VarC,
    VarD,
    VarE,
}

impl Attribute {
    pub const ALL: [Attribute; 5] = [
        Attribute::VarA,
        Attribute::VarB,
        Attribute::VarC,
        Attribute::VarD,
        Attribute::VarE,
    ];

    /// The attribute expressed before any selection has been made.
    pub fn initial() -> Attribute {
        Attribute::ALL[0]
    }

    /// The CSV column header for this attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::VarA => "varA",
            Attribute::VarB => "varB",
            Attribute::VarC => "varC",
            Attribute::VarD => "varD",
            Attribute::VarE => "varE",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Attribute {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Attribute::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown attribute: {}", s))
    }
}

impl TryFrom<String> for Attribute {
    type Error = anyhow::Error;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Attribute> for String {
    fn from(a: Attribute) -> String {
        a.as_str().to_string()
    }
}

/// One row of the tabular input. Only values that parsed as finite numbers
/// are present in `values`; malformed text is absent, never zero.
#[derive(Debug, Clone)]
pub struct StatRecord {
    pub code: String,
    pub name: String,
    pub values: HashMap<Attribute, f64>,
}

impl StatRecord {
    pub fn value(&self, attr: Attribute) -> Option<f64> {
        self.values.get(&attr).copied()
    }
}

/// A geographic enumeration unit: immutable geometry plus a property bag
/// filled once by the join. A region that never matched a record keeps an
/// empty bag, which downstream rendering treats as "no data", not zero.
#[derive(Debug, Clone)]
pub struct Region {
    pub code: String,
    pub name: Option<String>,
    pub geometry: MultiPolygon<f64>,
    pub attrs: HashMap<Attribute, f64>,
}

impl Region {
    pub fn value(&self, attr: Attribute) -> Option<f64> {
        self.attrs.get(&attr).copied()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.code)
    }
}
