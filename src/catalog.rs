//! Purchasable connectivity packages.

use crate::lifecycle::DurationUnit;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CatalogPackage {
    pub id: String,
    pub name: String,
    pub price_bdt: u32,
    pub duration_value: u32,
    pub duration_unit: DurationUnit,
}

impl CatalogPackage {
    fn new(id: &str, name: &str, price_bdt: u32, duration_value: u32, unit: DurationUnit) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            price_bdt,
            duration_value,
            duration_unit: unit,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        i64::from(self.duration_value) * self.duration_unit.millis()
    }

    pub fn duration_label(&self) -> String {
        format!("{} {}", self.duration_value, self.duration_unit.as_str())
    }
}

/// Packages offered when the config doesn't list any
pub fn builtin_packages() -> Vec<CatalogPackage> {
    vec![
        CatalogPackage::new("hour", "Quick Hour", 10, 1, DurationUnit::Hours),
        CatalogPackage::new("night", "Night Owl", 25, 8, DurationUnit::Hours),
        CatalogPackage::new("daily", "Daily Unlimited", 30, 1, DurationUnit::Days),
        CatalogPackage::new("weekly", "Weekly Flex", 150, 7, DurationUnit::Days),
        CatalogPackage::new("monthly", "Monthly Max", 500, 30, DurationUnit::Days),
    ]
}

#[derive(Debug, Clone)]
pub struct Catalog {
    packages: Vec<CatalogPackage>,
}

impl Catalog {
    pub fn new(packages: Vec<CatalogPackage>) -> Self {
        if packages.is_empty() {
            Self {
                packages: builtin_packages(),
            }
        } else {
            Self { packages }
        }
    }

    pub fn get(&self, id: &str) -> Option<&CatalogPackage> {
        self.packages.iter().find(|p| p.id.eq_ignore_ascii_case(id))
    }

    /// Packages ordered by price
    pub fn list(&self) -> Vec<&CatalogPackage> {
        let mut packages: Vec<_> = self.packages.iter().collect();
        packages.sort_by_key(|p| p.price_bdt);
        packages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_falls_back_to_builtin() {
        let catalog = Catalog::new(Vec::new());
        assert_eq!(catalog.list().len(), builtin_packages().len());
        assert!(catalog.get("DAILY").is_some());
        assert!(catalog.get("lifetime").is_none());
    }

    #[test]
    fn test_list_sorted_by_price() {
        let catalog = Catalog::new(vec![
            CatalogPackage::new("b", "B", 50, 1, DurationUnit::Days),
            CatalogPackage::new("a", "A", 5, 30, DurationUnit::Minutes),
        ]);
        let ids: Vec<_> = catalog.list().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_duration() {
        let p = CatalogPackage::new("w", "Weekly", 150, 7, DurationUnit::Days);
        assert_eq!(p.duration_ms(), 7 * 86_400_000);
        assert_eq!(p.duration_label(), "7 days");
    }

    #[test]
    fn test_deserialize_from_toml() {
        let toml_str = r#"
id = "night"
name = "Night Owl"
price_bdt = 25
duration_value = 8
duration_unit = "hours"
"#;
        let p: CatalogPackage = toml::from_str(toml_str).unwrap();
        assert_eq!(p.duration_unit, DurationUnit::Hours);

        let p: CatalogPackage = toml::from_str(&toml_str.replace("hours", "mins")).unwrap();
        assert_eq!(p.duration_unit, DurationUnit::Minutes);
    }
}
