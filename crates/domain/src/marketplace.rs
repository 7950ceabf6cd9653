//! Marketplace constant table.
//!
//! Country-scoped identifiers selecting the regional endpoint host, signing
//! region and currency default. The table is process-wide and immutable.

/// One marketplace row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marketplace {
    /// Country code used by callers (e.g. `"UK"`).
    pub country: &'static str,
    /// Marketplace identifier understood by the upstream API.
    pub id: &'static str,
    /// Regional API host.
    pub endpoint_host: &'static str,
    /// Signing region for that host.
    pub region: &'static str,
    /// Default currency (ISO 4217).
    pub currency: &'static str,
}

pub const DEFAULT_COUNTRY: &str = "UK";

const EU_HOST: &str = "sellingpartnerapi-eu.amazon.com";
const NA_HOST: &str = "sellingpartnerapi-na.amazon.com";
const FE_HOST: &str = "sellingpartnerapi-fe.amazon.com";

/// The full marketplace table.
pub const MARKETPLACES: &[Marketplace] = &[
    Marketplace { country: "UK", id: "A1F83G8C2ARO7P", endpoint_host: EU_HOST, region: "eu-west-1", currency: "GBP" },
    Marketplace { country: "DE", id: "A1PA6795UKMFR9", endpoint_host: EU_HOST, region: "eu-west-1", currency: "EUR" },
    Marketplace { country: "FR", id: "A13V1IB3VIYZZH", endpoint_host: EU_HOST, region: "eu-west-1", currency: "EUR" },
    Marketplace { country: "IT", id: "APJ6JRA9NG5V4", endpoint_host: EU_HOST, region: "eu-west-1", currency: "EUR" },
    Marketplace { country: "ES", id: "A1RKKUPIHCS9HS", endpoint_host: EU_HOST, region: "eu-west-1", currency: "EUR" },
    Marketplace { country: "US", id: "ATVPDKIKX0DER", endpoint_host: NA_HOST, region: "us-east-1", currency: "USD" },
    Marketplace { country: "CA", id: "A2EUQ1WTGCTBG2", endpoint_host: NA_HOST, region: "us-east-1", currency: "CAD" },
    Marketplace { country: "JP", id: "A1VC38T7YXB528", endpoint_host: FE_HOST, region: "us-west-2", currency: "JPY" },
];

impl Marketplace {
    /// Look up by country code (case-insensitive).
    pub fn by_country(country: &str) -> Option<&'static Marketplace> {
        MARKETPLACES
            .iter()
            .find(|m| m.country.eq_ignore_ascii_case(country))
    }

    /// Look up by marketplace identifier.
    pub fn by_id(id: &str) -> Option<&'static Marketplace> {
        MARKETPLACES.iter().find(|m| m.id == id)
    }

    /// The process-wide default (UK).
    pub fn default_marketplace() -> &'static Marketplace {
        Marketplace::by_country(DEFAULT_COUNTRY).expect("default marketplace present in table")
    }

    /// `https://` base URL for this marketplace's regional host.
    pub fn endpoint_base(&self) -> String {
        format!("https://{}", self.endpoint_host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uk_row_matches_published_values() {
        let uk = Marketplace::by_country("uk").unwrap();
        assert_eq!(uk.id, "A1F83G8C2ARO7P");
        assert_eq!(uk.endpoint_host, "sellingpartnerapi-eu.amazon.com");
        assert_eq!(uk.region, "eu-west-1");
        assert_eq!(uk.currency, "GBP");
    }

    #[test]
    fn us_row_matches_published_values() {
        let us = Marketplace::by_country("US").unwrap();
        assert_eq!(us.id, "ATVPDKIKX0DER");
        assert_eq!(us.region, "us-east-1");
        assert_eq!(us.currency, "USD");
    }

    #[test]
    fn lookup_by_id_roundtrips() {
        for m in MARKETPLACES {
            assert_eq!(Marketplace::by_id(m.id).unwrap().country, m.country);
        }
    }

    #[test]
    fn unknown_country_is_none() {
        assert!(Marketplace::by_country("XX").is_none());
        assert!(Marketplace::by_id("NOPE").is_none());
    }

    #[test]
    fn default_is_uk() {
        assert_eq!(Marketplace::default_marketplace().country, "UK");
    }

    #[test]
    fn minimum_required_rows_present() {
        for c in ["UK", "US", "DE", "FR", "JP"] {
            assert!(Marketplace::by_country(c).is_some(), "missing {c}");
        }
    }
}
