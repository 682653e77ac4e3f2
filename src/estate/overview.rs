//! Flat, consistently keyed projection of a normalized listing.
//!
//! The vendor spreads the same concept over several type-specific fields
//! (`apartmentType` vs `buildingType`, `creationDate` vs `creation`, ...).
//! The overview picks whichever is present so consumers can query every
//! listing type the same way.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListingOverview {
    pub id: Option<String>,
    pub title: Option<String>,
    pub internal_id: Option<String>,
    pub estate_type: Option<String>,
    pub trade_type: Option<String>,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub active: Option<bool>,
    pub handicapped_accessible: Option<Value>,
    pub heating_type_enev2014: Option<Value>,
    pub min_divisible: Option<Value>,
    pub number_of_rooms_from: Option<Value>,
    pub number_of_rooms_to: Option<Value>,
    pub energy_sources_enev2014: Option<Value>,
    pub energy_certificate_availability: Option<Value>,
    pub energy_certificate_creation_date: Option<Value>,
    pub address: Option<OverviewAddress>,
    pub price: Option<OverviewPrice>,
    /// Listing fields copied verbatim, selected by configuration.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OverviewAddress {
    pub country: Option<String>,
    pub street: Option<String>,
    pub house_number: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewPrice {
    pub marketing_type: Option<String>,
    pub value: Option<f64>,
    pub currency: Option<String>,
    pub price_interval_type: Option<String>,
}

/// Builds the overview from a listing whose attribute markers are already
/// stripped. `type_tag` is the envelope key, e.g. `realestates.houseBuy`.
/// Each name in `fields` present on the listing is copied into
/// [`ListingOverview::fields`].
pub fn build_overview(listing: &Value, type_tag: &str, fields: &[String]) -> ListingOverview {
    let estate_type = text(listing, "xsi.type")
        .or_else(|| type_tag.split('.').nth(1).map(str::to_string));

    ListingOverview {
        id: text(listing, "id"),
        title: text(listing, "title"),
        internal_id: text(listing, "externalId"),
        estate_type,
        trade_type: first_text(
            listing,
            &["apartmentType", "buildingType", "estateType", "investmentType"],
        ),
        created_at: first_epoch(listing, &["creationDate", "creation"]),
        updated_at: first_epoch(
            listing,
            &["lastModificationDate", "modified", "modification"],
        ),
        active: listing.get("realEstateState").and_then(listing_state),
        handicapped_accessible: first_set(listing, &["handicappedAccessible", "assistedLiving"]),
        heating_type_enev2014: first_set(listing, &["heatingTypeEnev2014", "heatingType"]),
        min_divisible: first_set(listing, &["minDivisible", "areaDivisibleFrom"]),
        number_of_rooms_from: first_set(listing, &["numberOfRoomsFrom"]),
        number_of_rooms_to: first_set(listing, &["numberOfRoomsTo"]),
        energy_sources_enev2014: nested(listing, "energySourcesEnev2014", "energySourceEnev2014"),
        energy_certificate_availability: nested(
            listing,
            "energyCertificate",
            "energyCertificateAvailability",
        ),
        energy_certificate_creation_date: nested(
            listing,
            "energyCertificate",
            "energyCertificateCreationDate",
        ),
        address: listing.get("address").and_then(address),
        price: price(listing),
        fields: fields
            .iter()
            .filter_map(|name| {
                let value = listing.get(name.as_str()).filter(|v| !v.is_null())?;
                Some((name.clone(), value.clone()))
            })
            .collect(),
    }
}

/// `false` for withdrawn listings, `true` for live ones, `None` when the
/// state is unknown.
pub fn listing_state(state: &Value) -> Option<bool> {
    match state {
        Value::Bool(flag) => Some(*flag),
        Value::String(raw) => {
            let upper = raw.to_uppercase();
            if ["INACTIVE", "ARCHIVED", "TO_BE_DELETED"]
                .iter()
                .any(|marker| upper.contains(marker))
            {
                Some(false)
            } else if upper.contains("ACTIVE") {
                Some(true)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Epoch milliseconds from a number or a vendor date string.
pub fn epoch_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(raw) => {
            let raw = raw.trim();
            if let Ok(n) = raw.parse::<i64>() {
                return Some(n);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
                return Some(dt.timestamp_millis());
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(naive.and_utc().timestamp_millis());
            }
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc().timestamp_millis())
        }
        _ => None,
    }
}

fn address(value: &Value) -> Option<OverviewAddress> {
    if !value.is_object() {
        return None;
    }
    let coordinates = value.get("wgs84Coordinate").and_then(|c| {
        Some(Coordinates {
            latitude: number(c.get("latitude")?)?,
            longitude: number(c.get("longitude")?)?,
        })
    });
    Some(OverviewAddress {
        country: text(value, "country"),
        street: text(value, "street"),
        house_number: text(value, "houseNumber"),
        city: text(value, "city"),
        postcode: text(value, "postcode"),
        coordinates,
    })
}

// Rentals without a price block only carry `totalRent`, always in EUR.
fn price(listing: &Value) -> Option<OverviewPrice> {
    if let Some(block) = listing.get("price").filter(|p| p.is_object()) {
        return Some(OverviewPrice {
            marketing_type: text(block, "marketingType"),
            value: block.get("value").and_then(number),
            currency: text(block, "currency"),
            price_interval_type: text(block, "priceIntervalType"),
        });
    }
    let total_rent = listing.get("totalRent").and_then(number)?;
    Some(OverviewPrice {
        marketing_type: Some("RENT".into()),
        value: Some(total_rent),
        currency: Some("EUR".into()),
        price_interval_type: None,
    })
}

fn text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn first_text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| text(value, key))
}

// `false`, `null` and missing all fall through to the next key.
fn first_set(value: &Value, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find(|v| !v.is_null() && **v != Value::Bool(false))
        .cloned()
}

fn nested(value: &Value, outer: &str, inner: &str) -> Option<Value> {
    value
        .get(outer)?
        .get(inner)
        .filter(|v| !v.is_null())
        .cloned()
}

fn first_epoch(value: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(epoch_millis))
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
