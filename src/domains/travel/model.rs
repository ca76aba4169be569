//! Travel agency records.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::ledger::{LedgerEntry, Reversible};
use crate::lifecycle::Lifecycle;
use crate::money::Money;
use crate::store::{Database, Statistics, Table};

// ----------------------------------------------------------------------------
// Lifecycles
// ----------------------------------------------------------------------------

/// Status of one dated departure of a package.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DepartureStatus {
    Available,
    SoldOut,
    Cancelled,
}

impl Lifecycle for DepartureStatus {
    const ENTITY: &'static str = "Departure";

    fn name(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::SoldOut => "sold_out",
            Self::Cancelled => "cancelled",
        }
    }

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Available => &[Self::SoldOut, Self::Cancelled],
            Self::SoldOut => &[Self::Available, Self::Cancelled],
            Self::Cancelled => &[],
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl Lifecycle for BookingStatus {
    const ENTITY: &'static str = "Booking";

    fn name(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    fn successors(self) -> &'static [Self] {
        match self {
            Self::Confirmed => &[Self::Cancelled],
            Self::Cancelled => &[],
        }
    }
}

/// Kind of a saved payment method.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentSource {
    CreditCard,
    DebitCard,
    GiftCard,
    BankTransfer,
}

/// Priced insurance tiers. Any other label is accepted and priced at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsuranceTier {
    /// 50.00 per traveler.
    Standard,
    /// 100.00 per traveler.
    Premium,
}

impl InsuranceTier {
    /// Parses a free-form insurance label, ignoring case and surrounding space.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }

    /// Premium charged per traveler.
    #[must_use]
    pub const fn per_traveler(self) -> Money {
        match self {
            Self::Standard => Money::from_minor(5_000),
            Self::Premium => Money::from_minor(10_000),
        }
    }
}

// ----------------------------------------------------------------------------
// Shared value objects
// ----------------------------------------------------------------------------

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PersonName {
    pub first_name: String,
    pub last_name: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub zip: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassportInfo {
    pub number: String,
    pub nationality: String,
    pub expiry: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct Location {
    pub city: String,
    pub country: String,
}

// ----------------------------------------------------------------------------
// Travelers
// ----------------------------------------------------------------------------

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelerPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dietary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bed_preference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub payment_method_id: String,
    pub source: PaymentSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_four: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Companion {
    pub first_name: String,
    pub last_name: String,
    pub dob: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passport: Option<PassportInfo>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traveler {
    pub traveler_id: String,
    pub name: PersonName,
    #[serde(default)]
    pub address: PostalAddress,
    pub contact: ContactInfo,
    pub dob: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passport: Option<PassportInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<TravelerPreferences>,
    /// Saved payment methods by id.
    #[serde(default)]
    pub payment_methods: BTreeMap<String, PaymentMethod>,
    #[serde(default)]
    pub saved_companions: Vec<Companion>,
    #[serde(default)]
    pub memberships: Vec<String>,
    /// Bookings made by this traveler, oldest first.
    #[serde(default)]
    pub booking_ids: Vec<String>,
}

// ----------------------------------------------------------------------------
// Agents
// ----------------------------------------------------------------------------

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyInfo {
    pub name: String,
    #[serde(default)]
    pub address: PostalAddress,
}

/// Open meeting slots of one day, as `HH:MM-HH:MM` ranges.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityDay {
    pub slots: Vec<String>,
    pub timezone: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub name: PersonName,
    pub contact: ContactInfo,
    pub agency: AgencyInfo,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub regions_of_expertise: Vec<String>,
    #[serde(default)]
    pub commission_rate: f64,
    #[serde(default)]
    pub employment_status: String,
    #[serde(default)]
    pub assigned_travelers: Vec<String>,
    #[serde(default)]
    pub managed_packages: Vec<String>,
    #[serde(default)]
    pub bookings_handled: Vec<String>,
    /// Availability by date (`YYYY-MM-DD`).
    #[serde(default)]
    pub availability: BTreeMap<String, AvailabilityDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// ----------------------------------------------------------------------------
// Packages
// ----------------------------------------------------------------------------

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Departure {
    pub status: DepartureStatus,
    /// Price per traveler.
    pub base_price: Money,
    pub currency: String,
    pub available_slots: u32,
    #[serde(default)]
    pub early_bird_deadline: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItineraryItem {
    pub day: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub location: Location,
    #[serde(default)]
    pub included_meals: Vec<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accommodation {
    pub name: String,
    #[serde(rename = "type")]
    pub accommodation_type: String,
    pub location: Location,
    pub nights: u32,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportationInfo {
    #[serde(default)]
    pub international: String,
    #[serde(default)]
    pub domestic: String,
    #[serde(default)]
    pub ground: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub day: u32,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagePolicies {
    #[serde(default)]
    pub cancellation_policy: String,
    #[serde(default)]
    pub change_policy: String,
    #[serde(default)]
    pub refund_policy: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub package_id: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub destinations: Vec<Location>,
    pub duration_days: u32,
    #[serde(default)]
    pub departure_points: Vec<Location>,
    /// Departures by date (`YYYY-MM-DD`).
    pub departures: BTreeMap<String, Departure>,
    #[serde(default)]
    pub itinerary: Vec<ItineraryItem>,
    #[serde(default)]
    pub inclusions: Vec<String>,
    #[serde(default)]
    pub exclusions: Vec<String>,
    #[serde(default)]
    pub accommodations: Vec<Accommodation>,
    #[serde(default)]
    pub transportation: TransportationInfo,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub policies: PackagePolicies,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub managed_by_agents: Vec<String>,
}

impl Package {
    /// Returns true if at least one departure can still be booked.
    #[must_use]
    pub fn has_open_departure(&self) -> bool {
        self.departures
            .values()
            .any(|d| d.status == DepartureStatus::Available && d.available_slots > 0)
    }
}

// ----------------------------------------------------------------------------
// Bookings
// ----------------------------------------------------------------------------

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BookingTraveler {
    pub first_name: String,
    pub last_name: String,
    /// Date of birth, `YYYY-MM-DD`.
    pub dob: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Rooming {
    /// Room type, e.g. `double` or `suite`.
    pub room_type: String,
    pub occupancy: u32,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AddOn {
    /// Add-on kind, e.g. `excursion` or `transfer`.
    #[serde(rename = "type")]
    pub add_on_type: String,
    pub description: String,
    pub price: Money,
}

/// One signed payment against a booking.
///
/// Charges are positive, refunds negative. Entries are only ever appended.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BookingPayment {
    /// Saved payment method the amount was charged to or refunded to.
    pub payment_id: String,
    pub amount: Money,
}

impl LedgerEntry for BookingPayment {
    fn event_key(&self) -> String {
        self.payment_id.clone()
    }

    fn signed_amount(&self) -> Money {
        self.amount
    }
}

impl Reversible for BookingPayment {
    fn reversal(&self) -> Self {
        Self {
            payment_id: self.payment_id.clone(),
            amount: -self.amount,
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub booking_id: String,
    pub traveler_id: String,
    pub package_id: String,
    pub agent_id: String,
    pub booking_date: String,
    pub departure_date: String,
    pub status: BookingStatus,
    pub travelers: Vec<BookingTraveler>,
    pub rooming: Rooming,
    #[serde(default)]
    pub add_ons: Vec<AddOn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance: Option<String>,
    #[serde(default)]
    pub payment_history: Vec<BookingPayment>,
    pub total_price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Booking {
    /// Net amount paid so far.
    #[must_use]
    pub fn net_paid(&self) -> Money {
        crate::ledger::net(&self.payment_history)
    }
}

// ----------------------------------------------------------------------------
// Database
// ----------------------------------------------------------------------------

/// The travel agency store.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TravelDb {
    #[serde(default)]
    pub packages: Table<Package>,
    #[serde(default)]
    pub travelers: Table<Traveler>,
    #[serde(default)]
    pub agents: Table<Agent>,
    #[serde(default)]
    pub bookings: Table<Booking>,
}

impl TravelDb {
    pub(crate) fn traveler(&self, traveler_id: &str) -> Result<&Traveler, ToolError> {
        self.travelers.require("Traveler", traveler_id)
    }

    pub(crate) fn package(&self, package_id: &str) -> Result<&Package, ToolError> {
        self.packages.require("Package", package_id)
    }

    pub(crate) fn agent(&self, agent_id: &str) -> Result<&Agent, ToolError> {
        self.agents.require("Agent", agent_id)
    }

    pub(crate) fn booking(&self, booking_id: &str) -> Result<&Booking, ToolError> {
        self.bookings.require("Booking", booking_id)
    }
}

impl Database for TravelDb {
    fn statistics(&self) -> Statistics {
        let departures: usize = self.packages.values().map(|p| p.departures.len()).sum();
        let mut stats = Statistics::new();
        stats.insert("num_packages".to_string(), self.packages.len().into());
        stats.insert("num_departure_instances".to_string(), departures.into());
        stats.insert("num_travelers".to_string(), self.travelers.len().into());
        stats.insert("num_agents".to_string(), self.agents.len().into());
        stats.insert("num_bookings".to_string(), self.bookings.len().into());
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger;
    use crate::lifecycle::ensure_transition;

    #[test]
    fn departure_transitions() {
        assert!(DepartureStatus::Available.can_transition_to(DepartureStatus::SoldOut));
        assert!(DepartureStatus::SoldOut.can_transition_to(DepartureStatus::Available));
        assert!(DepartureStatus::Cancelled.is_terminal());
        assert!(ensure_transition("PKG1@2024-07-01", DepartureStatus::Cancelled, DepartureStatus::Available).is_err());
        assert!(ensure_transition("BK1", BookingStatus::Cancelled, BookingStatus::Cancelled).is_err());
    }

    #[test]
    fn insurance_labels() {
        assert_eq!(InsuranceTier::parse(" Premium "), Some(InsuranceTier::Premium));
        assert_eq!(InsuranceTier::parse("standard"), Some(InsuranceTier::Standard));
        assert_eq!(InsuranceTier::parse("gold"), None);
        assert_eq!(InsuranceTier::Standard.per_traveler(), Money::from_minor(5_000));
    }

    #[test]
    fn refunds_net_the_payment_history_to_zero() {
        let history = vec![
            BookingPayment { payment_id: "pm_1".to_string(), amount: Money::from_minor(20_000) },
            BookingPayment { payment_id: "pm_2".to_string(), amount: Money::from_minor(5_000) },
        ];
        let refunds = ledger::reversals(&history);
        assert!(ledger::is_mirror(&history, &refunds));
        assert_eq!(refunds[0].payment_id, "pm_1");
        let all: Vec<BookingPayment> = history.into_iter().chain(refunds).collect();
        assert!(ledger::net(&all).is_zero());
    }

    #[test]
    fn add_on_uses_type_on_the_wire() {
        let add_on: AddOn =
            serde_json::from_str(r#"{"type": "excursion", "description": "Glacier hike", "price": 120.5}"#).unwrap();
        assert_eq!(add_on.add_on_type, "excursion");
        assert_eq!(add_on.price, Money::from_minor(12_050));
    }
}
