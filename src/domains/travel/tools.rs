//! Travel agency operations.

use std::collections::BTreeSet;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::error::{ToolError, ValidationError};
use crate::ledger;
use crate::lifecycle::{ensure_status, ensure_transition};
use crate::money::Money;
use crate::store::IdAllocator;
use crate::toolkit::{generic, Commit, ToolContext, ToolRegistry};

use super::model::{
    AddOn, Agent, Booking, BookingPayment, BookingStatus, BookingTraveler, Departure,
    DepartureStatus, InsuranceTier, Location, Package, Rooming, Traveler, TravelDb,
};

const BOOKING_PREFIX: &str = "TAU";
const BOOKING_WIDTH: usize = 3;
/// Bookings one run may create.
const MAX_NEW_BOOKINGS: u64 = 3;

/// Builds the travel operation registry.
pub fn registry() -> Result<Arc<ToolRegistry<TravelDb>>, ValidationError> {
    let builder = ToolRegistry::builder()
        .read("get_traveler_details", "Get a traveler's profile, saved payment methods and booking ids.", get_traveler_details)
        .read("get_agent_details", "Get a travel agent's profile and availability.", get_agent_details)
        .read("get_package_details", "Get the full details of a package, including its dated departures.", get_package_details)
        .read("get_booking_details", "Get the full details of a booking.", get_booking_details)
        .read(
            "search_packages",
            "Search packages by destination, category and departure date. Only packages with an \
             open departure are returned.",
            search_packages,
        )
        .read("list_all_destinations", "List every destination offered by any package, without duplicates.", list_all_destinations)
        .write(
            "book_package",
            "Book a package departure for a traveler. The payments must use the traveler's saved \
             payment methods and add up exactly to the total price (base price per traveler, plus \
             add-ons, plus insurance: standard 50 or premium 100 per traveler). Get explicit user \
             confirmation (yes) before calling.",
            book_package,
        )
        .write(
            "cancel_booking",
            "Cancel a booking, refunding every recorded payment and releasing the seats. Cancelling \
             a cancelled booking returns it unchanged. Get explicit user confirmation before calling.",
            cancel_booking,
        )
        .write(
            "update_booking_add_ons",
            "Replace the add-ons of a confirmed booking, charging or refunding the price difference \
             to the given saved payment method.",
            update_booking_add_ons,
        )
        .write(
            "update_booking_departure_date",
            "Move a confirmed booking to another departure date of the same package, charging or \
             refunding the price difference to the given saved payment method.",
            update_booking_departure_date,
        )
        .write(
            "update_booking_travelers",
            "Replace the traveler details of a confirmed booking. The number of travelers cannot change.",
            update_booking_travelers,
        )
        .write("update_booking_rooming", "Change the rooming of a confirmed booking.", update_booking_rooming)
        .write(
            "schedule_agent_meeting",
            "Reserve one of an agent's open time slots for a meeting with a traveler.",
            schedule_agent_meeting,
        );
    generic::register(builder).build_shared()
}

// ----------------------------------------------------------------------------
// Arguments
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct TravelerArgs {
    /// The traveler id.
    traveler_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct AgentArgs {
    /// The agent id.
    agent_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct PackageArgs {
    /// The package id.
    package_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct BookingArgs {
    /// The booking id.
    booking_id: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct SearchPackagesArgs {
    #[serde(default)]
    destination_city: Option<String>,
    #[serde(default)]
    destination_country: Option<String>,
    /// Package category, e.g. `adventure`.
    #[serde(default)]
    category: Option<String>,
    /// Only packages departing on this date (`YYYY-MM-DD`).
    #[serde(default)]
    departure_date: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct BookPackageArgs {
    traveler_id: String,
    package_id: String,
    /// Departure date, `YYYY-MM-DD`.
    departure_date: String,
    /// Everyone travelling, including the traveler when they travel.
    travelers: Vec<BookingTraveler>,
    rooming: Rooming,
    #[serde(default)]
    add_ons: Vec<AddOn>,
    /// `standard`, `premium`, or omitted.
    #[serde(default)]
    insurance: Option<String>,
    /// Charges against the traveler's saved payment methods.
    payment_methods: Vec<BookingPayment>,
    /// Handling agent; defaults to the package's first managing agent.
    #[serde(default)]
    agent_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct UpdateAddOnsArgs {
    booking_id: String,
    /// The complete new list of add-ons.
    add_ons: Vec<AddOn>,
    /// Saved payment method charged or refunded the difference.
    payment_method_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct UpdateDepartureArgs {
    booking_id: String,
    /// New departure date, `YYYY-MM-DD`.
    new_departure_date: String,
    /// Saved payment method charged or refunded the difference.
    payment_method_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct UpdateTravelersArgs {
    booking_id: String,
    travelers: Vec<BookingTraveler>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct UpdateRoomingArgs {
    booking_id: String,
    rooming: Rooming,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct MeetingArgs {
    agent_id: String,
    /// Meeting date, `YYYY-MM-DD`.
    date: String,
    /// One of the agent's open slots, `HH:MM-HH:MM`.
    time_range: String,
    traveler_id: String,
}

// ----------------------------------------------------------------------------
// READ
// ----------------------------------------------------------------------------

fn get_traveler_details(db: &TravelDb, _ctx: &ToolContext<'_>, args: TravelerArgs) -> Result<Traveler, ToolError> {
    db.traveler(&args.traveler_id).cloned()
}

fn get_agent_details(db: &TravelDb, _ctx: &ToolContext<'_>, args: AgentArgs) -> Result<Agent, ToolError> {
    db.agent(&args.agent_id).cloned()
}

fn get_package_details(db: &TravelDb, _ctx: &ToolContext<'_>, args: PackageArgs) -> Result<Package, ToolError> {
    db.package(&args.package_id).cloned()
}

fn get_booking_details(db: &TravelDb, _ctx: &ToolContext<'_>, args: BookingArgs) -> Result<Booking, ToolError> {
    db.booking(&args.booking_id).cloned()
}

fn search_packages(
    db: &TravelDb,
    _ctx: &ToolContext<'_>,
    args: SearchPackagesArgs,
) -> Result<Vec<Package>, ToolError> {
    let city = args.destination_city.as_deref();
    let country = args.destination_country.as_deref();
    Ok(db
        .packages
        .values()
        .filter(|p| {
            (city.is_none() && country.is_none())
                || p.destinations.iter().any(|loc| {
                    city.map_or(true, |c| loc.city == c) && country.map_or(true, |c| loc.country == c)
                })
        })
        .filter(|p| args.category.as_deref().map_or(true, |c| p.category == c))
        .filter(|p| {
            args.departure_date
                .as_deref()
                .map_or(true, |d| p.departures.contains_key(d))
        })
        .filter(|p| p.has_open_departure())
        .cloned()
        .collect())
}

fn list_all_destinations(db: &TravelDb, _ctx: &ToolContext<'_>, _args: NoArgs) -> Result<Vec<Location>, ToolError> {
    let mut seen = BTreeSet::new();
    Ok(db
        .packages
        .values()
        .flat_map(|p| p.destinations.iter())
        .filter(|loc| seen.insert((loc.city.as_str(), loc.country.as_str())))
        .cloned()
        .collect())
}

// ----------------------------------------------------------------------------
// Pricing and seats
// ----------------------------------------------------------------------------

fn traveler_count(travelers: &[BookingTraveler]) -> Result<u32, ToolError> {
    match u32::try_from(travelers.len()) {
        Ok(0) => Err(ToolError::invalid_arguments("a booking needs at least one traveler")),
        Ok(n) => Ok(n),
        Err(_) => Err(ToolError::invalid_arguments("too many travelers")),
    }
}

/// Base price per traveler, plus add-ons, plus insurance per traveler.
fn total_price(base: Money, travelers: u32, add_ons: &[AddOn], insurance: Option<&str>) -> Money {
    let add_ons: Money = add_ons.iter().map(|a| a.price).sum();
    let insurance = insurance
        .and_then(InsuranceTier::parse)
        .map_or(Money::ZERO, |tier| tier.per_traveler().times(travelers));
    base.times(travelers) + add_ons + insurance
}

fn departure_id(package_id: &str, date: &str) -> String {
    format!("{package_id}@{date}")
}

fn departure<'a>(package: &'a Package, date: &str) -> Result<&'a Departure, ToolError> {
    package
        .departures
        .get(date)
        .ok_or_else(|| ToolError::not_found("Departure", departure_id(&package.package_id, date)))
}

/// The departure on `date` with `seats` taken, sold out when none remain.
fn take_seats(package: &Package, date: &str, seats: u32) -> Result<Departure, ToolError> {
    let id = departure_id(&package.package_id, date);
    let current = departure(package, date)?;
    ensure_status(&id, current.status, DepartureStatus::Available, "the departure is not open for booking")?;
    if current.available_slots < seats {
        return Err(ToolError::LimitExceeded {
            limit: "available_slots".to_string(),
            max: current.available_slots.to_string(),
            requested: seats.to_string(),
        });
    }
    let mut after = current.clone();
    after.available_slots -= seats;
    if after.available_slots == 0 {
        ensure_transition(&id, after.status, DepartureStatus::SoldOut)?;
        after.status = DepartureStatus::SoldOut;
    }
    Ok(after)
}

/// The departure on `date` with `seats` returned. A cancelled departure
/// keeps its status.
fn release_seats(package: &Package, date: &str, seats: u32) -> Result<Departure, ToolError> {
    let id = departure_id(&package.package_id, date);
    let mut after = departure(package, date)?.clone();
    after.available_slots += seats;
    if after.status == DepartureStatus::SoldOut {
        ensure_transition(&id, after.status, DepartureStatus::Available)?;
        after.status = DepartureStatus::Available;
    }
    Ok(after)
}

fn require_payment_method(traveler: &Traveler, payment_id: &str) -> Result<(), ToolError> {
    if traveler.payment_methods.contains_key(payment_id) {
        Ok(())
    } else {
        Err(ToolError::not_owned("Payment method", payment_id, &traveler.traveler_id))
    }
}

fn require_confirmed(booking: &Booking) -> Result<(), ToolError> {
    ensure_status(
        &booking.booking_id,
        booking.status,
        BookingStatus::Confirmed,
        "only confirmed bookings can be changed",
    )
}

/// A price-difference entry, or nothing when the price is unchanged.
fn adjustment(payment_method_id: &str, old_total: Money, new_total: Money) -> Option<BookingPayment> {
    let delta = new_total - old_total;
    (!delta.is_zero()).then(|| BookingPayment {
        payment_id: payment_method_id.to_string(),
        amount: delta,
    })
}

// ----------------------------------------------------------------------------
// Plans
// ----------------------------------------------------------------------------

/// Replaces a booking and any departures whose seats moved.
struct BookingChange {
    booking: Booking,
    departures: Vec<(String, String, Departure)>,
}

impl Commit<TravelDb> for BookingChange {
    type Output = Booking;

    fn commit(self, db: &mut TravelDb) -> Booking {
        for (package_id, date, departure) in self.departures {
            if let Some(package) = db.packages.get_mut(&package_id) {
                package.departures.insert(date, departure);
            }
        }
        if let Some(slot) = db.bookings.get_mut(&self.booking.booking_id) {
            slot.clone_from(&self.booking);
        }
        self.booking
    }
}

struct NewBooking {
    booking: Booking,
    departure: Departure,
    agent: Agent,
}

impl Commit<TravelDb> for NewBooking {
    type Output = Booking;

    fn commit(self, db: &mut TravelDb) -> Booking {
        let booking = self.booking;
        if let Some(package) = db.packages.get_mut(&booking.package_id) {
            package
                .departures
                .insert(booking.departure_date.clone(), self.departure);
        }
        if let Some(agent) = db.agents.get_mut(&self.agent.agent_id) {
            *agent = self.agent;
        }
        if let Some(traveler) = db.travelers.get_mut(&booking.traveler_id) {
            traveler.booking_ids.push(booking.booking_id.clone());
        }
        db.bookings.insert_fresh(booking.booking_id.clone(), booking.clone());
        booking
    }
}

enum Cancellation {
    AlreadyCancelled(Booking),
    Apply(BookingChange),
}

impl Commit<TravelDb> for Cancellation {
    type Output = Booking;

    fn commit(self, db: &mut TravelDb) -> Booking {
        match self {
            Self::AlreadyCancelled(booking) => booking,
            Self::Apply(change) => change.commit(db),
        }
    }
}

struct ReserveSlot {
    agent: Agent,
    confirmation: String,
}

impl Commit<TravelDb> for ReserveSlot {
    type Output = String;

    fn commit(self, db: &mut TravelDb) -> String {
        if let Some(agent) = db.agents.get_mut(&self.agent.agent_id) {
            *agent = self.agent;
        }
        self.confirmation
    }
}

// ----------------------------------------------------------------------------
// WRITE
// ----------------------------------------------------------------------------

fn book_package(db: &TravelDb, ctx: &ToolContext<'_>, args: BookPackageArgs) -> Result<NewBooking, ToolError> {
    let traveler = db.traveler(&args.traveler_id)?;
    let package = db.package(&args.package_id)?;
    let agent_id = match args.agent_id {
        Some(id) => id,
        None => package.managed_by_agents.first().cloned().ok_or_else(|| {
            ToolError::invalid_arguments(format!("package {} has no managing agent", package.package_id))
        })?,
    };
    let agent = db.agent(&agent_id)?;
    let seats = traveler_count(&args.travelers)?;
    let departure = take_seats(package, &args.departure_date, seats)?;

    let total = total_price(departure.base_price, seats, &args.add_ons, args.insurance.as_deref());
    for payment in &args.payment_methods {
        require_payment_method(traveler, &payment.payment_id)?;
        if !payment.amount.is_positive() {
            return Err(ToolError::invalid_arguments(format!(
                "payment amounts must be positive, got {} on {}",
                payment.amount, payment.payment_id
            )));
        }
    }
    let paid = ledger::net(&args.payment_methods);
    if paid != total {
        return Err(ToolError::invalid_arguments(format!(
            "payments add up to {paid}, but the total price is {total}"
        )));
    }

    let booking_id = IdAllocator::new("Booking", &db.bookings, BOOKING_PREFIX, BOOKING_WIDTH)
        .with_limit(MAX_NEW_BOOKINGS)
        .next_id()?;
    let mut agent = agent.clone();
    if !agent.assigned_travelers.contains(&traveler.traveler_id) {
        agent.assigned_travelers.push(traveler.traveler_id.clone());
    }
    agent.bookings_handled.push(booking_id.clone());

    tracing::debug!(booking_id = %booking_id, package_id = %package.package_id, seats, total = %total, "booking prepared");
    Ok(NewBooking {
        booking: Booking {
            booking_id,
            traveler_id: traveler.traveler_id.clone(),
            package_id: package.package_id.clone(),
            agent_id,
            booking_date: ctx.today(),
            departure_date: args.departure_date,
            status: BookingStatus::Confirmed,
            travelers: args.travelers,
            rooming: args.rooming,
            add_ons: args.add_ons,
            insurance: args.insurance,
            payment_history: args.payment_methods,
            total_price: total,
            notes: None,
        },
        departure,
        agent,
    })
}

fn cancel_booking(db: &TravelDb, _ctx: &ToolContext<'_>, args: BookingArgs) -> Result<Cancellation, ToolError> {
    let booking = db.booking(&args.booking_id)?;
    if booking.status == BookingStatus::Cancelled {
        return Ok(Cancellation::AlreadyCancelled(booking.clone()));
    }
    ensure_transition(&booking.booking_id, booking.status, BookingStatus::Cancelled)?;
    let package = db.package(&booking.package_id)?;
    let seats = traveler_count(&booking.travelers)?;

    let refunds = ledger::reversals(&booking.payment_history);
    let mut cancelled = booking.clone();
    cancelled.payment_history.extend(refunds);
    cancelled.status = BookingStatus::Cancelled;
    ledger::ensure_balanced(&cancelled.booking_id, &cancelled.payment_history)?;

    let mut departures = Vec::new();
    if package.departures.contains_key(&booking.departure_date) {
        let released = release_seats(package, &booking.departure_date, seats)?;
        departures.push((package.package_id.clone(), booking.departure_date.clone(), released));
    } else {
        tracing::warn!(
            booking_id = %booking.booking_id,
            departure = %departure_id(&package.package_id, &booking.departure_date),
            "departure missing while releasing seats"
        );
    }
    Ok(Cancellation::Apply(BookingChange {
        booking: cancelled,
        departures,
    }))
}

fn update_booking_add_ons(
    db: &TravelDb,
    _ctx: &ToolContext<'_>,
    args: UpdateAddOnsArgs,
) -> Result<BookingChange, ToolError> {
    let booking = db.booking(&args.booking_id)?;
    require_confirmed(booking)?;
    require_payment_method(db.traveler(&booking.traveler_id)?, &args.payment_method_id)?;
    let package = db.package(&booking.package_id)?;
    let current = departure(package, &booking.departure_date)?;
    let seats = traveler_count(&booking.travelers)?;

    let new_total = total_price(current.base_price, seats, &args.add_ons, booking.insurance.as_deref());
    let mut updated = booking.clone();
    updated
        .payment_history
        .extend(adjustment(&args.payment_method_id, booking.total_price, new_total));
    updated.add_ons = args.add_ons;
    updated.total_price = new_total;
    Ok(BookingChange {
        booking: updated,
        departures: Vec::new(),
    })
}

fn update_booking_departure_date(
    db: &TravelDb,
    _ctx: &ToolContext<'_>,
    args: UpdateDepartureArgs,
) -> Result<BookingChange, ToolError> {
    let booking = db.booking(&args.booking_id)?;
    require_confirmed(booking)?;
    if args.new_departure_date == booking.departure_date {
        return Err(ToolError::invalid_arguments("the booking already departs on that date"));
    }
    require_payment_method(db.traveler(&booking.traveler_id)?, &args.payment_method_id)?;
    let package = db.package(&booking.package_id)?;
    let seats = traveler_count(&booking.travelers)?;

    let taken = take_seats(package, &args.new_departure_date, seats)?;
    let mut departures = Vec::with_capacity(2);
    if package.departures.contains_key(&booking.departure_date) {
        let released = release_seats(package, &booking.departure_date, seats)?;
        departures.push((package.package_id.clone(), booking.departure_date.clone(), released));
    }
    let new_total = total_price(taken.base_price, seats, &booking.add_ons, booking.insurance.as_deref());
    departures.push((package.package_id.clone(), args.new_departure_date.clone(), taken));

    let mut updated = booking.clone();
    updated
        .payment_history
        .extend(adjustment(&args.payment_method_id, booking.total_price, new_total));
    updated.departure_date = args.new_departure_date;
    updated.total_price = new_total;
    Ok(BookingChange {
        booking: updated,
        departures,
    })
}

fn update_booking_travelers(
    db: &TravelDb,
    _ctx: &ToolContext<'_>,
    args: UpdateTravelersArgs,
) -> Result<BookingChange, ToolError> {
    let booking = db.booking(&args.booking_id)?;
    require_confirmed(booking)?;
    if args.travelers.len() != booking.travelers.len() {
        return Err(ToolError::invalid_arguments(format!(
            "the booking has {} travelers, got {}",
            booking.travelers.len(),
            args.travelers.len()
        )));
    }
    let mut updated = booking.clone();
    updated.travelers = args.travelers;
    Ok(BookingChange {
        booking: updated,
        departures: Vec::new(),
    })
}

fn update_booking_rooming(
    db: &TravelDb,
    _ctx: &ToolContext<'_>,
    args: UpdateRoomingArgs,
) -> Result<BookingChange, ToolError> {
    let booking = db.booking(&args.booking_id)?;
    require_confirmed(booking)?;
    if args.rooming.occupancy == 0 {
        return Err(ToolError::invalid_arguments("occupancy must be at least one"));
    }
    let mut updated = booking.clone();
    updated.rooming = args.rooming;
    Ok(BookingChange {
        booking: updated,
        departures: Vec::new(),
    })
}

fn schedule_agent_meeting(db: &TravelDb, _ctx: &ToolContext<'_>, args: MeetingArgs) -> Result<ReserveSlot, ToolError> {
    let agent = db.agent(&args.agent_id)?;
    db.traveler(&args.traveler_id)?;
    let day = agent.availability.get(&args.date).ok_or_else(|| ToolError::WrongState {
        kind: "Agent",
        id: agent.agent_id.clone(),
        state: "unavailable".to_string(),
        reason: format!("no availability on {}", args.date),
    })?;
    let Some(index) = day.slots.iter().position(|s| *s == args.time_range) else {
        return Err(ToolError::WrongState {
            kind: "Agent",
            id: agent.agent_id.clone(),
            state: "unavailable".to_string(),
            reason: format!("time slot {} is not open on {}", args.time_range, args.date),
        });
    };
    let mut updated = agent.clone();
    if let Some(day) = updated.availability.get_mut(&args.date) {
        day.slots.remove(index);
    }
    Ok(ReserveSlot {
        confirmation: format!(
            "Meeting scheduled with agent {} on {} at {}",
            agent.agent_id, args.date, args.time_range
        ),
        agent: updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::travel::sample_db;
    use crate::toolkit::Toolkit;
    use serde_json::{json, Value};

    fn toolkit() -> Toolkit<TravelDb> {
        Toolkit::new(registry().unwrap(), sample_db().unwrap())
    }

    fn booking_request(payments: Value) -> Value {
        json!({
            "traveler_id": "trv_001",
            "package_id": "PKG_ICE",
            "departure_date": "2024-07-01",
            "travelers": [
                {"first_name": "Mia", "last_name": "Chen", "dob": "1990-04-02"},
                {"first_name": "Leo", "last_name": "Chen", "dob": "1988-11-20"}
            ],
            "rooming": {"room_type": "double", "occupancy": 2},
            "add_ons": [{"type": "excursion", "description": "Glacier hike", "price": 120.0}],
            "insurance": "standard",
            "payment_methods": payments
        })
    }

    #[test]
    fn booking_prices_and_takes_seats() {
        let mut kit = toolkit();
        // 2 x 1500 + 120 + 2 x 50
        let out = kit
            .use_tool(
                "book_package",
                booking_request(json!([
                    {"payment_id": "pm_visa", "amount": 3000.0},
                    {"payment_id": "pm_gift", "amount": 220.0}
                ])),
            )
            .unwrap();
        assert_eq!(out["booking_id"], "TAU001");
        assert_eq!(out["total_price"], 3220.0);
        assert_eq!(out["agent_id"], "agt_01");
        assert_eq!(out["booking_date"], "2024-05-15");
        let departure = &kit.db().packages.get("PKG_ICE").unwrap().departures["2024-07-01"];
        assert_eq!(departure.available_slots, 0);
        assert_eq!(departure.status, DepartureStatus::SoldOut);
        let agent = kit.db().agents.get("agt_01").unwrap();
        assert!(agent.bookings_handled.contains(&"TAU001".to_string()));
        assert!(kit.db().travelers.get("trv_001").unwrap().booking_ids.contains(&"TAU001".to_string()));
    }

    #[test]
    fn booking_rejections_leave_store_untouched() {
        let mut kit = toolkit();
        let before = kit.fingerprint().unwrap();
        let short = kit
            .use_tool("book_package", booking_request(json!([{"payment_id": "pm_visa", "amount": 3000.0}])))
            .unwrap_err();
        assert_eq!(short.code(), "invalid_arguments");
        let foreign = kit
            .use_tool("book_package", booking_request(json!([{"payment_id": "pm_other", "amount": 3220.0}])))
            .unwrap_err();
        assert_eq!(foreign.code(), "not_owned");
        let mut sold_out = booking_request(json!([{"payment_id": "pm_visa", "amount": 3220.0}]));
        sold_out["departure_date"] = json!("2024-08-01");
        assert_eq!(kit.use_tool("book_package", sold_out).unwrap_err().code(), "not_active");
        assert_eq!(kit.fingerprint().unwrap(), before);
    }

    #[test]
    fn cancel_refunds_recorded_payments_once() {
        let mut kit = toolkit();
        let out = kit.use_tool("cancel_booking", json!({"booking_id": "BK0001"})).unwrap();
        assert_eq!(out["status"], "cancelled");
        let history = out["payment_history"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1], json!({"payment_id": "pm_visa", "amount": -250.0}));
        let departure = &kit.db().packages.get("PKG_CITY").unwrap().departures["2024-06-10"];
        assert_eq!(departure.available_slots, 5);

        let before = kit.fingerprint().unwrap();
        let again = kit.use_tool("cancel_booking", json!({"booking_id": "BK0001"})).unwrap();
        assert_eq!(again, out);
        assert_eq!(kit.fingerprint().unwrap(), before);

        let err = kit
            .use_tool("update_booking_rooming", json!({"booking_id": "BK0001", "rooming": {"room_type": "single", "occupancy": 1}}))
            .unwrap_err();
        assert_eq!(err.code(), "not_active");
    }

    #[test]
    fn add_on_changes_append_the_difference() {
        let mut kit = toolkit();
        let out = kit
            .use_tool(
                "update_booking_add_ons",
                json!({"booking_id": "BK0001", "payment_method_id": "pm_visa",
                       "add_ons": [{"type": "transfer", "description": "Airport pickup", "price": 40.0}]}),
            )
            .unwrap();
        assert_eq!(out["total_price"], 290.0);
        assert_eq!(out["payment_history"][1], json!({"payment_id": "pm_visa", "amount": 40.0}));
    }

    #[test]
    fn departure_change_moves_seats_and_reprices() {
        let mut kit = toolkit();
        let out = kit
            .use_tool(
                "update_booking_departure_date",
                json!({"booking_id": "BK0001", "new_departure_date": "2024-09-10", "payment_method_id": "pm_visa"}),
            )
            .unwrap();
        assert_eq!(out["departure_date"], "2024-09-10");
        assert_eq!(out["total_price"], 200.0);
        assert_eq!(out["payment_history"][1]["amount"], -50.0);
        let departures = &kit.db().packages.get("PKG_CITY").unwrap().departures;
        assert_eq!(departures["2024-06-10"].available_slots, 5);
        assert_eq!(departures["2024-09-10"].available_slots, 9);
    }

    #[test]
    fn booking_ids_run_out_after_three() {
        let mut kit = toolkit();
        for expected in ["TAU001", "TAU002", "TAU003"] {
            let out = kit
                .use_tool(
                    "book_package",
                    json!({
                        "traveler_id": "trv_001", "package_id": "PKG_CITY", "departure_date": "2024-09-10",
                        "travelers": [{"first_name": "Mia", "last_name": "Chen", "dob": "1990-04-02"}],
                        "rooming": {"room_type": "single", "occupancy": 1},
                        "payment_methods": [{"payment_id": "pm_visa", "amount": 200.0}]
                    }),
                )
                .unwrap();
            assert_eq!(out["booking_id"], expected);
        }
        let err = kit
            .use_tool(
                "book_package",
                json!({
                    "traveler_id": "trv_001", "package_id": "PKG_CITY", "departure_date": "2024-09-10",
                    "travelers": [{"first_name": "Mia", "last_name": "Chen", "dob": "1990-04-02"}],
                    "rooming": {"room_type": "single", "occupancy": 1},
                    "payment_methods": [{"payment_id": "pm_visa", "amount": 200.0}]
                }),
            )
            .unwrap_err();
        assert_eq!(err.code(), "id_space_exhausted");
    }

    #[test]
    fn search_and_destinations() {
        let mut kit = toolkit();
        let found = kit.use_tool("search_packages", json!({"destination_country": "Iceland"})).unwrap();
        let ids: Vec<&str> = found.as_array().unwrap().iter().filter_map(|p| p["package_id"].as_str()).collect();
        assert_eq!(ids, vec!["PKG_ICE"]);
        let none = kit.use_tool("search_packages", json!({"category": "cruise"})).unwrap();
        assert_eq!(none, json!([]));
        let all = kit.use_tool("list_all_destinations", Value::Null).unwrap();
        assert_eq!(all.as_array().unwrap().len(), 3);
    }

    #[test]
    fn meeting_slot_is_reserved_once() {
        let mut kit = toolkit();
        let args = json!({"agent_id": "agt_01", "date": "2024-05-20", "time_range": "10:00-10:30", "traveler_id": "trv_001"});
        let out = kit.use_tool("schedule_agent_meeting", args.clone()).unwrap();
        assert_eq!(out, json!("Meeting scheduled with agent agt_01 on 2024-05-20 at 10:00-10:30"));
        assert_eq!(kit.use_tool("schedule_agent_meeting", args).unwrap_err().code(), "not_active");
    }
}
