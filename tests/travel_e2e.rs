mod common;

use std::sync::Arc;

use agentbench::domains::travel::{BookingStatus, DepartureStatus, TravelDb, TravelDomain};
use agentbench::{Action, Domain, EnvironmentLimits, Money, TerminationReason, Toolkit};
use serde_json::{json, Value};

use common::bundled_task;

fn toolkit(domain: &TravelDomain) -> Toolkit<TravelDb> {
    Toolkit::new(domain.registry(), domain.initial_db().clone())
}

fn autumn_city_break(travelers: usize) -> Value {
    let names = ["Mia", "Leo", "Ana", "Eva"];
    let travelers: Vec<Value> = names[..travelers]
        .iter()
        .map(|n| json!({"first_name": n, "last_name": "Chen", "dob": "1990-01-01"}))
        .collect();
    let total = 200.0 * travelers.len() as f64;
    json!({
        "traveler_id": "trv_001",
        "package_id": "PKG_CITY",
        "departure_date": "2024-09-10",
        "travelers": travelers,
        "rooming": {"room_type": "double", "occupancy": travelers.len()},
        "payment_methods": [{"payment_id": "pm_visa", "amount": total}]
    })
}

fn slots(kit: &Toolkit<TravelDb>, package: &str, date: &str) -> (u32, DepartureStatus) {
    let departure = &kit.db().packages.get(package).unwrap().departures[date];
    (departure.available_slots, departure.status)
}

#[test]
fn cancellation_session_refunds_once_and_scores() {
    let domain = TravelDomain::sample().unwrap();
    let task = Arc::new(bundled_task("travel", "travel_cancel_city_break"));
    let mut env = domain.environment(task, EnvironmentLimits::default()).unwrap();
    env.reset().unwrap();

    env.step(Action::respond("Cancel BK0001 (250 paid by card)? Please confirm."))
        .unwrap();
    let cancel = Action::tool_call("cancel_booking", json!({"booking_id": "BK0001"}));
    let first = env.step(cancel.clone()).unwrap();
    assert!(!first.observation.is_tool_error());

    let booking = env.db().unwrap().bookings.get("BK0001").unwrap();
    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert_eq!(booking.payment_history.len(), 2);
    assert_eq!(booking.payment_history[1].amount, Money::from_minor(-25_000));
    assert_eq!(booking.net_paid(), Money::ZERO);

    // A repeated cancellation is a no-op that reports the same booking.
    let second = env.step(cancel).unwrap();
    assert_eq!(second.observation.content, first.observation.content);
    assert_eq!(env.db().unwrap().bookings.get("BK0001").unwrap().payment_history.len(), 2);

    env.step(Action::respond("Your booking is cancelled.")).unwrap();
    let last = env
        .step(Action::respond("Yes, the 250 USD will be refunded to your card."))
        .unwrap();
    assert_eq!(last.info.termination, Some(TerminationReason::UserStop));
    let info = last.info.reward_info.unwrap();
    assert!(info.db_check.as_ref().unwrap().db_match, "{info:?}");
    assert!(info.is_success());
}

#[test]
fn booking_then_cancelling_restores_the_departure() {
    let domain = TravelDomain::sample().unwrap();
    let mut kit = toolkit(&domain);
    assert_eq!(slots(&kit, "PKG_CITY", "2024-09-10"), (10, DepartureStatus::Available));

    let booked = kit.use_tool("book_package", autumn_city_break(2)).unwrap();
    let id = booked["booking_id"].as_str().unwrap().to_string();
    assert_eq!(booked["total_price"], 400.0);
    assert_eq!(slots(&kit, "PKG_CITY", "2024-09-10"), (8, DepartureStatus::Available));

    let cancelled = kit.use_tool("cancel_booking", json!({"booking_id": id})).unwrap();
    assert_eq!(
        cancelled["payment_history"],
        json!([
            {"payment_id": "pm_visa", "amount": 400.0},
            {"payment_id": "pm_visa", "amount": -400.0}
        ])
    );
    assert_eq!(cancelled["total_price"], 400.0);
    assert_eq!(slots(&kit, "PKG_CITY", "2024-09-10"), (10, DepartureStatus::Available));
}

#[test]
fn booking_ids_run_out_without_touching_the_store() {
    let domain = TravelDomain::sample().unwrap();
    let mut kit = toolkit(&domain);
    let ids: Vec<String> = (0..3)
        .map(|_| {
            let out = kit.use_tool("book_package", autumn_city_break(1)).unwrap();
            out["booking_id"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(ids, ["TAU001", "TAU002", "TAU003"]);
    assert_eq!(slots(&kit, "PKG_CITY", "2024-09-10").0, 7);

    let before = kit.fingerprint().unwrap();
    let err = kit.use_tool("book_package", autumn_city_break(1)).unwrap_err();
    assert_eq!(err.code(), "id_space_exhausted");
    assert_eq!(kit.fingerprint().unwrap(), before);
}

#[test]
fn selling_the_last_seats_marks_the_departure_sold_out() {
    let domain = TravelDomain::sample().unwrap();
    let mut kit = toolkit(&domain);
    let mut request = autumn_city_break(4);
    request["departure_date"] = json!("2024-06-10");
    // 4 x 250 takes every remaining seat
    request["payment_methods"] = json!([{"payment_id": "pm_visa", "amount": 1000.0}]);
    let out = kit.use_tool("book_package", request.clone()).unwrap();
    assert_eq!(slots(&kit, "PKG_CITY", "2024-06-10"), (0, DepartureStatus::SoldOut));

    let err = kit.use_tool("book_package", request).unwrap_err();
    assert_eq!(err.code(), "not_active");

    kit.use_tool("cancel_booking", json!({"booking_id": out["booking_id"]}))
        .unwrap();
    assert_eq!(slots(&kit, "PKG_CITY", "2024-06-10"), (4, DepartureStatus::Available));
}

#[test]
fn meeting_task_scores_on_store_replay() {
    let domain = TravelDomain::sample().unwrap();
    let task = Arc::new(bundled_task("travel", "travel_meet_agent"));
    let mut env = domain.environment(task, EnvironmentLimits::default()).unwrap();
    env.reset().unwrap();

    let wrong_slot = Action::tool_call(
        "schedule_agent_meeting",
        json!({"agent_id": "agt_01", "date": "2024-05-20", "time_range": "14:00-14:30", "traveler_id": "trv_001"}),
    );
    env.step(wrong_slot).unwrap();
    env.step(Action::respond("Booked for 14:00.")).unwrap();
    let last = env.step(Action::respond("See you then.")).unwrap();
    assert!(last.terminated);
    let check = last.info.reward_info.unwrap().db_check.unwrap();
    assert!(!check.db_match);
    assert!(check.replay_errors.is_empty());
    assert!(last.reward.abs() < f64::EPSILON);
}
