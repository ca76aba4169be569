mod common;

use std::sync::Arc;

use agentbench::domains::bank::{AccountStatus, BankDomain, CardStatus};
use agentbench::store;
use agentbench::task::Task;
use agentbench::{
	Action, BenchError, Domain, EnvironmentError, EnvironmentLimits, Money, RewardBasis, SessionState,
	TerminationReason, ToolType,
};
use serde_json::json;

use common::bundled_task;

fn limits(max_steps: usize, max_errors: usize) -> EnvironmentLimits {
    EnvironmentLimits {
        max_steps,
        max_errors,
    }
}

fn transfer(amount: f64) -> Action {
    Action::tool_call(
        "initiate_internal_transfer",
        json!({"client_id": "client_0001", "from_account_id": "acc_0001",
               "to_account_id": "acc_0002", "amount": amount}),
    )
}

#[test]
fn transfer_session_books_paired_entries_and_earns_full_reward() {
    let domain = BankDomain::sample().unwrap();
    let task = Arc::new(bundled_task("bank", "bank_move_to_savings"));
    let mut env = domain.environment(task, EnvironmentLimits::default()).unwrap();

    let reset = env.reset().unwrap();
    assert!(reset.observation.content.contains("$100"));
    assert!(reset.info.tools.iter().any(|t| t.name == "initiate_internal_transfer"));
    assert_eq!(env.state(), SessionState::AwaitingAction);

    let lookup = env
        .step(Action::tool_call("find_client_id_by_email", json!({"email": "ADA@example.com"})))
        .unwrap();
    assert_eq!(lookup.observation.content, "client_0001");
    assert_eq!(lookup.info.tool_type, Some(ToolType::Read));

    let confirm = env
        .step(Action::respond("I'll move $100 from acc_0001 to acc_0002. Shall I proceed?"))
        .unwrap();
    assert_eq!(confirm.observation.content, "Yes, go ahead.");

    let posted = env.step(transfer(100.0)).unwrap();
    assert!(!posted.is_done());
    assert!(!posted.observation.is_tool_error());
    assert_eq!(posted.info.tool_type, Some(ToolType::Write));

    let db = env.db().unwrap();
    let debit = db.transactions.get("tx_0000003").unwrap();
    let credit = db.transactions.get("tx_0000004").unwrap();
    assert_eq!(debit.amount, Money::from_minor(-10_000));
    assert_eq!(credit.amount, Money::from_minor(10_000));
    assert_eq!(debit.related_transaction_id.as_deref(), Some("tx_0000004"));
    assert_eq!(credit.related_transaction_id.as_deref(), Some("tx_0000003"));
    assert_eq!(debit.timestamp, "2024-05-15T12:00:00Z");

    env.step(Action::respond("Done.")).unwrap();
    let last = env
        .step(Action::respond("Your checking balance is now $1,400.00."))
        .unwrap();
    assert!(last.terminated);
    assert!(!last.truncated);
    assert_eq!(last.info.termination, Some(TerminationReason::UserStop));
    assert!((last.reward - 1.0).abs() < f64::EPSILON);

    let info = last.info.reward_info.unwrap();
    assert_eq!(
        info.reward_basis,
        vec![RewardBasis::Db, RewardBasis::State, RewardBasis::Communicate]
    );
    assert!(info.db_check.unwrap().db_match);
    assert!(info.state_checks.iter().all(|c| c.passed));
    assert_eq!(env.state(), SessionState::Terminated);
    assert!(env.db().is_none());
}

#[test]
fn failing_writes_leave_store_untouched_and_end_the_run_at_the_error_budget() {
    let domain = BankDomain::sample().unwrap();
    let task = Arc::new(bundled_task("bank", "bank_move_to_savings"));
    let mut env = domain.environment(task, limits(20, 2)).unwrap();
    env.reset().unwrap();
    let before = store::fingerprint(env.db().unwrap()).unwrap();

    let first = env.step(transfer(999_999.0)).unwrap();
    assert!(first.observation.is_tool_error());
    assert!(first.observation.content.starts_with("Error: "));
    assert!(!first.is_done());
    assert_eq!(store::fingerprint(env.db().unwrap()).unwrap(), before);

    let second = env
        .step(Action::tool_call("freeze_card", json!({"card_id": "card_0003", "reason": "lost"})))
        .unwrap();
    assert!(second.terminated);
    assert_eq!(second.info.termination, Some(TerminationReason::TooManyErrors));
    let run = second.info.simulation_run.unwrap();
    assert_eq!(run.final_state_hash, before);
    assert!(run.reward().abs() < f64::EPSILON);

    let err = env.step(Action::respond("hello?")).unwrap_err();
    assert!(matches!(err, BenchError::Environment(EnvironmentError::Terminated)));
}

#[test]
fn state_check_rewards_only_the_frozen_outcome() {
    let domain = BankDomain::sample().unwrap();
    let task = Arc::new(bundled_task("bank", "bank_freeze_lost_card"));
    let mut env = domain.environment(task, EnvironmentLimits::default()).unwrap();

    env.reset().unwrap();
    env.step(Action::tool_call(
        "freeze_card",
        json!({"card_id": "card_0001", "reason": "Lost on the train"}),
    ))
    .unwrap();
    assert_eq!(env.db().unwrap().cards.get("card_0001").unwrap().status, CardStatus::Blocked);
    env.step(Action::respond("Your card is frozen.")).unwrap();
    let frozen = env.step(Action::respond("Anything else?")).unwrap();
    assert!(frozen.terminated);
    assert!((frozen.reward - 1.0).abs() < f64::EPSILON);

    // Restart the same task and never freeze.
    env.reset().unwrap();
    assert_eq!(env.db().unwrap().cards.get("card_0001").unwrap().status, CardStatus::Active);
    env.step(Action::respond("Please visit a branch.")).unwrap();
    let idle = env.step(Action::respond("Goodbye.")).unwrap();
    let info = idle.info.reward_info.unwrap();
    assert!(idle.reward.abs() < f64::EPSILON);
    assert!(!info.state_checks[0].passed);
    assert!(!info.action_checks[0].matched);
    assert_eq!(info.reward_breakdown[&RewardBasis::State], 0.0);
}

#[test]
fn step_budget_truncates_the_run() {
    let domain = BankDomain::sample().unwrap();
    let task = Arc::new(bundled_task("bank", "bank_close_empty_account"));
    let mut env = domain.environment(task, limits(2, 10)).unwrap();

    let err = env.step(Action::respond("too early")).unwrap_err();
    assert!(matches!(err, BenchError::Environment(EnvironmentError::NotReset)));

    env.reset().unwrap();
    let lookup = Action::tool_call("get_client_details", json!({"client_id": "client_0002"}));
    assert!(!env.step(lookup.clone()).unwrap().is_done());
    let last = env.step(lookup).unwrap();
    assert!(last.truncated);
    assert!(!last.terminated);
    assert_eq!(last.info.termination, Some(TerminationReason::MaxSteps));
    assert!(!last.info.reward_info.unwrap().db_check.unwrap().db_match);
}

#[test]
fn pinned_simulation_time_stamps_new_entries() {
    let domain = BankDomain::sample().unwrap();
    let mut task: Task = bundled_task("bank", "bank_move_to_savings");
    task.simulation_time = Some("2024-06-01T08:30:00Z".parse().unwrap());
    let mut env = domain.environment(Arc::new(task), EnvironmentLimits::default()).unwrap();
    env.reset().unwrap();
    env.step(transfer(25.0)).unwrap();
    let entry = env.db().unwrap().transactions.get("tx_0000003").unwrap();
    assert_eq!(entry.timestamp, "2024-06-01T08:30:00Z");
}

#[test]
fn inline_snapshot_replaces_the_domain_store() {
    let domain = BankDomain::sample().unwrap();
    let mut snapshot = store::to_snapshot(domain.initial_db()).unwrap();
    snapshot["accounts"]["acc_0001"]["status"] = json!("frozen");
    let mut task: Task = bundled_task("bank", "bank_move_to_savings");
    task.initial_state = Some(snapshot);

    let mut env = domain.environment(Arc::new(task), EnvironmentLimits::default()).unwrap();
    env.reset().unwrap();
    let out = env.step(transfer(10.0)).unwrap();
    assert!(out.observation.is_tool_error());
    assert_eq!(
        domain.initial_db().accounts.get("acc_0001").unwrap().status,
        AccountStatus::Active
    );
}
