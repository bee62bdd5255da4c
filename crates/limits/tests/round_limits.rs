//! Default limits policy driving a real round engine.

use bitcoin::Network;
use coinjoin_core::{Action, RoundError};
use coinjoin_limits::{DefaultRoundLimits, LimitsConfig};
use coinjoin_round::{RoundConfig, RoundEngine};
use coinjoin_test_helpers::{funding_tx, outpoint_for, receive_address, TestKey};
use coinjoin_types::{Bordereau, PaymentCode, RegisteredInput, RoundResult, RoundStatus, Username};
use std::time::Duration;
use tracing_test::traced_test;

const DENOMINATION: u64 = 1_000_000;
const MINER_FEE: u64 = 5_000;
const START: Duration = Duration::from_secs(10_000);

fn secs(n: u64) -> Duration {
    START + Duration::from_secs(n)
}

fn input(seed: u8, is_liquidity: bool) -> RegisteredInput {
    let key = TestKey::new(seed);
    let value = RegisteredInput::expected_value(is_liquidity, DENOMINATION, MINER_FEE);
    let tx = funding_tx(&[(key.p2wpkh_script(), value)], seed);
    RegisteredInput {
        username: Username::new(format!("user{seed}")),
        outpoint: outpoint_for(&tx, 0, &key, Network::Regtest),
        pubkey: key.public_key(),
        payment_code: PaymentCode::new(format!("pc{seed}")),
        is_liquidity,
    }
}

fn engine(target: usize, limits: LimitsConfig) -> RoundEngine {
    let config = RoundConfig::new(DENOMINATION, MINER_FEE)
        .with_target_must_mix(target)
        .with_min_must_mix(1)
        .with_must_mix_adjust_timeout(Duration::from_secs(600))
        .with_network(Network::Regtest)
        .with_deterministic_pairing(true);
    RoundEngine::new(config, Box::new(DefaultRoundLimits::new(limits)), 7, START)
}

fn register(engine: &mut RoundEngine, input: &RegisteredInput) -> Result<Vec<Action>, RoundError> {
    let round_id = engine.current_round_id();
    engine.register_input(&round_id, input.clone(), vec![])
}

fn bordereau(input: &RegisteredInput) -> Bordereau {
    Bordereau::new(format!("b-{}", input.username))
}

/// Register two ring outputs and land in SIGNING.
fn to_signing(engine: &mut RoundEngine, a: &RegisteredInput, b: &RegisteredInput) {
    let round_id = engine.current_round_id();
    engine
        .register_output(&round_id, receive_address(101), receive_address(100), bordereau(a))
        .unwrap();
    engine
        .register_output(&round_id, receive_address(100), receive_address(101), bordereau(b))
        .unwrap();
    assert_eq!(engine.round().status(), RoundStatus::Signing);
}

fn saved_result(actions: &[Action]) -> Option<RoundResult> {
    actions.iter().find_map(|a| match a {
        Action::SaveRound(outcome) => Some(outcome.result),
        _ => None,
    })
}

#[traced_test]
#[test]
fn test_liquidity_expected_after_quiet_interval() {
    let mut engine = engine(2, LimitsConfig::default().with_liquidity_interval(Duration::from_secs(30)));
    let (liquidity, a, b) = (input(1, true), input(2, false), input(3, false));

    register(&mut engine, &liquidity).unwrap();
    engine.set_time(secs(5));
    register(&mut engine, &a).unwrap();

    // 29s since the last admission
    engine.set_time(secs(34));
    assert!(engine.on_tick().is_empty());
    assert_eq!(engine.expected_liquidity(), 0);
    assert_eq!(engine.pool().len(), 1);

    engine.set_time(secs(35));
    let actions = engine.on_tick();
    assert_eq!(engine.expected_liquidity(), 1);
    assert_eq!(actions.len(), 1, "liquidity acknowledged");
    assert!(engine.pool().is_empty());
    assert_eq!(engine.round().nb_liquidities(), 1);

    register(&mut engine, &b).unwrap();
    assert_eq!(engine.round().status(), RoundStatus::RegisterOutput);
    assert_eq!(engine.round().nb_inputs(), 3);
}

#[traced_test]
#[test]
fn test_liquidity_growth_needs_queued_liquidity() {
    let mut engine = engine(2, LimitsConfig::default().with_liquidity_interval(Duration::from_secs(30)));
    register(&mut engine, &input(2, false)).unwrap();

    engine.set_time(secs(300));
    engine.on_tick();
    assert_eq!(engine.expected_liquidity(), 0);
}

#[traced_test]
#[test]
fn test_liquidity_growth_capped_by_ratio() {
    let mut engine = engine(2, LimitsConfig::default().with_liquidity_interval(Duration::from_secs(30)));
    for seed in 1..=4 {
        register(&mut engine, &input(seed, true)).unwrap();
    }

    for step in 1..=5 {
        engine.set_time(secs(30 * step));
        engine.on_tick();
    }
    // target 2 with ratio 1.0
    assert_eq!(engine.expected_liquidity(), 2);
    assert_eq!(engine.round().nb_liquidities(), 2);
    assert_eq!(engine.pool().len(), 2);
}

#[traced_test]
#[test]
fn test_must_mix_target_lowered_without_admission() {
    let mut engine = engine(3, LimitsConfig::default());
    let (a, b) = (input(2, false), input(3, false));
    register(&mut engine, &a).unwrap();
    register(&mut engine, &b).unwrap();
    assert_eq!(engine.round().target_must_mix(), 3);

    engine.set_time(secs(599));
    engine.on_tick();
    assert_eq!(engine.round().target_must_mix(), 3);

    engine.set_time(secs(600));
    engine.on_tick();
    assert_eq!(engine.round().target_must_mix(), 2);
    assert_eq!(engine.round().status(), RoundStatus::RegisterOutput);
}

#[traced_test]
#[test]
fn test_adjusted_target_resets_with_next_round() {
    let mut engine = engine(3, LimitsConfig::default());
    register(&mut engine, &input(2, false)).unwrap();
    register(&mut engine, &input(3, false)).unwrap();

    engine.set_time(secs(600));
    engine.on_tick();
    assert_eq!(engine.round().status(), RoundStatus::RegisterOutput);

    // the next round starts from the configured target
    engine.set_time(secs(700));
    let round_id = engine.current_round_id();
    engine.go_fail(&round_id, RoundResult::Fail).unwrap();
    assert_eq!(engine.round().target_must_mix(), 3);
}

#[traced_test]
#[test]
fn test_register_output_timeout_goes_to_reveal() {
    let mut engine = engine(2, LimitsConfig::default().with_phase_timeout(Duration::from_secs(60)));
    register(&mut engine, &input(2, false)).unwrap();
    engine.set_time(secs(10));
    register(&mut engine, &input(3, false)).unwrap();
    assert_eq!(engine.round().status(), RoundStatus::RegisterOutput);

    engine.set_time(secs(69));
    assert!(engine.on_tick().is_empty());

    engine.set_time(secs(70));
    engine.on_tick();
    assert_eq!(engine.round().status(), RoundStatus::RevealOutputOrBlame);
}

#[traced_test]
#[test]
fn test_unrevealed_participant_is_blamed_and_banned() {
    let limits = LimitsConfig::default()
        .with_phase_timeout(Duration::from_secs(60))
        .with_reveal_output_timeout(Duration::from_secs(60))
        .with_ban_duration(Duration::from_secs(3_600));
    let mut engine = engine(2, limits);
    let (a, b) = (input(2, false), input(3, false));
    register(&mut engine, &a).unwrap();
    register(&mut engine, &b).unwrap();
    to_signing(&mut engine, &a, &b);

    // nobody signs
    engine.set_time(secs(60));
    engine.on_tick();
    assert_eq!(engine.round().status(), RoundStatus::RevealOutputOrBlame);

    let round_id = engine.current_round_id();
    assert!(engine
        .reveal_output(&round_id, a.username.clone(), bordereau(&a))
        .unwrap()
        .is_empty());

    engine.set_time(secs(120));
    let actions = engine.on_tick();
    assert_eq!(saved_result(&actions), Some(RoundResult::FailRevealOutput));
    assert_ne!(engine.current_round_id(), round_id);

    // b did not reveal
    let err = register(&mut engine, &b).unwrap_err();
    assert!(matches!(err, RoundError::BadInput(_)));
    register(&mut engine, &a).unwrap();

    engine.set_time(secs(120 + 3_600));
    register(&mut engine, &b).unwrap();
}

#[traced_test]
#[test]
fn test_complete_reveal_fails_without_bans() {
    let mut engine = engine(2, LimitsConfig::default());
    let (a, b) = (input(2, false), input(3, false));
    register(&mut engine, &a).unwrap();
    register(&mut engine, &b).unwrap();
    to_signing(&mut engine, &a, &b);

    let round_id = engine.current_round_id();
    engine.go_reveal_output_or_blame(&round_id).unwrap();
    engine
        .reveal_output(&round_id, a.username.clone(), bordereau(&a))
        .unwrap();
    let actions = engine
        .reveal_output(&round_id, b.username.clone(), bordereau(&b))
        .unwrap();

    assert_eq!(saved_result(&actions), Some(RoundResult::FailRevealOutput));
    register(&mut engine, &a).unwrap();
    register(&mut engine, &b).unwrap();
}
