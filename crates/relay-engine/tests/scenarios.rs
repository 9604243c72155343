//! End-to-end scenarios: small programs driven through the full search.

use relay_engine::{
    EngineError, MachineDef, Program, SchedulerConfig, Scheduler, SearchOutcome,
};
use relay_solver::{Guard, SolverContext};
use relay_values::{EventTag, ListVS, PrimitiveVS, ValueSummary, Vs};

fn run(config: SchedulerConfig, program: Program) -> (Scheduler, SearchOutcome) {
    let mut s = Scheduler::new(config, program);
    let outcome = s.do_search().expect("engine fault");
    (s, outcome)
}

/// A program with a single inert machine.
fn empty_program() -> Program {
    Program::new(MachineDef::builder("Main").state("Init").build())
}

/// Main creates Pong and pings it; Pong halts on receipt.
fn ping_program() -> Program {
    let pong = MachineDef::builder("Pong")
        .state("Idle")
        .on_halt("Idle", EventTag::new("PING"))
        .build();
    let main = MachineDef::builder("Main").state("Init").entry("Init", {
        let pong = pong.clone();
        move |ctx| {
            let b = ctx.create(&pong, None)?;
            ctx.send(&b, EventTag::new("PING"), None)?;
            Ok(())
        }
    });
    Program::new(main.build())
}

/// Main flips a symbolic coin and sends X or Y; Recv records which.
fn boolfork_program() -> Program {
    let recv = MachineDef::builder("Recv")
        .state("Wait")
        .field(Vs::int(0))
        .on_handle("Wait", EventTag::new("X"), |ctx| {
            ctx.set_field(0, &Vs::int(1))
        })
        .on_handle("Wait", EventTag::new("Y"), |ctx| {
            ctx.set_field(0, &Vs::int(2))
        })
        .build();
    let main = MachineDef::builder("Main").state("Init").entry("Init", {
        let recv = recv.clone();
        move |ctx| {
            let b = ctx.create(&recv, None)?;
            let flag = ctx.next_bool()?;
            ctx.send(&b.restrict(flag.true_guard()), EventTag::new("X"), None)?;
            ctx.send(&b.restrict(flag.false_guard()), EventTag::new("Y"), None)?;
            Ok(())
        }
    });
    Program::new(main.build())
}

/// A monitor that goes hot on X and cools down on Y; the program only
/// ever announces X.
fn hotstate_program() -> Program {
    let watcher = MachineDef::builder("Watcher")
        .state("Cold")
        .hot_state("Heating")
        .on_goto("Cold", EventTag::new("X"), "Heating")
        .on_goto("Heating", EventTag::new("Y"), "Cold")
        .on_ignore("Cold", EventTag::new("Y"))
        .on_ignore("Heating", EventTag::new("X"))
        .build();
    let main = MachineDef::builder("Main")
        .state("Init")
        .entry("Init", |ctx| ctx.announce(EventTag::new("X"), None))
        .build();
    Program::new(main).with_monitor(watcher, &[EventTag::new("X"), EventTag::new("Y")])
}

/// Two independent workers, each with exactly one pending send.
fn two_senders_program() -> Program {
    let worker = MachineDef::builder("Worker")
        .state("Run")
        .entry("Run", |ctx| {
            let me = PrimitiveVS::new(ctx.self_ref());
            ctx.send(&me, EventTag::new("TICK"), None)
        })
        .on_ignore("Run", EventTag::new("TICK"))
        .build();
    let main = MachineDef::builder("Main").state("Init").entry("Init", {
        let worker = worker.clone();
        move |ctx| {
            ctx.create(&worker, None)?;
            ctx.create(&worker, None)?;
            Ok(())
        }
    });
    Program::new(main.build())
}

/// Main sends BAD to a machine whose handler asserts false.
fn buggy_program() -> Program {
    let victim = MachineDef::builder("Victim")
        .state("Idle")
        .on_handle("Idle", EventTag::new("BAD"), |ctx| {
            ctx.assert_prop(&PrimitiveVS::new(false), "reachable bad event")
        })
        .build();
    let main = MachineDef::builder("Main").state("Init").entry("Init", {
        let victim = victim.clone();
        move |ctx| {
            let v = ctx.create(&victim, None)?;
            ctx.send(&v, EventTag::new("BAD"), None)?;
            Ok(())
        }
    });
    Program::new(main.build())
}

// -- S1: empty program --

#[test]
fn s1_empty_program_finishes_immediately() {
    SolverContext::reset();
    let config = SchedulerConfig {
        max_step_bound: 1,
        ..SchedulerConfig::default()
    };
    let (s, outcome) = run(config, empty_program());
    assert!(outcome.is_ok(), "outcome: {:?}", outcome);
    assert!(s.is_done());
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(s.stat_writer().get("result"), Some("ok"));
}

// -- S2: single ping --

#[test]
fn s2_single_ping_runs_three_steps() {
    SolverContext::reset();
    let config = SchedulerConfig {
        max_step_bound: 10,
        ..SchedulerConfig::default()
    };
    let (s, outcome) = run(config, ping_program());
    assert!(outcome.is_ok(), "outcome: {:?}", outcome);
    assert_eq!(s.depth(), 3);
    assert_eq!(s.stat_writer().get("#-events"), Some("2"));
    // Pong halted on receipt.
    assert!(s.machines()[1].halted_cond().is_true());
}

// -- S3: symbolic boolean fork --

#[test]
fn s3_boolean_fork_covers_both_branches() {
    SolverContext::reset();
    let config = SchedulerConfig {
        use_state_caching: true,
        ..SchedulerConfig::default()
    };
    let (s, outcome) = run(config, boolfork_program());
    assert!(outcome.is_ok(), "outcome: {:?}", outcome);
    assert!(s.total_distinct_states() >= 2);
    // Recv's field holds 1 and 2 under complementary guards.
    let field = s.machines()[1].field(0).unwrap().as_int().unwrap().clone();
    let one = field.guard_for(&1);
    let two = field.guard_for(&2);
    assert!(one.is_sat());
    assert!(two.is_sat());
    assert!(one.and(two).is_false());
    assert!(one.or(two).is_true());
}

// -- S4: liveness hot state --

#[test]
fn s4_hot_state_is_a_liveness_bug() {
    SolverContext::reset();
    let (_, outcome) = run(SchedulerConfig::default(), hotstate_program());
    match &outcome {
        SearchOutcome::Bug { message } => assert!(
            message.contains("hot state"),
            "unexpected message: {}",
            message
        ),
        other => panic!("expected a bug, got {:?}", other),
    }
    assert_eq!(outcome.exit_code(), 2);
}

// -- S5: sleep-set pruning --

#[test]
fn s5_sleep_sets_prune_one_ordering() {
    SolverContext::reset();
    let base = SchedulerConfig {
        use_state_caching: true,
        ..SchedulerConfig::default()
    };
    let (s_off, o_off) = run(base.clone(), two_senders_program());
    assert!(o_off.is_ok(), "outcome: {:?}", o_off);

    let with_sleep = SchedulerConfig {
        use_sleep_sets: true,
        ..base
    };
    let (s_on, o_on) = run(with_sleep, two_senders_program());
    assert!(o_on.is_ok(), "outcome: {:?}", o_on);

    // Same distinct state space either way.
    assert_eq!(s_off.total_distinct_states(), s_on.total_distinct_states());
    // But the pruned run delivers fewer concrete messages.
    let events_off: usize = s_off.stat_writer().get("#-events").unwrap().parse().unwrap();
    let events_on: usize = s_on.stat_writer().get("#-events").unwrap().parse().unwrap();
    assert!(
        events_on < events_off,
        "expected pruning: {} vs {}",
        events_on,
        events_off
    );
}

// -- S6: backtrack and re-run --

#[test]
fn s6_backtrack_reaches_the_same_distinct_states() {
    SolverContext::reset();
    // Plain per-step enumeration (no caching filter), so the re-run
    // repeats the original transitions and finds nothing new.
    let config = SchedulerConfig {
        use_backtrack: true,
        collect_stats: 4,
        ..SchedulerConfig::default()
    };
    let (fresh, fresh_outcome) = run(config.clone(), ping_program());
    assert!(fresh_outcome.is_ok());
    let expected = fresh.total_distinct_states();

    let mut s = Scheduler::new(config, ping_program());
    s.do_search().unwrap();
    assert!(s.schedule().has_frame(2));
    s.restore_state(2).unwrap();
    assert_eq!(s.depth(), 2);
    s.perform_search().unwrap();
    assert_eq!(s.total_distinct_states(), expected);
}

// -- replay determinism --

#[test]
fn replay_reaches_structurally_equal_states() {
    SolverContext::reset();
    let config = SchedulerConfig {
        use_state_caching: true,
        ..SchedulerConfig::default()
    };
    let (original, o1) = run(config.clone(), boolfork_program());
    assert!(o1.is_ok());

    let mut replayed = Scheduler::new_replay(
        config,
        boolfork_program(),
        original.replay_source(),
    );
    let o2 = replayed.do_search().unwrap();
    assert!(o2.is_ok());
    assert_eq!(original.machines().len(), replayed.machines().len());
    for (a, b) in original.machines().iter().zip(replayed.machines().iter()) {
        for (va, vb) in a.local_state().iter().zip(b.local_state().iter()) {
            let eq = va.symbolic_equals(vb, Guard::const_true());
            assert_eq!(eq.true_guard(), va.universe(), "machine {} diverged", a.mref());
        }
    }
    assert_eq!(
        original.total_distinct_states(),
        replayed.total_distinct_states()
    );
}

// -- reduction soundness --

#[test]
fn reductions_do_not_hide_bugs() {
    let configs = [
        SchedulerConfig::default(),
        SchedulerConfig {
            use_receiver_queue_semantics: true,
            ..SchedulerConfig::default()
        },
        SchedulerConfig {
            use_filters: true,
            ..SchedulerConfig::default()
        },
        SchedulerConfig {
            use_sleep_sets: true,
            ..SchedulerConfig::default()
        },
        SchedulerConfig {
            use_receiver_queue_semantics: true,
            use_sleep_sets: true,
            use_filters: true,
            ..SchedulerConfig::default()
        },
    ];
    for config in configs {
        SolverContext::reset();
        let (_, outcome) = run(config, buggy_program());
        assert!(
            matches!(outcome, SearchOutcome::Bug { .. }),
            "bug hidden by reduction: {:?}",
            outcome
        );
    }
}

// -- bounds and resources --

#[test]
fn max_step_bound_stops_the_search() {
    SolverContext::reset();
    let config = SchedulerConfig {
        max_step_bound: 2,
        ..SchedulerConfig::default()
    };
    let (s, outcome) = run(config, ping_program());
    assert!(outcome.is_ok());
    assert_eq!(s.depth(), 2);
}

#[test]
fn tiny_time_limit_reports_timeout() {
    SolverContext::reset();
    let config = SchedulerConfig {
        time_limit_secs: 1e-9,
        ..SchedulerConfig::default()
    };
    let (s, outcome) = run(config, ping_program());
    assert!(matches!(outcome, SearchOutcome::Timeout { .. }));
    assert_eq!(outcome.exit_code(), 2);
    assert_eq!(s.stat_writer().get("result"), Some("timeout"));
}

// -- choice primitives --

#[test]
fn zero_bound_integer_choice_yields_zero() {
    SolverContext::reset();
    let mut s = Scheduler::new(SchedulerConfig::default(), empty_program());
    let chosen = s
        .next_integer(&PrimitiveVS::new(0), Guard::const_true())
        .unwrap();
    // A zero bound behaves as bound one: the only choice is 0.
    assert_eq!(chosen, PrimitiveVS::new(0));
}

#[test]
fn integer_choice_covers_the_range() {
    SolverContext::reset();
    let mut s = Scheduler::new(SchedulerConfig::default(), empty_program());
    let chosen = s
        .next_integer(&PrimitiveVS::new(3), Guard::const_true())
        .unwrap();
    assert!(chosen.universe().is_true());
    let mut covered = Guard::const_false();
    for i in 0..3 {
        covered = covered.or(chosen.guard_for(&i));
    }
    assert!(covered.is_true());
    assert!(chosen.guard_for(&3).is_false());
}

#[test]
fn boolean_choice_splits_the_universe() {
    SolverContext::reset();
    let mut s = Scheduler::new(SchedulerConfig::default(), empty_program());
    let chosen = s.next_boolean(Guard::const_true()).unwrap();
    let t = chosen.true_guard();
    let f = chosen.false_guard();
    assert!(t.is_sat());
    assert!(f.is_sat());
    assert!(t.and(f).is_false());
    assert!(t.or(f).is_true());
    assert_eq!(s.choice_depth(), 1);
    assert_eq!(s.schedule().size(), 1);
}

#[test]
fn element_choice_covers_every_entry() {
    SolverContext::reset();
    let mut s = Scheduler::new(SchedulerConfig::default(), empty_program());
    let list: ListVS<Vs> = ListVS::new(Guard::const_true());
    let list = list.add(&Vs::int(10)).add(&Vs::int(20));
    let got = s.next_element(&list, Guard::const_true()).unwrap();
    let ints = got.as_int().unwrap();
    assert!(ints.guard_for(&10).is_sat());
    assert!(ints.guard_for(&20).is_sat());
    assert!(ints.universe().is_true());
}

// -- engine invariants --

#[test]
fn announce_without_event_is_an_engine_fault() {
    SolverContext::reset();
    let mut s = Scheduler::new(SchedulerConfig::default(), empty_program());
    let err = s.announce(&PrimitiveVS::empty(), None).unwrap_err();
    assert!(matches!(err, EngineError::Internal(_)));
}

#[test]
fn restore_without_frame_is_an_engine_fault() {
    SolverContext::reset();
    let mut s = Scheduler::new(SchedulerConfig::default(), empty_program());
    assert!(matches!(
        s.restore_state(3),
        Err(EngineError::Internal(_))
    ));
}
