//! Built-in demo programs for the CLI.
//!
//! The engine consumes programs produced by a compiler front end; these
//! hand-built ones exist so the binary can exercise a search without one.

use relay_engine::{MachineDef, Program};
use relay_values::{EventTag, UnionTag, UnionVS, ValueSummary, Vs};

pub const DEMO_NAMES: &[(&str, &str)] = &[
    ("empty", "one inert machine; the search finishes immediately"),
    ("ping", "main creates a partner and pings it; the partner halts"),
    (
        "boolfork",
        "a symbolic coin flip routes one of two events to a receiver",
    ),
    (
        "hotstate",
        "a monitor goes hot and never cools down: a liveness bug",
    ),
];

pub fn demo(name: &str) -> Option<Program> {
    match name {
        "empty" => Some(empty()),
        "ping" => Some(ping()),
        "boolfork" => Some(boolfork()),
        "hotstate" => Some(hotstate()),
        _ => None,
    }
}

fn empty() -> Program {
    Program::new(MachineDef::builder("Main").state("Init").build())
}

fn ping() -> Program {
    let pong = MachineDef::builder("Pong")
        .state("Idle")
        .on_halt("Idle", EventTag::new("PING"))
        .build();
    let main = MachineDef::builder("Main").state("Init").entry("Init", {
        let pong = pong.clone();
        move |ctx| {
            let partner = ctx.create(&pong, None)?;
            ctx.send(&partner, EventTag::new("PING"), None)?;
            Ok(())
        }
    });
    Program::new(main.build())
}

fn boolfork() -> Program {
    let recv = MachineDef::builder("Recv")
        .state("Wait")
        .field(Vs::int(0))
        .on_handle("Wait", EventTag::new("X"), |ctx| {
            let payload = match ctx.payload() {
                Some(p) => p.payload(&UnionTag::new("count"))?,
                None => Vs::int(0),
            };
            ctx.set_field(0, &payload)
        })
        .on_handle("Wait", EventTag::new("Y"), |ctx| {
            ctx.set_field(0, &Vs::int(-1))
        })
        .build();
    let main = MachineDef::builder("Main").state("Init").entry("Init", {
        let recv = recv.clone();
        move |ctx| {
            let r = ctx.create(&recv, None)?;
            let flag = ctx.next_bool()?;
            let payload = UnionVS::new(UnionTag::new("count"), Vs::int(1));
            ctx.send(
                &r.restrict(flag.true_guard()),
                EventTag::new("X"),
                Some(payload),
            )?;
            ctx.send(&r.restrict(flag.false_guard()), EventTag::new("Y"), None)?;
            Ok(())
        }
    });
    Program::new(main.build())
}

fn hotstate() -> Program {
    let watcher = MachineDef::builder("Watcher")
        .state("Cold")
        .hot_state("Heating")
        .on_goto("Cold", EventTag::new("UP"), "Heating")
        .on_goto("Heating", EventTag::new("DOWN"), "Cold")
        .on_ignore("Cold", EventTag::new("DOWN"))
        .on_ignore("Heating", EventTag::new("UP"))
        .build();
    let main = MachineDef::builder("Main")
        .state("Init")
        .entry("Init", |ctx| ctx.announce(EventTag::new("UP"), None))
        .build();
    Program::new(main).with_monitor(watcher, &[EventTag::new("UP"), EventTag::new("DOWN")])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_listed_demos_resolve() {
        for (name, _) in DEMO_NAMES {
            assert!(demo(name).is_some(), "missing demo {}", name);
        }
        assert!(demo("nope").is_none());
    }
}
