//! The symbolic scheduler: step loop, nondeterministic choices, reduction
//! filters, state caching, backtracking, and liveness checking.
//!
//! One `step` stands for a set of concrete scheduling decisions: the
//! enabled senders are picked symbolically, their head messages are
//! dequeued under the pick's guards and merged into one symbolic effect,
//! and the effect is dispatched to monitors and target machines. The
//! order of sub-steps inside a step is fixed: capture, candidates, pick,
//! dequeue, monitors, targets, stats.

use crate::buffer::BufferSemantics;
use crate::config::SchedulerConfig;
use crate::error::{EngineError, EngineResult, SearchOutcome};
use crate::machine::{HandlerFn, Machine, MachineDef, Reaction};
use crate::orders::{InterleaveOrder, MessageOrder, ReceiverQueueOrder};
use crate::program::Program;
use crate::resources::{MemoryMonitor, TimeMonitor};
use crate::schedule::{ChoiceValue, Frame, Schedule};
use crate::stats::{CoverageStats, DepthStats, SearchStats, StatWriter};
use relay_solver::{Guard, SolverContext};
use relay_values::encode;
use relay_values::{
    concretize, count_assignments, fingerprint, Concrete, EventTag, GuardedValue, Key, ListVS,
    MachineRef, MapVS, MessageVS, PrimValue, PrimitiveVS, SetVS, UnionVS, ValueSummary,
    VectorClockVS, Vs,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Recorded choices and creations from a prior run, for replay.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    choices: Vec<ChoiceValue>,
    created: Vec<(Arc<str>, MachineRef)>,
}

/// Work items of the event-to-completion loop.
enum Task {
    Deliver {
        guard: Guard,
        event: EventTag,
        payload: Option<UnionVS>,
    },
    Enter {
        guard: Guard,
        state: u32,
        payload: Option<UnionVS>,
    },
}

pub struct Scheduler {
    config: SchedulerConfig,
    program: Program,
    /// All machine instances, in insertion order. Iteration order over
    /// this arena is the engine's determinism anchor.
    pub(crate) machines: Vec<Machine>,
    /// Per-class instance counters, bumped under the allocation guard.
    machine_counters: BTreeMap<Arc<str>, PrimitiveVS<i64>>,
    /// Arena indices of the monitor instances.
    monitors: Vec<usize>,
    schedule: Schedule,
    interleave_order: InterleaveOrder,
    replay: Option<ReplaySource>,

    depth: usize,
    choice_depth: usize,
    done: bool,
    execution_finished: bool,
    create_step: bool,
    sync_step: bool,

    /// Source-state snapshots for the current step, captured lazily.
    src_state: Option<Vec<(usize, Vec<u8>)>>,
    /// Concrete-state fingerprint -> visit count.
    distinct_states: HashMap<u64, u32>,
    /// Path condition reaching an unseen concrete state this step.
    distinct_state_guard: Option<Guard>,
    total_state_count: usize,

    search_stats: SearchStats,
    coverage: CoverageStats,
    stat_writer: StatWriter,
    time: TimeMonitor,
    mem: MemoryMonitor,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, program: Program) -> Self {
        let time = TimeMonitor::new(config.time_limit_secs);
        let mem = MemoryMonitor::new(config.mem_limit_mb);
        let schedule = Schedule::new(config.use_sleep_sets);
        Self {
            config,
            program,
            machines: Vec::new(),
            machine_counters: BTreeMap::new(),
            monitors: Vec::new(),
            schedule,
            interleave_order: InterleaveOrder::new(),
            replay: None,
            depth: 0,
            choice_depth: 0,
            done: false,
            execution_finished: false,
            create_step: false,
            sync_step: false,
            src_state: None,
            distinct_states: HashMap::new(),
            distinct_state_guard: None,
            total_state_count: 0,
            search_stats: SearchStats::new(),
            coverage: CoverageStats::new(),
            stat_writer: StatWriter::new(),
            time,
            mem,
        }
    }

    /// A scheduler that replays the given record: at each choice depth the
    /// choice is constrained to the recorded summary, and allocations are
    /// checked against the recorded handles.
    pub fn new_replay(config: SchedulerConfig, program: Program, source: ReplaySource) -> Self {
        let mut s = Self::new(config, program);
        s.replay = Some(source);
        s
    }

    /// Extract a replay record from this run's schedule.
    pub fn replay_source(&self) -> ReplaySource {
        ReplaySource {
            choices: self.schedule.choices().to_vec(),
            created: self
                .schedule
                .created_machines()
                .iter()
                .map(|(c, m, _)| (c.clone(), m.clone()))
                .collect(),
        }
    }

    /// Non-trivial interleave orders are supplied programmatically; the
    /// default is the identity partial order.
    pub fn set_interleave_order(&mut self, order: InterleaveOrder) {
        self.interleave_order = order;
    }

    // -- accessors --

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn choice_depth(&self) -> usize {
        self.choice_depth
    }

    pub fn is_done(&self) -> bool {
        self.done || (self.config.max_step_bound > 0 && self.depth == self.config.max_step_bound)
    }

    pub fn is_finished_execution(&self) -> bool {
        self.execution_finished
            || (self.config.max_step_bound > 0 && self.depth == self.config.max_step_bound)
    }

    pub fn total_states(&self) -> usize {
        self.total_state_count
    }

    pub fn total_distinct_states(&self) -> usize {
        self.distinct_states.len()
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn search_stats(&self) -> &SearchStats {
        &self.search_stats
    }

    pub fn coverage(&self) -> &CoverageStats {
        &self.coverage
    }

    pub fn stat_writer(&self) -> &StatWriter {
        &self.stat_writer
    }

    // -- search entry points --

    /// Run the whole search: initialize, step until done, check liveness,
    /// and flush statistics on every exit path. Program-level failures
    /// become outcomes; engine invariant violations stay errors.
    pub fn do_search(&mut self) -> EngineResult<SearchOutcome> {
        let result = self
            .initialize_search()
            .and_then(|_| self.perform_search());
        let outcome = match result {
            Ok(()) => SearchOutcome::Ok {
                depth: self.depth,
                distinct_states: self.total_distinct_states(),
            },
            Err(EngineError::Timeout { seconds }) => SearchOutcome::Timeout { seconds },
            Err(EngineError::Memout { megabytes }) => SearchOutcome::Memout { megabytes },
            Err(e @ EngineError::Internal(_)) => {
                self.print_stats("error");
                return Err(e);
            }
            Err(bug) => SearchOutcome::Bug {
                message: bug.to_string(),
            },
        };
        self.print_stats(outcome.result_str());
        Ok(outcome)
    }

    pub fn initialize_search(&mut self) -> EngineResult<()> {
        if self.depth != 0 {
            return Err(EngineError::Internal(
                "search already initialized".into(),
            ));
        }
        for def in self.program.monitors().to_vec() {
            self.start_with(&def)?;
            self.monitors.push(self.machines.len() - 1);
        }
        let main = self.program.start().clone();
        self.start_with(&main)?;
        self.depth += 1;
        Ok(())
    }

    pub fn perform_search(&mut self) -> EngineResult<()> {
        while !self.is_done() {
            self.step()?;
        }
        if self.done {
            self.search_stats.set_iteration_completed();
        }
        self.check_liveness()
    }

    /// Start execution with a fresh instance of the given class,
    /// delivering its creation event to completion immediately.
    pub fn start_with(&mut self, def: &Arc<MachineDef>) -> EngineResult<PrimitiveVS<MachineRef>> {
        let machine = self.allocate_machine(Guard::const_true(), def)?;
        let msg = MessageVS::new(
            PrimitiveVS::new(EventTag::create()),
            machine.clone(),
            None,
        );
        self.perform_effect(&msg)?;
        Ok(machine)
    }

    // -- machine allocation --

    /// Mint a fresh machine handle under `pc`, bumping the class's
    /// instance counter there. After a state restore the same
    /// (class, instance) resolves to the existing arena slot, so handles
    /// stay stable across backtracking.
    pub fn allocate_machine(
        &mut self,
        pc: Guard,
        def: &Arc<MachineDef>,
    ) -> EngineResult<PrimitiveVS<MachineRef>> {
        let class = def.class().clone();
        let counter = self
            .machine_counters
            .entry(class.clone())
            .or_insert_with(|| PrimitiveVS::new(0))
            .clone();
        let guarded = counter.restrict(pc);
        let instance = guarded.max_value().unwrap_or(0).max(0) as u64;

        let mref = match self
            .machines
            .iter()
            .find(|m| m.mref().class() == &class && m.mref().instance() == instance)
        {
            Some(existing) => existing.mref().clone(),
            None => {
                let gid = self.machines.len();
                let mref = MachineRef::new(gid, class.clone(), instance);
                let semantics = if self.config.use_bag_semantics {
                    BufferSemantics::Bag
                } else {
                    BufferSemantics::Queue
                };
                self.machines
                    .push(Machine::new(def.clone(), mref.clone(), semantics));
                mref
            }
        };

        if let Some(replay) = &self.replay {
            let nth = instance as usize;
            match replay.created.iter().filter(|(c, _)| c == &class).nth(nth) {
                Some((_, recorded)) if recorded == &mref => {}
                Some((_, recorded)) => {
                    return Err(EngineError::Internal(format!(
                        "replay allocated {} where the schedule recorded {}",
                        mref, recorded
                    )))
                }
                None => {
                    return Err(EngineError::Internal(format!(
                        "replay allocated {} beyond the recorded schedule",
                        mref
                    )))
                }
            }
        }

        self.schedule.make_machine(class.clone(), mref.clone(), pc);
        let merged = counter.update_under_guard(pc, &guarded.add_i64(1));
        self.machine_counters.insert(class, merged);
        debug!(machine = %mref, "created machine");
        Ok(PrimitiveVS::new(mref).restrict(pc))
    }

    // -- nondeterministic choice --

    /// Combine disjointly-usable candidates into one summary covering the
    /// union of their universes, splitting overlaps with fresh variables.
    fn nondet_choice<T: PrimValue>(candidates: &[PrimitiveVS<T>]) -> PrimitiveVS<T> {
        let mut pending = candidates
            .iter()
            .fold(Guard::const_false(), |g, c| g.or(c.universe()));
        let mut parts: Vec<PrimitiveVS<T>> = Vec::new();
        for (i, c) in candidates.iter().enumerate() {
            let avail = c.universe().and(pending);
            if avail.is_false() {
                continue;
            }
            let take = if i + 1 == candidates.len() {
                avail
            } else {
                avail.and(Guard::new_var())
            };
            if !take.is_false() {
                parts.push(c.restrict(take));
                pending = pending.and(take.not());
            }
        }
        // Leftovers go to the earliest candidate that covers them.
        for c in candidates {
            let take = c.universe().and(pending);
            if !take.is_false() {
                parts.push(c.restrict(take));
                pending = pending.and(take.not());
            }
        }
        match parts.split_first() {
            Some((first, rest)) => first.merge(rest),
            None => PrimitiveVS::empty(),
        }
    }

    fn replayed(&self, kind: &'static str) -> EngineResult<Option<ChoiceValue>> {
        let Some(replay) = &self.replay else {
            return Ok(None);
        };
        match replay.choices.get(self.choice_depth) {
            None => Ok(None),
            Some(choice) if choice.kind() == kind => Ok(Some(choice.clone())),
            Some(choice) => Err(EngineError::Internal(format!(
                "replay expected a {} choice at depth {}, schedule has {}",
                kind,
                self.choice_depth,
                choice.kind()
            ))),
        }
    }

    pub fn next_boolean(&mut self, pc: Guard) -> EngineResult<PrimitiveVS<bool>> {
        let candidates = [
            PrimitiveVS::new(true).restrict(pc),
            PrimitiveVS::new(false).restrict(pc),
        ];
        let chosen = match self.replayed("bool")? {
            Some(ChoiceValue::Bool(b)) => b.restrict(pc),
            _ => Self::nondet_choice(&candidates),
        };
        self.coverage.record(self.choice_depth, "bool", 2);
        self.schedule
            .record(self.choice_depth, ChoiceValue::Bool(chosen.clone()));
        self.choice_depth += 1;
        Ok(chosen)
    }

    fn next_integer_candidates(
        bound: &PrimitiveVS<i64>,
        pc: Guard,
    ) -> Vec<PrimitiveVS<i64>> {
        // A zero bound is treated as bound 1 under that guard, so callers
        // picking from possibly-empty ranges still get a value there.
        let mut bound = bound.clone();
        let zero = bound.guard_for(&0);
        if !zero.is_false() {
            bound = bound.update_under_guard(zero, &PrimitiveVS::new(1));
        }
        let max = bound.max_value().unwrap_or(0);
        let mut out = Vec::new();
        for i in 0..max {
            let cond = PrimitiveVS::new(i).less_than(&bound).true_guard();
            let candidate = PrimitiveVS::new(i).restrict(cond).restrict(pc);
            if !candidate.is_empty_vs() {
                out.push(candidate);
            }
        }
        out
    }

    pub fn next_integer(
        &mut self,
        bound: &PrimitiveVS<i64>,
        pc: Guard,
    ) -> EngineResult<PrimitiveVS<i64>> {
        let candidates = Self::next_integer_candidates(bound, pc);
        let chosen = match self.replayed("integer")? {
            Some(ChoiceValue::Int(v)) => v.restrict(pc),
            _ => Self::nondet_choice(&candidates),
        };
        self.coverage
            .record(self.choice_depth, "integer", candidates.len());
        self.schedule
            .record(self.choice_depth, ChoiceValue::Int(chosen.clone()));
        self.choice_depth += 1;
        Ok(chosen)
    }

    /// Pick one element of a container by picking an index below its size.
    pub fn next_element(&mut self, list: &ListVS<Vs>, pc: Guard) -> EngineResult<Vs> {
        let candidates = Self::next_integer_candidates(list.size(), pc);
        let chosen = match self.replayed("element")? {
            Some(ChoiceValue::Element(v)) => v.restrict(pc),
            _ => Self::nondet_choice(&candidates),
        };
        self.coverage
            .record(self.choice_depth, "element", candidates.len());
        self.schedule
            .record(self.choice_depth, ChoiceValue::Element(chosen.clone()));
        self.choice_depth += 1;
        let idx = chosen.restrict(list.in_range(&chosen).true_guard());
        if idx.is_empty_vs() {
            return Err(EngineError::Model(
                "nondeterministic choice over an empty collection".into(),
            ));
        }
        Ok(list.get(&idx)?)
    }

    /// Pick one element of a set.
    pub fn next_element_of_set(&mut self, set: &SetVS<Vs>, pc: Guard) -> EngineResult<Vs> {
        self.next_element(set.elements(), pc)
    }

    /// Pick one key of a map.
    pub fn next_map_key(
        &mut self,
        map: &MapVS<Key, Vs>,
        pc: Guard,
    ) -> EngineResult<PrimitiveVS<Key>> {
        let keys = map.keys();
        let candidates = Self::next_integer_candidates(keys.size(), pc);
        let chosen = match self.replayed("element")? {
            Some(ChoiceValue::Element(v)) => v.restrict(pc),
            _ => Self::nondet_choice(&candidates),
        };
        self.coverage
            .record(self.choice_depth, "element", candidates.len());
        self.schedule
            .record(self.choice_depth, ChoiceValue::Element(chosen.clone()));
        self.choice_depth += 1;
        let idx = chosen.restrict(keys.in_range(&chosen).true_guard());
        if idx.is_empty_vs() {
            return Err(EngineError::Model(
                "nondeterministic choice over an empty map".into(),
            ));
        }
        Ok(keys.get(&idx)?)
    }

    // -- candidate senders --

    fn clock_fingerprint(clock: &VectorClockVS) -> u64 {
        let mut buf = Vec::new();
        encode::put_vclock(&mut buf, clock);
        let mut hasher = ahash::AHasher::default();
        buf.hash(&mut hasher);
        hasher.finish()
    }

    /// Guard under which every target of `msg` has halted.
    fn target_halted_guard(&self, msg: &MessageVS) -> Guard {
        let mut g = Guard::const_false();
        for t in msg.target().guarded_values() {
            let halted = self
                .machines
                .get(t.value.gid())
                .map(|m| m.halted_cond())
                .unwrap_or_else(Guard::const_false);
            g = g.or(t.guard.and(halted));
        }
        g
    }

    /// Guard under which `msg` can be delivered: some target is alive.
    fn can_run_guard(&self, msg: &MessageVS) -> Guard {
        let mut g = Guard::const_false();
        for t in msg.target().guarded_values() {
            let halted = self
                .machines
                .get(t.value.gid())
                .map(|m| m.halted_cond())
                .unwrap_or_else(Guard::const_false);
            g = g.or(t.guard.and(halted.not()));
        }
        g
    }

    /// Compute candidate senders in priority order: create steps, sync
    /// steps, then the filtered general case.
    pub fn next_sender_choices(&mut self) -> EngineResult<Vec<PrimitiveVS<MachineRef>>> {
        self.create_step = false;
        self.sync_step = false;

        // Create steps come first.
        for mid in 0..self.machines.len() {
            if self.machines[mid].buffer.is_empty() {
                continue;
            }
            let init = self.machines[mid]
                .buffer
                .head_satisfies(|m| m.is_create())?
                .true_guard();
            if !init.is_false() {
                let mref = self.machines[mid].mref().clone();
                self.create_step = true;
                return Ok(vec![PrimitiveVS::new(mref).restrict(init)]);
            }
        }

        // Then synchronous events.
        for mid in 0..self.machines.len() {
            if self.machines[mid].buffer.is_empty() {
                continue;
            }
            let sync = self.machines[mid]
                .buffer
                .head_satisfies(|m| m.is_sync())?
                .true_guard();
            if !sync.is_false() {
                let mref = self.machines[mid].mref().clone();
                self.sync_step = true;
                return Ok(vec![PrimitiveVS::new(mref).restrict(sync)]);
            }
        }

        // Purge messages addressed to halted machines.
        for mid in 0..self.machines.len() {
            loop {
                if self.machines[mid].buffer.is_empty() {
                    break;
                }
                let cond = self.machines[mid].buffer.enabled_cond();
                let head = self.machines[mid].buffer.peek(cond)?;
                let halted = self.target_halted_guard(&head);
                if halted.is_false() {
                    break;
                }
                let purged = self.machines[mid].buffer.dequeue(halted)?;
                trace!(machine = %self.machines[mid].mref(), msg = ?purged, "purged message to halted target");
            }
        }

        // General case: every machine whose head can run.
        let mut guarded: Vec<(usize, Guard)> = Vec::new();
        for mid in 0..self.machines.len() {
            if self.machines[mid].buffer.is_empty() {
                continue;
            }
            let cond = self.machines[mid].buffer.enabled_cond();
            let head = self.machines[mid].buffer.peek(cond)?;
            let can_run = self.can_run_guard(&head);
            if !can_run.is_false() {
                guarded.push((mid, can_run));
            }
        }

        if self.config.use_receiver_queue_semantics {
            guarded = self.filter_by_order(guarded, &ReceiverQueueOrder::new())?;
        }
        if self.config.use_filters {
            let order = std::mem::take(&mut self.interleave_order);
            let result = self.filter_by_order(guarded, &order);
            self.interleave_order = order;
            guarded = result?;
        }

        self.execution_finished = guarded.is_empty();

        if self.config.use_state_caching {
            if let Some(distinct) = self.distinct_state_guard {
                guarded = guarded
                    .into_iter()
                    .filter_map(|(mid, g)| {
                        let g = g.and(distinct);
                        (!g.is_false()).then_some((mid, g))
                    })
                    .collect();
            }
        }

        if self.config.use_sleep_sets {
            guarded = guarded
                .into_iter()
                .filter_map(|(mid, g)| {
                    let fp = Self::clock_fingerprint(&self.machines[mid].clock);
                    let g = g.and(self.schedule.sleep_guard(fp).not());
                    (!g.is_false()).then_some((mid, g))
                })
                .collect();
        }

        Ok(guarded
            .into_iter()
            .map(|(mid, g)| PrimitiveVS::new(self.machines[mid].mref().clone()).restrict(g))
            .collect())
    }

    /// Keep only candidates whose head message is minimal in `order`:
    /// under `order.less_than(a, b)` the sender of `b` is removed.
    fn filter_by_order(
        &mut self,
        choices: Vec<(usize, Guard)>,
        order: &dyn MessageOrder,
    ) -> EngineResult<Vec<(usize, Guard)>> {
        let mut kept: Vec<(usize, Guard, MessageVS)> = Vec::new();
        for (mid, guard) in choices {
            let current = self.machines[mid].buffer.peek(guard)?;
            let mut add = guard;
            for (_, _, old) in &kept {
                add = add.and(order.less_than(old, &current).true_guard().not());
            }
            for entry in kept.iter_mut() {
                let removed = order.less_than(&current, &entry.2).true_guard().and(add);
                entry.1 = entry.1.and(removed.not());
                entry.2 = entry.2.restrict(removed.not());
            }
            let current = current.restrict(add);
            kept.push((mid, add, current));
        }
        Ok(kept
            .into_iter()
            .filter(|(_, g, _)| !g.is_false())
            .map(|(mid, g, _)| (mid, g))
            .collect())
    }

    /// Pick the sender for this step symbolically and record it.
    pub fn next_sender(&mut self) -> EngineResult<PrimitiveVS<MachineRef>> {
        let candidates = self.next_sender_choices()?;
        let chosen = match self.replayed("sender")? {
            Some(ChoiceValue::Sender(s)) => s,
            _ => Self::nondet_choice(&candidates),
        };
        if self.config.use_sleep_sets {
            // A candidate sleeps in the branches of candidates picked after
            // it, but only where the two head deliveries are independent:
            // same-target heads do not commute and must both stay explored.
            let mut infos: Vec<(u64, Guard, MessageVS)> = Vec::new();
            for c in &candidates {
                if let Some(e) = c.guarded_values().first() {
                    let mid = e.value.gid();
                    let head = self.machines[mid].buffer.peek(e.guard)?;
                    let fp = Self::clock_fingerprint(&self.machines[mid].clock);
                    infos.push((fp, chosen.guard_for(&e.value), head));
                }
            }
            for i in 0..infos.len() {
                let mut later = Guard::const_false();
                for j in (i + 1)..infos.len() {
                    let same_target = infos[i]
                        .2
                        .target()
                        .symbolic_equals(infos[j].2.target(), Guard::const_true())
                        .true_guard();
                    later = later.or(infos[j].1.and(same_target.not()));
                }
                self.schedule.block(infos[i].0, later);
            }
        }
        self.coverage
            .record(self.choice_depth, "sender", candidates.len());
        self.schedule
            .record(self.choice_depth, ChoiceValue::Sender(chosen.clone()));
        self.choice_depth += 1;
        Ok(chosen)
    }

    // -- state capture, caching, and restore --

    fn store_src_state(&mut self) {
        if self.src_state.is_some() {
            return;
        }
        let snaps = self
            .machines
            .iter()
            .enumerate()
            .map(|(gid, m)| (gid, m.snapshot().encode()))
            .collect();
        self.src_state = Some(snaps);
    }

    fn push_frame(&mut self) {
        if self.schedule.has_frame(self.depth) {
            return;
        }
        let machines = self.src_state.clone().unwrap_or_default();
        let counters = self
            .machine_counters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.schedule.set_frame(Frame {
            depth: self.depth,
            choice_depth: self.choice_depth,
            machines,
            counters,
        });
    }

    /// Restore machine state and counters from the frame captured at
    /// `depth` and rewind the step and choice counters to it.
    pub fn restore_state(&mut self, depth: usize) -> EngineResult<()> {
        let frame = self
            .schedule
            .frame(depth)
            .cloned()
            .ok_or_else(|| {
                EngineError::Internal(format!("no backtrack frame at depth {}", depth))
            })?;
        let in_frame: Vec<usize> = frame.machines.iter().map(|(gid, _)| *gid).collect();
        for (gid, bytes) in &frame.machines {
            let snap = crate::machine::MachineSnapshot::decode(bytes)?;
            self.machines[*gid].restore(snap);
        }
        for (gid, machine) in self.machines.iter_mut().enumerate() {
            if !in_frame.contains(&gid) {
                machine.reset();
            }
        }
        self.machine_counters = frame.counters.iter().cloned().collect();
        self.depth = frame.depth;
        self.choice_depth = frame.choice_depth;
        self.done = false;
        self.execution_finished = false;
        self.src_state = None;
        self.distinct_state_guard = None;
        self.schedule.drop_frames_from(depth + 1);
        info!(depth, "restored source state");
        Ok(())
    }

    fn pick_prim<T: PrimValue>(vs: &PrimitiveVS<T>, pc: Guard) -> Option<GuardedValue<T>> {
        for e in vs.guarded_values() {
            let g = e.guard.and(pc);
            if g.is_sat() {
                return Some(GuardedValue::new(g, e.value.clone()));
            }
        }
        None
    }

    /// One concrete valuation of a buffer: a list of
    /// (event, target, payload) triples.
    fn concretize_buffer(
        list: &ListVS<MessageVS>,
        pc: Guard,
    ) -> Option<GuardedValue<Concrete>> {
        let size = Self::pick_prim(list.size(), pc)?;
        let mut acc = size.guard;
        let mut msgs = Vec::new();
        for i in 0..size.value.max(0) as usize {
            let m = list.items().get(i)?;
            let ev = Self::pick_prim(m.event(), acc)?;
            acc = ev.guard;
            let tg = Self::pick_prim(m.target(), acc)?;
            acc = tg.guard;
            let payload = match m.payload() {
                Some(p) => match concretize(&Vs::Union(Box::new(p.clone())), acc) {
                    Some(c) => {
                        acc = c.guard;
                        c.value
                    }
                    None => Concrete::Tuple(vec![]),
                },
                None => Concrete::Tuple(vec![]),
            };
            msgs.push(Concrete::Tuple(vec![
                Concrete::Event(ev.value),
                Concrete::Machine(tg.value),
                payload,
            ]));
        }
        Some(GuardedValue::new(acc, Concrete::List(msgs)))
    }

    /// Enumerate the concrete states inside the current symbolic state:
    /// pick a satisfying assignment, record its fingerprint, exclude it,
    /// repeat. With state caching on, the union of path conditions that
    /// reach unseen states becomes the step's candidate filter.
    fn enumerate_concrete_states(&mut self) -> EngineResult<(usize, usize)> {
        if self.config.use_state_caching {
            self.distinct_state_guard = Some(Guard::const_false());
            // Create and sync steps are forced; filtering them would stall
            // the run before the interesting interleavings.
            if self.create_step || self.sync_step {
                self.distinct_state_guard = Some(Guard::const_true());
                return Ok((0, 0));
            }
        }

        let mut seen = Guard::const_false();
        let mut num_states = 0usize;
        let mut num_distinct = 0usize;
        loop {
            let iter_pc = seen.not();
            if !iter_pc.is_sat() {
                break;
            }
            let mut acc = iter_pc;
            let mut progressed = false;
            let mut global: Vec<Vec<Concrete>> = Vec::with_capacity(self.machines.len());
            for machine in &self.machines {
                let mut mstate = Vec::new();
                for vs in machine.local_state() {
                    match concretize(&vs, acc) {
                        Some(gv) => {
                            acc = gv.guard;
                            progressed = true;
                            mstate.push(gv.value);
                        }
                        None => mstate.push(Concrete::Tuple(vec![])),
                    }
                }
                match Self::concretize_buffer(machine.buffer.elements(), acc) {
                    Some(gv) => {
                        acc = gv.guard;
                        progressed = true;
                        mstate.push(gv.value);
                    }
                    None => mstate.push(Concrete::Tuple(vec![])),
                }
                global.push(mstate);
            }
            if !progressed {
                break;
            }
            num_states += 1;
            self.total_state_count += 1;
            let fp = fingerprint(&global);
            let visits = self.distinct_states.entry(fp).or_insert(0);
            if *visits == 0 {
                num_distinct += 1;
                if self.config.use_state_caching {
                    let g = self.distinct_state_guard.unwrap_or_else(Guard::const_false);
                    self.distinct_state_guard = Some(g.or(acc));
                }
                trace!(fingerprint = fp, "new concrete state");
            }
            *visits += 1;
            seen = seen.or(acc);
        }
        Ok((num_states, num_distinct))
    }

    // -- the step loop --

    /// One scheduling step. Sub-steps run in fixed order: capture,
    /// candidates, pick, dequeue, monitors, targets, stats.
    pub fn step(&mut self) -> EngineResult<()> {
        self.src_state = None;

        let mut num_states = 0;
        if self.config.collect_stats > 3 || self.config.use_state_caching {
            self.store_src_state();
            let (states, distinct) = self.enumerate_concrete_states()?;
            num_states = states;
            debug!(depth = self.depth, states, distinct, "enumerated source states");
        }

        if self.config.use_backtrack {
            self.store_src_state();
            self.push_frame();
        }

        let choices = self.next_sender()?;
        if choices.is_empty_vs() {
            self.done = true;
            info!(depth = self.depth, "execution finished");
            return Ok(());
        }

        self.time.check_timeout()?;
        self.mem.check_memout()?;

        let mut num_messages = 0usize;
        let mut effect: Option<MessageVS> = None;
        let mut effects: Vec<MessageVS> = Vec::new();
        for sender in choices.guarded_values().to_vec() {
            let mid = sender.value.gid();
            let removed = self.machines[mid].buffer.dequeue(sender.guard)?;
            num_messages += count_assignments(
                Guard::const_true(),
                &[
                    Vs::Event(removed.event().clone()),
                    Vs::Machine(removed.target().clone()),
                ],
            );
            match effect {
                None => effect = Some(removed),
                Some(_) => effects.push(removed),
            }
        }
        let effect = effect
            .ok_or_else(|| EngineError::Internal("chosen sender produced no message".into()))?
            .merge(&effects);

        let (num_merged, num_explored) = if self.config.collect_stats > 3 {
            let merged = count_assignments(
                Guard::const_true(),
                &[
                    Vs::Event(effect.event().clone()),
                    Vs::Machine(effect.target().clone()),
                ],
            );
            let explored = count_assignments(
                Guard::const_true(),
                &[Vs::Machine(effect.target().clone())],
            );
            (merged, explored)
        } else {
            (0, 0)
        };

        debug!(depth = self.depth, effect = ?effect, "schedule step");
        self.perform_effect(&effect)?;

        if self.mem.above_cleanup_threshold() {
            SolverContext::cleanup();
        }

        if self.config.verbosity > 3 {
            let solver = SolverContext::stats();
            info!(
                depth = self.depth,
                time_seconds = format!("{:.1}", self.time.elapsed_secs()),
                memory_mb = format!("{:.1}", self.mem.current_mb()),
                solver_nodes = SolverContext::node_count(),
                sat_ops = solver.is_sat_ops,
                "step resource stats"
            );
        }

        self.search_stats.add_depth_statistics(DepthStats {
            depth: self.depth,
            num_states,
            num_messages,
            num_messages_merged: num_merged,
            num_messages_explored: num_explored,
        });

        self.time.check_timeout()?;
        self.depth += 1;
        Ok(())
    }

    // -- effects --

    /// Dispatch a message: monitors first, then each target machine under
    /// its guard.
    pub fn perform_effect(&mut self, msg: &MessageVS) -> EngineResult<()> {
        self.run_monitors(msg)?;
        for target in msg.target().guarded_values().to_vec() {
            self.process_event_to_completion(
                target.value.gid(),
                target.guard,
                &msg.restrict(target.guard),
            )?;
        }
        Ok(())
    }

    /// Broadcast an event to the listening monitors only.
    pub fn announce(
        &mut self,
        event: &PrimitiveVS<EventTag>,
        payload: Option<UnionVS>,
    ) -> EngineResult<()> {
        if event.is_empty_vs() {
            return Err(EngineError::Internal(
                "a machine cannot announce an empty event".into(),
            ));
        }
        let msg = MessageVS::new(event.clone(), PrimitiveVS::empty(), payload);
        self.run_monitors(&msg)
    }

    fn run_monitors(&mut self, msg: &MessageVS) -> EngineResult<()> {
        if self.monitors.is_empty() {
            return Ok(());
        }
        let mut constraints = vec![Guard::const_false(); self.monitors.len()];
        for e in msg.event().guarded_values() {
            for &listener in self.program.listeners_for(&e.value) {
                constraints[listener] = constraints[listener].or(e.guard);
            }
        }
        for (idx, constraint) in constraints.into_iter().enumerate() {
            if !constraint.is_false() {
                let mid = self.monitors[idx];
                self.process_event_to_completion(mid, constraint, &msg.restrict(constraint))?;
            }
        }
        Ok(())
    }

    /// Deliver a message to one machine and run it to quiescence: raised
    /// events and state entries are processed before returning, bounded
    /// by the internal-step limit.
    pub fn process_event_to_completion(
        &mut self,
        mid: usize,
        pc: Guard,
        msg: &MessageVS,
    ) -> EngineResult<()> {
        let mut tasks: VecDeque<Task> = VecDeque::new();
        for e in msg.event().restrict(pc).guarded_values() {
            tasks.push_back(Task::Deliver {
                guard: e.guard,
                event: e.value.clone(),
                payload: msg.payload().map(|p| p.restrict(e.guard)),
            });
        }
        let mut steps = 0usize;
        while let Some(task) = tasks.pop_front() {
            steps += 1;
            if self.config.max_internal_steps > 0 && steps > self.config.max_internal_steps {
                return Err(EngineError::Model(format!(
                    "machine {} exceeded {} internal steps handling one event",
                    self.machines[mid].mref(),
                    self.config.max_internal_steps
                )));
            }
            match task {
                Task::Deliver {
                    guard,
                    event,
                    payload,
                } => self.deliver_one(mid, guard, &event, payload, &mut tasks)?,
                Task::Enter {
                    guard,
                    state,
                    payload,
                } => self.enter_state(mid, guard, state, payload, &mut tasks)?,
            }
        }
        Ok(())
    }

    fn deliver_one(
        &mut self,
        mid: usize,
        guard: Guard,
        event: &EventTag,
        payload: Option<UnionVS>,
        tasks: &mut VecDeque<Task>,
    ) -> EngineResult<()> {
        if guard.is_false() {
            return Ok(());
        }
        if event.is_create() {
            self.machines[mid].set_started(guard);
            tasks.push_back(Task::Enter {
                guard,
                state: 0,
                payload,
            });
            return Ok(());
        }
        // Deliveries to a halted machine are dropped silently.
        let guard = guard.and(self.machines[mid].halted_cond().not());
        if guard.is_false() {
            return Ok(());
        }
        let states = self.machines[mid]
            .current_state()
            .restrict(guard)
            .guarded_values()
            .to_vec();
        let def = self.machines[mid].def().clone();
        for st in states {
            match def.reaction(st.value.idx(), event) {
                None => {
                    return Err(EngineError::Model(format!(
                        "machine {} cannot handle event {} in state {}",
                        self.machines[mid].mref(),
                        event,
                        st.value
                    )))
                }
                Some(Reaction::Ignore) => {}
                Some(Reaction::Halt) => self.machines[mid].set_halted(st.guard),
                Some(Reaction::Goto(target)) => tasks.push_back(Task::Enter {
                    guard: st.guard,
                    state: *target,
                    payload: payload.as_ref().map(|p| p.restrict(st.guard)),
                }),
                Some(Reaction::Handle(handler)) => {
                    let handler = handler.clone();
                    self.run_handler(
                        mid,
                        st.guard,
                        payload.as_ref().map(|p| p.restrict(st.guard)),
                        handler,
                        tasks,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn enter_state(
        &mut self,
        mid: usize,
        guard: Guard,
        state: u32,
        payload: Option<UnionVS>,
        tasks: &mut VecDeque<Task>,
    ) -> EngineResult<()> {
        if guard.is_false() {
            return Ok(());
        }
        let def = self.machines[mid].def().clone();
        let target = def.state_ref(state);
        let next = self.machines[mid]
            .current_state()
            .update_under_guard(guard, &PrimitiveVS::new(target));
        self.machines[mid].set_current_state(next);
        if let Some(handler) = def.entry(state) {
            let handler = handler.clone();
            self.run_handler(mid, guard, payload, handler, tasks)?;
        }
        Ok(())
    }

    fn run_handler(
        &mut self,
        mid: usize,
        guard: Guard,
        payload: Option<UnionVS>,
        handler: HandlerFn,
        tasks: &mut VecDeque<Task>,
    ) -> EngineResult<()> {
        let mut ctx = EffectCtx {
            sched: self,
            mid,
            pc: guard,
            payload,
            raises: Vec::new(),
            gotos: Vec::new(),
        };
        handler(&mut ctx)?;
        let raises = std::mem::take(&mut ctx.raises);
        let gotos = std::mem::take(&mut ctx.gotos);
        for (g, event, payload) in raises {
            tasks.push_back(Task::Deliver {
                guard: g,
                event,
                payload,
            });
        }
        for (g, state) in gotos {
            tasks.push_back(Task::Enter {
                guard: g,
                state,
                payload: None,
            });
        }
        Ok(())
    }

    // -- liveness --

    /// After a finished execution, a monitor still occupying a hot state
    /// under a satisfiable guard is a liveness violation.
    pub fn check_liveness(&self) -> EngineResult<()> {
        if !self.is_finished_execution() {
            return Ok(());
        }
        for &mid in &self.monitors {
            for entry in self.machines[mid].current_state().guarded_values() {
                if entry.value.is_hot() && entry.guard.is_sat() {
                    return Err(EngineError::Liveness {
                        monitor: self.machines[mid].mref().to_string(),
                        state: entry.value.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    // -- statistics --

    fn print_stats(&mut self, result: &str) {
        let total = self.search_stats.total();
        let time_used = self.time.elapsed_secs();
        let mem_current = self.mem.current_mb();
        let mem_max = self.mem.max_mb();
        let solver = SolverContext::stats();
        let total_states = self.total_state_count;
        let distinct_states = self.distinct_states.len();

        let w = &mut self.stat_writer;
        w.log("result", result);
        w.log("time-seconds", format!("{:.1}", time_used));
        w.log("memory-max-MB", format!("{:.1}", mem_max));
        w.log("memory-current-MB", format!("{:.1}", mem_current));
        w.log("max-depth-explored", total.depth);
        w.log(
            "time-create-guards-seconds",
            format!("{:.1}", solver.time_create_guards.as_secs_f64()),
        );
        w.log(
            "time-solve-guards-seconds",
            format!("{:.1}", solver.time_solve_guards.as_secs_f64()),
        );
        w.log(
            "time-create-guards-max-seconds",
            format!("{:.3}", solver.time_max_create.as_secs_f64()),
        );
        w.log(
            "time-solve-guards-max-seconds",
            format!("{:.3}", solver.time_max_solve.as_secs_f64()),
        );
        w.log("#-vars", SolverContext::var_count());
        w.log("#-nodes", SolverContext::node_count());
        w.log("#-and-ops", solver.and_ops);
        w.log("#-or-ops", solver.or_ops);
        w.log("#-not-ops", solver.not_ops);
        w.log("#-sat-ops", solver.is_sat_ops);
        w.log("#-sat-ops-sat", solver.is_sat_true);
        w.log("%-sat-ops-sat", format!("{:.1}", solver.sat_percent()));
        w.log("#-states", total_states);
        w.log("#-distinct-states", distinct_states);
        w.log("#-events", total.num_messages);
        w.log("#-events-merged", total.num_messages_merged);
        w.log("#-events-explored", total.num_messages_explored);
    }
}

/// The world as one handler sees it: a path condition, the machine's own
/// fields, and the scheduler services (send, create, choices, announce,
/// assertions). Gotos and raises are collected and applied by the
/// event-to-completion loop after the handler returns.
pub struct EffectCtx<'a> {
    sched: &'a mut Scheduler,
    mid: usize,
    pc: Guard,
    payload: Option<UnionVS>,
    raises: Vec<(Guard, EventTag, Option<UnionVS>)>,
    gotos: Vec<(Guard, u32)>,
}

impl<'a> EffectCtx<'a> {
    /// The path condition this handler runs under.
    pub fn pc(&self) -> Guard {
        self.pc
    }

    pub fn self_ref(&self) -> MachineRef {
        self.sched.machines[self.mid].mref().clone()
    }

    pub fn payload(&self) -> Option<&UnionVS> {
        self.payload.as_ref()
    }

    /// Field value restricted to the handler's path condition.
    pub fn get_field(&self, idx: usize) -> EngineResult<Vs> {
        Ok(self.sched.machines[self.mid].field(idx)?.restrict(self.pc))
    }

    /// Update a field under the path condition (and the new value's own
    /// universe).
    pub fn set_field(&mut self, idx: usize, value: &Vs) -> EngineResult<()> {
        let old = self.sched.machines[self.mid].field(idx)?.clone();
        let updated = old.update_under_guard(self.pc.and(value.universe()), value);
        self.sched.machines[self.mid].set_field(idx, updated)
    }

    /// Send an event to the target machines: bumps this machine's clock
    /// and appends to its send buffer.
    pub fn send(
        &mut self,
        target: &PrimitiveVS<MachineRef>,
        event: EventTag,
        payload: Option<UnionVS>,
    ) -> EngineResult<()> {
        let pc = self.pc.and(target.universe());
        if pc.is_false() {
            return Ok(());
        }
        let needs_clocks = self.sched.config.needs_clocks();
        let use_sleep = self.sched.config.use_sleep_sets;
        let mref = self.self_ref();
        if needs_clocks {
            let machine = &mut self.sched.machines[self.mid];
            machine.clock = machine.clock.increment(&mref, pc);
            if use_sleep {
                let fp = Scheduler::clock_fingerprint(&self.sched.machines[self.mid].clock);
                self.sched.schedule.unblock(fp);
            }
        }
        let clock = self.sched.machines[self.mid].clock.clone();
        let msg = MessageVS::with_clock(
            PrimitiveVS::new(event).restrict(pc),
            target.restrict(pc),
            payload.map(|p| p.restrict(pc)),
            clock.restrict(pc),
        );
        trace!(from = %mref, msg = ?msg, "send");
        self.sched.machines[self.mid].buffer.enqueue(msg);
        Ok(())
    }

    /// Create a new machine of the given class: allocates the handle now
    /// and queues the creation event behind this machine's earlier sends.
    pub fn create(
        &mut self,
        def: &Arc<MachineDef>,
        payload: Option<UnionVS>,
    ) -> EngineResult<PrimitiveVS<MachineRef>> {
        let pc = self.pc;
        let machine = self.sched.allocate_machine(pc, def)?;
        let needs_clocks = self.sched.config.needs_clocks();
        let mref = self.self_ref();
        if needs_clocks {
            let slot = &mut self.sched.machines[self.mid];
            slot.clock = slot.clock.increment(&mref, pc);
        }
        let clock = self.sched.machines[self.mid].clock.clone();
        let msg = MessageVS::with_clock(
            PrimitiveVS::new(EventTag::create()).restrict(pc),
            machine.clone(),
            payload.map(|p| p.restrict(pc)),
            clock.restrict(pc),
        );
        self.sched.machines[self.mid].buffer.enqueue(msg);
        Ok(machine)
    }

    /// Transition to the named state after the handler returns.
    pub fn goto(&mut self, state: &str) -> EngineResult<()> {
        let idx = self.sched.machines[self.mid]
            .def()
            .state_idx(state)
            .ok_or_else(|| {
                EngineError::Model(format!(
                    "machine {} has no state named {}",
                    self.self_ref(),
                    state
                ))
            })?;
        self.gotos.push((self.pc, idx));
        Ok(())
    }

    /// Queue an event to this machine itself, processed before the
    /// delivery completes.
    pub fn raise(&mut self, event: EventTag, payload: Option<UnionVS>) {
        self.raises.push((self.pc, event, payload));
    }

    /// Halt this machine under the path condition.
    pub fn halt(&mut self) {
        let pc = self.pc;
        self.sched.machines[self.mid].set_halted(pc);
    }

    pub fn next_bool(&mut self) -> EngineResult<PrimitiveVS<bool>> {
        let pc = self.pc;
        self.sched.next_boolean(pc)
    }

    pub fn next_int(&mut self, bound: &PrimitiveVS<i64>) -> EngineResult<PrimitiveVS<i64>> {
        let pc = self.pc;
        self.sched.next_integer(bound, pc)
    }

    pub fn next_element(&mut self, list: &ListVS<Vs>) -> EngineResult<Vs> {
        let pc = self.pc;
        self.sched.next_element(list, pc)
    }

    pub fn next_element_of_set(&mut self, set: &SetVS<Vs>) -> EngineResult<Vs> {
        let pc = self.pc;
        self.sched.next_element_of_set(set, pc)
    }

    pub fn next_map_key(&mut self, map: &MapVS<Key, Vs>) -> EngineResult<PrimitiveVS<Key>> {
        let pc = self.pc;
        self.sched.next_map_key(map, pc)
    }

    /// Broadcast to monitors only.
    pub fn announce(&mut self, event: EventTag, payload: Option<UnionVS>) -> EngineResult<()> {
        let pc = self.pc;
        let event = PrimitiveVS::new(event).restrict(pc);
        self.sched.announce(&event, payload.map(|p| p.restrict(pc)))
    }

    /// Fail the search where `cond` is false within the path condition.
    pub fn assert_prop(&mut self, cond: &PrimitiveVS<bool>, message: &str) -> EngineResult<()> {
        let violated = self.pc.and(cond.false_guard());
        if violated.is_sat() {
            return Err(EngineError::Assertion {
                message: format!("{} (machine {})", message, self.self_ref()),
            });
        }
        Ok(())
    }
}
