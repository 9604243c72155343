//! Binary snapshot codec for value summaries.
//!
//! Backtrack frames serialize machine state through this module. The
//! format is tag-prefixed little-endian and round-trips exactly. Guards
//! serialize as their raw solver handles, which are only meaningful
//! against the same installed solver context; that matches the scope of
//! snapshots, which never outlive a run.

use crate::ids::{EventKind, EventTag, Key, MachineRef, StateRef};
use crate::list::ListVS;
use crate::map::MapVS;
use crate::message::MessageVS;
use crate::primitive::{PrimValue, PrimitiveVS};
use crate::set::SetVS;
use crate::tuple::TupleVS;
use crate::union::{UnionTag, UnionVS};
use crate::value::Vs;
use crate::vclock::VectorClockVS;
use crate::{ValueSummary, VsError, VsResult};
use relay_solver::Guard;
use std::sync::Arc;

// Variant tags for `Vs`.
const TAG_BOOL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_EVENT: u8 = 2;
const TAG_MACHINE: u8 = 3;
const TAG_STATE: u8 = 4;
const TAG_LIST: u8 = 5;
const TAG_SET: u8 = 6;
const TAG_MAP: u8 = 7;
const TAG_TUPLE: u8 = 8;
const TAG_UNION: u8 = 9;

/// Byte reader with an explicit position, for decoding.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_at_end(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn take(&mut self, n: usize) -> VsResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(VsError::Decode(format!(
                "unexpected end of snapshot at offset {}",
                self.pos
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u8(&mut self) -> VsResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> VsResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> VsResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn i64(&mut self) -> VsResult<i64> {
        Ok(self.u64()? as i64)
    }

    pub fn len(&mut self) -> VsResult<usize> {
        Ok(self.u64()? as usize)
    }

    pub fn str(&mut self) -> VsResult<Arc<str>> {
        let n = self.len()?;
        let bytes = self.take(n)?;
        std::str::from_utf8(bytes)
            .map(Arc::from)
            .map_err(|e| VsError::Decode(format!("invalid utf-8 in snapshot: {}", e)))
    }
}

pub fn put_len(out: &mut Vec<u8>, n: usize) {
    out.extend_from_slice(&(n as u64).to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_len(out, s.len());
    out.extend_from_slice(s.as_bytes());
}

pub fn put_guard(out: &mut Vec<u8>, g: Guard) {
    out.extend_from_slice(&g.raw().to_le_bytes());
}

pub fn get_guard(cur: &mut Cursor<'_>) -> VsResult<Guard> {
    Ok(Guard::from_raw(cur.u32()?))
}

// -- scalar payload codecs --

fn put_bool(out: &mut Vec<u8>, b: &bool) {
    out.push(u8::from(*b));
}

fn get_bool(cur: &mut Cursor<'_>) -> VsResult<bool> {
    Ok(cur.u8()? != 0)
}

fn put_i64(out: &mut Vec<u8>, n: &i64) {
    out.extend_from_slice(&n.to_le_bytes());
}

fn get_i64(cur: &mut Cursor<'_>) -> VsResult<i64> {
    cur.i64()
}

fn put_event(out: &mut Vec<u8>, e: &EventTag) {
    out.push(match e.kind() {
        EventKind::Async => 0,
        EventKind::Sync => 1,
        EventKind::Create => 2,
    });
    put_str(out, e.name());
}

fn get_event(cur: &mut Cursor<'_>) -> VsResult<EventTag> {
    let kind = cur.u8()?;
    let name = cur.str()?;
    Ok(match kind {
        0 => EventTag::new(&name),
        1 => EventTag::sync(&name),
        2 => EventTag::create(),
        other => return Err(VsError::Decode(format!("bad event kind {}", other))),
    })
}

fn put_machine(out: &mut Vec<u8>, m: &MachineRef) {
    put_len(out, m.gid());
    put_str(out, m.class());
    out.extend_from_slice(&m.instance().to_le_bytes());
}

fn get_machine(cur: &mut Cursor<'_>) -> VsResult<MachineRef> {
    let gid = cur.len()?;
    let class = cur.str()?;
    let instance = cur.u64()?;
    Ok(MachineRef::new(gid, class, instance))
}

fn put_state(out: &mut Vec<u8>, s: &StateRef) {
    out.extend_from_slice(&s.idx().to_le_bytes());
    out.push(u8::from(s.is_hot()));
    put_str(out, s.name());
}

fn get_state(cur: &mut Cursor<'_>) -> VsResult<StateRef> {
    let idx = cur.u32()?;
    let hot = cur.u8()? != 0;
    let name = cur.str()?;
    Ok(StateRef::new(idx, name, hot))
}

fn put_union_tag(out: &mut Vec<u8>, t: &UnionTag) {
    put_str(out, t.name());
    match t.field_names() {
        None => out.push(0),
        Some(fields) => {
            out.push(1);
            put_len(out, fields.len());
            for f in fields {
                put_str(out, f);
            }
        }
    }
}

fn get_union_tag(cur: &mut Cursor<'_>) -> VsResult<UnionTag> {
    let name = cur.str()?;
    match cur.u8()? {
        0 => Ok(UnionTag::new(&name)),
        1 => {
            let n = cur.len()?;
            let mut fields = Vec::with_capacity(n);
            for _ in 0..n {
                fields.push(cur.str()?);
            }
            let refs: Vec<&str> = fields.iter().map(|f| f.as_ref()).collect();
            Ok(UnionTag::with_fields(&name, &refs))
        }
        other => Err(VsError::Decode(format!("bad union tag marker {}", other))),
    }
}

fn put_key(out: &mut Vec<u8>, k: &Key) {
    match k {
        Key::Bool(b) => {
            out.push(0);
            put_bool(out, b);
        }
        Key::Int(n) => {
            out.push(1);
            put_i64(out, n);
        }
        Key::Str(s) => {
            out.push(2);
            put_str(out, s);
        }
        Key::Event(e) => {
            out.push(3);
            put_event(out, e);
        }
        Key::Machine(m) => {
            out.push(4);
            put_machine(out, m);
        }
    }
}

fn get_key(cur: &mut Cursor<'_>) -> VsResult<Key> {
    Ok(match cur.u8()? {
        0 => Key::Bool(get_bool(cur)?),
        1 => Key::Int(get_i64(cur)?),
        2 => Key::Str(cur.str()?),
        3 => Key::Event(get_event(cur)?),
        4 => Key::Machine(get_machine(cur)?),
        other => return Err(VsError::Decode(format!("bad key tag {}", other))),
    })
}

// -- summary codecs --

fn put_prim<T: PrimValue>(
    out: &mut Vec<u8>,
    vs: &PrimitiveVS<T>,
    put_value: impl Fn(&mut Vec<u8>, &T),
) {
    put_len(out, vs.guarded_values().len());
    for e in vs.guarded_values() {
        put_guard(out, e.guard);
        put_value(out, &e.value);
    }
}

fn get_prim<T: PrimValue>(
    cur: &mut Cursor<'_>,
    get_value: impl Fn(&mut Cursor<'_>) -> VsResult<T>,
) -> VsResult<PrimitiveVS<T>> {
    let n = cur.len()?;
    let mut pairs = Vec::with_capacity(n);
    for _ in 0..n {
        let guard = get_guard(cur)?;
        let value = get_value(cur)?;
        pairs.push((value, guard));
    }
    Ok(PrimitiveVS::from_guarded(pairs))
}

fn put_list<T: ValueSummary>(
    out: &mut Vec<u8>,
    list: &ListVS<T>,
    put_item: impl Fn(&mut Vec<u8>, &T) + Copy,
) {
    put_prim(out, list.size(), put_i64);
    put_len(out, list.items().len());
    for item in list.items() {
        put_item(out, item);
    }
}

fn get_list<T: ValueSummary>(
    cur: &mut Cursor<'_>,
    get_item: impl Fn(&mut Cursor<'_>) -> VsResult<T> + Copy,
) -> VsResult<ListVS<T>> {
    let size = get_prim(cur, get_i64)?;
    let n = cur.len()?;
    let mut items = Vec::with_capacity(n);
    for _ in 0..n {
        items.push(get_item(cur)?);
    }
    Ok(ListVS::from_parts(size, items))
}

fn put_union(out: &mut Vec<u8>, u: &UnionVS) {
    put_prim(out, u.tag(), put_union_tag);
    put_len(out, u.payloads().len());
    for (tag, payload) in u.payloads() {
        put_union_tag(out, tag);
        put_vs(out, payload);
    }
}

fn get_union(cur: &mut Cursor<'_>) -> VsResult<UnionVS> {
    let tag = get_prim(cur, get_union_tag)?;
    let n = cur.len()?;
    let mut payloads = Vec::with_capacity(n);
    for _ in 0..n {
        let t = get_union_tag(cur)?;
        let p = get_vs(cur)?;
        payloads.push((t, p));
    }
    Ok(UnionVS::from_parts(tag, payloads))
}

/// Append the binary form of a summary to `out`.
pub fn put_vs(out: &mut Vec<u8>, vs: &Vs) {
    match vs {
        Vs::Bool(v) => {
            out.push(TAG_BOOL);
            put_prim(out, v, put_bool);
        }
        Vs::Int(v) => {
            out.push(TAG_INT);
            put_prim(out, v, put_i64);
        }
        Vs::Event(v) => {
            out.push(TAG_EVENT);
            put_prim(out, v, put_event);
        }
        Vs::Machine(v) => {
            out.push(TAG_MACHINE);
            put_prim(out, v, put_machine);
        }
        Vs::State(v) => {
            out.push(TAG_STATE);
            put_prim(out, v, put_state);
        }
        Vs::List(l) => {
            out.push(TAG_LIST);
            put_list(out, l, put_vs);
        }
        Vs::Set(s) => {
            out.push(TAG_SET);
            put_list(out, s.elements(), put_vs);
        }
        Vs::Map(m) => {
            out.push(TAG_MAP);
            put_list(out, m.keys(), |o, k| put_prim(o, k, put_key));
            put_list(out, m.values(), put_vs);
        }
        Vs::Tuple(t) => {
            out.push(TAG_TUPLE);
            put_len(out, t.arity());
            for f in t.fields() {
                put_vs(out, f);
            }
        }
        Vs::Union(u) => {
            out.push(TAG_UNION);
            put_union(out, u);
        }
    }
}

/// Decode one summary from the cursor.
pub fn get_vs(cur: &mut Cursor<'_>) -> VsResult<Vs> {
    Ok(match cur.u8()? {
        TAG_BOOL => Vs::Bool(get_prim(cur, get_bool)?),
        TAG_INT => Vs::Int(get_prim(cur, get_i64)?),
        TAG_EVENT => Vs::Event(get_prim(cur, get_event)?),
        TAG_MACHINE => Vs::Machine(get_prim(cur, get_machine)?),
        TAG_STATE => Vs::State(get_prim(cur, get_state)?),
        TAG_LIST => Vs::List(Box::new(get_list(cur, get_vs)?)),
        TAG_SET => Vs::Set(Box::new(SetVS::from_list(get_list(cur, get_vs)?))),
        TAG_MAP => {
            let keys = get_list(cur, |c| get_prim(c, get_key))?;
            let values = get_list(cur, get_vs)?;
            Vs::Map(Box::new(MapVS::from_parts(keys, values)))
        }
        TAG_TUPLE => {
            let n = cur.len()?;
            let mut fields = Vec::with_capacity(n);
            for _ in 0..n {
                fields.push(get_vs(cur)?);
            }
            Vs::Tuple(TupleVS::new(fields))
        }
        TAG_UNION => Vs::Union(Box::new(get_union(cur)?)),
        other => return Err(VsError::Decode(format!("bad summary tag {}", other))),
    })
}

/// Encode a message (used by the event-buffer snapshot).
pub fn put_message(out: &mut Vec<u8>, msg: &MessageVS) {
    put_prim(out, msg.event(), put_event);
    put_prim(out, msg.target(), put_machine);
    match msg.payload() {
        None => out.push(0),
        Some(p) => {
            out.push(1);
            put_union(out, p);
        }
    }
    put_vclock(out, msg.clock());
}

pub fn get_message(cur: &mut Cursor<'_>) -> VsResult<MessageVS> {
    let event = get_prim(cur, get_event)?;
    let target = get_prim(cur, get_machine)?;
    let payload = match cur.u8()? {
        0 => None,
        1 => Some(get_union(cur)?),
        other => return Err(VsError::Decode(format!("bad payload marker {}", other))),
    };
    let clock = get_vclock(cur)?;
    MessageVS::decode_parts(event, target, payload, clock)
}

/// Encode a vector clock.
pub fn put_vclock(out: &mut Vec<u8>, clock: &VectorClockVS) {
    put_list(out, clock.map().keys(), |o, k| put_prim(o, k, put_machine));
    put_list(out, clock.map().values(), |o, v| put_prim(o, v, put_i64));
}

pub fn get_vclock(cur: &mut Cursor<'_>) -> VsResult<VectorClockVS> {
    let keys = get_list(cur, |c| get_prim(c, get_machine))?;
    let values = get_list(cur, |c| get_prim(c, get_i64))?;
    VectorClockVS::decode_parts(MapVS::from_parts(keys, values))
}

/// Encode a whole message list (an event buffer's contents).
pub fn put_message_list(out: &mut Vec<u8>, list: &ListVS<MessageVS>) {
    put_list(out, list, put_message);
}

pub fn get_message_list(cur: &mut Cursor<'_>) -> VsResult<ListVS<MessageVS>> {
    get_list(cur, get_message)
}
