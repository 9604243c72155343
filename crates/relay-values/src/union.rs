//! Tagged-union value summaries.

use crate::primitive::PrimitiveVS;
use crate::value::Vs;
use crate::{ValueSummary, VsError, VsResult};
use relay_solver::Guard;
use std::fmt;
use std::sync::Arc;

/// Type descriptor of a union arm: a class name plus an optional vector of
/// named fields. Descriptors compare by content, so two tags minted from
/// the same description are the same tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UnionTag(Arc<TagInfo>);

#[derive(Debug, PartialEq, Eq, Hash)]
struct TagInfo {
    name: Arc<str>,
    fields: Option<Vec<Arc<str>>>,
}

impl UnionTag {
    pub fn new(name: &str) -> Self {
        Self(Arc::new(TagInfo {
            name: Arc::from(name),
            fields: None,
        }))
    }

    pub fn with_fields(name: &str, fields: &[&str]) -> Self {
        Self(Arc::new(TagInfo {
            name: Arc::from(name),
            fields: Some(fields.iter().map(|f| Arc::from(*f)).collect()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn field_names(&self) -> Option<&[Arc<str>]> {
        self.0.fields.as_deref()
    }
}

impl fmt::Display for UnionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.fields {
            None => write!(f, "{}", self.0.name),
            Some(fields) => {
                write!(f, "{}[", self.0.name)?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A tagged sum: a tag summary plus one payload summary per live tag.
/// Distinct tags are under disjoint guards by the tag summary's own
/// invariant.
#[derive(Clone, Debug)]
pub struct UnionVS {
    tag: PrimitiveVS<UnionTag>,
    payloads: Vec<(UnionTag, Vs)>,
}

impl UnionVS {
    /// Wrap a payload under a tag; the union is defined wherever the
    /// payload is.
    pub fn new(tag: UnionTag, payload: Vs) -> Self {
        let u = payload.universe();
        Self {
            tag: PrimitiveVS::new(tag.clone()).restrict(u),
            payloads: vec![(tag, payload)],
        }
    }

    /// A payload-free arm defined under `guard`.
    pub fn unit(tag: UnionTag, guard: Guard) -> Self {
        Self {
            tag: PrimitiveVS::new(tag).restrict(guard),
            payloads: Vec::new(),
        }
    }

    pub fn tag(&self) -> &PrimitiveVS<UnionTag> {
        &self.tag
    }

    /// Guard under which this union carries `tag`.
    pub fn tag_guard(&self, tag: &UnionTag) -> Guard {
        self.tag.guard_for(tag)
    }

    /// The payload carried under `tag`, restricted to that tag's guard.
    /// Asking for a tag the union never carries is a model error.
    pub fn payload(&self, tag: &UnionTag) -> VsResult<Vs> {
        let g = self.tag_guard(tag);
        match self.payloads.iter().find(|(t, _)| t == tag) {
            Some((_, p)) => Ok(p.restrict(g)),
            None => Err(VsError::PayloadMismatch {
                expected: "payload-carrying arm",
                actual: "absent arm",
            }),
        }
    }

    pub(crate) fn from_parts(tag: PrimitiveVS<UnionTag>, payloads: Vec<(UnionTag, Vs)>) -> Self {
        Self { tag, payloads }
    }

    pub(crate) fn payloads(&self) -> &[(UnionTag, Vs)] {
        &self.payloads
    }

    fn payload_for(&self, tag: &UnionTag) -> Option<&Vs> {
        self.payloads
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, p)| p)
    }
}

impl ValueSummary for UnionVS {
    fn is_empty_vs(&self) -> bool {
        self.tag.is_empty_vs()
    }

    fn universe(&self) -> Guard {
        self.tag.universe()
    }

    fn restrict(&self, guard: Guard) -> Self {
        let tag = self.tag.restrict(guard);
        let payloads = self
            .payloads
            .iter()
            .filter(|(t, _)| !tag.guard_for(t).is_false())
            .map(|(t, p)| (t.clone(), p.restrict(guard)))
            .collect();
        Self { tag, payloads }
    }

    fn merge(&self, others: &[Self]) -> Self {
        let tags: Vec<_> = others.iter().map(|o| o.tag.clone()).collect();
        let tag = self.tag.merge(&tags);
        let mut payloads: Vec<(UnionTag, Vs)> = self.payloads.clone();
        for other in others {
            for (t, p) in &other.payloads {
                if let Some(slot) = payloads.iter_mut().find(|(mine, _)| mine == t) {
                    slot.1 = slot.1.merge_with(p);
                } else {
                    payloads.push((t.clone(), p.clone()));
                }
            }
        }
        Self { tag, payloads }
    }

    fn symbolic_equals(&self, other: &Self, pc: Guard) -> PrimitiveVS<bool> {
        let u = pc.and(self.universe()).and(other.universe());
        let mut acc = self.tag.symbolic_equals(&other.tag, u).true_guard();
        for (t, p) in &self.payloads {
            if acc.is_false() {
                break;
            }
            let both = self.tag_guard(t).and(other.tag_guard(t));
            if both.is_false() {
                continue;
            }
            match other.payload_for(t) {
                Some(q) => {
                    let eq = p.symbolic_equals(q, both).true_guard();
                    acc = acc.and(eq.or(both.not()));
                }
                None => acc = acc.and(both.not()),
            }
        }
        PrimitiveVS::from_guarded([(true, acc.and(u)), (false, u.and(acc.not()))])
    }
}
