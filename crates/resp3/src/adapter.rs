//! Response adapters.
//!
//! An adapter is a sink for parse events that projects the pre-order event
//! stream of one reply into a caller-supplied container.  [`adapt`] selects
//! the right adapter from the container type: scalars take a single simple
//! element, `Option` additionally accepts null, flat containers take one
//! aggregate of depth 1, and [`Tree`] retains the whole pre-order view.
//!
//! Projection failures are reported through the `Result` returned by
//! [`Adapter::on_event`]; the parser forwards them to its caller.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, LinkedList, VecDeque};
use std::hash::Hash;

use bytes::Bytes;

use crate::error::Error;
use crate::kind::DataKind;
use crate::node::{Node, Tree};

/// One parse event: a transient, borrowed view of a reply element.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    pub kind: DataKind,
    /// Declared child count for aggregates; 1 for simples.
    pub aggregate_size: usize,
    /// Depth in the reply tree; 0 at the root.
    pub depth: usize,
    /// Raw payload bytes; empty for aggregate headers.
    pub payload: &'a [u8],
}

/// A sink for the parse events of one reply.
pub trait Adapter {
    fn on_event(&mut self, event: Event<'_>) -> Result<(), Error>;
}

/// Server-reported errors short-circuit scalar-projecting adapters.
fn check_server_error(event: &Event<'_>) -> Result<(), Error> {
    match event.kind {
        DataKind::SimpleError | DataKind::BlobError => Err(Error::Server(event.payload.to_vec())),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Payload scalar parsing
// ---------------------------------------------------------------------------

/// A scalar parsed out of one simple element's payload.
pub trait FromPayload: Sized {
    fn from_payload(payload: &[u8]) -> Result<Self, Error>;
}

fn payload_str(payload: &[u8]) -> Result<&str, Error> {
    std::str::from_utf8(payload)
        .map_err(|_| Error::UnexpectedType("payload is not valid UTF-8".to_owned()))
}

impl FromPayload for String {
    fn from_payload(payload: &[u8]) -> Result<String, Error> {
        Ok(payload_str(payload)?.to_owned())
    }
}

impl FromPayload for Bytes {
    fn from_payload(payload: &[u8]) -> Result<Bytes, Error> {
        Ok(Bytes::copy_from_slice(payload))
    }
}

impl FromPayload for bool {
    fn from_payload(payload: &[u8]) -> Result<bool, Error> {
        match payload {
            b"t" => Ok(true),
            b"f" => Ok(false),
            other => Err(Error::UnexpectedType(format!(
                "expected boolean t/f, got {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

macro_rules! impl_from_payload_parse {
    ($($t:ty),*) => {$(
        impl FromPayload for $t {
            fn from_payload(payload: &[u8]) -> Result<$t, Error> {
                payload_str(payload)?.parse().map_err(|_| {
                    Error::UnexpectedType(format!(
                        concat!("cannot parse {:?} as ", stringify!($t)),
                        String::from_utf8_lossy(payload)
                    ))
                })
            }
        }
    )*};
}

impl_from_payload_parse!(i16, i32, i64, i128, isize, u16, u32, u64, u128, usize, f32, f64);

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Accepts anything; retains nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ignore;

impl Adapter for Ignore {
    fn on_event(&mut self, _event: Event<'_>) -> Result<(), Error> {
        Ok(())
    }
}

/// Projects a single simple element at depth 0 into a scalar.
#[derive(Debug)]
pub struct SimpleAdapter<'a, T> {
    out: &'a mut T,
}

impl<'a, T> SimpleAdapter<'a, T> {
    pub fn new(out: &'a mut T) -> Self {
        SimpleAdapter { out }
    }
}

impl<T: FromPayload> Adapter for SimpleAdapter<'_, T> {
    fn on_event(&mut self, event: Event<'_>) -> Result<(), Error> {
        check_server_error(&event)?;
        if event.kind.is_aggregate() {
            return Err(Error::ExpectsSimple(event.kind));
        }
        if event.depth != 0 {
            return Err(Error::NestedUnsupported);
        }
        *self.out = T::from_payload(event.payload)?;
        Ok(())
    }
}

/// As [`SimpleAdapter`], but a null reply leaves the option empty.
#[derive(Debug)]
pub struct OptionalAdapter<'a, T> {
    out: &'a mut Option<T>,
}

impl<'a, T> OptionalAdapter<'a, T> {
    pub fn new(out: &'a mut Option<T>) -> Self {
        OptionalAdapter { out }
    }
}

impl<T: FromPayload> Adapter for OptionalAdapter<'_, T> {
    fn on_event(&mut self, event: Event<'_>) -> Result<(), Error> {
        check_server_error(&event)?;
        if event.kind.is_aggregate() {
            return Err(Error::ExpectsSimple(event.kind));
        }
        if event.depth != 0 {
            return Err(Error::NestedUnsupported);
        }
        if event.kind == DataKind::Null {
            return Ok(());
        }
        *self.out = Some(T::from_payload(event.payload)?);
        Ok(())
    }
}

/// Projects a flat aggregate into a random-access sequence, resized up
/// front from the declared size.
#[derive(Debug)]
pub struct SeqAdapter<'a, T> {
    out: &'a mut Vec<T>,
    next: usize,
    started: bool,
}

impl<'a, T> SeqAdapter<'a, T> {
    pub fn new(out: &'a mut Vec<T>) -> Self {
        SeqAdapter {
            out,
            next: 0,
            started: false,
        }
    }
}

impl<T: FromPayload + Default> Adapter for SeqAdapter<'_, T> {
    fn on_event(&mut self, event: Event<'_>) -> Result<(), Error> {
        check_server_error(&event)?;
        if event.kind.is_aggregate() {
            if event.depth != 0 || self.started {
                return Err(Error::NestedUnsupported);
            }
            self.started = true;
            self.out.clear();
            self.out.resize_with(
                event.kind.element_multiplicity() * event.aggregate_size,
                T::default,
            );
            return Ok(());
        }
        if event.depth != 1 {
            return Err(Error::NestedUnsupported);
        }
        let slot = self
            .out
            .get_mut(self.next)
            .ok_or_else(|| Error::UnexpectedType("more elements than declared".to_owned()))?;
        *slot = T::from_payload(event.payload)?;
        self.next += 1;
        Ok(())
    }
}

/// An append-only sequence, for containers without random access.
pub trait Sequence {
    type Item;
    fn push_item(&mut self, item: Self::Item);
}

impl<T> Sequence for VecDeque<T> {
    type Item = T;
    fn push_item(&mut self, item: T) {
        self.push_back(item);
    }
}

impl<T> Sequence for LinkedList<T> {
    type Item = T;
    fn push_item(&mut self, item: T) {
        self.push_back(item);
    }
}

/// Projects a flat aggregate by appending parsed elements.
#[derive(Debug)]
pub struct ListAdapter<'a, C> {
    out: &'a mut C,
}

impl<'a, C> ListAdapter<'a, C> {
    pub fn new(out: &'a mut C) -> Self {
        ListAdapter { out }
    }
}

impl<C> Adapter for ListAdapter<'_, C>
where
    C: Sequence,
    C::Item: FromPayload,
{
    fn on_event(&mut self, event: Event<'_>) -> Result<(), Error> {
        check_server_error(&event)?;
        if event.kind.is_aggregate() {
            if event.depth != 0 {
                return Err(Error::NestedUnsupported);
            }
            return Ok(());
        }
        if event.depth != 1 {
            return Err(Error::NestedUnsupported);
        }
        self.out.push_item(C::Item::from_payload(event.payload)?);
        Ok(())
    }
}

/// A set of parsed keys.
pub trait KeySet {
    type Key;
    fn insert_key(&mut self, key: Self::Key);
}

impl<K: Ord> KeySet for BTreeSet<K> {
    type Key = K;
    fn insert_key(&mut self, key: K) {
        self.insert(key);
    }
}

impl<K: Eq + Hash> KeySet for HashSet<K> {
    type Key = K;
    fn insert_key(&mut self, key: K) {
        self.insert(key);
    }
}

/// Projects a set aggregate into a key container.
#[derive(Debug)]
pub struct SetAdapter<'a, C> {
    out: &'a mut C,
}

impl<'a, C> SetAdapter<'a, C> {
    pub fn new(out: &'a mut C) -> Self {
        SetAdapter { out }
    }
}

impl<C> Adapter for SetAdapter<'_, C>
where
    C: KeySet,
    C::Key: FromPayload,
{
    fn on_event(&mut self, event: Event<'_>) -> Result<(), Error> {
        check_server_error(&event)?;
        if event.kind.is_aggregate() {
            if event.depth != 0 {
                return Err(Error::NestedUnsupported);
            }
            if event.kind != DataKind::Set {
                return Err(Error::UnexpectedType(format!(
                    "expected a set reply, got {}",
                    event.kind
                )));
            }
            return Ok(());
        }
        if event.depth != 1 {
            return Err(Error::NestedUnsupported);
        }
        self.out.insert_key(C::Key::from_payload(event.payload)?);
        Ok(())
    }
}

/// A map of parsed key/value pairs.
pub trait KeyValueMap {
    type Key;
    type Value;
    fn insert_pair(&mut self, key: Self::Key, value: Self::Value);
}

impl<K: Ord, V> KeyValueMap for BTreeMap<K, V> {
    type Key = K;
    type Value = V;
    fn insert_pair(&mut self, key: K, value: V) {
        self.insert(key, value);
    }
}

impl<K: Eq + Hash, V> KeyValueMap for HashMap<K, V> {
    type Key = K;
    type Value = V;
    fn insert_pair(&mut self, key: K, value: V) {
        self.insert(key, value);
    }
}

/// Projects a map aggregate into a key/value container; children alternate
/// key then value.
#[derive(Debug)]
pub struct MapAdapter<'a, C: KeyValueMap> {
    out: &'a mut C,
    pending_key: Option<C::Key>,
}

impl<'a, C: KeyValueMap> MapAdapter<'a, C> {
    pub fn new(out: &'a mut C) -> Self {
        MapAdapter {
            out,
            pending_key: None,
        }
    }
}

impl<C> Adapter for MapAdapter<'_, C>
where
    C: KeyValueMap,
    C::Key: FromPayload,
    C::Value: FromPayload,
{
    fn on_event(&mut self, event: Event<'_>) -> Result<(), Error> {
        check_server_error(&event)?;
        if event.kind.is_aggregate() {
            if event.depth != 0 {
                return Err(Error::NestedUnsupported);
            }
            if event.kind != DataKind::Map {
                return Err(Error::UnexpectedType(format!(
                    "expected a map reply, got {}",
                    event.kind
                )));
            }
            return Ok(());
        }
        if event.depth != 1 {
            return Err(Error::NestedUnsupported);
        }
        match self.pending_key.take() {
            None => self.pending_key = Some(C::Key::from_payload(event.payload)?),
            Some(key) => {
                let value = C::Value::from_payload(event.payload)?;
                self.out.insert_pair(key, value);
            }
        }
        Ok(())
    }
}

/// Retains every event as a [`Node`], in pre-order.  Accepts any depth.
#[derive(Debug)]
pub struct NodesAdapter<'a> {
    out: &'a mut Vec<Node>,
}

impl<'a> NodesAdapter<'a> {
    pub fn new(out: &'a mut Vec<Node>) -> Self {
        NodesAdapter { out }
    }
}

impl Adapter for NodesAdapter<'_> {
    fn on_event(&mut self, event: Event<'_>) -> Result<(), Error> {
        self.out.push(Node {
            kind: event.kind,
            aggregate_size: event.aggregate_size,
            depth: event.depth,
            value: event.payload.to_vec(),
        });
        Ok(())
    }
}

/// Overwrites a single [`Node`] with each event; ends up holding the last.
#[derive(Debug)]
pub struct NodeAdapter<'a> {
    out: &'a mut Node,
}

impl<'a> NodeAdapter<'a> {
    pub fn new(out: &'a mut Node) -> Self {
        NodeAdapter { out }
    }
}

impl Adapter for NodeAdapter<'_> {
    fn on_event(&mut self, event: Event<'_>) -> Result<(), Error> {
        self.out.kind = event.kind;
        self.out.aggregate_size = event.aggregate_size;
        self.out.depth = event.depth;
        self.out.value = event.payload.to_vec();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Container-driven selection
// ---------------------------------------------------------------------------

/// Selects the adapter matching a response container type.
pub trait Adapt {
    type Adapter<'a>: Adapter
    where
        Self: 'a;
    fn adapt(&mut self) -> Self::Adapter<'_>;
}

/// Returns the adapter for `out`, chosen from its type.
pub fn adapt<T: Adapt>(out: &mut T) -> T::Adapter<'_> {
    out.adapt()
}

impl Adapt for () {
    type Adapter<'a> = Ignore;
    fn adapt(&mut self) -> Ignore {
        Ignore
    }
}

macro_rules! impl_adapt_scalar {
    ($($t:ty),*) => {$(
        impl Adapt for $t {
            type Adapter<'a>
                = SimpleAdapter<'a, $t>
            where
                Self: 'a;
            fn adapt(&mut self) -> Self::Adapter<'_> {
                SimpleAdapter::new(self)
            }
        }
    )*};
}

impl_adapt_scalar!(
    String, Bytes, bool, i16, i32, i64, i128, isize, u16, u32, u64, u128, usize, f32, f64
);

impl<T: FromPayload> Adapt for Option<T> {
    type Adapter<'a>
        = OptionalAdapter<'a, T>
    where
        Self: 'a;
    fn adapt(&mut self) -> Self::Adapter<'_> {
        OptionalAdapter::new(self)
    }
}

impl<T: FromPayload + Default> Adapt for Vec<T> {
    type Adapter<'a>
        = SeqAdapter<'a, T>
    where
        Self: 'a;
    fn adapt(&mut self) -> Self::Adapter<'_> {
        SeqAdapter::new(self)
    }
}

impl<T: FromPayload> Adapt for VecDeque<T> {
    type Adapter<'a>
        = ListAdapter<'a, VecDeque<T>>
    where
        Self: 'a;
    fn adapt(&mut self) -> Self::Adapter<'_> {
        ListAdapter::new(self)
    }
}

impl<T: FromPayload> Adapt for LinkedList<T> {
    type Adapter<'a>
        = ListAdapter<'a, LinkedList<T>>
    where
        Self: 'a;
    fn adapt(&mut self) -> Self::Adapter<'_> {
        ListAdapter::new(self)
    }
}

impl<K: FromPayload + Ord> Adapt for BTreeSet<K> {
    type Adapter<'a>
        = SetAdapter<'a, BTreeSet<K>>
    where
        Self: 'a;
    fn adapt(&mut self) -> Self::Adapter<'_> {
        SetAdapter::new(self)
    }
}

impl<K: FromPayload + Eq + Hash> Adapt for HashSet<K> {
    type Adapter<'a>
        = SetAdapter<'a, HashSet<K>>
    where
        Self: 'a;
    fn adapt(&mut self) -> Self::Adapter<'_> {
        SetAdapter::new(self)
    }
}

impl<K: FromPayload + Ord, V: FromPayload> Adapt for BTreeMap<K, V> {
    type Adapter<'a>
        = MapAdapter<'a, BTreeMap<K, V>>
    where
        Self: 'a;
    fn adapt(&mut self) -> Self::Adapter<'_> {
        MapAdapter::new(self)
    }
}

impl<K: FromPayload + Eq + Hash, V: FromPayload> Adapt for HashMap<K, V> {
    type Adapter<'a>
        = MapAdapter<'a, HashMap<K, V>>
    where
        Self: 'a;
    fn adapt(&mut self) -> Self::Adapter<'_> {
        MapAdapter::new(self)
    }
}

impl Adapt for Tree {
    type Adapter<'a>
        = NodesAdapter<'a>
    where
        Self: 'a;
    fn adapt(&mut self) -> Self::Adapter<'_> {
        NodesAdapter::new(self.nodes_mut())
    }
}

impl Adapt for Node {
    type Adapter<'a>
        = NodeAdapter<'a>
    where
        Self: 'a;
    fn adapt(&mut self) -> Self::Adapter<'_> {
        NodeAdapter::new(self)
    }
}

/// Re-delivers a stored node sequence through the container's adapter.
///
/// Used to project buffered replies (and pushes) after the fact.
pub fn replay<T: Adapt>(out: &mut T, nodes: &[Node]) -> Result<(), Error> {
    let mut adapter = out.adapt();
    for node in nodes {
        adapter.on_event(Event {
            kind: node.kind,
            aggregate_size: node.aggregate_size,
            depth: node.depth,
            payload: &node.value,
        })?;
    }
    Ok(())
}
