// ── Feedbacks ──
//
// A feedback is a named, function-backed value. `fire_update` evaluates
// the function, caches the result in a `watch` channel, and pushes it to
// every linked sink. The cache is only authoritative right after a fire.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use tokio::sync::watch;

use crate::error::CoreError;
use crate::signal::{SignalKind, SignalSurface};

/// A value type that can travel over one of the three signal channels.
pub trait FeedbackValue: Clone + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const KIND: SignalKind;

    fn push_to(&self, surface: &dyn SignalSurface, join: u32);

    fn wrap(feedback: Arc<Feedback<Self>>) -> AnyFeedback;
}

impl FeedbackValue for bool {
    const KIND: SignalKind = SignalKind::Boolean;

    fn push_to(&self, surface: &dyn SignalSurface, join: u32) {
        surface.set_bool(join, *self);
    }

    fn wrap(feedback: Arc<Feedback<Self>>) -> AnyFeedback {
        AnyFeedback::Bool(feedback)
    }
}

impl FeedbackValue for u16 {
    const KIND: SignalKind = SignalKind::Numeric;

    fn push_to(&self, surface: &dyn SignalSurface, join: u32) {
        surface.set_numeric(join, *self);
    }

    fn wrap(feedback: Arc<Feedback<Self>>) -> AnyFeedback {
        AnyFeedback::Numeric(feedback)
    }
}

impl FeedbackValue for String {
    const KIND: SignalKind = SignalKind::Text;

    fn push_to(&self, surface: &dyn SignalSurface, join: u32) {
        surface.set_text(join, self);
    }

    fn wrap(feedback: Arc<Feedback<Self>>) -> AnyFeedback {
        AnyFeedback::Text(feedback)
    }
}

/// Receives every value a feedback fires.
pub type Sink<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Identity of one subscription. Linking twice with the same id replaces
/// the earlier sink instead of adding a second one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SinkId {
    pub owner: String,
    pub kind: SignalKind,
    pub join: u32,
}

impl SinkId {
    pub fn new(owner: &str, kind: SignalKind, join: u32) -> Self {
        Self {
            owner: owner.to_owned(),
            kind,
            join,
        }
    }
}

pub struct Feedback<T: FeedbackValue> {
    name: String,
    value_fn: Box<dyn Fn() -> T + Send + Sync>,
    cache: watch::Sender<T>,
    sinks: DashMap<SinkId, Sink<T>>,
}

pub type BoolFeedback = Feedback<bool>;
pub type NumericFeedback = Feedback<u16>;
pub type TextFeedback = Feedback<String>;

impl<T: FeedbackValue> Feedback<T> {
    /// `value_fn` must be cheap and side-effect free; it runs on the
    /// event path every time the feedback fires.
    pub fn new(name: impl Into<String>, value_fn: impl Fn() -> T + Send + Sync + 'static) -> Self {
        let (cache, _) = watch::channel(T::default());
        Self {
            name: name.into(),
            value_fn: Box::new(value_fn),
            cache,
            sinks: DashMap::new(),
        }
    }

    pub fn shared(
        name: impl Into<String>,
        value_fn: impl Fn() -> T + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self::new(name, value_fn))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate the value function now, without touching the cache.
    pub fn value(&self) -> T {
        (self.value_fn)()
    }

    /// The last value pushed by `fire_update`.
    pub fn cached(&self) -> T {
        self.cache.borrow().clone()
    }

    /// Re-evaluate, cache, and push to every sink.
    pub fn fire_update(&self) {
        let value = (self.value_fn)();
        self.cache.send_replace(value.clone());
        let sinks: Vec<Sink<T>> = self.sinks.iter().map(|s| Arc::clone(s.value())).collect();
        for sink in sinks {
            sink(&value);
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.cache.subscribe()
    }

    pub fn link(&self, id: SinkId, sink: Sink<T>) {
        self.sinks.insert(id, sink);
    }

    pub fn unlink(&self, id: &SinkId) -> bool {
        self.sinks.remove(id).is_some()
    }

    /// Drop every sink registered by `owner` (e.g. a bridge going away).
    pub fn unlink_owner(&self, owner: &str) {
        self.sinks.retain(|id, _| id.owner != owner);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

impl<T: FeedbackValue> fmt::Debug for Feedback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feedback")
            .field("name", &self.name)
            .field("kind", &T::KIND)
            .field("cached", &*self.cache.borrow())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

// ── AnyFeedback ──────────────────────────────────────────────────

/// A feedback of any value kind, for device-wide lists.
#[derive(Debug, Clone)]
pub enum AnyFeedback {
    Bool(Arc<BoolFeedback>),
    Numeric(Arc<NumericFeedback>),
    Text(Arc<TextFeedback>),
}

impl AnyFeedback {
    pub fn name(&self) -> &str {
        match self {
            Self::Bool(f) => f.name(),
            Self::Numeric(f) => f.name(),
            Self::Text(f) => f.name(),
        }
    }

    pub fn kind(&self) -> SignalKind {
        match self {
            Self::Bool(_) => SignalKind::Boolean,
            Self::Numeric(_) => SignalKind::Numeric,
            Self::Text(_) => SignalKind::Text,
        }
    }

    pub fn fire_update(&self) {
        match self {
            Self::Bool(f) => f.fire_update(),
            Self::Numeric(f) => f.fire_update(),
            Self::Text(f) => f.fire_update(),
        }
    }

    pub fn unlink_owner(&self, owner: &str) {
        match self {
            Self::Bool(f) => f.unlink_owner(owner),
            Self::Numeric(f) => f.unlink_owner(owner),
            Self::Text(f) => f.unlink_owner(owner),
        }
    }

    /// Cached value rendered for display.
    pub fn cached_display(&self) -> String {
        match self {
            Self::Bool(f) => f.cached().to_string(),
            Self::Numeric(f) => f.cached().to_string(),
            Self::Text(f) => f.cached(),
        }
    }

    /// Same underlying feedback instance.
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Arc::ptr_eq(a, b),
            (Self::Numeric(a), Self::Numeric(b)) => Arc::ptr_eq(a, b),
            (Self::Text(a), Self::Text(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ── FeedbackCollection ───────────────────────────────────────────

/// Ordered, name-indexed feedbacks of one value kind.
///
/// Lookup by name is strict: asking for a name that was never added is
/// a programming error and surfaces as `FeedbackNotFound`.
#[derive(Debug)]
pub struct FeedbackCollection<T: FeedbackValue> {
    items: IndexMap<String, Arc<Feedback<T>>>,
}

impl<T: FeedbackValue> FeedbackCollection<T> {
    pub fn new() -> Self {
        Self {
            items: IndexMap::new(),
        }
    }

    pub fn add(&mut self, feedback: Arc<Feedback<T>>) -> Result<(), CoreError> {
        let name = feedback.name().to_owned();
        if self.items.contains_key(&name) {
            return Err(CoreError::DuplicateFeedback { name });
        }
        self.items.insert(name, feedback);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Arc<Feedback<T>>, CoreError> {
        self.items
            .get(name)
            .ok_or_else(|| CoreError::FeedbackNotFound { name: name.into() })
    }

    /// 1-based positional lookup, matching port numbering.
    pub fn at(&self, index: u32) -> Option<&Arc<Feedback<T>>> {
        let position = usize::try_from(index.checked_sub(1)?).ok()?;
        self.items.get_index(position).map(|(_, f)| f)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Feedback<T>>> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn fire_all(&self) {
        for feedback in self.items.values() {
            feedback.fire_update();
        }
    }
}

impl<T: FeedbackValue> Default for FeedbackCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ── FeedbackList ─────────────────────────────────────────────────

/// Every feedback a device exposes, each instance listed once.
#[derive(Debug, Clone, Default)]
pub struct FeedbackList {
    items: Vec<AnyFeedback>,
}

impl FeedbackList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, feedback: AnyFeedback) {
        if !self.items.iter().any(|f| f.same_as(&feedback)) {
            self.items.push(feedback);
        }
    }

    pub fn add_one<T: FeedbackValue>(&mut self, feedback: &Arc<Feedback<T>>) {
        self.add(T::wrap(Arc::clone(feedback)));
    }

    pub fn add_collection<T: FeedbackValue>(&mut self, collection: &FeedbackCollection<T>) {
        for feedback in collection.iter() {
            self.add_one(feedback);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnyFeedback> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<AnyFeedback> {
        self.items.clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn fire_all(&self) {
        for feedback in &self.items {
            feedback.fire_update();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU16, Ordering};

    use super::*;

    fn counter_feedback(name: &str) -> (Arc<NumericFeedback>, Arc<AtomicU16>) {
        let source = Arc::new(AtomicU16::new(0));
        let read = Arc::clone(&source);
        let feedback = NumericFeedback::shared(name, move || read.load(Ordering::SeqCst));
        (feedback, source)
    }

    #[test]
    fn cache_is_stale_until_fired() {
        let (feedback, source) = counter_feedback("level");
        source.store(7, Ordering::SeqCst);

        assert_eq!(feedback.value(), 7);
        assert_eq!(feedback.cached(), 0);

        feedback.fire_update();
        assert_eq!(feedback.cached(), 7);
    }

    #[test]
    fn fire_update_pushes_to_every_sink() {
        let (feedback, source) = counter_feedback("level");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for join in [1, 2] {
            let seen = Arc::clone(&seen);
            feedback.link(
                SinkId::new("bridge", SignalKind::Numeric, join),
                Arc::new(move |v: &u16| seen.lock().unwrap().push((join, *v))),
            );
        }

        source.store(3, Ordering::SeqCst);
        feedback.fire_update();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![(1, 3), (2, 3)]);
    }

    #[test]
    fn relinking_the_same_id_replaces_the_sink() {
        let (feedback, _) = counter_feedback("level");
        let id = SinkId::new("bridge", SignalKind::Numeric, 10);

        feedback.link(id.clone(), Arc::new(|_: &u16| {}));
        feedback.link(id.clone(), Arc::new(|_: &u16| {}));
        assert_eq!(feedback.sink_count(), 1);

        assert!(feedback.unlink(&id));
        assert_eq!(feedback.sink_count(), 0);
    }

    #[test]
    fn unlink_owner_leaves_other_owners() {
        let (feedback, _) = counter_feedback("level");
        feedback.link(SinkId::new("a", SignalKind::Numeric, 1), Arc::new(|_: &u16| {}));
        feedback.link(SinkId::new("b", SignalKind::Numeric, 1), Arc::new(|_: &u16| {}));

        feedback.unlink_owner("a");
        assert_eq!(feedback.sink_count(), 1);
    }

    #[test]
    fn subscribers_observe_fired_values() {
        let feedback = TextFeedback::shared("name", || "Lobby".to_owned());
        let mut rx = feedback.subscribe();

        feedback.fire_update();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), "Lobby");
    }

    #[test]
    fn collection_lookup_fails_loudly() {
        let mut collection = FeedbackCollection::new();
        collection.add(BoolFeedback::shared("in1", || true)).unwrap();

        assert!(collection.get("in1").is_ok());
        assert!(matches!(
            collection.get("in9"),
            Err(CoreError::FeedbackNotFound { ref name }) if name == "in9"
        ));
    }

    #[test]
    fn collection_rejects_duplicate_names() {
        let mut collection = FeedbackCollection::new();
        collection.add(BoolFeedback::shared("in1", || true)).unwrap();
        let err = collection.add(BoolFeedback::shared("in1", || false)).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateFeedback { .. }));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn collection_positional_lookup_is_one_based() {
        let mut collection = FeedbackCollection::new();
        collection.add(BoolFeedback::shared("in1", || true)).unwrap();
        collection.add(BoolFeedback::shared("in2", || false)).unwrap();

        assert!(collection.at(0).is_none());
        assert_eq!(collection.at(2).unwrap().name(), "in2");
        assert!(collection.at(3).is_none());
    }

    #[test]
    fn feedback_list_keeps_each_instance_once() {
        let shared = BoolFeedback::shared("online", || true);
        let mut collection = FeedbackCollection::new();
        collection.add(Arc::clone(&shared)).unwrap();

        let mut list = FeedbackList::new();
        list.add_one(&shared);
        list.add_collection(&collection);
        list.add_one(&BoolFeedback::shared("online", || false));

        assert_eq!(list.len(), 2);
    }
}
