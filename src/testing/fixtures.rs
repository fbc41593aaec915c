//! Pre-built datasets for conversion tests.

use crate::record::Postcard;
use crate::schema::{EnumTable, Schema};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Event category, mapped from its text form through [`EVENT_KINDS`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[default]
    View,
    Click,
    Purchase,
}

/// Text forms accepted for [`EventKind`].
pub static EVENT_KINDS: LazyLock<EnumTable<EventKind>> = LazyLock::new(|| {
    EnumTable::new([
        ("view", EventKind::View),
        ("click", EventKind::Click),
        ("purchase", EventKind::Purchase),
    ])
});

/// A typical clickstream row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleEvent {
    pub id: i64,
    pub user: String,
    pub kind: EventKind,
    pub score: f64,
    pub active: bool,
}

impl SampleEvent {
    /// The row as `id \t user \t kind \t score \t active`.
    #[must_use]
    pub fn to_tsv(&self) -> String {
        let kind = match self.kind {
            EventKind::View => "view",
            EventKind::Click => "click",
            EventKind::Purchase => "purchase",
        };
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.id, self.user, kind, self.score, self.active
        )
    }
}

/// Five events covering every [`EventKind`] and both `active` values.
///
/// ```
/// use tsvdump::testing::sample_events;
///
/// let events = sample_events();
/// assert_eq!(events.len(), 5);
/// ```
#[must_use]
pub fn sample_events() -> Vec<SampleEvent> {
    vec![
        SampleEvent {
            id: 1,
            user: "alice".to_string(),
            kind: EventKind::View,
            score: 0.5,
            active: true,
        },
        SampleEvent {
            id: 2,
            user: "bob".to_string(),
            kind: EventKind::Click,
            score: 1.25,
            active: false,
        },
        SampleEvent {
            id: 3,
            user: "alice".to_string(),
            kind: EventKind::Purchase,
            score: 99.0,
            active: true,
        },
        SampleEvent {
            id: -4,
            user: "carol".to_string(),
            kind: EventKind::View,
            score: -3.5,
            active: false,
        },
        SampleEvent {
            id: 5,
            user: "dave".to_string(),
            kind: EventKind::Click,
            score: 0.0,
            active: true,
        },
    ]
}

/// [`sample_events`] wrapped as records.
#[must_use]
pub fn sample_records() -> Vec<Postcard<SampleEvent>> {
    sample_events().into_iter().map(Postcard).collect()
}

/// [`sample_events`] rendered as TSV lines, without newlines.
#[must_use]
pub fn sample_event_lines() -> Vec<String> {
    sample_events().iter().map(SampleEvent::to_tsv).collect()
}

/// Schema decoding the columns produced by [`SampleEvent::to_tsv`].
///
/// `kind` and `id` are required; the other columns are optional.
#[must_use]
pub fn sample_event_schema() -> Schema<Postcard<SampleEvent>> {
    Schema::new()
        .required("id", |e: &mut Postcard<SampleEvent>, v: i64| e.id = v)
        .optional("user", |e: &mut Postcard<SampleEvent>, v: String| e.user = v)
        .required_enum("kind", &EVENT_KINDS, |e: &mut Postcard<SampleEvent>, v| e.kind = v)
        .optional("score", |e: &mut Postcard<SampleEvent>, v: f64| e.score = v)
        .optional("active", |e: &mut Postcard<SampleEvent>, v: bool| e.active = v)
}

/// `count` deterministic events with user names of varying width, for
/// rotation and volume tests.
#[must_use]
pub fn generated_events(count: usize) -> Vec<SampleEvent> {
    (0..count)
        .map(|i| SampleEvent {
            id: i as i64,
            user: format!("user_{}", "x".repeat(i % 13)),
            kind: match i % 3 {
                0 => EventKind::View,
                1 => EventKind::Click,
                _ => EventKind::Purchase,
            },
            score: (i % 100) as f64 / 4.0,
            active: i % 2 == 0,
        })
        .collect()
}
