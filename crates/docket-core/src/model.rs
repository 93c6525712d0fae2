use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Engine-wide millisecond timestamp.
///
/// The engine never reads a wall clock; hosts supply `now` on every entry
/// point, which is what lets the test suites run on virtual time.
pub type Millis = i64;

/// The two representations a unit of operator attention can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Proposal,
    Review,
}

impl ItemKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Proposal => "proposal",
            Self::Review => "review",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proposal" => Ok(Self::Proposal),
            "review" => Ok(Self::Review),
            _ => Err(ParseEnumError {
                expected: "item kind",
                got: s.to_string(),
            }),
        }
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {expected}: '{got}'")]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

/// An AI-proposed action awaiting operator review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Proposal {
    pub id: u64,
    pub case_id: u64,
    pub case_name: String,
    pub proposed_action: String,
    pub summary: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for Proposal {
    fn default() -> Self {
        Self {
            id: 0,
            case_id: 0,
            case_name: String::new(),
            proposed_action: String::new(),
            summary: None,
            updated_at: None,
        }
    }
}

/// A case escalated for full manual review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewCase {
    pub id: u64,
    pub case_id: u64,
    pub case_name: String,
    pub status: String,
    pub agency: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for ReviewCase {
    fn default() -> Self {
        Self {
            id: 0,
            case_id: 0,
            case_name: String::new(),
            status: String::new(),
            agency: None,
            updated_at: None,
        }
    }
}

/// A unit of operator attention: either a proposal or a review case.
///
/// The same backend case can surface as both representations during state
/// races, so queue and exclusion logic only ever operates on [`ItemKey`] and
/// [`WorkItem::case_id`], never on variant-specific fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WorkItem {
    Proposal(Proposal),
    Review(ReviewCase),
}

impl WorkItem {
    /// Identity key for this item: `(variant, id)`.
    #[must_use]
    pub const fn key(&self) -> ItemKey {
        match self {
            Self::Proposal(p) => ItemKey {
                kind: ItemKind::Proposal,
                id: p.id,
            },
            Self::Review(r) => ItemKey {
                kind: ItemKind::Review,
                id: r.id,
            },
        }
    }

    /// The owning case id, present on both variants.
    #[must_use]
    pub const fn case_id(&self) -> u64 {
        match self {
            Self::Proposal(p) => p.case_id,
            Self::Review(r) => r.case_id,
        }
    }

    /// Which variant this item is.
    #[must_use]
    pub const fn kind(&self) -> ItemKind {
        match self {
            Self::Proposal(_) => ItemKind::Proposal,
            Self::Review(_) => ItemKind::Review,
        }
    }

    /// Human-facing case name.
    #[must_use]
    pub fn case_name(&self) -> &str {
        match self {
            Self::Proposal(p) => &p.case_name,
            Self::Review(r) => &r.case_name,
        }
    }

    /// Most recent backend update timestamp if the snapshot carried one.
    #[must_use]
    pub const fn updated_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Proposal(p) => p.updated_at,
            Self::Review(r) => r.updated_at,
        }
    }
}

/// Identity key shared by all queue and exclusion logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub kind: ItemKind,
    pub id: u64,
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A member of the exclusion set.
///
/// `Case(n)` is the alternate identity a case takes when it flips between
/// proposal and review representation: excluding an item always inserts its
/// own key *and* its case key, so acting on one representation suppresses
/// the other until reconciliation proves it gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExcludeKey {
    Item(ItemKey),
    Case(u64),
}

impl fmt::Display for ExcludeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item(key) => write!(f, "{key}"),
            Self::Case(case_id) => write!(f, "case:{case_id}"),
        }
    }
}

/// The complete, point-in-time result of one poll against the backend.
///
/// Every poll replaces the prior snapshot wholesale; there is no delta form.
/// The reconciler must always compare against the newest snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub proposals: Vec<Proposal>,
    pub reviews: Vec<ReviewCase>,
    pub open_requests: u32,
    pub pending_reviews: u32,
}

impl Snapshot {
    /// Total number of items across both sections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.proposals.len() + self.reviews.len()
    }

    /// True when the snapshot carries no items at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty() && self.reviews.is_empty()
    }

    /// Whether any item in the snapshot has exactly this identity key.
    #[must_use]
    pub fn contains_key(&self, key: ItemKey) -> bool {
        match key.kind {
            ItemKind::Proposal => self.proposals.iter().any(|p| p.id == key.id),
            ItemKind::Review => self.reviews.iter().any(|r| r.id == key.id),
        }
    }

    /// Whether any item in the snapshot, in either section, carries this case id.
    #[must_use]
    pub fn contains_case(&self, case_id: u64) -> bool {
        self.proposals.iter().any(|p| p.case_id == case_id)
            || self.reviews.iter().any(|r| r.case_id == case_id)
    }
}

/// The closed set of push-invalidation categories.
///
/// Signal payloads carry no state and are never trusted; any recognized
/// category merely requests a fresh poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    ProposalChanged,
    CaseChanged,
    MessageReceived,
    RunStatusChanged,
}

impl SignalKind {
    /// All recognized categories, in subscription order.
    pub const ALL: [Self; 4] = [
        Self::ProposalChanged,
        Self::CaseChanged,
        Self::MessageReceived,
        Self::RunStatusChanged,
    ];

    const fn as_str(self) -> &'static str {
        match self {
            Self::ProposalChanged => "proposal_changed",
            Self::CaseChanged => "case_changed",
            Self::MessageReceived => "message_received",
            Self::RunStatusChanged => "run_status_changed",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proposal_changed" => Ok(Self::ProposalChanged),
            "case_changed" => Ok(Self::CaseChanged),
            "message_received" => Ok(Self::MessageReceived),
            "run_status_changed" => Ok(Self::RunStatusChanged),
            _ => Err(ParseEnumError {
                expected: "signal kind",
                got: s.to_string(),
            }),
        }
    }
}

/// Push-channel liveness, independent of snapshot freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionState {
    pub connected: bool,
}

/// Operator decision kinds the backend knows how to apply.
///
/// The engine never interprets these; they are routed opaquely to the
/// backend mutation the host binds them to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Approve,
    Adjust,
    Dismiss,
    Withdraw,
}

impl ActionKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Adjust => "adjust",
            Self::Dismiss => "dismiss",
            Self::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "adjust" => Ok(Self::Adjust),
            "dismiss" => Ok(Self::Dismiss),
            "withdraw" => Ok(Self::Withdraw),
            _ => Err(ParseEnumError {
                expected: "action kind",
                got: s.to_string(),
            }),
        }
    }
}

/// The backend operation bound into a staged or immediate operator action.
///
/// `params` is opaque to the engine (adjustment payloads, dismissal reasons)
/// and is forwarded to the host's mutation call untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRef {
    pub kind: ActionKind,
    pub item: ItemKey,
    pub case_id: u64,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ActionRef {
    /// Bind an action kind to a concrete work item with no extra params.
    #[must_use]
    pub fn new(kind: ActionKind, item: &WorkItem) -> Self {
        Self {
            kind,
            item: item.key(),
            case_id: item.case_id(),
            params: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExcludeKey, ItemKey, ItemKind, Proposal, ReviewCase, SignalKind, Snapshot, WorkItem};
    use std::str::FromStr;

    fn proposal(id: u64, case_id: u64) -> Proposal {
        Proposal {
            id,
            case_id,
            case_name: format!("Case {case_id}"),
            proposed_action: "send_followup".to_string(),
            ..Proposal::default()
        }
    }

    fn review(id: u64, case_id: u64) -> ReviewCase {
        ReviewCase {
            id,
            case_id,
            case_name: format!("Case {case_id}"),
            status: "needs_review".to_string(),
            ..ReviewCase::default()
        }
    }

    #[test]
    fn enum_json_roundtrips() {
        assert_eq!(
            serde_json::to_string(&ItemKind::Proposal).expect("serialize"),
            "\"proposal\""
        );
        assert_eq!(
            serde_json::to_string(&SignalKind::RunStatusChanged).expect("serialize"),
            "\"run_status_changed\""
        );
        assert_eq!(
            serde_json::from_str::<ItemKind>("\"review\"").expect("parse"),
            ItemKind::Review
        );
        assert_eq!(
            serde_json::from_str::<SignalKind>("\"case_changed\"").expect("parse"),
            SignalKind::CaseChanged
        );
    }

    #[test]
    fn display_parse_roundtrips() {
        for kind in [ItemKind::Proposal, ItemKind::Review] {
            assert_eq!(ItemKind::from_str(&kind.to_string()).expect("reparse"), kind);
        }
        for signal in SignalKind::ALL {
            assert_eq!(
                SignalKind::from_str(&signal.to_string()).expect("reparse"),
                signal
            );
        }
        assert!(ItemKind::from_str("case").is_err());
        assert!(SignalKind::from_str("everything_changed").is_err());
    }

    #[test]
    fn work_item_key_carries_variant() {
        let p = WorkItem::Proposal(proposal(7, 42));
        let r = WorkItem::Review(review(7, 42));

        assert_eq!(
            p.key(),
            ItemKey {
                kind: ItemKind::Proposal,
                id: 7
            }
        );
        assert_eq!(
            r.key(),
            ItemKey {
                kind: ItemKind::Review,
                id: 7
            }
        );
        // Same numeric id, different variants: distinct keys.
        assert_ne!(p.key(), r.key());
        assert_eq!(p.case_id(), r.case_id());
    }

    #[test]
    fn exclude_key_display_is_stable() {
        let item = ExcludeKey::Item(ItemKey {
            kind: ItemKind::Review,
            id: 3,
        });
        assert_eq!(item.to_string(), "review:3");
        assert_eq!(ExcludeKey::Case(42).to_string(), "case:42");
    }

    #[test]
    fn snapshot_lookup_spans_both_sections() {
        let snapshot = Snapshot {
            proposals: vec![proposal(1, 10)],
            reviews: vec![review(2, 20)],
            open_requests: 2,
            pending_reviews: 1,
        };

        assert!(snapshot.contains_key(ItemKey {
            kind: ItemKind::Proposal,
            id: 1
        }));
        assert!(!snapshot.contains_key(ItemKey {
            kind: ItemKind::Review,
            id: 1
        }));
        assert!(snapshot.contains_case(10));
        assert!(snapshot.contains_case(20));
        assert!(!snapshot.contains_case(30));
        assert_eq!(snapshot.len(), 2);
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn snapshot_json_defaults_missing_sections() {
        let snapshot: Snapshot =
            serde_json::from_str(r#"{"open_requests": 4}"#).expect("parse partial snapshot");
        assert!(snapshot.proposals.is_empty());
        assert!(snapshot.reviews.is_empty());
        assert_eq!(snapshot.open_requests, 4);
        assert_eq!(snapshot.pending_reviews, 0);
    }

    #[test]
    fn work_item_json_is_tagged_by_kind() {
        let item = WorkItem::Review(review(5, 50));
        let json = serde_json::to_value(&item).expect("serialize");
        assert_eq!(json["kind"], "review");
        let back: WorkItem = serde_json::from_value(json).expect("parse");
        assert_eq!(back, item);
    }
}
