//! Domain identifiers (application / attempt / container / node)
//!
//! # 正規文字列
//! 起動された AM は環境変数の文字列で自分の attempt を識別するため、
//! `Display` と `FromStr` は常に互いの逆関数でなければならない。
//!
//! ## パディング
//! 数値部分のゼロ埋めは *最小* 幅。幅を超える値はそのまま出力され、
//! そのまま parse できる。
//!
//! ## 比較
//! `AttemptIdentity` は三方比較（引き算はしない）。`none` を含む比較は
//! 前提条件違反として `InvalidState` を返すので、`Ord` は実装しない。

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::LauncherError;

const APPLICATION_PREFIX: &str = "application";
const ATTEMPT_PREFIX: &str = "appattempt";
const CONTAINER_PREFIX: &str = "container";
const NONE_SENTINEL: &str = "none";

/// Identity of a submitted application: cluster start timestamp plus the
/// sequence number the resource manager assigned at submission.
///
/// Ordering is by timestamp first, then by sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId {
    cluster_timestamp: i64,
    sequence: u32,
}

impl ApplicationId {
    pub fn new(cluster_timestamp: i64, sequence: u32) -> Self {
        Self {
            cluster_timestamp,
            sequence,
        }
    }

    pub fn cluster_timestamp(&self) -> i64 {
        self.cluster_timestamp
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{APPLICATION_PREFIX}_{}_{:04}",
            self.cluster_timestamp, self.sequence
        )
    }
}

impl FromStr for ApplicationId {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('_').collect();
        match parts.as_slice() {
            [APPLICATION_PREFIX, ts, seq] => Ok(Self::new(
                parse_number(ts, s)?,
                parse_number(seq, s)?,
            )),
            _ => Err(malformed("application id", s)),
        }
    }
}

/// Identity of one attempt of one application.
///
/// The application id may be absent while the attempt is registered but not
/// yet resolved; such identities print with the `none` sentinel but cannot be
/// ordered against anything else (see [`AttemptIdentity::compare`]).
///
/// There are no setters: an identity is built once and then only copied.
/// Serializes as its canonical string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AttemptIdentity {
    application_id: Option<ApplicationId>,
    attempt_sequence: u32,
}

impl AttemptIdentity {
    pub fn new(application_id: ApplicationId, attempt_sequence: u32) -> Self {
        Self {
            application_id: Some(application_id),
            attempt_sequence,
        }
    }

    /// Attempt whose application id has not been resolved yet.
    pub fn unresolved(attempt_sequence: u32) -> Self {
        Self {
            application_id: None,
            attempt_sequence,
        }
    }

    pub fn application_id(&self) -> Option<ApplicationId> {
        self.application_id
    }

    pub fn attempt_sequence(&self) -> u32 {
        self.attempt_sequence
    }

    /// Three-way comparison on `(application_id, attempt_sequence)`.
    ///
    /// # Errors
    /// `LauncherError::InvalidState` if either identity lacks an application
    /// id. Such a comparison is a caller precondition violation, not a
    /// silently ordered case.
    pub fn compare(&self, other: &Self) -> Result<Ordering, LauncherError> {
        match (self.application_id, other.application_id) {
            (Some(mine), Some(theirs)) => Ok(mine
                .cmp(&theirs)
                .then_with(|| self.attempt_sequence.cmp(&other.attempt_sequence))),
            _ => Err(LauncherError::InvalidState(format!(
                "cannot order {self} against {other}: application id is unresolved"
            ))),
        }
    }
}

/// Partial order matching [`AttemptIdentity::compare`].
///
/// Equal identities are always `Some(Equal)`; distinct identities involving
/// the `none` sentinel are unordered.
impl PartialOrd for AttemptIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        self.compare(other).ok()
    }
}

impl fmt::Display for AttemptIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.application_id {
            Some(app) => write!(
                f,
                "{ATTEMPT_PREFIX}_{}_{:04}_{:06}",
                app.cluster_timestamp, app.sequence, self.attempt_sequence
            ),
            None => write!(
                f,
                "{ATTEMPT_PREFIX}_{NONE_SENTINEL}_{:06}",
                self.attempt_sequence
            ),
        }
    }
}

impl FromStr for AttemptIdentity {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('_').collect();
        match parts.as_slice() {
            [ATTEMPT_PREFIX, NONE_SENTINEL, attempt] => {
                Ok(Self::unresolved(parse_number(attempt, s)?))
            }
            [ATTEMPT_PREFIX, ts, seq, attempt] => Ok(Self::new(
                ApplicationId::new(parse_number(ts, s)?, parse_number(seq, s)?),
                parse_number(attempt, s)?,
            )),
            _ => Err(malformed("attempt id", s)),
        }
    }
}

impl From<AttemptIdentity> for String {
    fn from(id: AttemptIdentity) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for AttemptIdentity {
    type Error = LauncherError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Identity of an allocated container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId {
    application_id: ApplicationId,
    attempt_sequence: u32,
    sequence: u64,
}

impl ContainerId {
    pub fn new(application_id: ApplicationId, attempt_sequence: u32, sequence: u64) -> Self {
        Self {
            application_id,
            attempt_sequence,
            sequence,
        }
    }

    pub fn application_id(&self) -> ApplicationId {
        self.application_id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{CONTAINER_PREFIX}_{}_{:04}_{:02}_{:06}",
            self.application_id.cluster_timestamp,
            self.application_id.sequence,
            self.attempt_sequence,
            self.sequence
        )
    }
}

/// Address of a node agent (`host:port`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    host: String,
    port: u16,
}

impl NodeId {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeId {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| malformed("node id", s))?;
        if host.is_empty() {
            return Err(malformed("node id", s));
        }
        Ok(Self::new(host, parse_number(port, s)?))
    }
}

fn parse_number<T: FromStr>(part: &str, whole: &str) -> Result<T, LauncherError> {
    // `u32::from_str` accepts a leading '+', the canonical form never has one.
    if part.is_empty() || part.starts_with('+') {
        return Err(malformed("numeric field", whole));
    }
    part.parse().map_err(|_| malformed("numeric field", whole))
}

fn malformed(what: &str, input: &str) -> LauncherError {
    LauncherError::InvalidState(format!("malformed {what}: {input:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn attempt(ts: i64, seq: u32, attempt: u32) -> AttemptIdentity {
        AttemptIdentity::new(ApplicationId::new(ts, seq), attempt)
    }

    #[test]
    fn canonical_string_pads_sequences() {
        assert_eq!(attempt(1000, 7, 2).to_string(), "appattempt_1000_0007_000002");
    }

    #[test]
    fn unresolved_application_uses_none_sentinel() {
        let id = AttemptIdentity::unresolved(3);
        assert_eq!(id.to_string(), "appattempt_none_000003");
        assert_eq!(id.to_string().parse::<AttemptIdentity>().unwrap(), id);
    }

    #[test]
    fn padding_is_a_minimum_width() {
        let id = attempt(1, 123_456, 7_654_321);
        assert_eq!(id.to_string(), "appattempt_1_123456_7654321");
        assert_eq!(id.to_string().parse::<AttemptIdentity>().unwrap(), id);
    }

    #[rstest]
    #[case::wrong_prefix("attempt_1000_0007_000002")]
    #[case::missing_part("appattempt_1000_0007")]
    #[case::extra_part("appattempt_1000_0007_000002_1")]
    #[case::not_a_number("appattempt_1000_abcd_000002")]
    #[case::signed("appattempt_1000_+007_000002")]
    #[case::empty_field("appattempt_1000__000002")]
    #[case::empty("")]
    fn rejects_malformed_attempt_strings(#[case] input: &str) {
        let err = input.parse::<AttemptIdentity>().unwrap_err();
        assert!(matches!(err, LauncherError::InvalidState(_)));
    }

    #[test]
    fn compares_application_before_attempt() {
        let a = attempt(1000, 7, 9);
        let b = attempt(1000, 8, 1);
        assert_eq!(a.compare(&b).unwrap(), Ordering::Less);
        assert_eq!(b.compare(&a).unwrap(), Ordering::Greater);
        assert_eq!(a.compare(&a).unwrap(), Ordering::Equal);
        assert!(a < b);
    }

    #[test]
    fn extreme_attempt_sequences_do_not_invert_order() {
        let low = attempt(1, 1, 0);
        let high = attempt(1, 1, u32::MAX);
        assert_eq!(low.compare(&high).unwrap(), Ordering::Less);
        assert_eq!(high.compare(&low).unwrap(), Ordering::Greater);
    }

    #[test]
    fn comparing_unresolved_identity_is_invalid_state() {
        let resolved = attempt(1000, 7, 1);
        let unresolved = AttemptIdentity::unresolved(1);

        assert!(matches!(
            unresolved.compare(&resolved),
            Err(LauncherError::InvalidState(_))
        ));
        assert!(matches!(
            unresolved.compare(&unresolved),
            Err(LauncherError::InvalidState(_))
        ));
        assert_eq!(resolved.partial_cmp(&unresolved), None);
        assert_eq!(unresolved.partial_cmp(&unresolved), Some(Ordering::Equal));
    }

    #[test]
    fn application_and_container_ids_render_canonically() {
        let app = ApplicationId::new(1000, 7);
        assert_eq!(app.to_string(), "application_1000_0007");
        assert_eq!("application_1000_0007".parse::<ApplicationId>().unwrap(), app);

        let container = ContainerId::new(app, 2, 1);
        assert_eq!(container.to_string(), "container_1000_0007_02_000001");
    }

    #[test]
    fn attempt_serializes_as_canonical_string() {
        let id = attempt(1000, 7, 2);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"appattempt_1000_0007_000002\"");
        assert_eq!(serde_json::from_str::<AttemptIdentity>(&json).unwrap(), id);
    }

    #[test]
    fn node_id_parses_host_and_port() {
        let node: NodeId = "h1:1234".parse().unwrap();
        assert_eq!(node, NodeId::new("h1", 1234));
        assert!("h1".parse::<NodeId>().is_err());
        assert!(":1234".parse::<NodeId>().is_err());
    }

    fn any_attempt() -> impl Strategy<Value = AttemptIdentity> {
        (any::<i64>(), any::<u32>(), any::<u32>())
            .prop_map(|(ts, seq, att)| AttemptIdentity::new(ApplicationId::new(ts, seq), att))
    }

    fn small_attempt() -> impl Strategy<Value = AttemptIdentity> {
        (0i64..3, 0u32..3, 0u32..3)
            .prop_map(|(ts, seq, att)| AttemptIdentity::new(ApplicationId::new(ts, seq), att))
    }

    proptest! {
        #[test]
        fn canonical_string_roundtrips(id in any_attempt()) {
            let parsed: AttemptIdentity = id.to_string().parse().unwrap();
            prop_assert_eq!(parsed, id);
        }

        #[test]
        fn compare_is_consistent_with_equality(a in small_attempt(), b in small_attempt()) {
            let ord = a.compare(&b).unwrap();
            prop_assert_eq!(ord == Ordering::Equal, a == b);
            prop_assert_eq!(b.compare(&a).unwrap(), ord.reverse());
        }

        #[test]
        fn compare_is_transitive(a in small_attempt(), b in small_attempt(), c in small_attempt()) {
            let ab = a.compare(&b).unwrap();
            let bc = b.compare(&c).unwrap();
            if ab != Ordering::Greater && bc != Ordering::Greater {
                prop_assert_ne!(a.compare(&c).unwrap(), Ordering::Greater);
            }
        }
    }
}
