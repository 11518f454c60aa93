//! Topic and subtopic id parsing
//!
//! Topics are numbered `t<n>`, subtopics `t<n>.<m>` where `<n>` is the
//! parent's number.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

static TOPIC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^t([0-9]+)$").expect("static regex"));
static SUBTOPIC_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^t([0-9]+)\.([0-9]+)$").expect("static regex"));

/// Parsed `t<n>` id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopicId(pub u32);

impl FromStr for TopicId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = TOPIC_ID
            .captures(s)
            .ok_or_else(|| IdError(s.to_string()))?;
        let n = caps[1].parse().map_err(|_| IdError(s.to_string()))?;
        Ok(Self(n))
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Parsed `t<n>.<m>` id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubtopicId {
    /// Parent topic number
    pub topic: u32,
    /// Position under the parent
    pub index: u32,
}

impl SubtopicId {
    /// Parent topic id
    #[inline]
    #[must_use]
    pub fn parent(&self) -> TopicId {
        TopicId(self.topic)
    }
}

impl FromStr for SubtopicId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = SUBTOPIC_ID
            .captures(s)
            .ok_or_else(|| IdError(s.to_string()))?;
        let topic = caps[1].parse().map_err(|_| IdError(s.to_string()))?;
        let index = caps[2].parse().map_err(|_| IdError(s.to_string()))?;
        Ok(Self { topic, index })
    }
}

impl fmt::Display for SubtopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}.{}", self.topic, self.index)
    }
}

/// Id did not match the expected pattern
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed id: {0:?}")]
pub struct IdError(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn topic_id_parsing() {
        assert_eq!("t1".parse::<TopicId>(), Ok(TopicId(1)));
        assert_eq!("t12".parse::<TopicId>(), Ok(TopicId(12)));
        assert!("T1".parse::<TopicId>().is_err());
        assert!("t".parse::<TopicId>().is_err());
        assert!("t1.1".parse::<TopicId>().is_err());
        assert!(" t1".parse::<TopicId>().is_err());
    }

    #[test]
    fn subtopic_id_parsing() {
        let id: SubtopicId = "t3.2".parse().unwrap();
        assert_eq!(id, SubtopicId { topic: 3, index: 2 });
        assert_eq!(id.parent(), TopicId(3));
        assert!("t3".parse::<SubtopicId>().is_err());
        assert!("t3.".parse::<SubtopicId>().is_err());
        assert!("t3.2.1".parse::<SubtopicId>().is_err());
    }

    proptest! {
        #[test]
        fn prop_ids_roundtrip_through_display(n in 0u32..10_000, m in 0u32..10_000) {
            let topic = TopicId(n);
            prop_assert_eq!(topic.to_string().parse::<TopicId>(), Ok(topic));

            let sub = SubtopicId { topic: n, index: m };
            prop_assert_eq!(sub.to_string().parse::<SubtopicId>(), Ok(sub));
        }
    }
}
