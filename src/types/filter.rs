//! Log filter criteria, factories, and event source descriptors.
//!
//! A filter has five slots: one for the emitting address and one per topic
//! position. Each slot is either a wildcard or a non-empty OR-set. The
//! canonical form sorts every set and renders wildcards as JSON `null`, so
//! hashing it yields a stable identity for the semantic filter regardless
//! of how the caller spelled it.
//!
//! Subset matching between filters drives coverage reuse: every interval
//! stored under a broader filter is valid coverage for any narrower one.

use alloy::primitives::{Address, B256, keccak256};
use serde_json::json;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{DomainError, InfraError};
use crate::types::primitives::{hex_address, hex_b256, parse_address, parse_b256};

// ═══════════════════════════════════════════════════════════════════════════════
// FILTER SLOTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Address slot of a log filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AddressFilter {
    /// Match any emitting address.
    #[default]
    Any,
    /// Match exactly one address.
    Exact(Address),
    /// Match any address in the set (OR semantics).
    AnyOf(BTreeSet<Address>),
}

impl AddressFilter {
    fn canonical(&self) -> Result<Option<BTreeSet<Address>>, DomainError> {
        match self {
            Self::Any => Ok(None),
            Self::Exact(address) => Ok(Some(BTreeSet::from([*address]))),
            Self::AnyOf(set) if set.is_empty() => Err(DomainError::EmptyFilterSet("address")),
            Self::AnyOf(set) => Ok(Some(set.clone())),
        }
    }
}

impl From<Address> for AddressFilter {
    fn from(address: Address) -> Self {
        Self::Exact(address)
    }
}

/// One topic position of a log filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TopicFilter {
    /// Match any value at this position (also used for absent positions).
    #[default]
    Any,
    /// Match exactly one topic.
    Exact(B256),
    /// Match any topic in the set (OR semantics).
    AnyOf(BTreeSet<B256>),
}

impl TopicFilter {
    fn canonical(&self) -> Result<Option<BTreeSet<B256>>, DomainError> {
        match self {
            Self::Any => Ok(None),
            Self::Exact(topic) => Ok(Some(BTreeSet::from([*topic]))),
            Self::AnyOf(set) if set.is_empty() => Err(DomainError::EmptyFilterSet("topic")),
            Self::AnyOf(set) => Ok(Some(set.clone())),
        }
    }
}

impl From<B256> for TopicFilter {
    fn from(topic: B256) -> Self {
        Self::Exact(topic)
    }
}

/// The four topic positions of a filter.
///
/// Built from at most four entries; missing positions are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topics([TopicFilter; 4]);

impl Topics {
    /// The filter at a given position (positions past the end are `Any`).
    #[must_use]
    pub fn position(&self, index: usize) -> &TopicFilter {
        self.0.get(index).unwrap_or(&TopicFilter::Any)
    }
}

impl TryFrom<Vec<TopicFilter>> for Topics {
    type Error = DomainError;

    fn try_from(entries: Vec<TopicFilter>) -> Result<Self, Self::Error> {
        if entries.len() > 4 {
            return Err(DomainError::TooManyTopicPositions(entries.len()));
        }
        let mut slots: [TopicFilter; 4] = Default::default();
        for (slot, entry) in slots.iter_mut().zip(entries) {
            *slot = entry;
        }
        Ok(Self(slots))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOG FILTER CRITERIA
// ═══════════════════════════════════════════════════════════════════════════════

/// User-facing log filter criteria: an address slot plus up to four topic
/// positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilterCriteria {
    /// Emitting address constraint.
    pub address: AddressFilter,
    /// Topic position constraints.
    pub topics: Topics,
}

impl LogFilterCriteria {
    /// Resolve into the canonical slot form.
    ///
    /// # Errors
    /// Returns a [`DomainError`] when a slot holds an empty set.
    pub fn canonicalize(&self) -> Result<CanonicalCriteria, DomainError> {
        Ok(CanonicalCriteria {
            address: self.address.canonical()?,
            topics: [
                self.topics.position(0).canonical()?,
                self.topics.position(1).canonical()?,
                self.topics.position(2).canonical()?,
                self.topics.position(3).canonical()?,
            ],
        })
    }
}

/// Canonical form of a log filter: each slot is `None` (wildcard) or a
/// sorted, non-empty set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalCriteria {
    /// Address slot; `None` matches any address.
    pub address: Option<BTreeSet<Address>>,
    /// Topic slots 0..=3; `None` matches anything at that position.
    pub topics: [Option<BTreeSet<B256>>; 4],
}

impl CanonicalCriteria {
    /// Deterministic JSON rendering: sorted lowercase hex arrays, `null`
    /// wildcards, fixed key order.
    #[must_use]
    pub fn canonical_json(&self) -> serde_json::Value {
        let [topic0, topic1, topic2, topic3] = &self.topics;
        json!({
            "address": address_slot_json(self.address.as_ref()),
            "topic0": topic_slot_json(topic0.as_ref()),
            "topic1": topic_slot_json(topic1.as_ref()),
            "topic2": topic_slot_json(topic2.as_ref()),
            "topic3": topic_slot_json(topic3.as_ref()),
        })
    }

    /// The canonical filter id: a 128-bit truncation of
    /// `keccak256(chain_id ‖ canonical_json)`, rendered as hex. Used as
    /// the storage key for interval tracking.
    #[must_use]
    pub fn filter_id(&self, chain_id: u64) -> String {
        let mut preimage = chain_id.to_be_bytes().to_vec();
        preimage.extend_from_slice(self.canonical_json().to_string().as_bytes());
        let digest = keccak256(&preimage);
        format!("0x{}", hex::encode(&digest[..16]))
    }

    /// Whether this filter is a subset of `other`: every log this filter
    /// matches, `other` matches too.
    ///
    /// Per slot: `other` wildcard always covers; a positive slot here must
    /// be contained in `other`'s positive slot; a wildcard here is never
    /// covered by a positive slot there.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        fn slot_subset<T: Ord>(a: Option<&BTreeSet<T>>, b: Option<&BTreeSet<T>>) -> bool {
            match (a, b) {
                (_, None) => true,
                (None, Some(_)) => false,
                (Some(a), Some(b)) => a.is_subset(b),
            }
        }

        slot_subset(self.address.as_ref(), other.address.as_ref())
            && self
                .topics
                .iter()
                .zip(&other.topics)
                .all(|(a, b)| slot_subset(a.as_ref(), b.as_ref()))
    }

    /// Whether a concrete log (address + ordered topics) satisfies every
    /// slot of this filter.
    #[must_use]
    pub fn matches(&self, address: &Address, topics: &[B256]) -> bool {
        if let Some(addresses) = &self.address {
            if !addresses.contains(address) {
                return false;
            }
        }
        self.topics.iter().enumerate().all(|(position, slot)| {
            slot.as_ref()
                .is_none_or(|set| topics.get(position).is_some_and(|topic| set.contains(topic)))
        })
    }

    /// The five slots as the JSON text persisted in the `log_filters` row
    /// (`None` columns are SQL NULL wildcards).
    #[must_use]
    pub fn slot_columns(&self) -> [Option<String>; 5] {
        [
            self.address
                .as_ref()
                .map(|set| address_slot_json(Some(set)).to_string()),
            self.topics[0]
                .as_ref()
                .map(|set| topic_slot_json(Some(set)).to_string()),
            self.topics[1]
                .as_ref()
                .map(|set| topic_slot_json(Some(set)).to_string()),
            self.topics[2]
                .as_ref()
                .map(|set| topic_slot_json(Some(set)).to_string()),
            self.topics[3]
                .as_ref()
                .map(|set| topic_slot_json(Some(set)).to_string()),
        ]
    }

    /// Rebuild the canonical form from persisted slot columns.
    ///
    /// # Errors
    /// Returns [`InfraError::Internal`] if a stored slot fails to parse,
    /// which only happens on a corrupt row.
    pub fn from_slot_columns(slots: [Option<&str>; 5]) -> Result<Self, InfraError> {
        let [address, topic0, topic1, topic2, topic3] = slots;
        Ok(Self {
            address: address.map(parse_address_slot).transpose()?,
            topics: [
                topic0.map(parse_topic_slot).transpose()?,
                topic1.map(parse_topic_slot).transpose()?,
                topic2.map(parse_topic_slot).transpose()?,
                topic3.map(parse_topic_slot).transpose()?,
            ],
        })
    }
}

fn address_slot_json(slot: Option<&BTreeSet<Address>>) -> serde_json::Value {
    slot.map_or(serde_json::Value::Null, |set| {
        json!(set.iter().map(hex_address).collect::<Vec<_>>())
    })
}

fn topic_slot_json(slot: Option<&BTreeSet<B256>>) -> serde_json::Value {
    slot.map_or(serde_json::Value::Null, |set| {
        json!(set.iter().map(hex_b256).collect::<Vec<_>>())
    })
}

fn parse_address_slot(raw: &str) -> Result<BTreeSet<Address>, InfraError> {
    let entries: Vec<String> = serde_json::from_str(raw)?;
    entries
        .iter()
        .map(|entry| {
            parse_address(entry)
                .map_err(|_| InfraError::Internal(format!("invalid address slot in DB: {entry}")))
        })
        .collect()
}

fn parse_topic_slot(raw: &str) -> Result<BTreeSet<B256>, InfraError> {
    let entries: Vec<String> = serde_json::from_str(raw)?;
    entries
        .iter()
        .map(|entry| {
            parse_b256(entry)
                .map_err(|_| InfraError::Internal(format!("invalid topic slot in DB: {entry}")))
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// FACTORIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Where in a factory's deployment emission the child address lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildAddressLocation {
    /// The child address is the second topic.
    Topic1,
    /// The child address is the third topic.
    Topic2,
    /// The child address is the fourth topic.
    Topic3,
    /// The child address sits in the data payload at this byte offset,
    /// right-aligned within its 32-byte word. Must be a multiple of 32.
    Offset(u32),
}

impl ChildAddressLocation {
    /// Extract the 20-byte child address from a parent emission.
    ///
    /// Topic locations drop their 12-byte left padding; offset locations
    /// read bytes `[offset + 12, offset + 32)` of the data payload.
    /// Returns `None` when the log does not carry the expected position.
    #[must_use]
    pub fn extract(&self, topics: &[B256], data: &[u8]) -> Option<Address> {
        match self {
            Self::Topic1 => topics.get(1).map(topic_to_address),
            Self::Topic2 => topics.get(2).map(topic_to_address),
            Self::Topic3 => topics.get(3).map(topic_to_address),
            Self::Offset(offset) => {
                let start = *offset as usize + 12;
                data.get(start..start + 20).map(Address::from_slice)
            }
        }
    }
}

fn topic_to_address(topic: &B256) -> Address {
    Address::from_slice(&topic[12..])
}

impl FromStr for ChildAddressLocation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::InvalidChildAddressLocation(s.to_owned());
        match s {
            "topic1" => Ok(Self::Topic1),
            "topic2" => Ok(Self::Topic2),
            "topic3" => Ok(Self::Topic3),
            _ => {
                let offset: u32 = s
                    .strip_prefix("offset")
                    .ok_or_else(invalid)?
                    .parse()
                    .map_err(|_| invalid())?;
                if offset % 32 != 0 {
                    return Err(invalid());
                }
                Ok(Self::Offset(offset))
            }
        }
    }
}

impl fmt::Display for ChildAddressLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topic1 => write!(f, "topic1"),
            Self::Topic2 => write!(f, "topic2"),
            Self::Topic3 => write!(f, "topic3"),
            Self::Offset(offset) => write!(f, "offset{offset}"),
        }
    }
}

/// A factory contract whose deployment emissions are parsed to discover
/// child contracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Factory {
    /// The factory (parent) contract address.
    pub address: Address,
    /// Event selector of the deployment emission (topic 0).
    pub event_selector: B256,
    /// Where the child address lives in the emission.
    pub child_address_location: ChildAddressLocation,
}

impl Factory {
    /// The canonical factory id used as the storage key for coverage
    /// tracking: a 128-bit keccak truncation over
    /// `(chain_id, address, selector, location)`.
    ///
    /// Topics given on interval queries never participate: a factory is
    /// identified solely by these three criteria.
    #[must_use]
    pub fn factory_id(&self, chain_id: u64) -> String {
        let mut preimage = chain_id.to_be_bytes().to_vec();
        preimage.extend_from_slice(self.address.as_slice());
        preimage.extend_from_slice(self.event_selector.as_slice());
        preimage.extend_from_slice(self.child_address_location.to_string().as_bytes());
        let digest = keccak256(&preimage);
        format!("0x{}", hex::encode(&digest[..16]))
    }

    /// The log filter matching this factory's raw parent emissions,
    /// used to track their coverage through the normal log filter path.
    #[must_use]
    pub fn parent_emission_criteria(&self) -> LogFilterCriteria {
        LogFilterCriteria {
            address: AddressFilter::Exact(self.address),
            topics: Topics([
                TopicFilter::Exact(self.event_selector),
                TopicFilter::Any,
                TopicFilter::Any,
                TopicFilter::Any,
            ]),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT SOURCE DESCRIPTORS
// ═══════════════════════════════════════════════════════════════════════════════

/// A direct log filter event source for replay.
#[derive(Debug, Clone)]
pub struct LogFilterSource {
    /// Name tagged onto every event this source emits.
    pub name: String,
    /// Chain the source indexes.
    pub chain_id: u64,
    /// Filter criteria.
    pub criteria: LogFilterCriteria,
    /// Only logs at or above this block match, when set.
    pub from_block: Option<alloy::primitives::U256>,
    /// When present, intersects topic position 0; an empty list makes the
    /// source match nothing at all.
    pub include_event_selectors: Option<Vec<B256>>,
}

impl LogFilterSource {
    /// Canonical criteria with the event-selector override folded into
    /// topic position 0. `Ok(None)` means the source can never match.
    ///
    /// # Errors
    /// Returns a [`DomainError`] when the criteria are malformed.
    pub fn effective_criteria(&self) -> Result<Option<CanonicalCriteria>, DomainError> {
        let mut canonical = self.criteria.canonicalize()?;
        if let Some(selectors) = &self.include_event_selectors {
            let included: BTreeSet<B256> = selectors.iter().copied().collect();
            let effective = match canonical.topics[0].take() {
                Some(existing) => existing.intersection(&included).copied().collect(),
                None => included,
            };
            if effective.is_empty() {
                return Ok(None);
            }
            canonical.topics[0] = Some(effective);
        }
        Ok(Some(canonical))
    }
}

/// A factory-child event source for replay.
#[derive(Debug, Clone)]
pub struct FactorySource {
    /// Name tagged onto every event this source emits.
    pub name: String,
    /// Chain the source indexes.
    pub chain_id: u64,
    /// The factory whose children emit the events.
    pub criteria: Factory,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
