//! Query descriptors and the records they return

use crate::types::{Address, SpaceId};
use serde::{Deserialize, Serialize};

/// Filter over alias bindings or follow relations
///
/// Unset fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_in: Option<Vec<SpaceId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follower_in: Option<Vec<Address>>,
    /// Only records created strictly after this unix timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_gt: Option<u64>,
}

/// Query against the `aliases` or `follows` collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub filter: QueryFilter,
    /// Maximum number of records to return (no cursor beyond this)
    pub first: u32,
}

impl Query {
    pub fn new(first: u32) -> Self {
        Self { filter: QueryFilter::default(), first }
    }

    pub fn address(mut self, address: Address) -> Self {
        self.filter.address = Some(address);
        self
    }

    pub fn alias(mut self, alias: Address) -> Self {
        self.filter.alias = Some(alias);
        self
    }

    pub fn space_in(mut self, spaces: Vec<SpaceId>) -> Self {
        self.filter.space_in = Some(spaces);
        self
    }

    pub fn follower_in(mut self, followers: Vec<Address>) -> Self {
        self.filter.follower_in = Some(followers);
        self
    }

    pub fn created_after(mut self, secs: u64) -> Self {
        self.filter.created_gt = Some(secs);
        self
    }
}

/// Server-side alias binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    /// Owner account
    pub address: Address,
    /// Delegated alias address
    pub alias: Address,
    /// Unix seconds
    pub created: u64,
}

impl AliasRecord {
    pub(crate) fn matches(&self, filter: &QueryFilter) -> bool {
        filter.address.as_ref().map_or(true, |a| a == &self.address)
            && filter.alias.as_ref().map_or(true, |a| a == &self.alias)
            && filter.created_gt.map_or(true, |t| self.created > t)
    }
}

/// Confirmed follow link between a follower and a space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowRelation {
    pub space: SpaceId,
    pub follower: Address,
    pub created: u64,
}

impl FollowRelation {
    pub(crate) fn matches(&self, filter: &QueryFilter) -> bool {
        filter.space_in.as_ref().map_or(true, |s| s.contains(&self.space))
            && filter.follower_in.as_ref().map_or(true, |f| f.contains(&self.follower))
            && filter.created_gt.map_or(true, |t| self.created > t)
    }
}
