use std::collections::{BTreeMap, BTreeSet};

use wms_realtime_proto::{CacheDomain, Topic, TopicKey};

use crate::cache::InvalidationPredicate;

/// Topic → cache domains to invalidate. Immutable once built.
#[derive(Debug, Clone)]
pub struct RoutingTable(BTreeMap<Topic, BTreeSet<CacheDomain>>);

impl Default for RoutingTable {
    fn default() -> Self {
        use CacheDomain::*;
        Self::new([
            (Topic::Orders, vec![Orders, Dashboard]),
            (Topic::ShipmentRequests, vec![Orders, Dashboard]),
            (Topic::FinancialDocuments, vec![FinancialDocuments, FinancialSummary, Dashboard]),
            (Topic::EventLogs, vec![RealtimeEvents, EventLogs, SystemLogs, Dashboard]),
        ])
    }
}

impl RoutingTable {
    pub fn new(routes: impl IntoIterator<Item = (Topic, Vec<CacheDomain>)>) -> Self {
        Self(routes.into_iter().map(|(topic, domains)| (topic, domains.into_iter().collect())).collect())
    }

    pub fn domains(&self, topic: Topic) -> impl Iterator<Item = CacheDomain> + '_ { self.0.get(&topic).into_iter().flatten().copied() }

    /// Topics with at least one route; these are the ones worth subscribing to
    pub fn topics(&self) -> Vec<Topic> { self.0.iter().filter(|(_, domains)| !domains.is_empty()).map(|(topic, _)| *topic).collect() }
}

/// Pure mapping from a flushed topic key to the predicates that must be invalidated.
#[derive(Debug, Clone, Default)]
pub struct InvalidationRouter {
    table: RoutingTable,
}

impl InvalidationRouter {
    pub fn new(table: RoutingTable) -> Self { Self { table } }

    pub fn table(&self) -> &RoutingTable { &self.table }

    /// The event kind does not narrow the routes today; inserts, updates and deletes on a topic
    /// all stale the same domains.
    pub fn route(&self, key: TopicKey) -> Vec<InvalidationPredicate> { self.table.domains(key.topic).map(InvalidationPredicate::domain).collect() }
}
