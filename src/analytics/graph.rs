//! Customer–merchant–transaction entity graph.
//!
//! The graph is deliberately small: it shows the highest-risk transactions
//! of a snapshot and the customers and merchants they connect. Layout
//! coordinates are a rendering concern and are not produced here.

use crate::types::alert::{RiskTier, TierScheme};
use crate::types::transaction::ScoredTransaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Below this many nodes a graph is not worth drawing
pub const MIN_RENDERABLE_NODES: usize = 3;

const CUSTOMER_COLOR: &str = "#6a11cb";
const MERCHANT_COLOR: &str = "#2575fc";
const FLAGGED_CUSTOMER_COLOR: &str = "#9b59b6";
const FLAGGED_MERCHANT_COLOR: &str = "#3498db";
const CRITICAL_COLOR: &str = "#ff4757";
const HIGH_COLOR: &str = "#ffa502";
const ELEVATED_COLOR: &str = "#ffd93d";

const CUSTOMER_SIZE: f64 = 12.0;
const MERCHANT_SIZE: f64 = 10.0;
const EDGE_WEIGHT: f64 = 2.0;

/// Kind of entity a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Customer,
    Merchant,
    Transaction,
}

impl EntityKind {
    /// Display group used by the renderer
    pub fn group(&self) -> u8 {
        match self {
            EntityKind::Customer => 1,
            EntityKind::Merchant => 2,
            EntityKind::Transaction => 3,
        }
    }
}

/// Visual emphasis of a customer or merchant node.
///
/// Purely cosmetic: it never changes the aggregated counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Highlight {
    Base,
    Flagged,
    Critical,
}

/// Counts accumulated on a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    pub transaction_count: usize,
    pub total_amount: f64,
    pub fraud_count: usize,
}

/// Payload carried by transaction nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetail {
    pub transaction_id: String,
    pub probability: f64,
    pub amount: f64,
    pub risk_tier: RiskTier,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Node of the entity graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityNode {
    pub id: String,
    pub label: String,
    pub kind: EntityKind,
    pub group: u8,
    pub size: f64,
    pub color: String,
    pub highlight: Highlight,
    pub stats: NodeStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<TransactionDetail>,
}

/// Directed edge, styled by the probability of the transaction it represents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub weight: f64,
    pub color: String,
    pub probability: f64,
}

/// Nodes and links ready for a force-directed renderer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityGraph {
    pub nodes: Vec<EntityNode>,
    pub links: Vec<Edge>,
}

impl EntityGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the graph has enough nodes to be worth drawing.
    pub fn is_renderable(&self) -> bool {
        self.nodes.len() >= MIN_RENDERABLE_NODES
    }

    pub fn node(&self, id: &str) -> Option<&EntityNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn count_of(&self, kind: EntityKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }
}

/// Selection limits for the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphOptions {
    /// Most high-risk transactions taken before backfilling
    #[serde(default = "default_primary_limit")]
    pub primary_limit: usize,
    /// Backfill when fewer than this many high-risk transactions qualify
    #[serde(default = "default_backfill_trigger")]
    pub backfill_trigger: usize,
    /// Most medium-risk transactions added by a backfill
    #[serde(default = "default_backfill_limit")]
    pub backfill_limit: usize,
    /// Hard cap on selected transactions
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    /// Transactions above this probability get their own node
    #[serde(default = "default_inclusion_threshold")]
    pub inclusion_threshold: f64,
    /// Backfill candidates lie in `(backfill_floor, inclusion_threshold]`
    #[serde(default = "default_backfill_floor")]
    pub backfill_floor: f64,
    /// Customers and merchants with more fraud than this are escalated
    #[serde(default = "default_escalation_fraud_count")]
    pub escalation_fraud_count: usize,
}

fn default_primary_limit() -> usize {
    20
}

fn default_backfill_trigger() -> usize {
    5
}

fn default_backfill_limit() -> usize {
    15
}

fn default_max_nodes() -> usize {
    25
}

fn default_inclusion_threshold() -> f64 {
    0.5
}

fn default_backfill_floor() -> f64 {
    0.3
}

fn default_escalation_fraud_count() -> usize {
    2
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            primary_limit: default_primary_limit(),
            backfill_trigger: default_backfill_trigger(),
            backfill_limit: default_backfill_limit(),
            max_nodes: default_max_nodes(),
            inclusion_threshold: default_inclusion_threshold(),
            backfill_floor: default_backfill_floor(),
            escalation_fraud_count: default_escalation_fraud_count(),
        }
    }
}

impl GraphOptions {
    /// Default limits with a different selection cap.
    pub fn with_max_nodes(max_nodes: usize) -> Self {
        Self {
            max_nodes,
            ..Self::default()
        }
    }
}

/// Builds a bounded entity graph biased toward high-risk records.
#[derive(Debug, Clone, Default)]
pub struct EntityGraphBuilder {
    options: GraphOptions,
    scheme: TierScheme,
}

impl EntityGraphBuilder {
    pub fn new(options: GraphOptions) -> Self {
        Self {
            options,
            scheme: TierScheme::Standard,
        }
    }

    /// Tier scheme used to color transaction nodes
    pub fn with_scheme(mut self, scheme: TierScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn options(&self) -> &GraphOptions {
        &self.options
    }

    /// Pick the transactions that make it into the graph, in graph order.
    ///
    /// High-risk transactions come first, most probable first (ties keep
    /// input order). When too few qualify, medium-risk transactions are
    /// appended in input order.
    pub fn select<'a>(&self, records: &'a [ScoredTransaction]) -> Vec<&'a ScoredTransaction> {
        let o = &self.options;

        let mut selected: Vec<&ScoredTransaction> = records
            .iter()
            .filter(|tx| tx.probability > o.inclusion_threshold)
            .collect();
        selected.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        selected.truncate(o.primary_limit);

        if selected.len() < o.backfill_trigger {
            selected.extend(
                records
                    .iter()
                    .filter(|tx| {
                        tx.probability > o.backfill_floor && tx.probability <= o.inclusion_threshold
                    })
                    .take(o.backfill_limit),
            );
        }

        selected.truncate(o.max_nodes);
        selected
    }

    /// Build the graph for a snapshot.
    pub fn build(&self, records: &[ScoredTransaction]) -> EntityGraph {
        let selected = self.select(records);
        if selected.is_empty() {
            return EntityGraph::default();
        }

        let mut transaction_nodes = Vec::new();
        let mut links = Vec::new();
        // customers and merchants in first-seen order
        let mut entities: Vec<EntityNode> = Vec::new();
        let mut entity_index: HashMap<String, usize> = HashMap::new();

        for (idx, tx) in selected.iter().enumerate() {
            let fraud = tx.probability > self.options.inclusion_threshold;

            let customer_id = format!("C{}", tx.customer_id);
            let merchant_id = format!("M{}", tx.merchant_id);

            for (node_id, kind) in [
                (&customer_id, EntityKind::Customer),
                (&merchant_id, EntityKind::Merchant),
            ] {
                let slot = *entity_index.entry(node_id.clone()).or_insert_with(|| {
                    entities.push(Self::entity_node(node_id, kind, tx));
                    entities.len() - 1
                });
                let stats = &mut entities[slot].stats;
                stats.transaction_count += 1;
                stats.total_amount += tx.amount;
                if fraud {
                    stats.fraud_count += 1;
                }
            }

            if !fraud {
                continue;
            }

            let txn_id = format!("T{}", idx);
            transaction_nodes.push(self.transaction_node(&txn_id, tx));

            let color = edge_color(tx.probability).to_string();
            links.push(Edge {
                source: customer_id,
                target: txn_id.clone(),
                weight: EDGE_WEIGHT,
                color: color.clone(),
                probability: tx.probability,
            });
            links.push(Edge {
                source: txn_id,
                target: merchant_id,
                weight: EDGE_WEIGHT,
                color,
                probability: tx.probability,
            });
        }

        for node in &mut entities {
            self.escalate(node);
        }

        debug!(
            selected = selected.len(),
            transaction_nodes = transaction_nodes.len(),
            entity_nodes = entities.len(),
            links = links.len(),
            "Built entity graph"
        );

        let mut nodes = transaction_nodes;
        nodes.extend(entities);
        EntityGraph { nodes, links }
    }

    fn entity_node(id: &str, kind: EntityKind, tx: &ScoredTransaction) -> EntityNode {
        let (label, size, color, category) = match kind {
            EntityKind::Customer => (
                format!("Customer {}", tx.customer_id),
                CUSTOMER_SIZE,
                CUSTOMER_COLOR,
                None,
            ),
            _ => (
                format!("Merchant {}", tx.merchant_id),
                MERCHANT_SIZE,
                MERCHANT_COLOR,
                Some(tx.category.clone()),
            ),
        };

        EntityNode {
            id: id.to_string(),
            label,
            kind,
            group: kind.group(),
            size,
            color: color.to_string(),
            highlight: Highlight::Base,
            stats: NodeStats::default(),
            category,
            detail: None,
        }
    }

    fn transaction_node(&self, id: &str, tx: &ScoredTransaction) -> EntityNode {
        let risk_tier = self.scheme.bin(tx.probability);
        let color = match risk_tier {
            RiskTier::Critical => CRITICAL_COLOR,
            RiskTier::High => HIGH_COLOR,
            _ => ELEVATED_COLOR,
        };

        EntityNode {
            id: id.to_string(),
            label: format!("{:.0} ({:.0}% Risk)", tx.amount, tx.probability * 100.0),
            kind: EntityKind::Transaction,
            group: EntityKind::Transaction.group(),
            size: (tx.amount / 500.0).min(12.0) + 6.0,
            color: color.to_string(),
            highlight: Highlight::Base,
            stats: NodeStats {
                transaction_count: 1,
                total_amount: tx.amount,
                fraud_count: 1,
            },
            category: Some(tx.category.clone()),
            detail: Some(TransactionDetail {
                transaction_id: tx.id.clone(),
                probability: tx.probability,
                amount: tx.amount,
                risk_tier,
                category: tx.category.clone(),
                timestamp: tx.timestamp,
            }),
        }
    }

    /// Cosmetic reclassification of customers and merchants with fraud.
    fn escalate(&self, node: &mut EntityNode) {
        let fraud_count = node.stats.fraud_count;
        if fraud_count > self.options.escalation_fraud_count {
            node.size += 4.0;
            node.color = CRITICAL_COLOR.to_string();
            node.highlight = Highlight::Critical;
        } else if fraud_count > 0 {
            node.size += 2.0;
            node.color = match node.kind {
                EntityKind::Customer => FLAGGED_CUSTOMER_COLOR,
                _ => FLAGGED_MERCHANT_COLOR,
            }
            .to_string();
            node.highlight = Highlight::Flagged;
        }
    }
}

fn edge_color(probability: f64) -> &'static str {
    if probability > 0.8 {
        "rgba(255, 71, 87, 0.6)"
    } else if probability > 0.6 {
        "rgba(255, 165, 2, 0.5)"
    } else {
        "rgba(255, 217, 61, 0.4)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn tx(i: usize, customer: &str, merchant: &str, amount: f64, probability: f64) -> ScoredTransaction {
        ScoredTransaction::new(format!("t{}", i), customer, merchant, amount, probability).at(i)
    }

    fn assert_links_resolve(graph: &EntityGraph) {
        let ids: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        for link in &graph.links {
            assert!(ids.contains(link.source.as_str()), "dangling source {}", link.source);
            assert!(ids.contains(link.target.as_str()), "dangling target {}", link.target);
        }
    }

    #[test]
    fn test_empty_when_nothing_qualifies() {
        let builder = EntityGraphBuilder::default();
        let records = vec![tx(0, "a", "x", 10.0, 0.1), tx(1, "b", "y", 10.0, 0.3)];

        let graph = builder.build(&records);
        assert_eq!(graph, EntityGraph::default());
        assert!(!graph.is_renderable());
        assert_eq!(builder.build(&[]), EntityGraph::default());
    }

    #[test]
    fn test_selection_is_sorted_and_capped() {
        let builder = EntityGraphBuilder::default();
        let records: Vec<_> = (0..30)
            .map(|i| tx(i, "c", "m", 100.0, 0.51 + i as f64 * 0.01))
            .collect();

        let selected = builder.select(&records);
        assert_eq!(selected.len(), 20);
        assert_eq!(selected[0].id, "t29");
        assert!(selected
            .windows(2)
            .all(|w| w[0].probability >= w[1].probability));
    }

    #[test]
    fn test_backfill_with_medium_risk() {
        let builder = EntityGraphBuilder::default();
        let mut records = vec![tx(0, "a", "x", 100.0, 0.9), tx(1, "b", "y", 100.0, 0.7)];
        records.extend((2..30).map(|i| tx(i, "m", "z", 10.0, 0.4)));
        records.push(tx(30, "n", "z", 10.0, 0.2));

        let selected = builder.select(&records);
        assert_eq!(selected.len(), 2 + 15);
        assert_eq!(selected[2].id, "t2");
        assert!(selected.iter().all(|t| t.probability > 0.3));

        let graph = builder.build(&records);
        // backfilled records feed entity counts but get no node of their own
        assert_eq!(graph.count_of(EntityKind::Transaction), 2);
        assert_eq!(graph.links.len(), 4);
        let medium_customer = graph.node("Cm").unwrap();
        assert_eq!(medium_customer.stats.transaction_count, 15);
        assert_eq!(medium_customer.stats.fraud_count, 0);
        assert_eq!(medium_customer.highlight, Highlight::Base);
        assert_links_resolve(&graph);
    }

    #[test]
    fn test_max_nodes_caps_selection() {
        let builder = EntityGraphBuilder::new(GraphOptions::with_max_nodes(3));
        let records: Vec<_> = (0..10)
            .map(|i| tx(i, &format!("c{}", i), "m", 100.0, 0.9))
            .collect();

        let graph = builder.build(&records);
        assert_eq!(graph.count_of(EntityKind::Transaction), 3);
        assert!(graph.count_of(EntityKind::Transaction) <= builder.options().max_nodes);
        assert_links_resolve(&graph);
    }

    #[test]
    fn test_accumulation_and_escalation() {
        let builder = EntityGraphBuilder::default();
        let records = vec![
            tx(0, "alice", "shop", 100.0, 0.9),
            tx(1, "alice", "shop", 200.0, 0.85),
            tx(2, "alice", "shop", 300.0, 0.7),
            tx(3, "bob", "shop", 50.0, 0.55),
            tx(4, "carol", "cafe", 5000.0, 0.65),
        ];

        let graph = builder.build(&records);

        assert_eq!(graph.count_of(EntityKind::Transaction), 5);
        assert_eq!(graph.count_of(EntityKind::Customer), 3);
        assert_eq!(graph.count_of(EntityKind::Merchant), 2);
        assert_eq!(graph.links.len(), 10);
        assert!(graph.is_renderable());

        let alice = graph.node("Calice").unwrap();
        assert_eq!(alice.stats.transaction_count, 3);
        assert_eq!(alice.stats.total_amount, 600.0);
        assert_eq!(alice.stats.fraud_count, 3);
        assert_eq!(alice.highlight, Highlight::Critical);
        assert_eq!(alice.color, CRITICAL_COLOR);
        assert_eq!(alice.size, CUSTOMER_SIZE + 4.0);

        let shop = graph.node("Mshop").unwrap();
        assert_eq!(shop.stats.fraud_count, 4);
        assert_eq!(shop.highlight, Highlight::Critical);

        let bob = graph.node("Cbob").unwrap();
        assert_eq!(bob.highlight, Highlight::Flagged);
        assert_eq!(bob.color, FLAGGED_CUSTOMER_COLOR);

        let cafe = graph.node("Mcafe").unwrap();
        assert_eq!(cafe.highlight, Highlight::Flagged);
        assert_eq!(cafe.color, FLAGGED_MERCHANT_COLOR);
        assert_eq!(cafe.category.as_deref(), Some("Unknown"));

        assert_links_resolve(&graph);
    }

    #[test]
    fn test_transaction_node_styling() {
        let builder = EntityGraphBuilder::default();
        let records = vec![
            tx(0, "a", "x", 10_000.0, 0.95),
            tx(1, "b", "y", 1000.0, 0.7),
            tx(2, "c", "z", 0.0, 0.55),
        ];

        let graph = builder.build(&records);

        let critical = graph.node("T0").unwrap();
        assert_eq!(critical.color, CRITICAL_COLOR);
        assert_eq!(critical.size, 18.0);
        assert_eq!(critical.label, "10000 (95% Risk)");
        assert_eq!(critical.detail.as_ref().map(|d| d.risk_tier), Some(RiskTier::Critical));

        let high = graph.node("T1").unwrap();
        assert_eq!(high.color, HIGH_COLOR);
        assert_eq!(high.size, 8.0);

        let elevated = graph.node("T2").unwrap();
        assert_eq!(elevated.color, ELEVATED_COLOR);

        let edge = graph.links.iter().find(|l| l.target == "T0").unwrap();
        assert_eq!(edge.source, "Ca");
        assert_eq!(edge.color, "rgba(255, 71, 87, 0.6)");
        assert_eq!(edge_color(0.7), "rgba(255, 165, 2, 0.5)");
        assert_eq!(edge_color(0.55), "rgba(255, 217, 61, 0.4)");
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = EntityGraphBuilder::default();
        let records: Vec<_> = (0..40)
            .map(|i| {
                tx(
                    i,
                    &format!("c{}", i % 7),
                    &format!("m{}", i % 4),
                    (i * 37 % 900) as f64,
                    (i * 13 % 100) as f64 / 100.0,
                )
            })
            .collect();

        let first = builder.build(&records);
        let second = builder.build(&records);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
